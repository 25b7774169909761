use alloc::string::String;
use core::fmt;
use core::str::FromStr;

type Result<T, E = Error> = core::result::Result<T, E>;

/// Error returned when parsing or constructing an identifier fails.
///
/// Each variant carries the offending string so that a relayer can tell what
/// was wrong with the message it submitted.
#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Error {
    #[display(fmt = "invalid client id: {:?}", _0)]
    BadClientId(String),
    #[display(fmt = "invalid connection id: {:?}", _0)]
    BadConnectionId(String),
    #[display(fmt = "invalid channel id: {:?}", _0)]
    BadChannelId(String),
    #[display(fmt = "invalid port id: {:?}", _0)]
    BadPortId(String),
    #[display(fmt = "empty merkle prefix")]
    EmptyPrefix,
}

/// Parses the `N` part of a `prefix-N` identifier.
///
/// The counter must be a decimal number without leading zeros (unless it’s
/// exactly `0`) which fits `u64`.  In particular, signs, whitespace and nested
/// prefixes are rejected.
pub fn parse_counter(counter: &str) -> Option<u64> {
    let bytes = counter.as_bytes();
    match bytes {
        [] => None,
        [b'0', _, ..] => None,
        _ if !bytes.iter().all(u8::is_ascii_digit) => None,
        _ => counter.parse().ok(),
    }
}

/// Checks whether all characters of the identifier are allowed by ICS-24 and
/// its length falls within given (inclusive) bounds.
fn is_valid_identifier(id: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&id.len()) &&
        id.bytes().all(|byte| {
            byte.is_ascii_alphanumeric() ||
                matches!(
                    byte,
                    b'.' | b'_' | b'+' | b'-' | b'#' | b'[' | b']' | b'<' | b'>'
                )
        })
}

macro_rules! impl_str_id {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub fn as_str(&self) -> &str { self.0.as_str() }
        }

        impl AsRef<str> for $ty {
            #[inline]
            fn as_ref(&self) -> &str { self.0.as_str() }
        }

        impl fmt::Display for $ty {
            #[inline]
            fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmtr.write_str(self.0.as_str())
            }
        }

        impl fmt::Debug for $ty {
            #[inline]
            fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self.0.as_str(), fmtr)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = Error;

            #[inline]
            fn try_from(id: String) -> Result<Self> { Self::from_str(&id) }
        }

        impl<'a> TryFrom<&'a str> for $ty {
            type Error = Error;

            #[inline]
            fn try_from(id: &'a str) -> Result<Self> { Self::from_str(id) }
        }
    };
}

// ==== Client Id ==============================================================

/// Identifier of a light client, `<client-type>-<counter>`.
///
/// The reserved `09-localhost` identifier names the client which verifies
/// proofs against the host’s own store.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct ClientId(String);

impl ClientId {
    /// Identifier of the localhost client.
    pub const LOCALHOST: &'static str = "09-localhost";

    /// Constructs client id of given type and counter.
    pub fn new(client_type: &str, counter: u64) -> Result<Self> {
        Self::from_str(&alloc::format!("{client_type}-{counter}"))
    }

    /// Returns the localhost client id.
    pub fn localhost() -> Self { Self(Self::LOCALHOST.into()) }

    /// Returns whether this is the localhost client.
    pub fn is_localhost(&self) -> bool { self.0 == Self::LOCALHOST }

    /// Splits the identifier into client type and counter.
    ///
    /// Returns `None` for the localhost client which has no counter.
    pub fn parse(&self) -> Option<(&str, u64)> {
        let (client_type, counter) = self.0.rsplit_once('-')?;
        Some((client_type, parse_counter(counter)?))
    }
}

impl FromStr for ClientId {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        let err = || Error::BadClientId(id.into());
        if id == Self::LOCALHOST {
            return Ok(Self::localhost());
        }
        if !is_valid_identifier(id, 9, 64) {
            return Err(err());
        }
        let (client_type, counter) = id.rsplit_once('-').ok_or_else(err)?;
        if client_type.is_empty() || client_type.ends_with('-') {
            return Err(err());
        }
        parse_counter(counter).ok_or_else(err)?;
        Ok(Self(id.into()))
    }
}

impl_str_id!(ClientId);

// ==== Connection Id ==========================================================

/// Identifier of a connection, `connection-<counter>`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct ConnectionId(String);

impl ConnectionId {
    const PREFIX: &'static str = "connection-";

    /// Identifier of the localhost connection.
    pub const LOCALHOST: &'static str = "connection-localhost";

    /// Constructs connection id with given counter.
    pub fn new(counter: u64) -> Self {
        Self(alloc::format!("{}{counter}", Self::PREFIX))
    }

    /// Returns the localhost connection id.
    pub fn localhost() -> Self { Self(Self::LOCALHOST.into()) }

    /// Returns whether this is the localhost connection.
    pub fn is_localhost(&self) -> bool { self.0 == Self::LOCALHOST }

    /// Returns the counter of the connection or `None` for localhost
    /// connection.
    pub fn counter(&self) -> Option<u64> {
        parse_counter(self.0.strip_prefix(Self::PREFIX)?)
    }
}

impl FromStr for ConnectionId {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        if id == Self::LOCALHOST {
            return Ok(Self::localhost());
        }
        id.strip_prefix(Self::PREFIX)
            .and_then(parse_counter)
            .map(Self::new)
            .ok_or_else(|| Error::BadConnectionId(id.into()))
    }
}

impl_str_id!(ConnectionId);

// ==== Channel Id =============================================================

/// Identifier of a channel, `channel-<counter>`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct ChannelId(String);

impl ChannelId {
    const PREFIX: &'static str = "channel-";

    /// Constructs channel id with given counter.
    pub fn new(counter: u64) -> Self {
        Self(alloc::format!("{}{counter}", Self::PREFIX))
    }

    pub fn counter(&self) -> u64 {
        self.0
            .strip_prefix(Self::PREFIX)
            .and_then(parse_counter)
            .unwrap_or_default()
    }
}

impl FromStr for ChannelId {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        id.strip_prefix(Self::PREFIX)
            .and_then(parse_counter)
            .map(Self::new)
            .ok_or_else(|| Error::BadChannelId(id.into()))
    }
}

impl_str_id!(ChannelId);

// ==== Port Id ================================================================

/// Identifier of a port.
///
/// Ports are named by the modules which bind them.  The name must be 2 to 128
/// characters long and consist of ICS-24 identifier characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct PortId(String);

impl PortId {
    /// Port of the token transfer application.
    pub const TRANSFER: &'static str = "transfer";

    pub fn transfer() -> Self { Self(Self::TRANSFER.into()) }
}

impl FromStr for PortId {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        if is_valid_identifier(id, 2, 128) {
            Ok(Self(id.into()))
        } else {
            Err(Error::BadPortId(id.into()))
        }
    }
}

impl_str_id!(PortId);

#[test]
fn test_counter() {
    assert_eq!(Some(0), parse_counter("0"));
    assert_eq!(Some(42), parse_counter("42"));
    assert_eq!(Some(u64::MAX), parse_counter("18446744073709551615"));
    for bad in ["", "00", "042", "-1", "+1", " 1", "1 ", "18446744073709551616"]
    {
        assert_eq!(None, parse_counter(bad), "{bad:?}");
    }
}

#[test]
fn test_client() {
    for (id, want) in [
        ("07-tendermint-0", Some(("07-tendermint", 0))),
        ("foo-bar-42", Some(("foo-bar", 42))),
        ("09-localhost", None),
    ] {
        let id = ClientId::from_str(id).unwrap();
        assert_eq!(want, id.parse());
    }
    assert!(ClientId::localhost().is_localhost());
    assert_eq!(
        "07-tendermint-7",
        ClientId::new("07-tendermint", 7).unwrap().as_str()
    );

    for bad in [
        "",
        "-0",
        "tendermint",
        "07-tendermint-",
        "07-tendermint--1",
        "07-tendermint-01",
        "07-tendermint-18446744073709551616",
        "07 tendermint-0",
    ] {
        assert_eq!(
            Err(Error::BadClientId(bad.into())),
            ClientId::from_str(bad),
            "{bad:?}"
        );
    }
}

#[test]
fn test_connection() {
    for counter in [0, 1, 42, u64::MAX] {
        let id = ConnectionId::new(counter);
        assert_eq!(alloc::format!("connection-{counter}"), id.as_str());
        assert_eq!(Ok(id.clone()), ConnectionId::from_str(id.as_str()));
        assert_eq!(Some(counter), id.counter());
    }

    let local = ConnectionId::from_str("connection-localhost").unwrap();
    assert!(local.is_localhost());
    assert_eq!(None, local.counter());

    for bad in [
        "",
        "connection",
        "connection-",
        "connection--1",
        "connection-01",
        "connection-connection-1",
        "connection-18446744073709551616",
        "channel-0",
        "Connection-0",
    ] {
        assert_eq!(
            Err(Error::BadConnectionId(bad.into())),
            ConnectionId::from_str(bad),
            "{bad:?}"
        );
    }
}

#[test]
fn test_channel() {
    for counter in [0, 1, 42, u64::MAX] {
        let id = ChannelId::new(counter);
        assert_eq!(alloc::format!("channel-{counter}"), id.as_str());
        assert_eq!(Ok(id.clone()), ChannelId::from_str(id.as_str()));
        assert_eq!(counter, id.counter());
    }

    for bad in [
        "",
        "channel-",
        "channel--1",
        "channel-00",
        "channel-channel-0",
        "channel-18446744073709551616",
        "connection-0",
    ] {
        assert_eq!(
            Err(Error::BadChannelId(bad.into())),
            ChannelId::from_str(bad),
            "{bad:?}"
        );
    }
}

#[test]
fn test_port() {
    for good in ["transfer", "ab", "icahost", "a.b_c+d-e#f[g]h<i>"] {
        assert_eq!(good, PortId::from_str(good).unwrap().as_str());
    }
    let long = "x".repeat(129);
    for bad in ["", "a", "has space", "slash/port", long.as_str()] {
        assert_eq!(Err(Error::BadPortId(bad.into())), PortId::from_str(bad));
    }
}
