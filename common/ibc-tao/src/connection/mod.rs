use core::time::Duration;

use ibc_ids::{ClientId, ConnectionId, MerklePrefix};

use crate::error::{Error, Result};

pub mod handshake;
pub mod version;

pub use handshake::{
    conn_open_ack, conn_open_confirm, conn_open_init, conn_open_try,
    create_localhost_connection,
};
pub use version::{Version, VersionError};

/// State of a connection end.
///
/// States only ever advance.  There is no way to close a connection.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
pub enum State {
    #[strum(serialize = "UNINIT")]
    Uninit,
    #[strum(serialize = "INIT")]
    Init,
    #[strum(serialize = "TRYOPEN")]
    TryOpen,
    #[strum(serialize = "OPEN")]
    Open,
}

/// The other side of a connection as seen from this chain.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct Counterparty {
    /// Client on the counterparty chain which tracks this chain.
    pub client_id: ClientId,
    /// Connection on the counterparty chain.  `None` until the counterparty
    /// executes `ConnOpenTry` (or this chain `ConnOpenAck`).
    pub connection_id: Option<ConnectionId>,
    /// Prefix of the counterparty’s IBC store.
    pub prefix: MerklePrefix,
}

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct ConnectionEnd {
    pub state: State,
    /// Client on this chain which tracks the counterparty.
    pub client_id: ClientId,
    pub counterparty: Counterparty,
    /// Versions offered (INIT) or negotiated (all other states).
    pub versions: Vec<Version>,
    /// Delay, in nanoseconds, packet proofs must age before being accepted.
    pub delay_period_ns: u64,
}

impl ConnectionEnd {
    pub fn delay_period(&self) -> Duration {
        Duration::from_nanos(self.delay_period_ns)
    }

    pub fn is_open(&self) -> bool { self.state == State::Open }

    /// Returns the counterparty connection id or an error if it isn’t known
    /// yet.
    pub fn counterparty_connection_id(&self) -> Result<&ConnectionId> {
        self.counterparty
            .connection_id
            .as_ref()
            .ok_or(Error::Internal("counterparty connection id not set"))
    }

    /// Fails with `InvalidConnectionState` unless the connection is in given
    /// state.
    pub fn expect_state(&self, id: &ConnectionId, expected: State) -> Result {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidConnectionState {
                connection_id: id.clone(),
                expected,
                got: self.state,
            })
        }
    }
}

#[test]
fn test_state_names() {
    let names = [State::Uninit, State::Init, State::TryOpen, State::Open]
        .map(<&'static str>::from);
    assert_eq!(["UNINIT", "INIT", "TRYOPEN", "OPEN"], names);
}
