use ibc_ids::{ChannelId, ConnectionId, Height, PortId, Timestamp};
use lib::hash::CryptoHash;

use crate::connection::version;
use crate::error::{Error, Result};

pub mod handshake;
pub mod packet;
pub mod timeout;
pub mod upgrade;

/// State of a channel end.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
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
    #[strum(serialize = "CLOSED")]
    Closed,
    /// Upgrade in progress.  Channel waits for in-flight packets sent under
    /// the old parameters to be resolved.
    #[strum(serialize = "FLUSHING")]
    Flushing,
    /// Upgrade in progress.  Channel has no more in-flight packets.
    #[strum(serialize = "FLUSHCOMPLETE")]
    FlushComplete,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::Display,
)]
pub enum Order {
    #[strum(serialize = "ORDER_UNORDERED")]
    Unordered,
    #[strum(serialize = "ORDER_ORDERED")]
    Ordered,
}

impl Order {
    /// Returns name of the connection version feature which enables this
    /// ordering.
    pub fn feature(self) -> &'static str {
        match self {
            Self::Unordered => version::ORDER_UNORDERED,
            Self::Ordered => version::ORDER_ORDERED,
        }
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct Counterparty {
    pub port_id: PortId,
    /// Channel on the counterparty.  `None` while the counterparty hasn’t
    /// executed `ChanOpenTry` yet.
    pub channel_id: Option<ChannelId>,
}

impl Counterparty {
    pub fn new(port_id: PortId, channel_id: Option<ChannelId>) -> Self {
        Self { port_id, channel_id }
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct ChannelEnd {
    pub state: State,
    pub ordering: Order,
    pub counterparty: Counterparty,
    /// Connections the channel goes through.  Exactly one element.
    pub connection_hops: Vec<ConnectionId>,
    pub version: String,
    /// Number of upgrade attempts.  Never decreases.
    pub upgrade_sequence: u64,
}

impl ChannelEnd {
    pub fn is_open(&self) -> bool { self.state == State::Open }

    /// Returns the single connection the channel goes through.
    pub fn connection_id(&self) -> Result<&ConnectionId> {
        match self.connection_hops.as_slice() {
            [id] => Ok(id),
            hops => Err(Error::InvalidConnectionHops(hops.len())),
        }
    }

    /// Returns the counterparty channel id failing if it isn’t known yet.
    pub fn counterparty_channel_id(&self) -> Result<&ChannelId> {
        self.counterparty
            .channel_id
            .as_ref()
            .ok_or(Error::Internal("counterparty channel id not set"))
    }

    /// Fails with `InvalidChannelState` unless the channel is in one of given
    /// states.
    pub fn expect_state(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
        expected: &[State],
    ) -> Result {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidChannelState {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
                expected: expected.to_vec(),
                got: self.state,
            })
        }
    }

    /// Returns the channel’s current fields in the form used by upgrades.
    pub fn upgrade_fields(&self) -> UpgradeFields {
        UpgradeFields {
            ordering: self.ordering,
            connection_hops: self.connection_hops.clone(),
            version: self.version.clone(),
        }
    }
}

// ==== Packets ================================================================

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct Packet {
    pub sequence: u64,
    pub source_port: PortId,
    pub source_channel: ChannelId,
    pub dest_port: PortId,
    pub dest_channel: ChannelId,
    pub data: Vec<u8>,
    pub timeout_height: Height,
    pub timeout_timestamp: Timestamp,
}

impl Packet {
    /// Checks stateless validity of the packet.
    pub fn validate(&self) -> Result {
        if self.sequence == 0 {
            return Err(Error::InvalidPacket("sequence must not be zero"));
        }
        if self.timeout_height.is_zero() && self.timeout_timestamp.is_zero() {
            return Err(Error::InvalidPacket("packet has no timeout"));
        }
        if self.data.is_empty() {
            return Err(Error::InvalidPacket("packet data is empty"));
        }
        Ok(())
    }

    /// Returns whether the packet has timed out at given height or time.
    pub fn timed_out(&self, height: Height, timestamp: Timestamp) -> bool {
        self.timeout_height.has_expired(height) ||
            self.timeout_timestamp.has_expired(timestamp)
    }

    /// Returns commitment to the packet stored by the sending chain.
    ///
    /// The commitment covers the timeout and hash of the data.  Source and
    /// destination are implied by the key the commitment is stored under.
    pub fn commitment(&self) -> CryptoHash {
        let data = CryptoHash::digest(&self.data);
        CryptoHash::digestv(&[
            &self.timeout_timestamp.nanos().to_be_bytes(),
            &self.timeout_height.revision_number.to_be_bytes(),
            &self.timeout_height.revision_height.to_be_bytes(),
            data.as_slice(),
        ])
    }
}

/// Result of an application handling a received packet.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct Acknowledgement {
    /// Whether the application processed the packet successfully.  State
    /// changes made by an application which returned an unsuccessful
    /// acknowledgement are discarded.
    pub success: bool,
    /// Acknowledgement bytes committed to and relayed back to the sender.
    pub data: Vec<u8>,
}

/// Returns commitment to an acknowledgement.
pub fn ack_commitment(ack: &[u8]) -> CryptoHash { CryptoHash::digest(ack) }

// ==== Upgrades ===============================================================

/// Channel parameters which may be changed by an upgrade.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct UpgradeFields {
    pub ordering: Order,
    pub connection_hops: Vec<ConnectionId>,
    pub version: String,
}

/// Absolute timeout of an upgrade.  Either value may be zero to disable it.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
)]
pub struct UpgradeTimeout {
    pub height: Height,
    pub timestamp: Timestamp,
}

impl UpgradeTimeout {
    pub fn is_zero(&self) -> bool {
        self.height.is_zero() && self.timestamp.is_zero()
    }

    /// Returns whether the timeout has passed at given height or time.
    pub fn has_passed(&self, height: Height, timestamp: Timestamp) -> bool {
        self.height.has_expired(height) || self.timestamp.has_expired(timestamp)
    }
}

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct Upgrade {
    pub fields: UpgradeFields,
    /// Zero until the chain starts flushing.
    pub timeout: UpgradeTimeout,
    /// Next send sequence at the moment flushing started.  Zero until then.
    pub next_sequence_send: u64,
}

impl Upgrade {
    pub fn new(fields: UpgradeFields) -> Self {
        Self { fields, timeout: Default::default(), next_sequence_send: 0 }
    }
}

/// Record of a failed upgrade attempt.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct ErrorReceipt {
    /// Upgrade sequence at which the attempt failed.
    pub sequence: u64,
    /// Deterministic description of the failure.
    pub message: String,
}

impl ErrorReceipt {
    /// Constructs a receipt for given failure.
    ///
    /// Only the error code and name end up in the message.  Details such as
    /// identifiers or heights may differ between nodes and would make the
    /// receipt non-deterministic.
    pub fn new(sequence: u64, err: &Error) -> Self {
        let message = format!("error code {}: {}", err.code(), err.name());
        Self { sequence, message }
    }
}
