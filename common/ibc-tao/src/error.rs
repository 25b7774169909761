use core::fmt;

use ibc_ids::{ChannelId, ClientId, ConnectionId, Height, PortId, Timestamp};

use crate::channel::{self, Order};
use crate::client::{ClientError, Status};
use crate::config::UpdateConfigError;
use crate::connection::{self, VersionError};
use crate::router::AppError;

pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Error returned when handling a request.
// Note: When changing variants in the enum, try to preserve indexes of each
// variant.  The position is translated into error code which ends up in error
// receipts of failed upgrades.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::EnumDiscriminants,
    strum::IntoStaticStr,
    derive_more::From,
)]
#[strum_discriminants(repr(u32))]
pub enum Error {
    /// Internal error which ‘should never happen’.
    #[from(ignore)]
    Internal(&'static str),

    /// Stored value could not be decoded.
    #[from(ignore)]
    Decode { key: String },

    #[from]
    InvalidIdentifier(ibc_ids::Error),

    #[from]
    InvalidVersion(VersionError),

    /// Callback of an application failed or vetoed the operation.
    #[from]
    App(AppError),

    // ==== Clients and proofs =================================================
    #[from(ignore)]
    ClientNotFound(ClientId),

    #[from(ignore)]
    ClientNotActive { client_id: ClientId, status: Status },

    #[from(ignore)]
    ConsensusStateNotFound { client_id: ClientId, height: Height },

    /// Client state the counterparty keeps for this chain is invalid.
    #[from(ignore)]
    InvalidSelfClient(String),

    /// Merkle proof doesn’t authenticate the claimed value or absence.
    #[from(ignore)]
    InvalidProof { path: String, reason: String },

    /// Client hasn’t been updated to the proof height yet.
    #[from(ignore)]
    InvalidHeight { proof_height: Height, latest_height: Height },

    /// Consensus height claimed by the counterparty is not lower than
    /// current height of this chain.
    #[from(ignore)]
    InvalidConsensusHeight { consensus_height: Height, host_height: Height },

    #[from(ignore)]
    DelayPeriodNotPassed {
        current_time: Timestamp,
        earliest_time: Timestamp,
        current_height: Height,
        earliest_height: Height,
    },

    // ==== Connections ========================================================
    #[from(ignore)]
    ConnectionNotFound(ConnectionId),

    #[from(ignore)]
    ConnectionAlreadyExists(ConnectionId),

    #[from(ignore)]
    InvalidConnectionState {
        connection_id: ConnectionId,
        expected: connection::State,
        got: connection::State,
    },

    #[from(ignore)]
    InvalidConnectionHops(usize),

    // ==== Channels ===========================================================
    #[from(ignore)]
    ChannelNotFound { port_id: PortId, channel_id: ChannelId },

    #[from(ignore)]
    InvalidChannelState {
        port_id: PortId,
        channel_id: ChannelId,
        expected: Vec<channel::State>,
        got: channel::State,
    },

    /// Connection version doesn’t support the channel ordering.
    #[from(ignore)]
    OrderingNotSupported(Order),

    #[from(ignore)]
    PortNotBound(PortId),

    #[from(ignore)]
    ModuleNotFound(String),

    /// Caller doesn’t own the channel.
    #[from(ignore)]
    Unauthorized { port_id: PortId, channel_id: ChannelId },

    /// Signer is not the configured authority.
    #[from(ignore)]
    InvalidSigner(String),

    #[from(ignore)]
    MissingSequence(String),

    // ==== Packets ============================================================
    #[from(ignore)]
    InvalidPacket(&'static str),

    /// Packet’s source or destination doesn’t match channel’s counterparty.
    #[from(ignore)]
    InvalidPacketCounterparty { port_id: PortId, channel_id: ChannelId },

    #[from(ignore)]
    PacketSequenceOutOfOrder { expected: u64, got: u64 },

    #[from(ignore)]
    PacketCommitmentMismatch { sequence: u64 },

    /// Packet precedes the receive start sequence of an upgraded channel.
    #[from(ignore)]
    PacketAlreadyProcessed { sequence: u64, recv_start_sequence: u64 },

    /// Counterparty has already received the packet being timed out.
    #[from(ignore)]
    PacketReceived { sequence: u64, next_sequence_recv: u64 },

    /// Packet being sent has already timed out.
    #[from(ignore)]
    TimeoutElapsed { sequence: u64 },

    /// Packet being received has timed out.
    #[from(ignore)]
    PacketTimedOut { sequence: u64 },

    #[from(ignore)]
    TimeoutNotReached { sequence: u64 },

    #[from(ignore)]
    AcknowledgementExists { sequence: u64 },

    #[from(ignore)]
    InvalidAcknowledgement,

    // ==== Upgrades ===========================================================
    #[from(ignore)]
    UpgradeNotFound { port_id: PortId, channel_id: ChannelId },

    /// Upgrade doesn’t change any of the channel’s fields.
    #[from(ignore)]
    UpgradeFieldsUnchanged,

    #[from(ignore)]
    IncompatibleCounterpartyUpgrade(&'static str),

    #[from(ignore)]
    InvalidUpgradeSequence { counterparty: u64, ours: u64 },

    #[from(ignore)]
    UpgradeTimeoutPassed,

    #[from(ignore)]
    UpgradeTimeoutNotReached,

    /// Counterparty has already completed the upgrade.
    #[from(ignore)]
    UpgradeAlreadyOpen,

    #[from(ignore)]
    InvalidCounterpartyState(channel::State),

    #[from(ignore)]
    InvalidErrorReceipt(&'static str),

    #[from(ignore)]
    PruningSequenceStartNotFound,

    /// Failure during an upgrade step which aborts the upgrade rather than
    /// the whole transaction.
    #[from(ignore)]
    UpgradeError { sequence: u64, source: Box<Error> },

    /// Transaction contains only redundant packet messages.
    #[from(ignore)]
    RedundantTx,

    #[from(ignore)]
    UnsupportedMessage(&'static str),

    #[from]
    InvalidConfig(UpdateConfigError),

    /// Upgrade was cancelled.
    #[from(ignore)]
    UpgradeCancelled,

    /// Upgrade was replaced by a new upgrade before completing.
    #[from(ignore)]
    UpgradeReplaced,

    /// Counterparty given in a message is incomplete.
    #[from(ignore)]
    InvalidCounterparty(&'static str),

    #[from(ignore)]
    PortAlreadyBound(PortId),
}

impl Error {
    pub fn name(&self) -> &'static str { self.into() }

    pub fn code(&self) -> u32 { ErrorDiscriminants::from(self) as u32 }

    /// Wraps the error as an upgrade error at given sequence.
    pub fn upgrade(self, sequence: u64) -> Self {
        Self::UpgradeError { sequence, source: Box::new(self) }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => fmtr.write_str(msg),
            Self::InvalidIdentifier(err) => fmt::Display::fmt(err, fmtr),
            Self::InvalidVersion(err) => fmt::Display::fmt(err, fmtr),
            Self::App(err) => fmt::Display::fmt(err, fmtr),
            Self::InvalidProof { path, reason } => {
                write!(fmtr, "invalid proof for {path}: {reason}")
            }
            Self::InvalidHeight { proof_height, latest_height } => write!(
                fmtr,
                "proof height {proof_height} is above client’s latest \
                 height {latest_height}"
            ),
            Self::DelayPeriodNotPassed {
                current_time,
                earliest_time,
                current_height,
                earliest_height,
            } => write!(
                fmtr,
                "delay period not passed: time {current_time} < \
                 {earliest_time} or height {current_height} < \
                 {earliest_height}"
            ),
            Self::InvalidConnectionState { connection_id, expected, got } => {
                write!(
                    fmtr,
                    "connection {connection_id}: expected {expected}, got \
                     {got}"
                )
            }
            Self::InvalidChannelState {
                port_id,
                channel_id,
                expected,
                got,
            } => write!(
                fmtr,
                "channel {port_id}/{channel_id}: expected one of {expected:?}, \
                 got {got}"
            ),
            Self::PacketSequenceOutOfOrder { expected, got } => write!(
                fmtr,
                "packet sequence out of order: expected {expected}, got {got}"
            ),
            Self::UpgradeError { sequence, source } => {
                write!(fmtr, "upgrade {sequence} failed: {source}")
            }
            err => write!(fmtr, "{}: {:?}", err.name(), err),
        }
    }
}

impl From<Error> for u32 {
    fn from(err: Error) -> u32 { err.code() }
}

impl From<&Error> for u32 {
    fn from(err: &Error) -> u32 { err.code() }
}

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::ClientNotFound(id) => Self::ClientNotFound(id),
            ClientError::ConsensusStateNotFound { client_id, height } => {
                Self::ConsensusStateNotFound { client_id, height }
            }
            ClientError::UnknownClientType(id) => Self::ClientNotFound(id),
            ClientError::InvalidSelfClient(msg) => Self::InvalidSelfClient(msg),
            ClientError::InvalidProof(reason) => {
                Self::InvalidProof { path: String::new(), reason }
            }
            ClientError::Decode(key) => Self::Decode { key },
        }
    }
}

#[test]
fn test_codes() {
    assert_eq!(0, Error::Internal("").code());
    assert_eq!("Internal", Error::Internal("").name());
    let err = Error::PacketSequenceOutOfOrder { expected: 2, got: 3 };
    assert_eq!("PacketSequenceOutOfOrder", err.name());
    assert_eq!(u32::from(&err), err.code());

    let err = Error::UpgradeTimeoutPassed.upgrade(4);
    assert_eq!("UpgradeError", err.name());
    assert_eq!(
        "upgrade 4 failed: UpgradeTimeoutPassed: UpgradeTimeoutPassed",
        err.to_string()
    );
}
