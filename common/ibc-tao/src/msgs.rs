//! Messages accepted by the IBC core.
//!
//! Each message carries the claimed counterparty state and the proofs of it.
//! Messages are dispatched by [`crate::handler::deliver`].

use ibc_ids::{ChannelId, ClientId, ConnectionId, Height, PortId};

use crate::channel::{self, ErrorReceipt, Order, Packet, Upgrade, UpgradeFields};
use crate::config::UpdateConfig;
use crate::connection::{self, Version};

#[derive(Clone, Debug, PartialEq, Eq, derive_more::From)]
pub enum Msg {
    UpdateClient(MsgUpdateClient),
    UpdateConfig(MsgUpdateConfig),

    ConnectionOpenInit(MsgConnectionOpenInit),
    ConnectionOpenTry(MsgConnectionOpenTry),
    ConnectionOpenAck(MsgConnectionOpenAck),
    ConnectionOpenConfirm(MsgConnectionOpenConfirm),

    ChannelOpenInit(MsgChannelOpenInit),
    ChannelOpenTry(MsgChannelOpenTry),
    ChannelOpenAck(MsgChannelOpenAck),
    ChannelOpenConfirm(MsgChannelOpenConfirm),
    ChannelCloseInit(MsgChannelCloseInit),
    ChannelCloseConfirm(MsgChannelCloseConfirm),

    RecvPacket(MsgRecvPacket),
    Acknowledgement(MsgAcknowledgement),
    Timeout(MsgTimeout),
    TimeoutOnClose(MsgTimeoutOnClose),
    PruneAcknowledgements(MsgPruneAcknowledgements),

    ChannelUpgradeInit(MsgChannelUpgradeInit),
    ChannelUpgradeTry(MsgChannelUpgradeTry),
    ChannelUpgradeAck(MsgChannelUpgradeAck),
    ChannelUpgradeConfirm(MsgChannelUpgradeConfirm),
    ChannelUpgradeOpen(MsgChannelUpgradeOpen),
    ChannelUpgradeTimeout(MsgChannelUpgradeTimeout),
    ChannelUpgradeCancel(MsgChannelUpgradeCancel),
}

impl Msg {
    /// Returns name of the message used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateClient(_) => "UpdateClient",
            Self::UpdateConfig(_) => "UpdateConfig",
            Self::ConnectionOpenInit(_) => "ConnectionOpenInit",
            Self::ConnectionOpenTry(_) => "ConnectionOpenTry",
            Self::ConnectionOpenAck(_) => "ConnectionOpenAck",
            Self::ConnectionOpenConfirm(_) => "ConnectionOpenConfirm",
            Self::ChannelOpenInit(_) => "ChannelOpenInit",
            Self::ChannelOpenTry(_) => "ChannelOpenTry",
            Self::ChannelOpenAck(_) => "ChannelOpenAck",
            Self::ChannelOpenConfirm(_) => "ChannelOpenConfirm",
            Self::ChannelCloseInit(_) => "ChannelCloseInit",
            Self::ChannelCloseConfirm(_) => "ChannelCloseConfirm",
            Self::RecvPacket(_) => "RecvPacket",
            Self::Acknowledgement(_) => "Acknowledgement",
            Self::Timeout(_) => "Timeout",
            Self::TimeoutOnClose(_) => "TimeoutOnClose",
            Self::PruneAcknowledgements(_) => "PruneAcknowledgements",
            Self::ChannelUpgradeInit(_) => "ChannelUpgradeInit",
            Self::ChannelUpgradeTry(_) => "ChannelUpgradeTry",
            Self::ChannelUpgradeAck(_) => "ChannelUpgradeAck",
            Self::ChannelUpgradeConfirm(_) => "ChannelUpgradeConfirm",
            Self::ChannelUpgradeOpen(_) => "ChannelUpgradeOpen",
            Self::ChannelUpgradeTimeout(_) => "ChannelUpgradeTimeout",
            Self::ChannelUpgradeCancel(_) => "ChannelUpgradeCancel",
        }
    }
}

/// Outcome of a packet or upgrade message which doesn’t fail the
/// transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ResponseResult {
    Success,
    /// Upgrade step failed.  The upgrade was aborted and an error receipt
    /// written.
    Failure,
    /// Message had no effect since the packet has already been relayed.
    NoOp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Empty,
    ConnectionOpenInit { connection_id: ConnectionId },
    ConnectionOpenTry { connection_id: ConnectionId },
    ChannelOpenInit { channel_id: ChannelId, version: String },
    ChannelOpenTry { channel_id: ChannelId, version: String },
    Packet(ResponseResult),
    PruneAcknowledgements { pruned: u64, remaining: u64 },
    ChannelUpgradeInit { upgrade: Upgrade, upgrade_sequence: u64 },
    ChannelUpgradeTry {
        upgrade: Option<Upgrade>,
        upgrade_sequence: u64,
        result: ResponseResult,
    },
    Upgrade(ResponseResult),
}

// ==== Ambient ================================================================

/// Client updates are handled outside of the IBC core.  The message exists so
/// that relayers can bundle it with packet messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgUpdateClient {
    pub client_id: ClientId,
    pub client_message: Vec<u8>,
    pub signer: String,
}

/// Updates core parameters.  Only the authority may send it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgUpdateConfig {
    pub config: UpdateConfig,
    pub signer: String,
}

// ==== Connections ============================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenInit {
    pub client_id: ClientId,
    /// Counterparty whose connection id must be `None`.
    pub counterparty: connection::Counterparty,
    /// Version to offer.  All compatible versions are offered if `None`.
    pub version: Option<Version>,
    pub delay_period_ns: u64,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenTry {
    pub client_id: ClientId,
    /// Encoded client state the counterparty keeps for this chain.
    pub client_state: Vec<u8>,
    pub counterparty: connection::Counterparty,
    pub counterparty_versions: Vec<Version>,
    pub delay_period_ns: u64,
    pub proof_init: Vec<u8>,
    pub proof_client: Vec<u8>,
    pub proof_consensus: Vec<u8>,
    pub proof_height: Height,
    /// Height of this chain whose consensus state the counterparty stores.
    pub consensus_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenAck {
    pub connection_id: ConnectionId,
    pub counterparty_connection_id: ConnectionId,
    pub version: Version,
    pub client_state: Vec<u8>,
    pub proof_try: Vec<u8>,
    pub proof_client: Vec<u8>,
    pub proof_consensus: Vec<u8>,
    pub proof_height: Height,
    pub consensus_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgConnectionOpenConfirm {
    pub connection_id: ConnectionId,
    pub proof_ack: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

// ==== Channels ===============================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelOpenInit {
    pub port_id: PortId,
    pub ordering: Order,
    pub connection_hops: Vec<ConnectionId>,
    pub counterparty_port_id: PortId,
    pub version: String,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelOpenTry {
    pub port_id: PortId,
    pub ordering: Order,
    pub connection_hops: Vec<ConnectionId>,
    /// Counterparty with the channel id set.
    pub counterparty: channel::Counterparty,
    pub counterparty_version: String,
    pub proof_init: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelOpenAck {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_channel_id: ChannelId,
    pub counterparty_version: String,
    pub proof_try: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelOpenConfirm {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub proof_ack: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelCloseInit {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelCloseConfirm {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub proof_init: Vec<u8>,
    pub proof_height: Height,
    pub counterparty_upgrade_sequence: u64,
    pub signer: String,
}

// ==== Packets ================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgRecvPacket {
    pub packet: Packet,
    pub proof_commitment: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgAcknowledgement {
    pub packet: Packet,
    pub acknowledgement: Vec<u8>,
    pub proof_acked: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgTimeout {
    pub packet: Packet,
    /// Counterparty’s next receive sequence.  Only used on ordered channels.
    pub next_sequence_recv: u64,
    pub proof_unreceived: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgTimeoutOnClose {
    pub packet: Packet,
    pub next_sequence_recv: u64,
    pub proof_unreceived: Vec<u8>,
    pub proof_close: Vec<u8>,
    pub proof_height: Height,
    pub counterparty_upgrade_sequence: u64,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgPruneAcknowledgements {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub limit: u64,
    pub signer: String,
}

// ==== Upgrades ===============================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeInit {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub fields: UpgradeFields,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeTry {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub proposed_upgrade_connection_hops: Vec<ConnectionId>,
    pub counterparty_upgrade_fields: UpgradeFields,
    pub counterparty_upgrade_sequence: u64,
    pub proof_channel: Vec<u8>,
    pub proof_upgrade: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeAck {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_upgrade: Upgrade,
    pub proof_channel: Vec<u8>,
    pub proof_upgrade: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeConfirm {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_channel_state: channel::State,
    pub counterparty_upgrade: Upgrade,
    pub proof_channel: Vec<u8>,
    pub proof_upgrade: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeOpen {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_channel_state: channel::State,
    pub proof_channel: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeTimeout {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_channel: channel::ChannelEnd,
    pub proof_channel: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgChannelUpgradeCancel {
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub error_receipt: ErrorReceipt,
    /// Proof of the counterparty’s error receipt.  May be empty if the signer
    /// is the authority.
    pub proof_error_receipt: Vec<u8>,
    pub proof_height: Height,
    pub signer: String,
}
