use ibc_ids::{ChannelId, ClientId, ConnectionId, PortId};

use crate::channel::{ChannelEnd, ErrorReceipt, Order, Packet, UpgradeFields};
use crate::error::Result;

/// Possible events emitted by the IBC core.
///
/// Events are collected in the context and can be serialised with borsh.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    derive_more::From,
)]
pub enum Event {
    Connection(ConnectionEvent),
    Channel(ChannelEvent),
    Packet(PacketEvent),
    Upgrade(UpgradeEvent),
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::IntoStaticStr,
)]
pub enum ConnectionEventKind {
    OpenInit,
    OpenTry,
    OpenAck,
    OpenConfirm,
}

/// Event emitted on every step of the connection handshake.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct ConnectionEvent {
    pub kind: ConnectionEventKind,
    pub connection_id: ConnectionId,
    pub client_id: ClientId,
    pub counterparty_client_id: ClientId,
    pub counterparty_connection_id: Option<ConnectionId>,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::IntoStaticStr,
)]
pub enum ChannelEventKind {
    OpenInit,
    OpenTry,
    OpenAck,
    OpenConfirm,
    CloseInit,
    CloseConfirm,
    /// Ordered channel closed due to a packet timeout.
    Closed,
}

/// Event emitted on every step of the channel handshake.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct ChannelEvent {
    pub kind: ChannelEventKind,
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub counterparty_port_id: PortId,
    pub counterparty_channel_id: Option<ChannelId>,
    pub connection_id: ConnectionId,
    pub version: String,
}

impl ChannelEvent {
    pub fn new(
        kind: ChannelEventKind,
        port_id: &PortId,
        channel_id: &ChannelId,
        channel: &ChannelEnd,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
            counterparty_port_id: channel.counterparty.port_id.clone(),
            counterparty_channel_id: channel.counterparty.channel_id.clone(),
            connection_id: channel.connection_id()?.clone(),
            version: channel.version.clone(),
        })
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::IntoStaticStr,
)]
pub enum PacketEventKind {
    Send,
    Recv,
    WriteAck,
    Ack,
    Timeout,
}

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct PacketEvent {
    pub kind: PacketEventKind,
    pub packet: Packet,
    pub ordering: Order,
    pub connection_id: ConnectionId,
    /// Acknowledgement for `WriteAck` events.
    pub acknowledgement: Option<Vec<u8>>,
}

impl PacketEvent {
    pub fn new(
        kind: PacketEventKind,
        packet: &Packet,
        channel: &ChannelEnd,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            packet: packet.clone(),
            ordering: channel.ordering,
            connection_id: channel.connection_id()?.clone(),
            acknowledgement: None,
        })
    }

    pub fn with_acknowledgement(self, ack: &[u8]) -> Self {
        Self { acknowledgement: Some(ack.to_vec()), ..self }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::IntoStaticStr,
)]
pub enum UpgradeEventKind {
    Init,
    Try,
    Ack,
    Confirm,
    FlushComplete,
    Open,
    Timeout,
    Cancel,
    /// Upgrade attempt failed and an error receipt was written.
    Error,
}

#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct UpgradeEvent {
    pub kind: UpgradeEventKind,
    pub port_id: PortId,
    pub channel_id: ChannelId,
    pub upgrade_sequence: u64,
    pub fields: Option<UpgradeFields>,
    pub error_receipt: Option<ErrorReceipt>,
}

impl UpgradeEvent {
    pub fn new(
        kind: UpgradeEventKind,
        port_id: &PortId,
        channel_id: &ChannelId,
        upgrade_sequence: u64,
    ) -> Self {
        Self {
            kind,
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
            upgrade_sequence,
            fields: None,
            error_receipt: None,
        }
    }

    pub fn with_fields(self, fields: &UpgradeFields) -> Self {
        Self { fields: Some(fields.clone()), ..self }
    }

    pub fn with_error_receipt(self, receipt: ErrorReceipt) -> Self {
        Self { error_receipt: Some(receipt), ..self }
    }
}
