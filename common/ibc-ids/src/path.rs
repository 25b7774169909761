use alloc::string::String;
use alloc::vec::Vec;

use crate::{ChannelId, ClientId, ConnectionId, Height, PortId};

/// Key of an entry in the provable IBC store.
///
/// The textual form follows ICS-24 so that proofs generated by one chain can
/// be verified by a counterparty using the same layout.
#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Path {
    #[display(fmt = "clients/{}/clientState", _0)]
    ClientState(ClientId),
    #[display(fmt = "clients/{}/consensusStates/{}", _0, _1)]
    ConsensusState(ClientId, Height),
    #[display(fmt = "clients/{}/consensusStates/{}/processedTime", _0, _1)]
    ProcessedTime(ClientId, Height),
    #[display(fmt = "clients/{}/consensusStates/{}/processedHeight", _0, _1)]
    ProcessedHeight(ClientId, Height),
    #[display(fmt = "clients/{}/connections", _0)]
    ClientConnections(ClientId),

    #[display(fmt = "connections/{}", _0)]
    Connection(ConnectionId),
    #[display(fmt = "nextConnectionSequence")]
    NextConnectionSequence,

    #[display(fmt = "channelEnds/ports/{}/channels/{}", _0, _1)]
    ChannelEnd(PortId, ChannelId),
    #[display(fmt = "nextChannelSequence")]
    NextChannelSequence,
    #[display(fmt = "nextSequenceSend/ports/{}/channels/{}", _0, _1)]
    NextSequenceSend(PortId, ChannelId),
    #[display(fmt = "nextSequenceRecv/ports/{}/channels/{}", _0, _1)]
    NextSequenceRecv(PortId, ChannelId),
    #[display(fmt = "nextSequenceAck/ports/{}/channels/{}", _0, _1)]
    NextSequenceAck(PortId, ChannelId),

    #[display(
        fmt = "commitments/ports/{}/channels/{}/sequences/{}",
        _0,
        _1,
        _2
    )]
    Commitment(PortId, ChannelId, u64),
    #[display(fmt = "acks/ports/{}/channels/{}/sequences/{}", _0, _1, _2)]
    Ack(PortId, ChannelId, u64),
    #[display(fmt = "receipts/ports/{}/channels/{}/sequences/{}", _0, _1, _2)]
    Receipt(PortId, ChannelId, u64),

    #[display(fmt = "channelUpgrades/upgrades/ports/{}/channels/{}", _0, _1)]
    Upgrade(PortId, ChannelId),
    #[display(
        fmt = "channelUpgrades/upgradeError/ports/{}/channels/{}",
        _0,
        _1
    )]
    UpgradeError(PortId, ChannelId),
    #[display(
        fmt = "channelUpgrades/counterpartyUpgrade/ports/{}/channels/{}",
        _0,
        _1
    )]
    CounterpartyUpgrade(PortId, ChannelId),
    #[display(fmt = "recvStartSequence/ports/{}/channels/{}", _0, _1)]
    RecvStartSequence(PortId, ChannelId),
    #[display(fmt = "pruningSequenceStart/ports/{}/channels/{}", _0, _1)]
    PruningSequenceStart(PortId, ChannelId),
}

impl Path {
    /// Returns the path as a store key.
    #[inline]
    pub fn to_key(&self) -> String { alloc::string::ToString::to_string(self) }

    /// Returns the path as raw bytes as used in merkle paths.
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> { self.to_key().into_bytes() }

    /// Returns common prefix of all packet commitment keys of given channel.
    ///
    /// Used to iterate over in-flight packets.
    pub fn commitments_prefix(
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> String {
        alloc::format!(
            "commitments/ports/{port_id}/channels/{channel_id}/sequences/"
        )
    }
}

impl From<Path> for String {
    #[inline]
    fn from(path: Path) -> String { path.to_key() }
}

#[test]
fn test_paths() {
    use core::str::FromStr;

    let client = ClientId::from_str("07-tendermint-0").unwrap();
    let port = PortId::transfer();
    let chan = ChannelId::new(3);
    let height = Height::new(1, 42);

    let paths = [
        Path::ClientState(client.clone()),
        Path::ConsensusState(client.clone(), height),
        Path::ProcessedTime(client.clone(), height),
        Path::ProcessedHeight(client.clone(), height),
        Path::ClientConnections(client),
        Path::Connection(ConnectionId::new(0)),
        Path::NextConnectionSequence,
        Path::ChannelEnd(port.clone(), chan.clone()),
        Path::NextChannelSequence,
        Path::NextSequenceSend(port.clone(), chan.clone()),
        Path::NextSequenceRecv(port.clone(), chan.clone()),
        Path::NextSequenceAck(port.clone(), chan.clone()),
        Path::Commitment(port.clone(), chan.clone(), 7),
        Path::Ack(port.clone(), chan.clone(), 7),
        Path::Receipt(port.clone(), chan.clone(), 7),
        Path::Upgrade(port.clone(), chan.clone()),
        Path::UpgradeError(port.clone(), chan.clone()),
        Path::CounterpartyUpgrade(port.clone(), chan.clone()),
        Path::RecvStartSequence(port.clone(), chan.clone()),
        Path::PruningSequenceStart(port, chan),
    ];
    let got = paths.iter().map(Path::to_key).collect::<Vec<_>>().join("\n");
    insta::assert_snapshot!(got, @r###"
    clients/07-tendermint-0/clientState
    clients/07-tendermint-0/consensusStates/1-42
    clients/07-tendermint-0/consensusStates/1-42/processedTime
    clients/07-tendermint-0/consensusStates/1-42/processedHeight
    clients/07-tendermint-0/connections
    connections/connection-0
    nextConnectionSequence
    channelEnds/ports/transfer/channels/channel-3
    nextChannelSequence
    nextSequenceSend/ports/transfer/channels/channel-3
    nextSequenceRecv/ports/transfer/channels/channel-3
    nextSequenceAck/ports/transfer/channels/channel-3
    commitments/ports/transfer/channels/channel-3/sequences/7
    acks/ports/transfer/channels/channel-3/sequences/7
    receipts/ports/transfer/channels/channel-3/sequences/7
    channelUpgrades/upgrades/ports/transfer/channels/channel-3
    channelUpgrades/upgradeError/ports/transfer/channels/channel-3
    channelUpgrades/counterpartyUpgrade/ports/transfer/channels/channel-3
    recvStartSequence/ports/transfer/channels/channel-3
    pruningSequenceStart/ports/transfer/channels/channel-3
    "###);

    let prefix =
        Path::commitments_prefix(&PortId::transfer(), &ChannelId::new(3));
    assert!(paths[12].to_key().starts_with(&prefix));
}
