use core::time::Duration;

use anyhow::Result;
use borsh::BorshDeserialize;
use ibc_ids::{
    ChannelId, ClientId, ConnectionId, Height, MerklePrefix, Path, PortId,
    Timestamp,
};
use pretty_assertions::assert_eq;

use crate::ante::{check_tx, TxMode};
use crate::channel::{
    packet, ChannelEnd, Counterparty, ErrorReceipt, Order, Packet, State,
    Upgrade, UpgradeFields,
};
use crate::connection::{
    self, create_localhost_connection, Version, VersionError,
};
use crate::error::Error;
use crate::events::{ChannelEventKind, Event, UpgradeEventKind};
use crate::mocks::{
    MockApp, MockChain, MockClientState, AUTHORITY, MODULE_ID, RELAYER,
};
use crate::msgs::*;

const VERSION: &str = "ics20-1";
const HOUR: Duration = Duration::from_secs(3600);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn transfer() -> PortId { PortId::transfer() }

fn prefix() -> MerklePrefix { MerklePrefix::new(*b"ibc").unwrap() }

/// Two chains with clients of each other and an open connection.
struct Setup {
    a: MockChain,
    b: MockChain,
    a_client: ClientId,
    b_client: ClientId,
    a_conn: ConnectionId,
    b_conn: ConnectionId,
}

/// Returns height of the counterparty’s consensus state the client tracks
/// at given height of the chain.
fn client_height(
    chain: &MockChain,
    height: Height,
    client_id: &ClientId,
) -> Height {
    let path = Path::ClientState(client_id.clone());
    let bytes = chain.value_at(height, &path).unwrap();
    MockClientState::try_from_slice(&bytes).unwrap().latest_height
}

/// Two chains with clients of each other and a connection initialised on
/// chain A.
struct Init {
    a: MockChain,
    b: MockChain,
    a_client: ClientId,
    b_client: ClientId,
    a_conn: ConnectionId,
    delay_period_ns: u64,
}

impl Init {
    fn new(delay: Duration) -> Self {
        init_logger();
        let mut a = MockChain::new("chain-a");
        let mut b = MockChain::new("chain-b");
        a.commit();
        b.commit();
        let a_client = a.create_client(&b);
        let b_client = b.create_client(&a);
        let delay_period_ns = delay.as_nanos() as u64;

        let res = a.deliver(MsgConnectionOpenInit {
            client_id: a_client.clone(),
            counterparty: connection::Counterparty {
                client_id: b_client.clone(),
                connection_id: None,
                prefix: prefix(),
            },
            version: None,
            delay_period_ns,
            signer: RELAYER.into(),
        });
        let Ok(Response::ConnectionOpenInit { connection_id: a_conn }) = res
        else {
            panic!("unexpected response: {res:?}");
        };
        Self { a, b, a_client, b_client, a_conn, delay_period_ns }
    }

    /// Commits chain A, updates B’s client of it and returns ConnOpenTry
    /// proving A’s end.
    fn try_msg(&mut self) -> MsgConnectionOpenTry {
        let (a, b) = (&mut self.a, &mut self.b);
        let height = b.sync(&self.b_client, a);
        let proof = a.proof(height);
        let client_path = Path::ClientState(self.a_client.clone());
        MsgConnectionOpenTry {
            client_id: self.b_client.clone(),
            client_state: a.value_at(height, &client_path).unwrap(),
            counterparty: connection::Counterparty {
                client_id: self.a_client.clone(),
                connection_id: Some(self.a_conn.clone()),
                prefix: prefix(),
            },
            counterparty_versions: a
                .ctx
                .connection(&self.a_conn)
                .unwrap()
                .versions,
            delay_period_ns: self.delay_period_ns,
            proof_init: proof.clone(),
            proof_client: proof.clone(),
            proof_consensus: proof,
            proof_height: height,
            consensus_height: client_height(a, height, &self.a_client),
            signer: RELAYER.into(),
        }
    }
}

impl Setup {
    fn new() -> Self { Self::with_delay(Duration::ZERO) }

    fn with_delay(delay: Duration) -> Self {
        let mut s = Self::with_try(delay);

        let height = s.sync_a();
        let proof = s.b.proof(height);
        let b_end = s.b.ctx.connection(&s.b_conn).unwrap();
        let client_path = Path::ClientState(s.b_client.clone());
        s.a.deliver(MsgConnectionOpenAck {
            connection_id: s.a_conn.clone(),
            counterparty_connection_id: s.b_conn.clone(),
            version: b_end.versions[0].clone(),
            client_state: s.b.value_at(height, &client_path).unwrap(),
            proof_try: proof.clone(),
            proof_client: proof.clone(),
            proof_consensus: proof,
            proof_height: height,
            consensus_height: client_height(&s.b, height, &s.b_client),
            signer: RELAYER.into(),
        })
        .unwrap();

        let height = s.sync_b();
        s.b.deliver(MsgConnectionOpenConfirm {
            connection_id: s.b_conn.clone(),
            proof_ack: s.a.proof(height),
            proof_height: height,
            signer: RELAYER.into(),
        })
        .unwrap();

        s
    }

    /// Runs the connection handshake up to ConnOpenTry leaving chain A’s end
    /// in INIT and chain B’s in TRYOPEN.
    fn with_try(delay: Duration) -> Self {
        let mut init = Init::new(delay);
        let msg = init.try_msg();
        let Init { a, mut b, a_client, b_client, a_conn, .. } = init;
        let res = b.deliver(msg);
        let Ok(Response::ConnectionOpenTry { connection_id: b_conn }) = res
        else {
            panic!("unexpected response: {res:?}");
        };
        Self { a, b, a_client, b_client, a_conn, b_conn }
    }

    /// Commits chain A and updates B’s client of it.
    fn sync_b(&mut self) -> Height { self.b.sync(&self.b_client, &mut self.a) }

    /// Commits chain B and updates A’s client of it.
    fn sync_a(&mut self) -> Height { self.a.sync(&self.a_client, &mut self.b) }

    /// Opens a channel between transfer ports of both chains.
    fn open_channel(&mut self, ordering: Order) -> (ChannelId, ChannelId) {
        let res = self.a.deliver(MsgChannelOpenInit {
            port_id: transfer(),
            ordering,
            connection_hops: vec![self.a_conn.clone()],
            counterparty_port_id: transfer(),
            version: VERSION.into(),
            signer: RELAYER.into(),
        });
        let Ok(Response::ChannelOpenInit { channel_id: a_chan, .. }) = res
        else {
            panic!("unexpected response: {res:?}");
        };

        let height = self.sync_b();
        let res = self.b.deliver(MsgChannelOpenTry {
            port_id: transfer(),
            ordering,
            connection_hops: vec![self.b_conn.clone()],
            counterparty: Counterparty::new(transfer(), Some(a_chan.clone())),
            counterparty_version: VERSION.into(),
            proof_init: self.a.proof(height),
            proof_height: height,
            signer: RELAYER.into(),
        });
        let Ok(Response::ChannelOpenTry { channel_id: b_chan, .. }) = res else {
            panic!("unexpected response: {res:?}");
        };

        let height = self.sync_a();
        self.a
            .deliver(MsgChannelOpenAck {
                port_id: transfer(),
                channel_id: a_chan.clone(),
                counterparty_channel_id: b_chan.clone(),
                counterparty_version: VERSION.into(),
                proof_try: self.b.proof(height),
                proof_height: height,
                signer: RELAYER.into(),
            })
            .unwrap();

        let height = self.sync_b();
        self.b
            .deliver(MsgChannelOpenConfirm {
                port_id: transfer(),
                channel_id: b_chan.clone(),
                proof_ack: self.a.proof(height),
                proof_height: height,
                signer: RELAYER.into(),
            })
            .unwrap();

        (a_chan, b_chan)
    }
}

fn send(chain: &mut MockChain, channel_id: &ChannelId, data: &[u8]) -> Packet {
    let timeout = chain.ctx.host.timestamp.add(24 * HOUR);
    send_with_timeout(chain, channel_id, data, Height::ZERO, timeout)
}

fn send_with_timeout(
    chain: &mut MockChain,
    channel_id: &ChannelId,
    data: &[u8],
    timeout_height: Height,
    timeout_timestamp: Timestamp,
) -> Packet {
    let sequence = packet::send_packet(
        &mut chain.ctx,
        MODULE_ID,
        &transfer(),
        channel_id,
        timeout_height,
        timeout_timestamp,
        data.to_vec(),
    )
    .unwrap();
    let channel = chain.ctx.channel(&transfer(), channel_id).unwrap();
    Packet {
        sequence,
        source_port: transfer(),
        source_channel: channel_id.clone(),
        dest_port: channel.counterparty.port_id.clone(),
        dest_channel: channel.counterparty.channel_id.clone().unwrap(),
        data: data.to_vec(),
        timeout_height,
        timeout_timestamp,
    }
}

fn recv_msg(
    source: &MockChain,
    height: Height,
    packet: &Packet,
) -> MsgRecvPacket {
    MsgRecvPacket {
        packet: packet.clone(),
        proof_commitment: source.proof(height),
        proof_height: height,
        signer: RELAYER.into(),
    }
}

fn ack_msg(
    dest: &MockChain,
    height: Height,
    packet: &Packet,
    ack: &[u8],
) -> MsgAcknowledgement {
    MsgAcknowledgement {
        packet: packet.clone(),
        acknowledgement: ack.to_vec(),
        proof_acked: dest.proof(height),
        proof_height: height,
        signer: RELAYER.into(),
    }
}

fn channel(chain: &MockChain, channel_id: &ChannelId) -> ChannelEnd {
    chain.ctx.channel(&transfer(), channel_id).unwrap()
}

fn has(chain: &MockChain, path: Path) -> bool { chain.ctx.store.has(&path) }

/// Returns all entries of the chain’s store.
fn dump(chain: &MockChain) -> Vec<(String, Vec<u8>)> {
    let iter = chain.ctx.store.iter();
    iter.map(|(key, value)| (key.to_owned(), value.to_vec())).collect()
}

// ==== Handshakes =============================================================

#[test]
fn test_handshakes() {
    let mut s = Setup::new();
    let a_end = s.a.ctx.connection(&s.a_conn).unwrap();
    let b_end = s.b.ctx.connection(&s.b_conn).unwrap();
    assert_eq!(connection::State::Open, a_end.state);
    assert_eq!(connection::State::Open, b_end.state);
    assert_eq!(a_end.versions, b_end.versions);
    assert_eq!(Some(&s.b_conn), a_end.counterparty.connection_id.as_ref());
    assert_eq!(Some(&s.a_conn), b_end.counterparty.connection_id.as_ref());
    let connections = s.a.ctx.client_connections(&s.a_client).unwrap();
    assert_eq!(vec![s.a_conn.clone()], connections);

    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let (a_end, b_end) = (channel(&s.a, &a_chan), channel(&s.b, &b_chan));
    assert_eq!(State::Open, a_end.state);
    assert_eq!(State::Open, b_end.state);
    assert_eq!(Some(&b_chan), a_end.counterparty.channel_id.as_ref());
    assert_eq!(Some(&a_chan), b_end.counterparty.channel_id.as_ref());
    assert_eq!(VERSION, a_end.version);
    assert_eq!(VERSION, b_end.version);
    let module = crate::router::lookup_module_by_channel(
        &s.a.ctx.store,
        &transfer(),
        &a_chan,
    );
    assert_eq!(Some(MODULE_ID), module);
}

#[test]
fn test_connection_ack_requires_init_state() {
    let mut s = Setup::new();
    let height = s.sync_a();
    let proof = s.b.proof(height);
    let err = s
        .a
        .deliver(MsgConnectionOpenAck {
            connection_id: s.a_conn.clone(),
            counterparty_connection_id: s.b_conn.clone(),
            version: s.b.ctx.connection(&s.b_conn).unwrap().versions[0].clone(),
            client_state: Vec::new(),
            proof_try: proof.clone(),
            proof_client: proof.clone(),
            proof_consensus: proof,
            proof_height: height,
            consensus_height: Height::new(0, 1),
            signer: RELAYER.into(),
        })
        .unwrap_err();
    assert_eq!(
        Error::InvalidConnectionState {
            connection_id: s.a_conn.clone(),
            expected: connection::State::Init,
            got: connection::State::Open,
        },
        err
    );
}

#[test]
fn test_connection_ack_on_tryopen_end() {
    let mut s = Setup::with_try(Duration::ZERO);
    let height = s.sync_b();
    let proof = s.a.proof(height);
    let a_end = s.a.ctx.connection(&s.a_conn).unwrap();
    let err = s
        .b
        .deliver(MsgConnectionOpenAck {
            connection_id: s.b_conn.clone(),
            counterparty_connection_id: s.a_conn.clone(),
            version: a_end.versions[0].clone(),
            client_state: Vec::new(),
            proof_try: proof.clone(),
            proof_client: proof.clone(),
            proof_consensus: proof,
            proof_height: height,
            consensus_height: Height::new(0, 1),
            signer: RELAYER.into(),
        })
        .unwrap_err();
    assert_eq!(
        Error::InvalidConnectionState {
            connection_id: s.b_conn.clone(),
            expected: connection::State::Init,
            got: connection::State::TryOpen,
        },
        err
    );
    let b_end = s.b.ctx.connection(&s.b_conn).unwrap();
    assert_eq!(connection::State::TryOpen, b_end.state);
}

#[test]
fn test_connection_try_rejects_malformed_counterparty() {
    let mut init = Init::new(Duration::ZERO);
    let msg = init.try_msg();
    let before = dump(&init.b);

    let mut bad = msg.clone();
    bad.counterparty.connection_id = None;
    assert_eq!(
        Err(Error::InvalidCounterparty("connection id not set")),
        init.b.deliver(bad)
    );

    let bad = MsgConnectionOpenTry {
        counterparty_versions: Vec::new(),
        ..msg.clone()
    };
    assert_eq!(
        Err(Error::InvalidVersion(VersionError::NoVersions)),
        init.b.deliver(bad)
    );

    let bad = MsgConnectionOpenTry {
        counterparty_versions: vec![Version::new(" ", Vec::new())],
        ..msg.clone()
    };
    assert_eq!(
        Err(Error::InvalidVersion(VersionError::BlankIdentifier)),
        init.b.deliver(bad)
    );

    let mut bad = msg.clone();
    bad.counterparty_versions[0].features.push(String::new());
    assert_eq!(
        Err(Error::InvalidVersion(VersionError::BlankFeature("1".into()))),
        init.b.deliver(bad)
    );
    assert_eq!(before, dump(&init.b));

    let res = init.b.deliver(msg);
    assert!(matches!(res, Ok(Response::ConnectionOpenTry { .. })), "{res:?}");
}

#[test]
fn test_channel_confirm_requires_tryopen_state() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let height = s.sync_a();
    let err = s
        .a
        .deliver(MsgChannelOpenConfirm {
            port_id: transfer(),
            channel_id: a_chan.clone(),
            proof_ack: s.b.proof(height),
            proof_height: height,
            signer: RELAYER.into(),
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChannelState { got: State::Open, .. }));
}

#[test]
fn test_channel_try_with_bad_proof_changes_nothing() {
    let mut s = Setup::new();
    s.a.deliver(MsgChannelOpenInit {
        port_id: transfer(),
        ordering: Order::Unordered,
        connection_hops: vec![s.a_conn.clone()],
        counterparty_port_id: transfer(),
        version: VERSION.into(),
        signer: RELAYER.into(),
    })
    .unwrap();
    let height = s.sync_b();
    let before = dump(&s.b);
    let err = s
        .b
        .deliver(MsgChannelOpenTry {
            port_id: transfer(),
            ordering: Order::Unordered,
            connection_hops: vec![s.b_conn.clone()],
            counterparty: Counterparty::new(
                transfer(),
                Some(ChannelId::new(0)),
            ),
            // Counterparty proposed a different version.
            counterparty_version: "ics20-2".into(),
            proof_init: s.a.proof(height),
            proof_height: height,
            signer: RELAYER.into(),
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidProof { .. }), "{err:?}");
    assert_eq!(before, dump(&s.b));
}

#[test]
fn test_close_channel() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    s.a.deliver(MsgChannelCloseInit {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        signer: RELAYER.into(),
    })
    .unwrap();
    assert_eq!(State::Closed, channel(&s.a, &a_chan).state);

    let height = s.sync_b();
    s.b.deliver(MsgChannelCloseConfirm {
        port_id: transfer(),
        channel_id: b_chan.clone(),
        proof_init: s.a.proof(height),
        proof_height: height,
        counterparty_upgrade_sequence: 0,
        signer: RELAYER.into(),
    })
    .unwrap();
    assert_eq!(State::Closed, channel(&s.b, &b_chan).state);

    // Closed channels cannot be closed again.
    let err = s
        .a
        .deliver(MsgChannelCloseInit {
            port_id: transfer(),
            channel_id: a_chan,
            signer: RELAYER.into(),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidChannelState { got: State::Closed, .. }
    ));
}

#[test]
fn test_frozen_client_blocks_sending() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    s.a.freeze_client(&s.a_client);
    let err = packet::send_packet(
        &mut s.a.ctx,
        MODULE_ID,
        &transfer(),
        &a_chan,
        Height::ZERO,
        Timestamp::from_nanos(u64::MAX),
        b"hello".to_vec(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ClientNotActive { .. }), "{err:?}");
}

#[test]
fn test_send_requires_channel_owner() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let err = packet::send_packet(
        &mut s.a.ctx,
        "intruder",
        &transfer(),
        &a_chan,
        Height::ZERO,
        Timestamp::from_nanos(u64::MAX),
        b"hello".to_vec(),
    )
    .unwrap_err();
    let want = Error::Unauthorized { port_id: transfer(), channel_id: a_chan };
    assert_eq!(want, err);
}

// ==== Packets ================================================================

#[test]
fn test_packet_round_trip() -> Result<()> {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"hello");
    assert_eq!(1, packet.sequence);
    let commitment = Path::Commitment(transfer(), a_chan.clone(), 1);
    assert!(has(&s.a, commitment.clone()));

    let height = s.sync_b();
    let res = s.b.deliver(recv_msg(&s.a, height, &packet))?;
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert!(has(&s.b, Path::Receipt(transfer(), b_chan.clone(), 1)));
    assert!(has(&s.b, Path::Ack(transfer(), b_chan.clone(), 1)));
    assert_eq!(1, MockApp::counter(&s.b.ctx.store, "recv"));

    // Relaying the same packet again is a no-op.
    let (before, events) = (dump(&s.b), s.b.ctx.events().len());
    let res = s.b.deliver(recv_msg(&s.a, height, &packet))?;
    assert_eq!(Response::Packet(ResponseResult::NoOp), res);
    assert_eq!(before, dump(&s.b));
    assert_eq!(events, s.b.ctx.events().len());
    assert_eq!(1, MockApp::counter(&s.b.ctx.store, "recv"));

    let height = s.sync_a();
    let res = s.a.deliver(ack_msg(&s.b, height, &packet, b"ok"))?;
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert!(!has(&s.a, commitment));
    assert_eq!(1, MockApp::counter(&s.a.ctx.store, "ack"));

    let (before, events) = (dump(&s.a), s.a.ctx.events().len());
    let res = s.a.deliver(ack_msg(&s.b, height, &packet, b"ok"))?;
    assert_eq!(Response::Packet(ResponseResult::NoOp), res);
    assert_eq!(before, dump(&s.a));
    assert_eq!(events, s.a.ctx.events().len());
    assert_eq!(1, MockApp::counter(&s.a.ctx.store, "ack"));
    Ok(())
}

#[test]
fn test_ack_with_wrong_acknowledgement() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"hello");
    let height = s.sync_b();
    s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    let height = s.sync_a();
    let msg = ack_msg(&s.b, height, &packet, b"forged");
    let err = s.a.deliver(msg).unwrap_err();
    assert!(matches!(err, Error::InvalidProof { .. }), "{err:?}");
    assert!(has(&s.a, Path::Commitment(transfer(), a_chan, 1)));
}

#[test]
fn test_recv_with_tampered_packet() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let mut packet = send(&mut s.a, &a_chan, b"hello");
    let height = s.sync_b();
    packet.data = b"HELLO".to_vec();
    let err = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap_err();
    assert!(matches!(err, Error::InvalidProof { .. }), "{err:?}");
}

#[test]
fn test_error_acknowledgement_discards_app_state() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"error");
    let height = s.sync_b();
    let res = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert!(s.b.ctx.store.get(MockApp::SIDE_EFFECT_KEY).is_none());
    assert!(has(&s.b, Path::Receipt(transfer(), b_chan.clone(), 1)));
    assert_eq!(
        Some(crate::channel::ack_commitment(b"error").as_slice()),
        s.b.ctx.store.get_raw(&Path::Ack(transfer(), b_chan, 1))
    );
}

#[test]
fn test_async_acknowledgement() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"async");
    let height = s.sync_b();
    s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    let ack_path = Path::Ack(transfer(), b_chan.clone(), 1);
    assert!(!has(&s.b, ack_path.clone()));

    packet::write_acknowledgement(&mut s.b.ctx, MODULE_ID, &packet, b"late")
        .unwrap();
    assert!(has(&s.b, ack_path));
    assert_eq!(
        Err(Error::AcknowledgementExists { sequence: 1 }),
        packet::write_acknowledgement(&mut s.b.ctx, MODULE_ID, &packet, b"late")
    );

    let height = s.sync_a();
    let res = s.a.deliver(ack_msg(&s.b, height, &packet, b"late")).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
}

#[test]
fn test_ordered_delivery() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Ordered);
    let first = send(&mut s.a, &a_chan, b"one");
    let second = send(&mut s.a, &a_chan, b"two");
    let height = s.sync_b();

    let err = s.b.deliver(recv_msg(&s.a, height, &second)).unwrap_err();
    assert_eq!(Error::PacketSequenceOutOfOrder { expected: 1, got: 2 }, err);

    let res = s.b.deliver(recv_msg(&s.a, height, &first)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    let res = s.b.deliver(recv_msg(&s.a, height, &first)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::NoOp), res);
    let res = s.b.deliver(recv_msg(&s.a, height, &second)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);

    let next_recv = Path::NextSequenceRecv(transfer(), b_chan);
    assert_eq!(3, s.b.ctx.store.sequence(&next_recv).unwrap());

    // Acknowledgements must be processed in order as well.
    let height = s.sync_a();
    let err = s.a.deliver(ack_msg(&s.b, height, &second, b"ok")).unwrap_err();
    assert_eq!(Error::PacketSequenceOutOfOrder { expected: 1, got: 2 }, err);
    s.a.deliver(ack_msg(&s.b, height, &first, b"ok")).unwrap();
    s.a.deliver(ack_msg(&s.b, height, &second, b"ok")).unwrap();
    let next_ack = Path::NextSequenceAck(transfer(), a_chan);
    assert_eq!(3, s.a.ctx.store.sequence(&next_ack).unwrap());
}

#[test]
fn test_delay_period() {
    let mut s = Setup::with_delay(HOUR);
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"hello");
    let height = s.sync_b();

    let err = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap_err();
    assert!(matches!(err, Error::DelayPeriodNotPassed { .. }), "{err:?}");

    s.b.advance_time(2 * HOUR);
    let res = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
}

#[test]
fn test_recv_of_timed_out_packet() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let timeout = s.b.height().add(2);
    let packet = send_with_timeout(
        &mut s.a,
        &a_chan,
        b"hello",
        timeout,
        Timestamp::ZERO,
    );
    s.b.commit();
    s.b.commit();
    let height = s.sync_b();
    let err = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap_err();
    assert_eq!(Error::PacketTimedOut { sequence: 1 }, err);
}

fn timeout_msg(
    dest: &MockChain,
    height: Height,
    packet: &Packet,
    next: u64,
) -> MsgTimeout {
    MsgTimeout {
        packet: packet.clone(),
        next_sequence_recv: next,
        proof_unreceived: dest.proof(height),
        proof_height: height,
        signer: RELAYER.into(),
    }
}

#[test]
fn test_timeout_unordered() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let timeout = s.b.height().add(2);
    let packet = send_with_timeout(
        &mut s.a,
        &a_chan,
        b"hello",
        timeout,
        Timestamp::ZERO,
    );

    // Not yet timed out.
    let height = s.sync_a();
    let err = s.a.deliver(timeout_msg(&s.b, height, &packet, 1)).unwrap_err();
    assert_eq!(Error::TimeoutNotReached { sequence: 1 }, err);

    s.b.commit();
    let height = s.sync_a();
    assert!(height >= timeout);
    let res = s.a.deliver(timeout_msg(&s.b, height, &packet, 1)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert!(!has(&s.a, Path::Commitment(transfer(), a_chan.clone(), 1)));
    assert_eq!(1, MockApp::counter(&s.a.ctx.store, "timeout"));
    assert_eq!(State::Open, channel(&s.a, &a_chan).state);

    let res = s.a.deliver(timeout_msg(&s.b, height, &packet, 1)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::NoOp), res);
}

#[test]
fn test_timeout_of_received_packet() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let timeout = s.b.height().add(3);
    let packet = send_with_timeout(
        &mut s.a,
        &a_chan,
        b"hello",
        timeout,
        Timestamp::ZERO,
    );
    let height = s.sync_b();
    s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    s.b.commit();
    s.b.commit();
    let height = s.sync_a();
    let err = s.a.deliver(timeout_msg(&s.b, height, &packet, 1)).unwrap_err();
    assert!(matches!(err, Error::InvalidProof { .. }), "{err:?}");
}

#[test]
fn test_timeout_ordered_closes_channel() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Ordered);
    let timeout = s.b.height().add(2);
    let first =
        send_with_timeout(&mut s.a, &a_chan, b"one", timeout, Timestamp::ZERO);
    let second =
        send_with_timeout(&mut s.a, &a_chan, b"two", timeout, Timestamp::ZERO);
    s.b.commit();
    s.b.commit();
    let height = s.sync_a();

    let err = s.a.deliver(timeout_msg(&s.b, height, &first, 2)).unwrap_err();
    assert_eq!(
        Error::PacketReceived { sequence: 1, next_sequence_recv: 2 },
        err
    );

    let res = s.a.deliver(timeout_msg(&s.b, height, &first, 1)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert_eq!(State::Closed, channel(&s.a, &a_chan).state);
    assert_eq!(1, closed_events(&s.a));

    // Timing out the remaining packet doesn’t close the channel again.
    s.a.ctx.take_events();
    let res = s.a.deliver(timeout_msg(&s.b, height, &second, 1)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert!(!has(&s.a, Path::Commitment(transfer(), a_chan.clone(), 2)));
    assert_eq!(State::Closed, channel(&s.a, &a_chan).state);
    assert_eq!(0, closed_events(&s.a));
}

fn closed_events(chain: &MockChain) -> usize {
    chain
        .ctx
        .events()
        .iter()
        .filter(|event| {
            matches!(event, Event::Channel(event)
                     if event.kind == ChannelEventKind::Closed)
        })
        .count()
}

#[test]
fn test_timeout_proof_above_client_height() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let timeout = s.b.height().add(1);
    let packet = send_with_timeout(
        &mut s.a,
        &a_chan,
        b"hello",
        timeout,
        Timestamp::ZERO,
    );
    let height = s.sync_a();
    let proof_height = height.add(5);
    let msg = MsgTimeout {
        proof_height,
        ..timeout_msg(&s.b, height, &packet, 1)
    };
    let err = s.a.deliver(msg).unwrap_err();
    assert_eq!(
        Error::InvalidHeight { proof_height, latest_height: height },
        err
    );
}

#[test]
fn test_timeout_on_close() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"hello");
    s.b.deliver(MsgChannelCloseInit {
        port_id: transfer(),
        channel_id: b_chan,
        signer: RELAYER.into(),
    })
    .unwrap();

    let height = s.sync_a();
    let proof = s.b.proof(height);
    let msg = MsgTimeoutOnClose {
        packet: packet.clone(),
        next_sequence_recv: 1,
        proof_unreceived: proof.clone(),
        proof_close: proof,
        proof_height: height,
        counterparty_upgrade_sequence: 0,
        signer: RELAYER.into(),
    };
    let res = s.a.deliver(msg.clone()).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    assert!(!has(&s.a, Path::Commitment(transfer(), a_chan, 1)));
    let res = s.a.deliver(msg).unwrap();
    assert_eq!(Response::Packet(ResponseResult::NoOp), res);
}

// ==== Redundant relay filter =================================================

#[test]
fn test_redundant_relay_filter() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let first = send(&mut s.a, &a_chan, b"one");
    let second = send(&mut s.a, &a_chan, b"two");
    let height = s.sync_b();
    let first = Msg::from(recv_msg(&s.a, height, &first));
    let second = Msg::from(recv_msg(&s.a, height, &second));
    s.b.deliver(first.clone()).unwrap();

    let ctx = &mut s.b.ctx;
    assert_eq!(
        Err(Error::RedundantTx),
        check_tx(ctx, TxMode::CheckTx, &[first.clone()])
    );
    assert_eq!(
        Err(Error::RedundantTx),
        check_tx(ctx, TxMode::ReCheckTx, &[first.clone()])
    );
    // Filter only applies when admitting to the mempool.
    assert_eq!(Ok(()), check_tx(ctx, TxMode::Deliver, &[first.clone()]));
    assert_eq!(Ok(()), check_tx(ctx, TxMode::Simulate, &[first.clone()]));

    // A single useful packet message lets the transaction through.
    assert_eq!(
        Ok(()),
        check_tx(ctx, TxMode::CheckTx, &[first.clone(), second.clone()])
    );
    // Checking doesn’t modify state.
    assert!(!ctx.store.has(&Path::Receipt(transfer(), b_chan.clone(), 2)));

    // So does any non-packet message.
    let close = Msg::from(MsgChannelCloseInit {
        port_id: transfer(),
        channel_id: b_chan,
        signer: RELAYER.into(),
    });
    assert_eq!(Ok(()), check_tx(ctx, TxMode::CheckTx, &[first.clone(), close]));

    // Client updates are neutral.
    let update = Msg::from(MsgUpdateClient {
        client_id: s.b_client.clone(),
        client_message: Vec::new(),
        signer: RELAYER.into(),
    });
    assert_eq!(
        Err(Error::RedundantTx),
        check_tx(ctx, TxMode::CheckTx, &[update.clone(), first])
    );
    assert_eq!(Ok(()), check_tx(ctx, TxMode::CheckTx, &[update]));
}

#[test]
fn test_filter_rejects_invalid_packet() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let mut packet = send(&mut s.a, &a_chan, b"one");
    let height = s.sync_b();
    packet.data = b"forged".to_vec();
    let msg = Msg::from(recv_msg(&s.a, height, &packet));
    let res = check_tx(&mut s.b.ctx, TxMode::CheckTx, &[msg.clone()]);
    assert!(matches!(res, Err(Error::InvalidProof { .. })), "{res:?}");
    // Re-checking skips proof verification.
    assert_eq!(Ok(()), check_tx(&mut s.b.ctx, TxMode::ReCheckTx, &[msg]));
}

// ==== Upgrades ===============================================================

fn upgrade_fields(s: &Setup, version: &str) -> UpgradeFields {
    UpgradeFields {
        ordering: Order::Unordered,
        connection_hops: vec![s.a_conn.clone()],
        version: version.into(),
    }
}

fn upgrade_init(s: &mut Setup, a_chan: &ChannelId, version: &str) -> Upgrade {
    let fields = upgrade_fields(s, version);
    let res = s.a.deliver(MsgChannelUpgradeInit {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        fields,
        signer: AUTHORITY.into(),
    });
    let Ok(Response::ChannelUpgradeInit { upgrade, upgrade_sequence: 1 }) = res
    else {
        panic!("unexpected response: {res:?}");
    };
    upgrade
}

fn upgrade_try(
    s: &mut Setup,
    b_chan: &ChannelId,
    proposal: &Upgrade,
) -> Response {
    let height = s.sync_b();
    let proof = s.a.proof(height);
    s.b.deliver(MsgChannelUpgradeTry {
        port_id: transfer(),
        channel_id: b_chan.clone(),
        proposed_upgrade_connection_hops: vec![s.b_conn.clone()],
        counterparty_upgrade_fields: proposal.fields.clone(),
        counterparty_upgrade_sequence: 1,
        proof_channel: proof.clone(),
        proof_upgrade: proof,
        proof_height: height,
        signer: RELAYER.into(),
    })
    .unwrap()
}

fn upgrade_ack(
    s: &mut Setup,
    a_chan: &ChannelId,
    b_chan: &ChannelId,
) -> Response {
    let height = s.sync_a();
    let proof = s.b.proof(height);
    let counterparty_upgrade =
        s.b.ctx.upgrade(&transfer(), b_chan).unwrap().unwrap();
    s.a.deliver(MsgChannelUpgradeAck {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        counterparty_upgrade,
        proof_channel: proof.clone(),
        proof_upgrade: proof,
        proof_height: height,
        signer: RELAYER.into(),
    })
    .unwrap()
}

fn upgrade_confirm(
    s: &mut Setup,
    a_chan: &ChannelId,
    b_chan: &ChannelId,
) -> Response {
    let height = s.sync_b();
    let proof = s.a.proof(height);
    let counterparty_upgrade =
        s.a.ctx.upgrade(&transfer(), a_chan).unwrap().unwrap();
    s.b.deliver(MsgChannelUpgradeConfirm {
        port_id: transfer(),
        channel_id: b_chan.clone(),
        counterparty_channel_state: channel(&s.a, a_chan).state,
        counterparty_upgrade,
        proof_channel: proof.clone(),
        proof_upgrade: proof,
        proof_height: height,
        signer: RELAYER.into(),
    })
    .unwrap()
}

fn error_receipt(chain: &MockChain, channel_id: &ChannelId) -> ErrorReceipt {
    let path = Path::UpgradeError(transfer(), channel_id.clone());
    chain.ctx.store.get_borsh(&path).unwrap().unwrap()
}

fn upgrade_events(chain: &MockChain) -> Vec<UpgradeEventKind> {
    chain
        .ctx
        .events()
        .iter()
        .filter_map(|event| match event {
            Event::Upgrade(event) => Some(event.kind),
            _ => None,
        })
        .collect()
}

#[test]
fn test_upgrade_without_inflight_packets() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);

    let proposal = upgrade_init(&mut s, &a_chan, "ics20-2");
    assert_eq!(State::Open, channel(&s.a, &a_chan).state);
    assert_eq!(1, channel(&s.a, &a_chan).upgrade_sequence);
    assert!(proposal.timeout.is_zero());

    let res = upgrade_try(&mut s, &b_chan, &proposal);
    let Response::ChannelUpgradeTry {
        upgrade: Some(upgrade),
        upgrade_sequence: 1,
        result: ResponseResult::Success,
    } = res
    else {
        panic!("unexpected response: {res:?}");
    };
    assert_eq!("ics20-2", upgrade.fields.version);
    assert_eq!(1, upgrade.next_sequence_send);
    assert!(!upgrade.timeout.is_zero());
    assert_eq!(State::Flushing, channel(&s.b, &b_chan).state);

    let res = upgrade_ack(&mut s, &a_chan, &b_chan);
    assert_eq!(Response::Upgrade(ResponseResult::Success), res);
    assert_eq!(State::FlushComplete, channel(&s.a, &a_chan).state);

    let res = upgrade_confirm(&mut s, &a_chan, &b_chan);
    assert_eq!(Response::Upgrade(ResponseResult::Success), res);
    // Both sides flushed so B opens right away.
    let b_end = channel(&s.b, &b_chan);
    assert_eq!(State::Open, b_end.state);
    assert_eq!("ics20-2", b_end.version);
    assert_eq!(
        vec![
            UpgradeEventKind::Confirm,
            UpgradeEventKind::FlushComplete,
            UpgradeEventKind::Open
        ],
        upgrade_events(&s.b)
    );

    let height = s.sync_a();
    s.a.deliver(MsgChannelUpgradeOpen {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        counterparty_channel_state: State::Open,
        proof_channel: s.b.proof(height),
        proof_height: height,
        signer: RELAYER.into(),
    })
    .unwrap();
    let a_end = channel(&s.a, &a_chan);
    assert_eq!(State::Open, a_end.state);
    assert_eq!("ics20-2", a_end.version);
    assert_eq!(1, a_end.upgrade_sequence);

    for (chain, chan) in [(&s.a, &a_chan), (&s.b, &b_chan)] {
        assert!(chain.ctx.upgrade(&transfer(), chan).unwrap().is_none());
        let upgrade = chain.ctx.counterparty_upgrade(&transfer(), chan);
        assert!(upgrade.unwrap().is_none());
        assert_eq!(1, MockApp::counter(&chain.ctx.store, "upgrade-open"));
        assert!(chain.ctx.store.get(MockApp::SIDE_EFFECT_KEY).is_none());
        let start = Path::PruningSequenceStart(transfer(), chan.clone());
        assert_eq!(Some(1), chain.ctx.store.get_sequence(&start).unwrap());
    }

    // Packets flow over the upgraded channel.
    let packet = send(&mut s.a, &a_chan, b"hello");
    let height = s.sync_b();
    let res = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
}

#[test]
fn test_upgrade_flushes_inflight_packets() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let packet = send(&mut s.a, &a_chan, b"hello");

    let proposal = upgrade_init(&mut s, &a_chan, "ics20-2");
    upgrade_try(&mut s, &b_chan, &proposal);
    let res = upgrade_ack(&mut s, &a_chan, &b_chan);
    assert_eq!(Response::Upgrade(ResponseResult::Success), res);
    // A has a packet in flight.
    assert_eq!(State::Flushing, channel(&s.a, &a_chan).state);

    // No new packets while flushing.
    let err = packet::send_packet(
        &mut s.a.ctx,
        MODULE_ID,
        &transfer(),
        &a_chan,
        Height::ZERO,
        Timestamp::from_nanos(u64::MAX),
        b"late".to_vec(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidChannelState { .. }));

    assert_eq!(
        Response::Upgrade(ResponseResult::Success),
        upgrade_confirm(&mut s, &a_chan, &b_chan)
    );
    assert_eq!(State::FlushComplete, channel(&s.b, &b_chan).state);

    // The in-flight packet is still delivered and acknowledged.
    let height = s.sync_b();
    let res = s.b.deliver(recv_msg(&s.a, height, &packet)).unwrap();
    assert_eq!(Response::Packet(ResponseResult::Success), res);
    let height = s.sync_a();
    s.a.deliver(ack_msg(&s.b, height, &packet, b"ok")).unwrap();
    assert_eq!(State::FlushComplete, channel(&s.a, &a_chan).state);

    // A opens seeing B flushed.
    let height = s.sync_a();
    s.a.deliver(MsgChannelUpgradeOpen {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        counterparty_channel_state: State::FlushComplete,
        proof_channel: s.b.proof(height),
        proof_height: height,
        signer: RELAYER.into(),
    })
    .unwrap();
    assert_eq!(State::Open, channel(&s.a, &a_chan).state);

    // B opens seeing A upgraded.
    let height = s.sync_b();
    s.b.deliver(MsgChannelUpgradeOpen {
        port_id: transfer(),
        channel_id: b_chan.clone(),
        counterparty_channel_state: State::Open,
        proof_channel: s.a.proof(height),
        proof_height: height,
        signer: RELAYER.into(),
    })
    .unwrap();
    assert_eq!(State::Open, channel(&s.b, &b_chan).state);

    let recv_start = |chain: &MockChain, chan: &ChannelId| {
        let path = Path::RecvStartSequence(transfer(), chan.clone());
        chain.ctx.store.get_sequence(&path).unwrap()
    };
    assert_eq!(Some(1), recv_start(&s.a, &a_chan));
    assert_eq!(Some(2), recv_start(&s.b, &b_chan));

    // Acknowledgements from before the upgrade can now be pruned.
    let res = s.b.deliver(MsgPruneAcknowledgements {
        port_id: transfer(),
        channel_id: b_chan.clone(),
        limit: 10,
        signer: RELAYER.into(),
    });
    assert_eq!(
        Ok(Response::PruneAcknowledgements { pruned: 1, remaining: 0 }),
        res
    );
    assert!(!has(&s.b, Path::Ack(transfer(), b_chan, 1)));
}

#[test]
fn test_upgrade_init_is_atomic() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    let before = channel(&s.a, &a_chan);
    let mut msg = MsgChannelUpgradeInit {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        fields: upgrade_fields(&s, "reject"),
        signer: AUTHORITY.into(),
    };

    let err = s.a.deliver(msg.clone()).unwrap_err();
    assert!(matches!(err, Error::App(_)), "{err:?}");
    assert_eq!(before, channel(&s.a, &a_chan));
    assert!(s.a.ctx.upgrade(&transfer(), &a_chan).unwrap().is_none());
    assert!(s.a.ctx.store.get(MockApp::SIDE_EFFECT_KEY).is_none());

    msg.fields.version = VERSION.into();
    assert_eq!(Err(Error::UpgradeFieldsUnchanged), s.a.deliver(msg.clone()));

    msg.fields.version = "ics20-2".into();
    msg.signer = RELAYER.into();
    let res = s.a.deliver(msg.clone());
    assert_eq!(Err(Error::InvalidSigner(RELAYER.into())), res);
    assert_eq!(before, channel(&s.a, &a_chan));

    // The callback’s writes are discarded even on success.
    msg.signer = AUTHORITY.into();
    s.a.deliver(msg).unwrap();
    assert!(s.a.ctx.store.get(MockApp::SIDE_EFFECT_KEY).is_none());
}

#[test]
fn test_upgrade_ack_failure_and_cancel_by_receipt() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let proposal = upgrade_init(&mut s, &a_chan, "ics20-2-fail-ack");
    upgrade_try(&mut s, &b_chan, &proposal);

    let res = upgrade_ack(&mut s, &a_chan, &b_chan);
    assert_eq!(Response::Upgrade(ResponseResult::Failure), res);
    let a_end = channel(&s.a, &a_chan);
    assert_eq!(State::Open, a_end.state);
    assert_eq!(VERSION, a_end.version);
    assert_eq!(1, a_end.upgrade_sequence);
    assert!(s.a.ctx.upgrade(&transfer(), &a_chan).unwrap().is_none());
    assert!(s.a.ctx.store.get(MockApp::SIDE_EFFECT_KEY).is_none());
    let receipt = error_receipt(&s.a, &a_chan);
    assert_eq!(1, receipt.sequence);
    insta::assert_snapshot!(receipt.message.as_str(), @"error code 4: App");
    assert_eq!(vec![UpgradeEventKind::Error], upgrade_events(&s.a));

    // B cancels its side proving A’s error receipt.
    let height = s.sync_b();
    let mut msg = MsgChannelUpgradeCancel {
        port_id: transfer(),
        channel_id: b_chan.clone(),
        error_receipt: receipt,
        proof_error_receipt: Vec::new(),
        proof_height: height,
        signer: RELAYER.into(),
    };
    assert_eq!(
        Err(Error::InvalidErrorReceipt("missing proof")),
        s.b.deliver(msg.clone())
    );
    msg.proof_error_receipt = s.a.proof(height);
    s.b.deliver(msg).unwrap();
    let b_end = channel(&s.b, &b_chan);
    assert_eq!(State::Open, b_end.state);
    assert_eq!(VERSION, b_end.version);
    assert!(s.b.ctx.upgrade(&transfer(), &b_chan).unwrap().is_none());
    assert_eq!(1, error_receipt(&s.b, &b_chan).sequence);
}

#[test]
fn test_upgrade_try_with_stale_sequence_fails() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    // B upgraded before so its sequence is ahead of A’s.
    let mut b_end = channel(&s.b, &b_chan);
    b_end.upgrade_sequence = 5;
    s.b.ctx.set_channel(&transfer(), &b_chan, &b_end).unwrap();

    let proposal = upgrade_init(&mut s, &a_chan, "ics20-2");
    let res = upgrade_try(&mut s, &b_chan, &proposal);
    assert_eq!(
        Response::ChannelUpgradeTry {
            upgrade: None,
            upgrade_sequence: 5,
            result: ResponseResult::Failure,
        },
        res
    );
    let b_end = channel(&s.b, &b_chan);
    assert_eq!(State::Open, b_end.state);
    assert_eq!(5, b_end.upgrade_sequence);
    assert!(s.b.ctx.upgrade(&transfer(), &b_chan).unwrap().is_none());
    assert_eq!(5, error_receipt(&s.b, &b_chan).sequence);
}

#[test]
fn test_upgrade_cancel_by_authority() {
    let mut s = Setup::new();
    let (a_chan, _) = s.open_channel(Order::Unordered);
    upgrade_init(&mut s, &a_chan, "ics20-2");
    let msg = MsgChannelUpgradeCancel {
        port_id: transfer(),
        channel_id: a_chan.clone(),
        error_receipt: ErrorReceipt { sequence: 0, message: String::new() },
        proof_error_receipt: Vec::new(),
        proof_height: Height::ZERO,
        signer: AUTHORITY.into(),
    };
    s.a.deliver(msg.clone()).unwrap();
    assert!(s.a.ctx.upgrade(&transfer(), &a_chan).unwrap().is_none());
    let receipt = error_receipt(&s.a, &a_chan);
    assert_eq!(1, receipt.sequence);
    insta::assert_snapshot!(
        receipt.message.as_str(),
        @"error code 50: UpgradeCancelled"
    );

    // Nothing left to cancel.
    assert_eq!(
        Err(Error::UpgradeNotFound { port_id: transfer(), channel_id: a_chan }),
        s.a.deliver(msg)
    );
}

#[test]
fn test_upgrade_timeout() {
    let mut s = Setup::new();
    let (a_chan, b_chan) = s.open_channel(Order::Unordered);
    let proposal = upgrade_init(&mut s, &a_chan, "ics20-2");
    upgrade_try(&mut s, &b_chan, &proposal);
    assert_eq!(State::Flushing, channel(&s.b, &b_chan).state);

    let make_msg = |s: &mut Setup| {
        let height = s.sync_b();
        MsgChannelUpgradeTimeout {
            port_id: transfer(),
            channel_id: b_chan.clone(),
            counterparty_channel: channel(&s.a, &a_chan),
            proof_channel: s.a.proof(height),
            proof_height: height,
            signer: RELAYER.into(),
        }
    };

    let msg = make_msg(&mut s);
    let latest_height = msg.proof_height;
    let proof_height = latest_height.add(3);
    let ahead = MsgChannelUpgradeTimeout { proof_height, ..msg.clone() };
    assert_eq!(
        Err(Error::InvalidHeight { proof_height, latest_height }),
        s.b.deliver(ahead)
    );
    assert_eq!(Err(Error::UpgradeTimeoutNotReached), s.b.deliver(msg));

    // A never acknowledges and its clock passes B’s upgrade timeout.
    s.a.advance_time(Duration::from_secs(20 * 60));
    let msg = make_msg(&mut s);
    s.b.deliver(msg).unwrap();
    let b_end = channel(&s.b, &b_chan);
    assert_eq!(State::Open, b_end.state);
    assert_eq!(VERSION, b_end.version);
    assert!(s.b.ctx.upgrade(&transfer(), &b_chan).unwrap().is_none());
    let receipt = error_receipt(&s.b, &b_chan);
    assert_eq!(1, receipt.sequence);
    insta::assert_snapshot!(
        receipt.message.as_str(),
        @"error code 40: UpgradeTimeoutPassed"
    );
}

// ==== Ambient ================================================================

#[test]
fn test_update_config() {
    let mut chain = MockChain::new("chain-a");
    let update = crate::config::UpdateConfig {
        upgrade_timeout_ns: Some(1),
        ..Default::default()
    };
    let msg =
        MsgUpdateConfig { config: update.clone(), signer: RELAYER.into() };
    assert_eq!(Err(Error::InvalidSigner(RELAYER.into())), chain.deliver(msg));
    let msg = MsgUpdateConfig { config: update, signer: AUTHORITY.into() };
    assert_eq!(Ok(Response::Empty), chain.deliver(msg));
    assert_eq!(1, chain.ctx.config.upgrade_timeout_ns);

    let msg = MsgUpdateClient {
        client_id: ClientId::new("07-tendermint", 0).unwrap(),
        client_message: Vec::new(),
        signer: RELAYER.into(),
    };
    let res = chain.deliver(msg);
    assert_eq!(Err(Error::UnsupportedMessage("UpdateClient")), res);
}

#[test]
fn test_localhost() {
    init_logger();
    let mut chain = MockChain::new("chain-a");
    let conn = create_localhost_connection(&mut chain.ctx).unwrap();
    assert_eq!(ConnectionId::localhost(), conn);
    assert_eq!(
        Err(Error::ConnectionAlreadyExists(conn.clone())),
        create_localhost_connection(&mut chain.ctx)
    );

    let res = chain.deliver(MsgChannelOpenInit {
        port_id: transfer(),
        ordering: Order::Ordered,
        connection_hops: vec![conn.clone()],
        counterparty_port_id: transfer(),
        version: VERSION.into(),
        signer: RELAYER.into(),
    });
    let Ok(Response::ChannelOpenInit { channel_id: first, .. }) = res else {
        panic!("unexpected response: {res:?}");
    };
    let height = chain.ctx.host.height;
    let res = chain.deliver(MsgChannelOpenTry {
        port_id: transfer(),
        ordering: Order::Ordered,
        connection_hops: vec![conn.clone()],
        counterparty: Counterparty::new(transfer(), Some(first.clone())),
        counterparty_version: VERSION.into(),
        proof_init: Vec::new(),
        proof_height: height,
        signer: RELAYER.into(),
    });
    let Ok(Response::ChannelOpenTry { channel_id: second, .. }) = res else {
        panic!("unexpected response: {res:?}");
    };
    chain
        .deliver(MsgChannelOpenAck {
            port_id: transfer(),
            channel_id: first.clone(),
            counterparty_channel_id: second.clone(),
            counterparty_version: VERSION.into(),
            proof_try: Vec::new(),
            proof_height: height,
            signer: RELAYER.into(),
        })
        .unwrap();
    chain
        .deliver(MsgChannelOpenConfirm {
            port_id: transfer(),
            channel_id: second.clone(),
            proof_ack: Vec::new(),
            proof_height: height,
            signer: RELAYER.into(),
        })
        .unwrap();

    let packet = send(&mut chain, &first, b"hello");
    let msg = MsgRecvPacket {
        packet: packet.clone(),
        proof_commitment: Vec::new(),
        proof_height: height,
        signer: RELAYER.into(),
    };
    let res = chain.deliver(msg);
    assert_eq!(Ok(Response::Packet(ResponseResult::Success)), res);
    let msg = MsgAcknowledgement {
        packet,
        acknowledgement: b"ok".to_vec(),
        proof_acked: Vec::new(),
        proof_height: height,
        signer: RELAYER.into(),
    };
    let res = chain.deliver(msg);
    assert_eq!(Ok(Response::Packet(ResponseResult::Success)), res);
    assert!(!has(&chain, Path::Commitment(transfer(), first, 1)));
    assert_eq!(State::Open, channel(&chain, &second).state);
}
