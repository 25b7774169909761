//! Sending, receiving and acknowledging packets.
//!
//! The sending chain stores a commitment to every packet it sends.  The
//! receiving chain verifies the commitment, records that the packet has been
//! received and stores a commitment to the application’s acknowledgement.
//! Finally, the sending chain verifies the acknowledgement and deletes the
//! packet commitment.

use ibc_ids::{ChannelId, Height, Path, PortId, Timestamp};

use super::handshake::open_connection;
use super::{ack_commitment, upgrade, ChannelEnd, Order, Packet, State};
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::events::{PacketEvent, PacketEventKind};
use crate::msgs::{MsgAcknowledgement, MsgRecvPacket, ResponseResult};
use crate::router;
use crate::verify;

/// Sends a packet over the channel on behalf of the module which owns it.
///
/// Returns sequence number assigned to the packet.
pub fn send_packet(
    ctx: &mut IbcContext,
    module_id: &str,
    port_id: &PortId,
    channel_id: &ChannelId,
    timeout_height: Height,
    timeout_timestamp: Timestamp,
    data: Vec<u8>,
) -> Result<u64> {
    router::authenticate(&ctx.store, port_id, channel_id, module_id)?;
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Open])?;

    let seq_path = Path::NextSequenceSend(port_id.clone(), channel_id.clone());
    let sequence = ctx.store.sequence(&seq_path)?;
    let packet = Packet {
        sequence,
        source_port: port_id.clone(),
        source_channel: channel_id.clone(),
        dest_port: channel.counterparty.port_id.clone(),
        dest_channel: channel.counterparty_channel_id()?.clone(),
        data,
        timeout_height,
        timeout_timestamp,
    };
    packet.validate()?;

    let conn = ctx.connection(channel.connection_id()?)?;
    ctx.ensure_client_active(&conn.client_id)?;
    let client = ctx.client(&conn.client_id)?;
    let latest_height =
        client.latest_height(ctx.client_ctx(), &conn.client_id)?;
    let latest_timestamp = client.timestamp_at_height(
        ctx.client_ctx(),
        &conn.client_id,
        latest_height,
    )?;
    if packet.timed_out(latest_height, latest_timestamp) {
        return Err(Error::TimeoutElapsed { sequence });
    }

    let path = Path::Commitment(port_id.clone(), channel_id.clone(), sequence);
    ctx.store.set_raw(&path, packet.commitment().to_vec());
    ctx.store.set_sequence(&seq_path, sequence + 1);

    log::info!("packet {port_id}/{channel_id}/{sequence}: sent");
    ctx.emit(PacketEvent::new(PacketEventKind::Send, &packet, &channel)?);
    Ok(sequence)
}

/// Performs all checks and writes of packet receipt except for invoking the
/// application.
///
/// With `verify_proof` unset the commitment proof is not verified.  This is
/// used when re-checking transactions in the mempool whose proofs have
/// already been verified once.
pub(crate) fn recv_packet_core(
    ctx: &mut IbcContext,
    msg: &MsgRecvPacket,
    verify_proof: bool,
) -> Result<ResponseResult> {
    let packet = &msg.packet;
    let (port_id, channel_id) = (&packet.dest_port, &packet.dest_channel);
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[
        State::Open,
        State::Flushing,
        State::FlushComplete,
    ])?;

    // Packets sent by the counterparty after it started flushing use the new
    // channel parameters and must wait for the upgrade to finish.
    if let Some(upgrade) = ctx.counterparty_upgrade(port_id, channel_id)? {
        if packet.sequence >= upgrade.next_sequence_send {
            return Err(Error::InvalidPacket(
                "sequence not below counterparty’s flush sequence",
            ));
        }
    }

    if packet.source_port != channel.counterparty.port_id ||
        Some(&packet.source_channel) != channel.counterparty.channel_id.as_ref()
    {
        return Err(Error::InvalidPacketCounterparty {
            port_id: packet.source_port.clone(),
            channel_id: packet.source_channel.clone(),
        });
    }
    let conn = open_connection(ctx, &channel)?;

    if packet.timed_out(ctx.host.height, ctx.host.timestamp) {
        return Err(Error::PacketTimedOut { sequence: packet.sequence });
    }

    if verify_proof {
        verify::verify_packet_commitment(
            ctx,
            &conn,
            msg.proof_height,
            &msg.proof_commitment,
            &packet.source_port,
            &packet.source_channel,
            packet.sequence,
            &packet.commitment(),
        )?;
    }

    let recv_start_sequence = ctx
        .store
        .get_sequence(&Path::RecvStartSequence(
            port_id.clone(),
            channel_id.clone(),
        ))?
        .unwrap_or(0);
    if packet.sequence < recv_start_sequence {
        return Err(Error::PacketAlreadyProcessed {
            sequence: packet.sequence,
            recv_start_sequence,
        });
    }

    match channel.ordering {
        Order::Unordered => {
            let path = Path::Receipt(
                port_id.clone(),
                channel_id.clone(),
                packet.sequence,
            );
            if ctx.store.has(&path) {
                log::debug!("{path}: packet already received");
                return Ok(ResponseResult::NoOp);
            }
            ctx.store.set_raw(&path, verify::RECEIPT_VALUE.to_vec());
        }
        Order::Ordered => {
            let path =
                Path::NextSequenceRecv(port_id.clone(), channel_id.clone());
            let next = ctx.store.sequence(&path)?;
            if packet.sequence < next {
                log::debug!(
                    "{path}: packet {} already received",
                    packet.sequence
                );
                return Ok(ResponseResult::NoOp);
            }
            if packet.sequence != next {
                return Err(Error::PacketSequenceOutOfOrder {
                    expected: next,
                    got: packet.sequence,
                });
            }
            ctx.store.set_sequence(&path, next + 1);
        }
    }

    log::info!("packet {port_id}/{channel_id}/{}: received", packet.sequence);
    ctx.emit(PacketEvent::new(PacketEventKind::Recv, packet, &channel)?);
    Ok(ResponseResult::Success)
}

/// Receives a packet and passes it to the application.
///
/// State changes of an application which returns an unsuccessful
/// acknowledgement are discarded but the acknowledgement is still written.
pub fn recv_packet(
    ctx: &mut IbcContext,
    msg: &MsgRecvPacket,
) -> Result<ResponseResult> {
    if recv_packet_core(ctx, msg, true)? == ResponseResult::NoOp {
        return Ok(ResponseResult::NoOp);
    }

    let packet = &msg.packet;
    let app = ctx.router.app(&packet.dest_port)?;
    let checkpoint = ctx.store.checkpoint();
    let ack = app.on_recv_packet(&mut ctx.store, packet, &msg.signer);
    match ack.as_ref() {
        Some(ack) if !ack.success => {
            log::warn!(
                "packet {}/{}/{}: application returned error acknowledgement",
                packet.dest_port,
                packet.dest_channel,
                packet.sequence
            );
            ctx.store.rollback(checkpoint);
        }
        _ => ctx.store.commit(checkpoint),
    }

    if let Some(ack) = ack {
        write_ack(ctx, packet, &ack.data)?;
    }
    Ok(ResponseResult::Success)
}

/// Writes acknowledgement of a packet the application handled
/// asynchronously.
pub fn write_acknowledgement(
    ctx: &mut IbcContext,
    module_id: &str,
    packet: &Packet,
    acknowledgement: &[u8],
) -> Result {
    router::authenticate(
        &ctx.store,
        &packet.dest_port,
        &packet.dest_channel,
        module_id,
    )?;
    write_ack(ctx, packet, acknowledgement)
}

fn write_ack(
    ctx: &mut IbcContext,
    packet: &Packet,
    acknowledgement: &[u8],
) -> Result {
    let (port_id, channel_id) = (&packet.dest_port, &packet.dest_channel);
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[
        State::Open,
        State::Flushing,
        State::FlushComplete,
    ])?;

    let path = Path::Ack(port_id.clone(), channel_id.clone(), packet.sequence);
    if ctx.store.has(&path) {
        return Err(Error::AcknowledgementExists { sequence: packet.sequence });
    }
    if acknowledgement.is_empty() {
        return Err(Error::InvalidAcknowledgement);
    }
    ctx.store.set_raw(&path, ack_commitment(acknowledgement).to_vec());

    ctx.emit(
        PacketEvent::new(PacketEventKind::WriteAck, packet, &channel)?
            .with_acknowledgement(acknowledgement),
    );
    Ok(())
}

/// Checks that packet’s destination matches the channel’s counterparty.
pub(crate) fn check_destination(
    packet: &Packet,
    channel: &ChannelEnd,
) -> Result {
    if packet.dest_port == channel.counterparty.port_id &&
        Some(&packet.dest_channel) == channel.counterparty.channel_id.as_ref()
    {
        Ok(())
    } else {
        Err(Error::InvalidPacketCounterparty {
            port_id: packet.dest_port.clone(),
            channel_id: packet.dest_channel.clone(),
        })
    }
}

/// Checks stored commitment of a packet sent over the channel.
///
/// Returns `false` if there’s no commitment, i.e. the packet has already
/// been acknowledged or timed out.
pub(crate) fn check_commitment(
    ctx: &IbcContext,
    packet: &Packet,
) -> Result<bool> {
    let path = Path::Commitment(
        packet.source_port.clone(),
        packet.source_channel.clone(),
        packet.sequence,
    );
    match ctx.store.get_raw(&path) {
        None => Ok(false),
        Some(stored) if packet.commitment() == *stored => Ok(true),
        Some(_) => {
            Err(Error::PacketCommitmentMismatch { sequence: packet.sequence })
        }
    }
}

/// Performs all checks and writes of acknowledging a packet except for
/// invoking the application.
pub(crate) fn acknowledge_packet_core(
    ctx: &mut IbcContext,
    msg: &MsgAcknowledgement,
) -> Result<ResponseResult> {
    let packet = &msg.packet;
    let (port_id, channel_id) = (&packet.source_port, &packet.source_channel);
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Open, State::Flushing])?;
    check_destination(packet, &channel)?;
    let conn = open_connection(ctx, &channel)?;

    if !check_commitment(ctx, packet)? {
        log::debug!(
            "packet {port_id}/{channel_id}/{}: already acknowledged",
            packet.sequence
        );
        return Ok(ResponseResult::NoOp);
    }

    verify::verify_packet_acknowledgement(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_acked,
        &packet.dest_port,
        &packet.dest_channel,
        packet.sequence,
        &msg.acknowledgement,
    )?;

    if channel.ordering == Order::Ordered {
        let path = Path::NextSequenceAck(port_id.clone(), channel_id.clone());
        let next = ctx.store.sequence(&path)?;
        if packet.sequence != next {
            return Err(Error::PacketSequenceOutOfOrder {
                expected: next,
                got: packet.sequence,
            });
        }
        ctx.store.set_sequence(&path, next + 1);
    }

    ctx.store.delete_path(&Path::Commitment(
        port_id.clone(),
        channel_id.clone(),
        packet.sequence,
    ));

    log::info!(
        "packet {port_id}/{channel_id}/{}: acknowledged",
        packet.sequence
    );
    ctx.emit(
        PacketEvent::new(PacketEventKind::Ack, packet, &channel)?
            .with_acknowledgement(&msg.acknowledgement),
    );

    if channel.state == State::Flushing {
        upgrade::handle_flush_state(ctx, port_id, channel_id)?;
    }
    Ok(ResponseResult::Success)
}

pub fn acknowledge_packet(
    ctx: &mut IbcContext,
    msg: &MsgAcknowledgement,
) -> Result<ResponseResult> {
    if acknowledge_packet_core(ctx, msg)? == ResponseResult::NoOp {
        return Ok(ResponseResult::NoOp);
    }
    let packet = &msg.packet;
    ctx.router.app(&packet.source_port)?.on_acknowledgement_packet(
        &mut ctx.store,
        packet,
        &msg.acknowledgement,
        &msg.signer,
    )?;
    Ok(ResponseResult::Success)
}

/// Deletes acknowledgements and receipts of packets received before the
/// channel was upgraded.
///
/// Prunes at most `limit` sequences.  Returns number of sequences pruned
/// and number of sequences left to prune.
pub fn prune_acknowledgements(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    limit: u64,
) -> Result<(u64, u64)> {
    ctx.channel(port_id, channel_id)?;
    let start_path =
        Path::PruningSequenceStart(port_id.clone(), channel_id.clone());
    let start = ctx
        .store
        .get_sequence(&start_path)?
        .ok_or(Error::PruningSequenceStartNotFound)?;
    let recv_start = ctx
        .store
        .get_sequence(&Path::RecvStartSequence(
            port_id.clone(),
            channel_id.clone(),
        ))?
        .unwrap_or(0);

    let end = start.saturating_add(limit).min(recv_start).max(start);
    for sequence in start..end {
        ctx.store.delete_path(&Path::Ack(
            port_id.clone(),
            channel_id.clone(),
            sequence,
        ));
        ctx.store.delete_path(&Path::Receipt(
            port_id.clone(),
            channel_id.clone(),
            sequence,
        ));
    }
    ctx.store.set_sequence(&start_path, end);

    let (pruned, remaining) = (end - start, recv_start.saturating_sub(end));
    log::info!(
        "channel {port_id}/{channel_id}: pruned {pruned} acknowledgements, \
         {remaining} remaining"
    );
    Ok((pruned, remaining))
}
