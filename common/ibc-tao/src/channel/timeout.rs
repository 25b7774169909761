//! Timing out packets.
//!
//! A packet times out once the counterparty reaches the packet’s timeout
//! height or timestamp without having received it, or once the counterparty
//! closes the channel.  Timing out a packet on an ordered channel closes the
//! channel.

use ibc_ids::{Height, Path};

use super::packet::{check_commitment, check_destination};
use super::{upgrade, ChannelEnd, Counterparty, Order, Packet, State};
use crate::connection::ConnectionEnd;
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::events::{
    ChannelEvent, ChannelEventKind, PacketEvent, PacketEventKind,
};
use crate::msgs::{MsgTimeout, MsgTimeoutOnClose, ResponseResult};
use crate::verify;

/// Verifies that the packet has timed out.  Doesn’t modify any state.
pub(crate) fn timeout_packet_check(
    ctx: &IbcContext,
    msg: &MsgTimeout,
) -> Result<ResponseResult> {
    let packet = &msg.packet;
    let (channel, conn) = packet_channel(ctx, packet)?;

    let proof_timestamp =
        verify::proof_timestamp(ctx, &conn, msg.proof_height)?;
    if !packet.timed_out(msg.proof_height, proof_timestamp) {
        return Err(Error::TimeoutNotReached { sequence: packet.sequence });
    }

    if !check_commitment(ctx, packet)? {
        return Ok(ResponseResult::NoOp);
    }
    verify_unreceived(
        ctx,
        &conn,
        &channel,
        packet,
        msg.next_sequence_recv,
        msg.proof_height,
        &msg.proof_unreceived,
    )?;
    Ok(ResponseResult::Success)
}

/// Verifies that the counterparty closed the channel before receiving the
/// packet.  Doesn’t modify any state.
pub(crate) fn timeout_on_close_check(
    ctx: &IbcContext,
    msg: &MsgTimeoutOnClose,
) -> Result<ResponseResult> {
    let packet = &msg.packet;
    let (channel, conn) = packet_channel(ctx, packet)?;

    if !check_commitment(ctx, packet)? {
        return Ok(ResponseResult::NoOp);
    }

    let expected = ChannelEnd {
        state: State::Closed,
        ordering: channel.ordering,
        counterparty: Counterparty::new(
            packet.source_port.clone(),
            Some(packet.source_channel.clone()),
        ),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: channel.version.clone(),
        upgrade_sequence: msg.counterparty_upgrade_sequence,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_close,
        &packet.dest_port,
        &packet.dest_channel,
        &expected,
    )?;
    verify_unreceived(
        ctx,
        &conn,
        &channel,
        packet,
        msg.next_sequence_recv,
        msg.proof_height,
        &msg.proof_unreceived,
    )?;
    Ok(ResponseResult::Success)
}

pub fn timeout_packet(
    ctx: &mut IbcContext,
    msg: &MsgTimeout,
) -> Result<ResponseResult> {
    if timeout_packet_check(ctx, msg)? == ResponseResult::NoOp {
        return Ok(ResponseResult::NoOp);
    }
    on_timeout(ctx, &msg.packet, &msg.signer)?;
    Ok(ResponseResult::Success)
}

pub fn timeout_on_close(
    ctx: &mut IbcContext,
    msg: &MsgTimeoutOnClose,
) -> Result<ResponseResult> {
    if timeout_on_close_check(ctx, msg)? == ResponseResult::NoOp {
        return Ok(ResponseResult::NoOp);
    }
    on_timeout(ctx, &msg.packet, &msg.signer)?;
    Ok(ResponseResult::Success)
}

/// Returns channel the packet was sent over and its connection.
fn packet_channel(
    ctx: &IbcContext,
    packet: &Packet,
) -> Result<(ChannelEnd, ConnectionEnd)> {
    let channel = ctx.channel(&packet.source_port, &packet.source_channel)?;
    check_destination(packet, &channel)?;
    let conn = ctx.connection(channel.connection_id()?)?;
    Ok((channel, conn))
}

fn verify_unreceived(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    channel: &ChannelEnd,
    packet: &Packet,
    next_sequence_recv: u64,
    proof_height: Height,
    proof: &[u8],
) -> Result {
    match channel.ordering {
        Order::Ordered => {
            if next_sequence_recv > packet.sequence {
                return Err(Error::PacketReceived {
                    sequence: packet.sequence,
                    next_sequence_recv,
                });
            }
            verify::verify_next_sequence_recv(
                ctx,
                conn,
                proof_height,
                proof,
                &packet.dest_port,
                &packet.dest_channel,
                next_sequence_recv,
            )
        }
        Order::Unordered => verify::verify_packet_receipt_absence(
            ctx,
            conn,
            proof_height,
            proof,
            &packet.dest_port,
            &packet.dest_channel,
            packet.sequence,
        ),
    }
}

/// Invokes the application and removes the timed out packet.
fn on_timeout(ctx: &mut IbcContext, packet: &Packet, relayer: &str) -> Result {
    let (port_id, channel_id) = (&packet.source_port, &packet.source_channel);
    let app = ctx.router.app(port_id)?;
    app.on_timeout_packet(&mut ctx.store, packet, relayer)?;

    ctx.store.delete_path(&Path::Commitment(
        port_id.clone(),
        channel_id.clone(),
        packet.sequence,
    ));
    let channel = ctx.channel(port_id, channel_id)?;
    log::info!("packet {port_id}/{channel_id}/{}: timed out", packet.sequence);
    ctx.emit(PacketEvent::new(PacketEventKind::Timeout, packet, &channel)?);

    match channel.ordering {
        Order::Unordered => {
            if channel.state == State::Flushing {
                upgrade::handle_flush_state(ctx, port_id, channel_id)?;
            }
        }
        Order::Ordered if channel.state == State::Closed => (),
        Order::Ordered => {
            if channel.state == State::Flushing {
                let err = Error::PacketTimedOut { sequence: packet.sequence };
                upgrade::abort_upgrade(ctx, port_id, channel_id, &err)?;
            }
            let mut channel = ctx.channel(port_id, channel_id)?;
            let previous = channel.state;
            channel.state = State::Closed;
            ctx.set_channel(port_id, channel_id, &channel)?;
            log::info!("channel {port_id}/{channel_id}: {previous} -> CLOSED");
            ctx.emit(ChannelEvent::new(
                ChannelEventKind::Closed,
                port_id,
                channel_id,
                &channel,
            )?);
        }
    }
    Ok(())
}
