//! Channel opening and closing handshakes.
//!
//! Opening mirrors the connection handshake: Init and Try create the channel
//! ends, Ack and Confirm prove the counterparty’s end and move to OPEN.  Every
//! step invokes the application bound to the port which may refuse it.

use ibc_ids::{ChannelId, ConnectionId, Path, PortId};

use super::{ChannelEnd, Counterparty, Order, State};
use crate::connection::{self, version, ConnectionEnd};
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::events::{ChannelEvent, ChannelEventKind};
use crate::msgs::{
    MsgChannelCloseConfirm, MsgChannelCloseInit, MsgChannelOpenAck,
    MsgChannelOpenConfirm, MsgChannelOpenInit, MsgChannelOpenTry,
};
use crate::router;
use crate::verify;

pub fn chan_open_init(
    ctx: &mut IbcContext,
    msg: &MsgChannelOpenInit,
) -> Result<(ChannelId, String)> {
    let connection_id = single_hop(&msg.connection_hops)?;
    let module_id = ctx.router.lookup_module_by_port(&msg.port_id)?.clone();
    let conn = ctx.connection(connection_id)?;
    check_connection_ordering(&conn, msg.ordering)?;
    ctx.ensure_client_active(&conn.client_id)?;

    let channel_id =
        ChannelId::new(ctx.next_counter(&Path::NextChannelSequence)?);
    let counterparty =
        Counterparty::new(msg.counterparty_port_id.clone(), None);
    let version = ctx.router.app(&msg.port_id)?.on_chan_open_init(
        &mut ctx.store,
        msg.ordering,
        &msg.connection_hops,
        &msg.port_id,
        &channel_id,
        &counterparty,
        &msg.version,
    )?;

    let channel = ChannelEnd {
        state: State::Init,
        ordering: msg.ordering,
        counterparty,
        connection_hops: msg.connection_hops.clone(),
        version: version.clone(),
        upgrade_sequence: 0,
    };
    create_channel(ctx, &msg.port_id, &channel_id, &channel, &module_id)?;

    log::info!("channel {}/{channel_id}: UNINIT -> INIT", msg.port_id);
    ctx.emit(ChannelEvent::new(
        ChannelEventKind::OpenInit,
        &msg.port_id,
        &channel_id,
        &channel,
    )?);
    Ok((channel_id, version))
}

pub fn chan_open_try(
    ctx: &mut IbcContext,
    msg: &MsgChannelOpenTry,
) -> Result<(ChannelId, String)> {
    let connection_id = single_hop(&msg.connection_hops)?;
    let module_id = ctx.router.lookup_module_by_port(&msg.port_id)?.clone();
    let conn = ctx.connection(connection_id)?;
    conn.expect_state(connection_id, connection::State::Open)?;
    check_connection_ordering(&conn, msg.ordering)?;
    let counterparty_channel_id = msg
        .counterparty
        .channel_id
        .as_ref()
        .ok_or(Error::Internal("counterparty channel id not set"))?;

    let expected = ChannelEnd {
        state: State::Init,
        ordering: msg.ordering,
        counterparty: Counterparty::new(msg.port_id.clone(), None),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: msg.counterparty_version.clone(),
        upgrade_sequence: 0,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_init,
        &msg.counterparty.port_id,
        counterparty_channel_id,
        &expected,
    )?;

    let channel_id =
        ChannelId::new(ctx.next_counter(&Path::NextChannelSequence)?);
    let version = ctx.router.app(&msg.port_id)?.on_chan_open_try(
        &mut ctx.store,
        msg.ordering,
        &msg.connection_hops,
        &msg.port_id,
        &channel_id,
        &msg.counterparty,
        &msg.counterparty_version,
    )?;

    let channel = ChannelEnd {
        state: State::TryOpen,
        ordering: msg.ordering,
        counterparty: msg.counterparty.clone(),
        connection_hops: msg.connection_hops.clone(),
        version: version.clone(),
        upgrade_sequence: 0,
    };
    create_channel(ctx, &msg.port_id, &channel_id, &channel, &module_id)?;

    log::info!("channel {}/{channel_id}: UNINIT -> TRYOPEN", msg.port_id);
    ctx.emit(ChannelEvent::new(
        ChannelEventKind::OpenTry,
        &msg.port_id,
        &channel_id,
        &channel,
    )?);
    Ok((channel_id, version))
}

pub fn chan_open_ack(ctx: &mut IbcContext, msg: &MsgChannelOpenAck) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let mut channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Init])?;
    let conn = open_connection(ctx, &channel)?;

    let expected = ChannelEnd {
        state: State::TryOpen,
        ordering: channel.ordering,
        counterparty: Counterparty::new(
            port_id.clone(),
            Some(channel_id.clone()),
        ),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: msg.counterparty_version.clone(),
        upgrade_sequence: 0,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_try,
        &channel.counterparty.port_id,
        &msg.counterparty_channel_id,
        &expected,
    )?;

    ctx.router.app(port_id)?.on_chan_open_ack(
        &mut ctx.store,
        port_id,
        channel_id,
        &msg.counterparty_channel_id,
        &msg.counterparty_version,
    )?;

    channel.state = State::Open;
    channel.version = msg.counterparty_version.clone();
    channel.counterparty.channel_id = Some(msg.counterparty_channel_id.clone());
    ctx.set_channel(port_id, channel_id, &channel)?;

    log::info!("channel {port_id}/{channel_id}: INIT -> OPEN");
    ctx.emit(ChannelEvent::new(
        ChannelEventKind::OpenAck,
        port_id,
        channel_id,
        &channel,
    )?);
    Ok(())
}

pub fn chan_open_confirm(
    ctx: &mut IbcContext,
    msg: &MsgChannelOpenConfirm,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let mut channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::TryOpen])?;
    let conn = open_connection(ctx, &channel)?;

    let expected = ChannelEnd {
        state: State::Open,
        ordering: channel.ordering,
        counterparty: Counterparty::new(
            port_id.clone(),
            Some(channel_id.clone()),
        ),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: channel.version.clone(),
        upgrade_sequence: 0,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_ack,
        &channel.counterparty.port_id,
        channel.counterparty_channel_id()?,
        &expected,
    )?;

    ctx.router.app(port_id)?.on_chan_open_confirm(
        &mut ctx.store,
        port_id,
        channel_id,
    )?;

    channel.state = State::Open;
    ctx.set_channel(port_id, channel_id, &channel)?;

    log::info!("channel {port_id}/{channel_id}: TRYOPEN -> OPEN");
    ctx.emit(ChannelEvent::new(
        ChannelEventKind::OpenConfirm,
        port_id,
        channel_id,
        &channel,
    )?);
    Ok(())
}

/// Closes the channel on request of the module which owns it.
pub fn chan_close_init(
    ctx: &mut IbcContext,
    msg: &MsgChannelCloseInit,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let module_id = ctx.router.lookup_module_by_port(port_id)?;
    router::authenticate(&ctx.store, port_id, channel_id, module_id)?;

    let mut channel = ctx.channel(port_id, channel_id)?;
    expect_not_closed(port_id, channel_id, &channel)?;
    let conn = open_connection(ctx, &channel)?;
    ctx.ensure_client_active(&conn.client_id)?;

    ctx.router.app(port_id)?.on_chan_close_init(
        &mut ctx.store,
        port_id,
        channel_id,
    )?;

    let previous = channel.state;
    channel.state = State::Closed;
    ctx.set_channel(port_id, channel_id, &channel)?;

    log::info!("channel {port_id}/{channel_id}: {previous} -> CLOSED");
    ctx.emit(ChannelEvent::new(
        ChannelEventKind::CloseInit,
        port_id,
        channel_id,
        &channel,
    )?);
    Ok(())
}

pub fn chan_close_confirm(
    ctx: &mut IbcContext,
    msg: &MsgChannelCloseConfirm,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let mut channel = ctx.channel(port_id, channel_id)?;
    expect_not_closed(port_id, channel_id, &channel)?;
    let conn = open_connection(ctx, &channel)?;

    let expected = ChannelEnd {
        state: State::Closed,
        ordering: channel.ordering,
        counterparty: Counterparty::new(
            port_id.clone(),
            Some(channel_id.clone()),
        ),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: channel.version.clone(),
        upgrade_sequence: msg.counterparty_upgrade_sequence,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_init,
        &channel.counterparty.port_id,
        channel.counterparty_channel_id()?,
        &expected,
    )?;

    ctx.router.app(port_id)?.on_chan_close_confirm(
        &mut ctx.store,
        port_id,
        channel_id,
    )?;

    let previous = channel.state;
    channel.state = State::Closed;
    ctx.set_channel(port_id, channel_id, &channel)?;

    log::info!("channel {port_id}/{channel_id}: {previous} -> CLOSED");
    ctx.emit(ChannelEvent::new(
        ChannelEventKind::CloseConfirm,
        port_id,
        channel_id,
        &channel,
    )?);
    Ok(())
}

/// Fails unless the connection has negotiated a single version which
/// supports given channel ordering.
pub(crate) fn check_connection_ordering(
    conn: &ConnectionEnd,
    ordering: Order,
) -> Result {
    let version = version::single_version(&conn.versions)?;
    if version.verify_supported_feature(ordering.feature()) {
        Ok(())
    } else {
        Err(Error::OrderingNotSupported(ordering))
    }
}

/// Returns the channel’s connection failing if it isn’t open.
pub(crate) fn open_connection(
    ctx: &IbcContext,
    channel: &ChannelEnd,
) -> Result<ConnectionEnd> {
    let connection_id = channel.connection_id()?;
    let conn = ctx.connection(connection_id)?;
    conn.expect_state(connection_id, connection::State::Open)?;
    Ok(conn)
}

pub(crate) fn single_hop(hops: &[ConnectionId]) -> Result<&ConnectionId> {
    match hops {
        [id] => Ok(id),
        hops => Err(Error::InvalidConnectionHops(hops.len())),
    }
}

fn expect_not_closed(
    port_id: &PortId,
    channel_id: &ChannelId,
    channel: &ChannelEnd,
) -> Result {
    channel.expect_state(port_id, channel_id, &[
        State::Init,
        State::TryOpen,
        State::Open,
        State::Flushing,
        State::FlushComplete,
    ])
}

/// Stores a new channel end along with its sequences and records its owner.
fn create_channel(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    channel: &ChannelEnd,
    module_id: &str,
) -> Result {
    ctx.set_channel(port_id, channel_id, channel)?;
    for path in [
        Path::NextSequenceSend(port_id.clone(), channel_id.clone()),
        Path::NextSequenceRecv(port_id.clone(), channel_id.clone()),
        Path::NextSequenceAck(port_id.clone(), channel_id.clone()),
    ] {
        ctx.store.set_sequence(&path, 1);
    }
    router::claim_channel(&mut ctx.store, port_id, channel_id, module_id);
    Ok(())
}
