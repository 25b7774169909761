//! Channel upgrade handshake.
//!
//! ```text
//!   chain A                                  chain B
//!   ChanUpgradeInit     OPEN
//!                                            ChanUpgradeTry      FLUSHING
//!   ChanUpgradeAck      FLUSHING
//!                                            ChanUpgradeConfirm  FLUSHING
//!   (flush)             FLUSHCOMPLETE        (flush)             FLUSHCOMPLETE
//!   ChanUpgradeOpen     OPEN                 ChanUpgradeOpen     OPEN
//! ```
//!
//! Failures which abort an upgrade (as opposed to failing the transaction)
//! are reported as [`Error::UpgradeError`].  In such case all writes of the
//! step are discarded, the channel is restored to OPEN and an error receipt
//! is written so the counterparty can cancel its side of the upgrade.

use ibc_ids::{ChannelId, Path, PortId};

use super::handshake::{
    check_connection_ordering, open_connection, single_hop,
};
use super::{
    ChannelEnd, Counterparty, ErrorReceipt, Order, State, Upgrade,
    UpgradeFields,
};
use crate::connection;
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::events::{UpgradeEvent, UpgradeEventKind};
use crate::msgs::{
    MsgChannelUpgradeAck, MsgChannelUpgradeCancel, MsgChannelUpgradeConfirm,
    MsgChannelUpgradeInit, MsgChannelUpgradeOpen, MsgChannelUpgradeTimeout,
    MsgChannelUpgradeTry, ResponseResult,
};
use crate::store::Store;
use crate::verify;

/// Proposes an upgrade of an open channel.
///
/// Returns the upgrade as stored (with version chosen by the application)
/// and the new upgrade sequence.
pub fn chan_upgrade_init(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeInit,
) -> Result<(Upgrade, u64)> {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    if !ctx.config.is_authority(&msg.signer) {
        return Err(Error::InvalidSigner(msg.signer.clone()));
    }
    ctx.router.lookup_module_by_port(port_id)?;
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Open])?;
    validate_self_upgrade_fields(ctx, &msg.fields, &channel)?;

    let fields = &msg.fields;
    let app = ctx.router.app(port_id)?;
    let version = discard_changes(&mut ctx.store, |store| {
        app.on_chan_upgrade_init(
            store,
            port_id,
            channel_id,
            fields.ordering,
            &fields.connection_hops,
            &fields.version,
        )
    })?;

    let fields = UpgradeFields { version, ..msg.fields.clone() };
    let (channel, upgrade) =
        write_upgrade_init(ctx, port_id, channel_id, channel, fields)?;

    log::info!(
        "channel {port_id}/{channel_id}: upgrade {} proposed",
        channel.upgrade_sequence
    );
    ctx.emit(
        UpgradeEvent::new(
            UpgradeEventKind::Init,
            port_id,
            channel_id,
            channel.upgrade_sequence,
        )
        .with_fields(&upgrade.fields),
    );
    Ok((upgrade, channel.upgrade_sequence))
}

/// Accepts counterparty’s upgrade proposal and starts flushing the channel.
///
/// On [`ResponseResult::Failure`] the upgrade has been aborted and an error
/// receipt written.  Returned sequence is the channel’s upgrade sequence
/// after the call.
pub fn chan_upgrade_try(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeTry,
) -> Result<(ResponseResult, Option<Upgrade>, u64)> {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    ctx.router.lookup_module_by_port(port_id)?;
    let sequence = ctx.channel(port_id, channel_id)?.upgrade_sequence;
    match run_upgrade_step(ctx, port_id, channel_id, |ctx| {
        upgrade_try(ctx, msg, sequence)
    })? {
        Some((upgrade, sequence)) => {
            Ok((ResponseResult::Success, Some(upgrade), sequence))
        }
        None => Ok((ResponseResult::Failure, None, sequence)),
    }
}

fn upgrade_try(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeTry,
    sequence: u64,
) -> Result<(Upgrade, u64)> {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let counterparty_fields = &msg.counterparty_upgrade_fields;
    let mut channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Open])?;
    let conn = open_connection(ctx, &channel)?;

    let mut upgrade = match ctx.upgrade(port_id, channel_id)? {
        // Both sides proposed an upgrade.  Our proposal stands.
        Some(upgrade) => upgrade,
        None => {
            let fields = UpgradeFields {
                ordering: counterparty_fields.ordering,
                connection_hops: msg.proposed_upgrade_connection_hops.clone(),
                version: counterparty_fields.version.clone(),
            };
            validate_self_upgrade_fields(ctx, &fields, &channel)?;
            let (mut updated, upgrade) =
                write_upgrade_init(ctx, port_id, channel_id, channel, fields)?;
            if msg.counterparty_upgrade_sequence > updated.upgrade_sequence {
                updated.upgrade_sequence = msg.counterparty_upgrade_sequence;
                ctx.set_channel(port_id, channel_id, &updated)?;
            }
            channel = updated;
            upgrade
        }
    };
    check_upgrade_compatibility(ctx, &upgrade.fields, counterparty_fields)?;

    let counterparty_port_id = &channel.counterparty.port_id;
    let counterparty_channel_id = channel.counterparty_channel_id()?;
    let expected = ChannelEnd {
        state: State::Open,
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
        &msg.proof_channel,
        counterparty_port_id,
        counterparty_channel_id,
        &expected,
    )?;

    if msg.counterparty_upgrade_sequence < channel.upgrade_sequence {
        let err = Error::InvalidUpgradeSequence {
            counterparty: msg.counterparty_upgrade_sequence,
            ours: channel.upgrade_sequence,
        };
        return Err(err.upgrade(sequence));
    }

    verify::verify_channel_upgrade(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_upgrade,
        counterparty_port_id,
        counterparty_channel_id,
        &Upgrade::new(counterparty_fields.clone()),
    )?;

    start_flushing(ctx, port_id, channel_id, &mut channel, &mut upgrade)?;

    let app = ctx.router.app(port_id)?;
    let fields = &upgrade.fields;
    let version = discard_changes(&mut ctx.store, |store| {
        app.on_chan_upgrade_try(
            store,
            port_id,
            channel_id,
            fields.ordering,
            &fields.connection_hops,
            &counterparty_fields.version,
        )
    })
    .map_err(|err| Error::from(err).upgrade(sequence))?;
    upgrade.fields.version = version;
    set_upgrade(ctx, port_id, channel_id, &upgrade)?;

    log::info!(
        "channel {port_id}/{channel_id}: upgrade {} accepted; OPEN -> FLUSHING",
        channel.upgrade_sequence
    );
    ctx.emit(
        UpgradeEvent::new(
            UpgradeEventKind::Try,
            port_id,
            channel_id,
            channel.upgrade_sequence,
        )
        .with_fields(&upgrade.fields),
    );
    Ok((upgrade, channel.upgrade_sequence))
}

/// Processes counterparty’s acceptance of our upgrade proposal.
pub fn chan_upgrade_ack(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeAck,
) -> Result<ResponseResult> {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    ctx.router.lookup_module_by_port(port_id)?;
    let done = run_upgrade_step(ctx, port_id, channel_id, |ctx| {
        upgrade_ack(ctx, msg)
    })?;
    Ok(step_result(done))
}

fn upgrade_ack(ctx: &mut IbcContext, msg: &MsgChannelUpgradeAck) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let counterparty_upgrade = &msg.counterparty_upgrade;
    let mut channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Open, State::Flushing])?;
    let conn = open_connection(ctx, &channel)?;

    let counterparty_port_id = &channel.counterparty.port_id;
    let counterparty_channel_id = channel.counterparty_channel_id()?;
    let expected = ChannelEnd {
        state: State::Flushing,
        ordering: channel.ordering,
        counterparty: Counterparty::new(
            port_id.clone(),
            Some(channel_id.clone()),
        ),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: channel.version.clone(),
        upgrade_sequence: channel.upgrade_sequence,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_channel,
        counterparty_port_id,
        counterparty_channel_id,
        &expected,
    )?;
    verify::verify_channel_upgrade(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_upgrade,
        counterparty_port_id,
        counterparty_channel_id,
        counterparty_upgrade,
    )?;

    let mut upgrade = expect_upgrade(ctx, port_id, channel_id)?;
    let sequence = channel.upgrade_sequence;
    let was_open = channel.is_open();
    if was_open {
        upgrade.fields.version = counterparty_upgrade.fields.version.clone();
    }
    check_upgrade_compatibility(
        ctx,
        &upgrade.fields,
        &counterparty_upgrade.fields,
    )
    .map_err(|err| err.upgrade(sequence))?;
    if was_open {
        start_flushing(ctx, port_id, channel_id, &mut channel, &mut upgrade)?;
    }
    let timeout = &counterparty_upgrade.timeout;
    if timeout.has_passed(ctx.host.height, ctx.host.timestamp) {
        return Err(Error::UpgradeTimeoutPassed.upgrade(sequence));
    }

    let app = ctx.router.app(port_id)?;
    let version = &counterparty_upgrade.fields.version;
    discard_changes(&mut ctx.store, |store| {
        app.on_chan_upgrade_ack(store, port_id, channel_id, version)
    })
    .map_err(|err| Error::from(err).upgrade(sequence))?;

    ctx.store.set_borsh(
        &Path::CounterpartyUpgrade(port_id.clone(), channel_id.clone()),
        counterparty_upgrade,
    )?;
    upgrade.fields.version = version.clone();
    set_upgrade(ctx, port_id, channel_id, &upgrade)?;

    log::info!(
        "channel {port_id}/{channel_id}: upgrade {sequence} acknowledged"
    );
    ctx.emit(
        UpgradeEvent::new(UpgradeEventKind::Ack, port_id, channel_id, sequence)
            .with_fields(&upgrade.fields),
    );
    complete_flush_if_done(ctx, port_id, channel_id, channel)?;
    Ok(())
}

/// Processes counterparty’s acknowledgement of the upgrade.  Opens the
/// upgraded channel right away if both sides have already flushed.
pub fn chan_upgrade_confirm(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeConfirm,
) -> Result<ResponseResult> {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    ctx.router.lookup_module_by_port(port_id)?;
    let done = run_upgrade_step(ctx, port_id, channel_id, |ctx| {
        upgrade_confirm(ctx, msg)
    })?;
    Ok(step_result(done))
}

fn upgrade_confirm(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeConfirm,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let counterparty_state = msg.counterparty_channel_state;
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::Flushing])?;
    if !matches!(counterparty_state, State::Flushing | State::FlushComplete) {
        return Err(Error::InvalidCounterpartyState(counterparty_state));
    }
    let conn = open_connection(ctx, &channel)?;

    let counterparty_port_id = &channel.counterparty.port_id;
    let counterparty_channel_id = channel.counterparty_channel_id()?;
    let expected = ChannelEnd {
        state: counterparty_state,
        ordering: channel.ordering,
        counterparty: Counterparty::new(
            port_id.clone(),
            Some(channel_id.clone()),
        ),
        connection_hops: vec![conn.counterparty_connection_id()?.clone()],
        version: channel.version.clone(),
        upgrade_sequence: channel.upgrade_sequence,
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_channel,
        counterparty_port_id,
        counterparty_channel_id,
        &expected,
    )?;
    verify::verify_channel_upgrade(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_upgrade,
        counterparty_port_id,
        counterparty_channel_id,
        &msg.counterparty_upgrade,
    )?;

    let sequence = channel.upgrade_sequence;
    let timeout = &msg.counterparty_upgrade.timeout;
    if timeout.has_passed(ctx.host.height, ctx.host.timestamp) {
        return Err(Error::UpgradeTimeoutPassed.upgrade(sequence));
    }

    ctx.store.set_borsh(
        &Path::CounterpartyUpgrade(port_id.clone(), channel_id.clone()),
        &msg.counterparty_upgrade,
    )?;
    log::info!("channel {port_id}/{channel_id}: upgrade {sequence} confirmed");
    ctx.emit(UpgradeEvent::new(
        UpgradeEventKind::Confirm,
        port_id,
        channel_id,
        sequence,
    ));

    let state = complete_flush_if_done(ctx, port_id, channel_id, channel)?;
    if state == State::FlushComplete &&
        counterparty_state == State::FlushComplete
    {
        write_upgrade_open(ctx, port_id, channel_id)?;
    }
    Ok(())
}

/// Switches a flushed channel to the upgraded fields once the counterparty
/// has flushed as well.
pub fn chan_upgrade_open(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeOpen,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    ctx.router.lookup_module_by_port(port_id)?;
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[State::FlushComplete])?;
    let conn = open_connection(ctx, &channel)?;
    let upgrade = expect_upgrade(ctx, port_id, channel_id)?;

    let counterparty =
        Counterparty::new(port_id.clone(), Some(channel_id.clone()));
    let expected = match msg.counterparty_channel_state {
        // Counterparty has already switched to the upgraded fields.
        State::Open => {
            let upgrade_connection_id =
                single_hop(&upgrade.fields.connection_hops)?;
            let upgrade_conn = ctx.connection(upgrade_connection_id)?;
            upgrade_conn.expect_state(
                upgrade_connection_id,
                connection::State::Open,
            )?;
            ChannelEnd {
                state: State::Open,
                ordering: upgrade.fields.ordering,
                counterparty,
                connection_hops: vec![upgrade_conn
                    .counterparty_connection_id()?
                    .clone()],
                version: upgrade.fields.version.clone(),
                upgrade_sequence: channel.upgrade_sequence,
            }
        }
        State::FlushComplete => ChannelEnd {
            state: State::FlushComplete,
            ordering: channel.ordering,
            counterparty,
            connection_hops: vec![conn.counterparty_connection_id()?.clone()],
            version: channel.version.clone(),
            upgrade_sequence: channel.upgrade_sequence,
        },
        state => return Err(Error::InvalidCounterpartyState(state)),
    };
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_channel,
        &channel.counterparty.port_id,
        channel.counterparty_channel_id()?,
        &expected,
    )?;

    write_upgrade_open(ctx, port_id, channel_id)
}

/// Aborts an upgrade whose timeout the counterparty has reached without
/// flushing.
pub fn chan_upgrade_timeout(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeTimeout,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let counterparty_channel = &msg.counterparty_channel;
    let channel = ctx.channel(port_id, channel_id)?;
    channel.expect_state(port_id, channel_id, &[
        State::Flushing,
        State::FlushComplete,
    ])?;
    let upgrade = expect_upgrade(ctx, port_id, channel_id)?;
    let conn = open_connection(ctx, &channel)?;

    let proof_timestamp =
        verify::proof_timestamp(ctx, &conn, msg.proof_height)?;
    if !upgrade.timeout.has_passed(msg.proof_height, proof_timestamp) {
        return Err(Error::UpgradeTimeoutNotReached);
    }

    match counterparty_channel.state {
        State::Open => {
            let upgrade_connection_id =
                single_hop(&upgrade.fields.connection_hops)?;
            let upgrade_conn = ctx.connection(upgrade_connection_id)?;
            let hops = [upgrade_conn.counterparty_connection_id()?.clone()];
            if upgrade.fields.version == counterparty_channel.version &&
                upgrade.fields.ordering == counterparty_channel.ordering &&
                counterparty_channel.connection_hops == hops
            {
                return Err(Error::UpgradeAlreadyOpen);
            }
        }
        State::Flushing => (),
        state => return Err(Error::InvalidCounterpartyState(state)),
    }
    if counterparty_channel.upgrade_sequence < channel.upgrade_sequence {
        return Err(Error::InvalidUpgradeSequence {
            counterparty: counterparty_channel.upgrade_sequence,
            ours: channel.upgrade_sequence,
        });
    }
    verify::verify_channel_state(
        ctx,
        &conn,
        msg.proof_height,
        &msg.proof_channel,
        &channel.counterparty.port_id,
        channel.counterparty_channel_id()?,
        counterparty_channel,
    )?;

    let sequence = channel.upgrade_sequence;
    restore_channel(
        ctx,
        port_id,
        channel_id,
        channel,
        sequence,
        &Error::UpgradeTimeoutPassed,
        UpgradeEventKind::Timeout,
    )
}

/// Cancels an upgrade.
///
/// The authority may cancel any upgrade which hasn’t finished flushing.
/// Anyone else needs to prove the counterparty has written an error receipt
/// for the current upgrade.
pub fn chan_upgrade_cancel(
    ctx: &mut IbcContext,
    msg: &MsgChannelUpgradeCancel,
) -> Result {
    let (port_id, channel_id) = (&msg.port_id, &msg.channel_id);
    let channel = ctx.channel(port_id, channel_id)?;
    expect_upgrade(ctx, port_id, channel_id)?;

    let sequence = if ctx.config.is_authority(&msg.signer) &&
        channel.state != State::FlushComplete
    {
        channel.upgrade_sequence
    } else {
        let receipt = &msg.error_receipt;
        if msg.proof_error_receipt.is_empty() {
            return Err(Error::InvalidErrorReceipt("missing proof"));
        }
        if receipt.sequence < channel.upgrade_sequence {
            return Err(Error::InvalidUpgradeSequence {
                counterparty: receipt.sequence,
                ours: channel.upgrade_sequence,
            });
        }
        let conn = open_connection(ctx, &channel)?;
        verify::verify_channel_upgrade_error(
            ctx,
            &conn,
            msg.proof_height,
            &msg.proof_error_receipt,
            &channel.counterparty.port_id,
            channel.counterparty_channel_id()?,
            receipt,
        )?;
        receipt.sequence
    };

    restore_channel(
        ctx,
        port_id,
        channel_id,
        channel,
        sequence,
        &Error::UpgradeCancelled,
        UpgradeEventKind::Cancel,
    )
}

/// Moves a flushing channel to FLUSHCOMPLETE once all in-flight packets
/// have been acknowledged or timed out.  Aborts the upgrade instead if the
/// counterparty’s upgrade timeout has passed.
///
/// Does nothing if the channel isn’t flushing or the counterparty’s upgrade
/// isn’t known yet.
pub(crate) fn handle_flush_state(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result {
    let channel = ctx.channel(port_id, channel_id)?;
    if channel.state != State::Flushing {
        return Ok(());
    }
    let Some(counterparty_upgrade) =
        ctx.counterparty_upgrade(port_id, channel_id)?
    else {
        return Ok(());
    };
    let timeout = &counterparty_upgrade.timeout;
    if timeout.has_passed(ctx.host.height, ctx.host.timestamp) {
        abort_upgrade(ctx, port_id, channel_id, &Error::UpgradeTimeoutPassed)
    } else {
        complete_flush_if_done(ctx, port_id, channel_id, channel).map(|_| ())
    }
}

/// Aborts the channel’s upgrade writing an error receipt at the current
/// upgrade sequence.
pub(crate) fn abort_upgrade(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    err: &Error,
) -> Result {
    let channel = ctx.channel(port_id, channel_id)?;
    let sequence = channel.upgrade_sequence;
    restore_channel(
        ctx,
        port_id,
        channel_id,
        channel,
        sequence,
        err,
        UpgradeEventKind::Error,
    )
}

/// Runs an upgrade step in a child transaction.
///
/// If the step fails with [`Error::UpgradeError`], its writes are discarded,
/// the upgrade is aborted at the error’s sequence and `Ok(None)` returned.
/// Any other error is propagated.
fn run_upgrade_step<T>(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    step: impl FnOnce(&mut IbcContext) -> Result<T>,
) -> Result<Option<T>> {
    let checkpoint = ctx.checkpoint();
    match step(ctx) {
        Ok(value) => {
            ctx.commit(checkpoint);
            Ok(Some(value))
        }
        Err(Error::UpgradeError { sequence, source }) => {
            ctx.rollback(checkpoint);
            let channel = ctx.channel(port_id, channel_id)?;
            restore_channel(
                ctx,
                port_id,
                channel_id,
                channel,
                sequence,
                &source,
                UpgradeEventKind::Error,
            )?;
            Ok(None)
        }
        Err(err) => {
            ctx.rollback(checkpoint);
            Err(err)
        }
    }
}

fn step_result(done: Option<()>) -> ResponseResult {
    match done {
        Some(()) => ResponseResult::Success,
        None => ResponseResult::Failure,
    }
}

/// Runs an application callback discarding any writes it makes.
fn discard_changes<T>(
    store: &mut Store,
    callback: impl FnOnce(&mut Store) -> T,
) -> T {
    let checkpoint = store.checkpoint();
    let res = callback(store);
    store.rollback(checkpoint);
    res
}

/// Checks fields proposed for an upgrade of this channel end.
fn validate_self_upgrade_fields(
    ctx: &IbcContext,
    fields: &UpgradeFields,
    channel: &ChannelEnd,
) -> Result {
    if *fields == channel.upgrade_fields() {
        return Err(Error::UpgradeFieldsUnchanged);
    }
    let connection_id = single_hop(&fields.connection_hops)?;
    let conn = ctx.connection(connection_id)?;
    conn.expect_state(connection_id, connection::State::Open)?;
    check_connection_ordering(&conn, fields.ordering)
}

/// Checks that counterparty’s upgrade agrees with ours.
fn check_upgrade_compatibility(
    ctx: &IbcContext,
    ours: &UpgradeFields,
    theirs: &UpgradeFields,
) -> Result {
    if ours.ordering != theirs.ordering {
        return Err(Error::IncompatibleCounterpartyUpgrade("ordering mismatch"));
    }
    if ours.version != theirs.version {
        return Err(Error::IncompatibleCounterpartyUpgrade("version mismatch"));
    }
    let connection_id = single_hop(&ours.connection_hops)?;
    let conn = ctx.connection(connection_id)?;
    conn.expect_state(connection_id, connection::State::Open)?;
    let counterparty_connection_id = conn.counterparty.connection_id.as_ref();
    if theirs.connection_hops.first() != counterparty_connection_id {
        return Err(Error::IncompatibleCounterpartyUpgrade(
            "connection hops mismatch",
        ));
    }
    Ok(())
}

/// Bumps the upgrade sequence and stores a fresh upgrade.  An upgrade still
/// in progress is replaced and an error receipt written for it.
fn write_upgrade_init(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    mut channel: ChannelEnd,
    fields: UpgradeFields,
) -> Result<(ChannelEnd, Upgrade)> {
    if ctx.upgrade(port_id, channel_id)?.is_some() {
        let receipt = ErrorReceipt::new(
            channel.upgrade_sequence,
            &Error::UpgradeReplaced,
        );
        ctx.store.set_borsh(
            &Path::UpgradeError(port_id.clone(), channel_id.clone()),
            &receipt,
        )?;
    }
    channel.upgrade_sequence = channel
        .upgrade_sequence
        .checked_add(1)
        .ok_or(Error::Internal("upgrade sequence overflow"))?;
    ctx.set_channel(port_id, channel_id, &channel)?;
    let upgrade = Upgrade::new(fields);
    set_upgrade(ctx, port_id, channel_id, &upgrade)?;
    Ok((channel, upgrade))
}

/// Moves the channel to FLUSHING and sets upgrade timeout and the last
/// packet sequence sent with the old fields.
fn start_flushing(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    channel: &mut ChannelEnd,
    upgrade: &mut Upgrade,
) -> Result {
    open_connection(ctx, channel)?;
    channel.state = State::Flushing;
    ctx.set_channel(port_id, channel_id, channel)?;

    upgrade.timeout.height = Default::default();
    upgrade.timeout.timestamp =
        ctx.host.timestamp.add(ctx.config.upgrade_timeout());
    upgrade.next_sequence_send = ctx.store.sequence(&Path::NextSequenceSend(
        port_id.clone(),
        channel_id.clone(),
    ))?;
    set_upgrade(ctx, port_id, channel_id, upgrade)
}

/// Marks a flushing channel FLUSHCOMPLETE if it has no packets in flight.
/// Returns channel’s resulting state.
fn complete_flush_if_done(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    mut channel: ChannelEnd,
) -> Result<State> {
    if channel.state == State::Flushing &&
        !ctx.has_inflight_packets(port_id, channel_id)
    {
        channel.state = State::FlushComplete;
        ctx.set_channel(port_id, channel_id, &channel)?;
        log::info!("channel {port_id}/{channel_id}: FLUSHING -> FLUSHCOMPLETE");
        ctx.emit(UpgradeEvent::new(
            UpgradeEventKind::FlushComplete,
            port_id,
            channel_id,
            channel.upgrade_sequence,
        ));
    }
    Ok(channel.state)
}

/// Switches the channel to the upgraded fields and reopens it.
fn write_upgrade_open(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result {
    let mut channel = ctx.channel(port_id, channel_id)?;
    let upgrade = expect_upgrade(ctx, port_id, channel_id)?;
    let counterparty_upgrade = ctx
        .counterparty_upgrade(port_id, channel_id)?
        .ok_or_else(|| Error::UpgradeNotFound {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        })?;
    let fields = &upgrade.fields;

    ctx.router.app(port_id)?.on_chan_upgrade_open(
        &mut ctx.store,
        port_id,
        channel_id,
        fields.ordering,
        &fields.connection_hops,
        &fields.version,
    );

    let (port, chan) = (port_id.clone(), channel_id.clone());
    if channel.ordering == Order::Unordered && fields.ordering == Order::Ordered
    {
        ctx.store.set_sequence(
            &Path::NextSequenceRecv(port.clone(), chan.clone()),
            counterparty_upgrade.next_sequence_send,
        );
        ctx.store.set_sequence(
            &Path::NextSequenceAck(port.clone(), chan.clone()),
            upgrade.next_sequence_send,
        );
    }
    ctx.store.set_sequence(
        &Path::RecvStartSequence(port.clone(), chan.clone()),
        counterparty_upgrade.next_sequence_send,
    );
    let pruning_path = Path::PruningSequenceStart(port.clone(), chan.clone());
    if !ctx.store.has(&pruning_path) {
        ctx.store.set_sequence(&pruning_path, 1);
    }

    let previous = channel.state;
    channel.state = State::Open;
    channel.ordering = fields.ordering;
    channel.connection_hops = fields.connection_hops.clone();
    channel.version = fields.version.clone();
    ctx.set_channel(port_id, channel_id, &channel)?;
    ctx.store.delete_path(&Path::Upgrade(port.clone(), chan.clone()));
    ctx.store.delete_path(&Path::CounterpartyUpgrade(port, chan));

    log::info!(
        "channel {port_id}/{channel_id}: upgrade {} complete; {previous} -> \
         OPEN",
        channel.upgrade_sequence
    );
    ctx.emit(
        UpgradeEvent::new(
            UpgradeEventKind::Open,
            port_id,
            channel_id,
            channel.upgrade_sequence,
        )
        .with_fields(fields),
    );
    Ok(())
}

/// Reopens the channel with its old fields, drops upgrade state and writes
/// an error receipt at `sequence`.
fn restore_channel(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    mut channel: ChannelEnd,
    sequence: u64,
    err: &Error,
    kind: UpgradeEventKind,
) -> Result {
    let previous = channel.state;
    channel.state = State::Open;
    channel.upgrade_sequence = sequence;
    ctx.set_channel(port_id, channel_id, &channel)?;

    let (port, chan) = (port_id.clone(), channel_id.clone());
    ctx.store.delete_path(&Path::Upgrade(port.clone(), chan.clone()));
    ctx.store
        .delete_path(&Path::CounterpartyUpgrade(port.clone(), chan.clone()));
    let receipt = ErrorReceipt::new(sequence, err);
    ctx.store.set_borsh(&Path::UpgradeError(port, chan), &receipt)?;

    log::warn!(
        "channel {port_id}/{channel_id}: upgrade {sequence} aborted: {err}; \
         {previous} -> OPEN"
    );
    ctx.emit(
        UpgradeEvent::new(kind, port_id, channel_id, sequence)
            .with_error_receipt(receipt),
    );
    Ok(())
}

fn expect_upgrade(
    ctx: &IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Result<Upgrade> {
    ctx.upgrade(port_id, channel_id)?.ok_or_else(|| Error::UpgradeNotFound {
        port_id: port_id.clone(),
        channel_id: channel_id.clone(),
    })
}

fn set_upgrade(
    ctx: &mut IbcContext,
    port_id: &PortId,
    channel_id: &ChannelId,
    upgrade: &Upgrade,
) -> Result {
    let path = Path::Upgrade(port_id.clone(), channel_id.clone());
    ctx.store.set_borsh(&path, upgrade)
}
