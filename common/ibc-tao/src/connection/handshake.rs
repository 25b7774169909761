//! Connection opening handshake.
//!
//! ```text
//!   chain A                              chain B
//!   ConnOpenInit  -> INIT
//!                                        ConnOpenTry     -> TRYOPEN
//!   ConnOpenAck   -> OPEN
//!                                        ConnOpenConfirm -> OPEN
//! ```
//!
//! Each step but the first proves the counterparty’s state at the previous
//! step.  Try and Ack additionally prove that the counterparty’s client of
//! this chain is valid and has stored a consensus state of this chain.

use ibc_ids::{ClientId, ConnectionId, Height, Path};

use super::{version, ConnectionEnd, Counterparty, State};
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::events::{ConnectionEvent, ConnectionEventKind};
use crate::msgs::{
    MsgConnectionOpenAck, MsgConnectionOpenConfirm, MsgConnectionOpenInit,
    MsgConnectionOpenTry,
};
use crate::verify;

pub fn conn_open_init(
    ctx: &mut IbcContext,
    msg: &MsgConnectionOpenInit,
) -> Result<ConnectionId> {
    let versions = match msg.version.as_ref() {
        Some(version) => {
            version::verify_supported_version(
                &ctx.config.compatible_versions,
                version,
            )?;
            vec![version.clone()]
        }
        None => ctx.config.compatible_versions.clone(),
    };
    ctx.ensure_client_active(&msg.client_id)?;

    let connection_id =
        ConnectionId::new(ctx.next_counter(&Path::NextConnectionSequence)?);
    let end = ConnectionEnd {
        state: State::Init,
        client_id: msg.client_id.clone(),
        counterparty: Counterparty {
            connection_id: None,
            ..msg.counterparty.clone()
        },
        versions,
        delay_period_ns: msg.delay_period_ns,
    };
    ctx.add_client_connection(&msg.client_id, connection_id.clone())?;
    ctx.set_connection(&connection_id, &end)?;

    log::info!("connection {connection_id}: UNINIT -> INIT");
    emit(ctx, ConnectionEventKind::OpenInit, &connection_id, &end);
    Ok(connection_id)
}

pub fn conn_open_try(
    ctx: &mut IbcContext,
    msg: &MsgConnectionOpenTry,
) -> Result<ConnectionId> {
    let counterparty_connection_id = msg
        .counterparty
        .connection_id
        .clone()
        .ok_or(Error::InvalidCounterparty("connection id not set"))?;
    version::validate_versions(&msg.counterparty_versions)?;
    let self_consensus_state = check_self_client(
        ctx,
        &msg.client_id,
        &msg.client_state,
        msg.consensus_height,
    )?;
    let version = version::pick_version(
        &ctx.config.compatible_versions,
        &msg.counterparty_versions,
    )?;

    let end = ConnectionEnd {
        state: State::TryOpen,
        client_id: msg.client_id.clone(),
        counterparty: msg.counterparty.clone(),
        versions: vec![version],
        delay_period_ns: msg.delay_period_ns,
    };
    let expected = ConnectionEnd {
        state: State::Init,
        client_id: msg.counterparty.client_id.clone(),
        counterparty: Counterparty {
            client_id: msg.client_id.clone(),
            connection_id: None,
            prefix: ctx.config.commitment_prefix.clone(),
        },
        versions: msg.counterparty_versions.clone(),
        delay_period_ns: msg.delay_period_ns,
    };
    verify::verify_connection_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_init,
        &counterparty_connection_id,
        &expected,
    )?;
    verify::verify_client_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_client,
        &msg.client_state,
    )?;
    verify::verify_client_consensus_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_consensus,
        msg.consensus_height,
        &self_consensus_state,
    )?;

    let connection_id =
        ConnectionId::new(ctx.next_counter(&Path::NextConnectionSequence)?);
    ctx.add_client_connection(&msg.client_id, connection_id.clone())?;
    ctx.set_connection(&connection_id, &end)?;

    log::info!("connection {connection_id}: UNINIT -> TRYOPEN");
    emit(ctx, ConnectionEventKind::OpenTry, &connection_id, &end);
    Ok(connection_id)
}

pub fn conn_open_ack(
    ctx: &mut IbcContext,
    msg: &MsgConnectionOpenAck,
) -> Result {
    let mut end = ctx.connection(&msg.connection_id)?;
    end.expect_state(&msg.connection_id, State::Init)?;
    version::verify_supported_version(&end.versions, &msg.version)?;
    let self_consensus_state = check_self_client(
        ctx,
        &end.client_id,
        &msg.client_state,
        msg.consensus_height,
    )?;

    end.counterparty.connection_id =
        Some(msg.counterparty_connection_id.clone());
    let expected = ConnectionEnd {
        state: State::TryOpen,
        client_id: end.counterparty.client_id.clone(),
        counterparty: Counterparty {
            client_id: end.client_id.clone(),
            connection_id: Some(msg.connection_id.clone()),
            prefix: ctx.config.commitment_prefix.clone(),
        },
        versions: vec![msg.version.clone()],
        delay_period_ns: end.delay_period_ns,
    };
    verify::verify_connection_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_try,
        &msg.counterparty_connection_id,
        &expected,
    )?;
    verify::verify_client_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_client,
        &msg.client_state,
    )?;
    verify::verify_client_consensus_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_consensus,
        msg.consensus_height,
        &self_consensus_state,
    )?;

    end.state = State::Open;
    end.versions = vec![msg.version.clone()];
    ctx.set_connection(&msg.connection_id, &end)?;

    log::info!("connection {}: INIT -> OPEN", msg.connection_id);
    emit(ctx, ConnectionEventKind::OpenAck, &msg.connection_id, &end);
    Ok(())
}

pub fn conn_open_confirm(
    ctx: &mut IbcContext,
    msg: &MsgConnectionOpenConfirm,
) -> Result {
    let mut end = ctx.connection(&msg.connection_id)?;
    end.expect_state(&msg.connection_id, State::TryOpen)?;

    let expected = ConnectionEnd {
        state: State::Open,
        client_id: end.counterparty.client_id.clone(),
        counterparty: Counterparty {
            client_id: end.client_id.clone(),
            connection_id: Some(msg.connection_id.clone()),
            prefix: ctx.config.commitment_prefix.clone(),
        },
        versions: end.versions.clone(),
        delay_period_ns: end.delay_period_ns,
    };
    verify::verify_connection_state(
        ctx,
        &end,
        msg.proof_height,
        &msg.proof_ack,
        end.counterparty_connection_id()?,
        &expected,
    )?;

    end.state = State::Open;
    ctx.set_connection(&msg.connection_id, &end)?;

    log::info!("connection {}: TRYOPEN -> OPEN", msg.connection_id);
    emit(ctx, ConnectionEventKind::OpenConfirm, &msg.connection_id, &end);
    Ok(())
}

/// Creates the connection to the chain itself.
///
/// The connection is open from the start and backed by the localhost client.
/// Fails if it already exists.
pub fn create_localhost_connection(
    ctx: &mut IbcContext,
) -> Result<ConnectionId> {
    let connection_id = ConnectionId::localhost();
    if ctx.store.has(&Path::Connection(connection_id.clone())) {
        return Err(Error::ConnectionAlreadyExists(connection_id));
    }
    let client_id = ClientId::localhost();
    let end = ConnectionEnd {
        state: State::Open,
        client_id: client_id.clone(),
        counterparty: Counterparty {
            client_id: client_id.clone(),
            connection_id: Some(connection_id.clone()),
            prefix: ctx.config.commitment_prefix.clone(),
        },
        versions: ctx.config.compatible_versions.clone(),
        delay_period_ns: 0,
    };
    ctx.add_client_connection(&client_id, connection_id.clone())?;
    ctx.set_connection(&connection_id, &end)?;
    log::info!("connection {connection_id}: created");
    Ok(connection_id)
}

/// Validates the counterparty’s client of this chain and returns the
/// consensus state it is expected to store at `consensus_height`.
fn check_self_client(
    ctx: &IbcContext,
    client_id: &ClientId,
    client_state: &[u8],
    consensus_height: Height,
) -> Result<Vec<u8>> {
    if consensus_height >= ctx.host.height {
        return Err(Error::InvalidConsensusHeight {
            consensus_height,
            host_height: ctx.host.height,
        });
    }
    let client = ctx.client(client_id)?;
    client.validate_self_client(ctx.client_ctx(), client_state)?;
    Ok(client.self_consensus_state(ctx.client_ctx(), consensus_height)?)
}

fn emit(
    ctx: &mut IbcContext,
    kind: ConnectionEventKind,
    connection_id: &ConnectionId,
    end: &ConnectionEnd,
) {
    ctx.emit(ConnectionEvent {
        kind,
        connection_id: connection_id.clone(),
        client_id: end.client_id.clone(),
        counterparty_client_id: end.counterparty.client_id.clone(),
        counterparty_connection_id: end.counterparty.connection_id.clone(),
    })
}
