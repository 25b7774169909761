//! Message dispatch.

use crate::channel::{handshake as chan, packet, timeout, upgrade};
use crate::connection::handshake as conn;
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::msgs::{Msg, MsgUpdateConfig, Response};

/// Executes a message.
///
/// The message runs in a child transaction of the context.  If it fails, none
/// of its writes nor events are kept.
pub fn deliver(ctx: &mut IbcContext, msg: &Msg) -> Result<Response> {
    let name = msg.name();
    log::debug!("deliver: {name}");
    let res = ctx.with_transaction(|ctx| dispatch(ctx, msg));
    match &res {
        Ok(response) => log::debug!("deliver: {name}: {response:?}"),
        Err(err) => log::warn!("deliver: {name}: {err}"),
    }
    res
}

fn dispatch(ctx: &mut IbcContext, msg: &Msg) -> Result<Response> {
    Ok(match msg {
        Msg::UpdateClient(_) => {
            return Err(Error::UnsupportedMessage("UpdateClient"));
        }
        Msg::UpdateConfig(msg) => {
            update_config(ctx, msg)?;
            Response::Empty
        }

        Msg::ConnectionOpenInit(msg) => Response::ConnectionOpenInit {
            connection_id: conn::conn_open_init(ctx, msg)?,
        },
        Msg::ConnectionOpenTry(msg) => Response::ConnectionOpenTry {
            connection_id: conn::conn_open_try(ctx, msg)?,
        },
        Msg::ConnectionOpenAck(msg) => {
            conn::conn_open_ack(ctx, msg)?;
            Response::Empty
        }
        Msg::ConnectionOpenConfirm(msg) => {
            conn::conn_open_confirm(ctx, msg)?;
            Response::Empty
        }

        Msg::ChannelOpenInit(msg) => {
            let (channel_id, version) = chan::chan_open_init(ctx, msg)?;
            Response::ChannelOpenInit { channel_id, version }
        }
        Msg::ChannelOpenTry(msg) => {
            let (channel_id, version) = chan::chan_open_try(ctx, msg)?;
            Response::ChannelOpenTry { channel_id, version }
        }
        Msg::ChannelOpenAck(msg) => {
            chan::chan_open_ack(ctx, msg)?;
            Response::Empty
        }
        Msg::ChannelOpenConfirm(msg) => {
            chan::chan_open_confirm(ctx, msg)?;
            Response::Empty
        }
        Msg::ChannelCloseInit(msg) => {
            chan::chan_close_init(ctx, msg)?;
            Response::Empty
        }
        Msg::ChannelCloseConfirm(msg) => {
            chan::chan_close_confirm(ctx, msg)?;
            Response::Empty
        }

        Msg::RecvPacket(msg) => {
            Response::Packet(packet::recv_packet(ctx, msg)?)
        }
        Msg::Acknowledgement(msg) => {
            Response::Packet(packet::acknowledge_packet(ctx, msg)?)
        }
        Msg::Timeout(msg) => {
            Response::Packet(timeout::timeout_packet(ctx, msg)?)
        }
        Msg::TimeoutOnClose(msg) => {
            Response::Packet(timeout::timeout_on_close(ctx, msg)?)
        }
        Msg::PruneAcknowledgements(msg) => {
            let (pruned, remaining) = packet::prune_acknowledgements(
                ctx,
                &msg.port_id,
                &msg.channel_id,
                msg.limit,
            )?;
            Response::PruneAcknowledgements { pruned, remaining }
        }

        Msg::ChannelUpgradeInit(msg) => {
            let (upgrade, upgrade_sequence) =
                upgrade::chan_upgrade_init(ctx, msg)?;
            Response::ChannelUpgradeInit { upgrade, upgrade_sequence }
        }
        Msg::ChannelUpgradeTry(msg) => {
            let (result, upgrade, upgrade_sequence) =
                upgrade::chan_upgrade_try(ctx, msg)?;
            Response::ChannelUpgradeTry { upgrade, upgrade_sequence, result }
        }
        Msg::ChannelUpgradeAck(msg) => {
            Response::Upgrade(upgrade::chan_upgrade_ack(ctx, msg)?)
        }
        Msg::ChannelUpgradeConfirm(msg) => {
            Response::Upgrade(upgrade::chan_upgrade_confirm(ctx, msg)?)
        }
        Msg::ChannelUpgradeOpen(msg) => {
            upgrade::chan_upgrade_open(ctx, msg)?;
            Response::Empty
        }
        Msg::ChannelUpgradeTimeout(msg) => {
            upgrade::chan_upgrade_timeout(ctx, msg)?;
            Response::Empty
        }
        Msg::ChannelUpgradeCancel(msg) => {
            upgrade::chan_upgrade_cancel(ctx, msg)?;
            Response::Empty
        }
    })
}

fn update_config(ctx: &mut IbcContext, msg: &MsgUpdateConfig) -> Result {
    if !ctx.config.is_authority(&msg.signer) {
        return Err(Error::InvalidSigner(msg.signer.clone()));
    }
    ctx.config.update(msg.config.clone())?;
    log::info!("config updated: {:?}", ctx.config);
    Ok(())
}
