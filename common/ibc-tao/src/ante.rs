//! Mempool filter rejecting transactions which only relay packets someone
//! else has already relayed.
//!
//! Relayers race to deliver the same packets.  Redundant packet messages
//! succeed as no-ops during execution so a mixed transaction isn’t lost.
//! A transaction consisting solely of such messages is however rejected
//! before it enters the mempool.

use crate::channel::{packet, timeout};
use crate::context::IbcContext;
use crate::error::{Error, Result};
use crate::msgs::{Msg, ResponseResult};

/// Mode in which a transaction is being processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum TxMode {
    /// New transaction entering the mempool.
    CheckTx,
    /// Transaction already in the mempool re-checked after a block.
    ReCheckTx,
    Simulate,
    Deliver,
}

/// Checks whether a transaction is worth admitting to the mempool.
///
/// Fails with [`Error::RedundantTx`] if the transaction contains at least
/// one packet message and all of its packet messages would be no-ops.  Fails
/// with the underlying error if any packet message is invalid.  Never
/// modifies the context.
pub fn check_tx(ctx: &mut IbcContext, mode: TxMode, msgs: &[Msg]) -> Result {
    if !matches!(mode, TxMode::CheckTx | TxMode::ReCheckTx) {
        return Ok(());
    }
    let checkpoint = ctx.checkpoint();
    let res = count_redundant(ctx, mode, msgs);
    ctx.rollback(checkpoint);

    match res? {
        Some((packets, redundant)) if packets > 0 && packets == redundant => {
            log::debug!("check_tx: all {packets} packet messages redundant");
            Err(Error::RedundantTx)
        }
        _ => Ok(()),
    }
}

/// Returns number of packet messages and how many of them are redundant or
/// `None` if the transaction contains a message other than a packet message
/// or client update.
fn count_redundant(
    ctx: &mut IbcContext,
    mode: TxMode,
    msgs: &[Msg],
) -> Result<Option<(usize, usize)>> {
    let mut packets = 0;
    let mut redundant = 0;
    for msg in msgs {
        let result = match msg {
            Msg::RecvPacket(msg) => {
                let verify_proof = mode != TxMode::ReCheckTx;
                packet::recv_packet_core(ctx, msg, verify_proof)?
            }
            Msg::Acknowledgement(msg) => {
                packet::acknowledge_packet_core(ctx, msg)?
            }
            Msg::Timeout(msg) => timeout::timeout_packet_check(ctx, msg)?,
            Msg::TimeoutOnClose(msg) => {
                timeout::timeout_on_close_check(ctx, msg)?
            }
            Msg::UpdateClient(_) => continue,
            _ => return Ok(None),
        };
        packets += 1;
        if result == ResponseResult::NoOp {
            redundant += 1;
        }
    }
    Ok(Some((packets, redundant)))
}
