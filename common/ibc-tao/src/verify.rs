//! Verification of counterparty state.
//!
//! Every proof is checked against the client backing a connection.  Before
//! the client is asked to verify the proof, the core checks that the client
//! is active, that it has been updated to the proof height and, for packet
//! proofs, that the connection’s delay period has passed since the consensus
//! state at the proof height was stored.

use core::time::Duration;

use borsh::BorshSerialize;
use ibc_ids::{
    ChannelId, ClientId, ConnectionId, Height, Path, PortId, Timestamp,
};
use lib::hash::CryptoHash;

use crate::channel::{self, ChannelEnd, ErrorReceipt, Upgrade};
use crate::client::{ClientError, LightClient};
use crate::connection::ConnectionEnd;
use crate::context::IbcContext;
use crate::error::{Error, Result};

/// Value stored under receipt paths.
pub const RECEIPT_VALUE: &[u8] = &[1];

/// Time and block delay a proof must age before being accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delay {
    pub time: Duration,
    pub blocks: u64,
}

impl Delay {
    pub const ZERO: Self = Self { time: Duration::ZERO, blocks: 0 };

    /// Returns delay for packet proofs on given connection.
    pub fn for_connection(ctx: &IbcContext, conn: &ConnectionEnd) -> Self {
        let time = conn.delay_period();
        Self { time, blocks: ctx.config.block_delay(time) }
    }

    fn is_zero(&self) -> bool { *self == Self::ZERO }
}

pub(crate) fn encode(value: &impl BorshSerialize) -> Result<Vec<u8>> {
    value
        .try_to_vec()
        .map_err(|_| Error::Internal("borsh serialisation failed"))
}

/// Performs checks common to membership and non-membership verification and
/// returns the light client to verify the proof with.
fn check_client<'a>(
    ctx: &'a IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    delay: Delay,
) -> Result<&'a dyn LightClient> {
    let client_id = &conn.client_id;
    ctx.ensure_client_active(client_id)?;
    let client = ctx.client(client_id)?;
    let client_ctx = ctx.client_ctx();

    check_height(ctx, client, client_id, height)?;

    if !delay.is_zero() {
        let (processed_time, processed_height) =
            client.processed_at(client_ctx, client_id, height)?;
        let earliest_time = processed_time.add(delay.time);
        let earliest_height = processed_height.add(delay.blocks);
        if ctx.host.timestamp < earliest_time ||
            ctx.host.height < earliest_height
        {
            return Err(Error::DelayPeriodNotPassed {
                current_time: ctx.host.timestamp,
                earliest_time,
                current_height: ctx.host.height,
                earliest_height,
            });
        }
    }

    Ok(client)
}

/// Returns the counterparty’s timestamp at proof height.
///
/// Fails with [`Error::InvalidHeight`] if the client hasn’t been updated to
/// that height yet.
pub fn proof_timestamp(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
) -> Result<Timestamp> {
    let client_id = &conn.client_id;
    let client = ctx.client(client_id)?;
    check_height(ctx, client, client_id, height)?;
    Ok(client.timestamp_at_height(ctx.client_ctx(), client_id, height)?)
}

/// Fails unless the client has been updated to given height.
fn check_height(
    ctx: &IbcContext,
    client: &dyn LightClient,
    client_id: &ClientId,
    height: Height,
) -> Result {
    let latest_height = client.latest_height(ctx.client_ctx(), client_id)?;
    if height > latest_height {
        Err(Error::InvalidHeight { proof_height: height, latest_height })
    } else {
        Ok(())
    }
}

fn proof_error(path: &Path, err: ClientError) -> Error {
    match err {
        ClientError::InvalidProof(reason) => {
            Error::InvalidProof { path: path.to_key(), reason }
        }
        err => err.into(),
    }
}

/// Verifies that the counterparty stores `value` under `path`.
pub fn verify_membership(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    delay: Delay,
    proof: &[u8],
    path: Path,
    value: &[u8],
) -> Result {
    let client = check_client(ctx, conn, height, delay)?;
    let merkle_path = ibc_ids::apply_prefix(&conn.counterparty.prefix, &path)?;
    client
        .verify_membership(
            ctx.client_ctx(),
            &conn.client_id,
            height,
            proof,
            &merkle_path,
            value,
        )
        .map_err(|err| proof_error(&path, err))
}

/// Verifies that the counterparty has nothing stored under `path`.
pub fn verify_non_membership(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    delay: Delay,
    proof: &[u8],
    path: Path,
) -> Result {
    let client = check_client(ctx, conn, height, delay)?;
    let merkle_path = ibc_ids::apply_prefix(&conn.counterparty.prefix, &path)?;
    client
        .verify_non_membership(
            ctx.client_ctx(),
            &conn.client_id,
            height,
            proof,
            &merkle_path,
        )
        .map_err(|err| proof_error(&path, err))
}

// ==== Handshake proofs =======================================================

/// Verifies client state the counterparty keeps for this chain.
pub fn verify_client_state(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    client_state: &[u8],
) -> Result {
    let path = Path::ClientState(conn.counterparty.client_id.clone());
    verify_membership(ctx, conn, height, Delay::ZERO, proof, path, client_state)
}

/// Verifies consensus state of this chain the counterparty stored at
/// `consensus_height`.
pub fn verify_client_consensus_state(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    consensus_height: Height,
    consensus_state: &[u8],
) -> Result {
    let path = Path::ConsensusState(
        conn.counterparty.client_id.clone(),
        consensus_height,
    );
    verify_membership(
        ctx,
        conn,
        height,
        Delay::ZERO,
        proof,
        path,
        consensus_state,
    )
}

pub fn verify_connection_state(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    connection_id: &ConnectionId,
    expected: &ConnectionEnd,
) -> Result {
    let path = Path::Connection(connection_id.clone());
    let value = encode(expected)?;
    verify_membership(ctx, conn, height, Delay::ZERO, proof, path, &value)
}

pub fn verify_channel_state(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    expected: &ChannelEnd,
) -> Result {
    let path = Path::ChannelEnd(port_id.clone(), channel_id.clone());
    let value = encode(expected)?;
    verify_membership(ctx, conn, height, Delay::ZERO, proof, path, &value)
}

pub fn verify_channel_upgrade(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    upgrade: &Upgrade,
) -> Result {
    let path = Path::Upgrade(port_id.clone(), channel_id.clone());
    let value = encode(upgrade)?;
    verify_membership(ctx, conn, height, Delay::ZERO, proof, path, &value)
}

pub fn verify_channel_upgrade_error(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    receipt: &ErrorReceipt,
) -> Result {
    let path = Path::UpgradeError(port_id.clone(), channel_id.clone());
    let value = encode(receipt)?;
    verify_membership(ctx, conn, height, Delay::ZERO, proof, path, &value)
}

// ==== Packet proofs ==========================================================

pub fn verify_packet_commitment(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    sequence: u64,
    commitment: &CryptoHash,
) -> Result {
    let delay = Delay::for_connection(ctx, conn);
    let path = Path::Commitment(port_id.clone(), channel_id.clone(), sequence);
    let value = commitment.as_slice();
    verify_membership(ctx, conn, height, delay, proof, path, value)
}

pub fn verify_packet_acknowledgement(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    sequence: u64,
    acknowledgement: &[u8],
) -> Result {
    let delay = Delay::for_connection(ctx, conn);
    let path = Path::Ack(port_id.clone(), channel_id.clone(), sequence);
    let commitment = channel::ack_commitment(acknowledgement);
    let value = commitment.as_slice();
    verify_membership(ctx, conn, height, delay, proof, path, value)
}

pub fn verify_packet_receipt_absence(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    sequence: u64,
) -> Result {
    let delay = Delay::for_connection(ctx, conn);
    let path = Path::Receipt(port_id.clone(), channel_id.clone(), sequence);
    verify_non_membership(ctx, conn, height, delay, proof, path)
}

pub fn verify_next_sequence_recv(
    ctx: &IbcContext,
    conn: &ConnectionEnd,
    height: Height,
    proof: &[u8],
    port_id: &PortId,
    channel_id: &ChannelId,
    next_sequence_recv: u64,
) -> Result {
    let delay = Delay::for_connection(ctx, conn);
    let path = Path::NextSequenceRecv(port_id.clone(), channel_id.clone());
    let value = next_sequence_recv.to_be_bytes();
    verify_membership(ctx, conn, height, delay, proof, path, &value)
}
