//! Interface to light clients.
//!
//! Verifying counterparty state is delegated to light clients.  The core only
//! needs to query a client’s status and consensus states and ask it to verify
//! membership and non-membership proofs.  Clients keep their state in the
//! IBC store and receive a read-only view of it with every call.

use ibc_ids::{ClientId, Height, MerklePath, Timestamp};

use crate::context::Host;
use crate::store::Store;

/// Status of a light client.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
    strum::Display,
)]
pub enum Status {
    Active,
    /// Client has been frozen due to misbehaviour.
    Frozen,
    /// Client’s latest consensus state is older than its trusting period.
    Expired,
    Unauthorized,
}

#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum ClientError {
    #[display(fmt = "client {} not found", _0)]
    ClientNotFound(ClientId),
    #[display(fmt = "no client implementation for {}", _0)]
    UnknownClientType(ClientId),
    #[display(
        fmt = "client {} has no consensus state at {}",
        client_id,
        height
    )]
    ConsensusStateNotFound { client_id: ClientId, height: Height },
    #[display(fmt = "invalid self client: {}", _0)]
    InvalidSelfClient(String),
    #[display(fmt = "invalid proof: {}", _0)]
    InvalidProof(String),
    #[display(fmt = "failed decoding {}", _0)]
    Decode(String),
}

pub type Result<T = (), E = ClientError> = core::result::Result<T, E>;

/// Read-only view of the chain passed to light clients.
#[derive(Clone, Copy)]
pub struct ClientCtx<'a> {
    pub store: &'a Store,
    pub host: &'a Host,
}

/// A light client implementation.
///
/// A single implementation serves all clients of a given client type.  Client
/// id is passed to every method which operates on a particular client.
pub trait LightClient {
    fn status(&self, ctx: ClientCtx, client_id: &ClientId) -> Result<Status>;

    /// Returns encoded client state.
    fn client_state(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
    ) -> Result<Vec<u8>>;

    fn latest_height(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
    ) -> Result<Height>;

    /// Returns encoded consensus state at given height.
    fn consensus_state(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<Vec<u8>>;

    /// Returns timestamp of the counterparty at given height.
    fn timestamp_at_height(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<Timestamp>;

    /// Returns time and height of this chain at the moment the consensus
    /// state at given height was stored.
    ///
    /// Used to enforce connection delay periods.
    fn processed_at(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<(Timestamp, Height)>;

    /// Returns encoded consensus state of this chain at given height as
    /// the counterparty’s client of this type would store it.
    fn self_consensus_state(
        &self,
        ctx: ClientCtx,
        height: Height,
    ) -> Result<Vec<u8>>;

    /// Validates client state the counterparty keeps for this chain.
    fn validate_self_client(
        &self,
        ctx: ClientCtx,
        client_state: &[u8],
    ) -> Result;

    fn verify_membership(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
        proof: &[u8],
        path: &MerklePath,
        value: &[u8],
    ) -> Result;

    fn verify_non_membership(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
        proof: &[u8],
        path: &MerklePath,
    ) -> Result;
}

/// Client verifying proofs against this chain’s own store.
///
/// Backs the localhost connection.  Proofs are ignored since the state can be
/// inspected directly.
pub struct LocalhostClient;

impl LocalhostClient {
    fn lookup<'a>(
        ctx: ClientCtx<'a>,
        path: &MerklePath,
    ) -> Result<Option<&'a [u8]>> {
        let key = path
            .key_path
            .last()
            .ok_or_else(|| ClientError::InvalidProof("empty path".into()))?;
        let key = core::str::from_utf8(key)
            .map_err(|_| ClientError::InvalidProof("non-UTF-8 key".into()))?;
        Ok(ctx.store.get(key))
    }
}

impl LightClient for LocalhostClient {
    fn status(&self, _: ClientCtx, _: &ClientId) -> Result<Status> {
        Ok(Status::Active)
    }

    fn client_state(&self, _: ClientCtx, _: &ClientId) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn latest_height(&self, ctx: ClientCtx, _: &ClientId) -> Result<Height> {
        Ok(ctx.host.height)
    }

    fn consensus_state(
        &self,
        _: ClientCtx,
        _: &ClientId,
        _: Height,
    ) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn timestamp_at_height(
        &self,
        ctx: ClientCtx,
        _: &ClientId,
        _: Height,
    ) -> Result<Timestamp> {
        Ok(ctx.host.timestamp)
    }

    fn processed_at(
        &self,
        ctx: ClientCtx,
        _: &ClientId,
        _: Height,
    ) -> Result<(Timestamp, Height)> {
        Ok((ctx.host.timestamp, ctx.host.height))
    }

    fn self_consensus_state(&self, _: ClientCtx, _: Height) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn validate_self_client(&self, _: ClientCtx, _: &[u8]) -> Result {
        Ok(())
    }

    fn verify_membership(
        &self,
        ctx: ClientCtx,
        _: &ClientId,
        _: Height,
        _: &[u8],
        path: &MerklePath,
        value: &[u8],
    ) -> Result {
        match Self::lookup(ctx, path)? {
            Some(stored) if stored == value => Ok(()),
            Some(_) => Err(ClientError::InvalidProof("value mismatch".into())),
            None => Err(ClientError::InvalidProof("value not found".into())),
        }
    }

    fn verify_non_membership(
        &self,
        ctx: ClientCtx,
        _: &ClientId,
        _: Height,
        _: &[u8],
        path: &MerklePath,
    ) -> Result {
        match Self::lookup(ctx, path)? {
            None => Ok(()),
            Some(_) => Err(ClientError::InvalidProof("value exists".into())),
        }
    }
}
