//! Mock light client, application and a chain harness for tests.
//!
//! The mock client trusts whole-store snapshots: a proof is the complete
//! list of the counterparty’s store entries at given height and the
//! consensus state commits to the hash of that list.

use core::time::Duration;
use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use ibc_ids::{
    ChannelId, ClientId, ConnectionId, Height, MerklePath, Path, PortId,
    Timestamp,
};
use lib::hash::CryptoHash;

use crate::channel::{Acknowledgement, Counterparty, Order, Packet};
use crate::client::{ClientCtx, ClientError, LightClient, Result, Status};
use crate::config::Config;
use crate::context::IbcContext;
use crate::msgs::{Msg, Response};
use crate::router::{AppError, Application};
use crate::store::Store;

/// Client type under which [`MockClient`] is registered.
pub const CLIENT_TYPE: &str = "07-tendermint";
/// Signer configured as the authority of mock chains.
pub const AUTHORITY: &str = "authority";
pub const RELAYER: &str = "relayer";
/// Module id of [`MockApp`] on mock chains.  It binds the transfer port.
pub const MODULE_ID: &str = "transfer";

/// Time between consecutive blocks of a mock chain.
pub const BLOCK_TIME: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MockClientState {
    pub chain_id: String,
    pub latest_height: Height,
    pub frozen: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MockConsensusState {
    /// Hash of the snapshot of the chain’s store.
    pub root: CryptoHash,
    pub timestamp: Timestamp,
}

/// Entries of a store sorted by key.
type Snapshot = Vec<(String, Vec<u8>)>;

fn snapshot_root(snapshot: &Snapshot) -> CryptoHash {
    let mut builder = CryptoHash::builder();
    for (key, value) in snapshot {
        builder.update(&(key.len() as u64).to_be_bytes());
        builder.update(key.as_bytes());
        builder.update(&(value.len() as u64).to_be_bytes());
        builder.update(value);
    }
    builder.build()
}

/// Store key of the chain’s own consensus state at given height.
fn host_consensus_key(height: Height) -> String {
    format!("host/consensusStates/{height}")
}

fn get<T: BorshDeserialize>(ctx: ClientCtx, path: Path) -> Result<Option<T>> {
    ctx.store
        .get_raw(&path)
        .map(|bytes| {
            T::try_from_slice(bytes)
                .map_err(|_| ClientError::Decode(path.to_key()))
        })
        .transpose()
}

fn encode(value: &impl BorshSerialize) -> Vec<u8> {
    value.try_to_vec().expect("serialising into a vector")
}

/// Light client verifying store snapshots.
pub struct MockClient;

impl MockClient {
    fn state(ctx: ClientCtx, client_id: &ClientId) -> Result<MockClientState> {
        get(ctx, Path::ClientState(client_id.clone()))?
            .ok_or_else(|| ClientError::ClientNotFound(client_id.clone()))
    }

    fn consensus(
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<MockConsensusState> {
        let path = Path::ConsensusState(client_id.clone(), height);
        get(ctx, path)?.ok_or_else(|| ClientError::ConsensusStateNotFound {
            client_id: client_id.clone(),
            height,
        })
    }

    /// Checks the snapshot against consensus state at given height and
    /// returns value stored at the path.
    fn lookup(
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
        proof: &[u8],
        path: &MerklePath,
    ) -> Result<Option<Vec<u8>>> {
        let snapshot = Snapshot::try_from_slice(proof)
            .map_err(|_| {
                ClientError::InvalidProof("malformed snapshot".into())
            })?;
        let consensus = Self::consensus(ctx, client_id, height)?;
        if snapshot_root(&snapshot) != consensus.root {
            return Err(ClientError::InvalidProof("root mismatch".into()));
        }
        let key = path
            .key_path
            .last()
            .and_then(|key| core::str::from_utf8(key).ok())
            .ok_or_else(|| ClientError::InvalidProof("bad path".into()))?;
        Ok(snapshot
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|idx| snapshot[idx].1.clone()))
    }
}

impl LightClient for MockClient {
    fn status(&self, ctx: ClientCtx, client_id: &ClientId) -> Result<Status> {
        Ok(match Self::state(ctx, client_id)?.frozen {
            true => Status::Frozen,
            false => Status::Active,
        })
    }

    fn client_state(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
    ) -> Result<Vec<u8>> {
        Ok(encode(&Self::state(ctx, client_id)?))
    }

    fn latest_height(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
    ) -> Result<Height> {
        Ok(Self::state(ctx, client_id)?.latest_height)
    }

    fn consensus_state(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<Vec<u8>> {
        Ok(encode(&Self::consensus(ctx, client_id, height)?))
    }

    fn timestamp_at_height(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<Timestamp> {
        Ok(Self::consensus(ctx, client_id, height)?.timestamp)
    }

    fn processed_at(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
    ) -> Result<(Timestamp, Height)> {
        let not_found = || ClientError::ConsensusStateNotFound {
            client_id: client_id.clone(),
            height,
        };
        let time = get(ctx, Path::ProcessedTime(client_id.clone(), height))?
            .ok_or_else(not_found)?;
        let path = Path::ProcessedHeight(client_id.clone(), height);
        let processed = get(ctx, path)?.ok_or_else(not_found)?;
        Ok((time, processed))
    }

    fn self_consensus_state(
        &self,
        ctx: ClientCtx,
        height: Height,
    ) -> Result<Vec<u8>> {
        ctx.store
            .get(&host_consensus_key(height))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                let msg = format!("no consensus state at {height}");
                ClientError::InvalidSelfClient(msg)
            })
    }

    fn validate_self_client(
        &self,
        ctx: ClientCtx,
        client_state: &[u8],
    ) -> Result {
        let state = MockClientState::try_from_slice(client_state)
            .map_err(|_| ClientError::Decode("client state".into()))?;
        if state.chain_id != ctx.host.chain_id {
            Err(ClientError::InvalidSelfClient(format!(
                "chain id {} != {}",
                state.chain_id, ctx.host.chain_id
            )))
        } else if state.latest_height >= ctx.host.height {
            Err(ClientError::InvalidSelfClient(format!(
                "client height {} not below host height {}",
                state.latest_height, ctx.host.height
            )))
        } else if state.frozen {
            Err(ClientError::InvalidSelfClient("client frozen".into()))
        } else {
            Ok(())
        }
    }

    fn verify_membership(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
        proof: &[u8],
        path: &MerklePath,
        value: &[u8],
    ) -> Result {
        match Self::lookup(ctx, client_id, height, proof, path)? {
            Some(stored) if stored == value => Ok(()),
            Some(_) => Err(ClientError::InvalidProof("value mismatch".into())),
            None => Err(ClientError::InvalidProof("value not found".into())),
        }
    }

    fn verify_non_membership(
        &self,
        ctx: ClientCtx,
        client_id: &ClientId,
        height: Height,
        proof: &[u8],
        path: &MerklePath,
    ) -> Result {
        match Self::lookup(ctx, client_id, height, proof, path)? {
            None => Ok(()),
            Some(_) => Err(ClientError::InvalidProof("value exists".into())),
        }
    }
}

// ==== Application ============================================================

/// Application recording callbacks in the store.
///
/// Behaviour is driven by the data it is given:
/// - packet data `error` makes it return an error acknowledgement after
///   writing to the store;
/// - packet data `async` makes it defer the acknowledgement;
/// - version `reject` makes channel opening and upgrade callbacks fail;
/// - counterparty upgrade version containing `fail-ack` makes upgrade ack
///   fail.
#[derive(Default)]
pub struct MockApp;

impl MockApp {
    /// Key set by a packet whose handling failed.  Must never persist.
    pub const SIDE_EFFECT_KEY: &'static str = "mock/side-effect";

    /// Returns value of a counter incremented on every call of a callback.
    pub fn counter(store: &Store, name: &str) -> u64 {
        store
            .get(&Self::counter_key(name))
            .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
            .map_or(0, u64::from_be_bytes)
    }

    fn counter_key(name: &str) -> String { format!("mock/counters/{name}") }

    fn bump(store: &mut Store, name: &str) {
        let value = Self::counter(store, name) + 1;
        store.set(Self::counter_key(name), value.to_be_bytes().to_vec());
    }

    fn check_version(version: &str) -> Result<(), AppError> {
        if version == "reject" {
            Err(AppError::new("version rejected"))
        } else {
            Ok(())
        }
    }
}

impl Application for MockApp {
    fn on_chan_open_init(
        &mut self,
        store: &mut Store,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _counterparty: &Counterparty,
        version: &str,
    ) -> Result<String, AppError> {
        Self::check_version(version)?;
        Self::bump(store, "open");
        Ok(if version.is_empty() { "mock-1" } else { version }.into())
    }

    fn on_chan_open_try(
        &mut self,
        store: &mut Store,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _counterparty: &Counterparty,
        counterparty_version: &str,
    ) -> Result<String, AppError> {
        Self::check_version(counterparty_version)?;
        Self::bump(store, "open");
        Ok(counterparty_version.into())
    }

    fn on_chan_open_ack(
        &mut self,
        _store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _counterparty_channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), AppError> {
        Self::check_version(counterparty_version)
    }

    fn on_chan_open_confirm(
        &mut self,
        _store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
    ) -> Result<(), AppError> {
        Ok(())
    }

    fn on_chan_close_init(
        &mut self,
        store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
    ) -> Result<(), AppError> {
        Self::bump(store, "close");
        Ok(())
    }

    fn on_chan_close_confirm(
        &mut self,
        store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
    ) -> Result<(), AppError> {
        Self::bump(store, "close");
        Ok(())
    }

    fn on_recv_packet(
        &mut self,
        store: &mut Store,
        packet: &Packet,
        _relayer: &str,
    ) -> Option<Acknowledgement> {
        match packet.data.as_slice() {
            b"error" => {
                store.set(Self::SIDE_EFFECT_KEY.into(), vec![1]);
                Some(Acknowledgement {
                    success: false,
                    data: b"error".to_vec(),
                })
            }
            b"async" => None,
            _ => {
                Self::bump(store, "recv");
                Some(Acknowledgement { success: true, data: b"ok".to_vec() })
            }
        }
    }

    fn on_acknowledgement_packet(
        &mut self,
        store: &mut Store,
        _packet: &Packet,
        _acknowledgement: &[u8],
        _relayer: &str,
    ) -> Result<(), AppError> {
        Self::bump(store, "ack");
        Ok(())
    }

    fn on_timeout_packet(
        &mut self,
        store: &mut Store,
        _packet: &Packet,
        _relayer: &str,
    ) -> Result<(), AppError> {
        Self::bump(store, "timeout");
        Ok(())
    }

    fn on_chan_upgrade_init(
        &mut self,
        store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        version: &str,
    ) -> Result<String, AppError> {
        Self::check_version(version)?;
        store.set(Self::SIDE_EFFECT_KEY.into(), vec![1]);
        Ok(version.into())
    }

    fn on_chan_upgrade_try(
        &mut self,
        store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        counterparty_version: &str,
    ) -> Result<String, AppError> {
        Self::check_version(counterparty_version)?;
        store.set(Self::SIDE_EFFECT_KEY.into(), vec![1]);
        Ok(counterparty_version.into())
    }

    fn on_chan_upgrade_ack(
        &mut self,
        store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), AppError> {
        store.set(Self::SIDE_EFFECT_KEY.into(), vec![1]);
        if counterparty_version.contains("fail-ack") {
            Err(AppError::new("upgrade ack refused"))
        } else {
            Ok(())
        }
    }

    fn on_chan_upgrade_open(
        &mut self,
        store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        _version: &str,
    ) {
        Self::bump(store, "upgrade-open");
    }
}

// ==== Chain ==================================================================

/// A chain running the IBC core with the mock client and application.
///
/// Every [`commit`](Self::commit) snapshots the store so that proofs of its
/// state at any committed height can be produced later.
pub struct MockChain {
    pub ctx: IbcContext,
    last_height: Height,
    snapshots: BTreeMap<Height, Snapshot>,
    consensus: BTreeMap<Height, MockConsensusState>,
    next_client: u64,
}

impl MockChain {
    pub fn new(chain_id: &str) -> Self {
        let config = Config::with_authority(AUTHORITY);
        let mut ctx = IbcContext::new(chain_id, config);
        ctx.register_client_type(CLIENT_TYPE, Box::new(MockClient));
        ctx.router.add_module(MODULE_ID, Box::<MockApp>::default());
        ctx.router
            .bind_port(PortId::transfer(), MODULE_ID)
            .expect("binding transfer port");
        let genesis = Timestamp::from_nanos(1_700_000_000_000_000_000);
        ctx.begin_block(Height::new(0, 1), genesis);
        Self {
            ctx,
            last_height: Height::ZERO,
            snapshots: BTreeMap::new(),
            consensus: BTreeMap::new(),
            next_client: 0,
        }
    }

    pub fn chain_id(&self) -> &str { &self.ctx.host.chain_id }

    /// Returns the last committed height.
    pub fn height(&self) -> Height { self.last_height }

    /// Commits the current block and starts the next one.  Returns height of
    /// the committed block.
    pub fn commit(&mut self) -> Height {
        let height = self.ctx.host.height;
        let snapshot: Snapshot = self
            .ctx
            .store
            .iter()
            .map(|(key, value)| (key.to_owned(), value.to_vec()))
            .collect();
        let consensus = MockConsensusState {
            root: snapshot_root(&snapshot),
            timestamp: self.ctx.host.timestamp,
        };
        self.ctx.store.set(host_consensus_key(height), encode(&consensus));
        self.snapshots.insert(height, snapshot);
        self.consensus.insert(height, consensus);
        self.last_height = height;
        let timestamp = self.ctx.host.timestamp.add(BLOCK_TIME);
        self.ctx.begin_block(height.increment(), timestamp);
        self.ctx.take_events();
        height
    }

    /// Lets time pass without committing, producing as many blocks as would
    /// have been produced in that time.
    pub fn advance_time(&mut self, duration: Duration) {
        let blocks = duration.as_secs() / BLOCK_TIME.as_secs();
        let height = self.ctx.host.height.add(blocks);
        let timestamp = self.ctx.host.timestamp.add(duration);
        self.ctx.begin_block(height, timestamp);
    }

    /// Proof of the whole store at given committed height.
    pub fn proof(&self, height: Height) -> Vec<u8> {
        let snapshot =
            self.snapshots.get(&height).expect("height not committed");
        encode(snapshot)
    }

    /// Value stored at given path at given committed height.
    pub fn value_at(&self, height: Height, path: &Path) -> Option<Vec<u8>> {
        let key = path.to_key();
        let snapshot = self.snapshots.get(&height)?;
        snapshot.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
    }

    /// Creates a client of the counterparty at its last committed height.
    pub fn create_client(&mut self, counterparty: &MockChain) -> ClientId {
        let client_id = ClientId::new(CLIENT_TYPE, self.next_client)
            .expect("valid client id");
        self.next_client += 1;
        self.update_client(&client_id, counterparty);
        client_id
    }

    /// Updates the client to the counterparty’s last committed height.
    pub fn update_client(
        &mut self,
        client_id: &ClientId,
        counterparty: &MockChain,
    ) {
        let height = counterparty.height();
        let consensus =
            counterparty.consensus.get(&height).expect("no commits");
        let state = MockClientState {
            chain_id: counterparty.chain_id().into(),
            latest_height: height,
            frozen: false,
        };
        self.set(Path::ClientState(client_id.clone()), &state);
        self.set(Path::ConsensusState(client_id.clone(), height), consensus);
        let host = &self.ctx.host;
        let (timestamp, host_height) = (host.timestamp, host.height);
        let id = client_id.clone();
        self.set(Path::ProcessedTime(id.clone(), height), &timestamp);
        self.set(Path::ProcessedHeight(id, height), &host_height);
    }

    pub fn freeze_client(&mut self, client_id: &ClientId) {
        let path = Path::ClientState(client_id.clone());
        let mut state: MockClientState =
            self.ctx.store.get_borsh(&path).unwrap().expect("client exists");
        state.frozen = true;
        self.set(path, &state);
    }

    /// Commits the counterparty and updates the client to the new height.
    pub fn sync(
        &mut self,
        client_id: &ClientId,
        counterparty: &mut MockChain,
    ) -> Height {
        let height = counterparty.commit();
        self.update_client(client_id, counterparty);
        height
    }

    pub fn deliver(&mut self, msg: impl Into<Msg>) -> crate::Result<Response> {
        crate::handler::deliver(&mut self.ctx, &msg.into())
    }

    fn set(&mut self, path: Path, value: &impl BorshSerialize) {
        self.ctx.store.set_borsh(&path, value).unwrap();
    }
}
