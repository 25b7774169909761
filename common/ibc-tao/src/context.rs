use std::collections::BTreeMap;

use ibc_ids::{
    ChannelId, ClientId, ConnectionId, Height, Path, PortId, Timestamp,
};

use crate::channel::{ChannelEnd, Upgrade};
use crate::client::{ClientCtx, LightClient, LocalhostClient, Status};
use crate::config::Config;
use crate::connection::ConnectionEnd;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::router::Router;
use crate::store::{Checkpoint, Store};

/// Information about the chain the IBC core runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Host {
    pub chain_id: String,
    /// Height of the block being executed.
    pub height: Height,
    /// Timestamp of the block being executed.
    pub timestamp: Timestamp,
}

/// The IBC execution context.
///
/// Owns all state of the IBC core and is passed explicitly to every
/// handler.  Handlers are free functions operating on the context.
pub struct IbcContext {
    pub store: Store,
    pub config: Config,
    pub host: Host,
    pub router: Router,
    clients: BTreeMap<String, Box<dyn LightClient>>,
    events: Vec<Event>,
}

/// Token of an open child transaction of the context.
#[must_use]
pub struct ContextCheckpoint {
    store: Checkpoint,
    events: usize,
}

impl IbcContext {
    pub fn new(chain_id: impl Into<String>, config: Config) -> Self {
        Self {
            store: Store::new(),
            config,
            host: Host {
                chain_id: chain_id.into(),
                height: Height::new(0, 1),
                timestamp: Timestamp::ZERO,
            },
            router: Router::default(),
            clients: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Starts executing a new block at given height and time.
    pub fn begin_block(&mut self, height: Height, timestamp: Timestamp) {
        log::debug!("begin block {height} at {timestamp}");
        self.host.height = height;
        self.host.timestamp = timestamp;
    }

    /// Registers implementation of light clients of given type.
    pub fn register_client_type(
        &mut self,
        client_type: impl Into<String>,
        client: Box<dyn LightClient>,
    ) {
        self.clients.insert(client_type.into(), client);
    }

    pub(crate) fn client_ctx(&self) -> ClientCtx<'_> {
        ClientCtx { store: &self.store, host: &self.host }
    }

    /// Returns light client implementation for given client.
    pub(crate) fn client(
        &self,
        client_id: &ClientId,
    ) -> Result<&dyn LightClient> {
        if client_id.is_localhost() {
            return Ok(&LocalhostClient);
        }
        client_id
            .parse()
            .and_then(|(client_type, _)| self.clients.get(client_type))
            .map(|client| &**client)
            .ok_or_else(|| Error::ClientNotFound(client_id.clone()))
    }

    /// Returns status of given client.
    pub fn client_status(&self, client_id: &ClientId) -> Result<Status> {
        Ok(self.client(client_id)?.status(self.client_ctx(), client_id)?)
    }

    /// Fails with `ClientNotActive` unless the client is active.
    pub(crate) fn ensure_client_active(&self, client_id: &ClientId) -> Result {
        match self.client_status(client_id)? {
            Status::Active => Ok(()),
            status => Err(Error::ClientNotActive {
                client_id: client_id.clone(),
                status,
            }),
        }
    }

    // ==== Events =============================================================

    pub fn emit(&mut self, event: impl Into<Event>) {
        let event = event.into();
        log::debug!("event: {event:?}");
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] { &self.events }

    /// Removes and returns all events emitted so far.
    pub fn take_events(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.events)
    }

    // ==== Transactions =======================================================

    /// Opens a child transaction covering the store and emitted events.
    pub fn checkpoint(&mut self) -> ContextCheckpoint {
        ContextCheckpoint {
            store: self.store.checkpoint(),
            events: self.events.len(),
        }
    }

    pub fn commit(&mut self, checkpoint: ContextCheckpoint) {
        self.store.commit(checkpoint.store);
    }

    pub fn rollback(&mut self, checkpoint: ContextCheckpoint) {
        self.store.rollback(checkpoint.store);
        self.events.truncate(checkpoint.events);
    }

    /// Runs `f` in a child transaction committed if it returns `Ok` and
    /// rolled back otherwise.
    pub fn with_transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> core::result::Result<T, E>,
    ) -> core::result::Result<T, E> {
        let checkpoint = self.checkpoint();
        let res = f(self);
        match &res {
            Ok(_) => self.commit(checkpoint),
            Err(_) => self.rollback(checkpoint),
        }
        res
    }

    // ==== Connections ========================================================

    pub fn connection(&self, id: &ConnectionId) -> Result<ConnectionEnd> {
        self.store
            .get_borsh(&Path::Connection(id.clone()))?
            .ok_or_else(|| Error::ConnectionNotFound(id.clone()))
    }

    pub(crate) fn set_connection(
        &mut self,
        id: &ConnectionId,
        end: &ConnectionEnd,
    ) -> Result {
        self.store.set_borsh(&Path::Connection(id.clone()), end)
    }

    /// Returns connections associated with given client.
    pub fn client_connections(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ConnectionId>> {
        let path = Path::ClientConnections(client_id.clone());
        Ok(self.store.get_borsh(&path)?.unwrap_or_default())
    }

    pub(crate) fn add_client_connection(
        &mut self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Result {
        let mut ids = self.client_connections(client_id)?;
        ids.push(connection_id);
        self.store.set_borsh(&Path::ClientConnections(client_id.clone()), &ids)
    }

    /// Allocates a new identifier by incrementing counter at given path.
    pub(crate) fn next_counter(&mut self, path: &Path) -> Result<u64> {
        let counter = self.store.get_sequence(path)?.unwrap_or(0);
        let next = counter
            .checked_add(1)
            .ok_or(Error::Internal("counter overflow"))?;
        self.store.set_sequence(path, next);
        Ok(counter)
    }

    // ==== Channels ===========================================================

    pub fn channel(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<ChannelEnd> {
        self.store
            .get_borsh(&Path::ChannelEnd(port_id.clone(), channel_id.clone()))?
            .ok_or_else(|| Error::ChannelNotFound {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            })
    }

    pub(crate) fn set_channel(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        end: &ChannelEnd,
    ) -> Result {
        let path = Path::ChannelEnd(port_id.clone(), channel_id.clone());
        self.store.set_borsh(&path, end)
    }

    pub fn upgrade(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<Upgrade>> {
        let path = Path::Upgrade(port_id.clone(), channel_id.clone());
        self.store.get_borsh(&path)
    }

    pub fn counterparty_upgrade(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<Option<Upgrade>> {
        let path =
            Path::CounterpartyUpgrade(port_id.clone(), channel_id.clone());
        self.store.get_borsh(&path)
    }

    /// Returns whether the channel has any packets sent which have been
    /// neither acknowledged nor timed out.
    pub fn has_inflight_packets(
        &self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> bool {
        let prefix = Path::commitments_prefix(port_id, channel_id);
        let found = self.store.prefix(&prefix).next().is_some();
        found
    }
}
