//! Routing of callbacks to applications.
//!
//! Applications are registered under a module id and bind ports.  Channels
//! are owned by the module which bound the channel’s port at the time the
//! channel was created.  Ownership is recorded in the store so that it
//! follows transaction rollbacks.

use std::collections::BTreeMap;

use ibc_ids::{ChannelId, ConnectionId, PortId};

use crate::channel::{Acknowledgement, Counterparty, Order, Packet};
use crate::error::{Error, Result};
use crate::store::Store;

pub type ModuleId = String;

/// Error returned by application callbacks.
#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "application error: {}", _0)]
pub struct AppError(pub String);

impl AppError {
    pub fn new(msg: impl Into<String>) -> Self { Self(msg.into()) }
}

/// Callbacks of an IBC application.
///
/// Every callback receives the store so that any state changes the
/// application makes are subject to the same transaction as the IBC core’s.
/// Changes made by a failing callback are discarded.
pub trait Application {
    /// Called when a channel is initialised.  Returns version to use.
    fn on_chan_open_init(
        &mut self,
        store: &mut Store,
        ordering: Order,
        connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty: &Counterparty,
        version: &str,
    ) -> Result<String, AppError>;

    /// Called when a channel is opened by the counterparty.  Returns
    /// version to use.
    fn on_chan_open_try(
        &mut self,
        store: &mut Store,
        ordering: Order,
        connection_hops: &[ConnectionId],
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty: &Counterparty,
        counterparty_version: &str,
    ) -> Result<String, AppError>;

    fn on_chan_open_ack(
        &mut self,
        store: &mut Store,
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty_channel_id: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), AppError>;

    fn on_chan_open_confirm(
        &mut self,
        store: &mut Store,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), AppError>;

    /// Called when a channel is being closed.  May veto the closure.
    fn on_chan_close_init(
        &mut self,
        store: &mut Store,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), AppError>;

    fn on_chan_close_confirm(
        &mut self,
        store: &mut Store,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), AppError>;

    /// Handles a received packet.
    ///
    /// Returns `None` if the acknowledgement will be written asynchronously.
    fn on_recv_packet(
        &mut self,
        store: &mut Store,
        packet: &Packet,
        relayer: &str,
    ) -> Option<Acknowledgement>;

    fn on_acknowledgement_packet(
        &mut self,
        store: &mut Store,
        packet: &Packet,
        acknowledgement: &[u8],
        relayer: &str,
    ) -> Result<(), AppError>;

    fn on_timeout_packet(
        &mut self,
        store: &mut Store,
        packet: &Packet,
        relayer: &str,
    ) -> Result<(), AppError>;

    /// Called when upgrade is initialised.  Returns version to use.
    ///
    /// Changes to the store are always discarded.  Applications which don’t
    /// support upgrades use the default implementation which refuses.
    fn on_chan_upgrade_init(
        &mut self,
        _store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        _version: &str,
    ) -> Result<String, AppError> {
        Err(AppError::new("upgrades not supported"))
    }

    fn on_chan_upgrade_try(
        &mut self,
        _store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        _counterparty_version: &str,
    ) -> Result<String, AppError> {
        Err(AppError::new("upgrades not supported"))
    }

    fn on_chan_upgrade_ack(
        &mut self,
        _store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _counterparty_version: &str,
    ) -> Result<(), AppError> {
        Err(AppError::new("upgrades not supported"))
    }

    /// Called once upgrade completes.  Cannot fail.
    fn on_chan_upgrade_open(
        &mut self,
        _store: &mut Store,
        _port_id: &PortId,
        _channel_id: &ChannelId,
        _ordering: Order,
        _connection_hops: &[ConnectionId],
        _version: &str,
    ) {
    }
}

/// Registry of applications and the ports they bind.
#[derive(Default)]
pub struct Router {
    modules: BTreeMap<ModuleId, Box<dyn Application>>,
    ports: BTreeMap<PortId, ModuleId>,
}

impl Router {
    pub fn add_module(
        &mut self,
        module_id: impl Into<ModuleId>,
        module: Box<dyn Application>,
    ) {
        self.modules.insert(module_id.into(), module);
    }

    /// Binds a port to a module.  Fails if the port is already bound.
    pub fn bind_port(&mut self, port_id: PortId, module_id: &str) -> Result {
        if !self.modules.contains_key(module_id) {
            return Err(Error::ModuleNotFound(module_id.into()));
        }
        if self.ports.contains_key(&port_id) {
            return Err(Error::PortAlreadyBound(port_id));
        }
        self.ports.insert(port_id, module_id.into());
        Ok(())
    }

    pub fn lookup_module_by_port(&self, port_id: &PortId) -> Result<&ModuleId> {
        self.ports
            .get(port_id)
            .ok_or_else(|| Error::PortNotBound(port_id.clone()))
    }

    /// Returns application bound to given port.
    pub(crate) fn app(
        &mut self,
        port_id: &PortId,
    ) -> Result<&mut dyn Application> {
        let module_id = self
            .ports
            .get(port_id)
            .ok_or_else(|| Error::PortNotBound(port_id.clone()))?;
        match self.modules.get_mut(module_id) {
            Some(module) => Ok(module.as_mut()),
            None => Err(Error::ModuleNotFound(module_id.clone())),
        }
    }
}

fn owner_key(port_id: &PortId, channel_id: &ChannelId) -> String {
    format!("owners/ports/{port_id}/channels/{channel_id}")
}

/// Records `module_id` as owner of the channel.
pub(crate) fn claim_channel(
    store: &mut Store,
    port_id: &PortId,
    channel_id: &ChannelId,
    module_id: &str,
) {
    store.set(owner_key(port_id, channel_id), module_id.as_bytes().to_vec());
}

/// Returns owner of the channel.
pub fn lookup_module_by_channel<'a>(
    store: &'a Store,
    port_id: &PortId,
    channel_id: &ChannelId,
) -> Option<&'a str> {
    store
        .get(&owner_key(port_id, channel_id))
        .and_then(|owner| core::str::from_utf8(owner).ok())
}

/// Fails with `Unauthorized` unless `module_id` owns the channel.
pub(crate) fn authenticate(
    store: &Store,
    port_id: &PortId,
    channel_id: &ChannelId,
    module_id: &str,
) -> Result {
    if lookup_module_by_channel(store, port_id, channel_id) == Some(module_id) {
        Ok(())
    } else {
        Err(Error::Unauthorized {
            port_id: port_id.clone(),
            channel_id: channel_id.clone(),
        })
    }
}

#[test]
fn test_bind_port() {
    let mut router = Router::default();
    let port_id = PortId::transfer();
    assert_eq!(
        Err(Error::ModuleNotFound("app".into())),
        router.bind_port(port_id.clone(), "app")
    );

    router.add_module("app", Box::<crate::mocks::MockApp>::default());
    assert_eq!(Ok(()), router.bind_port(port_id.clone(), "app"));
    assert_eq!(Ok(&"app".to_owned()), router.lookup_module_by_port(&port_id));
    assert_eq!(
        Err(Error::PortAlreadyBound(port_id.clone())),
        router.bind_port(port_id, "app")
    );
}
