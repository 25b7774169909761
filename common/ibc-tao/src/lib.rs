//! Transport, authentication and ordering layer of IBC.
//!
//! The crate implements the connection and channel handshakes, the packet
//! lifecycle and channel upgrades.  All state lives in an [`IbcContext`]
//! which handlers receive explicitly.  Messages are executed with
//! [`handler::deliver`]; light clients and applications plug in through the
//! [`LightClient`] and [`Application`] traits.

pub mod ante;
pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod msgs;
pub mod router;
pub mod store;
pub mod verify;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
#[cfg(test)]
mod tests;

pub use ante::{check_tx, TxMode};
pub use client::{ClientCtx, ClientError, LightClient, Status};
pub use config::{Config, UpdateConfig};
pub use context::{Host, IbcContext};
pub use error::{Error, Result};
pub use events::Event;
pub use handler::deliver;
pub use msgs::{Msg, Response, ResponseResult};
pub use router::{AppError, Application, Router};
pub use store::Store;
