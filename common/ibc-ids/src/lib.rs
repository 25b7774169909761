//! Identifiers, heights and store paths of the IBC core.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod commitment;
mod height;
mod ids;
mod path;

pub use commitment::{apply_prefix, MerklePath, MerklePrefix};
pub use height::{Height, Timestamp};
pub use ids::{
    parse_counter, ChannelId, ClientId, ConnectionId, Error, PortId,
};
pub use path::Path;
