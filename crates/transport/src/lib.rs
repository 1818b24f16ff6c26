//! # Transport
//!
//! Step transport endpoint between the bridge and the remote traffic peer.
//!
//! - [`protocol`]: request/response messages
//! - [`codec`]: length-prefixed frames, bincode or JSON payloads
//! - [`LinkServer`]: TCP endpoint with a bounded worker pool
//! - [`LinkService`]: request dispatch onto the engine and the link table
//! - [`LinkClient`]: the peer's side of the link

pub mod codec;
pub mod protocol;

mod client;
mod error;
mod server;
mod service;

pub use client::LinkClient;
pub use error::{Result, TransportError};
pub use protocol::{LinkRequest, LinkResponse};
pub use server::LinkServer;
pub use service::{LinkService, LinkedEngine};
