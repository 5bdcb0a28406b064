//! Server and client endpoints for hashrpc.
//!
//! An endpoint owns a [`Transport`] and a message channel. Each poll drains the
//! transport, keeps the connection set current, notifies [`ConnectionEvents`]
//! subscribers, and hands received packets to the channel for dispatch.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod loopback;
pub mod server;
pub mod transport;
#[cfg(unix)]
pub mod uds;

pub use client::Client;
pub use config::{EndpointConfig, DEFAULT_POLL_TIMEOUT, DEFAULT_TICK};
pub use error::{PeerError, Result};
pub use events::{ConnectionCallback, ConnectionEvents, SubscriptionId};
pub use loopback::{LoopbackClient, LoopbackConnector, LoopbackServer};
pub use server::Server;
pub use transport::{Transport, TransportEvent, SERVER_PEER};
#[cfg(unix)]
pub use uds::{UdsClient, UdsServer};
