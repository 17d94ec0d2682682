//! # subcount-server
//!
//! Display client side of the counter engine.
//!
//! - [`BroadcastGate`]: fan-out with a per-client drop policy
//! - [`DisplayPayload`]: the JSON message display clients receive
//! - [`UpdatePublisher`]: counter updates → payloads → gate
//! - [`DisplayServer`]: axum `/ws` and `/health` endpoints
//! - [`ShutdownCoordinator`]: process-wide cancellation

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod gate;
pub mod health;
pub mod payload;
pub mod publisher;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use connection::{ClientConnection, SendRefusal};
pub use errors::ServerError;
pub use gate::{BroadcastGate, GateStats, SendReport};
pub use payload::{DisplayPayload, PayloadType};
pub use publisher::UpdatePublisher;
pub use server::{AppState, DisplayConfig, DisplayServer};
pub use shutdown::ShutdownCoordinator;
