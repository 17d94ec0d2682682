//! # subcount-eventsub
//!
//! The provider-facing half of the engine.
//!
//! - **Frames**: decoding of inbound event socket messages
//! - **Classify**: provider notification → batch direction, the one counting table
//! - **Helix**: REST client for subscription creation and total counts
//! - **Subscriptions**: bootstrap of every event kind on a welcomed session
//! - **Connector**: socket abstraction with a `tokio-tungstenite` implementation
//! - **Session**: the session state machine actor

#![deny(unsafe_code)]

pub mod classify;
pub mod connector;
pub mod frames;
pub mod helix;
pub mod session;
pub mod subscriptions;

pub use classify::{Classification, IgnoreReason, classify};
pub use connector::{ABNORMAL_CLOSURE, Connector, SocketEvent, SocketLink, TungsteniteConnector};
pub use frames::{InboundMessage, RevocationReason, parse_frame};
pub use helix::{CreateOutcome, HelixClient};
pub use session::{
    SessionCommand, SessionConfig, SessionContext, SessionEvent, SessionHandle, SessionMachine,
    SessionPhase, SessionStatus,
};
pub use subscriptions::{BootstrapReport, SubscriptionBootstrap, SubscriptionManager};
