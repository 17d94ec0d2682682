//! # subcount-core
//!
//! Shared vocabulary for the live follower/subscriber counter.
//!
//! - **Counters**: `CounterKind`, `BatchDirection`, `Counters`, `CounterUpdate`
//! - **Events**: `EventKind`, the provider subscription types
//! - **Backoff**: `ReconnectPolicy` and `ReconnectState`
//! - **Errors**: the per-domain `thiserror` enums gathered under `CounterError`
//! - **Collaborators**: `CounterStore`, `AuthProvider`, `GoalView`, `CountSource`
//! - **Goals**: `GoalTable`, an in-memory `GoalView`

#![deny(unsafe_code)]

pub mod backoff;
pub mod collaborators;
pub mod counters;
pub mod errors;
pub mod events;
pub mod goals;

pub use backoff::{ReconnectPolicy, ReconnectState};
pub use collaborators::{AuthProvider, CountSource, CounterStore, Credentials, GoalView, StaticAuth};
pub use counters::{BatchDirection, CounterKind, CounterUpdate, Counters, SubCountMode, UpdateOrigin};
pub use errors::{
    AuthError, ConnectError, CounterError, ErrorKind, FatalReason, ParseError, ReconcileError,
    Result, StoreError, SubscriptionError, is_protocol_fatal,
};
pub use events::EventKind;
pub use goals::{GoalInfo, GoalTable};
