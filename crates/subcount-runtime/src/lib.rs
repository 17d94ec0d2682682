//! # subcount-runtime
//!
//! The stateful half of the engine.
//!
//! - **Scheduler**: named, cancellable one-shot and periodic timers
//! - **CounterBoard**: sole owner of the live counters, persisted on change
//! - **BatchingEngine**: per-direction debounce + animation-lock coalescing
//! - **PollingFallback**: periodic full-count reconciliation
//! - **Stores**: in-memory and JSON-file `CounterStore` implementations

#![deny(unsafe_code)]

pub mod batching;
pub mod board;
pub mod polling;
pub mod scheduler;
pub mod store;

pub use batching::{BatchingConfig, BatchingEngine};
pub use board::CounterBoard;
pub use polling::{PollingConfig, PollingFallback, PollingMode};
pub use scheduler::Scheduler;
pub use store::{JsonFileStore, MemoryStore};
