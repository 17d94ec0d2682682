//! # subcount-settings
//!
//! Layered configuration for the counter engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SubcountSettings::default()`]
//! 2. **User file**: `~/.subcount/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SUBCOUNT_*` overrides (highest priority)
//!
//! The bearer token only ever comes from `SUBCOUNT_ACCESS_TOKEN`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    ACCESS_TOKEN_ENV, access_token_from_env, data_dir, deep_merge, load_settings,
    load_settings_from_path, settings_path, state_file_path, validate,
};
pub use types::*;
