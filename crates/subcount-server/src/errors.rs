//! Display server errors.

use thiserror::Error;

/// Failure to start or run the display endpoint.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("display server failed: {0}")]
    Serve(#[source] std::io::Error),
}
