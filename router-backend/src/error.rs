//! Errors that escape the routing layer.
//!
//! Provider-level failures never appear here: they are recorded as attempt
//! outcomes inside the failover loop. Only problems the caller must act on
//! propagate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Missing or malformed configuration; no routing is attempted
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request itself cannot be routed (e.g. no messages)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Terminal state of a request whose every candidate failed
    #[error("all providers exhausted after {attempts} attempt(s): {last_error}")]
    AllProvidersExhausted { attempts: usize, last_error: String },
}

impl RouterError {
    pub fn config(msg: impl Into<String>) -> Self {
        RouterError::Configuration(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, RouterError::Configuration(_))
    }
}
