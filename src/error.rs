//! Error taxonomy for the pipeline
//!
//! Transient I/O faults are retried and counted at the component boundary;
//! decode errors skip the record; persistence errors abort the flush
//! transaction. Only startup errors propagate to the binary entry point.

use thiserror::Error;

/// Fatal initialization failures. The process exits non-zero on any of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database initialization failed: {0}")]
    Database(String),

    #[error("initial SOL price unavailable: {0}")]
    SolPrice(String),

    #[error("geyser subscription could not be established: {0}")]
    Subscription(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Account-data decode failures. The offending record is skipped with a
/// warning; the flush is never aborted by these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bonding curve account data is {got} bytes, expected {expected}")]
    Length { got: usize, expected: usize },

    #[error("account discriminator does not match a bonding curve")]
    Discriminator,
}

/// Failures talking to the JSON-RPC node during holder enumeration.
#[derive(Debug, Error)]
pub enum RpcFetchError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc rate limited (429)")]
    RateLimited,

    #[error("rpc call timed out")]
    Timeout,

    #[error("rpc error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

impl RpcFetchError {
    /// Transient errors are retried with backoff; the rest are dropped
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcFetchError::Transport(_) | RpcFetchError::RateLimited | RpcFetchError::Timeout
        )
    }
}
