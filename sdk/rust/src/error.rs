use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the bridge outside of the chunked request/response path.
///
/// Environment and configuration errors are start-up failures: they are
/// reported before a channel or worker exists and never travel through the
/// shared buffer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid working directory {}: {reason}", .path.display())]
    InvalidWorkingDirectory { path: PathBuf, reason: String },

    #[error("invalid preopen '{guest}' -> {}: {reason}", .host.display())]
    InvalidPreopen {
        guest: String,
        host: PathBuf,
        reason: String,
    },

    #[error("invalid bridge configuration: {0}")]
    InvalidConfig(String),

    #[error("chunk of {len} bytes exceeds channel capacity of {capacity} bytes")]
    ChunkTooLarge { len: usize, capacity: usize },

    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),

    /// The other end of the request channel has gone away.
    #[error("bridge peer disconnected")]
    Disconnected,

    /// A continuation chunk never arrived; only `received` bytes came in.
    #[error("transfer truncated after {received} bytes")]
    Truncated { received: usize },

    /// An earlier transfer was abandoned mid-stream, so a late chunk may
    /// still land in the channel. No further transfer can be trusted.
    #[error("channel out of sync after a truncated transfer")]
    OutOfSync,

    #[error("host call '{call}' failed: {reason}")]
    HostCall { call: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
