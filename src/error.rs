//! Unified error type for the NOTIFY dispatcher's non-fire-and-forget paths.
//!
//! Everything on the actual dispatch path (sends, retries, bad replies) is
//! fire-and-forget per the error handling design: it is logged and/or
//! counted, never returned as a `Result` to `send_notify`'s caller. This
//! enum only covers the paths that genuinely can fail a caller: config
//! loading, socket bind failures surfaced through the dispatcher handle, and
//! worker task lifecycle errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind UDP socket on {addr}: {source}")]
    SocketBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dispatcher worker task failed: {0}")]
    WorkerJoin(String),

    #[error("dispatcher is not running")]
    NotRunning,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
