//! Process-level error types.
//!
//! Transient, per-tick reader failures never appear here — a reader that has
//! nothing to report this period returns `Ok(None)`, not an `Err`. This type
//! is reserved for configuration, construction, and I/O failures that abort
//! a reader or the process outright.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("sensor '{sensor}' missing required key '{key}'")]
    MissingKey { sensor: String, key: String },

    #[error("sensor '{sensor}' has unknown message type '{msg_type}'")]
    UnknownType { sensor: String, msg_type: String },

    #[error("failed to construct reader for sensor '{sensor}': {reason}")]
    ReaderInit { sensor: String, reason: String },

    #[error("duplicate registration for message type '{msg_type}'")]
    DuplicateRegistration { msg_type: String },

    #[error("failed to bind publish socket to {endpoint}: {source}")]
    SocketBind {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PublisherResult<T> = Result<T, PublisherError>;
