use std::net::SocketAddr;

use thiserror::Error;

use crate::record::RecordError;

/// Failures that stop a run before or during its execution.
///
/// An idle timeout and an empty run are not errors; they are reported through
/// [`crate::state::StopReason::IdleTimeout`] and
/// [`crate::stats::RunReport::no_data`].
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("send failed: {0}")]
    SendFailure(#[source] std::io::Error),
    #[error(transparent)]
    MalformedRecord(#[from] RecordError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
