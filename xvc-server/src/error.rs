use std::{io, time::Duration};

use xvc_protocol::error::ReadError;

/// Failure of a single shift.
#[derive(Debug, thiserror::Error)]
pub enum ShiftError {
    /// The device did not accept or return the expected bytes.
    /// The device state is unknown afterwards, so no further shifts should be attempted.
    #[error("device transport failed: {0}")]
    Transport(#[source] io::Error),
    /// The device answered with a different number of bytes than the issued operations produce.
    #[error("received {received} TDO bytes but the issued operations produce {expected}")]
    DecodeMismatch { expected: usize, received: usize },
    #[error("{vector} vector has {got} bytes, expected {expected}")]
    VectorLength {
        vector: &'static str,
        expected: usize,
        got: usize,
    },
}

impl ShiftError {
    /// Whether the error leaves the device unusable for every connection,
    /// not only for the one that issued the shift.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShiftError::Transport(_))
    }
}

/// Reasons a client connection was closed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Shift(#[from] ShiftError),
    #[error("backend task failed: {0}")]
    Backend(#[from] tokio::task::JoinError),
    #[error("no command received within {0:?}")]
    IdleTimeout(Duration),
}

/// Reasons the server stopped serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("could not listen for connections: {0}")]
    Listen(#[source] io::Error),
    #[error(transparent)]
    Transport(ShiftError),
}
