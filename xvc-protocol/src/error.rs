use std::{io, num::ParseIntError, str::Utf8Error};

/// Errors that may occur when reading a message from a stream.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("Received invalid command with prefix {0:?}")]
    InvalidCommandPrefix(String),
    #[error("Unsupported version {0}")]
    UnsupportedVersion(String),
    #[error("{0}")]
    InvalidFormat(String),
    #[error("Vector too large! Maximum is {max} bytes, but got {got}")]
    TooManyBytes { max: usize, got: usize },
}

impl ReadError {
    /// Whether the error only reflects the peer going away, as opposed to a malformed frame.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ReadError::IoError(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<Utf8Error> for ReadError {
    fn from(value: Utf8Error) -> Self {
        ReadError::InvalidFormat(format!("Invalid UTF8: {}", value))
    }
}

impl From<ParseIntError> for ReadError {
    fn from(value: ParseIntError) -> Self {
        ReadError::InvalidFormat(format!("Invalid integer: {}", value))
    }
}
