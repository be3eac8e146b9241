use std::fmt;
use std::io;

use thiserror::Error;

use crate::model::TransferSummary;

/// Tag carried by every [`TransferError`], for callers that map failures to
/// their own messages or exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    InvalidInput,
    ConnectionFailed,
    AuthenticationFailed,
    TransferIo,
    Busy,
    Cancelled,
}

impl ErrorKind {
    pub(crate) fn title(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "Invalid input",
            ErrorKind::ConnectionFailed => "Connection failed",
            ErrorKind::AuthenticationFailed => "Auth error",
            ErrorKind::TransferIo => "Transfer failed",
            ErrorKind::Busy => "Busy",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    pub(crate) fn exit_code(self) -> u8 {
        match self {
            ErrorKind::InvalidInput => 2,
            ErrorKind::ConnectionFailed => 3,
            ErrorKind::AuthenticationFailed => 4,
            ErrorKind::TransferIo => 5,
            ErrorKind::Busy => 6,
            ErrorKind::Cancelled => 130,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Error)]
pub(crate) enum TransferError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("{0}")]
    TransferIo(String),
    #[error("another transfer is already running")]
    Busy,
    #[error("transfer cancelled after {} completed item(s)", .completed.item_count)]
    Cancelled { completed: TransferSummary },
}

impl TransferError {
    pub(crate) fn io(context: impl fmt::Display, err: io::Error) -> Self {
        TransferError::TransferIo(format!("{context}: {err}"))
    }

    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InvalidInput(_) => ErrorKind::InvalidInput,
            TransferError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            TransferError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            TransferError::TransferIo(_) => ErrorKind::TransferIo,
            TransferError::Busy => ErrorKind::Busy,
            TransferError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Human readable detail without the kind prefix.
    pub(crate) fn detail(&self) -> String {
        match self {
            TransferError::InvalidInput(detail)
            | TransferError::ConnectionFailed(detail)
            | TransferError::AuthenticationFailed(detail)
            | TransferError::TransferIo(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}
