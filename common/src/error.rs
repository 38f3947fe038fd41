//! Error taxonomy shared by every engine.
//!
//! Per-address failures of a sweep are folded into [`ProbeResult`](crate::model::probe::ProbeResult)
//! values; everything else surfaces as one of these variants.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("host unreachable: {0}")]
    UnreachableHost(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transfer failed: {0}")]
    Transfer(TransferFailure),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    #[error("terminal rejected the transfer: {0}")]
    Rejected(String),

    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("interrupted: {0}")]
    Interrupted(String),
}

impl From<TransferFailure> for Error {
    fn from(failure: TransferFailure) -> Self {
        Error::Transfer(failure)
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the session that produced this error has to be torn down.
    ///
    /// A missing entry or a rejection the terminal answered in-sync leaves the
    /// conversation usable; anything else may have left unread bytes on the wire.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            Error::NotFound(_)
                | Error::Configuration(_)
                | Error::Transfer(TransferFailure::Rejected(_))
        )
    }

    /// Whether repeating the whole call against a fresh session may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::UnreachableHost(_)
                | Error::Timeout(_)
                | Error::Io(_)
                | Error::Transfer(TransferFailure::Interrupted(_))
        )
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
