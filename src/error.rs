//! Error types for the edge node.

use std::io;
use thiserror::Error;

/// Edge node error type.
///
/// Each header-parse and dial variant corresponds directly to one of the
/// error kinds this crate's callers key off of (logging policy, HTTP status
/// mapping); see `Error::is_aborted` for the one kind that is deliberately
/// swallowed rather than logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid_uuid")]
    InvalidUuid,

    #[error("unsupported_command: {0}")]
    UnsupportedCommand(u8),

    #[error("unknown_address_type: {0}")]
    UnknownAddressType(u8),

    #[error("empty_hostname")]
    EmptyHostname,

    #[error("short_read")]
    ShortRead,

    #[error("connect_timeout")]
    ConnectTimeout,

    #[error("connect_failed: {0}")]
    ConnectFailed(String),

    #[error("all_attempts_failed")]
    AllAttemptsFailed,

    #[error("aborted")]
    Aborted,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn connect_failed<S: Into<String>>(msg: S) -> Self {
        Error::ConnectFailed(msg.into())
    }

    /// True for the one error kind the relay/logging layer must swallow
    /// instead of logging at error level (spec: "expected teardown").
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// True for the errors the header codec raises; ingress maps all of
    /// these, plus dialer failures, to a 404 response.
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUuid
                | Error::UnsupportedCommand(_)
                | Error::UnknownAddressType(_)
                | Error::EmptyHostname
                | Error::ShortRead
        )
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::ConnectTimeout
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::UnsupportedCommand(2);
        assert_eq!(e.to_string(), "unsupported_command: 2");
    }

    #[test]
    fn test_is_aborted() {
        assert!(Error::Aborted.is_aborted());
        assert!(!Error::ShortRead.is_aborted());
    }

    #[test]
    fn test_is_header_error() {
        assert!(Error::InvalidUuid.is_header_error());
        assert!(!Error::Aborted.is_header_error());
        assert!(!Error::ConnectTimeout.is_header_error());
    }
}
