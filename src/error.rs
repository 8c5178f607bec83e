//! Crate-wide error type

use std::io;
use thiserror::Error;

/// Shadowsocks relay error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("bad header: {0}")]
    BadHeader(String),

    #[error("decrypt error: {0}")]
    DecryptError(String),

    #[error("DNS failure: {0}")]
    DnsFailure(String),

    #[error("inactivity timeout")]
    Timeout,

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bad_header<S: Into<String>>(msg: S) -> Self {
        Error::BadHeader(msg.into())
    }

    pub fn decrypt<S: Into<String>>(msg: S) -> Self {
        Error::DecryptError(msg.into())
    }

    pub fn dns<S: Into<String>>(msg: S) -> Self {
        Error::DnsFailure(msg.into())
    }

    pub fn socket<S: Into<String>>(msg: S) -> Self {
        Error::SocketError(msg.into())
    }

    pub fn unsupported_method<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedMethod(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// True for errors that mean "the peer closed the connection normally",
    /// which are logged at debug rather than warning.
    pub fn is_peer_closed(&self) -> bool {
        matches!(
            self,
            Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof
                || e.kind() == io::ErrorKind::ConnectionReset
        )
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::ConfigError(format!("invalid base64: {e}"))
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = Error::bad_header("truncated");
        assert_eq!(e.to_string(), "bad header: truncated");
    }

    #[test]
    fn peer_closed_classification() {
        let e = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(e.is_peer_closed());
        let e = Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "perm"));
        assert!(!e.is_peer_closed());
    }
}
