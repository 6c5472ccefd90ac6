//! Error types.

use trust_dns_proto::error::ProtoError;
use trust_dns_proto::op::Message;

/// Error enumerates the possible DNS reverse proxy error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a `route` or `remap` configuration entry isn't of the form `key=value`,
    /// or has an empty key or value.
    #[error("invalid {kind} entry: \"{entry}\"")]
    InvalidEntry { kind: &'static str, entry: String },

    /// Returned when no [`RawConfig::default`][crate::config::RawConfig::default] upstream is
    /// configured.
    #[error("a default upstream is required")]
    MissingDefault,

    /// Returned when the listen address can't be parsed as a socket address.
    #[error("invalid listen address: \"{0}\"")]
    InvalidListenAddress(String),

    /// Returned when a query carries no question.
    #[error("query has no question")]
    MalformedQuery,

    /// Returned when a zone transfer (AXFR/IXFR) is requested over UDP.
    #[error("zone transfer requested over datagram transport")]
    TransferOverDatagram,

    /// Returned when a zone transfer is requested by a client that isn't listed in
    /// [`Config::allow_transfer`][crate::config::Config::allow_transfer].
    #[error("client {0} is not allowed to transfer zones")]
    TransferForbidden(String),

    /// Returned by an [`Exchanger`][crate::upstream::Exchanger] when the upstream answered with
    /// the TC bit set. Carries the truncated answer so it can be relayed as-is.
    #[error("upstream response truncated")]
    Truncated(Box<Message>),

    /// Returned when the upstream doesn't answer within the configured timeout.
    #[error("upstream {0} timed out")]
    UpstreamTimeout(String),

    /// Returned when an upstream answer doesn't match the id of the query that was sent.
    #[error("upstream {upstream} answered id {actual}, expected {expected}")]
    UpstreamIdMismatch {
        upstream: String,
        expected: u16,
        actual: u16,
    },

    /// Returned when a zone transfer stream from the upstream fails before completing.
    #[error("zone transfer from {upstream} aborted: {reason}")]
    TransferAborted { upstream: String, reason: String },

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when loading a [`RawConfig`][crate::config::RawConfig] from disk fails due to
    /// invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when a generic DNS protocol error occurs, e.g. an unparsable domain name in the
    /// configuration or an undecodable upstream answer.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}

/// The classes of failure a request or the startup configuration can run into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    MalformedQuery,
    ProtocolViolation,
    Authorization,
    Upstream,
    Truncation,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidEntry { .. }
            | Error::MissingDefault
            | Error::InvalidListenAddress(_)
            | Error::InvalidJSON(_) => ErrorKind::Configuration,
            Error::MalformedQuery => ErrorKind::MalformedQuery,
            Error::TransferOverDatagram => ErrorKind::ProtocolViolation,
            Error::TransferForbidden(_) => ErrorKind::Authorization,
            Error::Truncated(_) => ErrorKind::Truncation,
            Error::UpstreamTimeout(_)
            | Error::UpstreamIdMismatch { .. }
            | Error::TransferAborted { .. }
            | Error::IO(_)
            | Error::DNSError(_) => ErrorKind::Upstream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::MissingDefault.kind(), ErrorKind::Configuration);
        assert_eq!(Error::MalformedQuery.kind(), ErrorKind::MalformedQuery);
        assert_eq!(
            Error::TransferOverDatagram.kind(),
            ErrorKind::ProtocolViolation
        );
        assert_eq!(
            Error::TransferForbidden("5.6.7.8".into()).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            Error::Truncated(Box::new(Message::new())).kind(),
            ErrorKind::Truncation
        );
        assert_eq!(
            Error::UpstreamTimeout("8.8.8.8:53".into()).kind(),
            ErrorKind::Upstream
        );
    }

    #[test]
    fn display() {
        let err = Error::InvalidEntry {
            kind: "route",
            entry: "example.com".into(),
        };
        assert_eq!(err.to_string(), "invalid route entry: \"example.com\"");
    }
}
