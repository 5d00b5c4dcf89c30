//! Error types for the linetrack library
//!
//! Covers route construction, geometry queries, artifact decoding and the
//! live fix transport.

use std::fmt;

/// Main error type for linetrack operations
#[derive(Debug)]
pub enum Error {
    /// A position is non-finite or outside the valid WGS84 ranges
    BadCoordinate(String),

    /// Bearing requested for two identical points
    DegenerateSegment(String),

    /// Fewer than 2 valid vertices remained after filtering
    EmptyRoute(String),

    /// A projection query could not resolve any segment
    InvalidGeometry(String),

    /// A fix-stream message failed schema validation
    MalformedEnvelope(String),

    /// Connection closed or I/O failure on the fix transport
    TransportFailure(String),

    /// Cooperative cancellation was requested
    CancelRequested,

    /// HTTP-level failure while fetching the relation
    HttpError(String),

    /// Network connectivity issue (retryable)
    NetworkError(String),

    /// XML, JSON or artifact decoding failure
    ParseError(String),

    /// File I/O error
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadCoordinate(msg) => {
                write!(f, "Bad coordinate: {}", msg)
            }
            Error::DegenerateSegment(msg) => {
                write!(f, "Degenerate segment: {}", msg)
            }
            Error::EmptyRoute(msg) => {
                write!(f, "Empty route: {}", msg)
            }
            Error::InvalidGeometry(msg) => {
                write!(f, "Invalid geometry: {}", msg)
            }
            Error::MalformedEnvelope(msg) => {
                write!(f, "Malformed envelope: {}", msg)
            }
            Error::TransportFailure(msg) => {
                write!(f, "Transport failure: {}", msg)
            }
            Error::CancelRequested => {
                write!(f, "Cancellation requested")
            }
            Error::HttpError(msg) => {
                write!(f, "HTTP error: {}", msg)
            }
            Error::NetworkError(msg) => {
                write!(f, "Network error: {}", msg)
            }
            Error::ParseError(msg) => {
                write!(f, "Parse error: {}", msg)
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {}", err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::NetworkError(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::TransportFailure(err.to_string())
    }
}

/// Convenience result type for linetrack operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = Error::BadCoordinate("lat=91".to_string());
        assert!(err.to_string().contains("lat=91"));

        let err = Error::TransportFailure("connection reset".to_string());
        assert!(err.to_string().contains("connection reset"));

        assert_eq!(Error::CancelRequested.to_string(), "Cancellation requested");
    }

    #[test]
    fn test_io_error_source_preserved() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io);
        assert!(err.source().is_some());
    }
}
