//! The error type shared by every fallible operation of this crate

use std::fmt::{Display, Formatter};

/// The result type returned by every public protocol operation.
///
/// No other failure channel exists: the protocol layers never panic on server data,
/// and they convert every transport, HTTP, parsing or argument fault into a [`DavError`].
pub type DavResult<T> = Result<T, DavError>;

/// A fault that happened while talking to (or parsing data from) a CalDAV server
#[derive(Clone, Debug, PartialEq)]
pub enum DavError {
    /// The server answered with a non-success HTTP status.
    ///
    /// A synthetic `code` of 0 is used for faults that prevent reading a response at all
    /// (e.g. an oversized body).
    Http {
        code: u16,
        message: String,
        body: Option<String>,
    },

    /// The request never completed (DNS, TCP, TLS, timeout...)
    Network { message: String },

    /// The response completed but its contents could not be understood
    Parse { message: String },

    /// The caller passed an invalid argument. Returned before any network call is made
    Argument { message: String },
}

impl DavError {
    pub fn http(code: u16, message: impl Into<String>) -> Self {
        Self::Http { code, message: message.into(), body: None }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument { message: message.into() }
    }

    /// The HTTP status code, if this is an HTTP-level fault
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this error means the sync-token we sent has expired on the server.
    ///
    /// Both 403 and 410 are defined signals, servers use either
    pub fn is_token_expired(&self) -> bool {
        matches!(self, Self::Http { code: 403, .. } | Self::Http { code: 410, .. })
    }

    /// Whether this error is a `412 Precondition Failed`, i.e. an ETag conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Http { code: 412, .. })
    }

    /// Whether this error means the resource does not exist on the server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { code: 404, .. })
    }

    /// Whether the server asked us to slow down (`429 Too Many Requests`)
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Http { code: 429, .. })
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

impl Display for DavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { code, message, .. } => write!(f, "HTTP error {}: {}", code, message),
            Self::Network { message } => write!(f, "Network error: {}", message),
            Self::Parse { message } => write!(f, "Parse error: {}", message),
            Self::Argument { message } => write!(f, "Invalid argument: {}", message),
        }
    }
}

impl std::error::Error for DavError {}

impl From<reqwest::Error> for DavError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::http(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<minidom::Error> for DavError {
    fn from(err: minidom::Error) -> Self {
        Self::parse(err.to_string())
    }
}

impl From<url::ParseError> for DavError {
    fn from(err: url::ParseError) -> Self {
        Self::argument(err.to_string())
    }
}
