//! Unified error type.

use http::StatusCode;

use crate::method::Method;

/// Boxed error used for opaque sources and streamed body failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shorthand for results whose error is [`Error`].
///
/// Defaults to `()` because that is what middleware return.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// The error type returned by sprig's fallible operations.
///
/// Startup errors ([`Error::RouteConflict`], [`Error::InvalidPattern`]) are
/// raised while building the router and are meant to abort the process.
/// Everything else travels up the middleware chain as a request-time error;
/// [`Error::status`] tells the app which status to answer with when nothing
/// catches it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route with the same method and shape is already registered.
    #[error("route conflict: {method} `{pattern}` is already registered")]
    RouteConflict { method: String, pattern: String },

    /// A route pattern could not be parsed.
    #[error("invalid route `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    /// No route matches the request.
    #[error("no route for {method} {path}")]
    NotFound { method: Method, path: String },

    /// Raised by a handler or middleware while processing a request.
    #[error("{message}")]
    Handler {
        status: StatusCode,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A stage tried to change a response that was already committed.
    #[error("response already sent")]
    ResponseAlreadySent,

    /// Status codes must be three digits in the 100–599 range.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// A header name or value contains bytes HTTP does not allow.
    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    /// The request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The request did not finish before the app's deadline.
    #[error("request timed out")]
    Timeout,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http: {0}")]
    Hyper(#[from] hyper::Error),
}

impl Error {
    /// A handler error with an explicit status.
    ///
    /// ```rust
    /// use sprig::{Error, StatusCode};
    ///
    /// let err = Error::new(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    /// assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    /// ```
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Handler { status, message: message.into(), source: None }
    }

    /// `400 Bad Request` handler error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `500 Internal Server Error` wrapping an arbitrary source error.
    pub fn internal(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self::Handler {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Attaches a source to a handler error. Other variants are returned as is.
    pub fn with_source(self, err: impl Into<BoxError>) -> Self {
        match self {
            Self::Handler { status, message, .. } => {
                Self::Handler { status, message, source: Some(err.into()) }
            }
            other => other,
        }
    }

    /// The status the client sees when this error reaches the app uncaught.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Handler { status, .. } => *status,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            // Reading the body failed: the client sent something broken.
            Self::Hyper(_) => StatusCode::BAD_REQUEST,
            Self::RouteConflict { .. }
            | Self::InvalidPattern { .. }
            | Self::ResponseAlreadySent
            | Self::InvalidStatus(_)
            | Self::InvalidHeader(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
