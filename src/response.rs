//! Outgoing HTTP response type and the conversion traits handlers rely on.
//!
//! A [`Response`] lives in the request [`Context`](crate::Context) for the
//! whole trip through the pipeline. Every stage may change it until someone
//! calls [`Response::send`]; from then on it is frozen and further writes are
//! rejected with [`Error::ResponseAlreadySent`].

use std::fmt;

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use tracing::warn;

use crate::error::{BoxError, Error};

/// Body type handed to hyper.
pub(crate) type HttpBody = UnsyncBoxBody<Bytes, BoxError>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Css,
    Csv,
    EventStream,
    Gif,
    Html,
    Icon,
    Javascript,
    Jpeg,
    Json,
    OctetStream,
    Pdf,
    Png,
    Svg,
    Text,
    Wasm,
    Woff2,
    Xml,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Gif         => "image/gif",
            Self::Html        => "text/html; charset=utf-8",
            Self::Icon        => "image/x-icon",
            Self::Javascript  => "text/javascript; charset=utf-8",
            Self::Jpeg        => "image/jpeg",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Wasm        => "application/wasm",
            Self::Woff2       => "font/woff2",
            Self::Xml         => "application/xml",
        }
    }

    /// Guesses the type from a file extension. Unknown extensions are binary.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "css"          => Self::Css,
            "csv"          => Self::Csv,
            "gif"          => Self::Gif,
            "htm" | "html" => Self::Html,
            "ico"          => Self::Icon,
            "js" | "mjs"   => Self::Javascript,
            "jpg" | "jpeg" => Self::Jpeg,
            "json" | "map" => Self::Json,
            "pdf"          => Self::Pdf,
            "png"          => Self::Png,
            "svg"          => Self::Svg,
            "txt" | "md"   => Self::Text,
            "wasm"         => Self::Wasm,
            "woff2"        => Self::Woff2,
            "xml"          => Self::Xml,
            _              => Self::OctetStream,
        }
    }
}

// ── ResponseBody ──────────────────────────────────────────────────────────────

/// What a response carries: nothing, a buffer, or a stream produced later.
#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Full(Bytes),
    Stream(HttpBody),
}

impl ResponseBody {
    /// Wraps any hyper-compatible body as a streaming payload.
    pub fn stream<B>(body: B) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::Stream(body.map_err(Into::into).boxed_unsync())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Buffered bytes, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[]),
            Self::Full(bytes) => Some(bytes.as_ref()),
            Self::Stream(_) => None,
        }
    }

    fn into_http_body(self) -> HttpBody {
        match self {
            Self::Empty => Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync(),
            Self::Full(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
            Self::Stream(body) => body,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self { Self::Empty }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self { Self::Full(bytes) }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self { Self::Full(bytes.into()) }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self { Self::Full(text.into()) }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self { Self::Full(Bytes::from_static(text.as_bytes())) }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use sprig::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use sprig::{ContentType, Response, StatusCode};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
///
/// Response::builder().bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
///
/// # Mutating in place
///
/// Middleware work on the response stored in the context:
///
/// ```rust
/// use sprig::{Error, Response};
///
/// let mut res = Response::default();
/// res.set_status(201).unwrap();
/// res.set_header("x-powered-by", "sprig").unwrap();
/// res.send("created").unwrap();
///
/// assert!(matches!(res.set_body("again"), Err(Error::ResponseAlreadySent)));
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: ResponseBody,
    pub(crate) sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            sent: false,
        }
    }
}

impl Response {
    /// `200 OK`, `application/json`.
    ///
    /// Pass bytes from your serialiser directly:
    /// `serde_json::to_vec(&val)?` or `format!(r#"{{"id":{id}}}"#).into_bytes()`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::typed(ContentType::Json, body.into())
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::typed(ContentType::Text, Bytes::from(body.into()))
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::typed(ContentType::Html, Bytes::from(body.into()))
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, ..Self::default() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, headers: HeaderMap::new() }
    }

    fn typed(content_type: ContentType, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Self { status: StatusCode::OK, headers, body: ResponseBody::Full(body), sent: false }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &ResponseBody { &self.body }

    /// `true` once [`send`](Response::send) committed the response.
    pub fn is_sent(&self) -> bool { self.sent }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets the status from a raw code. Only the 100–599 range is accepted.
    pub fn set_status(&mut self, code: u16) -> Result<(), Error> {
        if !(100..=599).contains(&code) {
            return Err(Error::InvalidStatus(code));
        }
        let status = StatusCode::from_u16(code).map_err(|_| Error::InvalidStatus(code))?;
        self.set_status_code(status)
    }

    pub fn set_status_code(&mut self, status: StatusCode) -> Result<(), Error> {
        self.writable()?;
        self.status = status;
        Ok(())
    }

    /// Sets a header, replacing any previous values with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.writable()?;
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Adds a header value, keeping earlier values with the same name.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.writable()?;
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) -> Result<(), Error> {
        self.writable()?;
        self.headers.remove(name);
        Ok(())
    }

    /// Replaces the body. Allowed any number of times until the response is sent.
    pub fn set_body(&mut self, body: impl Into<ResponseBody>) -> Result<(), Error> {
        self.writable()?;
        self.body = body.into();
        Ok(())
    }

    /// Sets the body and commits the response.
    ///
    /// The committed status, headers and body are exactly what the client
    /// receives; nothing downstream or upstream can change them afterwards.
    pub fn send(&mut self, body: impl Into<ResponseBody>) -> Result<(), Error> {
        self.set_body(body)?;
        self.sent = true;
        Ok(())
    }

    /// Commits the response as it currently stands.
    pub fn end(&mut self) -> Result<(), Error> {
        self.writable()?;
        self.sent = true;
        Ok(())
    }

    /// Takes over a handler's response.
    ///
    /// Status and body are replaced. Headers set by upstream middleware stay
    /// unless the handler sets the same name.
    pub(crate) fn apply(&mut self, other: Response) -> Result<(), Error> {
        self.writable()?;
        let Response { status, headers, body, sent } = other;
        self.status = status;
        self.body = body;

        let mut current = None;
        for (name, value) in headers {
            // `None` names continue the previous header's run of values.
            if let Some(name) = name {
                self.headers.remove(&name);
                current = Some(name);
            }
            if let Some(name) = &current {
                self.headers.append(name.clone(), value);
            }
        }
        self.sent = sent;
        Ok(())
    }

    pub(crate) fn from_error(err: &Error) -> Self {
        Self::status(err.status())
    }

    pub(crate) fn into_http(self) -> http::Response<HttpBody> {
        let mut res = http::Response::new(self.body.into_http_body());
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }

    /// Buffers the body, draining a stream if needed.
    pub async fn into_bytes(self) -> Result<Bytes, Error> {
        match self.body {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Stream(body) => Ok(body.collect().await.map_err(Error::internal)?.to_bytes()),
        }
    }

    fn writable(&self) -> Result<(), Error> {
        if self.sent {
            warn!("write to a response that was already sent");
            return Err(Error::ResponseAlreadySent);
        }
        Ok(())
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let header = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::InvalidHeader(name.to_owned()))?;
    let value = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.to_owned()))?;
    Ok((header, value))
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so you always know what you're sending.
/// Headers with invalid names or values are dropped with a warning.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(e) => warn!(header = name, "dropping header: {e}"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Bytes::from(body.into()))
    }

    /// Terminate with a typed body. Use this for XML, HTML, binary, SSE, etc.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with a streaming body.
    pub fn stream(self, content_type: ContentType, body: ResponseBody) -> Response {
        let mut res = self.no_body();
        res.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        res.body = body;
        res
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, ..Response::default() }
    }

    fn finish(self, content_type: ContentType, body: Bytes) -> Response {
        let mut res = self.no_body();
        res.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        res.body = ResponseBody::Full(body);
        res
    }
}

// ── IntoResponse / IntoOutcome ────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
///
/// # Example: typed `Json<T>` wrapper with serde
///
/// ```rust
/// use serde::Serialize;
/// use sprig::{IntoResponse, Response, StatusCode};
///
/// struct Json<T: Serialize>(T);
///
/// impl<T: Serialize> IntoResponse for Json<T> {
///     fn into_response(self) -> Response {
///         match serde_json::to_vec(&self.0) {
///             Ok(bytes) => Response::json(bytes),
///             Err(_)    => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
///         }
///     }
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response { Response::typed(ContentType::OctetStream, self) }
}

impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Response { Response::json(self.to_string()) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Override the status of any other response value.
impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut res = self.1.into_response();
        res.status = self.0;
        res
    }
}

/// What a handler's return value turns into: a response or an error that
/// unwinds the middleware chain.
///
/// Implemented for every [`IntoResponse`] type in this crate and for
/// `Result<T, E>` where `T: IntoResponse` and `E: Into<Error>`. Your own
/// response types can be returned as `Ok(value)`.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Response, Error>;
}

impl<T: IntoResponse, E: Into<Error>> IntoOutcome for Result<T, E> {
    fn into_outcome(self) -> Result<Response, Error> {
        self.map(IntoResponse::into_response).map_err(Into::into)
    }
}

macro_rules! infallible_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                fn into_outcome(self) -> Result<Response, Error> { Ok(self.into_response()) }
            }
        )*
    };
}

infallible_outcome!(Response, &'static str, String, Bytes, serde_json::Value, StatusCode);

impl<T: IntoResponse> IntoOutcome for (StatusCode, T) {
    fn into_outcome(self) -> Result<Response, Error> { Ok(self.into_response()) }
}
