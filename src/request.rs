//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::Extensions;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};

use crate::error::{BoxError, Error};
use crate::method::Method;

/// An incoming HTTP request as seen by middleware and handlers.
///
/// Besides the wire data it carries the route parameters filled in by the
/// router and a typed state bag plugins use to hand values to each other.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) authority: Option<String>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: RequestBody,
    pub(crate) params: HashMap<String, String>,
    pub(crate) state: Extensions,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::Get,
            target: "/".to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            error: None,
        }
    }

    /// Converts a hyper request. Fails only on methods outside [`Method`].
    pub(crate) fn from_http(
        req: http::Request<Incoming>,
    ) -> Result<Self, crate::method::UnsupportedMethod> {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method)?;
        Ok(Self {
            method,
            path: parts.uri.path().to_owned(),
            authority: parts.uri.authority().map(|a| a.as_str().to_owned()),
            query: parse_query(parts.uri.query()),
            headers: parts.headers,
            body: RequestBody::streaming(body),
            params: HashMap::new(),
            state: parts.extensions,
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// All query pairs in order of appearance. Repeated keys are kept.
    pub fn query(&self) -> &[(String, String)] { &self.query }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query parameter.
    pub fn query_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// The host the request is addressed to, port included when given.
    ///
    /// HTTP/1.1 carries it in the `Host` header, HTTP/2 in the `:authority`
    /// pseudo-header, which ends up in the request URI.
    pub fn host(&self) -> Option<&str> {
        self.header("host").or(self.authority.as_deref())
    }

    /// Case-insensitive header lookup. Returns the first value that is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a repeated header.
    pub fn header_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.get_all(name).iter().filter_map(|v| v.to_str().ok())
    }

    /// The media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let essence = raw.split(';').next().unwrap_or_default().trim();
        Some(essence.to_ascii_lowercase())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Reads a value a plugin stored with [`Request::set_state`].
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    pub fn state_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.state.get_mut::<T>()
    }

    /// Stores a value keyed by its type, returning the previous one.
    pub fn set_state<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.state.insert(value)
    }

    pub fn body(&self) -> &RequestBody { &self.body }
    pub fn body_mut(&mut self) -> &mut RequestBody { &mut self.body }

    /// Splits off a request for the handler.
    ///
    /// The body moves to the returned request; everything else is copied, so
    /// middleware can still inspect method, path and headers afterwards.
    pub(crate) fn detach(&mut self) -> Request {
        Request {
            method: self.method,
            path: self.path.clone(),
            authority: self.authority.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: std::mem::take(&mut self.body),
            params: self.params.clone(),
            state: self.state.clone(),
        }
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    match query {
        Some(q) => url::form_urlencoded::parse(q.as_bytes()).into_owned().collect(),
        None => Vec::new(),
    }
}

// ── RequestBody ───────────────────────────────────────────────────────────────

/// A lazily read request body.
///
/// Bodies coming off the wire stay a stream until someone asks for the bytes.
/// The first read buffers them; later reads return the same buffer. A read
/// that fails leaves the body failed, and every later read fails too.
#[derive(Debug, Default)]
pub struct RequestBody {
    inner: BodyInner,
}

#[derive(Debug)]
enum BodyInner {
    Buffered(Bytes),
    Streaming(UnsyncBoxBody<Bytes, BoxError>),
    /// An earlier read failed. Carries the limit when it was exceeded.
    Failed(Option<usize>),
}

impl Default for BodyInner {
    fn default() -> Self { Self::Buffered(Bytes::new()) }
}

impl RequestBody {
    pub fn empty() -> Self { Self::default() }

    pub(crate) fn streaming<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self { inner: BodyInner::Streaming(body.map_err(Into::into).boxed_unsync()) }
    }

    /// `true` once the body is known to carry no bytes.
    ///
    /// An unread stream only counts as empty when hyper already knows it ended.
    pub fn is_empty(&self) -> bool {
        match &self.inner {
            BodyInner::Buffered(bytes) => bytes.is_empty(),
            BodyInner::Streaming(body) => body.is_end_stream(),
            BodyInner::Failed(_) => false,
        }
    }

    /// Reads the whole body.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        self.collect(None).await
    }

    /// Reads the whole body, failing with [`Error::PayloadTooLarge`] past `limit` bytes.
    pub async fn bytes_limited(&mut self, limit: usize) -> Result<Bytes, Error> {
        self.collect(Some(limit)).await
    }

    /// Reads the body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::bad_request("request body is not valid UTF-8").with_source(e))
    }

    async fn collect(&mut self, limit: Option<usize>) -> Result<Bytes, Error> {
        let bytes = match std::mem::replace(&mut self.inner, BodyInner::Failed(None)) {
            BodyInner::Buffered(bytes) => bytes,
            BodyInner::Streaming(body) => {
                let collected = match limit {
                    Some(limit) => {
                        let fut: std::pin::Pin<
                            Box<dyn std::future::Future<Output = Result<http_body_util::Collected<Bytes>, BoxError>> + Send>,
                        > = Box::pin(Limited::new(body, limit).collect());
                        fut.await
                    }
                    None => body.collect().await,
                };
                match collected {
                    Ok(collected) => collected.to_bytes(),
                    Err(err) => {
                        let err = read_error(err, limit);
                        if let Error::PayloadTooLarge { limit } = &err {
                            self.inner = BodyInner::Failed(Some(*limit));
                        }
                        return Err(err);
                    }
                }
            }
            BodyInner::Failed(exceeded) => {
                self.inner = BodyInner::Failed(exceeded);
                return Err(match exceeded {
                    Some(limit) => Error::PayloadTooLarge { limit },
                    None => Error::bad_request("request body failed to read earlier"),
                });
            }
        };
        self.inner = BodyInner::Buffered(bytes.clone());

        match limit {
            Some(limit) if bytes.len() > limit => Err(Error::PayloadTooLarge { limit }),
            _ => Ok(bytes),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self { inner: BodyInner::Buffered(bytes) }
    }
}

fn read_error(err: BoxError, limit: Option<usize>) -> Error {
    if let Some(limit) = limit {
        if err.is::<LengthLimitError>() {
            return Error::PayloadTooLarge { limit };
        }
    }
    match err.downcast::<hyper::Error>() {
        Ok(err) => Error::Hyper(*err),
        Err(other) => Error::internal(other),
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Builds a [`Request`] without a socket: for tests and for transports other
/// than the bundled hyper server.
///
/// ```rust
/// use sprig::{Method, Request};
///
/// let req = Request::builder()
///     .method(Method::Post)
///     .uri("/users?tag=a&tag=b")
///     .header("content-type", "application/json")
///     .body(r#"{"name":"alice"}"#)
///     .build()
///     .unwrap();
///
/// assert_eq!(req.path(), "/users");
/// assert_eq!(req.query_all("tag").collect::<Vec<_>>(), ["a", "b"]);
/// ```
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Bytes,
    error: Option<Error>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Request target: a path with an optional `?query`, or an absolute
    /// `http://host/path` whose authority becomes [`Request::host`].
    pub fn uri(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error.get_or_insert(Error::InvalidHeader(name.to_owned()));
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, Error> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let (authority, target) = split_authority(&self.target);
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query)),
            None => (target.to_owned(), None),
        };
        Ok(Request {
            method: self.method,
            path,
            authority,
            query: parse_query(query),
            headers: self.headers,
            body: RequestBody::from(self.body),
            params: HashMap::new(),
            state: Extensions::new(),
        })
    }
}

/// `http://host:80/a?b` becomes `(Some("host:80"), "/a?b")`. Origin-form targets pass through.
fn split_authority(target: &str) -> (Option<String>, &str) {
    if target.starts_with('/') {
        return (None, target);
    }
    let Some((_, rest)) = target.split_once("://") else {
        return (None, target);
    };
    match rest.find('/') {
        Some(i) => (Some(rest[..i].to_owned()), &rest[i..]),
        None => (Some(rest.to_owned()), "/"),
    }
}
