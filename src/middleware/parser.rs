//! Request body decoding.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::Error;

/// Default cap on buffered bodies: 1 MiB.
const DEFAULT_LIMIT: usize = 1024 * 1024;

/// A decoded request body, stored in the request state by [`BodyParser`].
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Text(String),
}

impl ParsedBody {
    /// Deserializes a JSON body into `T`. Other encodings are a `400`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        match self {
            Self::Json(value) => T::deserialize(value)
                .map_err(|e| Error::bad_request(format!("unexpected JSON body: {e}")).with_source(e)),
            _ => Err(Error::bad_request("expected a JSON body")),
        }
    }

    /// First value of a form field.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Form(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Encoding {
    Json,
    Form,
    Text,
}

impl Encoding {
    fn from_media_type(media: &str) -> Option<Self> {
        if media == "application/json" || media.ends_with("+json") {
            Some(Self::Json)
        } else if media == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else if media.starts_with("text/") {
            Some(Self::Text)
        } else {
            None
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<ParsedBody, Error> {
        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map(ParsedBody::Json)
                .map_err(|e| Error::bad_request("malformed JSON body").with_source(e)),
            Self::Form => Ok(ParsedBody::Form(
                url::form_urlencoded::parse(bytes).into_owned().collect(),
            )),
            Self::Text => String::from_utf8(bytes.to_vec())
                .map(ParsedBody::Text)
                .map_err(|e| Error::bad_request("request body is not valid UTF-8").with_source(e)),
        }
    }
}

/// Decodes JSON, URL-encoded form and text bodies before the router runs.
///
/// Requests without a body, or with a content type it does not know, pass
/// through untouched. The raw bytes stay available to the handler.
///
/// ```rust
/// use sprig::middleware::{BodyParser, ParsedBody};
/// use sprig::{App, Request, Response, Router, StatusCode};
///
/// async fn create(req: Request) -> Result<Response, sprig::Error> {
///     let Some(body) = req.state::<ParsedBody>() else {
///         return Ok(Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
///     };
///     let value: serde_json::Value = body.deserialize()?;
///     Ok(Response::json(value.to_string()))
/// }
///
/// let app = App::new(Router::new().post("/items", create))
///     .with(BodyParser::new().limit(64 * 1024));
/// ```
#[derive(Clone, Debug)]
pub struct BodyParser {
    limit: usize,
}

impl BodyParser {
    pub fn new() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }

    /// Largest body, in bytes, the parser will buffer. Larger bodies fail with `413`.
    pub fn limit(mut self, bytes: usize) -> Self {
        self.limit = bytes;
        self
    }
}

impl Default for BodyParser {
    fn default() -> Self { Self::new() }
}

impl Middleware for BodyParser {
    fn name(&self) -> &'static str {
        "parser"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let encoding = ctx
                .request
                .content_type()
                .and_then(|media| Encoding::from_media_type(&media));

            if let Some(encoding) = encoding {
                if !ctx.request.body().is_empty() {
                    let bytes = ctx.request.body_mut().bytes_limited(self.limit).await?;
                    if !bytes.is_empty() {
                        let parsed = encoding.decode(&bytes)?;
                        debug!(?encoding, len = bytes.len(), "request body parsed");
                        ctx.request.set_state(parsed);
                    }
                }
            }

            next.run(ctx).await
        })
    }
}
