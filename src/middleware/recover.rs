//! Turns propagating errors into JSON error responses.

use http::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{error, warn};

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::Error;
use crate::response::ContentType;

#[derive(Serialize)]
struct Envelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
}

/// Catches errors from the rest of the chain and answers with
///
/// ```json
/// {"error":{"status":422,"message":"name is required"}}
/// ```
///
/// Server errors (5xx) carry only the canonical reason phrase unless
/// [`expose_internal`](Recover::expose_internal) is on, so internals don't
/// leak to clients. Middleware registered *before* `Recover` see a normal
/// `Ok` result with the substituted response.
///
/// An error raised after the response was already sent cannot be recovered
/// and keeps propagating.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover {
    expose_internal: bool,
}

impl Recover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show server error messages to clients. Development only.
    pub fn expose_internal(mut self, yes: bool) -> Self {
        self.expose_internal = yes;
        self
    }
}

impl Middleware for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let result = next.run(ctx).await;
            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) if ctx.response.is_sent() => return Err(err),
                Err(err) => err,
            };

            let status = err.status();
            if status.is_server_error() {
                error!(path = %ctx.request.path(), status = status.as_u16(), error = %err, "recovered from error");
            } else {
                warn!(path = %ctx.request.path(), status = status.as_u16(), error = %err, "recovered from error");
            }

            let detail = err.to_string();
            let message = if status.is_server_error() && !self.expose_internal {
                status.canonical_reason().unwrap_or("Internal Server Error")
            } else {
                detail.as_str()
            };
            let body = serde_json::to_vec(&Envelope { error: ErrorBody { status: status.as_u16(), message } })
                .map_err(Error::internal)?;

            ctx.response.set_status_code(status)?;
            ctx.response.set_header(CONTENT_TYPE.as_str(), ContentType::Json.as_str())?;
            ctx.response.set_body(body)
        })
    }
}
