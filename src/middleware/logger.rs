//! Access log.

use std::time::Instant;

use tracing::{error, info, warn};

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::Error;

/// Emits one `tracing` event per request once the rest of the chain is done.
///
/// The event carries method, path, final status and latency. Its level
/// follows the outcome: `info` below 400, `warn` for client errors, `error`
/// for server errors and for errors still propagating. Writing the event is
/// the subscriber's business; pair it with a non-blocking writer so slow log
/// sinks never hold up responses.
///
/// Register it first so it sees the response every other stage produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let method = ctx.request.method();
            let path = ctx.request.path().to_owned();
            let start = Instant::now();

            let result = next.run(ctx).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(()) => {
                    let status = ctx.response.status_code().as_u16();
                    if status >= 500 {
                        error!(%method, %path, status, latency_ms, "request served");
                    } else if status >= 400 {
                        warn!(%method, %path, status, latency_ms, "request served");
                    } else {
                        info!(%method, %path, status, latency_ms, "request served");
                    }
                }
                Err(err) => {
                    let status = err.status().as_u16();
                    error!(%method, %path, status, latency_ms, error = %err, "request failed");
                }
            }

            result
        })
    }
}
