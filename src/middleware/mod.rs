//! Middleware layer.
//!
//! Middleware intercepts every request on its way to the router and every
//! response on its way back. It is the place for cross-cutting concerns:
//! body decoding, access logs, static assets, security headers, error pages.
//!
//! # The contract
//!
//! A middleware gets the request [`Context`] and a [`Next`] continuation.
//! It may
//!
//! - work on the context, then call `next.run(ctx).await` to pass control
//!   down the chain (the last stage is the router);
//! - skip `next` entirely, which short-circuits: nothing after it runs, and
//!   whatever it put in `ctx.response` is what the client gets;
//! - keep working on the context after `next` returns ("after" section).
//!
//! "Before" sections run in registration order, "after" sections in reverse.
//! Errors travel back up as `Err` values. A middleware whose after section
//! must run on failure too (timers, log lines, cleanup) holds on to the
//! result instead of using `?`:
//!
//! ```rust
//! use sprig::middleware::{BoxFuture, Middleware, Next};
//! use sprig::{Context, Error};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
//!         Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             let result = next.run(ctx).await;
//!             if !ctx.response.is_sent() {
//!                 let micros = start.elapsed().as_micros().to_string();
//!                 ctx.response.set_header("x-response-time-us", &micros)?;
//!             }
//!             result
//!         })
//!     }
//! }
//! ```
//!
//! A middleware that catches the error and fills in a response instead
//! recovers it; see [`Recover`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::trace;

use crate::app::Dispatch;
use crate::context::Context;
use crate::error::Error;

mod logger;
mod parser;
mod recover;
mod security;
mod static_files;

pub use logger::Logger;
pub use parser::{BodyParser, ParsedBody};
pub use recover::Recover;
pub use security::Security;
pub use static_files::StaticFiles;

/// A heap-allocated, type-erased future.
///
/// `Send` so a request can hop between tokio worker threads at every await.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased middleware as stored by the app.
pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// One stage of the request pipeline.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>>;
}

/// The rest of the chain below the current middleware.
///
/// Consumed by [`Next::run`], so it can be invoked at most once.
pub struct Next<'a> {
    chain: &'a [BoxedMiddleware],
    dispatch: &'a Dispatch,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [BoxedMiddleware], dispatch: &'a Dispatch) -> Self {
        Self { chain, dispatch }
    }

    /// Runs the next middleware, or the router once the chain is exhausted.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, Result<(), Error>>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                trace!(middleware = middleware.name(), "entering middleware");
                middleware.handle(ctx, Next { chain: rest, dispatch: self.dispatch })
            }
            None => self.dispatch.dispatch(ctx),
        }
    }
}

/// Middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

/// Adapts a closure into a [`Middleware`].
///
/// ```rust
/// use sprig::middleware::from_fn;
///
/// let powered_by = from_fn("powered-by", |ctx, next| Box::pin(async move {
///     ctx.response.set_header("x-powered-by", "sprig")?;
///     next.run(ctx).await
/// }));
/// ```
pub fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
{
    FnMiddleware { name, func }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), Error>> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        (self.func)(ctx, next)
    }
}
