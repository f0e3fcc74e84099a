//! The application host: middleware chain plus router.
//!
//! ```text
//! App::handle(req)
//!   → middleware₁ → middleware₂ → … → Dispatch (router → handler)
//!   ← middleware₁ ← middleware₂ ← … ←
//! ```
//!
//! `App` is immutable once built. Wrap it in an `Arc` (the server does) and
//! any number of requests can run through it at once; each gets its own
//! [`Context`] and nothing else is written.

use std::sync::Arc;
use std::time::Duration;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, error, trace, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{self, BoxedHandler, Handler};
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Terminal stage of every chain: route the request and run its handler.
pub(crate) struct Dispatch {
    router: Router,
    fallback: BoxedHandler,
}

impl Dispatch {
    pub(crate) fn dispatch<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let handler = match self.router.resolve(ctx.request.method(), ctx.request.path()) {
                Ok(matched) => {
                    trace!(pattern = matched.pattern(), "route matched");
                    let (handler, params) = matched.into_parts();
                    ctx.request.params = params;
                    handler
                }
                Err(Error::NotFound { method, path }) => {
                    debug!(%method, %path, "no route matched, using fallback");
                    Arc::clone(&self.fallback)
                }
                Err(other) => return Err(other),
            };

            let response = handler.call(ctx.request.detach()).await?;
            ctx.response.apply(response)
        })
    }
}

/// An HTTP application: an ordered middleware chain in front of a router.
///
/// ```rust
/// use sprig::middleware::{Logger, Recover, Security};
/// use sprig::{App, Method, Request, Response, Router};
///
/// async fn hello(req: Request) -> Response {
///     Response::text(format!("hello {}", req.param("name").unwrap_or("world")))
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let app = App::new(Router::new().get("/hello/:name", hello))
///     .with(Logger::new())
///     .with(Recover::new())
///     .with(Security::new());
///
/// let req = Request::builder().method(Method::Get).uri("/hello/ana").build().unwrap();
/// let res = app.handle(req).await;
/// assert_eq!(res.into_bytes().await.unwrap(), "hello ana");
/// # }
/// ```
pub struct App {
    middleware: Vec<BoxedMiddleware>,
    dispatch: Dispatch,
    timeout: Option<Duration>,
}

impl App {
    pub fn new(router: Router) -> Self {
        debug!(routes = router.len(), "app created");
        Self {
            middleware: Vec::new(),
            dispatch: Dispatch { router, fallback: handler::not_found.into_boxed_handler() },
            timeout: None,
        }
    }

    /// Appends a middleware. Registration order is execution order on the way in.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        debug!(middleware = middleware.name(), position = self.middleware.len(), "middleware registered");
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Handler for requests no route matches. Defaults to `404` with an empty body.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.dispatch.fallback = handler.into_boxed_handler();
        self
    }

    /// Deadline for a whole request.
    ///
    /// When it passes, the chain is dropped where it stands (entered stages
    /// release what they hold through `Drop`), anything it wrote is
    /// discarded, and the client gets `503 Service Unavailable`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn router(&self) -> &Router {
        &self.dispatch.router
    }

    /// Middleware names in execution order.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Runs one request through the chain and returns the response to flush.
    ///
    /// Never fails: unhandled errors become a response with the error's
    /// status (`500` for handler errors without one) and an empty body.
    pub async fn handle(&self, request: Request) -> Response {
        let mut ctx = Context::new(request);

        let chain = Next::new(&self.middleware, &self.dispatch).run(&mut ctx);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, chain).await,
            None => Ok(chain.await),
        };

        let method = ctx.request.method();
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                warn!(%method, path = %ctx.request.path(), "request timed out");
                let mut response = Response::from_error(&Error::Timeout);
                response.sent = true;
                return response;
            }
        };
        match outcome {
            Ok(()) => {}
            Err(err) if ctx.response.is_sent() => {
                error!(%method, path = %ctx.request.path(), error = %err, "error after the response was sent");
            }
            Err(err) => {
                error!(
                    %method,
                    path = %ctx.request.path(),
                    status = err.status().as_u16(),
                    error = %err,
                    "unhandled error"
                );
                let mut response = Response::from_error(&err);
                // Keep headers set on the way in (security headers and the
                // like), minus anything describing the body we replace.
                response.headers = std::mem::take(&mut ctx.response.headers);
                response.headers.remove(CONTENT_TYPE);
                response.headers.remove(CONTENT_LENGTH);
                ctx.response = response;
            }
        }

        let mut response = ctx.response;
        response.sent = true;
        response
    }
}
