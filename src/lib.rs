//! # sprig
//!
//! A small HTTP application framework: a pattern router, an ordered
//! middleware chain and a handful of plugins, on top of hyper and tokio.
//!
//! ## How a request flows
//!
//! ```text
//! Server (hyper) → Request → App::handle
//!     → middleware₁ → … → middlewareₙ → Router → handler
//!     ← middleware₁ ← … ← middlewareₙ ←
//! Response → flushed once
//! ```
//!
//! - **Routing**: literal segments, `:name` parameters and a trailing `*`
//!   wildcard. The most specific pattern wins no matter the order routes
//!   were added; among equally specific ones the earliest wins.
//! - **Middleware**: each stage runs code before and after the rest of the
//!   chain, can short-circuit by not calling `next`, and sees errors as
//!   they travel back up.
//! - **Plugins**: [`BodyParser`](middleware::BodyParser),
//!   [`Logger`](middleware::Logger), [`StaticFiles`](middleware::StaticFiles),
//!   [`Security`](middleware::Security), [`Recover`](middleware::Recover).
//! - **Graceful shutdown**: SIGTERM / Ctrl-C stops accepting and drains
//!   in-flight requests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sprig::middleware::{BodyParser, Logger, ParsedBody, Recover};
//! use sprig::{App, Error, Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let router = Router::new()
//!         .get("/users/:id", get_user)
//!         .post("/users", create_user);
//!
//!     let app = App::new(router)
//!         .with(Logger::new())
//!         .with(Recover::new())
//!         .with(BodyParser::new());
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn create_user(req: Request) -> Result<Response, Error> {
//!     let Some(body) = req.state::<ParsedBody>() else {
//!         return Err(Error::bad_request("expected a body"));
//!     };
//!     let user: serde_json::Value = body.deserialize()?;
//!     Ok(Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .json(user.to_string()))
//! }
//! ```

mod app;
mod context;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use app::App;
pub use context::Context;
pub use error::{BoxError, Error, Result};
pub use handler::Handler;
pub use method::{Method, UnsupportedMethod};
pub use request::{Request, RequestBody, RequestBuilder};
pub use response::{ContentType, IntoOutcome, IntoResponse, Response, ResponseBody, ResponseBuilder};
pub use router::{Match, MethodFilter, PatternSyntax, Router};
pub use server::Server;

pub use http::{HeaderMap, HeaderValue, StatusCode};
