//! Minimal sprig example: JSON endpoints, static assets and the stock plugins.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users/42
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/api/users/42
//!   curl http://localhost:3000/files/docs/readme.txt
//!   curl http://localhost:3000/healthz

use serde::Deserialize;
use sprig::middleware::{BodyParser, Logger, ParsedBody, Recover, Security, StaticFiles};
use sprig::{App, Error, Request, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let users = Router::new()
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .delete("/users/:id", delete_user);

    let router = Router::new()
        .get("/healthz", |_req: Request| async { "ok" })
        .get("/files/*path", list_file)
        .nest("/api", users);

    let app = App::new(router)
        .with(Logger::new())
        .with(Recover::new())
        .with(Security::new())
        .with(StaticFiles::new("/assets", "./public"))
        .with(BodyParser::new());

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /api/users/:id
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /api/users
//
// BodyParser already decoded the JSON; a missing or malformed body becomes
// a 400 that Recover renders as JSON.
async fn create_user(req: Request) -> Result<Response, Error> {
    let input: CreateUser = req
        .state::<ParsedBody>()
        .ok_or_else(|| Error::bad_request("expected a JSON body"))?
        .deserialize()?;

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/api/users/99")
        .json(serde_json::json!({ "id": "99", "name": input.name }).to_string()))
}

// DELETE /api/users/:id → 204 No Content
async fn delete_user(_req: Request) -> StatusCode {
    StatusCode::NO_CONTENT
}

// GET /files/*path → the wildcard binds the rest of the path, slashes included.
async fn list_file(req: Request) -> String {
    format!("you asked for `{}`\n", req.param("path").unwrap_or_default())
}
