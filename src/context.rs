//! Per-request state threaded through the middleware chain.

use crate::error::Error;
use crate::request::Request;
use crate::response::{Response, ResponseBody};

/// The mutable object every pipeline stage reads and writes.
///
/// Created fresh for each request by [`App::handle`](crate::App::handle) and
/// dropped once the response is handed to the transport. The shortcuts below
/// forward to [`Context::request`] and [`Context::response`].
#[derive(Debug)]
pub struct Context {
    pub request: Request,
    pub response: Response,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request, response: Response::default() }
    }

    /// Case-insensitive request header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Route parameter bound by the router. Absent until dispatch, and for unknown names.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.request.state::<T>()
    }

    pub fn set_state<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.request.set_state(value)
    }

    pub fn set_status(&mut self, code: u16) -> Result<(), Error> {
        self.response.set_status(code)
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.response.set_header(name, value)
    }

    pub fn set_body(&mut self, body: impl Into<ResponseBody>) -> Result<(), Error> {
        self.response.set_body(body)
    }

    /// Sets the body and commits the response. See [`Response::send`].
    pub fn send(&mut self, body: impl Into<ResponseBody>) -> Result<(), Error> {
        self.response.send(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn shortcuts_reach_request_and_response() {
        let req = Request::builder().header("Accept", "text/plain").build().unwrap();
        let mut ctx = Context::new(req);

        assert_eq!(ctx.header("accept"), Some("text/plain"));
        assert_eq!(ctx.param("id"), None);

        ctx.set_status(201).unwrap();
        ctx.set_header("x-id", "7").unwrap();
        ctx.send("done").unwrap();

        assert_eq!(ctx.response.status_code(), StatusCode::CREATED);
        assert_eq!(ctx.response.header("x-id"), Some("7"));
        assert!(matches!(ctx.set_body("late"), Err(Error::ResponseAlreadySent)));
    }
}
