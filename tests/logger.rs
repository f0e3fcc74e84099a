//! Access-log events as a subscriber sees them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use sprig::middleware::Logger;
use sprig::{App, Error, Method, Request, Response, Router, StatusCode};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{self, Layer, SubscriberExt};

#[derive(Debug)]
struct Record {
    level: Level,
    fields: HashMap<&'static str, String>,
}

/// Keeps every event the access log emits.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<Record>>>);

impl Capture {
    fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

struct Fields<'a>(&'a mut HashMap<&'static str, String>);

impl Visit for Fields<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _ctx: layer::Context<'_, S>) {
        if event.metadata().target() != "sprig::middleware::logger" {
            return;
        }
        let mut fields = HashMap::new();
        event.record(&mut Fields(&mut fields));
        self.0.lock().unwrap().push(Record { level: *event.metadata().level(), fields });
    }
}

fn app() -> App {
    let router = Router::new()
        .get("/ok", |_req: Request| async { "fine" })
        .get("/broken", |_req: Request| async { StatusCode::INTERNAL_SERVER_ERROR })
        .get("/invalid", |_req: Request| async {
            Err::<Response, _>(Error::bad_request("name is required"))
        });
    App::new(router).with(Logger::new())
}

fn get(path: &str) -> Request {
    Request::builder().method(Method::Get).uri(path).build().unwrap()
}

/// Runs one request and returns the single access-log record it produced.
async fn logged(capture: &Capture, path: &str) -> (StatusCode, Record) {
    let res = app().handle(get(path)).await;
    let mut records = capture.take();
    assert_eq!(records.len(), 1, "{path}: {records:?}");
    (res.status_code(), records.remove(0))
}

#[tokio::test]
async fn one_event_per_request_levelled_by_outcome() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let (status, record) = logged(&capture, "/ok").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record.level, Level::INFO);
    assert_eq!(record.fields["status"], "200");
    assert_eq!(record.fields["path"], "/ok");
    assert_eq!(record.fields["method"], "GET");
    assert!(record.fields["latency_ms"].parse::<f64>().unwrap() >= 0.0);

    let (status, record) = logged(&capture, "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(record.level, Level::WARN);
    assert_eq!(record.fields["status"], "404");
    assert!(record.fields.contains_key("latency_ms"));

    let (status, record) = logged(&capture, "/broken").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(record.level, Level::ERROR);
    assert_eq!(record.fields["status"], "500");
    assert_eq!(record.fields["message"], "request served");

    let (status, record) = logged(&capture, "/invalid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(record.level, Level::ERROR);
    assert_eq!(record.fields["status"], "400");
    assert_eq!(record.fields["message"], "request failed");
    assert!(record.fields["error"].contains("name is required"), "{record:?}");
    assert!(record.fields.contains_key("latency_ms"));
}
