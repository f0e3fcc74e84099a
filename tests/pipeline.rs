//! Middleware chain behaviour through the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sprig::middleware::{BoxFuture, Middleware, Next, Recover, from_fn};
use sprig::{App, Context, Error, Method, Request, Response, Router, StatusCode};

type Log = Arc<Mutex<Vec<String>>>;

/// Records "before-X" and "after-X" around the rest of the chain.
struct Trace {
    name: &'static str,
    log: Log,
}

impl Middleware for Trace {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(format!("before-{}", self.name));
            let result = next.run(ctx).await;
            self.log.lock().unwrap().push(format!("after-{}", self.name));
            result
        })
    }
}

/// Answers on its own and never calls `next`.
struct Gate {
    log: Log,
}

impl Middleware for Gate {
    fn handle<'a>(&'a self, ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.log.lock().unwrap().push("gate".to_owned());
            ctx.response.set_status(401)?;
            ctx.response.send("denied")
        })
    }
}

fn traced(log: &Log, name: &'static str) -> Trace {
    Trace { name, log: Arc::clone(log) }
}

fn recording_router(log: &Log) -> Router {
    let log = Arc::clone(log);
    Router::new().get("/", move |_req: Request| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push("handler".to_owned());
            "done"
        }
    })
}

fn get(path: &str) -> Request {
    Request::builder().method(Method::Get).uri(path).build().unwrap()
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn before_in_order_after_in_reverse() {
    let log = Log::default();
    let app = App::new(recording_router(&log))
        .with(traced(&log, "A"))
        .with(traced(&log, "B"))
        .with(traced(&log, "C"));

    let res = app.handle(get("/")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(
        entries(&log),
        ["before-A", "before-B", "before-C", "handler", "after-C", "after-B", "after-A"]
    );
}

#[tokio::test]
async fn skipping_next_short_circuits() {
    let log = Log::default();
    let app = App::new(recording_router(&log))
        .with(traced(&log, "A"))
        .with(Gate { log: Arc::clone(&log) })
        .with(traced(&log, "C"));

    let res = app.handle(get("/")).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(entries(&log), ["before-A", "gate", "after-A"]);
    assert_eq!(res.into_bytes().await.unwrap(), "denied");
}

#[tokio::test]
async fn errors_unwind_through_every_after_section() {
    let log = Log::default();
    let router = Router::new().get("/", |_req: Request| async {
        Err::<Response, _>(Error::new(StatusCode::CONFLICT, "already exists"))
    });
    let app = App::new(router).with(traced(&log, "A")).with(traced(&log, "B"));

    let res = app.handle(get("/")).await;

    assert_eq!(entries(&log), ["before-A", "before-B", "after-B", "after-A"]);
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn unhandled_handler_error_defaults_to_500() {
    let router = Router::new().get("/", |_req: Request| async {
        Err::<Response, _>(Error::internal(std::io::Error::other("disk on fire")))
    });
    let res = App::new(router).handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn recover_substitutes_a_json_error() {
    let log = Log::default();
    let router = Router::new().get("/", |_req: Request| async {
        Err::<Response, _>(Error::bad_request("name is required"))
    });
    let app = App::new(router).with(traced(&log, "outer")).with(Recover::new());

    let res = app.handle(get("/")).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&res.into_bytes().await.unwrap()).unwrap();
    assert_eq!(body["error"]["status"], 400);
    assert_eq!(body["error"]["message"], "name is required");
    assert_eq!(entries(&log), ["before-outer", "after-outer"]);
}

#[tokio::test]
async fn recover_hides_server_error_details() {
    let router = Router::new().get("/", |_req: Request| async {
        Err::<Response, _>(Error::internal(std::io::Error::other("password=hunter2")))
    });
    let res = App::new(router).with(Recover::new()).handle(get("/")).await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = res.into_bytes().await.unwrap();
    let body = std::str::from_utf8(&body).unwrap();
    assert!(!body.contains("hunter2"));
    assert!(body.contains("Internal Server Error"));
}

#[tokio::test]
async fn default_not_found() {
    let app = App::new(Router::new().get("/known", |_req: Request| async { "known" }));
    let res = app.handle(get("/unknown")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn custom_fallback_runs_inside_the_chain() {
    let log = Log::default();
    let app = App::new(Router::new())
        .with(traced(&log, "A"))
        .fallback(|req: Request| async move {
            (StatusCode::NOT_FOUND, format!("nothing at {}", req.path()))
        });

    let res = app.handle(get("/missing")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(entries(&log), ["before-A", "after-A"]);
    assert_eq!(res.into_bytes().await.unwrap(), "nothing at /missing");
}

#[tokio::test]
async fn a_response_is_sent_once() {
    let seen = Arc::new(Mutex::new(None));
    let seen_by_stage = Arc::clone(&seen);
    let resend = from_fn("resend", move |ctx, _next| {
        let second_send = Arc::clone(&seen_by_stage);
        Box::pin(async move {
            ctx.response.send("first")?;
            let second = ctx.response.send("second");
            *second_send.lock().unwrap() = Some(matches!(second, Err(Error::ResponseAlreadySent)));
            Ok::<(), Error>(())
        })
    });

    let res = App::new(Router::new()).with(resend).handle(get("/")).await;

    assert_eq!(*seen.lock().unwrap(), Some(true));
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.into_bytes().await.unwrap(), "first");
}

#[tokio::test]
async fn after_sections_can_decorate_the_handler_response() {
    let stamp = from_fn("stamp", |ctx, next| Box::pin(async move {
        next.run(ctx).await?;
        ctx.response.set_header("x-served-by", "sprig")
    }));
    let app = App::new(Router::new().get("/", |_req: Request| async { "hi" })).with(stamp);

    let res = app.handle(get("/")).await;

    assert_eq!(res.header("x-served-by"), Some("sprig"));
    assert_eq!(res.into_bytes().await.unwrap(), "hi");
}

#[tokio::test]
async fn state_set_upstream_reaches_the_handler() {
    #[derive(Clone)]
    struct User(&'static str);

    let auth = from_fn("auth", |ctx, next| Box::pin(async move {
        ctx.set_state(User("ana"));
        next.run(ctx).await
    }));
    let router = Router::new().get("/me", |req: Request| async move {
        req.state::<User>().map(|u| u.0).unwrap_or("anonymous").to_owned()
    });

    let res = App::new(router).with(auth).handle(get("/me")).await;
    assert_eq!(res.into_bytes().await.unwrap(), "ana");
}

#[tokio::test]
async fn slow_requests_time_out_with_503() {
    let router = Router::new().get("/slow", |_req: Request| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        "too late"
    });
    let app = App::new(router).timeout(Duration::from_millis(20));

    let res = app.handle(get("/slow")).await;

    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn concurrent_requests_do_not_share_state() {
    let router = Router::new().get("/echo/:n", |req: Request| async move {
        tokio::task::yield_now().await;
        req.param("n").unwrap_or_default().to_owned()
    });
    let app = Arc::new(App::new(router));

    let tasks: Vec<_> = (0..32)
        .map(|n| {
            let app = Arc::clone(&app);
            tokio::spawn(async move { (n, app.handle(get(&format!("/echo/{n}"))).await) })
        })
        .collect();

    for task in tasks {
        let (n, res) = task.await.unwrap();
        assert_eq!(res.into_bytes().await.unwrap(), n.to_string());
    }
}
