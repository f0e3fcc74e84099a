//! End-to-end over a real socket.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::{TokioExecutor, TokioIo};
use sprig::middleware::{Logger, Security};
use sprig::{App, Request, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn start(app: App) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<Result<(), sprig::Error>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        Server::from_listener(listener)
            .serve_with_shutdown(app, async {
                let _ = rx.await;
            })
            .await
    });
    (addr, tx, server)
}

async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

fn app() -> App {
    let router = Router::new()
        .get("/hello/:name", |req: Request| async move {
            format!("hello {}", req.param("name").unwrap_or_default())
        })
        .post("/echo", |mut req: Request| async move { req.body_mut().text().await });
    App::new(router).with(Logger::new()).with(Security::new())
}

#[tokio::test]
async fn serves_requests_and_shuts_down() {
    let (addr, shutdown, server) = start(app()).await;

    let res = roundtrip(addr, "GET /hello/ana HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 200"), "{res}");
    assert!(res.contains("x-content-type-options: nosniff"), "{res}");
    assert!(res.ends_with("hello ana"), "{res}");

    let res = roundtrip(
        addr,
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nworld",
    )
    .await;
    assert!(res.starts_with("HTTP/1.1 200"), "{res}");
    assert!(res.ends_with("world"), "{res}");

    let res = roundtrip(addr, "GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 404"), "{res}");

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_methods_are_405() {
    let (addr, shutdown, server) = start(app()).await;

    let res = roundtrip(addr, "TRACE /hello/ana HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 405"), "{res}");
    assert!(res.to_ascii_lowercase().contains("allow: delete, get"), "{res}");

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn http2_requests_pass_the_host_allow_list() {
    let (addr, shutdown, server) = start(app().with(Security::new().allow_host("127.0.0.1"))).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
        .await
        .unwrap();
    let conn = tokio::spawn(conn);

    let req = http::Request::builder()
        .uri(format!("http://127.0.0.1:{}/hello/ana", addr.port()))
        .body(Empty::<Bytes>::new())
        .unwrap();
    let res = sender.send_request(req).await.unwrap();

    assert_eq!(res.status(), http::StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "hello ana");

    drop(sender);
    conn.abort();
    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn http1_hosts_outside_the_allow_list_are_403() {
    let (addr, shutdown, server) = start(app().with(Security::new().allow_host("127.0.0.1"))).await;

    let res = roundtrip(addr, "GET /hello/ana HTTP/1.1\r\nHost: evil.test\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 403"), "{res}");

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}
