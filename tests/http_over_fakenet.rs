//! HTTP/1.1 through hyper over emulated connections.

use std::convert::Infallible;
use std::future::poll_fn;
use std::pin::Pin;

use bytes::Bytes;
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;

use fakenet::Scope;

async fn collect(mut body: Incoming) -> Bytes {
    let mut collected = Vec::new();
    while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        if let Ok(data) = frame.unwrap().into_data() {
            collected.extend_from_slice(&data);
        }
    }
    Bytes::from(collected)
}

async fn echo(req: Request<Incoming>) -> Result<Response<String>, Infallible> {
    let path = req.uri().path().to_string();
    let body = collect(req.into_body()).await;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONNECTION, "close")
        .body(format!("{path}: {}", String::from_utf8_lossy(&body)))
        .unwrap();
    Ok(response)
}

#[tokio::test]
async fn request_response_round_trip() {
    let scope = Scope::new();
    let (listener, dialer) = fakenet::listener(&scope);

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.unwrap();
        hyper::server::conn::http1::Builder::new()
            .serve_connection(TokioIo::new(conn), service_fn(echo))
            .await
            .unwrap();
        listener
    });

    let conn = dialer.dial().await.unwrap();
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(conn))
        .await
        .unwrap();
    let driver = tokio::spawn(connection);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header(hyper::header::HOST, dialer.addr().as_str())
        .header(hyper::header::CONNECTION, "close")
        .body(String::from("hello over fakenet"))
        .unwrap();
    let response = sender.send_request(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = collect(response.into_body()).await;
    assert_eq!(&body[..], b"/echo: hello over fakenet");

    driver.await.unwrap().unwrap();
    server.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_finishes_cleanly_after_closing_request() {
    let scope = Scope::new();
    let (listener, dialer) = fakenet::listener(&scope);

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.unwrap();
        let served = hyper::server::conn::http1::Builder::new()
            .serve_connection(
                TokioIo::new(conn),
                service_fn(|_req: Request<Incoming>| async {
                    Ok::<_, Infallible>(Response::new(String::from("ok")))
                }),
            )
            .await;
        (listener, served)
    });

    let conn = dialer.dial().await.unwrap();
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(conn))
        .await
        .unwrap();
    let driver = tokio::spawn(connection);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header(hyper::header::HOST, dialer.addr().as_str())
        .header(hyper::header::CONNECTION, "close")
        .body(String::new())
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&collect(response.into_body()).await[..], b"ok");

    driver.await.unwrap().unwrap();
    let (_listener, served) = server.await.unwrap();
    assert!(served.is_ok(), "{served:?}");
}
