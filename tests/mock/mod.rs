#![allow(dead_code)]

use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use futures_util::stream;
use tokio::net::TcpListener;
use userbench_rs::{LoadTestConfig, ThinkTime};

pub const CHAT_PATH: &str = "/v1/chat/completions";

/// Serves `router` on an ephemeral port and returns the chat endpoint URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}{}", addr, CHAT_PATH)
}

/// One chunk: a single `data:` line with no blank separator after it.
fn data_line(index: usize) -> Bytes {
    Bytes::from(format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":\"tok{}\"}}}}]}}\n",
        index
    ))
}

fn chunked_body(chunks: usize, first_delay: Duration, gap: Duration) -> Body {
    let lines = stream::unfold(0usize, move |index| async move {
        if index >= chunks {
            return None;
        }
        let wait = if index == 0 { first_delay } else { gap };
        tokio::time::sleep(wait).await;
        Some((Ok::<_, Infallible>(data_line(index)), index + 1))
    });
    Body::from_stream(lines)
}

/// A 200 endpoint streaming `chunks` lines: the first after `first_delay`,
/// each later one `gap` after the previous.
pub fn streaming_endpoint(chunks: usize, first_delay: Duration, gap: Duration) -> Router {
    Router::new().route(
        CHAT_PATH,
        post(move || async move {
            (
                [(CONTENT_TYPE, "text/event-stream")],
                chunked_body(chunks, first_delay, gap),
            )
        }),
    )
}

/// Answers the first `failures` requests with 500, then streams `chunks`
/// lines 10 ms apart.
pub fn flaky_endpoint(failures: usize, chunks: usize) -> Router {
    let calls = Arc::new(AtomicUsize::new(0));
    Router::new().route(
        CHAT_PATH,
        post(move || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
                (
                    [(CONTENT_TYPE, "text/event-stream")],
                    chunked_body(chunks, Duration::ZERO, Duration::from_millis(10)),
                )
                    .into_response()
            }
        }),
    )
}

/// A 200 endpoint that sends one event and then breaks the stream.
pub fn broken_stream_endpoint() -> Router {
    Router::new().route(
        CHAT_PATH,
        post(|| async {
            let events = stream::unfold(0usize, |index| async move {
                match index {
                    0 => Some((Ok(data_line(0)), 1)),
                    1 => {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Some((
                            Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream died")),
                            2,
                        ))
                    }
                    _ => None,
                }
            });
            (
                [(CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(events),
            )
        }),
    )
}

/// A 200 endpoint whose body is empty.
pub fn empty_stream_endpoint() -> Router {
    Router::new().route(CHAT_PATH, post(|| async { "" }))
}

pub fn config(endpoint: &str, users: usize, duration: Duration, think: (f64, f64)) -> LoadTestConfig {
    LoadTestConfig::try_new(
        endpoint,
        "model",
        users,
        duration,
        ThinkTime::from_secs_f64(think.0, think.1).unwrap(),
    )
    .unwrap()
    .with_request_timeout(Duration::from_secs(30))
}
