//! Wire-level tests for the HTTP backend client.
//!
//! Each test runs a one-shot TCP stub that captures the raw request and
//! answers with a canned response (or never answers at all).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use poetscrew_core::retry::Retryable;
use poetscrew_core::status::JobStatus;
use poetscrew_tuner::{TunerApi, TunerApiError, TunerBackend, UploadRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// A request as the stub received it.
struct Captured {
    /// Request line and headers, lower-cased.
    head: String,
    body: String,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }
}

/// What the stub does after reading the request.
enum Answer {
    Respond {
        status: &'static str,
        body: &'static str,
    },
    Hang,
}

async fn stub(answer: Answer) -> (SocketAddr, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let captured = read_request(&mut stream).await;
        let _ = tx.send(captured);

        match answer {
            Answer::Respond { status, body } => {
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream
                    .write_all(response.as_bytes())
                    .await
                    .expect("write response");
                let _ = stream.shutdown().await;
            }
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(stream);
            }
        }
    });

    (addr, rx)
}

async fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await.expect("read request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if n == 0 {
            break buf.len();
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.expect("read body");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Captured {
        head,
        body: String::from_utf8_lossy(&buf[head_end..]).into_owned(),
    }
}

fn api(addr: SocketAddr, token: Option<&str>) -> TunerApi {
    TunerApi::new(
        format!("http://{addr}/api/v1"),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .expect("build client")
}

fn upload(enhance: Option<&str>) -> UploadRequest {
    UploadRequest::new("cat.png", b"\x89PNG\r\n\x1a\nrest".to_vec(), "image/png", enhance)
}

// ---------------------------------------------------------------------------
// Timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hung_request_times_out_and_is_retryable() {
    let (addr, _rx) = stub(Answer::Hang).await;
    let api = TunerApi::new(
        format!("http://{addr}/api/v1"),
        None,
        Duration::from_millis(200),
    )
    .expect("build client");

    let started = Instant::now();
    let err = api.source_status(7).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_matches!(&err, TunerApiError::Request(e) if e.is_timeout());
    assert!(err.is_retryable());
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_request_hits_ready_endpoint_without_token() {
    let (addr, rx) = stub(Answer::Respond {
        status: "200 OK",
        body: r#"{"ready": true, "status": "success", "poem_source_id": 7}"#,
    })
    .await;

    let response = api(addr, None).source_status(7).await.unwrap();
    let request = rx.await.unwrap();

    assert_eq!(response.status, JobStatus::Success);
    assert!(request
        .request_line()
        .starts_with("get /api/v1/poem-source/7/ready "));
    assert!(!request.head.contains("authorization:"));
}

#[tokio::test]
async fn upload_carries_bearer_token_and_multipart_fields() {
    let (addr, rx) = stub(Answer::Respond {
        status: "201 Created",
        body: r#"{"id": 42, "media_path": "/media/42.png", "status": "processing"}"#,
    })
    .await;

    let created = api(addr, Some("secret-token"))
        .create_source(&upload(Some("autumn leaves")))
        .await
        .unwrap();
    let request = rx.await.unwrap();

    assert_eq!(created.id, 42);
    assert_eq!(created.status, JobStatus::Processing);

    assert!(request.request_line().starts_with("post /api/v1/poem-source "));
    assert!(request.head.contains("authorization: bearer secret-token"));
    assert!(request.head.contains("content-type: multipart/form-data"));

    assert!(request.body.contains(r#"name="file""#));
    assert!(request.body.contains(r#"filename="cat.png""#));
    let enhance_at = request
        .body
        .find(r#"name="enhance""#)
        .expect("enhance field present");
    assert!(request.body[enhance_at..].contains("autumn leaves"));
}

#[tokio::test]
async fn upload_without_hint_omits_enhance_field() {
    let (addr, rx) = stub(Answer::Respond {
        status: "201 Created",
        body: r#"{"id": 1, "media_path": "/media/1.png", "status": "processing"}"#,
    })
    .await;

    api(addr, None).create_source(&upload(None)).await.unwrap();
    let request = rx.await.unwrap();

    assert!(request.body.contains(r#"name="file""#));
    assert!(!request.body.contains(r#"name="enhance""#));
}

#[tokio::test]
async fn poems_envelope_is_unwrapped() {
    let (addr, rx) = stub(Answer::Respond {
        status: "200 OK",
        body: r#"{"data": [{"id": 3, "poem": "a", "critic_choice": true}]}"#,
    })
    .await;

    let poems = api(addr, None).poems(3).await.unwrap();
    let request = rx.await.unwrap();

    assert_eq!(poems.len(), 1);
    assert!(poems[0].critic_choice);
    assert!(request.request_line().starts_with("get /api/v1/poems/3 "));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_detail_becomes_api_error_body() {
    let (addr, _rx) = stub(Answer::Respond {
        status: "413 Payload Too Large",
        body: r#"{"detail": "File too large"}"#,
    })
    .await;

    let err = api(addr, Some("t"))
        .create_source(&upload(None))
        .await
        .unwrap_err();

    assert_matches!(
        &err,
        TunerApiError::ApiError { status: 413, body } if body == "File too large"
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_error_is_retryable() {
    let (addr, _rx) = stub(Answer::Respond {
        status: "503 Service Unavailable",
        body: r#"{"detail": "busy"}"#,
    })
    .await;

    let err = api(addr, None).source_status(1).await.unwrap_err();

    assert_matches!(&err, TunerApiError::ApiError { status: 503, .. });
    assert!(err.is_retryable());
}
