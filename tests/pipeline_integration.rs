use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    Router,
};
use restgate::{
    ClientConfig, FileAttachment, Method, Request, RestClient, RestError, RetryReason,
};
use serde_json::json;
use tokio::time::Instant;

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl MockResponse {
    fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    fn rate_limited(retry_after: f64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "message": "You are being rate limited.",
                "retry_after": retry_after,
                "global": false
            })
            .to_string(),
        )
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct Recorded {
    content_type: Option<String>,
    body: Bytes,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    fallback: MockResponse,
    hits: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

async fn scripted_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .recorded
        .lock()
        .expect("recorded mutex must not be poisoned")
        .push(Recorded {
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| state.fallback.clone())
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, response.body)
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().expect("recorded mutex").clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>, fallback: MockResponse) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        fallback,
        hits: Arc::new(AtomicUsize::new(0)),
        recorded: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .fallback(scripted_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        recorded: state.recorded,
        task,
    }
}

fn client(server: &TestServer, margin: Duration) -> RestClient {
    let config = ClientConfig::new(server.base_url.clone(), "token").with_safety_margin(margin);
    RestClient::new(config).expect("client must build")
}

fn unexpected() -> MockResponse {
    MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "no mock response available")
}

#[tokio::test]
async fn rate_limited_request_waits_then_succeeds() {
    let server = spawn_server(
        vec![MockResponse::rate_limited(0.2), MockResponse::ok(r#"{"id":"1"}"#)],
        unexpected(),
    )
    .await;
    let client = client(&server, Duration::from_millis(100));

    let start = Instant::now();
    let raw = client
        .send(Request::get("/users/@me"))
        .await
        .expect("request must succeed after rate limit");

    assert_eq!(&raw[..], br#"{"id":"1"}"#);
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(server.hits(), 2);
    assert!(!client.rate_gate().is_engaged());
}

#[tokio::test]
async fn repeated_rate_limits_exhaust_budget() {
    let server = spawn_server(vec![], MockResponse::rate_limited(0.0)).await;
    let client = client(&server, Duration::from_millis(20));

    let err = client
        .send(Request::get("/gateway"))
        .await
        .expect_err("request must give up");

    match err {
        RestError::ExhaustedRetries { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, RetryReason::RateLimited { .. }));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn server_error_is_returned_without_retry() {
    let server = spawn_server(
        vec![MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom")],
        MockResponse::ok("{}"),
    )
    .await;
    let client = client(&server, Duration::from_millis(20));

    let err = client
        .send(Request::get("/guilds/1"))
        .await
        .expect_err("500 is terminal");

    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("boom"));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn requests_started_during_cooldown_wait_for_gate() {
    let server = spawn_server(
        vec![MockResponse::rate_limited(0.3)],
        MockResponse::ok("{}"),
    )
    .await;
    let client = client(&server, Duration::from_millis(100));
    let start = Instant::now();

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.send(Request::get("/a")).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.rate_gate().is_engaged());

    let second = client.send(Request::get("/b")).await.expect("second must succeed");
    let second_done = start.elapsed();

    first.await.unwrap().expect("first must succeed");

    assert_eq!(&second[..], b"{}");
    assert!(second_done >= Duration::from_millis(400));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn concurrent_requests_survive_mid_flight_rate_limit() {
    let server = spawn_server(
        vec![MockResponse::rate_limited(0.1).with_delay(Duration::from_millis(50))],
        MockResponse::ok("{}").with_delay(Duration::from_millis(50)),
    )
    .await;
    let client = client(&server, Duration::from_millis(100));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let payload = json!({"content": format!("message {i}")});
                client
                    .send(Request::post("/channels/1/messages").with_payload(&payload))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(tasks))
        .await
        .expect("concurrent requests must not deadlock");

    for result in results {
        let raw = result.expect("task must not panic").expect("request must succeed");
        assert_eq!(&raw[..], b"{}");
    }
    assert_eq!(server.hits(), 11);
}

#[tokio::test]
async fn multipart_body_is_resent_verbatim_after_rate_limit() {
    let server = spawn_server(
        vec![MockResponse::rate_limited(0.05), MockResponse::ok(r#"{"id":"9"}"#)],
        unexpected(),
    )
    .await;
    let client = client(&server, Duration::from_millis(20));

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut tmp, b"\x89PNG fake image bytes").unwrap();
    let mut file = tokio::fs::File::open(tmp.path()).await.unwrap();

    let payload = json!({"content": "picture", "embeds": null});
    let request = Request::post("/channels/1/messages")
        .with_payload(&payload)
        .with_file(FileAttachment::from_file("cat.png", &mut file))
        .with_file(FileAttachment::from_bytes("notes.txt", "second file"));

    let raw = client.send(request).await.expect("upload must succeed");
    assert_eq!(&raw[..], br#"{"id":"9"}"#);

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].body, recorded[1].body);
    assert_eq!(recorded[0].content_type, recorded[1].content_type);

    let content_type = recorded[0].content_type.clone().unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .expect("multipart content type");
    let body = String::from_utf8_lossy(&recorded[0].body);

    assert_eq!(body.matches(&format!("--{boundary}\r\n")).count(), 3);
    assert!(body.contains(r#"{"content":"picture","embeds":[]}"#));
    assert!(body.contains("PNG fake image bytes"));
    assert!(body.find("cat.png").unwrap() < body.find("notes.txt").unwrap());
}

#[tokio::test]
async fn cancellation_unblocks_gate_wait() {
    let server = spawn_server(vec![], MockResponse::ok("{}")).await;
    let client = client(&server, Duration::from_millis(0));
    client.rate_gate().mark_unavailable(Duration::from_secs(60));

    let start = Instant::now();
    let err = client
        .send_with_cancel(
            Request::get("/gateway"),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .expect_err("must be cancelled");

    assert!(matches!(err, RestError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn timeout_covers_whole_call() {
    let server = spawn_server(
        vec![],
        MockResponse::ok("{}").with_delay(Duration::from_secs(2)),
    )
    .await;
    let client = client(&server, Duration::from_millis(0));

    let err = client
        .send_with_timeout(Request::get("/slow"), Duration::from_millis(200))
        .await
        .expect_err("must time out");

    assert!(matches!(err, RestError::TimedOut(_)));
}

#[tokio::test]
async fn execute_without_payload_sends_empty_body() {
    let server = spawn_server(vec![], MockResponse::new(StatusCode::NO_CONTENT, "")).await;
    let client = client(&server, Duration::from_millis(0));

    let raw = client
        .execute::<serde_json::Value>(Method::DELETE, "/channels/1/messages/2", None, vec![])
        .await
        .expect("delete must succeed");

    assert!(raw.is_empty());
    let recorded = server.recorded();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].body.is_empty());
    assert!(recorded[0].content_type.is_none());
}
