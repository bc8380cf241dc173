use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response as AxumResponse},
    routing::{any, get},
    Json, Router,
};
use md5::{Digest, Md5};
use reqchain::{RequestBuilder, RequestError};
use serde_json::{json, Map, Value as JsonValue};

#[derive(Clone)]
struct MockState {
    delays: Arc<Mutex<VecDeque<Duration>>>,
    hits: Arc<AtomicUsize>,
}

async fn echo_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let headers: Map<String, JsonValue> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                JsonValue::String(value.to_str().unwrap_or_default().to_owned()),
            )
        })
        .collect();

    (
        [("x-echo", "yes")],
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "headers": headers,
            "body": body,
        })),
    )
}

async fn slow_handler(State(state): State<MockState>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let delay = {
        let mut queue = state
            .delays
            .lock()
            .expect("delay queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_default()
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    "ok"
}

async fn status_handler(State(state): State<MockState>, Path(code): Path<u16>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

const DIGEST_CHALLENGE: &str = r#"Digest realm="test", nonce="abc", qop="auth", opaque="xyz""#;

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn digest_params(value: &str) -> Map<String, JsonValue> {
    value
        .trim_start_matches("Digest ")
        .split(", ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| {
            (
                name.to_owned(),
                JsonValue::String(value.trim_matches('"').to_owned()),
            )
        })
        .collect()
}

async fn digest_handler(State(state): State<MockState>, headers: HeaderMap) -> AxumResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let challenge = || {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, DIGEST_CHALLENGE)],
        )
            .into_response()
    };
    let Some(authorization) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return challenge();
    };
    if !authorization.starts_with("Digest ") {
        return challenge();
    }

    let params = digest_params(authorization);
    let field = |name: &str| {
        params
            .get(name)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let ha1 = md5_hex(&format!("{}:test:secret", field("username")));
    let ha2 = md5_hex(&format!("GET:{}", field("uri")));
    let expected = md5_hex(&format!(
        "{ha1}:abc:{}:{}:auth:{ha2}",
        field("nc"),
        field("cnonce")
    ));

    if field("response") == expected && field("opaque") == "xyz" {
        (StatusCode::OK, "welcome").into_response()
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn builder(&self) -> RequestBuilder {
        RequestBuilder::new().base_url(format!("{}/", self.base_url))
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn spawn_server(delays: Vec<Duration>) -> TestServer {
    let state = MockState {
        delays: Arc::new(Mutex::new(delays.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/echo", any(echo_handler))
        .route("/slow", get(slow_handler))
        .route("/status/:code", any(status_handler))
        .route("/digest", get(digest_handler))
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
        task,
    }
}

#[tokio::test]
async fn get_joins_url_and_sends_merged_headers() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server
        .builder()
        .accept_json()
        .with_headers([("X-A", "1")])
        .with_headers([("X-A", "2"), ("X-B", "3")])
        .with_user_agent("reqchain-tests");

    let response = api.get("/echo?page=2").await.expect("get must succeed");
    let echo: JsonValue = response.json().expect("echo must be json");

    assert!(response.is_success());
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/echo");
    assert_eq!(echo["query"], "page=2");
    assert_eq!(echo["headers"]["x-a"], "1,2");
    assert_eq!(echo["headers"]["x-b"], "3");
    assert_eq!(echo["headers"]["accept"], "application/json");
    assert_eq!(echo["headers"]["user-agent"], "reqchain-tests");
    assert_eq!(response.header("x-echo"), Some("yes"));
    assert!(response
        .request_headers()
        .iter()
        .any(|line| line == "x-a: 1,2"));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn post_as_json_sends_json_body() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().as_json();

    let response = api
        .post("echo", &json!({"name": "kit", "tags": ["a", "b"]}))
        .await
        .expect("post must succeed");
    let echo: JsonValue = response.json().expect("echo must be json");

    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["headers"]["content-type"], "application/json");
    let sent: JsonValue =
        serde_json::from_str(echo["body"].as_str().expect("body text")).expect("json body");
    assert_eq!(sent, json!({"name": "kit", "tags": ["a", "b"]}));
}

#[tokio::test]
async fn patch_as_form_sends_urlencoded_body() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().as_form();

    let response = api
        .patch("/echo", &json!({"name": "a b", "age": 7}))
        .await
        .expect("patch must succeed");
    let echo: JsonValue = response.json().expect("echo must be json");

    assert_eq!(echo["method"], "PATCH");
    assert_eq!(
        echo["headers"]["content-type"],
        "application/x-www-form-urlencoded"
    );
    assert_eq!(echo["body"], "age=7&name=a+b");
}

#[tokio::test]
async fn post_as_form_accepts_pair_slices() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().as_form();

    let response = api
        .post("/echo", &[("name", "kit"), ("tag", "a"), ("tag", "b")])
        .await
        .expect("post must succeed");
    let echo: JsonValue = response.json().expect("echo must be json");

    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["body"], "name=kit&tag=a&tag=b");
}

#[tokio::test]
async fn put_without_format_sends_multipart_fields() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder();

    let response = api
        .put("/echo", &json!({"title": "hello"}))
        .await
        .expect("put must succeed");
    let echo: JsonValue = response.json().expect("echo must be json");

    assert_eq!(echo["method"], "PUT");
    let content_type = echo["headers"]["content-type"].as_str().unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = echo["body"].as_str().unwrap_or_default();
    assert!(body.contains(r#"name="title""#));
    assert!(body.contains("hello"));
}

#[tokio::test]
async fn delete_and_options_send_no_body() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder();

    let deleted: JsonValue = api
        .delete("/echo")
        .await
        .expect("delete must succeed")
        .json()
        .expect("echo must be json");
    assert_eq!(deleted["method"], "DELETE");
    assert_eq!(deleted["body"], "");

    let options: JsonValue = api
        .options("/echo")
        .await
        .expect("options must succeed")
        .json()
        .expect("echo must be json");
    assert_eq!(options["method"], "OPTIONS");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn head_returns_headers_without_body() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder();

    let response = api.head("/echo").await.expect("head must succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
    assert_eq!(response.header("x-echo"), Some("yes"));
}

#[tokio::test]
async fn basic_auth_and_cookies_reach_server() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server
        .builder()
        .with_basic_auth("kit", "secret")
        .with_cookies([("sid", "1"), ("theme", "dark")], "127.0.0.1");

    let echo: JsonValue = api
        .get("/echo")
        .await
        .expect("get must succeed")
        .json()
        .expect("echo must be json");

    assert_eq!(echo["headers"]["authorization"], "Basic a2l0OnNlY3JldA==");
    assert_eq!(echo["headers"]["cookie"], "sid:1; theme:dark");
}

#[tokio::test]
async fn bearer_token_is_sent_as_authorization() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().with_token("abc123");

    let echo: JsonValue = api
        .get("/echo")
        .await
        .expect("get must succeed")
        .json()
        .expect("echo must be json");

    assert_eq!(echo["headers"]["authorization"], "Bearer abc123");
}

#[tokio::test]
async fn digest_auth_answers_challenge_within_one_attempt() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().with_digest_auth("kit", "secret");

    let response = api.get("/digest").await.expect("digest must succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "welcome");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn wrong_digest_password_is_forbidden() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().with_digest_auth("kit", "wrong");

    let response = api.get("/digest").await.expect("request must complete");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn error_status_is_returned_without_retry() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().retry(3, 1);

    let response = api.get("/status/503").await.expect("status is not a failure");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.is_server_error());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn timed_out_attempt_is_retried_on_same_builder() {
    let server = spawn_server(vec![Duration::from_millis(1_500), Duration::ZERO]).await;
    let mut api = server.builder().timeout(1).retry(2, 10);

    let response = api.get("/slow").await.expect("second attempt must succeed");

    assert_eq!(response.text(), "ok");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn timeout_surfaces_transport_error_after_last_attempt() {
    let server = spawn_server(vec![Duration::from_millis(1_500)]).await;
    let mut api = server.builder().timeout(1);

    let err = api.get("/slow").await.expect_err("request must time out");

    match err {
        RequestError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn connection_refused_is_retried_then_returned() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let mut api = RequestBuilder::new()
        .base_url(format!("http://{address}"))
        .retry(2, 1);

    let err = api.get("/nothing").await.expect_err("nothing listens");

    assert!(err.is_transport());
}

#[tokio::test]
async fn reused_builder_does_not_resend_previous_payload() {
    let server = spawn_server(Vec::new()).await;
    let mut api = server.builder().as_json();

    api.post("/echo", &json!({"name": "kit"}))
        .await
        .expect("post must succeed");
    api.head("/echo").await.expect("head must succeed");
    let echo: JsonValue = api
        .delete("/echo")
        .await
        .expect("delete must succeed")
        .json()
        .expect("echo must be json");

    assert_eq!(echo["method"], "DELETE");
    assert_eq!(echo["body"], "");
    assert_eq!(server.hits(), 3);
}
