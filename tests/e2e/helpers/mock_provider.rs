use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Canned answer for matching speech requests
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with an empty body
    Empty,
    /// 200 with these bytes as the audio
    Audio(Vec<u8>),
    /// Error status with an OpenAI-style error body
    Error {
        status: u16,
        message: String,
        retry_after: Option<String>,
    },
}

impl Reply {
    pub fn error(status: u16, message: &str) -> Self {
        Reply::Error {
            status,
            message: message.to_string(),
            retry_after: None,
        }
    }

    /// Error carrying `retry-after: 0` so retries happen immediately
    pub fn retry_now(status: u16, message: &str) -> Self {
        Reply::Error {
            status,
            message: message.to_string(),
            retry_after: Some("0".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    marker: String,
    reply: Reply,
    remaining: Option<usize>,
}

/// What the mock saw for each call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub body: Value,
    pub authorization: Option<String>,
}

impl RecordedRequest {
    pub fn input(&self) -> &str {
        self.body["input"].as_str().unwrap_or_default()
    }
}

#[derive(Default)]
struct MockState {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<RecordedRequest>>,
    counter: AtomicUsize,
}

/// OpenAI-compatible `/v1/audio/speech` endpoint.
///
/// Unless a rule matches, it answers 200 with the request's `input` bytes as
/// the "audio", so pcm outputs can be compared with the original text.
pub struct MockProvider {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockProvider {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/v1/audio/speech", post(speech))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock provider");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/v1", addr),
            state,
        }
    }

    /// Answer with `reply` whenever the input contains `marker`
    pub fn on_input(&self, marker: &str, reply: Reply) {
        self.push_rule(marker, reply, None);
    }

    /// Like [`on_input`](Self::on_input) but only for the first `times` matches
    pub fn on_input_times(&self, marker: &str, reply: Reply, times: usize) {
        self.push_rule(marker, reply, Some(times));
    }

    fn push_rule(&self, marker: &str, reply: Reply, remaining: Option<usize>) {
        self.state.rules.lock().push(Rule {
            marker: marker.to_string(),
            reply,
            remaining,
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.requests().iter().map(|r| r.input().to_string()).collect()
    }
}

async fn speech(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let n = state.counter.fetch_add(1, Ordering::SeqCst) + 1;
    let input = body["input"].as_str().unwrap_or_default().to_string();
    let model = body["model"].as_str().unwrap_or("tts-1").to_string();

    state.requests.lock().push(RecordedRequest {
        body,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let reply = {
        let mut rules = state.rules.lock();
        rules
            .iter_mut()
            .find(|rule| input.contains(&rule.marker) && rule.remaining != Some(0))
            .map(|rule| {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                rule.reply.clone()
            })
    };

    let mut response = match reply {
        None => (StatusCode::OK, input.into_bytes()).into_response(),
        Some(Reply::Empty) => (StatusCode::OK, Vec::<u8>::new()).into_response(),
        Some(Reply::Audio(bytes)) => (StatusCode::OK, bytes).into_response(),
        Some(Reply::Error {
            status,
            message,
            retry_after,
        }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (
                status,
                Json(serde_json::json!({
                    "error": {"message": message, "type": "mock_error"}
                })),
            )
                .into_response();
            if let Some(value) = retry_after {
                response
                    .headers_mut()
                    .insert("retry-after", HeaderValue::from_str(&value).unwrap());
            }
            response
        }
    };

    let headers = response.headers_mut();
    headers.insert("x-request-id", HeaderValue::from_str(&format!("req_{}", n)).unwrap());
    headers.insert("openai-model", HeaderValue::from_str(&model).unwrap());
    response
}
