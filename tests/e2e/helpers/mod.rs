use narrate::controllers::tts::TtsController;
use narrate::domain::tts::{
    JobEvent, ProgressSink, RateLimiter, RetryPolicy, ServiceOptions, TtsService, TtsServiceApi,
};
use narrate::infrastructure::audio::FfmpegAssembler;
use narrate::infrastructure::http::build_router;
use narrate::infrastructure::repositories::OpenAiTtsRepository;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;

pub mod api_client;
pub mod mock_provider;

use api_client::TestClient;
use mock_provider::MockProvider;

pub const TEST_API_KEY: &str = "sk-test-key";

/// Segment size used by the HTTP context, small enough to exercise assembly
pub const HTTP_CHUNK_CHARS: usize = 200;

/// Build a service talking to `provider` with no pacing between calls
pub fn build_service(
    provider: &MockProvider,
    ffmpeg_command: &str,
    options: ServiceOptions,
) -> Arc<TtsService> {
    let tts_repo = Arc::new(
        OpenAiTtsRepository::new(TEST_API_KEY, &provider.base_url, Duration::from_secs(5))
            .expect("Failed to build provider client"),
    );

    Arc::new(TtsService::new(
        tts_repo,
        Arc::new(RateLimiter::with_fixed_interval(Duration::ZERO)),
        RetryPolicy::new(3, Duration::from_secs(1)),
        FfmpegAssembler::new(ffmpeg_command),
        options,
    ))
}

/// Collects job events for later inspection
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl EventLog {
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        let events = self.events.clone();
        Arc::new(move |event: JobEvent| events.lock().push(event))
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Progress { percent } => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Status { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

/// Running HTTP API backed by a mock provider and a scratch output directory
pub struct TestContext {
    pub client: TestClient,
    pub provider: MockProvider,
    pub output_dir: TempDir,
}

impl TestContext {
    pub async fn spawn(ffmpeg_command: &str) -> Self {
        let provider = MockProvider::start().await;
        let output_dir = TempDir::new().expect("Failed to create output dir");

        let tts_service: Arc<dyn TtsServiceApi> = build_service(
            &provider,
            ffmpeg_command,
            ServiceOptions {
                max_chunk_chars: HTTP_CHUNK_CHARS,
                ..Default::default()
            },
        );
        let tts_controller = Arc::new(TtsController::new(
            tts_service.clone(),
            output_dir.path().to_path_buf(),
            HTTP_CHUNK_CHARS,
        ));
        let app = build_router(tts_service, tts_controller, false);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: TestClient::new(&base_url),
            provider,
            output_dir,
        }
    }
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async { TestContext::spawn("ffmpeg").await }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async {
            // Output files go away with the TempDir
        }
    }
}

/// Whether `tool -version` runs on this machine
pub fn tool_available(tool: &str) -> bool {
    std::process::Command::new(tool)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Prose of roughly `chars` characters made of numbered sentences
pub fn sample_text(chars: usize) -> String {
    let mut text = String::new();
    let mut n = 1;
    while text.chars().count() < chars {
        text.push_str(&format!(
            "Sentence number {} tells a small part of a longer story. ",
            n
        ));
        n += 1;
    }
    text.chars().take(chars).collect()
}
