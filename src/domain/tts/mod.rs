pub mod client;
pub mod error;
pub mod model;
pub mod processor;
pub mod progress;
pub mod rate_limiter;
pub mod retry;
pub mod segmenter;
pub mod service;
pub mod sidecar;

pub use client::RateLimitedClient;
pub use error::{ProviderError, TtsServiceError};
pub use model::{
    AudioFormat, Model, Speed, SynthesisParams, SynthesisRequest, Voice, MAX_SPEED, MIN_SPEED,
};
pub use processor::{Artifact, Job, JobState, SegmentProcessor};
pub use progress::{JobEvent, NoProgress, ProgressSink, ProgressTracker};
pub use rate_limiter::{RateLimiter, RateSlot};
pub use retry::{RetryOrchestrator, RetryPolicy, SegmentFailure};
pub use segmenter::{segment_text, Segment, MAX_SEGMENT_CHARS};
pub use service::{ConversionOutcome, ConversionRequest, ServiceOptions, TtsService, TtsServiceApi};
