// End-to-end integration tests for the narrate pipeline and HTTP API
//
// Every test talks to an in-process mock of the OpenAI speech endpoint bound
// to 127.0.0.1:0, so no network access or API key is needed. Jobs that need
// real audio processing are skipped when ffmpeg/ffprobe are not installed.
//
// Architecture:
// - MockProvider answers with the request text as "audio" unless a rule matches
// - Pipeline tests drive TtsService directly and inspect progress events
// - API tests run the axum router on an ephemeral port via test-context

mod helpers;
mod test_assembly;
mod test_health;
