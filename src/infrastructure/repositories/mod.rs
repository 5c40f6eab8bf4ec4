pub mod openai_tts_repository;
pub mod tts_repository;

pub use openai_tts_repository::OpenAiTtsRepository;
pub use tts_repository::{SpeechReceipt, TtsRepository};
