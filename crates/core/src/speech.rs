//! Speech trait: speech-to-text and text-to-speech for the voice front-end.
//!
//! Audio is treated as opaque bytes: the browser records it, the provider
//! transcribes it, and synthesized speech is streamed back untouched.

use async_trait::async_trait;
use crate::error::SpeechError;

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Transcribe a recorded clip. `file_name` carries the container hint
    /// (e.g. `audio.webm`) expected by most transcription endpoints.
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, SpeechError>;

    /// Synthesize `text` into MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}
