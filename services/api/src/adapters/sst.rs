//! services/api/src/adapters/sst.rs
//!
//! This module contains the adapter for OpenAI's Speech-to-Text (Whisper) service.
//! It implements the `SpeechToTextService` port from the `core` crate.
//!
//! Clients may upload either a complete WAV file or raw 16-bit mono PCM; the latter is
//! wrapped in a WAV container before upload.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{AudioInput, CreateTranscriptionRequest},
    Client,
};
use async_trait::async_trait;
use companion_core::ports::{PortError, PortResult, SpeechToTextService};
use hound::{WavSpec, WavWriter};

/// Sample rate assumed for headerless PCM uploads.
pub const DEFAULT_PCM_SAMPLE_RATE: u32 = 48_000;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechToTextService` port using the OpenAI Whisper API.
#[derive(Clone)]
pub struct OpenAiSstAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    pcm_sample_rate: u32,
}

impl OpenAiSstAdapter {
    /// Creates a new `OpenAiSstAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self {
            client,
            model,
            pcm_sample_rate: DEFAULT_PCM_SAMPLE_RATE,
        }
    }

    fn is_wav(audio_data: &[u8]) -> bool {
        audio_data.len() >= 12 && &audio_data[0..4] == b"RIFF" && &audio_data[8..12] == b"WAVE"
    }

    fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = std::io::Cursor::new(Vec::new());

        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm_data.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(cursor.into_inner())
    }

    fn to_wav(&self, audio_data: &[u8]) -> PortResult<Vec<u8>> {
        if Self::is_wav(audio_data) {
            return Ok(audio_data.to_vec());
        }
        Self::pcm16_to_wav(audio_data, self.pcm_sample_rate)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))
    }
}

//=========================================================================================
// `SpeechToTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechToTextService for OpenAiSstAdapter {
    /// Transcribes a slice of audio data into text using the configured Whisper model.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String> {
        if audio_data.len() < 2 {
            return Err(PortError::Unexpected("Audio payload is empty.".to_string()));
        }
        let wav_data = self.to_wav(audio_data)?;

        let input = AudioInput::from_vec_u8("user_audio.wav".into(), wav_data);
        let request = CreateTranscriptionRequest {
            file: input,
            model: self.model.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .transcription()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        Ok(response.text)
    }
}
