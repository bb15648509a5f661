// src/providers/whisper.rs
//! OpenAI Whisper transcription (multipart upload).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::http::classify_status;
use super::{build_client, Transcriber, PROVIDER_WHISPER, USER_AGENT};
use crate::error::FetchError;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
/// Upload limit of the transcription API.
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

pub struct WhisperClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl WhisperClient {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(USER_AGENT, timeout)?,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "whisper-1".to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, FetchError> {
        if audio.len() > MAX_AUDIO_BYTES {
            return Err(FetchError::no_match(format!(
                "audio {} bytes exceeds {} byte limit",
                audio.len(),
                MAX_AUDIO_BYTES
            )));
        }
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")
            .map_err(|e| FetchError::unavailable(PROVIDER_WHISPER, e))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "text")
            .text("language", "en");

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_WHISPER, &e))?;
        classify_status(PROVIDER_WHISPER, resp.status(), resp.headers())?;

        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_WHISPER, &e))?;
        Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_audio_is_rejected_before_upload() {
        let c = WhisperClient::new("k".into(), Duration::from_secs(1)).unwrap();
        let r = c.transcribe(vec![0u8; MAX_AUDIO_BYTES + 1], "a.mp3").await;
        assert!(matches!(r, Err(FetchError::NoMatchFound(_))));
    }
}
