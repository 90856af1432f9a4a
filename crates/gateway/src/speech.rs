use std::{env, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;

use crate::{
    client::check_status,
    errors::{map_reqwest_error, GatewayError},
};

pub const DEFAULT_TTS_URL: &str = "https://abena.mobobi.com/playground/api/v1/tts/synthesize/";
pub const DEFAULT_VOICE: &str = "akua";
pub const API_KEY_VAR: &str = "TTS_API_KEY";

/// Speech synthesis returning raw audio bytes
#[async_trait]
pub trait Speech: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, GatewayError>;
}

#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Debug, Clone)]
pub struct SpeechClient {
    http: Client,
    url: String,
    api_key: String,
}

impl SpeechClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn from_env() -> Result<Self, GatewayError> {
        let url = env::var("TTS_API_URL").unwrap_or(DEFAULT_TTS_URL.to_string());
        let api_key = env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GatewayError::MissingApiKey(API_KEY_VAR))?;

        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self { http, url, api_key })
    }
}

#[async_trait]
impl Speech for SpeechClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, GatewayError> {
        tracing::info!("Generating speech for text length: {}", text.len());

        let res = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&SynthesizeBody { text, voice })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let audio = check_status(res)
            .await?
            .bytes()
            .await
            .map_err(map_reqwest_error)?;

        Ok(audio.to_vec())
    }
}

/// Audio bytes as standard base64
pub fn encode_audio(audio: &[u8]) -> String {
    STANDARD.encode(audio)
}
