//! Server-side speech synthesis for call announcements.
//!
//! Synthesis is optional. Without an API key, or when the remote service
//! fails, [`TtsClient::synthesize`] returns `None` and the caller tells the
//! browser to fall back to its own speech engine.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::Config;

pub const DEFAULT_LANGUAGE: &str = "es-AR";
pub const DEFAULT_VOICE: &str = "es-AR-Wavenet-A";
/// Generated files older than this are removed by the cleanup job.
pub const AUDIO_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechRequest {
    pub text:          String,
    pub language_code: Option<String>,
    pub voice_name:    Option<String>,
    pub speaking_rate: Option<f64>,
    pub pitch:         Option<f64>,
}

impl SpeechRequest {
    fn language(&self) -> &str {
        self.language_code.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    fn voice(&self) -> &str {
        self.voice_name.as_deref().filter(|v| !v.is_empty()).unwrap_or(DEFAULT_VOICE)
    }

    fn rate(&self) -> f64 {
        self.speaking_rate.unwrap_or(0.9)
    }

    fn pitch(&self) -> f64 {
        self.pitch.unwrap_or(0.0)
    }

    /// Same text and voice parameters always map to the same file.
    fn filename(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update(format!("|{}|{}|{}|{}", self.language(), self.voice(), self.rate(), self.pitch()));
        let digest = format!("{:x}", hasher.finalize());
        format!("tts_{}.mp3", &digest[..16])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedAudio {
    pub url:      String,
    pub filename: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[derive(Clone)]
pub struct TtsClient {
    http:      reqwest::Client,
    api_key:   Option<String>,
    endpoint:  String,
    audio_dir: PathBuf,
}

impl TtsClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("turnera-backend/0.1")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            http,
            api_key: config.tts_api_key.clone(),
            endpoint: config.tts_endpoint.clone(),
            audio_dir: PathBuf::from(&config.audio_dir),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Generate (or reuse) an MP3 for `req`. `None` means "fall back".
    pub async fn synthesize(&self, req: &SpeechRequest) -> Option<GeneratedAudio> {
        let api_key = self.api_key.as_deref()?;

        let filename = req.filename();
        let path = self.audio_dir.join(&filename);
        let audio = GeneratedAudio {
            url: format!("/audio/{filename}"),
            filename,
        };

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(file = %audio.filename, "TTS cache hit");
            return Some(audio);
        }

        match self.fetch(api_key, req).await {
            Ok(bytes) => match self.store(&path, &bytes).await {
                Ok(()) => {
                    tracing::info!(file = %audio.filename, bytes = bytes.len(), "TTS audio generated");
                    Some(audio)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to store TTS audio");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "TTS request failed; client fallback");
                None
            }
        }
    }

    async fn fetch(&self, api_key: &str, req: &SpeechRequest) -> anyhow::Result<Vec<u8>> {
        let body = json!({
            "input": { "text": req.text },
            "voice": {
                "languageCode": req.language(),
                "name": req.voice(),
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": req.rate(),
                "pitch": req.pitch(),
            }
        });

        let url = format!("{}?key={}", self.endpoint, urlencoding::encode(api_key));
        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("TTS service responded with status {status}");
        }

        let payload: SynthesizeResponse = resp.json().await?;
        Ok(STANDARD.decode(payload.audio_content.as_bytes())?)
    }

    async fn store(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// Remove files in `dir` last modified at least `max_age` ago.
/// Returns how many were removed. A missing directory is not an error.
pub async fn cleanup_old_audio(dir: &Path, max_age: Duration) -> anyhow::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age >= max_age {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Hourly sweep of the generated audio directory.
pub fn spawn_audio_cleanup(audio_dir: PathBuf) {
    tracing::info!(dir = %audio_dir.display(), "Audio cleanup job started");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUDIO_MAX_AGE);
        loop {
            ticker.tick().await;
            match cleanup_old_audio(&audio_dir, AUDIO_MAX_AGE).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Old audio files removed"),
                Err(err) => tracing::error!(error = %err, "Audio cleanup failed"),
            }
        }
    });
}
