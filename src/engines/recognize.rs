//! # Track Recognition Adapter
//!
//! One-shot acoustic fingerprint lookup: hand the engine a buffer of audio
//! bytes, get back a track match or nothing. There are no retries and no
//! fallback beyond the HTTP client's own timeout; every failure mode —
//! unconfigured endpoint, network error, no match — surfaces to the caller
//! as an absent result, never as an error the chat loop has to handle.

use crate::config::RecognitionConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A recognized track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackMatch {
    pub title: String,
    pub artist: String,

    /// Cover art URL, when the engine provides one
    pub cover_url: Option<String>,

    /// Engine-provided share caption, e.g. "Title - Artist"
    pub share_text: Option<String>,
}

/// Capability interface to the acoustic fingerprint engine.
#[async_trait]
pub trait TrackRecognizer: Send + Sync {
    /// Attempt a single recognition over `sample`. `None` means no match
    /// or an engine failure; the distinction is logged, not returned.
    async fn recognize(&self, sample: &[u8]) -> Option<TrackMatch>;
}

/// HTTP-backed recognizer posting the sample to a fingerprint API.
///
/// Expects a JSON response with a `track` object carrying `title`,
/// `subtitle`, `images.background`, and `share.subject` fields; anything
/// missing degrades gracefully.
pub struct HttpRecognizer {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl HttpRecognizer {
    pub fn from_config(config: &RecognitionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.api_url.is_none() {
            warn!("no recognition api configured; .shazam will always report no match");
        }

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn lookup(&self, url: &str, sample: &[u8]) -> VoiceResult<Option<TrackMatch>> {
        let part = reqwest::multipart::Part::bytes(sample.to_vec()).file_name("sample");
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self.client.post(url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VoiceError::Recognition(format!(
                "recognition api returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;

        let Some(track) = body.get("track") else {
            return Ok(None);
        };

        let title = track
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let artist = track
            .get("subtitle")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let cover_url = track
            .pointer("/images/background")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let share_text = track
            .pointer("/share/subject")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Some(TrackMatch {
            title,
            artist,
            cover_url,
            share_text,
        }))
    }
}

#[async_trait]
impl TrackRecognizer for HttpRecognizer {
    async fn recognize(&self, sample: &[u8]) -> Option<TrackMatch> {
        let Some(url) = self.api_url.clone() else {
            debug!("recognition skipped: no api configured");
            return None;
        };

        match self.lookup(&url, sample).await {
            Ok(Some(track)) => {
                info!(title = %track.title, artist = %track.artist, "track recognized");
                Some(track)
            }
            Ok(None) => {
                debug!(sample_bytes = sample.len(), "no match for sample");
                None
            }
            Err(e) => {
                warn!(error = %e, "recognition attempt failed");
                None
            }
        }
    }
}
