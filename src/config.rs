//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The media section controls where downloaded sources and transcoded raw
//! artifacts live on disk; both directories are created at startup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub tools: ToolsConfig,
    pub recognition: RecognitionConfig,
    pub limits: LimitsConfig,
}

/// Control-surface server settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `auth_secret`: bearer token required on `/api` routes; when unset, a
///   fresh token is generated at startup and printed to the console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auth_secret: Option<String>,
}

/// On-disk layout for media handling.
///
/// ## Fields:
/// - `download_dir`: shared download working area; each chat gets its own
///   subdirectory underneath (cleared before every fetch)
/// - `artifact_dir`: where the per-chat raw PCM artifacts (`<chat_id>.raw`)
///   are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub download_dir: String,
    pub artifact_dir: String,
}

/// External command-line engines the adapters shell out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
}

/// Acoustic track recognition settings.
///
/// Recognition is optional: with no `api_url` configured every `.shazam`
/// request reports "not recognized" without attempting a lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Operational limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of chats with a live voice session at once
    pub max_voice_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                auth_secret: None,
            },
            media: MediaConfig {
                download_dir: "data/downloads".to_string(),
                artifact_dir: "data/audio".to_string(),
            },
            tools: ToolsConfig {
                ytdlp_bin: "yt-dlp".to_string(),
                ffmpeg_bin: "ffmpeg".to_string(),
            },
            recognition: RecognitionConfig {
                api_url: None,
                api_key: None,
                timeout_secs: 15,
            },
            limits: LimitsConfig {
                max_voice_sessions: 16,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// `HOST`, `PORT`, and `AUTH_SECRET` are honored without the `APP_`
    /// prefix because deployment platforms commonly set them directly.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(secret) = env::var("AUTH_SECRET") {
            settings = settings.set_override("server.auth_secret", secret)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.limits.max_voice_sessions == 0 {
            return Err(anyhow::anyhow!("Max voice sessions must be greater than 0"));
        }

        if self.media.download_dir.is_empty() || self.media.artifact_dir.is_empty() {
            return Err(anyhow::anyhow!("Media directories cannot be empty"));
        }

        if self.recognition.timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "Recognition timeout must be greater than 0"
            ));
        }

        Ok(())
    }

    /// Create the media directories if they do not exist yet.
    pub fn ensure_media_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.download_dir())?;
        std::fs::create_dir_all(self.artifact_dir())?;
        Ok(())
    }

    pub fn download_dir(&self) -> PathBuf {
        Path::new(&self.media.download_dir).to_path_buf()
    }

    pub fn artifact_dir(&self) -> PathBuf {
        Path::new(&self.media.artifact_dir).to_path_buf()
    }
}
