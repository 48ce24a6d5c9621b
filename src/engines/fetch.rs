//! # Media Fetch Adapter
//!
//! Turns a playback source — remote URL, chat attachment, or an
//! already-local file — into a local audio file the transcoder can read.
//!
//! The production implementation shells out to `yt-dlp`, which handles the
//! long tail of streaming sites and plain file URLs alike. The child process
//! is spawned with kill-on-drop, so cancelling a pipeline (dropping the
//! fetch future) also tears the download down; the pipeline then wipes the
//! chat's working area.

use crate::engines::account::{AccountClient, AttachmentRef};
use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the audio for a `play` request comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Remote URL, resolved by the fetch engine
    Remote(String),

    /// Attachment on a replied-to chat message
    Attachment(AttachmentRef),

    /// File already present on local disk; the fetch stage is skipped
    Local(PathBuf),
}

impl AudioSource {
    pub fn is_local(&self) -> bool {
        matches!(self, AudioSource::Local(_))
    }

    /// Short description for logs and replies.
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Remote(url) => url.clone(),
            AudioSource::Attachment(att) => att
                .file_name
                .clone()
                .unwrap_or_else(|| format!("attachment {}", att.id)),
            AudioSource::Local(path) => path.display().to_string(),
        }
    }
}

/// Capability interface to the media retrieval engine.
#[async_trait]
pub trait MediaFetch: Send + Sync {
    /// Retrieve `source` into `dest_dir` and return the local file path.
    ///
    /// `dest_dir` is the chat's private working area; the caller clears it
    /// before every run. Dropping the returned future must abort the
    /// retrieval and release its external resources.
    async fn fetch(&self, source: &AudioSource, dest_dir: &Path) -> VoiceResult<PathBuf>;
}

/// Fixed stem for downloaded files inside a chat's working area.
const DOWNLOAD_STEM: &str = "ytdl_out";

/// `yt-dlp`-backed fetch engine. Attachments are resolved through the
/// account engine instead.
pub struct YtdlFetch {
    bin: String,
    account: Arc<dyn AccountClient>,
}

impl YtdlFetch {
    pub fn new(bin: String, account: Arc<dyn AccountClient>) -> Self {
        Self { bin, account }
    }

    async fn fetch_remote(&self, url: &str, dest_dir: &Path) -> VoiceResult<PathBuf> {
        let out_template = dest_dir.join(format!("{DOWNLOAD_STEM}.%(ext)s"));

        debug!(url, bin = %self.bin, "starting download");

        let output = tokio::process::Command::new(&self.bin)
            .arg("--format")
            .arg("bestaudio")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg("320K")
            .arg("--geo-bypass")
            .arg("--no-check-certificates")
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--output")
            .arg(&out_template)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VoiceError::Fetch(format!("failed to spawn {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("unknown error");
            return Err(VoiceError::Fetch(format!(
                "download failed for {url}: {detail}"
            )));
        }

        let audio_file = dest_dir.join(format!("{DOWNLOAD_STEM}.mp3"));
        if !audio_file.is_file() {
            return Err(VoiceError::Fetch(format!(
                "download produced no audio file for {url}"
            )));
        }

        info!(url, path = %audio_file.display(), "download complete");
        Ok(audio_file)
    }
}

#[async_trait]
impl MediaFetch for YtdlFetch {
    async fn fetch(&self, source: &AudioSource, dest_dir: &Path) -> VoiceResult<PathBuf> {
        match source {
            AudioSource::Remote(url) => self.fetch_remote(url, dest_dir).await,
            AudioSource::Attachment(att) => {
                debug!(attachment = %att.id, "downloading attachment");
                self.account.download_attachment(att, dest_dir).await
            }
            AudioSource::Local(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(VoiceError::Fetch(format!(
                        "local source does not exist: {}",
                        path.display()
                    )))
                }
            }
        }
    }
}

/// Per-chat subdirectory inside the shared download working area.
pub fn chat_workdir(download_dir: &Path, chat_id: ChatId) -> PathBuf {
    download_dir.join(chat_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockAccount;

    #[test]
    fn test_source_descriptions() {
        let remote = AudioSource::Remote("https://x/y".to_string());
        assert_eq!(remote.describe(), "https://x/y");
        assert!(!remote.is_local());

        let local = AudioSource::Local(PathBuf::from("/tmp/a.mp3"));
        assert!(local.is_local());
    }

    #[test]
    fn test_chat_workdir_is_per_chat() {
        let base = Path::new("data/downloads");
        assert_eq!(chat_workdir(base, 100), base.join("100"));
        assert_ne!(chat_workdir(base, 100), chat_workdir(base, 200));
    }

    #[tokio::test]
    async fn test_local_source_must_exist() {
        let account = Arc::new(MockAccount::new());
        let fetcher = YtdlFetch::new("yt-dlp".to_string(), account);
        let dir = tempfile::tempdir().unwrap();

        let missing = AudioSource::Local(dir.path().join("nope.mp3"));
        let err = fetcher.fetch(&missing, dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), "fetch");

        let present = dir.path().join("track.mp3");
        std::fs::write(&present, b"mp3").unwrap();
        let got = fetcher
            .fetch(&AudioSource::Local(present.clone()), dir.path())
            .await
            .unwrap();
        assert_eq!(got, present);
    }
}
