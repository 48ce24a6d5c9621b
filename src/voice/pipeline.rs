//! # Playback Preparation Pipeline
//!
//! Runs the strictly sequential Fetch → Transcode stages that turn a play
//! source into a transport-ready raw PCM artifact. One invocation serves
//! one chat; invocations for different chats share nothing but the adapter
//! objects and run fully concurrently.
//!
//! ## Filesystem discipline:
//! - every chat gets a private working area under the shared download
//!   directory, wiped before each fetch so a crashed or cancelled prior run
//!   can never be mistaken for fresh output
//! - the artifact lives at a fixed per-chat path (`<artifact_dir>/<id>.raw`);
//!   any previous artifact is removed before transcoding starts
//! - the fetched input file is deleted after a successful transcode,
//!   whether it was downloaded or an attachment copy
//! - cancellation and failure both clean up partial files before returning
//!
//! Cancellation is cooperative: the session cancels the token, the stage
//! future is dropped (child processes die via kill-on-drop), and the
//! select arms below remove whatever the aborted stage left behind.

use crate::engines::fetch::{chat_workdir, AudioSource, MediaFetch};
use crate::engines::transcode::{AudioTranscode, TARGET_FORMAT};
use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PlaybackPipeline {
    fetcher: Arc<dyn MediaFetch>,
    transcoder: Arc<dyn AudioTranscode>,
    download_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl PlaybackPipeline {
    pub fn new(
        fetcher: Arc<dyn MediaFetch>,
        transcoder: Arc<dyn AudioTranscode>,
        download_dir: PathBuf,
        artifact_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            download_dir,
            artifact_dir,
        }
    }

    /// Fixed artifact path for a chat; unique per chat id.
    pub fn artifact_path(&self, chat_id: ChatId) -> PathBuf {
        self.artifact_dir.join(format!("{chat_id}.raw"))
    }

    /// The chat's private download working area.
    pub fn workdir(&self, chat_id: ChatId) -> PathBuf {
        chat_workdir(&self.download_dir, chat_id)
    }

    /// Produce the raw PCM artifact for `source`.
    ///
    /// On success the artifact is fully written at the chat's fixed path
    /// and the input file is gone. On failure or cancellation no partial
    /// artifact remains and the error names the stage that died.
    pub async fn prepare(
        &self,
        chat_id: ChatId,
        source: AudioSource,
        cancel: CancellationToken,
    ) -> VoiceResult<PathBuf> {
        let workdir = self.workdir(chat_id);

        // Stage 1: fetch, skipped when the source is already a local file.
        let input = match &source {
            AudioSource::Local(path) => path.clone(),
            remote => {
                self.reset_workdir(&workdir).await?;
                debug!(chat_id, source = %source.describe(), "fetch stage starting");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        remove_dir_contents(&workdir).await;
                        return Err(VoiceError::Canceled("pipeline canceled during fetch".to_string()));
                    }
                    result = self.fetcher.fetch(remote, &workdir) => match result {
                        Ok(path) => path,
                        Err(e) => {
                            remove_dir_contents(&workdir).await;
                            return Err(e);
                        }
                    }
                }
            }
        };

        // Stage 2: transcode into the chat's fixed artifact path.
        let artifact = self.artifact_path(chat_id);
        remove_file_if_exists(&artifact).await;
        debug!(chat_id, input = %input.display(), "transcode stage starting");

        let transcoded = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                remove_file_if_exists(&artifact).await;
                remove_dir_contents(&workdir).await;
                return Err(VoiceError::Canceled("pipeline canceled during transcode".to_string()));
            }
            result = self.transcoder.transcode(&input, &artifact, TARGET_FORMAT) => result
        };

        match transcoded {
            Ok(path) => {
                remove_file_if_exists(&input).await;
                info!(chat_id, artifact = %path.display(), "audio prepared");
                Ok(path)
            }
            Err(e) => {
                remove_file_if_exists(&artifact).await;
                Err(e)
            }
        }
    }

    /// Remove everything the pipeline may have written for a chat: the
    /// working area and the artifact. Used when a session leaves.
    pub async fn discard_artifacts(&self, chat_id: ChatId) {
        let workdir = self.workdir(chat_id);
        if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(chat_id, error = %e, "failed to remove download workdir");
            }
        }
        remove_file_if_exists(&self.artifact_path(chat_id)).await;
    }

    /// Ensure the chat's working area exists and is empty.
    async fn reset_workdir(&self, workdir: &Path) -> VoiceResult<()> {
        tokio::fs::create_dir_all(workdir).await?;
        remove_dir_contents(workdir).await;
        Ok(())
    }
}

/// Best-effort removal of every entry inside `dir`.
async fn remove_dir_contents(dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let result = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to remove stale file");
        }
    }
}

/// Best-effort file removal; missing files are fine.
pub(crate) async fn remove_file_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}
