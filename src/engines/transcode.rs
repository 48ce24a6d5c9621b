//! # Transcode Adapter
//!
//! Converts a fetched audio file into the raw PCM stream the voice
//! transport consumes. The target format is fixed for the whole system:
//! 48 kHz, 2-channel, 16-bit signed little-endian PCM — what group
//! voice-call engines expect as file input.
//!
//! The production implementation shells out to `ffmpeg` with kill-on-drop,
//! so a cancelled pipeline also kills the conversion; the caller removes
//! the partial output afterwards.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// Raw PCM output format for a transcode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// ffmpeg codec name
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u8,
}

/// The one format every artifact in this system uses.
pub const TARGET_FORMAT: PcmFormat = PcmFormat {
    codec: "pcm_s16le",
    sample_rate: 48_000,
    channels: 2,
};

/// Capability interface to the audio conversion engine.
#[async_trait]
pub trait AudioTranscode: Send + Sync {
    /// Convert `input` into raw PCM at `output`.
    ///
    /// Any pre-existing file at `output` has already been removed by the
    /// caller. Dropping the returned future must abort the conversion.
    async fn transcode(&self, input: &Path, output: &Path, format: PcmFormat)
        -> VoiceResult<PathBuf>;
}

/// `ffmpeg`-backed transcode engine.
pub struct FfmpegTranscode {
    bin: String,
}

impl FfmpegTranscode {
    pub fn new(bin: String) -> Self {
        Self { bin }
    }
}

#[async_trait]
impl AudioTranscode for FfmpegTranscode {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: PcmFormat,
    ) -> VoiceResult<PathBuf> {
        debug!(input = %input.display(), output = %output.display(), "starting transcode");

        let output_status = tokio::process::Command::new(&self.bin)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-f")
            .arg("s16le")
            .arg("-acodec")
            .arg(format.codec)
            .arg("-ac")
            .arg(format.channels.to_string())
            .arg("-ar")
            .arg(format.sample_rate.to_string())
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VoiceError::Transcode(format!("failed to spawn {}: {}", self.bin, e)))?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let detail = stderr.lines().last().unwrap_or("unknown error");
            return Err(VoiceError::Transcode(format!(
                "conversion failed for {}: {detail}",
                input.display()
            )));
        }

        let written = tokio::fs::metadata(output).await.map_err(|_| {
            VoiceError::Transcode(format!("conversion produced no output at {}", output.display()))
        })?;
        if written.len() == 0 {
            return Err(VoiceError::Transcode(format!(
                "conversion produced an empty stream at {}",
                output.display()
            )));
        }

        info!(output = %output.display(), bytes = written.len(), "transcode complete");
        Ok(output.to_path_buf())
    }
}
