//! # Voice Transport Adapter
//!
//! Boundary to the external group voice-call engine. The engine owns the
//! network legwork of a live voice channel; this crate only drives it:
//! join a chat's call, install a raw PCM file as the active input, and
//! control playout.
//!
//! ## Handle ownership:
//! [`VoiceTransport::join`] issues a [`TransportHandle`] that the session
//! owns exclusively. Every playout operation borrows the handle, and
//! [`VoiceTransport::leave`] consumes it — once a session has left, no code
//! path can keep poking the released call.

use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::path::Path;

/// Opaque per-chat call handle issued by a transport implementation.
///
/// The `call_id` is meaningful only to the engine that issued it.
#[derive(Debug)]
pub struct TransportHandle {
    chat_id: ChatId,
    call_id: u64,
}

impl TransportHandle {
    pub fn new(chat_id: ChatId, call_id: u64) -> Self {
        Self { chat_id, call_id }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn call_id(&self) -> u64 {
        self.call_id
    }
}

/// Capability interface to the external voice-call engine.
///
/// Implementations must be safe to share across sessions; per-call state
/// belongs behind the issued handles, not in the session.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join the chat's live voice channel and return the call handle.
    async fn join(&self, chat_id: ChatId) -> VoiceResult<TransportHandle>;

    /// Leave the voice channel and release the handle.
    async fn leave(&self, handle: TransportHandle) -> VoiceResult<()>;

    /// Install a raw PCM artifact as the active playout input.
    async fn set_input(&self, handle: &TransportHandle, artifact: &Path) -> VoiceResult<()>;

    /// Stop playout entirely; the input must be re-installed to play again.
    async fn stop_playout(&self, handle: &TransportHandle) -> VoiceResult<()>;

    /// Pause playout, keeping the current position.
    async fn pause_playout(&self, handle: &TransportHandle) -> VoiceResult<()>;

    /// Resume playout after a pause.
    async fn resume_playout(&self, handle: &TransportHandle) -> VoiceResult<()>;

    /// Restart playout of the installed input from the beginning.
    async fn restart_playout(&self, handle: &TransportHandle) -> VoiceResult<()>;

    /// Toggle the outgoing audio mute flag.
    async fn set_mute(&self, handle: &TransportHandle, muted: bool) -> VoiceResult<()>;
}

/// Fallback transport used when no voice-call engine is wired in.
///
/// Mirrors the original deployment mode where the call library is absent:
/// the bot keeps running, chat commands keep getting replies, and every
/// voice operation fails with a clear "engine not available" error.
pub struct DisabledVoiceTransport;

impl DisabledVoiceTransport {
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> VoiceError {
        VoiceError::Transport("voice call engine not available".to_string())
    }
}

impl Default for DisabledVoiceTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceTransport for DisabledVoiceTransport {
    async fn join(&self, chat_id: ChatId) -> VoiceResult<TransportHandle> {
        tracing::warn!(chat_id, "join requested but no voice engine is wired");
        Err(Self::unavailable())
    }

    async fn leave(&self, _handle: TransportHandle) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn set_input(&self, _handle: &TransportHandle, _artifact: &Path) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn stop_playout(&self, _handle: &TransportHandle) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn pause_playout(&self, _handle: &TransportHandle) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn resume_playout(&self, _handle: &TransportHandle) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn restart_playout(&self, _handle: &TransportHandle) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn set_mute(&self, _handle: &TransportHandle, _muted: bool) -> VoiceResult<()> {
        Err(Self::unavailable())
    }
}
