//! # Messaging Account Adapter
//!
//! Boundary to the external messaging account engine. Authentication,
//! session storage, and protocol plumbing all live behind this trait; the
//! core only consumes parsed chat command events and sends text replies.
//!
//! The event stream is single-consumer: [`AccountClient::command_events`]
//! hands out the stream once, to the userbot dispatcher.

use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Reference to a file attached to a chat message.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    /// Engine-specific attachment identifier
    pub id: String,

    /// MIME type reported by the messaging engine
    pub mime_type: String,

    /// Original file name, when the engine knows it
    pub file_name: Option<String>,
}

impl AttachmentRef {
    /// True when the attachment is an audio file the bot can play or sample.
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio")
    }
}

/// A chat message that may address the bot, already parsed out of the
/// engine's own update format.
#[derive(Debug, Clone)]
pub struct ChatCommandEvent {
    pub chat_id: ChatId,
    pub text: String,

    /// Attachment of the message this one replies to, if any
    pub reply_attachment: Option<AttachmentRef>,
}

/// Identity snapshot of the logged-in account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountIdentity {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub phone: Option<String>,
}

/// Stream of inbound chat command events.
pub type CommandEventStream = Pin<Box<dyn Stream<Item = ChatCommandEvent> + Send>>;

/// Capability interface to the messaging account engine.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Establish the connection. Authorization state is whatever the engine
    /// has persisted; this call never prompts interactively.
    async fn connect(&self) -> VoiceResult<()>;

    /// Whether the account is connected and authorized.
    fn is_authorized(&self) -> bool;

    /// Identity of the logged-in account, when authorized.
    fn identity(&self) -> Option<AccountIdentity>;

    /// Take the inbound command event stream. Returns an empty stream on
    /// every call after the first.
    fn command_events(&self) -> CommandEventStream;

    /// Send a text reply into a chat.
    async fn send_reply(&self, chat_id: ChatId, text: &str) -> VoiceResult<()>;

    /// Download an attachment into `dest_dir`, returning the local path.
    async fn download_attachment(
        &self,
        attachment: &AttachmentRef,
        dest_dir: &Path,
    ) -> VoiceResult<PathBuf>;

    /// Download an attachment fully into memory (recognition samples).
    async fn download_attachment_bytes(&self, attachment: &AttachmentRef) -> VoiceResult<Vec<u8>>;
}

/// Placeholder account used when no messaging engine is wired in.
///
/// The process still starts and serves the control surface, matching the
/// original "authentication required — use the web interface" mode; the
/// command stream is simply empty.
pub struct OfflineAccount;

impl OfflineAccount {
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> VoiceError {
        VoiceError::Account("messaging account engine not available".to_string())
    }
}

impl Default for OfflineAccount {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountClient for OfflineAccount {
    async fn connect(&self) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    fn is_authorized(&self) -> bool {
        false
    }

    fn identity(&self) -> Option<AccountIdentity> {
        None
    }

    fn command_events(&self) -> CommandEventStream {
        Box::pin(tokio_stream::empty())
    }

    async fn send_reply(&self, _chat_id: ChatId, _text: &str) -> VoiceResult<()> {
        Err(Self::unavailable())
    }

    async fn download_attachment(
        &self,
        _attachment: &AttachmentRef,
        _dest_dir: &Path,
    ) -> VoiceResult<PathBuf> {
        Err(Self::unavailable())
    }

    async fn download_attachment_bytes(&self, _attachment: &AttachmentRef) -> VoiceResult<Vec<u8>> {
        Err(Self::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_audio_mime_detection() {
        let audio = AttachmentRef {
            id: "1".to_string(),
            mime_type: "audio/mpeg".to_string(),
            file_name: Some("track.mp3".to_string()),
        };
        let image = AttachmentRef {
            id: "2".to_string(),
            mime_type: "image/png".to_string(),
            file_name: None,
        };
        assert!(audio.is_audio());
        assert!(!image.is_audio());
    }

    #[tokio::test]
    async fn test_offline_account_has_no_events() {
        let account = OfflineAccount::new();
        assert!(!account.is_authorized());
        assert!(account.identity().is_none());
        assert!(account.connect().await.is_err());

        let mut events = account.command_events();
        assert!(events.next().await.is_none());
    }
}
