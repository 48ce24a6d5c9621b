//! # Userbot Dispatcher
//!
//! Consumes the account engine's command event stream and drives the rest
//! of the system: session operations go to the chat's session worker,
//! recognition requests run as their own tasks, and every command gets a
//! reply.
//!
//! ## Ordering:
//! The dispatch loop itself never awaits adapter work. Session operations
//! claim their queue position synchronously during dispatch, so commands
//! for one chat are processed in arrival order; only the reply forwarding
//! is spawned. That keeps a slow join in one chat from stalling every other
//! chat's commands.

use crate::engines::account::{AccountClient, AccountIdentity, AttachmentRef, ChatCommandEvent};
use crate::engines::fetch::AudioSource;
use crate::engines::recognize::TrackRecognizer;
use crate::engines::ChatId;
use crate::error::VoiceError;
use crate::state::BotMetrics;
use crate::voice::commands::{self, replies, Command};
use crate::voice::registry::SessionRegistry;
use crate::voice::session::{SessionOp, StatusSnapshot};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Top-level status for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct UserbotStatus {
    pub authenticated: bool,
    pub version: String,
    pub active_sessions: usize,
    pub user: Option<AccountIdentity>,
}

pub struct Userbot {
    account: Arc<dyn AccountClient>,
    recognizer: Arc<dyn TrackRecognizer>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<RwLock<BotMetrics>>,
}

impl Userbot {
    pub fn new(
        account: Arc<dyn AccountClient>,
        recognizer: Arc<dyn TrackRecognizer>,
        registry: Arc<SessionRegistry>,
        metrics: Arc<RwLock<BotMetrics>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            account,
            recognizer,
            registry,
            metrics,
        })
    }

    /// Run the command loop until the event stream ends.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.account.command_events();
        info!("command loop started");

        while let Some(event) = events.next().await {
            self.dispatch(event);
        }

        info!("command event stream ended");
    }

    /// Leave every live voice chat; called on shutdown.
    pub async fn shutdown(&self) {
        for chat_id in self.registry.list() {
            if let Some(session) = self.registry.get(chat_id) {
                if let Err(e) = session.execute(SessionOp::Leave).await {
                    warn!(chat_id, error = %e, "failed to leave voice chat during shutdown");
                }
            }
        }
    }

    pub fn status(&self) -> UserbotStatus {
        UserbotStatus {
            authenticated: self.account.is_authorized(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_sessions: self.registry.len(),
            user: self.account.identity(),
        }
    }

    /// Snapshots of every live session, for the control surface.
    pub async fn session_snapshots(&self) -> Vec<StatusSnapshot> {
        let mut snapshots = Vec::new();
        for chat_id in self.registry.list() {
            if let Some(session) = self.registry.get(chat_id) {
                if let Some(snapshot) = session.status().await {
                    snapshots.push(snapshot);
                }
            }
        }
        snapshots
    }

    fn dispatch(self: &Arc<Self>, event: ChatCommandEvent) {
        let Some(command) = Command::parse(&event.text) else {
            return;
        };

        debug!(
            chat_id = event.chat_id,
            command = command.name(),
            "command received"
        );
        self.metrics.write().unwrap().commands_processed += 1;

        match command {
            Command::Join => self.route(event.chat_id, SessionOp::Join),
            Command::Leave => self.route(event.chat_id, SessionOp::Leave),
            Command::Play { source } => {
                match resolve_source(source, event.reply_attachment) {
                    Some(audio) => self.route(event.chat_id, SessionOp::Play(audio)),
                    None => self.reply_failure(event.chat_id, replies::NO_SOURCE.to_string()),
                }
            }
            Command::Stop => self.route(event.chat_id, SessionOp::Stop),
            Command::Pause => self.route(event.chat_id, SessionOp::Pause),
            Command::Resume => self.route(event.chat_id, SessionOp::Resume),
            Command::Replay => self.route(event.chat_id, SessionOp::Replay),
            Command::Mute => self.route(event.chat_id, SessionOp::Mute),
            Command::Unmute => self.route(event.chat_id, SessionOp::Unmute),
            Command::Shazam => self.spawn_shazam(event),
            Command::Status => self.spawn_status(event.chat_id),
            Command::Debug => {
                let text = format!("Active voice sessions: {:?}", self.registry.list());
                self.spawn_reply(event.chat_id, text);
            }
        }
    }

    /// Hand an operation to the chat's session. `join` creates the session;
    /// everything else requires one to exist already — a pure state check
    /// that touches no adapter.
    fn route(self: &Arc<Self>, chat_id: ChatId, op: SessionOp) {
        let session = match op {
            SessionOp::Join => match self.registry.get_or_create(chat_id) {
                Ok(session) => session,
                Err(e) => {
                    warn!(chat_id, error = %e, "cannot create voice session");
                    self.reply_failure(chat_id, commands::failure_reply(op.action(), &e));
                    return;
                }
            },
            _ => match self.registry.get(chat_id) {
                Some(session) => session,
                None => {
                    let message = match op {
                        SessionOp::Leave => replies::NOT_IN_VOICE,
                        _ => replies::NOT_JOINED,
                    };
                    self.reply_failure(chat_id, message.to_string());
                    return;
                }
            },
        };

        let action = op.action();
        let reply_rx = session.submit(op);
        let this = self.clone();
        tokio::spawn(async move {
            let result = match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(VoiceError::State(replies::NOT_JOINED.to_string())),
            };
            let text = match result {
                Ok(text) => text,
                Err(e) => {
                    this.metrics.write().unwrap().command_errors += 1;
                    commands::failure_reply(action, &e)
                }
            };
            this.send_reply(chat_id, &text).await;
        });
    }

    fn spawn_shazam(self: &Arc<Self>, event: ChatCommandEvent) {
        let this = self.clone();
        tokio::spawn(async move {
            let text = this.recognize_reply(event.reply_attachment).await;
            this.send_reply(event.chat_id, &text).await;
        });
    }

    async fn recognize_reply(&self, attachment: Option<AttachmentRef>) -> String {
        let Some(attachment) = attachment.filter(|a| a.is_audio()) else {
            return replies::REPLY_TO_AUDIO.to_string();
        };

        self.metrics.write().unwrap().recognitions_attempted += 1;

        let sample = match self.account.download_attachment_bytes(&attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to download recognition sample");
                self.metrics.write().unwrap().command_errors += 1;
                return commands::failure_reply("download audio", &e);
            }
        };

        match self.recognizer.recognize(&sample).await {
            Some(track) => {
                self.metrics.write().unwrap().recognitions_matched += 1;
                format!("Recognized track:\n{}\n{}", track.title, track.artist)
            }
            None => replies::NOT_RECOGNIZED.to_string(),
        }
    }

    fn spawn_status(self: &Arc<Self>, chat_id: ChatId) {
        let this = self.clone();
        tokio::spawn(async move {
            let snapshot = match this.registry.get(chat_id) {
                Some(session) => session.status().await,
                None => None,
            };
            let (connected, has_transport) = match &snapshot {
                Some(s) => (true, s.has_transport),
                None => (false, false),
            };
            let text = format!(
                "Voice bot status\nConnected: {}\nChat ID: {}\nVoice transport: {}",
                yes_no(connected),
                chat_id,
                yes_no(has_transport)
            );
            this.send_reply(chat_id, &text).await;
        });
    }

    fn reply_failure(self: &Arc<Self>, chat_id: ChatId, text: String) {
        self.metrics.write().unwrap().command_errors += 1;
        self.spawn_reply(chat_id, text);
    }

    fn spawn_reply(self: &Arc<Self>, chat_id: ChatId, text: String) {
        let this = self.clone();
        tokio::spawn(async move {
            this.send_reply(chat_id, &text).await;
        });
    }

    async fn send_reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.account.send_reply(chat_id, text).await {
            warn!(chat_id, error = %e, "failed to send reply");
        }
    }
}

/// Pick the audio source for a `play`: a replied-to audio attachment wins
/// over a URL argument.
fn resolve_source(
    source: Option<String>,
    reply_attachment: Option<AttachmentRef>,
) -> Option<AudioSource> {
    if let Some(attachment) = reply_attachment.filter(|a| a.is_audio()) {
        return Some(AudioSource::Attachment(attachment));
    }
    source.map(AudioSource::Remote)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::{MockAccount, MockFetch, MockRecognizer, MockTranscode, MockTransport};
    use crate::voice::pipeline::PlaybackPipeline;
    use crate::voice::registry::SessionDeps;

    struct Fixture {
        userbot: Arc<Userbot>,
        account: Arc<MockAccount>,
        transport: Arc<MockTransport>,
        fetch: Arc<MockFetch>,
        recognizer: Arc<MockRecognizer>,
        registry: Arc<SessionRegistry>,
        _dir: tempfile::TempDir,
    }

    fn fixture_with_recognizer(recognizer: MockRecognizer) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let account = Arc::new(MockAccount::new());
        let transport = Arc::new(MockTransport::new());
        let fetch = Arc::new(MockFetch::new());
        let recognizer = Arc::new(recognizer);
        let pipeline = Arc::new(PlaybackPipeline::new(
            fetch.clone(),
            Arc::new(MockTranscode::new()),
            dir.path().join("downloads"),
            dir.path().join("audio"),
        ));
        std::fs::create_dir_all(dir.path().join("downloads")).unwrap();
        std::fs::create_dir_all(dir.path().join("audio")).unwrap();
        let registry = SessionRegistry::new(
            SessionDeps {
                transport: transport.clone(),
                pipeline,
            },
            16,
        );
        let userbot = Userbot::new(
            account.clone(),
            recognizer.clone(),
            registry.clone(),
            Arc::new(RwLock::new(BotMetrics::default())),
        );
        tokio::spawn(userbot.clone().run());
        Fixture {
            userbot,
            account,
            transport,
            fetch,
            recognizer,
            registry,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_recognizer(MockRecognizer::new())
    }

    #[tokio::test]
    async fn test_play_without_join_is_rejected_with_no_engine_calls() {
        let f = fixture();
        f.account.push_text(200, ".play https://x/y");

        let replies_sent = f.account.wait_for_replies(1).await;
        assert_eq!(replies_sent[0], (200, replies::NOT_JOINED.to_string()));
        assert_eq!(f.fetch.calls(), 0);
        assert!(f.transport.calls().is_empty());
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_join_then_play_flow() {
        let f = fixture();
        f.account.push_text(100, ".join");
        f.account.wait_for_replies(1).await;
        f.account.push_text(100, ".play https://x/y");

        let replies_sent = f.account.wait_for_replies(2).await;
        assert!(replies_sent.contains(&(100, replies::JOINED.to_string())));
        assert!(replies_sent.contains(&(100, replies::PLAYING.to_string())));
        assert_eq!(f.transport.call_count("set_input"), 1);
    }

    #[tokio::test]
    async fn test_play_with_no_source_or_attachment() {
        let f = fixture();
        f.account.push_text(100, ".join");
        f.account.wait_for_replies(1).await;
        f.account.push_text(100, ".play");

        let replies_sent = f.account.wait_for_replies(2).await;
        assert!(replies_sent.contains(&(100, replies::NO_SOURCE.to_string())));
        assert_eq!(f.fetch.calls(), 0);
    }

    #[tokio::test]
    async fn test_play_prefers_reply_attachment_over_url() {
        let f = fixture();
        let attachment = f.account.add_attachment("song", b"audio bytes");
        f.account.push_text(100, ".join");
        f.account.wait_for_replies(1).await;
        f.account.push_event(ChatCommandEvent {
            chat_id: 100,
            text: ".play https://ignored/url".to_string(),
            reply_attachment: Some(attachment),
        });

        let replies_sent = f.account.wait_for_replies(2).await;
        assert!(replies_sent.contains(&(100, replies::PLAYING.to_string())));
    }

    #[tokio::test]
    async fn test_non_commands_are_ignored() {
        let f = fixture();
        f.account.push_text(100, "just chatting about music");
        f.account.push_text(100, ".debug");

        let replies_sent = f.account.wait_for_replies(1).await;
        assert_eq!(replies_sent.len(), 1);
        assert_eq!(replies_sent[0].1, "Active voice sessions: []");
    }

    #[tokio::test]
    async fn test_shazam_requires_an_audio_reply() {
        let f = fixture();
        f.account.push_text(100, ".shazam");
        let replies_sent = f.account.wait_for_replies(1).await;
        assert_eq!(replies_sent[0].1, replies::REPLY_TO_AUDIO);

        // A non-audio attachment is rejected the same way.
        f.account.push_event(ChatCommandEvent {
            chat_id: 100,
            text: ".shazam".to_string(),
            reply_attachment: Some(AttachmentRef {
                id: "pic".to_string(),
                mime_type: "image/png".to_string(),
                file_name: None,
            }),
        });
        let replies_sent = f.account.wait_for_replies(2).await;
        assert_eq!(replies_sent[1].1, replies::REPLY_TO_AUDIO);
        assert_eq!(f.recognizer.calls(), 0);
    }

    #[tokio::test]
    async fn test_shazam_reports_match() {
        let f = fixture_with_recognizer(MockRecognizer::with_match("Bohemian Rhapsody", "Queen"));
        let attachment = f.account.add_attachment("clip", b"pcm sample");
        f.account.push_event(ChatCommandEvent {
            chat_id: 100,
            text: ".shazam".to_string(),
            reply_attachment: Some(attachment),
        });

        let replies_sent = f.account.wait_for_replies(1).await;
        assert!(replies_sent[0].1.contains("Bohemian Rhapsody"));
        assert!(replies_sent[0].1.contains("Queen"));
        assert_eq!(f.recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_shazam_no_match() {
        let f = fixture();
        let attachment = f.account.add_attachment("clip", b"pcm sample");
        f.account.push_event(ChatCommandEvent {
            chat_id: 100,
            text: ".shazam".to_string(),
            reply_attachment: Some(attachment),
        });

        let replies_sent = f.account.wait_for_replies(1).await;
        assert_eq!(replies_sent[0].1, replies::NOT_RECOGNIZED);
    }

    #[tokio::test]
    async fn test_status_without_session() {
        let f = fixture();
        f.account.push_text(100, ".status");

        let replies_sent = f.account.wait_for_replies(1).await;
        assert!(replies_sent[0].1.contains("Connected: no"));
        assert!(replies_sent[0].1.contains("Chat ID: 100"));
    }

    #[tokio::test]
    async fn test_status_while_joined() {
        let f = fixture();
        f.account.push_text(100, ".join");
        f.account.wait_for_replies(1).await;
        f.account.push_text(100, ".status");

        let replies_sent = f.account.wait_for_replies(2).await;
        let status = &replies_sent[1].1;
        assert!(status.contains("Connected: yes"));
        assert!(status.contains("Voice transport: yes"));
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let f = fixture();
        f.account.push_text(400, ".stop");

        let replies_sent = f.account.wait_for_replies(1).await;
        assert_eq!(replies_sent[0].1, replies::NOT_JOINED);
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_all_chats() {
        let f = fixture();
        f.account.push_text(100, ".join");
        f.account.push_text(200, ".join");
        f.account.wait_for_replies(2).await;
        assert_eq!(f.registry.len(), 2);

        f.userbot.shutdown().await;
        assert!(f.registry.is_empty());
        assert_eq!(f.transport.call_count("leave"), 2);
    }
}
