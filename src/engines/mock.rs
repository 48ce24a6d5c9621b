//! Test doubles for every engine boundary. Each mock records the calls it
//! receives so tests can assert on adapter traffic (or the absence of it),
//! and exposes switches for failure injection and mid-stage blocking.

use crate::engines::account::{
    AccountClient, AccountIdentity, AttachmentRef, ChatCommandEvent, CommandEventStream,
};
use crate::engines::fetch::{AudioSource, MediaFetch};
use crate::engines::recognize::{TrackMatch, TrackRecognizer};
use crate::engines::transcode::{AudioTranscode, PcmFormat};
use crate::engines::transport::{TransportHandle, VoiceTransport};
use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Recording voice transport.
#[derive(Default)]
pub struct MockTransport {
    next_call_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    set_inputs: Mutex<Vec<PathBuf>>,
    mute_states: Mutex<Vec<bool>>,
    failing_ops: Mutex<HashSet<&'static str>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call to `op` fail with a transport error.
    pub fn fail_op(&self, op: &'static str) {
        self.failing_ops.lock().unwrap().insert(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(op))
            .count()
    }

    pub fn set_inputs(&self) -> Vec<PathBuf> {
        self.set_inputs.lock().unwrap().clone()
    }

    pub fn mute_states(&self) -> Vec<bool> {
        self.mute_states.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str, chat_id: ChatId) -> VoiceResult<()> {
        self.calls.lock().unwrap().push(format!("{op}:{chat_id}"));
        if self.failing_ops.lock().unwrap().contains(op) {
            return Err(VoiceError::Transport(format!("{op} rejected by mock")));
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn join(&self, chat_id: ChatId) -> VoiceResult<TransportHandle> {
        self.record("join", chat_id)?;
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransportHandle::new(chat_id, call_id))
    }

    async fn leave(&self, handle: TransportHandle) -> VoiceResult<()> {
        self.record("leave", handle.chat_id())
    }

    async fn set_input(&self, handle: &TransportHandle, artifact: &Path) -> VoiceResult<()> {
        self.record("set_input", handle.chat_id())?;
        self.set_inputs.lock().unwrap().push(artifact.to_path_buf());
        Ok(())
    }

    async fn stop_playout(&self, handle: &TransportHandle) -> VoiceResult<()> {
        self.record("stop_playout", handle.chat_id())
    }

    async fn pause_playout(&self, handle: &TransportHandle) -> VoiceResult<()> {
        self.record("pause_playout", handle.chat_id())
    }

    async fn resume_playout(&self, handle: &TransportHandle) -> VoiceResult<()> {
        self.record("resume_playout", handle.chat_id())
    }

    async fn restart_playout(&self, handle: &TransportHandle) -> VoiceResult<()> {
        self.record("restart_playout", handle.chat_id())
    }

    async fn set_mute(&self, handle: &TransportHandle, muted: bool) -> VoiceResult<()> {
        self.record("set_mute", handle.chat_id())?;
        self.mute_states.lock().unwrap().push(muted);
        Ok(())
    }
}

/// Claim one blocking slot; used so "block the next N calls" stays race-free
/// even while a parked call is being superseded.
fn try_claim(slots: &AtomicUsize) -> bool {
    slots
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        .is_ok()
}

/// Recording fetch engine writing a small fake audio file.
#[derive(Default)]
pub struct MockFetch {
    pub fetch_calls: AtomicUsize,
    fail: AtomicBool,
    block_remaining: AtomicUsize,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` fetches hang until cancelled (future dropped).
    pub fn block_next(&self, n: usize) {
        self.block_remaining.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetch for MockFetch {
    async fn fetch(&self, source: &AudioSource, dest_dir: &Path) -> VoiceResult<PathBuf> {
        let parked = try_claim(&self.block_remaining);
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if parked {
            // Parked until the pipeline cancels us by dropping this future.
            std::future::pending::<()>().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Fetch("mock fetch failure".to_string()));
        }

        if let AudioSource::Local(path) = source {
            return Ok(path.clone());
        }

        let path = dest_dir.join("fetched.mp3");
        tokio::fs::write(&path, b"mock audio bytes").await?;
        Ok(path)
    }
}

/// Recording transcode engine writing a fake PCM artifact.
#[derive(Default)]
pub struct MockTranscode {
    pub transcode_calls: AtomicUsize,
    fail: AtomicBool,
    block_remaining: AtomicUsize,
}

impl MockTranscode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` transcodes hang until cancelled (future dropped).
    pub fn block_next(&self, n: usize) {
        self.block_remaining.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.transcode_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioTranscode for MockTranscode {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _format: PcmFormat,
    ) -> VoiceResult<PathBuf> {
        let parked = try_claim(&self.block_remaining);
        self.transcode_calls.fetch_add(1, Ordering::SeqCst);

        if parked {
            // Simulate a half-written artifact at cancellation time.
            tokio::fs::write(&output, b"partial").await?;
            std::future::pending::<()>().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Transcode("mock transcode failure".to_string()));
        }

        if !input.is_file() {
            return Err(VoiceError::Transcode(format!(
                "input missing: {}",
                input.display()
            )));
        }

        tokio::fs::write(&output, b"mock pcm stream").await?;
        Ok(output.to_path_buf())
    }
}

/// Recognizer returning a preset result.
#[derive(Default)]
pub struct MockRecognizer {
    result: Mutex<Option<TrackMatch>>,
    pub recognize_calls: AtomicUsize,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match(title: &str, artist: &str) -> Self {
        let mock = Self::default();
        *mock.result.lock().unwrap() = Some(TrackMatch {
            title: title.to_string(),
            artist: artist.to_string(),
            cover_url: None,
            share_text: Some(format!("{title} - {artist}")),
        });
        mock
    }

    pub fn calls(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackRecognizer for MockRecognizer {
    async fn recognize(&self, _sample: &[u8]) -> Option<TrackMatch> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

/// Scriptable account: tests push command events in and read replies out.
pub struct MockAccount {
    authorized: AtomicBool,
    events_tx: mpsc::UnboundedSender<ChatCommandEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ChatCommandEvent>>>,
    replies: Mutex<Vec<(ChatId, String)>>,
    attachments: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockAccount {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            authorized: AtomicBool::new(true),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            replies: Mutex::new(Vec::new()),
            attachments: Mutex::new(HashMap::new()),
        }
    }

    pub fn push_event(&self, event: ChatCommandEvent) {
        self.events_tx.send(event).expect("event stream closed");
    }

    pub fn push_text(&self, chat_id: ChatId, text: &str) {
        self.push_event(ChatCommandEvent {
            chat_id,
            text: text.to_string(),
            reply_attachment: None,
        });
    }

    pub fn add_attachment(&self, id: &str, bytes: &[u8]) -> AttachmentRef {
        self.attachments
            .lock()
            .unwrap()
            .insert(id.to_string(), bytes.to_vec());
        AttachmentRef {
            id: id.to_string(),
            mime_type: "audio/mpeg".to_string(),
            file_name: Some(format!("{id}.mp3")),
        }
    }

    pub fn replies(&self) -> Vec<(ChatId, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn reply_count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Wait until at least `n` replies have been sent, then return them.
    pub async fn wait_for_replies(&self, n: usize) -> Vec<(ChatId, String)> {
        wait_until("replies", || self.reply_count() >= n).await;
        self.replies()
    }
}

impl Default for MockAccount {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountClient for MockAccount {
    async fn connect(&self) -> VoiceResult<()> {
        Ok(())
    }

    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    fn identity(&self) -> Option<AccountIdentity> {
        Some(AccountIdentity {
            id: 42,
            first_name: "Test".to_string(),
            username: Some("testbot".to_string()),
            phone: None,
        })
    }

    fn command_events(&self) -> CommandEventStream {
        match self.events_rx.lock().unwrap().take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty()),
        }
    }

    async fn send_reply(&self, chat_id: ChatId, text: &str) -> VoiceResult<()> {
        self.replies.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn download_attachment(
        &self,
        attachment: &AttachmentRef,
        dest_dir: &Path,
    ) -> VoiceResult<PathBuf> {
        let bytes = self.download_attachment_bytes(attachment).await?;
        let name = attachment
            .file_name
            .clone()
            .unwrap_or_else(|| attachment.id.clone());
        let path = dest_dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn download_attachment_bytes(&self, attachment: &AttachmentRef) -> VoiceResult<Vec<u8>> {
        self.attachments
            .lock()
            .unwrap()
            .get(&attachment.id)
            .cloned()
            .ok_or_else(|| VoiceError::Account(format!("unknown attachment {}", attachment.id)))
    }
}
