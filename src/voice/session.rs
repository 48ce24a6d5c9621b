//! # Voice Session State Machine
//!
//! One session per chat, one dedicated worker task per session. The worker
//! owns all session state outright — no locks — and processes requests from
//! its channel strictly in arrival order, so no two state transitions for a
//! chat can ever overlap. Pipeline jobs run as separate tasks and report
//! back through the same channel, which is what makes a running preparation
//! interruptible by `leave` or a superseding `play`.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: created by the registry for a `join`, nothing held
//! 2. **Joining/Leaving**: transient while the transport call is in flight
//! 3. **Active**: joined, no audio
//! 4. **Preparing**: joined, pipeline job in flight
//! 5. **Playing/Paused**: artifact installed on the transport
//!
//! `Idle` is terminal: on leave — and on a failed join — the worker removes
//! itself from the registry and stops, so the registry only ever lists
//! chats with a live voice presence.

use crate::engines::fetch::AudioSource;
use crate::engines::transport::TransportHandle;
use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use crate::voice::commands::replies;
use crate::voice::pipeline::remove_file_if_exists;
use crate::voice::registry::{SessionDeps, SessionRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Joining,
    Active,
    Preparing,
    Playing,
    Paused,
    Leaving,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::Preparing => "preparing",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Leaving => "leaving",
        }
    }

    /// States in which the session holds a transport handle.
    pub fn is_joined(&self) -> bool {
        matches!(
            self,
            SessionState::Active
                | SessionState::Preparing
                | SessionState::Playing
                | SessionState::Paused
        )
    }
}

/// State-machine operations. The text command surface maps onto these; the
/// `play` source arrives already resolved to an [`AudioSource`].
#[derive(Debug, Clone)]
pub enum SessionOp {
    Join,
    Leave,
    Play(AudioSource),
    Stop,
    Pause,
    Resume,
    Replay,
    Mute,
    Unmute,
}

impl SessionOp {
    /// Verb phrase for failure replies ("Failed to <action>: ...").
    pub fn action(&self) -> &'static str {
        match self {
            SessionOp::Join => "join voice chat",
            SessionOp::Leave => "leave voice chat",
            SessionOp::Play(_) => "play audio",
            SessionOp::Stop => "stop playback",
            SessionOp::Pause => "pause playback",
            SessionOp::Resume => "resume playback",
            SessionOp::Replay => "replay audio",
            SessionOp::Mute => "mute",
            SessionOp::Unmute => "unmute",
        }
    }
}

/// Point-in-time view of a session, for `.status` and the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub chat_id: ChatId,
    pub state: String,
    pub has_transport: bool,
    pub has_artifact: bool,
    pub muted: bool,
}

type OpReply = oneshot::Sender<Result<String, VoiceError>>;

enum SessionRequest {
    Op { op: SessionOp, reply: OpReply },
    PipelineDone {
        job_id: Uuid,
        result: VoiceResult<PathBuf>,
    },
    Status { reply: oneshot::Sender<StatusSnapshot> },
}

/// Handle to a chat's session worker.
#[derive(Debug)]
pub struct VoiceSession {
    chat_id: ChatId,
    tx: mpsc::UnboundedSender<SessionRequest>,
}

impl VoiceSession {
    pub(crate) fn spawn(
        chat_id: ChatId,
        deps: SessionDeps,
        registry: Weak<SessionRegistry>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SessionWorker {
            chat_id,
            state: SessionState::Idle,
            transport_handle: None,
            raw_stream_path: None,
            muted: false,
            closing: false,
            inflight: None,
            deps,
            registry,
            self_tx: tx.clone(),
        };
        tokio::spawn(worker.run(rx));
        Arc::new(Self { chat_id, tx })
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// True once the worker has stopped (left, or failed to join).
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue an operation and return the receiver for its reply.
    ///
    /// The queue position is claimed synchronously, so callers submitting
    /// in order are processed in order even if they await replies later.
    pub fn submit(&self, op: SessionOp) -> oneshot::Receiver<Result<String, VoiceError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(SessionRequest::Op {
            op,
            reply: reply_tx,
        });
        reply_rx
    }

    /// Queue an operation and wait for its reply.
    pub async fn execute(&self, op: SessionOp) -> Result<String, VoiceError> {
        match self.submit(op).await {
            Ok(result) => result,
            // The worker stopped before replying — the session is gone.
            Err(_) => Err(VoiceError::State(replies::NOT_JOINED.to_string())),
        }
    }

    pub async fn status(&self) -> Option<StatusSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Status { reply: reply_tx })
            .ok()?;
        reply_rx.await.ok()
    }
}

/// An in-flight pipeline job and everything needed to finish or abort it.
struct PipelineJob {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    reply: OpReply,
    /// State to restore when the job fails or is superseded
    prior_state: SessionState,
}

struct SessionWorker {
    chat_id: ChatId,
    state: SessionState,
    transport_handle: Option<TransportHandle>,
    raw_stream_path: Option<PathBuf>,
    muted: bool,
    closing: bool,
    inflight: Option<PipelineJob>,
    deps: SessionDeps,
    registry: Weak<SessionRegistry>,
    self_tx: mpsc::UnboundedSender<SessionRequest>,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionRequest>) {
        debug!(chat_id = self.chat_id, "voice session worker started");

        while let Some(request) = rx.recv().await {
            match request {
                SessionRequest::Op {
                    op: SessionOp::Play(source),
                    reply,
                } => self.start_play(source, reply).await,
                SessionRequest::Op { op, reply } => {
                    let result = self.handle_op(op).await;
                    let _ = reply.send(result);
                    if self.closing {
                        break;
                    }
                }
                SessionRequest::PipelineDone { job_id, result } => {
                    self.finish_pipeline(job_id, result).await;
                }
                SessionRequest::Status { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        debug!(chat_id = self.chat_id, "voice session worker stopped");
    }

    async fn handle_op(&mut self, op: SessionOp) -> Result<String, VoiceError> {
        match op {
            SessionOp::Join => self.handle_join().await,
            SessionOp::Leave => self.handle_leave().await,
            SessionOp::Stop => self.handle_stop().await,
            SessionOp::Pause => self.handle_pause().await,
            SessionOp::Resume => self.handle_resume().await,
            SessionOp::Replay => self.handle_replay().await,
            SessionOp::Mute => self.handle_mute(true).await,
            SessionOp::Unmute => self.handle_mute(false).await,
            // Routed separately in run(); unreachable by construction.
            SessionOp::Play(_) => Err(VoiceError::State(replies::NOT_JOINED.to_string())),
        }
    }

    async fn handle_join(&mut self) -> Result<String, VoiceError> {
        if self.state != SessionState::Idle {
            return Err(VoiceError::State(replies::ALREADY_JOINED.to_string()));
        }

        self.state = SessionState::Joining;
        match self.deps.transport.join(self.chat_id).await {
            Ok(handle) => {
                self.transport_handle = Some(handle);
                self.state = SessionState::Active;
                info!(chat_id = self.chat_id, "joined voice chat");
                Ok(replies::JOINED.to_string())
            }
            Err(e) => {
                // Idle is terminal: a failed join closes the session.
                self.state = SessionState::Idle;
                self.close_session();
                warn!(chat_id = self.chat_id, error = %e, "failed to join voice chat");
                Err(e)
            }
        }
    }

    async fn handle_leave(&mut self) -> Result<String, VoiceError> {
        if matches!(self.state, SessionState::Idle | SessionState::Leaving) {
            return Err(VoiceError::State(replies::NOT_IN_VOICE.to_string()));
        }

        self.cancel_inflight(replies::SESSION_CLOSED).await;
        self.state = SessionState::Leaving;

        let mut residual: Option<VoiceError> = None;
        if let Some(handle) = self.transport_handle.take() {
            if let Err(e) = self.deps.transport.leave(handle).await {
                warn!(chat_id = self.chat_id, error = %e, "transport leave failed; tearing down anyway");
                residual = Some(e);
            }
        }

        self.raw_stream_path = None;
        self.deps.pipeline.discard_artifacts(self.chat_id).await;

        self.state = SessionState::Idle;
        self.close_session();
        info!(chat_id = self.chat_id, "left voice chat");

        match residual {
            None => Ok(replies::LEFT.to_string()),
            Some(e) => Err(e),
        }
    }

    async fn start_play(&mut self, source: AudioSource, reply: OpReply) {
        if !self.state.is_joined() {
            let _ = reply.send(Err(VoiceError::State(replies::NOT_JOINED.to_string())));
            return;
        }

        // A play while one is being prepared supersedes it: cancel, await
        // the stop, then start fresh — keeping the original rollback state.
        let prior_state = match self.inflight.take() {
            Some(job) => {
                let prior = job.prior_state;
                self.cancel_job(job, replies::SUPERSEDED).await;
                prior
            }
            None => self.state,
        };

        let job_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        info!(
            chat_id = self.chat_id,
            job = %job_id,
            source = %source.describe(),
            "preparing audio"
        );
        self.state = SessionState::Preparing;

        let pipeline = self.deps.pipeline.clone();
        let chat_id = self.chat_id;
        let task_cancel = cancel.clone();
        let done_tx = self.self_tx.clone();
        let task = tokio::spawn(async move {
            let result = pipeline.prepare(chat_id, source, task_cancel).await;
            let _ = done_tx.send(SessionRequest::PipelineDone { job_id, result });
        });

        self.inflight = Some(PipelineJob {
            id: job_id,
            cancel,
            task,
            reply,
            prior_state,
        });
    }

    async fn finish_pipeline(&mut self, job_id: Uuid, result: VoiceResult<PathBuf>) {
        let job = match self.inflight.take() {
            Some(job) if job.id == job_id => job,
            other => {
                // Completion of a superseded job; its cleanup already ran.
                self.inflight = other;
                debug!(chat_id = self.chat_id, job = %job_id, "ignoring stale pipeline completion");
                return;
            }
        };

        match result {
            Ok(artifact) => {
                let install = match self.transport_handle.as_ref() {
                    Some(handle) => self.deps.transport.set_input(handle, &artifact).await,
                    None => Err(VoiceError::Transport("transport handle missing".to_string())),
                };

                match install {
                    Ok(()) => {
                        self.raw_stream_path = Some(artifact);
                        self.state = SessionState::Playing;
                        info!(chat_id = self.chat_id, "playback started");
                        let _ = job.reply.send(Ok(replies::PLAYING.to_string()));
                    }
                    Err(e) => {
                        // The fixed artifact path already replaced whatever
                        // was there before, so nothing valid remains.
                        remove_file_if_exists(&artifact).await;
                        self.raw_stream_path = None;
                        self.state = job.prior_state;
                        warn!(chat_id = self.chat_id, error = %e, "failed to install artifact");
                        let _ = job.reply.send(Err(e));
                    }
                }
            }
            Err(e) => {
                self.state = job.prior_state;
                // A run that died mid-transcode consumed the previous
                // artifact at the fixed path.
                if let Some(path) = &self.raw_stream_path {
                    if !path.exists() {
                        self.raw_stream_path = None;
                    }
                }
                let _ = job.reply.send(Err(e));
            }
        }
    }

    async fn handle_stop(&mut self) -> Result<String, VoiceError> {
        if !matches!(self.state, SessionState::Playing | SessionState::Paused) {
            return Err(VoiceError::State(replies::NOT_PLAYING.to_string()));
        }
        self.deps
            .transport
            .stop_playout(self.transport_handle_ref()?)
            .await?;
        self.state = SessionState::Active;
        Ok(replies::STOPPED.to_string())
    }

    async fn handle_pause(&mut self) -> Result<String, VoiceError> {
        if self.state != SessionState::Playing {
            return Err(VoiceError::State(replies::NOT_PLAYING.to_string()));
        }
        self.deps
            .transport
            .pause_playout(self.transport_handle_ref()?)
            .await?;
        self.state = SessionState::Paused;
        Ok(replies::PAUSED.to_string())
    }

    async fn handle_resume(&mut self) -> Result<String, VoiceError> {
        if self.state != SessionState::Paused {
            return Err(VoiceError::State(replies::NOT_PAUSED.to_string()));
        }
        self.deps
            .transport
            .resume_playout(self.transport_handle_ref()?)
            .await?;
        self.state = SessionState::Playing;
        Ok(replies::RESUMED.to_string())
    }

    async fn handle_replay(&mut self) -> Result<String, VoiceError> {
        if !self.state.is_joined() {
            return Err(VoiceError::State(replies::NOT_JOINED.to_string()));
        }
        if self.raw_stream_path.is_none() {
            return Err(VoiceError::State(replies::NOTHING_TO_REPLAY.to_string()));
        }
        if !matches!(self.state, SessionState::Playing | SessionState::Paused) {
            return Err(VoiceError::State(replies::NOT_PLAYING.to_string()));
        }
        self.deps
            .transport
            .restart_playout(self.transport_handle_ref()?)
            .await?;
        self.state = SessionState::Playing;
        Ok(replies::REPLAYING.to_string())
    }

    async fn handle_mute(&mut self, muted: bool) -> Result<String, VoiceError> {
        if !matches!(self.state, SessionState::Playing | SessionState::Paused) {
            return Err(VoiceError::State(replies::NOT_PLAYING.to_string()));
        }
        self.deps
            .transport
            .set_mute(self.transport_handle_ref()?, muted)
            .await?;
        self.muted = muted;
        Ok(if muted {
            replies::MUTED.to_string()
        } else {
            replies::UNMUTED.to_string()
        })
    }

    async fn cancel_inflight(&mut self, reason: &str) {
        if let Some(job) = self.inflight.take() {
            self.cancel_job(job, reason).await;
        }
    }

    /// Cancel a pipeline job and wait until it has actually stopped, so
    /// nothing can race the next fetch or transcode on the same paths.
    async fn cancel_job(&mut self, job: PipelineJob, reason: &str) {
        debug!(chat_id = self.chat_id, job = %job.id, reason, "canceling pipeline job");
        job.cancel.cancel();
        if let Err(e) = job.task.await {
            warn!(chat_id = self.chat_id, error = %e, "pipeline task failed to join");
        }
        let _ = job.reply.send(Err(VoiceError::Canceled(reason.to_string())));
    }

    fn transport_handle_ref(&self) -> VoiceResult<&TransportHandle> {
        self.transport_handle
            .as_ref()
            .ok_or_else(|| VoiceError::Transport("transport handle missing".to_string()))
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            chat_id: self.chat_id,
            state: self.state.as_str().to_string(),
            has_transport: self.transport_handle.is_some(),
            has_artifact: self.raw_stream_path.is_some(),
            muted: self.muted,
        }
    }

    fn close_session(&mut self) {
        self.closing = true;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.chat_id);
        }
    }
}
