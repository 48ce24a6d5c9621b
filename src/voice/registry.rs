//! # Session Registry
//!
//! Owns the chat id → voice session map. The map's mutex is the only lock
//! in the whole subsystem and it is held strictly for map access — session
//! work, pipelines, and transport calls all happen on the sessions' own
//! tasks, so chats never contend with each other here.
//!
//! A session whose worker has ended (left the voice chat, or failed to
//! join) reads as absent: `get` filters it out and `get_or_create` replaces
//! it, which keeps "at most one live session per chat" true across the
//! session's whole lifecycle.

use crate::engines::transport::VoiceTransport;
use crate::engines::ChatId;
use crate::error::{VoiceError, VoiceResult};
use crate::voice::commands::replies;
use crate::voice::pipeline::PlaybackPipeline;
use crate::voice::session::VoiceSession;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Shared engine handles every session worker needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn VoiceTransport>,
    pub pipeline: Arc<PlaybackPipeline>,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChatId, Arc<VoiceSession>>>,
    deps: SessionDeps,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps, max_sessions: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            deps,
            max_sessions,
        })
    }

    /// Get the chat's live session, creating an idle one if absent.
    ///
    /// Fails only when the live-session cap is reached.
    pub fn get_or_create(self: &Arc<Self>, chat_id: ChatId) -> VoiceResult<Arc<VoiceSession>> {
        let mut sessions = self.sessions.lock().unwrap();

        if let Some(existing) = sessions.get(&chat_id) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
        }

        let live = sessions.values().filter(|s| !s.is_closed()).count();
        if live >= self.max_sessions {
            return Err(VoiceError::State(replies::SESSION_LIMIT.to_string()));
        }

        debug!(chat_id, "creating voice session");
        let session = VoiceSession::spawn(chat_id, self.deps.clone(), Arc::downgrade(self));
        sessions.insert(chat_id, session.clone());
        Ok(session)
    }

    /// Look up the chat's live session without creating one.
    pub fn get(&self, chat_id: ChatId) -> Option<Arc<VoiceSession>> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(&chat_id).filter(|s| !s.is_closed()).cloned()
    }

    /// Drop the chat's entry; no-op when absent.
    pub fn remove(&self, chat_id: ChatId) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.remove(&chat_id).is_some() {
            debug!(chat_id, "voice session removed");
        }
    }

    /// Chat ids with a live session, sorted for stable output.
    pub fn list(&self) -> Vec<ChatId> {
        let sessions = self.sessions.lock().unwrap();
        let mut ids: Vec<ChatId> = sessions
            .iter()
            .filter(|(_, s)| !s.is_closed())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let sessions = self.sessions.lock().unwrap();
        sessions.values().filter(|s| !s.is_closed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
