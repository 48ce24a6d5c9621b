//! # Application State Management
//!
//! Shared state for the HTTP control surface. Handlers read configuration,
//! bot counters, and the userbot status through this struct; the dispatcher
//! updates the counters as commands flow through.
//!
//! ## Thread Safety Pattern:
//! Everything mutable sits behind Arc<RwLock<T>>: many handlers may read at
//! once, writers take the lock only for the duration of a counter bump or a
//! config swap. The locks are never held across an await point.

use crate::config::AppConfig;
use crate::userbot::Userbot;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,

    /// Command and recognition counters, updated by the dispatcher
    pub metrics: Arc<RwLock<BotMetrics>>,

    /// When the process started (Instant is Copy, no lock needed)
    pub start_time: Instant,

    pub userbot: Arc<Userbot>,
}

/// Counters describing the bot's command traffic since startup.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BotMetrics {
    /// Chat commands parsed and dispatched
    pub commands_processed: u64,

    /// Commands that ended in a failure reply
    pub command_errors: u64,

    /// `.shazam` requests that reached the recognition engine
    pub recognitions_attempted: u64,

    /// Recognition attempts that produced a track match
    pub recognitions_matched: u64,
}

impl AppState {
    pub fn new(config: AppConfig, userbot: Arc<Userbot>, metrics: Arc<RwLock<BotMetrics>>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics,
            start_time: Instant::now(),
            userbot,
        }
    }

    /// Copy of the current configuration, releasing the lock immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Consistent copy of the counters for serialization.
    pub fn metrics_snapshot(&self) -> BotMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl BotMetrics {
    /// Share of commands that ended in a failure reply (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.commands_processed > 0 {
            self.command_errors as f64 / self.commands_processed as f64
        } else {
            0.0
        }
    }
}
