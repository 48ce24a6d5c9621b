//! # Voice Session Core
//!
//! Everything that makes the bot's voice presence behave: the per-chat
//! session state machine, the registry that guarantees one session per chat,
//! the playback preparation pipeline, and the chat command table.
//!
//! ## Key Components:
//! - **Commands**: text command parsing and every reply string
//! - **Registry**: chat id → session map under a single structural lock
//! - **Session**: per-chat worker task owning the state machine
//! - **Pipeline**: Fetch → Transcode with cancellation and cleanup
//!
//! ## Concurrency model:
//! Each session is a dedicated task fed by an mpsc channel, so commands for
//! one chat are processed strictly in arrival order while different chats
//! proceed fully independently. Pipeline jobs run as separate tasks and
//! report back through the same channel, which keeps every state transition
//! on the session task.

pub mod commands;
pub mod pipeline;
pub mod registry;
pub mod session;

pub use commands::Command;
pub use pipeline::PlaybackPipeline;
pub use registry::{SessionDeps, SessionRegistry};
pub use session::{SessionOp, SessionState, StatusSnapshot, VoiceSession};
