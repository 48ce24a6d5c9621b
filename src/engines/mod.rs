//! # External Engine Adapters
//!
//! Capability-typed boundaries to every external engine the userbot relies
//! on. The core never touches a concrete engine type; it holds trait objects
//! and opaque handles, so the whole command surface is testable with the
//! mocks in [`mock`] and a deployment can swap engines without touching the
//! session logic.
//!
//! ## Key Components:
//! - **Account**: the messaging account — connection, identity, the inbound
//!   stream of parsed chat commands, replies, attachment downloads
//! - **Transport**: the group voice-call engine (join/leave/playout control)
//! - **Fetch**: turning a URL or chat attachment into a local audio file
//! - **Transcode**: converting a local file into fixed-format raw PCM
//! - **Recognize**: one-shot acoustic fingerprint lookup
//!
//! Adapter calls return [`crate::error::VoiceResult`]; the session and
//! dispatcher boundaries convert failures into user-facing replies, so no
//! engine error escapes the core.

pub mod account;
pub mod fetch;
pub mod recognize;
pub mod transcode;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use account::{AccountClient, AccountIdentity, AttachmentRef, ChatCommandEvent, OfflineAccount};
pub use fetch::{AudioSource, MediaFetch, YtdlFetch};
pub use recognize::{HttpRecognizer, TrackMatch, TrackRecognizer};
pub use transcode::{AudioTranscode, FfmpegTranscode, PcmFormat, TARGET_FORMAT};
pub use transport::{DisabledVoiceTransport, TransportHandle, VoiceTransport};

/// Stable identifier of a chat, as issued by the messaging account engine.
pub type ChatId = i64;
