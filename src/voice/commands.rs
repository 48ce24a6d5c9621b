//! # Chat Command Surface
//!
//! Parses chat text into typed commands and holds every reply string the
//! bot can send. Keeping the whole table in one module makes the command
//! surface enumerable and testable without a connected account or a voice
//! engine.

use crate::error::VoiceError;

/// A chat command addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    /// `.play <source>`; the source may instead come from a replied-to
    /// audio attachment, so it is optional here
    Play { source: Option<String> },
    Stop,
    Pause,
    Resume,
    Replay,
    Mute,
    Unmute,
    Shazam,
    Status,
    Debug,
}

impl Command {
    /// Parse a chat message. Returns `None` for anything that is not a
    /// known dot-command, so ordinary conversation is ignored.
    pub fn parse(text: &str) -> Option<Command> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let keyword = parts.next()?.to_ascii_lowercase();
        let argument = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match keyword.as_str() {
            "join" => Some(Command::Join),
            "leave" => Some(Command::Leave),
            "play" => Some(Command::Play {
                source: argument.map(str::to_string),
            }),
            "stop" => Some(Command::Stop),
            "pause" => Some(Command::Pause),
            "resume" => Some(Command::Resume),
            "replay" => Some(Command::Replay),
            "mute" => Some(Command::Mute),
            "unmute" => Some(Command::Unmute),
            "shazam" => Some(Command::Shazam),
            "status" => Some(Command::Status),
            "debug" => Some(Command::Debug),
            _ => None,
        }
    }

    /// Command keyword for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Join => "join",
            Command::Leave => "leave",
            Command::Play { .. } => "play",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Replay => "replay",
            Command::Mute => "mute",
            Command::Unmute => "unmute",
            Command::Shazam => "shazam",
            Command::Status => "status",
            Command::Debug => "debug",
        }
    }
}

/// Every reply the bot sends, success and failure alike.
pub mod replies {
    pub const JOINED: &str = "Joined voice chat";
    pub const LEFT: &str = "Left voice chat";
    pub const PLAYING: &str = "Playing";
    pub const STOPPED: &str = "Stopped playback";
    pub const PAUSED: &str = "Paused playback";
    pub const RESUMED: &str = "Resumed playback";
    pub const REPLAYING: &str = "Replaying audio";
    pub const MUTED: &str = "Muted";
    pub const UNMUTED: &str = "Unmuted";

    pub const NOT_JOINED: &str = "Not joined to voice chat. Use .join first";
    pub const ALREADY_JOINED: &str = "Already in a voice chat";
    pub const NOT_IN_VOICE: &str = "Not in a voice chat";
    pub const NOT_PLAYING: &str = "No audio is playing";
    pub const NOT_PAUSED: &str = "Playback is not paused";
    pub const NOTHING_TO_REPLAY: &str = "No prior audio to replay";
    pub const SESSION_LIMIT: &str = "Too many active voice sessions";
    pub const SUPERSEDED: &str = "Superseded by a newer play request";
    pub const SESSION_CLOSED: &str = "Voice session closed";

    pub const NO_SOURCE: &str = "Provide a URL or reply to an audio file";
    pub const REPLY_TO_AUDIO: &str = "Reply to an audio file";
    pub const NOT_RECOGNIZED: &str = "Could not recognize track";
}

/// Format the reply for a failed operation.
///
/// State rejections and cancellations already carry their user-facing text;
/// adapter failures get a "Failed to <action>" prefix, mirroring the reply
/// style of the success messages.
pub fn failure_reply(action: &str, err: &VoiceError) -> String {
    match err {
        VoiceError::State(msg) | VoiceError::Canceled(msg) => msg.clone(),
        other => format!("Failed to {action}: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_table() {
        assert_eq!(Command::parse(".join"), Some(Command::Join));
        assert_eq!(Command::parse(".leave"), Some(Command::Leave));
        assert_eq!(Command::parse(".stop"), Some(Command::Stop));
        assert_eq!(Command::parse(".pause"), Some(Command::Pause));
        assert_eq!(Command::parse(".resume"), Some(Command::Resume));
        assert_eq!(Command::parse(".replay"), Some(Command::Replay));
        assert_eq!(Command::parse(".mute"), Some(Command::Mute));
        assert_eq!(Command::parse(".unmute"), Some(Command::Unmute));
        assert_eq!(Command::parse(".shazam"), Some(Command::Shazam));
        assert_eq!(Command::parse(".status"), Some(Command::Status));
        assert_eq!(Command::parse(".debug"), Some(Command::Debug));
    }

    #[test]
    fn test_parse_play_source() {
        assert_eq!(
            Command::parse(".play https://x/y"),
            Some(Command::Play {
                source: Some("https://x/y".to_string())
            })
        );
        // Bare .play is valid when replying to an audio attachment.
        assert_eq!(Command::parse(".play"), Some(Command::Play { source: None }));
        assert_eq!(
            Command::parse("  .play   https://x/y  "),
            Some(Command::Play {
                source: Some("https://x/y".to_string())
            })
        );
    }

    #[test]
    fn test_non_commands_are_ignored() {
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse(".unknown"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("play url-without-dot"), None);
    }

    #[test]
    fn test_failure_reply_formatting() {
        let state = VoiceError::State(replies::NOT_JOINED.to_string());
        assert_eq!(failure_reply("play audio", &state), replies::NOT_JOINED);

        let fetch = VoiceError::Fetch("unreachable".to_string());
        assert_eq!(
            failure_reply("play audio", &fetch),
            "Failed to play audio: fetch error: unreachable"
        );
    }
}
