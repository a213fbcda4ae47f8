//! Message codecs for the two wire formats spoken by game servers.
//!
//! - [`JsonCodec`] (default): one compact JSON object per newline-delimited frame,
//!   `{"require_input": bool, "content": string}`.
//! - [`LegacyCodec`]: raw text frames delimited by `0x03`; an input request is announced by a
//!   leading `[user input]` marker.
//!
//! Both satisfy `decode(encode(m)) == m` for every message they accept to encode.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::{ETX, NEWLINE};
use crate::error::PlayerError;

/// One message exchanged with the game server, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The server expects a move in response to this message.
    #[serde(rename = "require_input")]
    pub needs_input: bool,
    /// Game text, or the move when replying.
    pub content: String,
}

impl Message {
    /// A message with the given input flag and content.
    pub fn new(needs_input: bool, content: impl Into<String>) -> Self {
        Message {
            needs_input,
            content: content.into(),
        }
    }

    /// A reply carrying a move (or any other answer) back to the server.
    pub fn reply(content: impl Into<String>) -> Self {
        Self::new(false, content)
    }
}

/// Turns [`Message`]s into frame payloads and back.
pub trait Codec: Send {
    /// Byte delimiting frames for this format.
    fn separator(&self) -> u8;

    /// Serialize `message`. The result never contains [`Codec::separator`].
    fn encode(&self, message: &Message) -> Result<Vec<u8>, PlayerError>;

    /// Parse one frame payload.
    fn decode(&self, payload: &[u8]) -> Result<Message, PlayerError>;
}

/// Structured wire format: JSON lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn separator(&self) -> u8 {
        NEWLINE
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, PlayerError> {
        // compact output escapes every control character inside strings, so no raw newline
        serde_json::to_vec(message).map_err(|e| PlayerError::MalformedMessage(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, PlayerError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| PlayerError::MalformedMessage(format!("invalid UTF-8: {e}")))?;
        serde_json::from_str(text.trim())
            .map_err(|e| PlayerError::MalformedMessage(format!("{e} in {text:?}")))
    }
}

/// Raw-text wire format kept for older game servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl LegacyCodec {
    /// In-band marker prefixing every message that expects a move.
    pub const INPUT_MARKER: &'static str = "[user input]";
}

impl Codec for LegacyCodec {
    fn separator(&self) -> u8 {
        ETX
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, PlayerError> {
        if message.content.as_bytes().contains(&ETX) {
            return Err(PlayerError::MalformedMessage(
                "legacy content cannot contain 0x03".to_owned(),
            ));
        }
        if message.needs_input {
            Ok(format!("{}{}", Self::INPUT_MARKER, message.content).into_bytes())
        } else if message.content.starts_with(Self::INPUT_MARKER) {
            Err(PlayerError::MalformedMessage(format!(
                "content starting with {} would be read back as an input request",
                Self::INPUT_MARKER
            )))
        } else {
            Ok(message.content.clone().into_bytes())
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, PlayerError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| PlayerError::MalformedMessage(format!("invalid UTF-8: {e}")))?;
        Ok(match text.strip_prefix(Self::INPUT_MARKER) {
            Some(rest) => Message::new(true, rest),
            None => Message::new(false, text),
        })
    }
}

/// Which codec a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// JSON lines, see [`JsonCodec`].
    #[default]
    Structured,
    /// Raw text, see [`LegacyCodec`].
    Legacy,
}

impl WireFormat {
    /// Codec implementing this format.
    pub fn codec(self) -> Box<dyn Codec> {
        match self {
            WireFormat::Structured => Box::new(JsonCodec),
            WireFormat::Legacy => Box::new(LegacyCodec),
        }
    }
}

impl FromStr for WireFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(WireFormat::Structured),
            "legacy" | "raw" => Ok(WireFormat::Legacy),
            other => anyhow::bail!("unknown wire format '{other}', expected 'structured' or 'legacy'"),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::Structured => write!(f, "structured"),
            WireFormat::Legacy => write!(f, "legacy"),
        }
    }
}
