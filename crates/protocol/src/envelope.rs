use serde::{Deserialize, Serialize};

use crate::constants::RequestKind;

/// Errors produced while encoding or decoding feed packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty line")]
    EmptyLine,
}

/// Topic list carried by LISTEN and UNLISTEN requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRequest {
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Packets sent by the client. One packet is one text line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientPacket {
    #[serde(rename = "LISTEN")]
    Listen { nonce: String, data: TopicRequest },
    #[serde(rename = "UNLISTEN")]
    Unlisten { nonce: String, data: TopicRequest },
    #[serde(rename = "PING")]
    Ping,
}

impl ClientPacket {
    /// Builds a nonced LISTEN or UNLISTEN request.
    pub fn request(
        kind: RequestKind,
        nonce: impl Into<String>,
        topics: Vec<String>,
        auth_token: Option<String>,
    ) -> Self {
        let nonce = nonce.into();
        let data = TopicRequest { topics, auth_token };
        match kind {
            RequestKind::Listen => ClientPacket::Listen { nonce, data },
            RequestKind::Unlisten => ClientPacket::Unlisten { nonce, data },
        }
    }

    /// Returns the nonce for requests that carry one.
    pub fn nonce(&self) -> Option<&str> {
        match self {
            ClientPacket::Listen { nonce, .. } | ClientPacket::Unlisten { nonce, .. } => {
                Some(nonce)
            }
            ClientPacket::Ping => None,
        }
    }

    /// Serializes the packet into a single line.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A topic message pushed by the server.
///
/// `message` is itself a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub topic: String,
    pub message: String,
}

impl FeedMessage {
    /// Decodes the nested message payload.
    pub fn decode(&self) -> Result<serde_json::Value, ProtocolError> {
        Ok(serde_json::from_str(&self.message)?)
    }
}

/// Packets received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerPacket {
    #[serde(rename = "PONG")]
    Pong,
    #[serde(rename = "RECONNECT")]
    Reconnect,
    #[serde(rename = "RESPONSE")]
    Response {
        #[serde(default)]
        nonce: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "MESSAGE")]
    Message { data: FeedMessage },
    /// Any packet type this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerPacket {
    /// Decodes one inbound line.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::EmptyLine);
        }
        Ok(serde_json::from_str(line)?)
    }

    /// Error text of a RESPONSE packet.
    ///
    /// The server sends `"error": ""` on success, so an empty string counts
    /// as no error. Returns `None` for every other packet type.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            ServerPacket::Response { error, .. } => error.as_deref().filter(|e| !e.is_empty()),
            _ => None,
        }
    }
}
