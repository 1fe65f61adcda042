// src/network/message.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors surfaced by the peer wire codec.
///
/// A malformed frame is a per-message error: the reader drops the frame and
/// keeps the connection open. It must never terminate the link.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message frame: {0}")]
    MalformedMessage(#[from] serde_json::Error),
}

/// One chat utterance as it travels through the mesh.
///
/// Immutable after construction. `origin_node_id` is stamped exactly once,
/// on the node where the message was first created, and is never rewritten
/// as the message propagates; it is the key routing uses to detect a
/// message that has circulated back to its creator.
///
/// Wire form is one JSON object per newline-delimited frame. The JSON field
/// for the origin is `originServerId` to stay interoperable with existing
/// relay deployments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    /// Producer-assigned wall-clock timestamp, milliseconds since epoch.
    pub timestamp: u64,
    #[serde(rename = "originServerId")]
    pub origin_node_id: String,
}

impl ChatMessage {
    /// Create a locally originated message, stamping the current time.
    pub fn new(sender: &str, content: &str, origin_node_id: &str) -> Self {
        Self {
            sender: sender.to_string(),
            content: content.to_string(),
            timestamp: now_millis(),
            origin_node_id: origin_node_id.to_string(),
        }
    }

    /// Rebuild a message received from a peer, preserving the original
    /// timestamp and origin.
    pub fn reconstruct(sender: &str, content: &str, timestamp: u64, origin_node_id: &str) -> Self {
        Self {
            sender: sender.to_string(),
            content: content.to_string(),
            timestamp,
            origin_node_id: origin_node_id.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.origin_node_id, self.sender, self.content)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
