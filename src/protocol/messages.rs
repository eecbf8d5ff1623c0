//! Protocol message definitions
//!
//! Inbound payloads are opaque to the relay except for one optional shape:
//! a `COMPUTE` request carrying its own operands. Outbound frames carry
//! a type discriminator like every other message on the wire.

use serde::{Deserialize, Serialize};

use crate::compute::Operands;
use crate::error::Result;
use crate::relay::ConnectionId;

/// Longest payload excerpt placed in log records
pub const LOG_PREVIEW_CHARS: usize = 256;

// ─────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────

/// Raw payload of one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Size in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Binary(_) => "binary",
        }
    }

    /// Human-readable excerpt for diagnostics
    pub fn preview(&self, max_chars: usize) -> String {
        match self {
            Payload::Text(s) => {
                let mut out: String = s.chars().take(max_chars).collect();
                if s.chars().count() > max_chars {
                    out.push('…');
                }
                out
            }
            Payload::Binary(b) => format!("<{} bytes binary>", b.len()),
        }
    }
}

/// A message as it arrived on one connection
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Connection the message arrived on
    pub from: ConnectionId,

    pub payload: Payload,
}

impl InboundMessage {
    pub fn text(from: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            from,
            payload: Payload::Text(text.into()),
        }
    }

    pub fn binary(from: ConnectionId, bytes: Vec<u8>) -> Self {
        Self {
            from,
            payload: Payload::Binary(bytes),
        }
    }

    /// Operands carried by a `COMPUTE` request, if this is one
    ///
    /// Lengths are not checked here; a mismatched pair is passed through
    /// so that each recipient's task fails on its own.
    pub fn compute_operands(&self) -> Option<Operands> {
        let Payload::Text(ref text) = self.payload else {
            return None;
        };

        match serde_json::from_str::<RelayRequest>(text) {
            Ok(RelayRequest::Compute { a, b }) => Some(Operands::new(a, b)),
            Err(_) => None,
        }
    }
}

/// Structured requests a peer may embed in a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayRequest {
    /// Compute `a - b` for every recipient instead of the node defaults
    Compute { a: Vec<f64>, b: Vec<f64> },
}

// ─────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────

/// Frame queued for one connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
}

/// Messages the relay sends to peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    /// Result of the compute task bound to this recipient
    ComputeResult {
        values: Vec<f64>,
        /// Connection whose message triggered the computation
        origin: ConnectionId,
    },
}

impl OutboundMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::ComputeResult { .. } => "COMPUTE_RESULT",
        }
    }

    /// Encode as a JSON text frame
    pub fn to_frame(&self) -> Result<OutboundFrame> {
        Ok(OutboundFrame::Text(serde_json::to_string(self)?))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
