//! Inbound message validation
//!
//! A `Validator` decides whether an inbound message is eligible for relay.
//! It never errors and never logs; the broadcaster reports rejections.

use crate::config::ValidationSettings;
use crate::protocol::{InboundMessage, OutboundMessage, Payload};

/// Gate applied to every inbound message before fan-out
pub trait Validator: Send + Sync {
    /// `true` if the message may be relayed
    ///
    /// Must be deterministic and must not block.
    fn is_valid(&self, message: &InboundMessage) -> bool;
}

/// Rule-based validator driven by `[validation]` settings
#[derive(Debug, Clone)]
pub struct MessageValidator {
    max_message_bytes: usize,
    require_json: bool,
    allow_binary: bool,
    relay_results: bool,
}

impl MessageValidator {
    pub fn new(settings: &ValidationSettings) -> Self {
        Self {
            max_message_bytes: settings.max_message_bytes,
            require_json: settings.require_json,
            allow_binary: settings.allow_binary,
            relay_results: settings.relay_results,
        }
    }
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new(&ValidationSettings::default())
    }
}

impl Validator for MessageValidator {
    fn is_valid(&self, message: &InboundMessage) -> bool {
        let payload = &message.payload;

        if payload.is_empty() || payload.len() > self.max_message_bytes {
            return false;
        }

        match payload {
            Payload::Binary(_) => self.allow_binary,
            Payload::Text(text) => {
                if self.require_json && serde_json::from_str::<serde_json::Value>(text).is_err() {
                    return false;
                }
                self.relay_results || serde_json::from_str::<OutboundMessage>(text).is_err()
            }
        }
    }
}

/// Accept everything
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[cfg(test)]
impl Validator for AcceptAll {
    fn is_valid(&self, _message: &InboundMessage) -> bool {
        true
    }
}
