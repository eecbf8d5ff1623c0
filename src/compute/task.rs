//! Per-recipient compute task
//!
//! One `ComputeTask` is spawned for every peer that qualifies for a
//! fan-out. It owns its recipient, runs the difference kernel, and sends
//! the result to that recipient only. Nothing it does can affect a
//! sibling task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Error;
use crate::protocol::OutboundMessage;
use crate::relay::{ConnectionId, SharedConnection};

use super::{Operands, SharedBackend};

/// How one recipient's task ended
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Result queued on the recipient's connection
    Delivered,

    /// Recipient was no longer open when the result was ready
    Dropped,

    /// Transport refused the frame, or the recipient's queue was full
    SendFailed(String),

    /// Kernel failed or produced a non-finite value; nothing sent
    ComputeFailed(String),
}

impl DeliveryOutcome {
    #[cfg(test)]
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Compute-and-send bound to a single recipient
pub struct ComputeTask {
    recipient: SharedConnection,
    operands: Arc<Operands>,
    backend: SharedBackend,
    timeout: Option<Duration>,
    origin: ConnectionId,
}

impl ComputeTask {
    pub fn new(
        recipient: SharedConnection,
        operands: Arc<Operands>,
        backend: SharedBackend,
        timeout: Option<Duration>,
        origin: ConnectionId,
    ) -> Self {
        Self {
            recipient,
            operands,
            backend,
            timeout,
            origin,
        }
    }

    pub fn recipient_id(&self) -> ConnectionId {
        self.recipient.id()
    }

    /// Compute the difference and send it to the recipient
    pub async fn run(self) -> DeliveryOutcome {
        let recipient = self.recipient.id();
        let start = Instant::now();

        let computed = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.backend.difference(Arc::clone(&self.operands))).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ComputeTimeout {
                        timeout_ms: limit.as_millis() as u64,
                    }),
                }
            }
            None => self.backend.difference(Arc::clone(&self.operands)).await,
        };

        let values = match computed {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    recipient = %recipient,
                    origin = %self.origin,
                    backend = self.backend.name(),
                    error = %e,
                    "Compute failed; nothing sent to this peer"
                );
                return DeliveryOutcome::ComputeFailed(e.to_string());
            }
        };

        if !self.recipient.is_open() {
            debug!(recipient = %recipient, "Recipient closed before result was ready");
            return DeliveryOutcome::Dropped;
        }

        let message = OutboundMessage::ComputeResult {
            values,
            origin: self.origin,
        };
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => return DeliveryOutcome::SendFailed(e.to_string()),
        };

        match self.recipient.send(frame).await {
            Ok(()) => {
                debug!(
                    recipient = %recipient,
                    message_type = message.type_name(),
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "Result delivered"
                );
                DeliveryOutcome::Delivered
            }
            Err(Error::ConnectionClosed { .. }) => {
                debug!(recipient = %recipient, "Recipient closed during send");
                DeliveryOutcome::Dropped
            }
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "Failed to send result");
                DeliveryOutcome::SendFailed(e.to_string())
            }
        }
    }
}
