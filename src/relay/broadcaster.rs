//! Relay broadcaster
//!
//! Entry point for every inbound message. A message that passes the
//! validator is fanned out: each open peer other than the sender gets its
//! own spawned `ComputeTask`, and that task's result goes to that peer
//! alone. A message that fails validation produces one diagnostic record
//! and nothing else.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::compute::{BackendFactory, BackendType, ComputeTask, DeliveryOutcome, Operands, SharedBackend};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::protocol::{InboundMessage, LOG_PREVIEW_CHARS};
use crate::validator::{MessageValidator, Validator};

use super::{ConnectionId, ConnectionRegistry, RelayStats, SharedConnection};

// ─────────────────────────────────────────────────────────────────
// Dispatch Results
// ─────────────────────────────────────────────────────────────────

/// What `on_message` did with a message
pub enum Dispatch {
    /// Failed validation; logged, nothing sent
    Rejected,

    /// Accepted; one task per target was spawned
    FannedOut(FanOut),
}

#[cfg(test)]
impl Dispatch {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Dispatch::Rejected)
    }

    pub fn into_fan_out(self) -> Option<FanOut> {
        match self {
            Dispatch::Rejected => None,
            Dispatch::FannedOut(fan_out) => Some(fan_out),
        }
    }
}

/// Tasks spawned for one accepted message
///
/// Dropping this detaches the tasks; they still run to completion and
/// record their outcomes in `RelayStats`.
pub struct FanOut {
    targets: Vec<ConnectionId>,
    handles: Vec<JoinHandle<DeliveryOutcome>>,
}

impl FanOut {
    /// Let the tasks run unobserved; returns how many were spawned
    pub fn detach(self) -> usize {
        drop(self.handles);
        self.targets.len()
    }
}

#[cfg(test)]
impl FanOut {
    /// Connections a task was spawned for
    pub fn targets(&self) -> &[ConnectionId] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Wait for every task and collect per-recipient outcomes
    pub async fn join(self) -> Vec<(ConnectionId, DeliveryOutcome)> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for (id, handle) in self.targets.into_iter().zip(self.handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => DeliveryOutcome::ComputeFailed(format!("task did not complete: {}", e)),
            };
            outcomes.push((id, outcome));
        }
        outcomes
    }
}

// ─────────────────────────────────────────────────────────────────
// Broadcaster
// ─────────────────────────────────────────────────────────────────

/// Validates inbound messages and fans accepted ones out to peers
pub struct RelayBroadcaster {
    registry: Arc<ConnectionRegistry>,
    validator: Arc<dyn Validator>,
    backend: SharedBackend,
    default_operands: Arc<Operands>,
    compute_timeout: Option<Duration>,
    stats: Arc<RelayStats>,
}

impl RelayBroadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        validator: Arc<dyn Validator>,
        backend: SharedBackend,
        default_operands: Operands,
    ) -> Self {
        Self {
            registry,
            validator,
            backend,
            default_operands: Arc::new(default_operands),
            compute_timeout: None,
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Build from configuration, creating the configured backend
    pub fn from_config(config: &RelayConfig, registry: Arc<ConnectionRegistry>) -> Result<Self> {
        let backend_type = BackendType::from_name(&config.compute.backend).ok_or_else(|| {
            Error::config_field_invalid(
                "compute.backend",
                format!("Unknown compute backend '{}'", config.compute.backend),
            )
        })?;
        let backend = BackendFactory::create(backend_type, config.compute_threads())?;

        let timeout = match config.compute.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self::new(
            registry,
            Arc::new(MessageValidator::new(&config.validation)),
            backend,
            Operands::new(config.compute.default_a.clone(), config.compute.default_b.clone()),
        )
        .with_timeout(timeout))
    }

    /// Bound each compute invocation
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.compute_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Handle one inbound message
    ///
    /// Returns without awaiting any per-peer work. Must be called from
    /// within a Tokio runtime when the message can be accepted.
    pub fn on_message(&self, message: InboundMessage) -> Dispatch {
        self.stats.record_received();

        if !self.validator.is_valid(&message) {
            self.stats.record_rejected();
            info!(
                from = %message.from,
                kind = message.payload.kind(),
                len = message.payload.len(),
                payload = %message.payload.preview(LOG_PREVIEW_CHARS),
                "Invalid message received"
            );
            return Dispatch::Rejected;
        }

        let operands = match message.compute_operands() {
            Some(operands) => Arc::new(operands),
            None => Arc::clone(&self.default_operands),
        };

        let snapshot = self.registry.snapshot();
        Dispatch::FannedOut(self.fan_out(message.from, snapshot, operands))
    }

    /// Spawn one compute task per eligible connection in `snapshot`
    ///
    /// A connection is eligible when it is not `sender` and is open at the
    /// moment it is visited.
    pub fn fan_out(&self, sender: ConnectionId, snapshot: Vec<SharedConnection>, operands: Arc<Operands>) -> FanOut {
        self.stats.record_fan_out();

        let mut targets = Vec::new();
        let mut handles = Vec::new();

        for conn in snapshot {
            if conn.id() == sender || !conn.is_open() {
                continue;
            }

            let task = ComputeTask::new(
                conn,
                Arc::clone(&operands),
                Arc::clone(&self.backend),
                self.compute_timeout,
                sender,
            );
            targets.push(task.recipient_id());

            let stats = Arc::clone(&self.stats);
            handles.push(tokio::spawn(async move {
                let outcome = task.run().await;
                stats.record_outcome(&outcome);
                outcome
            }));
        }

        debug!(from = %sender, targets = targets.len(), "Fanned out message");

        FanOut { targets, handles }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
