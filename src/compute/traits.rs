//! Backend trait definitions
//!
//! Defines the `ComputeBackend` trait that every compute engine implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::Operands;

// ─────────────────────────────────────────────────────────────────
// Backend Capabilities
// ─────────────────────────────────────────────────────────────────

/// Capabilities of a backend
#[derive(Debug, Clone)]
pub struct BackendCapabilities {
    /// Name of the backend
    pub name: &'static str,

    /// Worker threads available to one invocation
    pub parallelism: usize,

    /// Whether the backend runs off the async runtime threads
    pub offloads_blocking: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            name: "unknown",
            parallelism: 1,
            offloads_blocking: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// ComputeBackend Trait
// ─────────────────────────────────────────────────────────────────

/// Core trait for compute backends
///
/// Implementations must be stateless with respect to results: the same
/// operands always produce the same output, and each call returns a fresh
/// vector owned by the caller.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Backend name (e.g., "cpu", "mock")
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Element-wise `a[i] - b[i]`
    ///
    /// Fails with `Error::SizeMismatch` when the operands differ in length.
    async fn difference(&self, operands: Arc<Operands>) -> Result<Vec<f64>>;
}

/// Type alias for a shared backend reference
pub type SharedBackend = Arc<dyn ComputeBackend>;
