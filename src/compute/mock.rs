//! Mock backend for testing
//!
//! Computes the same difference as the CPU backend but serially, with
//! optional injected latency and failure so that relay tests can hold a
//! task in flight or make one recipient's compute fail.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{ensure_finite, BackendCapabilities, ComputeBackend, Operands};

/// Configuration for mock backend behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Delay before each result is returned
    pub latency: Duration,

    /// Fail every invocation
    pub fail: bool,
}

/// Mock implementation of `ComputeBackend`
pub struct MockBackend {
    config: MockConfig,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            calls: AtomicU32::new(0),
        }
    }

    /// Backend that sleeps for `latency` before answering
    #[cfg(test)]
    pub fn with_latency(latency: Duration) -> Self {
        Self::with_config(MockConfig {
            latency,
            ..Default::default()
        })
    }

    /// Number of `difference` invocations so far
    #[cfg(test)]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            name: "mock",
            ..Default::default()
        }
    }

    async fn difference(&self, operands: Arc<Operands>) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        operands.check()?;

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        if self.config.fail {
            return Err(Error::compute_failed("mock", "injected failure"));
        }

        ensure_finite(operands.a.iter().zip(&operands.b).map(|(x, y)| x - y).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_difference_and_call_count() {
        let backend = MockBackend::new();
        let operands = Arc::new(Operands::new(vec![5.0, 5.0], vec![1.0, 6.0]));

        let result = backend.difference(operands).await.unwrap();
        assert_eq!(result, vec![4.0, -1.0]);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_injected_failure() {
        let backend = MockBackend::with_config(MockConfig {
            fail: true,
            ..Default::default()
        });
        let operands = Arc::new(Operands::new(vec![1.0], vec![1.0]));

        let err = backend.difference(operands).await.unwrap_err();
        assert!(matches!(err, Error::ComputeFailed { .. }));
    }

    #[tokio::test]
    async fn test_mock_rejects_mismatch_before_latency() {
        let backend = MockBackend::with_latency(Duration::from_secs(30));
        let operands = Arc::new(Operands::new(vec![1.0, 2.0], vec![1.0]));

        // Would hang for 30s if the size check ran after the sleep
        let err = tokio::time::timeout(Duration::from_secs(1), backend.difference(operands))
            .await
            .expect("mismatch should fail fast")
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }
}
