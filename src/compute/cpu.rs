//! CPU compute backend using Rayon
//!
//! Runs the difference kernel on a dedicated rayon pool. Each invocation is
//! moved onto tokio's blocking pool first so the async runtime keeps serving
//! sockets while the kernel runs.

use std::sync::Arc;

use async_trait::async_trait;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};

use super::{ensure_finite, BackendCapabilities, ComputeBackend, Operands};

/// CPU-based compute backend
pub struct CpuBackend {
    pool: Arc<ThreadPool>,
    threads: usize,
}

impl CpuBackend {
    /// Create a backend with `threads` compute threads (0 = one per core)
    pub fn new(threads: usize) -> Result<Self> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("relay-compute-{}", i))
            .build()
            .map_err(|e| Error::compute_failed("cpu", e.to_string()))?;

        tracing::info!(threads, "Initializing CPU compute backend");

        Ok(Self {
            pool: Arc::new(pool),
            threads,
        })
    }
}

/// Data-parallel `a[i] - b[i]`
pub fn parallel_difference(operands: &Operands) -> Result<Vec<f64>> {
    operands.check()?;

    ensure_finite(
        operands
            .a
            .par_iter()
            .zip(operands.b.par_iter())
            .map(|(x, y)| x - y)
            .collect(),
    )
}

#[async_trait]
impl ComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            name: "cpu",
            parallelism: self.threads,
            offloads_blocking: true,
        }
    }

    async fn difference(&self, operands: Arc<Operands>) -> Result<Vec<f64>> {
        // Fail fast without a thread hop
        operands.check()?;

        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || pool.install(|| parallel_difference(&operands)))
            .await
            .map_err(|e| Error::compute_failed("cpu", e.to_string()))?
    }
}
