//! Backend selection
//!
//! Maps configured backend names onto concrete `ComputeBackend` instances.

use std::sync::Arc;

use crate::error::Result;

use super::{CpuBackend, MockBackend, SharedBackend};

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Rayon thread pool
    Cpu,
    /// Serial, deterministic test double
    Mock,
}

impl BackendType {
    pub fn all() -> &'static [BackendType] {
        &[BackendType::Cpu, BackendType::Mock]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Cpu => "cpu",
            BackendType::Mock => "mock",
        }
    }

    /// Parse from a configuration string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(BackendType::Cpu),
            "mock" => Some(BackendType::Mock),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Factory for creating backends
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend of the specified type
    pub fn create(backend_type: BackendType, threads: usize) -> Result<SharedBackend> {
        let backend: SharedBackend = match backend_type {
            BackendType::Cpu => Arc::new(CpuBackend::new(threads)?),
            BackendType::Mock => Arc::new(MockBackend::new()),
        };
        Ok(backend)
    }
}
