// src/output/types.rs
//! What a run writes to disk, planned before any I/O happens.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Files and directories to produce, in order.
#[derive(Debug, Clone, Default)]
pub struct OutputPlan {
    pub targets: Vec<DeliveryTarget>,
}

impl OutputPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: DeliveryTarget) -> Self {
        self.targets.push(target);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Replace a file's content, creating parent directories as needed
    WriteFile { path: PathBuf, content: String },
    CreateDirectory { path: PathBuf },
}

impl DeliveryTarget {
    pub fn path(&self) -> &Path {
        match self {
            Self::WriteFile { path, .. } | Self::CreateDirectory { path } => path,
        }
    }
}

/// Outcome of delivering a plan. Targets are attempted independently.
#[derive(Debug, Clone, Default)]
pub struct OutputReport {
    pub delivered: Vec<PathBuf>,
    pub failed: Vec<Undelivered>,
    pub bytes_written: usize,
    pub elapsed: Duration,
}

impl OutputReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// One `path: error` line per failed target.
    pub fn failure_messages(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|f| format!("{}: {}", f.target.path().display(), f.error))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Undelivered {
    pub target: DeliveryTarget,
    pub error: String,
}
