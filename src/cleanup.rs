// Ordered best-effort shutdown steps
//
// Each step runs regardless of whether an earlier one failed. Failures are
// logged and collected so the caller can report them, never propagated.

use std::fmt::Display;

use tracing::{debug, warn};

pub struct Cleanup {
    component: &'static str,
    failed: Vec<&'static str>,
    attempted: usize,
}

/// What happened during a [`Cleanup`] run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempted: usize,
    pub failed: Vec<&'static str>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Cleanup {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            failed: Vec::new(),
            attempted: 0,
        }
    }

    /// Run one step now, recording a failure instead of returning it
    pub fn step<E: Display>(
        &mut self,
        name: &'static str,
        f: impl FnOnce() -> Result<(), E>,
    ) -> &mut Self {
        self.attempted += 1;
        match f() {
            Ok(()) => debug!("[{}] {}: done", self.component, name),
            Err(e) => {
                warn!("[{}] {} failed: {}", self.component, name, e);
                self.failed.push(name);
            }
        }
        self
    }

    pub fn finish(&mut self) -> CleanupReport {
        CleanupReport {
            attempted: self.attempted,
            failed: std::mem::take(&mut self.failed),
        }
    }
}
