//! Perception builder for uipilot.
//!
//! Turns a live [`Environment`] into a [`PerceptionSnapshot`]: a
//! screenshot, a capped accessibility manifest and the current location.
//! Observation never fails. Every problem while extracting the tree is
//! folded into a manifest placeholder so the control loop always has a
//! snapshot to hand to the decision-maker.

pub mod manifest;

use std::time::Duration;

use tracing::{debug, warn};
use uipilot_core::{Environment, Manifest, PerceptionSnapshot};

/// Hard cap on manifest lines, whatever the configured limit.
pub const MAX_MANIFEST_LINES: usize = 300;

/// Builds snapshots with a fixed line limit and extraction budget.
#[derive(Debug, Clone)]
pub struct Perceiver {
    limit: usize,
    include_manifest: bool,
    timeout: Duration,
}

impl Perceiver {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.min(MAX_MANIFEST_LINES),
            include_manifest: true,
            timeout: Duration::from_secs(10),
        }
    }

    /// Skip tree extraction entirely; snapshots carry [`Manifest::Omitted`].
    pub fn without_manifest(mut self) -> Self {
        self.include_manifest = false;
        self
    }

    /// Budget for each of the screenshot and tree extraction.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Observe `env`.
    pub async fn observe(&self, env: &dyn Environment) -> PerceptionSnapshot {
        let location = env.location();

        let image = match tokio::time::timeout(self.timeout, env.screenshot()).await {
            Ok(Ok(bytes)) => Some(bytes),
            Ok(Err(e)) => {
                warn!(error = %e, "Screenshot failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Screenshot timed out");
                None
            }
        };

        let manifest = if self.include_manifest {
            self.manifest(env).await
        } else {
            Manifest::Omitted
        };

        debug!(
            location = %location,
            manifest_lines = manifest.entries().len(),
            has_image = image.is_some(),
            "Observed environment"
        );

        PerceptionSnapshot {
            image,
            manifest,
            location,
        }
    }

    async fn manifest(&self, env: &dyn Environment) -> Manifest {
        match tokio::time::timeout(self.timeout, env.accessibility_tree()).await {
            Ok(Ok(tree)) => manifest::build(tree.as_ref(), self.limit),
            Ok(Err(e)) => Manifest::Error {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
            Err(_) => Manifest::Error {
                kind: "TimeoutError".into(),
                message: format!(
                    "accessibility tree not available within {}ms",
                    self.timeout.as_millis()
                ),
            },
        }
    }
}

impl Default for Perceiver {
    fn default() -> Self {
        Self::new(MAX_MANIFEST_LINES)
    }
}
