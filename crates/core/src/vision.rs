//! Vision-pointing collaborator.
//!
//! Given a screenshot and a natural-language description of one visual
//! target, a pointing service answers with normalized points. An empty
//! answer means "not found" and is not an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// A point in `[0, 1]²` relative to the image it was computed on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[async_trait]
pub trait PointingService: Send + Sync {
    /// A human-readable name (e.g., "moondream").
    fn name(&self) -> &str;

    /// Locate `prompt` on `image` (PNG bytes).
    async fn point(&self, image: &[u8], prompt: &str) -> Result<Vec<NormalizedPoint>, VisionError>;
}
