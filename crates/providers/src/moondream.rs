//! Moondream-style pointing client.
//!
//! `POST {api_url}/point` with the screenshot as a data URL and the target
//! description as `object`; the reply lists normalized points. An empty
//! list is a valid "not found" answer, not an error.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uipilot_config::VisionConfig;
use uipilot_core::{NormalizedPoint, PointingService, VisionError};

pub struct MoondreamPointer {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl MoondreamPointer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// `None` when no key is configured; the vision tools then report
    /// `VisionError::NotConfigured` when used.
    pub fn from_config(config: &VisionConfig) -> Result<Option<Self>, VisionError> {
        match &config.api_key {
            Some(key) if !key.trim().is_empty() => Self::new(
                &config.api_url,
                key,
                Duration::from_millis(config.timeout_ms),
            )
            .map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Serialize)]
struct PointRequest<'a> {
    image_url: String,
    object: &'a str,
    stream: bool,
}

impl<'a> PointRequest<'a> {
    fn new(image: &[u8], object: &'a str) -> Self {
        Self {
            image_url: format!("data:image/png;base64,{}", STANDARD.encode(image)),
            object,
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    #[serde(default)]
    points: Vec<NormalizedPoint>,
}

fn parse_points(body: &str) -> Result<Vec<NormalizedPoint>, VisionError> {
    let response: PointResponse = serde_json::from_str(body)
        .map_err(|e| VisionError::InvalidResponse(format!("{e}: {body}")))?;
    if let Some(bad) = response
        .points
        .iter()
        .find(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        return Err(VisionError::InvalidResponse(format!(
            "non-finite point ({}, {})",
            bad.x, bad.y
        )));
    }
    Ok(response.points)
}

#[async_trait]
impl PointingService for MoondreamPointer {
    fn name(&self) -> &str {
        "moondream"
    }

    async fn point(&self, image: &[u8], prompt: &str) -> Result<Vec<NormalizedPoint>, VisionError> {
        let url = format!("{}/point", self.api_url);
        debug!(prompt, bytes = image.len(), "Sending point request");

        let response = self
            .client
            .post(&url)
            .header("X-Moondream-Auth", &self.api_key)
            .json(&PointRequest::new(image, prompt))
            .send()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "Pointing service returned error");
            return Err(VisionError::Request(format!("status {}: {body}", status.as_u16())));
        }

        let points = parse_points(&body)?;
        debug!(count = points.len(), "Pointing finished");
        Ok(points)
    }
}
