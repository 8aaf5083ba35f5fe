//! Collaborators that serve the tracker and OCR output recorded on each frame.
//!
//! Used by the HTTP harness, offline replay, and tests, where detection and OCR ran upstream.

use super::{Collaborator, Frame, ObjectTracker, OcrEngine, PlateCrop};
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::plates::{OcrSpan, RawDetection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackTarget {
    Vehicles,
    Plates,
}

pub struct ReplayTracker {
    target: TrackTarget,
    initialized: bool,
}

impl ReplayTracker {
    pub fn vehicles() -> Self {
        Self {
            target: TrackTarget::Vehicles,
            initialized: false,
        }
    }

    pub fn plates() -> Self {
        Self {
            target: TrackTarget::Plates,
            initialized: false,
        }
    }
}

#[async_trait]
impl Collaborator for ReplayTracker {
    fn id(&self) -> &'static str {
        match self.target {
            TrackTarget::Vehicles => "replay_vehicle_tracker",
            TrackTarget::Plates => "replay_plate_tracker",
        }
    }

    async fn init(&mut self, _config: serde_json::Value) -> Result<()> {
        self.initialized = true;
        tracing::debug!(collaborator = self.id(), "Replay tracker ready");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.initialized)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.initialized = false;
        Ok(())
    }
}

#[async_trait]
impl ObjectTracker for ReplayTracker {
    async fn track(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        if !self.initialized {
            bail!("{} is not initialized", self.id());
        }

        let detections = match self.target {
            TrackTarget::Vehicles => &frame.recorded.vehicles,
            TrackTarget::Plates => &frame.recorded.plates,
        };
        Ok(detections.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayOcrConfig {
    /// Drop recorded spans below this confidence, mimicking an engine-side cutoff
    #[serde(default)]
    pub min_confidence: f32,
}

#[derive(Default)]
pub struct ReplayOcr {
    config: ReplayOcrConfig,
    initialized: bool,
}

impl ReplayOcr {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Collaborator for ReplayOcr {
    fn id(&self) -> &'static str {
        "replay_ocr"
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }
        common::validation::validate_unit_interval(
            self.config.min_confidence,
            "replay_ocr.min_confidence",
        )?;
        self.initialized = true;
        tracing::debug!(
            min_confidence = self.config.min_confidence,
            "Replay OCR ready"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.initialized)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.initialized = false;
        Ok(())
    }
}

#[async_trait]
impl OcrEngine for ReplayOcr {
    /// A plate with no recorded spans reads as empty
    async fn read_text(&self, crop: &PlateCrop<'_>) -> Result<Vec<OcrSpan>> {
        if !self.initialized {
            bail!("replay_ocr is not initialized");
        }

        let spans = crop
            .frame
            .recorded
            .ocr
            .get(&crop.plate.track_id)
            .map(|spans| {
                spans
                    .iter()
                    .filter(|span| span.confidence >= self.config.min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(spans)
    }
}
