pub mod replay;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use common::plates::{FrameSubmission, OcrSpan, PlateDetection, RawDetection};
use image::DynamicImage;
use std::collections::HashMap;

/// Collaborator output recorded upstream of this service for one frame
#[derive(Debug, Clone, Default)]
pub struct RecordedOutput {
    pub vehicles: Vec<RawDetection>,
    pub plates: Vec<RawDetection>,
    /// OCR spans keyed by plate track id
    pub ocr: HashMap<i64, Vec<OcrSpan>>,
}

/// One video frame handed to the pipeline
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub index: u64,
    /// Camera or stream the frame came from, carried on the pipeline span
    pub source_id: Option<String>,
    /// Decoded frame image, used to cut crops when present
    pub image: Option<DynamicImage>,
    pub recorded: RecordedOutput,
}

impl Frame {
    /// Build a frame from an API or replay submission, decoding the base64 image if any
    pub fn from_submission(submission: FrameSubmission) -> Result<Self> {
        let image = submission
            .image
            .as_deref()
            .map(|data| -> Result<DynamicImage> {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .context("Failed to decode base64 frame image")?;
                image::load_from_memory(&bytes).context("Failed to load frame image")
            })
            .transpose()?;

        Ok(Self {
            index: submission.frame,
            source_id: submission.source_id,
            image,
            recorded: RecordedOutput {
                vehicles: submission.vehicles,
                plates: submission.plates,
                ocr: submission.ocr,
            },
        })
    }
}

/// The plate region of a frame handed to the OCR engine
#[derive(Debug, Clone, Copy)]
pub struct PlateCrop<'a> {
    pub frame: &'a Frame,
    pub plate: &'a PlateDetection,
    /// Pixel area of the crop, the denominator of the span area filter
    pub area: f64,
}

impl<'a> PlateCrop<'a> {
    pub fn new(frame: &'a Frame, plate: &'a PlateDetection) -> Self {
        Self {
            frame,
            plate,
            area: plate.bbox.crop_area(),
        }
    }
}

/// Lifecycle shared by every external model the pipeline calls into
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Unique identifier (e.g., "replay_ocr"), used as the metrics label
    fn id(&self) -> &'static str;

    /// Load models or connect, with collaborator-specific configuration
    async fn init(&mut self, config: serde_json::Value) -> Result<()>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Multi-object tracker reporting `(x1, y1, x2, y2, track_id, score, class_id)` tuples
#[async_trait]
pub trait ObjectTracker: Collaborator {
    async fn track(&self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// Text reader for plate crops
#[async_trait]
pub trait OcrEngine: Collaborator {
    async fn read_text(&self, crop: &PlateCrop<'_>) -> Result<Vec<OcrSpan>>;
}

/// The three collaborators one pipeline needs
pub struct CollaboratorSet {
    pub vehicle_tracker: Box<dyn ObjectTracker>,
    pub plate_tracker: Box<dyn ObjectTracker>,
    pub ocr: Box<dyn OcrEngine>,
}

impl CollaboratorSet {
    pub fn new(
        vehicle_tracker: Box<dyn ObjectTracker>,
        plate_tracker: Box<dyn ObjectTracker>,
        ocr: Box<dyn OcrEngine>,
    ) -> Self {
        Self {
            vehicle_tracker,
            plate_tracker,
            ocr,
        }
    }

    /// Collaborators serving output recorded on each frame
    pub fn replay() -> Self {
        Self::new(
            Box::new(replay::ReplayTracker::vehicles()),
            Box::new(replay::ReplayTracker::plates()),
            Box::new(replay::ReplayOcr::new()),
        )
    }

    /// Initialize every collaborator with `config[id]` (null when absent)
    pub async fn init_all(&mut self, config: &serde_json::Value) -> Result<()> {
        let section = |id: &str| config.get(id).cloned().unwrap_or(serde_json::Value::Null);

        let id = self.vehicle_tracker.id();
        self.vehicle_tracker
            .init(section(id))
            .await
            .with_context(|| format!("Failed to initialize collaborator '{}'", id))?;

        let id = self.plate_tracker.id();
        self.plate_tracker
            .init(section(id))
            .await
            .with_context(|| format!("Failed to initialize collaborator '{}'", id))?;

        let id = self.ocr.id();
        self.ocr
            .init(section(id))
            .await
            .with_context(|| format!("Failed to initialize collaborator '{}'", id))?;

        tracing::info!("Initialized pipeline collaborators");
        Ok(())
    }

    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let checks = [
            (
                self.vehicle_tracker.id(),
                self.vehicle_tracker.health_check().await,
            ),
            (self.plate_tracker.id(), self.plate_tracker.health_check().await),
            (self.ocr.id(), self.ocr.health_check().await),
        ];

        checks
            .into_iter()
            .map(|(id, result)| (id.to_string(), result.unwrap_or(false)))
            .collect()
    }

    /// Shut every collaborator down, reporting the first failure after trying all of them
    pub async fn shutdown_all(&mut self) -> Result<()> {
        let results = [
            (self.vehicle_tracker.id(), self.vehicle_tracker.shutdown().await),
            (self.plate_tracker.id(), self.plate_tracker.shutdown().await),
            (self.ocr.id(), self.ocr.shutdown().await),
        ];

        let mut first_error = None;
        for (id, result) in results {
            if let Err(e) = result {
                tracing::error!(collaborator = id, error = %e, "Collaborator shutdown failed");
                first_error.get_or_insert(e.context(format!("Failed to shut down '{}'", id)));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
