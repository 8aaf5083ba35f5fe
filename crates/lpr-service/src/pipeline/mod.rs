//! Per-frame plate pipeline: track, associate, read, normalize, persist.

pub mod aggregator;
pub mod corrector;
pub mod formatter;
pub mod matcher;

use crate::artifacts::ArtifactWriter;
use crate::collaborator::{CollaboratorSet, Frame, PlateCrop};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::store::RecordStore;
use aggregator::TextAggregator;
use common::plates::{
    AggregatedPlateText, DetectionError, FrameReport, OcrSpan, PlateDetection, PlateObservation,
    PlateOutcome, RawDetection, VehicleClass, VehicleDetection,
};
use formatter::AcceptanceGate;
use matcher::{match_plates, PlatePairing};
use std::future::Future;
use std::time::Instant;
use telemetry::metrics::{
    LPR_COLLABORATOR_FAILURES, LPR_COLLABORATOR_LATENCY, LPR_DETECTIONS_SKIPPED,
    LPR_FRAMES_PROCESSED, LPR_FRAME_PROCESSING_TIME, LPR_OCR_CONFIDENCE, LPR_RECORDS_WRITTEN,
};
use tracing::{debug, instrument, warn};

/// How a frame left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameStatus {
    Completed,
    NoVehicles,
    TrackerFailed,
}

impl FrameStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoVehicles => "no_vehicles",
            Self::TrackerFailed => "tracker_failed",
        }
    }
}

pub struct PlatePipeline {
    config: PipelineConfig,
    aggregator: TextAggregator,
    gate: AcceptanceGate,
}

impl PlatePipeline {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: TextAggregator::new(config.min_span_area_ratio),
            gate: AcceptanceGate::new(config.acceptance_threshold, config.unreadable_threshold),
            config,
        })
    }

    /// Aggregate OCR spans for one crop and decide the plate outcome for the vehicle class
    pub fn read_plate(
        &self,
        class: VehicleClass,
        spans: &[OcrSpan],
        crop_area: f64,
    ) -> (AggregatedPlateText, PlateOutcome) {
        let reading = self.aggregator.aggregate(spans, crop_area);
        let outcome = self.gate.evaluate(class, &reading);
        (reading, outcome)
    }

    /// Run one frame through the collaborators and append a record per readable pairing.
    ///
    /// Collaborator failures and malformed detections only shrink the report; a store failure
    /// aborts the frame.
    #[instrument(
        skip_all,
        fields(frame = frame.index, source = frame.source_id.as_deref().unwrap_or("-"))
    )]
    pub async fn process_frame(
        &self,
        frame: &Frame,
        collaborators: &CollaboratorSet,
        store: &mut RecordStore,
        artifacts: Option<&ArtifactWriter>,
    ) -> Result<FrameReport, PipelineError> {
        let _timer = LPR_FRAME_PROCESSING_TIME.start_timer();
        let started = Instant::now();
        let mut report = FrameReport {
            frame: frame.index,
            ..Default::default()
        };

        let result = self
            .run(frame, collaborators, store, artifacts, &mut report)
            .await;
        report.processing_time_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(status) => {
                LPR_FRAMES_PROCESSED
                    .with_label_values(&[status.as_str()])
                    .inc();
                debug!(
                    status = status.as_str(),
                    vehicles = report.vehicles,
                    plates = report.plates,
                    records = report.records.len(),
                    elapsed_ms = report.processing_time_ms,
                    "Frame processed"
                );
                Ok(report)
            }
            Err(e) => {
                LPR_FRAMES_PROCESSED
                    .with_label_values(&["persistence_failed"])
                    .inc();
                tracing::error!(error = %e, "Frame aborted");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        frame: &Frame,
        collaborators: &CollaboratorSet,
        store: &mut RecordStore,
        artifacts: Option<&ArtifactWriter>,
        report: &mut FrameReport,
    ) -> Result<FrameStatus, PipelineError> {
        let tracker = &collaborators.vehicle_tracker;
        let raw_vehicles = match observed(tracker.id(), tracker.track(frame)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(collaborator = tracker.id(), error = %e, "Vehicle tracking failed");
                return Ok(FrameStatus::TrackerFailed);
            }
        };
        let (vehicles, skipped) = parse_detections(&raw_vehicles, "vehicle", VehicleDetection::from_raw);
        report.vehicles = vehicles.len();
        report.skipped += skipped;

        if vehicles.is_empty() {
            return Ok(FrameStatus::NoVehicles);
        }

        let tracker = &collaborators.plate_tracker;
        let raw_plates = match observed(tracker.id(), tracker.track(frame)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(collaborator = tracker.id(), error = %e, "Plate tracking failed");
                return Ok(FrameStatus::TrackerFailed);
            }
        };
        let (plates, skipped) = parse_detections(&raw_plates, "plate", PlateDetection::from_raw);
        report.plates = plates.len();
        report.skipped += skipped;

        let pairs = match_plates(&vehicles, &plates);
        let unmatched = plates.len() - pairs.len();
        if unmatched > 0 {
            LPR_DETECTIONS_SKIPPED
                .with_label_values(&["unmatched_plate"])
                .inc_by(unmatched as u64);
        }
        report.matched = pairs.len();
        report.skipped += unmatched;

        let mut counter = 0usize;
        for pairing in &pairs {
            if pairing.plate.score < self.config.min_plate_score {
                debug!(
                    plate_track_id = pairing.plate.track_id,
                    score = pairing.plate.score,
                    "Plate score below OCR gate"
                );
                LPR_DETECTIONS_SKIPPED
                    .with_label_values(&["low_plate_score"])
                    .inc();
                report.skipped += 1;
                continue;
            }

            let observation = self
                .observe(frame, collaborators, pairing, counter, artifacts)
                .await;
            let outcome = observation.outcome.status();
            let record = store.append(observation)?;

            LPR_RECORDS_WRITTEN.with_label_values(&[outcome]).inc();
            report.records.push(record);
            counter += 1;
        }

        Ok(FrameStatus::Completed)
    }

    /// OCR one pairing and build its observation; never fails
    async fn observe(
        &self,
        frame: &Frame,
        collaborators: &CollaboratorSet,
        pairing: &PlatePairing,
        counter: usize,
        artifacts: Option<&ArtifactWriter>,
    ) -> PlateObservation {
        let crop = PlateCrop::new(frame, &pairing.plate);
        let ocr = &collaborators.ocr;
        let spans = observed(ocr.id(), ocr.read_text(&crop))
            .await
            .unwrap_or_else(|e| {
                warn!(
                    plate_track_id = pairing.plate.track_id,
                    error = %e,
                    "OCR failed, treating plate as unread"
                );
                Vec::new()
            });

        let (reading, outcome) = self.read_plate(pairing.vehicle.class, &spans, crop.area);
        LPR_OCR_CONFIDENCE.observe(f64::from(reading.confidence));

        let vehicle_image = format!(
            "{}{}_{}.jpg",
            pairing.vehicle.class, pairing.vehicle.track_id, counter
        );

        if let (Some(writer), Some(image)) = (artifacts, frame.image.as_ref()) {
            let plate_image = format!("{}_{}.jpg", pairing.plate.track_id, counter);
            let saved = writer
                .save_vehicle(image, &pairing.vehicle.bbox, &vehicle_image)
                .and_then(|_| writer.save_plate(image, &pairing.plate.bbox, &plate_image));
            if let Err(e) = saved {
                warn!(error = %e, vehicle_image = %vehicle_image, "Failed to save crops");
            }
        }

        debug!(
            vehicle_track_id = pairing.vehicle.track_id,
            plate_track_id = pairing.plate.track_id,
            text = %reading.text,
            confidence = reading.confidence,
            status = outcome.status(),
            "Plate read"
        );

        PlateObservation {
            frame: frame.index,
            vehicle: pairing.vehicle.clone(),
            plate: pairing.plate.clone(),
            raw_text: reading.text,
            outcome,
            ocr_confidence: reading.confidence,
            vehicle_image,
        }
    }
}

/// Await a collaborator call, recording latency and failures under its id
async fn observed<T, F>(collaborator: &'static str, call: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let timer = LPR_COLLABORATOR_LATENCY
        .with_label_values(&[collaborator])
        .start_timer();
    let result = call.await;
    timer.observe_duration();

    if result.is_err() {
        LPR_COLLABORATOR_FAILURES
            .with_label_values(&[collaborator])
            .inc();
    }
    result
}

/// Parse tracker tuples, dropping (and counting) the ones that do not describe a detection
fn parse_detections<T>(
    raw: &[RawDetection],
    kind: &'static str,
    parse: impl Fn(&RawDetection) -> Result<T, DetectionError>,
) -> (Vec<T>, usize) {
    let mut parsed = Vec::with_capacity(raw.len());
    let mut skipped = 0;

    for tuple in raw {
        match parse(tuple) {
            Ok(detection) => parsed.push(detection),
            Err(e) => {
                debug!(kind, reason = e.reason(), error = %e, "Skipping detection");
                LPR_DETECTIONS_SKIPPED
                    .with_label_values(&[e.reason()])
                    .inc();
                skipped += 1;
            }
        }
    }

    (parsed, skipped)
}
