//! Plate recognition contracts shared by the LPR service crates.
//!
//! This module defines the frame-scoped detection types produced by the tracking and
//! OCR collaborators, and the durable plate records written to the results store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marker written in place of plate text when OCR confidence is too low to trust
pub const UNREADABLE_MARKER: &str = "Unreadable License Plate";

/// Number of fields in a tracker tuple: `(x1, y1, x2, y2, track_id, score, class_id)`
pub const DETECTION_TUPLE_LEN: usize = 7;

// ============================================================================
// Geometry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid bounding box [{x1} {y1} {x2} {y2}]: expected finite x1 < x2 and y1 < y2")]
pub struct InvalidBoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Axis-aligned bounding box in pixel coordinates
///
/// Always satisfies `x1 < x2` and `y1 < y2` when built through [`BoundingBox::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, InvalidBoundingBox> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || x1 >= x2 || y1 >= y2 {
            return Err(InvalidBoundingBox { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Strict containment: `other` lies inside `self` without touching any edge.
    pub fn strictly_contains(&self, other: &BoundingBox) -> bool {
        other.x1 > self.x1 && other.x2 < self.x2 && other.y1 > self.y1 && other.y2 < self.y2
    }

    /// Integer pixel rectangle `(x, y, width, height)` selected by this box.
    ///
    /// Coordinates are truncated the way an image slice `img[y1..y2, x1..x2]` would be,
    /// with negative coordinates clamped to the image origin.
    pub fn pixel_rect(&self) -> (u32, u32, u32, u32) {
        let x1 = self.x1.max(0.0) as u32;
        let y1 = self.y1.max(0.0) as u32;
        let x2 = self.x2.max(0.0) as u32;
        let y2 = self.y2.max(0.0) as u32;
        (x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    /// Pixel area of the crop selected by this box
    pub fn crop_area(&self) -> f64 {
        let (_, _, width, height) = self.pixel_rect();
        f64::from(width) * f64::from(height)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {} {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

impl FromStr for BoundingBox {
    type Err = String;

    /// Parses the `[x1 y1 x2 y2]` rendering used in the results file
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| format!("bounding box '{}' is not bracketed", s))?;

        let coords = inner
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("bounding box '{}' has a bad coordinate: {}", s, e))?;

        match coords.as_slice() {
            [x1, y1, x2, y2] => BoundingBox::new(*x1, *y1, *x2, *y2).map_err(|e| e.to_string()),
            _ => Err(format!("bounding box '{}' needs 4 coordinates", s)),
        }
    }
}

// ============================================================================
// Vehicle classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("class id {0} is not a vehicle class")]
pub struct UnknownVehicleClass(pub i64);

/// Vehicle classes the pipeline reads plates for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    /// Map a COCO class id reported by the vehicle tracker
    pub fn from_class_id(class_id: i64) -> Result<Self, UnknownVehicleClass> {
        match class_id {
            2 => Ok(Self::Car),
            3 => Ok(Self::Motorcycle),
            5 => Ok(Self::Bus),
            6 => Ok(Self::Truck),
            other => Err(UnknownVehicleClass(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "Car",
            Self::Motorcycle => "Motorcycle",
            Self::Bus => "Bus",
            Self::Truck => "Truck",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Car" => Ok(Self::Car),
            "Motorcycle" => Ok(Self::Motorcycle),
            "Bus" => Ok(Self::Bus),
            "Truck" => Ok(Self::Truck),
            other => Err(format!("unknown vehicle class '{}'", other)),
        }
    }
}

// ============================================================================
// Detections
// ============================================================================

/// Raw tracker output tuple `(x1, y1, x2, y2, track_id, score, class_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDetection(pub Vec<f64>);

impl RawDetection {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, track_id: i64, score: f64, class_id: i64) -> Self {
        Self(vec![x1, y1, x2, y2, track_id as f64, score, class_id as f64])
    }
}

/// Why a tracker tuple could not be turned into a detection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("detection tuple has {0} fields, expected 7")]
    FieldCount(usize),

    #[error(transparent)]
    InvalidBox(#[from] InvalidBoundingBox),

    #[error("detection score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error(transparent)]
    UnknownClass(#[from] UnknownVehicleClass),
}

impl DetectionError {
    /// Short label used for skip metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownClass(_) => "non_vehicle_class",
            _ => "malformed_tuple",
        }
    }
}

struct TupleFields {
    bbox: BoundingBox,
    track_id: i64,
    score: f32,
    class_id: i64,
}

fn split_tuple(raw: &RawDetection) -> Result<TupleFields, DetectionError> {
    let [x1, y1, x2, y2, track_id, score, class_id] = <[f64; DETECTION_TUPLE_LEN]>::try_from(
        raw.0.as_slice(),
    )
    .map_err(|_| DetectionError::FieldCount(raw.0.len()))?;

    let bbox = BoundingBox::new(x1, y1, x2, y2)?;
    if !(0.0..=1.0).contains(&score) {
        return Err(DetectionError::ScoreOutOfRange(score));
    }

    Ok(TupleFields {
        bbox,
        track_id: track_id as i64,
        score: score as f32,
        class_id: class_id as i64,
    })
}

/// A tracked vehicle in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDetection {
    pub bbox: BoundingBox,
    pub track_id: i64,
    pub score: f32,
    pub class: VehicleClass,
}

impl VehicleDetection {
    pub fn from_raw(raw: &RawDetection) -> Result<Self, DetectionError> {
        let fields = split_tuple(raw)?;
        Ok(Self {
            bbox: fields.bbox,
            track_id: fields.track_id,
            score: fields.score,
            class: VehicleClass::from_class_id(fields.class_id)?,
        })
    }
}

/// A tracked license plate in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateDetection {
    pub bbox: BoundingBox,
    pub track_id: i64,
    pub score: f32,
}

impl PlateDetection {
    /// The plate detector has a single class, so the class id field is ignored.
    pub fn from_raw(raw: &RawDetection) -> Result<Self, DetectionError> {
        let fields = split_tuple(raw)?;
        Ok(Self {
            bbox: fields.bbox,
            track_id: fields.track_id,
            score: fields.score,
        })
    }
}

// ============================================================================
// OCR
// ============================================================================

/// Four corner points of a text region, clockwise from top-left
pub type Quad = [[f64; 2]; 4];

/// One text region read by the OCR engine from a plate crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSpan {
    pub quad: Quad,
    pub text: String,
    pub confidence: f32,
}

impl OcrSpan {
    pub fn new(quad: Quad, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            quad,
            text: text.into(),
            confidence,
        }
    }

    /// OCR confidences are probabilities; anything outside `[0, 1]` (or NaN) is corrupt
    pub fn has_valid_confidence(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

/// Merged text and mean confidence of the spans kept for one plate crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPlateText {
    pub text: String,
    pub confidence: f32,
}

impl AggregatedPlateText {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// What the pipeline concluded about a plate's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum PlateOutcome {
    /// Two segments joined by `-`
    Formatted(String),

    /// Length did not fit the vehicle class layout; raw aggregated text kept
    Unformatted(String),

    /// Confidence at or below the unreadable floor
    Unreadable,

    /// Confidence between the unreadable floor and the acceptance threshold
    Withheld,
}

impl PlateOutcome {
    /// Text written to the plate text column, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Formatted(text) | Self::Unformatted(text) => Some(text),
            Self::Unreadable => Some(UNREADABLE_MARKER),
            Self::Withheld => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Formatted(_) => "formatted",
            Self::Unformatted(_) => "unformatted",
            Self::Unreadable => "unreadable",
            Self::Withheld => "withheld",
        }
    }

    /// Rebuild an outcome from its stored status and text columns
    pub fn from_parts(status: &str, text: &str) -> Result<Self, String> {
        match status {
            "formatted" => Ok(Self::Formatted(text.to_string())),
            "unformatted" => Ok(Self::Unformatted(text.to_string())),
            "unreadable" => Ok(Self::Unreadable),
            "withheld" => Ok(Self::Withheld),
            other => Err(format!("unknown plate status '{}'", other)),
        }
    }
}

/// One vehicle/plate pairing read in a frame, before the store assigns it a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateObservation {
    pub frame: u64,
    pub vehicle: VehicleDetection,
    pub plate: PlateDetection,
    pub raw_text: String,
    pub outcome: PlateOutcome,
    pub ocr_confidence: f32,
    /// File name of the vehicle crop, `"{class}{track_id}_{counter}.jpg"`
    pub vehicle_image: String,
}

/// A persisted row of the results store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateRecord {
    /// Monotonically increasing sequence number assigned by the store
    pub key: u64,

    /// Unix seconds at which the record was appended
    pub recorded_at: u64,

    #[serde(flatten)]
    pub observation: PlateObservation,
}

// ============================================================================
// Frame submission
// ============================================================================

/// Pre-recorded collaborator output for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameSubmission {
    /// Frame sequence number
    pub frame: u64,

    /// Source camera or file identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Frame image (base64 encoded JPEG/PNG), used for side-artifact crops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Vehicle tracker tuples
    #[serde(default)]
    pub vehicles: Vec<RawDetection>,

    /// Plate tracker tuples
    #[serde(default)]
    pub plates: Vec<RawDetection>,

    /// OCR spans keyed by plate track id
    #[serde(default)]
    pub ocr: HashMap<i64, Vec<OcrSpan>>,
}

/// Summary of processing one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: u64,
    pub vehicles: usize,
    pub plates: usize,
    pub matched: usize,
    pub skipped: usize,
    pub records: Vec<PlateRecord>,
    pub processing_time_ms: u64,
}
