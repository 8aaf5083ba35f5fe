//! Merges OCR spans into a single plate reading.

use common::plates::{AggregatedPlateText, OcrSpan, Quad};

pub const DEFAULT_MIN_AREA_RATIO: f64 = 0.17;

/// Summed edge extents of a text quad, `(length, height)`.
///
/// `length = Σ(p1 - p0)` and `height = Σ(p2 - p1)`, summing both coordinates of each edge vector.
pub fn span_extent(quad: &Quad) -> (f64, f64) {
    let [p0, p1, p2, _] = quad;
    let length = (p1[0] - p0[0]) + (p1[1] - p0[1]);
    let height = (p2[0] - p1[0]) + (p2[1] - p1[1]);
    (length, height)
}

/// Span area relative to the crop, `None` when the crop has no area
pub fn area_ratio(span: &OcrSpan, crop_area: f64) -> Option<f64> {
    if crop_area.is_nan() || crop_area <= 0.0 {
        return None;
    }
    let (length, height) = span_extent(&span.quad);
    Some(length * height / crop_area)
}

#[derive(Debug, Clone)]
pub struct TextAggregator {
    min_area_ratio: f64,
}

impl Default for TextAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_AREA_RATIO)
    }
}

impl TextAggregator {
    pub fn new(min_area_ratio: f64) -> Self {
        Self { min_area_ratio }
    }

    /// Whether a span covers enough of the crop to count as plate text.
    ///
    /// Spans with a confidence outside `[0, 1]` are never accepted.
    pub fn accepts(&self, span: &OcrSpan, crop_area: f64) -> bool {
        span.has_valid_confidence()
            && area_ratio(span, crop_area).is_some_and(|ratio| ratio > self.min_area_ratio)
    }

    /// Join accepted span texts (upper-cased, space separated) and average their confidence.
    ///
    /// No accepted span yields an empty reading with confidence 0.
    pub fn aggregate(&self, spans: &[OcrSpan], crop_area: f64) -> AggregatedPlateText {
        let accepted: Vec<&OcrSpan> = spans
            .iter()
            .filter(|span| self.accepts(span, crop_area))
            .collect();

        if accepted.is_empty() {
            return AggregatedPlateText::empty();
        }

        let text = accepted
            .iter()
            .map(|span| span.text.to_uppercase())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence =
            accepted.iter().map(|span| span.confidence).sum::<f32>() / accepted.len() as f32;

        AggregatedPlateText { text, confidence }
    }
}
