//! Plate layouts per vehicle class and the OCR acceptance gate.

use super::corrector::{repair_digits, repair_letters};
use common::plates::{AggregatedPlateText, PlateOutcome, VehicleClass};

pub const DEFAULT_ACCEPTANCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_UNREADABLE_THRESHOLD: f32 = 0.2;

/// Which segment comes first on the plate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLayout {
    LettersFirst,
    DigitsFirst,
}

/// Fixed-width segments cut from plate text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segments {
    Split {
        letters: String,
        digits: String,
        layout: SegmentLayout,
    },
    /// Length does not fit any layout for the class
    Unrecognized,
}

fn slice(chars: &[char], from: usize, to: usize) -> String {
    chars[from..to].iter().collect()
}

/// Cut plate text into its letter and digit segments according to the vehicle class.
///
/// Cars, buses and trucks carry three letters then the digits (at least six characters).
/// Motorcycles carry either three digits then three letters, or two letters then five digits.
pub fn extract_segments(class: VehicleClass, text: &str) -> Segments {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    match class {
        VehicleClass::Car | VehicleClass::Bus | VehicleClass::Truck if n >= 6 => Segments::Split {
            letters: slice(&chars, 0, 3),
            digits: slice(&chars, 3, n),
            layout: SegmentLayout::LettersFirst,
        },
        VehicleClass::Motorcycle if n == 6 => Segments::Split {
            digits: slice(&chars, 0, 3),
            letters: slice(&chars, 3, 6),
            layout: SegmentLayout::DigitsFirst,
        },
        VehicleClass::Motorcycle if n == 7 => Segments::Split {
            letters: slice(&chars, 0, 2),
            digits: slice(&chars, 2, 7),
            layout: SegmentLayout::LettersFirst,
        },
        _ => Segments::Unrecognized,
    }
}

/// Normalize plate text: repair each segment and join with `-`, or pass the text through.
pub fn format_plate(class: VehicleClass, text: &str) -> PlateOutcome {
    match extract_segments(class, text) {
        Segments::Split {
            letters,
            digits,
            layout,
        } => {
            let letters = repair_letters(&letters);
            let digits = repair_digits(&digits);
            let formatted = match layout {
                SegmentLayout::LettersFirst => format!("{}-{}", letters, digits),
                SegmentLayout::DigitsFirst => format!("{}-{}", digits, letters),
            };
            PlateOutcome::Formatted(formatted)
        }
        Segments::Unrecognized => PlateOutcome::Unformatted(text.to_string()),
    }
}

/// Confidence gate in front of the formatter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceGate {
    pub acceptance_threshold: f32,
    pub unreadable_threshold: f32,
}

impl Default for AcceptanceGate {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            unreadable_threshold: DEFAULT_UNREADABLE_THRESHOLD,
        }
    }
}

impl AcceptanceGate {
    pub fn new(acceptance_threshold: f32, unreadable_threshold: f32) -> Self {
        Self {
            acceptance_threshold,
            unreadable_threshold,
        }
    }

    pub fn evaluate(&self, class: VehicleClass, reading: &AggregatedPlateText) -> PlateOutcome {
        if reading.confidence >= self.acceptance_threshold {
            format_plate(class, &reading.text)
        } else if reading.confidence <= self.unreadable_threshold {
            PlateOutcome::Unreadable
        } else {
            PlateOutcome::Withheld
        }
    }
}
