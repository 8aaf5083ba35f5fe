//! License plate association and normalization service.
//!
//! Tracked vehicles and plates from external detectors are paired by box containment, the plate
//! crops' OCR spans are merged and normalized per vehicle class, and every pairing is persisted
//! to a CSV results table. See the `lpr-service` binary for the HTTP and offline replay front ends.

pub use common::plates;
pub use lpr_service::*;
