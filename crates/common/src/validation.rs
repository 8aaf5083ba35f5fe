//! Input validation utilities for configuration and submitted frames
//!
//! This module provides safe validation for external inputs to prevent:
//! - Panic-induced service crashes
//! - Unbounded strings in identifiers and paths
//! - Path traversal when building artifact paths
//! - Out-of-range thresholds silently disabling pipeline gates

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for resource IDs (source_id, node_id, etc.)
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for file paths
pub const MAX_PATH_LENGTH: usize = 4096;

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Get current Unix timestamp in seconds, safely handling clock errors
///
/// Logs a warning and returns 0 when the clock is before the epoch
pub fn safe_unix_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate resource ID (source_id, node_id, etc.)
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    // IDs end up in file names
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

// ============================================================================
// Path Validation
// ============================================================================

/// Validate file path without requiring it to exist (for new files)
pub fn validate_path_components(
    path: &Path,
    base_dir: Option<&Path>,
    field_name: &str,
) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("{} contains invalid UTF-8", field_name))?;

    validate_non_empty(path_str, field_name)?;
    validate_length(path_str, MAX_PATH_LENGTH, field_name)?;

    for component in path.components() {
        if component.as_os_str() == ".." {
            return Err(anyhow!(
                "{} contains '..' component (path traversal attempt)",
                field_name
            ));
        }
    }

    match base_dir {
        Some(base) => Ok(base.join(path)),
        None => Ok(path.to_path_buf()),
    }
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    // Written so NaN fails both comparisons and is rejected
    if !(value >= min && value <= max) {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

/// Validate a probability-like threshold in `[0, 1]`
pub fn validate_unit_interval(value: f32, field_name: &str) -> Result<()> {
    validate_range(value, 0.0, 1.0, field_name)
}

// ============================================================================
// Tests
// ============================================================================
