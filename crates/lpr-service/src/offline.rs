//! Offline mode: feed a JSON-lines file of frame submissions through the pipeline.

use crate::error::ApiError;
use crate::state::LprServiceState;
use anyhow::{Context, Result};
use common::plates::FrameSubmission;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub frames: usize,
    pub rejected_lines: usize,
    pub records: usize,
}

/// Process every line of `path` in order.
///
/// Unparseable lines and undecodable frames are skipped; a persistence failure stops the run.
pub async fn run_replay_file(state: &LprServiceState, path: &Path) -> Result<ReplaySummary> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;

    let mut summary = ReplaySummary::default();
    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let submission: FrameSubmission = match serde_json::from_str(line) {
            Ok(submission) => submission,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable replay line");
                summary.rejected_lines += 1;
                continue;
            }
        };

        match state.submit(submission).await {
            Ok(report) => {
                summary.frames += 1;
                summary.records += report.records.len();
            }
            Err(ApiError::BadRequest(message)) => {
                warn!(line = line_no, error = %message, "Skipping invalid replay frame");
                summary.rejected_lines += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("Replay stopped at line {}", line_no));
            }
        }
    }

    info!(
        frames = summary.frames,
        records = summary.records,
        rejected_lines = summary.rejected_lines,
        "Replay finished"
    );
    Ok(summary)
}
