use crate::artifacts::ArtifactWriter;
use crate::collaborator::{CollaboratorSet, Frame};
use crate::error::ApiError;
use crate::pipeline::PlatePipeline;
use crate::store::RecordStore;
use anyhow::Result;
use common::plates::{FrameReport, FrameSubmission, PlateRecord};
use common::validation::{validate_id, validate_unit_interval};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Running totals exposed on `/v1/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub node_id: String,
    pub frames_processed: u64,
    pub records_written: u64,
    pub last_frame: Option<u64>,
}

#[derive(Clone)]
pub struct LprServiceState {
    inner: Arc<LprServiceStateInner>,
}

struct LprServiceStateInner {
    node_id: String,
    pipeline: PlatePipeline,
    collaborators: RwLock<CollaboratorSet>,
    /// Held for the whole frame, which keeps frames sequential
    store: Mutex<RecordStore>,
    artifacts: Option<ArtifactWriter>,
    stats: RwLock<ServiceStats>,
}

impl LprServiceState {
    pub fn new(
        node_id: String,
        pipeline: PlatePipeline,
        collaborators: CollaboratorSet,
        store: RecordStore,
        artifacts: Option<ArtifactWriter>,
    ) -> Self {
        let stats = ServiceStats {
            node_id: node_id.clone(),
            ..Default::default()
        };

        Self {
            inner: Arc::new(LprServiceStateInner {
                node_id,
                pipeline,
                collaborators: RwLock::new(collaborators),
                store: Mutex::new(store),
                artifacts,
                stats: RwLock::new(stats),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Validate and decode a submission, then run it through the pipeline
    pub async fn submit(&self, submission: FrameSubmission) -> Result<FrameReport, ApiError> {
        if let Some(source_id) = submission.source_id.as_deref() {
            validate_id(source_id, "source_id").map_err(|e| ApiError::bad_request(e.to_string()))?;
        }
        for span in submission.ocr.values().flatten() {
            validate_unit_interval(span.confidence, "ocr confidence")
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
        }
        let frame = Frame::from_submission(submission)
            .map_err(|e| ApiError::bad_request(format!("{:#}", e)))?;

        self.process(&frame).await
    }

    pub async fn process(&self, frame: &Frame) -> Result<FrameReport, ApiError> {
        let collaborators = self.inner.collaborators.read().await;
        let mut store = self.inner.store.lock().await;

        let report = self
            .inner
            .pipeline
            .process_frame(
                frame,
                &collaborators,
                &mut store,
                self.inner.artifacts.as_ref(),
            )
            .await?;
        drop(store);

        let mut stats = self.inner.stats.write().await;
        stats.frames_processed += 1;
        stats.records_written += report.records.len() as u64;
        stats.last_frame = Some(frame.index);

        Ok(report)
    }

    pub async fn records(&self) -> Vec<PlateRecord> {
        let store = self.inner.store.lock().await;
        store.records().to_vec()
    }

    pub async fn stats(&self) -> ServiceStats {
        self.inner.stats.read().await.clone()
    }

    pub async fn collaborator_health(&self) -> HashMap<String, bool> {
        let collaborators = self.inner.collaborators.read().await;
        collaborators.health_check_all().await
    }

    /// Wait for the in-flight frame, flush the store, and shut collaborators down
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down LPR service...");

        {
            let store = self.inner.store.lock().await;
            store.flush()?;
            info!(records = store.len(), path = %store.path().display(), "Record store flushed");
        }

        let mut collaborators = self.inner.collaborators.write().await;
        collaborators.shutdown_all().await?;

        info!("LPR service shutdown complete");
        Ok(())
    }
}
