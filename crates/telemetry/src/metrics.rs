use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Pipeline Metrics ====
    pub static ref LPR_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_frames_processed_total",
                "Total number of frames run through the plate pipeline",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_DETECTIONS_SKIPPED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_detections_skipped_total",
                "Detections dropped before OCR",
            ),
            &["reason"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_RECORDS_WRITTEN: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_records_written_total",
                "Plate records appended to the results store",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_OCR_CONFIDENCE: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "lpr_ocr_confidence",
                "Aggregated OCR confidence per plate crop",
            )
            .buckets(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_FRAME_PROCESSING_TIME: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "lpr_frame_processing_seconds",
                "Time spent processing one frame, collaborators included",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_STORE_FLUSH_TIME: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "lpr_store_flush_seconds",
                "Time spent rewriting the results file",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_STORE_RECORDS: IntGauge = {
        let metric = IntGauge::new("lpr_store_records", "Rows currently in the results store")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_COLLABORATOR_FAILURES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_collaborator_failures_total",
                "Failed calls into tracker or OCR collaborators",
            ),
            &["collaborator"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_COLLABORATOR_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "lpr_collaborator_latency_seconds",
                "Latency of tracker and OCR calls",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["collaborator"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_accessible() {
        LPR_STORE_RECORDS.set(5);
        assert_eq!(LPR_STORE_RECORDS.get(), 5);

        let before = LPR_DETECTIONS_SKIPPED
            .with_label_values(&["metrics_test"])
            .get();
        LPR_DETECTIONS_SKIPPED
            .with_label_values(&["metrics_test"])
            .inc();
        assert_eq!(
            LPR_DETECTIONS_SKIPPED
                .with_label_values(&["metrics_test"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_encode_metrics_succeeds() {
        LPR_OCR_CONFIDENCE.observe(0.5);
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("lpr_ocr_confidence"));
    }
}
