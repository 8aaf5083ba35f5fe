use crate::pipeline::aggregator::DEFAULT_MIN_AREA_RATIO;
use crate::pipeline::formatter::{DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_UNREADABLE_THRESHOLD};
use anyhow::{anyhow, Context, Result};
use common::validation::{validate_id, validate_path_components, validate_range, validate_unit_interval};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Thresholds applied between the collaborators and the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Aggregated OCR confidence at or above which plate text is formatted
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f32,

    /// Aggregated OCR confidence at or below which the plate is marked unreadable
    #[serde(default = "default_unreadable_threshold")]
    pub unreadable_threshold: f32,

    /// Minimum span area as a fraction of the plate crop area
    #[serde(default = "default_min_span_area_ratio")]
    pub min_span_area_ratio: f64,

    /// Plate detections scoring below this are not sent to OCR
    #[serde(default)]
    pub min_plate_score: f32,
}

fn default_acceptance_threshold() -> f32 {
    DEFAULT_ACCEPTANCE_THRESHOLD
}

fn default_unreadable_threshold() -> f32 {
    DEFAULT_UNREADABLE_THRESHOLD
}

fn default_min_span_area_ratio() -> f64 {
    DEFAULT_MIN_AREA_RATIO
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            unreadable_threshold: default_unreadable_threshold(),
            min_span_area_ratio: default_min_span_area_ratio(),
            min_plate_score: 0.0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_unit_interval(self.acceptance_threshold, "acceptance_threshold")?;
        validate_unit_interval(self.unreadable_threshold, "unreadable_threshold")?;
        validate_unit_interval(self.min_plate_score, "min_plate_score")?;
        validate_range(self.min_span_area_ratio, 0.0, 1.0, "min_span_area_ratio")?;

        if self.unreadable_threshold >= self.acceptance_threshold {
            return Err(anyhow!(
                "unreadable_threshold ({}) must be below acceptance_threshold ({})",
                self.unreadable_threshold,
                self.acceptance_threshold
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this service instance
    pub node_id: String,

    /// Results CSV written after every record
    pub results_path: PathBuf,

    /// Directory for vehicle crops
    pub vehicle_dir: PathBuf,

    /// Directory for plate crops
    pub plate_dir: PathBuf,

    /// Write crops when the frame carries an image
    pub save_crops: bool,

    /// JSON-lines file of frame submissions; when set the binary replays it instead of serving
    pub replay_file: Option<PathBuf>,

    pub pipeline: PipelineConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("LPR_SERVICE_ADDR").unwrap_or_else(|| "0.0.0.0:8090".to_string());

        let node_id = lookup("NODE_ID").unwrap_or_else(|| {
            format!(
                "lpr-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });
        validate_id(&node_id, "NODE_ID")?;

        let results_path = path_var(&lookup, "LPR_RESULTS_PATH", "./results/detection_results.csv")?;
        let vehicle_dir = path_var(&lookup, "LPR_VEHICLE_DIR", "./vehicles")?;
        let plate_dir = path_var(&lookup, "LPR_PLATE_DIR", "./licenses_plates_imgs_detected")?;
        let save_crops = parse_var(&lookup, "LPR_SAVE_CROPS", true)?;

        let replay_file = lookup("LPR_REPLAY_FILE")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let pipeline = PipelineConfig {
            acceptance_threshold: parse_var(
                &lookup,
                "LPR_ACCEPTANCE_THRESHOLD",
                default_acceptance_threshold(),
            )?,
            unreadable_threshold: parse_var(
                &lookup,
                "LPR_UNREADABLE_THRESHOLD",
                default_unreadable_threshold(),
            )?,
            min_span_area_ratio: parse_var(
                &lookup,
                "LPR_MIN_SPAN_AREA_RATIO",
                default_min_span_area_ratio(),
            )?,
            min_plate_score: parse_var(&lookup, "LPR_MIN_PLATE_SCORE", 0.0)?,
        };
        pipeline.validate().context("Invalid pipeline configuration")?;

        Ok(Self {
            bind_addr,
            node_id,
            results_path,
            vehicle_dir,
            plate_dir,
            save_crops,
            replay_file,
            pipeline,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

fn path_var<F>(lookup: &F, key: &str, default: &str) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    validate_path_components(Path::new(&raw), None, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("NODE_ID", "lpr-test")]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8090");
        assert_eq!(config.node_id, "lpr-test");
        assert_eq!(
            config.results_path,
            PathBuf::from("./results/detection_results.csv")
        );
        assert_eq!(config.vehicle_dir, PathBuf::from("./vehicles"));
        assert_eq!(
            config.plate_dir,
            PathBuf::from("./licenses_plates_imgs_detected")
        );
        assert!(config.save_crops);
        assert!(config.replay_file.is_none());
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_generated_node_id() {
        let config = config_from(&[]).unwrap();
        assert!(config.node_id.starts_with("lpr-service-"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LPR_SERVICE_ADDR", "127.0.0.1:9000"),
            ("LPR_RESULTS_PATH", "/data/out.csv"),
            ("LPR_SAVE_CROPS", "false"),
            ("LPR_REPLAY_FILE", "frames.jsonl"),
            ("LPR_ACCEPTANCE_THRESHOLD", "0.5"),
            ("LPR_UNREADABLE_THRESHOLD", "0.1"),
            ("LPR_MIN_SPAN_AREA_RATIO", "0.25"),
            ("LPR_MIN_PLATE_SCORE", "0.1"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.results_path, PathBuf::from("/data/out.csv"));
        assert!(!config.save_crops);
        assert_eq!(config.replay_file, Some(PathBuf::from("frames.jsonl")));
        assert_eq!(config.pipeline.acceptance_threshold, 0.5);
        assert_eq!(config.pipeline.unreadable_threshold, 0.1);
        assert_eq!(config.pipeline.min_span_area_ratio, 0.25);
        assert_eq!(config.pipeline.min_plate_score, 0.1);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("LPR_ACCEPTANCE_THRESHOLD", "high")]).is_err());
        assert!(config_from(&[("LPR_SAVE_CROPS", "maybe")]).is_err());
        assert!(config_from(&[("LPR_RESULTS_PATH", "../escape.csv")]).is_err());
        assert!(config_from(&[("NODE_ID", "node/1")]).is_err());
    }

    #[test]
    fn test_thresholds_must_not_overlap() {
        let overlapping = PipelineConfig {
            acceptance_threshold: 0.2,
            unreadable_threshold: 0.3,
            ..Default::default()
        };
        assert!(overlapping.validate().is_err());

        let equal = PipelineConfig {
            acceptance_threshold: 0.3,
            unreadable_threshold: 0.3,
            ..Default::default()
        };
        assert!(equal.validate().is_err());

        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_serde_defaults() {
        let config: PipelineConfig =
            serde_json::from_value(serde_json::json!({ "min_plate_score": 0.1 })).unwrap();
        assert_eq!(config.acceptance_threshold, DEFAULT_ACCEPTANCE_THRESHOLD);
        assert_eq!(config.unreadable_threshold, DEFAULT_UNREADABLE_THRESHOLD);
        assert_eq!(config.min_span_area_ratio, DEFAULT_MIN_AREA_RATIO);
        assert_eq!(config.min_plate_score, 0.1);
    }
}
