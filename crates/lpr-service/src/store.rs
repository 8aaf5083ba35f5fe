//! Durable CSV table of plate records.
//!
//! The whole table is rewritten after every append: rows go to a sibling temporary file which is
//! synced and renamed over the target, so a reader sees either the previous or the new table.

use crate::error::StoreError;
use common::plates::{
    PlateDetection, PlateObservation, PlateOutcome, PlateRecord, VehicleDetection,
};
use common::validation::safe_unix_timestamp;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use telemetry::metrics::{LPR_STORE_FLUSH_TIME, LPR_STORE_RECORDS};

/// Column order of the results file
pub const CSV_HEADER: [&str; 15] = [
    "key",
    "recorded_at",
    "frame",
    "vehicle_track_id",
    "vehicle_bbox",
    "vehicle_score",
    "vehicle_img",
    "vehicle_class",
    "plate_track_id",
    "plate_bbox",
    "plate_text",
    "plate_status",
    "raw_text",
    "plate_bbox_score",
    "plate_text_score",
];

/// One CSV line; field order must follow [`CSV_HEADER`]
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    key: u64,
    recorded_at: u64,
    frame: u64,
    vehicle_track_id: i64,
    vehicle_bbox: String,
    vehicle_score: f32,
    vehicle_img: String,
    vehicle_class: String,
    plate_track_id: i64,
    plate_bbox: String,
    plate_text: String,
    plate_status: String,
    raw_text: String,
    plate_bbox_score: f32,
    plate_text_score: f32,
}

impl From<&PlateRecord> for CsvRow {
    fn from(record: &PlateRecord) -> Self {
        let obs = &record.observation;
        Self {
            key: record.key,
            recorded_at: record.recorded_at,
            frame: obs.frame,
            vehicle_track_id: obs.vehicle.track_id,
            vehicle_bbox: obs.vehicle.bbox.to_string(),
            vehicle_score: obs.vehicle.score,
            vehicle_img: obs.vehicle_image.clone(),
            vehicle_class: obs.vehicle.class.to_string(),
            plate_track_id: obs.plate.track_id,
            plate_bbox: obs.plate.bbox.to_string(),
            plate_text: obs.outcome.text().unwrap_or_default().to_string(),
            plate_status: obs.outcome.status().to_string(),
            raw_text: obs.raw_text.clone(),
            plate_bbox_score: obs.plate.score,
            plate_text_score: obs.ocr_confidence,
        }
    }
}

impl TryFrom<CsvRow> for PlateRecord {
    type Error = String;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        Ok(PlateRecord {
            key: row.key,
            recorded_at: row.recorded_at,
            observation: PlateObservation {
                frame: row.frame,
                vehicle: VehicleDetection {
                    bbox: row.vehicle_bbox.parse()?,
                    track_id: row.vehicle_track_id,
                    score: row.vehicle_score,
                    class: row.vehicle_class.parse()?,
                },
                plate: PlateDetection {
                    bbox: row.plate_bbox.parse()?,
                    track_id: row.plate_track_id,
                    score: row.plate_bbox_score,
                },
                raw_text: row.raw_text,
                outcome: PlateOutcome::from_parts(&row.plate_status, &row.plate_text)?,
                ocr_confidence: row.plate_text_score,
                vehicle_image: row.vehicle_img,
            },
        })
    }
}

/// In-memory table mirrored to a CSV file
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: Vec<PlateRecord>,
    next_key: u64,
}

impl RecordStore {
    /// Open the store at `path`, loading rows from an existing file so keys keep increasing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io("create", parent, e))?;
        }

        let records = if path.exists() {
            load_records(&path)?
        } else {
            Vec::new()
        };
        let next_key = records.iter().map(|r| r.key + 1).max().unwrap_or(0);

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            next_key,
            "Opened record store"
        );
        LPR_STORE_RECORDS.set(records.len() as i64);

        Ok(Self {
            path,
            records,
            next_key,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[PlateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Key the observation, persist the table, and return the stored record.
    ///
    /// On failure the record is not kept in memory either.
    pub fn append(&mut self, observation: PlateObservation) -> Result<PlateRecord, StoreError> {
        let record = PlateRecord {
            key: self.next_key,
            recorded_at: safe_unix_timestamp(),
            observation,
        };
        self.records.push(record.clone());

        if let Err(e) = self.flush() {
            self.records.pop();
            return Err(e);
        }

        self.next_key += 1;
        LPR_STORE_RECORDS.set(self.records.len() as i64);
        Ok(record)
    }

    /// Rewrite the results file from the in-memory table
    pub fn flush(&self) -> Result<(), StoreError> {
        let _timer = LPR_STORE_FLUSH_TIME.start_timer();
        let tmp_path = self.temp_path();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp_path)
            .map_err(|e| StoreError::csv(&tmp_path, e))?;

        writer
            .write_record(CSV_HEADER)
            .map_err(|e| StoreError::csv(&tmp_path, e))?;
        for record in &self.records {
            writer
                .serialize(CsvRow::from(record))
                .map_err(|e| StoreError::csv(&tmp_path, e))?;
        }

        writer
            .flush()
            .map_err(|e| StoreError::io("write", &tmp_path, e))?;
        let file = writer.into_inner().map_err(|e| {
            StoreError::io(
                "write",
                &tmp_path,
                std::io::Error::new(e.error().kind(), e.to_string()),
            )
        })?;
        file.sync_all()
            .map_err(|e| StoreError::io("sync", &tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io("rename", &self.path, e))?;

        tracing::debug!(
            path = %self.path.display(),
            records = self.records.len(),
            "Flushed record store"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "records.csv".to_string());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }
}

fn load_records(path: &Path) -> Result<Vec<PlateRecord>, StoreError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;

    let mut records = Vec::new();
    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| StoreError::csv(path, e))?;
        let record = PlateRecord::try_from(row).map_err(|message| StoreError::InvalidRow {
            path: path.to_path_buf(),
            row: index + 1,
            message,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::plates::{BoundingBox, VehicleClass, UNREADABLE_MARKER};
    use tempfile::TempDir;

    fn observation(frame: u64, plate_track_id: i64, outcome: PlateOutcome) -> PlateObservation {
        PlateObservation {
            frame,
            vehicle: VehicleDetection {
                bbox: BoundingBox::new(0.0, 0.0, 100.0, 100.0).unwrap(),
                track_id: 1,
                score: 0.9,
                class: VehicleClass::Car,
            },
            plate: PlateDetection {
                bbox: BoundingBox::new(10.0, 10.0, 40.0, 30.0).unwrap(),
                track_id: plate_track_id,
                score: 0.75,
            },
            raw_text: "ABC123".to_string(),
            outcome,
            ocr_confidence: 0.9,
            vehicle_image: format!("Car1_{}.jpg", frame),
        }
    }

    #[test]
    fn test_append_assigns_increasing_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path().join("results.csv")).unwrap();
        assert!(store.is_empty());

        let first = store
            .append(observation(0, 9, PlateOutcome::Formatted("ABC-123".to_string())))
            .unwrap();
        let second = store
            .append(observation(0, 9, PlateOutcome::Unreadable))
            .unwrap();
        assert_eq!(first.key, 0);
        assert_eq!(second.key, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_flush_writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let mut store = RecordStore::open(&path).unwrap();
        store
            .append(observation(3, 9, PlateOutcome::Formatted("ABC-123".to_string())))
            .unwrap();
        store.append(observation(4, 9, PlateOutcome::Unreadable)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert!(lines[1].starts_with("0,"));
        assert!(lines[1].contains(",[0 0 100 100],"));
        assert!(lines[1].contains(",ABC-123,formatted,"));
        assert!(lines[2].contains(UNREADABLE_MARKER));
        assert!(!dir.path().join(".results.csv.tmp").exists());
    }

    #[test]
    fn test_empty_flush_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.csv");
        let store = RecordStore::open(&path).unwrap();
        store.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim_end(), CSV_HEADER.join(","));
    }

    #[test]
    fn test_reopen_continues_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        {
            let mut store = RecordStore::open(&path).unwrap();
            store.append(observation(0, 9, PlateOutcome::Withheld)).unwrap();
            store
                .append(observation(1, 9, PlateOutcome::Unformatted("AB 12".to_string())))
                .unwrap();
        }

        let mut reopened = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.records()[0].observation.outcome, PlateOutcome::Withheld);
        assert_eq!(
            reopened.records()[1].observation.outcome,
            PlateOutcome::Unformatted("AB 12".to_string())
        );

        let next = reopened
            .append(observation(2, 9, PlateOutcome::Unreadable))
            .unwrap();
        assert_eq!(next.key, 2);
    }

    #[test]
    fn test_reopen_rejects_corrupt_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let mut contents = CSV_HEADER.join(",");
        contents.push_str("\n0,0,0,1,[0 0 100 100],0.9,Car1_0.jpg,Boat,9,[10 10 40 30],,withheld,,0.7,0.1\n");
        fs::write(&path, contents).unwrap();

        let err = RecordStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { row: 1, .. }));
    }

    #[test]
    fn test_failed_flush_keeps_memory_consistent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let mut store = RecordStore::open(&path).unwrap();
        store.append(observation(0, 9, PlateOutcome::Withheld)).unwrap();

        // a directory in place of the temp file makes the write fail
        fs::create_dir(dir.path().join(".results.csv.tmp")).unwrap();
        assert!(store.append(observation(1, 9, PlateOutcome::Withheld)).is_err());
        assert_eq!(store.len(), 1);

        fs::remove_dir(dir.path().join(".results.csv.tmp")).unwrap();
        let record = store.append(observation(2, 9, PlateOutcome::Withheld)).unwrap();
        assert_eq!(record.key, 1);
    }
}
