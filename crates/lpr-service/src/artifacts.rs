use anyhow::{Context, Result};
use common::plates::BoundingBox;
use common::validation::validate_path_components;
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes vehicle and plate crops next to the results file
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    vehicle_dir: PathBuf,
    plate_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(vehicle_dir: impl Into<PathBuf>, plate_dir: impl Into<PathBuf>) -> Result<Self> {
        let vehicle_dir = vehicle_dir.into();
        let plate_dir = plate_dir.into();

        for dir in [&vehicle_dir, &plate_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create crop directory {}", dir.display()))?;
        }

        Ok(Self {
            vehicle_dir,
            plate_dir,
        })
    }

    pub fn save_vehicle(&self, frame: &DynamicImage, bbox: &BoundingBox, name: &str) -> Result<PathBuf> {
        save_crop(frame, bbox, &self.vehicle_dir, name)
    }

    pub fn save_plate(&self, frame: &DynamicImage, bbox: &BoundingBox, name: &str) -> Result<PathBuf> {
        save_crop(frame, bbox, &self.plate_dir, name)
    }
}

fn save_crop(frame: &DynamicImage, bbox: &BoundingBox, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = validate_path_components(Path::new(name), Some(dir), "crop name")?;
    let (x, y, width, height) = bbox.pixel_rect();
    let crop = frame.crop_imm(x, y, width, height);

    // JPEG has no alpha channel
    DynamicImage::ImageRgb8(crop.to_rgb8())
        .save(&path)
        .with_context(|| format!("Failed to write crop {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_saves_jpeg_crops() {
        let dir = TempDir::new().unwrap();
        let writer =
            ArtifactWriter::new(dir.path().join("vehicles"), dir.path().join("plates")).unwrap();

        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(120, 80, Rgba([200, 10, 10, 255])));
        let vehicle = BoundingBox::new(0.0, 0.0, 100.0, 60.0).unwrap();
        let plate = BoundingBox::new(10.0, 10.0, 40.0, 30.0).unwrap();

        let vehicle_path = writer.save_vehicle(&frame, &vehicle, "Car1_0.jpg").unwrap();
        let plate_path = writer.save_plate(&frame, &plate, "9_0.jpg").unwrap();

        assert_eq!(vehicle_path, dir.path().join("vehicles").join("Car1_0.jpg"));
        let saved = image::open(&plate_path).unwrap();
        assert_eq!((saved.width(), saved.height()), (30, 20));
    }

    #[test]
    fn test_rejects_traversal_names() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("v"), dir.path().join("p")).unwrap();
        let frame = DynamicImage::ImageRgb8(image::RgbImage::new(50, 50));
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        assert!(writer.save_plate(&frame, &bbox, "../escape.jpg").is_err());
    }
}
