//! Raw training-data capture
//!
//! When enabled, the detector input and each classified eye crop are saved
//! at most once per interval, sorted by the decision that was made on them.

use camera_capture::VideoFrame;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::StorageError;

const DATASET_QUALITY: u8 = 100;

pub struct DatasetCollector {
    root: PathBuf,
    interval: Duration,
    last_saved: Option<Instant>,
}

impl DatasetCollector {
    pub fn new(root: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            root: root.into(),
            interval,
            last_saved: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Whether this cycle should be captured; stamps the gate when it is
    pub fn should_collect(&mut self, enabled: bool, now: Instant) -> bool {
        if !enabled {
            return false;
        }
        let due = self
            .last_saved
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_saved = Some(now);
        }
        due
    }

    /// `raw_yolo/<unix>.jpg`
    pub fn save_detection_frame(&self, frame: &VideoFrame, unix: i64) -> Result<PathBuf, StorageError> {
        let dir = self.root.join("raw_yolo");
        self.write(&dir, &format!("{}.jpg", unix), frame)
    }

    /// `raw_eyes/{open,closed}/<unix>_<side>_<label>.jpg`
    pub fn save_eye(&self, crop: &VideoFrame, unix: i64, side: &str, open: bool) -> Result<PathBuf, StorageError> {
        let label = if open { "open" } else { "closed" };
        let dir = self.root.join("raw_eyes").join(label);
        self.write(&dir, &format!("{}_{}_{}.jpg", unix, side, label), crop)
    }

    fn write(&self, dir: &Path, name: &str, frame: &VideoFrame) -> Result<PathBuf, StorageError> {
        let jpeg = frame
            .encode_jpeg(DATASET_QUALITY)
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        fs::create_dir_all(dir)?;
        let path = dir.join(name);
        fs::write(&path, jpeg)?;
        debug!("Saved dataset sample {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("dataset-{}-{}", std::process::id(), nanos))
    }

    #[test]
    fn test_interval_gate() {
        let mut collector = DatasetCollector::new(scratch_dir(), Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(!collector.should_collect(false, t0));
        assert!(collector.should_collect(true, t0));
        assert!(!collector.should_collect(true, t0 + Duration::from_secs(9)));
        assert!(collector.should_collect(true, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_layout() {
        let root = scratch_dir();
        let collector = DatasetCollector::new(&root, Duration::from_secs(10));
        let frame = VideoFrame::blank(16, 16);

        let det = collector.save_detection_frame(&frame, 1700000000).unwrap();
        assert_eq!(det, root.join("raw_yolo/1700000000.jpg"));

        let eye = collector.save_eye(&frame, 1700000000, "left", false).unwrap();
        assert_eq!(eye, root.join("raw_eyes/closed/1700000000_left_closed.jpg"));
        assert!(eye.exists());

        let eye = collector.save_eye(&frame, 1700000000, "right", true).unwrap();
        assert_eq!(eye, root.join("raw_eyes/open/1700000000_right_open.jpg"));

        fs::remove_dir_all(&root).unwrap();
    }
}
