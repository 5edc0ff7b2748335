//! Still images saved on alert onset

use camera_capture::VideoFrame;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{file_stamp, StorageError};

/// Writes `drowsy_<stamp>.jpg` files into one directory.
///
/// A second alert within the same second gets `drowsy_<stamp>_<n>.jpg`.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    quality: u8,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quality: 90,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, frame: &VideoFrame) -> Result<PathBuf, StorageError> {
        let jpeg = frame
            .encode_jpeg(self.quality)
            .map_err(|e| StorageError::Encode(e.to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let path = unused_path(&self.dir, &file_stamp());
        fs::write(&path, jpeg)?;
        info!("Saved alert snapshot {}", path.display());
        Ok(path)
    }
}

fn unused_path(dir: &Path, stamp: &str) -> PathBuf {
    let mut path = dir.join(format!("drowsy_{}.jpg", stamp));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("drowsy_{}_{}.jpg", stamp, n));
        n += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_snapshot_named_and_written() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("snapshots-{}-{}", std::process::id(), nanos));
        let writer = SnapshotWriter::new(&dir);

        let path = writer.save(&VideoFrame::blank(32, 24)).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("drowsy_") && name.ends_with(".jpg"));
        assert_eq!(name.len(), "drowsy_20240101_120000.jpg".len());

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_same_second_alerts_do_not_overwrite() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("snapshots-dup-{}-{}", std::process::id(), nanos));
        fs::create_dir_all(&dir).unwrap();

        let first = unused_path(&dir, "20240101_120000");
        fs::write(&first, b"a").unwrap();
        let second = unused_path(&dir, "20240101_120000");
        fs::write(&second, b"b").unwrap();
        let third = unused_path(&dir, "20240101_120000");

        assert_eq!(first.file_name().unwrap(), "drowsy_20240101_120000.jpg");
        assert_eq!(second.file_name().unwrap(), "drowsy_20240101_120000_1.jpg");
        assert_eq!(third.file_name().unwrap(), "drowsy_20240101_120000_2.jpg");
        assert_eq!(fs::read(&first).unwrap(), b"a");

        let writer = SnapshotWriter::new(&dir);
        let a = writer.save(&VideoFrame::blank(8, 8)).unwrap();
        let b = writer.save(&VideoFrame::blank(8, 8)).unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_frame_rejected() {
        let writer = SnapshotWriter::new(std::env::temp_dir());
        let empty = VideoFrame::new(Vec::new(), 0, 0, 0, 0);
        assert!(matches!(writer.save(&empty), Err(StorageError::Encode(_))));
    }
}
