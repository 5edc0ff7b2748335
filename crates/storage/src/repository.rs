//! Evidence history
//!
//! Lists saved snapshots and clips, newest first, for the history view.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

use crate::StorageError;

/// Default number of entries per listing
pub const DEFAULT_HISTORY_LIMIT: usize = 60;

/// One saved artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub file_name: String,
    /// Path under which the HTTP layer serves the file
    pub url: String,
    /// `dd/mm/YYYY - HH:MM:SS` taken from the file name, if it carries a stamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_time: Option<String>,
    /// Modification time, seconds since the Unix epoch
    pub modified_unix: u64,
    pub size_bytes: u64,
}

/// Read-only view over the snapshot and clip directories
#[derive(Debug, Clone)]
pub struct EvidenceRepository {
    snapshot_dir: PathBuf,
    video_dir: PathBuf,
}

impl EvidenceRepository {
    pub fn new(snapshot_dir: impl Into<PathBuf>, video_dir: impl Into<PathBuf>) -> Self {
        let repo = Self {
            snapshot_dir: snapshot_dir.into(),
            video_dir: video_dir.into(),
        };
        info!(
            "Evidence repository: snapshots in {}, clips in {}",
            repo.snapshot_dir.display(),
            repo.video_dir.display()
        );
        repo
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    /// Most recent `*.jpg` snapshots
    pub fn recent_snapshots(&self, limit: usize) -> Result<Vec<EvidenceEntry>, StorageError> {
        list(&self.snapshot_dir, "jpg", "/captured_images", limit)
    }

    /// Most recent `*.mp4` clips
    pub fn recent_videos(&self, limit: usize) -> Result<Vec<EvidenceEntry>, StorageError> {
        list(&self.video_dir, "mp4", "/captured_videos", limit)
    }
}

fn list(dir: &Path, extension: &str, url_prefix: &str, limit: usize) -> Result<Vec<EvidenceEntry>, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found: Vec<EvidenceEntry> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
        .filter_map(|e| {
            let metadata = e.metadata().ok()?;
            let modified_unix = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            let file_name = e.file_name().to_string_lossy().into_owned();
            Some(EvidenceEntry {
                url: format!("{}/{}", url_prefix, file_name),
                display_time: display_time(&file_name),
                file_name,
                modified_unix,
                size_bytes: metadata.len(),
            })
        })
        .collect();

    // Newest first; the stamped name breaks ties within one second
    found.sort_by(|a, b| {
        b.modified_unix
            .cmp(&a.modified_unix)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
    found.truncate(limit);
    debug!("Listed {} entries from {}", found.len(), dir.display());
    Ok(found)
}

/// Parse the `YYYYmmdd_HHMMSS` stamp at the end of a file name, or just
/// before a same-second `_<n>` counter
fn display_time(file_name: &str) -> Option<String> {
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    let parts: Vec<&str> = stem.split('_').collect();
    parts
        .windows(2)
        .rev()
        .take(2)
        .find_map(|pair| NaiveDateTime::parse_from_str(&format!("{}_{}", pair[0], pair[1]), "%Y%m%d_%H%M%S").ok())
        .map(|stamp| stamp.format("%d/%m/%Y - %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("history-{}-{}-{}", name, std::process::id(), nanos));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_display_time() {
        assert_eq!(
            display_time("drowsy_20240315_083005.jpg").as_deref(),
            Some("15/03/2024 - 08:30:05")
        );
        assert_eq!(
            display_time("evidence_20231231_235959.mp4").as_deref(),
            Some("31/12/2023 - 23:59:59")
        );
        assert_eq!(
            display_time("drowsy_20240315_083005_2.jpg").as_deref(),
            Some("15/03/2024 - 08:30:05")
        );
        assert_eq!(display_time("notes.jpg"), None);
        assert_eq!(display_time("drowsy_garbage_stamp.jpg"), None);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let repo = EvidenceRepository::new("/nonexistent/snapshots", "/nonexistent/videos");
        assert!(repo.recent_snapshots(10).unwrap().is_empty());
        assert!(repo.recent_videos(10).unwrap().is_empty());
    }

    #[test]
    fn test_lists_by_extension_with_limit() {
        let snaps = scratch_dir("snaps");
        let vids = scratch_dir("vids");
        fs::write(snaps.join("drowsy_20240101_000001.jpg"), b"a").unwrap();
        fs::write(snaps.join("drowsy_20240101_000002.jpg"), b"b").unwrap();
        fs::write(snaps.join("drowsy_20240101_000003.jpg"), b"c").unwrap();
        fs::write(snaps.join("readme.txt"), b"x").unwrap();
        fs::write(vids.join("evidence_20240101_000001.mp4"), b"v").unwrap();
        fs::write(vids.join("temp_20240101_000001.mjpeg"), b"t").unwrap();

        let repo = EvidenceRepository::new(&snaps, &vids);
        let recent = repo.recent_snapshots(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|e| e.url.starts_with("/captured_images/drowsy_")));

        let videos = repo.recent_videos(DEFAULT_HISTORY_LIMIT).unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].url, "/captured_videos/evidence_20240101_000001.mp4");
        assert_eq!(videos[0].display_time.as_deref(), Some("01/01/2024 - 00:00:01"));

        fs::remove_dir_all(&snaps).unwrap();
        fs::remove_dir_all(&vids).unwrap();
    }
}
