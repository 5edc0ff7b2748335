//! Parameters read from the config store
//!
//! `CycleParams` is re-read every cycle so UI edits apply without a
//! restart. `MonitorSettings` is read once at startup.

use camera_capture::{CameraConfig, CropRect};
use config_store::{keys, ConfigStore};
use dms::{DmsConfig, LogicMode};
use std::path::PathBuf;
use std::time::Duration;
use storage::RecorderConfig;

/// Hot-reloadable per-cycle parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CycleParams {
    pub dms: DmsConfig,
    /// Requested crop, `None` when cropping is disabled
    pub crop: Option<CropRect>,
    pub jpeg_quality: u8,
    pub data_collection_enabled: bool,
    pub data_collection_interval: Duration,
}

impl CycleParams {
    pub fn from_store(store: &ConfigStore) -> Self {
        let defaults = DmsConfig::default();
        let dms = DmsConfig {
            conf_threshold: store.get(keys::CONF_THRESHOLD, defaults.conf_threshold),
            iou_threshold: store.get(keys::IOU_THRESHOLD, defaults.iou_threshold),
            eye_closed_threshold: store.get(keys::EYE_CLOSED_THRESHOLD, defaults.eye_closed_threshold),
            drowsy_time_threshold_s: store.get(keys::DROWSY_TIME_THRESHOLD, defaults.drowsy_time_threshold_s),
            logic_mode: LogicMode::from_code(store.get(keys::EYE_LOGIC_MODE, 0i64)),
            detect_every: store.get(keys::FRAME_SKIP, defaults.detect_every),
            yolo_img_size: store.get(keys::YOLO_IMG_SIZE, defaults.yolo_img_size),
            eye_img_size: store.get(keys::EYE_IMG_SIZE, defaults.eye_img_size),
            yolo_model_path: store.get(keys::YOLO_PATH, None),
            eye_model_path: store.get(keys::EYE_MODEL_PATH, None),
            ..defaults
        };

        let crop = store.get(keys::CROP_ENABLED, false).then(|| {
            CropRect::new(
                store.get(keys::CROP_X, 0i64),
                store.get(keys::CROP_Y, 0i64),
                store.get(keys::CROP_W, 640i64),
                store.get(keys::CROP_H, 480i64),
            )
        });

        let interval: f64 = store.get(keys::DATA_COLLECTION_INTERVAL, 10.0);

        Self {
            dms,
            crop,
            jpeg_quality: store.get::<u8>(keys::JPEG_QUALITY, 45).clamp(1, 100),
            data_collection_enabled: store.get(keys::DATA_COLLECTION_ENABLED, false),
            data_collection_interval: duration_secs(interval, Duration::from_secs(10)),
        }
    }
}

/// Startup-only settings
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub camera: CameraConfig,
    pub led_pin: u32,
    pub evidence_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub recorder: RecorderConfig,
    pub http_addr: String,
}

impl MonitorSettings {
    pub fn from_store(store: &ConfigStore) -> Self {
        let camera_defaults = CameraConfig::default();
        let recorder_defaults = RecorderConfig::default();
        let camera = CameraConfig {
            device: store.get(keys::CAMERA_DEVICE, camera_defaults.device),
            width: store.get(keys::CAMERA_WIDTH, camera_defaults.width),
            height: store.get(keys::CAMERA_HEIGHT, camera_defaults.height),
            fps: store.get(keys::FRAME_RATE, camera_defaults.fps),
        };

        Self {
            led_pin: store.get(keys::LED_PIN, 21),
            evidence_dir: store.get::<String>(keys::EVIDENCE_DIR, "logs/videos".into()).into(),
            snapshot_dir: store.get::<String>(keys::SNAPSHOT_DIR, "logs/log_frame".into()).into(),
            dataset_dir: store.get::<String>(keys::DATASET_DIR, "data".into()).into(),
            recorder: RecorderConfig {
                buffer_seconds: store.get(keys::EVIDENCE_BUFFER_SECONDS, recorder_defaults.buffer_seconds),
                // Every captured frame is buffered
                fps: camera.fps,
                cooldown_seconds: store.get(keys::EVIDENCE_COOLDOWN, recorder_defaults.cooldown_seconds),
            },
            http_addr: store.get(keys::HTTP_ADDR, "0.0.0.0:8080".to_string()),
            camera,
        }
    }
}

fn duration_secs(value: f64, fallback: Duration) -> Duration {
    if value.is_finite() {
        Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(fallback)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let store = ConfigStore::with_defaults("unused.json");
        let params = CycleParams::from_store(&store);

        assert_eq!(params.crop, None);
        assert_eq!(params.jpeg_quality, 45);
        assert_eq!(params.dms.logic_mode, LogicMode::Dual);
        assert_eq!(params.dms.detect_every, 2);
        assert!((params.dms.eye_closed_threshold - 0.8).abs() < 1e-6);
        assert_eq!(params.dms.yolo_model_path.as_deref(), Some("weights/new-best.onnx"));
        assert!(!params.data_collection_enabled);
    }

    #[test]
    fn test_live_edits_are_picked_up() {
        let store = ConfigStore::with_defaults("unused.json");
        store.set(keys::CROP_ENABLED, true);
        store.set(keys::CROP_X, 100);
        store.set(keys::CROP_W, 512);
        store.set(keys::EYE_LOGIC_MODE, 1);
        store.set(keys::DROWSY_TIME_THRESHOLD, json!(3.5));

        let params = CycleParams::from_store(&store);
        assert_eq!(params.crop, Some(CropRect::new(100, 0, 512, 480)));
        assert_eq!(params.dms.logic_mode, LogicMode::Single);
        assert!((params.dms.drowsy_time_threshold_s - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_startup_settings() {
        let store = ConfigStore::with_defaults("unused.json");
        let settings = MonitorSettings::from_store(&store);

        assert_eq!(settings.camera.device, "/dev/video0");
        assert_eq!(settings.led_pin, 21);
        assert_eq!(settings.recorder.fps, 30);
        assert_eq!(settings.recorder.capacity(), 90);
        assert_eq!(settings.evidence_dir, PathBuf::from("logs/videos"));
    }

    #[test]
    fn test_evidence_window_follows_capture_rate() {
        let store = ConfigStore::with_defaults("unused.json");
        store.set(keys::FRAME_RATE, 20);
        store.set(keys::EVIDENCE_BUFFER_SECONDS, 4);
        let settings = MonitorSettings::from_store(&store);

        assert_eq!(settings.camera.fps, 20);
        assert_eq!(settings.recorder.fps, 20);
        assert_eq!(settings.recorder.capacity(), 80);
    }
}
