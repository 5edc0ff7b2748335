//! Recognized keys and their default values

use serde_json::{json, Map, Value};

/// Default location of the persisted configuration file
pub const DEFAULT_CONFIG_PATH: &str = "configs/monitor.json";

/// Keys consumed by the pipeline and the API
pub mod keys {
    pub const CROP_ENABLED: &str = "crop_enabled";
    pub const CROP_X: &str = "crop_x";
    pub const CROP_Y: &str = "crop_y";
    pub const CROP_W: &str = "crop_w";
    pub const CROP_H: &str = "crop_h";

    pub const CONF_THRESHOLD: &str = "conf_threshold";
    pub const IOU_THRESHOLD: &str = "iou_threshold";
    pub const DROWSY_TIME_THRESHOLD: &str = "drowsy_time_threshold";
    pub const EYE_CLOSED_THRESHOLD: &str = "eye_closed_threshold";
    pub const EYE_LOGIC_MODE: &str = "eye_logic_mode";
    pub const FRAME_SKIP: &str = "frame_skip";
    pub const FRAME_RATE: &str = "frame_rate";
    pub const JPEG_QUALITY: &str = "jpeg_quality";

    pub const LED_PIN: &str = "led_pin";

    pub const YOLO_PATH: &str = "yolo_path";
    pub const EYE_MODEL_PATH: &str = "eye_model_path";
    pub const YOLO_IMG_SIZE: &str = "yolo_img_size";
    pub const EYE_IMG_SIZE: &str = "eye_img_size";

    pub const CAMERA_DEVICE: &str = "camera_device";
    pub const CAMERA_WIDTH: &str = "camera_width";
    pub const CAMERA_HEIGHT: &str = "camera_height";

    pub const DATA_COLLECTION_ENABLED: &str = "data_collection_enabled";
    pub const DATA_COLLECTION_INTERVAL: &str = "data_collection_interval";

    pub const EVIDENCE_DIR: &str = "evidence_dir";
    pub const SNAPSHOT_DIR: &str = "snapshot_dir";
    pub const DATASET_DIR: &str = "dataset_dir";
    pub const EVIDENCE_BUFFER_SECONDS: &str = "evidence_buffer_seconds";
    pub const EVIDENCE_COOLDOWN: &str = "evidence_cooldown";

    pub const HTTP_ADDR: &str = "http_addr";
}

fn default_entries() -> Vec<(&'static str, Value)> {
    vec![
        (keys::CROP_ENABLED, json!(false)),
        (keys::CROP_X, json!(0)),
        (keys::CROP_Y, json!(0)),
        (keys::CROP_W, json!(640)),
        (keys::CROP_H, json!(480)),
        (keys::CONF_THRESHOLD, json!(0.3)),
        (keys::IOU_THRESHOLD, json!(0.35)),
        (keys::DROWSY_TIME_THRESHOLD, json!(2.0)),
        (keys::EYE_CLOSED_THRESHOLD, json!(0.8)),
        (keys::EYE_LOGIC_MODE, json!(0)),
        (keys::FRAME_SKIP, json!(2)),
        (keys::FRAME_RATE, json!(30)),
        (keys::JPEG_QUALITY, json!(45)),
        (keys::LED_PIN, json!(21)),
        (keys::YOLO_PATH, json!("weights/new-best.onnx")),
        (keys::EYE_MODEL_PATH, json!("weights/eye_model.onnx")),
        (keys::YOLO_IMG_SIZE, json!(224)),
        (keys::EYE_IMG_SIZE, json!(128)),
        (keys::CAMERA_DEVICE, json!("/dev/video0")),
        (keys::CAMERA_WIDTH, json!(1280)),
        (keys::CAMERA_HEIGHT, json!(720)),
        (keys::DATA_COLLECTION_ENABLED, json!(false)),
        (keys::DATA_COLLECTION_INTERVAL, json!(10.0)),
        (keys::EVIDENCE_DIR, json!("logs/videos")),
        (keys::SNAPSHOT_DIR, json!("logs/log_frame")),
        (keys::DATASET_DIR, json!("data")),
        (keys::EVIDENCE_BUFFER_SECONDS, json!(3)),
        (keys::EVIDENCE_COOLDOWN, json!(10.0)),
        (keys::HTTP_ADDR, json!("0.0.0.0:8080")),
    ]
}

/// Insert every default that is not already present.
///
/// Existing values are never overwritten, so a partially written file keeps
/// the operator's choices and only gains the missing keys.
pub fn seed_defaults(map: &mut Map<String, Value>) {
    for (key, value) in default_entries() {
        map.entry(key.to_string()).or_insert(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_keeps_existing_values() {
        let mut map = Map::new();
        map.insert(keys::CONF_THRESHOLD.to_string(), json!(0.5));

        seed_defaults(&mut map);

        assert_eq!(map[keys::CONF_THRESHOLD], json!(0.5));
        assert_eq!(map[keys::DROWSY_TIME_THRESHOLD], json!(2.0));
        assert_eq!(map[keys::LED_PIN], json!(21));
    }
}
