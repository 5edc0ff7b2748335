//! Eye detection and open/closed classification models

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use ndarray::{Array4, ArrayView2, Axis, Ix2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{DmsConfig, DmsError};

/// Letterbox fill value
const PAD_VALUE: u8 = 114;

/// Per-channel normalisation applied to the equalised eye crop
const EYE_MEAN: f32 = 0.485;
const EYE_STD: f32 = 0.229;

/// Axis-aligned detection in full-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Integer center, rounded down
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x1 + self.x2).div_euclid(2),
            (self.y1 + self.y2).div_euclid(2),
        )
    }

    /// Shift by a crop offset
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
            confidence: self.confidence,
        }
    }

    /// Region handed to the classifier: the box extended downward by a
    /// quarter of its height, clamped to the frame. `None` if nothing is left.
    pub fn eye_crop(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let y2 = self.y2 + self.height() / 4;
        let x1 = self.x1.max(0);
        let y1 = self.y1.max(0);
        let x2 = self.x2.min(frame_width as i32);
        let y2 = y2.min(frame_height as i32);

        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2, y2, self.confidence))
    }
}

/// Eye detector capability: frame in, eye boxes out (frame coordinates)
pub trait EyeDetector: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<BoundingBox>, DmsError>;

    /// Update confidence and NMS thresholds at runtime
    fn set_thresholds(&mut self, conf: f32, iou: f32);
}

/// Eye classifier capability: eye crop in, (decision, open-probability) out
pub trait EyeClassifier: Send {
    fn predict(&mut self, eye: &VideoFrame, threshold: f32) -> Result<(u8, f32), DmsError>;
}

fn load_session(path: &str, intra_threads: usize) -> Result<Session, DmsError> {
    info!("Loading model from {}", path);
    Session::builder()
        .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|builder| builder.with_intra_threads(intra_threads))
        .and_then(|builder| builder.commit_from_file(path))
        .map_err(|e| {
            error!("Failed to load model {}: {}", path, e);
            DmsError::ModelLoad(format!("{}: {}", path, e))
        })
}

fn inference_error(e: ort::Error) -> DmsError {
    DmsError::Inference(e.to_string())
}

/// Letterbox geometry needed to map detector output back to the input frame
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad: (i32, i32),
}

/// Scale to fit a `size` square, centre on grey padding, RGB/255 CHW
fn letterbox(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (w, h) = image.dimensions();
    let scale = (size as f32 / h as f32).min(size as f32 / w as f32);
    let nw = ((w as f32 * scale) as u32).clamp(1, size);
    let nh = ((h as f32 * scale) as u32).clamp(1, size);

    let resized = imageops::resize(image, nw, nh, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    let (dw, dh) = ((size - nw) / 2, (size - nh) / 2);
    imageops::replace(&mut canvas, &resized, dw as i64, dh as i64);

    let side = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad: (dw as i32, dh as i32),
        },
    )
}

/// Detector-space candidate (top-left, size)
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    score: f32,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f32 {
        let iw = ((self.x + self.w).min(other.x + other.w) - self.x.max(other.x)).max(0);
        let ih = ((self.y + self.h).min(other.y + other.h) - self.y.max(other.y)).max(0);
        let inter = (iw * ih) as f32;
        let union = (self.w * self.h + other.w * other.h) as f32 - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Rows 0..4 are (cx, cy, w, h); the rest are class scores. One column per anchor.
fn decode_candidates(preds: ArrayView2<f32>, conf_threshold: f32) -> Vec<Candidate> {
    if preds.nrows() < 5 {
        return Vec::new();
    }

    preds
        .axis_iter(Axis(1))
        .filter_map(|col| {
            let score = col.iter().skip(4).copied().fold(f32::NEG_INFINITY, f32::max);
            if score < conf_threshold {
                return None;
            }
            let (cx, cy, w, h) = (col[0], col[1], col[2], col[3]);
            Some(Candidate {
                x: (cx - w / 2.0) as i32,
                y: (cy - h / 2.0) as i32,
                w: w as i32,
                h: h as i32,
                score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn to_frame_box(c: &Candidate, lb: &Letterbox, frame_width: u32, frame_height: u32) -> BoundingBox {
    let x1 = (((c.x - lb.pad.0) as f32 / lb.scale) as i32).max(0);
    let y1 = (((c.y - lb.pad.1) as f32 / lb.scale) as i32).max(0);
    let x2 = (x1 + (c.w as f32 / lb.scale) as i32).min(frame_width as i32);
    let y2 = (y1 + (c.h as f32 / lb.scale) as i32).min(frame_height as i32);
    BoundingBox::new(x1, y1, x2, y2, c.score)
}

/// YOLO-style single-output eye detector on ONNX Runtime
pub struct YoloEyeDetector {
    session: Session,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
}

impl YoloEyeDetector {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config
            .yolo_model_path
            .as_deref()
            .ok_or_else(|| DmsError::Config("detector model path not set".into()))?;

        Ok(Self {
            session: load_session(path, 2)?,
            input_size: config.yolo_img_size.max(32),
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
        })
    }
}

impl EyeDetector for YoloEyeDetector {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<BoundingBox>, DmsError> {
        let image = frame
            .to_rgb_image()
            .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;
        let (input, lb) = letterbox(&image, self.input_size);

        let outputs = self
            .session
            .run(ort::inputs![input].map_err(inference_error)?)
            .map_err(inference_error)?;
        let output = outputs[0].try_extract_tensor::<f32>().map_err(inference_error)?;

        if output.ndim() != 3 || output.shape()[0] == 0 {
            return Err(DmsError::Inference(format!(
                "unexpected detector output shape {:?}",
                output.shape()
            )));
        }
        let preds = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let candidates = decode_candidates(preds, self.conf_threshold);
        let kept = nms(candidates, self.iou_threshold);
        debug!("Detector kept {} boxes", kept.len());

        Ok(kept
            .iter()
            .map(|c| to_frame_box(c, &lb, frame.width, frame.height))
            .collect())
    }

    fn set_thresholds(&mut self, conf: f32, iou: f32) {
        self.conf_threshold = conf;
        self.iou_threshold = iou;
    }
}

/// Equalised-grayscale, single-logit eye open/closed classifier
pub struct OnnxEyeClassifier {
    session: Session,
    input_size: u32,
}

impl OnnxEyeClassifier {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config
            .eye_model_path
            .as_deref()
            .ok_or_else(|| DmsError::Config("eye model path not set".into()))?;

        Ok(Self {
            session: load_session(path, 3)?,
            input_size: config.eye_img_size.max(8),
        })
    }
}

fn eye_tensor(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Triangle);
    let enhanced = equalize_histogram(&imageops::grayscale(&resized));

    let side = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in enhanced.enumerate_pixels() {
        let value = (pixel[0] as f32 / 255.0 - EYE_MEAN) / EYE_STD;
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = value;
        }
    }
    input
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl EyeClassifier for OnnxEyeClassifier {
    fn predict(&mut self, eye: &VideoFrame, threshold: f32) -> Result<(u8, f32), DmsError> {
        if !eye.is_valid() {
            return Ok((0, 0.0));
        }

        let image = eye
            .to_rgb_image()
            .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;
        let input = eye_tensor(&image, self.input_size);

        let outputs = self
            .session
            .run(ort::inputs![input].map_err(inference_error)?)
            .map_err(inference_error)?;
        let logit = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| DmsError::Inference("classifier returned an empty tensor".into()))?;

        let prob_open = sigmoid(logit);
        Ok(((prob_open > threshold) as u8, prob_open))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_eye_crop_extends_downward() {
        let b = BoundingBox::new(100, 100, 140, 120, 0.9);
        let crop = b.eye_crop(640, 480).unwrap();
        assert_eq!((crop.x1, crop.y1, crop.x2, crop.y2), (100, 100, 140, 125));
    }

    #[test]
    fn test_eye_crop_clamped_and_degenerate() {
        let b = BoundingBox::new(-10, 470, 30, 478, 0.9);
        let crop = b.eye_crop(640, 480).unwrap();
        assert_eq!((crop.x1, crop.y1, crop.x2, crop.y2), (0, 470, 30, 480));

        assert!(BoundingBox::new(700, 10, 720, 20, 0.5).eye_crop(640, 480).is_none());
        assert!(BoundingBox::new(10, 10, 10, 20, 0.5).eye_crop(640, 480).is_none());
    }

    #[test]
    fn test_letterbox_geometry() {
        let image = RgbImage::from_pixel(448, 224, Rgb([255, 255, 255]));
        let (input, lb) = letterbox(&image, 224);

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad, (0, 56));
        // Padding rows are grey, content rows are white
        assert!((input[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((input[[0, 0, 112, 112]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_by_best_class() {
        // Two anchors, two classes
        let preds = Array2::from_shape_vec(
            (6, 2),
            vec![
                50.0, 10.0, // cx
                60.0, 10.0, // cy
                20.0, 4.0, // w
                10.0, 4.0, // h
                0.1, 0.2, // class 0
                0.7, 0.25, // class 1
            ],
        )
        .unwrap();

        let candidates = decode_candidates(preds.view(), 0.3);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0],
            Candidate {
                x: 40,
                y: 55,
                w: 20,
                h: 10,
                score: 0.7
            }
        );
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let a = Candidate { x: 0, y: 0, w: 10, h: 10, score: 0.9 };
        let b = Candidate { x: 1, y: 1, w: 10, h: 10, score: 0.8 };
        let c = Candidate { x: 50, y: 50, w: 10, h: 10, score: 0.5 };

        let kept = nms(vec![c, b, a], 0.35);
        assert_eq!(kept, vec![a, c]);
    }

    #[test]
    fn test_to_frame_box_undoes_letterbox() {
        let lb = Letterbox {
            scale: 0.5,
            pad: (0, 56),
        };
        let c = Candidate { x: 20, y: 66, w: 10, h: 6, score: 0.8 };
        let b = to_frame_box(&c, &lb, 448, 224);
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (40, 20, 60, 32));

        // Clamped to frame
        let edge = Candidate { x: 220, y: 50, w: 20, h: 10, score: 0.8 };
        let b = to_frame_box(&edge, &lb, 448, 224);
        assert_eq!((b.x1, b.y1, b.x2), (440, 0, 448));
    }

    #[test]
    fn test_eye_tensor_normalised() {
        let image = RgbImage::from_pixel(20, 10, Rgb([30, 30, 30]));
        let input = eye_tensor(&image, 16);
        assert_eq!(input.shape(), &[1, 3, 16, 16]);
        // All three channels carry the same value
        assert_eq!(input[[0, 0, 3, 3]], input[[0, 2, 3, 3]]);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(8.0) > 0.99);
        assert!(sigmoid(-8.0) < 0.01);
    }

    #[test]
    fn test_box_helpers() {
        let b = BoundingBox::new(10, 20, 31, 41, 1.0);
        assert_eq!(b.center(), (20, 30));
        assert_eq!(b.height(), 21);
        let t = b.translate(5, -5);
        assert_eq!((t.x1, t.y1, t.x2, t.y2), (15, 15, 36, 36));
    }
}
