//! Video frame types and processing

use crate::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

/// Decoded RGB video frame
///
/// A frame is owned by whichever stage currently holds it. The evidence
/// buffer shares raw frames through an `Arc` instead of copying them.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the Unix epoch)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Solid black frame
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; width as usize * height as usize * 3], width, height, 0, 0)
    }

    /// Whether the buffer is non-empty and matches the declared geometry
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 3
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        match self.data.get(idx..idx + 3)? {
            &[r, g, b] => Some([r, g, b]),
            _ => None,
        }
    }

    /// Crop a region of the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<VideoFrame> {
        if !self.is_valid() || w == 0 || h == 0 {
            return None;
        }
        if x.checked_add(w)? > self.width || y.checked_add(h)? > self.height {
            return None;
        }

        let mut cropped = Vec::with_capacity((w * h * 3) as usize);
        for row in y..(y + h) {
            let start = ((row * self.width + x) * 3) as usize;
            let end = start + (w * 3) as usize;
            cropped.extend_from_slice(&self.data[start..end]);
        }

        Some(VideoFrame {
            data: cropped,
            width: w,
            height: h,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Copy into an `image` buffer for drawing or resizing
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "{} bytes do not form a {}x{} RGB image",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Take ownership of an `image` buffer, keeping this frame's metadata
    pub fn with_image(&self, image: RgbImage) -> VideoFrame {
        let (width, height) = image.dimensions();
        VideoFrame {
            data: image.into_raw(),
            width,
            height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Encode as baseline JPEG at the given quality (1-100)
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        if !self.is_valid() {
            return Err(CameraError::Format("cannot encode an empty frame".into()));
        }

        let mut out = Vec::with_capacity(self.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(out)
    }
}
