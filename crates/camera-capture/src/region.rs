//! Crop-region selection applied before detection

use std::borrow::Cow;
use tracing::debug;

use crate::VideoFrame;

/// Smallest side length a crop may have, in pixels
pub const MIN_CROP_SIZE: u32 = 256;

/// Crop rectangle in full-frame pixel coordinates.
///
/// Signed so that operator input (which may be negative or oversized) can be
/// represented before it is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl CropRect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }
}

/// Result of region selection for one cycle
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    /// Frame handed to the detector (borrowed when no crop applies)
    pub frame: Cow<'a, VideoFrame>,
    /// Offset (dw, dh) that translates detector boxes back to full-frame space
    pub offset: (i32, i32),
    /// Clamped rectangle actually used, `None` when cropping is disabled
    pub region: Option<CropRect>,
}

impl Selection<'_> {
    /// Whether a crop was applied this cycle
    pub fn is_cropped(&self) -> bool {
        self.region.is_some()
    }
}

/// Applies the configured crop rectangle to raw frames
#[derive(Debug, Clone)]
pub struct RegionSelector {
    min_size: u32,
}

impl Default for RegionSelector {
    fn default() -> Self {
        Self::new(MIN_CROP_SIZE)
    }
}

impl RegionSelector {
    pub fn new(min_size: u32) -> Self {
        Self {
            min_size: min_size.max(1),
        }
    }

    /// Clamp `request` into `frame` and crop.
    ///
    /// Falls back to the untouched full frame when no crop is requested, when
    /// the requested size is below the minimum, or when clamping to the frame
    /// edge leaves a side shorter than the minimum.
    pub fn select<'a>(&self, frame: &'a VideoFrame, request: Option<CropRect>) -> Selection<'a> {
        match request.and_then(|rect| self.clamp(frame, rect)) {
            Some(region) => match frame.crop(
                region.x as u32,
                region.y as u32,
                region.width as u32,
                region.height as u32,
            ) {
                Some(cropped) => Selection {
                    frame: Cow::Owned(cropped),
                    offset: (region.x as i32, region.y as i32),
                    region: Some(region),
                },
                None => Self::full(frame),
            },
            None => Self::full(frame),
        }
    }

    fn full(frame: &VideoFrame) -> Selection<'_> {
        Selection {
            frame: Cow::Borrowed(frame),
            offset: (0, 0),
            region: None,
        }
    }

    fn clamp(&self, frame: &VideoFrame, rect: CropRect) -> Option<CropRect> {
        let min = self.min_size as i64;
        let (fw, fh) = (frame.width as i64, frame.height as i64);

        if rect.width < min || rect.height < min || fw == 0 || fh == 0 {
            debug!("Crop {:?} below minimum {}px; using full frame", rect, min);
            return None;
        }

        let x = rect.x.clamp(0, fw - 1);
        let y = rect.y.clamp(0, fh - 1);
        let width = rect.width.min(fw - x);
        let height = rect.height.min(fh - y);

        if width < min || height < min {
            debug!("Crop {:?} degenerates inside {}x{} frame; using full frame", rect, fw, fh);
            return None;
        }

        Some(CropRect::new(x, y, width, height))
    }
}
