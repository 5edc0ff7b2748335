//! HUD overlay for the published frame
//!
//! Worker eyes get corner brackets coloured by state with a probability bar
//! underneath, other detections a grey bracket, the active crop a yellow
//! outline. While the alert is latched a red banner and border are added.

use camera_capture::{CameraError, CropRect, VideoFrame};
use dms::{BoundingBox, DmsAnalysis, EyeState};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const OPEN: Rgb<u8> = Rgb([0, 200, 0]);
const CLOSED: Rgb<u8> = Rgb([220, 0, 0]);
const OTHER: Rgb<u8> = Rgb([128, 128, 128]);
const REGION: Rgb<u8> = Rgb([255, 220, 0]);
const ALERT: Rgb<u8> = Rgb([220, 0, 0]);
const BAR_BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);

/// Bracket arm thickness in pixels
const STROKE: u32 = 2;
const BAR_HEIGHT: u32 = 6;
const BAR_GAP: i32 = 4;
const BORDER: u32 = 6;

/// Everything drawn on top of one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct Overlay<'a> {
    pub analysis: Option<&'a DmsAnalysis>,
    pub region: Option<CropRect>,
    pub alert: bool,
}

/// Draw `overlay` onto a copy of `frame`
pub fn render(frame: &VideoFrame, overlay: &Overlay<'_>) -> Result<VideoFrame, CameraError> {
    let mut img = frame.to_rgb_image()?;

    if let Some(region) = overlay.region {
        if let Some(rect) = to_rect(region.x, region.y, region.width, region.height) {
            draw_hollow_rect_mut(&mut img, rect, REGION);
        }
    }

    if let Some(analysis) = overlay.analysis {
        for other in &analysis.others {
            bracket(&mut img, other, OTHER);
        }
        for eye in &analysis.workers {
            let color = match eye.state {
                EyeState::Open => OPEN,
                EyeState::Closed => CLOSED,
            };
            bracket(&mut img, &eye.bbox, color);
            probability_bar(&mut img, &eye.bbox, eye.probability, color);
        }
    }

    if overlay.alert {
        alert_frame(&mut img);
    }

    Ok(frame.with_image(img))
}

fn to_rect(x: i64, y: i64, width: i64, height: i64) -> Option<Rect> {
    if width <= 0 || height <= 0 {
        return None;
    }
    let x = i32::try_from(x).ok()?;
    let y = i32::try_from(y).ok()?;
    let width = u32::try_from(width).ok()?;
    let height = u32::try_from(height).ok()?;
    Some(Rect::at(x, y).of_size(width, height))
}

fn bracket(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let (w, h) = (bbox.width(), bbox.height());
    if w <= 0 || h <= 0 {
        return;
    }
    let arm = ((w.min(h) / 4) as u32).max(STROKE);
    let (a, t) = (arm as i32, STROKE as i32);
    let (x1, y1, x2, y2) = (bbox.x1, bbox.y1, bbox.x2, bbox.y2);

    let arms = [
        // top-left
        Rect::at(x1, y1).of_size(arm, STROKE),
        Rect::at(x1, y1).of_size(STROKE, arm),
        // top-right
        Rect::at(x2 - a, y1).of_size(arm, STROKE),
        Rect::at(x2 - t, y1).of_size(STROKE, arm),
        // bottom-left
        Rect::at(x1, y2 - t).of_size(arm, STROKE),
        Rect::at(x1, y2 - a).of_size(STROKE, arm),
        // bottom-right
        Rect::at(x2 - a, y2 - t).of_size(arm, STROKE),
        Rect::at(x2 - t, y2 - a).of_size(STROKE, arm),
    ];
    for rect in arms {
        draw_filled_rect_mut(img, rect, color);
    }
}

fn probability_bar(img: &mut RgbImage, bbox: &BoundingBox, probability: f32, color: Rgb<u8>) {
    let width = bbox.width();
    if width <= 0 {
        return;
    }
    let y = bbox.y2 + BAR_GAP;
    draw_filled_rect_mut(img, Rect::at(bbox.x1, y).of_size(width as u32, BAR_HEIGHT), BAR_BACKGROUND);

    let filled = (width as f32 * probability.clamp(0.0, 1.0)).round() as u32;
    if filled > 0 {
        draw_filled_rect_mut(img, Rect::at(bbox.x1, y).of_size(filled, BAR_HEIGHT), color);
    }
}

fn alert_frame(img: &mut RgbImage) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    let banner = (h / 12).max(16).min(h);
    draw_filled_rect_mut(img, Rect::at(0, 0).of_size(w, banner), ALERT);

    for inset in 0..BORDER {
        let (bw, bh) = (w.saturating_sub(2 * inset), h.saturating_sub(2 * inset));
        if bw == 0 || bh == 0 {
            break;
        }
        draw_hollow_rect_mut(img, Rect::at(inset as i32, inset as i32).of_size(bw, bh), ALERT);
    }
}
