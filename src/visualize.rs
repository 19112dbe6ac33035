use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::info;

use crate::colors::{to_rgb8, RgbF};
use crate::detections::Detections;
use crate::errors::{InferError, Result};
use crate::imageops_ai::mask;

const MASK_ALPHA: f32 = 0.5;
const CAPTION_FONT_SIZE: f32 = 14.0;
const CAPTION_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const DASH_LENGTH: i32 = 6;

/// Renders detections onto images: translucent masks, mask outlines, dashed
/// boxes and `label score` captions.
pub struct Visualizer {
    font: Option<FontArc>,
    font_scale: PxScale,
    mask_alpha: f32,
}

impl Default for Visualizer {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: PxScale::from(CAPTION_FONT_SIZE),
            mask_alpha: MASK_ALPHA,
        }
    }
}

impl Visualizer {
    /// Visualizer that also draws captions with the TrueType/OpenType font at `path`.
    pub fn with_font(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| InferError::FileSystem {
            path: path.to_path_buf(),
            operation: "read font".to_string(),
            source: e,
        })?;
        let font = FontArc::try_from_vec(data).map_err(|e| InferError::Validation {
            field: "font".to_string(),
            reason: format!("{} is not a usable font: {}", path.display(), e),
        })?;
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    /// Returns a copy of `image` with every detection drawn in its color.
    ///
    /// `colors` holds one color per detection, in detection order.
    pub fn display_instances(
        &self,
        image: &RgbImage,
        detections: &Detections,
        class_names: &[&str],
        colors: &[RgbF],
    ) -> Result<RgbImage> {
        let mut canvas = image.clone();
        if detections.is_empty() {
            info!("No instances to display");
            return Ok(canvas);
        }
        if colors.len() != detections.len() {
            return Err(InferError::Validation {
                field: "colors".to_string(),
                reason: format!(
                    "has {} entries for {} detections",
                    colors.len(),
                    detections.len()
                ),
            });
        }

        for (detection, &color) in detections.iter().zip(colors) {
            let label = class_names
                .get(detection.class_id)
                .ok_or(InferError::InvalidClassId {
                    id: detection.class_id,
                    count: class_names.len(),
                })?;
            let rgb = to_rgb8(color);

            mask::apply(&mut canvas, detection.mask, color, self.mask_alpha).map_err(|e| {
                InferError::ImageProcessing {
                    path: "unknown".to_string(),
                    operation: "mask overlay".to_string(),
                    source: e.into(),
                }
            })?;
            draw_mask_outline(&mut canvas, detection.mask, rgb);

            let [x_min, y_min, x_max, y_max] = detection.roi.map(|v| v.round() as i32);
            draw_dashed_rect_mut(&mut canvas, [x_min, y_min, x_max, y_max], rgb);

            if let Some(font) = &self.font {
                let caption = format!("{} {:.3}", label, detection.score);
                self.draw_caption(&mut canvas, font, &caption, x_min, y_min, rgb);
            }
        }

        Ok(canvas)
    }

    fn draw_caption(
        &self,
        image: &mut RgbImage,
        font: &FontArc,
        caption: &str,
        x: i32,
        y: i32,
        background: Rgb<u8>,
    ) {
        let (text_width, text_height) = text_size(self.font_scale, font, caption);
        let width = text_width + 2 * CAPTION_PADDING as u32;
        let height = text_height + 2 * CAPTION_PADDING as u32;

        // Above the box when there is room, otherwise just inside it.
        let label_y = if y >= height as i32 { y - height as i32 } else { y.max(0) };
        let label_x = x.clamp(0, (image.width() as i32 - 1).max(0));

        draw_filled_rect_mut(
            image,
            Rect::at(label_x, label_y).of_size(width, height),
            background,
        );
        draw_text_mut(
            image,
            Rgb([255, 255, 255]),
            label_x + CAPTION_PADDING,
            label_y + CAPTION_PADDING,
            self.font_scale,
            font,
            caption,
        );
    }
}

fn put_pixel_checked(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_mask_outline(image: &mut RgbImage, mask: &image::GrayImage, color: Rgb<u8>) {
    for contour in find_contours::<i32>(mask) {
        for point in contour.points {
            put_pixel_checked(image, point.x, point.y, color);
        }
    }
}

/// Draws a dashed rectangle `[x_min, y_min, x_max, y_max]`; pixels outside the image are skipped.
fn draw_dashed_rect_mut(image: &mut RgbImage, bbox: [i32; 4], color: Rgb<u8>) {
    let [x_min, y_min, x_max, y_max] = bbox;
    if x_min >= x_max || y_min >= y_max {
        return;
    }
    let on_dash = |offset: i32| (offset / DASH_LENGTH) % 2 == 0;

    for t in 0..BOX_THICKNESS {
        for x in x_min..=x_max {
            if on_dash(x - x_min) {
                put_pixel_checked(image, x, y_min + t, color);
                put_pixel_checked(image, x, y_max - t, color);
            }
        }
        for y in y_min..=y_max {
            if on_dash(y - y_min) {
                put_pixel_checked(image, x_min + t, y, color);
                put_pixel_checked(image, x_max - t, y, color);
            }
        }
    }
}
