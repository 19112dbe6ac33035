use image::Rgb;

use crate::errors::{InferError, Result};

const SATURATION: f32 = 0.5;
const VALUE: f32 = 0.5;

/// RGB triple with components in `[0, 1]`.
pub type RgbF = [f32; 3];

/// Converts an HSV color with all components in `[0, 1]` to RGB.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> RgbF {
    if s == 0.0 {
        return [v, v, v];
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i64).rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Full palette of `count` colors evenly spaced around the hue circle.
pub fn palette(count: usize) -> Vec<RgbF> {
    (0..count)
        .map(|i| hsv_to_rgb(i as f32 / count as f32, SATURATION, VALUE))
        .collect()
}

/// Picks the palette color of each id in `class_ids`, in order.
pub fn get_colors(count: usize, class_ids: &[usize]) -> Result<Vec<RgbF>> {
    let palette = palette(count);
    class_ids
        .iter()
        .map(|&id| {
            palette
                .get(id)
                .copied()
                .ok_or(InferError::InvalidClassId { id, count })
        })
        .collect()
}

pub fn to_rgb8([r, g, b]: RgbF) -> Rgb<u8> {
    let channel = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([channel(r), channel(g), channel(b)])
}
