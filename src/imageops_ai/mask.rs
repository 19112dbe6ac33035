use anyhow::{anyhow, ensure, Result};
use image::{
    imageops::{self, FilterType},
    GrayImage, ImageBuffer, Luma, Pixel, Primitive, Rgb,
};
use ndarray::ArrayView2;
use num_traits::AsPrimitive;

use crate::imageops_ai::get_max_value;

/// Scales a low-resolution mask of probabilities into `roi` and binarizes it.
///
/// The result is a `width` x `height` mask with 255 inside the instance and 0
/// elsewhere. `roi` is `[x_min, y_min, x_max, y_max]` in output pixels.
pub fn paste_mask(
    mask: ArrayView2<f32>,
    roi: [f32; 4],
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<GrayImage> {
    let mut full = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return Ok(full);
    }

    let x_min = (roi[0].floor().max(0.0) as u32).min(width - 1);
    let y_min = (roi[1].floor().max(0.0) as u32).min(height - 1);
    let x_max = (roi[2].ceil().max(0.0) as u32).clamp(x_min + 1, width);
    let y_max = (roi[3].ceil().max(0.0) as u32).clamp(y_min + 1, height);

    let (rows, cols) = mask.dim();
    ensure!(rows > 0 && cols > 0, "mask has no pixels");
    let source: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(
        cols as u32,
        rows as u32,
        mask.as_standard_layout().iter().copied().collect(),
    )
    .ok_or_else(|| anyhow!("failed to create mask buffer of {}x{}", cols, rows))?;

    let scaled = imageops::resize(
        &source,
        x_max - x_min,
        y_max - y_min,
        FilterType::Triangle,
    );
    for (x, y, Luma([p])) in scaled.enumerate_pixels() {
        if *p >= threshold {
            full.put_pixel(x_min + x, y_min + y, Luma([255]));
        }
    }

    Ok(full)
}

/// Blends `color` over the pixels selected by `mask` with the given opacity.
///
/// `color` components are in `[0, 1]`.
pub fn apply<SI>(
    image: &mut ImageBuffer<Rgb<SI>, Vec<SI>>,
    mask: &GrayImage,
    color: [f32; 3],
    alpha: f32,
) -> Result<()>
where
    Rgb<SI>: Pixel<Subpixel = SI>,
    SI: Primitive + AsPrimitive<f32> + 'static,
    f32: AsPrimitive<SI>,
{
    ensure!(
        image.dimensions() == mask.dimensions(),
        "Image and mask dimensions do not match"
    );

    let si_max: f32 = get_max_value::<SI>().as_();

    for (pixel, Luma([m])) in image.pixels_mut().zip(mask.pixels()) {
        if *m == 0 {
            continue;
        }
        for (channel, tint) in pixel.0.iter_mut().zip(color) {
            let value = channel.as_() * (1.0 - alpha) + alpha * tint * si_max;
            *channel = value.clamp(0.0, si_max).as_();
        }
    }

    Ok(())
}
