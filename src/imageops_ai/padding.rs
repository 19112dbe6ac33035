use image::{imageops, GenericImageView, ImageBuffer, Pixel, Primitive};

/// Places `image` at the top-left of a `pad_width` x `pad_height` canvas filled with `color`.
///
/// Returns `None` when the canvas is smaller than the image.
pub fn padding<I, P, S>(
    image: &I,
    pad_width: u32,
    pad_height: u32,
    color: P,
) -> Option<ImageBuffer<P, Vec<S>>>
where
    I: GenericImageView<Pixel = P>,
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    let (width, height) = image.dimensions();
    if width > pad_width || height > pad_height {
        return None;
    }

    let mut canvas = ImageBuffer::from_pixel(pad_width, pad_height, color);
    imageops::overlay(&mut canvas, image, 0, 0);
    Some(canvas)
}

/// Pads bottom and right so both sides become multiples of `divisor`.
///
/// Returns `None` when `divisor` is zero.
pub fn pad_to_multiple<I, P, S>(image: &I, divisor: u32, color: P) -> Option<ImageBuffer<P, Vec<S>>>
where
    I: GenericImageView<Pixel = P>,
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    let (width, height) = image.dimensions();
    let pad_width = width.checked_next_multiple_of(divisor)?;
    let pad_height = height.checked_next_multiple_of(divisor)?;
    padding(image, pad_width, pad_height, color)
}
