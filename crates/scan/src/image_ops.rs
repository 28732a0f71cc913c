use image::imageops::FilterType;
use image::RgbImage;

use crate::error::ScanError;
use crate::ports::DetBox;

/// Longest image side after the pre-step resize.
pub const MAX_SIDE: u32 = 1600;

/// Decode bytes into RGB and shrink oversized photos.
///
/// Anything with a longest side above [`MAX_SIDE`] is scaled down by
/// `MAX_SIDE / longest` with an area-style filter; detection and OCR gain
/// nothing from 4000-pixel phone photos, they just pay for them. CPU-bound;
/// call under `spawn_blocking` on an async runtime.
pub fn decode_and_resize(data: &[u8]) -> Result<RgbImage, ScanError> {
    let img = image::load_from_memory(data)
        .map_err(|e| ScanError::InvalidImage(e.to_string()))?
        .to_rgb8();

    let longest = img.width().max(img.height());
    if longest <= MAX_SIDE {
        return Ok(img);
    }
    let scale = MAX_SIDE as f32 / longest as f32;
    let w = ((img.width() as f32 * scale) as u32).max(1);
    let h = ((img.height() as f32 * scale) as u32).max(1);
    Ok(image::imageops::resize(&img, w, h, FilterType::Triangle))
}

/// Crop a detection box with `pad` pixels of margin, clamped to the frame.
pub fn crop_with_pad(img: &RgbImage, b: &DetBox, pad: u32) -> RgbImage {
    let x1 = b.x1.saturating_sub(pad);
    let y1 = b.y1.saturating_sub(pad);
    let x2 = (b.x2 + pad).min(img.width().saturating_sub(1));
    let y2 = (b.y2 + pad).min(img.height().saturating_sub(1));
    let w = x2.saturating_sub(x1).max(1);
    let h = y2.saturating_sub(y1).max(1);
    image::imageops::crop_imm(img, x1, y1, w, h).to_image()
}
