
use std::path::Path;

use crate::error::*;

/// Maps a tone-mapped half float to a 16-bit unorm value.
pub fn f16_to_u16_unorm(v: half::f16) -> u16
{
    let v = f32::from(v);
    if !(v > 0.0) { return 0; }  // Also catches NaN.
    return (v.min(1.0) * 65535.0 + 0.5) as u16;
}

/// Drops the row padding required by texture-to-buffer copies.
pub fn strip_row_padding(data: &[u8], padded_bytes_per_row: usize, unpadded_bytes_per_row: usize, height: usize) -> Vec<u8>
{
    let mut res = Vec::with_capacity(unpadded_bytes_per_row * height);
    for row in data.chunks(padded_bytes_per_row).take(height) {
        res.extend_from_slice(&row[..unpadded_bytes_per_row.min(row.len())]);
    }
    return res;
}

pub fn write_png_rgba16(path: &Path, width: u32, height: u32, pixels: &[u16]) -> Result<()>
{
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidPath);
    }

    let Some(img) = image::ImageBuffer::<image::Rgba<u16>, _>::from_raw(width, height, pixels.to_vec()) else {
        return Err(Error::InvalidState("pixel data does not match the image size"));
    };

    img.save_with_format(path, image::ImageFormat::Png)?;
    return Ok(());
}
