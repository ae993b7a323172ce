use image::RgbaImage;
use rayon::prelude::*;

use crate::{error::CompositeError, image_ref::ImageRef};

/// Straight (non-premultiplied) RGBA8 pixel.
pub type Rgba8 = [u8; 4];

/// Source-over for straight alpha: `src` on top of `dst`.
pub fn over(dst: Rgba8, src: Rgba8) -> Rgba8 {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    // Weights are scaled by 255 so that everything stays integral.
    let src_w = sa * 255;
    let dst_w = u32::from(dst[3]) * (255 - sa);
    let total = src_w + dst_w;

    let mut out = [0u8; 4];
    for i in 0..3 {
        let num = u32::from(src[i]) * src_w + u32::from(dst[i]) * dst_w;
        out[i] = ((num + total / 2) / total) as u8;
    }
    out[3] = ((total + 127) / 255) as u8;
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> Result<(), CompositeError> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(CompositeError::BufferLength);
    }
    dst.par_chunks_exact_mut(4)
        .zip(src.par_chunks_exact(4))
        .for_each(|(d, s)| {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
            d.copy_from_slice(&out);
        });
    Ok(())
}

/// Blends `foreground` over `background` after normalizing both to RGBA8.
///
/// Inputs are expected to have equal dimensions; the merger checks this before
/// calling, and a mismatch here is reported rather than resampled.
pub fn composite(
    foreground: &ImageRef,
    background: &ImageRef,
) -> Result<RgbaImage, CompositeError> {
    if foreground.dimensions() != background.dimensions() {
        return Err(CompositeError::SizeMismatch {
            fg: foreground.dimensions(),
            bg: background.dimensions(),
        });
    }
    let fg = foreground.to_rgba8();
    let mut out = background.to_rgba8();
    over_in_place(&mut out, fg.as_raw())?;
    Ok(out)
}
