//! Aspect-preserving resize and letterbox padding of face crops.
//!
//! A crop is scaled by a single factor so it fits inside the target size,
//! then padded with black pixels to exactly the target, content centred.

use crate::types::{Image, TargetSize};
use ndarray::{s, Array4, Axis};
use thiserror::Error;

// BT.601 luma weights, applied to BGR channels.
const LUMA_B: f32 = 0.114;
const LUMA_G: f32 = 0.587;
const LUMA_R: f32 = 0.299;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("cannot reshape an empty image ({height}x{width})")]
    EmptyImage { height: usize, width: usize },
}

/// Zero padding added on each side of the scaled content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadAmounts {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl PadAmounts {
    /// Split the leftover space of each axis as evenly as possible.
    pub fn centered(content_h: usize, content_w: usize, target_h: usize, target_w: usize) -> Self {
        let diff_h = target_h.saturating_sub(content_h);
        let diff_w = target_w.saturating_sub(content_w);
        Self {
            top: diff_h / 2,
            bottom: diff_h - diff_h / 2,
            left: diff_w / 2,
            right: diff_w - diff_w / 2,
        }
    }
}

/// Size `(height, width)` of the content after aspect-preserving scaling.
///
/// Each side is clamped to `[1, target]` so thin inputs (1×N) never vanish.
pub fn scaled_size(height: usize, width: usize, target: TargetSize) -> (usize, usize) {
    let target_w = target.width as usize;
    let target_h = target.height as usize;
    let factor = (target_w as f64 / width as f64).min(target_h as f64 / height as f64);

    let new_h = ((height as f64 * factor).floor() as usize).clamp(1, target_h);
    let new_w = ((width as f64 * factor).floor() as usize).clamp(1, target_w);
    (new_h, new_w)
}

/// Fit `image` into `target` without distorting it.
///
/// Optionally converts to grayscale first. Output shape is always
/// `(target.height, target.width, channels)`.
pub fn reshape_face(image: &Image, target: TargetSize, grayscale: bool) -> Result<Image, GeometryError> {
    let (height, width, _) = image.dim();
    if height == 0 || width == 0 {
        return Err(GeometryError::EmptyImage { height, width });
    }

    let source = if grayscale { to_grayscale(image) } else { image.clone() };

    let (new_h, new_w) = scaled_size(height, width, target);
    let resized = resize_bilinear(&source, new_h, new_w);

    let target_h = target.height as usize;
    let target_w = target.width as usize;
    let pad = PadAmounts::centered(new_h, new_w, target_h, target_w);
    let padded = pad_to(&resized, pad);

    tracing::trace!(
        height, width, new_h, new_w,
        pad_top = pad.top, pad_left = pad.left,
        "reshaped face crop"
    );

    // Backstop for rounding edge cases; the scaled size above already fits.
    if padded.dim().0 != target_h || padded.dim().1 != target_w {
        tracing::debug!(shape = ?padded.dim(), %target, "padded shape off target, forcing exact resize");
        return Ok(resize_bilinear(&padded, target_h, target_w));
    }

    Ok(padded)
}

/// Convert a BGR image to a single channel. Single-channel input is returned as is.
pub fn to_grayscale(image: &Image) -> Image {
    let (height, width, channels) = image.dim();
    if channels < 3 {
        return image.clone();
    }
    Image::from_shape_fn((height, width, 1), |(y, x, _)| {
        LUMA_B * image[[y, x, 0]] + LUMA_G * image[[y, x, 1]] + LUMA_R * image[[y, x, 2]]
    })
}

/// Bilinear resize of every channel to `(new_h, new_w)`, sampling at pixel centres.
pub fn resize_bilinear(image: &Image, new_h: usize, new_w: usize) -> Image {
    let (height, width, channels) = image.dim();
    if height == new_h && width == new_w {
        return image.clone();
    }

    let scale_y = height as f32 / new_h as f32;
    let scale_x = width as f32 / new_w as f32;
    let mut resized = Image::zeros((new_h, new_w, channels));

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);
        // Above the first row centre, stick to row 0.
        let fy = if src_y < 0.0 { 0.0 } else { fy };

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);
            let fx = if src_x < 0.0 { 0.0 } else { fx };

            for c in 0..channels {
                let tl = image[[y0, x0, c]];
                let tr = image[[y0, x1, c]];
                let bl = image[[y1, x0, c]];
                let br = image[[y1, x1, c]];

                resized[[y, x, c]] = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;
            }
        }
    }

    resized
}

/// Surround `image` with zero-valued pixels.
pub fn pad_to(image: &Image, pad: PadAmounts) -> Image {
    let (height, width, channels) = image.dim();
    let mut padded = Image::zeros((
        pad.top + height + pad.bottom,
        pad.left + width + pad.right,
        channels,
    ));
    padded
        .slice_mut(s![pad.top..pad.top + height, pad.left..pad.left + width, ..])
        .assign(image);
    padded
}

/// Scale pixels from `[0, 255]` to `[0, 1]` and add the batch axis.
pub fn to_tensor(image: &Image) -> Array4<f32> {
    image.mapv(|v| v / 255.0).insert_axis(Axis(0))
}
