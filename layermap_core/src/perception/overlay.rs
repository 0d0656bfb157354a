// layermap_core/src/perception/overlay.rs

//! Debug images showing a mask on top of the frame it was applied to.

use crate::error::MapperResult;
use crate::image::{is_valid_depth, Color, ColorImage, DepthImage, MonoImage};
use crate::scratch::ScratchImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Color mixed into masked pixels.
    pub tint: Color,
    pub tint_alpha: f32,
    /// Color of masked pixels that touch an unmasked pixel.
    pub boundary: Color,
    /// Depth rendered as white; closer is darker.
    pub max_depth_m: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            tint: Color::RED,
            tint_alpha: 0.4,
            boundary: Color::GREEN,
            max_depth_m: 10.0,
        }
    }
}

/// Grayscale rendering of a depth value. Invalid depth is black.
pub fn depth_to_gray(depth: f32, max_depth_m: f32) -> Color {
    if !is_valid_depth(depth) {
        return Color::BLACK;
    }
    let level = (depth / max_depth_m).clamp(0.0, 1.0) * 255.0;
    let level = level.round() as u8;
    Color::rgb(level, level, level)
}

fn is_boundary(mask: &MonoImage, row: usize, col: usize) -> bool {
    let (rows, cols) = mask.dims();
    let neighbours = [
        (row.wrapping_sub(1), col),
        (row + 1, col),
        (row, col.wrapping_sub(1)),
        (row, col + 1),
    ];
    neighbours
        .iter()
        .any(|&(r, c)| r < rows && c < cols && mask[(r, c)] == 0)
}

/// Draws `mask` over `base(row, col)` into `out`, which must match the mask size.
fn draw_overlay(
    mask: &MonoImage,
    base: impl Fn(usize, usize) -> Color,
    style: &OverlayStyle,
    out: &mut ColorImage,
) {
    for (row, col, m) in mask.iter_pixels() {
        let background = base(row, col);
        out[(row, col)] = if m == 0 {
            background
        } else if is_boundary(mask, row, col) {
            style.boundary
        } else {
            background.blend(style.tint, style.tint_alpha)
        };
    }
}

pub fn color_mask_overlay_into(
    color: &ColorImage,
    mask: &MonoImage,
    style: &OverlayStyle,
    out: &mut ScratchImage<Color>,
) -> MapperResult<()> {
    color.check_same_dims(mask, "color overlay mask")?;
    let buffer = out.ensure_size(mask.rows(), mask.cols())?;
    draw_overlay(mask, |r, c| color[(r, c)], style, buffer);
    Ok(())
}

pub fn depth_mask_overlay_into(
    depth: &DepthImage,
    mask: &MonoImage,
    style: &OverlayStyle,
    out: &mut ScratchImage<Color>,
) -> MapperResult<()> {
    depth.check_same_dims(mask, "depth overlay mask")?;
    let buffer = out.ensure_size(mask.rows(), mask.cols())?;
    draw_overlay(
        mask,
        |r, c| depth_to_gray(depth[(r, c)], style.max_depth_m),
        style,
        buffer,
    );
    Ok(())
}
