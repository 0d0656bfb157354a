// layermap_core/src/perception/dynamics.rs

use super::overlay::{depth_mask_overlay_into, OverlayStyle};
use crate::camera::Camera;
use crate::error::{MapperError, MapperResult};
use crate::image::{is_valid_depth, Color, ColorImage, DepthImage, MonoImage};
use crate::layers::FreespaceLayer;
use crate::scratch::ScratchImage;
use crate::types::Transform;
use nalgebra::Point3;
use tracing::debug;

/// Mask value written for dynamic pixels.
pub const DYNAMIC_MASK_VALUE: u8 = 255;

/// Flags depth pixels that land in space the static map has seen empty for a long
/// time. Anything measured there must have moved in.
#[derive(Debug, Clone)]
pub struct DynamicsDetector {
    mask: ScratchImage<u8>,
    overlay: ScratchImage<Color>,
    overlay_style: OverlayStyle,
    /// Layer-frame points of the last flagged pixels.
    dynamic_points: Vec<Point3<f32>>,
}

impl Default for DynamicsDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicsDetector {
    pub fn new() -> Self {
        Self {
            mask: ScratchImage::new("dynamic_mask"),
            overlay: ScratchImage::new("dynamic_mask_overlay"),
            overlay_style: OverlayStyle::default(),
            dynamic_points: Vec::new(),
        }
    }

    /// Computes the dynamic mask of `depth`, taken from pose `t_l_c`, against the
    /// current state of `freespace`.
    pub fn compute_dynamics(
        &mut self,
        depth: &DepthImage,
        freespace: &FreespaceLayer,
        camera: &Camera,
        t_l_c: &Transform,
    ) -> MapperResult<&MonoImage> {
        camera.validate()?;
        if depth.dims() != camera.dims() {
            return Err(MapperError::dimension_mismatch(
                "dynamics depth vs camera",
                camera.dims(),
                depth.dims(),
            ));
        }
        let (rows, cols) = depth.dims();
        self.overlay.check_size(rows, cols)?;
        let mask = self.mask.ensure_size(rows, cols)?;

        self.dynamic_points.clear();
        for (row, col, d) in depth.iter_pixels() {
            let mut value = 0;
            if is_valid_depth(d) {
                let p_l = t_l_c * camera.unproject(row, col, d);
                let is_dynamic = freespace
                    .get_voxel(&p_l)
                    .is_some_and(|v| v.is_high_confidence_freespace);
                if is_dynamic {
                    value = DYNAMIC_MASK_VALUE;
                    self.dynamic_points.push(p_l);
                }
            }
            mask[(row, col)] = value;
        }
        debug!(num_dynamic = self.dynamic_points.len(), "Computed dynamics");

        depth_mask_overlay_into(depth, mask, &self.overlay_style, &mut self.overlay)?;
        Ok(mask)
    }

    /// The mask of the last frame.
    pub fn dynamic_mask(&self) -> Option<&MonoImage> {
        self.mask.get()
    }

    pub fn dynamic_points(&self) -> &[Point3<f32>] {
        &self.dynamic_points
    }

    pub fn dynamic_overlay(&self) -> Option<&ColorImage> {
        self.overlay.get()
    }
}
