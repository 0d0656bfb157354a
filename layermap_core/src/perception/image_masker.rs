// layermap_core/src/perception/image_masker.rs

//! Splitting frames into the part under a mask and the rest.

use crate::camera::Camera;
use crate::error::{MapperError, MapperResult};
use crate::image::{is_valid_depth, DepthImage, Image, MonoImage, Pixel};
use crate::scratch::ScratchImage;
use crate::types::Transform;

/// The two reusable outputs of a split.
#[derive(Debug, Clone)]
pub struct SplitBuffers<T> {
    pub masked: ScratchImage<T>,
    pub unmasked: ScratchImage<T>,
}

impl<T: Pixel> SplitBuffers<T> {
    pub const fn new(masked_name: &'static str, unmasked_name: &'static str) -> Self {
        Self {
            masked: ScratchImage::new(masked_name),
            unmasked: ScratchImage::new(unmasked_name),
        }
    }

    /// Both buffers at `(rows, cols)`. Checks both sizes before allocating either.
    pub fn prepare(&mut self, rows: usize, cols: usize) -> MapperResult<(&mut Image<T>, &mut Image<T>)> {
        self.check_size(rows, cols)?;
        let masked = self.masked.ensure_size(rows, cols)?;
        let unmasked = self.unmasked.ensure_size(rows, cols)?;
        Ok((masked, unmasked))
    }

    pub fn check_size(&self, rows: usize, cols: usize) -> MapperResult<()> {
        self.masked.check_size(rows, cols)?;
        self.unmasked.check_size(rows, cols)
    }
}

fn write_split<T: Pixel>(
    image: &Image<T>,
    is_masked: impl Fn(usize, usize) -> bool,
    masked: &mut Image<T>,
    unmasked: &mut Image<T>,
) {
    for (row, col, value) in image.iter_pixels() {
        let (keep, drop) = if is_masked(row, col) {
            (&mut *masked, &mut *unmasked)
        } else {
            (&mut *unmasked, &mut *masked)
        };
        keep[(row, col)] = value;
        drop[(row, col)] = T::MASKED_OUT;
    }
}

// --- Plain split ---

/// Splits `image` by `mask` into `(masked, unmasked)`. Pixels under a nonzero mask
/// value go to `masked`; the other output holds `T::MASKED_OUT` there.
pub fn split_image<T: Pixel>(image: &Image<T>, mask: &MonoImage) -> MapperResult<(Image<T>, Image<T>)> {
    image.check_same_dims(mask, "split mask")?;
    let mut masked = Image::filled(image.rows(), image.cols(), T::MASKED_OUT);
    let mut unmasked = masked.clone();
    write_split(image, |r, c| mask[(r, c)] > 0, &mut masked, &mut unmasked);
    Ok((masked, unmasked))
}

/// As [`split_image`], writing into reusable buffers.
pub fn split_into<T: Pixel>(
    image: &Image<T>,
    mask: &MonoImage,
    out: &mut SplitBuffers<T>,
) -> MapperResult<()> {
    image.check_same_dims(mask, "split mask")?;
    let (masked, unmasked) = out.prepare(image.rows(), image.cols())?;
    write_split(image, |r, c| mask[(r, c)] > 0, masked, unmasked);
    Ok(())
}

// --- Split through a second camera ---

/// Per-pixel decision of whether a depth pixel lies under a mask taken by another
/// camera. `t_cm_cd` maps depth-camera points into the mask camera frame.
fn reprojected_mask_lookup<'a>(
    depth: &'a DepthImage,
    mask: &'a MonoImage,
    t_cm_cd: &'a Transform,
    depth_camera: &'a Camera,
    mask_camera: &'a Camera,
) -> MapperResult<impl Fn(usize, usize) -> bool + 'a> {
    depth_camera.validate()?;
    mask_camera.validate()?;
    if depth.dims() != depth_camera.dims() {
        return Err(MapperError::dimension_mismatch(
            "depth image vs depth camera",
            depth_camera.dims(),
            depth.dims(),
        ));
    }
    if mask.dims() != mask_camera.dims() {
        return Err(MapperError::dimension_mismatch(
            "mask image vs mask camera",
            mask_camera.dims(),
            mask.dims(),
        ));
    }

    Ok(move |row: usize, col: usize| {
        let d = depth[(row, col)];
        // Without a depth we can still follow the viewing ray.
        let z = if is_valid_depth(d) { d } else { 1.0 };
        let p_cm = t_cm_cd * depth_camera.unproject(row, col, z);
        mask_camera
            .project_to_pixel(&p_cm)
            .is_some_and(|(r, c)| mask[(r, c)] > 0)
    })
}

/// Resamples `mask` into the depth camera: pixel `(row, col)` of the output is
/// nonzero when that depth pixel lies under the mask.
pub fn reproject_mask_into(
    depth: &DepthImage,
    mask: &MonoImage,
    t_cm_cd: &Transform,
    depth_camera: &Camera,
    mask_camera: &Camera,
    out: &mut ScratchImage<u8>,
) -> MapperResult<()> {
    let is_masked = reprojected_mask_lookup(depth, mask, t_cm_cd, depth_camera, mask_camera)?;
    let buffer = out.ensure_size(depth.rows(), depth.cols())?;
    for row in 0..depth.rows() {
        for col in 0..depth.cols() {
            buffer[(row, col)] = if is_masked(row, col) { u8::MAX } else { 0 };
        }
    }
    Ok(())
}

/// Splits a depth frame by a mask seen from a different camera. Each depth pixel is
/// lifted to 3D, moved into the mask camera and looked up there; pixels that land
/// behind the mask camera or outside its image count as unmasked.
pub fn split_depth_reprojected(
    depth: &DepthImage,
    mask: &MonoImage,
    t_cm_cd: &Transform,
    depth_camera: &Camera,
    mask_camera: &Camera,
) -> MapperResult<(DepthImage, DepthImage)> {
    let is_masked = reprojected_mask_lookup(depth, mask, t_cm_cd, depth_camera, mask_camera)?;
    let mut masked = Image::filled(depth.rows(), depth.cols(), f32::MASKED_OUT);
    let mut unmasked = masked.clone();
    write_split(depth, is_masked, &mut masked, &mut unmasked);
    Ok((masked, unmasked))
}

/// As [`split_depth_reprojected`], writing into reusable buffers.
pub fn split_depth_reprojected_into(
    depth: &DepthImage,
    mask: &MonoImage,
    t_cm_cd: &Transform,
    depth_camera: &Camera,
    mask_camera: &Camera,
    out: &mut SplitBuffers<f32>,
) -> MapperResult<()> {
    let is_masked = reprojected_mask_lookup(depth, mask, t_cm_cd, depth_camera, mask_camera)?;
    let (masked, unmasked) = out.prepare(depth.rows(), depth.cols())?;
    write_split(depth, is_masked, masked, unmasked);
    Ok(())
}
