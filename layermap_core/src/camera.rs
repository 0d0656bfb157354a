// layermap_core/src/camera.rs

use crate::error::{MapperError, MapperResult};
use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A pinhole camera model.
///
/// Pixel `(u, v)` covers `[u, u + 1) x [v, v + 1)` in continuous image coordinates,
/// so its center sits at `(u + 0.5, v + 0.5)`. `u` runs along columns, `v` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    fu: f32,
    fv: f32,
    cu: f32,
    cv: f32,
    width: usize,
    height: usize,
}

impl Camera {
    /// Creates a camera, rejecting focal lengths that are not strictly positive and
    /// empty resolutions.
    pub fn new(
        fu: f32,
        fv: f32,
        cu: f32,
        cv: f32,
        width: usize,
        height: usize,
    ) -> MapperResult<Self> {
        let camera = Self {
            fu,
            fv,
            cu,
            cv,
            width,
            height,
        };
        camera.validate()?;
        Ok(camera)
    }

    /// Checks the intrinsics. Deserialized cameras bypass `new`, so callers that
    /// accept them validate again.
    pub fn validate(&self) -> MapperResult<()> {
        if !(self.fu.is_finite() && self.fu > 0.0 && self.fv.is_finite() && self.fv > 0.0) {
            return Err(MapperError::InvalidCameraModel(format!(
                "focal lengths must be positive, got fu={} fv={}",
                self.fu, self.fv
            )));
        }
        if !(self.cu.is_finite() && self.cv.is_finite()) {
            return Err(MapperError::InvalidCameraModel(format!(
                "principal point must be finite, got cu={} cv={}",
                self.cu, self.cv
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(MapperError::InvalidCameraModel(format!(
                "resolution must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn fu(&self) -> f32 {
        self.fu
    }

    pub fn fv(&self) -> f32 {
        self.fv
    }

    pub fn cu(&self) -> f32 {
        self.cu
    }

    pub fn cv(&self) -> f32 {
        self.cv
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `(rows, cols)` of images taken with this camera.
    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Projects a camera-frame point to continuous image coordinates `(u, v)`.
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p_c: &Point3<f32>) -> Option<Vector2<f32>> {
        if p_c.z <= 0.0 {
            return None;
        }
        Some(Vector2::new(
            self.fu * p_c.x / p_c.z + self.cu,
            self.fv * p_c.y / p_c.z + self.cv,
        ))
    }

    /// Projects a camera-frame point and returns the `(row, col)` of the pixel it
    /// falls in, if that pixel is inside the image.
    pub fn project_to_pixel(&self, p_c: &Point3<f32>) -> Option<(usize, usize)> {
        let uv = self.project(p_c)?;
        let (u, v) = (uv.x.floor(), uv.y.floor());
        if u < 0.0 || v < 0.0 || u >= self.width as f32 || v >= self.height as f32 {
            return None;
        }
        Some((v as usize, u as usize))
    }

    /// Back-projects the center of pixel `(row, col)` at the given depth (distance
    /// along the optical axis).
    pub fn unproject(&self, row: usize, col: usize, depth: f32) -> Point3<f32> {
        let ray = self.view_ray(row, col);
        Point3::from(ray * depth)
    }

    /// Ray through the center of pixel `(row, col)` with unit z component.
    pub fn view_ray(&self, row: usize, col: usize) -> Vector3<f32> {
        let u = col as f32 + 0.5;
        let v = row as f32 + 0.5;
        Vector3::new((u - self.cu) / self.fu, (v - self.cv) / self.fv, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_camera() -> Camera {
        Camera::new(100.0, 100.0, 32.0, 24.0, 64, 48).unwrap()
    }

    #[test]
    fn test_rejects_non_positive_focal_length() {
        assert!(matches!(
            Camera::new(0.0, 100.0, 32.0, 24.0, 64, 48),
            Err(MapperError::InvalidCameraModel(_))
        ));
        assert!(matches!(
            Camera::new(100.0, -1.0, 32.0, 24.0, 64, 48),
            Err(MapperError::InvalidCameraModel(_))
        ));
        assert!(matches!(
            Camera::new(100.0, 100.0, 32.0, 24.0, 0, 48),
            Err(MapperError::InvalidCameraModel(_))
        ));
    }

    #[test]
    fn test_unproject_project_returns_same_pixel() {
        let camera = test_camera();
        for &(row, col) in &[(0, 0), (10, 5), (47, 63), (24, 32)] {
            let p = camera.unproject(row, col, 2.5);
            assert_abs_diff_eq!(p.z, 2.5, epsilon = 1e-6);
            assert_eq!(camera.project_to_pixel(&p), Some((row, col)));
        }
    }

    #[test]
    fn test_points_behind_camera_do_not_project() {
        let camera = test_camera();
        assert!(camera.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
        assert!(camera.project_to_pixel(&Point3::new(10.0, 0.0, 1.0)).is_none());
    }
}
