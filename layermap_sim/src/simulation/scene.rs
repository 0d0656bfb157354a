// layermap_sim/src/simulation/scene.rs

use layermap_core::camera::Camera;
use layermap_core::image::{ColorImage, DepthImage, MonoImage};
use rand_distr::{Distribution, Normal};

use super::config::SceneConfig;
use super::prng::SimulationRng;
use super::SimError;

/// Value of box pixels in the ground-truth mask.
pub const BOX_MASK_VALUE: u8 = 255;

/// One rendered camera frame.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    pub index: usize,
    pub depth: DepthImage,
    pub color: ColorImage,
    /// Ground-truth segmentation of the box. Stands in for a person detector in the
    /// human scenarios.
    pub mask: MonoImage,
    pub box_visible: bool,
}

/// Renders the wall-and-box scene for a static camera.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    config: SceneConfig,
    rows: usize,
    cols: usize,
    /// Pixel bounds of the box, `[row_min, row_max) x [col_min, col_max)`.
    box_rows: (usize, usize),
    box_cols: (usize, usize),
    noise: Option<Normal<f32>>,
}

impl SyntheticScene {
    pub fn new(config: SceneConfig, camera: &Camera) -> Result<Self, SimError> {
        if !(config.wall_depth_m > 0.0 && config.box_depth_m > 0.0) {
            return Err(SimError::InvalidScene(format!(
                "depths must be positive, got wall={} box={}",
                config.wall_depth_m, config.box_depth_m
            )));
        }
        let noise = if config.depth_noise_stddev_m > 0.0 {
            let normal = Normal::new(0.0, config.depth_noise_stddev_m)
                .map_err(|e| SimError::InvalidScene(e.to_string()))?;
            Some(normal)
        } else {
            None
        };

        let (rows, cols) = camera.dims();
        let to_pixels = |fraction: f32, extent: usize| -> usize {
            ((fraction.clamp(0.0, 1.0) * extent as f32).round() as usize).min(extent)
        };
        let box_rows = (
            to_pixels(config.box_min_uv[1], rows),
            to_pixels(config.box_max_uv[1], rows),
        );
        let box_cols = (
            to_pixels(config.box_min_uv[0], cols),
            to_pixels(config.box_max_uv[0], cols),
        );

        Ok(Self {
            config,
            rows,
            cols,
            box_rows,
            box_cols,
            noise,
        })
    }

    pub fn is_box_visible(&self, frame: usize) -> bool {
        (self.config.box_appear_frame..self.config.box_vanish_frame).contains(&frame)
    }

    fn in_box(&self, row: usize, col: usize) -> bool {
        (self.box_rows.0..self.box_rows.1).contains(&row)
            && (self.box_cols.0..self.box_cols.1).contains(&col)
    }

    /// Number of pixels the box covers when visible.
    pub fn box_pixel_count(&self) -> usize {
        self.box_rows.1.saturating_sub(self.box_rows.0)
            * self.box_cols.1.saturating_sub(self.box_cols.0)
    }

    pub fn render(&self, frame: usize, rng: &mut SimulationRng) -> SceneFrame {
        let box_visible = self.is_box_visible(frame);
        let on_box = |row, col| box_visible && self.in_box(row, col);

        let depth = DepthImage::from_fn(self.rows, self.cols, |row, col| {
            let exact = if on_box(row, col) {
                self.config.box_depth_m
            } else {
                self.config.wall_depth_m
            };
            match &self.noise {
                // Keep noisy samples in front of the camera.
                Some(noise) => (exact + noise.sample(&mut rng.0)).max(0.01),
                None => exact,
            }
        });
        let color = ColorImage::from_fn(self.rows, self.cols, |row, col| {
            if on_box(row, col) {
                self.config.box_color
            } else {
                self.config.wall_color
            }
        });
        let mask = MonoImage::from_fn(self.rows, self.cols, |row, col| {
            if on_box(row, col) {
                BOX_MASK_VALUE
            } else {
                0
            }
        });

        SceneFrame {
            index: frame,
            depth,
            color,
            mask,
            box_visible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn camera() -> Camera {
        Camera::new(40.0, 40.0, 20.0, 15.0, 40, 30).unwrap()
    }

    #[test]
    fn test_box_follows_its_schedule() {
        let scene = SyntheticScene::new(SceneConfig::default(), &camera()).unwrap();
        let mut rng = SimulationRng::from_seed(Some(1));

        let before = scene.render(14, &mut rng);
        assert!(!before.box_visible);
        assert!(before.mask.data().iter().all(|&m| m == 0));
        assert!(before.depth.data().iter().all(|&d| d == 3.0));

        let during = scene.render(15, &mut rng);
        assert!(during.box_visible);
        let masked = during.mask.data().iter().filter(|&&m| m == BOX_MASK_VALUE).count();
        assert_eq!(masked, scene.box_pixel_count());
        assert_eq!(during.depth[(15, 20)], 1.5);
        assert_eq!(during.color[(15, 20)], SceneConfig::default().box_color);
        assert_eq!(during.depth[(0, 0)], 3.0);

        assert!(!scene.render(50, &mut rng).box_visible);
    }

    #[test]
    fn test_noise_is_reproducible_with_a_seed() {
        let config = SceneConfig {
            depth_noise_stddev_m: 0.01,
            ..SceneConfig::default()
        };
        let scene = SyntheticScene::new(config, &camera()).unwrap();
        let a = scene.render(0, &mut SimulationRng::from_seed(Some(3)));
        let b = scene.render(0, &mut SimulationRng::from_seed(Some(3)));
        assert_eq!(a.depth, b.depth);
        assert!(a.depth.data().iter().any(|&d| d != 3.0));
        let mean = a.depth.data().iter().sum::<f32>() / a.depth.num_pixels() as f32;
        assert_abs_diff_eq!(mean, 3.0, epsilon = 0.01);
    }

    #[test]
    fn test_rejects_non_positive_depth() {
        let config = SceneConfig {
            wall_depth_m: 0.0,
            ..SceneConfig::default()
        };
        assert!(matches!(
            SyntheticScene::new(config, &camera()),
            Err(SimError::InvalidScene(_))
        ));
    }
}
