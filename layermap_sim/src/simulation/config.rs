// layermap_sim/src/simulation/config.rs

//! Scenario files. A scenario is a TOML document with one table per concern:
//! `[simulation]`, `[camera]`, `[scene]` and `[mapper]`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use layermap_core::camera::Camera;
use layermap_core::config::MultiMapperConfig;
use layermap_core::error::MapperResult;
use layermap_core::image::Color;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::SimError;

// =========================================================================
// == Top-Level Scenario Configuration ==
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation: SimulationSection,
    pub camera: CameraConfig,
    pub scene: SceneConfig,
    pub mapper: MultiMapperConfig,
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSection {
    /// Optional seed for the depth noise. Unseeded runs draw from the OS.
    pub seed: Option<u64>,
    pub frames: usize,
    /// Time between two frames, used as the mapper update time.
    pub frame_period_ms: i64,
    /// Run the ESDF and mesh updates every this many frames. 0 disables them until
    /// the final frame.
    pub map_update_every_n_frames: usize,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: None,
            frames: 90,
            frame_period_ms: 100,
            map_update_every_n_frames: 10,
        }
    }
}

/// Pinhole intrinsics of the simulated depth and color camera. Both streams share
/// one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    pub fu: f32,
    pub fv: f32,
    pub cu: f32,
    pub cv: f32,
    pub width: usize,
    pub height: usize,
    /// Camera position in the layer frame. The camera looks along +z.
    pub position_m: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fu: 80.0,
            fv: 80.0,
            cu: 40.0,
            cv: 30.0,
            width: 80,
            height: 60,
            position_m: [0.0; 3],
        }
    }
}

impl CameraConfig {
    pub fn camera(&self) -> MapperResult<Camera> {
        Camera::new(self.fu, self.fv, self.cu, self.cv, self.width, self.height)
    }
}

/// A wall parallel to the image plane with an optional box in front of it.
///
/// The box is given in normalized image coordinates so the same scene works for
/// any camera resolution. It is visible for frames in
/// `[box_appear_frame, box_vanish_frame)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    pub wall_depth_m: f32,
    pub wall_color: Color,
    pub box_depth_m: f32,
    pub box_color: Color,
    /// Top-left corner as (x, y) fractions of the image width and height.
    pub box_min_uv: [f32; 2],
    pub box_max_uv: [f32; 2],
    pub box_appear_frame: usize,
    pub box_vanish_frame: usize,
    /// Standard deviation of the additive depth noise. 0 renders exact depth.
    pub depth_noise_stddev_m: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            wall_depth_m: 3.0,
            wall_color: Color::GRAY,
            box_depth_m: 1.5,
            box_color: Color::RED,
            box_min_uv: [0.35, 0.35],
            box_max_uv: [0.65, 0.65],
            box_appear_frame: 15,
            box_vanish_frame: 50,
            depth_noise_stddev_m: 0.0,
        }
    }
}

// =========================================================================
// == Loading ==
// =========================================================================

/// Builds the layered figment for a scenario: defaults, then the file, then
/// `LAYERMAP_` environment variables (`LAYERMAP_SIMULATION__FRAMES=20`).
pub fn scenario_figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(ScenarioConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LAYERMAP_").split("__"))
}

pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    info!("Loading scenario from: {}", path.display());
    if !path.exists() {
        return Err(SimError::MissingScenario(path.to_path_buf()));
    }
    let config: ScenarioConfig = scenario_figment(path).extract().map_err(Box::new)?;
    config.camera.camera()?;
    Ok(config)
}

/// Parses a scenario from a TOML string, without the environment layer.
pub fn parse_scenario(toml_str: &str) -> Result<ScenarioConfig, SimError> {
    let config: ScenarioConfig = Figment::from(Serialized::defaults(ScenarioConfig::default()))
        .merge(Toml::string(toml_str))
        .extract()
        .map_err(Box::new)?;
    config.camera.camera()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layermap_core::multi_mapper::MappingType;
    use layermap_core::perception::Connectivity;

    #[test]
    fn test_empty_scenario_uses_defaults() {
        let config = parse_scenario("").unwrap();
        assert_eq!(config, ScenarioConfig::default());
        assert_eq!(config.mapper.mapping_type, MappingType::StaticTsdf);
    }

    #[test]
    fn test_partial_tables_keep_remaining_defaults() {
        let config = parse_scenario(
            r#"
            [simulation]
            frames = 12
            seed = 7

            [mapper]
            mapping_type = "human_with_static_occupancy"
            voxel_size_m = 0.1

            [mapper.multi_mapper]
            connected_mask_component_size_threshold = 50
            mask_connectivity = "four"
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.frames, 12);
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.simulation.frame_period_ms, 100);
        assert_eq!(config.mapper.mapping_type, MappingType::HumanWithStaticOccupancy);
        assert_eq!(config.mapper.multi_mapper.connected_mask_component_size_threshold, 50);
        assert_eq!(config.mapper.multi_mapper.mask_connectivity, Connectivity::Four);
        assert_eq!(config.scene, SceneConfig::default());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(matches!(
            parse_scenario("[simulation]\nduration_seconds = 3.0\n"),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_camera_is_rejected() {
        assert!(matches!(
            parse_scenario("[camera]\nfu = 0.0\n"),
            Err(SimError::Mapper(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_scenario(Path::new("does/not/exist.toml"));
        assert!(matches!(err, Err(SimError::MissingScenario(_))));
    }
}
