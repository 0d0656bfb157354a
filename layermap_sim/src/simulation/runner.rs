// layermap_sim/src/simulation/runner.rs

use layermap_core::prelude::*;
use nalgebra::{Translation3, UnitQuaternion};
use std::sync::Arc;
use tracing::{debug, info};

use super::config::ScenarioConfig;
use super::prng::SimulationRng;
use super::scene::{SceneFrame, SyntheticScene};
use super::SimError;

/// What a scenario run produced, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames: usize,
    pub unmasked_tsdf_blocks: usize,
    pub unmasked_occupancy_blocks: usize,
    pub masked_occupancy_blocks: usize,
    /// Sum over all frames of the dynamic points the detector reported.
    pub dynamic_points: usize,
    /// Frames with at least one dynamic point.
    pub dynamic_frames: usize,
    pub esdf_sites: usize,
    pub esdf_excluded_sites: usize,
    pub mesh_updates: usize,
    pub mesh_blocks_sent: usize,
    pub mesh_bytes_sent: usize,
}

/// Drives one scenario through a [`MultiMapper`].
pub struct ScenarioRunner {
    config: ScenarioConfig,
    camera: Camera,
    t_l_c: Transform,
    scene: SyntheticScene,
    mapper: MultiMapper,
    rng: SimulationRng,
    serialize_full_mesh: bool,
}

impl ScenarioRunner {
    pub fn new(config: ScenarioConfig, rng: SimulationRng) -> Result<Self, SimError> {
        let camera = config.camera.camera()?;
        let [x, y, z] = config.camera.position_m;
        let t_l_c = Transform::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity());
        let scene = SyntheticScene::new(config.scene.clone(), &camera)?;
        let stream = Arc::new(ExecutionStream::new("layermap_sim"));
        let mapper = MultiMapper::from_config(&config.mapper, stream)?;
        info!(
            mapping_type = %mapper.mapping_type(),
            voxel_size = mapper.voxel_size(),
            frames = config.simulation.frames,
            "Built multi mapper"
        );
        debug!("Parameters:\n{}", mapper.parameters_as_string());

        Ok(Self {
            config,
            camera,
            t_l_c,
            scene,
            mapper,
            rng,
            serialize_full_mesh: false,
        })
    }

    pub fn with_full_mesh(mut self, serialize_full_mesh: bool) -> Self {
        self.serialize_full_mesh = serialize_full_mesh;
        self
    }

    pub fn mapper(&self) -> &MultiMapper {
        &self.mapper
    }

    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let frames = self.config.simulation.frames;
        let every_n = self.config.simulation.map_update_every_n_frames;
        let mut summary = RunSummary::default();

        for index in 0..frames {
            let frame = self.scene.render(index, &mut self.rng);
            self.integrate(&frame)?;

            let num_dynamic = self.mapper.last_dynamic_pointcloud().len();
            summary.dynamic_points += num_dynamic;
            if num_dynamic > 0 {
                summary.dynamic_frames += 1;
            }
            summary.frames += 1;

            let is_last = index + 1 == frames;
            let is_update_frame = every_n > 0 && (index + 1) % every_n == 0;
            if is_update_frame || is_last {
                self.update_maps(&mut summary);
            }
        }

        summary.unmasked_tsdf_blocks = self.mapper.unmasked_mapper().tsdf_layer().num_blocks();
        summary.unmasked_occupancy_blocks =
            self.mapper.unmasked_mapper().occupancy_layer().num_blocks();
        summary.masked_occupancy_blocks = self
            .mapper
            .masked_mapper()
            .map_or(0, |m| m.occupancy_layer().num_blocks());
        info!(?summary, "Scenario finished");
        Ok(summary)
    }

    fn integrate(&mut self, frame: &SceneFrame) -> Result<(), SimError> {
        let update_time_ms = frame.index as i64 * self.config.simulation.frame_period_ms;
        if self.mapper.mapping_type().is_human_mapping() {
            // Depth and mask come from the same simulated sensor.
            self.mapper.integrate_depth_masked(
                &frame.depth,
                &frame.mask,
                &self.t_l_c,
                &Transform::identity(),
                &self.camera,
                &self.camera,
            )?;
            self.mapper
                .integrate_color_masked(&frame.color, &frame.mask, &self.t_l_c, &self.camera)?;
        } else {
            self.mapper.integrate_depth(
                &frame.depth,
                &self.t_l_c,
                &self.camera,
                Some(update_time_ms),
            )?;
            self.mapper
                .integrate_color(&frame.color, &self.t_l_c, &self.camera)?;
        }
        Ok(())
    }

    fn update_maps(&mut self, summary: &mut RunSummary) {
        let esdf = self.mapper.update_esdf();
        summary.esdf_sites += esdf.unmasked.num_sites;
        summary.esdf_excluded_sites += esdf.unmasked.num_excluded_sites;

        let mesh = self
            .mapper
            .update_mesh(Some(&self.t_l_c), self.serialize_full_mesh);
        summary.mesh_updates += 1;
        summary.mesh_blocks_sent += mesh.num_blocks();
        summary.mesh_bytes_sent += mesh.to_bytes().len();
        debug!(
            num_sites = esdf.unmasked.num_sites,
            num_excluded = esdf.unmasked.num_excluded_sites,
            mesh_blocks = mesh.num_blocks(),
            "Updated ESDF and mesh"
        );
    }
}

/// Runs a scenario end to end.
pub fn run_scenario(config: ScenarioConfig, rng: SimulationRng) -> Result<RunSummary, SimError> {
    ScenarioRunner::new(config, rng)?.run()
}
