// layermap_core/src/mapping/voxel_mapper.rs

use super::esdf::{compute_esdf, EsdfUpdateStats, GeometrySource, SiteFilter};
use super::integrators::{
    blocks_in_view, integrate_color, integrate_occupancy, integrate_tsdf, update_freespace,
};
use super::mesh::{extract_block_mesh, MeshLayer};
use super::params::MapperParams;
use super::Mapper;
use crate::camera::Camera;
use crate::error::{MapperError, MapperResult};
use crate::image::{Color, ColorImage, DepthImage, Image, Pixel};
use crate::layers::{
    index_sort_key, ColorLayer, EsdfLayer, FreespaceLayer, OccupancyLayer, TsdfLayer,
};
use crate::params::ParameterTreeNode;
use crate::stream::ExecutionStream;
use crate::types::{EsdfMode, Index3D, MemoryType, ProjectiveLayerType, TimeMs, Transform};
use nalgebra::Vector3;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// A single-volume mapper running every stage on the CPU.
///
/// Keeps one geometry layer (TSDF or occupancy, chosen at construction) together
/// with color, ESDF, mesh and optionally freespace layers. All layers share one
/// voxel size.
#[derive(Debug, Clone)]
pub struct VoxelMapper {
    voxel_size: f32,
    layer_type: ProjectiveLayerType,
    esdf_mode: EsdfMode,
    memory_type: MemoryType,
    freespace_enabled: bool,
    stream: Arc<ExecutionStream>,
    params: MapperParams,

    tsdf: TsdfLayer,
    occupancy: OccupancyLayer,
    freespace: FreespaceLayer,
    color: ColorLayer,
    esdf: EsdfLayer,
    mesh: MeshLayer,

    /// Blocks whose geometry changed since the last mesh update.
    mesh_dirty_blocks: HashSet<Index3D>,
    last_update_time_ms: Option<TimeMs>,
}

impl VoxelMapper {
    pub fn new(
        voxel_size: f32,
        layer_type: ProjectiveLayerType,
        esdf_mode: EsdfMode,
        memory_type: MemoryType,
        freespace_enabled: bool,
        stream: Arc<ExecutionStream>,
        params: MapperParams,
    ) -> MapperResult<Self> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(MapperError::UnsupportedConfiguration(format!(
                "voxel size must be positive, got {voxel_size}"
            )));
        }
        if freespace_enabled && layer_type != ProjectiveLayerType::Tsdf {
            return Err(MapperError::UnsupportedConfiguration(
                "freespace tracking requires a tsdf mapper".to_string(),
            ));
        }
        params.validate()?;

        debug!(
            voxel_size,
            %layer_type,
            %esdf_mode,
            %memory_type,
            freespace_enabled,
            "Created voxel mapper"
        );
        Ok(Self {
            voxel_size,
            layer_type,
            esdf_mode,
            memory_type,
            freespace_enabled,
            stream,
            params,
            tsdf: TsdfLayer::new(voxel_size),
            occupancy: OccupancyLayer::new(voxel_size),
            freespace: FreespaceLayer::new(voxel_size),
            color: ColorLayer::new(voxel_size),
            esdf: EsdfLayer::new(voxel_size),
            mesh: MeshLayer::new(),
            mesh_dirty_blocks: HashSet::new(),
            last_update_time_ms: None,
        })
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn is_freespace_enabled(&self) -> bool {
        self.freespace_enabled
    }

    fn check_frame<T: Pixel>(image: &Image<T>, camera: &Camera, context: &'static str) -> MapperResult<()> {
        camera.validate()?;
        if image.dims() != camera.dims() {
            return Err(MapperError::dimension_mismatch(
                context,
                camera.dims(),
                image.dims(),
            ));
        }
        Ok(())
    }

    /// Global indices of the voxels that carry surface in the geometry layer.
    fn surface_voxels(&self) -> Vec<Index3D> {
        match self.layer_type {
            ProjectiveLayerType::Tsdf => {
                let band = self.params.projective.truncation_distance_vox * self.voxel_size;
                self.tsdf
                    .iter_voxels()
                    .filter(|(_, v)| v.is_observed() && v.distance.abs() <= band)
                    .map(|(index, _)| index)
                    .collect()
            }
            ProjectiveLayerType::Occupancy => self
                .occupancy
                .iter_voxels()
                .filter(|(_, v)| v.is_occupied())
                .map(|(index, _)| index)
                .collect(),
        }
    }
}

/// The block itself and its 26 neighbours. A block mesh reads voxels one step past
/// its faces on both sides, so all of them see a change in `block`.
fn blocks_touching(block: &Index3D) -> impl Iterator<Item = Index3D> + '_ {
    (0..27).map(move |i| block + Vector3::new(i % 3 - 1, (i / 3) % 3 - 1, i / 9 - 1))
}

impl Mapper for VoxelMapper {
    fn integrate_depth(
        &mut self,
        depth: &DepthImage,
        t_l_c: &Transform,
        camera: &Camera,
        update_time_ms: Option<TimeMs>,
    ) -> MapperResult<()> {
        Self::check_frame(depth, camera, "mapper depth frame")?;
        self.stream.issue("integrate_depth");

        let now = update_time_ms.unwrap_or_else(|| {
            self.last_update_time_ms
                .map_or(0, |t| t + self.params.freespace.default_frame_interval_ms)
        });

        let projective = &self.params.projective;
        let blocks = blocks_in_view(
            depth,
            t_l_c,
            camera,
            projective.truncation_distance_vox * self.voxel_size,
            projective.max_integration_distance_m,
            self.tsdf.block_size(),
        );

        match self.layer_type {
            ProjectiveLayerType::Tsdf => {
                let updated =
                    integrate_tsdf(&mut self.tsdf, &blocks, depth, t_l_c, camera, projective);
                if self.freespace_enabled {
                    update_freespace(
                        &mut self.freespace,
                        &self.tsdf,
                        &updated,
                        now,
                        &self.params.freespace,
                    );
                }
                debug!(num_blocks = blocks.len(), num_voxels = updated.len(), now, "Integrated tsdf");
            }
            ProjectiveLayerType::Occupancy => {
                let num_voxels = integrate_occupancy(
                    &mut self.occupancy,
                    &blocks,
                    depth,
                    t_l_c,
                    camera,
                    projective,
                    &self.params.occupancy,
                );
                debug!(num_blocks = blocks.len(), num_voxels, now, "Integrated occupancy");
            }
        }

        self.mesh_dirty_blocks.extend(blocks);
        self.last_update_time_ms = Some(now);
        Ok(())
    }

    fn integrate_color(
        &mut self,
        color: &ColorImage,
        t_l_c: &Transform,
        camera: &Camera,
    ) -> MapperResult<()> {
        Self::check_frame(color, camera, "mapper color frame")?;
        self.stream.issue("integrate_color");
        let surface = self.surface_voxels();
        let num_voxels = integrate_color(
            &mut self.color,
            surface,
            color,
            t_l_c,
            camera,
            &self.params.color,
        );
        debug!(num_voxels, "Integrated color");
        Ok(())
    }

    fn update_esdf(&mut self, filter: SiteFilter) -> EsdfUpdateStats {
        self.stream.issue("update_esdf");
        let source = match self.layer_type {
            ProjectiveLayerType::Tsdf => GeometrySource::Tsdf(&self.tsdf),
            ProjectiveLayerType::Occupancy => GeometrySource::Occupancy(&self.occupancy),
        };
        let stats = compute_esdf(
            source,
            &self.freespace,
            filter,
            self.esdf_mode,
            &self.params.esdf,
            &mut self.esdf,
        );
        debug!(?filter, ?stats, "Updated esdf");
        stats
    }

    fn update_mesh(&mut self) -> Vec<Index3D> {
        self.stream.issue("update_mesh");
        let mut affected: HashSet<Index3D> = HashSet::new();
        for block in &self.mesh_dirty_blocks {
            affected.extend(blocks_touching(block));
        }
        self.mesh_dirty_blocks.clear();

        let mut affected: Vec<Index3D> = affected.into_iter().collect();
        affected.sort_by_key(index_sort_key);

        let voxel_size = self.voxel_size;
        let min_weight = self.params.mesh.min_weight;
        let color_layer = &self.color;
        let color_at = |p: &nalgebra::Point3<f32>| {
            color_layer
                .get_voxel(p)
                .filter(|v| v.weight > 0.0)
                .map_or(Color::GRAY, |v| v.color)
        };

        for block in &affected {
            let mesh_block = match self.layer_type {
                ProjectiveLayerType::Tsdf => {
                    let tsdf = &self.tsdf;
                    let field = |i: &Index3D| {
                        tsdf.get_voxel_by_index(i)
                            .filter(|v| v.is_observed() && v.weight >= min_weight)
                            .map(|v| v.distance)
                    };
                    extract_block_mesh(block, voxel_size, &field, &color_at)
                }
                ProjectiveLayerType::Occupancy => {
                    let occupancy = &self.occupancy;
                    let field = |i: &Index3D| {
                        occupancy
                            .get_voxel_by_index(i)
                            .filter(|v| v.log_odds != 0.0)
                            .map(|v| -v.log_odds)
                    };
                    extract_block_mesh(block, voxel_size, &field, &color_at)
                }
            };
            self.mesh.set_block(*block, mesh_block);
        }
        debug!(
            num_blocks = affected.len(),
            num_mesh_blocks = self.mesh.num_blocks(),
            "Updated mesh"
        );
        affected
    }

    fn tsdf_layer(&self) -> &TsdfLayer {
        &self.tsdf
    }

    fn occupancy_layer(&self) -> &OccupancyLayer {
        &self.occupancy
    }

    fn freespace_layer(&self) -> &FreespaceLayer {
        &self.freespace
    }

    fn color_layer(&self) -> &ColorLayer {
        &self.color
    }

    fn esdf_layer(&self) -> &EsdfLayer {
        &self.esdf
    }

    fn mesh_layer(&self) -> &MeshLayer {
        &self.mesh
    }

    fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    fn projective_layer_type(&self) -> ProjectiveLayerType {
        self.layer_type
    }

    fn esdf_mode(&self) -> EsdfMode {
        self.esdf_mode
    }

    fn last_update_time_ms(&self) -> Option<TimeMs> {
        self.last_update_time_ms
    }

    fn params(&self) -> &MapperParams {
        &self.params
    }

    fn set_params(&mut self, params: MapperParams) -> MapperResult<()> {
        params.validate()?;
        info!(layer_type = %self.layer_type, "Replaced mapper parameters");
        self.params = params;
        Ok(())
    }

    fn parameter_tree(&self, name: &str) -> ParameterTreeNode {
        let mut children = vec![
            ParameterTreeNode::leaf("voxel_size", self.voxel_size),
            ParameterTreeNode::leaf("projective_layer_type", self.layer_type),
            ParameterTreeNode::leaf("esdf_mode", self.esdf_mode),
            ParameterTreeNode::leaf("memory_type", self.memory_type),
            ParameterTreeNode::leaf("freespace_enabled", self.freespace_enabled),
        ];
        children.extend(self.params.parameter_tree(name).children);
        ParameterTreeNode::group(name, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const VOXEL_SIZE: f32 = 0.1;

    fn camera() -> Camera {
        Camera::new(40.0, 40.0, 20.0, 15.0, 40, 30).unwrap()
    }

    fn mapper(layer_type: ProjectiveLayerType, freespace: bool) -> VoxelMapper {
        VoxelMapper::new(
            VOXEL_SIZE,
            layer_type,
            EsdfMode::ThreeD,
            MemoryType::Device,
            freespace,
            Arc::new(ExecutionStream::new("test")),
            MapperParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_construction() {
        let stream = Arc::new(ExecutionStream::new("test"));
        let bad_size = VoxelMapper::new(
            0.0,
            ProjectiveLayerType::Tsdf,
            EsdfMode::ThreeD,
            MemoryType::Host,
            false,
            stream.clone(),
            MapperParams::default(),
        );
        assert!(matches!(bad_size, Err(MapperError::UnsupportedConfiguration(_))));

        let freespace_on_occupancy = VoxelMapper::new(
            0.1,
            ProjectiveLayerType::Occupancy,
            EsdfMode::ThreeD,
            MemoryType::Host,
            true,
            stream,
            MapperParams::default(),
        );
        assert!(matches!(
            freespace_on_occupancy,
            Err(MapperError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_depth_must_match_camera() {
        let mut m = mapper(ProjectiveLayerType::Tsdf, false);
        let depth = DepthImage::filled(10, 10, 1.0);
        let err = m.integrate_depth(&depth, &Transform::identity(), &camera(), None);
        assert!(matches!(err, Err(MapperError::DimensionMismatch { .. })));
        assert!(m.tsdf_layer().is_empty());
        assert_eq!(m.last_update_time_ms(), None);
    }

    #[test]
    fn test_plane_produces_mesh_at_plane_depth() {
        let mut m = mapper(ProjectiveLayerType::Tsdf, false);
        let depth = DepthImage::filled(30, 40, 2.0);
        m.integrate_depth(&depth, &Transform::identity(), &camera(), None)
            .unwrap();
        let updated = m.update_mesh();
        assert!(!updated.is_empty());
        assert!(m.mesh_layer().num_triangles() > 0);
        for index in m.mesh_layer().block_indices() {
            for v in &m.mesh_layer().get_block(index).unwrap().vertices {
                assert_abs_diff_eq!(v.z, 2.0, epsilon = 0.05);
            }
        }
        // Nothing changed since.
        assert!(m.update_mesh().is_empty());
    }

    #[test]
    fn test_incremental_mesh_matches_mesh_from_scratch() {
        let left = DepthImage::from_fn(30, 40, |_, c| if c < 20 { 2.0 } else { 0.0 });
        let right = DepthImage::from_fn(30, 40, |_, c| if c >= 20 { 2.0 } else { 0.0 });
        let pose = Transform::identity();

        let mut incremental = mapper(ProjectiveLayerType::Tsdf, false);
        incremental.integrate_depth(&left, &pose, &camera(), None).unwrap();
        incremental.update_mesh();
        incremental.integrate_depth(&right, &pose, &camera(), None).unwrap();
        incremental.update_mesh();

        let mut batch = mapper(ProjectiveLayerType::Tsdf, false);
        batch.integrate_depth(&left, &pose, &camera(), None).unwrap();
        batch.integrate_depth(&right, &pose, &camera(), None).unwrap();
        batch.update_mesh();

        assert!(batch.mesh_layer().num_triangles() > 0);
        assert_eq!(
            incremental.mesh_layer().num_triangles(),
            batch.mesh_layer().num_triangles()
        );
        assert_eq!(incremental.mesh_layer(), batch.mesh_layer());
    }

    #[test]
    fn test_clock_advances_without_timestamps() {
        let mut m = mapper(ProjectiveLayerType::Tsdf, true);
        assert!(m.is_freespace_enabled());
        let depth = DepthImage::filled(30, 40, 2.0);
        m.integrate_depth(&depth, &Transform::identity(), &camera(), Some(500))
            .unwrap();
        m.integrate_depth(&depth, &Transform::identity(), &camera(), None)
            .unwrap();
        assert_eq!(m.last_update_time_ms(), Some(600));
        assert!(!m.freespace_layer().is_empty());
    }

    #[test]
    fn test_occupancy_mapper_finds_sites() {
        let mut m = mapper(ProjectiveLayerType::Occupancy, false);
        assert!(!m.is_freespace_enabled());
        let depth = DepthImage::filled(30, 40, 2.0);
        m.integrate_depth(&depth, &Transform::identity(), &camera(), None)
            .unwrap();
        assert!(m.tsdf_layer().is_empty());
        let stats = m.update_esdf(SiteFilter::All);
        assert!(stats.num_sites > 0);
    }

    #[test]
    fn test_color_lands_on_surface() {
        let mut m = mapper(ProjectiveLayerType::Tsdf, false);
        let depth = DepthImage::filled(30, 40, 2.0);
        m.integrate_depth(&depth, &Transform::identity(), &camera(), None)
            .unwrap();
        let color = ColorImage::filled(30, 40, Color::RED);
        m.integrate_color(&color, &Transform::identity(), &camera())
            .unwrap();
        let colored = m
            .color_layer()
            .iter_voxels()
            .filter(|(_, v)| v.weight > 0.0)
            .count();
        assert!(colored > 0);
        assert!(m
            .color_layer()
            .iter_voxels()
            .filter(|(_, v)| v.weight > 0.0)
            .all(|(_, v)| v.color == Color::RED));
    }
}
