// layermap_core/src/mapping/mod.rs

use crate::camera::Camera;
use crate::error::MapperResult;
use crate::image::{ColorImage, DepthImage};
use crate::layers::{ColorLayer, EsdfLayer, FreespaceLayer, OccupancyLayer, TsdfLayer};
use crate::params::ParameterTreeNode;
use crate::types::{EsdfMode, Index3D, ProjectiveLayerType, TimeMs, Transform};
use dyn_clone::DynClone;
use std::fmt::Debug;

// --- Declare the implementation sub-modules ---
pub mod esdf;
pub mod integrators;
pub mod mesh;
pub mod params;
pub mod streamer;
mod voxel_mapper;

// --- Re-export the public structs for a clean API ---
pub use esdf::{EsdfUpdateStats, SiteFilter};
pub use mesh::{MeshBlock, MeshLayer};
pub use params::MapperParams;
pub use streamer::{MeshStreamer, MeshStreamerParams, SerializedMesh};
pub use voxel_mapper::VoxelMapper;

// --- The Mapper Trait ("Contract") ---
/// The contract for a single reconstruction volume.
///
/// A mapper fuses depth and color frames into its geometry layer and derives the
/// distance field and mesh from it on request. The multi-mapper owns two of these
/// and routes frames between them.
pub trait Mapper: Send + Sync + Debug + DynClone {
    /// Fuses a depth frame taken from pose `t_l_c`. `update_time_ms` drives the
    /// freespace clock; when absent the clock advances by the configured frame
    /// interval.
    fn integrate_depth(
        &mut self,
        depth: &DepthImage,
        t_l_c: &Transform,
        camera: &Camera,
        update_time_ms: Option<TimeMs>,
    ) -> MapperResult<()>;

    /// Colors the surface voxels seen by a color frame. Transparent pixels are
    /// skipped.
    fn integrate_color(
        &mut self,
        color: &ColorImage,
        t_l_c: &Transform,
        camera: &Camera,
    ) -> MapperResult<()>;

    fn update_esdf(&mut self, filter: SiteFilter) -> EsdfUpdateStats;

    /// Re-extracts the mesh of blocks touched since the last call and returns
    /// their indices.
    fn update_mesh(&mut self) -> Vec<Index3D>;

    fn tsdf_layer(&self) -> &TsdfLayer;
    fn occupancy_layer(&self) -> &OccupancyLayer;
    fn freespace_layer(&self) -> &FreespaceLayer;
    fn color_layer(&self) -> &ColorLayer;
    fn esdf_layer(&self) -> &EsdfLayer;
    fn mesh_layer(&self) -> &MeshLayer;

    fn voxel_size(&self) -> f32;
    fn projective_layer_type(&self) -> ProjectiveLayerType;
    fn esdf_mode(&self) -> EsdfMode;
    /// Timestamp of the last integrated depth frame.
    fn last_update_time_ms(&self) -> Option<TimeMs>;

    fn params(&self) -> &MapperParams;
    fn set_params(&mut self, params: MapperParams) -> MapperResult<()>;
    fn parameter_tree(&self, name: &str) -> ParameterTreeNode;
}

dyn_clone::clone_trait_object!(Mapper);
