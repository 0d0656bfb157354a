// layermap_core/src/multi_mapper.rs

//! Two mappers behind one interface: a static map and a map of whatever moves.

use crate::camera::Camera;
use crate::config::MultiMapperConfig;
use crate::error::{MapperError, MapperResult};
use crate::image::{Color, ColorImage, DepthImage, MonoImage};
use crate::mapping::{
    EsdfUpdateStats, Mapper, MapperParams, MeshStreamer, MeshStreamerParams, SerializedMesh,
    SiteFilter, VoxelMapper,
};
use crate::params::ParameterTreeNode;
use crate::perception::image_masker::{reproject_mask_into, split_into, SplitBuffers};
use crate::perception::mask_cleaner::{
    clean_mask_into, Connectivity, DEFAULT_CONNECTED_MASK_COMPONENT_SIZE_THRESHOLD,
};
use crate::perception::overlay::{color_mask_overlay_into, depth_mask_overlay_into, OverlayStyle};
use crate::perception::DynamicsDetector;
use crate::scratch::ScratchImage;
use crate::stream::ExecutionStream;
use crate::types::{EsdfMode, MemoryType, ProjectiveLayerType, TimeMs, Transform};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

// =========================================================================
// == Mapping Type ==
// =========================================================================

/// How frames are distributed between the unmasked (static) and masked mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// One TSDF mapper, no masking.
    #[default]
    StaticTsdf,
    /// One occupancy mapper, no masking.
    StaticOccupancy,
    /// Masks come from the freespace history of the static TSDF mapper.
    Dynamic,
    /// Masks come from the caller; the static part is a TSDF.
    HumanWithStaticTsdf,
    /// Masks come from the caller; the static part is an occupancy map.
    HumanWithStaticOccupancy,
}

impl MappingType {
    pub fn is_human_mapping(self) -> bool {
        matches!(
            self,
            MappingType::HumanWithStaticTsdf | MappingType::HumanWithStaticOccupancy
        )
    }

    pub fn is_dynamic_mapping(self) -> bool {
        self == MappingType::Dynamic
    }

    pub fn is_using_both_mappers(self) -> bool {
        self.is_dynamic_mapping() || self.is_human_mapping()
    }

    pub fn is_static_occupancy(self) -> bool {
        matches!(
            self,
            MappingType::StaticOccupancy | MappingType::HumanWithStaticOccupancy
        )
    }

    /// Geometry layer of the unmasked mapper. The masked mapper is always occupancy.
    pub fn unmasked_layer_type(self) -> ProjectiveLayerType {
        if self.is_static_occupancy() {
            ProjectiveLayerType::Occupancy
        } else {
            ProjectiveLayerType::Tsdf
        }
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingType::StaticTsdf => "static_tsdf",
            MappingType::StaticOccupancy => "static_occupancy",
            MappingType::Dynamic => "dynamic",
            MappingType::HumanWithStaticTsdf => "human_with_static_tsdf",
            MappingType::HumanWithStaticOccupancy => "human_with_static_occupancy",
        };
        write!(f, "{name}")
    }
}

// =========================================================================
// == Parameters ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiMapperParams {
    /// Mask components with fewer pixels than this are dropped before splitting.
    pub connected_mask_component_size_threshold: usize,
    pub mask_connectivity: Connectivity,
    pub mesh_streamer: MeshStreamerParams,
}

impl Default for MultiMapperParams {
    fn default() -> Self {
        Self {
            connected_mask_component_size_threshold: DEFAULT_CONNECTED_MASK_COMPONENT_SIZE_THRESHOLD,
            mask_connectivity: Connectivity::default(),
            mesh_streamer: MeshStreamerParams::default(),
        }
    }
}

/// What `update_esdf` did to each active mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MultiEsdfUpdateStats {
    pub unmasked: EsdfUpdateStats,
    pub masked: Option<EsdfUpdateStats>,
}

// =========================================================================
// == Multi Mapper ==
// =========================================================================

/// Routes depth and color frames to an unmasked and an optional masked mapper.
///
/// The mapping type is fixed at construction and decides which entry points are
/// valid (see [`MappingType`]). Scratch images are sized by the first frame and
/// reused for every following frame.
#[derive(Debug)]
pub struct MultiMapper {
    mapping_type: MappingType,
    esdf_mode: EsdfMode,
    memory_type: MemoryType,
    voxel_size: f32,
    stream: Arc<ExecutionStream>,
    params: MultiMapperParams,

    unmasked_mapper: Box<dyn Mapper>,
    masked_mapper: Option<Box<dyn Mapper>>,

    dynamics: DynamicsDetector,
    mesh_streamer: MeshStreamer,
    overlay_style: OverlayStyle,

    // --- Per-frame buffers ---
    depth_mask: ScratchImage<u8>,
    cleaned_depth_mask: ScratchImage<u8>,
    cleaned_color_mask: ScratchImage<u8>,
    depth_split: SplitBuffers<f32>,
    color_split: SplitBuffers<Color>,
    depth_overlay: ScratchImage<Color>,
    color_overlay: ScratchImage<Color>,
}

impl MultiMapper {
    /// Builds a multi-mapper with default parameters.
    pub fn new(
        voxel_size_m: f32,
        mapping_type: MappingType,
        esdf_mode: EsdfMode,
        memory_type: MemoryType,
        stream: Arc<ExecutionStream>,
    ) -> MapperResult<Self> {
        Self::with_params(
            voxel_size_m,
            mapping_type,
            esdf_mode,
            memory_type,
            stream,
            MultiMapperParams::default(),
            MapperParams::default(),
            None,
        )
    }

    pub fn from_config(config: &MultiMapperConfig, stream: Arc<ExecutionStream>) -> MapperResult<Self> {
        Self::with_params(
            config.voxel_size_m,
            config.mapping_type,
            config.esdf_mode,
            config.memory_type,
            stream,
            config.multi_mapper.clone(),
            config.unmasked_mapper.clone(),
            config.masked_mapper.clone(),
        )
    }

    /// Builds a multi-mapper. `masked_params` defaults when the mapping type needs a
    /// masked mapper and must be `None` when it does not.
    #[allow(clippy::too_many_arguments)]
    pub fn with_params(
        voxel_size_m: f32,
        mapping_type: MappingType,
        esdf_mode: EsdfMode,
        memory_type: MemoryType,
        stream: Arc<ExecutionStream>,
        params: MultiMapperParams,
        unmasked_params: MapperParams,
        masked_params: Option<MapperParams>,
    ) -> MapperResult<Self> {
        if !(voxel_size_m.is_finite() && voxel_size_m > 0.0) {
            return Err(MapperError::UnsupportedConfiguration(format!(
                "voxel size must be positive, got {voxel_size_m}"
            )));
        }
        if masked_params.is_some() && !mapping_type.is_using_both_mappers() {
            return Err(MapperError::UnsupportedConfiguration(format!(
                "masked mapper parameters given, but {mapping_type} uses a single mapper"
            )));
        }

        let unmasked_mapper: Box<dyn Mapper> = Box::new(VoxelMapper::new(
            voxel_size_m,
            mapping_type.unmasked_layer_type(),
            esdf_mode,
            memory_type,
            mapping_type.is_dynamic_mapping(),
            stream.clone(),
            unmasked_params,
        )?);
        let masked_mapper: Option<Box<dyn Mapper>> = if mapping_type.is_using_both_mappers() {
            Some(Box::new(VoxelMapper::new(
                voxel_size_m,
                ProjectiveLayerType::Occupancy,
                esdf_mode,
                memory_type,
                false,
                stream.clone(),
                masked_params.unwrap_or_default(),
            )?))
        } else {
            None
        };

        info!(
            %mapping_type,
            voxel_size_m,
            %esdf_mode,
            %memory_type,
            stream = stream.name(),
            "Created multi-mapper"
        );
        Ok(Self {
            mapping_type,
            esdf_mode,
            memory_type,
            voxel_size: voxel_size_m,
            stream,
            mesh_streamer: MeshStreamer::new(params.mesh_streamer.clone()),
            params,
            unmasked_mapper,
            masked_mapper,
            dynamics: DynamicsDetector::new(),
            overlay_style: OverlayStyle::default(),
            depth_mask: ScratchImage::new("depth_frame_mask"),
            cleaned_depth_mask: ScratchImage::new("cleaned_depth_mask"),
            cleaned_color_mask: ScratchImage::new("cleaned_color_mask"),
            depth_split: SplitBuffers::new("depth_frame_masked", "depth_frame_unmasked"),
            color_split: SplitBuffers::new("color_frame_masked", "color_frame_unmasked"),
            depth_overlay: ScratchImage::new("depth_frame_mask_overlay"),
            color_overlay: ScratchImage::new("color_frame_mask_overlay"),
        })
    }

    fn mode_mismatch(&self, operation: &'static str) -> MapperError {
        MapperError::ModeMismatch {
            mapping_type: self.mapping_type.to_string(),
            operation,
        }
    }

    fn check_frame_dims(
        dims: (usize, usize),
        camera: &Camera,
        context: &'static str,
    ) -> MapperResult<()> {
        camera.validate()?;
        if dims != camera.dims() {
            return Err(MapperError::dimension_mismatch(context, camera.dims(), dims));
        }
        Ok(())
    }

    // =====================================================================
    // == Depth ==
    // =====================================================================

    /// Integrates a depth frame without a caller mask (static and dynamic modes).
    ///
    /// In dynamic mode the frame is first checked against the static freespace
    /// history. The whole frame goes into the unmasked mapper so that its freespace
    /// keeps being observed, and the dynamic part also goes into the masked mapper.
    pub fn integrate_depth(
        &mut self,
        depth: &DepthImage,
        t_l_c: &Transform,
        camera: &Camera,
        update_time_ms: Option<TimeMs>,
    ) -> MapperResult<()> {
        match self.mapping_type {
            MappingType::StaticTsdf | MappingType::StaticOccupancy => {
                debug!(mapping_type = %self.mapping_type, "Integrating full depth frame");
                self.unmasked_mapper
                    .integrate_depth(depth, t_l_c, camera, update_time_ms)
            }
            MappingType::Dynamic => self.integrate_depth_dynamic(depth, t_l_c, camera, update_time_ms),
            MappingType::HumanWithStaticTsdf | MappingType::HumanWithStaticOccupancy => {
                Err(self.mode_mismatch("integrate_depth"))
            }
        }
    }

    fn integrate_depth_dynamic(
        &mut self,
        depth: &DepthImage,
        t_l_c: &Transform,
        camera: &Camera,
        update_time_ms: Option<TimeMs>,
    ) -> MapperResult<()> {
        let (rows, cols) = depth.dims();
        Self::check_frame_dims(depth.dims(), camera, "dynamic depth frame")?;
        self.cleaned_depth_mask.check_size(rows, cols)?;
        self.depth_split.check_size(rows, cols)?;
        self.depth_overlay.check_size(rows, cols)?;

        // Detection reads the freespace state from before this frame.
        self.stream.issue("detect_dynamics");
        let dynamic_mask = self.dynamics.compute_dynamics(
            depth,
            self.unmasked_mapper.freespace_layer(),
            camera,
            t_l_c,
        )?;
        self.stream.issue("clean_mask");
        let num_removed = clean_mask_into(
            dynamic_mask,
            self.params.connected_mask_component_size_threshold,
            self.params.mask_connectivity,
            &mut self.cleaned_depth_mask,
        )?;
        let Some(cleaned) = self.cleaned_depth_mask.get() else {
            return Ok(());
        };
        self.stream.issue("split_frame");
        split_into(depth, cleaned, &mut self.depth_split)?;
        self.stream.issue("mask_overlay");
        depth_mask_overlay_into(depth, cleaned, &self.overlay_style, &mut self.depth_overlay)?;
        debug!(
            num_dynamic = self.dynamics.dynamic_points().len(),
            num_removed_components = num_removed,
            "Split dynamic depth frame"
        );

        self.unmasked_mapper
            .integrate_depth(depth, t_l_c, camera, update_time_ms)?;
        let now = self.unmasked_mapper.last_update_time_ms();
        if let (Some(masked_mapper), Some(masked_depth)) =
            (self.masked_mapper.as_mut(), self.depth_split.masked.get())
        {
            masked_mapper.integrate_depth(masked_depth, t_l_c, camera, now.or(update_time_ms))?;
        }
        Ok(())
    }

    /// Integrates a depth frame together with a caller mask (human modes).
    ///
    /// `mask` is an image of `mask_camera`; `t_cm_cd` maps depth-camera points into
    /// the mask camera frame.
    #[allow(clippy::too_many_arguments)]
    pub fn integrate_depth_masked(
        &mut self,
        depth: &DepthImage,
        mask: &MonoImage,
        t_l_cd: &Transform,
        t_cm_cd: &Transform,
        depth_camera: &Camera,
        mask_camera: &Camera,
    ) -> MapperResult<()> {
        if !self.mapping_type.is_human_mapping() {
            return Err(self.mode_mismatch("integrate_depth_masked"));
        }
        let (rows, cols) = depth.dims();
        Self::check_frame_dims(depth.dims(), depth_camera, "masked depth frame")?;
        Self::check_frame_dims(mask.dims(), mask_camera, "depth mask")?;
        self.cleaned_depth_mask.check_size(mask.rows(), mask.cols())?;
        self.depth_mask.check_size(rows, cols)?;
        self.depth_split.check_size(rows, cols)?;
        self.depth_overlay.check_size(rows, cols)?;

        self.stream.issue("clean_mask");
        clean_mask_into(
            mask,
            self.params.connected_mask_component_size_threshold,
            self.params.mask_connectivity,
            &mut self.cleaned_depth_mask,
        )?;
        let Some(cleaned) = self.cleaned_depth_mask.get() else {
            return Ok(());
        };
        self.stream.issue("reproject_mask");
        reproject_mask_into(depth, cleaned, t_cm_cd, depth_camera, mask_camera, &mut self.depth_mask)?;
        let Some(depth_frame_mask) = self.depth_mask.get() else {
            return Ok(());
        };
        self.stream.issue("split_frame");
        split_into(depth, depth_frame_mask, &mut self.depth_split)?;
        self.stream.issue("mask_overlay");
        depth_mask_overlay_into(
            depth,
            depth_frame_mask,
            &self.overlay_style,
            &mut self.depth_overlay,
        )?;
        debug!(mapping_type = %self.mapping_type, "Split masked depth frame");

        let (Some(masked), Some(unmasked)) =
            (self.depth_split.masked.get(), self.depth_split.unmasked.get())
        else {
            return Ok(());
        };
        self.unmasked_mapper
            .integrate_depth(unmasked, t_l_cd, depth_camera, None)?;
        if let Some(masked_mapper) = self.masked_mapper.as_mut() {
            masked_mapper.integrate_depth(masked, t_l_cd, depth_camera, None)?;
        }
        Ok(())
    }

    // =====================================================================
    // == Color ==
    // =====================================================================

    /// Integrates a color frame without a caller mask (static and dynamic modes).
    ///
    /// In dynamic mode the full frame colors the unmasked mapper, and the pixels of
    /// the last cleaned dynamic mask also color the masked mapper when the frame has
    /// the size of the depth frames.
    pub fn integrate_color(
        &mut self,
        color: &ColorImage,
        t_l_c: &Transform,
        camera: &Camera,
    ) -> MapperResult<()> {
        if self.mapping_type.is_human_mapping() {
            return Err(self.mode_mismatch("integrate_color"));
        }
        Self::check_frame_dims(color.dims(), camera, "color frame")?;

        let dynamic_mask = self
            .cleaned_depth_mask
            .get()
            .filter(|mask| self.mapping_type.is_dynamic_mapping() && mask.dims() == color.dims());
        if let Some(mask) = dynamic_mask {
            self.color_split.check_size(color.rows(), color.cols())?;
            self.color_overlay.check_size(color.rows(), color.cols())?;
            self.stream.issue("split_frame");
            split_into(color, mask, &mut self.color_split)?;
            self.stream.issue("mask_overlay");
            color_mask_overlay_into(color, mask, &self.overlay_style, &mut self.color_overlay)?;
        }

        self.unmasked_mapper.integrate_color(color, t_l_c, camera)?;
        if dynamic_mask.is_some() {
            if let (Some(masked_mapper), Some(masked)) =
                (self.masked_mapper.as_mut(), self.color_split.masked.get())
            {
                masked_mapper.integrate_color(masked, t_l_c, camera)?;
            }
        }
        Ok(())
    }

    /// Integrates a color frame together with a caller mask of the same camera
    /// (human modes).
    pub fn integrate_color_masked(
        &mut self,
        color: &ColorImage,
        mask: &MonoImage,
        t_l_c: &Transform,
        camera: &Camera,
    ) -> MapperResult<()> {
        if !self.mapping_type.is_human_mapping() {
            return Err(self.mode_mismatch("integrate_color_masked"));
        }
        let (rows, cols) = color.dims();
        Self::check_frame_dims(color.dims(), camera, "masked color frame")?;
        color.check_same_dims(mask, "color mask")?;
        self.cleaned_color_mask.check_size(rows, cols)?;
        self.color_split.check_size(rows, cols)?;
        self.color_overlay.check_size(rows, cols)?;

        self.stream.issue("clean_mask");
        clean_mask_into(
            mask,
            self.params.connected_mask_component_size_threshold,
            self.params.mask_connectivity,
            &mut self.cleaned_color_mask,
        )?;
        let Some(cleaned) = self.cleaned_color_mask.get() else {
            return Ok(());
        };
        self.stream.issue("split_frame");
        split_into(color, cleaned, &mut self.color_split)?;
        self.stream.issue("mask_overlay");
        color_mask_overlay_into(color, cleaned, &self.overlay_style, &mut self.color_overlay)?;

        let (Some(masked), Some(unmasked)) =
            (self.color_split.masked.get(), self.color_split.unmasked.get())
        else {
            return Ok(());
        };
        self.unmasked_mapper.integrate_color(unmasked, t_l_c, camera)?;
        if let Some(masked_mapper) = self.masked_mapper.as_mut() {
            masked_mapper.integrate_color(masked, t_l_c, camera)?;
        }
        Ok(())
    }

    // =====================================================================
    // == Derived Layers ==
    // =====================================================================

    /// Recomputes the distance fields of the active mappers. With two mappers the
    /// unmasked field ignores sites in high confidence freespace, which belong to
    /// the masked mapper.
    pub fn update_esdf(&mut self) -> MultiEsdfUpdateStats {
        let filter = if self.mapping_type.is_using_both_mappers() {
            SiteFilter::ExcludeHighConfidenceFreespace
        } else {
            SiteFilter::All
        };
        let stats = MultiEsdfUpdateStats {
            unmasked: self.unmasked_mapper.update_esdf(filter),
            masked: self
                .masked_mapper
                .as_mut()
                .map(|m| m.update_esdf(SiteFilter::All)),
        };
        debug!(?stats, "Updated esdf");
        stats
    }

    /// Updates the meshes of the active mappers and serializes the next batch of
    /// the unmasked mesh. `t_l_c` prioritizes blocks near the camera;
    /// `serialize_full_mesh` sends every block regardless of bandwidth.
    pub fn update_mesh(&mut self, t_l_c: Option<&Transform>, serialize_full_mesh: bool) -> SerializedMesh {
        let updated = self.unmasked_mapper.update_mesh();
        if let Some(masked_mapper) = self.masked_mapper.as_mut() {
            masked_mapper.update_mesh();
        }
        self.mesh_streamer.mark_updated(updated);
        let mesh = self.mesh_streamer.serialize(
            self.unmasked_mapper.mesh_layer(),
            self.voxel_size,
            t_l_c,
            serialize_full_mesh,
        );
        self.stream.synchronize();
        mesh
    }

    // =====================================================================
    // == Accessors ==
    // =====================================================================

    pub fn mapping_type(&self) -> MappingType {
        self.mapping_type
    }

    pub fn esdf_mode(&self) -> EsdfMode {
        self.esdf_mode
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn stream(&self) -> &Arc<ExecutionStream> {
        &self.stream
    }

    pub fn params(&self) -> &MultiMapperParams {
        &self.params
    }

    pub fn unmasked_mapper(&self) -> &dyn Mapper {
        self.unmasked_mapper.as_ref()
    }

    pub fn masked_mapper(&self) -> Option<&dyn Mapper> {
        self.masked_mapper.as_deref()
    }

    pub fn mesh_streamer(&self) -> &MeshStreamer {
        &self.mesh_streamer
    }

    pub fn last_depth_frame_unmasked(&self) -> Option<&DepthImage> {
        self.depth_split.unmasked.get()
    }

    pub fn last_depth_frame_masked(&self) -> Option<&DepthImage> {
        self.depth_split.masked.get()
    }

    pub fn last_color_frame_unmasked(&self) -> Option<&ColorImage> {
        self.color_split.unmasked.get()
    }

    pub fn last_color_frame_masked(&self) -> Option<&ColorImage> {
        self.color_split.masked.get()
    }

    pub fn last_depth_frame_mask_overlay(&self) -> Option<&ColorImage> {
        self.depth_overlay.get()
    }

    pub fn last_color_frame_mask_overlay(&self) -> Option<&ColorImage> {
        self.color_overlay.get()
    }

    pub fn last_dynamic_frame_mask_overlay(&self) -> Option<&ColorImage> {
        self.dynamics.dynamic_overlay()
    }

    /// Layer-frame points flagged dynamic in the last depth frame.
    pub fn last_dynamic_pointcloud(&self) -> &[Point3<f32>] {
        self.dynamics.dynamic_points()
    }

    // =====================================================================
    // == Parameters ==
    // =====================================================================

    pub fn set_multi_mapper_params(&mut self, params: MultiMapperParams) {
        info!(
            threshold = params.connected_mask_component_size_threshold,
            connectivity = %params.mask_connectivity,
            "Replaced multi-mapper parameters"
        );
        self.mesh_streamer.set_params(params.mesh_streamer.clone());
        self.params = params;
    }

    /// Replaces mapper parameters. Nothing changes unless every given set is valid.
    pub fn set_mapper_params(
        &mut self,
        unmasked: MapperParams,
        masked: Option<MapperParams>,
    ) -> MapperResult<()> {
        if masked.is_some() && self.masked_mapper.is_none() {
            return Err(MapperError::UnsupportedConfiguration(format!(
                "{} has no masked mapper to configure",
                self.mapping_type
            )));
        }
        unmasked.validate()?;
        if let Some(masked) = &masked {
            masked.validate()?;
        }

        self.unmasked_mapper.set_params(unmasked)?;
        if let (Some(mapper), Some(params)) = (self.masked_mapper.as_mut(), masked) {
            mapper.set_params(params)?;
        }
        Ok(())
    }

    /// Tree of every parameter, rooted at `name_remap` or `"multi_mapper"`.
    pub fn parameter_tree(&self, name_remap: Option<&str>) -> ParameterTreeNode {
        let name = name_remap.unwrap_or("multi_mapper");
        let mut children = vec![
            ParameterTreeNode::leaf("mapping_type", self.mapping_type),
            ParameterTreeNode::leaf("voxel_size", self.voxel_size),
            ParameterTreeNode::leaf("esdf_mode", self.esdf_mode),
            ParameterTreeNode::leaf("memory_type", self.memory_type),
            ParameterTreeNode::leaf(
                "connected_mask_component_size_threshold",
                self.params.connected_mask_component_size_threshold,
            ),
            ParameterTreeNode::leaf("mask_connectivity", self.params.mask_connectivity),
            self.params.mesh_streamer.parameter_tree("mesh_streamer"),
            self.unmasked_mapper.parameter_tree("unmasked_mapper"),
        ];
        if let Some(masked_mapper) = &self.masked_mapper {
            children.push(masked_mapper.parameter_tree("masked_mapper"));
        }
        ParameterTreeNode::group(name, children)
    }

    pub fn parameters_as_string(&self) -> String {
        self.parameter_tree(None).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Arc<ExecutionStream> {
        Arc::new(ExecutionStream::new("test"))
    }

    fn camera() -> Camera {
        Camera::new(40.0, 40.0, 20.0, 15.0, 40, 30).unwrap()
    }

    const ALL_TYPES: [MappingType; 5] = [
        MappingType::StaticTsdf,
        MappingType::StaticOccupancy,
        MappingType::Dynamic,
        MappingType::HumanWithStaticTsdf,
        MappingType::HumanWithStaticOccupancy,
    ];

    #[test]
    fn test_every_mode_and_esdf_mode_builds() {
        for mapping_type in ALL_TYPES {
            for esdf_mode in [EsdfMode::TwoD, EsdfMode::ThreeD] {
                let mm = MultiMapper::new(0.05, mapping_type, esdf_mode, MemoryType::Unified, stream())
                    .unwrap();
                assert_eq!(mm.masked_mapper().is_some(), mapping_type.is_using_both_mappers());
                assert_eq!(
                    mm.unmasked_mapper().projective_layer_type(),
                    mapping_type.unmasked_layer_type()
                );
                if let Some(masked) = mm.masked_mapper() {
                    assert_eq!(masked.projective_layer_type(), ProjectiveLayerType::Occupancy);
                }
            }
        }
    }

    #[test]
    fn test_rejects_bad_voxel_size_and_stray_masked_params() {
        for voxel_size in [0.0, -0.1, f32::NAN] {
            let err = MultiMapper::new(voxel_size, MappingType::StaticTsdf, EsdfMode::ThreeD, MemoryType::Device, stream());
            assert!(matches!(err, Err(MapperError::UnsupportedConfiguration(_))));
        }
        let err = MultiMapper::with_params(
            0.05,
            MappingType::StaticOccupancy,
            EsdfMode::ThreeD,
            MemoryType::Device,
            stream(),
            MultiMapperParams::default(),
            MapperParams::default(),
            Some(MapperParams::default()),
        );
        assert!(matches!(err, Err(MapperError::UnsupportedConfiguration(_))));
    }

    #[test]
    fn test_entry_points_are_mode_checked() {
        let depth = DepthImage::filled(30, 40, 2.0);
        let color = ColorImage::filled(30, 40, Color::WHITE);
        let mask = MonoImage::filled(30, 40, 0);
        let pose = Transform::identity();

        let mut human =
            MultiMapper::new(0.05, MappingType::HumanWithStaticTsdf, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        assert!(matches!(
            human.integrate_depth(&depth, &pose, &camera(), None),
            Err(MapperError::ModeMismatch { operation: "integrate_depth", .. })
        ));
        assert!(matches!(
            human.integrate_color(&color, &pose, &camera()),
            Err(MapperError::ModeMismatch { .. })
        ));

        let mut dynamic =
            MultiMapper::new(0.05, MappingType::Dynamic, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        assert!(matches!(
            dynamic.integrate_depth_masked(&depth, &mask, &pose, &pose, &camera(), &camera()),
            Err(MapperError::ModeMismatch { .. })
        ));
        assert!(matches!(
            dynamic.integrate_color_masked(&color, &mask, &pose, &camera()),
            Err(MapperError::ModeMismatch { .. })
        ));
        assert!(dynamic.unmasked_mapper().tsdf_layer().is_empty());
    }

    #[test]
    fn test_every_step_is_issued_on_the_stream() {
        let depth = DepthImage::filled(30, 40, 2.0);
        let color = ColorImage::filled(30, 40, Color::WHITE);
        let mask = MonoImage::filled(30, 40, 0);
        let pose = Transform::identity();
        let issued_by = |mm: &mut MultiMapper, step: &dyn Fn(&mut MultiMapper)| {
            let before = mm.stream().num_issued();
            step(mm);
            mm.stream().num_issued() - before
        };

        let mut dynamic =
            MultiMapper::new(0.05, MappingType::Dynamic, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        // Detection, cleaning, split, overlay and both integrations.
        let n = issued_by(&mut dynamic, &|mm| {
            mm.integrate_depth(&depth, &pose, &camera(), Some(0)).unwrap()
        });
        assert_eq!(n, 6);
        // Split, overlay and both integrations.
        let n = issued_by(&mut dynamic, &|mm| mm.integrate_color(&color, &pose, &camera()).unwrap());
        assert_eq!(n, 4);

        let mut human =
            MultiMapper::new(0.05, MappingType::HumanWithStaticTsdf, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        // Cleaning, reprojection, split, overlay and both integrations.
        let n = issued_by(&mut human, &|mm| {
            mm.integrate_depth_masked(&depth, &mask, &pose, &pose, &camera(), &camera())
                .unwrap()
        });
        assert_eq!(n, 6);
        // Cleaning, split, overlay and both integrations.
        let n = issued_by(&mut human, &|mm| {
            mm.integrate_color_masked(&color, &mask, &pose, &camera()).unwrap()
        });
        assert_eq!(n, 5);

        let mut plain =
            MultiMapper::new(0.05, MappingType::StaticTsdf, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        let n = issued_by(&mut plain, &|mm| {
            mm.integrate_depth(&depth, &pose, &camera(), None).unwrap()
        });
        assert_eq!(n, 1);
    }

    #[test]
    fn test_frame_size_is_fixed_by_the_first_frame() {
        let mut mm =
            MultiMapper::new(0.05, MappingType::Dynamic, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        let pose = Transform::identity();
        mm.integrate_depth(&DepthImage::filled(30, 40, 2.0), &pose, &camera(), Some(0))
            .unwrap();
        let before = mm.unmasked_mapper().tsdf_layer().clone();

        let small_camera = Camera::new(40.0, 40.0, 10.0, 10.0, 20, 20).unwrap();
        let err = mm.integrate_depth(&DepthImage::filled(20, 20, 2.0), &pose, &small_camera, Some(100));
        assert!(matches!(err, Err(MapperError::DimensionMismatch { .. })));
        assert_eq!(mm.unmasked_mapper().tsdf_layer(), &before);
        assert_eq!(mm.unmasked_mapper().last_update_time_ms(), Some(0));
    }

    #[test]
    fn test_set_mapper_params_is_all_or_nothing() {
        let mut mm =
            MultiMapper::new(0.05, MappingType::StaticTsdf, EsdfMode::ThreeD, MemoryType::Device, stream())
                .unwrap();
        let err = mm.set_mapper_params(MapperParams::default(), Some(MapperParams::default()));
        assert!(matches!(err, Err(MapperError::UnsupportedConfiguration(_))));

        let mut bad = MapperParams::default();
        bad.projective.max_weight = -1.0;
        assert!(mm.set_mapper_params(bad, None).is_err());
        assert_eq!(mm.unmasked_mapper().params(), &MapperParams::default());

        let mut good = MapperParams::default();
        good.projective.max_weight = 20.0;
        mm.set_mapper_params(good.clone(), None).unwrap();
        assert_eq!(mm.unmasked_mapper().params(), &good);
    }

    #[test]
    fn test_parameter_tree_lists_both_mappers() {
        let mm = MultiMapper::new(
            0.05,
            MappingType::HumanWithStaticOccupancy,
            EsdfMode::TwoD,
            MemoryType::Host,
            stream(),
        )
        .unwrap();
        let tree = mm.parameter_tree(Some("mapper"));
        assert_eq!(tree.name, "mapper");
        let value = |path: &str| tree.find(path).and_then(|n| n.value.clone());
        assert_eq!(value("mapping_type").as_deref(), Some("human_with_static_occupancy"));
        assert_eq!(value("connected_mask_component_size_threshold").as_deref(), Some("2000"));
        assert_eq!(value("unmasked_mapper/projective_layer_type").as_deref(), Some("occupancy"));
        assert_eq!(value("masked_mapper/esdf_mode").as_deref(), Some("2d"));
        assert!(mm.parameters_as_string().contains("memory_type: host"));
    }

    #[test]
    fn test_mapping_type_predicates() {
        assert!(MappingType::HumanWithStaticOccupancy.is_static_occupancy());
        assert!(!MappingType::Dynamic.is_human_mapping());
        assert!(MappingType::Dynamic.is_using_both_mappers());
        assert!(!MappingType::StaticOccupancy.is_using_both_mappers());
        assert_eq!(MappingType::Dynamic.unmasked_layer_type(), ProjectiveLayerType::Tsdf);
    }
}
