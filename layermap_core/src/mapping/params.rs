// layermap_core/src/mapping/params.rs

use crate::error::{MapperError, MapperResult};
use crate::params::ParameterTreeNode;
use crate::types::TimeMs;
use serde::{Deserialize, Serialize};

// =========================================================================
// == Per-Stage Parameter Structs ==
// These map directly to the sections of a `[unmasked_mapper]` / `[masked_mapper]`
// table in a scenario file.
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectiveIntegratorParams {
    /// Truncation band of the TSDF, in voxels.
    pub truncation_distance_vox: f32,
    /// Cap on the accumulated integration weight of a voxel.
    pub max_weight: f32,
    /// Depth measurements beyond this range are ignored.
    pub max_integration_distance_m: f32,
}

impl Default for ProjectiveIntegratorParams {
    fn default() -> Self {
        Self {
            truncation_distance_vox: 4.0,
            max_weight: 5.0,
            max_integration_distance_m: 7.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OccupancyIntegratorParams {
    /// Occupancy probability assigned to voxels in front of a measurement.
    pub free_region_occupancy_probability: f32,
    /// Occupancy probability assigned to voxels inside the truncation band.
    pub occupied_region_occupancy_probability: f32,
    /// Log-odds are clamped to `[-max_log_odds, max_log_odds]`.
    pub max_log_odds: f32,
}

impl Default for OccupancyIntegratorParams {
    fn default() -> Self {
        Self {
            free_region_occupancy_probability: 0.3,
            occupied_region_occupancy_probability: 0.7,
            max_log_odds: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreespaceParams {
    /// A TSDF voxel at or below this distance counts as occupied.
    pub max_tsdf_distance_for_occupancy_m: f32,
    /// Gaps in occupancy shorter than this do not break a consecutive run.
    pub max_unobserved_to_keep_consecutive_occupancy_ms: TimeMs,
    /// Time without occupancy before a voxel becomes high confidence freespace.
    pub min_duration_since_occupied_for_freespace_ms: TimeMs,
    /// Occupancy run after which a high confidence freespace voxel is reset.
    pub min_consecutive_occupancy_duration_for_reset_ms: TimeMs,
    /// Clock advance for frames integrated without a timestamp.
    pub default_frame_interval_ms: TimeMs,
}

impl Default for FreespaceParams {
    fn default() -> Self {
        Self {
            max_tsdf_distance_for_occupancy_m: 0.15,
            max_unobserved_to_keep_consecutive_occupancy_ms: 200,
            min_duration_since_occupied_for_freespace_ms: 1000,
            min_consecutive_occupancy_duration_for_reset_ms: 2000,
            default_frame_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorIntegratorParams {
    pub max_weight: f32,
}

impl Default for ColorIntegratorParams {
    fn default() -> Self {
        Self { max_weight: 5.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EsdfParams {
    /// TSDF voxels need at least this weight to become sites.
    pub min_weight: f32,
    /// TSDF voxels within this many voxels of the surface are sites.
    pub max_site_distance_vox: f32,
    /// Distances are not propagated further than this.
    pub max_esdf_distance_m: f32,
    /// Height of the output slice in 2D mode.
    pub esdf_slice_height_m: f32,
    /// Sites between these heights are collapsed onto the slice in 2D mode.
    pub esdf_2d_min_height_m: f32,
    pub esdf_2d_max_height_m: f32,
}

impl Default for EsdfParams {
    fn default() -> Self {
        Self {
            min_weight: 1e-4,
            max_site_distance_vox: 1.0,
            max_esdf_distance_m: 2.0,
            esdf_slice_height_m: 1.0,
            esdf_2d_min_height_m: 0.0,
            esdf_2d_max_height_m: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshParams {
    /// Voxels below this weight do not contribute surface.
    pub min_weight: f32,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self { min_weight: 1e-4 }
    }
}

// =========================================================================
// == Mapper Parameters ==
// =========================================================================

/// Everything a single mapper can be tuned with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperParams {
    pub projective: ProjectiveIntegratorParams,
    pub occupancy: OccupancyIntegratorParams,
    pub freespace: FreespaceParams,
    pub color: ColorIntegratorParams,
    pub esdf: EsdfParams,
    pub mesh: MeshParams,
}

fn ensure(condition: bool, what: &str) -> MapperResult<()> {
    if condition {
        Ok(())
    } else {
        Err(MapperError::UnsupportedConfiguration(what.to_string()))
    }
}

impl MapperParams {
    /// Rejects parameter combinations the integrators can not work with.
    pub fn validate(&self) -> MapperResult<()> {
        let p = &self.projective;
        ensure(
            p.truncation_distance_vox > 0.0,
            "projective.truncation_distance_vox must be positive",
        )?;
        ensure(p.max_weight > 0.0, "projective.max_weight must be positive")?;
        ensure(
            p.max_integration_distance_m > 0.0,
            "projective.max_integration_distance_m must be positive",
        )?;

        let o = &self.occupancy;
        ensure(
            o.free_region_occupancy_probability > 0.0
                && o.free_region_occupancy_probability < 0.5,
            "occupancy.free_region_occupancy_probability must be in (0, 0.5)",
        )?;
        ensure(
            o.occupied_region_occupancy_probability > 0.5
                && o.occupied_region_occupancy_probability < 1.0,
            "occupancy.occupied_region_occupancy_probability must be in (0.5, 1)",
        )?;
        ensure(o.max_log_odds > 0.0, "occupancy.max_log_odds must be positive")?;

        let f = &self.freespace;
        ensure(
            f.max_unobserved_to_keep_consecutive_occupancy_ms >= 0
                && f.min_duration_since_occupied_for_freespace_ms >= 0
                && f.min_consecutive_occupancy_duration_for_reset_ms >= 0,
            "freespace durations must not be negative",
        )?;
        ensure(
            f.default_frame_interval_ms > 0,
            "freespace.default_frame_interval_ms must be positive",
        )?;

        ensure(self.color.max_weight > 0.0, "color.max_weight must be positive")?;

        let e = &self.esdf;
        ensure(
            e.max_esdf_distance_m > 0.0,
            "esdf.max_esdf_distance_m must be positive",
        )?;
        ensure(
            e.max_site_distance_vox >= 0.0,
            "esdf.max_site_distance_vox must not be negative",
        )?;
        ensure(
            e.esdf_2d_min_height_m <= e.esdf_2d_max_height_m,
            "esdf.esdf_2d_min_height_m must not exceed esdf.esdf_2d_max_height_m",
        )?;
        Ok(())
    }

    pub fn parameter_tree(&self, name: &str) -> ParameterTreeNode {
        let p = &self.projective;
        let o = &self.occupancy;
        let f = &self.freespace;
        let e = &self.esdf;
        ParameterTreeNode::group(
            name,
            vec![
                ParameterTreeNode::group(
                    "projective",
                    vec![
                        ParameterTreeNode::leaf("truncation_distance_vox", p.truncation_distance_vox),
                        ParameterTreeNode::leaf("max_weight", p.max_weight),
                        ParameterTreeNode::leaf(
                            "max_integration_distance_m",
                            p.max_integration_distance_m,
                        ),
                    ],
                ),
                ParameterTreeNode::group(
                    "occupancy",
                    vec![
                        ParameterTreeNode::leaf(
                            "free_region_occupancy_probability",
                            o.free_region_occupancy_probability,
                        ),
                        ParameterTreeNode::leaf(
                            "occupied_region_occupancy_probability",
                            o.occupied_region_occupancy_probability,
                        ),
                        ParameterTreeNode::leaf("max_log_odds", o.max_log_odds),
                    ],
                ),
                ParameterTreeNode::group(
                    "freespace",
                    vec![
                        ParameterTreeNode::leaf(
                            "max_tsdf_distance_for_occupancy_m",
                            f.max_tsdf_distance_for_occupancy_m,
                        ),
                        ParameterTreeNode::leaf(
                            "max_unobserved_to_keep_consecutive_occupancy_ms",
                            f.max_unobserved_to_keep_consecutive_occupancy_ms,
                        ),
                        ParameterTreeNode::leaf(
                            "min_duration_since_occupied_for_freespace_ms",
                            f.min_duration_since_occupied_for_freespace_ms,
                        ),
                        ParameterTreeNode::leaf(
                            "min_consecutive_occupancy_duration_for_reset_ms",
                            f.min_consecutive_occupancy_duration_for_reset_ms,
                        ),
                        ParameterTreeNode::leaf(
                            "default_frame_interval_ms",
                            f.default_frame_interval_ms,
                        ),
                    ],
                ),
                ParameterTreeNode::group(
                    "color",
                    vec![ParameterTreeNode::leaf("max_weight", self.color.max_weight)],
                ),
                ParameterTreeNode::group(
                    "esdf",
                    vec![
                        ParameterTreeNode::leaf("min_weight", e.min_weight),
                        ParameterTreeNode::leaf("max_site_distance_vox", e.max_site_distance_vox),
                        ParameterTreeNode::leaf("max_esdf_distance_m", e.max_esdf_distance_m),
                        ParameterTreeNode::leaf("esdf_slice_height_m", e.esdf_slice_height_m),
                        ParameterTreeNode::leaf("esdf_2d_min_height_m", e.esdf_2d_min_height_m),
                        ParameterTreeNode::leaf("esdf_2d_max_height_m", e.esdf_2d_max_height_m),
                    ],
                ),
                ParameterTreeNode::group(
                    "mesh",
                    vec![ParameterTreeNode::leaf("min_weight", self.mesh.min_weight)],
                ),
            ],
        )
    }
}
