// layermap_core/src/layers/voxels.rs

use crate::image::Color;
use crate::types::{Index3D, TimeMs};
use nalgebra::Vector3;

/// Truncated signed distance. Positive in front of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TsdfVoxel {
    pub distance: f32,
    pub weight: f32,
}

impl TsdfVoxel {
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }
}

/// Log-odds occupancy. `0` is unknown (p = 0.5).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OccupancyVoxel {
    pub log_odds: f32,
}

impl OccupancyVoxel {
    pub fn is_occupied(&self) -> bool {
        self.log_odds > 0.0
    }

    pub fn probability(&self) -> f32 {
        1.0 / (1.0 + (-self.log_odds).exp())
    }
}

/// Timing history used to decide whether a voxel is reliably empty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FreespaceVoxel {
    /// Last time the voxel was seen occupied.
    pub last_occupied_timestamp_ms: TimeMs,
    /// How long the current run of occupied observations has lasted.
    pub consecutive_occupancy_duration_ms: TimeMs,
    /// Empty for long enough that anything appearing here is moving.
    pub is_high_confidence_freespace: bool,
}

impl FreespaceVoxel {
    /// State of a voxel that has just been allocated at `now`.
    pub fn allocated_at(now: TimeMs) -> Self {
        Self {
            last_occupied_timestamp_ms: now,
            consecutive_occupancy_duration_ms: 0,
            is_high_confidence_freespace: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EsdfVoxel {
    /// The voxel has a distance value.
    pub observed: bool,
    /// The voxel is an obstacle the distances are measured to.
    pub is_site: bool,
    /// Behind the TSDF surface.
    pub is_inside: bool,
    /// Squared distance to the nearest site, in voxels.
    pub squared_distance_vox: f32,
    /// Offset from this voxel to its nearest site, in voxels.
    pub parent_offset: Index3D,
}

impl EsdfVoxel {
    pub fn site() -> Self {
        Self {
            observed: true,
            is_site: true,
            is_inside: false,
            squared_distance_vox: 0.0,
            parent_offset: Vector3::zeros(),
        }
    }

    /// Unsigned distance in meters.
    pub fn distance_m(&self, voxel_size: f32) -> f32 {
        self.squared_distance_vox.sqrt() * voxel_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorVoxel {
    pub color: Color,
    pub weight: f32,
}
