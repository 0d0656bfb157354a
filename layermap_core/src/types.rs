// layermap_core/src/types.rs

use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Core Type Aliases ---

/// A rigid transform. By convention `T_A_B` maps points from frame B into frame A,
/// e.g. `T_L_C` takes camera-frame points into the layer frame.
pub type Transform = Isometry3<f32>;

/// Integer index of a block or voxel in a layer.
pub type Index3D = Vector3<i32>;

/// Timestamps and durations in milliseconds.
pub type TimeMs = i64;

// --- Configuration Enums ---

/// Where the layers of a mapper are requested to live.
///
/// This build executes on the CPU; every variant is backed by host memory and the
/// value is only carried through for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    Device,
    Unified,
    Host,
}

/// Dimensionality of the distance field computed by `update_esdf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsdfMode {
    /// A single horizontal slice, for ground robots.
    TwoD,
    #[default]
    ThreeD,
}

/// The layer that depth frames are projectively integrated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectiveLayerType {
    Tsdf,
    Occupancy,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Device => write!(f, "device"),
            MemoryType::Unified => write!(f, "unified"),
            MemoryType::Host => write!(f, "host"),
        }
    }
}

impl fmt::Display for EsdfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EsdfMode::TwoD => write!(f, "2d"),
            EsdfMode::ThreeD => write!(f, "3d"),
        }
    }
}

impl fmt::Display for ProjectiveLayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectiveLayerType::Tsdf => write!(f, "tsdf"),
            ProjectiveLayerType::Occupancy => write!(f, "occupancy"),
        }
    }
}
