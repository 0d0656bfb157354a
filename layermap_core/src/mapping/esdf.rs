// layermap_core/src/mapping/esdf.rs

//! Euclidean distance field computation from TSDF or occupancy sites.

use crate::layers::{
    split_global_index, voxel_center, EsdfLayer, EsdfVoxel, FreespaceLayer, OccupancyLayer,
    TsdfLayer,
};
use crate::mapping::params::EsdfParams;
use crate::types::{EsdfMode, Index3D};
use nalgebra::Vector3;
use std::collections::{HashMap, VecDeque};

/// Which candidate sites are allowed into the distance field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiteFilter {
    #[default]
    All,
    /// Drop sites whose freespace voxel is high confidence freespace. Whatever
    /// occupies such a voxel is transient and belongs to the masked mapper.
    ExcludeHighConfidenceFreespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EsdfUpdateStats {
    pub num_sites: usize,
    pub num_excluded_sites: usize,
    pub num_observed_voxels: usize,
}

/// The geometry layer sites are read from.
#[derive(Debug, Clone, Copy)]
pub enum GeometrySource<'a> {
    Tsdf(&'a TsdfLayer),
    Occupancy(&'a OccupancyLayer),
}

/// Per-voxel classification of the geometry layer.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    is_site: bool,
    is_inside: bool,
}

fn classify(source: GeometrySource<'_>, params: &EsdfParams) -> Vec<(Index3D, Candidate)> {
    match source {
        GeometrySource::Tsdf(layer) => {
            let max_site_distance = params.max_site_distance_vox * layer.voxel_size();
            layer
                .iter_voxels()
                .filter(|(_, v)| v.weight >= params.min_weight && v.weight > 0.0)
                .map(|(index, v)| {
                    (
                        index,
                        Candidate {
                            is_site: v.distance.abs() <= max_site_distance,
                            is_inside: v.distance < 0.0,
                        },
                    )
                })
                .collect()
        }
        GeometrySource::Occupancy(layer) => layer
            .iter_voxels()
            .filter(|(_, v)| v.log_odds != 0.0)
            .map(|(index, v)| {
                (
                    index,
                    Candidate {
                        is_site: v.is_occupied(),
                        is_inside: false,
                    },
                )
            })
            .collect(),
    }
}

fn neighbor_offsets(mode: EsdfMode) -> Vec<Index3D> {
    let z_range = match mode {
        EsdfMode::TwoD => 0..=0,
        EsdfMode::ThreeD => -1..=1,
    };
    let mut offsets = Vec::with_capacity(26);
    for dz in z_range {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 || dz != 0 {
                    offsets.push(Vector3::new(dx, dy, dz));
                }
            }
        }
    }
    offsets
}

/// Recomputes the distance field from scratch.
///
/// Sites are seeded from `source` (optionally filtered against `freespace`) and
/// distances are spread over observed voxels with a brushfire that carries the
/// offset to the nearest site, up to `params.max_esdf_distance_m`.
pub fn compute_esdf(
    source: GeometrySource<'_>,
    freespace: &FreespaceLayer,
    filter: SiteFilter,
    mode: EsdfMode,
    params: &EsdfParams,
    output: &mut EsdfLayer,
) -> EsdfUpdateStats {
    let voxel_size = output.voxel_size();
    let slice_z = (params.esdf_slice_height_m / voxel_size).floor() as i32;
    let mut stats = EsdfUpdateStats::default();

    // --- 1. Seed observed voxels and sites ---
    let mut voxels: HashMap<Index3D, EsdfVoxel> = HashMap::new();
    let mut queue = VecDeque::new();
    for (index, candidate) in classify(source, params) {
        let mut is_site = candidate.is_site;
        if is_site && filter == SiteFilter::ExcludeHighConfidenceFreespace {
            let transient = freespace
                .get_voxel_by_index(&index)
                .is_some_and(|v| v.is_high_confidence_freespace);
            if transient {
                is_site = false;
                stats.num_excluded_sites += 1;
            }
        }

        let target = match mode {
            EsdfMode::ThreeD => index,
            EsdfMode::TwoD => {
                let height = voxel_center(&index, voxel_size).z;
                let in_band =
                    height >= params.esdf_2d_min_height_m && height <= params.esdf_2d_max_height_m;
                is_site &= in_band;
                Vector3::new(index.x, index.y, slice_z)
            }
        };

        let entry = voxels.entry(target).or_insert(EsdfVoxel {
            observed: true,
            is_site: false,
            is_inside: false,
            squared_distance_vox: f32::INFINITY,
            parent_offset: Vector3::zeros(),
        });
        entry.is_inside |= candidate.is_inside && mode == EsdfMode::ThreeD;
        if is_site && !entry.is_site {
            entry.is_site = true;
            entry.squared_distance_vox = 0.0;
            queue.push_back(target);
        }
    }
    stats.num_sites = queue.len();
    stats.num_observed_voxels = voxels.len();

    // --- 2. Brushfire propagation ---
    let max_distance_vox = params.max_esdf_distance_m / voxel_size;
    let max_squared_distance_vox = max_distance_vox * max_distance_vox;
    let offsets = neighbor_offsets(mode);
    while let Some(current) = queue.pop_front() {
        let site = current + voxels[&current].parent_offset;
        for offset in &offsets {
            let neighbor = current + offset;
            let Some(voxel) = voxels.get_mut(&neighbor) else {
                continue;
            };
            let to_site = site - neighbor;
            let squared = to_site.map(|c| c as f32).norm_squared();
            if squared <= max_squared_distance_vox && squared < voxel.squared_distance_vox {
                voxel.squared_distance_vox = squared;
                voxel.parent_offset = to_site;
                queue.push_back(neighbor);
            }
        }
    }

    // --- 3. Write out ---
    output.clear();
    for (index, mut voxel) in voxels {
        if !voxel.squared_distance_vox.is_finite() {
            voxel.squared_distance_vox = max_squared_distance_vox;
        }
        let (block, local) = split_global_index(&index);
        *output.allocate_block(&block).voxel_mut(&local) = voxel;
    }
    stats
}
