// layermap_core/src/mapping/integrators.rs

//! Projective integration of depth and color frames into voxel layers.

use crate::camera::Camera;
use crate::image::{is_valid_depth, ColorImage, DepthImage};
use crate::layers::{
    global_voxel_index, join_global_index, voxel_center, voxel_index_from_linear, ColorLayer,
    FreespaceLayer, FreespaceVoxel, OccupancyLayer, TsdfLayer,
};
use crate::mapping::params::{
    ColorIntegratorParams, FreespaceParams, OccupancyIntegratorParams, ProjectiveIntegratorParams,
};
use crate::types::{Index3D, TimeMs, Transform};
use nalgebra::Point3;
use std::collections::HashSet;

/// Where a voxel center lands in the image.
struct Projection {
    row: usize,
    col: usize,
    /// Depth of the voxel center along the optical axis.
    voxel_depth: f32,
}

fn project_voxel(
    global: &Index3D,
    voxel_size: f32,
    t_c_l: &Transform,
    camera: &Camera,
) -> Option<Projection> {
    let p_c = t_c_l * voxel_center(global, voxel_size);
    let (row, col) = camera.project_to_pixel(&p_c)?;
    Some(Projection {
        row,
        col,
        voxel_depth: p_c.z,
    })
}

/// Converts a probability to log-odds.
pub fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

// =========================================================================
// == Block Allocation ==
// =========================================================================

/// Indices of all blocks crossed by the rays of valid depth pixels, from the camera
/// center out to `depth + truncation_m`. Sorted for a deterministic update order.
pub fn blocks_in_view(
    depth: &DepthImage,
    t_l_c: &Transform,
    camera: &Camera,
    truncation_m: f32,
    max_integration_distance_m: f32,
    block_size: f32,
) -> Vec<Index3D> {
    let origin = Point3::from(t_l_c.translation.vector);
    let step = block_size * 0.5;
    let mut blocks = HashSet::new();

    for (row, col, d) in depth.iter_pixels() {
        if !is_valid_depth(d) || d > max_integration_distance_m {
            continue;
        }
        let end = t_l_c * camera.unproject(row, col, d + truncation_m);
        let ray = end - origin;
        let length = ray.norm();
        let direction = ray / length;
        let num_steps = (length / step).ceil() as usize;
        for i in 0..=num_steps {
            let p = origin + direction * (i as f32 * step).min(length);
            blocks.insert(global_voxel_index(&p, block_size));
        }
    }

    let mut blocks: Vec<Index3D> = blocks.into_iter().collect();
    blocks.sort_by_key(crate::layers::index_sort_key);
    blocks
}

// =========================================================================
// == TSDF ==
// =========================================================================

/// Fuses a depth frame into the TSDF voxels of `blocks`, allocating them as needed.
/// Returns the global indices of every voxel that received a measurement.
pub fn integrate_tsdf(
    layer: &mut TsdfLayer,
    blocks: &[Index3D],
    depth: &DepthImage,
    t_l_c: &Transform,
    camera: &Camera,
    params: &ProjectiveIntegratorParams,
) -> Vec<Index3D> {
    let voxel_size = layer.voxel_size();
    let truncation = params.truncation_distance_vox * voxel_size;
    let t_c_l = t_l_c.inverse();
    let mut updated = Vec::new();

    for block_index in blocks {
        let block = layer.allocate_block(block_index);
        for (i, voxel) in block.voxels_mut().iter_mut().enumerate() {
            let global = join_global_index(block_index, &voxel_index_from_linear(i));
            let Some(projection) = project_voxel(&global, voxel_size, &t_c_l, camera) else {
                continue;
            };
            let measured = depth[(projection.row, projection.col)];
            if !is_valid_depth(measured) || measured > params.max_integration_distance_m {
                continue;
            }
            let sdf = measured - projection.voxel_depth;
            if sdf < -truncation {
                continue;
            }
            let sdf = sdf.min(truncation);
            voxel.distance = (voxel.distance * voxel.weight + sdf) / (voxel.weight + 1.0);
            voxel.weight = (voxel.weight + 1.0).min(params.max_weight);
            updated.push(global);
        }
    }
    updated
}

// =========================================================================
// == Occupancy ==
// =========================================================================

/// Fuses a depth frame into log-odds occupancy. Voxels in front of the truncation
/// band are observed free, voxels inside it occupied, voxels behind it untouched.
pub fn integrate_occupancy(
    layer: &mut OccupancyLayer,
    blocks: &[Index3D],
    depth: &DepthImage,
    t_l_c: &Transform,
    camera: &Camera,
    projective: &ProjectiveIntegratorParams,
    params: &OccupancyIntegratorParams,
) -> usize {
    let voxel_size = layer.voxel_size();
    let truncation = projective.truncation_distance_vox * voxel_size;
    let t_c_l = t_l_c.inverse();
    let free_update = logit(params.free_region_occupancy_probability);
    let occupied_update = logit(params.occupied_region_occupancy_probability);
    let mut num_updated = 0;

    for block_index in blocks {
        let block = layer.allocate_block(block_index);
        for (i, voxel) in block.voxels_mut().iter_mut().enumerate() {
            let global = join_global_index(block_index, &voxel_index_from_linear(i));
            let Some(projection) = project_voxel(&global, voxel_size, &t_c_l, camera) else {
                continue;
            };
            let measured = depth[(projection.row, projection.col)];
            if !is_valid_depth(measured) || measured > projective.max_integration_distance_m {
                continue;
            }
            let sdf = measured - projection.voxel_depth;
            let update = if sdf > truncation {
                free_update
            } else if sdf >= -truncation {
                occupied_update
            } else {
                continue;
            };
            voxel.log_odds =
                (voxel.log_odds + update).clamp(-params.max_log_odds, params.max_log_odds);
            num_updated += 1;
        }
    }
    num_updated
}

// =========================================================================
// == Freespace ==
// =========================================================================

/// Advances the freespace history of the voxels a TSDF update touched.
pub fn update_freespace(
    freespace: &mut FreespaceLayer,
    tsdf: &TsdfLayer,
    updated_voxels: &[Index3D],
    now: TimeMs,
    params: &FreespaceParams,
) {
    for block_index in tsdf.block_indices() {
        freespace.allocate_block_with(block_index, FreespaceVoxel::allocated_at(now));
    }

    for global in updated_voxels {
        let Some(tsdf_voxel) = tsdf.get_voxel_by_index(global) else {
            continue;
        };
        let occupied = tsdf_voxel.distance <= params.max_tsdf_distance_for_occupancy_m;
        let Some(voxel) = freespace.get_voxel_by_index_mut(global) else {
            continue;
        };

        if occupied {
            let since_occupied = now - voxel.last_occupied_timestamp_ms;
            if since_occupied > params.max_unobserved_to_keep_consecutive_occupancy_ms {
                voxel.consecutive_occupancy_duration_ms = 0;
            } else {
                voxel.consecutive_occupancy_duration_ms += since_occupied;
            }
            voxel.last_occupied_timestamp_ms = now;
        } else if now - voxel.last_occupied_timestamp_ms
            > params.max_unobserved_to_keep_consecutive_occupancy_ms
        {
            // The run ended; only the current run counts towards a reset.
            voxel.consecutive_occupancy_duration_ms = 0;
        }

        if voxel.is_high_confidence_freespace {
            if voxel.consecutive_occupancy_duration_ms
                >= params.min_consecutive_occupancy_duration_for_reset_ms
            {
                voxel.is_high_confidence_freespace = false;
            }
        } else if now - voxel.last_occupied_timestamp_ms
            >= params.min_duration_since_occupied_for_freespace_ms
        {
            voxel.is_high_confidence_freespace = true;
        }
    }
}

// =========================================================================
// == Color ==
// =========================================================================

/// Blends a color frame into the color voxels of `surface_voxels`, the voxels that
/// carry surface in the mapper's geometry layer.
pub fn integrate_color(
    layer: &mut ColorLayer,
    surface_voxels: impl IntoIterator<Item = Index3D>,
    color: &ColorImage,
    t_l_c: &Transform,
    camera: &Camera,
    params: &ColorIntegratorParams,
) -> usize {
    let voxel_size = layer.voxel_size();
    let t_c_l = t_l_c.inverse();
    let mut num_updated = 0;

    for global in surface_voxels {
        let Some(projection) = project_voxel(&global, voxel_size, &t_c_l, camera) else {
            continue;
        };
        let measured = color[(projection.row, projection.col)];
        // Transparent pixels are masked out.
        if measured.a == 0 {
            continue;
        }
        let (block_index, voxel_index) = crate::layers::split_global_index(&global);
        let voxel = layer.allocate_block(&block_index).voxel_mut(&voxel_index);
        let alpha = 1.0 / (voxel.weight + 1.0);
        voxel.color = voxel.color.blend(measured, alpha);
        voxel.weight = (voxel.weight + 1.0).min(params.max_weight);
        num_updated += 1;
    }
    num_updated
}
