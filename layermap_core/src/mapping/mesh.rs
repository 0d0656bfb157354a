// layermap_core/src/mapping/mesh.rs

//! Surface extraction with naive surface nets.
//!
//! Every cube of 8 neighbouring voxel centers whose signed values change sign gets
//! one vertex, placed at the mean of the zero crossings on its edges. Every lattice
//! edge whose end points change sign produces a quad joining the 4 cubes around it.

use crate::image::Color;
use crate::layers::{block_center, join_global_index, voxel_center, voxel_index_from_linear, VOXELS_PER_BLOCK};
use crate::types::Index3D;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// The triangle mesh of one block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshBlock {
    pub vertices: Vec<Point3<f32>>,
    pub colors: Vec<Color>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshBlock {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Size of this block once serialized (vertices, colors and indices).
    pub fn num_bytes(&self) -> usize {
        self.vertices.len() * 12 + self.colors.len() * 4 + self.triangles.len() * 12
    }
}

/// Mesh blocks keyed by the index of the voxel block they were extracted from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshLayer {
    blocks: HashMap<Index3D, MeshBlock>,
}

impl MeshLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_block(&self, index: &Index3D) -> Option<&MeshBlock> {
        self.blocks.get(index)
    }

    pub fn block_indices(&self) -> impl Iterator<Item = &Index3D> {
        self.blocks.keys()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn num_vertices(&self) -> usize {
        self.blocks.values().map(|b| b.vertices.len()).sum()
    }

    pub fn num_triangles(&self) -> usize {
        self.blocks.values().map(|b| b.triangles.len()).sum()
    }

    /// Stores `block`, dropping the entry when it has no surface.
    pub fn set_block(&mut self, index: Index3D, block: MeshBlock) {
        if block.is_empty() {
            self.blocks.remove(&index);
        } else {
            self.blocks.insert(index, block);
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

// --- Cube geometry ---

/// Corner `i` of a cube sits at offset `(i & 1, (i >> 1) & 1, (i >> 2) & 1)`.
fn corner_offset(i: usize) -> Index3D {
    Vector3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32)
}

/// The 12 cube edges as pairs of corner indices.
const CUBE_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

fn is_outside(value: f32) -> bool {
    value >= 0.0
}

/// Vertex of the cube whose lowest corner is `cube`, if all 8 corners are known and
/// the surface passes through it.
fn cube_vertex(
    cube: &Index3D,
    field: &impl Fn(&Index3D) -> Option<f32>,
    voxel_size: f32,
) -> Option<Point3<f32>> {
    let mut values = [0.0f32; 8];
    for (i, value) in values.iter_mut().enumerate() {
        *value = field(&(cube + corner_offset(i)))?;
    }
    let first = is_outside(values[0]);
    if values.iter().all(|&v| is_outside(v) == first) {
        return None;
    }

    let mut sum = Vector3::zeros();
    let mut count = 0;
    for &(a, b) in &CUBE_EDGES {
        let (da, db) = (values[a], values[b]);
        if is_outside(da) == is_outside(db) {
            continue;
        }
        let t = da / (da - db);
        let pa = voxel_center(&(cube + corner_offset(a)), voxel_size);
        let pb = voxel_center(&(cube + corner_offset(b)), voxel_size);
        sum += pa.coords + (pb - pa) * t;
        count += 1;
    }
    Some(Point3::from(sum / count as f32))
}

/// Builds the mesh of one block from a signed field over global voxel indices.
///
/// `field` returns `None` for voxels without a measurement; cubes touching such
/// voxels produce no surface. `color_at` colors each vertex.
pub fn extract_block_mesh(
    block_index: &Index3D,
    voxel_size: f32,
    field: &impl Fn(&Index3D) -> Option<f32>,
    color_at: &impl Fn(&Point3<f32>) -> Color,
) -> MeshBlock {
    let mut mesh = MeshBlock::default();
    let mut vertex_of_cube: HashMap<Index3D, Option<u32>> = HashMap::new();

    let mut vertex_index = |cube: Index3D, mesh: &mut MeshBlock| -> Option<u32> {
        *vertex_of_cube.entry(cube).or_insert_with(|| {
            let vertex = cube_vertex(&cube, field, voxel_size)?;
            mesh.vertices.push(vertex);
            mesh.colors.push(color_at(&vertex));
            Some((mesh.vertices.len() - 1) as u32)
        })
    };

    for i in 0..VOXELS_PER_BLOCK {
        let global = join_global_index(block_index, &voxel_index_from_linear(i));
        let Some(value) = field(&global) else {
            continue;
        };
        for axis in 0..3 {
            let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
            let step = |k: usize| -> Index3D {
                let mut e = Vector3::zeros();
                e[k] = 1;
                e
            };
            let Some(next_value) = field(&(global + step(axis))) else {
                continue;
            };
            if is_outside(value) == is_outside(next_value) {
                continue;
            }

            // Counter-clockwise around +axis.
            let cubes = [
                global,
                global - step(b),
                global - step(b) - step(c),
                global - step(c),
            ];
            let mut quad = [0u32; 4];
            let mut complete = true;
            for (slot, cube) in quad.iter_mut().zip(cubes) {
                match vertex_index(cube, &mut mesh) {
                    Some(v) => *slot = v,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            // The outward normal points from inside (negative) to outside.
            if is_outside(value) {
                quad.reverse();
            }
            mesh.triangles.push([quad[0], quad[1], quad[2]]);
            mesh.triangles.push([quad[0], quad[2], quad[3]]);
        }
    }
    mesh
}

/// Squared distance from `p` to the center of a mesh block.
pub fn block_distance_squared(block: &Index3D, voxel_size: f32, p: &Point3<f32>) -> f32 {
    (block_center(block, voxel_size) - p).norm_squared()
}
