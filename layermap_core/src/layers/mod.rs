// layermap_core/src/layers/mod.rs

//! Sparse, block-hashed voxel storage shared by every volumetric layer.

pub mod voxels;

pub use voxels::{ColorVoxel, EsdfVoxel, FreespaceVoxel, OccupancyVoxel, TsdfVoxel};

use crate::types::Index3D;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// Voxels along each edge of a block.
pub const VOXELS_PER_SIDE: usize = 8;
/// Voxels in one block.
pub const VOXELS_PER_BLOCK: usize = VOXELS_PER_SIDE * VOXELS_PER_SIDE * VOXELS_PER_SIDE;

// =========================================================================
// == Index Helpers ==
// =========================================================================

/// Global index of the voxel containing `p`.
pub fn global_voxel_index(p: &Point3<f32>, voxel_size: f32) -> Index3D {
    Vector3::new(
        (p.x / voxel_size).floor() as i32,
        (p.y / voxel_size).floor() as i32,
        (p.z / voxel_size).floor() as i32,
    )
}

/// Splits a global voxel index into `(block_index, voxel_index_in_block)`.
pub fn split_global_index(global: &Index3D) -> (Index3D, Index3D) {
    let n = VOXELS_PER_SIDE as i32;
    (
        global.map(|c| c.div_euclid(n)),
        global.map(|c| c.rem_euclid(n)),
    )
}

pub fn join_global_index(block: &Index3D, voxel: &Index3D) -> Index3D {
    block * VOXELS_PER_SIDE as i32 + voxel
}

/// Center of a voxel given its global index.
pub fn voxel_center(global: &Index3D, voxel_size: f32) -> Point3<f32> {
    Point3::new(
        (global.x as f32 + 0.5) * voxel_size,
        (global.y as f32 + 0.5) * voxel_size,
        (global.z as f32 + 0.5) * voxel_size,
    )
}

/// Center of a block given its index.
pub fn block_center(block: &Index3D, voxel_size: f32) -> Point3<f32> {
    let block_size = voxel_size * VOXELS_PER_SIDE as f32;
    Point3::new(
        (block.x as f32 + 0.5) * block_size,
        (block.y as f32 + 0.5) * block_size,
        (block.z as f32 + 0.5) * block_size,
    )
}

fn linear_index(voxel: &Index3D) -> usize {
    let n = VOXELS_PER_SIDE;
    voxel.x as usize + n * (voxel.y as usize + n * voxel.z as usize)
}

/// Inverse of the in-block linear index.
pub fn voxel_index_from_linear(i: usize) -> Index3D {
    let n = VOXELS_PER_SIDE;
    Vector3::new((i % n) as i32, ((i / n) % n) as i32, (i / (n * n)) as i32)
}

/// Deterministic order for block indices (nalgebra vectors have no total order).
pub fn index_sort_key(index: &Index3D) -> (i32, i32, i32) {
    (index.x, index.y, index.z)
}

// =========================================================================
// == Blocks and Layers ==
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct VoxelBlock<V> {
    voxels: Vec<V>,
}

impl<V: Clone + Default> VoxelBlock<V> {
    fn new() -> Self {
        Self::filled(V::default())
    }

    fn filled(voxel: V) -> Self {
        Self {
            voxels: vec![voxel; VOXELS_PER_BLOCK],
        }
    }
}

impl<V> VoxelBlock<V> {
    pub fn voxel(&self, voxel: &Index3D) -> &V {
        &self.voxels[linear_index(voxel)]
    }

    pub fn voxel_mut(&mut self, voxel: &Index3D) -> &mut V {
        &mut self.voxels[linear_index(voxel)]
    }

    /// Voxels in linear order, see [`voxel_index_from_linear`].
    pub fn voxels(&self) -> &[V] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [V] {
        &mut self.voxels
    }
}

/// A sparse voxel layer: blocks of `VOXELS_PER_SIDE^3` voxels allocated on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayer<V> {
    voxel_size: f32,
    blocks: HashMap<Index3D, VoxelBlock<V>>,
}

pub type TsdfLayer = BlockLayer<TsdfVoxel>;
pub type OccupancyLayer = BlockLayer<OccupancyVoxel>;
pub type FreespaceLayer = BlockLayer<FreespaceVoxel>;
pub type EsdfLayer = BlockLayer<EsdfVoxel>;
pub type ColorLayer = BlockLayer<ColorVoxel>;

impl<V: Clone + Default> BlockLayer<V> {
    pub fn new(voxel_size: f32) -> Self {
        Self {
            voxel_size,
            blocks: HashMap::new(),
        }
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn block_size(&self) -> f32 {
        self.voxel_size * VOXELS_PER_SIDE as f32
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_indices(&self) -> impl Iterator<Item = &Index3D> {
        self.blocks.keys()
    }

    pub fn get_block(&self, block: &Index3D) -> Option<&VoxelBlock<V>> {
        self.blocks.get(block)
    }

    pub fn get_block_mut(&mut self, block: &Index3D) -> Option<&mut VoxelBlock<V>> {
        self.blocks.get_mut(block)
    }

    /// Returns the block, allocating it with default voxels if missing.
    pub fn allocate_block(&mut self, block: &Index3D) -> &mut VoxelBlock<V> {
        self.blocks.entry(*block).or_insert_with(VoxelBlock::new)
    }

    /// Like `allocate_block` but new blocks are filled with `voxel`.
    pub fn allocate_block_with(&mut self, block: &Index3D, voxel: V) -> &mut VoxelBlock<V> {
        self.blocks
            .entry(*block)
            .or_insert_with(|| VoxelBlock::filled(voxel))
    }

    pub fn contains_block(&self, block: &Index3D) -> bool {
        self.blocks.contains_key(block)
    }

    pub fn get_voxel_by_index(&self, global: &Index3D) -> Option<&V> {
        let (block, voxel) = split_global_index(global);
        self.blocks.get(&block).map(|b| b.voxel(&voxel))
    }

    pub fn get_voxel_by_index_mut(&mut self, global: &Index3D) -> Option<&mut V> {
        let (block, voxel) = split_global_index(global);
        self.blocks.get_mut(&block).map(|b| b.voxel_mut(&voxel))
    }

    /// Voxel containing the layer-frame point `p`, if its block is allocated.
    pub fn get_voxel(&self, p: &Point3<f32>) -> Option<&V> {
        self.get_voxel_by_index(&global_voxel_index(p, self.voxel_size))
    }

    /// Iterates `(global_index, voxel)` over every allocated voxel.
    pub fn iter_voxels(&self) -> impl Iterator<Item = (Index3D, &V)> + '_ {
        self.blocks.iter().flat_map(|(block_index, block)| {
            block.voxels.iter().enumerate().map(move |(i, v)| {
                (
                    join_global_index(block_index, &voxel_index_from_linear(i)),
                    v,
                )
            })
        })
    }

    pub fn remove_block(&mut self, block: &Index3D) -> Option<VoxelBlock<V>> {
        self.blocks.remove(block)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_negative_coordinates_split_into_block_and_voxel() {
        let (block, voxel) = split_global_index(&Vector3::new(-1, 8, -9));
        assert_eq!(block, Vector3::new(-1, 1, -2));
        assert_eq!(voxel, Vector3::new(7, 0, 7));
        assert_eq!(join_global_index(&block, &voxel), Vector3::new(-1, 8, -9));
    }

    #[test]
    fn test_linear_index_round_trip_for_all_voxels() {
        for i in 0..VOXELS_PER_BLOCK {
            assert_eq!(linear_index(&voxel_index_from_linear(i)), i);
        }
    }

    #[test]
    fn test_voxel_lookup_by_point() {
        let mut layer = TsdfLayer::new(0.1);
        let p = Point3::new(0.25, -0.05, 1.01);
        assert!(layer.get_voxel(&p).is_none());

        let global = global_voxel_index(&p, 0.1);
        assert_eq!(global, Vector3::new(2, -1, 10));
        let (block, voxel) = split_global_index(&global);
        layer.allocate_block(&block).voxel_mut(&voxel).weight = 3.0;

        assert_abs_diff_eq!(layer.get_voxel(&p).unwrap().weight, 3.0);
        let center = voxel_center(&global, 0.1);
        assert_abs_diff_eq!(center.x, 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(center.y, -0.05, epsilon = 1e-6);
        assert_eq!(layer.num_blocks(), 1);
        assert_eq!(layer.iter_voxels().count(), VOXELS_PER_BLOCK);
    }
}
