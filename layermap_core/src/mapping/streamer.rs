// layermap_core/src/mapping/streamer.rs

//! Bandwidth limited streaming of mesh blocks.

use crate::image::Color;
use crate::layers::index_sort_key;
use crate::mapping::mesh::{block_distance_squared, MeshBlock, MeshLayer};
use crate::params::ParameterTreeNode;
use crate::types::{Index3D, Transform};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshStreamerParams {
    /// Outgoing bandwidth budget. `<= 0` disables the limit.
    pub bandwidth_limit_mbps: f32,
    /// Rate at which `serialize` is expected to be called.
    pub expected_update_rate_hz: f32,
    /// Blocks further than this from the camera are held back. `<= 0` disables.
    pub exclusion_radius_m: f32,
}

impl Default for MeshStreamerParams {
    fn default() -> Self {
        Self {
            bandwidth_limit_mbps: 25.0,
            expected_update_rate_hz: 5.0,
            exclusion_radius_m: 0.0,
        }
    }
}

impl MeshStreamerParams {
    /// Bytes that may be sent per call, `None` when unlimited.
    pub fn byte_budget(&self) -> Option<usize> {
        if self.bandwidth_limit_mbps <= 0.0 || self.expected_update_rate_hz <= 0.0 {
            return None;
        }
        Some((self.bandwidth_limit_mbps * 1e6 / 8.0 / self.expected_update_rate_hz) as usize)
    }

    pub fn parameter_tree(&self, name: &str) -> ParameterTreeNode {
        ParameterTreeNode::group(
            name,
            vec![
                ParameterTreeNode::leaf("bandwidth_limit_mbps", self.bandwidth_limit_mbps),
                ParameterTreeNode::leaf("expected_update_rate_hz", self.expected_update_rate_hz),
                ParameterTreeNode::leaf("exclusion_radius_m", self.exclusion_radius_m),
            ],
        )
    }
}

// =========================================================================
// == Serialized Mesh ==
// =========================================================================

const MAGIC: &[u8; 4] = b"LMSH";
const FORMAT_VERSION: u32 = 1;

/// A batch of mesh blocks packed into flat buffers.
///
/// Block `i` owns `vertices[vertex_block_offsets[i]..vertex_block_offsets[i + 1]]`
/// (or up to the end for the last block), and likewise for `triangle_indices`.
/// Indices are local to their block. A block with no vertices tells the receiver
/// to drop it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerializedMesh {
    pub block_indices: Vec<Index3D>,
    pub vertex_block_offsets: Vec<u32>,
    pub triangle_index_block_offsets: Vec<u32>,
    pub vertices: Vec<Point3<f32>>,
    pub colors: Vec<Color>,
    pub triangle_indices: Vec<u32>,
}

impl SerializedMesh {
    pub fn num_blocks(&self) -> usize {
        self.block_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_indices.is_empty()
    }

    fn push_block(&mut self, index: Index3D, block: Option<&MeshBlock>) {
        self.block_indices.push(index);
        self.vertex_block_offsets.push(self.vertices.len() as u32);
        self.triangle_index_block_offsets
            .push(self.triangle_indices.len() as u32);
        if let Some(block) = block {
            self.vertices.extend_from_slice(&block.vertices);
            self.colors.extend_from_slice(&block.colors);
            self.triangle_indices
                .extend(block.triangles.iter().flat_map(|t| t.iter().copied()));
        }
    }

    /// Vertices of block `i`.
    pub fn block_vertices(&self, i: usize) -> &[Point3<f32>] {
        let start = self.vertex_block_offsets[i] as usize;
        let end = self
            .vertex_block_offsets
            .get(i + 1)
            .map_or(self.vertices.len(), |&o| o as usize);
        &self.vertices[start..end]
    }

    /// Little-endian wire encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            20 + self.block_indices.len() * 20
                + self.vertices.len() * 16
                + self.triangle_indices.len() * 4,
        );
        out.extend_from_slice(MAGIC);
        for n in [
            FORMAT_VERSION,
            self.block_indices.len() as u32,
            self.vertices.len() as u32,
            self.triangle_indices.len() as u32,
        ] {
            out.extend_from_slice(&n.to_le_bytes());
        }
        for index in &self.block_indices {
            for c in index.iter() {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        for offset in self
            .vertex_block_offsets
            .iter()
            .chain(&self.triangle_index_block_offsets)
        {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        for v in &self.vertices {
            for c in v.coords.iter() {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        for color in &self.colors {
            out.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        for i in &self.triangle_indices {
            out.extend_from_slice(&i.to_le_bytes());
        }
        out
    }
}

// =========================================================================
// == Streamer ==
// =========================================================================

/// Tracks which mesh blocks still have to be sent and picks the next batch.
#[derive(Debug, Clone, Default)]
pub struct MeshStreamer {
    params: MeshStreamerParams,
    pending: HashSet<Index3D>,
}

impl MeshStreamer {
    pub fn new(params: MeshStreamerParams) -> Self {
        Self {
            params,
            pending: HashSet::new(),
        }
    }

    pub fn params(&self) -> &MeshStreamerParams {
        &self.params
    }

    pub fn set_params(&mut self, params: MeshStreamerParams) {
        self.params = params;
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn mark_updated(&mut self, blocks: impl IntoIterator<Item = Index3D>) {
        self.pending.extend(blocks);
    }

    /// Packs the next batch of blocks. `t_l_c` orders blocks nearest first and
    /// enables the exclusion radius.
    pub fn serialize(
        &mut self,
        mesh: &MeshLayer,
        voxel_size: f32,
        t_l_c: Option<&Transform>,
        full: bool,
    ) -> SerializedMesh {
        let mut out = SerializedMesh::default();

        if full {
            let mut all: Vec<Index3D> = mesh.block_indices().copied().collect();
            all.sort_by_key(index_sort_key);
            for index in all {
                out.push_block(index, mesh.get_block(&index));
            }
            self.pending.clear();
            debug!(num_blocks = out.num_blocks(), "Serialized full mesh");
            return out;
        }

        let camera_position = t_l_c.map(|t| Point3::from(t.translation.vector));
        let mut candidates: Vec<(Index3D, f32)> = self
            .pending
            .iter()
            .map(|index| {
                let d2 = camera_position
                    .map_or(0.0, |p| block_distance_squared(index, voxel_size, &p));
                (*index, d2)
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| index_sort_key(&a.0).cmp(&index_sort_key(&b.0)))
        });

        let exclusion_d2 = (camera_position.is_some() && self.params.exclusion_radius_m > 0.0)
            .then(|| self.params.exclusion_radius_m * self.params.exclusion_radius_m);
        let budget = self.params.byte_budget();
        let mut spent = 0usize;

        for (index, d2) in candidates {
            if exclusion_d2.is_some_and(|limit| d2 > limit) {
                continue;
            }
            let block = mesh.get_block(&index);
            let size = block.map_or(0, MeshBlock::num_bytes);
            if let Some(budget) = budget {
                if !out.is_empty() && spent + size > budget {
                    break;
                }
            }
            spent += size;
            out.push_block(index, block);
            self.pending.remove(&index);
        }
        debug!(
            num_blocks = out.num_blocks(),
            bytes = spent,
            remaining = self.pending.len(),
            "Serialized mesh update"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn block_with_triangles(n: usize) -> MeshBlock {
        MeshBlock {
            vertices: vec![Point3::origin(); 3],
            colors: vec![Color::GRAY; 3],
            triangles: vec![[0, 1, 2]; n],
        }
    }

    fn mesh_layer(indices: &[Index3D]) -> MeshLayer {
        let mut layer = MeshLayer::new();
        for index in indices {
            layer.set_block(*index, block_with_triangles(10));
        }
        layer
    }

    #[test]
    fn test_budget_limits_blocks_per_call() {
        let indices: Vec<Index3D> = (0..4).map(|x| Vector3::new(x, 0, 0)).collect();
        let layer = mesh_layer(&indices);
        let per_block = layer.get_block(&indices[0]).unwrap().num_bytes();

        // Budget for two blocks: bytes = mbps * 1e6 / 8 / hz.
        let params = MeshStreamerParams {
            bandwidth_limit_mbps: (2 * per_block) as f32 * 8.0 / 1e6,
            expected_update_rate_hz: 1.0,
            exclusion_radius_m: 0.0,
        };
        let mut streamer = MeshStreamer::new(params);
        streamer.mark_updated(indices.iter().copied());

        let first = streamer.serialize(&layer, 0.1, None, false);
        assert_eq!(first.num_blocks(), 2);
        assert_eq!(streamer.num_pending(), 2);
        let second = streamer.serialize(&layer, 0.1, None, false);
        assert_eq!(second.num_blocks(), 2);
        assert_eq!(streamer.num_pending(), 0);
        assert!(streamer.serialize(&layer, 0.1, None, false).is_empty());
    }

    #[test]
    fn test_nearest_blocks_go_first_and_far_blocks_wait() {
        let near = Vector3::new(5, 0, 0);
        let far = Vector3::new(-20, 0, 0);
        let layer = mesh_layer(&[near, far]);
        let mut streamer = MeshStreamer::new(MeshStreamerParams {
            bandwidth_limit_mbps: 0.0,
            expected_update_rate_hz: 5.0,
            exclusion_radius_m: 5.0,
        });
        streamer.mark_updated([near, far]);
        let pose = Transform::from_parts(
            Translation3::new(4.0, 0.0, 0.0),
            UnitQuaternion::identity(),
        );

        let batch = streamer.serialize(&layer, 0.1, Some(&pose), false);
        assert_eq!(batch.block_indices, vec![near]);
        assert_eq!(streamer.num_pending(), 1);

        let full = streamer.serialize(&layer, 0.1, None, true);
        assert_eq!(full.num_blocks(), 2);
        assert_eq!(streamer.num_pending(), 0);
    }

    #[test]
    fn test_removed_blocks_are_sent_empty() {
        let layer = MeshLayer::new();
        let mut streamer = MeshStreamer::default();
        streamer.mark_updated([Vector3::new(1, 2, 3)]);
        let batch = streamer.serialize(&layer, 0.1, None, false);
        assert_eq!(batch.num_blocks(), 1);
        assert!(batch.block_vertices(0).is_empty());
    }

    #[test]
    fn test_byte_layout() {
        let index = Vector3::new(1, -2, 3);
        let layer = mesh_layer(&[index]);
        let mesh = MeshStreamer::default().serialize(&layer, 0.1, None, true);
        let bytes = mesh.to_bytes();

        assert_eq!(&bytes[0..4], b"LMSH");
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        assert_eq!(word(4), 1);
        assert_eq!(word(8), 1);
        assert_eq!(word(12), 3);
        assert_eq!(word(16), 30);
        assert_eq!(i32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), -2);
        let expected = 20 + 12 + 4 + 4 + 3 * 12 + 3 * 4 + 30 * 4;
        assert_eq!(bytes.len(), expected);
    }
}
