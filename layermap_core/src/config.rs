// layermap_core/src/config.rs

use crate::mapping::MapperParams;
use crate::multi_mapper::{MappingType, MultiMapperParams};
use crate::types::{EsdfMode, MemoryType};
use serde::{Deserialize, Serialize};

// =========================================================================
// == Top-Level Mapper Configuration ==
// =========================================================================

/// Everything needed to build a [`crate::multi_mapper::MultiMapper`]. Maps to the
/// `[mapper]` table of a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiMapperConfig {
    pub mapping_type: MappingType,
    pub voxel_size_m: f32,
    pub esdf_mode: EsdfMode,
    pub memory_type: MemoryType,
    pub multi_mapper: MultiMapperParams,
    pub unmasked_mapper: MapperParams,
    /// Only valid for mapping types with a masked mapper. Defaults are used when
    /// missing.
    pub masked_mapper: Option<MapperParams>,
}

impl Default for MultiMapperConfig {
    fn default() -> Self {
        Self {
            mapping_type: MappingType::default(),
            voxel_size_m: 0.05,
            esdf_mode: EsdfMode::default(),
            memory_type: MemoryType::default(),
            multi_mapper: MultiMapperParams::default(),
            unmasked_mapper: MapperParams::default(),
            masked_mapper: None,
        }
    }
}
