// layermap_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::mapping::Mapper;
pub use crate::multi_mapper::{MappingType, MultiMapper, MultiMapperParams};

// --- Core Data Structures ---
pub use crate::camera::Camera;
pub use crate::config::MultiMapperConfig;
pub use crate::error::{MapperError, MapperResult};
pub use crate::image::{Color, ColorImage, DepthImage, Image, MonoImage};
pub use crate::stream::ExecutionStream;
pub use crate::types::{EsdfMode, MemoryType, ProjectiveLayerType, TimeMs, Transform};

// --- Mapping Outputs ---
pub use crate::mapping::{MapperParams, SerializedMesh, SiteFilter, VoxelMapper};
pub use crate::params::ParameterTreeNode;
