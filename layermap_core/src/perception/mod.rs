// layermap_core/src/perception/mod.rs

//! Image-space processing that decides which pixels go to which mapper.

pub mod dynamics;
pub mod image_masker;
pub mod mask_cleaner;
pub mod overlay;

pub use dynamics::DynamicsDetector;
pub use image_masker::{
    reproject_mask_into, split_depth_reprojected, split_depth_reprojected_into, split_image,
    split_into, SplitBuffers,
};
pub use mask_cleaner::{clean_mask, Connectivity, DEFAULT_CONNECTED_MASK_COMPONENT_SIZE_THRESHOLD};
pub use overlay::OverlayStyle;
