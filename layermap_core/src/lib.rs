// layermap_core/src/lib.rs

// This file defines the public modules of the library.
pub mod camera;
pub mod config;
pub mod error;
pub mod image;
pub mod layers;
pub mod mapping;
pub mod multi_mapper;
pub mod params;
pub mod perception;
pub mod prelude;
pub mod scratch;
pub mod stream;
pub mod types;
