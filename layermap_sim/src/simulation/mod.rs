// layermap_sim/src/simulation/mod.rs

//! Scenario loading, the synthetic scene and the frame loop that feeds it to the
//! multi mapper.

pub mod config;
pub mod prng;
pub mod runner;
pub mod scene;

use layermap_core::error::MapperError;
use std::path::PathBuf;
use thiserror::Error;

pub use config::{load_scenario, parse_scenario, ScenarioConfig};
pub use prng::SimulationRng;
pub use runner::{run_scenario, RunSummary, ScenarioRunner};
pub use scene::{SceneFrame, SyntheticScene};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("scenario file not found: {}", .0.display())]
    MissingScenario(PathBuf),

    #[error("failed to load scenario: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("invalid scene: {0}")]
    InvalidScene(String),

    #[error(transparent)]
    Mapper(#[from] MapperError),
}
