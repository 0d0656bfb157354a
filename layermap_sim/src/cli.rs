// layermap_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Layermap: replays a synthetic depth camera scenario through the multi mapper.
///
/// Values given here override the ones loaded from the scenario file and from
/// `LAYERMAP_` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/dynamic_box.toml")]
    pub scenario: PathBuf,

    /// Number of frames to integrate.
    #[arg(short, long)]
    pub frames: Option<usize>,

    /// Seed for the depth noise generator.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Send the whole mesh on every mesh update instead of only the changed blocks.
    #[arg(long, default_value_t = false)]
    pub full_mesh: bool,
}
