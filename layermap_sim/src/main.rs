// layermap_sim/src/main.rs

use clap::Parser;
use layermap_sim::cli::Cli;
use layermap_sim::simulation::{load_scenario, ScenarioRunner, SimError, SimulationRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), SimError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("layermap_sim=info,layermap_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_scenario(&cli.scenario)?;
    // --- Command line overrides ---
    if let Some(frames) = cli.frames {
        config.simulation.frames = frames;
    }
    if cli.seed.is_some() {
        config.simulation.seed = cli.seed;
    }

    let rng = SimulationRng::from_seed(config.simulation.seed);
    let mut runner = ScenarioRunner::new(config, rng)?.with_full_mesh(cli.full_mesh);
    let summary = runner.run()?;
    info!(
        frames = summary.frames,
        dynamic_frames = summary.dynamic_frames,
        mesh_bytes = summary.mesh_bytes_sent,
        "Done"
    );
    Ok(())
}
