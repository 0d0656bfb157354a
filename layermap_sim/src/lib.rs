// layermap_sim/src/lib.rs

// Command line options shared by the binary and anything embedding the runner.
pub mod cli;

// Scenario configuration, the synthetic scene and the frame loop.
pub mod simulation;
