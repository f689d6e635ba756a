pub mod advisor;
pub mod classifier;
pub mod config;
pub mod display;
pub mod interrupt;
pub mod pipeline;
pub mod sandbox;
