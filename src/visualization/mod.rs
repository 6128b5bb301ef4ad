//! Visualization and plotting

pub mod latency;

pub use latency::LatencyPlotter;
