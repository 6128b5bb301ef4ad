//! TritonBench - operator benchmark orchestration
//!
//! This library resolves operators by name, runs their warmup and
//! measurement loops under an optional GPU clock lockdown, and renders the
//! collected metrics to the console, CSV files and plots.
//!
//! # Architecture
//!
//! - **Mode**: Folds the mode flags into one execution mode
//! - **Operators**: Registry and loader resolvers, plus the built-in kernels
//! - **Lockdown**: Scoped pinning of the device operating point
//! - **Runner**: Batch and CI orchestration with keep-going semantics
//! - **Output**: Console, CSV and plot sinks
//!
//! # Example
//!
//! ```rust,no_run
//! use tritonbench_rs::config::RunConfig;
//! use tritonbench_rs::runner::BatchRunner;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::for_ops("matmul").with_counts(5, 20);
//!     let report = BatchRunner::new(config).run(&mut std::io::stdout())?;
//!     assert!(report.is_success());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod lockdown;
pub mod mode;
pub mod operators;
pub mod output;
pub mod result;
pub mod runner;
pub mod telemetry;
pub mod visualization;

// Re-export commonly used types
pub use config::{GpuMetricsBackend, Metric, Precision, RunConfig};
pub use error::{BenchError, BenchResult};
pub use mode::{ExecutionMode, ModeOverrides};
pub use operators::{OperatorBenchmark, OperatorResolver};
pub use output::{CsvExporter, MetricsOutput, OutputFlags};
pub use result::BenchmarkResult;
pub use runner::{BatchReport, BatchRunner};
pub use visualization::LatencyPlotter;
