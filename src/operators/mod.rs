//! Operator benchmarks and the resolvers that find them
//!
//! The runner only sees two seams:
//! - [`OperatorResolver`] maps a name to an [`OperatorFactory`]
//! - [`OperatorBenchmark`] is the constructed instance: `run`, `output`, `plot`
//!
//! Two resolvers live side by side. [`RegistryResolver`] looks names up in a
//! static table of built-in operators; [`LoaderResolver`] binds aten-style
//! elementwise op names on demand. [`resolver_for`] picks one from the
//! config.

pub mod collections;
pub mod harness;
pub mod loader;
pub mod matmul;
pub mod measure;
pub mod registry;
pub mod softmax;
pub mod vector_add;

pub use collections::list_operators_by_collection;
pub use harness::{Kernel, KernelBench};
pub use loader::LoaderResolver;
pub use registry::RegistryResolver;

use crate::config::{Precision, RunConfig};
use crate::error::BenchResult;
use crate::mode::ExecutionMode;
use crate::result::BenchmarkResult;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A constructed operator benchmark
pub trait OperatorBenchmark {
    /// Operator name
    fn name(&self) -> &str;

    /// Run `warmup` untimed and `iterations` timed repetitions per input
    /// and implementation, appending rows to [`output`](Self::output).
    fn run(&mut self, warmup: u32, iterations: u32) -> Result<(), OperatorError>;

    /// Everything measured so far, including after a failed `run`
    fn output(&self) -> &BenchmarkResult;

    /// Render a chart of the output into `dir`, returning the file written
    fn plot(&self, _dir: &Path) -> Result<PathBuf, PlotError> {
        Err(PlotError::NotSupported)
    }
}

/// Builds an operator instance from the run config and pass-through args
pub type OperatorFactory =
    Box<dyn Fn(&RunConfig, &[String]) -> Result<Box<dyn OperatorBenchmark>, OperatorError>>;

/// Maps operator names to factories
pub trait OperatorResolver: Send + Sync {
    /// Strategy identifier ("registry", "loader")
    fn strategy(&self) -> &str;

    /// Find the factory for `name`
    fn resolve(&self, name: &str, config: &RunConfig) -> BenchResult<OperatorFactory>;

    /// Every operator this resolver can produce, in a stable order
    fn known_operators(&self) -> Vec<String>;
}

/// Pick the resolution strategy selected by `--operator-loader`
pub fn resolver_for(config: &RunConfig) -> Box<dyn OperatorResolver> {
    if config.operator_loader {
        Box::new(LoaderResolver::new())
    } else {
        Box::new(RegistryResolver::new())
    }
}

/// Errors raised by operator instances
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The input window selects nothing
    #[error("no inputs selected (input id {input_id}, {available} available)")]
    NoInputs {
        /// First requested input
        input_id: usize,
        /// Size of the input series
        available: usize,
    },

    /// Precision not implemented by this operator
    #[error("precision {0} is not supported")]
    UnsupportedPrecision(Precision),

    /// Device not implemented by this operator
    #[error("device {0:?} is not supported")]
    UnsupportedDevice(String),

    /// Mode not implemented by this operator
    #[error("mode {0} is not supported")]
    UnsupportedMode(ExecutionMode),

    /// Pass-through arguments rejected
    #[error("invalid operator arguments: {0}")]
    InvalidArgs(String),

    /// `--only` or `--baseline` named an implementation that does not exist
    #[error("unknown implementation: {0}")]
    UnknownImpl(String),

    /// Anything else
    #[error("{0}")]
    Failed(String),
}

/// Errors from [`OperatorBenchmark::plot`]
#[derive(Debug, Error)]
pub enum PlotError {
    /// The operator has no plot
    #[error("plotting is not implemented")]
    NotSupported,

    /// Chart rendering failed
    #[error("plot rendering failed: {0}")]
    Render(String),
}
