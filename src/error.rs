//! Error types for tritonbench-rs

use crate::config::ConfigError;
use crate::lockdown::LockdownError;
use crate::operators::OperatorError;
use thiserror::Error;

/// Top-level error for a benchmark invocation
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid run configuration, raised before anything executes
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registry lookup failed
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// The operator loader could not bind the op
    #[error("failed to load operator {op}: {reason}")]
    LoaderResolution {
        /// Requested operator name
        op: String,
        /// Why binding failed
        reason: String,
    },

    /// Collection lookup failed
    #[error("unknown operator collection: {0}")]
    UnknownCollection(String),

    /// The operator factory rejected the configuration
    #[error("failed to construct operator {op}: {source}")]
    Construct {
        /// Operator name
        op: String,
        /// Underlying operator error
        #[source]
        source: OperatorError,
    },

    /// `run()` failed; partial metrics were already reported
    #[error("operator {op} failed: {source}")]
    Execution {
        /// Operator name
        op: String,
        /// Underlying operator error
        #[source]
        source: OperatorError,
    },

    /// Lockdown acquisition or release failed
    #[error("gpu lockdown: {0}")]
    Lockdown(#[from] LockdownError),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Name of the operator this error belongs to, if any
    pub fn operator(&self) -> Option<&str> {
        match self {
            BenchError::UnknownOperator(op)
            | BenchError::LoaderResolution { op, .. }
            | BenchError::Construct { op, .. }
            | BenchError::Execution { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Whether this error happened before any operator was touched
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            BenchError::Config(_) | BenchError::UnknownCollection(_)
        )
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
