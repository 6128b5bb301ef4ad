//! Static registry of built-in operators

use super::{matmul, softmax, vector_add};
use super::{OperatorBenchmark, OperatorError, OperatorFactory, OperatorResolver};
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};

type Construct = fn(&RunConfig, &[String]) -> Result<Box<dyn OperatorBenchmark>, OperatorError>;

struct OperatorEntry {
    name: &'static str,
    construct: Construct,
}

static OPERATORS: &[OperatorEntry] = &[
    OperatorEntry {
        name: "matmul",
        construct: matmul::construct,
    },
    OperatorEntry {
        name: "vector_add",
        construct: vector_add::construct,
    },
    OperatorEntry {
        name: "softmax",
        construct: softmax::construct,
    },
];

/// Names of every registered operator, in registration order
pub fn operator_names() -> Vec<String> {
    OPERATORS.iter().map(|e| e.name.to_string()).collect()
}

/// Registry-based resolution strategy
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryResolver;

impl RegistryResolver {
    pub fn new() -> Self {
        Self
    }
}

impl OperatorResolver for RegistryResolver {
    fn strategy(&self) -> &str {
        "registry"
    }

    fn resolve(&self, name: &str, _config: &RunConfig) -> BenchResult<OperatorFactory> {
        let entry = OPERATORS
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| BenchError::UnknownOperator(name.to_string()))?;
        Ok(Box::new(entry.construct))
    }

    fn known_operators(&self) -> Vec<String> {
        operator_names()
    }
}
