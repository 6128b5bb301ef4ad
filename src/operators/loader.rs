//! Loader-based resolution of aten-style elementwise ops
//!
//! Names such as `aten.add`, `aten::relu.default` or plain `mul` are bound to
//! a host elementwise kernel on demand. The loader benchmarks the forward
//! pass only and has no plot.

use super::harness::{Kernel, KernelBench};
use super::{OperatorBenchmark, OperatorError, OperatorFactory, OperatorResolver};
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use rand::Rng;

const SIZES: &[usize] = &[1 << 16, 1 << 20];
const TEST_SIZES: &[usize] = &[256];

/// An elementwise op the loader knows how to bind
#[derive(Debug, Clone, Copy)]
pub enum ElementwiseOp {
    Unary(fn(f32) -> f32),
    Binary(fn(f32, f32) -> f32),
}

static BINDINGS: &[(&str, ElementwiseOp)] = &[
    ("add", ElementwiseOp::Binary(|a, b| a + b)),
    ("sub", ElementwiseOp::Binary(|a, b| a - b)),
    ("mul", ElementwiseOp::Binary(|a, b| a * b)),
    ("div", ElementwiseOp::Binary(|a, b| a / b)),
    ("maximum", ElementwiseOp::Binary(f32::max)),
    ("relu", ElementwiseOp::Unary(|a| a.max(0.0))),
    ("exp", ElementwiseOp::Unary(f32::exp)),
    ("neg", ElementwiseOp::Unary(|a| -a)),
    ("tanh", ElementwiseOp::Unary(f32::tanh)),
    ("sigmoid", ElementwiseOp::Unary(|a| 1.0 / (1.0 + (-a).exp()))),
];

/// Strip the `aten.` / `aten::` namespace and any overload suffix
pub fn aten_base_name(name: &str) -> &str {
    let name = name
        .strip_prefix("aten::")
        .or_else(|| name.strip_prefix("aten."))
        .unwrap_or(name);
    name.split('.').next().unwrap_or(name)
}

/// Look up the kernel bound to `name`
pub fn bind(name: &str) -> BenchResult<ElementwiseOp> {
    let base = aten_base_name(name);
    BINDINGS
        .iter()
        .find(|(n, _)| *n == base)
        .map(|(_, op)| *op)
        .ok_or_else(|| BenchError::LoaderResolution {
            op: name.to_string(),
            reason: format!("no elementwise binding for aten.{}", base),
        })
}

/// Loader-based resolution strategy
#[derive(Debug, Default, Clone, Copy)]
pub struct LoaderResolver;

impl LoaderResolver {
    pub fn new() -> Self {
        Self
    }
}

impl OperatorResolver for LoaderResolver {
    fn strategy(&self) -> &str {
        "loader"
    }

    fn resolve(&self, name: &str, _config: &RunConfig) -> BenchResult<OperatorFactory> {
        let op = bind(name)?;
        let name = name.to_string();
        tracing::debug!(op = %name, "bound operator through loader");

        Ok(Box::new(move |config: &RunConfig, extra_args: &[String]| {
            if !extra_args.is_empty() {
                return Err(OperatorError::InvalidArgs(format!(
                    "loader operators take no arguments, got {:?}",
                    extra_args
                )));
            }
            let kernel = Elementwise::new(name.clone(), op, config.test_only);
            Ok(Box::new(KernelBench::new(kernel, config)?) as Box<dyn OperatorBenchmark>)
        }))
    }

    fn known_operators(&self) -> Vec<String> {
        BINDINGS.iter().map(|(n, _)| format!("aten.{}", n)).collect()
    }
}

pub struct ElementwiseInput {
    lhs: Vec<f32>,
    rhs: Vec<f32>,
}

/// Generic elementwise benchmark produced by the loader
pub struct Elementwise {
    name: String,
    op: ElementwiseOp,
    inputs: Vec<ElementwiseInput>,
}

impl Elementwise {
    fn new(name: String, op: ElementwiseOp, test_only: bool) -> Self {
        let sizes = if test_only { TEST_SIZES } else { SIZES };
        let mut rng = rand::thread_rng();
        let inputs = sizes
            .iter()
            .map(|&size| {
                let mut fill = || (0..size).map(|_| rng.gen_range(0.5..2.0)).collect::<Vec<f32>>();
                ElementwiseInput {
                    lhs: fill(),
                    rhs: fill(),
                }
            })
            .collect();
        Self { name, op, inputs }
    }
}

impl Kernel for Elementwise {
    type Input = ElementwiseInput;

    fn name(&self) -> &str {
        &self.name
    }

    fn implementations(&self) -> &[&'static str] {
        &["aten"]
    }

    fn inputs(&self) -> &[ElementwiseInput] {
        &self.inputs
    }

    fn x_val(&self, input: &ElementwiseInput) -> String {
        input.lhs.len().to_string()
    }

    fn forward(&self, _implementation: &str, input: &ElementwiseInput) -> Vec<f32> {
        match self.op {
            ElementwiseOp::Unary(f) => input.lhs.iter().map(|a| f(*a)).collect(),
            ElementwiseOp::Binary(f) => input.lhs.iter().zip(&input.rhs).map(|(a, b)| f(*a, *b)).collect(),
        }
    }

    fn backward(&self, _implementation: &str, _input: &ElementwiseInput) -> Vec<f32> {
        Vec::new()
    }

    fn supports_backward(&self) -> bool {
        false
    }

    fn plottable(&self) -> bool {
        false
    }
}
