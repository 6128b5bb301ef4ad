//! Element-wise vector addition, out = a + b

use super::harness::{Kernel, KernelBench};
use super::{OperatorBenchmark, OperatorError};
use crate::config::RunConfig;
use crate::mode::ExecutionMode;
use clap::Parser;
use rand::Rng;

const SIZES: &[usize] = &[1 << 16, 1 << 18, 1 << 20, 1 << 22];
const TEST_SIZES: &[usize] = &[1 << 10, 1 << 12];

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct VectorAddArgs {
    /// Benchmark a single vector length
    #[arg(long)]
    size: Option<usize>,
}

pub struct VectorAddInput {
    a: Vec<f32>,
    b: Vec<f32>,
    grad: Vec<f32>,
}

pub struct VectorAdd {
    inputs: Vec<VectorAddInput>,
}

impl VectorAdd {
    fn new(config: &RunConfig, extra_args: &[String]) -> Result<Self, OperatorError> {
        let args = VectorAddArgs::try_parse_from(extra_args)
            .map_err(|e| OperatorError::InvalidArgs(e.to_string()))?;

        let sizes = match args.size {
            Some(size) => vec![size],
            None if config.test_only => TEST_SIZES.to_vec(),
            None => SIZES.to_vec(),
        };

        let mut rng = rand::thread_rng();
        let inputs = sizes
            .into_iter()
            .map(|size| {
                let mut fill = || (0..size).map(|_| rng.gen::<f32>()).collect::<Vec<f32>>();
                VectorAddInput {
                    a: fill(),
                    b: fill(),
                    grad: fill(),
                }
            })
            .collect();
        Ok(Self { inputs })
    }
}

impl Kernel for VectorAdd {
    type Input = VectorAddInput;

    fn name(&self) -> &str {
        "vector_add"
    }

    fn implementations(&self) -> &[&'static str] {
        &["loop", "zip"]
    }

    fn inputs(&self) -> &[VectorAddInput] {
        &self.inputs
    }

    fn x_val(&self, input: &VectorAddInput) -> String {
        input.a.len().to_string()
    }

    fn forward(&self, implementation: &str, input: &VectorAddInput) -> Vec<f32> {
        match implementation {
            "zip" => input.a.iter().zip(&input.b).map(|(x, y)| x + y).collect(),
            _ => {
                let mut out = vec![0.0f32; input.a.len()];
                for i in 0..out.len() {
                    out[i] = input.a[i] + input.b[i];
                }
                out
            }
        }
    }

    /// Both input gradients equal the output gradient
    fn backward(&self, implementation: &str, input: &VectorAddInput) -> Vec<f32> {
        match implementation {
            "zip" => input.grad.iter().chain(&input.grad).copied().collect(),
            _ => {
                let n = input.grad.len();
                let mut out = vec![0.0f32; 2 * n];
                for i in 0..n {
                    out[i] = input.grad[i];
                    out[n + i] = input.grad[i];
                }
                out
            }
        }
    }

    fn flops(&self, input: &VectorAddInput, mode: ExecutionMode) -> Option<f64> {
        match mode {
            ExecutionMode::Bwd => None,
            _ => Some(input.a.len() as f64),
        }
    }
}

/// Registry entry point
pub fn construct(config: &RunConfig, extra_args: &[String]) -> Result<Box<dyn OperatorBenchmark>, OperatorError> {
    Ok(Box::new(KernelBench::new(VectorAdd::new(config, extra_args)?, config)?))
}
