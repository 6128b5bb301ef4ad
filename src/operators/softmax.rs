//! Row-wise softmax

use super::harness::{Kernel, KernelBench};
use super::{OperatorBenchmark, OperatorError};
use crate::config::RunConfig;
use clap::Parser;
use rand::Rng;

const ROWS: usize = 4096;
const COLS: &[usize] = &[128, 256, 512, 1024];
const TEST_SHAPES: &[(usize, usize)] = &[(4, 16), (4, 64)];

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct SoftmaxArgs {
    #[arg(long)]
    rows: Option<usize>,
    #[arg(long)]
    cols: Option<usize>,
}

pub struct SoftmaxInput {
    rows: usize,
    cols: usize,
    x: Vec<f32>,
    grad: Vec<f32>,
}

pub struct Softmax {
    inputs: Vec<SoftmaxInput>,
}

impl Softmax {
    fn new(config: &RunConfig, extra_args: &[String]) -> Result<Self, OperatorError> {
        let args =
            SoftmaxArgs::try_parse_from(extra_args).map_err(|e| OperatorError::InvalidArgs(e.to_string()))?;

        let shapes: Vec<(usize, usize)> = match (args.rows, args.cols) {
            (None, None) if config.test_only => TEST_SHAPES.to_vec(),
            (None, None) => COLS.iter().map(|c| (ROWS, *c)).collect(),
            (rows, Some(cols)) => vec![(rows.unwrap_or(ROWS), cols)],
            (Some(_), None) => return Err(OperatorError::InvalidArgs("--rows requires --cols".into())),
        };
        if shapes.iter().any(|(_, cols)| *cols == 0) {
            return Err(OperatorError::InvalidArgs("--cols must be positive".into()));
        }

        let mut rng = rand::thread_rng();
        let inputs = shapes
            .into_iter()
            .map(|(rows, cols)| {
                let mut fill = || (0..rows * cols).map(|_| rng.gen_range(-4.0..4.0)).collect::<Vec<f32>>();
                SoftmaxInput {
                    rows,
                    cols,
                    x: fill(),
                    grad: fill(),
                }
            })
            .collect();
        Ok(Self { inputs })
    }
}

impl Kernel for Softmax {
    type Input = SoftmaxInput;

    fn name(&self) -> &str {
        "softmax"
    }

    fn implementations(&self) -> &[&'static str] {
        &["naive", "online"]
    }

    fn inputs(&self) -> &[SoftmaxInput] {
        &self.inputs
    }

    fn x_val(&self, input: &SoftmaxInput) -> String {
        format!("({}, {})", input.rows, input.cols)
    }

    fn forward(&self, implementation: &str, input: &SoftmaxInput) -> Vec<f32> {
        let mut out = vec![0.0f32; input.x.len()];
        for (x, y) in input.x.chunks(input.cols).zip(out.chunks_mut(input.cols)) {
            match implementation {
                "online" => softmax_online(x, y),
                _ => softmax_naive(x, y),
            }
        }
        out
    }

    /// dx = y * (dy - sum(dy * y)), per row
    fn backward(&self, implementation: &str, input: &SoftmaxInput) -> Vec<f32> {
        let y = self.forward(implementation, input);
        let mut dx = vec![0.0f32; y.len()];
        for ((y, dy), dx) in y
            .chunks(input.cols)
            .zip(input.grad.chunks(input.cols))
            .zip(dx.chunks_mut(input.cols))
        {
            let dot: f32 = y.iter().zip(dy).map(|(a, b)| a * b).sum();
            for i in 0..y.len() {
                dx[i] = y[i] * (dy[i] - dot);
            }
        }
        dx
    }
}

/// Max, exp-sum, normalize: three passes over the row
fn softmax_naive(x: &[f32], y: &mut [f32]) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for (xi, yi) in x.iter().zip(y.iter_mut()) {
        *yi = (xi - max).exp();
        sum += *yi;
    }
    for yi in y.iter_mut() {
        *yi /= sum;
    }
}

/// Running max and rescaled sum in one pass, then normalize
fn softmax_online(x: &[f32], y: &mut [f32]) {
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f32;
    for &xi in x {
        if xi > max {
            sum *= (max - xi).exp();
            max = xi;
        }
        sum += (xi - max).exp();
    }
    for (xi, yi) in x.iter().zip(y.iter_mut()) {
        *yi = (xi - max).exp() / sum;
    }
}

/// Registry entry point
pub fn construct(config: &RunConfig, extra_args: &[String]) -> Result<Box<dyn OperatorBenchmark>, OperatorError> {
    Ok(Box::new(KernelBench::new(Softmax::new(config, extra_args)?, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::measure::allclose;

    fn test_config() -> RunConfig {
        let mut config = RunConfig::for_ops("softmax").with_counts(0, 1);
        config.test_only = true;
        config
    }

    #[test]
    fn test_rows_sum_to_one() {
        let op = Softmax::new(&test_config(), &[]).unwrap();
        for input in op.inputs() {
            let y = op.forward("naive", input);
            for row in y.chunks(input.cols) {
                let sum: f32 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_online_matches_naive() {
        let op = Softmax::new(&test_config(), &[]).unwrap();
        for input in op.inputs() {
            assert!(allclose(&op.forward("online", input), &op.forward("naive", input), 1e-5, 1e-6));
            assert!(allclose(&op.backward("online", input), &op.backward("naive", input), 1e-4, 1e-6));
        }
    }

    #[test]
    fn test_backward_of_uniform_gradient_is_zero() {
        let input = SoftmaxInput {
            rows: 1,
            cols: 3,
            x: vec![0.5, -1.0, 2.0],
            grad: vec![1.0, 1.0, 1.0],
        };
        let op = Softmax { inputs: Vec::new() };
        for value in op.backward("naive", &input) {
            assert!(value.abs() < 1e-6);
        }
    }

    #[test]
    fn test_shape_args() {
        let args = vec!["--cols".to_string(), "10".to_string()];
        let op = Softmax::new(&test_config(), &args).unwrap();
        assert_eq!(op.x_val(&op.inputs()[0]), "(4096, 10)");

        let args = vec!["--rows=2".to_string()];
        assert!(Softmax::new(&test_config(), &args).is_err());
    }
}
