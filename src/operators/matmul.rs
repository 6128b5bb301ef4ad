//! Dense matrix multiply, C = A·B

use super::harness::{Kernel, KernelBench};
use super::{OperatorBenchmark, OperatorError};
use crate::config::RunConfig;
use crate::mode::ExecutionMode;
use clap::Parser;
use rand::Rng;

const SHAPES: &[(usize, usize, usize)] = &[(128, 128, 128), (256, 256, 256), (384, 384, 384), (512, 512, 512)];
const TEST_SHAPES: &[(usize, usize, usize)] = &[(8, 8, 8), (16, 24, 32), (32, 32, 32)];

const BLOCK: usize = 32;

/// Pass-through arguments
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
struct MatmulArgs {
    /// Rows of A and C
    #[arg(long)]
    m: Option<usize>,
    /// Columns of B and C
    #[arg(long)]
    n: Option<usize>,
    /// Columns of A, rows of B
    #[arg(long)]
    k: Option<usize>,
}

pub struct MatmulInput {
    m: usize,
    n: usize,
    k: usize,
    a: Vec<f32>,
    b: Vec<f32>,
    grad: Vec<f32>,
}

impl MatmulInput {
    fn random(m: usize, n: usize, k: usize, rng: &mut impl Rng) -> Self {
        let mut fill = |len: usize| (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect::<Vec<f32>>();
        Self {
            m,
            n,
            k,
            a: fill(m * k),
            b: fill(k * n),
            grad: fill(m * n),
        }
    }
}

pub struct Matmul {
    inputs: Vec<MatmulInput>,
}

impl Matmul {
    fn new(config: &RunConfig, extra_args: &[String]) -> Result<Self, OperatorError> {
        let args =
            MatmulArgs::try_parse_from(extra_args).map_err(|e| OperatorError::InvalidArgs(e.to_string()))?;

        let shapes: Vec<(usize, usize, usize)> = match (args.m, args.n, args.k) {
            (None, None, None) if config.test_only => TEST_SHAPES.to_vec(),
            (None, None, None) => SHAPES.to_vec(),
            (Some(m), Some(n), Some(k)) => vec![(m, n, k)],
            _ => {
                return Err(OperatorError::InvalidArgs(
                    "--m, --n and --k must be given together".into(),
                ))
            }
        };

        for &(m, n, k) in &shapes {
            check_shape(m, n, k)?;
        }

        let mut rng = rand::thread_rng();
        let inputs = shapes
            .into_iter()
            .map(|(m, n, k)| MatmulInput::random(m, n, k, &mut rng))
            .collect();
        Ok(Self { inputs })
    }
}

impl Kernel for Matmul {
    type Input = MatmulInput;

    fn name(&self) -> &str {
        "matmul"
    }

    fn implementations(&self) -> &[&'static str] {
        &["naive", "transposed", "blocked"]
    }

    fn inputs(&self) -> &[MatmulInput] {
        &self.inputs
    }

    fn x_val(&self, input: &MatmulInput) -> String {
        format!("({}, {}, {})", input.m, input.n, input.k)
    }

    fn forward(&self, implementation: &str, input: &MatmulInput) -> Vec<f32> {
        gemm(implementation, &input.a, &input.b, input.m, input.k, input.n)
    }

    /// dA = dC·Bᵀ and dB = Aᵀ·dC, concatenated
    fn backward(&self, implementation: &str, input: &MatmulInput) -> Vec<f32> {
        let (m, n, k) = (input.m, input.n, input.k);
        let b_t = transpose(&input.b, k, n);
        let a_t = transpose(&input.a, m, k);
        let mut grads = gemm(implementation, &input.grad, &b_t, m, n, k);
        grads.extend(gemm(implementation, &a_t, &input.grad, k, m, n));
        grads
    }

    fn flops(&self, input: &MatmulInput, mode: ExecutionMode) -> Option<f64> {
        let base = 2.0 * input.m as f64 * input.n as f64 * input.k as f64;
        Some(match mode {
            ExecutionMode::Fwd | ExecutionMode::FwdNoGrad => base,
            ExecutionMode::Bwd => 2.0 * base,
            ExecutionMode::FwdBwd => 3.0 * base,
        })
    }
}

/// Every buffer of the shape must be addressable
fn check_shape(m: usize, n: usize, k: usize) -> Result<(), OperatorError> {
    let max_len = isize::MAX as usize / std::mem::size_of::<f32>();
    let fits = |rows: usize, cols: usize| rows.checked_mul(cols).is_some_and(|len| len <= max_len);
    if fits(m, k) && fits(k, n) && fits(m, n) {
        Ok(())
    } else {
        Err(OperatorError::InvalidArgs(format!(
            "matrix shape ({}, {}, {}) overflows",
            m, n, k
        )))
    }
}

/// Registry entry point
pub fn construct(config: &RunConfig, extra_args: &[String]) -> Result<Box<dyn OperatorBenchmark>, OperatorError> {
    Ok(Box::new(KernelBench::new(Matmul::new(config, extra_args)?, config)?))
}

/// `a` is rows×inner, `b` is inner×cols, both row-major
fn gemm(implementation: &str, a: &[f32], b: &[f32], rows: usize, inner: usize, cols: usize) -> Vec<f32> {
    match implementation {
        "transposed" => gemm_transposed(a, b, rows, inner, cols),
        "blocked" => gemm_blocked(a, b, rows, inner, cols),
        _ => gemm_naive(a, b, rows, inner, cols),
    }
}

fn gemm_naive(a: &[f32], b: &[f32], rows: usize, inner: usize, cols: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            let mut acc = 0.0f32;
            for p in 0..inner {
                acc += a[i * inner + p] * b[p * cols + j];
            }
            c[i * cols + j] = acc;
        }
    }
    c
}

fn gemm_transposed(a: &[f32], b: &[f32], rows: usize, inner: usize, cols: usize) -> Vec<f32> {
    let b_t = transpose(b, inner, cols);
    let mut c = vec![0.0f32; rows * cols];
    for i in 0..rows {
        let a_row = &a[i * inner..(i + 1) * inner];
        for j in 0..cols {
            let b_col = &b_t[j * inner..(j + 1) * inner];
            c[i * cols + j] = a_row.iter().zip(b_col).map(|(x, y)| x * y).sum();
        }
    }
    c
}

fn gemm_blocked(a: &[f32], b: &[f32], rows: usize, inner: usize, cols: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; rows * cols];
    for i0 in (0..rows).step_by(BLOCK) {
        for p0 in (0..inner).step_by(BLOCK) {
            for j0 in (0..cols).step_by(BLOCK) {
                for i in i0..(i0 + BLOCK).min(rows) {
                    for p in p0..(p0 + BLOCK).min(inner) {
                        let a_ip = a[i * inner + p];
                        let b_row = &b[p * cols..(p + 1) * cols];
                        let c_row = &mut c[i * cols..(i + 1) * cols];
                        for j in j0..(j0 + BLOCK).min(cols) {
                            c_row[j] += a_ip * b_row[j];
                        }
                    }
                }
            }
        }
    }
    c
}

fn transpose(x: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = x[r * cols + c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Metric;
    use crate::operators::measure::allclose;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn test_config() -> RunConfig {
        let mut config = RunConfig::for_ops("matmul").with_counts(1, 1);
        config.test_only = true;
        config
    }

    #[test]
    fn test_implementations_agree() {
        let matmul = Matmul::new(&test_config(), &[]).unwrap();
        for input in matmul.inputs() {
            let expected = matmul.forward("naive", input);
            for implementation in ["transposed", "blocked"] {
                assert!(allclose(&matmul.forward(implementation, input), &expected, 1e-4, 1e-4));
            }
        }
    }

    #[test]
    fn test_known_product() {
        // [[1, 2], [3, 4]] · [[5, 6], [7, 8]]
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        for implementation in ["naive", "transposed", "blocked"] {
            assert_eq!(gemm(implementation, &a, &b, 2, 2, 2), vec![19.0, 22.0, 43.0, 50.0]);
        }
    }

    #[test]
    fn test_backward_shapes() {
        let matmul = Matmul::new(&test_config(), &args(&["--m=4", "--n=3", "--k=2"])).unwrap();
        let input = &matmul.inputs()[0];
        assert_eq!(matmul.backward("naive", input).len(), 4 * 2 + 2 * 3);
    }

    #[test]
    fn test_shape_args() {
        let matmul = Matmul::new(&test_config(), &args(&["--m", "5", "--n=6", "--k=7"])).unwrap();
        assert_eq!(matmul.inputs().len(), 1);
        assert_eq!(matmul.x_val(&matmul.inputs()[0]), "(5, 6, 7)");

        assert!(matches!(
            Matmul::new(&test_config(), &args(&["--m=5"])),
            Err(OperatorError::InvalidArgs(_))
        ));
        assert!(matches!(
            Matmul::new(&test_config(), &args(&["--bogus"])),
            Err(OperatorError::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let huge = usize::MAX.to_string();
        let err = Matmul::new(&test_config(), &args(&["--m", &huge, "--n", "2", "--k", "2"]))
            .err()
            .unwrap();
        assert!(matches!(err, OperatorError::InvalidArgs(ref msg) if msg.contains("overflows")));

        let err = Matmul::new(&test_config(), &args(&["--m", "2", "--n", &huge, "--k", "1"]))
            .err()
            .unwrap();
        assert!(matches!(err, OperatorError::InvalidArgs(_)));
    }

    #[test]
    fn test_first_input_only() {
        let config = test_config().with_inputs(0, Some(1));
        let mut bench = construct(&config, &[]).unwrap();
        bench.run(config.warmup, config.iterations).unwrap();

        let output = bench.output();
        assert_eq!(output.op_name, "matmul");
        assert_eq!(output.len(), 1);
        assert_eq!(output.rows[0].x_val, "(8, 8, 8)");
        assert_eq!(output.impl_names(), vec!["naive", "transposed", "blocked"]);
        assert!(output.rows[0].get("blocked").unwrap().get(Metric::Latency).is_some());
    }

    #[test]
    fn test_flops_by_mode() {
        let matmul = Matmul::new(&test_config(), &args(&["--m=2", "--n=3", "--k=4"])).unwrap();
        let input = &matmul.inputs()[0];
        assert_eq!(matmul.flops(input, ExecutionMode::Fwd), Some(48.0));
        assert_eq!(matmul.flops(input, ExecutionMode::Bwd), Some(96.0));
        assert_eq!(matmul.flops(input, ExecutionMode::FwdBwd), Some(144.0));
    }
}
