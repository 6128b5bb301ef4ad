//! Shared warmup/measurement loop for the built-in operators
//!
//! A [`Kernel`] describes the input series and the implementation variants;
//! [`KernelBench`] turns it into an [`OperatorBenchmark`] that honors the
//! run config (mode, input window, `--only`, `--baseline`, metrics).

use super::measure::{allclose, median_latency_ms, tflops};
use super::{OperatorBenchmark, OperatorError, PlotError};
use crate::config::{Metric, Precision, RunConfig};
use crate::mode::ExecutionMode;
use crate::result::{BenchmarkResult, ImplMetrics, ResultRow};
use crate::visualization::LatencyPlotter;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Tolerances used for the accuracy metric
const ACCURACY_RTOL: f32 = 1e-3;
const ACCURACY_ATOL: f32 = 1e-4;

/// Devices the built-in kernels run on
pub const HOST_DEVICE: &str = "cpu";

/// An operator's inputs and implementation variants
pub trait Kernel {
    /// One sample of the input series
    type Input;

    /// Operator name
    fn name(&self) -> &str;

    /// Implementation variant names, baseline candidates first
    fn implementations(&self) -> &[&'static str];

    /// Baseline when `--baseline` is not given
    fn default_baseline(&self) -> &'static str {
        self.implementations()[0]
    }

    /// The input series
    fn inputs(&self) -> &[Self::Input];

    /// Row label of an input
    fn x_val(&self, input: &Self::Input) -> String;

    /// Forward pass
    fn forward(&self, implementation: &str, input: &Self::Input) -> Vec<f32>;

    /// Backward pass, returning the flattened input gradients
    fn backward(&self, implementation: &str, input: &Self::Input) -> Vec<f32>;

    /// Whether [`backward`](Self::backward) is meaningful
    fn supports_backward(&self) -> bool {
        true
    }

    /// Floating point operations of one pass in `mode`
    fn flops(&self, _input: &Self::Input, _mode: ExecutionMode) -> Option<f64> {
        None
    }

    /// Whether the operator offers a latency chart
    fn plottable(&self) -> bool {
        true
    }
}

/// [`OperatorBenchmark`] over a [`Kernel`]
pub struct KernelBench<K: Kernel> {
    kernel: K,
    mode: ExecutionMode,
    impls: Vec<&'static str>,
    baseline: &'static str,
    metrics: Vec<Metric>,
    inputs: Range<usize>,
    input_id: usize,
    output: BenchmarkResult,
}

impl<K: Kernel> KernelBench<K> {
    /// Validate `config` against what the kernel supports
    pub fn new(kernel: K, config: &RunConfig) -> Result<Self, OperatorError> {
        if config.device != HOST_DEVICE {
            return Err(OperatorError::UnsupportedDevice(config.device.clone()));
        }
        if !matches!(config.precision, Precision::Bypass | Precision::Fp32) {
            return Err(OperatorError::UnsupportedPrecision(config.precision));
        }
        if config.mode.runs_backward() && !kernel.supports_backward() {
            return Err(OperatorError::UnsupportedMode(config.mode));
        }

        let available = kernel.implementations();
        if let Some(only) = &config.only {
            if let Some(unknown) = only.iter().find(|o| !available.contains(&o.as_str())) {
                return Err(OperatorError::UnknownImpl(unknown.clone()));
            }
        }

        let baseline = match &config.baseline {
            Some(name) => *available
                .iter()
                .find(|i| **i == name.as_str())
                .ok_or_else(|| OperatorError::UnknownImpl(name.clone()))?,
            None => kernel.default_baseline(),
        };

        let mut impls: Vec<&'static str> = available
            .iter()
            .copied()
            .filter(|i| config.allows_impl(i))
            .collect();
        let needs_baseline = config
            .metrics
            .iter()
            .any(|m| matches!(m, Metric::Speedup | Metric::Accuracy));
        if needs_baseline && !impls.contains(&baseline) {
            impls.insert(0, baseline);
        }
        if impls.is_empty() {
            return Err(OperatorError::Failed("no implementations selected".into()));
        }

        let inputs = input_window(kernel.inputs().len(), config.input_id, config.num_inputs);
        let output = BenchmarkResult::new(kernel.name(), config.mode, config.metrics.clone());

        tracing::debug!(
            op = kernel.name(),
            mode = %config.mode,
            impls = ?impls,
            baseline,
            inputs = ?inputs,
            "constructed operator"
        );

        Ok(Self {
            kernel,
            mode: config.mode,
            impls,
            baseline,
            metrics: config.metrics.clone(),
            inputs,
            input_id: config.input_id,
            output,
        })
    }

    /// Implementations that will run, in order
    pub fn implementations(&self) -> &[&'static str] {
        &self.impls
    }

    /// Indices of the inputs that will run
    pub fn input_range(&self) -> Range<usize> {
        self.inputs.clone()
    }

    fn pass(&self, implementation: &str, input: &K::Input) -> Vec<f32> {
        match self.mode {
            ExecutionMode::Fwd | ExecutionMode::FwdNoGrad => self.kernel.forward(implementation, input),
            ExecutionMode::Bwd => self.kernel.backward(implementation, input),
            ExecutionMode::FwdBwd => {
                let mut out = self.kernel.forward(implementation, input);
                out.extend(self.kernel.backward(implementation, input));
                out
            }
        }
    }

    fn measure_input(&self, input_id: usize, warmup: u32, iterations: u32) -> ResultRow {
        let input = &self.kernel.inputs()[input_id];
        let mut row = ResultRow::new(input_id, self.kernel.x_val(input));
        let wants = |m: Metric| self.metrics.contains(&m);

        let baseline_latency = if wants(Metric::Speedup) {
            median_latency_ms(warmup, iterations, || self.pass(self.baseline, input))
        } else {
            None
        };
        let baseline_output = wants(Metric::Accuracy).then(|| self.pass(self.baseline, input));

        for implementation in &self.impls {
            let latency = if *implementation == self.baseline && baseline_latency.is_some() {
                baseline_latency
            } else {
                median_latency_ms(warmup, iterations, || self.pass(implementation, input))
            };

            let mut metrics = ImplMetrics::default();
            if let Some(latency) = latency {
                if wants(Metric::Latency) {
                    metrics.set(Metric::Latency, latency);
                }
                if wants(Metric::Tflops) {
                    if let Some(value) = self
                        .kernel
                        .flops(input, self.mode)
                        .and_then(|f| tflops(f, latency))
                    {
                        metrics.set(Metric::Tflops, value);
                    }
                }
                if let Some(base) = baseline_latency {
                    if *implementation == self.baseline {
                        metrics.set(Metric::Speedup, 1.0);
                    } else if latency > 0.0 {
                        metrics.set(Metric::Speedup, base / latency);
                    }
                }
            }
            if let Some(expected) = &baseline_output {
                let actual = self.pass(implementation, input);
                let ok = allclose(&actual, expected, ACCURACY_RTOL, ACCURACY_ATOL);
                metrics.set(Metric::Accuracy, if ok { 1.0 } else { 0.0 });
                if !ok {
                    metrics.error = Some(format!("output differs from {}", self.baseline));
                }
            }

            row.impls.push((implementation.to_string(), metrics));
        }
        row
    }
}

impl<K: Kernel> OperatorBenchmark for KernelBench<K> {
    fn name(&self) -> &str {
        self.kernel.name()
    }

    fn run(&mut self, warmup: u32, iterations: u32) -> Result<(), OperatorError> {
        if self.inputs.is_empty() {
            return Err(OperatorError::NoInputs {
                input_id: self.input_id,
                available: self.kernel.inputs().len(),
            });
        }

        for input_id in self.inputs.clone() {
            let row = self.measure_input(input_id, warmup, iterations);
            tracing::debug!(op = self.kernel.name(), x_val = %row.x_val, "input done");
            self.output.push_row(row);
        }
        Ok(())
    }

    fn output(&self) -> &BenchmarkResult {
        &self.output
    }

    fn plot(&self, dir: &Path) -> Result<PathBuf, PlotError> {
        if !self.kernel.plottable() {
            return Err(PlotError::NotSupported);
        }
        std::fs::create_dir_all(dir).map_err(|e| PlotError::Render(e.to_string()))?;
        let path = dir.join(format!("{}_{}_latency.png", self.kernel.name(), self.mode));
        LatencyPlotter::plot(&self.output, &path).map_err(|e| PlotError::Render(e.to_string()))?;
        Ok(path)
    }
}

/// Indices selected by `--input-id` and `--num-inputs` out of `len` inputs
pub fn input_window(len: usize, input_id: usize, num_inputs: Option<usize>) -> Range<usize> {
    let start = input_id.min(len);
    let end = match num_inputs {
        Some(n) => start.saturating_add(n).min(len),
        None => len,
    };
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting {
        inputs: Vec<usize>,
        calls: Cell<usize>,
        backward: bool,
    }

    impl Counting {
        fn new(n: usize) -> Self {
            Self {
                inputs: (0..n).collect(),
                calls: Cell::new(0),
                backward: true,
            }
        }
    }

    impl Kernel for Counting {
        type Input = usize;

        fn name(&self) -> &str {
            "counting"
        }

        fn implementations(&self) -> &[&'static str] {
            &["slow", "fast", "wrong"]
        }

        fn inputs(&self) -> &[usize] {
            &self.inputs
        }

        fn x_val(&self, input: &usize) -> String {
            format!("n={}", input)
        }

        fn forward(&self, implementation: &str, input: &usize) -> Vec<f32> {
            self.calls.set(self.calls.get() + 1);
            let value = if implementation == "wrong" { -1.0 } else { *input as f32 };
            vec![value; 4]
        }

        fn backward(&self, _implementation: &str, input: &usize) -> Vec<f32> {
            self.calls.set(self.calls.get() + 1);
            vec![*input as f32]
        }

        fn supports_backward(&self) -> bool {
            self.backward
        }

        fn flops(&self, _input: &usize, _mode: ExecutionMode) -> Option<f64> {
            Some(1e9)
        }

        fn plottable(&self) -> bool {
            false
        }
    }

    fn config() -> RunConfig {
        RunConfig::for_ops("counting").with_counts(1, 2)
    }

    #[test]
    fn test_input_window() {
        assert_eq!(input_window(5, 0, None), 0..5);
        assert_eq!(input_window(5, 0, Some(1)), 0..1);
        assert_eq!(input_window(5, 3, Some(10)), 3..5);
        assert_eq!(input_window(5, 7, None), 5..5);
        assert_eq!(input_window(5, 2, Some(usize::MAX)), 2..5);
    }

    #[test]
    fn test_single_input_window() {
        let mut bench = KernelBench::new(Counting::new(4), &config().with_inputs(0, Some(1))).unwrap();
        bench.run(1, 2).unwrap();
        assert_eq!(bench.output().len(), 1);
        assert_eq!(bench.output().rows[0].x_val, "n=0");
    }

    #[test]
    fn test_warmup_and_iterations_reach_the_kernel() {
        let mut cfg = config();
        cfg.only = Some(vec!["fast".into()]);
        let mut bench = KernelBench::new(Counting::new(2), &cfg).unwrap();
        bench.run(3, 4).unwrap();
        // two inputs, one implementation, 3 + 4 calls each
        assert_eq!(bench.kernel.calls.get(), 14);
    }

    #[test]
    fn test_empty_window_fails_run() {
        let mut bench = KernelBench::new(Counting::new(2), &config().with_inputs(5, None)).unwrap();
        let err = bench.run(1, 1).unwrap_err();
        assert!(matches!(err, OperatorError::NoInputs { input_id: 5, available: 2 }));
        assert!(bench.output().is_empty());
    }

    #[test]
    fn test_only_filter_and_unknown_impl() {
        let mut cfg = config();
        cfg.only = Some(vec!["fast".into()]);
        let bench = KernelBench::new(Counting::new(1), &cfg).unwrap();
        assert_eq!(bench.implementations(), &["fast"]);

        cfg.only = Some(vec!["missing".into()]);
        assert!(matches!(
            KernelBench::new(Counting::new(1), &cfg),
            Err(OperatorError::UnknownImpl(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_speedup_pulls_in_baseline() {
        let mut cfg = config();
        cfg.only = Some(vec!["fast".into()]);
        cfg.metrics = vec![Metric::Latency, Metric::Speedup];
        let bench = KernelBench::new(Counting::new(1), &cfg).unwrap();
        assert_eq!(bench.implementations(), &["slow", "fast"]);
    }

    #[test]
    fn test_baseline_override() {
        let mut cfg = config();
        cfg.baseline = Some("fast".into());
        cfg.metrics = vec![Metric::Speedup];
        let mut bench = KernelBench::new(Counting::new(1), &cfg).unwrap();
        bench.run(0, 1).unwrap();
        let fast = bench.output().rows[0].get("fast").unwrap();
        assert_eq!(fast.get(Metric::Speedup), Some(1.0));

        cfg.baseline = Some("nope".into());
        assert!(KernelBench::new(Counting::new(1), &cfg).is_err());
    }

    #[test]
    fn test_accuracy_metric() {
        let mut cfg = config();
        cfg.metrics = vec![Metric::Accuracy];
        let mut bench = KernelBench::new(Counting::new(1), &cfg).unwrap();
        bench.run(0, 1).unwrap();
        let row = &bench.output().rows[0];
        assert_eq!(row.get("fast").unwrap().get(Metric::Accuracy), Some(1.0));
        let wrong = row.get("wrong").unwrap();
        assert_eq!(wrong.get(Metric::Accuracy), Some(0.0));
        assert!(wrong.error.is_some());
    }

    #[test]
    fn test_rejects_unsupported_settings() {
        let mut cfg = config();
        cfg.device = "cuda".into();
        assert!(matches!(
            KernelBench::new(Counting::new(1), &cfg),
            Err(OperatorError::UnsupportedDevice(_))
        ));

        let mut cfg = config();
        cfg.precision = Precision::Fp16;
        assert!(matches!(
            KernelBench::new(Counting::new(1), &cfg),
            Err(OperatorError::UnsupportedPrecision(Precision::Fp16))
        ));

        let mut cfg = config();
        cfg.mode = ExecutionMode::Bwd;
        let mut kernel = Counting::new(1);
        kernel.backward = false;
        assert!(matches!(
            KernelBench::new(kernel, &cfg),
            Err(OperatorError::UnsupportedMode(ExecutionMode::Bwd))
        ));
    }

    #[test]
    fn test_fwd_bwd_runs_both_passes() {
        let mut cfg = config();
        cfg.mode = ExecutionMode::FwdBwd;
        cfg.only = Some(vec!["fast".into()]);
        let mut bench = KernelBench::new(Counting::new(1), &cfg).unwrap();
        bench.run(0, 1).unwrap();
        assert_eq!(bench.kernel.calls.get(), 2);
    }

    #[test]
    fn test_plot_not_supported() {
        let bench = KernelBench::new(Counting::new(1), &config()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(bench.plot(dir.path()), Err(PlotError::NotSupported)));
    }
}
