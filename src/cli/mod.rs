//! CLI argument parsing and command handling

use crate::config::{parse_metrics, ConfigError, GpuMetricsBackend, Precision, RunConfig};
use crate::lockdown;
use crate::mode::{ExecutionMode, ModeOverrides};
use crate::output::OutputFlags;
use crate::runner::{BatchReport, BatchRunner};
use crate::telemetry::reporter_from_env;
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

/// Exit status after a termination signal
pub const EXIT_INTERRUPTED: i32 = 130;

/// TritonBench - operator benchmark runner
#[derive(Parser, Debug)]
#[command(name = "tritonbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operators to benchmark, comma separated
    #[arg(long)]
    pub op: Option<String>,

    /// Operator collections to benchmark, comma separated
    #[arg(long)]
    pub op_collection: Option<String>,

    /// Execution mode
    #[arg(long, value_enum, default_value_t = ExecutionMode::Fwd)]
    pub mode: ExecutionMode,

    /// Run the backward pass only
    #[arg(long)]
    pub bwd: bool,

    /// Run forward and backward
    #[arg(long)]
    pub fwd_bwd: bool,

    /// Run forward without gradient bookkeeping
    #[arg(long)]
    pub fwd_no_grad: bool,

    /// Input precision
    #[arg(long, alias = "dtype", value_enum, default_value_t = Precision::Bypass)]
    pub precision: Precision,

    /// Device to benchmark on
    #[arg(long, env = "TRITONBENCH_DEVICE", default_value = "cpu")]
    pub device: String,

    /// Warmup repetitions per measurement
    #[arg(long, default_value_t = crate::config::DEFAULT_WARMUP)]
    pub warmup: u32,

    /// Timed repetitions per measurement
    #[arg(long = "iter", default_value_t = crate::config::DEFAULT_RUN_ITERS)]
    pub iterations: u32,

    /// Print CSV instead of a table
    #[arg(long)]
    pub csv: bool,

    /// Also write CSV files to the temp dir
    #[arg(long)]
    pub dump_csv: bool,

    /// Do not print results
    #[arg(long)]
    pub skip_print: bool,

    /// Plot latency charts
    #[arg(long)]
    pub plot: bool,

    /// Run the CI validation sweep over every operator
    #[arg(long)]
    pub ci: bool,

    /// Metrics to collect (latency, tflops, speedup, accuracy)
    #[arg(long, default_value = "latency")]
    pub metrics: String,

    /// Backend for GPU memory metrics (torch, nvml)
    #[arg(long, value_enum, default_value_t = GpuMetricsBackend::Torch)]
    pub metrics_gpu_backend: GpuMetricsBackend,

    /// Only run these implementations, comma separated
    #[arg(long)]
    pub only: Option<String>,

    /// Baseline implementation for speedup and accuracy
    #[arg(long)]
    pub baseline: Option<String>,

    /// Number of inputs to run
    #[arg(long)]
    pub num_inputs: Option<usize>,

    /// First input to run
    #[arg(long, default_value_t = 0)]
    pub input_id: usize,

    /// Keep running the batch after an operator fails
    #[arg(long)]
    pub keep_going: bool,

    /// Use small inputs
    #[arg(long)]
    pub test_only: bool,

    /// Lock GPU clocks while benchmarking
    #[arg(long)]
    pub gpu_lockdown: bool,

    /// Resolve operators through the aten op loader
    #[arg(long)]
    pub operator_loader: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Operator arguments, after `--`
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

impl Cli {
    /// Resolve the arguments into a run configuration
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let metrics = parse_metrics(&self.metrics)?;
        let only = self.only.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        });

        Ok(RunConfig {
            op: self.op,
            op_collection: self.op_collection,
            mode: self.mode,
            mode_overrides: ModeOverrides {
                bwd: self.bwd,
                fwd_bwd: self.fwd_bwd,
                fwd_no_grad: self.fwd_no_grad,
            },
            precision: self.precision,
            device: self.device,
            warmup: self.warmup,
            iterations: self.iterations,
            output: OutputFlags {
                skip_print: self.skip_print,
                csv: self.csv,
                dump_csv: self.dump_csv,
                plot: self.plot,
            },
            ci: self.ci,
            keep_going: self.keep_going,
            gpu_lockdown: self.gpu_lockdown,
            operator_loader: self.operator_loader,
            metrics,
            metrics_gpu_backend: self.metrics_gpu_backend,
            only,
            baseline: self.baseline,
            input_id: self.input_id,
            num_inputs: self.num_inputs,
            test_only: self.test_only,
            extra_args: self.extra_args,
        })
    }

    /// Run the invocation and return the process exit status
    pub async fn run(self) -> Result<i32> {
        let config = self.into_config().context("invalid arguments")?;
        tracing::info!("Starting TritonBench");
        tracing::info!("Device: {}", config.device);
        tracing::info!("Mode: {}", config.mode_overrides.resolve(config.mode));
        tracing::debug!(backend = %config.metrics_gpu_backend, "gpu metrics backend");

        let reporter = reporter_from_env();
        reporter.report_usage("tritonbench");
        let runner = BatchRunner::new(config).with_reporter(Arc::clone(&reporter));

        let batch = tokio::task::spawn_blocking(move || {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            runner.run(&mut out)
        });

        tokio::select! {
            joined = batch => {
                let report = joined.context("benchmark thread panicked")??;
                Ok(summarize(&report))
            }
            signal = shutdown_signal() => {
                tracing::warn!(signal, "interrupted, restoring device state");
                let released = lockdown::release_live_scopes();
                tracing::info!(released, "released gpu lockdown");
                // the blocking batch cannot be cancelled; leave without waiting for it
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
    }
}

fn summarize(report: &BatchReport) -> i32 {
    if report.is_success() {
        return 0;
    }
    let failed = report.failed();
    if !failed.is_empty() {
        eprintln!(
            "[TritonBench] {} of {} operators failed: {}",
            failed.len(),
            report.outcomes.len(),
            failed.join(", ")
        );
    }
    if let Some(e) = &report.release_error {
        eprintln!("[TritonBench] failed to release gpu lockdown: {}", e);
    }
    1
}

/// Wait for Ctrl+C or SIGTERM, returning the signal name
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Metric;
    use crate::runner::OperatorOutcome;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tritonbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.op, None);
        assert_eq!(config.mode, ExecutionMode::Fwd);
        assert_eq!(config.precision, Precision::Bypass);
        assert_eq!(config.warmup, crate::config::DEFAULT_WARMUP);
        assert_eq!(config.iterations, crate::config::DEFAULT_RUN_ITERS);
        assert_eq!(config.metrics, vec![Metric::Latency]);
        assert_eq!(config.metrics_gpu_backend, GpuMetricsBackend::Torch);
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_full_command_line() {
        let cli = parse(&[
            "--op",
            "matmul,softmax",
            "--mode",
            "fwd_bwd",
            "--fwd-no-grad",
            "--dtype",
            "fp32",
            "--warmup",
            "3",
            "--iter",
            "9",
            "--csv",
            "--dump-csv",
            "--metrics",
            "latency,speedup",
            "--only",
            "naive,blocked",
            "--num-inputs",
            "2",
            "--keep-going",
            "--",
            "--m",
            "64",
        ]);
        let mut config = cli.into_config().unwrap();

        assert_eq!(config.op_list().unwrap(), vec!["matmul", "softmax"]);
        assert_eq!(config.precision, Precision::Fp32);
        assert_eq!((config.warmup, config.iterations), (3, 9));
        assert!(config.output.csv && config.output.dump_csv);
        assert!(!config.output.skip_print);
        assert_eq!(config.metrics, vec![Metric::Latency, Metric::Speedup]);
        assert_eq!(config.only, Some(vec!["naive".to_string(), "blocked".to_string()]));
        assert_eq!(config.num_inputs, Some(2));
        assert!(config.keep_going);
        assert_eq!(config.extra_args, vec!["--m", "64"]);

        config.normalize_mode();
        assert_eq!(config.mode, ExecutionMode::FwdNoGrad);
    }

    #[test]
    fn test_metrics_gpu_backend() {
        let config = parse(&["--metrics-gpu-backend", "nvml"]).into_config().unwrap();
        assert_eq!(config.metrics_gpu_backend, GpuMetricsBackend::Nvml);
        assert!(Cli::try_parse_from(["tritonbench", "--metrics-gpu-backend", "cupti"]).is_err());
    }

    #[test]
    fn test_unknown_metric() {
        let err = parse(&["--metrics", "latency,joules"]).into_config().unwrap_err();
        assert_eq!(err, ConfigError::UnknownMetric("joules".into()));
    }

    #[test]
    fn test_bad_mode_rejected_by_parser() {
        assert!(Cli::try_parse_from(["tritonbench", "--mode", "sideways"]).is_err());
    }

    #[test]
    fn test_summarize_exit_codes() {
        let mut report = BatchReport::default();
        report.outcomes.push(OperatorOutcome {
            op: "matmul".into(),
            error: None,
        });
        assert_eq!(summarize(&report), 0);

        report.outcomes.push(OperatorOutcome {
            op: "softmax".into(),
            error: Some(crate::error::BenchError::UnknownOperator("softmax".into())),
        });
        assert_eq!(summarize(&report), 1);
    }
}
