//! Run configuration
//!
//! A [`RunConfig`] is built once from the command line and treated as
//! read-only afterwards. The execution controller works on a per-operator
//! clone that carries the current operator name and the normalized mode.

use crate::mode::{ExecutionMode, ModeOverrides};
use crate::output::OutputFlags;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of untimed warmup repetitions
pub const DEFAULT_WARMUP: u32 = 25;

/// Default number of timed repetitions
pub const DEFAULT_RUN_ITERS: u32 = 100;

/// Collection used when neither `--op` nor `--op-collection` is given
pub const DEFAULT_COLLECTION: &str = "default";

/// Input dtype/precision requested for an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Use the operator's own default precision
    #[default]
    Bypass,
    Fp32,
    Tf32,
    Fp16,
    Bf16,
    Amp,
    #[value(name = "amp_fp16")]
    AmpFp16,
    #[value(name = "amp_bf16")]
    AmpBf16,
    Fp8,
}

impl Precision {
    /// Name as accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Bypass => "bypass",
            Precision::Fp32 => "fp32",
            Precision::Tf32 => "tf32",
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
            Precision::Amp => "amp",
            Precision::AmpFp16 => "amp_fp16",
            Precision::AmpBf16 => "amp_bf16",
            Precision::Fp8 => "fp8",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where GPU peak-memory metrics come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GpuMetricsBackend {
    #[default]
    Torch,
    Nvml,
}

impl fmt::Display for GpuMetricsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GpuMetricsBackend::Torch => "torch",
            GpuMetricsBackend::Nvml => "nvml",
        })
    }
}

/// A metric an operator can report per implementation and input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Median wall-clock latency in milliseconds
    Latency,
    /// Achieved tera-FLOP/s
    Tflops,
    /// Baseline latency divided by this implementation's latency
    Speedup,
    /// 1.0 when the output matches the baseline, 0.0 otherwise
    Accuracy,
}

impl Metric {
    /// Column suffix used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Latency => "latency",
            Metric::Tflops => "tflops",
            Metric::Speedup => "speedup",
            Metric::Accuracy => "accuracy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "latency" => Ok(Metric::Latency),
            "tflops" => Ok(Metric::Tflops),
            "speedup" => Ok(Metric::Speedup),
            "accuracy" => Ok(Metric::Accuracy),
            other => Err(ConfigError::UnknownMetric(other.to_string())),
        }
    }
}

/// Parse a comma separated metric list such as `latency,tflops`
pub fn parse_metrics(list: &str) -> Result<Vec<Metric>, ConfigError> {
    let mut metrics = Vec::new();
    for name in list.split(',').filter(|s| !s.trim().is_empty()) {
        let metric: Metric = name.parse()?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    if metrics.is_empty() {
        return Err(ConfigError::UnknownMetric(list.to_string()));
    }
    Ok(metrics)
}

/// Resolved settings for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Comma separated operator list; holds a single name inside the controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,

    /// Comma separated collection names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_collection: Option<String>,

    /// Execution mode; normalized against `mode_overrides` before construction
    pub mode: ExecutionMode,

    /// Shorthand mode flags
    pub mode_overrides: ModeOverrides,

    /// Requested input precision
    pub precision: Precision,

    /// Device to benchmark on
    pub device: String,

    /// Untimed repetitions per measurement
    pub warmup: u32,

    /// Timed repetitions per measurement
    pub iterations: u32,

    /// Output sink flags
    pub output: OutputFlags,

    /// Run the CI validation sweep instead of a benchmark batch
    pub ci: bool,

    /// Continue the batch after an operator fails
    pub keep_going: bool,

    /// Pin GPU clocks for the duration of the batch
    pub gpu_lockdown: bool,

    /// Resolve operators through the loader instead of the registry
    pub operator_loader: bool,

    /// Metrics to collect
    pub metrics: Vec<Metric>,

    /// GPU memory metrics source; host kernels only measure latency
    pub metrics_gpu_backend: GpuMetricsBackend,

    /// Restrict the implementations that run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,

    /// Override the operator's default baseline implementation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,

    /// First input sample to run
    pub input_id: usize,

    /// Number of input samples to run; all remaining when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_inputs: Option<usize>,

    /// Use small inputs and skip expensive steps
    pub test_only: bool,

    /// Unrecognized arguments forwarded verbatim to the operator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            op: None,
            op_collection: None,
            mode: ExecutionMode::Fwd,
            mode_overrides: ModeOverrides::default(),
            precision: Precision::Bypass,
            device: "cpu".to_string(),
            warmup: DEFAULT_WARMUP,
            iterations: DEFAULT_RUN_ITERS,
            output: OutputFlags::default(),
            ci: false,
            keep_going: false,
            gpu_lockdown: false,
            operator_loader: false,
            metrics: vec![Metric::Latency],
            metrics_gpu_backend: GpuMetricsBackend::Torch,
            only: None,
            baseline: None,
            input_id: 0,
            num_inputs: None,
            test_only: false,
            extra_args: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Create a config that benchmarks the given comma separated operators
    pub fn for_ops(ops: impl Into<String>) -> Self {
        Self {
            op: Some(ops.into()),
            ..Default::default()
        }
    }

    /// Set the warmup and iteration counts
    pub fn with_counts(mut self, warmup: u32, iterations: u32) -> Self {
        self.warmup = warmup;
        self.iterations = iterations;
        self
    }

    /// Set the input window
    pub fn with_inputs(mut self, input_id: usize, num_inputs: Option<usize>) -> Self {
        self.input_id = input_id;
        self.num_inputs = num_inputs;
        self
    }

    /// Set the output flags
    pub fn with_output(mut self, output: OutputFlags) -> Self {
        self.output = output;
        self
    }

    /// Enable or disable keep-going batch semantics
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Apply the shorthand flags to `mode`
    pub fn normalize_mode(&mut self) {
        self.mode = self.mode_overrides.resolve(self.mode);
    }

    /// The operator names from `--op`, in the order given
    pub fn op_list(&self) -> Option<Vec<String>> {
        self.op.as_ref().map(|ops| {
            ops.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Whether `name` passes the `--only` filter
    pub fn allows_impl(&self, name: &str) -> bool {
        match &self.only {
            Some(only) => only.iter().any(|o| o == name),
            None => true,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ci && self.op.is_some() {
            return Err(ConfigError::OperatorInCiMode);
        }

        if self.op.is_some() && self.op_collection.is_some() {
            return Err(ConfigError::OperatorAndCollection);
        }

        if let Some(ops) = self.op_list() {
            if ops.is_empty() {
                return Err(ConfigError::EmptyOperatorList);
            }
        }

        if self.metrics.is_empty() {
            return Err(ConfigError::UnknownMetric(String::new()));
        }

        if self.device.trim().is_empty() {
            return Err(ConfigError::InvalidDevice(self.device.clone()));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `--op` combined with `--ci`
    #[error("cannot specify operator when in CI mode")]
    OperatorInCiMode,

    /// `--op` combined with `--op-collection`
    #[error("--op conflicts with --op-collection")]
    OperatorAndCollection,

    /// `--op` was given but names nothing
    #[error("operator list is empty")]
    EmptyOperatorList,

    /// Metric name not recognized
    #[error("unknown metric: {0:?}")]
    UnknownMetric(String),

    /// Device string not usable
    #[error("invalid device: {0:?}")]
    InvalidDevice(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.mode, ExecutionMode::Fwd);
        assert_eq!(config.warmup, DEFAULT_WARMUP);
        assert_eq!(config.iterations, DEFAULT_RUN_ITERS);
        assert_eq!(config.metrics, vec![Metric::Latency]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_op_with_ci_rejected() {
        let mut config = RunConfig::for_ops("matmul");
        config.ci = true;
        assert_eq!(config.validate(), Err(ConfigError::OperatorInCiMode));
    }

    #[test]
    fn test_ci_with_collection_allowed() {
        let config = RunConfig {
            ci: true,
            op_collection: Some("all".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_op_with_collection_rejected() {
        let mut config = RunConfig::for_ops("matmul");
        config.op_collection = Some("default".into());
        assert_eq!(config.validate(), Err(ConfigError::OperatorAndCollection));
    }

    #[test]
    fn test_empty_op_list_rejected() {
        let config = RunConfig::for_ops(" , ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyOperatorList));
    }

    #[test]
    fn test_op_list_preserves_order_and_duplicates() {
        let config = RunConfig::for_ops("softmax,matmul, softmax");
        assert_eq!(
            config.op_list().unwrap(),
            vec!["softmax", "matmul", "softmax"]
        );
    }

    #[test]
    fn test_normalize_mode() {
        let mut config = RunConfig::default();
        config.mode = ExecutionMode::FwdBwd;
        config.mode_overrides.fwd_no_grad = true;
        config.normalize_mode();
        assert_eq!(config.mode, ExecutionMode::FwdNoGrad);
    }

    #[test]
    fn test_parse_metrics() {
        assert_eq!(
            parse_metrics("latency,tflops,latency").unwrap(),
            vec![Metric::Latency, Metric::Tflops]
        );
        assert!(matches!(
            parse_metrics("latency,bogus"),
            Err(ConfigError::UnknownMetric(m)) if m == "bogus"
        ));
        assert!(parse_metrics(",").is_err());
    }

    #[test]
    fn test_allows_impl() {
        let mut config = RunConfig::default();
        assert!(config.allows_impl("naive"));
        config.only = Some(vec!["blocked".into()]);
        assert!(config.allows_impl("blocked"));
        assert!(!config.allows_impl("naive"));
    }

    #[test]
    fn test_config_serialization() {
        let config = RunConfig::for_ops("matmul").with_counts(3, 7);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"mode\":\"fwd\""));
        assert!(!json.contains("op_collection"));

        let deserialized: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.op.as_deref(), Some("matmul"));
        assert_eq!(deserialized.warmup, 3);
        assert_eq!(deserialized.iterations, 7);
    }
}
