//! Usage reporting hook

use crate::result::BenchmarkResult;
use std::sync::Arc;

/// Environment variable that turns on the tracing reporter
pub const USAGE_LOG_ENV: &str = "TRITONBENCH_USAGE_LOG";

/// Fire-and-forget usage reporting. Implementations must not fail or block.
pub trait UsageReporter: Send + Sync {
    /// Called once at process start
    fn report_usage(&self, name: &str);

    /// Called after each operator's output has been rendered
    fn log_benchmark(&self, _result: &BenchmarkResult, _device: &str) {}
}

/// Reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl UsageReporter for NoopReporter {
    fn report_usage(&self, _name: &str) {}
}

/// Reports through `tracing` under the `tritonbench::usage` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl UsageReporter for TracingReporter {
    fn report_usage(&self, name: &str) {
        tracing::info!(target: "tritonbench::usage", name, "usage");
    }

    fn log_benchmark(&self, result: &BenchmarkResult, device: &str) {
        tracing::info!(
            target: "tritonbench::usage",
            op = %result.op_name,
            mode = %result.mode,
            device,
            rows = result.len(),
            impls = ?result.impl_names(),
            "benchmark"
        );
    }
}

/// Reporter selected by `TRITONBENCH_USAGE_LOG`
pub fn reporter_from_env() -> Arc<dyn UsageReporter> {
    reporter_for(std::env::var(USAGE_LOG_ENV).ok().as_deref())
}

fn reporter_for(value: Option<&str>) -> Arc<dyn UsageReporter> {
    match value {
        Some("1") | Some("true") => Arc::new(TracingReporter),
        _ => Arc::new(NoopReporter),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call
    #[derive(Default)]
    pub(crate) struct RecordingReporter {
        pub usage: Mutex<Vec<String>>,
        pub benchmarks: Mutex<Vec<(String, String)>>,
    }

    impl UsageReporter for RecordingReporter {
        fn report_usage(&self, name: &str) {
            self.usage.lock().unwrap().push(name.to_string());
        }

        fn log_benchmark(&self, result: &BenchmarkResult, device: &str) {
            self.benchmarks
                .lock()
                .unwrap()
                .push((result.op_name.clone(), device.to_string()));
        }
    }

    #[test]
    fn test_reporter_selection() {
        // neither reporter can fail; exercise both paths
        let result = BenchmarkResult::new("matmul", crate::mode::ExecutionMode::Fwd, Vec::new());
        for value in [None, Some("0"), Some("1"), Some("true")] {
            let reporter = reporter_for(value);
            reporter.report_usage("tritonbench");
            reporter.log_benchmark(&result, "cpu");
        }
    }

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingReporter::default();
        reporter.report_usage("tritonbench");
        let result = BenchmarkResult::new("softmax", crate::mode::ExecutionMode::Bwd, Vec::new());
        reporter.log_benchmark(&result, "cpu");
        assert_eq!(*reporter.usage.lock().unwrap(), vec!["tritonbench"]);
        assert_eq!(
            *reporter.benchmarks.lock().unwrap(),
            vec![("softmax".to_string(), "cpu".to_string())]
        );
    }
}
