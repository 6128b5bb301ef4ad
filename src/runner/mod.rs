//! Benchmark batch orchestration
//!
//! The runner coordinates a whole invocation:
//! - Validating the configuration before anything executes
//! - Resolving the operator list (explicit names or collections)
//! - Holding the GPU lockdown for the duration of the batch
//! - Applying keep-going semantics to operator failures

pub mod ci;
pub mod execution;

pub use execution::ExecutionController;

use crate::config::{RunConfig, DEFAULT_COLLECTION};
use crate::error::{BenchError, BenchResult};
use crate::lockdown::{is_gpu_device, ClockControl, LockdownError, LockdownScope, NvidiaSmi};
use crate::operators::{list_operators_by_collection, resolver_for, OperatorResolver};
use crate::output::MetricsOutput;
use crate::telemetry::{reporter_from_env, UsageReporter};
use std::io::Write;
use std::sync::Arc;

/// Outcome of one operator in a batch
#[derive(Debug)]
pub struct OperatorOutcome {
    pub op: String,
    pub error: Option<BenchError>,
}

impl OperatorOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-operator outcomes of a completed batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<OperatorOutcome>,
    /// Set when restoring the lockdown failed
    pub release_error: Option<LockdownError>,
}

impl BatchReport {
    /// Every operator passed and the lockdown was released cleanly
    pub fn is_success(&self) -> bool {
        self.release_error.is_none() && self.outcomes.iter().all(OperatorOutcome::is_success)
    }

    /// Names of the operators that failed, in run order
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.op.as_str())
            .collect()
    }
}

/// Runs a batch of operators under one lockdown scope
pub struct BatchRunner {
    config: RunConfig,
    resolver: Box<dyn OperatorResolver>,
    output: MetricsOutput,
    reporter: Arc<dyn UsageReporter>,
    /// `None` when the device has nothing to pin
    clock: Option<Arc<dyn ClockControl>>,
}

impl BatchRunner {
    /// Runner with the resolver, sinks and clock control selected by `config`
    pub fn new(config: RunConfig) -> Self {
        Self {
            resolver: resolver_for(&config),
            output: MetricsOutput::new(config.output),
            reporter: reporter_from_env(),
            clock: is_gpu_device(&config.device)
                .then(|| Arc::new(NvidiaSmi::for_device(&config.device)) as Arc<dyn ClockControl>),
            config,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn OperatorResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_output(mut self, output: MetricsOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn UsageReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_clock_control(mut self, clock: Arc<dyn ClockControl>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Operator names to run, in order
    pub fn resolve_ops(&self, out: &mut dyn Write) -> BenchResult<Vec<String>> {
        if let Some(ops) = self.config.op_list() {
            return Ok(ops);
        }
        let collection = match &self.config.op_collection {
            Some(collection) => collection.as_str(),
            None => {
                writeln!(
                    out,
                    "Neither operator nor operator collection is specified. Running all operators in the {} collection.",
                    DEFAULT_COLLECTION
                )?;
                DEFAULT_COLLECTION
            }
        };
        list_operators_by_collection(collection)
    }

    fn acquire_lockdown(&self) -> BenchResult<LockdownScope> {
        if !self.config.gpu_lockdown {
            return Ok(LockdownScope::disabled());
        }
        match &self.clock {
            Some(clock) => Ok(LockdownScope::acquire(true, clock.clone())?),
            None => {
                tracing::warn!(device = %self.config.device, "gpu lockdown requested for a non-gpu device, skipping");
                Ok(LockdownScope::disabled())
            }
        }
    }

    /// Run the invocation: the CI sweep with `--ci`, otherwise the batch.
    ///
    /// Without keep-going the first operator error is returned. With
    /// keep-going every operator runs and failures are recorded in the report.
    pub fn run(&self, out: &mut dyn Write) -> BenchResult<BatchReport> {
        self.config.validate()?;
        tracing::debug!(
            config = %serde_json::to_string(&self.config).unwrap_or_default(),
            "resolved run config"
        );

        if self.config.ci {
            return Ok(ci::run_ci_sweep(self.resolver.as_ref(), &self.config, out));
        }

        let ops = self.resolve_ops(out)?;
        tracing::info!(ops = ?ops, "starting batch");

        let mut scope = self.acquire_lockdown()?;
        let controller = ExecutionController::new(self.resolver.as_ref(), &self.output, self.reporter.as_ref());
        let mut report = BatchReport::default();

        for op in ops {
            match controller.run_operator(&op, &self.config, out) {
                Ok(_) => report.outcomes.push(OperatorOutcome { op, error: None }),
                Err(e) if self.config.keep_going => {
                    tracing::error!(op = %op, error = %e, "operator failed, continuing");
                    report.outcomes.push(OperatorOutcome { op, error: Some(e) });
                }
                Err(e) => {
                    if let Err(release) = scope.release() {
                        tracing::error!(error = %release, "failed to release gpu lockdown");
                    }
                    return Err(e);
                }
            }
        }

        if let Err(e) = scope.release() {
            tracing::error!(error = %e, "failed to release gpu lockdown");
            report.release_error = Some(e);
        }

        let failed = report.failed();
        if !failed.is_empty() {
            tracing::warn!(failed = ?failed, "batch finished with failures");
        }
        Ok(report)
    }
}
