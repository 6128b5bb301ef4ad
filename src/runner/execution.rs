//! Runs a single operator end to end

use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::operators::{OperatorResolver, PlotError};
use crate::output::{MetricsOutput, OutputReport};
use crate::telemetry::UsageReporter;
use std::io::Write;

/// Resolve, construct, run and report one operator
pub struct ExecutionController<'a> {
    resolver: &'a dyn OperatorResolver,
    output: &'a MetricsOutput,
    reporter: &'a dyn UsageReporter,
}

impl<'a> ExecutionController<'a> {
    pub fn new(
        resolver: &'a dyn OperatorResolver,
        output: &'a MetricsOutput,
        reporter: &'a dyn UsageReporter,
    ) -> Self {
        Self {
            resolver,
            output,
            reporter,
        }
    }

    /// Benchmark `name` with a copy of `base` narrowed to that operator.
    ///
    /// Whatever `run()` returns, the metrics collected so far are rendered
    /// (console, then plot, then CSV dump) before the outcome is handed back.
    pub fn run_operator(&self, name: &str, base: &RunConfig, out: &mut dyn Write) -> BenchResult<OutputReport> {
        let factory = self.resolver.resolve(name, base)?;

        let mut config = base.clone();
        config.op = Some(name.to_string());
        config.op_collection = None;
        config.normalize_mode();

        tracing::info!(
            op = name,
            mode = %config.mode,
            strategy = self.resolver.strategy(),
            "running operator"
        );

        let mut bench = factory(&config, &config.extra_args).map_err(|source| BenchError::Construct {
            op: name.to_string(),
            source,
        })?;

        let run_result = bench.run(config.warmup, config.iterations);
        if let Err(e) = &run_result {
            tracing::error!(op = name, error = %e, "operator run failed, reporting partial metrics");
        }

        let result = bench.output();
        let mut report = OutputReport::default();
        let mut render_error = None;

        match self.output.print(result, out) {
            Ok(printed) => report.printed = printed,
            Err(e) => render_error = Some(e),
        }

        if self.output.flags().plot {
            let line = match bench.plot(self.output.dump_dir()) {
                Ok(path) => Some(format!("[TritonBench] Saved plot to {}", path.display())),
                Err(PlotError::NotSupported) => Some(format!("Plotting is not implemented for {}", name)),
                Err(e) => {
                    tracing::warn!(op = name, error = %e, "plot failed");
                    None
                }
            };
            if let Some(line) = line {
                if let Err(e) = writeln!(out, "{}", line) {
                    tracing::warn!(op = name, error = %e, "failed to write plot status");
                }
            }
        }

        match self.output.dump(result, out) {
            Ok(dumped) => report.dumped = dumped,
            Err(e) => {
                render_error.get_or_insert(e);
            }
        }
        if let Err(e) = out.flush() {
            render_error.get_or_insert(e.into());
        }
        self.reporter.log_benchmark(result, &config.device);

        match (run_result, render_error) {
            (Err(source), render_error) => {
                if let Some(e) = render_error {
                    tracing::warn!(op = name, error = %e, "failed to render partial metrics");
                }
                Err(BenchError::Execution {
                    op: name.to_string(),
                    source,
                })
            }
            (Ok(()), Some(e)) => Err(e),
            (Ok(()), None) => Ok(report),
        }
    }
}
