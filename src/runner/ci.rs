//! CI validation sweep
//!
//! Every operator the resolver knows runs once on its first test input.
//! No metrics are rendered and the lockdown is never taken.

use super::{BatchReport, OperatorOutcome};
use crate::config::RunConfig;
use crate::error::BenchError;
use crate::operators::OperatorResolver;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;

/// Run the sweep, writing a PASS/FAIL line per operator to `out`
pub fn run_ci_sweep(resolver: &dyn OperatorResolver, base: &RunConfig, out: &mut dyn Write) -> BatchReport {
    let ops = resolver.known_operators();
    let pb = ProgressBar::new(ops.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut report = BatchReport::default();
    for op in ops {
        pb.set_message(op.clone());
        let error = check_operator(resolver, &op, base).err();
        let line = match &error {
            None => format!("PASS {}", op),
            Some(e) => format!("FAIL {}: {}", op, e),
        };
        if let Err(e) = pb.suspend(|| writeln!(out, "{}", line)) {
            tracing::warn!(error = %e, "failed to write ci result");
        }
        report.outcomes.push(OperatorOutcome { op, error });
        pb.inc(1);
    }
    pb.finish_with_message("CI sweep complete");
    report
}

fn check_operator(resolver: &dyn OperatorResolver, name: &str, base: &RunConfig) -> Result<(), BenchError> {
    let factory = resolver.resolve(name, base)?;

    let mut config = base.clone();
    config.ci = false;
    config.op = Some(name.to_string());
    config.op_collection = None;
    config.test_only = true;
    config.warmup = 1;
    config.iterations = 1;
    config.input_id = 0;
    config.num_inputs = Some(1);
    config.extra_args.clear();
    config.normalize_mode();

    let mut bench = factory(&config, &[]).map_err(|source| BenchError::Construct {
        op: name.to_string(),
        source,
    })?;
    bench
        .run(config.warmup, config.iterations)
        .map_err(|source| BenchError::Execution {
            op: name.to_string(),
            source,
        })
}
