//! Metrics output pipeline
//!
//! Each sink is driven by its own flag:
//! - console: nothing with `skip_print`, else CSV with `csv`, else the text table
//! - `dump_csv`: always writes a CSV file under the dump dir and prints its path
//!
//! Plotting needs the operator instance and is driven by the execution
//! controller instead.

pub mod csv_export;

pub use csv_export::{default_dump_dir, CsvExporter, CSV_DUMP_DIR_NAME};

use crate::error::BenchResult;
use crate::result::BenchmarkResult;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output sink flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFlags {
    /// Suppress the console rendering
    pub skip_print: bool,
    /// Print CSV instead of the text table
    pub csv: bool,
    /// Also write a CSV file to the dump dir
    pub dump_csv: bool,
    /// Ask the operator to plot its result
    pub plot: bool,
}

/// What the pipeline produced for one result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputReport {
    /// Something was written to the console
    pub printed: bool,
    /// CSV file written by `dump_csv`
    pub dumped: Option<PathBuf>,
}

/// Renders completed results to the configured sinks
#[derive(Debug, Clone)]
pub struct MetricsOutput {
    flags: OutputFlags,
    dump_dir: PathBuf,
}

impl MetricsOutput {
    /// Pipeline dumping to `<tempdir>/tritonbench/`
    pub fn new(flags: OutputFlags) -> Self {
        Self::with_dump_dir(flags, default_dump_dir())
    }

    /// Pipeline dumping to a custom directory
    pub fn with_dump_dir(flags: OutputFlags, dump_dir: impl Into<PathBuf>) -> Self {
        Self {
            flags,
            dump_dir: dump_dir.into(),
        }
    }

    /// The configured flags
    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    /// Where CSV dumps and plots land
    pub fn dump_dir(&self) -> &Path {
        &self.dump_dir
    }

    /// Render the console sink
    pub fn print(&self, result: &BenchmarkResult, out: &mut dyn Write) -> BenchResult<bool> {
        if self.flags.skip_print {
            return Ok(false);
        }
        if self.flags.csv {
            result.write_csv_to(&mut *out)?;
        } else {
            write!(out, "{}", result)?;
        }
        Ok(true)
    }

    /// Render the file sink
    pub fn dump(&self, result: &BenchmarkResult, out: &mut dyn Write) -> BenchResult<Option<PathBuf>> {
        if !self.flags.dump_csv {
            return Ok(None);
        }
        let path = CsvExporter::dump(result, &self.dump_dir)?;
        writeln!(out, "[TritonBench] Dumped csv to {}", path.display())?;
        Ok(Some(path))
    }

    /// Render every enabled sink
    pub fn render(&self, result: &BenchmarkResult, out: &mut dyn Write) -> BenchResult<OutputReport> {
        let printed = self.print(result, out)?;
        let dumped = self.dump(result, out)?;
        out.flush()?;
        Ok(OutputReport { printed, dumped })
    }
}
