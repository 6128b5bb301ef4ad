//! Benchmark results and their text/CSV renderings

use crate::config::Metric;
use crate::mode::ExecutionMode;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Field delimiter of the CSV renderings
pub const CSV_DELIMITER: u8 = b';';

/// Metric values of one implementation on one input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplMetrics {
    /// Collected values keyed by metric
    pub values: BTreeMap<String, f64>,
    /// Set when this implementation failed on this input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImplMetrics {
    /// Record a metric value
    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric.as_str().to_string(), value);
    }

    /// Look up a metric value
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(metric.as_str()).copied()
    }
}

/// All implementations measured on one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Index into the operator's input series
    pub input_id: usize,
    /// Human readable input label, e.g. a shape
    pub x_val: String,
    /// Per-implementation metrics, in measurement order
    pub impls: Vec<(String, ImplMetrics)>,
}

impl ResultRow {
    /// Create an empty row
    pub fn new(input_id: usize, x_val: impl Into<String>) -> Self {
        Self {
            input_id,
            x_val: x_val.into(),
            impls: Vec::new(),
        }
    }

    /// Metrics of `implementation` on this input
    pub fn get(&self, implementation: &str) -> Option<&ImplMetrics> {
        self.impls
            .iter()
            .find(|(name, _)| name == implementation)
            .map(|(_, m)| m)
    }
}

/// Output of one operator benchmark
///
/// Rows are appended as inputs complete, so a result read after a failed
/// run holds whatever was measured before the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Operator name
    pub op_name: String,
    /// Mode the operator ran in
    pub mode: ExecutionMode,
    /// Metrics requested for this run
    pub metrics: Vec<Metric>,
    /// One row per input
    pub rows: Vec<ResultRow>,
}

impl BenchmarkResult {
    /// Create an empty result
    pub fn new(op_name: impl Into<String>, mode: ExecutionMode, metrics: Vec<Metric>) -> Self {
        Self {
            op_name: op_name.into(),
            mode,
            metrics,
            rows: Vec::new(),
        }
    }

    /// Append a completed row
    pub fn push_row(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when nothing was measured
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Implementation names in first-seen order
    pub fn impl_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            for (name, _) in &row.impls {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Column header: `x_val` followed by `<impl>-<metric>` pairs
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["x_val".to_string()];
        for name in self.impl_names() {
            for metric in &self.metrics {
                headers.push(format!("{}-{}", name, metric));
            }
        }
        headers
    }

    /// Table body as strings, aligned with [`headers`](Self::headers)
    pub fn table(&self) -> Vec<Vec<String>> {
        let names = self.impl_names();
        self.rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.x_val.clone()];
                for name in &names {
                    let impl_metrics = row.get(name);
                    for metric in &self.metrics {
                        let cell = impl_metrics
                            .and_then(|m| m.get(*metric))
                            .map(|v| format_value(*metric, v))
                            .unwrap_or_default();
                        cells.push(cell);
                    }
                }
                cells
            })
            .collect()
    }

    /// Write the CSV rendering to a stream
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = WriterBuilder::new()
            .delimiter(CSV_DELIMITER)
            .from_writer(writer);

        wtr.write_record(self.headers())?;
        for row in self.table() {
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Write the CSV rendering to a new `op_<name>_*.csv` file in `dir`
    ///
    /// Returns the path written.
    pub fn write_csv(&self, dir: &Path) -> Result<PathBuf, csv::Error> {
        let file = tempfile::Builder::new()
            .prefix(&format!("op_{}_", self.op_name))
            .suffix(".csv")
            .tempfile_in(dir)?;
        self.write_csv_to(file.as_file())?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

fn format_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::Latency => format!("{:.4}", value),
        Metric::Tflops | Metric::Speedup => format!("{:.3}", value),
        Metric::Accuracy => format!("{:.0}", value),
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers = self.headers();
        let table = self.table();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in &table {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:>width$}", c, width = w))
                .collect::<Vec<_>>()
                .join("  ")
        };

        writeln!(f, "{}", line(&headers))?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("  "))?;
        for row in &table {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> BenchmarkResult {
        let mut result = BenchmarkResult::new(
            "matmul",
            ExecutionMode::Fwd,
            vec![Metric::Latency, Metric::Speedup],
        );
        for (id, shape) in ["(8, 8, 8)", "(16, 16, 16)"].iter().enumerate() {
            let mut row = ResultRow::new(id, *shape);
            let mut naive = ImplMetrics::default();
            naive.set(Metric::Latency, 2.0);
            naive.set(Metric::Speedup, 1.0);
            let mut blocked = ImplMetrics::default();
            blocked.set(Metric::Latency, 0.5);
            blocked.set(Metric::Speedup, 4.0);
            row.impls.push(("naive".into(), naive));
            row.impls.push(("blocked".into(), blocked));
            result.push_row(row);
        }
        result
    }

    #[test]
    fn test_headers() {
        assert_eq!(
            sample_result().headers(),
            vec![
                "x_val",
                "naive-latency",
                "naive-speedup",
                "blocked-latency",
                "blocked-speedup"
            ]
        );
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        sample_result().write_csv_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "x_val;naive-latency;naive-speedup;blocked-latency;blocked-speedup"
        );
        assert_eq!(lines.next().unwrap(), "(8, 8, 8);2.0000;1.000;0.5000;4.000");
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_missing_cells_are_blank() {
        let mut result = BenchmarkResult::new("softmax", ExecutionMode::Fwd, vec![Metric::Latency]);
        let mut row = ResultRow::new(0, "a");
        row.impls.push(("naive".into(), ImplMetrics::default()));
        result.push_row(row);

        let mut buf = Vec::new();
        result.write_csv_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "x_val;naive-latency\na;\n");
    }

    #[test]
    fn test_write_csv_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_result().write_csv(dir.path()).unwrap();

        assert!(path.starts_with(dir.path()));
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("op_matmul_"));
        assert!(file_name.ends_with(".csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("x_val;naive-latency"));
    }

    #[test]
    fn test_text_rendering() {
        let text = sample_result().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("blocked-latency"));
        assert!(lines[1].starts_with('-'));
        assert!(lines[3].contains("(16, 16, 16)"));
    }

    #[test]
    fn test_empty_result_renders_header_only() {
        let result = BenchmarkResult::new("vector_add", ExecutionMode::Fwd, vec![Metric::Latency]);
        assert!(result.is_empty());
        assert_eq!(result.headers(), vec!["x_val"]);
        assert_eq!(result.to_string().lines().count(), 2);
    }
}
