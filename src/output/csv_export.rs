//! CSV dump of benchmark results

use crate::result::BenchmarkResult;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name under the system temp dir that receives CSV dumps
pub const CSV_DUMP_DIR_NAME: &str = "tritonbench";

/// `<tempdir>/tritonbench/`
pub fn default_dump_dir() -> PathBuf {
    std::env::temp_dir().join(CSV_DUMP_DIR_NAME)
}

pub struct CsvExporter;

impl CsvExporter {
    /// Write `result` as a new CSV file under `dir`, creating `dir` on demand
    pub fn dump(result: &BenchmarkResult, dir: &Path) -> Result<PathBuf, csv::Error> {
        fs::create_dir_all(dir)?;
        let path = result.write_csv(dir)?;
        tracing::debug!(op = %result.op_name, path = %path.display(), "wrote csv dump");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Metric;
    use crate::mode::ExecutionMode;

    #[test]
    fn test_default_dump_dir() {
        let dir = default_dump_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with(CSV_DUMP_DIR_NAME));
    }

    #[test]
    fn test_dump_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("tritonbench");
        let result = BenchmarkResult::new("softmax", ExecutionMode::Fwd, vec![Metric::Latency]);

        let path = CsvExporter::dump(&result, &dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(path.parent().unwrap(), dir.as_path());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x_val\n");
    }

    #[test]
    fn test_dumps_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let result = BenchmarkResult::new("matmul", ExecutionMode::Fwd, vec![Metric::Latency]);

        let first = CsvExporter::dump(&result, root.path()).unwrap();
        let second = CsvExporter::dump(&result, root.path()).unwrap();
        assert_ne!(first, second);
    }
}
