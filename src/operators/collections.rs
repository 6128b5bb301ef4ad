//! Named operator collections

use super::registry::operator_names;
use crate::error::{BenchError, BenchResult};

/// Operators in a single named collection
fn collection(name: &str) -> Option<Vec<String>> {
    let names: Vec<String> = match name {
        "default" => ["matmul", "vector_add", "softmax"].iter().map(|s| s.to_string()).collect(),
        "gemm" => vec!["matmul".to_string()],
        "all" => operator_names(),
        _ => return None,
    };
    Some(names)
}

/// Expand a comma-separated list of collection names into operator names.
///
/// Collections are expanded in the order given and concatenated; an operator
/// appearing in two collections runs twice.
pub fn list_operators_by_collection(names: &str) -> BenchResult<Vec<String>> {
    let mut ops = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let members = collection(name).ok_or_else(|| BenchError::UnknownCollection(name.to_string()))?;
        tracing::debug!(collection = name, ops = ?members, "expanded collection");
        ops.extend(members);
    }
    Ok(ops)
}
