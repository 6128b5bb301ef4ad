//! Wall-clock timing helpers for the built-in operators

use std::hint::black_box;
use std::time::Instant;

/// Run `f` `warmup` times untimed, then `iterations` times timed.
///
/// Returns the median latency in milliseconds, or `None` when nothing was
/// timed.
pub fn median_latency_ms<T, F: FnMut() -> T>(warmup: u32, iterations: u32, mut f: F) -> Option<f64> {
    for _ in 0..warmup {
        black_box(f());
    }

    let mut samples: Vec<f64> = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        let start = Instant::now();
        black_box(f());
        samples.push(start.elapsed().as_secs_f64() * 1e3);
    }

    median(&mut samples)
}

/// Median of `samples`, sorting in place
pub fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[mid - 1] + samples[mid]) / 2.0)
    } else {
        Some(samples[mid])
    }
}

/// TFLOP/s achieved by `flops` operations in `latency_ms`
pub fn tflops(flops: f64, latency_ms: f64) -> Option<f64> {
    (latency_ms > 0.0).then(|| flops / (latency_ms * 1e-3) / 1e12)
}

/// Element-wise closeness check, `|a - b| <= atol + rtol * |b|`
pub fn allclose(a: &[f32], b: &[f32], rtol: f32, atol: f32) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}
