//! Latency-per-input line chart

use crate::config::Metric;
use crate::result::BenchmarkResult;
use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

pub struct LatencyPlotter;

impl LatencyPlotter {
    /// Plot one latency line per implementation across the result's inputs
    pub fn plot(result: &BenchmarkResult, path: &Path) -> Result<()> {
        let root = BitMapBackend::new(path, (1400, 900)).into_drawing_area();
        root.fill(&WHITE)?;

        let series = latency_series(result);
        if series.is_empty() {
            root.present()?;
            return Ok(());
        }

        let max_latency = series
            .iter()
            .flat_map(|(_, points)| points.iter().map(|(_, y)| *y))
            .fold(0f64, f64::max);
        let max_x = result.rows.len().max(2) as f64 - 1.0;
        let labels: Vec<String> = result.rows.iter().map(|r| r.x_val.clone()).collect();

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("{} ({}) latency", result.op_name, result.mode),
                ("sans-serif", 40),
            )
            .margin(15)
            .x_label_area_size(60)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..max_x, 0f64..(max_latency * 1.1).max(f64::EPSILON))?;

        chart
            .configure_mesh()
            .x_desc("Input")
            .y_desc("Latency (ms)")
            .x_labels(labels.len().max(2))
            .x_label_formatter(&|x| {
                let idx = x.round() as usize;
                labels.get(idx).cloned().unwrap_or_default()
            })
            .y_label_formatter(&|y| format!("{:.3}", y))
            .draw()?;

        for (idx, (name, points)) in series.into_iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            chart
                .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?
                .label(name)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            chart.draw_series(
                points
                    .into_iter()
                    .map(|p| Circle::new(p, 4, color.filled())),
            )?;
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }
}

/// `(impl name, [(row index, latency ms)])` for every implementation with data
pub fn latency_series(result: &BenchmarkResult) -> Vec<(String, Vec<(f64, f64)>)> {
    result
        .impl_names()
        .into_iter()
        .filter_map(|name| {
            let points: Vec<(f64, f64)> = result
                .rows
                .iter()
                .enumerate()
                .filter_map(|(idx, row)| {
                    row.get(&name)
                        .and_then(|m| m.get(Metric::Latency))
                        .map(|v| (idx as f64, v))
                })
                .collect();
            (!points.is_empty()).then_some((name, points))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::ExecutionMode;
    use crate::result::{ImplMetrics, ResultRow};

    #[test]
    fn test_latency_series_skips_impls_without_latency() {
        let mut result = BenchmarkResult::new("matmul", ExecutionMode::Fwd, vec![Metric::Latency]);
        for id in 0..3 {
            let mut row = ResultRow::new(id, id.to_string());
            let mut naive = ImplMetrics::default();
            naive.set(Metric::Latency, id as f64 + 1.0);
            row.impls.push(("naive".into(), naive));
            row.impls.push(("broken".into(), ImplMetrics::default()));
            result.push_row(row);
        }

        let series = latency_series(&result);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].0, "naive");
        assert_eq!(series[0].1, vec![(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
    }
}
