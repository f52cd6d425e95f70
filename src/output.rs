//! Output formatting and persistence for the run artifacts.
//!
//! Supports pretty-printing, a JSON run summary, and the evolution table
//! as CSV next to the rendered images.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config;
use crate::features::types::EvolutionAggregate;
use std::fs;
use std::path::Path;

/// What one pipeline run produced, written as `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub election_year: i32,
    /// Income distribution actually used, after any fallback.
    pub distribution: String,
    pub overall_delta_pct: f64,
    pub sections_2021: usize,
    pub sections_2023: usize,
    /// Sections that matched between the election and census tables.
    pub heatmap_rows: usize,
    pub heatmap_targets: Vec<String>,
}

/// Logs the evolution aggregate using Rust's debug pretty-print format.
pub fn print_pretty(aggregate: &EvolutionAggregate) {
    debug!("{:#?}", aggregate);
}

/// Logs the run summary as pretty-printed JSON.
pub fn print_json(summary: &RunSummary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Writes the evolution aggregate as a CSV table.
///
/// The bucket column is named after the distribution, matching the axis
/// label of the rendered chart.
pub fn write_evolution_table(path: &Path, aggregate: &EvolutionAggregate) -> Result<()> {
    debug!(path = %path.display(), "writing evolution table");
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        format!("income_{}", aggregate.distribution),
        format!("migrants_{}", config::PERIOD_EARLIER),
        format!("migrants_{}", config::PERIOD_LATER),
        "delta_migrants".to_string(),
    ])?;
    for bucket in &aggregate.buckets {
        writer.write_record([
            bucket.bucket.to_string(),
            bucket.migrants_2021.to_string(),
            bucket.migrants_2023.to_string(),
            bucket.delta_pct.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the run summary as pretty-printed JSON.
pub fn write_run_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    debug!(path = %path.display(), "writing run summary");
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::types::EvolutionBucket;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn sample_aggregate() -> EvolutionAggregate {
        EvolutionAggregate {
            distribution: "quartile".to_string(),
            buckets: vec![
                EvolutionBucket {
                    bucket: 0,
                    migrants_2021: 100.0,
                    migrants_2023: 200.0,
                    delta_pct: 100.0,
                },
                EvolutionBucket {
                    bucket: 1,
                    migrants_2021: 80.0,
                    migrants_2023: 100.0,
                    delta_pct: 25.0,
                },
            ],
            overall_delta_pct: 66.7,
        }
    }

    fn sample_summary() -> RunSummary {
        RunSummary {
            generated_at: Utc::now(),
            election_year: 2023,
            distribution: "quartile".to_string(),
            overall_delta_pct: 66.7,
            sections_2021: 2,
            sections_2023: 3,
            heatmap_rows: 3,
            heatmap_targets: vec!["Far right".to_string(), "population_share".to_string()],
        }
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&sample_aggregate());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&sample_summary()).unwrap();
    }

    #[test]
    fn test_evolution_table_headers_and_rows() {
        let path = temp_path("vox_ine_charts_test_evolution.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        write_evolution_table(&path, &sample_aggregate()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "income_quartile,migrants_2021,migrants_2023,delta_migrants");
        assert_eq!(lines[1], "0,100,200,100");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_run_summary_is_valid_json() {
        let path = temp_path("vox_ine_charts_test_summary.json");
        let _ = fs::remove_file(&path);

        write_run_summary(&path, &sample_summary()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["election_year"], 2023);
        assert_eq!(value["distribution"], "quartile");
        assert_eq!(value["heatmap_targets"][1], "population_share");

        fs::remove_file(&path).unwrap();
    }
}
