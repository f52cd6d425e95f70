//! End-to-end orchestration: load, clean, merge, impute, aggregate and
//! render, in that order. Each stage hands owned data to the next.

use std::fs;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::config::{self, Settings};
use crate::features::clean::{clean_census_table, clean_election_table};
use crate::features::evolution::evolution_aggregate;
use crate::features::heatmap::{heatmap_aggregate, heatmap_join};
use crate::features::impute::impute_missing;
use crate::features::merge::merge_census_tables;
use crate::features::types::{EvolutionAggregate, HeatmapRow, SectionRecord, SectionVotes};
use crate::ingest::load_tables;
use crate::output::{self, RunSummary};
use crate::render::{render_evolution_chart, render_heatmap_chart};

const EVOLUTION_PLOT_FILE: &str = "evolution_plot.svg";
const EVOLUTION_TABLE_FILE: &str = "evolution_table.csv";
const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Cleaned and imputed inputs shared by both aggregates.
pub struct PlotData {
    pub sections: Vec<SectionRecord>,
    pub votes: Vec<SectionVotes>,
}

/// Loads the extracts and prepares the section table and election shares.
pub fn prepare(settings: &Settings) -> Result<PlotData> {
    let tables = load_tables(settings)?;

    info!("cleaning extracts");
    let income =
        clean_census_table(tables.income, settings).context("cleaning the income extract")?;
    let demography = clean_census_table(tables.demography, settings)
        .context("cleaning the demography extract")?;
    let origin = clean_census_table(tables.origin, settings)
        .context("cleaning the birth-country extract")?;
    let votes = clean_election_table(tables.elections).context("cleaning the election extract")?;

    info!("merging and imputing the census sources");
    let merged = merge_census_tables(income, demography, origin)?;
    let sections = impute_missing(merged);

    Ok(PlotData { sections, votes })
}

/// Runs the whole pipeline and writes every artifact under
/// `settings.plots_dir`: the evolution chart and table, one heatmap per
/// configured target, and the JSON run summary.
pub fn run(settings: &Settings, distribution: &str, bins: usize) -> Result<RunSummary> {
    let data = prepare(settings)?;
    ensure_plots_dir(settings)?;

    info!("building the evolution aggregate");
    let evolution = evolution_aggregate(&data.sections, distribution)?;
    output::print_pretty(&evolution);
    write_evolution_artifacts(settings, &evolution)?;

    info!("building the heatmap aggregates");
    let rows = heatmap_join(&data.sections, &data.votes, settings.election_year)?;
    for &(target, palette, label) in config::HEATMAP_TARGETS {
        render_one_heatmap(settings, &rows, target, palette, label, bins)?;
    }

    let summary = RunSummary {
        generated_at: Utc::now(),
        election_year: settings.election_year,
        distribution: evolution.distribution.clone(),
        overall_delta_pct: evolution.overall_delta_pct,
        sections_2021: count_period(&data.sections, config::PERIOD_EARLIER),
        sections_2023: count_period(&data.sections, config::PERIOD_LATER),
        heatmap_rows: rows.len(),
        heatmap_targets: config::HEATMAP_TARGETS
            .iter()
            .map(|(target, _, _)| (*target).to_string())
            .collect(),
    };
    output::write_run_summary(&settings.plots_dir.join(RUN_SUMMARY_FILE), &summary)?;
    output::print_json(&summary)?;

    info!("all plots and tables generated");
    Ok(summary)
}

/// Builds and writes only the evolution chart and table.
pub fn run_evolution(settings: &Settings, distribution: &str) -> Result<EvolutionAggregate> {
    let data = prepare(settings)?;
    ensure_plots_dir(settings)?;

    let evolution = evolution_aggregate(&data.sections, distribution)?;
    output::print_pretty(&evolution);
    write_evolution_artifacts(settings, &evolution)?;
    Ok(evolution)
}

/// Builds and writes the heatmaps, either for every configured target or
/// for the single one requested.
pub fn run_heatmaps(settings: &Settings, bins: usize, target: Option<&str>) -> Result<()> {
    let data = prepare(settings)?;
    ensure_plots_dir(settings)?;

    let rows = heatmap_join(&data.sections, &data.votes, settings.election_year)?;
    match target {
        Some(target) => {
            let (palette, label) = config::heatmap_target(target)
                .with_context(|| format!("no heatmap configuration for target {target:?}"))?;
            render_one_heatmap(settings, &rows, target, palette, label, bins)?;
        }
        None => {
            for &(target, palette, label) in config::HEATMAP_TARGETS {
                render_one_heatmap(settings, &rows, target, palette, label, bins)?;
            }
        }
    }
    Ok(())
}

fn ensure_plots_dir(settings: &Settings) -> Result<()> {
    fs::create_dir_all(&settings.plots_dir)
        .with_context(|| format!("creating plots directory {}", settings.plots_dir.display()))
}

fn write_evolution_artifacts(settings: &Settings, evolution: &EvolutionAggregate) -> Result<()> {
    render_evolution_chart(&settings.plots_dir.join(EVOLUTION_PLOT_FILE), evolution)?;
    output::write_evolution_table(&settings.plots_dir.join(EVOLUTION_TABLE_FILE), evolution)?;
    Ok(())
}

fn render_one_heatmap(
    settings: &Settings,
    rows: &[HeatmapRow],
    target: &str,
    palette: &str,
    label: &str,
    bins: usize,
) -> Result<()> {
    let aggregate = heatmap_aggregate(rows, target, bins)?;
    let path = settings
        .plots_dir
        .join(heatmap_file_name(target, bins, settings.election_year));
    render_heatmap_chart(&path, &aggregate, palette, label)
}

fn count_period(sections: &[SectionRecord], period: i32) -> usize {
    sections.iter().filter(|r| r.periodo == period).count()
}

/// `heatmap_<target-slug>_<bins>x<bins>_<year>.svg`
fn heatmap_file_name(target: &str, bins: usize, year: i32) -> String {
    let slug: String = target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("heatmap_{slug}_{bins}x{bins}_{year}.svg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heatmap_file_name_slugs_the_target() {
        assert_eq!(heatmap_file_name("Far right", 3, 2023), "heatmap_far_right_3x3_2023.svg");
        assert_eq!(
            heatmap_file_name("population_share", 4, 2023),
            "heatmap_population_share_4x4_2023.svg"
        );
    }
}
