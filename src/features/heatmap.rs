//! Income × immigration cross-tabs behind the heatmap images.
//!
//! Sections are cut into quantile bins on two axes, later-period household
//! income and foreign-born share, and a target column is aggregated per
//! cell. The 3-bin layout is the quartile split (bottom 25% / middle 50% /
//! top 25%); any other bin count uses an equal-frequency split.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::config;
use crate::features::quantile::{bucket_for, equal_frequency_probs, quantile_edges, weighted_mean};
use crate::features::types::{HeatmapAggregate, HeatmapRow, SectionRecord, SectionVotes};

/// Fixed color scale of the population-share heatmap, in percent.
const POPULATION_SHARE_SCALE: (f64, f64) = (5.0, 20.0);

/// Inner join of election vote shares with the census slice of one period.
///
/// Row order follows the election table. Every matched section must carry
/// income, pct_ext, population and population_share.
pub fn heatmap_join(
    records: &[SectionRecord],
    votes: &[SectionVotes],
    year: i32,
) -> Result<Vec<HeatmapRow>> {
    let census: HashMap<&str, &SectionRecord> = records
        .iter()
        .filter(|r| r.periodo == year)
        .map(|r| (r.key_seccion.as_str(), r))
        .collect();

    let mut rows = Vec::new();
    for section in votes {
        let Some(record) = census.get(section.key_seccion.as_str()) else {
            continue;
        };
        rows.push(HeatmapRow {
            key_seccion: section.key_seccion.clone(),
            income: record.require(config::COL_HOUSEHOLD_INCOME)?,
            pct_ext: record.require(config::COL_PCT_EXT)?,
            population: record.require(config::COL_POPULATION)?,
            population_share: record.require(config::COL_POPULATION_SHARE)?,
            shares: section.shares.clone(),
        });
    }
    debug!(
        "heatmap join matched {} of {} election sections for period {year}",
        rows.len(),
        votes.len()
    );
    Ok(rows)
}

fn target_value(row: &HeatmapRow, target: &str) -> Result<f64> {
    if target == config::COL_PCT_EXT {
        return Ok(row.pct_ext);
    }
    if target == config::COL_POPULATION_SHARE {
        return Ok(row.population_share);
    }
    row.shares.get(target).copied().with_context(|| {
        format!("unknown heatmap target {target:?} for section {}", row.key_seccion)
    })
}

/// Aggregates `target` over a bins × bins income/immigration grid.
///
/// `population_share` cells are plain sums rendered on the fixed
/// [`POPULATION_SHARE_SCALE`]; every other target is a population-weighted
/// mean, with the color scale spanning the P25–P75 range of the raw
/// target values. Cells without sections are `None`. Fails on an empty
/// join, an unknown target and a populated cell with zero total weight.
pub fn heatmap_aggregate(
    rows: &[HeatmapRow],
    target: &str,
    bins: usize,
) -> Result<HeatmapAggregate> {
    if rows.is_empty() {
        bail!("no joined sections to aggregate for target {target:?}");
    }
    if bins == 0 {
        bail!("heatmap needs at least one bin per axis");
    }

    // 3 bins keep the quartile cut points of the original layout
    let probs = if bins == 3 { vec![0.25, 0.75] } else { equal_frequency_probs(bins) };

    let incomes: Vec<f64> = rows.iter().map(|r| r.income).collect();
    let pcts: Vec<f64> = rows.iter().map(|r| r.pct_ext).collect();
    let income_edges = quantile_edges(&incomes, &probs)?;
    let pct_edges = quantile_edges(&pcts, &probs)?;

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        values.push(target_value(row, target)?);
    }

    let mut cells: Vec<Vec<(Vec<f64>, Vec<f64>)>> = vec![vec![(Vec::new(), Vec::new()); bins]; bins];
    for (row, value) in rows.iter().zip(&values) {
        let income_bin = bucket_for(row.income, &income_edges);
        let pct_bin = bucket_for(row.pct_ext, &pct_edges);
        let (cell_values, cell_weights) = &mut cells[income_bin][pct_bin];
        cell_values.push(*value);
        cell_weights.push(row.population);
    }

    let sums = target == config::COL_POPULATION_SHARE;
    let mut matrix = Vec::with_capacity(bins);
    for (income_bin, bin_row) in cells.into_iter().enumerate() {
        let mut out = Vec::with_capacity(bins);
        for (pct_bin, (cell_values, cell_weights)) in bin_row.into_iter().enumerate() {
            if cell_values.is_empty() {
                out.push(None);
                continue;
            }
            let value = if sums {
                cell_values.iter().sum()
            } else {
                weighted_mean(&cell_values, &cell_weights).with_context(|| {
                    format!("heatmap cell ({income_bin}, {pct_bin}) of target {target:?}")
                })?
            };
            out.push(Some(value));
        }
        matrix.push(out);
    }

    let (v_min, v_max) = if sums {
        POPULATION_SHARE_SCALE
    } else {
        let scale = quantile_edges(&values, &[0.25, 0.75])?;
        (scale[0], scale[1])
    };

    Ok(HeatmapAggregate {
        target: target.to_string(),
        cells: matrix,
        v_min,
        v_max,
    })
}
