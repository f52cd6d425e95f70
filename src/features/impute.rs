//! Two-tier imputation of missing cells in the merged section table.
//!
//! Works one period at a time: sections without a population count are
//! dropped, then every column with gaps is filled from the mean of its
//! municipality, falling back to the period-wide mean rounded to a whole
//! number. Means are always taken over the original values, never over
//! already-filled ones.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config;
use crate::features::quantile::mean;
use crate::features::types::SectionRecord;

/// Imputes missing values per reporting period and returns the surviving
/// records, earlier period first. Records outside [`config::PERIODS`] are
/// dropped. A column with no values at all in a period is left missing.
pub fn impute_missing(records: Vec<SectionRecord>) -> Vec<SectionRecord> {
    let mut by_period: BTreeMap<i32, Vec<SectionRecord>> = BTreeMap::new();
    for record in records {
        by_period.entry(record.periodo).or_default().push(record);
    }

    let mut imputed = Vec::new();
    for period in config::PERIODS {
        let Some(year_records) = by_period.remove(&period) else {
            continue;
        };
        let mut year_records: Vec<SectionRecord> = year_records
            .into_iter()
            .filter(|r| r.value(config::COL_POPULATION).is_some())
            .collect();
        debug!(
            "period {period}: {} records after dropping sections without population",
            year_records.len()
        );
        fill_period(period, &mut year_records);
        imputed.extend(year_records);
    }
    imputed
}

fn fill_period(period: i32, records: &mut [SectionRecord]) {
    let columns: BTreeSet<String> =
        records.iter().flat_map(|r| r.values.keys().cloned()).collect();

    for column in &columns {
        let missing = records.iter().filter(|r| r.value(column).is_none()).count();
        if missing == 0 {
            continue;
        }

        // aggregate the original values before any filling happens
        let mut by_municipio: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut observed = Vec::new();
        for record in records.iter() {
            if let Some(value) = record.value(column) {
                if let Some(municipio) = &record.municipio {
                    let entry = by_municipio.entry(municipio.clone()).or_insert((0.0, 0));
                    entry.0 += value;
                    entry.1 += 1;
                }
                observed.push(value);
            }
        }
        if observed.is_empty() {
            warn!("period {period}: column {column:?} has no values at all, left missing");
            continue;
        }
        let global_mean = mean(&observed).round();

        for record in records.iter_mut() {
            if record.value(column).is_some() {
                continue;
            }
            let municipality_mean = record
                .municipio
                .as_ref()
                .and_then(|m| by_municipio.get(m))
                .map(|(sum, count)| sum / *count as f64);
            let fill = municipality_mean.unwrap_or(global_mean);
            record.values.insert(column.clone(), Some(fill));
        }
    }

    for column in &columns {
        let missing = records.iter().filter(|r| r.value(column).is_none()).count();
        if missing > 0 {
            warn!(
                "period {period}: column {column:?} still has {missing} missing values after imputation"
            );
        }
    }
}
