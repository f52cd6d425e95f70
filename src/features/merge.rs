//! Pivot of the three cleaned census sources into one wide table.
//!
//! Each source goes long → wide on its indicator column, then the three
//! are inner-joined on (section, period). The derived `pct_ext` and
//! `population_share` columns are added here, before imputation, so
//! missing birth-country counts propagate as missing percentages.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use tracing::debug;

use crate::config;
use crate::features::quantile::round2;
use crate::features::types::{CensusObservation, SectionRecord};

/// One source pivoted wide: (section, period) → indicator values.
struct PivotedTable {
    columns: BTreeSet<String>,
    rows: BTreeMap<(String, i32), PivotedRow>,
}

struct PivotedRow {
    municipio: Option<String>,
    values: BTreeMap<String, Option<f64>>,
}

fn pivot(source: &str, observations: Vec<CensusObservation>) -> Result<PivotedTable> {
    let mut columns = BTreeSet::new();
    let mut rows: BTreeMap<(String, i32), PivotedRow> = BTreeMap::new();
    for obs in observations {
        columns.insert(obs.indicator.clone());
        let row = rows
            .entry((obs.key_seccion.clone(), obs.periodo))
            .or_insert_with(|| PivotedRow { municipio: None, values: BTreeMap::new() });
        if row.municipio.is_none() {
            row.municipio = obs.municipio;
        }
        if row.values.insert(obs.indicator.clone(), obs.total).is_some() {
            bail!(
                "duplicate {source} observation for section {} period {} indicator {:?}",
                obs.key_seccion,
                obs.periodo,
                obs.indicator
            );
        }
    }
    // every pivoted row carries every column of its source
    for row in rows.values_mut() {
        for column in &columns {
            row.values.entry(column.clone()).or_insert(None);
        }
    }
    Ok(PivotedTable { columns, rows })
}

/// Merges the cleaned income, demography and birth-country observations
/// into wide per-section records.
///
/// The join is inner on (section, period); the municipality name rides
/// along from the income source. `Renta neta media por hogar` is renamed
/// to its snake_case form, `pct_ext` is the rounded foreign-born share of
/// the birth-country counts and `population_share` each section's share of
/// the summed population across *all* periods. Fails when an indicator
/// appears in two sources, when the income or birth-country columns are
/// absent, on a zero birth-country denominator, and on a zero total
/// population.
pub fn merge_census_tables(
    income: Vec<CensusObservation>,
    demography: Vec<CensusObservation>,
    origin: Vec<CensusObservation>,
) -> Result<Vec<SectionRecord>> {
    let income = pivot("income", income)?;
    let demography = pivot("demography", demography)?;
    let origin = pivot("birth-country", origin)?;

    for (a, b, a_name, b_name) in [
        (&income.columns, &demography.columns, "income", "demography"),
        (&income.columns, &origin.columns, "income", "birth-country"),
        (&demography.columns, &origin.columns, "demography", "birth-country"),
    ] {
        if let Some(column) = a.intersection(b).next() {
            bail!("indicator {column:?} appears in both the {a_name} and {b_name} extracts");
        }
    }

    let mut columns: BTreeSet<&str> = BTreeSet::new();
    columns.extend(income.columns.iter().map(String::as_str));
    columns.extend(demography.columns.iter().map(String::as_str));
    columns.extend(origin.columns.iter().map(String::as_str));
    if !columns.contains(config::COL_HOUSEHOLD_INCOME_RAW) {
        bail!("income variables for the analysis are missing, check the merge step");
    }
    if !columns.contains(config::COL_FOREIGN_BORN) || !columns.contains(config::COL_NATIVE_BORN) {
        bail!("demographic variables for the analysis are missing, check the merge step");
    }
    if !columns.contains(config::COL_POPULATION) {
        bail!("column {:?} is missing, check the merge step", config::COL_POPULATION);
    }

    let mut records = Vec::new();
    for ((key_seccion, periodo), income_row) in income.rows {
        let Some(demography_row) = demography.rows.get(&(key_seccion.clone(), periodo)) else {
            continue;
        };
        let Some(origin_row) = origin.rows.get(&(key_seccion.clone(), periodo)) else {
            continue;
        };

        let mut values = income_row.values;
        for (column, value) in &demography_row.values {
            values.insert(column.clone(), *value);
        }
        for (column, value) in &origin_row.values {
            values.insert(column.clone(), *value);
        }

        if let Some(value) = values.remove(config::COL_HOUSEHOLD_INCOME_RAW) {
            values.insert(config::COL_HOUSEHOLD_INCOME.to_string(), value);
        }

        let foreign = values.get(config::COL_FOREIGN_BORN).copied().flatten();
        let native = values.get(config::COL_NATIVE_BORN).copied().flatten();
        let pct_ext = match (foreign, native) {
            (Some(foreign), Some(native)) => {
                let total = foreign + native;
                if total == 0.0 {
                    bail!(
                        "section {key_seccion} period {periodo} has zero population by birth country"
                    );
                }
                Some(round2(100.0 * foreign / total))
            }
            _ => None,
        };
        values.insert(config::COL_PCT_EXT.to_string(), pct_ext);

        records.push(SectionRecord {
            municipio: income_row.municipio,
            key_seccion,
            periodo,
            values,
        });
    }

    let total_population: f64 = records
        .iter()
        .filter_map(|r| r.value(config::COL_POPULATION))
        .sum();
    if total_population == 0.0 {
        bail!("total population across the merged records is zero");
    }
    for record in &mut records {
        let share = record
            .value(config::COL_POPULATION)
            .map(|p| 100.0 * p / total_population);
        record.values.insert(config::COL_POPULATION_SHARE.to_string(), share);
    }

    debug!(
        rows = records.len(),
        columns = columns.len(),
        "merged census sources into section records"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const S1: &str = "2807901001";
    const S2: &str = "2807901002";

    fn obs(key: &str, periodo: i32, indicator: &str, total: Option<f64>) -> CensusObservation {
        CensusObservation {
            municipio: Some("Madrid".to_string()),
            key_seccion: key.to_string(),
            periodo,
            indicator: indicator.to_string(),
            total,
        }
    }

    fn income_obs(key: &str, periodo: i32, total: Option<f64>) -> CensusObservation {
        obs(key, periodo, "Renta neta media por hogar", total)
    }

    fn base_sources(
        key: &str,
        periodo: i32,
    ) -> (Vec<CensusObservation>, Vec<CensusObservation>, Vec<CensusObservation>) {
        (
            vec![income_obs(key, periodo, Some(30000.0))],
            vec![obs(key, periodo, "Población", Some(1000.0))],
            vec![
                obs(key, periodo, "Extranjero", Some(200.0)),
                obs(key, periodo, "España", Some(800.0)),
            ],
        )
    }

    #[test]
    fn test_merge_renames_income_and_derives_pct_ext() {
        let (income, demography, origin) = base_sources(S1, 2023);
        let records = merge_census_tables(income, demography, origin).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.municipio.as_deref(), Some("Madrid"));
        assert!(!record.values.contains_key("Renta neta media por hogar"));
        assert_eq!(record.value(config::COL_HOUSEHOLD_INCOME), Some(30000.0));
        assert_eq!(record.value(config::COL_PCT_EXT), Some(20.0));
        assert_eq!(record.value(config::COL_POPULATION_SHARE), Some(100.0));
    }

    #[test]
    fn test_merge_is_inner_on_section_and_period() {
        let (mut income, mut demography, origin) = base_sources(S1, 2023);
        // S2 exists in income and demography but not in the birth-country file
        income.push(income_obs(S2, 2023, Some(20000.0)));
        demography.push(obs(S2, 2023, "Población", Some(500.0)));

        let records = merge_census_tables(income, demography, origin).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key_seccion, S1);
    }

    #[test]
    fn test_population_share_spans_all_periods() {
        let (mut income, mut demography, mut origin) = base_sources(S1, 2021);
        let (income_23, demography_23, origin_23) = base_sources(S1, 2023);
        income.extend(income_23);
        demography.extend(demography_23);
        origin.extend(origin_23);
        demography[0].total = Some(1000.0);
        demography[1].total = Some(3000.0);

        let records = merge_census_tables(income, demography, origin).unwrap();
        assert_eq!(records.len(), 2);
        let share_2021 = records
            .iter()
            .find(|r| r.periodo == 2021)
            .and_then(|r| r.value(config::COL_POPULATION_SHARE));
        let share_2023 = records
            .iter()
            .find(|r| r.periodo == 2023)
            .and_then(|r| r.value(config::COL_POPULATION_SHARE));
        assert_eq!(share_2021, Some(25.0));
        assert_eq!(share_2023, Some(75.0));
    }

    #[test]
    fn test_missing_birth_counts_leave_pct_ext_missing() {
        let (income, demography, mut origin) = base_sources(S1, 2023);
        origin[0].total = None; // suppressed Extranjero count

        let records = merge_census_tables(income, demography, origin).unwrap();
        assert_eq!(records[0].value(config::COL_PCT_EXT), None);
        assert_eq!(records[0].values.get(config::COL_PCT_EXT), Some(&None));
    }

    #[test]
    fn test_pivot_fills_unobserved_indicators_per_source() {
        let (mut income, mut demography, mut origin) = base_sources(S1, 2023);
        let (income_2, demography_2, origin_2) = base_sources(S2, 2023);
        income.extend(income_2);
        demography.extend(demography_2);
        origin.extend(origin_2);
        // only S2 carries the per-person income indicator
        income.push(obs(S2, 2023, "Renta neta media por persona", Some(12000.0)));

        let records = merge_census_tables(income, demography, origin).unwrap();
        let s1 = records.iter().find(|r| r.key_seccion == S1).unwrap();
        assert_eq!(s1.values.get("Renta neta media por persona"), Some(&None));
    }

    #[test]
    fn test_missing_income_column_fails() {
        let (_, demography, origin) = base_sources(S1, 2023);
        let income = vec![obs(S1, 2023, "Renta neta media por persona", Some(12000.0))];
        let err = merge_census_tables(income, demography, origin).unwrap_err();
        assert!(err.to_string().contains("income variables"));
    }

    #[test]
    fn test_missing_birth_country_column_fails() {
        let (income, demography, _) = base_sources(S1, 2023);
        let origin = vec![obs(S1, 2023, "Extranjero", Some(200.0))];
        let err = merge_census_tables(income, demography, origin).unwrap_err();
        assert!(err.to_string().contains("demographic variables"));
    }

    #[test]
    fn test_duplicate_observation_fails() {
        let (mut income, demography, origin) = base_sources(S1, 2023);
        income.push(income_obs(S1, 2023, Some(31000.0)));
        let err = merge_census_tables(income, demography, origin).unwrap_err();
        assert!(err.to_string().contains("duplicate income observation"));
    }

    #[test]
    fn test_cross_source_indicator_collision_fails() {
        let (income, mut demography, origin) = base_sources(S1, 2023);
        demography.push(obs(S1, 2023, "Extranjero", Some(5.0)));
        let err = merge_census_tables(income, demography, origin).unwrap_err();
        assert!(err.to_string().contains("appears in both"));
    }

    #[test]
    fn test_zero_birth_country_denominator_fails() {
        let (income, demography, mut origin) = base_sources(S1, 2023);
        origin[0].total = Some(0.0);
        origin[1].total = Some(0.0);
        let err = merge_census_tables(income, demography, origin).unwrap_err();
        assert!(err.to_string().contains("zero population by birth country"));
    }
}
