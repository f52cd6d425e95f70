//! Change in foreign-born population by income bucket.
//!
//! Sections are bucketed by an equal-frequency split of their later-period
//! household income; earlier-period sections inherit the bucket of the
//! same section key (inner join, so sections absent from the later period
//! drop out). The per-bucket and overall deltas compare the foreign-born
//! headcounts between the two periods.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::config;
use crate::features::quantile::{bucket_for, equal_frequency_probs, quantile_edges};
use crate::features::types::{EvolutionAggregate, EvolutionBucket, SectionRecord};

/// Foreign-born headcount of a section: population × pct_ext / 100.
fn migrants(record: &SectionRecord) -> Result<f64> {
    let population = record.require(config::COL_POPULATION)?;
    let pct_ext = record.require(config::COL_PCT_EXT)?;
    Ok(population * pct_ext / 100.0)
}

/// Builds the evolution aggregate for the requested income distribution.
///
/// An unknown distribution name logs a warning and falls back to
/// [`config::DEFAULT_DISTRIBUTION`]; the name actually used is recorded on
/// the aggregate. Only buckets observed in either period appear in the
/// output. The overall delta compares *all* later-period sections against
/// the earlier-period sections that matched one, mirroring the per-bucket
/// join.
pub fn evolution_aggregate(
    records: &[SectionRecord],
    distribution: &str,
) -> Result<EvolutionAggregate> {
    let (distribution, bucket_count) = match config::distribution_buckets(distribution) {
        Some(count) => (distribution, count),
        None => {
            warn!(
                "distribution {distribution:?} is not available, falling back to {:?}",
                config::DEFAULT_DISTRIBUTION
            );
            let fallback = config::DEFAULT_DISTRIBUTION;
            let count = config::distribution_buckets(fallback)
                .context("default income distribution is not listed")?;
            (fallback, count)
        }
    };
    info!("income distribution for the evolution aggregate: {distribution}");

    let later: Vec<&SectionRecord> = records
        .iter()
        .filter(|r| r.periodo == config::PERIOD_LATER)
        .collect();
    let earlier: Vec<&SectionRecord> = records
        .iter()
        .filter(|r| r.periodo == config::PERIOD_EARLIER)
        .collect();

    let mut incomes = Vec::with_capacity(later.len());
    for record in &later {
        incomes.push(record.require(config::COL_HOUSEHOLD_INCOME)?);
    }
    let edges = quantile_edges(&incomes, &equal_frequency_probs(bucket_count))
        .with_context(|| format!("cannot bucket period {} incomes", config::PERIOD_LATER))?;
    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        bail!("income quantile edges are not unique for distribution {distribution:?}");
    }

    let mut bucket_of: HashMap<&str, usize> = HashMap::with_capacity(later.len());
    let mut later_by_bucket: BTreeMap<usize, f64> = BTreeMap::new();
    let mut later_total = 0.0;
    for (record, income) in later.iter().zip(&incomes) {
        let bucket = bucket_for(*income, &edges);
        if bucket_of.insert(record.key_seccion.as_str(), bucket).is_some() {
            bail!(
                "duplicate period {} record for section {}",
                config::PERIOD_LATER,
                record.key_seccion
            );
        }
        let migrants = migrants(record)?;
        *later_by_bucket.entry(bucket).or_insert(0.0) += migrants;
        later_total += migrants;
    }

    let mut earlier_by_bucket: BTreeMap<usize, f64> = BTreeMap::new();
    let mut earlier_matched_total = 0.0;
    for record in &earlier {
        // inner join: earlier sections inherit the later-period bucket
        let Some(bucket) = bucket_of.get(record.key_seccion.as_str()) else {
            continue;
        };
        let migrants = migrants(record)?;
        *earlier_by_bucket.entry(*bucket).or_insert(0.0) += migrants;
        earlier_matched_total += migrants;
    }

    let observed: BTreeSet<usize> = later_by_bucket
        .keys()
        .chain(earlier_by_bucket.keys())
        .copied()
        .collect();
    let mut buckets = Vec::with_capacity(observed.len());
    for bucket in observed {
        let migrants_2021 = earlier_by_bucket.get(&bucket).copied().unwrap_or(0.0);
        let migrants_2023 = later_by_bucket.get(&bucket).copied().unwrap_or(0.0);
        if migrants_2021 == 0.0 {
            bail!(
                "no period {} foreign-born population in income bucket {bucket}",
                config::PERIOD_EARLIER
            );
        }
        buckets.push(EvolutionBucket {
            bucket,
            migrants_2021,
            migrants_2023,
            delta_pct: 100.0 * (migrants_2023 - migrants_2021) / migrants_2021,
        });
    }

    if earlier_matched_total == 0.0 {
        bail!(
            "no period {} foreign-born population matched the period {} sections",
            config::PERIOD_EARLIER,
            config::PERIOD_LATER
        );
    }
    let overall_delta_pct = 100.0 * (later_total - earlier_matched_total) / earlier_matched_total;

    Ok(EvolutionAggregate {
        distribution: distribution.to_string(),
        buckets,
        overall_delta_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, periodo: i32, income: f64, population: f64, pct_ext: f64) -> SectionRecord {
        let mut values: BTreeMap<String, Option<f64>> = BTreeMap::new();
        values.insert(config::COL_HOUSEHOLD_INCOME.to_string(), Some(income));
        values.insert(config::COL_POPULATION.to_string(), Some(population));
        values.insert(config::COL_PCT_EXT.to_string(), Some(pct_ext));
        SectionRecord {
            municipio: Some("Madrid".to_string()),
            key_seccion: key.to_string(),
            periodo,
            values,
        }
    }

    #[test]
    fn test_quartile_buckets_and_deltas() {
        let records = vec![
            record("2807901001", 2023, 20000.0, 1000.0, 20.0),
            record("2807901002", 2023, 30000.0, 1000.0, 10.0),
            record("2807901003", 2023, 40000.0, 1000.0, 5.0),
            record("2807901001", 2021, 19000.0, 1000.0, 10.0),
            record("2807901002", 2021, 29000.0, 1000.0, 8.0),
            record("2807901003", 2021, 39000.0, 1000.0, 4.0),
        ];
        let agg = evolution_aggregate(&records, "quartile").unwrap();
        assert_eq!(agg.distribution, "quartile");
        assert_eq!(
            agg.buckets,
            vec![
                EvolutionBucket { bucket: 0, migrants_2021: 100.0, migrants_2023: 200.0, delta_pct: 100.0 },
                EvolutionBucket { bucket: 1, migrants_2021: 80.0, migrants_2023: 100.0, delta_pct: 25.0 },
                EvolutionBucket { bucket: 3, migrants_2021: 40.0, migrants_2023: 50.0, delta_pct: 25.0 },
            ]
        );
        assert!((agg.overall_delta_pct - 100.0 * 130.0 / 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_distribution_falls_back() {
        let mut records = Vec::new();
        for i in 0..40 {
            let key = format!("28079010{i:02}");
            records.push(record(&key, 2023, 1000.0 * (i + 1) as f64, 1000.0, 10.0));
            records.push(record(&key, 2021, 900.0 * (i + 1) as f64, 1000.0, 5.0));
        }
        let agg = evolution_aggregate(&records, "unknown_dist").unwrap();
        assert_eq!(agg.distribution, config::DEFAULT_DISTRIBUTION);
        assert_eq!(agg, evolution_aggregate(&records, "ventile").unwrap());
        // 40 distinct incomes over 20 buckets: every bucket observed
        assert_eq!(agg.buckets.len(), 20);
        let buckets: Vec<usize> = agg.buckets.iter().map(|b| b.bucket).collect();
        assert_eq!(buckets, (0..20).collect::<Vec<usize>>());
    }

    #[test]
    fn test_bucket_sums_match_totals_when_fully_matched() {
        let records = vec![
            record("2807901001", 2023, 20000.0, 1000.0, 20.0),
            record("2807901002", 2023, 30000.0, 1000.0, 10.0),
            record("2807901003", 2023, 40000.0, 1000.0, 5.0),
            record("2807901001", 2021, 19000.0, 1000.0, 10.0),
            record("2807901002", 2021, 29000.0, 1000.0, 8.0),
            record("2807901003", 2021, 39000.0, 1000.0, 4.0),
        ];
        let agg = evolution_aggregate(&records, "quartile").unwrap();
        let sum_23: f64 = agg.buckets.iter().map(|b| b.migrants_2023).sum();
        let sum_21: f64 = agg.buckets.iter().map(|b| b.migrants_2021).sum();
        let recomputed = 100.0 * (sum_23 - sum_21) / sum_21;
        assert!((agg.overall_delta_pct - recomputed).abs() < 1e-9);
    }

    #[test]
    fn test_unmatched_sections_and_overall_asymmetry() {
        let mut records = vec![
            record("2807901001", 2023, 10.0, 1000.0, 2.0),
            record("2807901002", 2023, 20.0, 1000.0, 2.0),
            record("2807901003", 2023, 30.0, 1000.0, 2.0),
            record("2807901004", 2023, 50.0, 1000.0, 2.0),
            // no 2021 counterpart, shares bucket 2 with ...004
            record("2807901005", 2023, 50.0, 1000.0, 2.0),
        ];
        for key in ["2807901001", "2807901002", "2807901003", "2807901004"] {
            records.push(record(key, 2021, 1.0, 1000.0, 1.0));
        }
        // 2021-only section, never joined
        records.push(record("2807901099", 2021, 1.0, 1000.0, 50.0));

        let agg = evolution_aggregate(&records, "quartile").unwrap();
        let buckets: Vec<usize> = agg.buckets.iter().map(|b| b.bucket).collect();
        assert_eq!(buckets, vec![0, 1, 2]);

        let shared = agg.buckets.iter().find(|b| b.bucket == 2).unwrap();
        assert_eq!(shared.migrants_2021, 10.0);
        assert_eq!(shared.migrants_2023, 40.0);
        assert_eq!(shared.delta_pct, 300.0);

        // all five 2023 sections count, only the four matched 2021 ones do
        assert_eq!(agg.overall_delta_pct, 100.0 * (100.0 - 40.0) / 40.0);
    }

    #[test]
    fn test_bucket_without_earlier_population_fails() {
        let records = vec![
            record("2807901001", 2023, 10.0, 1000.0, 2.0),
            record("2807901002", 2023, 20.0, 1000.0, 2.0),
            record("2807901003", 2023, 30.0, 1000.0, 2.0),
            record("2807901004", 2023, 40.0, 1000.0, 2.0),
            record("2807901001", 2021, 10.0, 1000.0, 0.0),
            record("2807901002", 2021, 20.0, 1000.0, 0.0),
            record("2807901003", 2021, 30.0, 1000.0, 0.0),
            record("2807901004", 2021, 40.0, 1000.0, 0.0),
        ];
        let err = evolution_aggregate(&records, "quartile").unwrap_err();
        assert!(err.to_string().contains("income bucket"));
    }

    #[test]
    fn test_identical_incomes_fail_on_duplicate_edges() {
        let records = vec![
            record("2807901001", 2023, 30000.0, 1000.0, 10.0),
            record("2807901002", 2023, 30000.0, 1000.0, 10.0),
            record("2807901003", 2023, 30000.0, 1000.0, 10.0),
            record("2807901001", 2021, 30000.0, 1000.0, 5.0),
        ];
        let err = evolution_aggregate(&records, "quartile").unwrap_err();
        assert!(err.to_string().contains("not unique"));
    }

    #[test]
    fn test_duplicate_later_section_fails() {
        let records = vec![
            record("2807901001", 2023, 10000.0, 1000.0, 10.0),
            record("2807901001", 2023, 20000.0, 1000.0, 10.0),
        ];
        let err = evolution_aggregate(&records, "quartile").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_missing_income_fails() {
        let mut broken = record("2807901001", 2023, 0.0, 1000.0, 10.0);
        broken.values.insert(config::COL_HOUSEHOLD_INCOME.to_string(), None);
        let err = evolution_aggregate(&[broken], "quartile").unwrap_err();
        assert!(err.to_string().contains(config::COL_HOUSEHOLD_INCOME));
    }

    #[test]
    fn test_empty_later_period_fails() {
        let records = vec![record("2807901001", 2021, 10000.0, 1000.0, 10.0)];
        assert!(evolution_aggregate(&records, "quartile").is_err());
    }
}
