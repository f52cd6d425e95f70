//! Record types used by the table transforms.
//!
//! Raw rows mirror the input CSV schemas and are deserialized with `serde`;
//! the cleaned and aggregated shapes are what the pipeline stages pass
//! between each other. Each stage owns its output — nothing here is
//! mutated across stage boundaries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One row of an INE section-level extract, exactly as read from disk.
///
/// The three census extracts share this struct: columns that only exist in
/// one layout are `Option` and default to `None` when the header is absent.
/// `Total` stays a string here because INE numbers use Spanish conventions
/// ('.' thousands, ',' decimals, leading '.' for suppressed values) and are
/// parsed during cleaning.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCensusRow {
    #[serde(rename = "Municipios", default)]
    pub municipios: Option<String>,
    #[serde(rename = "Distritos", default)]
    pub distritos: Option<String>,
    #[serde(rename = "Secciones", default)]
    pub secciones: Option<String>,
    #[serde(rename = "Indicadores de renta media", default)]
    pub income_indicator: Option<String>,
    #[serde(rename = "Indicadores demográficos", default)]
    pub demographic_indicator: Option<String>,
    #[serde(rename = "Nivel de formación alcanzado", default)]
    pub education_level: Option<String>,
    #[serde(rename = "País de nacimiento", default)]
    pub birth_country: Option<String>,
    #[serde(rename = "Periodo")]
    pub periodo: i32,
    #[serde(rename = "Total", default)]
    pub total: Option<String>,
}

/// A raw census extract plus its header record, so cleaning can branch on
/// column *presence* rather than value presence.
#[derive(Debug, Clone)]
pub struct RawCensusTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawCensusRow>,
}

impl RawCensusTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

/// One row of the election extract: votes for one party in one section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawElectionRow {
    pub codigo_provincia: String,
    pub codigo_municipio: String,
    pub codigo_distrito: String,
    pub codigo_seccion: String,
    pub denominacion: String,
    pub votos: u64,
}

/// Cleaned long-format census observation: section × period × indicator.
#[derive(Debug, Clone)]
pub struct CensusObservation {
    pub municipio: Option<String>,
    pub key_seccion: String,
    pub periodo: i32,
    pub indicator: String,
    /// Parsed value; `None` for suppressed/absent totals.
    pub total: Option<f64>,
}

/// Per-section ideology vote shares after the election pivot.
///
/// `shares` carries the full set of ideologies observed anywhere in the
/// extract; sections without votes for an ideology hold 0.0. Values are
/// percentages of the section's total votes, rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionVotes {
    pub key_seccion: String,
    pub shares: BTreeMap<String, f64>,
}

/// Wide per-section record, one row per section × period.
///
/// `values` is the union of the pivoted indicator columns from the three
/// census sources plus the derived `pct_ext` and `population_share`
/// columns; `None` marks a missing cell for the imputer to fill.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    pub municipio: Option<String>,
    pub key_seccion: String,
    pub periodo: i32,
    pub values: BTreeMap<String, Option<f64>>,
}

impl SectionRecord {
    /// Value of a column, flattening "column absent" and "cell missing".
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    /// Like [`Self::value`], but a gap is an error naming the section.
    pub fn require(&self, column: &str) -> Result<f64> {
        self.value(column).with_context(|| {
            format!(
                "section {} period {} is missing {column:?}",
                self.key_seccion, self.periodo
            )
        })
    }
}

/// One row of the heatmap join: election shares × the chosen-year census
/// slice, matched on `key_seccion`.
#[derive(Debug, Clone)]
pub struct HeatmapRow {
    pub key_seccion: String,
    pub income: f64,
    pub pct_ext: f64,
    pub population: f64,
    pub population_share: f64,
    pub shares: BTreeMap<String, f64>,
}

/// One income bucket of the evolution aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionBucket {
    pub bucket: usize,
    pub migrants_2021: f64,
    pub migrants_2023: f64,
    /// 100 · (2023 − 2021) / 2021, per bucket.
    pub delta_pct: f64,
}

/// Evolution aggregate: the per-bucket table plus the overall change.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionAggregate {
    /// Distribution actually used, after any fallback; downstream output
    /// names the bucket column `income_<distribution>`.
    pub distribution: String,
    pub buckets: Vec<EvolutionBucket>,
    pub overall_delta_pct: f64,
}

/// Heatmap aggregate: an n×n matrix (rows = income bin, columns =
/// immigration bin, `None` = empty cell) plus the color-scale range.
#[derive(Debug, Clone)]
pub struct HeatmapAggregate {
    pub target: String,
    pub cells: Vec<Vec<Option<f64>>>,
    pub v_min: f64,
    pub v_max: f64,
}

impl HeatmapAggregate {
    pub fn bins(&self) -> usize {
        self.cells.len()
    }
}
