//! Cleaning of the raw INE extracts and the election results table.
//!
//! Census tables come in two layouts: the standard one carries a
//! `Distritos` column, the birth-country extract replaces it with
//! education/birth-country columns and repeats section totals we must
//! filter out. Both end up as long-format [`CensusObservation`]s keyed by
//! the 10-character section code.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::config::{self, Settings};
use crate::features::quantile::round2;
use crate::features::types::{CensusObservation, RawCensusTable, RawElectionRow, SectionVotes};

/// Cleans one census extract into long-format observations.
///
/// Rows without a section code (aggregate rows) are dropped, `Total` cells
/// are parsed from Spanish number formatting, and the optional province
/// exclusions are applied on the key prefix. Fails on section codes shorter
/// than the 10-character key and on totals that are neither suppressed nor
/// numeric.
pub fn clean_census_table(
    table: RawCensusTable,
    settings: &Settings,
) -> Result<Vec<CensusObservation>> {
    let alternate_layout = !table.has_column("Distritos");
    if settings.exclude_catalonia {
        debug!("filtering out Catalan provinces");
    }
    if settings.exclude_basque {
        debug!("filtering out Basque provinces");
    }

    let mut observations = Vec::with_capacity(table.rows.len());
    for row in table.rows {
        if alternate_layout {
            // Birth-country layout: keep the education total rows only and
            // drop the birth-country grand total, which repeats Población.
            if row.municipios.is_none() || row.secciones.is_none() {
                continue;
            }
            if row.education_level.as_deref() != Some("Total")
                || row.birth_country.as_deref() == Some("Total")
            {
                continue;
            }
        } else if row.distritos.is_none() || row.secciones.is_none() {
            continue;
        }

        let seccion = row.secciones.as_deref().unwrap_or_default();
        if seccion.chars().count() < 10 {
            bail!("section code {seccion:?} is shorter than the 10-character section key");
        }
        let key_seccion: String = seccion.chars().take(10).collect();

        if settings.exclude_catalonia
            && config::CATALONIA_PROVINCES.iter().any(|p| key_seccion.starts_with(p))
        {
            continue;
        }
        if settings.exclude_basque
            && config::BASQUE_PROVINCES.iter().any(|p| key_seccion.starts_with(p))
        {
            continue;
        }

        let total = parse_total(row.total.as_deref()).with_context(|| {
            format!("invalid Total for section {key_seccion} period {}", row.periodo)
        })?;

        let indicator = row
            .income_indicator
            .or(row.demographic_indicator)
            .or(row.birth_country);
        let Some(indicator) = indicator else {
            bail!("section {key_seccion} period {} carries no indicator column", row.periodo);
        };

        observations.push(CensusObservation {
            municipio: row.municipios,
            key_seccion,
            periodo: row.periodo,
            indicator,
            total,
        });
    }

    Ok(observations)
}

/// Parses an INE `Total` cell. A missing cell or a leading '.' marks a
/// suppressed value; otherwise '.' is the thousands separator and ',' the
/// decimal mark.
fn parse_total(raw: Option<&str>) -> Result<Option<f64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('.') {
        return Ok(None);
    }
    let normalized = trimmed.replace('.', "").replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => bail!("unparseable total {raw:?}"),
    }
}

/// Cleans the election extract into per-section ideology vote shares.
///
/// Party labels map to ideology buckets via [`config::PARTY_IDEOLOGY`],
/// unlisted parties count as `Other`. Votes are summed per section ×
/// ideology and converted to percentages of the section total; every
/// section reports the full set of ideologies observed anywhere, with 0.0
/// where it received no votes. Fails on a section with zero total votes.
pub fn clean_election_table(rows: Vec<RawElectionRow>) -> Result<Vec<SectionVotes>> {
    let ideology_of: HashMap<&str, &str> = config::PARTY_IDEOLOGY.iter().copied().collect();

    let mut votes: BTreeMap<String, BTreeMap<&str, u64>> = BTreeMap::new();
    let mut observed: BTreeSet<&str> = BTreeSet::new();
    for row in &rows {
        let key_seccion = election_section_key(row);
        let ideology = ideology_of
            .get(row.denominacion.trim())
            .copied()
            .unwrap_or(config::OTHER_IDEOLOGY);
        observed.insert(ideology);
        *votes.entry(key_seccion).or_default().entry(ideology).or_default() += row.votos;
    }

    let mut sections = Vec::with_capacity(votes.len());
    for (key_seccion, by_ideology) in votes {
        let total: u64 = by_ideology.values().sum();
        if total == 0 {
            bail!("section {key_seccion} has zero recorded votes");
        }
        let mut shares = BTreeMap::new();
        for ideology in &observed {
            let count = by_ideology.get(ideology).copied().unwrap_or(0);
            shares.insert(
                (*ideology).to_string(),
                round2(100.0 * count as f64 / total as f64),
            );
        }
        sections.push(SectionVotes { key_seccion, shares });
    }
    Ok(sections)
}

/// 10-character section key from the four zero-padded administrative codes:
/// province (2) + municipality (3) + district (2) + section (3).
fn election_section_key(row: &RawElectionRow) -> String {
    format!(
        "{:0>2}{:0>3}{:0>2}{:0>3}",
        row.codigo_provincia.trim(),
        row.codigo_municipio.trim(),
        row.codigo_distrito.trim(),
        row.codigo_seccion.trim()
    )
}
