//! Reading of the delimited input extracts.

use std::fs::File;
use std::io::Read;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use tracing::info;

use crate::config::Settings;
use crate::features::types::{RawCensusRow, RawCensusTable, RawElectionRow};

/// The four raw input tables, exactly as read from disk.
#[derive(Debug)]
pub struct RawTables {
    pub income: RawCensusTable,
    pub demography: RawCensusTable,
    pub origin: RawCensusTable,
    pub elections: Vec<RawElectionRow>,
}

/// Loads the four extracts from `settings.data_dir`.
///
/// Fails up front when the directory is absent, before opening any file.
pub fn load_tables(settings: &Settings) -> Result<RawTables> {
    if !settings.data_dir.is_dir() {
        bail!(
            "data directory {} has not been found, check your cwd",
            settings.data_dir.display()
        );
    }
    info!("reading extracts from {}", settings.data_dir.display());

    Ok(RawTables {
        income: read_census_file(settings, &settings.income_file)?,
        demography: read_census_file(settings, &settings.demography_file)?,
        origin: read_census_file(settings, &settings.origin_file)?,
        elections: read_election_file(settings, &settings.elections_file)?,
    })
}

fn read_census_file(settings: &Settings, base_name: &str) -> Result<RawCensusTable> {
    let path = settings.input_path(base_name);
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    read_census_table(file, settings.separator)
        .with_context(|| format!("reading {}", path.display()))
}

fn read_election_file(settings: &Settings, base_name: &str) -> Result<Vec<RawElectionRow>> {
    let path = settings.input_path(base_name);
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    read_election_table(file, settings.separator)
        .with_context(|| format!("reading {}", path.display()))
}

/// Parses one census extract. The header record is kept alongside the rows
/// so cleaning can branch on column presence.
pub fn read_census_table<R: Read>(reader: R, separator: u8) -> Result<RawCensusTable> {
    let mut csv_reader = ReaderBuilder::new().delimiter(separator).from_reader(reader);
    let headers = csv_reader.headers()?.iter().map(str::to_string).collect();
    let mut rows: Vec<RawCensusRow> = Vec::new();
    for row in csv_reader.deserialize() {
        rows.push(row?);
    }
    Ok(RawCensusTable { headers, rows })
}

/// Parses the election extract into typed rows.
pub fn read_election_table<R: Read>(reader: R, separator: u8) -> Result<Vec<RawElectionRow>> {
    let mut csv_reader = ReaderBuilder::new().delimiter(separator).from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
