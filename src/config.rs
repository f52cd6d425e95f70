//! Process-start configuration: input/output layout and the fixed lookup
//! tables the pipeline consults.
//!
//! Everything here is decided before the first file is opened; there is no
//! runtime reconfiguration.

use std::path::PathBuf;

/// Reporting periods compared by the pipeline, in concatenation order.
pub const PERIODS: [i32; 2] = [PERIOD_EARLIER, PERIOD_LATER];
pub const PERIOD_EARLIER: i32 = 2021;
pub const PERIOD_LATER: i32 = 2023;

/// Column names of the merged section table. The Spanish labels are the
/// literal INE headers; the snake_case ones are derived by the pipeline.
pub const COL_POPULATION: &str = "Población";
pub const COL_FOREIGN_BORN: &str = "Extranjero";
pub const COL_NATIVE_BORN: &str = "España";
pub const COL_HOUSEHOLD_INCOME_RAW: &str = "Renta neta media por hogar";
pub const COL_HOUSEHOLD_INCOME: &str = "renta_neta_media_hogar";
pub const COL_PCT_EXT: &str = "pct_ext";
pub const COL_POPULATION_SHARE: &str = "population_share";

/// Ideology bucket used when a party label is not listed in [`PARTY_IDEOLOGY`].
pub const OTHER_IDEOLOGY: &str = "Other";

/// Party label (`denominacion`) → ideology bucket for the election extract.
pub static PARTY_IDEOLOGY: &[(&str, &str)] = &[
    ("PSOE", "Left"),
    ("SUMAR", "Left"),
    ("PODEMOS", "Left"),
    ("IU", "Left"),
    ("PP", "Right"),
    ("CS", "Right"),
    ("UPN", "Right"),
    ("VOX", "Far right"),
    ("ERC", "Regionalist"),
    ("JUNTS", "Regionalist"),
    ("EH BILDU", "Regionalist"),
    ("EAJ-PNV", "Regionalist"),
    ("BNG", "Regionalist"),
    ("CUP", "Regionalist"),
];

/// Distribution name → number of equal-frequency income buckets.
pub static INCOME_DISTRIBUTIONS: &[(&str, usize)] = &[
    ("quartile", 4),
    ("quintile", 5),
    ("decile", 10),
    ("ventile", 20),
];

/// Distribution substituted when an unknown name is requested.
pub const DEFAULT_DISTRIBUTION: &str = "ventile";

/// Heatmap target column → (palette name, display label). One image is
/// rendered per entry.
pub static HEATMAP_TARGETS: &[(&str, &str, &str)] = &[
    ("Far right", "reds", "Far-right vote share (%)"),
    ("Left", "blues", "Left vote share (%)"),
    ("population_share", "viridis", "Population share (%)"),
];

/// Two-digit province prefixes of `key_seccion` covered by each optional
/// exclusion set.
pub static CATALONIA_PROVINCES: &[&str] = &["08", "17", "25", "43"];
pub static BASQUE_PROVINCES: &[&str] = &["01", "20", "48"];

/// Looks up the bucket count for a distribution name.
pub fn distribution_buckets(name: &str) -> Option<usize> {
    INCOME_DISTRIBUTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, buckets)| *buckets)
}

/// Looks up the (palette, display label) pair for a heatmap target column.
pub fn heatmap_target(column: &str) -> Option<(&'static str, &'static str)> {
    HEATMAP_TARGETS
        .iter()
        .find(|(c, _, _)| *c == column)
        .map(|(_, palette, label)| (*palette, *label))
}

/// Everything fixed at process start. Built from CLI options in `main`;
/// the defaults match the standard repository layout.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub plots_dir: PathBuf,
    /// Field separator byte of the delimited extracts.
    pub separator: u8,
    /// File extension of the extracts, including the dot.
    pub extension: String,
    pub income_file: String,
    pub demography_file: String,
    pub origin_file: String,
    pub elections_file: String,
    /// Census period joined against the election table for the heatmaps.
    pub election_year: i32,
    pub exclude_catalonia: bool,
    pub exclude_basque: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("assets/data"),
            plots_dir: PathBuf::from("assets/plots"),
            separator: b';',
            extension: ".csv".to_string(),
            income_file: "renta_por_seccion".to_string(),
            demography_file: "indicadores_demograficos".to_string(),
            origin_file: "poblacion_por_nacimiento".to_string(),
            elections_file: "resultados_elecciones".to_string(),
            election_year: PERIOD_LATER,
            exclude_catalonia: false,
            exclude_basque: false,
        }
    }
}

impl Settings {
    /// Full path of one input extract: directory + base name + extension.
    pub fn input_path(&self, base_name: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}", base_name, self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_lookup() {
        assert_eq!(distribution_buckets("ventile"), Some(20));
        assert_eq!(distribution_buckets("decile"), Some(10));
        assert_eq!(distribution_buckets("unknown_dist"), None);
    }

    #[test]
    fn test_heatmap_target_lookup() {
        let (palette, label) = heatmap_target("population_share").unwrap();
        assert_eq!(palette, "viridis");
        assert!(label.contains("Population"));
        assert!(heatmap_target("no_such_column").is_none());
    }

    #[test]
    fn test_province_prefixes_are_two_digits() {
        for prefix in CATALONIA_PROVINCES.iter().chain(BASQUE_PROVINCES) {
            assert_eq!(prefix.len(), 2);
            assert!(prefix.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_input_path_joins_name_and_extension() {
        let settings = Settings::default();
        let path = settings.input_path("renta_por_seccion");
        assert!(path.ends_with("renta_por_seccion.csv"));
    }
}
