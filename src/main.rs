//! CLI entry point for the INE census × elections chart pipeline.
//!
//! Provides subcommands for the full run and for regenerating the
//! evolution chart or the heatmaps on their own.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use vox_ine_charts::config::Settings;
use vox_ine_charts::pipeline;

#[derive(Parser)]
#[command(name = "vox_ine_charts")]
#[command(about = "Income and immigration charts from INE census and election extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Input and output layout options shared by every subcommand.
#[derive(Args)]
struct DataOpts {
    /// Directory holding the four delimited extracts
    #[arg(long, default_value = "assets/data")]
    data_dir: PathBuf,

    /// Directory the images and tables are written to
    #[arg(long, default_value = "assets/plots")]
    plots_dir: PathBuf,

    /// Field separator of the extracts
    #[arg(long, default_value_t = ';')]
    separator: char,

    /// File extension of the extracts, including the dot
    #[arg(long, default_value = ".csv")]
    extension: String,

    /// Base name of the household income extract
    #[arg(long, default_value = "renta_por_seccion")]
    income_file: String,

    /// Base name of the demographic indicators extract
    #[arg(long, default_value = "indicadores_demograficos")]
    demography_file: String,

    /// Base name of the population-by-birth-country extract
    #[arg(long, default_value = "poblacion_por_nacimiento")]
    origin_file: String,

    /// Base name of the election results extract
    #[arg(long, default_value = "resultados_elecciones")]
    elections_file: String,

    /// Census period joined against the election table
    #[arg(long, default_value_t = 2023)]
    election_year: i32,

    /// Drop sections in the Catalan provinces
    #[arg(long, default_value_t = false)]
    exclude_catalonia: bool,

    /// Drop sections in the Basque provinces
    #[arg(long, default_value_t = false)]
    exclude_basque: bool,
}

impl DataOpts {
    fn settings(&self) -> Settings {
        Settings {
            data_dir: self.data_dir.clone(),
            plots_dir: self.plots_dir.clone(),
            separator: self.separator as u8,
            extension: self.extension.clone(),
            income_file: self.income_file.clone(),
            demography_file: self.demography_file.clone(),
            origin_file: self.origin_file.clone(),
            elections_file: self.elections_file.clone(),
            election_year: self.election_year,
            exclude_catalonia: self.exclude_catalonia,
            exclude_basque: self.exclude_basque,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline: evolution chart, heatmaps and run summary
    Run {
        #[command(flatten)]
        data: DataOpts,

        /// Income distribution for the evolution chart
        #[arg(short, long, default_value = "ventile")]
        distribution: String,

        /// Quantile bins per heatmap axis
        #[arg(short, long, default_value_t = 3)]
        bins: usize,
    },
    /// Regenerate only the evolution chart and table
    Evolution {
        #[command(flatten)]
        data: DataOpts,

        /// Income distribution for the evolution chart
        #[arg(short, long, default_value = "ventile")]
        distribution: String,
    },
    /// Regenerate only the heatmaps
    Heatmap {
        #[command(flatten)]
        data: DataOpts,

        /// Quantile bins per heatmap axis
        #[arg(short, long, default_value_t = 3)]
        bins: usize,

        /// Single target column to render; defaults to every configured one
        #[arg(short, long)]
        target: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/vox_ine_charts.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("vox_ine_charts.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, distribution, bins } => {
            pipeline::run(&data.settings(), &distribution, bins)?;
        }
        Commands::Evolution { data, distribution } => {
            pipeline::run_evolution(&data.settings(), &distribution)?;
        }
        Commands::Heatmap { data, bins, target } => {
            pipeline::run_heatmaps(&data.settings(), bins, target.as_deref())?;
        }
    }

    Ok(())
}
