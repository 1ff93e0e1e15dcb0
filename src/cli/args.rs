use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "aq-forecast")]
#[command(about = "Daily PM2.5 forecasting pipeline: feature ingestion, training and batch inference")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        help = "Settings file (TOML/JSON/YAML); AQF_* environment variables override it"
    )]
    pub settings: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Hide progress bars")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load historical weather and observed PM2.5 into the feature store
    Backfill {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,

        #[arg(long, help = "Last day to backfill [default: today]")]
        end_date: Option<NaiveDate>,
    },

    /// Add yesterday's weather, the weather forecast and the PM2.5 forecast
    Daily {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,

        #[arg(long, help = "Also re-read the observed PM2.5 CSV exports")]
        refresh_observed: bool,
    },

    /// Train and register a new model version
    Train {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,

        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },

    /// Predict PM2.5 for the recent window and the forecast horizon
    Predict {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,

        #[arg(long, help = "Run date [default: today]")]
        run_date: Option<NaiveDate>,

        #[arg(
            short,
            long,
            help = "Predictions CSV path [default: <artifacts_dir>/predictions.csv]"
        )]
        output: Option<PathBuf>,
    },

    /// Write the latest forecast, re-anchored on the run date
    Forecast {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,

        #[arg(long, help = "Run date [default: today]")]
        run_date: Option<NaiveDate>,

        #[arg(long, help = "Days ahead [default: the city's forecast_days]")]
        days: Option<u32>,
    },

    /// Compare past next-day predictions with observed PM2.5
    Hindcast {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,

        #[arg(long, help = "Run date [default: today]")]
        run_date: Option<NaiveDate>,
    },

    /// Show row counts and date ranges of the stored datasets
    Inspect {
        #[arg(short, long, help = "City configuration document")]
        city_config: PathBuf,
    },
}

impl Commands {
    pub fn city_config(&self) -> &Path {
        match self {
            Commands::Backfill { city_config, .. }
            | Commands::Daily { city_config, .. }
            | Commands::Train { city_config, .. }
            | Commands::Predict { city_config, .. }
            | Commands::Forecast { city_config, .. }
            | Commands::Hindcast { city_config, .. }
            | Commands::Inspect { city_config } => city_config,
        }
    }
}
