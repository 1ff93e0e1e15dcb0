use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

use crate::cli::args::{Cli, Commands};
use crate::error::{PipelineError, Result};
use crate::pipelines::{self, PipelineContext};
use crate::settings::{CityConfig, Settings};
use crate::utils::progress::ProgressReporter;

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings = Settings::load(cli.settings.as_deref())?;
    let city = CityConfig::load(cli.command.city_config())?;
    let ctx = PipelineContext::open(settings, city)?.with_quiet(cli.quiet);
    let today = ctx.settings.today()?;

    match cli.command {
        Commands::Backfill { end_date, .. } => {
            println!(
                "Backfilling {} ({} sensors)...",
                ctx.city.city_name,
                ctx.city.sensors.len()
            );
            let summary = pipelines::backfill(&ctx, end_date.unwrap_or(today)).await?;
            println!("Backfill complete: {}", summary);
        }

        Commands::Daily {
            refresh_observed, ..
        } => {
            let summary = pipelines::daily(&ctx, today, refresh_observed).await?;
            println!("Daily update for {}: {}", today, summary);
        }

        Commands::Train { threads, .. } => {
            let progress = ProgressReporter::new_spinner("Training model...", ctx.quiet);
            let card = pipelines::train(&ctx, Some(threads))?;
            progress.finish_with_message(&format!("Registered {} v{}", card.name, card.version));

            println!("Model {} v{}", card.name, card.version);
            println!(
                "  MAE {:.3}  RMSE {:.3}  R2 {:.3}  (train {}, test {})",
                card.metrics.mae,
                card.metrics.rmse,
                card.metrics.r2,
                card.metrics.n_train,
                card.metrics.n_test
            );
        }

        Commands::Predict {
            run_date, output, ..
        } => {
            let run_date = run_date.unwrap_or(today);
            let summary = pipelines::predict(&ctx, run_date, output.as_deref())?;
            println!(
                "Wrote {} predictions ({} ahead of {}) with model v{} to {}",
                summary.rows,
                summary.forecast_rows,
                run_date,
                summary.model_version,
                summary.output.display()
            );
        }

        Commands::Forecast { run_date, days, .. } => {
            let run_date = run_date.unwrap_or(today);
            let (rows, output) = pipelines::forecast(&ctx, run_date, days)?;
            for row in &rows {
                println!(
                    "{}  {:<20} {:>8.2}  (+{}d)",
                    row.date, row.sensor_id, row.pm2_5_pred, row.days_before_forecast_day
                );
            }
            println!("Wrote {} forecast rows to {}", rows.len(), output.display());
        }

        Commands::Hindcast { run_date, .. } => {
            let run_date = run_date.unwrap_or(today);
            let (report, output) = pipelines::hindcast_report(&ctx, run_date)?;
            for (sensor, mae) in &report.mae_by_sensor {
                println!("{:<32} MAE {:.3}", sensor.to_string(), mae);
            }
            match report.overall_mae() {
                Some(mae) => println!("Overall MAE {:.3} over {} days", mae, report.rows.len()),
                None => println!("No predictions overlap with observed PM2.5 yet"),
            }
            println!("Wrote {}", output.display());
        }

        Commands::Inspect { .. } => {
            println!("Feature store: {}", ctx.settings.store_root.display());
            for summary in pipelines::inspect(&ctx)? {
                println!("{}", summary);
            }
            let model = &ctx.city.model_registry.name;
            match ctx.registry.latest_version(model)? {
                Some(version) => println!("Model {}: latest v{}", model, version),
                None => println!("Model {}: not trained yet", model),
            }
        }
    }

    Ok(())
}

/// INFO by default, DEBUG with `--verbose`; to stderr or appended to `log_file`.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| PipelineError::Config(format!("cannot initialize logging: {}", e)))
}
