//! CLI entry point for resistivity-daq
//!
//! Provides command-line access to:
//! - the instrument identity (`identify`)
//! - burst measurements recorded into samples and locations (`measure`)
//! - the same workflow against a simulated instrument or demo data (`simulate`)
//!
//! # Usage
//!
//! ```bash
//! resistivity_daq --config config/resistivity.toml identify
//! resistivity_daq measure --count 5 --period 2.5 --sample "Wafer 7" --location Center
//! resistivity_daq simulate --count 10
//! resistivity_daq --json simulate --demo
//! resistivity_daq --log-format json simulate --count 3
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resistivity_daq::config::{
    MemorySettingsStore, Settings, SettingsStore, TomlSettingsStore, DEFAULT_CONFIG_PATH,
};
use resistivity_daq::export::{table, write_table, Scaled};
use resistivity_daq::instrument::SimulatedConnector;
use resistivity_daq::logging::{self, LogFormat, TracingConfig};
use resistivity_daq::model::{DataModel, Measurement, ModelHandle, Sample, SortDescriptor, SortKey};
use resistivity_daq::session::Session;
use resistivity_daq::units::DisplayUnits;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "resistivity_daq")]
#[command(about = "Four-point-probe resistance acquisition", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print measurements and sample summaries as JSON instead of tab-separated rows
    #[arg(long, global = true)]
    json: bool,

    /// Log line format on stderr (overrides settings)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct BurstArgs {
    /// Readings per burst (overrides settings)
    #[arg(long)]
    count: Option<u32>,

    /// Seconds between readings (overrides settings)
    #[arg(long)]
    period: Option<f64>,

    /// Sample name (overrides settings)
    #[arg(long)]
    sample: Option<String>,

    /// Location name (overrides settings)
    #[arg(long)]
    location: Option<String>,
}

impl BurstArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(count) = self.count {
            settings.acquisition.burst_count = count;
        }
        if let Some(period) = self.period {
            settings.acquisition.period_secs = period;
        }
        if let Some(sample) = &self.sample {
            settings.sample.name = sample.clone();
        }
        if let Some(location) = &self.location {
            settings.location.name = location.clone();
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print the instrument identity
    Identify,

    /// Take one burst and print the recorded measurements
    Measure {
        #[command(flatten)]
        burst: BurstArgs,

        /// Persist the sample/location/burst overrides to the settings file
        #[arg(long)]
        save: bool,
    },

    /// Run against a simulated instrument
    Simulate {
        #[command(flatten)]
        burst: BurstArgs,

        /// Print a generated demo data set instead of measuring
        #[arg(long)]
        demo: bool,

        /// Keep the configured inter-query delay instead of running at full speed
        #[arg(long)]
        realtime: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = Arc::new(TomlSettingsStore::new(cli.config.clone()));
    let settings = store
        .load()
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let mut tracing_config =
        TracingConfig::from_settings(&settings.application).map_err(anyhow::Error::msg)?;
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format);
    }
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    let output = Output {
        json: cli.json,
        units: settings.units,
    };
    match cli.command {
        Commands::Identify => identify(store).await,
        Commands::Measure { burst, save } => measure(store, burst, save, output).await,
        Commands::Simulate {
            burst,
            demo,
            realtime,
        } => simulate(settings, burst, demo, realtime, output).await,
    }
}

async fn identify(store: Arc<TomlSettingsStore>) -> Result<()> {
    let session = Session::new(store)?;
    session.connect().await?;
    let identity = session.identify().await?;
    println!("{}", identity);
    session.disconnect().await;
    Ok(())
}

async fn measure(
    store: Arc<TomlSettingsStore>,
    burst: BurstArgs,
    save: bool,
    output: Output,
) -> Result<()> {
    let session = Session::new(store)?;
    let mut settings = session.settings();
    burst.apply(&mut settings);
    session.update_settings(settings)?;

    run_burst(&session, output).await?;
    if save {
        session.save_settings()?;
        tracing::info!("Saved settings");
    }
    Ok(())
}

async fn simulate(
    mut settings: Settings,
    burst: BurstArgs,
    demo: bool,
    realtime: bool,
    output: Output,
) -> Result<()> {
    if demo {
        let model = ModelHandle::new(DataModel::with_demo_data(3, 2, 4));
        let view = model.flattened_view("", &[SortDescriptor::ascending(SortKey::SampleId)]);
        return output.print(&view, &model.filtered_samples(""));
    }

    burst.apply(&mut settings);
    if !realtime {
        settings.instrument.min_query_delay_ms = 0;
    }
    let store = Arc::new(MemorySettingsStore::new(settings));
    let session = Session::with_connector(store, Arc::new(SimulatedConnector::new()))?;
    run_burst(&session, output).await
}

async fn run_burst(session: &Session, output: Output) -> Result<()> {
    session.connect().await?;
    if let Some(identity) = session.controller().identity() {
        eprintln!("Connected to {}", identity);
    }

    // Ctrl+C ends the burst early; readings taken so far are kept.
    let controller = session.controller().clone();
    let stopper = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            controller.request_stop();
        }
    });

    let result = session.measure().await;
    stopper.abort();
    let recorded = result?;

    output.print(&recorded, &session.model().filtered_samples(""))?;
    session.disconnect().await;
    Ok(())
}

#[derive(Serialize)]
struct Report<'a> {
    measurements: &'a [Measurement],
    samples: &'a [Sample],
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    units: DisplayUnits,
}

impl Output {
    /// JSON keeps base units; rows use the configured display units.
    fn print(&self, measurements: &[Measurement], samples: &[Sample]) -> Result<()> {
        if self.json {
            let report = Report {
                measurements,
                samples,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        let rows: Vec<Scaled<'_, Measurement>> = measurements
            .iter()
            .map(|m| Scaled::new(m, self.units))
            .collect();
        print_table(table(&rows))?;

        let summaries: Vec<Scaled<'_, Sample>> =
            samples.iter().map(|s| Scaled::new(s, self.units)).collect();
        if !summaries.is_empty() {
            println!();
        }
        print_table(table(&summaries))
    }
}

fn print_table((header, rows): (Vec<String>, Vec<Vec<String>>)) -> Result<()> {
    write_table(std::io::stdout().lock(), &header, &rows)?;
    Ok(())
}
