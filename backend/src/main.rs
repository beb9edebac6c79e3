//! SaaS metrics CLI
//!
//! # Main Commands
//!
//! ```bash
//! saas-metrics ingest raw_saas_data.json   # Load raw records into raw_saas_metrics
//! saas-metrics run                         # Build staging and mart models
//! saas-metrics test                        # Run staging column tests
//! saas-metrics forecast                    # Forecast MRR 24 months ahead
//! saas-metrics serve                       # Start HTTP server (port 3000)
//! ```
//!
//! # Inspection
//!
//! ```bash
//! saas-metrics list                        # List materialized relations
//! saas-metrics show fact_monthly_revenue   # Print a relation (json or csv)
//! saas-metrics compile                     # Print the SQL of each model
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use saas_metrics::{
    compiled_sql, ingest_file, run_forecast, run_models, test_models, IngestMode, Relation,
    Selection, Settings, StoredTable,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "saas-metrics")]
#[command(about = "Stage raw SaaS subscription data, aggregate monthly MRR and forecast it", long_about = None)]
struct Cli {
    /// Warehouse directory (overrides SAAS_METRICS_WAREHOUSE_DIR)
    #[arg(long, global = true)]
    warehouse: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON array or CSV file into the raw source table
    Ingest {
        /// Input file (.json, otherwise CSV)
        input: PathBuf,

        /// Replace existing raw rows instead of appending
        #[arg(long)]
        replace: bool,
    },

    /// Build the staging and mart models
    Run {
        /// Only build one model
        #[arg(short, long, value_enum)]
        select: Option<SelectArg>,
    },

    /// Run column tests on the staging model
    Test,

    /// Forecast monthly revenue
    Forecast {
        /// Months to forecast (overrides SAAS_METRICS_FORECAST_PERIODS)
        #[arg(short, long)]
        periods: Option<u32>,
    },

    /// List materialized relations
    List,

    /// Print the rows of a relation
    Show {
        /// Relation name, optionally schema-qualified
        relation: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the equivalent SQL of each model
    Compile,

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides SAAS_METRICS_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SelectArg {
    Staging,
    Mart,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match Settings::from_env() {
        Ok(mut settings) => {
            if let Some(dir) = cli.warehouse {
                settings.warehouse_dir = dir;
            }
            dispatch(cli.command, settings).await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Ingest { input, replace } => cmd_ingest(&settings, &input, replace),
        Commands::Run { select } => cmd_run(&settings, select),
        Commands::Test => cmd_test(&settings),
        Commands::Forecast { periods } => cmd_forecast(&settings, periods),
        Commands::List => cmd_list(&settings),
        Commands::Show { relation, format, output } => {
            cmd_show(&settings, &relation, format, output.as_deref())
        }
        Commands::Compile => cmd_compile(),
        Commands::Serve { port } => cmd_serve(settings, port).await,
    }
}

fn cmd_ingest(settings: &Settings, input: &Path, replace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if replace { IngestMode::Replace } else { IngestMode::Append };
    ingest_file(&settings.warehouse(), &settings.source, input, mode)?;
    Ok(())
}

fn cmd_run(settings: &Settings, select: Option<SelectArg>) -> Result<(), Box<dyn std::error::Error>> {
    let selection = match select {
        None => Selection::All,
        Some(SelectArg::Staging) => Selection::Staging,
        Some(SelectArg::Mart) => Selection::Mart,
    };

    let result = run_models(&settings.warehouse(), settings, selection);
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.succeeded() {
        return Err(format!("run {} did not complete", result.run_id).into());
    }
    Ok(())
}

fn cmd_test(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let report = test_models(&settings.warehouse(), settings)?;
    eprintln!(
        "{} of {} tests passed",
        report.outcomes.len() - report.failed_count(),
        report.outcomes.len()
    );

    if !report.passed() {
        return Err(format!("{} test(s) failed", report.failed_count()).into());
    }
    Ok(())
}

fn cmd_forecast(settings: &Settings, periods: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let periods = periods.unwrap_or(settings.forecast_periods);
    run_forecast(&settings.warehouse(), settings, periods)?;
    Ok(())
}

fn cmd_list(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let relations = settings.warehouse().list()?;
    if relations.is_empty() {
        eprintln!("No relations materialized yet.");
        eprintln!("   Use 'saas-metrics ingest <file>' then 'saas-metrics run'.");
        return Ok(());
    }

    for info in relations {
        println!(
            "{:<50} {:>8} rows   {}",
            info.relation.to_string(),
            info.row_count,
            info.materialized_at
        );
    }
    Ok(())
}

fn cmd_show(
    settings: &Settings,
    relation: &str,
    format: Format,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let relation = Relation::parse(relation, &settings.target_schema)?;
    let table: StoredTable<Value> = settings.warehouse().read_table(&relation)?;

    let content = match format {
        Format::Json => serde_json::to_string_pretty(&table.rows)?,
        Format::Csv => to_csv(&table)?,
    };
    write_output(&content, output)
}

/// Render rows as CSV in column order; nulls become empty cells.
fn to_csv(table: &StoredTable<Value>) -> Result<String, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;

    for row in &table.rows {
        let cells: Vec<String> = table
            .columns
            .iter()
            .map(|col| match row.get(col) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&cells)?;
    }

    writer.flush()?;
    let bytes = writer
        .into_inner()
        .map_err(|_| "failed to flush CSV output")?;
    Ok(String::from_utf8(bytes)?)
}

fn cmd_compile() -> Result<(), Box<dyn std::error::Error>> {
    for (name, sql) in compiled_sql() {
        println!("-- {}", name);
        println!("{}", sql);
    }
    Ok(())
}

async fn cmd_serve(mut settings: Settings, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        settings.port = port;
    }
    saas_metrics::server::start_server(settings).await?;
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
