//! Binary entrypoint for the meshsensor CLI.
//!
//! Commands:
//! - `get` - read publication and cadence from the mesh into the document
//! - `set [--dry-run]` - push the document's settings to the devices
//! - `validate` - check the document offline
//! - `init` - write a starter `meshsensor.toml`
//!
//! `-a <address>` restricts `get` and `set` to one element. `--simulate
//! <state.yaml>` replaces the gateway with an in-memory mesh loaded from the
//! given file (written back after `set`).
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use meshsensor::config::Config;
use meshsensor::directory::MeshCfgDirectory;
use meshsensor::document::validate;
use meshsensor::mesh::UnicastAddress;
use meshsensor::pipeline::{run_get, run_set, RunOptions, RunReport, StopFlag};
use meshsensor::store::DocumentStore;
use meshsensor::transport::gateway::GatewayClient;
use meshsensor::transport::sim::SimulatedMesh;

#[derive(Parser)]
#[command(name = "meshsensor")]
#[command(about = "Reconcile Bluetooth mesh sensor publication and cadence with a YAML document")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "meshsensor.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only process this element (hex unicast address, e.g. 0x1001)
    #[arg(short, long, global = true)]
    address: Option<UnicastAddress>,

    /// Sensor document path (overrides paths.document)
    #[arg(short, long, global = true)]
    document: Option<String>,

    /// Use a simulated mesh loaded from this YAML state file
    #[arg(long, global = true, value_name = "STATE")]
    simulate: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read live settings from the mesh into the document
    Get,
    /// Push the document's settings to the mesh
    Set {
        /// Resolve and log every push without sending anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Check the document for dangling groups, unknown properties and bad values
    Validate,
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Init => None,
        _ => Some(Config::load_or_default(&cli.config).await?),
    };
    init_logging(&config, cli.verbose);

    let Some(config) = config else {
        if std::path::Path::new(&cli.config).exists() {
            bail!("{} already exists, not overwriting", cli.config);
        }
        Config::create_default(&cli.config).await?;
        println!("Wrote default configuration to {}", cli.config);
        return Ok(());
    };

    let store = DocumentStore::new(
        cli.document
            .clone()
            .unwrap_or_else(|| config.paths.document.clone()),
    );
    let options = RunOptions {
        params: config.call_params(),
        properties: config.property_table(),
        filter: cli.address,
        dry_run: matches!(cli.command, Commands::Set { dry_run: true }),
    };

    let code = match cli.command {
        Commands::Get => get(&cli, &config, &store, &options).await?,
        Commands::Set { .. } => set(&cli, &config, &store, &options).await?,
        Commands::Validate => validate_document(&store, &options).await?,
        Commands::Init => 0,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn get(cli: &Cli, config: &Config, store: &DocumentStore, options: &RunOptions) -> Result<i32> {
    let stop = StopFlag::new();
    stop.install_ctrl_c();
    let report = match &cli.simulate {
        Some(state) => {
            let mut mesh = SimulatedMesh::load(state).await?;
            let directory = mesh.directory();
            run_get(store, &directory, &mut mesh, options, &stop).await?
        }
        None => {
            let directory = MeshCfgDirectory::load(&config.paths.directory_db_path()).await?;
            let mut gateway = connect(config).await?;
            run_get(store, &directory, &mut gateway, options, &stop).await?
        }
    };
    print_report("get", &report);
    Ok(0)
}

async fn set(cli: &Cli, config: &Config, store: &DocumentStore, options: &RunOptions) -> Result<i32> {
    let stop = StopFlag::new();
    stop.install_ctrl_c();
    let report = match &cli.simulate {
        Some(state) => {
            let mut mesh = SimulatedMesh::load(state).await?;
            let report = run_set(store, &mut mesh, options, &stop).await?;
            if !options.dry_run {
                mesh.save(state).await?;
            }
            report
        }
        None if options.dry_run => {
            // Never contacted on a dry run.
            let mut idle = SimulatedMesh::default();
            run_set(store, &mut idle, options, &stop).await?
        }
        None => {
            let mut gateway = connect(config).await?;
            run_set(store, &mut gateway, options, &stop).await?
        }
    };
    print_report("set", &report);
    Ok(if report.failed == 0 && report.skipped == 0 { 0 } else { 1 })
}

async fn validate_document(store: &DocumentStore, options: &RunOptions) -> Result<i32> {
    let doc = store.load().await?;
    let issues = validate(&doc, &options.properties);
    if issues.is_empty() {
        println!("{}: {} element(s), no issues", store.path(), doc.elements.len());
        return Ok(0);
    }
    for issue in &issues {
        println!("{}", issue);
    }
    warn!("{} issue(s) in {}", issues.len(), store.path());
    Ok(1)
}

async fn connect(config: &Config) -> Result<GatewayClient> {
    match GatewayClient::connect(&config.transport.gateway, config.transport.connect_timeout()).await {
        Ok(client) => Ok(client),
        Err(e) => {
            error!("Mesh gateway unavailable: {}", e);
            Err(e.into())
        }
    }
}

fn print_report(command: &str, report: &RunReport) {
    info!("{} summary: {}", command, report);
    println!("{}: {}", command, report);
}

/// With a log file configured, everything reaches the console when someone is
/// watching and warnings and errors always do.
fn mirrors_to_console(is_tty: bool, level: log::Level) -> bool {
    is_tty || level <= log::Level::Warn
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // -v wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    match log_file {
        Some(f) => {
            let file = std::sync::Arc::new(std::sync::Mutex::new(f));
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if mirrors_to_console(is_tty, record.level()) {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
