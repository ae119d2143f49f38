use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use txsentinel::config::Config;
use txsentinel::db::SharedDatabase;
use txsentinel::input::HistoryFile;
use txsentinel::notifications::Notifier;
use txsentinel::risk::advice::{mitigation_recommendations, top_risk_factors};
use txsentinel::risk::reference::ReferenceLists;
use txsentinel::risk::weights::CalibrationRecord;
use txsentinel::{
    PatternCatalog, PatternEngine, PatternType, RiskEngine, RiskFactor, RiskProfile, RiskTables,
    TransactionPattern,
};

#[derive(Parser)]
#[command(name = "txsentinel", version, about = "Wallet pattern detection and risk scoring")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect patterns and calibrate a risk profile from a history file
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        address: String,
        /// Do not store the resulting profile
        #[arg(long)]
        no_persist: bool,
    },
    /// Import reference addresses from a CSV file (address,list,source)
    ImportLists {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Store a calibration record (JSON) and print the effective weights
    Calibrate {
        #[arg(long)]
        record: PathBuf,
    },
    /// Print the stored profile for an address
    Profile {
        #[arg(long)]
        address: String,
    },
    /// Enable or disable pattern types
    Patterns {
        #[arg(long, value_delimiter = ',')]
        enable: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,
    },
}

#[derive(Serialize)]
struct AnalysisReport {
    address: String,
    patterns: [TransactionPattern; 4],
    profile: RiskProfile,
    top_factors: Vec<RiskFactor>,
    recommendations: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("txsentinel=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config);
    tracing::debug!("Config: {:?}", config);

    let db = open_store(&config)?;

    match cli.command {
        Command::Analyze {
            input,
            address,
            no_persist,
        } => analyze(&config, &db, &input, address, !no_persist).await,
        Command::ImportLists { csv } => {
            let count = db
                .load_references_from_csv(&csv)
                .with_context(|| format!("importing {}", csv.display()))?;
            println!("Imported {count} reference addresses");
            Ok(())
        }
        Command::Calibrate { record } => calibrate(&config, &db, &record),
        Command::Profile { address } => {
            match db.load_profile(&address)? {
                Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
                None => println!("No stored profile for {address}"),
            }
            Ok(())
        }
        Command::Patterns { enable, disable } => toggle_patterns(&db, &enable, &disable),
    }
}

fn open_store(config: &Config) -> Result<SharedDatabase> {
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let db = SharedDatabase::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    tracing::info!("Database opened at {}", config.database.path);

    // Load reference lists from CSV if available
    if let Some(ref csv_path_str) = config.reference.lists_csv {
        let csv_path = Path::new(csv_path_str);
        if csv_path.exists() {
            match db.load_references_from_csv(csv_path) {
                Ok(count) => tracing::info!("Loaded {count} reference addresses from CSV"),
                Err(e) => tracing::warn!("Failed to load reference CSV: {e}"),
            }
        }
    }
    Ok(db)
}

/// Config baseline plus the latest stored calibration record.
fn load_tables(config: &Config, db: &SharedDatabase) -> RiskTables {
    let mut weights = config.calibration.weights.clone();
    let mut thresholds = config.calibration.thresholds;
    match db.latest_calibration() {
        Ok(Some(record)) => {
            weights = weights.apply(&record);
            thresholds = thresholds.apply(&record);
            tracing::info!("Applied calibration record {:?}", record.description);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to read calibration records: {e}"),
    }
    RiskTables {
        reference: ReferenceLists::load_from_db(db),
        weights,
        thresholds,
    }
}

async fn analyze(
    config: &Config,
    db: &SharedDatabase,
    input: &Path,
    address: String,
    persist: bool,
) -> Result<()> {
    if address.is_empty() {
        bail!("--address must not be empty");
    }
    let mut history =
        HistoryFile::load(input).with_context(|| format!("loading history {}", input.display()))?;
    history.truncate_to_recent(config.engine.max_history);

    let catalog = PatternCatalog::load(db).unwrap_or_else(|e| {
        tracing::warn!("Failed to load pattern catalog: {e}, using built-in definitions");
        PatternCatalog::seed()
    });
    let existing = db.load_profile(&address).unwrap_or_else(|e| {
        tracing::warn!("Failed to load stored profile for {address}: {e}");
        None
    });
    let tables = load_tables(config, db);
    let transactions = history.transactions();
    let activity = history.activity(&address);

    let pattern_task = tokio::task::spawn_blocking({
        let address = address.clone();
        move || PatternEngine::new(catalog).detect(&transactions, &address)
    });
    let risk_task = tokio::task::spawn_blocking({
        let address = address.clone();
        move || RiskEngine::new(tables).calibrate(&address, &history, &activity, existing.as_ref())
    });
    let (patterns, profile) = tokio::try_join!(pattern_task, risk_task).context("analysis task failed")?;

    if persist {
        if let Err(e) = db.save_profile(&profile) {
            tracing::warn!("Failed to store profile for {address}: {e}");
        }
    }
    notify(config, db, &profile).await?;

    let report = AnalysisReport {
        top_factors: top_risk_factors(&profile, 3),
        recommendations: mitigation_recommendations(&profile),
        address,
        patterns,
        profile,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Sends before returning so the process does not exit mid-send. The
/// cooldown spans runs through the store's notification log.
async fn notify(config: &Config, db: &SharedDatabase, profile: &RiskProfile) -> Result<()> {
    let last_sent = db.last_notification_at().unwrap_or_else(|e| {
        tracing::warn!("Failed to read notification log: {e}");
        None
    });
    let notifier = Notifier::new(&config.notifications).with_last_sent(last_sent);
    let sent = tokio::task::spawn_blocking({
        let profile = profile.clone();
        move || notifier.notify(&profile)
    })
    .await
    .context("notification task failed")?;
    if sent {
        if let Err(e) = db.record_notification(profile, chrono::Utc::now()) {
            tracing::warn!("Failed to record notification: {e}");
        }
    }
    Ok(())
}

fn calibrate(config: &Config, db: &SharedDatabase, path: &Path) -> Result<()> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let record: CalibrationRecord =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    let id = db.save_calibration(&record)?;
    tracing::info!("Stored calibration record #{id}");

    let tables = load_tables(config, db);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "id": id,
            "weights": tables.weights,
            "thresholds": tables.thresholds,
        }))?
    );
    Ok(())
}

fn toggle_patterns(db: &SharedDatabase, enable: &[String], disable: &[String]) -> Result<()> {
    let mut catalog = PatternCatalog::load(db)?;
    for (names, enabled) in [(enable, true), (disable, false)] {
        for name in names {
            let Some(pattern_type) = PatternType::parse(name) else {
                bail!("unknown pattern type {name:?}");
            };
            catalog.set_enabled(pattern_type, enabled);
        }
    }
    catalog.save(db)?;
    for definition in catalog.definitions() {
        let mark = if definition.enabled { "on " } else { "off" };
        println!("{mark} {:<24} {}", definition.pattern_type.as_str(), definition.description);
    }
    Ok(())
}
