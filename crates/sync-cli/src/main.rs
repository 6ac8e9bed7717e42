use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sync_store::StorePool;

#[derive(Parser)]
#[command(name = "sync")]
#[command(about = "sync engine operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the commit-log/chunk-store and audit-log schema to the
    /// configured database. Idempotent: safe to run against an
    /// already-migrated database.
    Migrate,

    /// Run the maintenance loops (prune, compact, snapshot GC, audit
    /// prune) on a timer until interrupted.
    Serve {
        /// Layered config paths in merge order.
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value = "default")]
        partition: String,
    },

    /// Run the maintenance loops once and print what each one did.
    Prune {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value = "default")]
        partition: String,
    },

    /// Compute layered config hash + print canonical JSON.
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    sync_telemetry::init_tracing_subscriber();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Migrate => run_migrate().await,
        Commands::Serve { config_paths, partition } => run_serve(&config_paths, &partition).await,
        Commands::Prune { config_paths, partition } => run_prune(&config_paths, &partition).await,
        Commands::ConfigHash { paths } => run_config_hash(&paths),
    }
}

async fn connect_pool() -> Result<StorePool> {
    let secrets = sync_config::resolve_secrets(&serde_json::Value::Null)
        .context("resolving database connection string")?;
    StorePool::connect(&secrets.database_url)
        .await
        .context("connecting to the configured database")
}

async fn run_migrate() -> Result<()> {
    let pool = connect_pool().await?;
    sync_store::ensure_schema(&pool)
        .await
        .context("applying commit-log/chunk-store schema")?;
    sync_audit::ensure_schema(&pool)
        .await
        .context("applying audit-log schema")?;
    println!("migrations_applied=true");
    Ok(())
}

fn load_settings(config_paths: &[String]) -> Result<sync_config::SyncSettings> {
    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = sync_config::load_layered_yaml(&path_refs)?;
    let settings = sync_config::SyncSettings::from_config_json(&loaded.config_json)
        .context("parsing sync settings from merged config")?;
    println!("config_hash={}", loaded.config_hash);
    Ok(settings)
}

async fn run_prune(config_paths: &[String], partition: &str) -> Result<()> {
    let settings = load_settings(config_paths)?;
    let pool = connect_pool().await?;
    let runner = sync_engine::MaintenanceRunner::new(pool, settings);

    let now_ms = chrono::Utc::now().timestamp_millis();
    let outcome = runner
        .maybe_run(partition, now_ms)
        .await
        .map_err(|e| anyhow::anyhow!("maintenance run failed: {e}"))?;

    println!("pruned_commits={}", outcome.pruned_commits);
    println!("compacted_changes={}", outcome.compacted_changes);
    println!("expired_chunks={}", outcome.expired_chunks);
    println!("audit_request_events={}", outcome.audit_request_events);
    println!("audit_operation_events={}", outcome.audit_operation_events);
    Ok(())
}

async fn run_serve(config_paths: &[String], partition: &str) -> Result<()> {
    let settings = load_settings(config_paths)?;
    let heartbeat_interval_ms = settings.heartbeat_interval_ms;
    let pool = connect_pool().await?;
    let runner = sync_engine::MaintenanceRunner::new(pool, settings);
    let partition = partition.to_string();

    tracing::info!(partition = %partition, heartbeat_interval_ms, "maintenance loop starting");

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(heartbeat_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                match runner.maybe_run(&partition, now_ms).await {
                    Ok(outcome) => tracing::info!(
                        pruned_commits = outcome.pruned_commits,
                        compacted_changes = outcome.compacted_changes,
                        expired_chunks = outcome.expired_chunks,
                        audit_request_events = outcome.audit_request_events,
                        audit_operation_events = outcome.audit_operation_events,
                        "maintenance tick complete",
                    ),
                    Err(e) => {
                        sync_telemetry::active().exception(
                            &e,
                            &serde_json::json!({ "event": "sync.maintenance.tick_failed", "partition": partition }),
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("maintenance loop shutting down");
                return Ok(());
            }
        }
    }
}

fn run_config_hash(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = sync_config::load_layered_yaml(&path_refs)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}
