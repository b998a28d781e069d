//! CLI command definitions for lms-progress.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{CatalogFixture, SqliteCatalog};
use crate::config::AppConfig;
use crate::engine::{Engine, UrlCertificateRenderer};
use crate::storage::Database;

/// Completion and progress tracking engine for a learning-management platform.
#[derive(Parser)]
#[command(name = "lms-progress")]
#[command(about = "Track learner progress, grade tests and cascade completions")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// SQLite database URL. Overrides DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),

    /// Apply pending schema migrations.
    Migrate,

    /// Create the public group. Safe to run repeatedly.
    Bootstrap,

    /// Catalog maintenance.
    Catalog(CatalogArgs),

    /// Print row counts per table.
    Stats(StatsArgs),
}

/// Arguments for `lms-progress serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on. Overrides LMS_BIND_ADDR.
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Base URL for issued certificates. Overrides LMS_CERTIFICATE_BASE_URL.
    #[arg(long)]
    pub certificate_base_url: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum CatalogSubcommand {
    /// Load courses, content, plans, tests, groups and enrollments from JSON.
    Load(CatalogLoadArgs),
}

#[derive(Parser, Debug)]
pub struct CatalogLoadArgs {
    /// Path to the catalog JSON file.
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse the CLI arguments and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config = config.with_database_url(url);
    }

    match cli.command {
        Commands::Serve(args) => run_serve_command(config, args).await,
        Commands::Migrate => run_migrate_command(&config).await,
        Commands::Bootstrap => run_bootstrap_command(&config).await,
        Commands::Catalog(args) => match args.command {
            CatalogSubcommand::Load(args) => run_catalog_load_command(&config, args).await,
        },
        Commands::Stats(args) => run_stats_command(&config, args).await,
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Database> {
    config.validate()?;
    let db = Database::connect(&config.database_url, config.db_max_connections).await?;
    db.run_migrations().await?;
    Ok(db)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_serve_command(mut config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config = config.with_bind_addr(bind);
    }
    if let Some(url) = args.certificate_base_url {
        config = config.with_certificate_base_url(url);
    }

    let db = connect(&config).await?;
    db.bootstrap_public_group(&config.public_group_id, &config.public_group_name)
        .await?;
    crate::metrics::init_metrics()?;

    let renderer = Arc::new(UrlCertificateRenderer::new(config.certificate_base_url.clone()));
    let engine = Engine::with_sqlite_catalog(db, renderer);

    info!(database = %config.database_url, "Starting LMS progress service");
    crate::api::serve(engine, config.bind_addr).await?;
    Ok(())
}

async fn run_migrate_command(config: &AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    let db = Database::connect(&config.database_url, config.db_max_connections).await?;
    let applied = db.run_migrations().await?;
    println!("Applied {} migration(s)", applied);
    Ok(())
}

async fn run_bootstrap_command(config: &AppConfig) -> anyhow::Result<()> {
    let db = connect(config).await?;
    let created = db
        .bootstrap_public_group(&config.public_group_id, &config.public_group_name)
        .await?;
    if created {
        println!("Created public group '{}'", config.public_group_id);
    } else {
        println!("Public group '{}' already exists", config.public_group_id);
    }
    Ok(())
}

async fn run_catalog_load_command(config: &AppConfig, args: CatalogLoadArgs) -> anyhow::Result<()> {
    let db = connect(config).await?;
    let fixture = CatalogFixture::from_file(&args.file).await?;
    let catalog = SqliteCatalog::new(&db);
    let summary = fixture.load(&catalog, &db).await?;

    info!(file = %args.file.display(), "Catalog loaded");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_stats_command(config: &AppConfig, args: StatsArgs) -> anyhow::Result<()> {
    let db = connect(config).await?;
    let stats = db.stats().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{:<32} {:>10}", "TABLE", "ROWS");
    for table in &stats.tables {
        println!("{:<32} {:>10}", table.table, table.rows);
    }
    Ok(())
}
