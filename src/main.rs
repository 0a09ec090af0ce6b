//! entity-orm console
//!
//! Opens the configured database and reads console commands from stdin.
//! With `--init`, every schema declaration under `entities.path` gets its
//! table created first.

use clap::Parser;
use entity_orm::config::{Settings, DEFAULT_CONFIG_FILE};
use entity_orm::{Console, Database, DatabaseBackend, EntityManager, SqliteBackend};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "entity-orm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Create the tables of every declared entity before starting
    #[arg(long)]
    init: bool,

    /// Log every statement with its parameters inlined
    #[arg(long)]
    print_sql: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    info!(
        config = %cli.config.display(),
        dsn = %settings.database.dsn,
        entities = %settings.entities.path.display(),
        "starting console"
    );

    let dsn = settings.database.dsn.trim();
    let print_sql = cli.print_sql || settings.database.print_sql;

    #[cfg(feature = "mysql")]
    if dsn.starts_with("mysql:") {
        let backend = entity_orm::mysql::MySqlBackend::with_options(settings.mysql_options()?).await?;
        return run(Database::new(backend).with_print_sql(print_sql), &settings, cli.init).await;
    }

    let backend = SqliteBackend::connect(dsn).await?;
    run(Database::new(backend).with_print_sql(print_sql), &settings, cli.init).await
}

async fn run<B: DatabaseBackend>(
    db: Database<B>,
    settings: &Settings,
    init: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if init {
        let mut registry = settings.schema_registry();
        let manager = EntityManager::new(db.clone());

        for name in registry.load_all()? {
            let entity = registry.entity(&name)?;
            manager.create_table(Some(&entity)).await?;
        }
    }

    let mut console = Console::new(db.clone());
    console
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    drop(console);
    db.close().await?;
    Ok(())
}
