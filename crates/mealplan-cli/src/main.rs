mod config;
mod serve_cmd;

use clap::{Parser, Subcommand};

use mealplan_db::config::DbConfig;
use mealplan_db::pool;

use config::MealplanConfig;

#[derive(Parser)]
#[command(name = "mealplan", about = "Meal, daily and weekly plan service")]
struct Cli {
    /// Database URL (overrides MEALPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a mealplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides MEALPLAN_BIND)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides MEALPLAN_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        server: config::ServerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `mealplan db-init` to create and migrate the database.");

    Ok(())
}

async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MealplanConfig::resolve(cli_db_url, None, None)?;

    println!("Initializing mealplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("mealplan db-init complete.");
    Ok(())
}

async fn cmd_serve(
    cli_db_url: Option<&str>,
    bind: Option<&str>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let resolved = MealplanConfig::resolve(cli_db_url, bind, port)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let result = serve_cmd::run_serve(
        db_pool.clone(),
        &resolved.bind,
        resolved.port,
        resolved.op_timeout,
    )
    .await;
    db_pool.close().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => cmd_init(&db_url, force)?,
        Commands::DbInit => cmd_db_init(cli.database_url.as_deref()).await?,
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), bind.as_deref(), port).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
