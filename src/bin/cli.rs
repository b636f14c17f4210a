use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crew_planner::db::{collections, to_document, DocumentStore, SqliteDocumentStore};
use crew_planner::identity::{IdentityProvider, JwtConfig, JwtIdentityProvider};
use crew_planner::models::user::{Role, User};
use crew_planner::routes::statuses;
use crew_planner::utils::{normalize_email, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "crew-planner maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Create an admin account and profile, then print a session token for it
    SeedAdmin {
        email: String,
        #[arg(long, default_value = "Administrator")]
        name: String,
    },
    /// Write the default statuses when the collection is empty
    SeedStatuses,
    /// Print a session token for an existing uid
    IssueToken {
        uid: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::SeedAdmin { email, name } => {
            let jwt = JwtConfig::from_env()?;
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(get_pool().await?));
            let identity = JwtIdentityProvider::new(jwt.clone(), Arc::clone(&store), String::new());

            let email = normalize_email(&email);
            let uid = identity.create_account(&email, Some(&name)).await?;
            let admin = User {
                id: String::new(),
                uid: Some(uid.clone()),
                email: email.clone(),
                full_name: name.clone(),
                role: Some(Role::Admin),
                phone: None,
                notes: String::new(),
                active: true,
                worker_id: None,
                created_at: Some(utc_now()),
                updated_at: None,
            };
            store.set(collections::USERS, &uid, to_document(&admin)?).await?;

            println!("Created admin {email} (uid {uid})");
            println!("{}", jwt.issue(&uid, Some(&email), Some(&name))?);
        }
        Commands::SeedStatuses => {
            let store = SqliteDocumentStore::new(get_pool().await?);
            let written = statuses::seed_defaults(&store).await?;
            println!("Seeded {written} statuses");
        }
        Commands::IssueToken { uid, email, name } => {
            let jwt = JwtConfig::from_env()?;
            let email = email.as_deref().map(normalize_email);
            println!("{}", jwt.issue(&uid, email.as_deref(), name.as_deref())?);
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
        .fetch_optional(pool)
        .await?
        .is_some();

    let applied_versions: HashSet<i64> = if has_table {
        sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .iter()
            .filter_map(|row| row.try_get::<i64, _>("version").ok())
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {display}"))
}
