//! Applies the embedded ledger migrations (users, balances, supports).
//!
//! Usage:
//!   cargo run -p support-api --bin support-migrate
//!   cargo run -p support-api --bin support-migrate -- --test
//!   cargo run -p support-api --bin support-migrate -- --pending
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

type BoxError = Box<dyn Error + Send + Sync>;

fn main() -> ExitCode {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("support-migrate: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), BoxError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let use_test_db = args.iter().any(|a| a == "--test");
    let list_only = args.iter().any(|a| a == "--pending");

    let mut database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL env var is required")?;
    if use_test_db {
        database_url = with_test_db_suffix(&database_url);
    }

    println!("Connecting to database...");
    let mut conn = PgConnection::establish(&database_url)?;

    if list_only {
        let pending = conn.pending_migrations(MIGRATIONS)?;
        if pending.is_empty() {
            println!("No pending migrations.");
        }
        for migration in &pending {
            println!("  Pending: {}", migration.name());
        }
        return Ok(());
    }

    println!("Running pending migrations...");
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
    Ok(())
}

/// `postgres://h/support?x=y` -> `postgres://h/support_test?x=y`.
fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}
