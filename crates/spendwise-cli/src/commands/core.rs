//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_app` - Database plus the configured services
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use spendwise_core::db::Database;
use spendwise_server::{AppState, ServerConfig, Services};
use tracing::warn;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow!("Database path must be valid UTF-8"))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Open the database and build the expense, budget, receipt and retention
/// services from configuration and environment
pub fn open_app(db_path: &Path, no_encrypt: bool) -> Result<AppState> {
    let db = open_db(db_path, no_encrypt)?;
    let services = Services::from_env().context("Failed to load configuration")?;
    Ok(AppState::new(db, ServerConfig::default(), services))
}

/// Record a CLI mutation in the audit log
pub fn audit(
    db: &Database,
    user: &str,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    details: Option<&str>,
) {
    if let Err(e) = db.log_audit(user, action, Some(entity_type), entity_id, details) {
        warn!("Failed to write audit entry for {}: {}", action, e);
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let users = db.list_users().context("Failed to read users")?;
    println!("   Tables ready ({} user(s) registered)", users.len());

    let encrypted = db
        .is_encrypted()
        .context("Failed to check database encryption")?;
    if encrypted {
        println!("   🔒 Encryption: ENABLED");
    } else if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        anyhow::bail!("Database at {} is not encrypted", db_path.display());
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Register yourself: spendwise users add <id> --email you@example.com");
    println!("  2. Upload a receipt: spendwise --user <id> receipts upload receipt.jpg");
    println!("  3. Start the API: spendwise serve");

    Ok(())
}
