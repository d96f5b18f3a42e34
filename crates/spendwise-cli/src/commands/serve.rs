//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use spendwise_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Spendwise web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    let config = ServerConfig {
        require_auth: !no_auth,
        ..ServerConfig::from_env()
    };

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
        if config.admin_users.is_empty() {
            println!("   ⚠️  Every caller has admin access");
        }
    } else {
        println!(
            "   🔒 Authentication: API key ({} configured) + x-user-id header",
            config.api_keys.len()
        );
        if config.api_keys.is_empty() {
            println!("      Set SPENDWISE_API_KEYS (comma-separated) to accept requests");
        }
    }
    if !config.admin_users.is_empty() {
        println!("   👤 Admins: {}", config.admin_users.join(", "));
    }
    println!();

    let db = open_db(db_path, no_encrypt)?;
    spendwise_server::serve_with_config(db, host, port, config)
        .await
        .context("Server error")
}
