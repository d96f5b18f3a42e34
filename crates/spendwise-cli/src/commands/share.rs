//! Share link commands

use anyhow::Result;
use chrono::Utc;
use spendwise_server::AppState;

use super::audit;

pub fn cmd_share_create(state: &AppState, user: &str, days: Option<i64>) -> Result<()> {
    let share = state.shares.create(user, days)?;
    audit(
        &state.db,
        user,
        "create_share_link",
        "organization",
        Some(&share.organization_name),
        Some(&format!("expires_at={}", share.expires_at)),
    );

    println!("🔗 Share link for '{}'", share.organization_name);
    println!("   Token:   {}", share.token);
    println!("   Expires: {}", share.expires_at.format("%Y-%m-%d %H:%M"));
    println!("   View:    /api/public/organization?token={}", share.token);
    Ok(())
}

pub fn cmd_share_list(state: &AppState, user: &str) -> Result<()> {
    let shares = state.shares.list(user)?;
    if shares.is_empty() {
        println!("No share links. Create one with: spendwise share create");
        return Ok(());
    }

    let now = Utc::now();
    println!("\n🔗 Share links ({})", shares.len());
    println!("{}", "─".repeat(72));
    for share in &shares {
        let status = if !share.active {
            "revoked"
        } else if share.is_expired(now) {
            "expired"
        } else {
            "active"
        };
        println!(
            "  {}  {:<8} expires {}  by {}",
            share.token,
            status,
            share.expires_at.format("%Y-%m-%d"),
            share.created_by
        );
    }
    println!();
    Ok(())
}

pub fn cmd_share_revoke(state: &AppState, user: &str, token: &str) -> Result<()> {
    let share = state.shares.revoke(user, token)?;
    audit(
        &state.db,
        user,
        "revoke_share_link",
        "organization",
        Some(&share.organization_name),
        None,
    );

    println!("✅ Revoked share link for '{}'", share.organization_name);
    Ok(())
}
