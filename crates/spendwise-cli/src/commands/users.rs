//! User and organization commands

use anyhow::{bail, Result};
use spendwise_core::db::Database;

use super::{audit, truncate};

/// Register a user, or refresh an existing one's email and name
pub fn cmd_users_add(
    db: &Database,
    id: &str,
    email: Option<&str>,
    name: Option<&str>,
    org: Option<&str>,
) -> Result<()> {
    let id = id.trim();
    if id.is_empty() {
        bail!("User id cannot be empty");
    }

    let existing = db.get_user(id)?;
    let email = email
        .map(String::from)
        .or_else(|| existing.as_ref().map(|u| u.email.clone()))
        .unwrap_or_default();
    let name = name
        .map(String::from)
        .or_else(|| existing.as_ref().map(|u| u.name.clone()))
        .unwrap_or_else(|| id.to_string());

    let mut user = db.upsert_user(id, &email, &name)?;
    if org.is_some() {
        db.set_user_organization(id, org)?;
        user = db.get_user(id)?.unwrap_or(user);
    }

    let action = if existing.is_some() { "update" } else { "register" };
    audit(db, id, action, "user", Some(id), None);

    println!(
        "✅ {} user {} ({})",
        if existing.is_some() { "Updated" } else { "Registered" },
        user.id,
        user.name
    );
    if let Some(org) = &user.organization_name {
        println!("   Organization: {}", org);
    }
    Ok(())
}

pub fn cmd_users_list(db: &Database) -> Result<()> {
    let users = db.list_users()?;
    if users.is_empty() {
        println!("No users registered. Add one with: spendwise users add <id>");
        return Ok(());
    }

    println!("\n👥 Users ({})", users.len());
    println!("{}", "─".repeat(70));
    for user in &users {
        println!(
            "  {:<16} {:<24} {:<20} {}",
            truncate(&user.id, 16),
            truncate(&user.email, 24),
            truncate(&user.name, 20),
            user.organization_name.as_deref().unwrap_or("-")
        );
    }
    println!();
    Ok(())
}

/// Set or clear a user's organization
pub fn cmd_users_org(db: &Database, id: &str, organization: Option<&str>) -> Result<()> {
    if !db.set_user_organization(id, organization)? {
        bail!("User not found: {}", id);
    }

    let organization = organization.map(str::trim).filter(|o| !o.is_empty());
    audit(
        db,
        id,
        "update_organization",
        "user",
        Some(id),
        Some(organization.unwrap_or("none")),
    );

    match organization {
        Some(org) => println!("✅ {} joined organization '{}'", id, org),
        None => println!("✅ {} left their organization", id),
    }
    Ok(())
}
