//! Share token operations

use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{OrganizationMember, ShareToken};

const SHARE_TOKEN_COLUMNS: &str =
    "token, organization_name, created_by, created_at, expires_at, active";

impl Database {
    /// Insert a share token
    pub fn insert_share_token(&self, share: &ShareToken) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO share_tokens (token, organization_name, created_by, created_at,
                expires_at, active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                share.token,
                share.organization_name,
                share.created_by,
                format_datetime(&share.created_at),
                format_datetime(&share.expires_at),
                share.active,
            ],
        )?;
        Ok(())
    }

    /// Get a share token, active or not
    pub fn get_share_token(&self, token: &str) -> Result<Option<ShareToken>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM share_tokens WHERE token = ?",
            SHARE_TOKEN_COLUMNS
        );
        let share = conn
            .query_row(&sql, params![token], Self::row_to_share_token)
            .optional()?;
        Ok(share)
    }

    /// Share tokens issued for an organization, newest first
    pub fn list_share_tokens(&self, organization: &str) -> Result<Vec<ShareToken>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM share_tokens WHERE organization_name = ? ORDER BY created_at DESC, token",
            SHARE_TOKEN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let shares = stmt
            .query_map(params![organization], Self::row_to_share_token)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(shares)
    }

    /// Mark a share token inactive. Returns false if it didn't exist.
    pub fn deactivate_share_token(&self, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE share_tokens SET active = 0 WHERE token = ?",
            params![token],
        )?;
        Ok(updated > 0)
    }

    /// Members of an organization, ordered by name
    pub fn list_organization_members(&self, organization: &str) -> Result<Vec<OrganizationMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, email FROM users WHERE organization_name = ? ORDER BY name, id",
        )?;
        let members = stmt
            .query_map(params![organization], |row| {
                Ok(OrganizationMember {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn row_to_share_token(row: &rusqlite::Row) -> rusqlite::Result<ShareToken> {
        let created_at: String = row.get(3)?;
        let expires_at: String = row.get(4)?;

        Ok(ShareToken {
            token: row.get(0)?,
            organization_name: row.get(1)?,
            created_by: row.get(2)?,
            created_at: parse_datetime(&created_at),
            expires_at: parse_datetime(&expires_at),
            active: row.get(5)?,
        })
    }
}
