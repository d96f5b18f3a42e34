//! User and organization membership operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::User;

impl Database {
    /// Insert or refresh a user record, keeping any organization already set
    pub fn upsert_user(&self, id: &str, email: &str, name: &str) -> Result<User> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (id, email, name) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name
            "#,
            params![id, email, name],
        )?;
        drop(conn);

        self.get_user(id)?
            .ok_or_else(|| crate::error::Error::NotFound(format!("user {}", id)))
    }

    /// Get a user by id
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, organization_name, created_at FROM users WHERE id = ?",
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, name, organization_name, created_at FROM users ORDER BY created_at, id",
        )?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Set or clear a user's organization. Returns false if the user doesn't exist.
    pub fn set_user_organization(&self, id: &str, organization: Option<&str>) -> Result<bool> {
        let conn = self.conn()?;
        let organization = organization.map(str::trim).filter(|o| !o.is_empty());
        let updated = conn.execute(
            "UPDATE users SET organization_name = ? WHERE id = ?",
            params![organization, id],
        )?;
        Ok(updated > 0)
    }

    /// Organization name of a user, if any
    pub fn user_organization(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get_user(id)?.and_then(|u| u.organization_name))
    }

    /// Ids of every user that belongs to the organization
    pub fn organization_member_ids(&self, organization: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id FROM users WHERE organization_name = ? ORDER BY id")?;
        let ids = stmt
            .query_map(params![organization], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at: String = row.get(4)?;
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            organization_name: row.get(3)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
