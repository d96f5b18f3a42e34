//! Read-only share links for an organization
//!
//! A member issues a token; anyone holding it can read the organization's
//! member list and expenses until the token expires or is revoked.

use chrono::{TimeDelta, Utc};
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::expenses::ExpenseAggregator;
use crate::models::{Expense, ExpenseQuery, PublicOrganization, ShareToken};

/// Lifetime of a share link when none is requested
pub const DEFAULT_SHARE_DAYS: i64 = 7;

/// Longest lifetime a share link may be given
pub const MAX_SHARE_DAYS: i64 = 365;

/// Share link service
#[derive(Clone)]
pub struct ShareLinks {
    db: Database,
    expenses: ExpenseAggregator,
}

impl ShareLinks {
    pub fn new(db: Database, expenses: ExpenseAggregator) -> Self {
        Self { db, expenses }
    }

    /// Issue a share link for the caller's organization
    pub fn create(&self, user_id: &str, expires_in_days: Option<i64>) -> Result<ShareToken> {
        let days = expires_in_days.unwrap_or(DEFAULT_SHARE_DAYS);
        if !(1..=MAX_SHARE_DAYS).contains(&days) {
            return Err(Error::InvalidData(format!(
                "Share link lifetime must be between 1 and {} days, got {}",
                MAX_SHARE_DAYS, days
            )));
        }
        let organization = self.db.user_organization(user_id)?.ok_or_else(|| {
            Error::InvalidData(format!("User {} does not belong to an organization", user_id))
        })?;

        let now = Utc::now();
        let lifetime = TimeDelta::try_days(days)
            .ok_or_else(|| Error::InvalidData(format!("Share link lifetime out of range: {}", days)))?;
        let share = ShareToken {
            token: uuid::Uuid::new_v4().simple().to_string(),
            organization_name: organization,
            created_by: user_id.to_string(),
            created_at: now,
            expires_at: now + lifetime,
            active: true,
        };
        self.db.insert_share_token(&share)?;

        info!(
            "Share link for '{}' issued by {} (expires {})",
            share.organization_name, user_id, share.expires_at
        );
        Ok(share)
    }

    /// Look up a token that still grants access
    ///
    /// Unknown tokens are `NotFound`; revoked or expired ones are `Forbidden`.
    pub fn resolve(&self, token: &str) -> Result<ShareToken> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidData("Share token is required".into()));
        }

        let share = self
            .db
            .get_share_token(token)?
            .ok_or_else(|| Error::NotFound("Share link not found".into()))?;
        if !share.active {
            warn!("Revoked share link used for '{}'", share.organization_name);
            return Err(Error::Forbidden("Share link has been revoked".into()));
        }
        if share.is_expired(Utc::now()) {
            warn!("Expired share link used for '{}'", share.organization_name);
            return Err(Error::Forbidden("Share link has expired".into()));
        }
        Ok(share)
    }

    /// Organization name and members behind a token
    pub fn organization(&self, token: &str) -> Result<PublicOrganization> {
        let share = self.resolve(token)?;
        let members = self.db.list_organization_members(&share.organization_name)?;
        Ok(PublicOrganization {
            name: share.organization_name,
            members,
        })
    }

    /// Expenses of every member of the token's organization, newest first
    pub fn expenses(&self, token: &str, query: &ExpenseQuery) -> Result<Vec<Expense>> {
        let share = self.resolve(token)?;
        self.expenses
            .list_for_organization(&share.organization_name, query)
    }

    /// Share links issued for the caller's organization
    pub fn list(&self, user_id: &str) -> Result<Vec<ShareToken>> {
        match self.db.user_organization(user_id)? {
            Some(organization) => self.db.list_share_tokens(&organization),
            None => Ok(Vec::new()),
        }
    }

    /// Revoke a share link. Any member of its organization may revoke it.
    pub fn revoke(&self, user_id: &str, token: &str) -> Result<ShareToken> {
        let share = self
            .db
            .get_share_token(token.trim())?
            .ok_or_else(|| Error::NotFound("Share link not found".into()))?;
        if self.db.user_organization(user_id)?.as_deref() != Some(share.organization_name.as_str()) {
            return Err(Error::Forbidden(format!(
                "Not a member of organization '{}'",
                share.organization_name
            )));
        }

        self.db.deactivate_share_token(&share.token)?;
        info!(
            "Share link for '{}' revoked by {}",
            share.organization_name, user_id
        );
        Ok(ShareToken {
            active: false,
            ..share
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CategoryClassifier;
    use crate::db::new_id;
    use crate::models::{Category, ClassificationMethod};
    use chrono::NaiveDate;

    fn setup() -> (Database, ShareLinks) {
        let db = Database::in_memory().unwrap();
        for user in ["alice", "bob", "carol"] {
            db.upsert_user(user, &format!("{}@example.com", user), user)
                .unwrap();
        }
        db.set_user_organization("alice", Some("Acme")).unwrap();
        db.set_user_organization("bob", Some("Acme")).unwrap();
        let expenses = ExpenseAggregator::new(db.clone(), CategoryClassifier::default());
        (db.clone(), ShareLinks::new(db, expenses))
    }

    fn add_expense(db: &Database, user: &str, amount: f64, day: u32) {
        let now = Utc::now();
        db.insert_expense(&Expense {
            id: new_id(),
            user_id: user.to_string(),
            receipt_id: "manual-test".to_string(),
            category: Category::Food,
            amount,
            date: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            store_name: format!("Shop {}", day),
            store_address: None,
            store_phone_number: None,
            description: None,
            item_name: None,
            classification_method: ClassificationMethod::Manual,
            classification_confidence: Some(1.0),
            budget_id: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    }

    #[test]
    fn test_share_link_exposes_organization() {
        let (db, links) = setup();
        add_expense(&db, "alice", 1000.0, 1);
        add_expense(&db, "bob", 2000.0, 2);
        add_expense(&db, "carol", 3000.0, 3);

        let share = links.create("bob", None).unwrap();
        assert_eq!(share.organization_name, "Acme");
        assert_eq!(share.token.len(), 32);
        assert!(share.expires_at > Utc::now() + TimeDelta::days(6));

        let organization = links.organization(&share.token).unwrap();
        assert_eq!(organization.name, "Acme");
        let ids: Vec<_> = organization.members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);

        let expenses = links.expenses(&share.token, &ExpenseQuery::default()).unwrap();
        let amounts: Vec<f64> = expenses.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![2000.0, 1000.0]);

        let capped = ExpenseQuery {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(links.expenses(&share.token, &capped).unwrap().len(), 1);
    }

    #[test]
    fn test_create_requires_organization_and_sane_lifetime() {
        let (_db, links) = setup();
        assert!(matches!(
            links.create("carol", None).unwrap_err(),
            Error::InvalidData(_)
        ));
        for days in [0, -1, MAX_SHARE_DAYS + 1] {
            assert!(matches!(
                links.create("alice", Some(days)).unwrap_err(),
                Error::InvalidData(_)
            ));
        }
        assert!(links.create("alice", Some(MAX_SHARE_DAYS)).is_ok());
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let (_db, links) = setup();
        assert!(matches!(
            links.resolve("no-such-token").unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(links.resolve("  ").unwrap_err(), Error::InvalidData(_)));
    }

    #[test]
    fn test_expired_token_is_forbidden() {
        let (db, links) = setup();
        add_expense(&db, "alice", 1000.0, 1);
        let share = links.create("alice", Some(1)).unwrap();

        db.conn()
            .unwrap()
            .execute(
                "UPDATE share_tokens SET expires_at = datetime('now', '-1 minute') WHERE token = ?",
                [&share.token],
            )
            .unwrap();

        assert!(matches!(
            links.organization(&share.token).unwrap_err(),
            Error::Forbidden(_)
        ));
        assert!(matches!(
            links
                .expenses(&share.token, &ExpenseQuery::default())
                .unwrap_err(),
            Error::Forbidden(_)
        ));
    }

    #[test]
    fn test_revoked_token_is_forbidden() {
        let (_db, links) = setup();
        let share = links.create("alice", None).unwrap();

        // Only members of the organization may revoke
        assert!(matches!(
            links.revoke("carol", &share.token).unwrap_err(),
            Error::Forbidden(_)
        ));
        assert!(links.resolve(&share.token).is_ok());

        let revoked = links.revoke("bob", &share.token).unwrap();
        assert!(!revoked.active);
        assert!(matches!(
            links.resolve(&share.token).unwrap_err(),
            Error::Forbidden(_)
        ));
        assert!(matches!(
            links
                .expenses(&share.token, &ExpenseQuery::default())
                .unwrap_err(),
            Error::Forbidden(_)
        ));

        let listed = links.list("alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].active);
        assert!(links.list("carol").unwrap().is_empty());
    }
}
