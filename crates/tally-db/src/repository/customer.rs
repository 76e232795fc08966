//! # Customer Repository
//!
//! Storage for the derived per-customer aggregates, keyed by phone.
//!
//! ## Two write paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  touch()           fast path, creation time only                    │
//! │                    upsert + increment (first write is cheap and     │
//! │                    cannot be wrong: nothing to void or edit yet)    │
//! │                                                                     │
//! │  replace_totals()  every later mutation                             │
//! │                    overwrites the four derived fields with the      │
//! │                    result of the pure fold - never incremental      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identity fields (name, email) are the only hand-editable columns; the
//! rest must always be reproducible by replaying the valid transactions.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{CustomerAggregate, CustomerTotals};

/// Repository for customer aggregates.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets an aggregate by phone.
    pub async fn get(&self, phone: &str) -> DbResult<Option<CustomerAggregate>> {
        let aggregate = sqlx::query_as::<_, CustomerAggregate>(
            r#"
            SELECT phone, name, email, total_purchases, total_spent_cents,
                   first_purchase_at, last_purchase_at, created_at, updated_at
            FROM customer_aggregates
            WHERE phone = ?1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(aggregate)
    }

    /// Fast path used only at transaction creation: creates the aggregate
    /// or increments an existing one.
    pub async fn touch(
        &self,
        phone: &str,
        name: &str,
        email: Option<&str>,
        total_cents: i64,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(phone = %phone, total_cents = %total_cents, "Touching customer aggregate");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO customer_aggregates (
                phone, name, email, total_purchases, total_spent_cents,
                first_purchase_at, last_purchase_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5, ?6, ?6)
            ON CONFLICT (phone) DO UPDATE SET
                name = excluded.name,
                email = COALESCE(excluded.email, email),
                total_purchases = total_purchases + 1,
                total_spent_cents = total_spent_cents + excluded.total_spent_cents,
                first_purchase_at = MIN(COALESCE(first_purchase_at, excluded.first_purchase_at), excluded.first_purchase_at),
                last_purchase_at = MAX(COALESCE(last_purchase_at, excluded.last_purchase_at), excluded.last_purchase_at),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(phone)
        .bind(name)
        .bind(email)
        .bind(total_cents)
        .bind(at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the four derived fields with a freshly folded result.
    ///
    /// An empty valid set resets the aggregate to zeros and null dates -
    /// the row is retained, never deleted.
    pub async fn replace_totals(&self, phone: &str, totals: &CustomerTotals) -> DbResult<()> {
        debug!(
            phone = %phone,
            purchases = totals.total_purchases,
            spent = totals.total_spent_cents,
            "Replacing customer aggregate totals"
        );
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO customer_aggregates (
                phone, name, total_purchases, total_spent_cents,
                first_purchase_at, last_purchase_at, created_at, updated_at
            ) VALUES (?1, '', ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (phone) DO UPDATE SET
                total_purchases = excluded.total_purchases,
                total_spent_cents = excluded.total_spent_cents,
                first_purchase_at = excluded.first_purchase_at,
                last_purchase_at = excluded.last_purchase_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(phone)
        .bind(totals.total_purchases)
        .bind(totals.total_spent_cents)
        .bind(totals.first_purchase_at)
        .bind(totals.last_purchase_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates the hand-editable identity fields only.
    pub async fn update_identity(
        &self,
        phone: &str,
        name: &str,
        email: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE customer_aggregates
            SET name = ?2, email = ?3, updated_at = ?4
            WHERE phone = ?1
            "#,
        )
        .bind(phone)
        .bind(name)
        .bind(email)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    async fn repo() -> CustomerRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.customers()
    }

    #[tokio::test]
    async fn test_touch_creates_then_increments() {
        let repo = repo().await;
        let first = Utc::now() - Duration::days(1);
        let second = Utc::now();

        repo.touch("0300", "Asif", None, 100, first).await.unwrap();
        repo.touch("0300", "Asif", Some("a@b.c"), 50, second)
            .await
            .unwrap();

        let aggregate = repo.get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_purchases, 2);
        assert_eq!(aggregate.total_spent_cents, 150);
        assert_eq!(aggregate.email.as_deref(), Some("a@b.c"));
        assert!(aggregate.first_purchase_at.unwrap() < aggregate.last_purchase_at.unwrap());
    }

    #[tokio::test]
    async fn test_replace_totals_overwrites() {
        let repo = repo().await;
        repo.touch("0300", "Asif", None, 100, Utc::now())
            .await
            .unwrap();

        let totals = CustomerTotals {
            total_purchases: 3,
            total_spent_cents: 750,
            first_purchase_at: Some(Utc::now() - Duration::days(3)),
            last_purchase_at: Some(Utc::now()),
        };
        repo.replace_totals("0300", &totals).await.unwrap();

        let aggregate = repo.get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_purchases, 3);
        assert_eq!(aggregate.total_spent_cents, 750);
        // Identity survives the replacement.
        assert_eq!(aggregate.name, "Asif");
    }

    #[tokio::test]
    async fn test_replace_totals_empty_set_resets_not_deletes() {
        let repo = repo().await;
        repo.touch("0300", "Asif", None, 100, Utc::now())
            .await
            .unwrap();

        repo.replace_totals("0300", &CustomerTotals::default())
            .await
            .unwrap();

        let aggregate = repo.get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_purchases, 0);
        assert_eq!(aggregate.total_spent_cents, 0);
        assert!(aggregate.first_purchase_at.is_none());
        assert!(aggregate.last_purchase_at.is_none());
    }

    #[tokio::test]
    async fn test_update_identity() {
        let repo = repo().await;
        repo.touch("0300", "Asif", None, 100, Utc::now())
            .await
            .unwrap();

        repo.update_identity("0300", "Asif Khan", Some("asif@example.com"))
            .await
            .unwrap();

        let aggregate = repo.get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.name, "Asif Khan");
        assert_eq!(aggregate.email.as_deref(), Some("asif@example.com"));
        // Derived fields untouched.
        assert_eq!(aggregate.total_purchases, 1);
    }
}
