//! # Stock Repository
//!
//! Per-product available quantities with conditional reserve / release.
//!
//! ## Reservation Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  ❌ WRONG (read-modify-write race)                                  │
//! │     SELECT available ... ; if enough: UPDATE ... SET available = n  │
//! │     Two terminals can both pass the check and oversell.             │
//! │                                                                     │
//! │  ✅ RIGHT (single atomic step)                                      │
//! │     UPDATE stock_levels                                             │
//! │        SET available = available - ?qty                             │
//! │      WHERE product_id = ? AND available >= ?qty                     │
//! │     rows_affected == 0  →  InsufficientStock (stock untouched)      │
//! │                                                                     │
//! │  Concurrent reservations that together exceed stock: exactly one    │
//! │  succeeds. No retry loop, no external lock - the conditional        │
//! │  decrement fails fast.                                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Release is a plain relative increment and never fails; over-release is a
//! caller bug, not a ledger error - callers track exactly what they reserved.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbResult, LedgerError, LedgerResult};
use tally_core::{CoreError, StockLevel};

/// Repository for the stock ledger.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets the stock level for a product.
    pub async fn get(&self, product_id: &str) -> DbResult<Option<StockLevel>> {
        let level = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT product_id, available, updated_at
            FROM stock_levels
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level)
    }

    /// Sets a product's available quantity outright (catalog bootstrap /
    /// restock). Not a reservation path.
    pub async fn set_level(&self, product_id: &str, available: i64) -> DbResult<()> {
        debug!(product_id = %product_id, available = %available, "Setting stock level");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, available, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (product_id) DO UPDATE SET
                available = excluded.available,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(available)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Conditionally reserves `quantity` units of a product.
    ///
    /// Succeeds only if `available >= quantity` at the instant of the
    /// check-and-decrement. On failure the level is untouched and the error
    /// carries the current availability.
    pub async fn reserve(&self, product_id: &str, quantity: i64) -> LedgerResult<()> {
        debug!(product_id = %product_id, quantity = %quantity, "Reserving stock");
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE stock_levels
            SET available = available - ?2,
                updated_at = ?3
            WHERE product_id = ?1 AND available >= ?2
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish an unknown product from a genuine shortage.
            return match self.get(product_id).await? {
                Some(level) => Err(LedgerError::Core(CoreError::InsufficientStock {
                    product_id: product_id.to_string(),
                    available: level.available,
                    requested: quantity,
                })),
                None => Err(LedgerError::Core(CoreError::not_found(
                    "Product",
                    product_id,
                ))),
            };
        }

        Ok(())
    }

    /// Returns `quantity` units of a product. Never fails: an unknown
    /// product gets a row so the returned units are not lost.
    pub async fn release(&self, product_id: &str, quantity: i64) -> DbResult<()> {
        debug!(product_id = %product_id, quantity = %quantity, "Releasing stock");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, available, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (product_id) DO UPDATE SET
                available = available + excluded.available,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reserves every `(product_id, quantity)` pair, in the order supplied,
    /// all-or-nothing.
    ///
    /// If any reservation fails, every already-successful reservation is
    /// released before the error surfaces - stock is exactly as it was
    /// before the call.
    pub async fn reserve_all(&self, items: &[(String, i64)]) -> LedgerResult<()> {
        let mut reserved: Vec<&(String, i64)> = Vec::with_capacity(items.len());

        for pair in items {
            let (product_id, quantity) = pair;
            if let Err(err) = self.reserve(product_id, *quantity).await {
                warn!(
                    product_id = %product_id,
                    reserved_so_far = reserved.len(),
                    "Multi-item reservation failed, unwinding"
                );
                self.release_pairs(&reserved).await?;
                return Err(err);
            }
            reserved.push(pair);
        }

        Ok(())
    }

    /// Applies signed per-product adjustments, all-or-nothing.
    ///
    /// Positive delta = return stock, negative delta = reserve more (which
    /// can fail with InsufficientStock). On failure, the deltas already
    /// applied for this call are reversed before the error surfaces.
    pub async fn apply_deltas(&self, deltas: &[(String, i64)]) -> LedgerResult<()> {
        let mut applied: Vec<(String, i64)> = Vec::with_capacity(deltas.len());

        for (product_id, delta) in deltas {
            let outcome = match *delta {
                0 => continue,
                d if d > 0 => self.release(product_id, d).await.map_err(LedgerError::from),
                d => self.reserve(product_id, -d).await,
            };

            if let Err(err) = outcome {
                warn!(
                    product_id = %product_id,
                    applied_so_far = applied.len(),
                    "Stock adjustment failed, rolling back"
                );
                // Reverse sign to undo what was applied.
                for (undo_product, undo_delta) in applied.iter().rev() {
                    if *undo_delta > 0 {
                        // A release is undone by an unconditional decrement:
                        // the units we just added are guaranteed present.
                        self.force_decrement(undo_product, *undo_delta).await?;
                    } else {
                        self.release(undo_product, -undo_delta).await?;
                    }
                }
                return Err(err);
            }

            applied.push((product_id.clone(), *delta));
        }

        Ok(())
    }

    /// Unconditional decrement used only to undo a release performed earlier
    /// in the same rollback; the units are known to be present.
    async fn force_decrement(&self, product_id: &str, quantity: i64) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE stock_levels
            SET available = available - ?2,
                updated_at = ?3
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_pairs(&self, pairs: &[&(String, i64)]) -> DbResult<()> {
        for (product_id, quantity) in pairs.iter().rev() {
            self.release(product_id, *quantity).await?;
        }
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

    async fn stock_with(levels: &[(&str, i64)]) -> StockRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stock = db.stock();
        for (product, qty) in levels {
            stock.set_level(product, *qty).await.unwrap();
        }
        stock
    }

    async fn available(stock: &StockRepository, product: &str) -> i64 {
        stock.get(product).await.unwrap().unwrap().available
    }

    #[tokio::test]
    async fn test_reserve_release_roundtrip() {
        // stock=10, reserve(5)→Ok(5), reserve(6)→InsufficientStock(5),
        // release(5)→Ok(10)
        let stock = stock_with(&[("p1", 10)]).await;

        stock.reserve("p1", 5).await.unwrap();
        assert_eq!(available(&stock, "p1").await, 5);

        let err = stock.reserve("p1", 6).await.unwrap_err();
        match err {
            LedgerError::Core(CoreError::InsufficientStock {
                available: a,
                requested,
                ..
            }) => {
                assert_eq!(a, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("expected InsufficientStock, got {other}"),
        }
        assert_eq!(available(&stock, "p1").await, 5);

        stock.release("p1", 5).await.unwrap();
        assert_eq!(available(&stock, "p1").await, 10);
    }

    #[tokio::test]
    async fn test_reserve_unknown_product_is_not_found() {
        let stock = stock_with(&[]).await;
        let err = stock.reserve("ghost", 1).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reserve_never_goes_negative() {
        let stock = stock_with(&[("p1", 3)]).await;
        assert!(stock.reserve("p1", 4).await.is_err());
        assert_eq!(available(&stock, "p1").await, 3);

        stock.reserve("p1", 3).await.unwrap();
        assert_eq!(available(&stock, "p1").await, 0);
        assert!(stock.reserve("p1", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_exactly_one_wins() {
        // Two reservations that together exceed stock: one Ok, one error.
        let stock = stock_with(&[("p1", 10)]).await;

        let (a, b) = tokio::join!(stock.reserve("p1", 7), stock.reserve("p1", 7));
        assert!(a.is_ok() != b.is_ok(), "exactly one must succeed");
        assert_eq!(available(&stock, "p1").await, 3);
    }

    #[tokio::test]
    async fn test_reserve_all_is_all_or_nothing() {
        // 3-item reservation where the 3rd fails: items 1 and 2 are
        // returned, stock exactly as before.
        let stock = stock_with(&[("p1", 5), ("p2", 5), ("p3", 1)]).await;

        let items = vec![
            ("p1".to_string(), 2),
            ("p2".to_string(), 3),
            ("p3".to_string(), 2),
        ];
        let err = stock.reserve_all(&items).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(available(&stock, "p1").await, 5);
        assert_eq!(available(&stock, "p2").await, 5);
        assert_eq!(available(&stock, "p3").await, 1);
    }

    #[tokio::test]
    async fn test_reserve_all_success() {
        let stock = stock_with(&[("p1", 5), ("p2", 5)]).await;
        stock
            .reserve_all(&[("p1".to_string(), 2), ("p2".to_string(), 5)])
            .await
            .unwrap();
        assert_eq!(available(&stock, "p1").await, 3);
        assert_eq!(available(&stock, "p2").await, 0);
    }

    #[tokio::test]
    async fn test_apply_deltas_mixed() {
        let stock = stock_with(&[("p1", 10), ("p2", 10)]).await;

        // Return 3 of p1, reserve 4 more of p2.
        stock
            .apply_deltas(&[("p1".to_string(), 3), ("p2".to_string(), -4)])
            .await
            .unwrap();
        assert_eq!(available(&stock, "p1").await, 13);
        assert_eq!(available(&stock, "p2").await, 6);
    }

    #[tokio::test]
    async fn test_apply_deltas_rolls_back_on_failure() {
        let stock = stock_with(&[("p1", 10), ("p2", 1)]).await;

        // First delta succeeds (release), second fails (reserve 5 from 1).
        let err = stock
            .apply_deltas(&[("p1".to_string(), 3), ("p2".to_string(), -5)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InsufficientStock { .. })
        ));

        // Both products back to the pre-call levels.
        assert_eq!(available(&stock, "p1").await, 10);
        assert_eq!(available(&stock, "p2").await, 1);
    }

    #[tokio::test]
    async fn test_release_for_unknown_product_creates_row() {
        let stock = stock_with(&[]).await;
        stock.release("new-product", 4).await.unwrap();
        assert_eq!(available(&stock, "new-product").await, 4);
    }
}
