//! # Transaction Repository
//!
//! Row-level persistence for sale/reservation/expense records.
//!
//! ## Responsibilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  TransactionRepository                                              │
//! │                                                                     │
//! │  • insert record + items atomically                                 │
//! │  • fetch record with items and deserialized edit history            │
//! │  • guarded update/delete:                                           │
//! │      WHERE id = ? AND status = ?loaded AND updated_at = ?loaded     │
//! │    (zero rows affected = concurrent write, nothing changed)         │
//! │  • hard delete (items cascade)                                      │
//! │  • timeframe-windowed filter queries                                │
//! │                                                                     │
//! │  State-machine checks and stock effects live in ledger.rs; this     │
//! │  module never decides whether a mutation is allowed.                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{
    CounterpartySnapshot, EditEntry, LineItem, Timeframe, Transaction, TransactionKind,
    TransactionStatus,
};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw `transactions` row; items and history are attached afterwards.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    kind: TransactionKind,
    status: TransactionStatus,
    subtotal_cents: i64,
    total_cents: i64,
    payment_method: tally_core::PaymentMethod,
    counterparty_name: String,
    counterparty_phone: Option<String>,
    counterparty_email: Option<String>,
    customer_phone: Option<String>,
    notes: Option<String>,
    edit_history: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    voided_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_transaction(self, line_items: Vec<LineItem>) -> DbResult<Transaction> {
        let edit_history: Vec<EditEntry> =
            serde_json::from_str(&self.edit_history).map_err(|e| DbError::CorruptData {
                entity: "Transaction".to_string(),
                id: self.id.clone(),
                reason: format!("edit_history: {e}"),
            })?;

        Ok(Transaction {
            id: self.id,
            kind: self.kind,
            status: self.status,
            line_items,
            counterparty: CounterpartySnapshot {
                name: self.counterparty_name,
                phone: self.counterparty_phone,
                email: self.counterparty_email,
            },
            customer_phone: self.customer_phone,
            subtotal_cents: self.subtotal_cents,
            total_cents: self.total_cents,
            payment_method: self.payment_method,
            notes: self.notes,
            edit_history,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            voided_at: self.voided_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, kind, status, subtotal_cents, total_cents, payment_method,
           counterparty_name, counterparty_phone, counterparty_email,
           customer_phone, notes, edit_history, created_by,
           created_at, updated_at, completed_at, voided_at
    FROM transactions
"#;

// =============================================================================
// Filter
// =============================================================================

/// Query filter for the ledger's read surface.
///
/// The timeframe is always applied - it is the pagination mechanism. The
/// full matching set for the window is returned, newest first.
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub timeframe: Timeframe,
    pub status: Option<TransactionStatus>,
    pub kind: Option<TransactionKind>,
    pub customer_phone: Option<String>,
    /// Substring match over counterparty name/phone and notes.
    pub search: Option<String>,
}

impl TransactionFilter {
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        TransactionFilter {
            timeframe,
            status: None,
            kind: None,
            customer_phone: None,
            search: None,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for transaction records.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Inserts a record and its line items in one database transaction.
    pub async fn insert(&self, tx: &Transaction) -> DbResult<()> {
        debug!(id = %tx.id, kind = %tx.kind, "Inserting transaction");

        let history_json = history_json(tx)?;
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, status, subtotal_cents, total_cents, payment_method,
                counterparty_name, counterparty_phone, counterparty_email,
                customer_phone, notes, edit_history, created_by,
                created_at, updated_at, completed_at, voided_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17
            )
            "#,
        )
        .bind(&tx.id)
        .bind(tx.kind)
        .bind(tx.status)
        .bind(tx.subtotal_cents)
        .bind(tx.total_cents)
        .bind(tx.payment_method)
        .bind(&tx.counterparty.name)
        .bind(&tx.counterparty.phone)
        .bind(&tx.counterparty.email)
        .bind(&tx.customer_phone)
        .bind(&tx.notes)
        .bind(&history_json)
        .bind(&tx.created_by)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.completed_at)
        .bind(tx.voided_at)
        .execute(&mut *db_tx)
        .await?;

        for item in &tx.line_items {
            insert_item(&mut db_tx, item).await?;
        }

        db_tx.commit().await?;
        Ok(())
    }

    /// Fetches a record with its items and history.
    pub async fn fetch(&self, id: &str) -> DbResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.fetch_items(id).await?;
                Ok(Some(row.into_transaction(items)?))
            }
            None => Ok(None),
        }
    }

    /// Writes every mutable column (and replaces the item set), guarded by
    /// the snapshot the caller loaded: both the status and the `updated_at`
    /// instant must still match.
    ///
    /// Zero rows affected means the record was written, transitioned, or
    /// deleted concurrently; nothing is changed and the caller gets
    /// NotFound to re-read and retry its state-machine check. The
    /// `updated_at` half of the guard stops a stale full-record rewrite
    /// from clobbering an interleaved edit (and its history entry) that
    /// kept the same status.
    pub async fn update(
        &self,
        tx: &Transaction,
        expected_status: TransactionStatus,
        expected_updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %tx.id, status = %tx.status, "Updating transaction");

        let history_json = history_json(tx)?;
        let mut db_tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = ?2,
                subtotal_cents = ?3,
                total_cents = ?4,
                payment_method = ?5,
                counterparty_name = ?6,
                counterparty_phone = ?7,
                counterparty_email = ?8,
                customer_phone = ?9,
                notes = ?10,
                edit_history = ?11,
                updated_at = ?12,
                completed_at = ?13,
                voided_at = ?14
            WHERE id = ?1 AND status = ?15 AND updated_at = ?16
            "#,
        )
        .bind(&tx.id)
        .bind(tx.status)
        .bind(tx.subtotal_cents)
        .bind(tx.total_cents)
        .bind(tx.payment_method)
        .bind(&tx.counterparty.name)
        .bind(&tx.counterparty.phone)
        .bind(&tx.counterparty.email)
        .bind(&tx.customer_phone)
        .bind(&tx.notes)
        .bind(&history_json)
        .bind(tx.updated_at)
        .bind(tx.completed_at)
        .bind(tx.voided_at)
        .bind(expected_status)
        .bind(expected_updated_at)
        .execute(&mut *db_tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transaction", &tx.id));
        }

        sqlx::query("DELETE FROM transaction_items WHERE transaction_id = ?1")
            .bind(&tx.id)
            .execute(&mut *db_tx)
            .await?;
        for item in &tx.line_items {
            insert_item(&mut db_tx, item).await?;
        }

        db_tx.commit().await?;
        Ok(())
    }

    /// Hard delete, guarded by the snapshot the caller loaded. Items
    /// cascade via the foreign key.
    ///
    /// Zero rows affected means the record was transitioned, rewritten, or
    /// already removed; the caller gets NotFound and must not perform the
    /// side effects (stock release) it derived from its stale snapshot.
    pub async fn delete(
        &self,
        id: &str,
        expected_status: TransactionStatus,
        expected_updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, "Deleting transaction");

        let result =
            sqlx::query("DELETE FROM transactions WHERE id = ?1 AND status = ?2 AND updated_at = ?3")
                .bind(id)
                .bind(expected_status)
                .bind(expected_updated_at)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transaction", id));
        }
        Ok(())
    }

    /// All records referencing a counterparty phone, for aggregate replay.
    /// No status filter here: the fold applies the validity predicate.
    pub async fn fetch_for_customer(&self, phone: &str) -> DbResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "{SELECT_COLUMNS} WHERE customer_phone = ?1 ORDER BY created_at ASC"
        ))
        .bind(phone)
        .fetch_all(&self.pool)
        .await?;

        self.attach_items(rows).await
    }

    /// Timeframe-windowed filter query, newest first.
    pub async fn list(&self, filter: &TransactionFilter) -> DbResult<Vec<Transaction>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        qb.push(" WHERE created_at BETWEEN ");
        qb.push_bind(filter.timeframe.start);
        qb.push(" AND ");
        qb.push_bind(filter.timeframe.end);

        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ");
            qb.push_bind(kind);
        }
        if let Some(phone) = &filter.customer_phone {
            qb.push(" AND customer_phone = ");
            qb.push_bind(phone.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search.trim());
            qb.push(" AND (counterparty_name LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR counterparty_phone LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR notes LIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC");

        let rows: Vec<TransactionRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.attach_items(rows).await
    }

    async fn attach_items(&self, rows: Vec<TransactionRow>) -> DbResult<Vec<Transaction>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.fetch_items(&row.id).await?;
            out.push(row.into_transaction(items)?);
        }
        Ok(out)
    }

    async fn fetch_items(&self, transaction_id: &str) -> DbResult<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT id, transaction_id, product_id, name_snapshot,
                   unit_price_cents, quantity, line_total_cents, created_at
            FROM transaction_items
            WHERE transaction_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

fn history_json(tx: &Transaction) -> DbResult<String> {
    serde_json::to_string(&tx.edit_history).map_err(|e| DbError::Internal(e.to_string()))
}

async fn insert_item(
    db_tx: &mut sqlx::Transaction<'_, Sqlite>,
    item: &LineItem,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transaction_items (
            id, transaction_id, product_id, name_snapshot,
            unit_price_cents, quantity, line_total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&item.id)
    .bind(&item.transaction_id)
    .bind(&item.product_id)
    .bind(&item.name_snapshot)
    .bind(item.unit_price_cents)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(item.created_at)
    .execute(&mut **db_tx)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
