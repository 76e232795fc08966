//! # Ledger Service
//!
//! The orchestration layer: every mutating operation of the transaction
//! ledger lives here, composed from the pure rules in `tally-core` and the
//! three repositories.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Every mutation follows the same control flow:                      │
//! │                                                                     │
//! │   1. validate the request           (tally_core::validation)        │
//! │   2. admit the transition           (tally_core::lifecycle)         │
//! │   3. apply the stock effect         (StockRepository, atomic)       │
//! │   4. persist the record             (guarded update / insert)       │
//! │   5. recompute affected aggregates  (fold_valid replay)             │
//! │   6. publish the event              (EventBus, fire-and-forget)     │
//! │                                                                     │
//! │  A failure at any step leaves every earlier step undone: stock      │
//! │  adjustments carry their own rollback, and every record write or    │
//! │  delete is guarded by the loaded snapshot (status + updated_at),    │
//! │  which makes void and delete stock reversal exactly-once.           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBus, LedgerEvent};
use crate::pool::Database;
use crate::repository::transaction::TransactionFilter;
use tally_core::{
    fold_valid, history, lifecycle, validation, Actor, ChangeSet, CoreError, CustomerTotals,
    LineItem, NewLineItem, NewTransaction, Timeframe, TimeframeQuery, Transaction,
    TransactionAction, TransactionKind, TransactionPatch, TransactionStatus, ValidationError,
};

// =============================================================================
// Query Request
// =============================================================================

/// A read request against the ledger: a timeframe hint plus optional filters.
#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    pub timeframe: TimeframeQuery,
    pub status: Option<TransactionStatus>,
    pub kind: Option<TransactionKind>,
    pub customer_phone: Option<String>,
    pub search: Option<String>,
}

// =============================================================================
// Ledger
// =============================================================================

/// The transaction ledger service.
///
/// Cheap to clone; all clones share the same pool and event bus.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    events: EventBus,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Ledger {
            db,
            events: EventBus::new(),
        }
    }

    /// The event bus; subscribe before mutating to observe the changes.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The underlying database handle, for stock bootstrap and diagnostics.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a sale, reservation, or expense.
    ///
    /// Item-bearing kinds reserve stock all-or-nothing before the record is
    /// written; if the write then fails, the reservation is unwound. A sale
    /// is born `Completed`, reservations and expenses born `Pending`.
    pub async fn create(&self, req: NewTransaction, actor: &Actor) -> LedgerResult<Transaction> {
        validation::validate_new_transaction(&req)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let status = lifecycle::initial_status(req.kind);
        let line_items = build_line_items(&id, &req.items, now);
        let subtotal: i64 = line_items.iter().map(|i| i.line_total_cents).sum();
        let customer_phone = if req.kind.is_item_bearing() {
            req.counterparty.phone.clone()
        } else {
            None
        };

        let tx = Transaction {
            id: id.clone(),
            kind: req.kind,
            status,
            line_items,
            counterparty: req.counterparty,
            customer_phone,
            subtotal_cents: subtotal,
            total_cents: subtotal,
            payment_method: req.payment_method,
            notes: req.notes,
            edit_history: vec![history::entry_without_changes(
                &actor.id,
                format!("created {}", req.kind),
            )],
            created_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
            completed_at: (status == TransactionStatus::Completed).then_some(now),
            voided_at: None,
        };

        let reserved = tx.quantities_by_product();
        if tx.kind.is_item_bearing() {
            self.db.stock().reserve_all(&reserved).await?;
        }

        if let Err(err) = self.db.transactions().insert(&tx).await {
            // The record never existed; hand the reservation back.
            for (product_id, quantity) in &reserved {
                if let Err(undo) = self.db.stock().release(product_id, *quantity).await {
                    warn!(
                        product_id = %product_id,
                        error = %undo,
                        "Failed to release stock after aborted create"
                    );
                }
            }
            return Err(err.into());
        }

        if let Some(phone) = &tx.customer_phone {
            self.db
                .customers()
                .touch(
                    phone,
                    &tx.counterparty.name,
                    tx.counterparty.email.as_deref(),
                    tx.total_cents,
                    tx.created_at,
                )
                .await?;
        }

        info!(id = %tx.id, kind = %tx.kind, total_cents = tx.total_cents, "Created transaction");
        self.events.publish(LedgerEvent::Created {
            id: tx.id.clone(),
            kind: tx.kind,
        });
        Ok(tx)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Fetches one record, or NotFound.
    pub async fn get(&self, id: &str) -> LedgerResult<Transaction> {
        self.load(id).await
    }

    /// Resolves the timeframe and lists the matching records, newest first.
    pub async fn query(&self, query: &LedgerQuery) -> LedgerResult<(Timeframe, Vec<Transaction>)> {
        let timeframe = query.timeframe.resolve()?;
        let filter = TransactionFilter {
            timeframe: timeframe.clone(),
            status: query.status,
            kind: query.kind,
            customer_phone: query.customer_phone.clone(),
            search: query.search.clone(),
        };
        let records = self.db.transactions().list(&filter).await?;
        Ok((timeframe, records))
    }

    // =========================================================================
    // Lifecycle Transitions
    // =========================================================================

    /// Pending → Completed for a sale or reservation. The aggregate is not
    /// recomputed: pending reservations already count.
    pub async fn complete(&self, id: &str, actor: &Actor) -> LedgerResult<Transaction> {
        let mut tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Complete, actor)?;

        let (loaded_status, loaded_at) = (tx.status, tx.updated_at);
        let now = Utc::now();
        let mut changes = ChangeSet::new();
        changes.record("status", tx.status, TransactionStatus::Completed);

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(now);
        tx.updated_at = now;
        let reason = format!("completed {}", tx.kind);
        tx.edit_history.push(changes.into_entry(&actor.id, reason));

        self.db
            .transactions()
            .update(&tx, loaded_status, loaded_at)
            .await?;

        info!(id = %tx.id, "Completed transaction");
        self.events
            .publish(LedgerEvent::Completed { id: tx.id.clone() });
        Ok(tx)
    }

    /// Completed → Pending (admin only). Stock is untouched: the record
    /// held its reservation throughout.
    pub async fn reopen(&self, id: &str, actor: &Actor) -> LedgerResult<Transaction> {
        let mut tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Reopen, actor)?;

        let (loaded_status, loaded_at) = (tx.status, tx.updated_at);
        let now = Utc::now();
        let mut changes = ChangeSet::new();
        changes.record("status", tx.status, TransactionStatus::Pending);

        tx.status = TransactionStatus::Pending;
        tx.completed_at = None;
        tx.updated_at = now;
        let reason = format!("reopened {}", tx.kind);
        tx.edit_history.push(changes.into_entry(&actor.id, reason));

        self.db
            .transactions()
            .update(&tx, loaded_status, loaded_at)
            .await?;

        info!(id = %tx.id, "Reopened transaction");
        self.events
            .publish(LedgerEvent::Reopened { id: tx.id.clone() });
        Ok(tx)
    }

    /// Voids a sale or reservation: terminal, returns its stock, and
    /// removes it from the counterparty's aggregate.
    ///
    /// The snapshot-guarded write happens before the release, so of two
    /// racing voiders only the winner returns stock. The record is kept.
    pub async fn void(
        &self,
        id: &str,
        actor: &Actor,
        reason: Option<&str>,
    ) -> LedgerResult<Transaction> {
        let mut tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Void, actor)?;

        let (loaded_status, loaded_at) = (tx.status, tx.updated_at);
        let returned = tx.quantities_by_product();
        let now = Utc::now();
        let mut changes = ChangeSet::new();
        changes.record("status", tx.status, TransactionStatus::Voided);

        tx.status = TransactionStatus::Voided;
        tx.voided_at = Some(now);
        tx.updated_at = now;
        let reason = non_empty(reason).unwrap_or_else(|| format!("voided {}", tx.kind));
        tx.edit_history.push(changes.into_entry(&actor.id, reason));

        self.db
            .transactions()
            .update(&tx, loaded_status, loaded_at)
            .await?;

        for (product_id, quantity) in &returned {
            self.db.stock().release(product_id, *quantity).await?;
        }
        if let Some(phone) = tx.customer_phone.clone() {
            self.recompute_customer(&phone).await?;
        }

        info!(id = %tx.id, "Voided transaction");
        self.events.publish(LedgerEvent::Voided { id: tx.id.clone() });
        Ok(tx)
    }

    /// Hard removal. Stock is returned only when the record still holds it
    /// (a voided record already returned its units).
    ///
    /// The snapshot-guarded row deletion is the exactly-once gate: losing a
    /// race against a void, an edit, or another delete yields NotFound and
    /// releases nothing, so the quantities captured here can never be
    /// handed back twice.
    pub async fn delete(&self, id: &str, actor: &Actor) -> LedgerResult<()> {
        let tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Delete, actor)?;

        let returned = if tx.holds_stock() {
            tx.quantities_by_product()
        } else {
            Vec::new()
        };

        self.db
            .transactions()
            .delete(&tx.id, tx.status, tx.updated_at)
            .await?;

        for (product_id, quantity) in &returned {
            self.db.stock().release(product_id, *quantity).await?;
        }
        if let Some(phone) = &tx.customer_phone {
            self.recompute_customer(phone).await?;
        }

        info!(id = %tx.id, kind = %tx.kind, "Deleted transaction");
        self.events.publish(LedgerEvent::Deleted { id: tx.id });
        Ok(())
    }

    // =========================================================================
    // Edit
    // =========================================================================

    /// In-place edit of fields and items.
    ///
    /// Item quantity changes become signed stock deltas, applied atomically
    /// before the record write; if the guarded write then fails, the deltas
    /// are reversed. The audit entry records exactly the fields that
    /// actually changed. An edit that changes nothing writes nothing.
    pub async fn edit(
        &self,
        id: &str,
        patch: TransactionPatch,
        actor: &Actor,
    ) -> LedgerResult<Transaction> {
        if patch.is_empty() {
            return Err(ValidationError::Required {
                field: "patch".to_string(),
            }
            .into());
        }

        let mut tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Edit, actor)?;

        let (loaded_status, loaded_at) = (tx.status, tx.updated_at);
        let previous_phone = tx.customer_phone.clone();
        let reviewed = matches!(
            tx.status,
            TransactionStatus::Validated | TransactionStatus::Rejected
        );
        // Reviewed expenses demand an explicit reason; everywhere else a
        // synthetic description keeps the trail inspectable.
        let reason = if reviewed {
            validation::require_reason(patch.reason.as_deref())?
        } else {
            non_empty(patch.reason.as_deref()).unwrap_or_else(|| format!("edited {}", tx.kind))
        };

        let mut changes = ChangeSet::new();
        let mut deltas: Vec<(String, i64)> = Vec::new();

        if let Some(items) = &patch.items {
            if !tx.kind.is_item_bearing() {
                return Err(ValidationError::TooMany {
                    field: "items".to_string(),
                    max: 0,
                }
                .into());
            }
            if items.is_empty() {
                return Err(ValidationError::Required {
                    field: "items".to_string(),
                }
                .into());
            }
            validation::validate_line_items(items)?;

            let new_items = build_line_items(&tx.id, items, Utc::now());
            let new_subtotal: i64 = new_items.iter().map(|i| i.line_total_cents).sum();

            deltas = item_deltas(&tx.quantities_by_product(), &merged_quantities(items));
            changes.record(
                "items",
                render_items(&tx.line_items),
                render_items(&new_items),
            );
            changes.record("total_cents", tx.total_cents, new_subtotal);

            tx.line_items = new_items;
            tx.subtotal_cents = new_subtotal;
            tx.total_cents = new_subtotal;
        }

        if let Some(counterparty) = &patch.counterparty {
            if counterparty.name.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "counterparty.name".to_string(),
                }
                .into());
            }
            if let Some(phone) = &counterparty.phone {
                validation::validate_phone(phone)?;
            }
            changes.record("counterparty_name", &tx.counterparty.name, &counterparty.name);
            changes.record_opt(
                "counterparty_phone",
                tx.counterparty.phone.clone(),
                counterparty.phone.clone(),
            );
            changes.record_opt(
                "counterparty_email",
                tx.counterparty.email.clone(),
                counterparty.email.clone(),
            );
            tx.counterparty = counterparty.clone();
            if tx.kind.is_item_bearing() {
                tx.customer_phone = counterparty.phone.clone();
            }
        }

        if let Some(method) = patch.payment_method {
            changes.record("payment_method", tx.payment_method, method);
            tx.payment_method = method;
        }

        if let Some(notes) = &patch.notes {
            changes.record_opt("notes", tx.notes.clone(), Some(notes.clone()));
            tx.notes = Some(notes.clone());
        }

        // Everything the patch named already matches the record.
        if changes.is_empty() {
            return Ok(tx);
        }

        if !deltas.is_empty() {
            self.db.stock().apply_deltas(&deltas).await?;
        }

        tx.updated_at = Utc::now();
        tx.edit_history.push(changes.into_entry(&actor.id, reason));

        if let Err(err) = self
            .db
            .transactions()
            .update(&tx, loaded_status, loaded_at)
            .await
        {
            // The record write never landed; reverse the stock effect.
            if !deltas.is_empty() {
                let inverse: Vec<(String, i64)> =
                    deltas.iter().map(|(p, d)| (p.clone(), -d)).collect();
                if let Err(undo) = self.db.stock().apply_deltas(&inverse).await {
                    warn!(
                        id = %tx.id,
                        error = %undo,
                        "Failed to restore stock after aborted edit"
                    );
                }
            }
            return Err(err.into());
        }

        // Replay every aggregate the edit may have touched, old key and new.
        if tx.kind.is_item_bearing() {
            for phone in distinct_phones(previous_phone, tx.customer_phone.clone()) {
                self.recompute_customer(&phone).await?;
            }
        }

        info!(id = %tx.id, "Edited transaction");
        self.events
            .publish(LedgerEvent::Updated { id: tx.id.clone() });
        Ok(tx)
    }

    // =========================================================================
    // Expense Review
    // =========================================================================

    /// Pending → Validated (Manager+).
    pub async fn validate_expense(&self, id: &str, actor: &Actor) -> LedgerResult<Transaction> {
        let mut tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Validate, actor)?;

        let (loaded_status, loaded_at) = (tx.status, tx.updated_at);
        let mut changes = ChangeSet::new();
        changes.record("status", tx.status, TransactionStatus::Validated);

        tx.status = TransactionStatus::Validated;
        tx.updated_at = Utc::now();
        tx.edit_history
            .push(changes.into_entry(&actor.id, "validated expense"));

        self.db
            .transactions()
            .update(&tx, loaded_status, loaded_at)
            .await?;

        info!(id = %tx.id, "Validated expense");
        self.events
            .publish(LedgerEvent::Updated { id: tx.id.clone() });
        Ok(tx)
    }

    /// Pending → Rejected (Manager+, non-empty reason mandatory).
    pub async fn reject_expense(
        &self,
        id: &str,
        actor: &Actor,
        reason: Option<&str>,
    ) -> LedgerResult<Transaction> {
        let mut tx = self.load(id).await?;
        lifecycle::check_transition(&tx, TransactionAction::Reject, actor)?;
        let reason = validation::require_reason(reason)?;

        let (loaded_status, loaded_at) = (tx.status, tx.updated_at);
        let mut changes = ChangeSet::new();
        changes.record("status", tx.status, TransactionStatus::Rejected);

        tx.status = TransactionStatus::Rejected;
        tx.updated_at = Utc::now();
        tx.edit_history.push(changes.into_entry(&actor.id, reason));

        self.db
            .transactions()
            .update(&tx, loaded_status, loaded_at)
            .await?;

        info!(id = %tx.id, "Rejected expense");
        self.events
            .publish(LedgerEvent::Updated { id: tx.id.clone() });
        Ok(tx)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Re-derives one customer's aggregate from their full transaction set
    /// and overwrites the stored row. Idempotent.
    pub async fn recompute_customer(&self, phone: &str) -> LedgerResult<CustomerTotals> {
        let transactions = self.db.transactions().fetch_for_customer(phone).await?;
        let totals = fold_valid(&transactions);
        self.db.customers().replace_totals(phone, &totals).await?;
        Ok(totals)
    }

    async fn load(&self, id: &str) -> LedgerResult<Transaction> {
        self.db
            .transactions()
            .fetch(id)
            .await?
            .ok_or_else(|| LedgerError::Core(CoreError::not_found("Transaction", id)))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn build_line_items(
    transaction_id: &str,
    items: &[NewLineItem],
    at: chrono::DateTime<Utc>,
) -> Vec<LineItem> {
    items
        .iter()
        .map(|item| LineItem {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            product_id: item.product_id.clone(),
            name_snapshot: item.name.clone(),
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
            line_total_cents: item.line_total_cents(),
            created_at: at,
        })
        .collect()
}

/// Per-product quantities in a request item list, duplicates summed.
fn merged_quantities(items: &[NewLineItem]) -> Vec<(String, i64)> {
    let mut out: Vec<(String, i64)> = Vec::new();
    for item in items {
        match out.iter_mut().find(|(p, _)| p == &item.product_id) {
            Some((_, q)) => *q += item.quantity,
            None => out.push((item.product_id.clone(), item.quantity)),
        }
    }
    out
}

/// Signed stock adjustments taking `old` holdings to `new` ones.
/// Positive = return stock, negative = reserve more. Zeros are dropped.
fn item_deltas(old: &[(String, i64)], new: &[(String, i64)]) -> Vec<(String, i64)> {
    let mut deltas: Vec<(String, i64)> = Vec::new();

    for (product_id, old_qty) in old {
        let new_qty = new
            .iter()
            .find(|(p, _)| p == product_id)
            .map(|(_, q)| *q)
            .unwrap_or(0);
        let delta = old_qty - new_qty;
        if delta != 0 {
            deltas.push((product_id.clone(), delta));
        }
    }
    for (product_id, new_qty) in new {
        if !old.iter().any(|(p, _)| p == product_id) {
            deltas.push((product_id.clone(), -new_qty));
        }
    }

    deltas
}

fn render_items(items: &[LineItem]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|i| format!("{} x{}", i.name_snapshot, i.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn distinct_phones(a: Option<String>, b: Option<String>) -> Vec<String> {
    let mut phones = Vec::new();
    if let Some(phone) = a {
        phones.push(phone);
    }
    if let Some(phone) = b {
        if !phones.contains(&phone) {
            phones.push(phone);
        }
    }
    phones
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::{CounterpartySnapshot, PaymentMethod, PrivilegeTier};

    async fn ledger_with_stock(levels: &[(&str, i64)]) -> Ledger {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for (product, qty) in levels {
            db.stock().set_level(product, *qty).await.unwrap();
        }
        Ledger::new(db)
    }

    async fn available(ledger: &Ledger, product: &str) -> i64 {
        ledger
            .db()
            .stock()
            .get(product)
            .await
            .unwrap()
            .unwrap()
            .available
    }

    fn staff() -> Actor {
        Actor::new("owner", PrivilegeTier::Staff)
    }

    fn manager() -> Actor {
        Actor::new("mgr", PrivilegeTier::Manager)
    }

    fn admin() -> Actor {
        Actor::new("adm", PrivilegeTier::Admin)
    }

    fn sale_request(product: &str, qty: i64, unit_price: i64) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Sale,
            items: vec![NewLineItem {
                product_id: product.to_string(),
                name: "Cola".to_string(),
                unit_price_cents: unit_price,
                quantity: qty,
            }],
            counterparty: CounterpartySnapshot {
                name: "Asif".to_string(),
                phone: Some("0300".to_string()),
                email: None,
            },
            payment_method: PaymentMethod::Cash,
            notes: None,
        }
    }

    fn expense_request(name: &str) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            items: Vec::new(),
            counterparty: CounterpartySnapshot {
                name: name.to_string(),
                phone: None,
                email: None,
            },
            payment_method: PaymentMethod::Transfer,
            notes: Some("monthly bill".to_string()),
        }
    }

    fn items_patch(product: &str, qty: i64, unit_price: i64) -> TransactionPatch {
        TransactionPatch {
            items: Some(vec![NewLineItem {
                product_id: product.to_string(),
                name: "Cola".to_string(),
                unit_price_cents: unit_price,
                quantity: qty,
            }]),
            ..Default::default()
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    #[tokio::test]
    async fn test_create_sale_reserves_stock_and_touches_aggregate() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let mut events = ledger.events().subscribe();

        let tx = ledger
            .create(sale_request("p1", 2, 150), &staff())
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.completed_at.is_some());
        assert_eq!(tx.total_cents, 300);
        assert_eq!(tx.edit_history.len(), 1);
        assert_eq!(available(&ledger, "p1").await, 8);

        let aggregate = ledger.db().customers().get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_purchases, 1);
        assert_eq!(aggregate.total_spent_cents, 300);

        assert_eq!(
            events.recv().await.unwrap(),
            LedgerEvent::Created {
                id: tx.id.clone(),
                kind: TransactionKind::Sale,
            }
        );
    }

    #[tokio::test]
    async fn test_create_insufficient_stock_changes_nothing() {
        let ledger = ledger_with_stock(&[("p1", 1)]).await;

        let err = ledger
            .create(sale_request("p1", 2, 150), &staff())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(available(&ledger, "p1").await, 1);
        assert!(ledger.db().customers().get("0300").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_reservation_is_pending_and_counts() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let mut req = sale_request("p1", 3, 100);
        req.kind = TransactionKind::Reservation;

        let tx = ledger.create(req, &staff()).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.completed_at.is_none());
        assert_eq!(available(&ledger, "p1").await, 7);

        // Money is considered received at creation.
        let aggregate = ledger.db().customers().get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_spent_cents, 300);
    }

    #[tokio::test]
    async fn test_create_expense_touches_neither_stock_nor_customer() {
        let ledger = ledger_with_stock(&[]).await;

        let tx = ledger
            .create(expense_request("Electric Co"), &staff())
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.customer_phone.is_none());
        assert!(tx.line_items.is_empty());
    }

    // =========================================================================
    // Complete / Reopen
    // =========================================================================

    #[tokio::test]
    async fn test_complete_reservation() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let mut req = sale_request("p1", 2, 100);
        req.kind = TransactionKind::Reservation;
        let tx = ledger.create(req, &staff()).await.unwrap();

        let completed = ledger.complete(&tx.id, &staff()).await.unwrap();
        assert_eq!(completed.status, TransactionStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.edit_history.len(), 2);

        // Completing twice is an invalid transition.
        let err = ledger.complete(&tx.id, &staff()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InvalidTransition { .. })
        ));
        // No double reservation.
        assert_eq!(available(&ledger, "p1").await, 8);
    }

    #[tokio::test]
    async fn test_reopen_requires_admin() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 1, 100), &staff())
            .await
            .unwrap();

        let err = ledger.reopen(&tx.id, &manager()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::PermissionDenied { .. })
        ));

        let reopened = ledger.reopen(&tx.id, &admin()).await.unwrap();
        assert_eq!(reopened.status, TransactionStatus::Pending);
        assert!(reopened.completed_at.is_none());
        // The reservation was held throughout.
        assert_eq!(available(&ledger, "p1").await, 9);
    }

    // =========================================================================
    // Void / Delete
    // =========================================================================

    #[tokio::test]
    async fn test_void_releases_stock_exactly_once() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();
        assert_eq!(available(&ledger, "p1").await, 8);

        let voided = ledger.void(&tx.id, &staff(), Some("wrong item")).await.unwrap();
        assert_eq!(voided.status, TransactionStatus::Voided);
        assert!(voided.voided_at.is_some());
        assert_eq!(available(&ledger, "p1").await, 10);

        // Second void: rejected, stock untouched.
        let err = ledger.void(&tx.id, &staff(), None).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(available(&ledger, "p1").await, 10);
    }

    #[tokio::test]
    async fn test_void_removes_from_aggregate() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let keep = ledger
            .create(sale_request("p1", 1, 100), &staff())
            .await
            .unwrap();
        let cancelled = ledger
            .create(sale_request("p1", 1, 50), &staff())
            .await
            .unwrap();
        assert_eq!(keep.customer_phone, cancelled.customer_phone);

        ledger.void(&cancelled.id, &staff(), None).await.unwrap();

        // Sale(100, valid) + Sale(50, voided) => 100, not 150.
        let aggregate = ledger.db().customers().get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_purchases, 1);
        assert_eq!(aggregate.total_spent_cents, 100);
    }

    #[tokio::test]
    async fn test_delete_after_void_does_not_re_release() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();

        ledger.void(&tx.id, &staff(), None).await.unwrap();
        assert_eq!(available(&ledger, "p1").await, 10);

        ledger.delete(&tx.id, &staff()).await.unwrap();
        assert_eq!(available(&ledger, "p1").await, 10);
        assert!(ledger.db().transactions().fetch(&tx.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_live_sale_releases_stock() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 3, 100), &staff())
            .await
            .unwrap();
        assert_eq!(available(&ledger, "p1").await, 7);

        ledger.delete(&tx.id, &staff()).await.unwrap();
        assert_eq!(available(&ledger, "p1").await, 10);

        // The aggregate no longer sees the deleted record.
        let aggregate = ledger.db().customers().get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_purchases, 0);
        assert_eq!(aggregate.total_spent_cents, 0);
    }

    // =========================================================================
    // Edit
    // =========================================================================

    #[tokio::test]
    async fn test_edit_quantity_adjusts_stock_by_delta() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();
        assert_eq!(available(&ledger, "p1").await, 8);

        // 2 → 5: three more units reserved, not five.
        let edited = ledger
            .edit(&tx.id, items_patch("p1", 5, 100), &staff())
            .await
            .unwrap();
        assert_eq!(available(&ledger, "p1").await, 5);
        assert_eq!(edited.total_cents, 500);
        assert_eq!(edited.edit_history.len(), 2);

        let entry = &edited.edit_history[1];
        assert!(entry.changes.contains_key("items"));
        assert!(entry.changes.contains_key("total_cents"));
        assert_eq!(entry.reason, "edited sale");

        // Aggregate reflects the new total.
        let aggregate = ledger.db().customers().get("0300").await.unwrap().unwrap();
        assert_eq!(aggregate.total_spent_cents, 500);
    }

    #[tokio::test]
    async fn test_edit_insufficient_stock_leaves_everything_untouched() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();

        // 2 → 11 needs 9 more; only 8 remain.
        let err = ledger
            .edit(&tx.id, items_patch("p1", 11, 100), &staff())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(available(&ledger, "p1").await, 8);
        let reloaded = ledger.get(&tx.id).await.unwrap();
        assert_eq!(reloaded.line_items[0].quantity, 2);
        assert_eq!(reloaded.edit_history.len(), 1);
    }

    #[tokio::test]
    async fn test_edit_records_only_changed_fields() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();

        let patch = TransactionPatch {
            payment_method: Some(PaymentMethod::Card),
            notes: Some("paid later by card".to_string()),
            ..Default::default()
        };
        let edited = ledger.edit(&tx.id, patch, &staff()).await.unwrap();

        let entry = &edited.edit_history[1];
        assert_eq!(entry.changes.len(), 2);
        assert_eq!(
            entry.changes["payment_method"].to.as_deref(),
            Some("card")
        );
        assert!(!entry.changes.contains_key("counterparty_name"));
    }

    #[tokio::test]
    async fn test_edit_noop_patch_writes_nothing() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();

        // Same payment method as the record already has.
        let patch = TransactionPatch {
            payment_method: Some(PaymentMethod::Cash),
            ..Default::default()
        };
        let edited = ledger.edit(&tx.id, patch, &staff()).await.unwrap();
        assert_eq!(edited.edit_history.len(), 1);

        // A fully empty patch is rejected outright.
        let err = ledger
            .edit(&tx.id, TransactionPatch::default(), &staff())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_edit_changing_phone_recomputes_both_aggregates() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();

        let patch = TransactionPatch {
            counterparty: Some(CounterpartySnapshot {
                name: "Asif".to_string(),
                phone: Some("0999".to_string()),
                email: None,
            }),
            ..Default::default()
        };
        ledger.edit(&tx.id, patch, &staff()).await.unwrap();

        let old = ledger.db().customers().get("0300").await.unwrap().unwrap();
        assert_eq!(old.total_purchases, 0);
        let new = ledger.db().customers().get("0999").await.unwrap().unwrap();
        assert_eq!(new.total_purchases, 1);
        assert_eq!(new.total_spent_cents, 200);
    }

    #[tokio::test]
    async fn test_edit_voided_record_is_rejected() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        let tx = ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();
        ledger.void(&tx.id, &staff(), None).await.unwrap();

        let err = ledger
            .edit(&tx.id, items_patch("p1", 1, 100), &admin())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    // =========================================================================
    // Expense Review
    // =========================================================================

    #[tokio::test]
    async fn test_expense_validate_flow() {
        let ledger = ledger_with_stock(&[]).await;
        let tx = ledger
            .create(expense_request("Electric Co"), &staff())
            .await
            .unwrap();

        let err = ledger.validate_expense(&tx.id, &staff()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::PermissionDenied { .. })
        ));

        let validated = ledger.validate_expense(&tx.id, &manager()).await.unwrap();
        assert_eq!(validated.status, TransactionStatus::Validated);

        // Already reviewed: no second review.
        let err = ledger
            .reject_expense(&tx.id, &manager(), Some("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_expense_reject_requires_reason() {
        let ledger = ledger_with_stock(&[]).await;
        let tx = ledger
            .create(expense_request("Electric Co"), &staff())
            .await
            .unwrap();

        let err = ledger
            .reject_expense(&tx.id, &manager(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));

        let rejected = ledger
            .reject_expense(&tx.id, &manager(), Some("duplicate bill"))
            .await
            .unwrap();
        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(rejected.edit_history[1].reason, "duplicate bill");
    }

    #[tokio::test]
    async fn test_edit_reviewed_expense_needs_admin_and_reason() {
        let ledger = ledger_with_stock(&[]).await;
        let tx = ledger
            .create(expense_request("Electric Co"), &staff())
            .await
            .unwrap();
        ledger.validate_expense(&tx.id, &manager()).await.unwrap();

        let patch = TransactionPatch {
            notes: Some("amount corrected".to_string()),
            ..Default::default()
        };

        let err = ledger
            .edit(&tx.id, patch.clone(), &manager())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::PermissionDenied { .. })
        ));

        // Admin without a reason: rejected by validation.
        let err = ledger.edit(&tx.id, patch.clone(), &admin()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));

        let mut with_reason = patch;
        with_reason.reason = Some("typo in amount".to_string());
        let edited = ledger.edit(&tx.id, with_reason, &admin()).await.unwrap();
        assert_eq!(edited.edit_history.last().unwrap().reason, "typo in amount");
    }

    // =========================================================================
    // Aggregates & Query
    // =========================================================================

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        ledger
            .create(sale_request("p1", 2, 100), &staff())
            .await
            .unwrap();

        let first = ledger.recompute_customer("0300").await.unwrap();
        let second = ledger.recompute_customer("0300").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_purchases, 1);
        assert_eq!(first.total_spent_cents, 200);
    }

    #[tokio::test]
    async fn test_query_resolves_timeframe() {
        let ledger = ledger_with_stock(&[("p1", 10)]).await;
        ledger
            .create(sale_request("p1", 1, 100), &staff())
            .await
            .unwrap();
        ledger
            .create(expense_request("Electric Co"), &staff())
            .await
            .unwrap();

        // Default query: today.
        let (timeframe, records) = ledger.query(&LedgerQuery::default()).await.unwrap();
        assert_eq!(timeframe.label, "today");
        assert_eq!(records.len(), 2);

        let query = LedgerQuery {
            kind: Some(TransactionKind::Sale),
            ..Default::default()
        };
        let (_, sales) = ledger.query(&query).await.unwrap();
        assert_eq!(sales.len(), 1);

        // A long-past year matches nothing.
        let query = LedgerQuery {
            timeframe: TimeframeQuery {
                year: Some(2001),
                ..Default::default()
            },
            ..Default::default()
        };
        let (timeframe, records) = ledger.query(&query).await.unwrap();
        assert_eq!(timeframe.label, "2001");
        assert!(records.is_empty());
    }

    // =========================================================================
    // Helper Units
    // =========================================================================

    #[test]
    fn test_item_deltas() {
        let old = vec![("p1".to_string(), 2), ("p2".to_string(), 3)];
        let new = vec![("p1".to_string(), 5), ("p3".to_string(), 1)];

        let deltas = item_deltas(&old, &new);
        // p1: reserve 3 more, p2: return all 3, p3: reserve 1.
        assert!(deltas.contains(&("p1".to_string(), -3)));
        assert!(deltas.contains(&("p2".to_string(), 3)));
        assert!(deltas.contains(&("p3".to_string(), -1)));
        assert_eq!(deltas.len(), 3);
    }

    #[test]
    fn test_item_deltas_no_change_is_empty() {
        let holdings = vec![("p1".to_string(), 2)];
        assert!(item_deltas(&holdings, &holdings).is_empty());
    }
}
