//! # Customer Aggregate Fold
//!
//! The pure function behind `recompute`: derive a customer's lifetime totals
//! from the authoritative set of their transactions.
//!
//! ## Why a pure fold?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Incremental aggregate updates are not trustworthy once voids and   │
//! │  edits exist: a void must subtract exactly what was once added,     │
//! │  which requires re-deriving from the valid set anyway. So every     │
//! │  mutation after creation replays the fold. The fold is idempotent   │
//! │  and order-independent, which also makes racing recomputes          │
//! │  self-healing (last writer wins, and every writer is consistent).  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::types::{Transaction, TransactionStatus};

// =============================================================================
// Validity
// =============================================================================

/// Whether a transaction counts towards its counterparty's aggregate.
///
/// Valid = item-bearing kind (Sale/Reservation) and status not in
/// {Voided, Corrected}. Pending reservations count: money is considered
/// received at creation.
pub fn is_valid_for_aggregate(tx: &Transaction) -> bool {
    tx.kind.is_item_bearing()
        && !matches!(
            tx.status,
            TransactionStatus::Voided | TransactionStatus::Corrected
        )
}

// =============================================================================
// Totals
// =============================================================================

/// The four derived aggregate fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerTotals {
    pub total_purchases: i64,
    pub total_spent_cents: i64,
    pub first_purchase_at: Option<DateTime<Utc>>,
    pub last_purchase_at: Option<DateTime<Utc>>,
}

/// Folds the valid subset of `transactions` into aggregate totals.
///
/// The input does not need to be pre-filtered or sorted; the fold applies
/// the validity predicate itself and takes min/max over creation times.
/// An empty valid set yields zeros and `None` dates - the caller resets the
/// stored aggregate rather than deleting it.
pub fn fold_valid(transactions: &[Transaction]) -> CustomerTotals {
    let mut totals = CustomerTotals::default();

    let mut valid: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| is_valid_for_aggregate(tx))
        .collect();
    valid.sort_by_key(|tx| tx.created_at);

    for tx in valid {
        totals.total_purchases += 1;
        totals.total_spent_cents += tx.total_cents;
        if totals.first_purchase_at.is_none() {
            totals.first_purchase_at = Some(tx.created_at);
        }
        totals.last_purchase_at = Some(tx.created_at);
    }

    totals
}

// =============================================================================
// Unit Tests
// =============================================================================
