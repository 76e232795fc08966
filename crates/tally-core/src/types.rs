//! # Domain Types
//!
//! Core domain types used throughout the Tally POS ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  ┌─────────────────┐  ┌──────────────────┐  ┌──────────────────┐   │
//! │  │  Transaction    │  │    LineItem      │  │   StockLevel     │   │
//! │  │  ─────────────  │  │  ──────────────  │  │  ──────────────  │   │
//! │  │  id (UUID)      │  │  product_id      │  │  product_id      │   │
//! │  │  kind / status  │  │  name_snapshot   │  │  available ≥ 0   │   │
//! │  │  total_cents    │  │  quantity > 0    │  └──────────────────┘   │
//! │  │  edit_history   │  │  unit_price      │                         │
//! │  └─────────────────┘  └──────────────────┘  ┌──────────────────┐   │
//! │                                             │ CustomerAggregate│   │
//! │  ┌─────────────────┐  ┌──────────────────┐  │  ──────────────  │   │
//! │  │ TransactionKind │  │TransactionStatus │  │  phone (key)     │   │
//! │  │  Sale           │  │  Pending         │  │  total_purchases │   │
//! │  │  Reservation    │  │  Completed       │  │  total_spent     │   │
//! │  │  Expense        │  │  Voided ...      │  │  first/last date │   │
//! │  └─────────────────┘  └──────────────────┘  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Line items freeze the product name and unit price at sale time, and the
//! counterparty name/phone/email are denormalized onto the record. The only
//! live references are `product_id` (into the stock ledger) and the
//! counterparty phone (into the aggregates table) - id + lookup, no ownership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::history::EditEntry;
use crate::money::Money;

// =============================================================================
// Transaction Kind
// =============================================================================

/// What a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// A completed sale: money and goods change hands immediately.
    Sale,
    /// Money received, fulfillment pending. Stock is reserved up front.
    Reservation,
    /// An outgoing expense. No line items, no stock, no customer link.
    Expense,
}

impl TransactionKind {
    /// Whether records of this kind carry line items and reserve stock.
    #[inline]
    pub const fn is_item_bearing(&self) -> bool {
        matches!(self, TransactionKind::Sale | TransactionKind::Reservation)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Sale => "sale",
            TransactionKind::Reservation => "reservation",
            TransactionKind::Expense => "expense",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Transaction Status
// =============================================================================

/// The status of a transaction.
///
/// Two independent state machines share this enum:
/// - Sale/Reservation: `Pending`, `Completed`, `Voided`, `Corrected`
/// - Expense: `Pending`, `Validated`, `Rejected`
///
/// [`crate::lifecycle`] enforces which statuses are reachable for which kind;
/// no code compares status strings ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting completion (reservation) or review (expense).
    Pending,
    /// Paid and fulfilled.
    Completed,
    /// Terminal cancellation; stock effect reversed, record kept for audit.
    Voided,
    /// Superseded by a correcting record (arrives via import, never produced
    /// here). Treated like Voided for edit gating and aggregate validity.
    Corrected,
    /// Expense approved by an elevated tier.
    Validated,
    /// Expense declined by an elevated tier, with a reason.
    Rejected,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Voided => "voided",
            TransactionStatus::Corrected => "corrected",
            TransactionStatus::Validated => "validated",
            TransactionStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Bank transfer / mobile money.
    Transfer,
    /// Anything else (voucher, barter, ...).
    Other,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Other => "other",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Privilege Tier & Actor
// =============================================================================

/// Privilege tier of the acting identity, supplied by the surrounding
/// identity provider. The ledger only compares tiers; it never manages
/// credentials.
///
/// Ordering is meaningful: `Staff < Manager < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeTier {
    /// Ordinary actor: creates records, edits own pending expenses.
    Staff,
    /// Elevated: validates/rejects expenses, edits others' pending expenses.
    Manager,
    /// Highest: reopens completed records, edits reviewed expenses,
    /// deletes any expense.
    Admin,
}

impl PrivilegeTier {
    /// Manager or above.
    #[inline]
    pub fn is_elevated(&self) -> bool {
        *self >= PrivilegeTier::Manager
    }

    /// Highest tier only.
    #[inline]
    pub fn is_admin(&self) -> bool {
        *self == PrivilegeTier::Admin
    }
}

/// The acting identity attached to every mutating call.
///
/// `id` is opaque to the ledger; it is recorded verbatim in audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub tier: PrivilegeTier,
}

impl Actor {
    pub fn new(id: impl Into<String>, tier: PrivilegeTier) -> Self {
        Actor {
            id: id.into(),
            tier,
        }
    }
}

// =============================================================================
// Counterparty Snapshot
// =============================================================================

/// Denormalized counterparty details captured at creation time.
///
/// Never live-joined against the customer aggregate: a later name change on
/// the aggregate does not rewrite past receipts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartySnapshot {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

// =============================================================================
// Line Item
// =============================================================================

/// A line item in a sale or reservation.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: String,
    pub transaction_id: String,
    /// Weak reference into the stock ledger.
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Quantity sold/reserved. Always > 0.
    pub quantity: i64,
    /// Line total (unit_price × quantity).
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// One sale, reservation, or expense, with its items and audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Ordered line items; empty for expenses.
    pub line_items: Vec<LineItem>,
    /// Snapshot of the counterparty at creation time.
    pub counterparty: CounterpartySnapshot,
    /// Weak reference (natural key) into the customer aggregates.
    /// Absent for expenses.
    pub customer_phone: Option<String>,
    pub subtotal_cents: i64,
    /// Always >= 0 and equal to subtotal (no discount concept).
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    /// Append-only. Entries are only ever pushed, never rewritten.
    pub edit_history: Vec<EditEntry>,
    /// Opaque id of whoever created the record.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Per-product quantities currently held by this record.
    ///
    /// Duplicate product lines are summed; the result is what void/delete
    /// must hand back to the stock ledger.
    pub fn quantities_by_product(&self) -> Vec<(String, i64)> {
        let mut out: Vec<(String, i64)> = Vec::new();
        for item in &self.line_items {
            match out.iter_mut().find(|(p, _)| p == &item.product_id) {
                Some((_, q)) => *q += item.quantity,
                None => out.push((item.product_id.clone(), item.quantity)),
            }
        }
        out
    }

    /// Whether this record still holds reserved stock.
    ///
    /// Voided records already returned theirs; corrected records arrive
    /// with their stock effect undone by the correcting import.
    pub fn holds_stock(&self) -> bool {
        self.kind.is_item_bearing()
            && !matches!(
                self.status,
                TransactionStatus::Voided | TransactionStatus::Corrected
            )
    }
}

// =============================================================================
// Stock Level
// =============================================================================

/// Available quantity for one product. Owned exclusively by the stock
/// ledger; transaction records only reference `product_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevel {
    pub product_id: String,
    /// Never negative; enforced by the conditional decrement.
    pub available: i64,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer Aggregate
// =============================================================================

/// Derived per-customer lifetime totals, keyed by phone (natural key).
///
/// Wholly reproducible by replaying all valid transactions for the phone;
/// only `name` and `email` are hand-editable identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CustomerAggregate {
    pub phone: String,
    pub name: String,
    pub email: Option<String>,
    pub total_purchases: i64,
    pub total_spent_cents: i64,
    pub first_purchase_at: Option<DateTime<Utc>>,
    pub last_purchase_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Request Types
// =============================================================================

/// A line item as supplied by the caller (catalog snapshot already resolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl NewLineItem {
    /// Line total for this request item.
    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }
}

/// Request to create a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    /// Must be non-empty for Sale/Reservation, empty for Expense.
    pub items: Vec<NewLineItem>,
    pub counterparty: CounterpartySnapshot,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Request to edit a transaction. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPatch {
    /// Full replacement item list; quantity changes become stock deltas.
    pub items: Option<Vec<NewLineItem>>,
    pub counterparty: Option<CounterpartySnapshot>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    /// Free-text reason recorded in the audit entry. Mandatory when editing
    /// reviewed expenses; defaulted to a synthetic description otherwise.
    pub reason: Option<String>,
}

impl TransactionPatch {
    /// True when the patch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.items.is_none()
            && self.counterparty.is_none()
            && self.payment_method.is_none()
            && self.notes.is_none()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
