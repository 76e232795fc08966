//! # tally-core: Pure Business Logic for the Tally POS Ledger
//!
//! This crate is the **heart** of the Tally POS transaction ledger. It
//! contains all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     Tally POS Architecture                          │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐ │
//! │  │           Surrounding CRUD / API layer (external)             │ │
//! │  │   catalog, credentials, notifications, receipt rendering      │ │
//! │  └─────────────────────────────┬─────────────────────────────────┘ │
//! │                                │                                   │
//! │  ┌─────────────────────────────▼─────────────────────────────────┐ │
//! │  │               ★ tally-core (THIS CRATE) ★                     │ │
//! │  │                                                               │ │
//! │  │  ┌──────────┐ ┌───────────┐ ┌─────────┐ ┌───────────────┐    │ │
//! │  │  │  types   │ │ lifecycle │ │ history │ │   timeframe   │    │ │
//! │  │  │ Txn/Item │ │  states   │ │  diffs  │ │   resolver    │    │ │
//! │  │  └──────────┘ └───────────┘ └─────────┘ └───────────────┘    │ │
//! │  │                                                               │ │
//! │  │  NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │ │
//! │  └─────────────────────────────┬─────────────────────────────────┘ │
//! │                                │                                   │
//! │  ┌─────────────────────────────▼─────────────────────────────────┐ │
//! │  │                  tally-db (Database Layer)                    │ │
//! │  │       stock ledger, record store, aggregates, events          │ │
//! │  └───────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Transaction, LineItem, CustomerAggregate, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`lifecycle`] - Transaction status state machine
//! - [`history`] - Append-only edit history and field diffing
//! - [`aggregate`] - Pure customer aggregate fold
//! - [`timeframe`] - Date-range resolution for ledger queries
//! - [`validation`] - Input validation for create/edit requests
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//! 5. **Closed Enums**: Status and kind are tagged unions with exhaustive
//!    matching at every transition - never free-form strings

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregate;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod money;
pub mod timeframe;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tally_core::Money` instead of
// `use tally_core::money::Money`

pub use aggregate::{fold_valid, is_valid_for_aggregate, CustomerTotals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use history::{ChangeSet, EditEntry, FieldChange};
pub use lifecycle::TransactionAction;
pub use money::Money;
pub use timeframe::{Timeframe, TimeframeQuery};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single transaction
///
/// ## Business Reason
/// Prevents runaway requests and keeps stock reservation loops bounded.
pub const MAX_LINE_ITEMS: usize = 100;

/// Maximum quantity of a single line item
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price, in cents (1,000,000.00 in major units)
///
/// ## Business Reason
/// Catches fat-fingered amounts, and bounds `unit_price * quantity` so line
/// totals stay far inside i64.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Inclusive bounds for the `year` hint accepted by the timeframe resolver.
///
/// Anything outside this window is almost certainly a typo (e.g. `224`),
/// so it is rejected instead of silently resolved.
pub const MIN_QUERY_YEAR: i32 = 2000;
pub const MAX_QUERY_YEAR: i32 = 2100;
