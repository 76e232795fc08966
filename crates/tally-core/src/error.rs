//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                 │
//! │                                                                     │
//! │  tally-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                    │
//! │  └── ValidationError  - Input validation failures                   │
//! │                                                                     │
//! │  tally-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                 │
//! │  └── LedgerError      - CoreError ∪ DbError for the service surface │
//! │                                                                     │
//! │  Flow: ValidationError → CoreError → LedgerError → caller           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, status, action)
//! 3. Errors are enum variants, never String
//! 4. Every variant is recoverable: no state changes before the error surfaces

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated to user-friendly messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced record, product, or counterparty does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Insufficient stock to satisfy a reservation or edit adjustment.
    ///
    /// ## When This Occurs
    /// - Reserving more units than currently available
    /// - Editing a line item to a higher quantity than stock can cover
    ///
    /// Any partial reservations made for the same multi-item operation are
    /// unwound before this error surfaces, so stock is unchanged.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The record's status does not allow the requested action.
    ///
    /// ## When This Occurs
    /// - Voiding an already-voided record
    /// - Editing a voided or corrected record
    /// - Completing an already-completed reservation
    /// - Validating an already-rejected expense
    #[error("Transaction {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: String,
        status: String,
        action: String,
    },

    /// The acting identity's privilege tier is insufficient.
    #[error("Permission denied: {action} requires {required} tier")]
    PermissionDenied { action: String, required: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        id: impl Into<String>,
        status: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            id: id.into(),
            status: status.into(),
            action: action.into(),
        }
    }

    /// Creates a PermissionDenied error.
    pub fn permission_denied(action: impl Into<String>, required: impl Into<String>) -> Self {
        CoreError::PermissionDenied {
            action: action.into(),
            required: required.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs; nothing has been
/// persisted when one of these surfaces.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., unparsable date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Collection exceeds the allowed size.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },

    /// An inverted range (from > to).
    #[error("range is inverted: {from} is after {to}")]
    InvertedRange { from: String, to: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
