//! # Validation Module
//!
//! Input validation for ledger requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                              │
//! │                                                                     │
//! │  Layer 1: Caller (API / CRUD layer)                                 │
//! │  ├── Shape checks, deserialization                                  │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 2: THIS MODULE - business rule validation                    │
//! │  ├── runs before any stock or record mutation                       │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 3: Database (SQLite)                                         │
//! │  ├── NOT NULL / CHECK / FK constraints                              │
//! │                                                                     │
//! │  Defense in depth: a validation failure changes no state            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{NewLineItem, NewTransaction, TransactionKind};
use crate::{MAX_ITEM_QUANTITY, MAX_LINE_ITEMS, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a create request before anything touches the stock ledger.
pub fn validate_new_transaction(req: &NewTransaction) -> ValidationResult<()> {
    match req.kind {
        TransactionKind::Sale | TransactionKind::Reservation => {
            if req.items.is_empty() {
                return Err(ValidationError::Required {
                    field: "items".to_string(),
                });
            }
            validate_line_items(&req.items)?;
            if req.counterparty.name.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "counterparty.name".to_string(),
                });
            }
        }
        TransactionKind::Expense => {
            // Expenses never carry stock-bearing items.
            if !req.items.is_empty() {
                return Err(ValidationError::TooMany {
                    field: "items".to_string(),
                    max: 0,
                });
            }
            if req.counterparty.name.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "counterparty.name".to_string(),
                });
            }
        }
    }

    if let Some(phone) = &req.counterparty.phone {
        validate_phone(phone)?;
    }

    Ok(())
}

/// Validates a replacement item list supplied by an edit.
pub fn validate_line_items(items: &[NewLineItem]) -> ValidationResult<()> {
    if items.len() > MAX_LINE_ITEMS {
        return Err(ValidationError::TooMany {
            field: "items".to_string(),
            max: MAX_LINE_ITEMS,
        });
    }

    for item in items {
        if item.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "items.product_id".to_string(),
            });
        }
        if item.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "items.name".to_string(),
            });
        }
        if item.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "items.quantity".to_string(),
            });
        }
        if item.quantity > MAX_ITEM_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "items.quantity".to_string(),
                min: 1,
                max: MAX_ITEM_QUANTITY,
            });
        }
        if item.unit_price_cents < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "items.unit_price_cents".to_string(),
            });
        }
        if item.unit_price_cents > MAX_UNIT_PRICE_CENTS {
            return Err(ValidationError::OutOfRange {
                field: "items.unit_price_cents".to_string(),
                min: 0,
                max: MAX_UNIT_PRICE_CENTS,
            });
        }
    }

    Ok(())
}

/// Validates a counterparty phone (the aggregate natural key).
///
/// Kept deliberately loose: digits with optional leading `+`, separators
/// tolerated. The phone is a lookup key, not a dialable guarantee.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "phone".to_string(),
        });
    }
    if trimmed.len() > 20 {
        return Err(ValidationError::TooLong {
            field: "phone".to_string(),
            max: 20,
        });
    }
    let digits_ok = trimmed
        .chars()
        .enumerate()
        .all(|(i, c)| c.is_ascii_digit() || (i == 0 && c == '+') || c == ' ' || c == '-');
    if !digits_ok {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "digits, spaces, hyphens and a leading + only".to_string(),
        });
    }
    Ok(())
}

/// Requires a non-empty free-text reason (expense rejection, reviewed edits).
pub fn require_reason(reason: Option<&str>) -> ValidationResult<String> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(ValidationError::Required {
            field: "reason".to_string(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
