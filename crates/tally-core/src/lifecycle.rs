//! # Transaction Lifecycle
//!
//! The status state machine for sales, reservations, and expenses.
//!
//! ## State Machines
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Sale / Reservation                                                 │
//! │                                                                     │
//! │   create(Sale) ────────────────► Completed                          │
//! │   create(Reservation) ─► Pending                                    │
//! │                                                                     │
//! │   Pending ──complete──► Completed                                   │
//! │   Completed ──reopen──► Pending          (Admin only)               │
//! │   {Pending, Completed} ──void──► Voided  (terminal, returns stock)  │
//! │   any ──delete──► gone                   (stock returned once)      │
//! │   {Pending, Completed} ──edit──► same    (stock deltas applied)     │
//! │                                                                     │
//! │  Expense (independent, no stock, no customer link)                  │
//! │                                                                     │
//! │   create ─► Pending                                                 │
//! │   Pending ──validate──► Validated        (Manager+)                 │
//! │   Pending ──reject────► Rejected         (Manager+, reason)         │
//! │   Pending ──edit──► Pending              (recorder or Manager+)     │
//! │   {Validated, Rejected} ──edit──► same   (Admin, reason)            │
//! │   Pending ──delete──► gone               (recorder or Admin)        │
//! │   any ──delete──► gone                   (Admin)                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every check here is a pure function over `(kind, status, action, actor)`,
//! matched exhaustively. Callers perform stock and aggregate side effects
//! only after the transition has been admitted.

use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::{Actor, Transaction, TransactionKind, TransactionStatus};

// =============================================================================
// Actions
// =============================================================================

/// A state-changing request against a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionAction {
    /// Pending → Completed (sale/reservation).
    Complete,
    /// Completed → Pending (sale/reservation, Admin only).
    Reopen,
    /// {Pending, Completed} → Voided. Terminal.
    Void,
    /// In-place field/item changes.
    Edit,
    /// Hard removal, distinct from void.
    Delete,
    /// Pending → Validated (expense, Manager+).
    Validate,
    /// Pending → Rejected (expense, Manager+, reason required).
    Reject,
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionAction::Complete => "complete",
            TransactionAction::Reopen => "reopen",
            TransactionAction::Void => "void",
            TransactionAction::Edit => "edit",
            TransactionAction::Delete => "delete",
            TransactionAction::Validate => "validate",
            TransactionAction::Reject => "reject",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Transition Checks
// =============================================================================

/// Admits or rejects `action` on `tx` for `actor`.
///
/// Returns `Ok(())` when the transition is legal; otherwise
/// [`CoreError::InvalidTransition`] or [`CoreError::PermissionDenied`],
/// with no state changed.
pub fn check_transition(tx: &Transaction, action: TransactionAction, actor: &Actor) -> CoreResult<()> {
    match tx.kind {
        TransactionKind::Sale | TransactionKind::Reservation => {
            check_sale_transition(tx, action, actor)
        }
        TransactionKind::Expense => check_expense_transition(tx, action, actor),
    }
}

fn check_sale_transition(
    tx: &Transaction,
    action: TransactionAction,
    actor: &Actor,
) -> CoreResult<()> {
    use TransactionAction as A;
    use TransactionStatus as S;

    match action {
        // Idempotent-guard: re-completing a completed record is rejected.
        A::Complete => match tx.status {
            S::Pending => Ok(()),
            S::Completed | S::Voided | S::Corrected | S::Validated | S::Rejected => {
                Err(rejected(tx, action))
            }
        },

        // Reopen is the one privilege-gated sale transition.
        A::Reopen => {
            if !actor.tier.is_admin() {
                return Err(CoreError::permission_denied("reopen", "admin"));
            }
            match tx.status {
                S::Completed => Ok(()),
                S::Pending | S::Voided | S::Corrected | S::Validated | S::Rejected => {
                    Err(rejected(tx, action))
                }
            }
        }

        // One-way, terminal. The voided guard is what makes the stock
        // release exactly-once.
        A::Void => match tx.status {
            S::Pending | S::Completed => Ok(()),
            S::Voided | S::Corrected | S::Validated | S::Rejected => Err(rejected(tx, action)),
        },

        A::Edit => match tx.status {
            S::Pending | S::Completed => Ok(()),
            S::Voided | S::Corrected | S::Validated | S::Rejected => Err(rejected(tx, action)),
        },

        // Hard removal is allowed from any status; the caller releases stock
        // only when the record still holds it (`Transaction::holds_stock`).
        A::Delete => Ok(()),

        // Expense-only review actions never apply to sales.
        A::Validate | A::Reject => Err(rejected(tx, action)),
    }
}

fn check_expense_transition(
    tx: &Transaction,
    action: TransactionAction,
    actor: &Actor,
) -> CoreResult<()> {
    use TransactionAction as A;
    use TransactionStatus as S;

    match action {
        A::Validate => {
            if !actor.tier.is_elevated() {
                return Err(CoreError::permission_denied("validate expense", "manager"));
            }
            match tx.status {
                S::Pending => Ok(()),
                S::Validated | S::Rejected | S::Completed | S::Voided | S::Corrected => {
                    Err(rejected(tx, action))
                }
            }
        }

        A::Reject => {
            if !actor.tier.is_elevated() {
                return Err(CoreError::permission_denied("reject expense", "manager"));
            }
            match tx.status {
                S::Pending => Ok(()),
                S::Validated | S::Rejected | S::Completed | S::Voided | S::Corrected => {
                    Err(rejected(tx, action))
                }
            }
        }

        A::Edit => match tx.status {
            // Pending: the original recorder or an elevated tier.
            S::Pending => {
                if actor.id == tx.created_by || actor.tier.is_elevated() {
                    Ok(())
                } else {
                    Err(CoreError::permission_denied("edit expense", "manager"))
                }
            }
            // Reviewed expenses: highest tier only. The mandatory reason is
            // enforced by the caller's validation, not here.
            S::Validated | S::Rejected => {
                if actor.tier.is_admin() {
                    Ok(())
                } else {
                    Err(CoreError::permission_denied("edit reviewed expense", "admin"))
                }
            }
            S::Completed | S::Voided | S::Corrected => Err(rejected(tx, action)),
        },

        A::Delete => {
            if actor.tier.is_admin() {
                return Ok(());
            }
            match tx.status {
                S::Pending if actor.id == tx.created_by => Ok(()),
                S::Pending => Err(CoreError::permission_denied("delete expense", "admin")),
                _ => Err(CoreError::permission_denied(
                    "delete reviewed expense",
                    "admin",
                )),
            }
        }

        // Sale-only lifecycle actions never apply to expenses.
        A::Complete | A::Reopen | A::Void => Err(rejected(tx, action)),
    }
}

/// Initial status for a freshly created record.
pub fn initial_status(kind: TransactionKind) -> TransactionStatus {
    match kind {
        // Money and goods change hands immediately.
        TransactionKind::Sale => TransactionStatus::Completed,
        // Money received at creation, fulfillment pending.
        TransactionKind::Reservation => TransactionStatus::Pending,
        TransactionKind::Expense => TransactionStatus::Pending,
    }
}

fn rejected(tx: &Transaction, action: TransactionAction) -> CoreError {
    CoreError::invalid_transition(&tx.id, tx.status.to_string(), action.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================
