//! # Ledger Events
//!
//! Read-only notifications for downstream consumers (receipt printing,
//! notification delivery, reporting caches). The ledger exposes these
//! events but has no dependency on anyone receiving them: publishing to
//! zero subscribers is not an error, and a slow subscriber only loses
//! its own backlog (`tokio::sync::broadcast` lag semantics).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use tally_core::TransactionKind;

/// Channel capacity. Consumers that fall further behind than this see
/// `RecvError::Lagged` and should re-read from the store.
const EVENT_CAPACITY: usize = 256;

// =============================================================================
// Event Type
// =============================================================================

/// A notification that a transaction record changed.
///
/// Carries ids only; consumers fetch current state through the query
/// surface if they need more than the fact of the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Created { id: String, kind: TransactionKind },
    Updated { id: String },
    Completed { id: String },
    Reopened { id: String },
    Voided { id: String },
    Deleted { id: String },
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast fan-out for ledger events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { sender }
    }

    /// Publishes an event. Never fails; with no subscribers the event is
    /// simply dropped.
    pub fn publish(&self, event: LedgerEvent) {
        debug!(?event, "Publishing ledger event");
        let _ = self.sender.send(event);
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers (diagnostics).
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
