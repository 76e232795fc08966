//! # tally-db: SQLite Persistence and Ledger Orchestration
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          tally-db                                   │
//! │                                                                     │
//! │   ┌──────────────────────────────────────────────────────────────┐  │
//! │   │                       Ledger (service)                       │  │
//! │   │   create / edit / complete / reopen / void / delete / query  │  │
//! │   └──────┬──────────────────┬───────────────────┬────────────────┘  │
//! │          │                  │                   │                   │
//! │   ┌──────▼──────┐   ┌───────▼────────┐   ┌──────▼───────┐           │
//! │   │ StockRepo   │   │ TransactionRepo│   │ CustomerRepo │           │
//! │   │ reserve/    │   │ records, items │   │ aggregates   │           │
//! │   │ release     │   │ history column │   │ touch/replace│           │
//! │   └──────┬──────┘   └───────┬────────┘   └──────┬───────┘           │
//! │          └──────────────────┼───────────────────┘                   │
//! │                      ┌──────▼──────┐        ┌──────────────┐        │
//! │                      │ SqlitePool  │        │  EventBus    │        │
//! │                      │  WAL mode   │        │  broadcast   │        │
//! │                      └─────────────┘        └──────────────┘        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stock ledger's conditional decrement is the only synchronization
//! point in the system; everything else is plain row I/O plus the pure
//! rules in `tally-core`.

pub mod error;
pub mod events;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use events::{EventBus, LedgerEvent};
pub use ledger::{Ledger, LedgerQuery};
pub use pool::{Database, DbConfig};
