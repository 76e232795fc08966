//! # Repository Modules
//!
//! One repository per store:
//! - [`stock`] - per-product available quantities (the only shared mutable
//!   resource requiring synchronization)
//! - [`transaction`] - sale/reservation/expense records, items, audit column
//! - [`customer`] - derived per-customer aggregates

pub mod customer;
pub mod stock;
pub mod transaction;

pub use customer::CustomerRepository;
pub use stock::StockRepository;
pub use transaction::{TransactionFilter, TransactionRepository};
