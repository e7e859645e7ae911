//! Order Management Module
//!
//! Ledger persistence, dual-source reconciliation and duplicate
//! suppression for the GTT ladder.
//!
//! # Architecture
//!
//! - `OrderLedger` - per-symbol JSON persistence, the crash-recovery
//!   source of truth
//! - `ReconciliationEngine` - walks local entries against a broker
//!   snapshot and applies status transitions
//! - `DuplicateGuard` - rejects rungs placed on top of working orders
//! - Core types - `OrderId`, `OrderStatus`, `LedgerOrder`

mod duplicate;
mod ledger;
mod reconciler;
mod types;

pub use duplicate::{DuplicateGuard, DEFAULT_SIMILARITY_THRESHOLD};
pub use ledger::{LedgerError, OrderLedger};
pub use reconciler::{
    compute_position, CompletionRecord, Position, ReconcileReport, ReconciliationEngine,
};
pub use types::{
    CompletionEvidence, LedgerOrder, OrderExtra, OrderId, OrderKind, OrderStatus,
};
