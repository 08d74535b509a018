//! Decision and risk engine.
//!
//! Ties the depth, context, and strategy crates together: the
//! [`DecisionEngine`] scan loop evaluates every configured strategy
//! instance each cycle, runs candidate signals through the veto chain,
//! sizes and submits bracket entries against a committed-budget ledger,
//! and walks positions through the pending/open/closed lifecycle with
//! trailing, stall, and time exits on top of the broker-held brackets.

pub mod budget;
pub mod contracts;
pub mod decision;
pub mod exits;
pub mod lifecycle;
pub mod paper;
pub mod reconcile;
pub mod sizing;

pub use budget::{BudgetError, BudgetLedger};
pub use decision::DecisionEngine;
pub use lifecycle::{PendingResolution, PositionLifecycle};
pub use reconcile::ReconcileAction;
pub use sizing::SizeReject;
