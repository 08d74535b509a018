//! Error taxonomy for the decision engine.
//!
//! Everything except connectivity loss is a local, non-fatal outcome:
//! signal vetoes and entry failures are recorded and swallowed, order
//! failures release budget and close the pending position. Only
//! `Connectivity` propagates to the caller as fatal, since no decision
//! can safely proceed without the data feed or brokerage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Regime veto, sector veto, confidence below floor, or the
    /// one-trade-per-day flag already set.
    #[error("signal rejected: {0}")]
    SignalRejected(String),

    /// No resolvable contract, insufficient budget, or per-contract cost
    /// ceiling exceeded.
    #[error("entry failed: {0}")]
    EntryFailed(String),

    #[error("entry order not filled within {0}s")]
    OrderTimeout(u64),

    #[error("underlying drifted past the entry reference: {0}")]
    OrderDrift(String),

    #[error("order rejected by broker: {0}")]
    OrderRejected(String),

    #[error("order cancelled: {0}")]
    OrderCancelled(String),

    /// Empty depth or historical data — the symbol is skipped this cycle.
    #[error("market data unavailable for {0}")]
    DataUnavailable(String),

    #[error("reconciliation mismatch: {0}")]
    ReconciliationMismatch(String),

    #[error("connectivity lost: {0}")]
    Connectivity(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the error should stop the scan loop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_is_fatal() {
        assert!(EngineError::Connectivity(anyhow::anyhow!("tws gone")).is_fatal());
        assert!(!EngineError::SignalRejected("regime veto".to_string()).is_fatal());
        assert!(!EngineError::OrderTimeout(60).is_fatal());
        assert!(!EngineError::DataUnavailable("SPY".to_string()).is_fatal());
    }
}
