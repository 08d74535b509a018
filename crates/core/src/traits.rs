//! Trait seams for the external collaborators.
//!
//! The decision engine is generic over these four traits; everything
//! behind them (brokerage wire protocol, storage schema, alert channel)
//! is out of scope for this crate. Market-closed or no-subscription
//! conditions surface as empty results, never as errors — an `Err` from
//! `MarketData` or `Brokerage` means connectivity is gone and the scan
//! loop should stop.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{
    Bar, BrokerPosition, BudgetSnapshot, ContractSpec, DepthSnapshot, NotifyEvent,
    OrderStatusReport, Position, SignalRecord, TradeRecord,
};

/// Price, depth, and historical feeds.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Last traded or mid price; `None` when the market is closed or the
    /// symbol has no subscription.
    async fn current_price(&self, symbol: &str) -> Result<Option<Decimal>>;

    /// Current order-book snapshot; `None` when depth is unavailable.
    async fn depth_snapshot(&self, symbol: &str) -> Result<Option<DepthSnapshot>>;

    /// Historical bars, oldest first. Empty when unavailable.
    async fn historical_bars(&self, symbol: &str, timeframe: &str, lookback_days: u32)
        -> Result<Vec<Bar>>;

    /// Orderable single-leg contracts for the symbol with expiries inside
    /// the DTE window, sorted by expiry then strike. Empty when the chain
    /// cannot be fetched.
    async fn option_chain(&self, symbol: &str, min_dte: u32, max_dte: u32)
        -> Result<Vec<ContractSpec>>;

    /// Mark price of a contract (net price for spreads); `None` when no
    /// quote is available.
    async fn contract_price(&self, contract: &ContractSpec) -> Result<Option<Decimal>>;
}

/// Order routing and portfolio state at the brokerage.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Submit an entry with attached stop-loss and profit-target (OCA
    /// pair). Returns immediately; fills are observed via `order_status`.
    async fn submit_bracket_order(
        &self,
        order_ref: &str,
        contract: &ContractSpec,
        quantity: u32,
        entry_price: Decimal,
        stop_loss: Decimal,
        profit_target: Decimal,
    ) -> Result<()>;

    async fn cancel(&self, order_ref: &str) -> Result<()>;

    /// Flatten a held position at market after cancelling its bracket.
    /// Used by engine-driven exits (trailing, stall, time). Returns the
    /// fill price.
    async fn close_position(&self, contract: &ContractSpec, quantity: u32) -> Result<Decimal>;

    async fn portfolio(&self) -> Result<Vec<BrokerPosition>>;

    async fn order_status(&self, order_ref: &str) -> Result<OrderStatusReport>;

    /// Net liquidation value of the account.
    async fn account_equity(&self) -> Result<Decimal>;
}

/// Durable storage, written behind the in-memory state. Failures are
/// logged and swallowed by callers; the ledger and position registry in
/// memory stay authoritative.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn upsert_position(&self, position: &Position) -> Result<()>;

    async fn delete_position(&self, order_ref: &str) -> Result<()>;

    /// Append-only trade record on close.
    async fn append_trade(&self, trade: &TradeRecord) -> Result<()>;

    /// Append-only record of every evaluated signal's outcome.
    async fn append_signal_outcome(&self, record: &SignalRecord) -> Result<()>;

    async fn upsert_budget(&self, strategy: &str, snapshot: &BudgetSnapshot) -> Result<()>;

    /// Positions persisted as pending or open, for startup reconciliation.
    async fn load_positions(&self) -> Result<Vec<Position>>;
}

/// Best-effort outbound alerting. Must never block the scan loop.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent) -> Result<()>;
}
