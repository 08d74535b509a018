//! Shared data model for the decision engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// A raw order-book snapshot for one symbol.
///
/// Bids are ordered best-first (prices strictly descending), asks are
/// ordered best-first (prices strictly ascending).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub timestamp: DateTime<Utc>,
}

impl DepthSnapshot {
    /// Mid price from the best bid and ask; `None` when either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.bids.first()?.price;
        let ask = self.asks.first()?.price;
        Some((bid + ask) / Decimal::TWO)
    }
}

/// An OHLCV bar from the historical data feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Trade instruction emitted by a strategy. Immutable once produced;
/// consumed exactly once by the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Pattern that produced the signal, e.g. "support_rejection",
    /// "absorption_breakout_bullish", "orb_breakout".
    pub pattern: String,
    /// Price level the pattern keyed off, when one exists.
    pub level: Option<Decimal>,
    /// Free-form metadata, e.g. spread leg deltas.
    pub metadata: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    #[must_use]
    pub fn new(symbol: &str, direction: SignalDirection, confidence: f64, pattern: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            pattern: pattern.to_string(),
            level: None,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Decimal) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Direction of a signal, including the multi-leg spread relabels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    LongCall,
    LongPut,
    BullPutSpread,
    BearPutSpread,
    LongPutStraight,
    IronCondor,
    NoTrade,
}

impl SignalDirection {
    /// Whether higher underlying prices favor the position.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        matches!(self, Self::LongCall | Self::BullPutSpread)
    }

    /// Multi-leg instructions need spread execution instead of a single
    /// contract.
    #[must_use]
    pub fn is_multi_leg(&self) -> bool {
        matches!(
            self,
            Self::BullPutSpread | Self::BearPutSpread | Self::IronCondor
        )
    }
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LongCall => write!(f, "long_call"),
            Self::LongPut => write!(f, "long_put"),
            Self::BullPutSpread => write!(f, "bull_put_spread"),
            Self::BearPutSpread => write!(f, "bear_put_spread"),
            Self::LongPutStraight => write!(f, "long_put_straight"),
            Self::IronCondor => write!(f, "iron_condor"),
            Self::NoTrade => write!(f, "no_trade"),
        }
    }
}

/// Outcome of an evaluated signal, persisted for every evaluation that
/// produced a trade candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOutcome {
    Executed,
    Rejected,
    FailedEntry,
}

impl std::fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executed => write!(f, "executed"),
            Self::Rejected => write!(f, "rejected"),
            Self::FailedEntry => write!(f, "failed_entry"),
        }
    }
}

/// Coarse market-condition classification. Recomputed on a timer and
/// shared read-only by all strategy evaluations within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    BullTrend,
    BearTrend,
    RangeBound,
    HighChaos,
    Unknown,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BullTrend => write!(f, "bull_trend"),
            Self::BearTrend => write!(f, "bear_trend"),
            Self::RangeBound => write!(f, "range_bound"),
            Self::HighChaos => write!(f, "high_chaos"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// One leg of an options contract. `ratio` is signed: positive buys,
/// negative sells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionLeg {
    pub right: OptionRight,
    pub strike: Decimal,
    pub expiry: NaiveDate,
    pub ratio: i32,
}

/// A resolved, orderable contract — single-leg or spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSpec {
    pub symbol: String,
    pub legs: Vec<OptionLeg>,
}

impl ContractSpec {
    /// Nearest expiry across legs, used for time-stop checks.
    #[must_use]
    pub fn earliest_expiry(&self) -> Option<NaiveDate> {
        self.legs.iter().map(|l| l.expiry).min()
    }

    /// Short key identifying the contract for reconciliation matching.
    #[must_use]
    pub fn key(&self) -> String {
        let mut parts: Vec<String> = self
            .legs
            .iter()
            .map(|l| format!("{}:{}:{}:{}", l.right, l.strike, l.expiry, l.ratio))
            .collect();
        parts.sort();
        format!("{}|{}", self.symbol, parts.join("|"))
    }
}

/// Position lifecycle status. `Evaluating` is transient within a cycle
/// and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    PendingFill,
    Open,
    Closed,
}

/// Reason a position (or pending entry) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    ProfitTarget,
    TrailingStop,
    TimeStop,
    StallExit,
    ImbalanceFlip,
    OrderTimeout,
    OrderDrift,
    OrderRejected,
    OrderCancelled,
    ZeroFill,
    ManualClose,
    SessionEnd,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::ProfitTarget => write!(f, "profit_target"),
            Self::TrailingStop => write!(f, "trailing_stop"),
            Self::TimeStop => write!(f, "time_stop"),
            Self::StallExit => write!(f, "stall_exit"),
            Self::ImbalanceFlip => write!(f, "imbalance_flip"),
            Self::OrderTimeout => write!(f, "order_timeout"),
            Self::OrderDrift => write!(f, "order_drift"),
            Self::OrderRejected => write!(f, "order_rejected"),
            Self::OrderCancelled => write!(f, "order_cancelled"),
            Self::ZeroFill => write!(f, "zero_fill"),
            Self::ManualClose => write!(f, "manual_close"),
            Self::SessionEnd => write!(f, "session_end"),
        }
    }
}

/// A tracked position, from pending entry through close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Globally unique order reference, e.g. `SWINGBOT-1717171717-3`.
    pub order_ref: String,
    /// Owning strategy instance name.
    pub strategy: String,
    pub symbol: String,
    pub contract: ContractSpec,
    pub direction: SignalDirection,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    /// Underlying price when the entry was admitted; progress and drift
    /// checks run against this, not the contract price.
    pub underlying_entry: Decimal,
    pub stop_loss: Decimal,
    pub profit_target: Decimal,
    /// Best price seen while open; tracked only after the trailing stop
    /// activates.
    pub peak_price: Option<Decimal>,
    pub trailing_stop: Option<Decimal>,
    /// Budget committed at entry, released on close.
    pub committed: Decimal,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Unrealized P&L in dollars at the contract multiplier of 100.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        let per_contract = match self.direction {
            // Credit structures profit when the spread price decays.
            SignalDirection::BullPutSpread | SignalDirection::IronCondor => {
                self.entry_price - self.current_price
            }
            _ => self.current_price - self.entry_price,
        };
        per_contract * Decimal::from(self.quantity) * Decimal::ONE_HUNDRED
    }

    /// Unrealized gain as a fraction of entry price. Zero entry yields zero.
    #[must_use]
    pub fn gain_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let per_contract = match self.direction {
            SignalDirection::BullPutSpread | SignalDirection::IronCondor => {
                self.entry_price - self.current_price
            }
            _ => self.current_price - self.entry_price,
        };
        per_contract / self.entry_price
    }
}

/// In-flight entry order, alive only while the position is `PendingFill`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_ref: String,
    pub submitted_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Underlying price at submission, for drift detection.
    pub reference_price: Decimal,
}

/// A position the brokerage reports in its live portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub contract_key: String,
    pub quantity: u32,
    pub avg_cost: Decimal,
}

/// Broker-reported state of a working order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_ref: String,
    pub state: OrderState,
    pub filled_quantity: u32,
    pub avg_fill_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Working,
    Filled,
    Cancelled,
    Rejected,
}

/// Terminal trade record appended on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub order_ref: String,
    pub strategy: String,
    pub symbol: String,
    pub direction: SignalDirection,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: CloseReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Per-signal outcome record appended for every trade candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub strategy: String,
    pub symbol: String,
    pub direction: SignalDirection,
    pub confidence: f64,
    pub pattern: String,
    pub outcome: SignalOutcome,
    /// Veto or failure detail when the outcome is not `executed`.
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of one strategy's budget row for the write-behind mirror.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub cap: Decimal,
    pub drawdown: Decimal,
    pub committed: Decimal,
}

impl BudgetSnapshot {
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.cap - self.drawdown - self.committed
    }
}

/// Fire-and-forget event for the notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotifyEvent {
    Filled {
        order_ref: String,
        symbol: String,
        quantity: u32,
        price: Decimal,
    },
    Closed {
        order_ref: String,
        symbol: String,
        reason: CloseReason,
        realized_pnl: Decimal,
    },
    EntryFailed {
        strategy: String,
        symbol: String,
        detail: String,
    },
    StrategyPaused {
        strategy: String,
        detail: String,
    },
    RegimeChanged {
        from: Regime,
        to: Regime,
    },
}
