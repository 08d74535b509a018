//! Strategy framework.
//!
//! Strategies are a closed, registry-based set of variants behind one
//! trait. Each instance evaluates one symbol at a time against a
//! read-only [`StrategyContext`] and produces at most one [`Signal`] per
//! evaluation. Instance state (tick counters, session flags, feedback
//! windows) is private to the instance; zone and level state lives in
//! the depth trackers and is looked up by symbol.

pub mod orb;
pub mod scalping;
pub mod spreads;
pub mod swing;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use swingbot_context::SectorStrengthTracker;
use swingbot_core::config::StrategyParams;
use swingbot_core::types::{CloseReason, Position, Regime, Signal, TradeRecord};
use swingbot_depth::{DepthAnalysis, DepthAnalyzer, HistoricalLevelTracker};

pub use orb::OrbStrategy;
pub use scalping::ScalpingStrategy;
pub use spreads::{SpreadStrategy, SpreadVariant};
pub use swing::SwingStrategy;

/// Read-only view of the world for one evaluation.
pub struct StrategyContext<'a> {
    pub regime: Regime,
    pub sector: &'a SectorStrengthTracker,
    /// This cycle's depth analysis for the symbol, when depth was
    /// available.
    pub analysis: Option<&'a DepthAnalysis>,
    pub depth: &'a DepthAnalyzer,
    pub levels: &'a HistoricalLevelTracker,
    /// Open and pending positions for the symbol owned by this instance.
    pub open_positions: &'a [Position],
    pub equity: Decimal,
    /// Recent volatility-index ticks, oldest first.
    pub vix_ticks: &'a [(DateTime<Utc>, Decimal)],
    pub session_date: NaiveDate,
    /// Minutes since session open; `None` outside regular hours.
    pub minutes_since_open: Option<i64>,
    pub now: DateTime<Utc>,
}

/// A polymorphic signal generator.
pub trait Strategy: Send {
    /// Registry key of the variant.
    fn kind(&self) -> &'static str;

    /// Evaluate one symbol. Returns at most one signal.
    fn analyze(
        &mut self,
        symbol: &str,
        price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal>;

    /// Strategy-specific exit check for an owned position, run every
    /// cycle in addition to the engine's bracket and trailing rules.
    fn check_exit(
        &mut self,
        _position: &Position,
        _underlying_price: Decimal,
        _imbalance: Option<f64>,
        _params: &StrategyParams,
    ) -> Option<CloseReason> {
        None
    }

    /// A signal from this instance passed the gates and a position was
    /// admitted. Session flags that must not burn on a vetoed or
    /// unfillable signal are set here, not in `analyze`.
    fn on_position_opened(&mut self, _position: &Position) {}

    /// Feed back a closed trade for performance-adjusted confidence.
    fn on_trade_closed(&mut self, _record: &TradeRecord) {}

    /// Session rollover: reset one-trade-per-day flags and range state.
    fn on_session_start(&mut self, _date: NaiveDate) {}
}

/// Construct a strategy by its configured kind string.
#[must_use]
pub fn build_strategy(kind: &str) -> Option<Box<dyn Strategy>> {
    match kind {
        "swing" => Some(Box::new(SwingStrategy::new())),
        "scalping" => Some(Box::new(ScalpingStrategy::new())),
        "orb" => Some(Box::new(OrbStrategy::new())),
        "bull_put_spread" => Some(Box::new(SpreadStrategy::new(SpreadVariant::BullPut))),
        "bear_put_spread" => Some(Box::new(SpreadStrategy::new(SpreadVariant::BearPut))),
        "long_put_straight" => Some(Box::new(SpreadStrategy::new(SpreadVariant::LongPutStraight))),
        "iron_condor" => Some(Box::new(SpreadStrategy::new(SpreadVariant::IronCondor))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_every_variant() {
        for kind in [
            "swing",
            "scalping",
            "orb",
            "bull_put_spread",
            "bear_put_spread",
            "long_put_straight",
            "iron_condor",
        ] {
            let strategy = build_strategy(kind).unwrap();
            assert_eq!(strategy.kind(), kind);
        }
        assert!(build_strategy("martingale").is_none());
    }
}
