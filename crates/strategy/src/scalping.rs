//! Scalping strategy: order-book imbalance entries with stall and
//! imbalance-flip exits.

use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;

use swingbot_core::config::StrategyParams;
use swingbot_core::types::{CloseReason, Position, Signal, SignalDirection};

use crate::{Strategy, StrategyContext};

#[derive(Debug, Clone)]
struct TickState {
    ticks: u32,
    /// Best favorable move seen so far, as a fraction of the underlying
    /// entry price.
    best_progress: Decimal,
}

/// Pure imbalance scalper. Entry when |imbalance| crosses the threshold;
/// exits on tick-count stall or imbalance flip, independent of the
/// engine's price brackets.
#[derive(Debug, Default)]
pub struct ScalpingStrategy {
    ticks: HashMap<String, TickState>,
}

impl ScalpingStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for ScalpingStrategy {
    fn kind(&self) -> &'static str {
        "scalping"
    }

    fn analyze(
        &mut self,
        symbol: &str,
        _price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        let analysis = ctx.analysis?;
        let imb = analysis.imbalance;
        if imb.abs() < params.imbalance_entry_threshold {
            return None;
        }
        // One scalp at a time per symbol.
        if !ctx.open_positions.is_empty() {
            return None;
        }

        let direction = if imb > 0.0 {
            SignalDirection::LongCall
        } else {
            SignalDirection::LongPut
        };
        let confidence = imb.abs().min(1.0);
        tracing::info!(symbol, imbalance = imb, confidence, "Scalp entry signal");
        Some(
            Signal::new(symbol, direction, confidence, "imbalance_scalp")
                .with_meta("imbalance", json!(imb)),
        )
    }

    fn check_exit(
        &mut self,
        position: &Position,
        underlying_price: Decimal,
        imbalance: Option<f64>,
        params: &StrategyParams,
    ) -> Option<CloseReason> {
        let bullish = position.direction.is_bullish();

        // Flip exit: the book turned hard against the position.
        if let Some(imb) = imbalance {
            let against = if bullish { -imb } else { imb };
            if against >= params.imbalance_flip_threshold {
                tracing::info!(
                    order_ref = position.order_ref,
                    imbalance = imb,
                    "Imbalance flipped against scalp"
                );
                self.ticks.remove(&position.order_ref);
                return Some(CloseReason::ImbalanceFlip);
            }
        }

        // Stall exit: no favorable progress within the tick budget.
        if position.underlying_entry.is_zero() {
            return None;
        }
        let progress = if bullish {
            (underlying_price - position.underlying_entry) / position.underlying_entry
        } else {
            (position.underlying_entry - underlying_price) / position.underlying_entry
        };
        let state = self
            .ticks
            .entry(position.order_ref.clone())
            .or_insert(TickState { ticks: 0, best_progress: Decimal::ZERO });
        state.ticks += 1;
        if progress > state.best_progress {
            state.best_progress = progress;
        }

        if state.ticks >= params.max_ticks_without_progress
            && state.best_progress < params.min_progress_pct
        {
            tracing::info!(
                order_ref = position.order_ref,
                ticks = state.ticks,
                best_progress = %state.best_progress,
                "Scalp stalled"
            );
            self.ticks.remove(&position.order_ref);
            return Some(CloseReason::StallExit);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use swingbot_context::SectorStrengthTracker;
    use swingbot_core::types::{ContractSpec, PositionStatus, Regime};
    use swingbot_depth::{DepthAnalysis, DepthAnalyzer, HistoricalLevelTracker};

    fn make_position(direction: SignalDirection, underlying_entry: Decimal) -> Position {
        Position {
            order_ref: "SWINGBOT-1-1".to_string(),
            strategy: "scalp".to_string(),
            symbol: "SPY".to_string(),
            contract: ContractSpec { symbol: "SPY".to_string(), legs: vec![] },
            direction,
            quantity: 1,
            entry_price: dec!(1.50),
            current_price: dec!(1.50),
            underlying_entry,
            stop_loss: dec!(0.75),
            profit_target: dec!(1.95),
            peak_price: None,
            trailing_stop: None,
            committed: dec!(150),
            status: PositionStatus::Open,
            opened_at: Utc::now(),
        }
    }

    fn analysis_with_imbalance(imbalance: f64) -> DepthAnalysis {
        DepthAnalysis { zones: vec![], imbalance, breakouts: vec![] }
    }

    #[test]
    fn strong_bid_imbalance_emits_call_with_matching_confidence() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let analysis = analysis_with_imbalance(0.82);
        let ctx = StrategyContext {
            regime: Regime::HighChaos,
            sector: &sector,
            analysis: Some(&analysis),
            depth: &depth,
            levels: &levels,
            open_positions: &[],
            equity: dec!(100000),
            vix_ticks: &[],
            session_date: Utc::now().date_naive(),
            minutes_since_open: Some(90),
            now: Utc::now(),
        };
        let mut scalp = ScalpingStrategy::new();
        let signal = scalp
            .analyze("SPY", dec!(500), &StrategyParams::default(), &ctx)
            .unwrap();
        assert_eq!(signal.direction, SignalDirection::LongCall);
        assert!((signal.confidence - 0.82).abs() < 1e-9);

        let bearish = analysis_with_imbalance(-0.75);
        let ctx = StrategyContext { analysis: Some(&bearish), ..ctx };
        let signal = scalp
            .analyze("SPY", dec!(500), &StrategyParams::default(), &ctx)
            .unwrap();
        assert_eq!(signal.direction, SignalDirection::LongPut);
    }

    #[test]
    fn weak_imbalance_or_existing_position_blocks_entry() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let analysis = analysis_with_imbalance(0.5);
        let open = [make_position(SignalDirection::LongCall, dec!(500))];
        let mut ctx = StrategyContext {
            regime: Regime::HighChaos,
            sector: &sector,
            analysis: Some(&analysis),
            depth: &depth,
            levels: &levels,
            open_positions: &[],
            equity: dec!(100000),
            vix_ticks: &[],
            session_date: Utc::now().date_naive(),
            minutes_since_open: Some(90),
            now: Utc::now(),
        };
        let mut scalp = ScalpingStrategy::new();
        assert!(scalp
            .analyze("SPY", dec!(500), &StrategyParams::default(), &ctx)
            .is_none());

        let strong = analysis_with_imbalance(0.9);
        ctx.analysis = Some(&strong);
        ctx.open_positions = &open;
        assert!(scalp
            .analyze("SPY", dec!(500), &StrategyParams::default(), &ctx)
            .is_none());
    }

    #[test]
    fn stall_exit_after_tick_budget_without_progress() {
        let params = StrategyParams::default(); // 5 ticks, 0.1% progress
        let mut scalp = ScalpingStrategy::new();
        let pos = make_position(SignalDirection::LongCall, dec!(500));

        // Price pinned at entry: ticks 1-4 hold, tick 5 stalls out.
        for _ in 0..4 {
            assert!(scalp.check_exit(&pos, dec!(500.1), None, &params).is_none());
        }
        assert_eq!(
            scalp.check_exit(&pos, dec!(500.1), None, &params),
            Some(CloseReason::StallExit)
        );
    }

    #[test]
    fn favorable_progress_disarms_the_stall_timer() {
        let params = StrategyParams::default();
        let mut scalp = ScalpingStrategy::new();
        let pos = make_position(SignalDirection::LongCall, dec!(500));

        // 0.12% favorable move within the budget: never stalls.
        for _ in 0..3 {
            assert!(scalp.check_exit(&pos, dec!(500.1), None, &params).is_none());
        }
        assert!(scalp.check_exit(&pos, dec!(500.6), None, &params).is_none());
        for _ in 0..10 {
            assert!(scalp.check_exit(&pos, dec!(500.2), None, &params).is_none());
        }
    }

    #[test]
    fn imbalance_flip_exits_immediately() {
        let params = StrategyParams::default(); // flip threshold 0.3
        let mut scalp = ScalpingStrategy::new();
        let pos = make_position(SignalDirection::LongCall, dec!(500));

        assert!(scalp.check_exit(&pos, dec!(500), Some(-0.2), &params).is_none());
        assert_eq!(
            scalp.check_exit(&pos, dec!(500), Some(-0.35), &params),
            Some(CloseReason::ImbalanceFlip)
        );

        // Bearish position flips on a strong bid book.
        let put = make_position(SignalDirection::LongPut, dec!(500));
        assert_eq!(
            scalp.check_exit(&put, dec!(500), Some(0.4), &params),
            Some(CloseReason::ImbalanceFlip)
        );
    }
}
