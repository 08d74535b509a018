//! Swing strategy: zone rejection and absorption breakouts.

use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;

use swingbot_core::config::StrategyParams;
use swingbot_core::types::{Signal, SignalDirection, TradeRecord};
use swingbot_depth::{PowerCheck, ZoneSide};

use crate::{Strategy, StrategyContext};

/// Base confidence for a rejection at a zero-strength zone.
const REJECTION_BASE: f64 = 0.5;
/// Additional confidence at full zone strength.
const REJECTION_STRENGTH_SPAN: f64 = 0.3;
/// Base confidence for an absorption breakout.
const ABSORPTION_BASE: f64 = 0.7;
/// Absorption carries a stricter floor than plain rejection.
const ABSORPTION_FLOOR_BUMP: f64 = 0.05;

/// Rejection-at-zone and absorption-breakout signals, with optional
/// power-level confluence and performance-feedback confidence nudging.
#[derive(Debug, Default)]
pub struct SwingStrategy {
    /// Recent closed trades: (was a win, realized P&L).
    recent: VecDeque<(bool, Decimal)>,
}

impl SwingStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Win-rate driven confidence nudge, bounded by the configured
    /// boost/penalty and inactive until enough trades are observed.
    /// Disagreement between win rate and net P&L halves the nudge.
    fn feedback_adjust(&self, params: &StrategyParams) -> f64 {
        if self.recent.len() < params.feedback_min_trades {
            return 0.0;
        }
        let wins = self.recent.iter().filter(|(win, _)| *win).count();
        let win_rate = wins as f64 / self.recent.len() as f64;
        let centered = (win_rate - 0.5) * 2.0;
        let magnitude = if centered >= 0.0 {
            params.feedback_max_boost
        } else {
            params.feedback_max_penalty
        };
        let mut adjust = centered * magnitude;

        let net_pnl: Decimal = self.recent.iter().map(|(_, pnl)| *pnl).sum();
        if (net_pnl < Decimal::ZERO) != (adjust < 0.0) {
            adjust *= 0.5;
        }
        adjust.clamp(-params.feedback_max_penalty, params.feedback_max_boost)
    }

    fn absorption_signal(
        &self,
        symbol: &str,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        let analysis = ctx.analysis?;
        let breakout = analysis.breakouts.first()?;

        let direction = if breakout.bullish {
            SignalDirection::LongCall
        } else {
            SignalDirection::LongPut
        };
        let directional_imb = if breakout.bullish {
            analysis.imbalance
        } else {
            -analysis.imbalance
        };
        let confidence = (ABSORPTION_BASE
            + directional_imb * params.imbalance_weight
            + self.feedback_adjust(params))
        .clamp(0.0, 1.0);

        let floor = params.confidence_floor(breakout.bullish) + ABSORPTION_FLOOR_BUMP;
        if confidence < floor {
            return None;
        }

        let pattern = if breakout.bullish {
            "absorption_breakout_bullish"
        } else {
            "absorption_breakout_bearish"
        };
        tracing::info!(
            symbol,
            pattern,
            confidence,
            level = %breakout.price,
            "Swing signal"
        );
        Some(
            Signal::new(symbol, direction, confidence, pattern)
                .with_level(breakout.price)
                .with_meta("imbalance", json!(analysis.imbalance)),
        )
    }

    fn rejection_signal(
        &self,
        symbol: &str,
        price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        let analysis = ctx.analysis?;
        let proximity = price * params.zone_proximity_pct;
        let zone = analysis
            .zones
            .iter()
            .filter(|z| z.confirmed && (z.price - price).abs() <= proximity)
            .min_by_key(|z| (z.price - price).abs())?;

        let bullish = matches!(zone.side, ZoneSide::Support);
        let mut confidence =
            REJECTION_BASE + REJECTION_STRENGTH_SPAN * zone.strength(params.zscore_threshold);

        let mut power_meta = None;
        match ctx.levels.power_check(zone, params, ctx.now) {
            PowerCheck::Suppressed => {
                // Stale historical level: no trade regardless of confidence.
                tracing::debug!(symbol, zone_price = %zone.price, "Power level stale, suppressing");
                return None;
            }
            PowerCheck::Confluence(power) => {
                confidence += power.boost;
                power_meta = Some(power);
            }
            PowerCheck::NoMatch => {}
        }

        let directional_imb = if bullish {
            analysis.imbalance
        } else {
            -analysis.imbalance
        };
        confidence = (confidence
            + directional_imb * params.imbalance_weight
            + self.feedback_adjust(params))
        .clamp(0.0, 1.0);

        if confidence < params.confidence_floor(bullish) {
            return None;
        }

        let (direction, pattern) = if bullish {
            (SignalDirection::LongCall, "support_rejection")
        } else {
            (SignalDirection::LongPut, "resistance_rejection")
        };
        tracing::info!(symbol, pattern, confidence, level = %zone.price, "Swing signal");

        let mut signal = Signal::new(symbol, direction, confidence, pattern)
            .with_level(zone.price)
            .with_meta("zone_zscore", json!(zone.zscore))
            .with_meta("imbalance", json!(analysis.imbalance));
        if let Some(power) = power_meta {
            signal = signal
                .with_meta("power_level", json!(power.level_price.to_string()))
                .with_meta("power_boost", json!(power.boost));
        }
        Some(signal)
    }
}

impl Strategy for SwingStrategy {
    fn kind(&self) -> &'static str {
        "swing"
    }

    fn analyze(
        &mut self,
        symbol: &str,
        price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        // Absorption outranks rejection when both fire in one cycle.
        self.absorption_signal(symbol, params, ctx)
            .or_else(|| self.rejection_signal(symbol, price, params, ctx))
    }

    fn on_trade_closed(&mut self, record: &TradeRecord) {
        self.recent
            .push_back((record.realized_pnl > Decimal::ZERO, record.realized_pnl));
        // Window length is bounded by the largest configured lookback.
        while self.recent.len() > 64 {
            self.recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use swingbot_context::SectorStrengthTracker;
    use swingbot_core::types::{Bar, CloseReason, Regime};
    use swingbot_depth::{
        AbsorptionBreakout, DepthAnalysis, DepthAnalyzer, HistoricalLevelTracker, LiquidityZone,
    };

    fn zone(price: Decimal, side: ZoneSide, zscore: f64) -> LiquidityZone {
        LiquidityZone {
            symbol: "SPY".to_string(),
            side,
            price,
            size: dec!(2000),
            zscore,
            first_seen: Utc::now(),
            confirmed: true,
        }
    }

    fn closed_trade(pnl: Decimal) -> TradeRecord {
        let now = Utc::now();
        TradeRecord {
            order_ref: "SWINGBOT-1-1".to_string(),
            strategy: "swing-a".to_string(),
            symbol: "SPY".to_string(),
            direction: SignalDirection::LongCall,
            quantity: 1,
            entry_price: dec!(2),
            exit_price: dec!(2) + pnl / dec!(100),
            realized_pnl: pnl,
            reason: CloseReason::ProfitTarget,
            opened_at: now,
            closed_at: now,
        }
    }

    /// Context with hand-built depth analysis and empty level history.
    macro_rules! ctx {
        ($depth:expr, $levels:expr, $sector:expr, $analysis:expr) => {
            StrategyContext {
                regime: Regime::BullTrend,
                sector: &$sector,
                analysis: Some(&$analysis),
                depth: &$depth,
                levels: &$levels,
                open_positions: &[],
                equity: dec!(100000),
                vix_ticks: &[],
                session_date: Utc::now().date_naive(),
                minutes_since_open: Some(60),
                now: Utc::now(),
            }
        };
    }

    #[test]
    fn support_rejection_emits_long_call() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let analysis = DepthAnalysis {
            zones: vec![zone(dec!(99.0), ZoneSide::Support, 6.0)],
            imbalance: 0.5,
            breakouts: vec![],
        };
        let ctx = ctx!(depth, levels, sector, analysis);

        let mut swing = SwingStrategy::new();
        let signal = swing
            .analyze("SPY", dec!(99.1), &StrategyParams::default(), &ctx)
            .unwrap();
        assert_eq!(signal.direction, SignalDirection::LongCall);
        assert_eq!(signal.pattern, "support_rejection");
        assert_eq!(signal.level, Some(dec!(99.0)));
        // 0.5 + 0.3*1.0 + 0.5*0.3 = 0.95
        assert!((signal.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn resistance_rejection_emits_long_put_with_inverted_imbalance() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let mut params = StrategyParams::default();
        params.min_confidence = 0.5;
        let analysis = DepthAnalysis {
            zones: vec![zone(dec!(100.1), ZoneSide::Resistance, 6.0)],
            imbalance: -0.4,
            breakouts: vec![],
        };
        let ctx = ctx!(depth, levels, sector, analysis);

        let mut swing = SwingStrategy::new();
        let signal = swing.analyze("SPY", dec!(100.0), &params, &ctx).unwrap();
        assert_eq!(signal.direction, SignalDirection::LongPut);
        // 0.8 + 0.4*0.3: ask-heavy book supports the bearish read.
        assert!((signal.confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn zone_outside_proximity_is_ignored() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let analysis = DepthAnalysis {
            zones: vec![zone(dec!(97.0), ZoneSide::Support, 6.0)],
            imbalance: 0.8,
            breakouts: vec![],
        };
        let ctx = ctx!(depth, levels, sector, analysis);
        let mut swing = SwingStrategy::new();
        assert!(swing
            .analyze("SPY", dec!(99.1), &StrategyParams::default(), &ctx)
            .is_none());
    }

    #[test]
    fn absorption_breakout_outranks_rejection() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let analysis = DepthAnalysis {
            zones: vec![zone(dec!(99.0), ZoneSide::Support, 6.0)],
            imbalance: 0.5,
            breakouts: vec![AbsorptionBreakout {
                symbol: "SPY".to_string(),
                side: ZoneSide::Resistance,
                price: dec!(100.5),
                bullish: true,
            }],
        };
        let ctx = ctx!(depth, levels, sector, analysis);
        let mut swing = SwingStrategy::new();
        let signal = swing
            .analyze("SPY", dec!(99.1), &StrategyParams::default(), &ctx)
            .unwrap();
        assert_eq!(signal.pattern, "absorption_breakout_bullish");
        // 0.7 + 0.5*0.3
        assert!((signal.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn stale_power_level_suppresses_rejection() {
        let depth = DepthAnalyzer::new();
        let mut levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let params = StrategyParams::default();

        // Historical floor at 99.0 built from huge-volume bars: the live
        // zone's 2000 size is a sliver of the historical average.
        let t0 = Utc::now() - Duration::days(5);
        let bars: Vec<Bar> = (0..40)
            .map(|i| {
                let phase = i % 8;
                let offset = if phase <= 4 { phase } else { 8 - phase } as i64;
                let low = dec!(99.0) + Decimal::from(offset);
                Bar {
                    timestamp: t0 + Duration::hours(i),
                    open: low,
                    high: low + dec!(0.5),
                    low,
                    close: low,
                    volume: dec!(100000),
                }
            })
            .collect();
        let mut p = params.clone();
        p.swing_window = 2;
        levels.refresh("SPY", "1h", &bars, &p, Utc::now());
        assert!(!levels.levels("SPY").is_empty());

        let analysis = DepthAnalysis {
            zones: vec![zone(dec!(99.0), ZoneSide::Support, 6.0)],
            imbalance: 0.8,
            breakouts: vec![],
        };
        let ctx = ctx!(depth, levels, sector, analysis);
        let mut swing = SwingStrategy::new();
        assert!(swing.analyze("SPY", dec!(99.1), &p, &ctx).is_none());
    }

    #[test]
    fn losing_streak_penalizes_confidence() {
        let params = StrategyParams::default();
        let mut losing = SwingStrategy::new();
        for _ in 0..6 {
            losing.on_trade_closed(&closed_trade(dec!(-50)));
        }
        let adjust = losing.feedback_adjust(&params);
        assert!((adjust - -0.10).abs() < 1e-9);

        let mut winning = SwingStrategy::new();
        for _ in 0..6 {
            winning.on_trade_closed(&closed_trade(dec!(50)));
        }
        assert!((winning.feedback_adjust(&params) - 0.10).abs() < 1e-9);
    }

    #[test]
    fn feedback_inactive_below_min_trades() {
        let params = StrategyParams::default(); // min 5
        let mut swing = SwingStrategy::new();
        for _ in 0..4 {
            swing.on_trade_closed(&closed_trade(dec!(-50)));
        }
        assert!(swing.feedback_adjust(&params).abs() < f64::EPSILON);
    }
}
