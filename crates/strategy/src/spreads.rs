//! Regime-fitted spread variants.
//!
//! Each variant wraps the swing strategy's pattern detection, restricts
//! itself to one or two regimes, filters by pattern and a stricter
//! confidence floor, and re-labels the single-leg direction into a
//! multi-leg instruction whose leg deltas travel in signal metadata.

use rust_decimal::Decimal;
use serde_json::json;

use swingbot_core::config::StrategyParams;
use swingbot_core::types::{Regime, Signal, SignalDirection, TradeRecord};

use crate::swing::SwingStrategy;
use crate::{Strategy, StrategyContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadVariant {
    /// Credit put spread under a bull trend. Sell 30-delta, buy 15-delta.
    BullPut,
    /// Debit put spread under a bear trend on breakout/absorption
    /// patterns. Buy 50-delta, sell 30-delta.
    BearPut,
    /// Straight protective put under bear trend or high chaos, high
    /// conviction only. 50-delta.
    LongPutStraight,
    /// Short iron condor in a confirmed range. 15/5-delta wings both
    /// sides.
    IronCondor,
}

impl SpreadVariant {
    fn kind(self) -> &'static str {
        match self {
            Self::BullPut => "bull_put_spread",
            Self::BearPut => "bear_put_spread",
            Self::LongPutStraight => "long_put_straight",
            Self::IronCondor => "iron_condor",
        }
    }

    fn regime_fits(self, regime: Regime) -> bool {
        match self {
            Self::BullPut => regime == Regime::BullTrend,
            Self::BearPut => regime == Regime::BearTrend,
            Self::LongPutStraight => {
                matches!(regime, Regime::BearTrend | Regime::HighChaos)
            }
            Self::IronCondor => regime == Regime::RangeBound,
        }
    }
}

pub struct SpreadStrategy {
    variant: SpreadVariant,
    inner: SwingStrategy,
}

impl SpreadStrategy {
    #[must_use]
    pub fn new(variant: SpreadVariant) -> Self {
        Self { variant, inner: SwingStrategy::new() }
    }

    fn condor_signal(
        &self,
        symbol: &str,
        price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        let (support, resistance) = ctx.depth.zone_band(symbol, price);
        let (support, resistance) = (support?, resistance?);
        let span = resistance.price - support.price;
        if span <= Decimal::ZERO {
            return None;
        }
        // Price must sit within the inner half of the band.
        let center = (support.price + resistance.price) / Decimal::TWO;
        if (price - center).abs() > span / Decimal::from(4) {
            return None;
        }

        let confidence: f64 = 0.8;
        if confidence < params.min_confidence.max(0.80) {
            return None;
        }
        tracing::info!(
            symbol,
            support = %support.price,
            resistance = %resistance.price,
            "Iron condor signal"
        );
        Some(
            Signal::new(symbol, SignalDirection::IronCondor, confidence, "range_condor")
                .with_level(center)
                .with_meta("support", json!(support.price.to_string()))
                .with_meta("resistance", json!(resistance.price.to_string()))
                .with_meta(
                    "legs",
                    json!({
                        "put_sell_delta": 15, "put_buy_delta": 5,
                        "call_sell_delta": 15, "call_buy_delta": 5,
                    }),
                ),
        )
    }

    fn relabel(&self, inner: Signal, params: &StrategyParams) -> Option<Signal> {
        let bullish = inner.direction.is_bullish();
        match self.variant {
            SpreadVariant::BullPut => {
                if !bullish {
                    return None;
                }
                let mut signal = inner;
                signal.direction = SignalDirection::BullPutSpread;
                signal.metadata.insert(
                    "legs".to_string(),
                    json!({ "sell_delta": 30, "buy_delta": 15 }),
                );
                Some(signal)
            }
            SpreadVariant::BearPut => {
                if bullish {
                    return None;
                }
                if !inner.pattern.contains("breakout") && !inner.pattern.contains("absorption") {
                    return None;
                }
                let mut signal = inner;
                signal.direction = SignalDirection::BearPutSpread;
                signal.metadata.insert(
                    "legs".to_string(),
                    json!({ "buy_delta": 50, "sell_delta": 30 }),
                );
                Some(signal)
            }
            SpreadVariant::LongPutStraight => {
                if bullish || inner.confidence < 0.75_f64.max(params.min_confidence) {
                    return None;
                }
                let mut signal = inner;
                signal.direction = SignalDirection::LongPutStraight;
                signal
                    .metadata
                    .insert("legs".to_string(), json!({ "buy_delta": 50 }));
                Some(signal)
            }
            SpreadVariant::IronCondor => None,
        }
    }
}

impl Strategy for SpreadStrategy {
    fn kind(&self) -> &'static str {
        self.variant.kind()
    }

    fn analyze(
        &mut self,
        symbol: &str,
        price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        if !self.variant.regime_fits(ctx.regime) {
            return None;
        }
        if self.variant == SpreadVariant::IronCondor {
            return self.condor_signal(symbol, price, params, ctx);
        }
        let inner = self.inner.analyze(symbol, price, params, ctx)?;
        self.relabel(inner, params)
    }

    fn on_trade_closed(&mut self, record: &TradeRecord) {
        self.inner.on_trade_closed(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use swingbot_context::SectorStrengthTracker;
    use swingbot_core::types::{DepthLevel, DepthSnapshot};
    use swingbot_depth::{
        AbsorptionBreakout, DepthAnalysis, DepthAnalyzer, HistoricalLevelTracker, LiquidityZone,
        ZoneSide,
    };

    fn zone(price: Decimal, side: ZoneSide) -> LiquidityZone {
        LiquidityZone {
            symbol: "SPY".to_string(),
            side,
            price,
            size: dec!(2000),
            zscore: 6.0,
            first_seen: Utc::now(),
            confirmed: true,
        }
    }

    fn analysis(zones: Vec<LiquidityZone>, imbalance: f64, bullish_breakout: Option<bool>) -> DepthAnalysis {
        DepthAnalysis {
            zones,
            imbalance,
            breakouts: bullish_breakout
                .map(|bullish| AbsorptionBreakout {
                    symbol: "SPY".to_string(),
                    side: if bullish { ZoneSide::Resistance } else { ZoneSide::Support },
                    price: dec!(100),
                    bullish,
                })
                .into_iter()
                .collect(),
        }
    }

    macro_rules! ctx {
        ($regime:expr, $depth:expr, $levels:expr, $sector:expr, $analysis:expr) => {
            StrategyContext {
                regime: $regime,
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
    fn bull_put_relabels_bullish_rejection_with_leg_deltas() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let a = analysis(vec![zone(dec!(99.0), ZoneSide::Support)], 0.5, None);
        let ctx = ctx!(Regime::BullTrend, depth, levels, sector, a);

        let mut spread = SpreadStrategy::new(SpreadVariant::BullPut);
        let signal = spread
            .analyze("SPY", dec!(99.1), &StrategyParams::default(), &ctx)
            .unwrap();
        assert_eq!(signal.direction, SignalDirection::BullPutSpread);
        assert_eq!(signal.pattern, "support_rejection");
        let legs = &signal.metadata["legs"];
        assert_eq!(legs["sell_delta"], 30);
        assert_eq!(legs["buy_delta"], 15);
    }

    #[test]
    fn bull_put_refuses_wrong_regime() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let a = analysis(vec![zone(dec!(99.0), ZoneSide::Support)], 0.5, None);
        let ctx = ctx!(Regime::BearTrend, depth, levels, sector, a);
        let mut spread = SpreadStrategy::new(SpreadVariant::BullPut);
        assert!(spread
            .analyze("SPY", dec!(99.1), &StrategyParams::default(), &ctx)
            .is_none());
    }

    #[test]
    fn bear_put_needs_breakout_or_absorption_pattern() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let mut params = StrategyParams::default();
        params.min_confidence = 0.5;

        // Plain resistance rejection: bearish but not a breakout pattern.
        let a = analysis(vec![zone(dec!(100.1), ZoneSide::Resistance)], -0.5, None);
        let ctx = ctx!(Regime::BearTrend, depth, levels, sector, a);
        let mut spread = SpreadStrategy::new(SpreadVariant::BearPut);
        assert!(spread.analyze("SPY", dec!(100.0), &params, &ctx).is_none());

        // Bearish absorption breakout qualifies.
        let a = analysis(vec![], -0.5, Some(false));
        let ctx = ctx!(Regime::BearTrend, depth, levels, sector, a);
        let signal = spread.analyze("SPY", dec!(100.0), &params, &ctx).unwrap();
        assert_eq!(signal.direction, SignalDirection::BearPutSpread);
        assert_eq!(signal.metadata["legs"]["buy_delta"], 50);
        assert_eq!(signal.metadata["legs"]["sell_delta"], 30);
    }

    #[test]
    fn long_put_straight_needs_high_conviction() {
        let depth = DepthAnalyzer::new();
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let mut params = StrategyParams::default();
        params.min_confidence = 0.5;

        // Bearish absorption with neutral book: 0.7 confidence, below 0.75.
        let a = analysis(vec![], 0.0, Some(false));
        let ctx = ctx!(Regime::HighChaos, depth, levels, sector, a);
        let mut spread = SpreadStrategy::new(SpreadVariant::LongPutStraight);
        assert!(spread.analyze("SPY", dec!(100.0), &params, &ctx).is_none());

        // Ask-heavy book lifts it to 0.85.
        let a = analysis(vec![], -0.5, Some(false));
        let ctx = ctx!(Regime::HighChaos, depth, levels, sector, a);
        let signal = spread.analyze("SPY", dec!(100.0), &params, &ctx).unwrap();
        assert_eq!(signal.direction, SignalDirection::LongPutStraight);
        assert_eq!(signal.metadata["legs"]["buy_delta"], 50);
    }

    // ------------------------------------------------------------------
    // Iron condor
    // ------------------------------------------------------------------

    fn level(price: Decimal, size: Decimal) -> DepthLevel {
        DepthLevel { price, size }
    }

    /// Confirmed support at 98 and resistance at 106 via the analyzer.
    fn analyzer_with_band() -> DepthAnalyzer {
        let params = StrategyParams::default();
        let mut analyzer = DepthAnalyzer::new();
        let t0 = Utc::now() - Duration::minutes(10);
        for minutes in [0, 6] {
            let snap = DepthSnapshot {
                symbol: "SPY".to_string(),
                bids: vec![
                    level(dec!(101.9), dec!(100)),
                    level(dec!(101.0), dec!(100)),
                    level(dec!(100.0), dec!(100)),
                    level(dec!(99.0), dec!(100)),
                    level(dec!(98.0), dec!(5000)),
                ],
                asks: vec![
                    level(dec!(102.1), dec!(100)),
                    level(dec!(103.0), dec!(100)),
                    level(dec!(104.0), dec!(100)),
                    level(dec!(105.0), dec!(100)),
                    level(dec!(106.0), dec!(5000)),
                ],
                timestamp: t0 + Duration::minutes(minutes),
            };
            analyzer.analyze(&snap, &params).unwrap();
        }
        analyzer
    }

    #[test]
    fn condor_fires_only_inside_inner_half_of_band() {
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let params = StrategyParams::default();
        let depth = analyzer_with_band();
        let a = analysis(vec![], 0.0, None);

        // Band 98..106, center 102, inner half 100..104. Price 102: fires.
        let ctx = ctx!(Regime::RangeBound, depth, levels, sector, a);
        let mut condor = SpreadStrategy::new(SpreadVariant::IronCondor);
        let signal = condor.analyze("SPY", dec!(102), &params, &ctx).unwrap();
        assert_eq!(signal.direction, SignalDirection::IronCondor);
        assert!((signal.confidence - 0.8).abs() < 1e-9);
        assert_eq!(signal.metadata["legs"]["put_sell_delta"], 15);
        assert_eq!(signal.metadata["legs"]["call_buy_delta"], 5);

        // Price hugging the band edge: outside the inner half.
        let a2 = analysis(vec![], 0.0, None);
        let ctx = ctx!(Regime::RangeBound, depth, levels, sector, a2);
        assert!(condor.analyze("SPY", dec!(105.0), &params, &ctx).is_none());
    }

    #[test]
    fn condor_requires_range_bound_regime() {
        let levels = HistoricalLevelTracker::new();
        let sector = SectorStrengthTracker::default();
        let params = StrategyParams::default();
        let depth = analyzer_with_band();
        let a = analysis(vec![], 0.0, None);
        let ctx = ctx!(Regime::BullTrend, depth, levels, sector, a);
        let mut condor = SpreadStrategy::new(SpreadVariant::IronCondor);
        assert!(condor.analyze("SPY", dec!(102), &params, &ctx).is_none());
    }
}
