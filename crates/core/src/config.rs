//! Configuration model.
//!
//! Tunables resolve through an explicit three-level merge: global
//! defaults, then per-instance overrides, then per-symbol overrides.
//! The merge is performed once per evaluation into a flattened
//! [`StrategyParams`] — strategies never walk the layering themselves.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Regime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Global parameter defaults, overridable per instance and per symbol.
    #[serde(default)]
    pub defaults: StrategyParams,
    #[serde(default)]
    pub strategies: Vec<StrategyInstanceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            defaults: StrategyParams::default(),
            strategies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scan cadence in seconds. One cycle at a time, never overlapping.
    pub scan_interval_secs: u64,
    pub regime_refresh_secs: u64,
    pub sector_refresh_secs: u64,
    pub benchmark_symbol: String,
    pub volatility_symbol: String,
    /// Session boundaries in exchange-local time (US equities: Eastern).
    pub session_open: NaiveTime,
    pub session_close: NaiveTime,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 10,
            regime_refresh_secs: 300,
            sector_refresh_secs: 600,
            benchmark_symbol: "SPY".to_string(),
            volatility_symbol: "VIX".to_string(),
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            session_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        }
    }
}

/// One configured strategy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstanceConfig {
    /// Unique instance name; keys budget rows and position ownership.
    pub name: String,
    /// Registry key: "swing", "scalping", "orb", "bull_put_spread",
    /// "bear_put_spread", "long_put_straight", "iron_condor".
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub budget_cap: Decimal,
    pub symbols: Vec<String>,
    /// Regimes in which this instance may trade. Empty means all.
    #[serde(default)]
    pub allowed_regimes: Vec<Regime>,
    /// Whether sector relative strength may veto this instance's signals.
    #[serde(default = "default_true")]
    pub sector_veto: bool,
    #[serde(default)]
    pub overrides: ParamOverrides,
    #[serde(default)]
    pub symbol_overrides: BTreeMap<String, ParamOverrides>,
}

fn default_true() -> bool {
    true
}

impl StrategyInstanceConfig {
    /// Flattened parameters for one symbol: global defaults, then the
    /// instance layer, then the symbol layer.
    #[must_use]
    pub fn params_for(&self, defaults: &StrategyParams, symbol: &str) -> StrategyParams {
        let mut params = defaults.merged(&self.overrides);
        if let Some(sym) = self.symbol_overrides.get(symbol) {
            params = params.merged(sym);
        }
        params
    }

    /// Whether `regime` admits signals from this instance.
    #[must_use]
    pub fn regime_allowed(&self, regime: Regime) -> bool {
        self.allowed_regimes.is_empty() || self.allowed_regimes.contains(&regime)
    }
}

/// Decay applied to historical level bounces by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    Linear,
    Exponential,
}

/// Fully resolved tunables for one (instance, symbol) pair.
///
/// Fields absent from the `[defaults]` table take their documented
/// default values, so a config file only names what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    // --- Depth analysis ---
    /// Z-score a price bucket must exceed to count as a liquidity zone.
    pub zscore_threshold: f64,
    /// Zones within this fraction of the mid price are dropped as
    /// market-maker noise.
    pub exclusion_zone_pct: Decimal,
    /// Minutes a zone must stay significant before it confirms.
    pub level_confirmation_minutes: i64,
    /// Fractional size drop across consecutive observations that marks
    /// absorption.
    pub absorption_threshold_pct: Decimal,
    /// Consecutive absorbing refreshes required before a breakout counts.
    pub min_refresh_count: u32,
    /// Book depth (levels per side) over which imbalance is computed.
    pub imbalance_levels: usize,
    /// Additive weight of imbalance on zone-signal confidence.
    pub imbalance_weight: f64,
    /// Price-proximity band around a confirmed zone for rejection entries.
    pub zone_proximity_pct: Decimal,

    // --- Historical levels ---
    pub swing_window: usize,
    pub bounce_proximity_pct: Decimal,
    pub min_bounces: u32,
    pub decay_mode: DecayMode,
    pub linear_decay_days: f64,
    pub half_life_days: f64,
    pub level_cache_hours: i64,
    pub historical_lookback_days: u32,
    pub power_level_proximity_pct: Decimal,
    pub power_level_boost: f64,
    /// Depth-to-historical-average ratio below which a power level is
    /// treated as stale and the signal suppressed outright.
    pub weak_depth_threshold: f64,
    pub strong_depth_threshold: f64,
    pub strong_depth_bonus: f64,

    // --- Strategy thresholds ---
    pub min_confidence: f64,
    /// Separate floor for bearish signals; falls back to
    /// `min_confidence` when unset.
    pub min_confidence_bearish: Option<f64>,
    pub imbalance_entry_threshold: f64,
    pub min_progress_pct: Decimal,
    pub max_ticks_without_progress: u32,
    pub imbalance_flip_threshold: f64,
    pub orb_minutes: i64,
    pub trading_window_minutes: i64,
    pub vix_slope_minutes: i64,
    pub vix_divergence_threshold: f64,
    pub feedback_min_trades: usize,
    pub feedback_max_boost: f64,
    pub feedback_max_penalty: f64,
    pub feedback_window: usize,

    // --- Sizing ---
    pub position_size_pct: Decimal,
    pub max_notional: Decimal,
    pub max_contract_cost: Decimal,
    pub max_open_positions: usize,
    pub allow_stacking: bool,
    pub one_trade_per_day: bool,
    pub min_dte: u32,
    pub max_dte: u32,

    // --- Brackets and exits ---
    pub stop_loss_pct: Decimal,
    pub profit_target_pct: Decimal,
    pub trailing_activation_pct: Decimal,
    pub trailing_distance_pct: Decimal,
    pub max_hold_minutes: Option<i64>,
    pub order_timeout_secs: u64,
    pub max_entry_drift_pct: Decimal,

    // --- Loss pauses ---
    pub max_daily_loss_pct: Decimal,
    pub max_consecutive_losses: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            zscore_threshold: 3.0,
            exclusion_zone_pct: Decimal::new(1, 3), // 0.1%
            level_confirmation_minutes: 5,
            absorption_threshold_pct: Decimal::new(30, 2), // 30%
            min_refresh_count: 2,
            imbalance_levels: 10,
            imbalance_weight: 0.3,
            zone_proximity_pct: Decimal::new(2, 3), // 0.2%

            swing_window: 5,
            bounce_proximity_pct: Decimal::new(1, 3),
            min_bounces: 2,
            decay_mode: DecayMode::Linear,
            linear_decay_days: 30.0,
            half_life_days: 15.0,
            level_cache_hours: 24,
            historical_lookback_days: 30,
            power_level_proximity_pct: Decimal::new(5, 3), // 0.5%
            power_level_boost: 0.15,
            weak_depth_threshold: 0.5,
            strong_depth_threshold: 1.5,
            strong_depth_bonus: 0.05,

            min_confidence: 0.65,
            min_confidence_bearish: None,
            imbalance_entry_threshold: 0.7,
            min_progress_pct: Decimal::new(1, 3),
            max_ticks_without_progress: 5,
            imbalance_flip_threshold: 0.3,
            orb_minutes: 15,
            trading_window_minutes: 45,
            vix_slope_minutes: 5,
            vix_divergence_threshold: 0.005,
            feedback_min_trades: 5,
            feedback_max_boost: 0.10,
            feedback_max_penalty: 0.10,
            feedback_window: 20,

            position_size_pct: Decimal::new(2, 2), // 2% of equity
            max_notional: Decimal::from(5_000),
            max_contract_cost: Decimal::from(1_500),
            max_open_positions: 3,
            allow_stacking: false,
            one_trade_per_day: false,
            min_dte: 7,
            max_dte: 45,

            stop_loss_pct: Decimal::new(50, 2),
            profit_target_pct: Decimal::new(30, 2),
            trailing_activation_pct: Decimal::new(10, 2),
            trailing_distance_pct: Decimal::new(5, 2),
            max_hold_minutes: None,
            order_timeout_secs: 60,
            max_entry_drift_pct: Decimal::new(5, 3),

            max_daily_loss_pct: Decimal::new(5, 2),
            max_consecutive_losses: 3,
        }
    }
}

/// One override layer: every field optional, absent fields inherit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamOverrides {
    pub zscore_threshold: Option<f64>,
    pub exclusion_zone_pct: Option<Decimal>,
    pub level_confirmation_minutes: Option<i64>,
    pub absorption_threshold_pct: Option<Decimal>,
    pub min_refresh_count: Option<u32>,
    pub imbalance_levels: Option<usize>,
    pub imbalance_weight: Option<f64>,
    pub zone_proximity_pct: Option<Decimal>,

    pub swing_window: Option<usize>,
    pub bounce_proximity_pct: Option<Decimal>,
    pub min_bounces: Option<u32>,
    pub decay_mode: Option<DecayMode>,
    pub linear_decay_days: Option<f64>,
    pub half_life_days: Option<f64>,
    pub level_cache_hours: Option<i64>,
    pub historical_lookback_days: Option<u32>,
    pub power_level_proximity_pct: Option<Decimal>,
    pub power_level_boost: Option<f64>,
    pub weak_depth_threshold: Option<f64>,
    pub strong_depth_threshold: Option<f64>,
    pub strong_depth_bonus: Option<f64>,

    pub min_confidence: Option<f64>,
    pub min_confidence_bearish: Option<Option<f64>>,
    pub imbalance_entry_threshold: Option<f64>,
    pub min_progress_pct: Option<Decimal>,
    pub max_ticks_without_progress: Option<u32>,
    pub imbalance_flip_threshold: Option<f64>,
    pub orb_minutes: Option<i64>,
    pub trading_window_minutes: Option<i64>,
    pub vix_slope_minutes: Option<i64>,
    pub vix_divergence_threshold: Option<f64>,
    pub feedback_min_trades: Option<usize>,
    pub feedback_max_boost: Option<f64>,
    pub feedback_max_penalty: Option<f64>,
    pub feedback_window: Option<usize>,

    pub position_size_pct: Option<Decimal>,
    pub max_notional: Option<Decimal>,
    pub max_contract_cost: Option<Decimal>,
    pub max_open_positions: Option<usize>,
    pub allow_stacking: Option<bool>,
    pub one_trade_per_day: Option<bool>,
    pub min_dte: Option<u32>,
    pub max_dte: Option<u32>,

    pub stop_loss_pct: Option<Decimal>,
    pub profit_target_pct: Option<Decimal>,
    pub trailing_activation_pct: Option<Decimal>,
    pub trailing_distance_pct: Option<Decimal>,
    pub max_hold_minutes: Option<Option<i64>>,
    pub order_timeout_secs: Option<u64>,
    pub max_entry_drift_pct: Option<Decimal>,

    pub max_daily_loss_pct: Option<Decimal>,
    pub max_consecutive_losses: Option<u32>,
}

macro_rules! overlay {
    ($params:ident, $over:ident, $($field:ident),* $(,)?) => {
        $( if let Some(v) = $over.$field { $params.$field = v; } )*
    };
}

impl StrategyParams {
    /// Confidence floor for a signal direction.
    #[must_use]
    pub fn confidence_floor(&self, bullish: bool) -> f64 {
        if bullish {
            self.min_confidence
        } else {
            self.min_confidence_bearish.unwrap_or(self.min_confidence)
        }
    }

    /// Apply one override layer on top of these parameters.
    #[must_use]
    pub fn merged(&self, over: &ParamOverrides) -> StrategyParams {
        let mut params = self.clone();
        overlay!(
            params, over,
            zscore_threshold, exclusion_zone_pct, level_confirmation_minutes,
            absorption_threshold_pct, min_refresh_count, imbalance_levels,
            imbalance_weight, zone_proximity_pct,
            swing_window, bounce_proximity_pct, min_bounces, decay_mode,
            linear_decay_days, half_life_days, level_cache_hours,
            historical_lookback_days, power_level_proximity_pct,
            power_level_boost, weak_depth_threshold, strong_depth_threshold,
            strong_depth_bonus,
            min_confidence, min_confidence_bearish, imbalance_entry_threshold,
            min_progress_pct,
            max_ticks_without_progress, imbalance_flip_threshold, orb_minutes,
            trading_window_minutes, vix_slope_minutes, vix_divergence_threshold,
            feedback_min_trades, feedback_max_boost, feedback_max_penalty,
            feedback_window,
            position_size_pct, max_notional, max_contract_cost,
            max_open_positions, allow_stacking, one_trade_per_day,
            min_dte, max_dte,
            stop_loss_pct, profit_target_pct, trailing_activation_pct,
            trailing_distance_pct, max_hold_minutes, order_timeout_secs,
            max_entry_drift_pct,
            max_daily_loss_pct, max_consecutive_losses,
        );
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_documented_values() {
        let p = StrategyParams::default();
        assert!((p.zscore_threshold - 3.0).abs() < f64::EPSILON);
        assert_eq!(p.level_confirmation_minutes, 5);
        assert_eq!(p.exclusion_zone_pct, dec!(0.001));
        assert_eq!(p.stop_loss_pct, dec!(0.50));
        assert_eq!(p.profit_target_pct, dec!(0.30));
        assert!((p.imbalance_weight - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn symbol_override_wins_over_instance_override() {
        let instance = StrategyInstanceConfig {
            name: "swing-a".to_string(),
            kind: "swing".to_string(),
            enabled: true,
            budget_cap: dec!(2000),
            symbols: vec!["SPY".to_string(), "QQQ".to_string()],
            allowed_regimes: vec![],
            sector_veto: true,
            overrides: ParamOverrides {
                min_confidence: Some(0.70),
                stop_loss_pct: Some(dec!(0.40)),
                ..ParamOverrides::default()
            },
            symbol_overrides: [(
                "QQQ".to_string(),
                ParamOverrides {
                    min_confidence: Some(0.80),
                    ..ParamOverrides::default()
                },
            )]
            .into_iter()
            .collect(),
        };
        let defaults = StrategyParams::default();

        let spy = instance.params_for(&defaults, "SPY");
        assert!((spy.min_confidence - 0.70).abs() < f64::EPSILON);
        assert_eq!(spy.stop_loss_pct, dec!(0.40));

        let qqq = instance.params_for(&defaults, "QQQ");
        assert!((qqq.min_confidence - 0.80).abs() < f64::EPSILON);
        // Instance layer still applies underneath the symbol layer.
        assert_eq!(qqq.stop_loss_pct, dec!(0.40));
    }

    #[test]
    fn empty_allowed_regimes_admits_all() {
        let mut instance = StrategyInstanceConfig {
            name: "scalp".to_string(),
            kind: "scalping".to_string(),
            enabled: true,
            budget_cap: dec!(1000),
            symbols: vec!["SPY".to_string()],
            allowed_regimes: vec![],
            sector_veto: false,
            overrides: ParamOverrides::default(),
            symbol_overrides: BTreeMap::new(),
        };
        assert!(instance.regime_allowed(Regime::HighChaos));

        instance.allowed_regimes = vec![Regime::BullTrend, Regime::RangeBound];
        assert!(!instance.regime_allowed(Regime::HighChaos));
        assert!(instance.regime_allowed(Regime::RangeBound));
    }
}
