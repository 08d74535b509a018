//! Historical support/resistance levels from swing-point clustering.
//!
//! Bars are scanned for swing highs/lows, nearby swings merge into
//! levels, and each bounce's contribution decays with age. Decayed
//! weight is recomputed at read time, never stored. A level that lines
//! up with a live liquidity zone forms a power level.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use swingbot_core::config::{DecayMode, StrategyParams};
use swingbot_core::types::Bar;

use crate::analyzer::LiquidityZone;

/// A clustered swing level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalLevel {
    /// Weighted-average price of the merged swings.
    pub price: Decimal,
    /// Timestamps of the individual bounces; weight decays per bounce.
    pub touches: Vec<DateTime<Utc>>,
    /// Mean bar volume across the touch bars.
    pub avg_volume: Decimal,
    pub timeframe: String,
}

impl HistoricalLevel {
    #[must_use]
    pub fn bounces(&self) -> u32 {
        self.touches.len() as u32
    }

    /// Decayed weight in [0, 1]: mean per-bounce decay scaled by bounce
    /// strength `min(1, bounces/5)`.
    #[must_use]
    pub fn weight(&self, params: &StrategyParams, now: DateTime<Utc>) -> f64 {
        if self.touches.is_empty() {
            return 0.0;
        }
        let decayed: f64 = self
            .touches
            .iter()
            .map(|t| {
                let age_days = (now - *t).num_seconds() as f64 / 86_400.0;
                match params.decay_mode {
                    DecayMode::Linear => (1.0 - age_days / params.linear_decay_days).max(0.0),
                    DecayMode::Exponential => 0.5_f64.powf(age_days / params.half_life_days),
                }
            })
            .sum();
        let strength = (f64::from(self.bounces()) / 5.0).min(1.0);
        (decayed / self.touches.len() as f64) * strength
    }
}

/// Depth-vs-history classification of a power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthStrength {
    Weak,
    Normal,
    Strong,
}

/// Confluence of a live zone and a historical level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerLevel {
    pub zone_price: Decimal,
    pub level_price: Decimal,
    /// Additive confidence boost, including any strong-depth and volume
    /// bonus.
    pub boost: f64,
    pub strength: DepthStrength,
}

/// Outcome of checking a zone against the historical levels.
#[derive(Debug, Clone)]
pub enum PowerCheck {
    /// No historical level near the zone.
    NoMatch,
    /// Level matched but current depth is a fraction of the historical
    /// average — stale level, suppress the signal outright.
    Suppressed,
    Confluence(PowerLevel),
}

#[derive(Debug, Clone)]
struct CachedLevels {
    levels: Vec<HistoricalLevel>,
    fetched_at: DateTime<Utc>,
}

/// Per-symbol level cache with a read-time TTL.
#[derive(Debug, Default)]
pub struct HistoricalLevelTracker {
    cache: HashMap<String, CachedLevels>,
}

impl HistoricalLevelTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `levels` for the symbol are missing or older than the TTL.
    #[must_use]
    pub fn needs_refresh(&self, symbol: &str, now: DateTime<Utc>, params: &StrategyParams) -> bool {
        match self.cache.get(symbol) {
            Some(cached) => now - cached.fetched_at >= Duration::hours(params.level_cache_hours),
            None => true,
        }
    }

    /// Rebuild the symbol's levels from fresh bars.
    pub fn refresh(
        &mut self,
        symbol: &str,
        timeframe: &str,
        bars: &[Bar],
        params: &StrategyParams,
        now: DateTime<Utc>,
    ) {
        let levels = build_levels(bars, timeframe, params);
        tracing::debug!(
            symbol,
            timeframe,
            bars = bars.len(),
            levels = levels.len(),
            "Historical levels refreshed"
        );
        self.cache.insert(
            symbol.to_string(),
            CachedLevels { levels, fetched_at: now },
        );
    }

    #[must_use]
    pub fn levels(&self, symbol: &str) -> &[HistoricalLevel] {
        self.cache
            .get(symbol)
            .map(|c| c.levels.as_slice())
            .unwrap_or(&[])
    }

    /// Check a live zone for power-level confluence.
    #[must_use]
    pub fn power_check(
        &self,
        zone: &LiquidityZone,
        params: &StrategyParams,
        now: DateTime<Utc>,
    ) -> PowerCheck {
        let tolerance = zone.price * params.power_level_proximity_pct;
        let Some(level) = self
            .levels(&zone.symbol)
            .iter()
            .filter(|l| (l.price - zone.price).abs() <= tolerance)
            .max_by(|a, b| {
                a.weight(params, now)
                    .partial_cmp(&b.weight(params, now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        else {
            return PowerCheck::NoMatch;
        };

        let weight = level.weight(params, now);
        if weight <= 0.0 {
            return PowerCheck::NoMatch;
        }

        let depth_ratio = if level.avg_volume.is_zero() {
            1.0
        } else {
            (zone.size / level.avg_volume).to_f64().unwrap_or(1.0)
        };

        if depth_ratio < params.weak_depth_threshold {
            tracing::debug!(
                symbol = zone.symbol,
                zone_price = %zone.price,
                level_price = %level.price,
                depth_ratio,
                "Stale power level, suppressing"
            );
            return PowerCheck::Suppressed;
        }

        let strength = if depth_ratio > params.strong_depth_threshold {
            DepthStrength::Strong
        } else {
            DepthStrength::Normal
        };

        let volume_bonus = (zone.size.to_f64().unwrap_or(0.0) / 50_000.0).min(0.1);
        let mut boost = params.power_level_boost * weight + volume_bonus;
        if strength == DepthStrength::Strong {
            boost += params.strong_depth_bonus;
        }

        PowerCheck::Confluence(PowerLevel {
            zone_price: zone.price,
            level_price: level.price,
            boost,
            strength,
        })
    }
}

/// Swing-high/low detection and proximity clustering over a bar series.
#[must_use]
pub fn build_levels(bars: &[Bar], timeframe: &str, params: &StrategyParams) -> Vec<HistoricalLevel> {
    let w = params.swing_window;
    if bars.len() < 2 * w + 1 {
        return Vec::new();
    }

    // (price, timestamp, volume) of each swing point.
    let mut swings: Vec<(Decimal, DateTime<Utc>, Decimal)> = Vec::new();
    for i in w..bars.len() - w {
        let bar = &bars[i];
        let window = &bars[i - w..=i + w];
        let is_swing_high = window.iter().all(|b| b.high <= bar.high);
        let is_swing_low = window.iter().all(|b| b.low >= bar.low);
        if is_swing_high {
            swings.push((bar.high, bar.timestamp, bar.volume));
        }
        if is_swing_low {
            swings.push((bar.low, bar.timestamp, bar.volume));
        }
    }

    swings.sort_by(|a, b| a.0.cmp(&b.0));

    // Merge runs of swings within the proximity tolerance of the cluster
    // average.
    let mut levels: Vec<HistoricalLevel> = Vec::new();
    let mut cluster: Vec<(Decimal, DateTime<Utc>, Decimal)> = Vec::new();
    for swing in swings {
        if cluster.is_empty() {
            cluster.push(swing);
            continue;
        }
        let avg = cluster_price(&cluster);
        if (swing.0 - avg).abs() <= avg * params.bounce_proximity_pct {
            cluster.push(swing);
        } else {
            push_cluster(&mut levels, &cluster, timeframe, params);
            cluster = vec![swing];
        }
    }
    push_cluster(&mut levels, &cluster, timeframe, params);

    levels
}

fn cluster_price(cluster: &[(Decimal, DateTime<Utc>, Decimal)]) -> Decimal {
    let sum: Decimal = cluster.iter().map(|s| s.0).sum();
    sum / Decimal::from(cluster.len() as u64)
}

fn push_cluster(
    levels: &mut Vec<HistoricalLevel>,
    cluster: &[(Decimal, DateTime<Utc>, Decimal)],
    timeframe: &str,
    params: &StrategyParams,
) {
    if cluster.len() < params.min_bounces as usize {
        return;
    }
    let volume: Decimal = cluster.iter().map(|s| s.2).sum();
    levels.push(HistoricalLevel {
        price: cluster_price(cluster),
        touches: cluster.iter().map(|s| s.1).collect(),
        avg_volume: volume / Decimal::from(cluster.len() as u64),
        timeframe: timeframe.to_string(),
    });
}
