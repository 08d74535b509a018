//! Market regime classification.
//!
//! Fixed evaluation priority: HighChaos beats BearTrend beats RangeBound
//! beats BullTrend; Unknown when the series are too short to decide.
//! Inputs are daily closes, oldest first.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use swingbot_core::types::Regime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeThresholds {
    /// VIX level above which the market is chaotic outright.
    pub vix_chaos_level: f64,
    /// Fractional VIX rise over `spike_days` that flags chaos.
    pub vix_spike_pct: f64,
    pub spike_days: usize,
    /// Benchmark realized daily-return volatility (stddev over
    /// `spike_days` returns) that flags chaos.
    pub realized_vol_threshold: f64,
    /// Long moving-average period for the trend split.
    pub sma_period: usize,
    /// Range-bound: high/low span over `range_days` below this fraction.
    pub range_days: usize,
    pub range_pct: f64,
    /// Range-bound also requires VIX inside this band.
    pub vix_band_low: f64,
    pub vix_band_high: f64,
    /// Bull trend requires VIX below this.
    pub bull_vix_max: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            vix_chaos_level: 30.0,
            vix_spike_pct: 0.20,
            spike_days: 5,
            realized_vol_threshold: 0.02,
            sma_period: 200,
            range_days: 10,
            range_pct: 0.02,
            vix_band_low: 15.0,
            vix_band_high: 25.0,
            bull_vix_max: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    pub thresholds: RegimeThresholds,
}

impl RegimeClassifier {
    #[must_use]
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify from benchmark and volatility-index daily closes.
    #[must_use]
    pub fn classify(&self, benchmark: &[Decimal], vix: &[Decimal]) -> Regime {
        let t = &self.thresholds;

        // Chaos checks run first and need only short windows.
        if let Some(vix_now) = vix.last().and_then(|v| v.to_f64()) {
            if vix_now > t.vix_chaos_level {
                return Regime::HighChaos;
            }
            if vix.len() > t.spike_days {
                let then = vix[vix.len() - 1 - t.spike_days].to_f64().unwrap_or(0.0);
                if then > 0.0 && (vix_now - then) / then > t.vix_spike_pct {
                    return Regime::HighChaos;
                }
            }
        }
        if let Some(vol) = realized_vol(benchmark, t.spike_days) {
            if vol > t.realized_vol_threshold {
                return Regime::HighChaos;
            }
        }

        let (Some(px), Some(vix_now)) = (
            benchmark.last().and_then(|v| v.to_f64()),
            vix.last().and_then(|v| v.to_f64()),
        ) else {
            return Regime::Unknown;
        };
        if benchmark.len() < t.sma_period {
            return Regime::Unknown;
        }
        let sma = mean(&benchmark[benchmark.len() - t.sma_period..]);

        if px < sma {
            return Regime::BearTrend;
        }

        if benchmark.len() >= t.range_days {
            let window = &benchmark[benchmark.len() - t.range_days..];
            let high = window.iter().max().copied().unwrap_or_default();
            let low = window.iter().min().copied().unwrap_or_default();
            if !low.is_zero() {
                let span = ((high - low) / low).to_f64().unwrap_or(f64::MAX);
                if span < t.range_pct && (t.vix_band_low..=t.vix_band_high).contains(&vix_now) {
                    return Regime::RangeBound;
                }
            }
        }

        if px > sma && vix_now < t.bull_vix_max {
            return Regime::BullTrend;
        }

        Regime::Unknown
    }
}

fn mean(values: &[Decimal]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: Decimal = values.iter().copied().sum();
    (sum / Decimal::from(values.len() as u64))
        .to_f64()
        .unwrap_or(0.0)
}

/// Population stddev of the last `days` daily returns; `None` when the
/// series is too short.
fn realized_vol(closes: &[Decimal], days: usize) -> Option<f64> {
    if closes.len() <= days {
        return None;
    }
    let tail = &closes[closes.len() - days - 1..];
    let returns: Vec<f64> = tail
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].to_f64()?;
            let curr = w[1].to_f64()?;
            (prev != 0.0).then_some(curr / prev - 1.0)
        })
        .collect();
    if returns.len() < days {
        return None;
    }
    let m = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / returns.len() as f64;
    Some(var.sqrt())
}
