//! Sector relative-strength tracking.
//!
//! Each tracked sector ETF is ratioed against the benchmark close by
//! close; the slope of that ratio over a short window is the sector's
//! relative strength. The decision engine vetoes signals whose mapped
//! sector slopes against them.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// The eleven SPDR sector ETFs.
pub const SECTOR_ETFS: [&str; 11] = [
    "XLB", "XLC", "XLE", "XLF", "XLI", "XLK", "XLP", "XLRE", "XLU", "XLV", "XLY",
];

/// Default ticker-to-sector-ETF mapping for common symbols. Unmapped
/// symbols are never sector-vetoed.
#[must_use]
pub fn default_sector_map() -> HashMap<String, String> {
    [
        ("AAPL", "XLK"), ("MSFT", "XLK"), ("NVDA", "XLK"), ("AMD", "XLK"),
        ("AVGO", "XLK"), ("GOOGL", "XLC"), ("META", "XLC"), ("NFLX", "XLC"),
        ("AMZN", "XLY"), ("TSLA", "XLY"), ("HD", "XLY"),
        ("JPM", "XLF"), ("BAC", "XLF"), ("GS", "XLF"),
        ("XOM", "XLE"), ("CVX", "XLE"),
        ("UNH", "XLV"), ("JNJ", "XLV"), ("LLY", "XLV"),
        ("CAT", "XLI"), ("BA", "XLI"),
        ("PG", "XLP"), ("KO", "XLP"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone)]
pub struct SectorStrengthTracker {
    /// Ratio-slope window in periods.
    window: usize,
    /// Slope magnitude below which a sector is treated as neutral.
    slope_tolerance: f64,
    sector_map: HashMap<String, String>,
    slopes: HashMap<String, f64>,
    as_of: Option<DateTime<Utc>>,
}

impl SectorStrengthTracker {
    #[must_use]
    pub fn new(window: usize, slope_tolerance: f64) -> Self {
        Self {
            window,
            slope_tolerance,
            sector_map: default_sector_map(),
            slopes: HashMap::new(),
            as_of: None,
        }
    }

    #[must_use]
    pub fn with_sector_map(mut self, map: HashMap<String, String>) -> Self {
        self.sector_map = map;
        self
    }

    /// Recompute slopes from per-ETF close series against the benchmark.
    /// Series are oldest-first and positionally aligned with the
    /// benchmark; sectors with too little data are dropped from the
    /// snapshot.
    pub fn refresh(
        &mut self,
        sector_closes: &HashMap<String, Vec<Decimal>>,
        benchmark_closes: &[Decimal],
        now: DateTime<Utc>,
    ) {
        self.slopes.clear();
        for (etf, closes) in sector_closes {
            if let Some(slope) = ratio_slope(closes, benchmark_closes, self.window) {
                self.slopes.insert(etf.clone(), slope);
            }
        }
        self.as_of = Some(now);
        tracing::debug!(sectors = self.slopes.len(), "Sector strength refreshed");
    }

    /// Relative-strength slope for the ETF covering `symbol`.
    #[must_use]
    pub fn slope_for(&self, symbol: &str) -> Option<f64> {
        let etf = self.sector_map.get(symbol)?;
        self.slopes.get(etf).copied()
    }

    /// Whether the symbol's sector opposes a signal in the given
    /// direction. Unmapped symbols and neutral slopes are never vetoed.
    #[must_use]
    pub fn vetoes(&self, symbol: &str, bullish: bool) -> bool {
        match self.slope_for(symbol) {
            Some(slope) if bullish => slope < -self.slope_tolerance,
            Some(slope) => slope > self.slope_tolerance,
            None => false,
        }
    }

    #[must_use]
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.as_of
    }
}

impl Default for SectorStrengthTracker {
    fn default() -> Self {
        Self::new(5, 0.0005)
    }
}

/// `(lastRatio − firstRatio) / periods` over the trailing window.
fn ratio_slope(sector: &[Decimal], benchmark: &[Decimal], window: usize) -> Option<f64> {
    let n = sector.len().min(benchmark.len());
    if n < window || window < 2 {
        return None;
    }
    let sector = &sector[sector.len() - window..];
    let benchmark = &benchmark[benchmark.len() - window..];

    let first = ratio(sector[0], benchmark[0])?;
    let last = ratio(sector[window - 1], benchmark[window - 1])?;
    Some((last - first) / window as f64)
}

fn ratio(sector: Decimal, benchmark: Decimal) -> Option<f64> {
    if benchmark.is_zero() {
        return None;
    }
    (sector / benchmark).to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn series(values: &[f64]) -> Vec<Decimal> {
        values
            .iter()
            .map(|v| Decimal::try_from(*v).unwrap_or_default())
            .collect()
    }

    #[test]
    fn rising_ratio_has_positive_slope() {
        // Sector outperforming a flat benchmark.
        let slope = ratio_slope(
            &series(&[100.0, 101.0, 102.0, 103.0, 104.0]),
            &series(&[500.0, 500.0, 500.0, 500.0, 500.0]),
            5,
        )
        .unwrap();
        // (0.208 - 0.200) / 5
        assert!((slope - 0.0016).abs() < 1e-9);
    }

    #[test]
    fn short_series_yields_none() {
        assert!(ratio_slope(&series(&[100.0, 101.0]), &series(&[500.0, 500.0]), 5).is_none());
    }

    #[test]
    fn veto_fires_against_the_signal_direction_only() {
        let mut tracker = SectorStrengthTracker::default();
        let mut sectors = HashMap::new();
        // XLK sliding against a flat benchmark.
        sectors.insert(
            "XLK".to_string(),
            series(&[104.0, 103.0, 102.0, 101.0, 100.0]),
        );
        tracker.refresh(&sectors, &series(&[500.0; 5]), Utc::now());

        assert!(tracker.vetoes("NVDA", true));
        assert!(!tracker.vetoes("NVDA", false));
        // Unmapped symbol is never vetoed.
        assert!(!tracker.vetoes("ZZZZ", true));
        // Mapped symbol whose ETF has no data is never vetoed.
        assert!(!tracker.vetoes("XOM", true));
    }

    #[test]
    fn neutral_slope_inside_tolerance_does_not_veto() {
        let mut tracker = SectorStrengthTracker::new(5, 0.01);
        let mut sectors = HashMap::new();
        sectors.insert(
            "XLK".to_string(),
            series(&[100.0, 100.1, 100.0, 99.9, 100.0]),
        );
        tracker.refresh(&sectors, &series(&[500.0; 5]), Utc::now());
        assert!(!tracker.vetoes("NVDA", true));
        assert!(!tracker.vetoes("NVDA", false));
    }

    #[test]
    fn sector_map_override_is_respected() {
        let mut tracker = SectorStrengthTracker::default()
            .with_sector_map([("FOO".to_string(), "XLE".to_string())].into_iter().collect());
        let mut sectors = HashMap::new();
        sectors.insert("XLE".to_string(), series(&[100.0, 102.0, 104.0, 106.0, 108.0]));
        tracker.refresh(&sectors, &series(&[500.0; 5]), Utc::now());
        assert!(tracker.slope_for("FOO").unwrap() > 0.0);
        assert!(tracker.vetoes("FOO", false));
    }
}
