//! Order-book depth analysis.
//!
//! Converts raw depth snapshots into statistically significant liquidity
//! zones, a bid/ask imbalance metric, and absorption-breakout events.
//! Zone state is owned here, keyed by symbol; strategies look zones up by
//! symbol and never hold references into the tracker.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use swingbot_core::config::StrategyParams;
use swingbot_core::types::{DepthLevel, DepthSnapshot};

/// Side of the book a zone sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSide {
    /// Bid-side zone below price.
    Support,
    /// Ask-side zone above price.
    Resistance,
}

impl std::fmt::Display for ZoneSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Support => write!(f, "support"),
            Self::Resistance => write!(f, "resistance"),
        }
    }
}

/// A price level with statistically significant resting volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub symbol: String,
    pub side: ZoneSide,
    pub price: Decimal,
    pub size: Decimal,
    pub zscore: f64,
    pub first_seen: DateTime<Utc>,
    /// Set once the zone has stayed significant for the configured
    /// confirmation window.
    pub confirmed: bool,
}

impl LiquidityZone {
    /// Zone strength in [0, 1] from how far the size sits beyond the
    /// significance bar. Saturates at twice the threshold.
    #[must_use]
    pub fn strength(&self, zscore_threshold: f64) -> f64 {
        if zscore_threshold <= 0.0 {
            return 0.0;
        }
        (self.zscore / (2.0 * zscore_threshold)).clamp(0.0, 1.0)
    }
}

/// A confirmed zone that absorbed flow and then broke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsorptionBreakout {
    pub symbol: String,
    pub side: ZoneSide,
    pub price: Decimal,
    /// Direction of the move through the zone: up through resistance is
    /// bullish, down through support is bearish.
    pub bullish: bool,
}

/// Result of analyzing one snapshot.
#[derive(Debug, Clone)]
pub struct DepthAnalysis {
    pub zones: Vec<LiquidityZone>,
    /// (bidVolume − askVolume) / (bidVolume + askVolume) over the top-N
    /// levels, in [−1, 1].
    pub imbalance: f64,
    pub breakouts: Vec<AbsorptionBreakout>,
}

#[derive(Debug, Clone)]
struct ZoneTrack {
    zone: LiquidityZone,
    /// Largest size observed since the zone appeared.
    max_size: Decimal,
    /// Consecutive observations with a shrink past the absorption
    /// threshold while price held.
    shrink_count: u32,
}

impl ZoneTrack {
    fn absorbing(&self, min_refresh_count: u32) -> bool {
        self.shrink_count >= min_refresh_count
    }
}

#[derive(Debug, Default)]
struct SymbolBook {
    tracks: Vec<ZoneTrack>,
}

/// Stateful per-symbol zone tracker.
#[derive(Debug, Default)]
pub struct DepthAnalyzer {
    books: HashMap<String, SymbolBook>,
}

impl DepthAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one snapshot, updating zone state for the symbol.
    ///
    /// Returns `None` when either book side is empty (market closed or no
    /// depth subscription) — zone state is left untouched in that case.
    pub fn analyze(
        &mut self,
        snapshot: &DepthSnapshot,
        params: &StrategyParams,
    ) -> Option<DepthAnalysis> {
        let mid = snapshot.mid_price()?;
        let now = snapshot.timestamp;
        let imb = imbalance(snapshot, params.imbalance_levels);

        let mut significant = significant_levels(&snapshot.bids, ZoneSide::Support, params);
        significant.extend(significant_levels(&snapshot.asks, ZoneSide::Resistance, params));

        // Exclusion band around the touch filters market-maker noise.
        let exclusion = mid * params.exclusion_zone_pct;
        significant.retain(|(level, _, _)| (level.price - mid).abs() > exclusion);

        let book = self.books.entry(snapshot.symbol.clone()).or_default();
        let mut breakouts = Vec::new();
        let mut next_tracks: Vec<ZoneTrack> = Vec::with_capacity(significant.len());

        for (level, side, zscore) in significant {
            let matched = book.tracks.iter().position(|t| {
                t.zone.side == side
                    && (t.zone.price - level.price).abs() <= mid * params.zone_proximity_pct
            });

            let track = match matched {
                Some(idx) => {
                    let mut track = book.tracks.swap_remove(idx);
                    let shrink_bar =
                        track.max_size * (Decimal::ONE - params.absorption_threshold_pct);
                    if level.size <= shrink_bar {
                        track.shrink_count += 1;
                    } else if level.size > track.max_size {
                        track.max_size = level.size;
                        track.shrink_count = 0;
                    }
                    track.zone.price = level.price;
                    track.zone.size = level.size;
                    track.zone.zscore = zscore;
                    track
                }
                None => ZoneTrack {
                    zone: LiquidityZone {
                        symbol: snapshot.symbol.clone(),
                        side,
                        price: level.price,
                        size: level.size,
                        zscore,
                        first_seen: now,
                        confirmed: false,
                    },
                    max_size: level.size,
                    shrink_count: 0,
                },
            };
            next_tracks.push(track);
        }

        // Whatever is left in the old track list stopped being significant
        // this snapshot.
        for stale in book.tracks.drain(..) {
            if !stale.zone.confirmed {
                // Flash/spoof order: vanished before confirmation.
                tracing::debug!(
                    symbol = snapshot.symbol,
                    price = %stale.zone.price,
                    side = %stale.zone.side,
                    "Unconfirmed zone vanished, discarding"
                );
                continue;
            }
            let broke_through = match stale.zone.side {
                ZoneSide::Support => mid < stale.zone.price,
                ZoneSide::Resistance => mid > stale.zone.price,
            };
            if broke_through && stale.absorbing(params.min_refresh_count) {
                tracing::info!(
                    symbol = snapshot.symbol,
                    price = %stale.zone.price,
                    side = %stale.zone.side,
                    shrinks = stale.shrink_count,
                    "Absorption breakout"
                );
                breakouts.push(AbsorptionBreakout {
                    symbol: snapshot.symbol.clone(),
                    side: stale.zone.side,
                    price: stale.zone.price,
                    bullish: matches!(stale.zone.side, ZoneSide::Resistance),
                });
            }
        }

        let confirm_after = Duration::minutes(params.level_confirmation_minutes);
        for track in &mut next_tracks {
            if !track.zone.confirmed && now - track.zone.first_seen >= confirm_after {
                track.zone.confirmed = true;
                tracing::debug!(
                    symbol = snapshot.symbol,
                    price = %track.zone.price,
                    side = %track.zone.side,
                    "Zone confirmed"
                );
            }
        }

        book.tracks = next_tracks;
        let zones = book.tracks.iter().map(|t| t.zone.clone()).collect();

        Some(DepthAnalysis { zones, imbalance: imb, breakouts })
    }

    /// Confirmed zones currently tracked for a symbol.
    #[must_use]
    pub fn confirmed_zones(&self, symbol: &str) -> Vec<LiquidityZone> {
        self.books
            .get(symbol)
            .map(|b| {
                b.tracks
                    .iter()
                    .filter(|t| t.zone.confirmed)
                    .map(|t| t.zone.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nearest confirmed support below and resistance above `price`.
    #[must_use]
    pub fn zone_band(&self, symbol: &str, price: Decimal) -> (Option<LiquidityZone>, Option<LiquidityZone>) {
        let zones = self.confirmed_zones(symbol);
        let support = zones
            .iter()
            .filter(|z| z.side == ZoneSide::Support && z.price < price)
            .max_by_key(|z| z.price)
            .cloned();
        let resistance = zones
            .iter()
            .filter(|z| z.side == ZoneSide::Resistance && z.price > price)
            .min_by_key(|z| z.price)
            .cloned();
        (support, resistance)
    }
}

/// Bid/ask volume imbalance over the top `levels` of each side.
///
/// Returns 0.0 for an empty book; +1 when all resting volume is on the
/// bid, −1 when all of it is on the ask.
#[must_use]
pub fn imbalance(snapshot: &DepthSnapshot, levels: usize) -> f64 {
    let bid: Decimal = snapshot.bids.iter().take(levels).map(|l| l.size).sum();
    let ask: Decimal = snapshot.asks.iter().take(levels).map(|l| l.size).sum();
    let total = bid + ask;
    if total.is_zero() {
        return 0.0;
    }
    ((bid - ask) / total).to_f64().unwrap_or(0.0)
}

/// Levels whose size exceeds mean + threshold·stddev of the *other*
/// levels on the side. Leave-one-out keeps the candidate from inflating
/// its own baseline, which would cap the reachable z-score at sqrt(N−1)
/// on small books. Returns (level, side, z-score) triples.
fn significant_levels(
    levels: &[DepthLevel],
    side: ZoneSide,
    params: &StrategyParams,
) -> Vec<(DepthLevel, ZoneSide, f64)> {
    if levels.len() < 3 {
        return Vec::new();
    }
    let sizes: Vec<f64> = levels
        .iter()
        .map(|l| l.size.to_f64().unwrap_or(0.0))
        .collect();
    let n = sizes.len() as f64;
    let total: f64 = sizes.iter().sum();
    let total_sq: f64 = sizes.iter().map(|s| s * s).sum();

    levels
        .iter()
        .zip(sizes.iter())
        .filter_map(|(level, &size)| {
            let mean = (total - size) / (n - 1.0);
            let var = ((total_sq - size * size) / (n - 1.0) - mean * mean).max(0.0);
            let std = var.sqrt();
            let z = if std > f64::EPSILON * mean.max(1.0) {
                (size - mean) / std
            } else if size > mean {
                // Flat book with one outsized level: unbounded z, capped
                // so strength and serialization stay finite.
                2.0 * params.zscore_threshold
            } else {
                return None;
            };
            (z > params.zscore_threshold).then_some((*level, side, z))
        })
        .collect()
}
