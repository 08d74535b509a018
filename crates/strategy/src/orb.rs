//! Opening-range-breakout strategy with volatility-slope confirmation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;

use swingbot_core::config::StrategyParams;
use swingbot_core::types::{Position, Signal, SignalDirection};

use crate::{Strategy, StrategyContext};

#[derive(Debug, Clone)]
struct SessionState {
    date: NaiveDate,
    range_high: Option<Decimal>,
    range_low: Option<Decimal>,
    traded: bool,
}

impl SessionState {
    fn fresh(date: NaiveDate) -> Self {
        Self { date, range_high: None, range_low: None, traded: false }
    }
}

/// Breakout of the session's opening range, confirmed by the slope of
/// the volatility index: a falling VIX backs an upside break, a rising
/// VIX backs a downside break. A VIX rising with an upside break is
/// treated as a trap and suppressed. One trade per symbol per session.
#[derive(Debug, Default)]
pub struct OrbStrategy {
    sessions: HashMap<String, SessionState>,
}

impl OrbStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// `(vixEnd − vixStart) / durationMinutes` over the trailing slope
/// window. `None` when the tick history does not span the window.
fn vix_slope(
    ticks: &[(DateTime<Utc>, Decimal)],
    now: DateTime<Utc>,
    window_minutes: i64,
) -> Option<f64> {
    let cutoff = now - Duration::minutes(window_minutes);
    let window: Vec<&(DateTime<Utc>, Decimal)> =
        ticks.iter().filter(|(t, _)| *t >= cutoff).collect();
    let (start_t, start_v) = window.first()?;
    let (end_t, end_v) = window.last()?;
    let minutes = (*end_t - *start_t).num_seconds() as f64 / 60.0;
    if minutes <= 0.0 {
        return None;
    }
    Some((end_v - start_v).to_f64()? / minutes)
}

impl Strategy for OrbStrategy {
    fn kind(&self) -> &'static str {
        "orb"
    }

    fn analyze(
        &mut self,
        symbol: &str,
        price: Decimal,
        params: &StrategyParams,
        ctx: &StrategyContext<'_>,
    ) -> Option<Signal> {
        let minutes = ctx.minutes_since_open?;
        let state = self
            .sessions
            .entry(symbol.to_string())
            .or_insert_with(|| SessionState::fresh(ctx.session_date));
        if state.date != ctx.session_date {
            *state = SessionState::fresh(ctx.session_date);
        }

        // Build the opening range.
        if minutes < params.orb_minutes {
            state.range_high = Some(state.range_high.map_or(price, |h| h.max(price)));
            state.range_low = Some(state.range_low.map_or(price, |l| l.min(price)));
            return None;
        }
        if minutes > params.orb_minutes + params.trading_window_minutes || state.traded {
            return None;
        }
        let (high, low) = (state.range_high?, state.range_low?);

        let slope = vix_slope(ctx.vix_ticks, ctx.now, params.vix_slope_minutes)?;

        let (bullish, broke_level) = if price > high {
            (true, high)
        } else if price < low {
            (false, low)
        } else {
            return None;
        };

        // Slope must run with the breakout; rising volatility against an
        // upside break is a trap.
        if bullish && slope >= -params.vix_divergence_threshold {
            if slope > params.vix_divergence_threshold {
                tracing::debug!(symbol, slope, "ORB divergence trap, suppressing");
            }
            return None;
        }
        if !bullish && slope <= params.vix_divergence_threshold {
            return None;
        }

        let confidence = (0.8 + slope.abs() * 10.0).clamp(0.1, 0.95);

        let (direction, pattern) = if bullish {
            (SignalDirection::LongCall, "orb_breakout_bullish")
        } else {
            (SignalDirection::LongPut, "orb_breakout_bearish")
        };
        tracing::info!(symbol, pattern, confidence, slope, "ORB signal");
        Some(
            Signal::new(symbol, direction, confidence, pattern)
                .with_level(broke_level)
                .with_meta("range_high", json!(high.to_string()))
                .with_meta("range_low", json!(low.to_string()))
                .with_meta("vix_slope", json!(slope)),
        )
    }

    // The one-trade flag burns only on an admitted position, so a
    // vetoed or unfillable breakout leaves the session open.
    fn on_position_opened(&mut self, position: &Position) {
        if let Some(state) = self.sessions.get_mut(&position.symbol) {
            state.traded = true;
        }
    }

    fn on_session_start(&mut self, date: NaiveDate) {
        for state in self.sessions.values_mut() {
            *state = SessionState::fresh(date);
        }
    }
}
