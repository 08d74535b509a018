//! Bracket, trailing, and time exit rules.
//!
//! All checks run on the contract price. Debit positions profit as the
//! price rises; credit structures (bull put spread, iron condor) profit
//! as the spread price decays, so their brackets and trailing logic are
//! mirrored. The broker holds the bracket pair; these checks are the
//! engine-side mirror plus the exits the broker cannot express.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use swingbot_core::config::StrategyParams;
use swingbot_core::types::{CloseReason, Position, SignalDirection};

fn is_credit(direction: SignalDirection) -> bool {
    matches!(
        direction,
        SignalDirection::BullPutSpread | SignalDirection::IronCondor
    )
}

/// Bracket prices from the fill. Credit structures stop when the spread
/// price blows out and take profit as a fraction of the credit captured.
#[must_use]
pub fn bracket_prices(
    direction: SignalDirection,
    entry: Decimal,
    params: &StrategyParams,
) -> (Decimal, Decimal) {
    if is_credit(direction) {
        (
            entry * (Decimal::ONE + params.stop_loss_pct),
            entry * (Decimal::ONE - params.profit_target_pct),
        )
    } else {
        (
            entry * (Decimal::ONE - params.stop_loss_pct),
            entry * (Decimal::ONE + params.profit_target_pct),
        )
    }
}

/// Advance the trailing stop after a price update. Activates once the
/// gain reaches the activation threshold and from then on only
/// tightens — the stop ratchets with the peak and never loosens when
/// the price retreats.
pub fn update_trailing(position: &mut Position, params: &StrategyParams) {
    let activated = position.peak_price.is_some()
        || position.gain_pct() >= params.trailing_activation_pct;
    if !activated {
        return;
    }

    let price = position.current_price;
    if is_credit(position.direction) {
        // Peak is the lowest spread price seen; stop sits above it.
        let peak = position.peak_price.map_or(price, |p| p.min(price));
        position.peak_price = Some(peak);
        let candidate = peak * (Decimal::ONE + params.trailing_distance_pct);
        position.trailing_stop = Some(
            position
                .trailing_stop
                .map_or(candidate, |stop| stop.min(candidate)),
        );
    } else {
        let peak = position.peak_price.map_or(price, |p| p.max(price));
        position.peak_price = Some(peak);
        let candidate = peak * (Decimal::ONE - params.trailing_distance_pct);
        position.trailing_stop = Some(
            position
                .trailing_stop
                .map_or(candidate, |stop| stop.max(candidate)),
        );
    }
}

/// Bracket first, then trailing, then the time stop.
#[must_use]
pub fn check_exits(
    position: &Position,
    now: DateTime<Utc>,
    params: &StrategyParams,
) -> Option<CloseReason> {
    let price = position.current_price;
    if is_credit(position.direction) {
        if price >= position.stop_loss {
            return Some(CloseReason::StopLoss);
        }
        if price <= position.profit_target {
            return Some(CloseReason::ProfitTarget);
        }
        if let Some(stop) = position.trailing_stop {
            if price >= stop {
                return Some(CloseReason::TrailingStop);
            }
        }
    } else {
        if price <= position.stop_loss {
            return Some(CloseReason::StopLoss);
        }
        if price >= position.profit_target {
            return Some(CloseReason::ProfitTarget);
        }
        if let Some(stop) = position.trailing_stop {
            if price <= stop {
                return Some(CloseReason::TrailingStop);
            }
        }
    }

    if let Some(max_hold) = params.max_hold_minutes {
        if now - position.opened_at >= Duration::minutes(max_hold) {
            return Some(CloseReason::TimeStop);
        }
    }
    None
}
