//! Contract resolution from the option chain.
//!
//! Signals carry delta buckets, not strikes. Without a greeks feed the
//! buckets map to fixed fractional offsets from spot (a 15-delta put
//! sits ~5% below, a 5-delta wing ~8% out), and each leg snaps to the
//! nearest listed strike at the front expiry of the filtered chain.

use rust_decimal::Decimal;
use serde_json::Value;
use swingbot_core::types::{ContractSpec, OptionLeg, OptionRight, Signal, SignalDirection};

/// Fractional out-of-the-money offset for a delta bucket.
#[must_use]
pub fn delta_offset(delta: u32) -> Decimal {
    match delta {
        50 => Decimal::ZERO,
        30 => Decimal::new(3, 2),
        15 => Decimal::new(5, 2),
        5 => Decimal::new(8, 2),
        d if d >= 50 => Decimal::ZERO,
        // Off-bucket deltas interpolate at 0.2% per delta point.
        d => Decimal::new(i64::from(50 - d) * 2, 3),
    }
}

fn meta_delta(signal: &Signal, key: &str, default: u32) -> u32 {
    signal
        .metadata
        .get("legs")
        .and_then(|legs| legs.get(key))
        .and_then(Value::as_u64)
        .and_then(|d| u32::try_from(d).ok())
        .unwrap_or(default)
}

/// (right, delta bucket, signed ratio) per leg for a signal direction.
fn leg_plan(signal: &Signal) -> Vec<(OptionRight, u32, i32)> {
    use OptionRight::{Call, Put};
    match signal.direction {
        SignalDirection::LongCall => vec![(Call, 50, 1)],
        SignalDirection::LongPut => vec![(Put, 50, 1)],
        SignalDirection::LongPutStraight => {
            vec![(Put, meta_delta(signal, "buy_delta", 50), 1)]
        }
        SignalDirection::BullPutSpread => vec![
            (Put, meta_delta(signal, "sell_delta", 30), -1),
            (Put, meta_delta(signal, "buy_delta", 15), 1),
        ],
        SignalDirection::BearPutSpread => vec![
            (Put, meta_delta(signal, "buy_delta", 50), 1),
            (Put, meta_delta(signal, "sell_delta", 30), -1),
        ],
        SignalDirection::IronCondor => vec![
            (Put, meta_delta(signal, "put_sell_delta", 15), -1),
            (Put, meta_delta(signal, "put_buy_delta", 5), 1),
            (Call, meta_delta(signal, "call_sell_delta", 15), -1),
            (Call, meta_delta(signal, "call_buy_delta", 5), 1),
        ],
        SignalDirection::NoTrade => vec![],
    }
}

fn nearest_strike(
    chain: &[ContractSpec],
    right: OptionRight,
    expiry: chrono::NaiveDate,
    target: Decimal,
) -> Option<Decimal> {
    chain
        .iter()
        .filter_map(|c| c.legs.first())
        .filter(|l| l.right == right && l.expiry == expiry)
        .map(|l| l.strike)
        .min_by_key(|strike| (*strike - target).abs())
}

/// Resolve a signal into an orderable contract against a chain of
/// single-leg candidates (already filtered to the DTE window). Returns
/// `None` when no expiry or strike satisfies every leg, or when two
/// opposing legs of a spread would collapse onto the same strike.
#[must_use]
pub fn resolve_contract(
    chain: &[ContractSpec],
    signal: &Signal,
    spot: Decimal,
) -> Option<ContractSpec> {
    let plan = leg_plan(signal);
    if plan.is_empty() || chain.is_empty() {
        return None;
    }
    let expiry = chain
        .iter()
        .filter_map(|c| c.legs.first())
        .map(|l| l.expiry)
        .min()?;

    let mut legs = Vec::with_capacity(plan.len());
    for (right, delta, ratio) in plan {
        let offset = delta_offset(delta);
        let target = match right {
            OptionRight::Call => spot * (Decimal::ONE + offset),
            OptionRight::Put => spot * (Decimal::ONE - offset),
        };
        let strike = nearest_strike(chain, right, expiry, target)?;
        legs.push(OptionLeg {
            right,
            strike,
            expiry,
            ratio,
        });
    }

    // A spread whose legs snap to one strike has no edge left.
    for (i, a) in legs.iter().enumerate() {
        for b in &legs[i + 1..] {
            if a.right == b.right && a.strike == b.strike {
                return None;
            }
        }
    }

    Some(ContractSpec {
        symbol: signal.symbol.clone(),
        legs,
    })
}
