//! Confidence-scaled position sizing.
//!
//! Quantity starts from the account-risk fraction scaled by signal
//! confidence, then is capped by the notional ceiling and the strategy's
//! available budget. A single contract costing more than the per-contract
//! ceiling is rejected outright rather than sized down.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use swingbot_core::config::StrategyParams;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeReject {
    #[error("contract cost {0} exceeds the per-contract ceiling")]
    CostCeiling(Decimal),

    #[error("sized to zero contracts")]
    ZeroQuantity,
}

/// Number of contracts to order, at the standard multiplier of 100.
/// `contract_price` is the per-share net price (credit magnitude for
/// credit structures).
pub fn contract_quantity(
    equity: Decimal,
    confidence: f64,
    contract_price: Decimal,
    available: Decimal,
    params: &StrategyParams,
) -> Result<u32, SizeReject> {
    let cost = contract_price.abs() * Decimal::ONE_HUNDRED;
    if cost <= Decimal::ZERO {
        return Err(SizeReject::ZeroQuantity);
    }
    if cost > params.max_contract_cost {
        return Err(SizeReject::CostCeiling(cost));
    }

    let confidence = Decimal::from_f64(confidence.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);
    let target = equity * params.position_size_pct * confidence;
    let sized = (target / cost).floor().to_u32().unwrap_or(0);
    let notional_cap = (params.max_notional / cost).floor().to_u32().unwrap_or(0);
    let budget_cap = (available.max(Decimal::ZERO) / cost)
        .floor()
        .to_u32()
        .unwrap_or(0);

    let quantity = sized.min(notional_cap).min(budget_cap);
    if quantity == 0 {
        return Err(SizeReject::ZeroQuantity);
    }
    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scales_with_confidence() {
        let params = StrategyParams::default(); // 2% of equity
        // 100k * 0.02 * 0.80 = 1600 risk; 2.00 contract costs 200.
        let qty = contract_quantity(dec!(100000), 0.80, dec!(2.00), dec!(10000), &params).unwrap();
        assert_eq!(qty, 8);

        let qty = contract_quantity(dec!(100000), 0.40, dec!(2.00), dec!(10000), &params).unwrap();
        assert_eq!(qty, 4);
    }

    #[test]
    fn notional_ceiling_caps_quantity() {
        let params = StrategyParams::default(); // max_notional 5000
        // Risk budget allows 40 contracts at 200 each; notional allows 25.
        let qty =
            contract_quantity(dec!(500000), 0.80, dec!(2.00), dec!(100000), &params).unwrap();
        assert_eq!(qty, 25);
    }

    #[test]
    fn available_budget_caps_quantity() {
        let params = StrategyParams::default();
        // Risk allows 8, budget of 500 allows 2.
        let qty = contract_quantity(dec!(100000), 0.80, dec!(2.00), dec!(500), &params).unwrap();
        assert_eq!(qty, 2);
    }

    #[test]
    fn expensive_contract_rejected_outright() {
        let params = StrategyParams::default(); // ceiling 1500
        let err = contract_quantity(dec!(1000000), 0.90, dec!(16.00), dec!(50000), &params)
            .unwrap_err();
        assert_eq!(err, SizeReject::CostCeiling(dec!(1600.00)));
    }

    #[test]
    fn small_account_sizes_to_zero() {
        let params = StrategyParams::default();
        // 5000 * 0.02 * 0.70 = 70 < one 200-dollar contract.
        let err = contract_quantity(dec!(5000), 0.70, dec!(2.00), dec!(5000), &params).unwrap_err();
        assert_eq!(err, SizeReject::ZeroQuantity);
    }

    #[test]
    fn credit_price_uses_magnitude() {
        let params = StrategyParams::default();
        let qty = contract_quantity(dec!(100000), 0.80, dec!(-2.00), dec!(10000), &params).unwrap();
        assert_eq!(qty, 8);
    }
}
