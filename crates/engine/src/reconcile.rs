//! Startup reconciliation between the local registry and the broker.
//!
//! The broker's portfolio is the ground truth for what is actually
//! held. Local open positions the broker no longer carries are closed
//! on paper (no closing order — there is nothing to close), and local
//! quantities above the broker's are reduced to match. Broker positions
//! the registry has never heard of are left alone; the engine only
//! manages what it opened.

use swingbot_core::types::{BrokerPosition, Position, PositionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The broker no longer holds this position; mark it closed locally
    /// and release its budget without routing an order.
    CloseLocal { order_ref: String },
    /// The broker holds fewer contracts than the registry; shrink the
    /// local quantity (and proportionally the committed budget).
    ReduceQuantity { order_ref: String, quantity: u32 },
}

/// Diff local open positions against the broker portfolio. Pending
/// entries are excluded; they resolve through order status instead.
#[must_use]
pub fn plan(local: &[Position], broker: &[BrokerPosition]) -> Vec<ReconcileAction> {
    let mut actions = Vec::new();
    for position in local {
        if position.status != PositionStatus::Open {
            continue;
        }
        let key = position.contract.key();
        let held = broker
            .iter()
            .find(|b| b.contract_key == key)
            .map_or(0, |b| b.quantity);
        if held == 0 {
            tracing::warn!(
                order_ref = %position.order_ref,
                symbol = %position.symbol,
                "Broker no longer holds this position"
            );
            actions.push(ReconcileAction::CloseLocal {
                order_ref: position.order_ref.clone(),
            });
        } else if held < position.quantity {
            tracing::warn!(
                order_ref = %position.order_ref,
                local = position.quantity,
                held,
                "Broker holds fewer contracts than the registry"
            );
            actions.push(ReconcileAction::ReduceQuantity {
                order_ref: position.order_ref.clone(),
                quantity: held,
            });
        }
    }
    actions
}
