//! Position lifecycle: pending entry through close.
//!
//! The registry is the in-memory source of truth for positions. Entries
//! are admitted as `PendingFill` with a working order at the broker;
//! each cycle the pending set is resolved against broker order status
//! and the underlying price, and open positions move to `Closed` only
//! through [`PositionLifecycle::close`], which produces the terminal
//! trade record.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use swingbot_core::config::StrategyParams;
use swingbot_core::types::{
    CloseReason, OrderState, OrderStatusReport, PendingOrder, Position, PositionStatus, TradeRecord,
};

use crate::exits;

/// What became of a pending entry this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingResolution {
    /// Entry filled; the position is now open with brackets re-derived
    /// from the actual fill.
    Filled { fill_price: Decimal },
    /// Entry is dead; the caller cancels at the broker where needed and
    /// releases the committed budget.
    Abort { reason: CloseReason },
    StillWorking,
}

#[derive(Debug, Default)]
pub struct PositionLifecycle {
    positions: HashMap<String, Position>,
    pending: HashMap<String, PendingOrder>,
    traded_today: HashSet<(String, String)>,
    seq: u64,
}

impl PositionLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next globally unique order reference.
    pub fn next_order_ref(&mut self, now: DateTime<Utc>) -> String {
        self.seq += 1;
        format!("SWINGBOT-{}-{}", now.timestamp(), self.seq)
    }

    /// Admit a freshly submitted entry as `PendingFill`.
    pub fn admit(&mut self, position: Position, now: DateTime<Utc>, params: &StrategyParams) {
        let timeout = i64::try_from(params.order_timeout_secs).unwrap_or(i64::MAX);
        self.pending.insert(
            position.order_ref.clone(),
            PendingOrder {
                order_ref: position.order_ref.clone(),
                submitted_at: now,
                deadline: now + Duration::seconds(timeout),
                reference_price: position.underlying_entry,
            },
        );
        self.mark_traded(&position.strategy, &position.symbol);
        self.positions.insert(position.order_ref.clone(), position);
    }

    /// Restore a persisted position on startup. Reloaded `PendingFill`
    /// rows get a fresh timeout window so they resolve rather than hang.
    pub fn restore(&mut self, position: Position, now: DateTime<Utc>, params: &StrategyParams) {
        if position.status == PositionStatus::PendingFill {
            let timeout = i64::try_from(params.order_timeout_secs).unwrap_or(i64::MAX);
            self.pending.insert(
                position.order_ref.clone(),
                PendingOrder {
                    order_ref: position.order_ref.clone(),
                    submitted_at: now,
                    deadline: now + Duration::seconds(timeout),
                    reference_price: position.underlying_entry,
                },
            );
        }
        self.positions.insert(position.order_ref.clone(), position);
    }

    /// Resolve one pending entry against the broker's order status and
    /// the current underlying price. On `Abort` the position is removed;
    /// on `Filled` it becomes `Open` with quantity, fill price, and
    /// brackets updated from the actual fill.
    pub fn resolve_pending(
        &mut self,
        order_ref: &str,
        report: &OrderStatusReport,
        underlying: Option<Decimal>,
        now: DateTime<Utc>,
        params: &StrategyParams,
    ) -> Option<PendingResolution> {
        let pending = self.pending.get(order_ref)?;

        let resolution = match report.state {
            OrderState::Filled if report.filled_quantity == 0 => PendingResolution::Abort {
                reason: CloseReason::ZeroFill,
            },
            OrderState::Filled => {
                let position = self.positions.get(order_ref)?;
                let fill_price = report.avg_fill_price.unwrap_or(position.entry_price);
                PendingResolution::Filled { fill_price }
            }
            OrderState::Rejected => PendingResolution::Abort {
                reason: CloseReason::OrderRejected,
            },
            OrderState::Cancelled => PendingResolution::Abort {
                reason: CloseReason::OrderCancelled,
            },
            OrderState::Working => {
                if now > pending.deadline {
                    PendingResolution::Abort {
                        reason: CloseReason::OrderTimeout,
                    }
                } else if let Some(price) = underlying {
                    let reference = pending.reference_price;
                    let drift = if reference.is_zero() {
                        Decimal::ZERO
                    } else {
                        ((price - reference) / reference).abs()
                    };
                    if drift > params.max_entry_drift_pct {
                        PendingResolution::Abort {
                            reason: CloseReason::OrderDrift,
                        }
                    } else {
                        PendingResolution::StillWorking
                    }
                } else {
                    PendingResolution::StillWorking
                }
            }
        };

        match &resolution {
            PendingResolution::Filled { fill_price } => {
                self.pending.remove(order_ref);
                if let Some(position) = self.positions.get_mut(order_ref) {
                    position.quantity = report.filled_quantity;
                    position.entry_price = *fill_price;
                    position.current_price = *fill_price;
                    let (stop, target) =
                        exits::bracket_prices(position.direction, *fill_price, params);
                    position.stop_loss = stop;
                    position.profit_target = target;
                    position.status = PositionStatus::Open;
                }
            }
            PendingResolution::Abort { reason } => {
                tracing::warn!(order_ref, reason = %reason, "Pending entry aborted");
                self.pending.remove(order_ref);
                self.positions.remove(order_ref);
            }
            PendingResolution::StillWorking => {}
        }
        Some(resolution)
    }

    /// Close an open position and produce its trade record. The caller
    /// releases the committed budget using `position.committed`.
    pub fn close(
        &mut self,
        order_ref: &str,
        exit_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Option<(Position, TradeRecord)> {
        let mut position = self.positions.remove(order_ref)?;
        self.pending.remove(order_ref);
        position.current_price = exit_price;
        position.status = PositionStatus::Closed;
        let record = TradeRecord {
            order_ref: position.order_ref.clone(),
            strategy: position.strategy.clone(),
            symbol: position.symbol.clone(),
            direction: position.direction,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price,
            realized_pnl: position.unrealized_pnl(),
            reason,
            opened_at: position.opened_at,
            closed_at: now,
        };
        Some((position, record))
    }

    pub fn update_price(&mut self, order_ref: &str, price: Decimal) {
        if let Some(position) = self.positions.get_mut(order_ref) {
            position.current_price = price;
        }
    }

    pub fn position_mut(&mut self, order_ref: &str) -> Option<&mut Position> {
        self.positions.get_mut(order_ref)
    }

    #[must_use]
    pub fn position(&self, order_ref: &str) -> Option<&Position> {
        self.positions.get(order_ref)
    }

    /// All tracked positions (pending and open).
    #[must_use]
    pub fn positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    /// Order refs of positions awaiting a fill.
    #[must_use]
    pub fn pending_refs(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Order refs of open positions.
    #[must_use]
    pub fn open_refs(&self) -> Vec<String> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.order_ref.clone())
            .collect()
    }

    /// Pending and open positions owned by one instance on one symbol.
    #[must_use]
    pub fn owned_by(&self, strategy: &str, symbol: &str) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.strategy == strategy && p.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Pending plus open position count for one instance.
    #[must_use]
    pub fn count_for(&self, strategy: &str) -> usize {
        self.positions
            .values()
            .filter(|p| p.strategy == strategy)
            .count()
    }

    fn mark_traded(&mut self, strategy: &str, symbol: &str) {
        self.traded_today
            .insert((strategy.to_string(), symbol.to_string()));
    }

    /// Whether the instance already attempted an entry on the symbol
    /// this session.
    #[must_use]
    pub fn has_traded_today(&self, strategy: &str, symbol: &str) -> bool {
        self.traded_today
            .contains(&(strategy.to_string(), symbol.to_string()))
    }

    /// Session rollover: clear the per-day trade flags.
    pub fn reset_session(&mut self) {
        self.traded_today.clear();
    }
}
