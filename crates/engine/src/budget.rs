//! Per-strategy budget ledger.
//!
//! Each strategy instance owns one row: a fixed cap, a running drawdown,
//! and the capital committed to open positions. Available budget is
//! always `cap - drawdown - committed` and never goes negative — commits
//! are refused rather than overdrawn, and drawdown is clamped to the cap.
//! The ledger is authoritative in memory; persistence mirrors it behind
//! the scan loop.

use std::collections::HashMap;

use rust_decimal::Decimal;
use swingbot_core::config::StrategyParams;
use swingbot_core::types::BudgetSnapshot;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("no budget row for strategy {0}")]
    UnknownStrategy(String),

    #[error("insufficient budget: requested {requested}, available {available}")]
    Insufficient {
        requested: Decimal,
        available: Decimal,
    },
}

#[derive(Debug, Clone)]
struct BudgetRow {
    cap: Decimal,
    drawdown: Decimal,
    committed: Decimal,
    daily_realized: Decimal,
    consecutive_losses: u32,
}

impl BudgetRow {
    fn available(&self) -> Decimal {
        self.cap - self.drawdown - self.committed
    }
}

/// In-memory budget rows keyed by strategy instance name.
#[derive(Debug, Default)]
pub struct BudgetLedger {
    rows: HashMap<String, BudgetRow>,
}

impl BudgetLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the row for a strategy instance. Re-registering resets it.
    pub fn register(&mut self, strategy: &str, cap: Decimal) {
        self.rows.insert(
            strategy.to_string(),
            BudgetRow {
                cap,
                drawdown: Decimal::ZERO,
                committed: Decimal::ZERO,
                daily_realized: Decimal::ZERO,
                consecutive_losses: 0,
            },
        );
    }

    /// Restore a persisted drawdown on startup. The committed column is
    /// rebuilt from reloaded positions via [`BudgetLedger::commit`], not
    /// restored here.
    pub fn restore_drawdown(&mut self, strategy: &str, drawdown: Decimal) {
        if let Some(row) = self.rows.get_mut(strategy) {
            row.drawdown = drawdown.clamp(Decimal::ZERO, row.cap);
        }
    }

    /// Available budget; zero for unknown strategies.
    #[must_use]
    pub fn available(&self, strategy: &str) -> Decimal {
        self.rows.get(strategy).map_or(Decimal::ZERO, BudgetRow::available)
    }

    /// Reserve capital for an entry. Refused when it would overdraw the
    /// row.
    pub fn commit(&mut self, strategy: &str, amount: Decimal) -> Result<(), BudgetError> {
        let row = self
            .rows
            .get_mut(strategy)
            .ok_or_else(|| BudgetError::UnknownStrategy(strategy.to_string()))?;
        let available = row.available();
        if amount > available {
            return Err(BudgetError::Insufficient {
                requested: amount,
                available,
            });
        }
        row.committed += amount;
        Ok(())
    }

    /// Return capital from an entry that never became a trade (timeout,
    /// drift, rejection, zero fill). No P&L is booked.
    pub fn release(&mut self, strategy: &str, amount: Decimal) {
        if let Some(row) = self.rows.get_mut(strategy) {
            row.committed = (row.committed - amount).max(Decimal::ZERO);
        }
    }

    /// Return capital from a closed trade and book its realized P&L.
    /// Losses raise the drawdown (clamped to the cap), wins recover it
    /// (floored at zero).
    pub fn settle(&mut self, strategy: &str, amount: Decimal, realized_pnl: Decimal) {
        if let Some(row) = self.rows.get_mut(strategy) {
            row.committed = (row.committed - amount).max(Decimal::ZERO);
            row.drawdown = (row.drawdown - realized_pnl).clamp(Decimal::ZERO, row.cap);
            row.daily_realized += realized_pnl;
            if realized_pnl < Decimal::ZERO {
                row.consecutive_losses += 1;
            } else {
                row.consecutive_losses = 0;
            }
        }
    }

    /// Whether the strategy is paused for the rest of the session, and
    /// why. Triggers: daily realized loss beyond `max_daily_loss_pct` of
    /// the cap, or a consecutive-loss streak at `max_consecutive_losses`.
    #[must_use]
    pub fn pause_reason(&self, strategy: &str, params: &StrategyParams) -> Option<String> {
        let row = self.rows.get(strategy)?;
        let daily_limit = row.cap * params.max_daily_loss_pct;
        if row.daily_realized <= -daily_limit {
            return Some(format!(
                "daily loss {} at limit {}",
                -row.daily_realized, daily_limit
            ));
        }
        if row.consecutive_losses >= params.max_consecutive_losses {
            return Some(format!(
                "{} consecutive losses",
                row.consecutive_losses
            ));
        }
        None
    }

    #[must_use]
    pub fn snapshot(&self, strategy: &str) -> Option<BudgetSnapshot> {
        self.rows.get(strategy).map(|row| BudgetSnapshot {
            cap: row.cap,
            drawdown: row.drawdown,
            committed: row.committed,
        })
    }

    /// Session rollover: clear daily loss totals and loss streaks.
    /// Drawdown and committed capital carry across sessions.
    pub fn reset_session(&mut self) {
        for row in self.rows.values_mut() {
            row.daily_realized = Decimal::ZERO;
            row.consecutive_losses = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger_with(cap: Decimal) -> BudgetLedger {
        let mut ledger = BudgetLedger::new();
        ledger.register("swing-a", cap);
        ledger
    }

    #[test]
    fn commit_and_settle_roundtrip_with_loss() {
        let mut ledger = ledger_with(dec!(2000));
        ledger.commit("swing-a", dec!(1000)).unwrap();
        let snap = ledger.snapshot("swing-a").unwrap();
        assert_eq!(snap.committed, dec!(1000));
        assert_eq!(snap.available(), dec!(1000));

        ledger.settle("swing-a", dec!(1000), dec!(-100));
        let snap = ledger.snapshot("swing-a").unwrap();
        assert_eq!(snap.committed, dec!(0));
        assert_eq!(snap.drawdown, dec!(100));
        assert_eq!(snap.available(), dec!(1900));
    }

    #[test]
    fn wins_recover_drawdown_but_not_below_zero() {
        let mut ledger = ledger_with(dec!(2000));
        ledger.commit("swing-a", dec!(500)).unwrap();
        ledger.settle("swing-a", dec!(500), dec!(-200));
        ledger.commit("swing-a", dec!(500)).unwrap();
        ledger.settle("swing-a", dec!(500), dec!(350));

        let snap = ledger.snapshot("swing-a").unwrap();
        assert_eq!(snap.drawdown, dec!(0));
        assert_eq!(snap.available(), dec!(2000));
    }

    #[test]
    fn overdraw_refused() {
        let mut ledger = ledger_with(dec!(2000));
        ledger.commit("swing-a", dec!(1500)).unwrap();
        let err = ledger.commit("swing-a", dec!(600)).unwrap_err();
        assert_eq!(
            err,
            BudgetError::Insufficient {
                requested: dec!(600),
                available: dec!(500),
            }
        );
        // The refused commit left the row untouched.
        assert_eq!(ledger.available("swing-a"), dec!(500));
    }

    #[test]
    fn catastrophic_loss_never_drives_available_negative() {
        let mut ledger = ledger_with(dec!(2000));
        ledger.commit("swing-a", dec!(1000)).unwrap();
        ledger.settle("swing-a", dec!(1000), dec!(-5000));
        let snap = ledger.snapshot("swing-a").unwrap();
        assert_eq!(snap.drawdown, dec!(2000));
        assert_eq!(snap.available(), dec!(0));
        assert!(ledger.commit("swing-a", dec!(1)).is_err());
    }

    #[test]
    fn unknown_strategy_rejected() {
        let mut ledger = BudgetLedger::new();
        assert!(matches!(
            ledger.commit("ghost", dec!(1)),
            Err(BudgetError::UnknownStrategy(_))
        ));
        assert_eq!(ledger.available("ghost"), dec!(0));
    }

    #[test]
    fn daily_loss_pauses_until_session_reset() {
        let params = StrategyParams::default(); // 5% of cap
        let mut ledger = ledger_with(dec!(2000));
        ledger.commit("swing-a", dec!(500)).unwrap();
        ledger.settle("swing-a", dec!(500), dec!(-60));
        assert!(ledger.pause_reason("swing-a", &params).is_none());

        ledger.commit("swing-a", dec!(500)).unwrap();
        ledger.settle("swing-a", dec!(500), dec!(-45));
        // Total -105 breaches the 100 daily limit.
        assert!(ledger.pause_reason("swing-a", &params).is_some());

        ledger.reset_session();
        assert!(ledger.pause_reason("swing-a", &params).is_none());
        // Drawdown survives the rollover.
        assert_eq!(ledger.snapshot("swing-a").unwrap().drawdown, dec!(105));
    }

    #[test]
    fn consecutive_losses_pause_and_a_win_resets_the_streak() {
        let params = StrategyParams::default(); // streak of 3
        let mut ledger = ledger_with(dec!(50000));
        for _ in 0..2 {
            ledger.commit("swing-a", dec!(100)).unwrap();
            ledger.settle("swing-a", dec!(100), dec!(-10));
        }
        assert!(ledger.pause_reason("swing-a", &params).is_none());

        ledger.commit("swing-a", dec!(100)).unwrap();
        ledger.settle("swing-a", dec!(100), dec!(5));
        for _ in 0..2 {
            ledger.commit("swing-a", dec!(100)).unwrap();
            ledger.settle("swing-a", dec!(100), dec!(-10));
        }
        // Streak restarted after the win: only two losses since.
        assert!(ledger.pause_reason("swing-a", &params).is_none());

        ledger.commit("swing-a", dec!(100)).unwrap();
        ledger.settle("swing-a", dec!(100), dec!(-10));
        assert!(ledger.pause_reason("swing-a", &params).is_some());
    }
}
