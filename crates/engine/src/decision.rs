//! The scan loop.
//!
//! One cycle at a time: refresh regime and sector context on their
//! timers, poll the volatility index, resolve pending entries, manage
//! open positions, then evaluate every enabled strategy instance over
//! its symbols. Signals pass through the veto chain (regime, sector,
//! confidence floor, per-day flag, admission gates) before budget is
//! committed and a bracket order goes out. The in-memory ledger and
//! position registry stay authoritative; store writes are mirrored
//! behind them and never block a decision, and notifications are
//! dispatched on detached tasks.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;

use swingbot_context::{
    default_sector_map, RegimeClassifier, RegimeThresholds, SectorStrengthTracker, SECTOR_ETFS,
};
use swingbot_core::config::{AppConfig, StrategyParams};
use swingbot_core::EngineError;
use swingbot_core::traits::{Brokerage, MarketData, Notifier, TradeStore};
use swingbot_core::types::{
    CloseReason, NotifyEvent, Position, PositionStatus, Regime, Signal, SignalDirection,
    SignalOutcome, SignalRecord,
};
use swingbot_depth::{imbalance as depth_imbalance, DepthAnalysis, DepthAnalyzer, HistoricalLevelTracker};
use swingbot_strategy::{build_strategy, Strategy, StrategyContext};

use crate::budget::BudgetLedger;
use crate::lifecycle::{PendingResolution, PositionLifecycle};
use crate::{contracts, exits, reconcile, sizing};

/// Daily bars fetched for regime classification; covers the 200-day
/// moving average with margin.
const REGIME_BENCHMARK_DAYS: u32 = 220;
const REGIME_VIX_DAYS: u32 = 30;
const SECTOR_LOOKBACK_DAYS: u32 = 10;
const VIX_TICK_CAPACITY: usize = 240;

struct StrategyRuntime {
    cfg: swingbot_core::config::StrategyInstanceConfig,
    strategy: Box<dyn Strategy>,
    paused_notified: bool,
}

struct Candidate {
    name: String,
    symbol: String,
    params: StrategyParams,
    signal: Signal,
    price: Decimal,
}

pub struct DecisionEngine<M, B, S, N> {
    config: AppConfig,
    market: Arc<M>,
    broker: Arc<B>,
    store: Arc<S>,
    notifier: Arc<N>,

    depth: DepthAnalyzer,
    levels: HistoricalLevelTracker,
    classifier: RegimeClassifier,
    regime: Regime,
    regime_refreshed: Option<DateTime<Utc>>,
    sector: SectorStrengthTracker,
    sector_refreshed: Option<DateTime<Utc>>,
    vix_ticks: VecDeque<(DateTime<Utc>, Decimal)>,

    strategies: Vec<StrategyRuntime>,
    ledger: BudgetLedger,
    lifecycle: PositionLifecycle,
    session_date: Option<NaiveDate>,
}

impl<M, B, S, N> DecisionEngine<M, B, S, N>
where
    M: MarketData + 'static,
    B: Brokerage + 'static,
    S: TradeStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        config: AppConfig,
        market: Arc<M>,
        broker: Arc<B>,
        store: Arc<S>,
        notifier: Arc<N>,
    ) -> Result<Self> {
        let mut strategies = Vec::new();
        let mut ledger = BudgetLedger::new();
        for cfg in config.strategies.iter().filter(|c| c.enabled) {
            let Some(strategy) = build_strategy(&cfg.kind) else {
                anyhow::bail!("unknown strategy kind {:?} for instance {}", cfg.kind, cfg.name);
            };
            ledger.register(&cfg.name, cfg.budget_cap);
            strategies.push(StrategyRuntime {
                cfg: cfg.clone(),
                strategy,
                paused_notified: false,
            });
        }
        tracing::info!(instances = strategies.len(), "Decision engine configured");
        Ok(Self {
            config,
            market,
            broker,
            store,
            notifier,
            depth: DepthAnalyzer::new(),
            levels: HistoricalLevelTracker::new(),
            classifier: RegimeClassifier::new(RegimeThresholds::default()),
            regime: Regime::Unknown,
            regime_refreshed: None,
            sector: SectorStrengthTracker::default().with_sector_map(default_sector_map()),
            sector_refreshed: None,
            vix_ticks: VecDeque::new(),
            strategies,
            ledger,
            lifecycle: PositionLifecycle::new(),
            session_date: None,
        })
    }

    /// Reload persisted positions, rebuild committed budget, and
    /// reconcile the registry against the broker's live portfolio.
    pub async fn startup(&mut self) -> Result<()> {
        let now = Utc::now();
        let stored = self.store.load_positions().await?;
        tracing::info!(positions = stored.len(), "Restoring persisted positions");
        for position in stored {
            let params = self.params_for(&position.strategy, &position.symbol);
            if let Err(err) = self.ledger.commit(&position.strategy, position.committed) {
                tracing::warn!(
                    order_ref = %position.order_ref,
                    error = %err,
                    "Could not re-commit budget for restored position"
                );
            }
            self.lifecycle.restore(position, now, &params);
        }

        let held = self.broker.portfolio().await?;
        let local: Vec<Position> = self.lifecycle.positions().into_iter().cloned().collect();
        for action in reconcile::plan(&local, &held) {
            match action {
                reconcile::ReconcileAction::CloseLocal { order_ref } => {
                    let Some(position) = self.lifecycle.position(&order_ref).cloned() else {
                        continue;
                    };
                    let exit_price = position.current_price;
                    if let Some((position, record)) =
                        self.lifecycle.close(&order_ref, exit_price, CloseReason::ManualClose, now)
                    {
                        self.ledger
                            .settle(&position.strategy, position.committed, record.realized_pnl);
                        self.store_write(async { self.store.delete_position(&order_ref).await }).await;
                        self.store_write(async { self.store.append_trade(&record).await }).await;
                        self.notify(NotifyEvent::Closed {
                            order_ref: record.order_ref.clone(),
                            symbol: record.symbol.clone(),
                            reason: CloseReason::ManualClose,
                            realized_pnl: record.realized_pnl,
                        });
                    }
                }
                reconcile::ReconcileAction::ReduceQuantity { order_ref, quantity } => {
                    let mut released = Decimal::ZERO;
                    let mut strategy = String::new();
                    if let Some(position) = self.lifecycle.position_mut(&order_ref) {
                        if position.quantity > 0 {
                            let freed = position.committed
                                * Decimal::from(position.quantity - quantity)
                                / Decimal::from(position.quantity);
                            position.committed -= freed;
                            position.quantity = quantity;
                            released = freed;
                            strategy = position.strategy.clone();
                        }
                    }
                    if !strategy.is_empty() {
                        self.ledger.release(&strategy, released);
                    }
                    if let Some(position) = self.lifecycle.position(&order_ref).cloned() {
                        self.store_write(async { self.store.upsert_position(&position).await })
                            .await;
                    }
                }
            }
        }
        self.persist_budgets().await;
        Ok(())
    }

    /// Scan until shutdown is signalled or connectivity is lost.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let interval = self.config.engine.scan_interval_secs.max(1);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Cycle errors come from collaborator I/O, which the
                    // trait contract reserves for lost connectivity.
                    if let Err(err) = self.run_cycle().await {
                        let err = EngineError::Connectivity(err);
                        tracing::error!(error = %err, "Scan cycle failed; stopping");
                        self.persist_all().await;
                        return Err(err.into());
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Shutdown requested; persisting state");
                        self.persist_all().await;
                        return Ok(());
                    }
                }
            }
        }
    }

    pub async fn run_cycle(&mut self) -> Result<()> {
        let now = Utc::now();
        let (session_date, minutes_since_open) = self.session_clock(Local::now());
        self.roll_session(session_date);

        self.refresh_regime(now).await?;
        self.refresh_sector(now).await?;
        self.poll_volatility(now).await?;
        self.resolve_pending_orders(now).await?;
        self.manage_positions(now, minutes_since_open.is_some()).await?;
        self.evaluate(now, session_date, minutes_since_open).await?;
        Ok(())
    }

    fn session_clock(&self, now_local: DateTime<Local>) -> (NaiveDate, Option<i64>) {
        let date = now_local.date_naive();
        let time = now_local.time();
        let open = self.config.engine.session_open;
        let close = self.config.engine.session_close;
        let minutes = if time >= open && time < close {
            Some((time - open).num_minutes())
        } else {
            None
        };
        (date, minutes)
    }

    fn roll_session(&mut self, date: NaiveDate) {
        if self.session_date == Some(date) {
            return;
        }
        if self.session_date.is_some() {
            tracing::info!(%date, "Session rollover");
        }
        for runtime in &mut self.strategies {
            runtime.strategy.on_session_start(date);
            runtime.paused_notified = false;
        }
        self.ledger.reset_session();
        self.lifecycle.reset_session();
        self.session_date = Some(date);
    }

    async fn refresh_regime(&mut self, now: DateTime<Utc>) -> Result<()> {
        let due = self.regime_refreshed.is_none_or(|t| {
            (now - t).num_seconds() >= i64::try_from(self.config.engine.regime_refresh_secs).unwrap_or(i64::MAX)
        });
        if !due {
            return Ok(());
        }
        let benchmark: Vec<Decimal> = self
            .market
            .historical_bars(&self.config.engine.benchmark_symbol, "1d", REGIME_BENCHMARK_DAYS)
            .await?
            .iter()
            .map(|b| b.close)
            .collect();
        let vix: Vec<Decimal> = self
            .market
            .historical_bars(&self.config.engine.volatility_symbol, "1d", REGIME_VIX_DAYS)
            .await?
            .iter()
            .map(|b| b.close)
            .collect();
        let regime = self.classifier.classify(&benchmark, &vix);
        if regime != self.regime {
            tracing::info!(from = %self.regime, to = %regime, "Regime changed");
            self.notify(NotifyEvent::RegimeChanged {
                from: self.regime,
                to: regime,
            });
        }
        self.regime = regime;
        self.regime_refreshed = Some(now);
        Ok(())
    }

    async fn refresh_sector(&mut self, now: DateTime<Utc>) -> Result<()> {
        let due = self.sector_refreshed.is_none_or(|t| {
            (now - t).num_seconds() >= i64::try_from(self.config.engine.sector_refresh_secs).unwrap_or(i64::MAX)
        });
        if !due {
            return Ok(());
        }
        let benchmark: Vec<Decimal> = self
            .market
            .historical_bars(&self.config.engine.benchmark_symbol, "1d", SECTOR_LOOKBACK_DAYS)
            .await?
            .iter()
            .map(|b| b.close)
            .collect();
        let mut sector_closes = HashMap::new();
        for etf in SECTOR_ETFS {
            let closes: Vec<Decimal> = self
                .market
                .historical_bars(etf, "1d", SECTOR_LOOKBACK_DAYS)
                .await?
                .iter()
                .map(|b| b.close)
                .collect();
            if !closes.is_empty() {
                sector_closes.insert(etf.to_string(), closes);
            }
        }
        self.sector.refresh(&sector_closes, &benchmark, now);
        self.sector_refreshed = Some(now);
        Ok(())
    }

    async fn poll_volatility(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(value) = self
            .market
            .current_price(&self.config.engine.volatility_symbol)
            .await?
        {
            self.vix_ticks.push_back((now, value));
            while self.vix_ticks.len() > VIX_TICK_CAPACITY {
                self.vix_ticks.pop_front();
            }
        }
        Ok(())
    }

    async fn resolve_pending_orders(&mut self, now: DateTime<Utc>) -> Result<()> {
        for order_ref in self.lifecycle.pending_refs() {
            let Some(snapshot) = self.lifecycle.position(&order_ref).cloned() else {
                continue;
            };
            let params = self.params_for(&snapshot.strategy, &snapshot.symbol);
            let report = self.broker.order_status(&order_ref).await?;
            let underlying = self.market.current_price(&snapshot.symbol).await?;

            match self
                .lifecycle
                .resolve_pending(&order_ref, &report, underlying, now, &params)
            {
                Some(PendingResolution::Filled { fill_price }) => {
                    if report.filled_quantity < snapshot.quantity && snapshot.quantity > 0 {
                        let freed = snapshot.committed
                            * Decimal::from(snapshot.quantity - report.filled_quantity)
                            / Decimal::from(snapshot.quantity);
                        if let Some(position) = self.lifecycle.position_mut(&order_ref) {
                            position.committed -= freed;
                        }
                        self.ledger.release(&snapshot.strategy, freed);
                    }
                    tracing::info!(
                        order_ref = %order_ref,
                        symbol = %snapshot.symbol,
                        fill = %fill_price,
                        "Entry filled"
                    );
                    if let Some(position) = self.lifecycle.position(&order_ref).cloned() {
                        self.store_write(async { self.store.upsert_position(&position).await })
                            .await;
                        self.notify(NotifyEvent::Filled {
                            order_ref: order_ref.clone(),
                            symbol: position.symbol.clone(),
                            quantity: position.quantity,
                            price: fill_price,
                        });
                    }
                    self.persist_budget(&snapshot.strategy).await;
                }
                Some(PendingResolution::Abort { reason }) => {
                    if matches!(reason, CloseReason::OrderTimeout | CloseReason::OrderDrift) {
                        self.broker.cancel(&order_ref).await?;
                    }
                    self.ledger.release(&snapshot.strategy, snapshot.committed);
                    self.store_write(async { self.store.delete_position(&order_ref).await })
                        .await;
                    self.persist_budget(&snapshot.strategy).await;
                    self.notify(NotifyEvent::EntryFailed {
                        strategy: snapshot.strategy.clone(),
                        symbol: snapshot.symbol.clone(),
                        detail: reason.to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn manage_positions(&mut self, now: DateTime<Utc>, in_session: bool) -> Result<()> {
        for order_ref in self.lifecycle.open_refs() {
            let Some(snapshot) = self.lifecycle.position(&order_ref).cloned() else {
                continue;
            };
            let params = self.params_for(&snapshot.strategy, &snapshot.symbol);

            if let Some(price) = self.market.contract_price(&snapshot.contract).await? {
                if let Some(position) = self.lifecycle.position_mut(&order_ref) {
                    position.current_price = price;
                    exits::update_trailing(position, &params);
                }
            }
            let underlying = self.market.current_price(&snapshot.symbol).await?;
            let imbalance = match self.market.depth_snapshot(&snapshot.symbol).await? {
                Some(snap) => Some(depth_imbalance(&snap, params.imbalance_levels)),
                None => None,
            };

            let Some(position) = self.lifecycle.position(&order_ref).cloned() else {
                continue;
            };
            let mut reason = exits::check_exits(&position, now, &params);
            if reason.is_none() {
                if let Some(underlying) = underlying {
                    if let Some(runtime) = self
                        .strategies
                        .iter_mut()
                        .find(|r| r.cfg.name == position.strategy)
                    {
                        reason = runtime
                            .strategy
                            .check_exit(&position, underlying, imbalance, &params);
                    }
                }
            }
            // Intraday styles are flattened once the session closes.
            if reason.is_none() && !in_session && params.max_hold_minutes.is_some() {
                reason = Some(CloseReason::SessionEnd);
            }

            if let Some(reason) = reason {
                self.close_position(&order_ref, reason, now).await?;
            } else if let Some(position) = self.lifecycle.position(&order_ref).cloned() {
                self.store_write(async { self.store.upsert_position(&position).await })
                    .await;
            }
        }
        Ok(())
    }

    async fn close_position(
        &mut self,
        order_ref: &str,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(snapshot) = self.lifecycle.position(order_ref).cloned() else {
            return Ok(());
        };
        self.broker.cancel(order_ref).await?;
        let exit_price = self
            .broker
            .close_position(&snapshot.contract, snapshot.quantity)
            .await?;
        let Some((position, record)) = self.lifecycle.close(order_ref, exit_price, reason, now)
        else {
            return Ok(());
        };
        self.ledger
            .settle(&position.strategy, position.committed, record.realized_pnl);
        if let Some(runtime) = self
            .strategies
            .iter_mut()
            .find(|r| r.cfg.name == position.strategy)
        {
            runtime.strategy.on_trade_closed(&record);
        }
        tracing::info!(
            order_ref,
            symbol = %record.symbol,
            reason = %reason,
            pnl = %record.realized_pnl,
            "Position closed"
        );
        self.store_write(async { self.store.delete_position(order_ref).await }).await;
        self.store_write(async { self.store.append_trade(&record).await }).await;
        self.persist_budget(&position.strategy).await;
        self.notify(NotifyEvent::Closed {
            order_ref: record.order_ref.clone(),
            symbol: record.symbol.clone(),
            reason,
            realized_pnl: record.realized_pnl,
        });
        Ok(())
    }

    async fn evaluate(
        &mut self,
        now: DateTime<Utc>,
        session_date: NaiveDate,
        minutes_since_open: Option<i64>,
    ) -> Result<()> {
        // Entries only during regular hours.
        if minutes_since_open.is_none() {
            return Ok(());
        }
        let equity = self.broker.account_equity().await?;

        let mut symbols: BTreeSet<String> = BTreeSet::new();
        for runtime in &self.strategies {
            symbols.extend(runtime.cfg.symbols.iter().cloned());
        }

        let mut prices: HashMap<String, Decimal> = HashMap::new();
        let mut analyses: HashMap<String, DepthAnalysis> = HashMap::new();
        for symbol in &symbols {
            let Some(price) = self.market.current_price(symbol).await? else {
                continue;
            };
            prices.insert(symbol.clone(), price);
            if let Some(snapshot) = self.market.depth_snapshot(symbol).await? {
                if let Some(analysis) = self.depth.analyze(&snapshot, &self.config.defaults) {
                    analyses.insert(symbol.clone(), analysis);
                }
            }
            if self.levels.needs_refresh(symbol, now, &self.config.defaults) {
                let bars = self
                    .market
                    .historical_bars(symbol, "1d", self.config.defaults.historical_lookback_days)
                    .await?;
                if !bars.is_empty() {
                    self.levels.refresh(symbol, "1d", &bars, &self.config.defaults, now);
                }
            }
        }

        let vix_ticks: Vec<(DateTime<Utc>, Decimal)> = self.vix_ticks.iter().copied().collect();
        let mut candidates: Vec<Candidate> = Vec::new();
        for idx in 0..self.strategies.len() {
            let name = self.strategies[idx].cfg.name.clone();
            let instance_params = self
                .config
                .defaults
                .merged(&self.strategies[idx].cfg.overrides);
            if let Some(reason) = self.ledger.pause_reason(&name, &instance_params) {
                if !self.strategies[idx].paused_notified {
                    tracing::warn!(strategy = %name, %reason, "Strategy paused for the session");
                    self.notify(NotifyEvent::StrategyPaused {
                        strategy: name.clone(),
                        detail: reason,
                    });
                    self.strategies[idx].paused_notified = true;
                }
                continue;
            }

            for symbol in self.strategies[idx].cfg.symbols.clone() {
                let Some(&price) = prices.get(&symbol) else {
                    continue;
                };
                let params = self.strategies[idx]
                    .cfg
                    .params_for(&self.config.defaults, &symbol);
                let owned = self.lifecycle.owned_by(&name, &symbol);
                let ctx = StrategyContext {
                    regime: self.regime,
                    sector: &self.sector,
                    analysis: analyses.get(&symbol),
                    depth: &self.depth,
                    levels: &self.levels,
                    open_positions: &owned,
                    equity,
                    vix_ticks: &vix_ticks,
                    session_date,
                    minutes_since_open,
                    now,
                };
                let signal = self.strategies[idx]
                    .strategy
                    .analyze(&symbol, price, &params, &ctx);
                let Some(signal) = signal else { continue };
                if signal.direction == SignalDirection::NoTrade {
                    continue;
                }
                candidates.push(Candidate {
                    name: name.clone(),
                    symbol,
                    params,
                    signal,
                    price,
                });
            }
        }

        for candidate in candidates {
            self.process_candidate(candidate, equity, now).await?;
        }
        Ok(())
    }

    /// Veto chain, then contract resolution, sizing, budget commit, and
    /// order submission.
    async fn process_candidate(
        &mut self,
        candidate: Candidate,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Candidate {
            name,
            symbol,
            params,
            signal,
            price,
        } = candidate;
        let bullish = signal.direction.is_bullish();

        let veto = self.veto_for(&name, &symbol, &signal, &params, bullish);
        if let Some(detail) = veto {
            tracing::debug!(strategy = %name, symbol = %symbol, %detail, "Signal vetoed");
            self.record_signal(&name, &signal, SignalOutcome::Rejected, Some(detail))
                .await;
            return Ok(());
        }

        let chain = self
            .market
            .option_chain(&symbol, params.min_dte, params.max_dte)
            .await?;
        let Some(contract) = contracts::resolve_contract(&chain, &signal, price) else {
            self.entry_failed(&name, &symbol, &signal, "no resolvable contract".to_string())
                .await;
            return Ok(());
        };
        let Some(entry_price) = self.market.contract_price(&contract).await? else {
            self.entry_failed(&name, &symbol, &signal, "no contract quote".to_string())
                .await;
            return Ok(());
        };

        let available = self.ledger.available(&name);
        let quantity = match sizing::contract_quantity(
            equity,
            signal.confidence,
            entry_price,
            available,
            &params,
        ) {
            Ok(q) => q,
            Err(err) => {
                self.entry_failed(&name, &symbol, &signal, err.to_string()).await;
                return Ok(());
            }
        };

        let cost = entry_price.abs() * Decimal::ONE_HUNDRED * Decimal::from(quantity);
        if let Err(err) = self.ledger.commit(&name, cost) {
            self.entry_failed(&name, &symbol, &signal, err.to_string()).await;
            return Ok(());
        }

        let order_ref = self.lifecycle.next_order_ref(now);
        let (stop_loss, profit_target) =
            exits::bracket_prices(signal.direction, entry_price, &params);
        if let Err(err) = self
            .broker
            .submit_bracket_order(&order_ref, &contract, quantity, entry_price, stop_loss, profit_target)
            .await
        {
            self.ledger.release(&name, cost);
            return Err(err);
        }

        let position = Position {
            order_ref: order_ref.clone(),
            strategy: name.clone(),
            symbol: symbol.clone(),
            contract,
            direction: signal.direction,
            quantity,
            entry_price,
            current_price: entry_price,
            underlying_entry: price,
            stop_loss,
            profit_target,
            peak_price: None,
            trailing_stop: None,
            committed: cost,
            status: PositionStatus::PendingFill,
            opened_at: now,
        };
        self.lifecycle.admit(position.clone(), now, &params);
        if let Some(runtime) = self.strategies.iter_mut().find(|r| r.cfg.name == name) {
            runtime.strategy.on_position_opened(&position);
        }
        tracing::info!(
            strategy = %name,
            symbol = %symbol,
            order_ref = %order_ref,
            direction = %signal.direction,
            confidence = signal.confidence,
            quantity,
            entry = %entry_price,
            "Entry submitted"
        );
        self.store_write(async { self.store.upsert_position(&position).await }).await;
        self.persist_budget(&name).await;
        self.record_signal(&name, &signal, SignalOutcome::Executed, None).await;
        Ok(())
    }

    fn veto_for(
        &self,
        name: &str,
        symbol: &str,
        signal: &Signal,
        params: &StrategyParams,
        bullish: bool,
    ) -> Option<String> {
        let cfg = self.strategies.iter().find(|r| r.cfg.name == name).map(|r| &r.cfg)?;
        if !cfg.regime_allowed(self.regime) {
            return Some(format!("regime {} not allowed", self.regime));
        }
        if cfg.sector_veto && self.sector.vetoes(symbol, bullish) {
            return Some("sector relative strength opposes the trade".to_string());
        }
        let floor = params.confidence_floor(bullish);
        if signal.confidence < floor {
            return Some(format!(
                "confidence {:.2} below floor {:.2}",
                signal.confidence, floor
            ));
        }
        if params.one_trade_per_day && self.lifecycle.has_traded_today(name, symbol) {
            return Some("already traded this symbol today".to_string());
        }
        if self.lifecycle.count_for(name) >= params.max_open_positions {
            return Some("open-position cap reached".to_string());
        }
        if !params.allow_stacking && !self.lifecycle.owned_by(name, symbol).is_empty() {
            return Some("already positioned on this symbol".to_string());
        }
        None
    }

    async fn entry_failed(&self, name: &str, symbol: &str, signal: &Signal, detail: String) {
        tracing::warn!(strategy = %name, symbol = %symbol, %detail, "Entry failed");
        self.notify(NotifyEvent::EntryFailed {
            strategy: name.to_string(),
            symbol: symbol.to_string(),
            detail: detail.clone(),
        });
        self.record_signal(name, signal, SignalOutcome::FailedEntry, Some(detail))
            .await;
    }

    async fn record_signal(
        &self,
        name: &str,
        signal: &Signal,
        outcome: SignalOutcome,
        detail: Option<String>,
    ) {
        let record = SignalRecord {
            strategy: name.to_string(),
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            confidence: signal.confidence,
            pattern: signal.pattern.clone(),
            outcome,
            detail,
            timestamp: signal.timestamp,
        };
        self.store_write(async { self.store.append_signal_outcome(&record).await })
            .await;
    }

    fn params_for(&self, strategy: &str, symbol: &str) -> StrategyParams {
        self.strategies
            .iter()
            .find(|r| r.cfg.name == strategy)
            .map_or_else(
                || self.config.defaults.clone(),
                |r| r.cfg.params_for(&self.config.defaults, symbol),
            )
    }

    /// Mirror one store write behind the in-memory state. Failures are
    /// logged and swallowed; the ledger and registry stay authoritative.
    async fn store_write<F>(&self, write: F)
    where
        F: std::future::Future<Output = Result<()>>,
    {
        if let Err(err) = write.await {
            tracing::warn!(error = %err, "Store write failed");
        }
    }

    async fn persist_budget(&self, strategy: &str) {
        if let Some(snapshot) = self.ledger.snapshot(strategy) {
            self.store_write(async { self.store.upsert_budget(strategy, &snapshot).await })
                .await;
        }
    }

    async fn persist_budgets(&self) {
        for runtime in &self.strategies {
            self.persist_budget(&runtime.cfg.name).await;
        }
    }

    async fn persist_all(&self) {
        self.persist_budgets().await;
        for position in self.lifecycle.positions() {
            self.store_write(async { self.store.upsert_position(position).await })
                .await;
        }
    }

    /// Detached best-effort notification.
    fn notify(&self, event: NotifyEvent) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(event).await {
                tracing::warn!(error = %err, "Notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{FillMode, LogNotifier, MemoryStore, PaperBroker, PaperMarket};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use swingbot_core::config::{ParamOverrides, StrategyInstanceConfig};
    use swingbot_core::types::{
        ContractSpec, DepthLevel, DepthSnapshot, OptionLeg, OptionRight,
    };

    type PaperEngine = DecisionEngine<PaperMarket, PaperBroker, MemoryStore, LogNotifier>;

    fn instance(name: &str, kind: &str, regimes: Vec<Regime>) -> StrategyInstanceConfig {
        StrategyInstanceConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            enabled: true,
            budget_cap: dec!(2000),
            symbols: vec!["SPY".to_string()],
            allowed_regimes: regimes,
            sector_veto: false,
            overrides: ParamOverrides::default(),
            symbol_overrides: BTreeMap::new(),
        }
    }

    fn engine_with(
        instances: Vec<StrategyInstanceConfig>,
    ) -> (PaperEngine, Arc<PaperMarket>, Arc<PaperBroker>, Arc<MemoryStore>) {
        let market = Arc::new(PaperMarket::new());
        let broker = Arc::new(PaperBroker::new());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(LogNotifier::new());
        let config = AppConfig {
            strategies: instances,
            ..AppConfig::default()
        };
        let engine = DecisionEngine::new(
            config,
            Arc::clone(&market),
            Arc::clone(&broker),
            Arc::clone(&store),
            Arc::clone(&notifier),
        )
        .unwrap();
        (engine, market, broker, store)
    }

    fn heavy_bid_book() -> DepthSnapshot {
        DepthSnapshot {
            symbol: "SPY".to_string(),
            bids: vec![DepthLevel { price: dec!(499.9), size: dec!(900) }],
            asks: vec![DepthLevel { price: dec!(500.1), size: dec!(100) }],
            timestamp: Utc::now(),
        }
    }

    fn atm_call() -> ContractSpec {
        ContractSpec {
            symbol: "SPY".to_string(),
            legs: vec![OptionLeg {
                right: OptionRight::Call,
                strike: dec!(500),
                expiry: Utc::now().date_naive() + Duration::days(30),
                ratio: 1,
            }],
        }
    }

    fn single_leg_chain() -> Vec<ContractSpec> {
        let expiry = Utc::now().date_naive() + Duration::days(30);
        let mut out = Vec::new();
        for strike in [480, 490, 500, 510, 520] {
            for right in [OptionRight::Call, OptionRight::Put] {
                out.push(ContractSpec {
                    symbol: "SPY".to_string(),
                    legs: vec![OptionLeg {
                        right,
                        strike: Decimal::from(strike),
                        expiry,
                        ratio: 1,
                    }],
                });
            }
        }
        out
    }

    async fn stage_scalp_market(market: &PaperMarket) {
        market.set_price("SPY", dec!(500)).await;
        market.set_depth(heavy_bid_book()).await;
        market.set_chain("SPY", single_leg_chain()).await;
        market.set_contract_price(&atm_call(), dec!(2.00)).await;
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    #[tokio::test]
    async fn chaos_regime_gates_swing_while_scalping_trades() {
        let (mut engine, market, _broker, store) = engine_with(vec![
            instance("swing-a", "swing", vec![Regime::BullTrend, Regime::RangeBound]),
            instance("scalp-a", "scalping", vec![]),
        ]);
        stage_scalp_market(&market).await;
        engine.regime = Regime::HighChaos;

        let now = Utc::now();
        engine.evaluate(now, today(), Some(60)).await.unwrap();

        // The ungated scalper traded on the 0.8 book imbalance.
        assert_eq!(engine.lifecycle.count_for("scalp-a"), 1);
        let outcomes = store.outcomes().await;
        assert!(outcomes
            .iter()
            .any(|o| o.strategy == "scalp-a" && o.outcome == SignalOutcome::Executed));

        // A swing candidate in the same cycle is refused on regime.
        let candidate = Candidate {
            name: "swing-a".to_string(),
            symbol: "SPY".to_string(),
            params: StrategyParams::default(),
            signal: Signal::new("SPY", SignalDirection::LongCall, 0.9, "support_rejection"),
            price: dec!(500),
        };
        engine.process_candidate(candidate, dec!(100000), now).await.unwrap();

        let outcomes = store.outcomes().await;
        let rejected = outcomes
            .iter()
            .find(|o| o.strategy == "swing-a")
            .unwrap();
        assert_eq!(rejected.outcome, SignalOutcome::Rejected);
        assert!(rejected.detail.as_deref().unwrap().contains("regime"));
        assert_eq!(engine.lifecycle.count_for("swing-a"), 0);
    }

    #[tokio::test]
    async fn entry_fill_and_profit_target_roundtrip() {
        let (mut engine, market, broker, store) =
            engine_with(vec![instance("scalp-a", "scalping", vec![])]);
        stage_scalp_market(&market).await;

        let now = Utc::now();
        engine.evaluate(now, today(), Some(60)).await.unwrap();

        // 100k * 2% * 0.8 confidence / $200 per contract = 8 contracts.
        engine.resolve_pending_orders(now).await.unwrap();
        let positions = engine.lifecycle.positions();
        assert_eq!(positions.len(), 1);
        let position = positions[0];
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.quantity, 8);
        assert_eq!(position.profit_target, dec!(2.60));
        assert_eq!(engine.ledger.available("scalp-a"), dec!(400));

        // Contract runs through the target.
        market.set_contract_price(&atm_call(), dec!(2.70)).await;
        broker.set_exit_price(&atm_call(), dec!(2.70)).await;
        engine.manage_positions(now, true).await.unwrap();

        assert!(engine.lifecycle.positions().is_empty());
        let trades = store.trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].reason, CloseReason::ProfitTarget);
        assert_eq!(trades[0].realized_pnl, dec!(560.00));
        // Win released the commitment and recovered nothing (no drawdown).
        let budget = engine.ledger.snapshot("scalp-a").unwrap();
        assert_eq!(budget.committed, dec!(0));
        assert_eq!(budget.available(), dec!(2000));
    }

    #[tokio::test]
    async fn stuck_entry_times_out_and_releases_budget() {
        let (mut engine, market, broker, store) =
            engine_with(vec![instance("scalp-a", "scalping", vec![])]);
        stage_scalp_market(&market).await;
        broker.set_fill_mode(FillMode::Working).await;

        let now = Utc::now();
        engine.evaluate(now, today(), Some(60)).await.unwrap();
        assert_eq!(engine.ledger.available("scalp-a"), dec!(400));

        // Within the 60s window the order keeps working.
        engine.resolve_pending_orders(now + Duration::seconds(30)).await.unwrap();
        assert_eq!(engine.lifecycle.count_for("scalp-a"), 1);

        engine.resolve_pending_orders(now + Duration::seconds(61)).await.unwrap();
        assert_eq!(engine.lifecycle.count_for("scalp-a"), 0);
        assert_eq!(engine.ledger.available("scalp-a"), dec!(2000));
        assert!(store.stored_positions().await.is_empty());
    }

    #[tokio::test]
    async fn startup_closes_positions_the_broker_no_longer_holds() {
        let (mut engine, _market, _broker, store) =
            engine_with(vec![instance("scalp-a", "scalping", vec![])]);

        let position = Position {
            order_ref: "SWINGBOT-1-1".to_string(),
            strategy: "scalp-a".to_string(),
            symbol: "SPY".to_string(),
            contract: atm_call(),
            direction: SignalDirection::LongCall,
            quantity: 2,
            entry_price: dec!(2.00),
            current_price: dec!(2.00),
            underlying_entry: dec!(500),
            stop_loss: dec!(1.00),
            profit_target: dec!(2.60),
            peak_price: None,
            trailing_stop: None,
            committed: dec!(400),
            status: PositionStatus::Open,
            opened_at: Utc::now(),
        };
        store.seed_position(position).await;

        engine.startup().await.unwrap();

        assert!(engine.lifecycle.positions().is_empty());
        let trades = store.trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].reason, CloseReason::ManualClose);
        assert_eq!(trades[0].realized_pnl, dec!(0));
        assert_eq!(engine.ledger.available("scalp-a"), dec!(2000));
    }
}
