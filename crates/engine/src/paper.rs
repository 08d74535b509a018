//! In-memory collaborators for paper trading and tests.
//!
//! Scripted market data, an instantly-filling (or deliberately stalled)
//! brokerage, an in-memory store, and a log-only notifier. The paper
//! broker tracks a portfolio keyed by contract so startup
//! reconciliation behaves the same way it does against a live account.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use swingbot_core::traits::{Brokerage, MarketData, Notifier, TradeStore};
use swingbot_core::types::{
    Bar, BrokerPosition, BudgetSnapshot, ContractSpec, DepthSnapshot, NotifyEvent, OrderState,
    OrderStatusReport, Position, SignalRecord, TradeRecord,
};

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MarketState {
    prices: HashMap<String, Decimal>,
    depth: HashMap<String, DepthSnapshot>,
    bars: HashMap<(String, String), Vec<Bar>>,
    chains: HashMap<String, Vec<ContractSpec>>,
    contract_prices: HashMap<String, Decimal>,
}

/// Scripted market data feed.
#[derive(Default)]
pub struct PaperMarket {
    state: Mutex<MarketState>,
}

impl PaperMarket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().await.prices.insert(symbol.to_string(), price);
    }

    pub async fn set_depth(&self, snapshot: DepthSnapshot) {
        self.state
            .lock()
            .await
            .depth
            .insert(snapshot.symbol.clone(), snapshot);
    }

    pub async fn set_bars(&self, symbol: &str, timeframe: &str, bars: Vec<Bar>) {
        self.state
            .lock()
            .await
            .bars
            .insert((symbol.to_string(), timeframe.to_string()), bars);
    }

    /// Chain entries are used as-is; script them already inside the DTE
    /// window.
    pub async fn set_chain(&self, symbol: &str, chain: Vec<ContractSpec>) {
        self.state.lock().await.chains.insert(symbol.to_string(), chain);
    }

    pub async fn set_contract_price(&self, contract: &ContractSpec, price: Decimal) {
        self.state
            .lock()
            .await
            .contract_prices
            .insert(contract.key(), price);
    }
}

#[async_trait]
impl MarketData for PaperMarket {
    async fn current_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        Ok(self.state.lock().await.prices.get(symbol).copied())
    }

    async fn depth_snapshot(&self, symbol: &str) -> Result<Option<DepthSnapshot>> {
        Ok(self.state.lock().await.depth.get(symbol).cloned())
    }

    async fn historical_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        _lookback_days: u32,
    ) -> Result<Vec<Bar>> {
        Ok(self
            .state
            .lock()
            .await
            .bars
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn option_chain(
        &self,
        symbol: &str,
        _min_dte: u32,
        _max_dte: u32,
    ) -> Result<Vec<ContractSpec>> {
        Ok(self
            .state
            .lock()
            .await
            .chains
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn contract_price(&self, contract: &ContractSpec) -> Result<Option<Decimal>> {
        Ok(self
            .state
            .lock()
            .await
            .contract_prices
            .get(&contract.key())
            .copied())
    }
}

// ---------------------------------------------------------------------------
// Brokerage
// ---------------------------------------------------------------------------

/// How the paper broker answers entry orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Fill in full at the requested entry price on submission.
    Immediate,
    /// Leave orders working forever (timeout and drift paths).
    Working,
    /// Reject every order.
    Reject,
}

struct PaperOrder {
    contract: ContractSpec,
    quantity: u32,
    entry_price: Decimal,
    state: OrderState,
}

struct BrokerState {
    fill_mode: FillMode,
    orders: HashMap<String, PaperOrder>,
    portfolio: HashMap<String, BrokerPosition>,
    exit_prices: HashMap<String, Decimal>,
    equity: Decimal,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Immediate,
            orders: HashMap::new(),
            portfolio: HashMap::new(),
            exit_prices: HashMap::new(),
            equity: Decimal::from(100_000),
        }
    }
}

/// Brokerage simulator with a contract-keyed portfolio.
#[derive(Default)]
pub struct PaperBroker {
    state: Mutex<BrokerState>,
}

impl PaperBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fill_mode(&self, mode: FillMode) {
        self.state.lock().await.fill_mode = mode;
    }

    pub async fn set_equity(&self, equity: Decimal) {
        self.state.lock().await.equity = equity;
    }

    /// Price at which [`Brokerage::close_position`] fills for a
    /// contract; defaults to the position's average cost.
    pub async fn set_exit_price(&self, contract: &ContractSpec, price: Decimal) {
        self.state
            .lock()
            .await
            .exit_prices
            .insert(contract.key(), price);
    }

    /// Drop a holding without going through an order, to stage
    /// reconciliation scenarios.
    pub async fn forget_position(&self, contract: &ContractSpec) {
        self.state.lock().await.portfolio.remove(&contract.key());
    }
}

#[async_trait]
impl Brokerage for PaperBroker {
    async fn submit_bracket_order(
        &self,
        order_ref: &str,
        contract: &ContractSpec,
        quantity: u32,
        entry_price: Decimal,
        _stop_loss: Decimal,
        _profit_target: Decimal,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let order_state = match state.fill_mode {
            FillMode::Immediate => OrderState::Filled,
            FillMode::Working => OrderState::Working,
            FillMode::Reject => OrderState::Rejected,
        };
        if order_state == OrderState::Filled {
            let key = contract.key();
            let holding = state.portfolio.entry(key).or_insert(BrokerPosition {
                contract_key: contract.key(),
                quantity: 0,
                avg_cost: entry_price,
            });
            holding.quantity += quantity;
            holding.avg_cost = entry_price;
        }
        state.orders.insert(
            order_ref.to_string(),
            PaperOrder {
                contract: contract.clone(),
                quantity,
                entry_price,
                state: order_state,
            },
        );
        Ok(())
    }

    async fn cancel(&self, order_ref: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(order) = state.orders.get_mut(order_ref) {
            if order.state == OrderState::Working {
                order.state = OrderState::Cancelled;
            }
        }
        Ok(())
    }

    async fn close_position(&self, contract: &ContractSpec, quantity: u32) -> Result<Decimal> {
        let mut state = self.state.lock().await;
        let key = contract.key();
        let mut avg_cost = Decimal::ZERO;
        let mut emptied = false;
        if let Some(holding) = state.portfolio.get_mut(&key) {
            avg_cost = holding.avg_cost;
            holding.quantity = holding.quantity.saturating_sub(quantity);
            emptied = holding.quantity == 0;
        }
        if emptied {
            state.portfolio.remove(&key);
        }
        Ok(state.exit_prices.get(&key).copied().unwrap_or(avg_cost))
    }

    async fn portfolio(&self) -> Result<Vec<BrokerPosition>> {
        Ok(self.state.lock().await.portfolio.values().cloned().collect())
    }

    async fn order_status(&self, order_ref: &str) -> Result<OrderStatusReport> {
        let state = self.state.lock().await;
        let order = state
            .orders
            .get(order_ref)
            .ok_or_else(|| anyhow::anyhow!("unknown order {order_ref}"))?;
        let filled = match order.state {
            OrderState::Filled => order.quantity,
            _ => 0,
        };
        Ok(OrderStatusReport {
            order_ref: order_ref.to_string(),
            state: order.state,
            filled_quantity: filled,
            avg_fill_price: (filled > 0).then_some(order.entry_price),
            updated_at: Utc::now(),
        })
    }

    async fn account_equity(&self) -> Result<Decimal> {
        Ok(self.state.lock().await.equity)
    }
}

// ---------------------------------------------------------------------------
// Store and notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    positions: HashMap<String, Position>,
    trades: Vec<TradeRecord>,
    outcomes: Vec<SignalRecord>,
    budgets: HashMap<String, BudgetSnapshot>,
}

/// In-memory trade store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a persisted position ahead of engine startup.
    pub async fn seed_position(&self, position: Position) {
        self.state
            .lock()
            .await
            .positions
            .insert(position.order_ref.clone(), position);
    }

    pub async fn trades(&self) -> Vec<TradeRecord> {
        self.state.lock().await.trades.clone()
    }

    pub async fn outcomes(&self) -> Vec<SignalRecord> {
        self.state.lock().await.outcomes.clone()
    }

    pub async fn stored_positions(&self) -> Vec<Position> {
        self.state.lock().await.positions.values().cloned().collect()
    }

    pub async fn budget(&self, strategy: &str) -> Option<BudgetSnapshot> {
        self.state.lock().await.budgets.get(strategy).copied()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn upsert_position(&self, position: &Position) -> Result<()> {
        self.state
            .lock()
            .await
            .positions
            .insert(position.order_ref.clone(), position.clone());
        Ok(())
    }

    async fn delete_position(&self, order_ref: &str) -> Result<()> {
        self.state.lock().await.positions.remove(order_ref);
        Ok(())
    }

    async fn append_trade(&self, trade: &TradeRecord) -> Result<()> {
        self.state.lock().await.trades.push(trade.clone());
        Ok(())
    }

    async fn append_signal_outcome(&self, record: &SignalRecord) -> Result<()> {
        self.state.lock().await.outcomes.push(record.clone());
        Ok(())
    }

    async fn upsert_budget(&self, strategy: &str, snapshot: &BudgetSnapshot) -> Result<()> {
        self.state
            .lock()
            .await
            .budgets
            .insert(strategy.to_string(), *snapshot);
        Ok(())
    }

    async fn load_positions(&self) -> Result<Vec<Position>> {
        Ok(self.state.lock().await.positions.values().cloned().collect())
    }
}

/// Notifier that only writes to the log.
#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<()> {
        tracing::info!(?event, "Notification");
        Ok(())
    }
}
