pub mod config;
pub mod config_loader;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{AppConfig, DecayMode, EngineConfig, ParamOverrides, StrategyInstanceConfig, StrategyParams};
pub use config_loader::ConfigLoader;
pub use error::EngineError;
pub use traits::{Brokerage, MarketData, Notifier, TradeStore};
pub use types::{
    Bar, BrokerPosition, BudgetSnapshot, CloseReason, ContractSpec, DepthLevel, DepthSnapshot,
    NotifyEvent, OptionLeg, OptionRight, OrderState, OrderStatusReport, PendingOrder, Position,
    PositionStatus, Regime, Signal, SignalDirection, SignalOutcome, SignalRecord, TradeRecord,
};
