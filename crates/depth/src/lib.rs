//! Order-book liquidity analysis.
//!
//! Two stateful trackers: [`DepthAnalyzer`] turns depth snapshots into
//! significant liquidity zones, imbalance, and absorption breakouts;
//! [`HistoricalLevelTracker`] builds decayed swing levels from bars and
//! detects power-level confluence with live zones.

pub mod analyzer;
pub mod levels;

pub use analyzer::{imbalance, AbsorptionBreakout, DepthAnalysis, DepthAnalyzer, LiquidityZone, ZoneSide};
pub use levels::{
    build_levels, DepthStrength, HistoricalLevel, HistoricalLevelTracker, PowerCheck, PowerLevel,
};
