//! Market context: regime classification and sector relative strength.
//!
//! Both trackers refresh on their own timers and are consumed as
//! read-only snapshots by the decision engine; strategies never mutate
//! them.

pub mod regime;
pub mod sector;

pub use regime::{RegimeClassifier, RegimeThresholds};
pub use sector::{default_sector_map, SectorStrengthTracker, SECTOR_ETFS};
