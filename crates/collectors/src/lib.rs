//! kstate collectors: the per-kind scrape harness, the kinds shipped with it, and the
//! scrape-health stats every collector updates.

#![forbid(unsafe_code)]

pub mod collector;
pub mod componentstatus;
pub mod limitrange;
pub mod register;
pub mod stats;

pub use collector::{KindCollector, KindMetrics};
pub use componentstatus::ComponentStatusMetrics;
pub use limitrange::LimitRangeMetrics;
pub use register::{
    register_component_status_collector, register_kind, register_limit_range_collector, Kind, RegisterOptions,
    UnknownKind,
};
pub use stats::{describe_scrape_metrics, FacadeStats, KindTally, ScrapeStats, TallyStats};
