//! Scrape health: errors and objects observed per resource kind.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub const SCRAPE_ERRORS: &str = "ksm_scrape_error_total";
pub const RESOURCES_PER_SCRAPE: &str = "ksm_resources_per_scrape";

/// Updated by every collector on every scrape; calls commute.
pub trait ScrapeStats: Send + Sync {
    fn record_error(&self, kind: &'static str);
    fn record_count(&self, kind: &'static str, n: usize);

    /// Make both series for `kind` visible before its first scrape.
    fn prime(&self, _kind: &'static str) {}
}

/// Help text for the scrape-health families. Call once after installing a recorder.
pub fn describe_scrape_metrics() {
    describe_counter!(SCRAPE_ERRORS, "Total scrape errors encountered when scraping a resource");
    describe_histogram!(RESOURCES_PER_SCRAPE, "Number of resources returned per scrape");
}

/// Records through the `metrics` facade; rendered by the installed exporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeStats;

impl ScrapeStats for FacadeStats {
    fn record_error(&self, kind: &'static str) {
        counter!(SCRAPE_ERRORS, "resource" => kind).increment(1);
    }

    fn record_count(&self, kind: &'static str, n: usize) {
        histogram!(RESOURCES_PER_SCRAPE, "resource" => kind).record(n as f64);
    }

    fn prime(&self, kind: &'static str) {
        counter!(SCRAPE_ERRORS, "resource" => kind).increment(0);
        let _ = histogram!(RESOURCES_PER_SCRAPE, "resource" => kind);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KindTally {
    pub errors: u64,
    pub observations: u64,
    pub last_count: usize,
    pub observed_total: u64,
}

/// In-process tallies, readable without a recorder.
#[derive(Debug, Default)]
pub struct TallyStats {
    inner: Mutex<FxHashMap<&'static str, KindTally>>,
}

impl TallyStats {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, kind: &str) -> KindTally {
        self.inner.lock().get(kind).copied().unwrap_or_default()
    }
}

impl ScrapeStats for TallyStats {
    fn record_error(&self, kind: &'static str) {
        self.inner.lock().entry(kind).or_default().errors += 1;
    }

    fn record_count(&self, kind: &'static str, n: usize) {
        let mut g = self.inner.lock();
        let t = g.entry(kind).or_default();
        t.observations += 1;
        t.last_count = n;
        t.observed_total += n as u64;
    }

    fn prime(&self, kind: &'static str) {
        self.inner.lock().entry(kind).or_default();
    }
}
