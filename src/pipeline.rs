// 🔄 Pipeline - Loader → (cache) → Reconciler
//
// One invocation = one possibly-cached load plus one pure reconcile.
// Terminal errors come back as PipelineError; dropped rows ride along in
// the report.

use crate::cache::{Clock, TtlCache};
use crate::config::AppConfig;
use crate::data_quality::report_issues;
use crate::error::PipelineResult;
use crate::loader::{DataLoader, LoadedTables};
use crate::reconciliation::{reconcile_with_report, ReconciliationReport};
use std::time::Duration;

pub struct Pipeline {
    loader: DataLoader,
    cache: TtlCache<LoadedTables>,
    ttl: Duration,
}

impl Pipeline {
    pub fn new(loader: DataLoader, ttl: Duration) -> Self {
        Pipeline {
            loader,
            cache: TtlCache::new(),
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> PipelineResult<Self> {
        let loader = DataLoader::from_config(&config.source)?;
        Ok(Self::new(loader, config.cache.ttl()))
    }

    /// Swap the clock (tests drive expiry by hand)
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.cache = TtlCache::with_clock(clock);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load (from cache while fresh) and reconcile
    pub fn run(&mut self) -> PipelineResult<ReconciliationReport> {
        let replayed = self.cache.is_fresh(self.ttl);
        let loader = &self.loader;
        let tables = self.cache.get_or_fetch(self.ttl, || loader.load())?;

        let mut report = reconcile_with_report(&tables.branches, &tables.coordinates);

        // Load-time drops first, then reconcile-time drops
        let mut issues = tables.issues.clone();
        issues.append(&mut report.issues);
        report.issues = issues;

        report_issues(&report.issues, replayed);
        tracing::info!(
            source = self.loader.source_name(),
            cached = replayed,
            locations = report.locations.len(),
            "{}",
            report.summary()
        );

        Ok(report)
    }

    /// Drop the cached load; the next `run` fetches again
    pub fn refresh(&mut self) {
        tracing::info!("cache invalidated");
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::ManualClock;
    use crate::error::{PipelineError, Table};
    use crate::source::{RawRows, TabularSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Source whose tables can be swapped mid-test; counts fetches
    #[derive(Clone)]
    struct SharedSource {
        branches: Arc<Mutex<RawRows>>,
        coordinates: RawRows,
        fetches: Arc<AtomicUsize>,
    }

    impl TabularSource for SharedSource {
        fn name(&self) -> &str {
            "shared"
        }

        fn fetch_range(&self, range: &str) -> anyhow::Result<RawRows> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(match range {
                "branches" => self.branches.lock().unwrap().clone(),
                _ => self.coordinates.clone(),
            })
        }
    }

    fn rows(data: &[&[&str]]) -> RawRows {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn source() -> SharedSource {
        SharedSource {
            branches: Arc::new(Mutex::new(rows(&[
                &["Timestamp", "Branch Name", "Pub Name", "Pub City", "Pub State"],
                &["1", "X", "A", "Austin", "TX"],
                &["2", "X", "A", "Austin", "TX"],
                &["1", "Y", "B", "Boston", "MA"],
            ]))),
            coordinates: rows(&[
                &["Branch Name", "Pub Name", "Latitude", "Longitude"],
                &["X", "A", "30.0", "-97.0"],
                &["Y", "B", "not-a-number", "-71.0"],
            ]),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn pipeline(src: &SharedSource, clock: &ManualClock) -> Pipeline {
        let loader = DataLoader::new(Box::new(src.clone()), "branches", "coordinates");
        Pipeline::new(loader, Duration::from_secs(3600)).with_clock(Box::new(clock.clone()))
    }

    #[test]
    fn test_run_end_to_end() {
        let src = source();
        let mut pipeline = pipeline(&src, &ManualClock::new());

        let report = pipeline.run().unwrap();

        // ("Y","B") lost its coordinate to a data-quality drop
        assert_eq!(report.locations.len(), 1);
        assert_eq!(report.locations[0].branch.pub_city, "Austin");
        assert_eq!(report.locations[0].latitude, 30.0);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].table, Table::Coordinates);
    }

    #[test]
    fn test_cached_within_ttl_then_refetched() {
        let src = source();
        let clock = ManualClock::new();
        let mut pipeline = pipeline(&src, &clock);

        pipeline.run().unwrap();
        pipeline.run().unwrap();
        assert_eq!(src.fetches.load(Ordering::SeqCst), 2, "one fetch per table");

        src.branches.lock().unwrap().push(
            ["3", "Z", "C", "Austin", "TX"].iter().map(|c| c.to_string()).collect(),
        );
        clock.advance(Duration::from_secs(3600));

        pipeline.run().unwrap();
        assert_eq!(src.fetches.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_refresh_forces_fetch() {
        let src = source();
        let mut pipeline = pipeline(&src, &ManualClock::new());

        pipeline.run().unwrap();
        pipeline.refresh();
        pipeline.run().unwrap();
        assert_eq!(src.fetches.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_empty_branches_halts() {
        let src = source();
        *src.branches.lock().unwrap() = Vec::new();
        let mut pipeline = pipeline(&src, &ManualClock::new());

        match pipeline.run() {
            Err(PipelineError::EmptySource { table }) => assert_eq!(table, Table::Branches),
            other => panic!("expected EmptySource, got {:?}", other.map(|r| r.locations.len())),
        }
    }
}
