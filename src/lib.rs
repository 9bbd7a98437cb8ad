// Branch Locator - Core Library
// Exposes all modules for use in CLI, TUI, API server, and tests

pub mod error;
pub mod config;
pub mod source;         // Tabular sources: Google Sheets, CSV
pub mod records;        // Typed branch/coordinate rows
pub mod data_quality;   // Dropped-row reporting
pub mod loader;
pub mod cache;          // TTL cache for loader output
pub mod deduplication;  // Latest submission per key
pub mod reconciliation; // Join + dedup + canonical order
pub mod display;        // Grouping, viewport, links, surfaces
pub mod pipeline;

#[cfg(feature = "tui")]
pub mod ui;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{PipelineError, PipelineResult, Table};
pub use config::{AppConfig, BackendConfig, CacheConfig, CsvConfig, SheetsConfig, SourceConfig};
pub use source::{Credential, CsvSource, RawRows, SheetsSource, TabularSource};
pub use records::{
    normalize_state, parse_branches, parse_coordinates, parse_timestamp,
    BranchRecord, CoordinateRecord, LocationKey,
};
pub use data_quality::{IssueKind, QualityIssue, QualityReport};
pub use loader::{DataLoader, LoadedTables};
pub use cache::{Clock, SystemClock, TtlCache};
pub use deduplication::latest_per_key;
pub use reconciliation::{
    reconcile, reconcile_with_report,
    ReconcileStats, ReconciledLocation, ReconciliationReport,
};
pub use display::{
    bounding_view, chunked, filter_by_state, group_by_state,
    BoundingView, DisplaySurface, Links, LocationEntry, MapView, StateGroup, TextSurface,
};
pub use pipeline::Pipeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by both binaries (RUST_LOG overrides `info`)
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
