// 📥 Data Loader - fetch both raw tables and parse them into typed records
//
// Failures here are terminal for the invocation: the caller gets an
// explicit PipelineError instead of partial data.

use crate::config::{BackendConfig, SourceConfig};
use crate::data_quality::QualityIssue;
use crate::error::{PipelineError, PipelineResult, Table};
use crate::records::{parse_branches, parse_coordinates, BranchRecord, CoordinateRecord};
use crate::source::{CsvSource, RawRows, SheetsSource, TabularSource};
use chrono::{DateTime, Utc};

/// Output of one successful load
#[derive(Debug, Clone)]
pub struct LoadedTables {
    pub branches: Vec<BranchRecord>,
    pub coordinates: Vec<CoordinateRecord>,

    /// Rows dropped while parsing
    pub issues: Vec<QualityIssue>,

    pub loaded_at: DateTime<Utc>,
}

pub struct DataLoader {
    source: Box<dyn TabularSource>,
    branches_range: String,
    coordinates_range: String,
}

impl DataLoader {
    pub fn new(source: Box<dyn TabularSource>, branches_range: &str, coordinates_range: &str) -> Self {
        DataLoader {
            source,
            branches_range: branches_range.to_string(),
            coordinates_range: coordinates_range.to_string(),
        }
    }

    /// Build the configured source. Sheets credentials are resolved here, once.
    pub fn from_config(config: &SourceConfig) -> PipelineResult<Self> {
        let source: Box<dyn TabularSource> = match &config.backend {
            BackendConfig::Sheets(sheets) => Box::new(SheetsSource::new(
                &sheets.base_url,
                &sheets.spreadsheet_id,
                sheets.resolve_credential()?,
                sheets.timeout(),
            )),
            BackendConfig::Csv(csv) => Box::new(CsvSource::new(&csv.dir)),
        };

        Ok(Self::new(source, &config.branches_range, &config.coordinates_range))
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch and parse both tables
    pub fn load(&self) -> PipelineResult<LoadedTables> {
        let raw_branches = self.fetch(Table::Branches, &self.branches_range)?;
        let raw_coordinates = self.fetch(Table::Coordinates, &self.coordinates_range)?;

        let branches = parse_branches(&raw_branches)?;
        let coordinates = parse_coordinates(&raw_coordinates)?;

        let mut issues = branches.issues;
        issues.extend(coordinates.issues);

        tracing::info!(
            source = self.source.name(),
            branches = branches.records.len(),
            coordinates = coordinates.records.len(),
            dropped = issues.len(),
            "loaded source tables"
        );

        Ok(LoadedTables {
            branches: branches.records,
            coordinates: coordinates.records,
            issues,
            loaded_at: Utc::now(),
        })
    }

    fn fetch(&self, table: Table, range: &str) -> PipelineResult<RawRows> {
        let rows = self.source.fetch_range(range).map_err(|e| {
            tracing::error!(source = self.source.name(), %table, range, "fetch failed: {:#}", e);
            PipelineError::SourceUnavailable(format!("{} ({}): {:#}", table, range, e))
        })?;

        // Header-only counts as empty: there is nothing to show
        if rows.len() < 2 {
            tracing::warn!(source = self.source.name(), %table, range, "no data found");
            return Err(PipelineError::EmptySource { table });
        }

        Ok(rows)
    }
}
