// 🚨 Pipeline Errors - terminal failures for one invocation
// Row-level problems are NOT errors: see data_quality::QualityIssue

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which of the two source tables a problem belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Branches,
    Coordinates,
}

impl Table {
    pub fn name(&self) -> &str {
        match self {
            Table::Branches => "branches",
            Table::Coordinates => "coordinates",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failures that halt the pipeline. The display layer never sees partial
/// output when one of these is returned.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("no data found in {table} table")]
    EmptySource { table: Table },

    #[error("{table} table is missing required column '{column}'")]
    MissingColumn { table: Table, column: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for the "no data" family (source down or empty)
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable(_) | PipelineError::EmptySource { .. }
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
