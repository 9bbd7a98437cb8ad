// ✅ Data Quality - row-level problems that drop a record but never halt the pipeline
//
// Every dropped row becomes a QualityIssue. Issues travel next to the
// output so callers can surface them; they are also logged as warnings.

use crate::error::Table;
use crate::records::LocationKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// ISSUE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Branch Name or Pub Name is blank
    MissingKey,

    /// Timestamp cell could not be parsed
    InvalidTimestamp,

    /// Latitude/Longitude is not a number
    InvalidCoordinate,

    /// Latitude/Longitude parsed but lies outside the globe
    CoordinateOutOfRange,

    /// Same (branch, pub) key appears more than once in the coordinate table
    DuplicateCoordinate,
}

impl IssueKind {
    pub fn name(&self) -> &str {
        match self {
            IssueKind::MissingKey => "missing key",
            IssueKind::InvalidTimestamp => "invalid timestamp",
            IssueKind::InvalidCoordinate => "invalid coordinate",
            IssueKind::CoordinateOutOfRange => "coordinate out of range",
            IssueKind::DuplicateCoordinate => "duplicate coordinate",
        }
    }
}

// ============================================================================
// QUALITY ISSUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub table: Table,

    /// 1-based sheet row; the header is row 1
    pub row: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<LocationKey>,

    pub kind: IssueKind,
    pub detail: String,
}

impl QualityIssue {
    pub fn new(
        table: Table,
        row: usize,
        key: Option<LocationKey>,
        kind: IssueKind,
        detail: &str,
    ) -> Self {
        QualityIssue {
            table,
            row,
            key,
            kind,
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}: {}", self.table, self.row, self.kind.name())?;
        if let Some(key) = &self.key {
            write!(f, " [{}]", key)?;
        }
        write!(f, " - {}", self.detail)
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityReport {
    pub total_issues: usize,
    pub by_kind: BTreeMap<IssueKind, usize>,
    pub by_table: BTreeMap<Table, usize>,
}

impl QualityReport {
    pub fn from_issues(issues: &[QualityIssue]) -> Self {
        let mut report = QualityReport {
            total_issues: issues.len(),
            ..Default::default()
        };

        for issue in issues {
            *report.by_kind.entry(issue.kind).or_insert(0) += 1;
            *report.by_table.entry(issue.table).or_insert(0) += 1;
        }

        report
    }

    pub fn is_clean(&self) -> bool {
        self.total_issues == 0
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        if self.is_clean() {
            return "no data-quality issues".to_string();
        }

        let parts: Vec<String> = self
            .by_kind
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind.name()))
            .collect();
        format!("{} dropped rows ({})", self.total_issues, parts.join(", "))
    }
}

/// Log each issue. `replayed` issues (from a cached load) go to debug so a
/// warm cache does not repeat the same warnings on every request.
pub fn report_issues(issues: &[QualityIssue], replayed: bool) {
    for issue in issues {
        if replayed {
            tracing::debug!(table = %issue.table, row = issue.row, kind = issue.kind.name(), "{}", issue.detail);
        } else {
            tracing::warn!(table = %issue.table, row = issue.row, kind = issue.kind.name(), "dropped row: {}", issue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn issue(table: Table, kind: IssueKind) -> QualityIssue {
        QualityIssue::new(table, 3, Some(LocationKey::new("X", "A")), kind, "test")
    }

    #[test]
    fn test_report_counts() {
        let issues = vec![
            issue(Table::Coordinates, IssueKind::InvalidCoordinate),
            issue(Table::Coordinates, IssueKind::InvalidCoordinate),
            issue(Table::Branches, IssueKind::InvalidTimestamp),
        ];

        let report = QualityReport::from_issues(&issues);
        assert_eq!(report.total_issues, 3);
        assert_eq!(report.count(IssueKind::InvalidCoordinate), 2);
        assert_eq!(report.count(IssueKind::DuplicateCoordinate), 0);
        assert_eq!(report.by_table.get(&Table::Branches), Some(&1));
        assert_eq!(
            report.summary(),
            "3 dropped rows (1 invalid timestamp, 2 invalid coordinate)"
        );
    }

    #[test]
    fn test_clean_report() {
        let report = QualityReport::from_issues(&[]);
        assert!(report.is_clean());
        assert_eq!(report.summary(), "no data-quality issues");
    }

    /// Log sink shared between the subscriber and the assertions
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged(issues: &[QualityIssue], replayed: bool) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || report_issues(issues, replayed));

        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_fresh_issues_logged_as_warnings() {
        let issues = vec![
            issue(Table::Coordinates, IssueKind::InvalidCoordinate),
            issue(Table::Branches, IssueKind::InvalidTimestamp),
        ];

        let log = logged(&issues, false);
        assert_eq!(log.matches("WARN").count(), 2, "{}", log);
        assert!(log.contains("dropped row: coordinates row 3"));
        assert!(!log.contains("DEBUG"));
    }

    #[test]
    fn test_replayed_issues_logged_at_debug() {
        let issues = vec![issue(Table::Coordinates, IssueKind::DuplicateCoordinate)];

        let log = logged(&issues, true);
        assert_eq!(log.matches("DEBUG").count(), 1, "{}", log);
        assert!(!log.contains("WARN"));
    }

    #[test]
    fn test_no_issues_logs_nothing() {
        assert!(logged(&[], false).is_empty());
    }

    #[test]
    fn test_issue_display() {
        let text = issue(Table::Coordinates, IssueKind::DuplicateCoordinate).to_string();
        assert_eq!(text, "coordinates row 3: duplicate coordinate [X @ A] - test");
    }
}
