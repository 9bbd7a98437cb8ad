// ⚖️ Reconciliation - join branches with coordinates, keep the latest submission
//
// Pipeline (pure, deterministic):
//   1. index coordinates by (branch, pub), rejecting out-of-range and duplicate rows
//   2. inner join branch rows against that index
//   3. collapse each key to its most recent submission
//   4. sort by (pub state, pub city) so display grouping is a plain partition

use crate::data_quality::{IssueKind, QualityIssue, QualityReport};
use crate::deduplication::{latest_per_key, superseded_count};
use crate::error::Table;
use crate::records::{BranchRecord, CoordinateRecord, LocationKey};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

// ============================================================================
// RECONCILED LOCATION
// ============================================================================

/// One branch/pub pair ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledLocation {
    #[serde(flatten)]
    pub branch: BranchRecord,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReconciledLocation {
    pub fn key(&self) -> LocationKey {
        self.branch.key()
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileStats {
    pub branch_rows: usize,
    pub coordinate_rows: usize,

    /// Branch rows that found a coordinate (before dedup)
    pub matched_rows: usize,

    /// Older submissions discarded by dedup
    pub superseded_rows: usize,

    /// Keys present only in the branch table
    pub unmatched_branch_keys: usize,

    /// Keys present only in the coordinate table
    pub unmatched_coordinate_keys: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub locations: Vec<ReconciledLocation>,
    pub issues: Vec<QualityIssue>,
    pub stats: ReconcileStats,
}

impl ReconciliationReport {
    pub fn quality(&self) -> QualityReport {
        QualityReport::from_issues(&self.issues)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} locations from {} branch rows and {} coordinate rows ({} superseded, {} without coordinates, {} coordinates unused, {})",
            self.locations.len(),
            self.stats.branch_rows,
            self.stats.coordinate_rows,
            self.stats.superseded_rows,
            self.stats.unmatched_branch_keys,
            self.stats.unmatched_coordinate_keys,
            self.quality().summary()
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// Join, dedup and sort. See `reconcile_with_report` for the dropped rows.
pub fn reconcile(
    branches: &[BranchRecord],
    coordinates: &[CoordinateRecord],
) -> Vec<ReconciledLocation> {
    reconcile_with_report(branches, coordinates).locations
}

pub fn reconcile_with_report(
    branches: &[BranchRecord],
    coordinates: &[CoordinateRecord],
) -> ReconciliationReport {
    let mut issues = Vec::new();
    let index = index_coordinates(coordinates, &mut issues);

    let mut matched_keys = BTreeSet::new();
    let mut unmatched_branch_keys = BTreeSet::new();
    let mut joined = Vec::new();

    for branch in branches {
        let key = branch.key();
        match index.get(&key) {
            Some(coord) => {
                joined.push(ReconciledLocation {
                    branch: branch.clone(),
                    latitude: coord.latitude,
                    longitude: coord.longitude,
                });
                matched_keys.insert(key);
            }
            None => {
                unmatched_branch_keys.insert(key);
            }
        }
    }

    let matched_rows = joined.len();
    let mut locations = latest_per_key(joined, |loc| loc.key(), |loc| loc.branch.submitted_at);

    // Stable: ties keep key order from dedup
    locations.sort_by(|a, b| {
        a.branch
            .pub_state
            .cmp(&b.branch.pub_state)
            .then_with(|| a.branch.pub_city.cmp(&b.branch.pub_city))
    });

    let unmatched_coordinate_keys = index
        .keys()
        .filter(|key| !matched_keys.contains(*key))
        .count();

    let stats = ReconcileStats {
        branch_rows: branches.len(),
        coordinate_rows: coordinates.len(),
        matched_rows,
        superseded_rows: superseded_count(matched_rows, locations.len()),
        unmatched_branch_keys: unmatched_branch_keys.len(),
        unmatched_coordinate_keys,
    };

    ReconciliationReport {
        locations,
        issues,
        stats,
    }
}

/// Build the key → coordinate index. The first row for a key wins; later
/// rows for the same key are reported instead of cross-joined.
fn index_coordinates<'a>(
    coordinates: &'a [CoordinateRecord],
    issues: &mut Vec<QualityIssue>,
) -> HashMap<LocationKey, &'a CoordinateRecord> {
    let mut index: HashMap<LocationKey, &CoordinateRecord> = HashMap::new();

    for coord in coordinates {
        let key = coord.key();

        if !in_range(coord) {
            issues.push(QualityIssue::new(
                Table::Coordinates,
                coord.source_row,
                Some(key),
                IssueKind::CoordinateOutOfRange,
                &format!("({}, {}) is not a valid position", coord.latitude, coord.longitude),
            ));
            continue;
        }

        if let Some(first) = index.get(&key) {
            issues.push(QualityIssue::new(
                Table::Coordinates,
                coord.source_row,
                Some(key),
                IssueKind::DuplicateCoordinate,
                &format!("key already mapped by row {}; row ignored", first.source_row),
            ));
            continue;
        }

        index.insert(key, coord);
    }

    index
}

fn in_range(coord: &CoordinateRecord) -> bool {
    coord.latitude.is_finite()
        && coord.longitude.is_finite()
        && coord.latitude.abs() <= 90.0
        && coord.longitude.abs() <= 180.0
}

// ============================================================================
// TESTS
// ============================================================================
