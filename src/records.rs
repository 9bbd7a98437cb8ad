// 🧾 Typed Records - header-driven parsing of raw sheet rows
// Raw tables are rows-of-strings with the header first; each row is
// validated against the expected column names and parsed into a typed record.

use crate::data_quality::{IssueKind, QualityIssue};
use crate::error::{PipelineError, PipelineResult, Table};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// COLUMN NAMES
// ============================================================================

pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_BRANCH_NAME: &str = "Branch Name";
pub const COL_PUB_NAME: &str = "Pub Name";
pub const COL_PUB_ADDRESS_1: &str = "Pub Address 1";
pub const COL_PUB_CITY: &str = "Pub City";
pub const COL_PUB_STATE: &str = "Pub State";
pub const COL_PUB_ZIP_CODE: &str = "Pub ZIP Code";
pub const COL_FACEBOOK: &str = "Branch Facebook Page";
pub const COL_TWITTER: &str = "Branch Twitter Handle";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_LONGITUDE: &str = "Longitude";

/// Branch columns that map onto named record fields; everything else goes to `extra`
const BRANCH_KNOWN_COLUMNS: [&str; 9] = [
    COL_TIMESTAMP,
    COL_BRANCH_NAME,
    COL_PUB_NAME,
    COL_PUB_ADDRESS_1,
    COL_PUB_CITY,
    COL_PUB_STATE,
    COL_PUB_ZIP_CODE,
    COL_FACEBOOK,
    COL_TWITTER,
];

// ============================================================================
// COMPOSITE KEY
// ============================================================================

/// (branch name, pub name) - identifies a location across both tables
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocationKey {
    pub branch_name: String,
    pub pub_name: String,
}

impl LocationKey {
    pub fn new(branch_name: &str, pub_name: &str) -> Self {
        LocationKey {
            branch_name: branch_name.to_string(),
            pub_name: pub_name.to_string(),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.branch_name, self.pub_name)
    }
}

// ============================================================================
// BRANCH RECORD
// ============================================================================

/// One form submission describing a branch and the pub it meets at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchRecord {
    pub branch_name: String,
    pub pub_name: String,
    pub pub_address1: String,
    pub pub_city: String,
    pub pub_state: String,
    pub pub_zip_code: String,
    pub branch_facebook_page: Option<String>,
    pub branch_twitter_handle: Option<String>,

    /// Form submission time, used for recency ordering
    pub submitted_at: NaiveDateTime,

    /// Unrecognised form columns, carried through unmodified
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,

    /// 1-based sheet row (header is row 1)
    #[serde(skip)]
    pub source_row: usize,
}

impl BranchRecord {
    /// Create a record with the required fields; location fields start blank
    pub fn new(branch_name: &str, pub_name: &str, submitted_at: NaiveDateTime) -> Self {
        BranchRecord {
            branch_name: branch_name.to_string(),
            pub_name: pub_name.to_string(),
            pub_address1: String::new(),
            pub_city: String::new(),
            pub_state: String::new(),
            pub_zip_code: String::new(),
            branch_facebook_page: None,
            branch_twitter_handle: None,
            submitted_at,
            extra: BTreeMap::new(),
            source_row: 0,
        }
    }

    /// Builder pattern: city and state (state is normalized, see `normalize_state`)
    pub fn with_location(mut self, city: &str, state: &str) -> Self {
        self.pub_city = city.to_string();
        self.pub_state = normalize_state(state);
        self
    }

    /// Builder pattern: street address and ZIP code
    pub fn with_address(mut self, address1: &str, zip_code: &str) -> Self {
        self.pub_address1 = address1.to_string();
        self.pub_zip_code = zip_code.to_string();
        self
    }

    /// Builder pattern: social links as stored in the sheet
    pub fn with_social(mut self, facebook: Option<&str>, twitter: Option<&str>) -> Self {
        self.branch_facebook_page = facebook.map(str::to_string);
        self.branch_twitter_handle = twitter.map(str::to_string);
        self
    }

    pub fn with_source_row(mut self, row: usize) -> Self {
        self.source_row = row;
        self
    }

    pub fn key(&self) -> LocationKey {
        LocationKey::new(&self.branch_name, &self.pub_name)
    }
}

// ============================================================================
// COORDINATE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateRecord {
    pub branch_name: String,
    pub pub_name: String,
    pub latitude: f64,
    pub longitude: f64,

    #[serde(skip)]
    pub source_row: usize,
}

impl CoordinateRecord {
    pub fn new(branch_name: &str, pub_name: &str, latitude: f64, longitude: f64) -> Self {
        CoordinateRecord {
            branch_name: branch_name.to_string(),
            pub_name: pub_name.to_string(),
            latitude,
            longitude,
            source_row: 0,
        }
    }

    pub fn with_source_row(mut self, row: usize) -> Self {
        self.source_row = row;
        self
    }

    pub fn key(&self) -> LocationKey {
        LocationKey::new(&self.branch_name, &self.pub_name)
    }
}

// ============================================================================
// HEADER INDEX
// ============================================================================

/// Column name → position lookup for one raw table
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    table: Table,
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(table: Table, header: &[String]) -> Self {
        let names: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
        let mut positions = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            if !name.is_empty() {
                // First occurrence wins on duplicated headers
                positions.entry(name.clone()).or_insert(i);
            }
        }

        HeaderIndex {
            table,
            names,
            positions,
        }
    }

    pub fn find(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn require(&self, column: &str) -> PipelineResult<usize> {
        self.find(column).ok_or_else(|| PipelineError::MissingColumn {
            table: self.table,
            column: column.to_string(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Trimmed cell value; Sheets drops trailing blank cells, so short rows read as blank
/// States are grouped, sorted and filtered by this form: trimmed, ASCII uppercase
pub fn normalize_state(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or("")
}

fn optional_cell(row: &[String], idx: Option<usize>) -> Option<String> {
    idx.map(|i| cell(row, i))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

// ============================================================================
// PARSED TABLE
// ============================================================================

/// Records that passed validation plus the rows that were dropped
#[derive(Debug, Clone)]
pub struct ParsedTable<T> {
    pub records: Vec<T>,
    pub issues: Vec<QualityIssue>,
}

/// Parse the raw branch table (header row first)
pub fn parse_branches(rows: &[Vec<String>]) -> PipelineResult<ParsedTable<BranchRecord>> {
    let (header, body) = rows
        .split_first()
        .ok_or(PipelineError::EmptySource { table: Table::Branches })?;
    let index = HeaderIndex::new(Table::Branches, header);

    let ts_col = index.require(COL_TIMESTAMP)?;
    let branch_col = index.require(COL_BRANCH_NAME)?;
    let pub_col = index.require(COL_PUB_NAME)?;
    let address_col = index.find(COL_PUB_ADDRESS_1);
    let city_col = index.find(COL_PUB_CITY);
    let state_col = index.find(COL_PUB_STATE);
    let zip_col = index.find(COL_PUB_ZIP_CODE);
    let facebook_col = index.find(COL_FACEBOOK);
    let twitter_col = index.find(COL_TWITTER);

    let extra_cols: Vec<(usize, &String)> = index
        .names()
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            !name.is_empty()
                && !BRANCH_KNOWN_COLUMNS.contains(&name.as_str())
                && index.find(name) == Some(*i)
        })
        .collect();

    let mut records = Vec::new();
    let mut issues = Vec::new();

    for (offset, row) in body.iter().enumerate() {
        let sheet_row = offset + 2;
        if is_blank_row(row) {
            continue;
        }

        let branch_name = cell(row, branch_col);
        let pub_name = cell(row, pub_col);
        if branch_name.is_empty() || pub_name.is_empty() {
            issues.push(QualityIssue::new(
                Table::Branches,
                sheet_row,
                None,
                IssueKind::MissingKey,
                "Branch Name and Pub Name are both required",
            ));
            continue;
        }
        let key = LocationKey::new(branch_name, pub_name);

        let raw_ts = cell(row, ts_col);
        let submitted_at = match parse_timestamp(raw_ts) {
            Some(ts) => ts,
            None => {
                issues.push(QualityIssue::new(
                    Table::Branches,
                    sheet_row,
                    Some(key),
                    IssueKind::InvalidTimestamp,
                    &format!("cannot parse timestamp '{}'", raw_ts),
                ));
                continue;
            }
        };

        let mut record = BranchRecord::new(branch_name, pub_name, submitted_at)
            .with_source_row(sheet_row);
        let read = |col: Option<usize>| col.map(|i| cell(row, i).to_string()).unwrap_or_default();
        record.pub_address1 = read(address_col);
        record.pub_city = read(city_col);
        record.pub_state = normalize_state(&read(state_col));
        record.pub_zip_code = read(zip_col);
        record.branch_facebook_page = optional_cell(row, facebook_col);
        record.branch_twitter_handle = optional_cell(row, twitter_col);
        record.extra = extra_cols
            .iter()
            .map(|(i, name)| ((*name).clone(), cell(row, *i).to_string()))
            .collect();

        records.push(record);
    }

    Ok(ParsedTable { records, issues })
}

/// Parse the raw coordinate table (header row first)
pub fn parse_coordinates(rows: &[Vec<String>]) -> PipelineResult<ParsedTable<CoordinateRecord>> {
    let (header, body) = rows
        .split_first()
        .ok_or(PipelineError::EmptySource { table: Table::Coordinates })?;
    let index = HeaderIndex::new(Table::Coordinates, header);

    let branch_col = index.require(COL_BRANCH_NAME)?;
    let pub_col = index.require(COL_PUB_NAME)?;
    let lat_col = index.require(COL_LATITUDE)?;
    let lon_col = index.require(COL_LONGITUDE)?;

    let mut records = Vec::new();
    let mut issues = Vec::new();

    for (offset, row) in body.iter().enumerate() {
        let sheet_row = offset + 2;
        if is_blank_row(row) {
            continue;
        }

        let branch_name = cell(row, branch_col);
        let pub_name = cell(row, pub_col);
        if branch_name.is_empty() || pub_name.is_empty() {
            issues.push(QualityIssue::new(
                Table::Coordinates,
                sheet_row,
                None,
                IssueKind::MissingKey,
                "Branch Name and Pub Name are both required",
            ));
            continue;
        }
        let key = LocationKey::new(branch_name, pub_name);

        let raw_lat = cell(row, lat_col);
        let raw_lon = cell(row, lon_col);
        match (parse_degrees(raw_lat), parse_degrees(raw_lon)) {
            (Some(latitude), Some(longitude)) => {
                records.push(
                    CoordinateRecord::new(branch_name, pub_name, latitude, longitude)
                        .with_source_row(sheet_row),
                );
            }
            _ => {
                issues.push(QualityIssue::new(
                    Table::Coordinates,
                    sheet_row,
                    Some(key),
                    IssueKind::InvalidCoordinate,
                    &format!("non-numeric coordinate ('{}', '{}')", raw_lat, raw_lon),
                ));
            }
        }
    }

    Ok(ParsedTable { records, issues })
}

fn parse_degrees(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Parse a submission timestamp.
///
/// Accepts Google Forms (`9/14/2021 13:45:12`), ISO (`2021-09-14 13:45:12`),
/// RFC 3339, bare dates (`9/14/2021`) and spreadsheet serial numbers
/// (days since 1899-12-30, fraction = time of day).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in ["%m/%d/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }

    for fmt in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    parse_serial_date(raw)
}

fn parse_serial_date(raw: &str) -> Option<NaiveDateTime> {
    let serial: f64 = raw.parse().ok()?;
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        // 2958465 = 9999-12-31
        return None;
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

// ============================================================================
// TESTS
// ============================================================================
