// 📡 Tabular Sources - where the raw branch and coordinate tables come from
//
// A source answers "give me the rows for this range" with rows-of-strings,
// header first. Two implementations: the Google Sheets values API and
// plain CSV files on disk.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("branch-locator/", env!("CARGO_PKG_VERSION"));

/// Raw rows, header first
pub type RawRows = Vec<Vec<String>>;

// ============================================================================
// SOURCE TRAIT
// ============================================================================

pub trait TabularSource: Send {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Fetch one range. An absent or blank range is `Ok(vec![])`, not an error.
    fn fetch_range(&self, range: &str) -> Result<RawRows>;
}

// ============================================================================
// GOOGLE SHEETS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    /// OAuth access token sent as `Authorization: Bearer`
    AccessToken(String),
    /// API key sent as the `key` query parameter (public sheets only)
    ApiKey(String),
}

/// `spreadsheets.values.get` response body
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetsSource {
    base_url: String,
    spreadsheet_id: String,
    credential: Credential,
    timeout: Duration,
}

impl SheetsSource {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        credential: Credential,
        timeout: Duration,
    ) -> Self {
        SheetsSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            credential,
            timeout,
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    // Built per fetch: a blocking client must not be created or dropped
    // on an async runtime thread, and fetches only happen on cache misses.
    fn client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")
    }
}

impl TabularSource for SheetsSource {
    fn name(&self) -> &str {
        "google-sheets"
    }

    fn fetch_range(&self, range: &str) -> Result<RawRows> {
        let client = self.client()?;
        let mut request = client.get(self.values_url(range));
        request = match &self.credential {
            Credential::AccessToken(token) => request.bearer_auth(token),
            Credential::ApiKey(key) => request.query(&[("key", key.as_str())]),
        };

        tracing::debug!(range, spreadsheet = %self.spreadsheet_id, "fetching sheet range");
        let resp = request
            .send()
            .with_context(|| format!("Request for range '{}' failed", range))?;

        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("no error message")
                .to_string();
            return Err(anyhow!(
                "Sheets API returned {} for range '{}': {}",
                status.as_u16(),
                range,
                message
            ));
        }

        let body: ValueRange = resp
            .json()
            .with_context(|| format!("Malformed response for range '{}'", range))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// CSV FILES
// ============================================================================

/// Reads `dir/<range>` as a CSV file; the first record is the header row
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: &Path) -> Self {
        CsvSource {
            dir: dir.to_path_buf(),
        }
    }
}

impl TabularSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_range(&self, range: &str) -> Result<RawRows> {
        let path = self.dir.join(range);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "CSV range not found");
            return Ok(Vec::new());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.with_context(|| format!("Failed to read {}", path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(rows)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;

    fn sheets(server: &MockServer, credential: Credential) -> SheetsSource {
        SheetsSource::new(&server.base_url(), "sheet-123", credential, Duration::from_secs(5))
    }

    #[test]
    fn test_sheets_fetch_with_api_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/sheet-123/values/Branches")
                .query_param("key", "test-key");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "range": "Branches!A1:C3",
                    "majorDimension": "ROWS",
                    "values": [
                        ["Timestamp", "Branch Name", "Pub Name"],
                        ["9/14/2021 13:45:12", "Austin", "Lucky Lizard"],
                        [44453.5, "Denver", true]
                    ]
                }));
        });

        let source = sheets(&server, Credential::ApiKey("test-key".into()));
        let rows = source.fetch_range("Branches").unwrap();

        mock.assert();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["Timestamp", "Branch Name", "Pub Name"]);
        assert_eq!(rows[2], vec!["44453.5", "Denver", "true"]);
    }

    #[test]
    fn test_sheets_fetch_with_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/sheet-123/values/Coordinates")
                .header("Authorization", "Bearer token-abc");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "values": [["Branch Name", "Pub Name", "Latitude", "Longitude"]]
                }));
        });

        let source = sheets(&server, Credential::AccessToken("token-abc".into()));
        let rows = source.fetch_range("Coordinates").unwrap();

        mock.assert();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_sheets_missing_values_is_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sheet-123/values/Empty");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "range": "Empty!A1:Z1000", "majorDimension": "ROWS" }));
        });

        let source = sheets(&server, Credential::ApiKey("k".into()));
        assert!(source.fetch_range("Empty").unwrap().is_empty());
    }

    #[test]
    fn test_sheets_error_status_carries_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sheet-123/values/Branches");
            then.status(403)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "error": { "code": 403, "message": "The caller does not have permission" }
                }));
        });

        let source = sheets(&server, Credential::ApiKey("k".into()));
        let err = source.fetch_range("Branches").unwrap_err().to_string();
        assert!(err.contains("403"), "{}", err);
        assert!(err.contains("does not have permission"), "{}", err);
    }

    #[test]
    fn test_values_url_encodes_range() {
        let source = SheetsSource::new(
            "https://sheets.example.com/",
            "abc",
            Credential::ApiKey("k".into()),
            Duration::from_secs(1),
        );
        assert_eq!(
            source.values_url("FormResponses!A:Y"),
            "https://sheets.example.com/v4/spreadsheets/abc/values/FormResponses%21A%3AY"
        );
    }

    #[test]
    fn test_csv_source_reads_header_and_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("coords.csv")).unwrap();
        writeln!(file, "Branch Name,Pub Name,Latitude,Longitude,Notes").unwrap();
        writeln!(file, "Austin,\"Lucky Lizard, Downtown\",30.26,-97.74").unwrap();

        let source = CsvSource::new(dir.path());
        let rows = source.fetch_range("coords.csv").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 5);
        assert_eq!(rows[1], vec!["Austin", "Lucky Lizard, Downtown", "30.26", "-97.74"]);
    }

    #[test]
    fn test_csv_source_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvSource::new(dir.path());
        assert!(source.fetch_range("nope.csv").unwrap().is_empty());
    }
}
