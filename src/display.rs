// 🗺️ Display Shaping - turn reconciled locations into what a map/listing shows
//
// Everything here is a pure function over the reconciler's canonical order
// (state, city). Rendering itself happens behind the DisplaySurface trait.

use crate::reconciliation::ReconciledLocation;
use crate::records::BranchRecord;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;

// ============================================================================
// VIEWPORT
// ============================================================================

/// Geographic center of the contiguous United States
pub const CONTINENTAL_LATITUDE: f64 = 39.8283;
pub const CONTINENTAL_LONGITUDE: f64 = -98.5795;
pub const MIN_ZOOM: u8 = 3;
pub const MAX_ZOOM: u8 = 12;

pub const MAPS_SEARCH_PREFIX: &str = "https://www.google.com/maps/search/?api=1&query=";
pub const FACEBOOK_PREFIX: &str = "https://www.facebook.com/";
pub const TWITTER_PREFIX: &str = "https://twitter.com/";

/// Map viewport hint: center + zoom
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingView {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: u8,
}

impl BoundingView {
    /// Whole-country overview used when nothing is filtered
    pub fn continental() -> Self {
        BoundingView {
            latitude: CONTINENTAL_LATITUDE,
            longitude: CONTINENTAL_LONGITUDE,
            zoom: MIN_ZOOM,
        }
    }
}

/// Viewport covering a subset of locations.
///
/// Center is (max latitude, midpoint of the longitude range). Zoom grows as
/// the wider of the longitude span and twice the latitude span shrinks.
/// `None` for an empty subset.
pub fn bounding_view(locations: &[ReconciledLocation]) -> Option<BoundingView> {
    let first = locations.first()?;

    let (mut min_lat, mut max_lat) = (first.latitude, first.latitude);
    let (mut min_lon, mut max_lon) = (first.longitude, first.longitude);
    for loc in &locations[1..] {
        min_lat = min_lat.min(loc.latitude);
        max_lat = max_lat.max(loc.latitude);
        min_lon = min_lon.min(loc.longitude);
        max_lon = max_lon.max(loc.longitude);
    }

    let span = (max_lon - min_lon).max((max_lat - min_lat) * 2.0);
    let zoom = if span <= f64::EPSILON {
        MAX_ZOOM
    } else {
        (360.0 / span)
            .log2()
            .floor()
            .clamp(MIN_ZOOM as f64, MAX_ZOOM as f64) as u8
    };

    Some(BoundingView {
        latitude: max_lat,
        longitude: (min_lon + max_lon) / 2.0,
        zoom,
    })
}

// ============================================================================
// FILTERING & GROUPING
// ============================================================================

/// Locations in one state (trimmed, case-insensitive); `None` keeps everything
pub fn filter_by_state(
    locations: &[ReconciledLocation],
    state: Option<&str>,
) -> Vec<ReconciledLocation> {
    match state.map(str::trim).filter(|s| !s.is_empty()) {
        None => locations.to_vec(),
        Some(state) => locations
            .iter()
            .filter(|loc| loc.branch.pub_state.trim().eq_ignore_ascii_case(state))
            .cloned()
            .collect(),
    }
}

/// Distinct, non-blank states in first-seen order (sorted when given
/// canonical order). Blank states cannot be selected by a filter.
pub fn states(locations: &[ReconciledLocation]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for loc in locations {
        if !loc.branch.pub_state.trim().is_empty() && !out.contains(&loc.branch.pub_state) {
            out.push(loc.branch.pub_state.clone());
        }
    }
    out
}

/// Split into fixed-size chunks; the last chunk may be shorter. Size 0 acts as 1.
pub fn chunked<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Links {
    pub map: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
}

impl Links {
    pub fn for_branch(branch: &BranchRecord) -> Self {
        Links {
            map: maps_search_url(branch),
            facebook: facebook_url(branch.branch_facebook_page.as_deref()),
            twitter: twitter_url(branch.branch_twitter_handle.as_deref()),
        }
    }
}

/// One row of the per-state listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationEntry {
    pub branch_name: String,
    pub pub_name: String,
    pub pub_city: String,
    pub pub_state: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub links: Links,
}

impl LocationEntry {
    pub fn from_location(loc: &ReconciledLocation) -> Self {
        let b = &loc.branch;
        LocationEntry {
            branch_name: b.branch_name.clone(),
            pub_name: b.pub_name.clone(),
            pub_city: b.pub_city.clone(),
            pub_state: b.pub_state.clone(),
            address: format_address(b),
            latitude: loc.latitude,
            longitude: loc.longitude,
            links: Links::for_branch(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateGroup {
    pub state: String,
    /// Ordered by (branch name, pub city)
    pub entries: Vec<LocationEntry>,
}

impl StateGroup {
    pub fn label(&self) -> &str {
        if self.state.trim().is_empty() {
            "Unknown"
        } else {
            &self.state
        }
    }

    /// Distinct cities in this state, sorted
    pub fn cities(&self) -> Vec<String> {
        let mut cities: Vec<String> = self.entries.iter().map(|e| e.pub_city.clone()).collect();
        cities.sort();
        cities.dedup();
        cities
    }
}

/// Partition canonical-order locations into per-state groups.
///
/// Input must already be ordered by state (the reconciler guarantees it),
/// so this is a single pass, not a re-sort of the whole sequence.
pub fn group_by_state(locations: &[ReconciledLocation]) -> Vec<StateGroup> {
    let mut groups: Vec<StateGroup> = Vec::new();

    for loc in locations {
        let entry = LocationEntry::from_location(loc);
        match groups.last_mut() {
            Some(group) if group.state == loc.branch.pub_state => group.entries.push(entry),
            _ => groups.push(StateGroup {
                state: loc.branch.pub_state.clone(),
                entries: vec![entry],
            }),
        }
    }

    for group in &mut groups {
        group.entries.sort_by(|a, b| {
            a.branch_name
                .cmp(&b.branch_name)
                .then_with(|| a.pub_city.cmp(&b.pub_city))
        });
    }

    groups
}

// ============================================================================
// LINKS
// ============================================================================

fn format_address(branch: &BranchRecord) -> String {
    let state_zip = [branch.pub_state.trim(), branch.pub_zip_code.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    [branch.pub_address1.trim(), branch.pub_city.trim(), state_zip.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Google Maps search link built from the pub name and address fields
pub fn maps_search_url(branch: &BranchRecord) -> String {
    let address = format_address(branch);
    let query = if address.is_empty() {
        branch.pub_name.trim().to_string()
    } else {
        format!("{}, {}", branch.pub_name.trim(), address)
    };
    format!("{}{}", MAPS_SEARCH_PREFIX, urlencoding::encode(&query))
}

pub fn facebook_url(stored: Option<&str>) -> Option<String> {
    social_url(stored, FACEBOOK_PREFIX, &["facebook.com/", "fb.com/"])
}

pub fn twitter_url(stored: Option<&str>) -> Option<String> {
    social_url(stored, TWITTER_PREFIX, &["twitter.com/", "x.com/"])
}

/// Full URLs and bare domains must parse as http(s) and carry no markup
/// characters; handles are percent-encoded segment by segment under `prefix`.
fn social_url(stored: Option<&str>, prefix: &str, domains: &[&str]) -> Option<String> {
    let raw = stored?.trim();
    if raw.is_empty() {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return checked_url(raw);
    }

    let bare = lower.strip_prefix("www.").unwrap_or(&lower);
    if domains.iter().any(|d| bare.starts_with(d)) {
        return checked_url(&format!("https://{}", raw));
    }

    let handle = raw.trim_start_matches(['@', '/']);
    if handle.is_empty() {
        return None;
    }
    let path = handle
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Some(format!("{}{}", prefix, path))
}

fn checked_url(candidate: &str) -> Option<String> {
    if candidate
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | '`'))
    {
        return None;
    }

    let url = reqwest::Url::parse(candidate).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url.to_string()),
        _ => None,
    }
}

// ============================================================================
// MAP VIEW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

/// Everything a display surface needs for one render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_filter: Option<String>,
    pub viewport: BoundingView,
    pub markers: Vec<Marker>,
    pub groups: Vec<StateGroup>,

    /// Every state with at least one location, for filter pickers
    pub states: Vec<String>,
}

impl MapView {
    pub fn build(locations: &[ReconciledLocation], state_filter: Option<&str>) -> Self {
        let state_filter = state_filter
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let visible = filter_by_state(locations, state_filter.as_deref());

        // Filtered to one state → zoom to it; empty result falls back to the overview
        let viewport = match &state_filter {
            Some(_) => bounding_view(&visible).unwrap_or_else(BoundingView::continental),
            None => BoundingView::continental(),
        };

        let markers = visible
            .iter()
            .map(|loc| Marker {
                latitude: loc.latitude,
                longitude: loc.longitude,
                label: format!("{} @ {}", loc.branch.branch_name, loc.branch.pub_name),
            })
            .collect();

        MapView {
            state_filter,
            viewport,
            markers,
            groups: group_by_state(&visible),
            states: states(locations),
        }
    }

    pub fn location_count(&self) -> usize {
        self.markers.len()
    }
}

// ============================================================================
// DISPLAY SURFACES
// ============================================================================

pub trait DisplaySurface {
    fn render(&mut self, view: &MapView) -> Result<()>;
}

/// Plain-text listing: one block per state, entries two to a line
pub struct TextSurface<W: Write> {
    out: W,
    column_width: usize,
}

impl<W: Write> TextSurface<W> {
    pub fn new(out: W) -> Self {
        TextSurface {
            out,
            column_width: 44,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySurface for TextSurface<W> {
    fn render(&mut self, view: &MapView) -> Result<()> {
        writeln!(
            self.out,
            "🗺️  {} locations | center ({:.4}, {:.4}) zoom {}",
            view.location_count(),
            view.viewport.latitude,
            view.viewport.longitude,
            view.viewport.zoom
        )?;

        for group in &view.groups {
            writeln!(self.out)?;
            writeln!(
                self.out,
                "▸ {} ({}) - {}",
                group.label(),
                group.entries.len(),
                group.cities().join(", ")
            )?;

            for pair in chunked(&group.entries, 2) {
                let cells: Vec<String> = pair
                    .iter()
                    .map(|e| {
                        let text = format!("{} @ {} ({})", e.branch_name, e.pub_name, e.pub_city);
                        format!("{:<width$}", truncate(&text, self.column_width), width = self.column_width)
                    })
                    .collect();
                writeln!(self.out, "  {}", cells.join("  ").trim_end())?;
            }
        }

        self.out.flush()?;
        Ok(())
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn loc(branch: &str, pub_name: &str, city: &str, state: &str, lat: f64, lon: f64) -> ReconciledLocation {
        let ts = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        ReconciledLocation {
            branch: BranchRecord::new(branch, pub_name, ts).with_location(city, state),
            latitude: lat,
            longitude: lon,
        }
    }

    fn sample() -> Vec<ReconciledLocation> {
        // Canonical (state, city) order
        vec![
            loc("Boston", "Phoenix Landing", "Cambridge", "MA", 42.36, -71.10),
            loc("Austin", "Lucky Lizard", "Austin", "TX", 30.27, -97.74),
            loc("Dallas", "Trinity Hall", "Dallas", "TX", 32.78, -96.80),
            loc("Alamo City", "The Lion & Rose", "San Antonio", "TX", 29.42, -98.49),
        ]
    }

    #[test]
    fn test_group_by_state_partitions_and_orders_entries() {
        let groups = group_by_state(&sample());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].state, "MA");
        assert_eq!(groups[1].state, "TX");

        let names: Vec<&str> = groups[1].entries.iter().map(|e| e.branch_name.as_str()).collect();
        assert_eq!(names, vec!["Alamo City", "Austin", "Dallas"]);
        assert_eq!(groups[1].cities(), vec!["Austin", "Dallas", "San Antonio"]);
    }

    #[test]
    fn test_blank_state_label() {
        let groups = group_by_state(&[loc("X", "A", "Nowhere", "", 0.0, 0.0)]);
        assert_eq!(groups[0].label(), "Unknown");
    }

    #[test]
    fn test_filter_by_state() {
        let all = sample();
        assert_eq!(filter_by_state(&all, Some("tx ")).len(), 3);
        assert_eq!(filter_by_state(&all, Some("CA")).len(), 0);
        assert_eq!(filter_by_state(&all, None).len(), 4);
        assert_eq!(filter_by_state(&all, Some("")).len(), 4);
    }

    #[test]
    fn test_states_distinct() {
        assert_eq!(states(&sample()), vec!["MA", "TX"]);
    }

    #[test]
    fn test_chunked() {
        let chunks = chunked(&[1, 2, 3, 4, 5], 2);
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(chunked(&[1, 2], 0), vec![vec![1], vec![2]]);
        assert!(chunked::<u8>(&[], 2).is_empty());
    }

    #[test]
    fn test_bounding_view_center_and_zoom() {
        let texas = filter_by_state(&sample(), Some("TX"));
        let view = bounding_view(&texas).unwrap();

        assert_eq!(view.latitude, 32.78);
        assert!((view.longitude - (-98.49 + -96.80) / 2.0).abs() < 1e-9);
        // lat span 3.36 * 2 = 6.72 dominates; 360 / 6.72 ≈ 53.6 → 2^5
        assert_eq!(view.zoom, 5);
    }

    #[test]
    fn test_bounding_view_single_point_and_empty() {
        let one = vec![loc("X", "A", "Austin", "TX", 30.0, -97.0)];
        assert_eq!(bounding_view(&one).unwrap().zoom, MAX_ZOOM);
        assert_eq!(bounding_view(&[]), None);
    }

    #[test]
    fn test_map_view_defaults_to_continental() {
        let view = MapView::build(&sample(), None);
        assert_eq!(view.viewport, BoundingView::continental());
        assert_eq!(view.location_count(), 4);
        assert_eq!(view.states, vec!["MA", "TX"]);
    }

    #[test]
    fn test_map_view_filtered_zooms_in() {
        let view = MapView::build(&sample(), Some("MA"));
        assert_eq!(view.state_filter.as_deref(), Some("MA"));
        assert_eq!(view.viewport.zoom, MAX_ZOOM);
        assert_eq!(view.groups.len(), 1);
        // Picker still lists every state
        assert_eq!(view.states.len(), 2);

        let empty = MapView::build(&sample(), Some("ZZ"));
        assert_eq!(empty.viewport, BoundingView::continental());
        assert!(empty.groups.is_empty());
    }

    #[test]
    fn test_maps_search_url() {
        let ts = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let branch = BranchRecord::new("Austin", "Lucky Lizard", ts)
            .with_location("Austin", "TX")
            .with_address("123 Main St", "78701");

        assert_eq!(
            maps_search_url(&branch),
            "https://www.google.com/maps/search/?api=1&query=Lucky%20Lizard%2C%20123%20Main%20St%2C%20Austin%2C%20TX%2078701"
        );
    }

    #[test]
    fn test_social_links() {
        assert_eq!(twitter_url(Some("@AustinGooners")).as_deref(), Some("https://twitter.com/AustinGooners"));
        assert_eq!(twitter_url(Some("twitter.com/foo")).as_deref(), Some("https://twitter.com/foo"));
        assert_eq!(
            facebook_url(Some("https://www.facebook.com/groups/gooners")).as_deref(),
            Some("https://www.facebook.com/groups/gooners")
        );
        assert_eq!(facebook_url(Some("/austingooners")).as_deref(), Some("https://www.facebook.com/austingooners"));
        assert_eq!(facebook_url(Some("www.facebook.com/x")).as_deref(), Some("https://www.facebook.com/x"));
        assert_eq!(facebook_url(Some("   ")), None);
        assert_eq!(twitter_url(Some("@")), None);
        assert_eq!(twitter_url(None), None);
    }

    #[test]
    fn test_social_links_never_carry_markup() {
        let tw = twitter_url(Some("foo\" onmouseover=\"alert(1)")).unwrap();
        assert!(!tw.contains('"') && !tw.contains(' '), "{}", tw);
        assert!(tw.starts_with(TWITTER_PREFIX));

        assert_eq!(
            facebook_url(Some("Austin Gooners")).as_deref(),
            Some("https://www.facebook.com/Austin%20Gooners")
        );
        assert_eq!(
            facebook_url(Some("groups/<b>gooners")).as_deref(),
            Some("https://www.facebook.com/groups/%3Cb%3Egooners")
        );

        // Full URLs with markup are rejected outright
        assert_eq!(facebook_url(Some("https://x.com/\"><script>alert(1)</script>")), None);
        assert_eq!(twitter_url(Some("twitter.com/a b")), None);
        assert_eq!(facebook_url(Some("http://")), None);
    }

    #[test]
    fn test_state_case_collapses_to_one_group() {
        let locations = vec![
            loc("Austin", "Lucky Lizard", "Austin", "TX", 30.27, -97.74),
            loc("Dallas", "Trinity Hall", "Dallas", " tx", 32.78, -96.80),
        ];

        let view = MapView::build(&locations, Some("TX"));
        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].entries.len(), 2);
        assert_eq!(view.states, vec!["TX"]);
    }

    #[test]
    fn test_blank_state_not_offered_as_filter() {
        let mut locations = vec![loc("X", "A", "Nowhere", "", 0.0, 0.0)];
        locations.extend(sample());

        assert_eq!(states(&locations), vec!["MA", "TX"]);
        // Still listed under "Unknown" in the unfiltered view
        assert_eq!(group_by_state(&locations)[0].label(), "Unknown");
    }

    #[test]
    fn test_text_surface_two_columns() {
        let view = MapView::build(&sample(), Some("TX"));
        let mut surface = TextSurface::new(Vec::new());
        surface.render(&view).unwrap();
        let text = String::from_utf8(surface.into_inner()).unwrap();

        assert!(text.contains("3 locations"));
        assert!(text.contains("▸ TX (3) - Austin, Dallas, San Antonio"));
        // Three entries → one line with two, one line with one
        let entry_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("  ")).collect();
        assert_eq!(entry_lines.len(), 2);
        assert!(entry_lines[0].contains("Alamo City") && entry_lines[0].contains("Austin @ Lucky Lizard"));
        assert!(entry_lines[1].contains("Dallas @ Trinity Hall"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long pub name", 10), "a very ...");
    }
}
