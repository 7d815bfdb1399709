//! Single-pass row aggregation into bucketed counts.
//!
//! One scan over the raw rows produces every mapping the rollup tables need:
//! (region, date), (status, date), (date, hub), plus flat status and
//! ageing-bucket totals. Maps are BTree-backed so iteration order never
//! depends on insertion order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::dates::{self, DateInfo};
use super::DashboardError;
use crate::types::Row;

/// Column-role to index mapping for the source sheet layout.
///
/// Offsets are a property of the specific sheet, not of the aggregation, so
/// they are injected rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMap {
    pub date: usize,
    pub hub: usize,
    pub bucket: usize,
    pub region: usize,
    pub status: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        // Layout of the production validation sheet.
        ColumnMap {
            date: 0,
            hub: 6,
            bucket: 11,
            region: 13,
            status: 14,
        }
    }
}

impl ColumnMap {
    /// Reject mappings that assign two roles to the same column.
    pub fn validate(&self) -> Result<(), DashboardError> {
        let roles = [
            ("date", self.date),
            ("hub", self.hub),
            ("bucket", self.bucket),
            ("region", self.region),
            ("status", self.status),
        ];
        for (i, (role_a, index_a)) in roles.iter().enumerate() {
            for (role_b, index_b) in roles.iter().skip(i + 1) {
                if index_a == index_b {
                    return Err(DashboardError::DuplicateColumnIndex {
                        role_a: role_a.to_string(),
                        role_b: role_b.to_string(),
                        index: *index_a,
                    });
                }
            }
        }
        Ok(())
    }

    /// Highest mapped index, for sizing the read range.
    pub fn max_index(&self) -> usize {
        [self.date, self.hub, self.bucket, self.region, self.status]
            .into_iter()
            .max()
            .unwrap_or(0)
    }
}

/// Flat counter keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter(BTreeMap<String, u64>);

impl Counter {
    pub fn increment(&mut self, key: &str) {
        *self.0.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, u64)> {
        self.0.iter().map(|(key, count)| (key, *count))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Two-level counter: outer key -> inner key -> count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedCounter(BTreeMap<String, Counter>);

impl NestedCounter {
    pub fn increment(&mut self, key: &str, sub_key: &str) {
        self.0.entry(key.to_string()).or_default().increment(sub_key);
    }

    pub fn get(&self, key: &str) -> Option<&Counter> {
        self.0.get(key)
    }

    pub fn count(&self, key: &str, sub_key: &str) -> u64 {
        self.get(key).map(|inner| inner.get(sub_key)).unwrap_or(0)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// Everything one scan of the raw rows yields.
#[derive(Debug, Clone, Default)]
pub struct BucketedCounts {
    /// Distinct normalized dates, unique by key.
    pub date_infos: Vec<DateInfo>,
    /// region -> date key -> count
    pub region_date: NestedCounter,
    /// status -> date key -> count
    pub status_date: NestedCounter,
    /// date key -> hub -> count
    pub hub_by_date: NestedCounter,
    pub status_totals: Counter,
    pub bucket_totals: Counter,
}

/// Trimmed text of a cell; empty for null.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string().trim_matches('"').trim().to_string(),
    }
}

/// Aggregate data rows into bucketed counts.
///
/// Rows up to and including `header_row_index` are skipped. A row whose date
/// cell does not normalize contributes to no counts at all; an empty
/// categorical cell skips only that dimension.
pub fn aggregate(
    rows: &[Row],
    header_row_index: usize,
    columns: &ColumnMap,
) -> Result<BucketedCounts, DashboardError> {
    columns.validate()?;

    let mut counts = BucketedCounts::default();
    let mut seen_keys = BTreeSet::new();

    let start = (header_row_index + 1).min(rows.len());
    for row in &rows[start..] {
        let date_cell = row.get(columns.date).unwrap_or(&Value::Null);
        let Some(info) = dates::normalize(date_cell) else {
            continue;
        };

        if seen_keys.insert(info.key.clone()) {
            counts.date_infos.push(info.clone());
        }

        let cell = |index: usize| cell_text(row.get(index).unwrap_or(&Value::Null));
        let hub = cell(columns.hub);
        let bucket = cell(columns.bucket);
        let region = cell(columns.region);
        let status = cell(columns.status);

        if !region.is_empty() {
            counts.region_date.increment(&region, &info.key);
        }
        if !status.is_empty() {
            counts.status_date.increment(&status, &info.key);
            counts.status_totals.increment(&status);
        }
        if !bucket.is_empty() {
            counts.bucket_totals.increment(&bucket);
        }
        if !hub.is_empty() {
            counts.hub_by_date.increment(&info.key, &hub);
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(date: Value, hub: &str, bucket: &str, region: &str, status: &str) -> Row {
        vec![
            date,
            json!(hub),
            json!(bucket),
            json!(region),
            json!(status),
        ]
    }

    fn test_columns() -> ColumnMap {
        ColumnMap {
            date: 0,
            hub: 1,
            bucket: 2,
            region: 3,
            status: 4,
        }
    }

    #[test]
    fn default_map_matches_production_layout() {
        let map = ColumnMap::default();
        assert_eq!((map.date, map.hub, map.bucket, map.region, map.status), (0, 6, 11, 13, 14));
        assert_eq!(map.max_index(), 14);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn duplicate_column_index_rejected() {
        let map = ColumnMap {
            date: 0,
            hub: 3,
            bucket: 11,
            region: 3,
            status: 14,
        };
        let err = map.validate().unwrap_err();
        assert!(matches!(err, DashboardError::DuplicateColumnIndex { index: 3, .. }));
    }

    #[test]
    fn header_rows_are_skipped() {
        let rows = vec![
            row(json!("Date"), "Hub", "Bucket", "Region", "Status"),
            row(json!("2024-06-01"), "HUB-1", "h.2d", "North", "Lost"),
        ];
        let counts = aggregate(&rows, 0, &test_columns()).unwrap();
        assert_eq!(counts.date_infos.len(), 1);
        assert_eq!(counts.region_date.count("North", "2024-06-01"), 1);
    }

    #[test]
    fn unnormalizable_date_drops_the_whole_row() {
        let rows = vec![
            row(json!("Date"), "h", "b", "r", "s"),
            row(json!(""), "HUB-1", "h.2d", "North", "Lost"),
            row(Value::Null, "HUB-1", "h.2d", "North", "Lost"),
        ];
        let counts = aggregate(&rows, 0, &test_columns()).unwrap();
        assert!(counts.date_infos.is_empty());
        assert!(counts.status_totals.is_empty());
        assert!(counts.bucket_totals.is_empty());
        assert_eq!(counts.region_date.count("North", ""), 0);
        assert!(counts.hub_by_date.keys().next().is_none());
    }

    #[test]
    fn empty_dimension_skips_only_that_dimension() {
        let rows = vec![
            row(json!("Date"), "h", "b", "r", "s"),
            row(json!("2024-06-01"), "", "h.2d", "  ", "Lost"),
        ];
        let counts = aggregate(&rows, 0, &test_columns()).unwrap();
        assert_eq!(counts.status_totals.get("Lost"), 1);
        assert_eq!(counts.bucket_totals.get("h.2d"), 1);
        assert!(counts.region_date.keys().next().is_none());
        assert!(counts.hub_by_date.keys().next().is_none());
    }

    #[test]
    fn ragged_rows_read_missing_cells_as_empty() {
        let rows = vec![
            row(json!("Date"), "h", "b", "r", "s"),
            vec![json!("2024-06-01"), json!("HUB-1")],
        ];
        let counts = aggregate(&rows, 0, &test_columns()).unwrap();
        assert_eq!(counts.hub_by_date.count("2024-06-01", "HUB-1"), 1);
        assert!(counts.status_totals.is_empty());
    }

    #[test]
    fn date_keys_deduplicate() {
        let rows = vec![
            row(json!("Date"), "h", "b", "r", "s"),
            row(json!("2024-06-01"), "HUB-1", "h.2d", "North", "Lost"),
            row(json!("2024-06-01"), "HUB-2", "h.2d", "South", "Disposed"),
        ];
        let counts = aggregate(&rows, 0, &test_columns()).unwrap();
        assert_eq!(counts.date_infos.len(), 1);
        assert_eq!(counts.status_totals.total(), 2);
    }

    #[test]
    fn numeric_cells_count_as_text() {
        let rows = vec![
            row(json!("Date"), "h", "b", "r", "s"),
            vec![json!("2024-06-01"), json!(101), json!("h.2d"), json!("North"), json!("Lost")],
        ];
        let counts = aggregate(&rows, 0, &test_columns()).unwrap();
        assert_eq!(counts.hub_by_date.count("2024-06-01", "101"), 1);
    }
}
