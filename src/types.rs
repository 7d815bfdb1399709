//! Shared wire types for the import service.
//!
//! Cells come back from the values API as untyped JSON, so rows are kept as
//! `serde_json::Value` sequences end to end; the dashboard core normalizes
//! individual cells as it reads them.

use serde::{Deserialize, Serialize};

/// A single spreadsheet cell, as returned by the values API.
pub type Cell = serde_json::Value;

/// One spreadsheet row. Rows may be ragged; missing cells read as empty.
pub type Row = Vec<Cell>;

/// Source half of an import job: where rows are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub ranges: Option<Vec<String>>,
    /// When several ranges are watched, the one that actually gets imported.
    #[serde(default)]
    pub import_range: Option<String>,
    #[serde(default)]
    pub gid: Option<i64>,
    #[serde(default)]
    pub sheet_name: Option<String>,
}

impl SourceSpec {
    /// All watched ranges, in declaration order.
    pub fn all_ranges(&self) -> Vec<String> {
        if let Some(ranges) = &self.ranges {
            if !ranges.is_empty() {
                return ranges.clone();
            }
        }
        self.range.clone().into_iter().collect()
    }
}

/// Dashboard toggle on a destination: either a bare boolean or a config block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DashboardToggle {
    Enabled(bool),
    Config {
        #[serde(default, rename = "sheetName")]
        sheet_name: Option<String>,
        #[serde(default)]
        enabled: Option<bool>,
    },
}

/// Destination half of an import job: where rows are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub gid: Option<i64>,
    #[serde(default)]
    pub start_cell: Option<String>,
    #[serde(default)]
    pub clear_range: Option<String>,
    #[serde(default)]
    pub dashboard: Option<DashboardToggle>,
    #[serde(default)]
    pub dashboard_sheet_name: Option<String>,
}

impl DestinationSpec {
    /// Resolve the dashboard sheet name and whether regeneration is enabled.
    pub fn dashboard_target(&self) -> Option<String> {
        let (config_name, config_enabled) = match &self.dashboard {
            Some(DashboardToggle::Enabled(true)) => (Some("Dashboard".to_string()), true),
            Some(DashboardToggle::Enabled(false)) => (None, false),
            Some(DashboardToggle::Config { sheet_name, enabled }) => {
                (sheet_name.clone(), enabled.unwrap_or(true))
            }
            None => (None, true),
        };

        let name = self.dashboard_sheet_name.clone().or(config_name)?;
        config_enabled.then_some(name)
    }
}

/// Body of `POST /import`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub source: SourceSpec,
    pub destination: DestinationSpec,
    #[serde(default)]
    pub remove_columns: Vec<usize>,
    #[serde(default)]
    pub keep_columns: Vec<String>,
    #[serde(default)]
    pub header_row_index: usize,
    #[serde(default = "default_clear_destination")]
    pub clear_destination: bool,
}

pub(crate) fn default_clear_destination() -> bool {
    true
}

/// Stats echoed back from a values write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStats {
    #[serde(default)]
    pub updated_range: String,
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub updated_columns: u64,
    #[serde(default)]
    pub updated_cells: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ranges_prefer_plural_field() {
        let source: SourceSpec = serde_json::from_value(serde_json::json!({
            "spreadsheetId": "sheet-a",
            "range": "A1:B2",
            "ranges": ["Data!A:O", "Pivot!A1:C9"],
        }))
        .unwrap();
        assert_eq!(source.all_ranges(), vec!["Data!A:O", "Pivot!A1:C9"]);
    }

    #[test]
    fn source_ranges_fall_back_to_single_range() {
        let source: SourceSpec = serde_json::from_value(serde_json::json!({
            "spreadsheetId": "sheet-a",
            "range": "A1:B2",
        }))
        .unwrap();
        assert_eq!(source.all_ranges(), vec!["A1:B2"]);
    }

    #[test]
    fn dashboard_toggle_boolean_uses_default_sheet() {
        let dest: DestinationSpec = serde_json::from_value(serde_json::json!({
            "spreadsheetId": "sheet-b",
            "sheetName": "Raw",
            "dashboard": true,
        }))
        .unwrap();
        assert_eq!(dest.dashboard_target(), Some("Dashboard".to_string()));
    }

    #[test]
    fn dashboard_toggle_config_block() {
        let dest: DestinationSpec = serde_json::from_value(serde_json::json!({
            "spreadsheetId": "sheet-b",
            "sheetName": "Raw",
            "dashboard": { "sheetName": "Ops", "enabled": true },
        }))
        .unwrap();
        assert_eq!(dest.dashboard_target(), Some("Ops".to_string()));

        let disabled: DestinationSpec = serde_json::from_value(serde_json::json!({
            "spreadsheetId": "sheet-b",
            "sheetName": "Raw",
            "dashboard": { "sheetName": "Ops", "enabled": false },
        }))
        .unwrap();
        assert_eq!(disabled.dashboard_target(), None);
    }

    #[test]
    fn dashboard_absent_but_named_sheet_enables() {
        let dest: DestinationSpec = serde_json::from_value(serde_json::json!({
            "spreadsheetId": "sheet-b",
            "sheetName": "Raw",
            "dashboardSheetName": "Briefing",
        }))
        .unwrap();
        assert_eq!(dest.dashboard_target(), Some("Briefing".to_string()));
    }
}
