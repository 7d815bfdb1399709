//! Dashboard aggregation core.
//!
//! Pure compute: raw rows in, summary text + rollup tables + a planned grid
//! of write/chart instructions out. Fetching rows and persisting the grid
//! belong to the callers in `workflow` and `publish`.

pub mod counts;
pub mod dates;
pub mod layout;
pub mod publish;
pub mod rollup;
pub mod summary;

use thiserror::Error;

use crate::types::Row;
pub use counts::ColumnMap;
pub use layout::LayoutGrid;
pub use rollup::{RollupOptions, Rollups};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("Column map assigns index {index} to both {role_a} and {role_b}")]
    DuplicateColumnIndex {
        role_a: String,
        role_b: String,
        index: usize,
    },
}

/// Caller-supplied dashboard configuration: the source column layout plus the
/// rollup knobs.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardOptions {
    pub columns: ColumnMap,
    pub rollup: RollupOptions,
}

/// One run's complete output.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub summary: String,
    pub rollups: Rollups,
    pub grid: LayoutGrid,
}

/// Build the dashboard from a snapshot of raw rows.
///
/// Synchronous and allocation-only; safe to call from any number of tasks.
/// Fails only on an invalid column mapping — bad data degrades, bad config
/// does not.
pub fn build_dashboard(
    rows: &[Row],
    header_row_index: usize,
    options: &DashboardOptions,
) -> Result<Dashboard, DashboardError> {
    let counts = counts::aggregate(rows, header_row_index, &options.columns)?;
    let rollups = rollup::build_rollups(&counts, &options.rollup);
    let summary = summary::build_summary_text(&rollups);
    let grid = layout::plan(&rollups, &summary);
    Ok(Dashboard {
        summary,
        rollups,
        grid,
    })
}
