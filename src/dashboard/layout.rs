//! Dashboard layout planning.
//!
//! Lays the rollup tables and their charts out on a 2-D grid. Anchors are
//! computed from the extents of the tables placed before them plus fixed
//! gaps, so the plan stays valid when the status list or the trend window
//! changes size. Chart instructions reference their source data by grid
//! range, never by value.

use serde_json::json;

use super::rollup::Rollups;
use crate::types::Row;

/// 0-based grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub row: usize,
    pub col: usize,
}

/// A rectangle of grid cells: anchor plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    TrendArea,
    HorizontalBar,
    VerticalBar,
    Pie,
}

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    /// Label column driving the chart's domain axis.
    pub domain: CellRange,
    /// One range per plotted series.
    pub series: Vec<CellRange>,
    pub anchor: Anchor,
    pub width_px: u32,
    pub height_px: u32,
}

/// Formatting the grid writer applies to a written block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    Plain,
    /// Large bold page title.
    Title,
    /// Bold header row with a background fill; optionally one column of
    /// percent-formatted data cells below the header.
    HeaderRow { percent_col: Option<usize> },
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Write { rows: Vec<Row>, format: CellFormat },
    Chart(ChartSpec),
}

#[derive(Debug, Clone)]
pub struct Placement {
    pub anchor: Anchor,
    pub instruction: Instruction,
}

/// The planned grid: ordered anchor -> instruction placements, consumed by
/// the grid writer and then discarded.
#[derive(Debug, Clone, Default)]
pub struct LayoutGrid {
    pub placements: Vec<Placement>,
}

impl LayoutGrid {
    fn write(&mut self, row: usize, col: usize, rows: Vec<Row>, format: CellFormat) {
        self.placements.push(Placement {
            anchor: Anchor { row, col },
            instruction: Instruction::Write { rows, format },
        });
    }

    fn chart(&mut self, spec: ChartSpec) {
        self.placements.push(Placement {
            anchor: spec.anchor,
            instruction: Instruction::Chart(spec),
        });
    }
}

fn title_cell(text: &str) -> Vec<Row> {
    vec![vec![json!(text)]]
}

const REGIONAL_COL: usize = 0;
const SIDE_BAND_COL: usize = 11;
const HUB_BAND_COL: usize = 18;
const CHART_DATA_COL: usize = 26;
const TABLE_TOP_ROW: usize = 4;

/// Plan the full dashboard grid from one run's rollups.
pub fn plan(rollups: &Rollups, summary_text: &str) -> LayoutGrid {
    let mut grid = LayoutGrid::default();

    grid.write(0, 0, title_cell("Daily Briefing"), CellFormat::Title);
    grid.write(1, 0, title_cell(summary_text), CellFormat::Plain);

    // Regional trend, top-left band.
    grid.write(
        TABLE_TOP_ROW - 1,
        REGIONAL_COL,
        title_cell("Regional Validation Summary"),
        CellFormat::Plain,
    );
    grid.write(
        TABLE_TOP_ROW,
        REGIONAL_COL,
        rollups.regional.clone(),
        CellFormat::HeaderRow { percent_col: None },
    );

    // Ageing buckets and status volume, stacked in the second band with a
    // one-row gap (plus the section title) between them.
    grid.write(
        TABLE_TOP_ROW - 1,
        SIDE_BAND_COL,
        title_cell("Ageing Bucket Analysis"),
        CellFormat::Plain,
    );
    grid.write(
        TABLE_TOP_ROW,
        SIDE_BAND_COL,
        rollups.ageing_bucket.clone(),
        CellFormat::HeaderRow { percent_col: Some(2) },
    );
    let status_volume_row = TABLE_TOP_ROW + rollups.ageing_bucket.len() + 2;
    grid.write(
        status_volume_row - 1,
        SIDE_BAND_COL,
        title_cell("Status Volume"),
        CellFormat::Plain,
    );
    grid.write(
        status_volume_row,
        SIDE_BAND_COL,
        rollups.status_volume.clone(),
        CellFormat::HeaderRow { percent_col: Some(2) },
    );

    // Top hubs, third band.
    grid.write(
        TABLE_TOP_ROW - 1,
        HUB_BAND_COL,
        title_cell("Top Hubs"),
        CellFormat::Plain,
    );
    grid.write(
        TABLE_TOP_ROW,
        HUB_BAND_COL,
        rollups.top_hubs.clone(),
        CellFormat::HeaderRow { percent_col: Some(2) },
    );

    // Stuck-status trend sits below the regional table: title row, then the
    // table, offset by the regional table's own height.
    let stuck_title_row = TABLE_TOP_ROW + rollups.regional.len() + 2;
    grid.write(
        stuck_title_row,
        REGIONAL_COL,
        title_cell("Stuck Up Tagging Analysis"),
        CellFormat::Plain,
    );
    grid.write(
        stuck_title_row + 1,
        REGIONAL_COL,
        rollups.status_trend.clone(),
        CellFormat::HeaderRow { percent_col: None },
    );

    // Chart source blocks live in a far-right band, out of the reading flow.
    let regional_data_row = 0;
    grid.write(
        regional_data_row,
        CHART_DATA_COL,
        rollups.regional_chart_data.clone(),
        CellFormat::Plain,
    );
    let status_data_row = regional_data_row + rollups.regional_chart_data.len() + 3;
    grid.write(
        status_data_row,
        CHART_DATA_COL,
        rollups.status_chart_data.clone(),
        CellFormat::Plain,
    );

    // Trend charts, anchored just above the stuck-status section. A block
    // with only its header row has nothing to plot and emits no chart.
    if rollups.regional_chart_data.len() > 1 {
        grid.chart(trend_chart(
            "20hrs - 1d Validation Trend",
            regional_data_row,
            &rollups.regional_chart_data,
            Anchor {
                row: stuck_title_row - 1,
                col: 7,
            },
        ));
    }
    if rollups.status_chart_data.len() > 1 {
        grid.chart(trend_chart(
            "Stuck Up Tagging Trend",
            status_data_row,
            &rollups.status_chart_data,
            Anchor {
                row: stuck_title_row - 1,
                col: 14,
            },
        ));
    }

    // Bucket bar chart, beside its table.
    if rollups.ageing_bucket.len() > 1 {
        let data_rows = rollups.ageing_bucket.len() - 1;
        grid.chart(ChartSpec {
            title: "Ageing Bucket Analysis".to_string(),
            kind: ChartKind::HorizontalBar,
            domain: CellRange {
                row: TABLE_TOP_ROW + 1,
                col: SIDE_BAND_COL,
                rows: data_rows,
                cols: 1,
            },
            series: vec![CellRange {
                row: TABLE_TOP_ROW + 1,
                col: SIDE_BAND_COL + 1,
                rows: data_rows,
                cols: 1,
            }],
            anchor: Anchor {
                row: TABLE_TOP_ROW,
                col: SIDE_BAND_COL + 4,
            },
            width_px: 320,
            height_px: 180,
        });
    }

    // Hub doughnut, beside its table.
    if rollups.top_hubs.len() > 1 {
        let data_rows = rollups.top_hubs.len() - 1;
        grid.chart(ChartSpec {
            title: "Top Hubs".to_string(),
            kind: ChartKind::Pie,
            domain: CellRange {
                row: TABLE_TOP_ROW + 1,
                col: HUB_BAND_COL,
                rows: data_rows,
                cols: 1,
            },
            series: vec![CellRange {
                row: TABLE_TOP_ROW + 1,
                col: HUB_BAND_COL + 1,
                rows: data_rows,
                cols: 1,
            }],
            anchor: Anchor {
                row: TABLE_TOP_ROW,
                col: HUB_BAND_COL + 4,
            },
            width_px: 240,
            height_px: 200,
        });
    }

    grid
}

/// Area chart over a chart-data block: label column as domain, every
/// remaining column as a series. Ranges include the block's header row.
fn trend_chart(title: &str, data_row: usize, data: &[Row], anchor: Anchor) -> ChartSpec {
    let series_count = data
        .first()
        .map(|header| header.len().saturating_sub(1))
        .unwrap_or(0);
    ChartSpec {
        title: title.to_string(),
        kind: ChartKind::TrendArea,
        domain: CellRange {
            row: data_row,
            col: CHART_DATA_COL,
            rows: data.len(),
            cols: 1,
        },
        series: (0..series_count)
            .map(|index| CellRange {
                row: data_row,
                col: CHART_DATA_COL + 1 + index,
                rows: data.len(),
                cols: 1,
            })
            .collect(),
        anchor,
        width_px: 380,
        height_px: 220,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::counts::{aggregate, ColumnMap};
    use crate::dashboard::rollup::{build_rollups, RollupOptions};
    use serde_json::json;

    fn columns() -> ColumnMap {
        ColumnMap {
            date: 0,
            hub: 1,
            bucket: 2,
            region: 3,
            status: 4,
        }
    }

    fn rollups_for(regions: &[&str]) -> Rollups {
        let mut rows = vec![vec![
            json!("Date"),
            json!("Hub"),
            json!("Bucket"),
            json!("Region"),
            json!("Status"),
        ]];
        for region in regions {
            rows.push(vec![
                json!("2024-06-01"),
                json!("H1"),
                json!("h.2d"),
                json!(region),
                json!("Lost"),
            ]);
        }
        let counts = aggregate(&rows, 0, &columns()).unwrap();
        build_rollups(&counts, &RollupOptions::default())
    }

    fn find_write<'a>(grid: &'a LayoutGrid, text: &str) -> &'a Placement {
        grid.placements
            .iter()
            .find(|placement| match &placement.instruction {
                Instruction::Write { rows, .. } => rows[0][0] == json!(text),
                _ => false,
            })
            .expect("placement present")
    }

    fn charts(grid: &LayoutGrid) -> Vec<&ChartSpec> {
        grid.placements
            .iter()
            .filter_map(|placement| match &placement.instruction {
                Instruction::Chart(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn stuck_section_offset_tracks_regional_height() {
        let small = rollups_for(&["North"]);
        let large = rollups_for(&["North", "South", "East", "West", "Central"]);

        let small_grid = plan(&small, "s");
        let large_grid = plan(&large, "s");

        let small_title = find_write(&small_grid, "Stuck Up Tagging Analysis").anchor;
        let large_title = find_write(&large_grid, "Stuck Up Tagging Analysis").anchor;

        assert_eq!(small_title.row, TABLE_TOP_ROW + small.regional.len() + 2);
        assert_eq!(
            large_title.row - small_title.row,
            large.regional.len() - small.regional.len()
        );
    }

    #[test]
    fn status_volume_stacks_below_bucket_table() {
        let rollups = rollups_for(&["North"]);
        let grid = plan(&rollups, "s");
        let bucket = find_write(&grid, "Ageing Bucket").anchor;
        let volume = find_write(&grid, "Status").anchor;
        assert_eq!(bucket.col, volume.col);
        assert_eq!(volume.row, bucket.row + rollups.ageing_bucket.len() + 2);
    }

    #[test]
    fn trend_chart_series_cover_every_data_column() {
        let rollups = rollups_for(&["North", "South"]);
        let grid = plan(&rollups, "s");
        let specs = charts(&grid);
        let regional_chart = specs
            .iter()
            .find(|spec| spec.title == "20hrs - 1d Validation Trend")
            .unwrap();
        let header_len = rollups.regional_chart_data[0].len();
        assert_eq!(regional_chart.series.len(), header_len - 1);
        assert_eq!(regional_chart.domain.col, CHART_DATA_COL);
        assert_eq!(regional_chart.series[0].col, CHART_DATA_COL + 1);
        assert_eq!(regional_chart.domain.rows, rollups.regional_chart_data.len());
        assert_eq!(regional_chart.kind, ChartKind::TrendArea);
    }

    #[test]
    fn empty_rollups_emit_no_charts() {
        let rollups = rollups_for(&[]);
        let grid = plan(&rollups, "no data");
        // No dates observed: chart data blocks are header-only, hub table is
        // header-only, so only the bucket chart could remain — and both
        // bucket rows exist (zero counts), so the bucket chart stays.
        let titles: Vec<&str> = charts(&grid).iter().map(|c| c.title.as_str()).collect();
        assert!(!titles.contains(&"20hrs - 1d Validation Trend"));
        assert!(!titles.contains(&"Stuck Up Tagging Trend"));
        assert!(!titles.contains(&"Top Hubs"));
    }

    #[test]
    fn hub_chart_is_doughnut_beside_table() {
        let rollups = rollups_for(&["North"]);
        let grid = plan(&rollups, "s");
        // Single date means the hub table falls back to that date's data.
        let hub_chart = charts(&grid)
            .into_iter()
            .find(|spec| spec.title == "Top Hubs")
            .unwrap();
        assert_eq!(hub_chart.kind, ChartKind::Pie);
        assert_eq!(hub_chart.anchor.col, HUB_BAND_COL + 4);
        assert_eq!(hub_chart.domain.rows, rollups.top_hubs.len() - 1);
    }
}
