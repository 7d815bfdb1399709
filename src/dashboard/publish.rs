//! Persists a built dashboard onto its sheet.
//!
//! The layout plan is pure data; this module turns it into Sheets API calls:
//! one batch of value writes, then one grid batch with stale-chart deletes,
//! header/percent formats, and chart adds.

use serde_json::{json, Value};

use super::layout::{Anchor, CellFormat, ChartKind, ChartSpec, Instruction};
use super::DashboardOptions;
use crate::error::ImportError;
use crate::grid;
use crate::sheets::{SheetsClient, SheetsError, ValueInput, ValueRender};
use crate::types::Row;

/// Rebuild the dashboard sheet from the data sheet's current rows.
pub async fn update_dashboard(
    client: &SheetsClient,
    spreadsheet_id: &str,
    data_sheet: &str,
    dashboard_sheet: &str,
    header_row_index: usize,
    options: &DashboardOptions,
) -> Result<(), ImportError> {
    client
        .ensure_sheet_exists(spreadsheet_id, dashboard_sheet)
        .await?;
    client.values_clear(spreadsheet_id, dashboard_sheet).await?;

    let meta = client.spreadsheet_meta(spreadsheet_id).await?;
    let dashboard_sheet_id = meta
        .sheet_id_by_title(dashboard_sheet)
        .ok_or_else(|| SheetsError::SheetNotFound(dashboard_sheet.to_string()))?;

    // Raw values, sized to cover every mapped column.
    let end_col = grid::column_index_to_letters(options.columns.max_index() + 1)
        .unwrap_or_else(|| "A".to_string());
    let read_range = format!("{}!A:{}", data_sheet, end_col);
    let rows = client
        .values_get(spreadsheet_id, &read_range, ValueRender::Unformatted)
        .await?;

    let dashboard = super::build_dashboard(&rows, header_row_index, options)?;

    // One batched write for every table block.
    let mut writes = Vec::new();
    for placement in &dashboard.grid.placements {
        if let Instruction::Write { rows, .. } = &placement.instruction {
            let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
            if rows.is_empty() || cols == 0 {
                continue;
            }
            let range = grid::a1_range(
                dashboard_sheet,
                placement.anchor.row,
                placement.anchor.col,
                rows.len(),
                cols,
            );
            writes.push((range, rows.clone()));
        }
    }
    client
        .values_batch_update(spreadsheet_id, &writes, ValueInput::UserEntered)
        .await?;

    // One grid batch: drop charts previously anchored to this sheet, then
    // formats and fresh charts.
    let mut requests = Vec::new();
    for sheet in &meta.sheets {
        for chart in &sheet.charts {
            if chart.anchor_sheet_id() == Some(dashboard_sheet_id) {
                requests.push(json!({
                    "deleteEmbeddedObject": { "objectId": chart.chart_id }
                }));
            }
        }
    }
    for placement in &dashboard.grid.placements {
        match &placement.instruction {
            Instruction::Write { rows, format } => {
                requests.extend(format_requests(
                    dashboard_sheet_id,
                    placement.anchor,
                    rows,
                    *format,
                ));
            }
            Instruction::Chart(spec) => {
                requests.push(chart_request(dashboard_sheet_id, spec));
            }
        }
    }
    client.batch_update(spreadsheet_id, requests).await?;

    log::info!(
        "dashboard: rebuilt {} ({} placements)",
        dashboard_sheet,
        dashboard.grid.placements.len()
    );
    Ok(())
}

fn grid_range(sheet_id: i64, row: usize, col: usize, rows: usize, cols: usize) -> Value {
    json!({
        "sheetId": sheet_id,
        "startRowIndex": row,
        "endRowIndex": row + rows,
        "startColumnIndex": col,
        "endColumnIndex": col + cols,
    })
}

/// Formatting requests for one written block.
fn format_requests(
    sheet_id: i64,
    anchor: Anchor,
    rows: &[Row],
    format: CellFormat,
) -> Vec<Value> {
    match format {
        CellFormat::Plain => Vec::new(),
        CellFormat::Title => vec![json!({
            "repeatCell": {
                "range": grid_range(sheet_id, anchor.row, anchor.col, 1, 1),
                "cell": {
                    "userEnteredFormat": {
                        "textFormat": { "bold": true, "fontSize": 14 }
                    }
                },
                "fields": "userEnteredFormat.textFormat",
            }
        })],
        CellFormat::HeaderRow { percent_col } => {
            let header_cols = rows.first().map(Vec::len).unwrap_or(0).max(1);
            let mut requests = vec![json!({
                "repeatCell": {
                    "range": grid_range(sheet_id, anchor.row, anchor.col, 1, header_cols),
                    "cell": {
                        "userEnteredFormat": {
                            "textFormat": { "bold": true },
                            "backgroundColor": { "red": 0.92, "green": 0.94, "blue": 0.96 }
                        }
                    },
                    "fields": "userEnteredFormat",
                }
            })];
            if let Some(col_offset) = percent_col {
                let data_rows = rows.len().saturating_sub(1);
                if data_rows > 0 {
                    requests.push(json!({
                        "repeatCell": {
                            "range": grid_range(
                                sheet_id,
                                anchor.row + 1,
                                anchor.col + col_offset,
                                data_rows,
                                1,
                            ),
                            "cell": {
                                "userEnteredFormat": {
                                    "numberFormat": { "type": "PERCENT", "pattern": "0.0%" }
                                }
                            },
                            "fields": "userEnteredFormat.numberFormat",
                        }
                    }));
                }
            }
            requests
        }
    }
}

/// An addChart request for one planned chart.
fn chart_request(sheet_id: i64, spec: &ChartSpec) -> Value {
    let domain = grid_range(
        sheet_id,
        spec.domain.row,
        spec.domain.col,
        spec.domain.rows,
        spec.domain.cols,
    );
    let series_ranges: Vec<Value> = spec
        .series
        .iter()
        .map(|range| grid_range(sheet_id, range.row, range.col, range.rows, range.cols))
        .collect();

    let chart_spec = match spec.kind {
        ChartKind::Pie => json!({
            "title": spec.title,
            "pieChart": {
                "legendPosition": "RIGHT_LEGEND",
                "domain": { "sourceRange": { "sources": [domain] } },
                "series": { "sourceRange": { "sources": series_ranges } },
                "pieHole": 0.5,
            }
        }),
        kind => {
            let (chart_type, legend, header_count, target_axis) = match kind {
                ChartKind::TrendArea => ("AREA", "TOP_LEGEND", 1, "LEFT_AXIS"),
                ChartKind::HorizontalBar => ("BAR", "NO_LEGEND", 0, "BOTTOM_AXIS"),
                ChartKind::VerticalBar => ("COLUMN", "NO_LEGEND", 0, "LEFT_AXIS"),
                ChartKind::Pie => unreachable!("handled above"),
            };
            let series: Vec<Value> = series_ranges
                .iter()
                .map(|range| {
                    json!({
                        "series": { "sourceRange": { "sources": [range] } },
                        "targetAxis": target_axis,
                    })
                })
                .collect();
            json!({
                "title": spec.title,
                "basicChart": {
                    "chartType": chart_type,
                    "legendPosition": legend,
                    "headerCount": header_count,
                    "domains": [{ "domain": { "sourceRange": { "sources": [domain] } } }],
                    "series": series,
                    "axis": [
                        { "position": "BOTTOM_AXIS" },
                        { "position": "LEFT_AXIS" },
                    ],
                }
            })
        }
    };

    json!({
        "addChart": {
            "chart": {
                "spec": chart_spec,
                "position": {
                    "overlayPosition": {
                        "anchorCell": {
                            "sheetId": sheet_id,
                            "rowIndex": spec.anchor.row,
                            "columnIndex": spec.anchor.col,
                        },
                        "widthPixels": spec.width_px,
                        "heightPixels": spec.height_px,
                    }
                }
            }
        }
    })
}
