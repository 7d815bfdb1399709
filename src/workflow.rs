//! Import path: read a source range, filter columns, write the destination,
//! and regenerate the dashboard when the job asks for one.

use crate::dashboard::publish;
use crate::dashboard::DashboardOptions;
use crate::error::ImportError;
use crate::grid;
use crate::sheets::{SheetsClient, ValueInput, ValueRender};
use crate::types::{DestinationSpec, ImportRequest, Row, SourceSpec, WriteStats};

/// Fully-qualified source ranges plus the one range that gets imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub ranges: Vec<String>,
    pub import_range: String,
}

/// Resolve a sheet name from either an explicit name or a numeric gid.
pub async fn resolve_sheet_name(
    client: &SheetsClient,
    spreadsheet_id: &str,
    sheet_name: Option<&str>,
    gid: Option<i64>,
) -> Result<String, ImportError> {
    if let Some(name) = sheet_name {
        return Ok(name.to_string());
    }
    if let Some(gid) = gid {
        return Ok(client.sheet_title_by_id(spreadsheet_id, gid).await?);
    }
    Err(ImportError::MissingSheetName)
}

/// Qualify every watched range with a sheet name and pick the import range.
///
/// Ranges that already carry a sheet prefix pass through untouched; bare
/// ranges get the source's sheet name (resolved from gid when necessary).
pub async fn resolve_source_ranges(
    client: &SheetsClient,
    source: &SourceSpec,
) -> Result<ResolvedSource, ImportError> {
    let ranges = source.all_ranges();
    if ranges.is_empty() {
        return Err(ImportError::MissingSourceRange);
    }

    let import_range = source
        .import_range
        .clone()
        .unwrap_or_else(|| ranges[0].clone());

    if ranges.iter().all(|range| grid::has_sheet_prefix(range)) {
        let import_range = if grid::has_sheet_prefix(&import_range) {
            import_range
        } else {
            // Borrow the first range's sheet for a bare import range.
            let fallback_sheet = ranges[0].split('!').next().unwrap_or_default().to_string();
            grid::normalize_range(&import_range, &fallback_sheet)
        };
        return Ok(ResolvedSource {
            ranges,
            import_range,
        });
    }

    let sheet_name = resolve_sheet_name(
        client,
        &source.spreadsheet_id,
        source.sheet_name.as_deref(),
        source.gid,
    )
    .await?;

    Ok(ResolvedSource {
        ranges: ranges
            .iter()
            .map(|range| grid::normalize_range(range, &sheet_name))
            .collect(),
        import_range: grid::normalize_range(&import_range, &sheet_name),
    })
}

/// Parameters for writing an already-fetched row snapshot.
pub struct ImportParams<'a> {
    pub rows: Vec<Row>,
    pub destination: &'a DestinationSpec,
    pub remove_columns: &'a [usize],
    pub keep_columns: &'a [String],
    pub header_row_index: usize,
    pub clear_destination: bool,
}

/// Filter, clear, and write one snapshot of rows, then refresh the dashboard
/// if the destination carries one. A dashboard failure is logged and does not
/// fail the import.
pub async fn import_rows(
    client: &SheetsClient,
    params: ImportParams<'_>,
    dashboard_options: &DashboardOptions,
) -> Result<WriteStats, ImportError> {
    let filtered = if !params.keep_columns.is_empty() {
        grid::keep_columns(&params.rows, params.keep_columns, params.header_row_index)?
    } else {
        grid::remove_columns(&params.rows, params.remove_columns)
    };

    let destination = params.destination;
    let sheet_name = resolve_sheet_name(
        client,
        &destination.spreadsheet_id,
        destination.sheet_name.as_deref(),
        destination.gid,
    )
    .await?;

    client
        .ensure_sheet_exists(&destination.spreadsheet_id, &sheet_name)
        .await?;

    let start_cell = destination.start_cell.as_deref().unwrap_or("A1");
    if params.clear_destination {
        let clear_range = match &destination.clear_range {
            Some(range) => Some(grid::normalize_range(range, &sheet_name)),
            None => grid::infer_clear_range(&sheet_name, start_cell, &filtered, params.keep_columns),
        };
        match clear_range {
            Some(range) => {
                client
                    .values_clear(&destination.spreadsheet_id, &range)
                    .await?
            }
            None => log::warn!(
                "import: clear requested but range could not be inferred; skipping clear to preserve formulas"
            ),
        }
    }

    let write_range = format!("{}!{}", sheet_name, start_cell);
    let stats = client
        .values_update(
            &destination.spreadsheet_id,
            &write_range,
            &filtered,
            ValueInput::Raw,
        )
        .await?;

    if let Some(dashboard_sheet) = destination.dashboard_target() {
        if let Err(err) = publish::update_dashboard(
            client,
            &destination.spreadsheet_id,
            &sheet_name,
            &dashboard_sheet,
            params.header_row_index,
            dashboard_options,
        )
        .await
        {
            log::warn!("dashboard: failed to update: {}", err);
        }
    }

    Ok(stats)
}

/// Resolve, read, and import in one shot — the `POST /import` path.
pub async fn run_import(
    client: &SheetsClient,
    request: &ImportRequest,
    dashboard_options: &DashboardOptions,
) -> Result<WriteStats, ImportError> {
    let resolved = resolve_source_ranges(client, &request.source).await?;
    let rows = client
        .values_get(
            &request.source.spreadsheet_id,
            &resolved.import_range,
            ValueRender::Formatted,
        )
        .await?;
    import_rows(
        client,
        ImportParams {
            rows,
            destination: &request.destination,
            remove_columns: &request.remove_columns,
            keep_columns: &request.keep_columns,
            header_row_index: request.header_row_index,
            clear_destination: request.clear_destination,
        },
        dashboard_options,
    )
    .await
}
