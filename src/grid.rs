//! A1-notation helpers and positional column filters.
//!
//! Everything here is pure index math over ranges and rows; the sheets client
//! owns the actual reads and writes.

use crate::error::ImportError;
use crate::types::Row;

/// Convert column letters to a 1-based index ("A" -> 1, "AA" -> 27).
pub fn column_letters_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for ch in letters.chars() {
        let upper = ch.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return None;
        }
        index = index * 26 + (upper as usize - 'A' as usize + 1);
    }
    Some(index)
}

/// Convert a 1-based column index to letters (1 -> "A", 27 -> "AA").
pub fn column_index_to_letters(index: usize) -> Option<String> {
    if index == 0 {
        return None;
    }
    let mut value = index;
    let mut letters = String::new();
    while value > 0 {
        let remainder = (value - 1) % 26;
        letters.insert(0, (b'A' + remainder as u8) as char);
        value = (value - 1) / 26;
    }
    Some(letters)
}

/// A parsed cell reference, 1-based. Unparseable input falls back to A1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: usize,
    pub row: usize,
}

/// Parse a cell reference like "C7" or "Sheet1!C7", dropping any sheet prefix.
pub fn parse_cell_ref(cell_ref: &str) -> CellRef {
    let without_sheet = cell_ref.rsplit('!').next().unwrap_or(cell_ref);
    let letters: String = without_sheet
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits = &without_sheet[letters.len()..];

    let col = column_letters_to_index(&letters).unwrap_or(1);
    let row = if digits.is_empty() {
        1
    } else {
        match digits.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return CellRef { col: 1, row: 1 },
        }
    };
    CellRef { col, row }
}

/// True if the range already carries a "Sheet!" prefix.
pub fn has_sheet_prefix(range: &str) -> bool {
    range.contains('!')
}

/// Prefix a bare range with a sheet name, leaving prefixed ranges alone.
pub fn normalize_range(range: &str, sheet_name: &str) -> String {
    if has_sheet_prefix(range) {
        range.to_string()
    } else {
        format!("{}!{}", sheet_name, range)
    }
}

/// Build an A1 range from a 0-based anchor and extent.
pub fn a1_range(sheet_name: &str, row: usize, col: usize, rows: usize, cols: usize) -> String {
    let start_col = column_index_to_letters(col + 1).unwrap_or_else(|| "A".to_string());
    if rows <= 1 && cols <= 1 {
        return format!("{}!{}{}", sheet_name, start_col, row + 1);
    }
    let end_col = column_index_to_letters(col + cols.max(1)).unwrap_or_else(|| "A".to_string());
    format!(
        "{}!{}{}:{}{}",
        sheet_name,
        start_col,
        row + 1,
        end_col,
        row + rows.max(1)
    )
}

/// Infer the rectangle a write will cover, for pre-write clearing.
///
/// Returns `None` when the payload is empty, in which case the caller skips
/// the clear to preserve whatever formulas live in the destination.
pub fn infer_clear_range(
    sheet_name: &str,
    start_cell: &str,
    rows: &[Row],
    keep_columns: &[String],
) -> Option<String> {
    let row_count = rows.len();
    let mut col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 && !keep_columns.is_empty() {
        col_count = keep_columns.len();
    }
    if row_count == 0 || col_count == 0 {
        return None;
    }

    let start = parse_cell_ref(start_cell);
    let start_col = column_index_to_letters(start.col)?;
    let end_col = column_index_to_letters(start.col + col_count - 1)?;
    Some(format!(
        "{}!{}{}:{}{}",
        sheet_name,
        start_col,
        start.row,
        end_col,
        start.row + row_count - 1
    ))
}

/// Drop the given 0-based column indexes from every row.
pub fn remove_columns(rows: &[Row], columns_to_remove: &[usize]) -> Vec<Row> {
    if rows.is_empty() || columns_to_remove.is_empty() {
        return rows.to_vec();
    }
    let remove: std::collections::BTreeSet<usize> = columns_to_remove.iter().copied().collect();
    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(index, _)| !remove.contains(index))
                .map(|(_, cell)| cell.clone())
                .collect()
        })
        .collect()
}

/// Keep only the columns whose header matches one of the requested names.
///
/// Matching trims and lowercases both sides. Every requested name must be
/// present in the header row; a miss is a job-definition error.
pub fn keep_columns(
    rows: &[Row],
    columns_to_keep: &[String],
    header_row_index: usize,
) -> Result<Vec<Row>, ImportError> {
    if rows.is_empty() || columns_to_keep.is_empty() {
        return Ok(rows.to_vec());
    }

    let header_row = rows.get(header_row_index).ok_or(ImportError::HeaderRowMissing)?;

    let normalize = |value: &str| value.trim().to_lowercase();
    let mut header_index = std::collections::BTreeMap::new();
    for (index, cell) in header_row.iter().enumerate() {
        let key = normalize(&crate::dashboard::counts::cell_text(cell));
        header_index.entry(key).or_insert(index);
    }

    let mut keep_indexes = Vec::with_capacity(columns_to_keep.len());
    let mut missing = Vec::new();
    for name in columns_to_keep {
        match header_index.get(&normalize(name)) {
            Some(index) => keep_indexes.push(*index),
            None => missing.push(name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(ImportError::MissingKeepColumns(missing.join(", ")));
    }

    Ok(rows
        .iter()
        .map(|row| {
            keep_indexes
                .iter()
                .map(|&index| row.get(index).cloned().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_letters_round_trip() {
        for (letters, index) in [("A", 1), ("Z", 26), ("AA", 27), ("AZ", 52), ("BA", 53)] {
            assert_eq!(column_letters_to_index(letters), Some(index));
            assert_eq!(column_index_to_letters(index).as_deref(), Some(letters));
        }
        assert_eq!(column_letters_to_index(""), None);
        assert_eq!(column_letters_to_index("A1"), None);
        assert_eq!(column_index_to_letters(0), None);
    }

    #[test]
    fn parse_cell_ref_variants() {
        assert_eq!(parse_cell_ref("C7"), CellRef { col: 3, row: 7 });
        assert_eq!(parse_cell_ref("Data!AA2"), CellRef { col: 27, row: 2 });
        assert_eq!(parse_cell_ref("B"), CellRef { col: 2, row: 1 });
        assert_eq!(parse_cell_ref("7C"), CellRef { col: 1, row: 1 });
    }

    #[test]
    fn a1_range_from_anchor() {
        assert_eq!(a1_range("Dash", 0, 0, 1, 1), "Dash!A1");
        assert_eq!(a1_range("Dash", 4, 0, 3, 10), "Dash!A5:J7");
        assert_eq!(a1_range("Dash", 0, 26, 8, 7), "Dash!AA1:AG8");
    }

    #[test]
    fn infer_clear_range_covers_payload() {
        let rows = vec![vec![json!("a"), json!("b")], vec![json!("c")]];
        assert_eq!(
            infer_clear_range("Raw", "B2", &rows, &[]),
            Some("Raw!B2:C3".to_string())
        );
    }

    #[test]
    fn infer_clear_range_empty_payload_is_none() {
        assert_eq!(infer_clear_range("Raw", "A1", &[], &[]), None);
        let empty_rows = vec![Vec::new()];
        assert_eq!(infer_clear_range("Raw", "A1", &empty_rows, &[]), None);
    }

    #[test]
    fn remove_columns_by_index() {
        let rows = vec![vec![json!(1), json!(2), json!(3)], vec![json!(4), json!(5), json!(6)]];
        let filtered = remove_columns(&rows, &[1]);
        assert_eq!(filtered, vec![vec![json!(1), json!(3)], vec![json!(4), json!(6)]]);
    }

    #[test]
    fn keep_columns_by_header_name() {
        let rows = vec![
            vec![json!(" Date "), json!("Region"), json!("Status")],
            vec![json!("2024-06-01"), json!("North"), json!("Lost")],
        ];
        let filtered =
            keep_columns(&rows, &["date".to_string(), "STATUS".to_string()], 0).unwrap();
        assert_eq!(filtered[1], vec![json!("2024-06-01"), json!("Lost")]);
    }

    #[test]
    fn keep_columns_missing_header_errors() {
        let rows = vec![vec![json!("Date")], vec![json!("2024-06-01")]];
        let err = keep_columns(&rows, &["Region".to_string()], 0).unwrap_err();
        assert!(matches!(err, ImportError::MissingKeepColumns(names) if names == "Region"));
    }

    #[test]
    fn keep_columns_pads_short_rows() {
        let rows = vec![
            vec![json!("Date"), json!("Region")],
            vec![json!("2024-06-01")],
        ];
        let filtered = keep_columns(&rows, &["Region".to_string()], 0).unwrap();
        assert_eq!(filtered[1], vec![serde_json::Value::Null]);
    }
}
