//! One-line dashboard synopsis.

use super::rollup::Rollups;

/// Compose the briefing line from the top region, the stuck-tagging average,
/// and the dominant ageing bucket. Falls back to a fixed sentence when no
/// regional data exists at all.
pub fn build_summary_text(rollups: &Rollups) -> String {
    let Some((top_region, top_region_ave)) = &rollups.top_region else {
        return "No data available for the dashboard summary.".to_string();
    };
    let bucket_label = rollups.top_bucket.as_deref().unwrap_or("N/A");
    format!(
        "20hrs - 1d Validation Summary: {} shows highest stuckup orders ({} Ave L7D). \
         7-Day Average Stuck Up Tagging is {} orders. {} Ageing Bucket is top contributor.",
        top_region, top_region_ave, rollups.stuck_average, bucket_label
    )
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

    #[test]
    fn summary_interpolates_rollup_fields() {
        let rows = vec![
            vec![json!("Date"), json!("Hub"), json!("Bucket"), json!("Region"), json!("Status")],
            vec![json!("2024-06-01"), json!("H1"), json!("h.2d"), json!("North"), json!("Lost")],
        ];
        let counts = aggregate(&rows, 0, &columns()).unwrap();
        let rollups = build_rollups(&counts, &RollupOptions::default());
        let text = build_summary_text(&rollups);
        assert!(text.contains("North shows highest stuckup orders"));
        assert!(text.contains("h.2d Ageing Bucket is top contributor"));
    }

    #[test]
    fn summary_without_regions_is_fixed_sentence() {
        let counts = aggregate(&[], 0, &columns()).unwrap();
        let rollups = build_rollups(&counts, &RollupOptions::default());
        assert_eq!(
            build_summary_text(&rollups),
            "No data available for the dashboard summary."
        );
    }
}
