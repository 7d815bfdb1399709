//! Rollup tables derived from bucketed counts.
//!
//! Five fixed-shape tables come out of one set of counts: a regional trend,
//! a stuck-status trend, an ageing-bucket distribution, a status-volume
//! leaderboard, and a per-day top-hubs leaderboard. Row 0 of every table is
//! the header; cells are written verbatim to the grid, so they stay as JSON
//! values (strings, integers, ratio floats).

use std::collections::BTreeSet;

use serde_json::json;

use super::counts::BucketedCounts;
use super::dates::{self, DateInfo};
use crate::types::Row;

/// Config-supplied rollup knobs. Enumerated lists are never discovered from
/// the data.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollupOptions {
    /// Order states considered operationally stuck, in display order.
    pub stuck_statuses: Vec<String>,
    /// The ageing-bucket label pair tracked in the distribution table.
    pub bucket_labels: Vec<String>,
    /// Rolling window length in days.
    pub trend_days: usize,
    /// Rows kept in the status-volume leaderboard.
    pub status_volume_limit: usize,
    /// Rows kept in the top-hubs leaderboard.
    pub top_hub_limit: usize,
    /// Regions plotted in the regional trend chart.
    pub chart_region_limit: usize,
}

impl Default for RollupOptions {
    fn default() -> Self {
        RollupOptions {
            stuck_statuses: [
                "Moving Parcel",
                "SOC_Packed",
                "Delivered Parcel",
                "Lost",
                "SOC_Packing",
                "Disposed",
                "SOC_Received",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            bucket_labels: vec!["l.15-20d+".to_string(), "h.2d".to_string()],
            trend_days: 7,
            status_volume_limit: 7,
            top_hub_limit: 5,
            chart_region_limit: 6,
        }
    }
}

/// All derived tables for one dashboard run.
#[derive(Debug, Clone)]
pub struct Rollups {
    /// Active trend window, newest first (at most `trend_days` entries).
    pub window: Vec<DateInfo>,
    pub regional: Vec<Row>,
    pub status_trend: Vec<Row>,
    pub ageing_bucket: Vec<Row>,
    pub status_volume: Vec<Row>,
    pub top_hubs: Vec<Row>,
    /// The day the top-hubs leaderboard describes.
    pub reference_key: Option<String>,
    /// Chart source blocks: date label column plus one series per name.
    pub regional_chart_data: Vec<Row>,
    pub status_chart_data: Vec<Row>,
    /// Summary inputs.
    pub top_region: Option<(String, i64)>,
    pub stuck_average: i64,
    pub top_bucket: Option<String>,
}

/// Round-half-away-from-zero average over the window, 0 for an empty window.
fn window_average(total: u64, window_len: usize) -> i64 {
    if window_len == 0 {
        0
    } else {
        (total as f64 / window_len as f64).round() as i64
    }
}

fn trend_header(first: &str, labels: &[String]) -> Row {
    let mut header = vec![json!(first), json!("Ave L7D"), json!("Total L7D")];
    header.extend(labels.iter().map(|label| json!(label)));
    header
}

fn trend_row(name: &str, average: i64, total: u64, counts: &[u64]) -> Row {
    let mut row = vec![json!(name), json!(average), json!(total)];
    row.extend(counts.iter().map(|count| json!(count)));
    row
}

/// Build every rollup table from one set of counts.
///
/// Deterministic for a given input: every ordering is fully specified, with
/// name-ascending tie-breaks wherever counts collide.
pub fn build_rollups(counts: &BucketedCounts, options: &RollupOptions) -> Rollups {
    let sorted_dates = dates::sort_desc(&counts.date_infos);
    let window: Vec<DateInfo> = sorted_dates
        .iter()
        .take(options.trend_days)
        .cloned()
        .collect();
    let window_keys: Vec<&str> = window.iter().map(|info| info.key.as_str()).collect();
    let window_labels: Vec<String> = window.iter().map(|info| info.label.clone()).collect();

    // Regional trend: every observed region, volume-descending.
    let mut region_entries: Vec<(String, Vec<u64>, u64)> = counts
        .region_date
        .keys()
        .map(|region| {
            let per_date: Vec<u64> = window_keys
                .iter()
                .map(|key| counts.region_date.count(region, key))
                .collect();
            let total = per_date.iter().sum();
            (region.clone(), per_date, total)
        })
        .collect();
    region_entries.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let mut regional = vec![trend_header("Region", &window_labels)];
    for (region, per_date, total) in &region_entries {
        regional.push(trend_row(
            region,
            window_average(*total, window_keys.len()),
            *total,
            per_date,
        ));
    }
    let regional_by_date: Vec<u64> = (0..window_keys.len())
        .map(|index| region_entries.iter().map(|entry| entry.1[index]).sum())
        .collect();
    let regional_grand: u64 = regional_by_date.iter().sum();
    regional.push(trend_row(
        "Total",
        window_average(regional_grand, window_keys.len()),
        regional_grand,
        &regional_by_date,
    ));

    let top_region = region_entries
        .first()
        .map(|(region, _, total)| (region.clone(), window_average(*total, window_keys.len())));

    // Stuck-status trend: the fixed list, in its given order.
    let status_entries: Vec<(String, Vec<u64>, u64)> = options
        .stuck_statuses
        .iter()
        .map(|status| {
            let per_date: Vec<u64> = window_keys
                .iter()
                .map(|key| counts.status_date.count(status, key))
                .collect();
            let total = per_date.iter().sum();
            (status.clone(), per_date, total)
        })
        .collect();

    let mut status_trend = vec![trend_header("Status", &window_labels)];
    for (status, per_date, total) in &status_entries {
        status_trend.push(trend_row(
            status,
            window_average(*total, window_keys.len()),
            *total,
            per_date,
        ));
    }
    let status_by_date: Vec<u64> = (0..window_keys.len())
        .map(|index| status_entries.iter().map(|entry| entry.1[index]).sum())
        .collect();
    let status_grand: u64 = status_by_date.iter().sum();
    let stuck_average = window_average(status_grand, window_keys.len());
    status_trend.push(trend_row(
        "Total",
        stuck_average,
        status_grand,
        &status_by_date,
    ));

    // Ageing buckets: the fixed label pair, share of the pair's own total.
    let bucket_grand: u64 = options
        .bucket_labels
        .iter()
        .map(|label| counts.bucket_totals.get(label))
        .sum();
    let mut ageing_bucket = vec![vec![json!("Ageing Bucket"), json!("Volume"), json!("Percentage")]];
    let mut top_bucket: Option<(String, u64)> = None;
    for label in &options.bucket_labels {
        let count = counts.bucket_totals.get(label);
        let percent = if bucket_grand > 0 {
            count as f64 / bucket_grand as f64
        } else {
            0.0
        };
        ageing_bucket.push(vec![json!(label), json!(count), json!(percent)]);
        match &top_bucket {
            Some((_, best)) if count <= *best => {}
            _ => top_bucket = Some((label.clone(), count)),
        }
    }

    // Status volume: every observed status, not just the stuck list.
    let status_total_all = counts.status_totals.total();
    let mut volume_entries: Vec<(String, u64)> = counts
        .status_totals
        .iter()
        .map(|(status, count)| (status.clone(), count))
        .collect();
    volume_entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    volume_entries.truncate(options.status_volume_limit);

    let mut status_volume = vec![vec![json!("Status"), json!("Volume"), json!("Percentage")]];
    status_volume.push(vec![
        json!("Total"),
        json!(status_total_all),
        json!(if status_total_all > 0 { 1.0 } else { 0.0 }),
    ]);
    for (status, count) in &volume_entries {
        let percent = if status_total_all > 0 {
            *count as f64 / status_total_all as f64
        } else {
            0.0
        };
        status_volume.push(vec![json!(status), json!(count), json!(percent)]);
    }

    // Top hubs for the reference day.
    let hub_keys: BTreeSet<String> = counts.hub_by_date.keys().cloned().collect();
    let reference_key = dates::pick_reference_key(&counts.date_infos, &hub_keys);
    let mut top_hubs = vec![vec![json!("Hub"), json!("Volume"), json!("Percentage")]];
    if let Some(key) = reference_key.as_deref() {
        if let Some(day_counts) = counts.hub_by_date.get(key) {
            let day_total = day_counts.total();
            let mut hub_entries: Vec<(String, u64)> = day_counts
                .iter()
                .map(|(hub, count)| (hub.clone(), count))
                .collect();
            hub_entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            hub_entries.truncate(options.top_hub_limit);
            for (hub, count) in &hub_entries {
                let percent = if day_total > 0 {
                    *count as f64 / day_total as f64
                } else {
                    0.0
                };
                top_hubs.push(vec![json!(hub), json!(count), json!(percent)]);
            }
        }
    }

    // Chart source blocks: one label column, one series per name, window order.
    let chart_regions: Vec<String> = region_entries
        .iter()
        .take(options.chart_region_limit)
        .map(|entry| entry.0.clone())
        .collect();
    let regional_chart_data = chart_block(&window, &chart_regions, |region, key| {
        counts.region_date.count(region, key)
    });
    let status_chart_data = chart_block(&window, &options.stuck_statuses, |status, key| {
        counts.status_date.count(status, key)
    });

    Rollups {
        window,
        regional,
        status_trend,
        ageing_bucket,
        status_volume,
        top_hubs,
        reference_key,
        regional_chart_data,
        status_chart_data,
        top_region,
        stuck_average,
        top_bucket: top_bucket.map(|(label, _)| label),
    }
}

fn chart_block<F>(window: &[DateInfo], series_names: &[String], count: F) -> Vec<Row>
where
    F: Fn(&str, &str) -> u64,
{
    let mut header = vec![json!("Date")];
    header.extend(series_names.iter().map(|name| json!(name)));
    let mut block = vec![header];
    for info in window {
        let mut row = vec![json!(info.label)];
        row.extend(
            series_names
                .iter()
                .map(|name| json!(count(name, &info.key))),
        );
        block.push(row);
    }
    block
}
