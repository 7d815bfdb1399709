//! Environment-driven service configuration.
//!
//! Everything the binary needs comes from the process environment: the HTTP
//! port, the polling job list (JSON), pivot range bindings for the browser
//! dashboard, and optional keepalive pings. Bad values log a warning and fall
//! back to defaults rather than aborting startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dashboard::DashboardOptions;
use crate::types::{DestinationSpec, SourceSpec};

/// One polling job as configured, before normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollJob {
    pub source: SourceSpec,
    pub destination: DestinationSpec,
    #[serde(default)]
    pub remove_columns: Vec<usize>,
    #[serde(default)]
    pub keep_columns: Vec<String>,
    #[serde(default)]
    pub header_row_index: usize,
    #[serde(default = "crate::types::default_clear_destination")]
    pub clear_destination: bool,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub job_key: Option<String>,
}

/// Pivot range bindings for the browser dashboard's API endpoints.
#[derive(Debug, Clone, Default)]
pub struct PivotConfig {
    pub spreadsheet_id: Option<String>,
    pub gid: Option<i64>,
    pub regional: Option<String>,
    pub stuckup: Option<String>,
    pub ageing: Option<String>,
    pub top_hubs: Option<String>,
    pub validation_trend: Option<String>,
    pub stuckup_trend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PingConfig {
    pub url: String,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub poll_jobs: Vec<PollJob>,
    pub default_poll_interval: Duration,
    pub state_path: PathBuf,
    pub pivots: PivotConfig,
    pub ping: Option<PingConfig>,
    pub dashboard: DashboardOptions,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".sheetflow")
        .join("poller-state.json")
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env_var("PORT")
            .and_then(|value| value.parse().ok())
            .unwrap_or(3000);

        let poll_jobs = match env_var("POLL_JOBS_JSON") {
            Some(raw) => match serde_json::from_str::<Vec<PollJob>>(&raw) {
                Ok(jobs) => jobs,
                Err(err) => {
                    log::error!("config: invalid POLL_JOBS_JSON: {}", err);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let default_poll_interval = env_var("POLL_INTERVAL_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(60_000));

        let state_path = env_var("POLL_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_path);

        let pivots = PivotConfig {
            spreadsheet_id: env_var("PIVOT_SPREADSHEET_ID"),
            gid: env_var("PIVOT_GID").and_then(|value| value.parse().ok()),
            regional: env_var("PIVOT_RANGE"),
            stuckup: env_var("PIVOT_STUCKUP_RANGE"),
            ageing: env_var("PIVOT_AGEING_RANGE"),
            top_hubs: env_var("PIVOT_TOP_HUBS_RANGE"),
            validation_trend: env_var("PIVOT_VALIDATION_TREND_RANGE"),
            stuckup_trend: env_var("PIVOT_STUCKUP_TREND_RANGE"),
        };

        let ping = env_var("PING_URL").and_then(|url| {
            let interval_ms = env_var("PING_INTERVAL_MS")
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(600_000);
            if interval_ms == 0 {
                log::warn!("config: invalid PING_INTERVAL_MS; skipping pings");
                return None;
            }
            Some(PingConfig {
                url,
                interval: Duration::from_millis(interval_ms),
            })
        });

        let dashboard = match env_var("DASHBOARD_OPTIONS_JSON") {
            Some(raw) => match serde_json::from_str::<DashboardOptions>(&raw) {
                Ok(options) => options,
                Err(err) => {
                    log::error!("config: invalid DASHBOARD_OPTIONS_JSON: {}", err);
                    DashboardOptions::default()
                }
            },
            None => DashboardOptions::default(),
        };

        AppConfig {
            port,
            poll_jobs,
            default_poll_interval,
            state_path,
            pivots,
            ping,
            dashboard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_job_json_round_trip() {
        let jobs: Vec<PollJob> = serde_json::from_str(
            r#"[{
                "source": { "spreadsheetId": "src", "range": "Data!A:O" },
                "destination": { "spreadsheetId": "dst", "sheetName": "Raw", "dashboard": true },
                "headerRowIndex": 0,
                "pollIntervalMs": 30000
            }]"#,
        )
        .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].poll_interval_ms, Some(30_000));
        assert!(jobs[0].clear_destination);
        assert!(jobs[0].keep_columns.is_empty());
    }

    #[test]
    fn dashboard_options_json_overrides_columns() {
        let options: DashboardOptions = serde_json::from_str(
            r#"{
                "columns": { "date": 0, "hub": 2, "bucket": 5, "region": 7, "status": 8 },
                "rollup": { "trendDays": 14 }
            }"#,
        )
        .unwrap();
        assert_eq!(options.columns.hub, 2);
        assert_eq!(options.rollup.trend_days, 14);
        // Untouched knobs keep their defaults.
        assert_eq!(options.rollup.top_hub_limit, 5);
        assert_eq!(options.rollup.stuck_statuses.len(), 7);
    }
}
