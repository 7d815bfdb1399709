//! Polling loops that mirror source ranges on an interval.
//!
//! Each configured job gets its own loop: read the watched ranges, hash the
//! snapshot, and only run the import when the hash moved. Last-run metadata
//! lives in a job registry owned by a single scheduler side, persisted
//! through an injected store so tests can swap in a fake.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PollJob;
use crate::dashboard::DashboardOptions;
use crate::error::ImportError;
use crate::sheets::SheetsClient;
use crate::types::{DestinationSpec, Row, SourceSpec};
use crate::workflow;

/// A normalized, runnable polling job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub source: SourceSpec,
    pub destination: DestinationSpec,
    pub remove_columns: Vec<usize>,
    pub keep_columns: Vec<String>,
    pub header_row_index: usize,
    pub clear_destination: bool,
    pub poll_interval_ms: Option<u64>,
    pub job_name: String,
    pub job_key: String,
}

impl JobSpec {
    pub fn interval(&self, default: Duration) -> Duration {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default)
    }
}

/// Validate and normalize a configured job. Jobs missing a source range or a
/// resolvable destination are dropped.
pub fn normalize_job(job: PollJob) -> Option<JobSpec> {
    let ranges = job.source.all_ranges();
    if job.source.spreadsheet_id.is_empty() || ranges.is_empty() {
        return None;
    }
    if job.destination.spreadsheet_id.is_empty()
        || (job.destination.sheet_name.is_none() && job.destination.gid.is_none())
    {
        return None;
    }

    let suffix = if let Some(gid) = job.source.gid {
        format!(":{}", gid)
    } else if let Some(sheet_name) = &job.source.sheet_name {
        format!(":{}", sheet_name)
    } else {
        String::new()
    };
    let source_key = format!(
        "{}:{}{}",
        job.source.spreadsheet_id,
        ranges.join("|"),
        suffix
    );

    Some(JobSpec {
        source: job.source,
        destination: job.destination,
        remove_columns: job.remove_columns,
        keep_columns: job.keep_columns,
        header_row_index: job.header_row_index,
        clear_destination: job.clear_destination,
        poll_interval_ms: job.poll_interval_ms.filter(|ms| *ms > 0),
        job_name: job.job_name.unwrap_or_else(|| source_key.clone()),
        job_key: job.job_key.unwrap_or(source_key),
    })
}

/// Last-run metadata for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub last_hash: Option<String>,
    pub last_run_at: Option<String>,
    pub last_updated_at: Option<String>,
    pub last_error: Option<String>,
}

/// Snapshot served by `/polling/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_name: String,
    pub job_key: String,
    pub source: SourceSpec,
    pub destination: DestinationSpec,
    pub poll_interval_ms: Option<u64>,
    #[serde(flatten)]
    pub state: JobState,
}

/// Persistence seam for registry state. Saves are best-effort.
pub trait StateStore: Send + Sync {
    fn load(&self) -> BTreeMap<String, JobState>;
    fn save(&self, states: &BTreeMap<String, JobState>);
}

/// JSON file store, the production backend.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        JsonFileStore { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> BTreeMap<String, JobState> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        }
    }

    fn save(&self, states: &BTreeMap<String, JobState>) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(states)?;
            std::fs::write(&self.path, json)
        };
        if let Err(err) = write() {
            log::warn!("poller: failed to persist state: {}", err);
        }
    }
}

/// Job identity -> last-run metadata, owned by the polling side and read by
/// the status endpoint.
pub struct JobRegistry {
    jobs: Vec<JobSpec>,
    states: Mutex<BTreeMap<String, JobState>>,
    store: Box<dyn StateStore>,
}

impl JobRegistry {
    /// Build the registry, seeding job state from the persisted store.
    pub fn new(jobs: Vec<JobSpec>, store: Box<dyn StateStore>) -> Arc<Self> {
        let persisted = store.load();
        let mut states = BTreeMap::new();
        for job in &jobs {
            let state = persisted
                .get(&job.job_key)
                .filter(|state| state.last_hash.is_some())
                .cloned()
                .unwrap_or_default();
            states.insert(job.job_key.clone(), state);
        }
        Arc::new(JobRegistry {
            jobs,
            states: Mutex::new(states),
            store,
        })
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn state(&self, job_key: &str) -> JobState {
        self.states
            .lock()
            .map(|states| states.get(job_key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Mutate one job's state and persist the whole map.
    pub fn record(&self, job_key: &str, update: impl FnOnce(&mut JobState)) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        update(states.entry(job_key.to_string()).or_default());
        self.store.save(&states);
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.jobs
            .iter()
            .map(|job| JobStatus {
                job_name: job.job_name.clone(),
                job_key: job.job_key.clone(),
                source: job.source.clone(),
                destination: job.destination.clone(),
                poll_interval_ms: job.poll_interval_ms,
                state: self.state(&job.job_key),
            })
            .collect()
    }
}

/// Canonical hash of one snapshot: ranges plus every value read from them.
pub fn snapshot_hash(ranges: &[String], values: &[Vec<Row>]) -> String {
    let payload = serde_json::json!({ "ranges": ranges, "values": values });
    let json = serde_json::to_string(&payload).unwrap_or_default();
    hex::encode(Sha256::digest(json.as_bytes()))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Spawn one polling loop per registered job.
pub fn spawn_polling(
    client: Arc<SheetsClient>,
    registry: Arc<JobRegistry>,
    default_interval: Duration,
    dashboard: Arc<DashboardOptions>,
) {
    for job in registry.jobs().to_vec() {
        let client = Arc::clone(&client);
        let registry = Arc::clone(&registry);
        let dashboard = Arc::clone(&dashboard);
        tokio::spawn(async move {
            run_job_loop(client, registry, job, default_interval, dashboard).await;
        });
    }
}

/// One job's loop. The sleep-then-work shape keeps at most one import in
/// flight per job.
async fn run_job_loop(
    client: Arc<SheetsClient>,
    registry: Arc<JobRegistry>,
    job: JobSpec,
    default_interval: Duration,
    dashboard: Arc<DashboardOptions>,
) {
    let interval = job.interval(default_interval);
    loop {
        tokio::time::sleep(interval).await;

        match poll_once(&client, &registry, &job, &dashboard).await {
            Ok(Some(updated_rows)) => {
                log::info!(
                    "poller: updated {} ({} rows) at {}",
                    job.job_name,
                    updated_rows,
                    now_rfc3339()
                );
            }
            Ok(None) => {}
            Err(err) => {
                let message = err.to_string();
                registry.record(&job.job_key, |state| {
                    state.last_error = Some(message.clone());
                    state.last_run_at = Some(now_rfc3339());
                });
                log::error!("poller: {} failed: {}", job.job_name, err);
            }
        }
    }
}

/// Run one poll cycle. Returns `Ok(None)` when the snapshot hash is
/// unchanged and the import was skipped.
async fn poll_once(
    client: &SheetsClient,
    registry: &JobRegistry,
    job: &JobSpec,
    dashboard: &DashboardOptions,
) -> Result<Option<u64>, ImportError> {
    let resolved = workflow::resolve_source_ranges(client, &job.source).await?;

    let range_values: Vec<Vec<Row>> = if resolved.ranges.len() == 1 {
        vec![
            client
                .values_get(
                    &job.source.spreadsheet_id,
                    &resolved.ranges[0],
                    crate::sheets::ValueRender::Formatted,
                )
                .await?,
        ]
    } else {
        client
            .values_batch_get(&job.source.spreadsheet_id, &resolved.ranges)
            .await?
    };

    let next_hash = snapshot_hash(&resolved.ranges, &range_values);
    let previous = registry.state(&job.job_key);
    registry.record(&job.job_key, |state| {
        state.last_run_at = Some(now_rfc3339());
    });

    if previous.last_hash.as_deref() == Some(next_hash.as_str()) {
        registry.record(&job.job_key, |state| {
            state.last_error = None;
        });
        return Ok(None);
    }

    let import_index = resolved
        .ranges
        .iter()
        .position(|range| range == &resolved.import_range)
        .unwrap_or_else(|| {
            log::warn!(
                "poller: {} import range not found; using {}",
                job.job_name,
                resolved.ranges[0]
            );
            0
        });
    let rows = range_values
        .get(import_index)
        .cloned()
        .unwrap_or_default();

    let stats = workflow::import_rows(
        client,
        workflow::ImportParams {
            rows,
            destination: &job.destination,
            remove_columns: &job.remove_columns,
            keep_columns: &job.keep_columns,
            header_row_index: job.header_row_index,
            clear_destination: job.clear_destination,
        },
        dashboard,
    )
    .await?;

    registry.record(&job.job_key, |state| {
        state.last_hash = Some(next_hash.clone());
        state.last_updated_at = Some(now_rfc3339());
        state.last_error = None;
    });

    Ok(Some(stats.updated_rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_json(value: serde_json::Value) -> PollJob {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalize_derives_key_from_source() {
        let job = job_json(json!({
            "source": { "spreadsheetId": "src", "ranges": ["Data!A:O"], "gid": 42 },
            "destination": { "spreadsheetId": "dst", "sheetName": "Raw" },
        }));
        let spec = normalize_job(job).unwrap();
        assert_eq!(spec.job_key, "src:Data!A:O:42");
        assert_eq!(spec.job_name, spec.job_key);
        assert!(spec.clear_destination);
    }

    #[test]
    fn normalize_rejects_incomplete_jobs() {
        // No source ranges.
        assert!(normalize_job(job_json(json!({
            "source": { "spreadsheetId": "src" },
            "destination": { "spreadsheetId": "dst", "sheetName": "Raw" },
        })))
        .is_none());
        // Destination without sheetName or gid.
        assert!(normalize_job(job_json(json!({
            "source": { "spreadsheetId": "src", "range": "A:O" },
            "destination": { "spreadsheetId": "dst" },
        })))
        .is_none());
    }

    #[test]
    fn explicit_names_survive_normalization() {
        let job = job_json(json!({
            "source": { "spreadsheetId": "src", "range": "A:O", "sheetName": "Data" },
            "destination": { "spreadsheetId": "dst", "gid": 7 },
            "jobName": "daily mirror",
            "pollIntervalMs": 30000,
        }));
        let spec = normalize_job(job).unwrap();
        assert_eq!(spec.job_name, "daily mirror");
        assert_eq!(spec.job_key, "src:A:O:Data");
        assert_eq!(spec.interval(Duration::from_secs(60)), Duration::from_secs(30));
    }

    #[test]
    fn snapshot_hash_is_stable_and_value_sensitive() {
        let ranges = vec!["Data!A:O".to_string()];
        let values = vec![vec![vec![json!("a"), json!(1)]]];
        let first = snapshot_hash(&ranges, &values);
        let second = snapshot_hash(&ranges, &values);
        assert_eq!(first, second);

        let changed = vec![vec![vec![json!("a"), json!(2)]]];
        assert_ne!(first, snapshot_hash(&ranges, &changed));
        assert_ne!(
            first,
            snapshot_hash(&["Data!A:P".to_string()], &values)
        );
    }

    #[test]
    fn json_file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = JsonFileStore::new(path.clone());

        assert!(store.load().is_empty());

        let mut states = BTreeMap::new();
        states.insert(
            "job-1".to_string(),
            JobState {
                last_hash: Some("abc".to_string()),
                last_run_at: Some("2024-06-05T00:00:00+00:00".to_string()),
                last_updated_at: None,
                last_error: None,
            },
        );
        store.save(&states);

        let loaded = JsonFileStore::new(path).load();
        assert_eq!(loaded.get("job-1").unwrap().last_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn registry_seeds_from_store_and_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut seeded = BTreeMap::new();
        seeded.insert(
            "src:A:O".to_string(),
            JobState {
                last_hash: Some("seed".to_string()),
                ..JobState::default()
            },
        );
        JsonFileStore::new(path.clone()).save(&seeded);

        let job = normalize_job(job_json(json!({
            "source": { "spreadsheetId": "src", "range": "A:O" },
            "destination": { "spreadsheetId": "dst", "sheetName": "Raw" },
        })))
        .unwrap();
        let registry = JobRegistry::new(vec![job], Box::new(JsonFileStore::new(path.clone())));

        assert_eq!(registry.state("src:A:O").last_hash.as_deref(), Some("seed"));

        registry.record("src:A:O", |state| {
            state.last_hash = Some("next".to_string());
        });
        let reloaded = JsonFileStore::new(path).load();
        assert_eq!(reloaded.get("src:A:O").unwrap().last_hash.as_deref(), Some("next"));

        let status = registry.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].state.last_hash.as_deref(), Some("next"));
    }
}
