//! Typed client for the Google Sheets v4 REST API.
//!
//! Direct HTTP via reqwest: values reads and writes, sheet management, and
//! grid batch updates, with bounded retries on transient failures. Token
//! handling lives in `auth`.

pub mod auth;

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::types::{Row, WriteStats};
use auth::GoogleToken;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Sheet {0} not found")]
    SheetNotFound(String),
    #[error("Sheet ID {0} not found")]
    SheetIdNotFound(i64),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SheetsError {
    /// Transient failures that a later poll cycle may clear.
    pub fn is_retryable(&self) -> bool {
        match self {
            SheetsError::Http(err) => err.is_timeout() || err.is_connect(),
            SheetsError::Api { status, .. } => {
                *status == 429 || *status == 408 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(base)
}

/// Send a request, retrying transient failures with backoff.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, SheetsError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(SheetsError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status_is_retryable(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "sheets retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                if (err.is_timeout() || err.is_connect()) && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "sheets retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(SheetsError::Http(err));
            }
        }
    }
    Err(SheetsError::RefreshFailed("request exhausted retries".to_string()))
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
pub struct SpreadsheetMeta {
    #[serde(default)]
    pub sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
pub struct SheetMeta {
    pub properties: SheetProperties,
    #[serde(default)]
    pub charts: Vec<EmbeddedChart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedChart {
    #[serde(default)]
    pub chart_id: i64,
    #[serde(default)]
    pub position: Option<ChartPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPosition {
    #[serde(default)]
    pub overlay_position: Option<OverlayPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPosition {
    #[serde(default)]
    pub anchor_cell: Option<AnchorCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorCell {
    #[serde(default)]
    pub sheet_id: i64,
}

impl EmbeddedChart {
    /// Sheet the chart is overlaid on, if it has an overlay anchor.
    pub fn anchor_sheet_id(&self) -> Option<i64> {
        self.position
            .as_ref()?
            .overlay_position
            .as_ref()?
            .anchor_cell
            .as_ref()
            .map(|cell| cell.sheet_id)
    }
}

impl SpreadsheetMeta {
    pub fn sheet_id_by_title(&self, title: &str) -> Option<i64> {
        self.sheets
            .iter()
            .find(|sheet| sheet.properties.title == title)
            .map(|sheet| sheet.properties.sheet_id)
    }

    pub fn title_by_sheet_id(&self, sheet_id: i64) -> Option<&str> {
        self.sheets
            .iter()
            .find(|sheet| sheet.properties.sheet_id == sheet_id)
            .map(|sheet| sheet.properties.title.as_str())
    }
}

/// How values come back: rendered as displayed, or raw underlying values
/// (numbers stay numbers, dates stay day serials).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRender {
    Formatted,
    Unformatted,
}

/// Write interpretation: raw strings, or parsed as if typed into the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInput {
    Raw,
    UserEntered,
}

impl ValueInput {
    fn as_str(self) -> &'static str {
        match self {
            ValueInput::Raw => "RAW",
            ValueInput::UserEntered => "USER_ENTERED",
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Sheets API client with a cached, self-refreshing token.
pub struct SheetsClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    /// Cached token; the lock also serializes concurrent refreshes.
    token: Mutex<Option<GoogleToken>>,
}

impl SheetsClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("http client");
        SheetsClient {
            http,
            retry: RetryPolicy::default(),
            token: Mutex::new(None),
        }
    }

    /// Valid access token, refreshing through the cached token if expired.
    async fn access_token(&self) -> Result<String, SheetsError> {
        let mut guard = self.token.lock().await;
        if guard.is_none() {
            *guard = Some(auth::load_token()?);
        }
        let current = guard.as_ref().cloned().expect("token cached above");
        if auth::is_token_expired(&current) {
            let refreshed = auth::refresh_access_token(&self.http, &current).await?;
            *guard = Some(refreshed);
        }
        Ok(guard.as_ref().expect("token cached above").token.clone())
    }

    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = reqwest::Url::parse(SHEETS_BASE).expect("fixed base URL");
        {
            let mut path = url.path_segments_mut().expect("https base");
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SheetsError::AuthExpired);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Read a single range.
    pub async fn values_get(
        &self,
        spreadsheet_id: &str,
        range: &str,
        render: ValueRender,
    ) -> Result<Vec<Row>, SheetsError> {
        let token = self.access_token().await?;
        let mut url = self.url(&[spreadsheet_id, "values", range]);
        if render == ValueRender::Unformatted {
            url.query_pairs_mut()
                .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
        }
        let request = self.http.get(url).bearer_auth(token);
        let response = Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        let body: ValueRange = response.json().await?;
        Ok(body.values)
    }

    /// Read several ranges in one round trip, in request order.
    pub async fn values_batch_get(
        &self,
        spreadsheet_id: &str,
        ranges: &[String],
    ) -> Result<Vec<Vec<Row>>, SheetsError> {
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.access_token().await?;
        let mut url = self.url(&[spreadsheet_id, "values:batchGet"]);
        {
            let mut pairs = url.query_pairs_mut();
            for range in ranges {
                pairs.append_pair("ranges", range);
            }
        }
        let request = self.http.get(url).bearer_auth(token);
        let response = Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        let body: BatchGetResponse = response.json().await?;
        Ok(body.value_ranges.into_iter().map(|vr| vr.values).collect())
    }

    /// Write values starting at a range anchor.
    pub async fn values_update(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Row],
        input: ValueInput,
    ) -> Result<WriteStats, SheetsError> {
        if values.is_empty() {
            return Ok(WriteStats {
                updated_range: range.to_string(),
                ..WriteStats::default()
            });
        }
        let token = self.access_token().await?;
        let mut url = self.url(&[spreadsheet_id, "values", range]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", input.as_str());
        let request = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&json!({ "values": values }));
        let response = Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        Ok(response.json().await?)
    }

    /// Write several ranges in one round trip.
    pub async fn values_batch_update(
        &self,
        spreadsheet_id: &str,
        data: &[(String, Vec<Row>)],
        input: ValueInput,
    ) -> Result<(), SheetsError> {
        if data.is_empty() {
            return Ok(());
        }
        let token = self.access_token().await?;
        let url = self.url(&[spreadsheet_id, "values:batchUpdate"]);
        let payload = json!({
            "valueInputOption": input.as_str(),
            "data": data
                .iter()
                .map(|(range, values)| json!({ "range": range, "values": values }))
                .collect::<Vec<_>>(),
        });
        let request = self.http.post(url).bearer_auth(token).json(&payload);
        Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        Ok(())
    }

    /// Clear a range (or a whole sheet when given a bare sheet name).
    pub async fn values_clear(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<(), SheetsError> {
        let token = self.access_token().await?;
        let url = self.url(&[spreadsheet_id, "values", &format!("{}:clear", range)]);
        let request = self.http.post(url).bearer_auth(token).json(&json!({}));
        Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        Ok(())
    }

    /// Grid-level batch update (addSheet, addChart, repeatCell, ...).
    pub async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<(), SheetsError> {
        if requests.is_empty() {
            return Ok(());
        }
        let token = self.access_token().await?;
        let url = self.url(&[&format!("{}:batchUpdate", spreadsheet_id)]);
        let request = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }));
        Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        Ok(())
    }

    /// Spreadsheet metadata without grid data: sheet properties and charts.
    pub async fn spreadsheet_meta(
        &self,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetMeta, SheetsError> {
        let token = self.access_token().await?;
        let mut url = self.url(&[spreadsheet_id]);
        url.query_pairs_mut().append_pair("includeGridData", "false");
        let request = self.http.get(url).bearer_auth(token);
        let response = Self::expect_success(send_with_retry(request, &self.retry).await?).await?;
        Ok(response.json().await?)
    }

    /// Create the sheet if no sheet with this title exists yet.
    pub async fn ensure_sheet_exists(
        &self,
        spreadsheet_id: &str,
        title: &str,
    ) -> Result<(), SheetsError> {
        let meta = self.spreadsheet_meta(spreadsheet_id).await?;
        if meta.sheet_id_by_title(title).is_some() {
            return Ok(());
        }
        self.batch_update(
            spreadsheet_id,
            vec![json!({ "addSheet": { "properties": { "title": title } } })],
        )
        .await
    }

    /// Resolve a sheet title from its numeric gid.
    pub async fn sheet_title_by_id(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
    ) -> Result<String, SheetsError> {
        let meta = self.spreadsheet_meta(spreadsheet_id).await?;
        meta.title_by_sheet_id(sheet_id)
            .map(|title| title.to_string())
            .ok_or(SheetsError::SheetIdNotFound(sheet_id))
    }
}

impl Default for SheetsClient {
    fn default() -> Self {
        Self::new()
    }
}
