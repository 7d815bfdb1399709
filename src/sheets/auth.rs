//! OAuth2 token persistence and refresh for the Sheets API.
//!
//! Token format stays compatible with what Google's Python oauth library
//! writes, so a token minted by any standard consent flow drops straight in.
//! Both `token` and `access_token` are accepted on read.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::SheetsError;

/// OAuth2 token payload persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    /// The access token.
    #[serde(alias = "access_token")]
    pub token: String,
    /// Long-lived refresh token used to mint new access tokens.
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Token expiry time (ISO 8601).
    #[serde(default)]
    pub expiry: Option<String>,
    /// Authenticated account email.
    #[serde(default, alias = "email")]
    pub account: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Token file location: `SHEETFLOW_GOOGLE_TOKEN` wins, otherwise
/// `~/.sheetflow/google/token.json`.
pub fn token_path() -> PathBuf {
    if let Ok(path) = std::env::var("SHEETFLOW_GOOGLE_TOKEN") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_default()
        .join(".sheetflow")
        .join("google")
        .join("token.json")
}

pub fn load_token() -> Result<GoogleToken, SheetsError> {
    let path = token_path();
    if !path.exists() {
        return Err(SheetsError::TokenNotFound(path));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_token(token: &GoogleToken) -> Result<(), SheetsError> {
    let path = token_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(token)?)?;
    Ok(())
}

/// A token counts as expired within 60 seconds of its recorded expiry, or
/// when the expiry is missing or unparseable — refresh decides from there.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    let Some(expiry_str) = &token.expiry else {
        return true;
    };
    match chrono::DateTime::parse_from_rfc3339(&expiry_str.replace('Z', "+00:00"))
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(expiry_str))
    {
        Ok(expiry) => expiry <= chrono::Utc::now() + chrono::Duration::seconds(60),
        Err(_) => true,
    }
}

/// Refresh the access token. Returns the updated token and persists it.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token: &GoogleToken,
) -> Result<GoogleToken, SheetsError> {
    let refresh_token = token
        .refresh_token
        .as_ref()
        .ok_or(SheetsError::AuthExpired)?;

    let mut form = vec![
        ("client_id", token.client_id.as_str()),
        ("refresh_token", refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = token.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }

    let resp = http.post(&token.token_uri).form(&form).send().await?;
    let status = resp.status();
    let body_text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(map_refresh_error(status.as_u16(), &body_text));
    }
    let body: serde_json::Value = serde_json::from_str(&body_text)?;

    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| SheetsError::RefreshFailed("No access_token in response".into()))?;
    let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
    let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

    let mut new_token = token.clone();
    new_token.token = access_token.to_string();
    new_token.expiry = Some(expiry.to_rfc3339());

    save_token(&new_token)?;
    Ok(new_token)
}

fn map_refresh_error(status: u16, body: &str) -> SheetsError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("token has been expired"))
    {
        return SheetsError::AuthExpired;
    }
    SheetsError::RefreshFailed(format!("HTTP {}: {}", status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_expiry(expiry: Option<String>) -> GoogleToken {
        GoogleToken {
            token: "t".to_string(),
            refresh_token: Some("r".to_string()),
            token_uri: default_token_uri(),
            client_id: "c".to_string(),
            client_secret: None,
            scopes: Vec::new(),
            expiry,
            account: None,
        }
    }

    #[test]
    fn python_style_token_deserializes() {
        let token: GoogleToken = serde_json::from_str(
            r#"{
                "token": "abc",
                "refresh_token": "def",
                "client_id": "cid",
                "scopes": ["https://www.googleapis.com/auth/spreadsheets"],
                "expiry": "2030-01-01T00:00:00Z",
                "account": "ops@example.com"
            }"#,
        )
        .unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(token.token_uri, default_token_uri());
    }

    #[test]
    fn access_token_alias_accepted() {
        let token: GoogleToken = serde_json::from_str(
            r#"{"access_token": "abc", "refresh_token": null, "client_id": "cid"}"#,
        )
        .unwrap();
        assert_eq!(token.token, "abc");
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        assert!(is_token_expired(&token_with_expiry(None)));
        assert!(is_token_expired(&token_with_expiry(Some("garbage".into()))));
    }

    #[test]
    fn future_expiry_is_valid() {
        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        assert!(!is_token_expired(&token_with_expiry(Some(future))));
        assert!(is_token_expired(&token_with_expiry(Some(
            "2020-01-01T00:00:00Z".into()
        ))));
    }
}
