//! Native Google API access over plain HTTP.
//!
//! Modules:
//! - gmail: Gmail API v1 (labels, threads, message bodies)
//! - sheets: Sheets API v4 (values read / batch update / append)
//! - gemini: Gemini generateContent (text classification)
//!
//! OAuth token format matches what google-auth writes; the interactive
//! consent flow is out of scope — the token file must already exist.

pub mod gemini;
pub mod gmail;
pub mod sheets;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// OAuth2 token payload persisted at ~/.jobtrail/google/token.json.
///
/// Both `token` and `access_token` are accepted on read for compatibility
/// with tokens written by other Google client libraries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    #[serde(alias = "access_token")]
    pub token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Retry policy
// ============================================================================

/// Bounded-retry settings shared by the Gmail, Sheets and Gemini clients.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): the base delay
    /// doubled per attempt up to the cap, plus up to 200ms of jitter so
    /// overlapping scheduled runs don't hammer the API in lockstep.
    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let scaled = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        scaled + Duration::from_micros(u64::from(nanos % 200_000))
    }
}

/// Parse a numeric Retry-After header value, capped so a single header
/// cannot stall the run's time budget.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(30)))
}

fn transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Send a request, retrying 429/5xx statuses and timeout/connect failures
/// under the policy. The server's Retry-After wins over computed backoff.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GoogleApiError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match request.try_clone() {
            Some(req) => req.send().await,
            // A non-replayable body gets exactly one shot.
            None => return request.send().await.map_err(GoogleApiError::Http),
        };

        let delay = if attempt >= attempts {
            None
        } else {
            match &outcome {
                Ok(resp) if transient_status(resp.status()) => Some(
                    resp.headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after)
                        .unwrap_or_else(|| policy.backoff(attempt)),
                ),
                Err(e) if e.is_timeout() || e.is_connect() => Some(policy.backoff(attempt)),
                _ => None,
            }
        };

        let Some(delay) = delay else {
            return outcome.map_err(GoogleApiError::Http);
        };
        match &outcome {
            Ok(resp) => log::warn!(
                "google call attempt {}/{} got status {}; retrying in {:?}",
                attempt,
                attempts,
                resp.status(),
                delay
            ),
            Err(e) => log::warn!(
                "google call attempt {}/{} failed ({}); retrying in {:?}",
                attempt,
                attempts,
                e,
                delay
            ),
        }
        tokio::time::sleep(delay).await;
    }
}

// ============================================================================
// Token I/O
// ============================================================================

/// Path to the Google token file.
pub fn token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".jobtrail")
        .join("google")
        .join("token.json")
}

pub fn load_token() -> Result<GoogleToken, GoogleApiError> {
    let path = token_path();
    if !path.exists() {
        return Err(GoogleApiError::TokenNotFound(path));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_token(token: &GoogleToken) -> Result<(), GoogleApiError> {
    let path = token_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(token)?)?;
    Ok(())
}

/// Check expiry with a 60-second safety margin. Unparseable or absent
/// expiries are treated as expired so a refresh gets attempted.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    match &token.expiry {
        None => true,
        Some(expiry_str) => {
            match chrono::DateTime::parse_from_rfc3339(&expiry_str.replace('Z', "+00:00"))
                .or_else(|_| chrono::DateTime::parse_from_rfc3339(expiry_str))
            {
                Ok(expiry) => expiry <= chrono::Utc::now() + chrono::Duration::seconds(60),
                Err(_) => true,
            }
        }
    }
}

/// Refresh the access token using the refresh token and persist the
/// updated payload.
pub async fn refresh_access_token(token: &GoogleToken) -> Result<GoogleToken, GoogleApiError> {
    let refresh_token = token
        .refresh_token
        .as_ref()
        .ok_or(GoogleApiError::AuthExpired)?;

    let mut form = vec![
        ("client_id", token.client_id.as_str()),
        ("refresh_token", refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = token.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }

    let client = reqwest::Client::new();
    let resp = client.post(&token.token_uri).form(&form).send().await?;
    let status = resp.status();
    let body_text = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let lowered = body_text.to_lowercase();
        if (status.as_u16() == 400 || status.as_u16() == 401)
            && lowered.contains("invalid_grant")
        {
            return Err(GoogleApiError::AuthExpired);
        }
        return Err(GoogleApiError::RefreshFailed(format!(
            "HTTP {}: {}",
            status, body_text
        )));
    }

    let body: serde_json::Value = serde_json::from_str(&body_text)?;
    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| GoogleApiError::RefreshFailed("No access_token in response".into()))?;
    let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
    let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

    let mut new_token = token.clone();
    new_token.token = access_token.to_string();
    new_token.expiry = Some(expiry.to_rfc3339());
    save_token(&new_token)?;
    Ok(new_token)
}

/// Main entry point for API calls: a valid access token, refreshed when
/// expired.
pub async fn get_valid_access_token() -> Result<String, GoogleApiError> {
    let token = load_token()?;
    if is_token_expired(&token) {
        let refreshed = refresh_access_token(&token).await?;
        Ok(refreshed.token)
    } else {
        Ok(token.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<String>) -> GoogleToken {
        GoogleToken {
            token: "ya29.test".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: default_token_uri(),
            client_id: "client".to_string(),
            client_secret: None,
            expiry,
        }
    }

    #[test]
    fn test_token_access_token_alias() {
        let json = r#"{
            "access_token": "ya29.alias",
            "refresh_token": "1//refresh",
            "client_id": "client"
        }"#;
        let parsed: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.token, "ya29.alias");
        assert_eq!(parsed.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_expired_without_expiry() {
        assert!(is_token_expired(&token(None)));
    }

    #[test]
    fn test_expired_in_past() {
        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        assert!(is_token_expired(&token(Some(past.to_rfc3339()))));
    }

    #[test]
    fn test_not_expired_in_future() {
        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        assert!(!is_token_expired(&token(Some(future.to_rfc3339()))));
    }

    #[test]
    fn test_expired_with_micros_z_format() {
        assert!(is_token_expired(&token(Some(
            "2020-02-08T12:00:00.000000Z".to_string()
        ))));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_parse_retry_after_capped() {
        assert_eq!(parse_retry_after("600"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_retry_after_non_numeric() {
        // HTTP-date Retry-After values fall back to computed backoff.
        assert_eq!(parse_retry_after("Wed, 05 Aug 2026 09:00:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        let first = policy.backoff(1);
        let third = policy.backoff(3);
        let tenth = policy.backoff(10);
        assert!(first >= policy.base_delay);
        assert!(third >= first);
        assert!(tenth >= policy.max_delay);
        assert!(tenth <= policy.max_delay + Duration::from_millis(200));
    }
}
