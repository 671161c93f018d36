//! Intuit OAuth2 refresh flow and token persistence.
//!
//! Tokens live at `~/.shopmetrics/quickbooks/token.json` with 0600
//! permissions. Refresh tokens rotate on every refresh, so the saved copy
//! always supersedes the one from the environment.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::QuickBooksError;

const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const COMPANYINFO_BASE: &str = "https://quickbooks.api.intuit.com/v3/company";

/// Refresh tokens a little early to absorb clock skew.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickBooksToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// RFC 3339 instant after which the access token is stale.
    #[serde(default)]
    pub expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn token_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".shopmetrics").join("quickbooks").join("token.json"))
}

/// Load the saved token, if any. Missing or malformed files read as None.
pub fn load_token() -> Option<QuickBooksToken> {
    let path = token_path()?;
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Persist the token atomically with owner-only permissions.
pub fn save_token(token: &QuickBooksToken) -> Result<(), QuickBooksError> {
    let Some(path) = token_path() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
        }
    }

    let json = serde_json::to_string_pretty(token)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// A token with no parseable expiry is treated as expired.
pub fn is_token_expired(token: &QuickBooksToken) -> bool {
    let Some(expiry) = &token.expiry else {
        return true;
    };
    let Ok(expiry) = DateTime::parse_from_rfc3339(expiry) else {
        return true;
    };
    Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry.with_timezone(&Utc)
}

/// Exchange a refresh token for a fresh access token and persist the result.
pub async fn refresh_access_token(
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<QuickBooksToken, QuickBooksError> {
    let client = reqwest::Client::new();
    let resp = client
        .post(TOKEN_ENDPOINT)
        .basic_auth(&config.client_id, Some(&config.client_secret))
        .header("Accept", "application/json")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(QuickBooksError::RefreshFailed(format!(
            "{}: {}",
            status.as_u16(),
            body
        )));
    }

    let parsed: TokenResponse = resp.json().await?;
    let expiry = parsed
        .expires_in
        .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());
    let token = QuickBooksToken {
        access_token: parsed.access_token,
        // Intuit rotates refresh tokens; keep the old one if none came back.
        refresh_token: parsed.refresh_token.or_else(|| Some(refresh_token.to_string())),
        expiry,
    };
    save_token(&token)?;
    Ok(token)
}

/// Return a usable access token, refreshing if the saved one is stale.
pub async fn get_valid_access_token(config: &OAuthConfig) -> Result<String, QuickBooksError> {
    let saved = load_token();
    if let Some(token) = &saved {
        if !is_token_expired(token) {
            return Ok(token.access_token.clone());
        }
    }

    let refresh = saved
        .and_then(|t| t.refresh_token)
        .unwrap_or_else(|| config.refresh_token.clone());
    let token = refresh_access_token(config, &refresh).await?;
    Ok(token.access_token)
}

/// Probe the companyinfo endpoint to confirm a token actually works.
pub async fn test_token(realm_id: &str, access_token: &str) -> Result<bool, QuickBooksError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{COMPANYINFO_BASE}/{realm_id}/companyinfo/{realm_id}"))
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await?;
    Ok(resp.status().is_success())
}

/// Outcome reported by the manual refresh endpoint.
#[derive(Debug, Serialize)]
pub struct RefreshOutcome {
    pub refreshed: bool,
    pub token_valid: bool,
    pub expiry: Option<String>,
}

/// Force a refresh and verify the new token against companyinfo.
pub async fn force_refresh(
    config: &OAuthConfig,
    realm_id: &str,
) -> Result<RefreshOutcome, QuickBooksError> {
    let refresh = load_token()
        .and_then(|t| t.refresh_token)
        .unwrap_or_else(|| config.refresh_token.clone());
    let token = refresh_access_token(config, &refresh).await?;
    let token_valid = test_token(realm_id, &token.access_token).await.unwrap_or(false);
    Ok(RefreshOutcome {
        refreshed: true,
        token_valid,
        expiry: token.expiry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let token = QuickBooksToken {
            access_token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
            expiry: Some("2026-08-30T12:00:00+00:00".to_string()),
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: QuickBooksToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.access_token, "abc");
        assert_eq!(back.refresh_token.as_deref(), Some("def"));
    }

    #[test]
    fn test_expired_when_past() {
        let token = QuickBooksToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            expiry: Some((Utc::now() - Duration::hours(1)).to_rfc3339()),
        };
        assert!(is_token_expired(&token));
    }

    #[test]
    fn test_fresh_when_future() {
        let token = QuickBooksToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            expiry: Some((Utc::now() + Duration::hours(1)).to_rfc3339()),
        };
        assert!(!is_token_expired(&token));
    }

    #[test]
    fn test_expired_within_skew_window() {
        let token = QuickBooksToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            expiry: Some((Utc::now() + Duration::seconds(30)).to_rfc3339()),
        };
        assert!(is_token_expired(&token));
    }

    #[test]
    fn test_expired_when_missing_or_garbled() {
        let mut token = QuickBooksToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            expiry: None,
        };
        assert!(is_token_expired(&token));
        token.expiry = Some("not a date".to_string());
        assert!(is_token_expired(&token));
    }
}
