//! Environment-driven configuration.
//!
//! Credentials are opaque strings; the only check is presence. A missing
//! credential pair disables that integration rather than failing startup,
//! so a partially configured dashboard still serves what it can.

use std::path::PathBuf;

use chrono_tz::Tz;

use crate::highlevel::HighLevelConfig;
use crate::meta_ads::MetaAdsConfig;
use crate::quickbooks::auth::OAuthConfig;
use crate::quickbooks::QuickBooksConfig;

/// Default business timezone. The shop reports its day in Eastern time
/// regardless of where the server runs.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Bind address for the HTTP server.
    pub bind_addr: String,
    /// Business timezone used for every period resolution.
    pub timezone: Tz,
    pub highlevel: Option<HighLevelConfig>,
    pub meta: Option<MetaAdsConfig>,
    pub quickbooks: Option<QuickBooksConfig>,
    /// Path of the manual-override JSON file.
    pub overrides_path: PathBuf,
}

impl DashboardConfig {
    /// Build configuration from environment variables.
    pub fn from_env() -> Self {
        let port = env_opt("PORT").unwrap_or_else(|| "4400".to_string());
        let bind_addr = format!("0.0.0.0:{port}");

        let timezone = env_opt("BUSINESS_TIMEZONE")
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(DEFAULT_TIMEZONE);

        let highlevel = match (env_opt("GHL_API_TOKEN"), env_opt("GHL_LOCATION_ID")) {
            (Some(api_token), Some(location_id)) => Some(HighLevelConfig {
                api_token,
                location_id,
            }),
            _ => None,
        };

        let meta = match (env_opt("META_ACCESS_TOKEN"), env_opt("META_AD_ACCOUNT_ID")) {
            (Some(access_token), Some(ad_account_id)) => Some(MetaAdsConfig {
                access_token,
                ad_account_id,
            }),
            _ => None,
        };

        let oauth = match (
            env_opt("QB_CLIENT_ID"),
            env_opt("QB_CLIENT_SECRET"),
            env_opt("QB_REFRESH_TOKEN"),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(OAuthConfig {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => None,
        };

        let quickbooks = env_opt("QB_REALM_ID").and_then(|realm_id| {
            let access_token = env_opt("QB_ACCESS_TOKEN");
            if access_token.is_none() && oauth.is_none() {
                return None;
            }
            Some(QuickBooksConfig {
                realm_id,
                access_token,
                oauth: oauth.clone(),
            })
        });

        let overrides_path = env_opt("OVERRIDES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(default_overrides_path);

        Self {
            bind_addr,
            timezone,
            highlevel,
            meta,
            quickbooks,
            overrides_path,
        }
    }
}

/// Default location of the manual-override file: ~/.shopmetrics/manual-overrides.json
fn default_overrides_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".shopmetrics")
        .join("manual-overrides.json")
}

/// Read an environment variable, treating empty/whitespace values as unset.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
