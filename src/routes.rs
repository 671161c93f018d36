//! HTTP request handlers.
//!
//! Every success response is wrapped in the `{success, data, timestamp}`
//! envelope; failures go through [`ApiError`] and come back as
//! `{success: false, error}` with an appropriate status code.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::expenses::NewExpense;
use crate::highlevel;
use crate::period::{self, Period};
use crate::quickbooks::auth;
use crate::receipt::{self, ReceiptScan};
use crate::state::SharedState;

fn ok<T: serde::Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    period: Option<String>,
}

impl PeriodQuery {
    /// Unknown or missing tokens fall back to the current month.
    fn period_or_current_month(&self) -> Period {
        self.period
            .as_deref()
            .map(Period::parse_or_current_month)
            .unwrap_or(Period::CurrentMonth)
    }
}

// ============================================================================
// KPIs
// ============================================================================

pub async fn dashboard(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let data = state.kpi.dashboard_data(Utc::now()).await?;
    Ok(ok(data))
}

pub async fn kpis(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Value>, ApiError> {
    let period = query.period_or_current_month();
    let kpis = state.kpi.calculate_kpis(period, Utc::now()).await?;
    Ok(ok(kpis))
}

pub async fn cac(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Value>, ApiError> {
    let period = query.period_or_current_month();
    let breakdown = state.kpi.period_cac(period, Utc::now()).await?;
    Ok(ok(breakdown))
}

// ============================================================================
// Manual overrides
// ============================================================================

pub async fn get_overrides(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let overrides = state
        .overrides
        .load()
        .map_err(|e| ApiError::Store(e.to_string()))?;
    Ok(ok(overrides))
}

pub async fn save_overrides(
    State(state): State<SharedState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let overrides = crate::overrides::validate(&payload)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    state
        .overrides
        .save(&overrides)
        .map_err(|e| ApiError::Store(e.to_string()))?;
    info!(periods = overrides.len(), "manual overrides updated");
    Ok(Json(json!({
        "success": true,
        "message": "Overrides saved",
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

// ============================================================================
// Accounting token lifecycle
// ============================================================================

fn oauth_config(state: &SharedState) -> Result<(auth::OAuthConfig, String), ApiError> {
    let qb = state
        .config
        .quickbooks
        .as_ref()
        .ok_or(ApiError::MissingCredentials("QuickBooks"))?;
    let oauth = qb
        .oauth
        .clone()
        .ok_or(ApiError::MissingCredentials("QuickBooks OAuth"))?;
    Ok((oauth, qb.realm_id.clone()))
}

/// Force a token refresh and verify the result.
pub async fn refresh_books_token(
    State(state): State<SharedState>,
) -> Result<Json<Value>, ApiError> {
    let (oauth, realm_id) = oauth_config(&state)?;
    let outcome = auth::force_refresh(&oauth, &realm_id)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    info!(valid = outcome.token_valid, "accounting token refreshed");
    Ok(ok(outcome))
}

/// Report the saved token's state without refreshing.
pub async fn books_token_status(
    State(state): State<SharedState>,
) -> Result<Json<Value>, ApiError> {
    let (_, realm_id) = oauth_config(&state)?;
    let status = match auth::load_token() {
        Some(token) => {
            let expired = auth::is_token_expired(&token);
            let valid = if expired {
                false
            } else {
                auth::test_token(&realm_id, &token.access_token)
                    .await
                    .unwrap_or(false)
            };
            json!({
                "has_token": true,
                "expired": expired,
                "valid": valid,
                "expiry": token.expiry,
            })
        }
        None => json!({ "has_token": false, "expired": true, "valid": false }),
    };
    Ok(ok(status))
}

// ============================================================================
// Receipts and expenses
// ============================================================================

pub async fn extract_receipt(
    State(state): State<SharedState>,
    Json(scan): Json<ReceiptScan>,
) -> Result<Json<Value>, ApiError> {
    let today = Utc::now()
        .with_timezone(&state.config.timezone)
        .date_naive();
    let extracted = receipt::extract(&scan, today);
    Ok(ok(extracted))
}

pub async fn list_expenses(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    Ok(ok(json!({
        "expenses": state.expenses.list(),
        "summary": state.expenses.summary(),
    })))
}

pub async fn add_expense(
    State(state): State<SharedState>,
    Json(new): Json<NewExpense>,
) -> Result<Json<Value>, ApiError> {
    if new.amount <= 0.0 {
        return Err(ApiError::Validation(
            "Expense amount must be positive".to_string(),
        ));
    }
    if new.vendor.trim().is_empty() {
        return Err(ApiError::Validation("Vendor is required".to_string()));
    }
    let today = Utc::now()
        .with_timezone(&state.config.timezone)
        .date_naive();
    let expense = state.expenses.add(new, today);
    Ok(ok(expense))
}

pub async fn delete_expense(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !state.expenses.remove(id) {
        return Err(ApiError::Validation(format!("No expense with id {id}")));
    }
    Ok(ok(json!({ "deleted": id })))
}

// ============================================================================
// Debug
// ============================================================================

/// Credential presence and a one-contact probe against the CRM.
pub async fn debug_crm(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let Some(config) = &state.config.highlevel else {
        return Ok(Json(json!({
            "success": false,
            "error": "HighLevel credentials not configured",
            "has_token": false,
            "has_location": false,
        })));
    };
    let client = state
        .kpi
        .crm()
        .ok_or(ApiError::MissingCredentials("HighLevel"))?;
    let (returned, total) = client
        .probe()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    Ok(ok(json!({
        "has_token": true,
        "has_location": !config.location_id.is_empty(),
        "contacts_returned": returned,
        "total_contacts": total,
    })))
}

/// Lead counts for a period with the resolved range echoed back, for
/// checking timezone and tag assumptions against the CRM's own reports.
pub async fn debug_leads(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Value>, ApiError> {
    let client = state
        .kpi
        .crm()
        .ok_or(ApiError::MissingCredentials("HighLevel"))?;
    let period = query
        .period
        .as_deref()
        .map(Period::parse_or_current_month)
        .unwrap_or(Period::Yesterday);

    let now = Utc::now();
    let tz = state.config.timezone;
    let range = period::resolve(period, now, tz);
    let contacts = client
        .contacts_in_range(&range, tz)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    let breakdown = highlevel::period_business_data(&contacts);

    Ok(ok(json!({
        "period": period.token(),
        "date_range": range,
        "server_time": now.to_rfc3339(),
        "business_time": now.with_timezone(&tz).to_rfc3339(),
        "contacts_in_range": contacts.len(),
        "breakdown": breakdown,
    })))
}

/// Tag frequency across the contact book plus raw samples, for spotting
/// tag drift when the counts stop matching expectations.
pub async fn debug_tags(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let client = state
        .kpi
        .crm()
        .ok_or(ApiError::MissingCredentials("HighLevel"))?;
    let contacts = client
        .fetch_all_contacts()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for contact in contacts.iter().take(50) {
        for tag in &contact.tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }
    let mut top: Vec<(&str, usize)> = counts.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    top.truncate(30);

    let samples: Vec<Value> = contacts
        .iter()
        .take(10)
        .map(|c| {
            json!({
                "name": c.display_name(),
                "date_added": c.date_added,
                "tags": c.tags,
            })
        })
        .collect();

    let sourced: Vec<Value> = contacts
        .iter()
        .filter(|c| {
            highlevel::LEAD_SOURCE_TAGS
                .iter()
                .any(|tag| c.has_tag(tag))
        })
        .take(30)
        .map(|c| {
            json!({
                "name": c.display_name(),
                "date_added": c.date_added,
                "tags": c.tags,
            })
        })
        .collect();

    Ok(ok(json!({
        "total_contacts": contacts.len(),
        "top_tags": top.iter().map(|(tag, count)| json!({"tag": tag, "count": count})).collect::<Vec<_>>(),
        "samples": samples,
        "source_tagged_samples": sourced,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_query_fallback() {
        let query = PeriodQuery { period: None };
        assert_eq!(query.period_or_current_month(), Period::CurrentMonth);

        let query = PeriodQuery {
            period: Some("last_7_days".to_string()),
        };
        assert_eq!(query.period_or_current_month(), Period::Last7Days);

        let query = PeriodQuery {
            period: Some("bogus".to_string()),
        };
        assert_eq!(query.period_or_current_month(), Period::CurrentMonth);
    }

    #[test]
    fn test_envelope_shape() {
        let Json(body) = ok(json!({"n": 1}));
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["n"], 1);
        assert!(body["timestamp"].is_string());
    }
}
