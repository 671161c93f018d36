//! Meta Marketing API client: campaign spend and performance aggregates.
//!
//! Fetches campaigns with an insights field expansion for a date range, then
//! recomputes the aggregate ratios (CTR, CPC, cost per conversion) from the
//! summed raw counts. Insight numerics arrive as strings on the wire.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::helpers::{ratio, round2};
use crate::period::DateRange;

const API_BASE: &str = "https://graph.facebook.com/v18.0";
const CAMPAIGN_FIELDS: &str =
    "id,name,status,daily_budget,lifetime_budget,insights{spend,impressions,clicks,ctr,cpc,conversions,cost_per_conversion}";

#[derive(Debug, thiserror::Error)]
pub enum MetaAdsError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Meta API error {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct MetaAdsConfig {
    pub access_token: String,
    /// Ad account id; `act_` prefix added on construction when absent.
    pub ad_account_id: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CampaignsResponse {
    #[serde(default)]
    data: Vec<CampaignRaw>,
}

#[derive(Debug, Deserialize)]
struct CampaignRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    /// Budgets are in cents, as strings.
    #[serde(default)]
    daily_budget: Option<String>,
    #[serde(default)]
    lifetime_budget: Option<String>,
    insights: Option<InsightsEnvelope>,
}

#[derive(Debug, Deserialize)]
struct InsightsEnvelope {
    #[serde(default)]
    data: Vec<InsightRaw>,
}

#[derive(Debug, Default, Deserialize)]
struct InsightRaw {
    #[serde(default)]
    spend: Option<String>,
    #[serde(default)]
    impressions: Option<String>,
    #[serde(default)]
    clicks: Option<String>,
    #[serde(default)]
    ctr: Option<String>,
    #[serde(default)]
    cpc: Option<String>,
    #[serde(default)]
    conversions: Option<String>,
    #[serde(default)]
    cost_per_conversion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

// ============================================================================
// Public types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_budget: Option<f64>,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub cpc: f64,
    pub conversions: u64,
    pub cost_per_conversion: f64,
}

/// Range-level aggregate, recomputed from the per-campaign sums.
#[derive(Debug, Clone, Serialize)]
pub struct AdInsights {
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub cpc: f64,
    pub conversions: u64,
    pub cost_per_conversion: f64,
}

/// Not an entity with identity, just a computed projection over a date range.
#[derive(Debug, Clone, Serialize)]
pub struct AdSpend {
    pub total_spend: f64,
    pub daily_spend: f64,
    pub campaigns: Vec<Campaign>,
    pub insights: AdInsights,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimePerformance {
    pub active_campaigns: usize,
    pub today_spend: f64,
    pub today_clicks: u64,
    pub today_conversions: u64,
}

fn parse_money(raw: Option<&str>) -> f64 {
    raw.map(|s| s.replace(',', "").parse().unwrap_or(0.0))
        .unwrap_or(0.0)
}

fn parse_count(raw: Option<&str>) -> u64 {
    raw.map(|s| s.parse().unwrap_or(0)).unwrap_or(0)
}

/// Budget fields are integer cents as strings.
fn parse_budget(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.parse::<i64>().ok()).map(|c| c as f64 / 100.0)
}

impl CampaignRaw {
    fn into_campaign(self) -> Campaign {
        let insight = self
            .insights
            .and_then(|e| e.data.into_iter().next())
            .unwrap_or_default();
        Campaign {
            id: self.id,
            name: self.name,
            status: self.status,
            daily_budget: parse_budget(self.daily_budget.as_deref()),
            lifetime_budget: parse_budget(self.lifetime_budget.as_deref()),
            spend: parse_money(insight.spend.as_deref()),
            impressions: parse_count(insight.impressions.as_deref()),
            clicks: parse_count(insight.clicks.as_deref()),
            ctr: parse_money(insight.ctr.as_deref()),
            cpc: parse_money(insight.cpc.as_deref()),
            conversions: parse_count(insight.conversions.as_deref()),
            cost_per_conversion: parse_money(insight.cost_per_conversion.as_deref()),
        }
    }
}

/// Sum campaigns into an `AdSpend`, with ratios guarded against empty
/// denominators and daily spend averaged over the inclusive day count.
pub fn aggregate(campaigns: Vec<Campaign>, days: i64) -> AdSpend {
    let total_spend: f64 = campaigns.iter().map(|c| c.spend).sum();
    let impressions: u64 = campaigns.iter().map(|c| c.impressions).sum();
    let clicks: u64 = campaigns.iter().map(|c| c.clicks).sum();
    let conversions: u64 = campaigns.iter().map(|c| c.conversions).sum();

    let ctr = round2(ratio(clicks as f64, impressions as f64) * 100.0);
    let cpc = round2(ratio(total_spend, clicks as f64));
    let cost_per_conversion = round2(ratio(total_spend, conversions as f64));
    let daily_spend = round2(ratio(total_spend, days.max(0) as f64));

    AdSpend {
        total_spend: round2(total_spend),
        daily_spend,
        campaigns,
        insights: AdInsights {
            impressions,
            clicks,
            ctr,
            cpc,
            conversions,
            cost_per_conversion,
        },
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct MetaAdsClient {
    http: reqwest::Client,
    access_token: String,
    account: String,
}

impl MetaAdsClient {
    pub fn new(config: MetaAdsConfig) -> Self {
        let account = if config.ad_account_id.starts_with("act_") {
            config.ad_account_id
        } else {
            format!("act_{}", config.ad_account_id)
        };
        Self {
            http: reqwest::Client::new(),
            access_token: config.access_token,
            account,
        }
    }

    /// Campaign spend and insight aggregates for the range.
    pub async fn ad_spend(&self, range: &DateRange) -> Result<AdSpend, MetaAdsError> {
        let time_range = serde_json::json!({
            "since": range.start.to_string(),
            "until": range.end.to_string(),
        })
        .to_string();
        let effective_status = r#"["ACTIVE","PAUSED"]"#;

        let resp = self
            .http
            .get(format!("{API_BASE}/{}/campaigns", self.account))
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", CAMPAIGN_FIELDS),
                ("effective_status", effective_status),
                ("time_range", &time_range),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(MetaAdsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CampaignsResponse = resp.json().await?;
        let campaigns: Vec<Campaign> = body.data.into_iter().map(|c| c.into_campaign()).collect();
        Ok(aggregate(campaigns, range.day_count()))
    }

    /// Total spend for the range.
    pub async fn period_spend(&self, range: &DateRange) -> Result<f64, MetaAdsError> {
        Ok(self.ad_spend(range).await?.total_spend)
    }

    /// Today's single-day performance snapshot.
    pub async fn realtime_performance(
        &self,
        today: NaiveDate,
    ) -> Result<RealtimePerformance, MetaAdsError> {
        let range = DateRange {
            start: today,
            end: today,
        };
        let spend = self.ad_spend(&range).await?;
        let active = spend
            .campaigns
            .iter()
            .filter(|c| c.status == "ACTIVE")
            .count();
        Ok(RealtimePerformance {
            active_campaigns: active,
            today_spend: spend.total_spend,
            today_clicks: spend.insights.clicks,
            today_conversions: spend.insights.conversions,
        })
    }
}
