//! KPI derivation across the three upstream integrations.
//!
//! The engine fetches CRM, ad, and accounting data concurrently for one
//! resolved date range, then derives the composite numbers in a pure
//! function. A failed upstream degrades to zeroed sections rather than
//! failing the whole snapshot; missing credentials do the same.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

use crate::config::DashboardConfig;
use crate::error::ApiError;
use crate::helpers::{ratio, round2};
use crate::highlevel::{self, BusinessData, HighLevelClient};
use crate::meta_ads::{AdSpend, MetaAdsClient};
use crate::period::{self, DateRange, Period};
use crate::quickbooks::{FinancialSummary, QuickBooksClient};

/// Target blended cost per acquisition, in dollars.
pub const TARGET_CAC: f64 = 200.0;
/// Fallback job value when accounting data is absent.
pub const DEFAULT_JOB_VALUE: f64 = 400.0;
/// LTV multiple over average job value, assuming repeat business.
pub const LTV_REPEAT_FACTOR: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Good,
    Warning,
    Bad,
}

/// Good at or under target, warning up to 1.5x, bad beyond.
pub fn cac_performance(cac: f64, target: f64) -> Performance {
    if cac <= target {
        Performance::Good
    } else if cac <= target * 1.5 {
        Performance::Warning
    } else {
        Performance::Bad
    }
}

/// LTV:CAC of 3 or better is healthy, 2 is borderline.
pub fn ratio_performance(ltv_cac: f64) -> Performance {
    if ltv_cac >= 3.0 {
        Performance::Good
    } else if ltv_cac >= 2.0 {
        Performance::Warning
    } else {
        Performance::Bad
    }
}

/// CRM numbers for one snapshot: all-time book metrics plus paying
/// customers acquired inside the period.
#[derive(Debug, Clone)]
pub struct CrmSnapshot {
    pub data: BusinessData,
    pub period_customers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessKpis {
    pub total_leads: usize,
    pub hot_leads: usize,
    pub leads_by_service: BTreeMap<String, usize>,
    pub total_customers: usize,
    pub new_customers_this_period: usize,
    pub conversion_rate: f64,
    pub pipeline_value: f64,
    /// Pipeline value discounted by the conversion rate.
    pub estimated_revenue: f64,
    /// Invoiced revenue from accounting, 0 when unavailable.
    pub actual_revenue: f64,
    pub avg_job_value: f64,
    pub meta_spend: f64,
    pub meta_impressions: u64,
    pub meta_clicks: u64,
    pub meta_ctr: f64,
    pub meta_cpc: f64,
    pub meta_conversions: u64,
    pub blended_cac: f64,
    pub target_cac: f64,
    pub cac_performance: Performance,
    pub estimated_ltv: f64,
    pub ltv_cac_ratio: f64,
    pub ratio_performance: Performance,
    pub total_expenses: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub gross_profit: f64,
    pub gross_margin: f64,
    pub net_profit: f64,
    pub net_margin: f64,
    pub period: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacBreakdown {
    pub cac: f64,
    pub customers: usize,
    pub spend: f64,
    pub target_cac: f64,
    pub performance: Performance,
    pub period: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub total_leads: usize,
    pub hot_leads: usize,
    pub leads_by_service: BTreeMap<String, usize>,
    pub total_customers: usize,
    pub conversion_rate: f64,
    pub pipeline_value: f64,
    pub today_spend: f64,
    pub today_clicks: u64,
    pub active_campaigns: usize,
    pub last_updated: String,
}

/// Derive the full KPI set from whatever upstream sections are available.
///
/// Revenue precedence: invoiced accounting revenue wins whenever it is
/// positive; otherwise the pipeline estimate (pipeline value discounted by
/// conversion rate) stands in. Ratios are zero-guarded throughout, so a
/// period with no customers reports a CAC of 0 rather than infinity.
pub fn derive_kpis(
    crm: Option<&CrmSnapshot>,
    ads: Option<&AdSpend>,
    books: Option<&FinancialSummary>,
    period_token: &str,
    now: DateTime<Utc>,
) -> BusinessKpis {
    let (total_leads, hot_leads, leads_by_service, total_customers, conversion_rate, pipeline_value) =
        match crm {
            Some(snapshot) => (
                snapshot.data.total_contacts,
                snapshot.data.hot_leads.total,
                snapshot.data.hot_leads.by_service.clone(),
                snapshot.data.customers.total_paying,
                snapshot.data.conversion_rate,
                snapshot.data.pipeline_value,
            ),
            None => (0, 0, BTreeMap::new(), 0, 0.0, 0.0),
        };
    let new_customers = crm.map(|s| s.period_customers).unwrap_or(0);

    let estimated_revenue = round2(pipeline_value * conversion_rate / 100.0);
    let actual_revenue = books.map(|b| b.total_revenue).unwrap_or(0.0);
    let revenue = if actual_revenue > 0.0 {
        actual_revenue
    } else {
        estimated_revenue
    };

    let avg_job_value = if total_customers > 0 && actual_revenue > 0.0 {
        round2(actual_revenue / total_customers as f64)
    } else {
        DEFAULT_JOB_VALUE
    };

    let meta_spend = ads.map(|a| a.total_spend).unwrap_or(0.0);
    let blended_cac = round2(ratio(meta_spend, new_customers as f64));
    let estimated_ltv = round2(avg_job_value * LTV_REPEAT_FACTOR);
    let ltv_cac_ratio = round2(ratio(estimated_ltv, blended_cac));

    let total_expenses = books.map(|b| b.total_expenses).unwrap_or(0.0);
    let gross_profit = round2(revenue - total_expenses);
    let net_profit = round2(revenue - total_expenses - meta_spend);

    BusinessKpis {
        total_leads,
        hot_leads,
        leads_by_service,
        total_customers,
        new_customers_this_period: new_customers,
        conversion_rate,
        pipeline_value,
        estimated_revenue,
        actual_revenue,
        avg_job_value,
        meta_spend,
        meta_impressions: ads.map(|a| a.insights.impressions).unwrap_or(0),
        meta_clicks: ads.map(|a| a.insights.clicks).unwrap_or(0),
        meta_ctr: ads.map(|a| a.insights.ctr).unwrap_or(0.0),
        meta_cpc: ads.map(|a| a.insights.cpc).unwrap_or(0.0),
        meta_conversions: ads.map(|a| a.insights.conversions).unwrap_or(0),
        blended_cac,
        target_cac: TARGET_CAC,
        cac_performance: cac_performance(blended_cac, TARGET_CAC),
        estimated_ltv,
        ltv_cac_ratio,
        ratio_performance: ratio_performance(ltv_cac_ratio),
        total_expenses,
        expenses_by_category: books
            .map(|b| b.expenses_by_category.clone())
            .unwrap_or_default(),
        gross_profit,
        gross_margin: round2(ratio(gross_profit, revenue) * 100.0),
        net_profit,
        net_margin: round2(ratio(net_profit, revenue) * 100.0),
        period: period_token.to_string(),
        last_updated: now.to_rfc3339(),
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct KpiEngine {
    crm: Option<HighLevelClient>,
    ads: Option<MetaAdsClient>,
    books: Option<QuickBooksClient>,
    tz: Tz,
}

impl KpiEngine {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            crm: config.highlevel.clone().map(HighLevelClient::new),
            ads: config.meta.clone().map(MetaAdsClient::new),
            books: config.quickbooks.clone().map(QuickBooksClient::new),
            tz: config.timezone,
        }
    }

    pub fn crm(&self) -> Option<&HighLevelClient> {
        self.crm.as_ref()
    }

    async fn crm_snapshot(&self, range: &DateRange) -> Option<CrmSnapshot> {
        let client = self.crm.as_ref()?;
        let contacts = match client.fetch_all_contacts().await {
            Ok(contacts) => contacts,
            Err(err) => {
                warn!(error = %err, "CRM fetch failed; zeroing lead metrics");
                return None;
            }
        };
        let data = highlevel::business_data(&contacts);
        let period_customers = highlevel::filter_by_range(contacts, range, self.tz)
            .iter()
            .filter(|c| c.has_tag(highlevel::TAG_PAYING))
            .count();
        Some(CrmSnapshot {
            data,
            period_customers,
        })
    }

    async fn ad_snapshot(&self, range: &DateRange) -> Option<AdSpend> {
        let client = self.ads.as_ref()?;
        match client.ad_spend(range).await {
            Ok(spend) => Some(spend),
            Err(err) => {
                warn!(error = %err, "ad spend fetch failed; zeroing spend metrics");
                None
            }
        }
    }

    async fn books_snapshot(&self, range: &DateRange) -> Option<FinancialSummary> {
        let client = self.books.as_ref()?;
        match client.financial_summary(range).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(error = %err, "accounting fetch failed; zeroing financials");
                None
            }
        }
    }

    /// Full KPI snapshot for a period. The range is resolved exactly once and
    /// shared by all three upstream fetches, which run concurrently.
    pub async fn calculate_kpis(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<BusinessKpis, ApiError> {
        let range = period::resolve(period, now, self.tz);
        let (crm, ads, books) = tokio::join!(
            self.crm_snapshot(&range),
            self.ad_snapshot(&range),
            self.books_snapshot(&range),
        );
        Ok(derive_kpis(
            crm.as_ref(),
            ads.as_ref(),
            books.as_ref(),
            period.token(),
            now,
        ))
    }

    /// CAC breakdown for a period: ad spend over customers acquired.
    pub async fn period_cac(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<CacBreakdown, ApiError> {
        let range = period::resolve(period, now, self.tz);
        let (crm, ads) = tokio::join!(self.crm_snapshot(&range), self.ad_snapshot(&range));

        let customers = crm.map(|s| s.period_customers).unwrap_or(0);
        let spend = ads.map(|a| a.total_spend).unwrap_or(0.0);
        let cac = round2(ratio(spend, customers as f64));

        Ok(CacBreakdown {
            cac,
            customers,
            spend,
            target_cac: TARGET_CAC,
            performance: cac_performance(cac, TARGET_CAC),
            period: period.token().to_string(),
        })
    }

    /// Live overview for the dashboard header. Requires both the CRM and the
    /// ad integration to be configured.
    pub async fn dashboard_data(&self, now: DateTime<Utc>) -> Result<DashboardData, ApiError> {
        let crm = self
            .crm
            .as_ref()
            .ok_or(ApiError::MissingCredentials("HighLevel"))?;
        let ads = self
            .ads
            .as_ref()
            .ok_or(ApiError::MissingCredentials("Meta"))?;

        let today = now.with_timezone(&self.tz).date_naive();
        let (contacts, realtime) = tokio::join!(
            crm.fetch_all_contacts(),
            ads.realtime_performance(today),
        );
        let contacts = contacts.map_err(|e| ApiError::Upstream(e.to_string()))?;
        let realtime = realtime.map_err(|e| ApiError::Upstream(e.to_string()))?;
        let data = highlevel::business_data(&contacts);

        Ok(DashboardData {
            total_leads: data.total_contacts,
            hot_leads: data.hot_leads.total,
            leads_by_service: data.hot_leads.by_service,
            total_customers: data.customers.total_paying,
            conversion_rate: data.conversion_rate,
            pipeline_value: data.pipeline_value,
            today_spend: realtime.today_spend,
            today_clicks: realtime.today_clicks,
            active_campaigns: realtime.active_campaigns,
            last_updated: now.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlevel::{Customers, HotLeads};
    use crate::meta_ads::{AdInsights, AdSpend};
    use crate::quickbooks::Revenue;

    fn crm_snapshot(hot: usize, paying: usize, period_customers: usize) -> CrmSnapshot {
        CrmSnapshot {
            data: BusinessData {
                total_contacts: hot + paying,
                hot_leads: HotLeads {
                    total: hot,
                    by_service: BTreeMap::new(),
                },
                customers: Customers {
                    total_paying: paying,
                    total_deposit: 0,
                },
                conversion_rate: if hot > 0 {
                    round2(paying as f64 / hot as f64 * 100.0)
                } else {
                    0.0
                },
                pipeline_value: hot as f64 * 400.0,
                leads_by_source: None,
            },
            period_customers,
        }
    }

    fn ad_spend(total: f64, clicks: u64) -> AdSpend {
        AdSpend {
            total_spend: total,
            daily_spend: 0.0,
            campaigns: Vec::new(),
            insights: AdInsights {
                impressions: clicks * 50,
                clicks,
                ctr: 2.0,
                cpc: round2(ratio(total, clicks as f64)),
                conversions: 0,
                cost_per_conversion: 0.0,
            },
        }
    }

    fn books(revenue: f64, expenses: f64) -> FinancialSummary {
        let mut summary = crate::quickbooks::summarize(
            &[],
            &Revenue {
                total_revenue: revenue,
                by_month: BTreeMap::new(),
            },
        );
        summary.total_expenses = expenses;
        summary
    }

    #[test]
    fn test_cac_zero_customers_is_zero() {
        let kpis = derive_kpis(
            Some(&crm_snapshot(10, 0, 0)),
            Some(&ad_spend(500.0, 100)),
            None,
            "last_7_days",
            Utc::now(),
        );
        assert_eq!(kpis.blended_cac, 0.0);
        assert_eq!(kpis.ltv_cac_ratio, 0.0);
    }

    #[test]
    fn test_cac_and_ratio() {
        let kpis = derive_kpis(
            Some(&crm_snapshot(10, 5, 4)),
            Some(&ad_spend(600.0, 100)),
            Some(&books(2000.0, 300.0)),
            "current_month",
            Utc::now(),
        );
        // 600 spend / 4 new customers
        assert_eq!(kpis.blended_cac, 150.0);
        assert_eq!(kpis.cac_performance, Performance::Good);
        // avg job = 2000 / 5, LTV = 400 * 3
        assert_eq!(kpis.avg_job_value, 400.0);
        assert_eq!(kpis.estimated_ltv, 1200.0);
        assert_eq!(kpis.ltv_cac_ratio, 8.0);
        assert_eq!(kpis.ratio_performance, Performance::Good);
    }

    #[test]
    fn test_revenue_precedence_accounting_wins() {
        let kpis = derive_kpis(
            Some(&crm_snapshot(10, 5, 2)),
            None,
            Some(&books(3500.0, 0.0)),
            "current_month",
            Utc::now(),
        );
        assert_eq!(kpis.actual_revenue, 3500.0);
        assert_eq!(kpis.gross_profit, 3500.0);
    }

    #[test]
    fn test_revenue_falls_back_to_pipeline_estimate() {
        // 10 hot leads * $400 pipeline, 50% conversion
        let kpis = derive_kpis(
            Some(&crm_snapshot(10, 5, 2)),
            None,
            Some(&books(0.0, 100.0)),
            "current_month",
            Utc::now(),
        );
        assert_eq!(kpis.estimated_revenue, 2000.0);
        assert_eq!(kpis.actual_revenue, 0.0);
        assert_eq!(kpis.gross_profit, 1900.0);
    }

    #[test]
    fn test_cac_performance_thresholds() {
        assert_eq!(cac_performance(200.0, 200.0), Performance::Good);
        assert_eq!(cac_performance(200.01, 200.0), Performance::Warning);
        assert_eq!(cac_performance(300.0, 200.0), Performance::Warning);
        assert_eq!(cac_performance(300.01, 200.0), Performance::Bad);
    }

    #[test]
    fn test_ratio_performance_thresholds() {
        assert_eq!(ratio_performance(3.0), Performance::Good);
        assert_eq!(ratio_performance(2.5), Performance::Warning);
        assert_eq!(ratio_performance(1.9), Performance::Bad);
    }

    #[test]
    fn test_all_sections_absent_yields_zeros() {
        let kpis = derive_kpis(None, None, None, "yesterday", Utc::now());
        assert_eq!(kpis.total_leads, 0);
        assert_eq!(kpis.meta_spend, 0.0);
        assert_eq!(kpis.actual_revenue, 0.0);
        assert_eq!(kpis.blended_cac, 0.0);
        assert_eq!(kpis.net_profit, 0.0);
        assert_eq!(kpis.period, "yesterday");
        // Fallback job value still drives an LTV estimate
        assert_eq!(kpis.estimated_ltv, DEFAULT_JOB_VALUE * LTV_REPEAT_FACTOR);
    }

    #[test]
    fn test_net_profit_subtracts_ad_spend() {
        let kpis = derive_kpis(
            Some(&crm_snapshot(0, 4, 2)),
            Some(&ad_spend(200.0, 50)),
            Some(&books(1000.0, 300.0)),
            "current_month",
            Utc::now(),
        );
        assert_eq!(kpis.gross_profit, 700.0);
        assert_eq!(kpis.net_profit, 500.0);
        assert_eq!(kpis.gross_margin, 70.0);
        assert_eq!(kpis.net_margin, 50.0);
    }
}
