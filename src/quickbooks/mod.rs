//! QuickBooks Online client: invoices (revenue) and purchases (expenses)
//! via the QBO query language, plus the OAuth2 refresh flow in [`auth`].
//!
//! Purchase categories are derived by keyword-matching the account name; the
//! mapping is lossy by design and unmatched accounts land in "Other".

pub mod auth;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::helpers::{ratio, round2};
use crate::period::DateRange;

const API_BASE: &str = "https://quickbooks.api.intuit.com/v3/company";

/// Account-name keywords to expense category. First hit wins, top to bottom.
const ACCOUNT_CATEGORIES: &[(&str, &[&str])] = &[
    ("Marketing", &["marketing", "advertising"]),
    ("Materials", &["materials", "supplies"]),
    ("Automotive", &["vehicle", "auto"]),
    ("Labor", &["labor", "payroll"]),
    ("Facility", &["rent", "facility"]),
    ("Utilities", &["utilities"]),
];

pub const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, thiserror::Error)]
pub enum QuickBooksError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("QuickBooks API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("No access token and no refresh credentials configured")]
    NoCredentials,
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct QuickBooksConfig {
    pub realm_id: String,
    /// Static access token from the environment, if provided.
    pub access_token: Option<String>,
    /// Refresh credentials; used when no static token is set or on demand.
    pub oauth: Option<auth::OAuthConfig>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: Option<QueryResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Purchase", default)]
    purchases: Vec<PurchaseRaw>,
    #[serde(rename = "Invoice", default)]
    invoices: Vec<InvoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct PurchaseRaw {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "TxnDate", default)]
    txn_date: String,
    #[serde(rename = "TotalAmt", default)]
    total_amt: f64,
    #[serde(rename = "VendorRef")]
    vendor_ref: Option<NameRef>,
    #[serde(rename = "AccountRef")]
    account_ref: Option<NameRef>,
    #[serde(rename = "PrivateNote")]
    private_note: Option<String>,
    #[serde(rename = "Line", default)]
    lines: Vec<LineRaw>,
}

#[derive(Debug, Deserialize)]
struct InvoiceRaw {
    #[serde(rename = "TxnDate", default)]
    txn_date: String,
    #[serde(rename = "TotalAmt", default)]
    total_amt: f64,
}

#[derive(Debug, Deserialize)]
struct NameRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineRaw {
    #[serde(rename = "Description")]
    description: Option<String>,
}

// ============================================================================
// Public types
// ============================================================================

/// A purchase row normalized for reporting. Read-only mirror of QBO state.
#[derive(Debug, Clone, Serialize)]
pub struct Purchase {
    pub id: String,
    /// Transaction date, YYYY-MM-DD as QBO reports it.
    pub date: String,
    pub amount: f64,
    pub vendor: String,
    pub category: String,
    pub description: String,
    pub account: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedAmount {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Revenue {
    pub total_revenue: f64,
    /// YYYY-MM to summed invoice totals.
    pub by_month: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialSummary {
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub expenses_by_vendor: BTreeMap<String, f64>,
    /// YYYY-MM to summed purchase totals.
    pub monthly_trend: BTreeMap<String, f64>,
    pub top_vendors: Vec<NamedAmount>,
    pub top_categories: Vec<NamedAmount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfitLoss {
    pub revenue: f64,
    pub expenses: f64,
    pub net_income: f64,
    pub margin: f64,
}

/// Map a QBO account name to a coarse expense category.
pub fn category_for_account(account_name: &str) -> &'static str {
    let lowered = account_name.to_lowercase();
    for (category, keywords) in ACCOUNT_CATEGORIES {
        if keywords.iter().any(|k| lowered.contains(k)) {
            return category;
        }
    }
    DEFAULT_CATEGORY
}

impl PurchaseRaw {
    fn into_purchase(self) -> Purchase {
        let account = self
            .account_ref
            .and_then(|r| r.name)
            .unwrap_or_else(|| "Uncategorized".to_string());
        let vendor = self
            .vendor_ref
            .and_then(|r| r.name)
            .unwrap_or_else(|| "Unknown Vendor".to_string());
        let description = self
            .private_note
            .or_else(|| self.lines.into_iter().find_map(|l| l.description))
            .unwrap_or_else(|| "No description".to_string());
        Purchase {
            id: self.id,
            date: self.txn_date,
            amount: self.total_amt,
            vendor,
            category: category_for_account(&account).to_string(),
            description,
            account,
        }
    }
}

/// Roll purchases and revenue into the range summary.
pub fn summarize(purchases: &[Purchase], revenue: &Revenue) -> FinancialSummary {
    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
    let mut by_vendor: BTreeMap<String, f64> = BTreeMap::new();
    let mut monthly_trend: BTreeMap<String, f64> = BTreeMap::new();
    let mut total_expenses = 0.0;

    for p in purchases {
        total_expenses += p.amount;
        *by_category.entry(p.category.clone()).or_default() += p.amount;
        *by_vendor.entry(p.vendor.clone()).or_default() += p.amount;
        let month = p.date.chars().take(7).collect::<String>();
        if !month.is_empty() {
            *monthly_trend.entry(month).or_default() += p.amount;
        }
    }

    let mut top_vendors: Vec<NamedAmount> = by_vendor
        .iter()
        .map(|(name, amount)| NamedAmount {
            name: name.clone(),
            amount: round2(*amount),
        })
        .collect();
    top_vendors.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    top_vendors.truncate(10);

    let mut top_categories: Vec<NamedAmount> = by_category
        .iter()
        .map(|(name, amount)| NamedAmount {
            name: name.clone(),
            amount: round2(*amount),
        })
        .collect();
    top_categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));

    FinancialSummary {
        total_revenue: revenue.total_revenue,
        total_expenses: round2(total_expenses),
        expenses_by_category: by_category,
        expenses_by_vendor: by_vendor,
        monthly_trend,
        top_vendors,
        top_categories,
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct QuickBooksClient {
    http: reqwest::Client,
    config: QuickBooksConfig,
}

impl QuickBooksClient {
    pub fn new(config: QuickBooksConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn realm_id(&self) -> &str {
        &self.config.realm_id
    }

    /// Resolve a bearer token: static env token first, otherwise the refresh
    /// flow (which persists its result to the token file).
    async fn bearer(&self) -> Result<String, QuickBooksError> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }
        match &self.config.oauth {
            Some(oauth) => auth::get_valid_access_token(oauth).await,
            None => Err(QuickBooksError::NoCredentials),
        }
    }

    async fn query(&self, statement: &str) -> Result<QueryResponse, QuickBooksError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(format!("{API_BASE}/{}/query", self.config.realm_id))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .query(&[("query", statement)])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(QuickBooksError::AuthExpired);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(QuickBooksError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: QueryEnvelope = resp.json().await?;
        Ok(envelope.query_response.unwrap_or_default())
    }

    /// Purchases in the range, most recent first.
    pub async fn expenses(&self, range: &DateRange) -> Result<Vec<Purchase>, QuickBooksError> {
        let statement = format!(
            "SELECT * FROM Purchase WHERE TxnDate >= '{}' AND TxnDate <= '{}' ORDERBY TxnDate DESC",
            range.start, range.end
        );
        let resp = self.query(&statement).await?;
        Ok(resp
            .purchases
            .into_iter()
            .map(|p| p.into_purchase())
            .collect())
    }

    /// Invoice revenue in the range with a monthly breakdown.
    pub async fn revenue(&self, range: &DateRange) -> Result<Revenue, QuickBooksError> {
        let statement = format!(
            "SELECT * FROM Invoice WHERE TxnDate >= '{}' AND TxnDate <= '{}' ORDERBY TxnDate DESC",
            range.start, range.end
        );
        let resp = self.query(&statement).await?;

        let mut total = 0.0;
        let mut by_month: BTreeMap<String, f64> = BTreeMap::new();
        for invoice in resp.invoices {
            total += invoice.total_amt;
            let month = invoice.txn_date.chars().take(7).collect::<String>();
            if !month.is_empty() {
                *by_month.entry(month).or_default() += invoice.total_amt;
            }
        }
        Ok(Revenue {
            total_revenue: round2(total),
            by_month,
        })
    }

    /// Expenses and revenue rolled into one summary for the range.
    pub async fn financial_summary(
        &self,
        range: &DateRange,
    ) -> Result<FinancialSummary, QuickBooksError> {
        let (purchases, revenue) =
            tokio::try_join!(self.expenses(range), self.revenue(range))?;
        Ok(summarize(&purchases, &revenue))
    }

    /// Revenue minus expenses with margin, 0 margin on zero revenue.
    pub async fn profit_loss(&self, range: &DateRange) -> Result<ProfitLoss, QuickBooksError> {
        let summary = self.financial_summary(range).await?;
        let net = summary.total_revenue - summary.total_expenses;
        Ok(ProfitLoss {
            revenue: round2(summary.total_revenue),
            expenses: summary.total_expenses,
            net_income: round2(net),
            margin: round2(ratio(net, summary.total_revenue) * 100.0),
        })
    }
}
