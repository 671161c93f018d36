//! HighLevel CRM client: contact pagination and tag-based lead metrics.
//!
//! HighLevel's contacts endpoint is page-based (not cursor-based) and has no
//! server-side date filter we can trust, so the client walks pages
//! sequentially and filters by creation date locally, in the business
//! timezone.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::helpers::round2;
use crate::period::DateRange;

const API_BASE: &str = "https://services.leadconnectorhq.com";
const API_VERSION: &str = "2021-07-28";
const PAGE_SIZE: u32 = 100;
/// Hard ceiling on the pagination loop. 50 pages x 100 contacts covers the
/// whole contact book many times over.
const MAX_PAGES: u32 = 50;
const INTER_PAGE_DELAY: Duration = Duration::from_millis(100);

/// Tag that marks a paying customer.
pub const TAG_PAYING: &str = "paid/job completed";
/// Tag that marks a deposit-only customer.
pub const TAG_DEPOSIT: &str = "deposit paid";
/// Only these source tags count a contact as a lead.
pub const LEAD_SOURCE_TAGS: &[&str] = &["facebook", "organic"];
/// Hot-lead tags per service line: (service, tag).
pub const HOT_LEAD_TAGS: &[(&str, &str)] = &[
    ("tints", "hot lead - tints"),
    ("ceramic", "hot lead - ceramic coating"),
    ("ppf", "hot lead - ppf"),
];
/// Estimated pipeline value per hot lead, in dollars.
pub const PIPELINE_VALUE_PER_HOT_LEAD: f64 = 400.0;

#[derive(Debug, thiserror::Error)]
pub enum HighLevelError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HighLevel API error {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct HighLevelConfig {
    pub api_token: String,
    pub location_id: String,
}

// ============================================================================
// Wire types
// ============================================================================

/// A CRM contact. Read-only mirror of HighLevel's state, fetched fresh per
/// request and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp, RFC 3339 in UTC.
    #[serde(default)]
    pub date_added: Option<String>,
}

impl Contact {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim().to_string();
        if name.is_empty() {
            "Unknown".to_string()
        } else {
            name
        }
    }

    /// Civil date the contact was created, in the business timezone.
    pub fn added_on(&self, tz: Tz) -> Option<NaiveDate> {
        let raw = self.date_added.as_deref()?;
        DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00"))
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&tz).date_naive())
    }
}

#[derive(Debug, Deserialize)]
struct ContactsPage {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    total: Option<u64>,
}

// ============================================================================
// Derived metrics
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HotLeads {
    pub total: usize,
    pub by_service: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Customers {
    pub total_paying: usize,
    pub total_deposit: usize,
}

/// Tag-derived business metrics over a contact set.
#[derive(Debug, Clone, Serialize)]
pub struct BusinessData {
    pub total_contacts: usize,
    pub hot_leads: HotLeads,
    pub customers: Customers,
    /// Paying customers / lead base x 100, 0 when the base is empty.
    pub conversion_rate: f64,
    /// Hot leads x estimated value per lead.
    pub pipeline_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leads_by_source: Option<BTreeMap<String, usize>>,
}

/// Compute all-time metrics over the full contact book. Conversion is
/// measured against hot leads.
pub fn business_data(contacts: &[Contact]) -> BusinessData {
    let hot_leads = count_hot_leads(contacts);
    let paying = contacts.iter().filter(|c| c.has_tag(TAG_PAYING)).count();
    let deposit = contacts.iter().filter(|c| c.has_tag(TAG_DEPOSIT)).count();

    let conversion_rate = if hot_leads.total > 0 {
        round2(paying as f64 / hot_leads.total as f64 * 100.0)
    } else {
        0.0
    };

    BusinessData {
        total_contacts: contacts.len(),
        pipeline_value: hot_leads.total as f64 * PIPELINE_VALUE_PER_HOT_LEAD,
        hot_leads,
        customers: Customers {
            total_paying: paying,
            total_deposit: deposit,
        },
        conversion_rate,
        leads_by_source: None,
    }
}

/// Compute period metrics over contacts created in a range. The lead base is
/// source-tagged contacts only, and conversion is measured against it.
pub fn period_business_data(period_contacts: &[Contact]) -> BusinessData {
    let mut leads_by_source = BTreeMap::new();
    let mut total_leads = 0usize;
    for tag in LEAD_SOURCE_TAGS {
        let count = period_contacts.iter().filter(|c| c.has_tag(tag)).count();
        if count > 0 {
            leads_by_source.insert(tag.to_string(), count);
            total_leads += count;
        }
    }

    let hot_leads = count_hot_leads(period_contacts);
    let paying = period_contacts
        .iter()
        .filter(|c| c.has_tag(TAG_PAYING))
        .count();
    let deposit = period_contacts
        .iter()
        .filter(|c| c.has_tag(TAG_DEPOSIT))
        .count();

    let conversion_rate = if total_leads > 0 {
        round2(paying as f64 / total_leads as f64 * 100.0)
    } else {
        0.0
    };

    BusinessData {
        total_contacts: total_leads,
        pipeline_value: hot_leads.total as f64 * PIPELINE_VALUE_PER_HOT_LEAD,
        hot_leads,
        customers: Customers {
            total_paying: paying,
            total_deposit: deposit,
        },
        conversion_rate,
        leads_by_source: Some(leads_by_source),
    }
}

fn count_hot_leads(contacts: &[Contact]) -> HotLeads {
    let mut by_service = BTreeMap::new();
    let mut total = 0usize;
    for (service, tag) in HOT_LEAD_TAGS {
        let count = contacts.iter().filter(|c| c.has_tag(tag)).count();
        by_service.insert(service.to_string(), count);
        total += count;
    }
    HotLeads { total, by_service }
}

/// Keep only contacts created inside the range (business-timezone dates).
/// Contacts with no parseable creation date are dropped.
pub fn filter_by_range(contacts: Vec<Contact>, range: &DateRange, tz: Tz) -> Vec<Contact> {
    contacts
        .into_iter()
        .filter(|c| c.added_on(tz).map(|d| range.contains(d)).unwrap_or(false))
        .collect()
}

// ============================================================================
// Client
// ============================================================================

pub struct HighLevelClient {
    http: reqwest::Client,
    config: HighLevelConfig,
}

impl HighLevelClient {
    pub fn new(config: HighLevelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn fetch_page(&self, page: u32, limit: u32) -> Result<ContactsPage, HighLevelError> {
        let resp = self
            .http
            .get(format!("{API_BASE}/contacts"))
            .bearer_auth(&self.config.api_token)
            .header("Version", API_VERSION)
            .query(&[
                ("locationId", self.config.location_id.as_str()),
                ("limit", &limit.to_string()),
                ("page", &page.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(HighLevelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Walk the contacts endpoint page by page until an empty page or the
    /// page ceiling, with a fixed inter-page delay to stay under rate limits.
    pub async fn fetch_all_contacts(&self) -> Result<Vec<Contact>, HighLevelError> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let batch = self.fetch_page(page, PAGE_SIZE).await?;
            if batch.contacts.is_empty() {
                break;
            }
            debug!(page, count = batch.contacts.len(), "fetched contact page");
            all.extend(batch.contacts);

            page += 1;
            if page > MAX_PAGES {
                warn!(
                    pages = MAX_PAGES,
                    "hit contact pagination ceiling; contact book may be truncated"
                );
                break;
            }
            tokio::time::sleep(INTER_PAGE_DELAY).await;
        }

        Ok(all)
    }

    /// Contacts created inside the range (business-timezone dates).
    pub async fn contacts_in_range(
        &self,
        range: &DateRange,
        tz: Tz,
    ) -> Result<Vec<Contact>, HighLevelError> {
        let all = self.fetch_all_contacts().await?;
        Ok(filter_by_range(all, range, tz))
    }

    /// Paying customers acquired in the range.
    pub async fn period_customers(
        &self,
        range: &DateRange,
        tz: Tz,
    ) -> Result<usize, HighLevelError> {
        let contacts = self.contacts_in_range(range, tz).await?;
        Ok(contacts.iter().filter(|c| c.has_tag(TAG_PAYING)).count())
    }

    /// Single-contact probe for the debug endpoint: (returned count, reported total).
    pub async fn probe(&self) -> Result<(usize, u64), HighLevelError> {
        let page = self.fetch_page(1, 1).await?;
        Ok((page.contacts.len(), page.total.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn contact(id: &str, tags: &[&str], date_added: Option<&str>) -> Contact {
        Contact {
            id: id.to_string(),
            first_name: None,
            last_name: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            date_added: date_added.map(|d| d.to_string()),
        }
    }

    #[test]
    fn test_contacts_page_deserialization() {
        let json = r#"{
            "contacts": [
                {
                    "id": "c1",
                    "firstName": "Dana",
                    "lastName": "Reyes",
                    "tags": ["facebook", "hot lead - tints"],
                    "dateAdded": "2026-08-10T14:22:00Z"
                },
                {"id": "c2"}
            ],
            "total": 412
        }"#;

        let page: ContactsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.contacts.len(), 2);
        assert_eq!(page.contacts[0].display_name(), "Dana Reyes");
        assert!(page.contacts[0].has_tag("facebook"));
        assert!(page.contacts[1].tags.is_empty());
        assert_eq!(page.contacts[1].display_name(), "Unknown");
        assert_eq!(page.total, Some(412));
    }

    #[test]
    fn test_added_on_converts_timezone() {
        // 02:30 UTC on the 11th is still the 10th in New York (DST, UTC-4)
        let c = contact("c1", &[], Some("2026-08-11T02:30:00Z"));
        assert_eq!(
            c.added_on(New_York),
            Some(NaiveDate::from_ymd_opt(2026, 8, 10).unwrap())
        );
    }

    #[test]
    fn test_filter_by_range_drops_undated() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
        };
        let contacts = vec![
            contact("in", &[], Some("2026-08-10T12:00:00Z")),
            contact("out", &[], Some("2026-08-14T12:00:00Z")),
            contact("undated", &[], None),
        ];
        let kept = filter_by_range(contacts, &range, New_York);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "in");
    }

    #[test]
    fn test_business_data_counts() {
        let contacts = vec![
            contact("a", &["hot lead - tints", TAG_PAYING], None),
            contact("b", &["hot lead - tints"], None),
            contact("c", &["hot lead - ppf", TAG_DEPOSIT], None),
            contact("d", &["facebook"], None),
        ];
        let data = business_data(&contacts);
        assert_eq!(data.total_contacts, 4);
        assert_eq!(data.hot_leads.total, 3);
        assert_eq!(data.hot_leads.by_service["tints"], 2);
        assert_eq!(data.hot_leads.by_service["ppf"], 1);
        assert_eq!(data.hot_leads.by_service["ceramic"], 0);
        assert_eq!(data.customers.total_paying, 1);
        assert_eq!(data.customers.total_deposit, 1);
        assert_eq!(data.conversion_rate, 33.33);
        assert_eq!(data.pipeline_value, 1200.0);
    }

    #[test]
    fn test_business_data_zero_hot_leads() {
        let contacts = vec![contact("a", &["facebook"], None)];
        let data = business_data(&contacts);
        assert_eq!(data.conversion_rate, 0.0);
        assert_eq!(data.pipeline_value, 0.0);
    }

    #[test]
    fn test_period_business_data_lead_sources() {
        let contacts = vec![
            contact("a", &["facebook", TAG_PAYING], None),
            contact("b", &["facebook"], None),
            contact("c", &["organic"], None),
            contact("d", &["referral"], None), // not a counted source
        ];
        let data = period_business_data(&contacts);
        assert_eq!(data.total_contacts, 3);
        let sources = data.leads_by_source.unwrap();
        assert_eq!(sources["facebook"], 2);
        assert_eq!(sources["organic"], 1);
        assert_eq!(data.conversion_rate, 33.33);
    }

    #[test]
    fn test_period_business_data_omits_empty_sources() {
        let contacts = vec![contact("a", &["organic"], None)];
        let data = period_business_data(&contacts);
        let sources = data.leads_by_source.unwrap();
        assert!(!sources.contains_key("facebook"));
    }
}
