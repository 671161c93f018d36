//! Best-effort field extraction from OCR'd receipt text.
//!
//! This is a suggestion layer, not a parser: every regex here can misfire on
//! real receipts, so each extracted field is a pre-filled guess the caller
//! is expected to let a human correct. Confidence is whatever the OCR step
//! reported and is passed through for display only.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_VENDOR_LEN: usize = 50;
const MAX_LINE_ITEMS: usize = 10;
pub const FALLBACK_VENDOR: &str = "Unknown Vendor";
pub const FALLBACK_CATEGORY: &str = "Other Expenses";

/// Expense category keywords, matched against lowercased text and vendor.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Marketing & Advertising",
        &["facebook", "meta", "google ads", "advertising", "marketing"],
    ),
    (
        "Automotive",
        &["auto", "tint", "film", "ceramic", "ppf", "detail", "car wash"],
    ),
    (
        "Office Supplies",
        &["staples", "office depot", "paper", "ink", "toner"],
    ),
    (
        "Meals & Entertainment",
        &["restaurant", "cafe", "coffee", "pizza", "grill", "diner"],
    ),
    (
        "Travel & Transport",
        &["gas", "fuel", "shell", "chevron", "uber", "lyft", "parking"],
    ),
    ("Utilities", &["electric", "water", "internet", "phone", "utility"]),
    (
        "Professional Services",
        &["consulting", "legal", "accounting", "insurance"],
    ),
    (
        "Equipment & Tools",
        &["home depot", "lowes", "harbor freight", "tool", "equipment"],
    ),
];

// Numeric dates, month-day-year order assumed for the two-part form.
static DATE_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})").unwrap());
static DATE_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[/-](\d{1,2})[/-](\d{1,2})").unwrap());
static DATE_MONTH_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2}),?\s+(\d{4})")
        .unwrap()
});
static DATE_DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{4})")
        .unwrap()
});

static AMOUNT_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:grand\s*total|total|amount|sum)[\s:]*\$?\s*(\d{1,3}(?:,\d{3})*\.?\d{0,2})")
        .unwrap()
});
static AMOUNT_DUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:balance|due|charge)[\s:]*\$?\s*(\d{1,3}(?:,\d{3})*\.?\d{0,2})").unwrap()
});
static AMOUNT_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*(\d{1,3}(?:,\d{3})*\.\d{2})").unwrap());

static TAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:sales\s*tax|tax|vat|gst)[\s:]*\$?\s*(\d+\.?\d{0,2})").unwrap());
static SUBTOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:subtotal|sub-total)[\s:]*\$?\s*(\d+\.?\d{0,2})").unwrap());

static VENDOR_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([A-Z][A-Za-z0-9 &']+(?:LLC|Inc|Corp|Ltd|Co\.?)?)\s*$").unwrap()
});
static VENDOR_LABELED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^(?:merchant|vendor|store|from)[ \t:]+([A-Za-z0-9 &']+)").unwrap()
});

static LINE_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(.{4,}?)\s+\$?(\d+\.\d{2})\s*$").unwrap());

const MONTH_ABBREVS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// OCR output handed to the extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptScan {
    pub text: String,
    /// OCR engine confidence, 0..=100. Display only.
    #[serde(default)]
    pub confidence: f64,
}

/// A suggested line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub description: String,
    pub amount: f64,
}

/// Suggested expense fields extracted from one receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedReceipt {
    pub date: NaiveDate,
    pub vendor: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItem>>,
    pub confidence: f64,
    pub ocr_text: String,
}

fn month_number(abbrev: &str) -> Option<u32> {
    let lowered = abbrev.to_lowercase();
    MONTH_ABBREVS
        .iter()
        .position(|m| lowered.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn four_digit_year(raw: &str) -> i32 {
    let year: i32 = raw.parse().unwrap_or(0);
    if raw.len() == 2 {
        2000 + year
    } else {
        year
    }
}

/// First recognizable date in the text, trying the strictest dialect first.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = DATE_ISO.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }
    if let Some(caps) = DATE_MONTH_FIRST.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            four_digit_year(&caps[3]),
            month_number(&caps[1])?,
            caps[2].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }
    if let Some(caps) = DATE_DAY_FIRST.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            four_digit_year(&caps[3]),
            month_number(&caps[2])?,
            caps[1].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }
    if let Some(caps) = DATE_NUMERIC.captures(text) {
        return NaiveDate::from_ymd_opt(
            four_digit_year(&caps[3]),
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
        );
    }
    None
}

fn parse_amount(raw: &str) -> f64 {
    raw.replace(',', "").parse().unwrap_or(0.0)
}

/// The largest candidate amount wins. Receipts repeat the total in several
/// places and the grand total is never smaller than its parts.
pub fn extract_amount(text: &str) -> f64 {
    let mut best: f64 = 0.0;
    for re in [&*AMOUNT_TOTAL, &*AMOUNT_DUE, &*AMOUNT_BARE] {
        for caps in re.captures_iter(text) {
            best = best.max(parse_amount(&caps[1]));
        }
    }
    best
}

fn extract_labeled(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .map(|caps| parse_amount(&caps[1]))
        .filter(|v| *v > 0.0)
}

fn trivial_line(line: &str) -> bool {
    let line = line.trim();
    line.len() <= 2
        || line.chars().all(|c| c.is_ascii_digit())
        || {
            let lowered = line.to_lowercase();
            ["www", "http", "tel", "phone"]
                .iter()
                .any(|p| lowered.starts_with(p))
        }
}

pub fn extract_vendor(text: &str) -> String {
    let candidate = VENDOR_LABELED
        .captures(text)
        .or_else(|| VENDOR_HEADER.captures(text))
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| name.len() > 2);

    let vendor = candidate.or_else(|| {
        text.lines()
            .map(str::trim)
            .find(|line| !trivial_line(line))
            .map(str::to_string)
    });

    match vendor {
        Some(name) => name.chars().take(MAX_VENDOR_LEN).collect::<String>().trim().to_string(),
        None => FALLBACK_VENDOR.to_string(),
    }
}

pub fn extract_line_items(text: &str) -> Vec<LineItem> {
    LINE_ITEM
        .captures_iter(text)
        .filter_map(|caps| {
            let description = caps[1].trim().trim_end_matches([':', '.']).trim().to_string();
            let lowered = description.to_lowercase();
            if description.len() <= 3 || lowered.contains("total") || lowered == "tax" {
                return None;
            }
            Some(LineItem {
                description,
                amount: parse_amount(&caps[2]),
            })
        })
        .take(MAX_LINE_ITEMS)
        .collect()
}

/// Keyword-match a category over the text and vendor name.
pub fn categorize(text: &str, vendor: &str) -> String {
    let haystack = format!("{} {}", text, vendor).to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return category.to_string();
        }
    }
    FALLBACK_CATEGORY.to_string()
}

/// Extract suggested expense fields from an OCR scan. `reference_date` fills
/// in when no date is found, typically today in the business timezone.
pub fn extract(scan: &ReceiptScan, reference_date: NaiveDate) -> ExtractedReceipt {
    let date = extract_date(&scan.text).unwrap_or(reference_date);
    let vendor = extract_vendor(&scan.text);
    let amount = extract_amount(&scan.text);
    let category = categorize(&scan.text, &vendor);
    let items = extract_line_items(&scan.text);

    ExtractedReceipt {
        date,
        description: format!("Receipt from {vendor}"),
        amount,
        category,
        tax: extract_labeled(&TAX, &scan.text),
        subtotal: extract_labeled(&SUBTOTAL, &scan.text),
        items: if items.is_empty() { None } else { Some(items) },
        vendor,
        confidence: scan.confidence,
        ocr_text: scan.text.clone(),
    }
}
