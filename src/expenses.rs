//! In-memory expense ledger for receipts captured through the dashboard.
//!
//! Deliberately transient: the durable books live in the accounting
//! platform, this store only holds what was scanned since the last restart.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::helpers::round2;

const DEFAULT_CATEGORY: &str = "Other Expenses";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub date: NaiveDate,
    pub vendor: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
}

/// Incoming expense payload; optional fields take defaults on insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    pub vendor: String,
    pub amount: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub receipt_image: Option<String>,
    #[serde(default)]
    pub ocr_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseSummary {
    pub count: usize,
    pub total: f64,
    pub by_category: BTreeMap<String, f64>,
}

#[derive(Default)]
pub struct ExpenseStore {
    inner: RwLock<Vec<Expense>>,
}

impl ExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an expense, filling defaults, and return the stored record.
    pub fn add(&self, new: NewExpense, today: NaiveDate) -> Expense {
        let expense = Expense {
            id: Uuid::new_v4(),
            date: new.date.unwrap_or(today),
            description: new
                .description
                .unwrap_or_else(|| format!("Expense at {}", new.vendor)),
            vendor: new.vendor,
            amount: new.amount,
            category: new.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            receipt_image: new.receipt_image,
            ocr_text: new.ocr_text,
        };
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.push(expense.clone());
        expense
    }

    /// All expenses, newest first.
    pub fn list(&self) -> Vec<Expense> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut expenses = guard.clone();
        expenses.sort_by(|a, b| b.date.cmp(&a.date));
        expenses
    }

    /// Remove by id; false when no such expense exists.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|e| e.id != id);
        guard.len() < before
    }

    pub fn summary(&self) -> ExpenseSummary {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
        let mut total = 0.0;
        for expense in guard.iter() {
            total += expense.amount;
            *by_category.entry(expense.category.clone()).or_default() += expense.amount;
        }
        ExpenseSummary {
            count: guard.len(),
            total: round2(total),
            by_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 30).unwrap()
    }

    fn new_expense(vendor: &str, amount: f64) -> NewExpense {
        NewExpense {
            vendor: vendor.to_string(),
            amount,
            date: None,
            category: None,
            description: None,
            receipt_image: None,
            ocr_text: None,
        }
    }

    #[test]
    fn test_add_fills_defaults() {
        let store = ExpenseStore::new();
        let expense = store.add(new_expense("Shell", 45.20), today());
        assert_eq!(expense.date, today());
        assert_eq!(expense.category, DEFAULT_CATEGORY);
        assert_eq!(expense.description, "Expense at Shell");
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_list_newest_first() {
        let store = ExpenseStore::new();
        let mut older = new_expense("A", 1.0);
        older.date = NaiveDate::from_ymd_opt(2026, 8, 1);
        store.add(older, today());
        store.add(new_expense("B", 2.0), today());

        let listed = store.list();
        assert_eq!(listed[0].vendor, "B");
        assert_eq!(listed[1].vendor, "A");
    }

    #[test]
    fn test_remove() {
        let store = ExpenseStore::new();
        let expense = store.add(new_expense("Shell", 45.20), today());
        assert!(store.remove(expense.id));
        assert!(!store.remove(expense.id));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_summary_by_category() {
        let store = ExpenseStore::new();
        let mut fuel = new_expense("Shell", 40.0);
        fuel.category = Some("Travel & Transport".to_string());
        store.add(fuel, today());
        store.add(new_expense("Misc", 10.0), today());
        store.add(new_expense("Misc 2", 5.5), today());

        let summary = store.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total, 55.5);
        assert_eq!(summary.by_category["Travel & Transport"], 40.0);
        assert_eq!(summary.by_category[DEFAULT_CATEGORY], 15.5);
    }

    #[test]
    fn test_payload_deserialization() {
        let json = r#"{"vendor": "Shell", "amount": 45.2, "date": "2026-08-12"}"#;
        let new: NewExpense = serde_json::from_str(json).unwrap();
        assert_eq!(new.vendor, "Shell");
        assert_eq!(new.date, NaiveDate::from_ymd_opt(2026, 8, 12));
        assert!(new.category.is_none());
    }
}
