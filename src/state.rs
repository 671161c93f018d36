//! Shared application state handed to every request handler.

use std::sync::Arc;

use crate::config::DashboardConfig;
use crate::expenses::ExpenseStore;
use crate::kpi::KpiEngine;
use crate::overrides::{JsonFileStore, OverrideStore};

pub struct AppState {
    pub config: DashboardConfig,
    pub kpi: KpiEngine,
    pub overrides: Arc<dyn OverrideStore>,
    pub expenses: ExpenseStore,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: DashboardConfig) -> SharedState {
        let kpi = KpiEngine::from_config(&config);
        let overrides = Arc::new(JsonFileStore::new(config.overrides_path.clone()));
        Arc::new(Self {
            config,
            kpi,
            overrides,
            expenses: ExpenseStore::new(),
        })
    }
}
