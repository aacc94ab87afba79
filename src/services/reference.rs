//! Reference data: staffing table and division directory

use crate::config::SyncConfig;
use crate::relation::Dataset;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionInfo {
    pub title: String,
    /// Division code
    pub division: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    positions: HashMap<String, PositionInfo>,
    /// Position indexes in staffing-table order
    position_order: Vec<String>,
    divisions: HashMap<String, String>,
}

impl ReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the staffing relation. Returns the number of posts loaded.
    pub fn load_index_maps(&mut self, master: &Dataset, config: &SyncConfig) -> usize {
        self.positions.clear();
        self.position_order.clear();

        let Some(staffing) = master.relation(&config.relations.staffing) else {
            warn!("Staffing relation '{}' not found, post metadata unavailable", config.relations.staffing);
            return 0;
        };

        let layout = &config.staffing;
        let index_col = staffing.column_or_warn(&layout.position_index);
        let title_col = staffing.column(&layout.position_title);
        let division_col = staffing.column(&layout.division);

        for record in staffing.rows() {
            let index = record.field(index_col);
            if index.is_empty() || self.positions.contains_key(index) {
                continue;
            }
            self.position_order.push(index.to_string());
            self.positions.insert(
                index.to_string(),
                PositionInfo {
                    title: record.field(title_col).to_string(),
                    division: record.field(division_col).to_string(),
                },
            );
        }

        info!("Loaded {} posts from staffing table", self.positions.len());
        self.positions.len()
    }

    /// Reads the division directory. Returns the number of divisions loaded.
    pub fn load_division_maps(&mut self, master: &Dataset, config: &SyncConfig) -> usize {
        self.divisions.clear();

        let Some(divisions) = master.relation(&config.relations.divisions) else {
            warn!("Division relation '{}' not found, division names unavailable", config.relations.divisions);
            return 0;
        };

        let code_col = divisions.column_or_warn(&config.divisions.code);
        let name_col = divisions.column_or_warn(&config.divisions.name);
        for record in divisions.rows() {
            let code = record.field(code_col);
            if !code.is_empty() {
                self.divisions
                    .entry(code.to_string())
                    .or_insert_with(|| record.field(name_col).to_string());
            }
        }

        info!("Loaded {} divisions", self.divisions.len());
        self.divisions.len()
    }

    pub fn position(&self, index: &str) -> Option<&PositionInfo> {
        self.positions.get(index)
    }

    pub fn position_indexes(&self) -> &[String] {
        &self.position_order
    }

    pub fn division_name(&self, code: &str) -> Option<&str> {
        self.divisions.get(code).map(String::as_str)
    }
}
