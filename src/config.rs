//! Sync Configuration
//!
//! Relation file names and the column headers each stage reads, keyed by
//! their meaning. Defaults follow the legacy personnel workbook; a JSON file
//! can override any part of it.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "ROSTER_SYNC_CONFIG";

/// Environment variable naming the Source snapshot for unattended runs.
pub const SOURCE_ENV: &str = "ROSTER_SYNC_SOURCE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub relations: RelationNames,
    pub oos: OosLayout,
    pub excluded: ExcludedLayout,
    pub prikom: PrikomLayout,
    pub absence: AbsenceLayout,
    pub timesheet: TimesheetLayout,
    pub staffing: StaffingLayout,
    pub divisions: DivisionLayout,
    /// Progress line every N records within a stage
    pub progress_every: usize,
    /// Prefix of generated attached-personnel indexes
    pub attached_index_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relations: RelationNames::default(),
            oos: OosLayout::default(),
            excluded: ExcludedLayout::default(),
            prikom: PrikomLayout::default(),
            absence: AbsenceLayout::default(),
            timesheet: TimesheetLayout::default(),
            staffing: StaffingLayout::default(),
            divisions: DivisionLayout::default(),
            progress_every: 10,
            attached_index_prefix: "ПК".to_string(),
        }
    }
}

/// File stems of the relations inside a dataset directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationNames {
    pub oos: String,
    pub excluded: String,
    pub prikom: String,
    pub absence: String,
    pub timesheet: String,
    pub timesheet_archive: String,
    pub staffing: String,
    pub divisions: String,
    pub audit: String,
}

impl Default for RelationNames {
    fn default() -> Self {
        Self {
            oos: "oos".to_string(),
            excluded: "excluded".to_string(),
            prikom: "prikom".to_string(),
            absence: "absence".to_string(),
            timesheet: "timesheet".to_string(),
            timesheet_archive: "timesheet_archive".to_string(),
            staffing: "staffing".to_string(),
            divisions: "divisions".to_string(),
            audit: "MAPTransfer".to_string(),
        }
    }
}

/// An OOS field refreshed from Source on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedField {
    /// Stable name used in audit messages
    pub key: String,
    /// Column header
    pub column: String,
}

impl SyncedField {
    pub fn new(key: &str, column: &str) -> Self {
        Self {
            key: key.to_string(),
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OosLayout {
    pub primary_id: String,
    pub full_name: String,
    pub position_index: String,
    pub position_title: String,
    pub division: String,
    pub order_number: String,
    pub order_date: String,
    pub effective_date: String,
    /// Rank and contract fields, compared one by one
    pub synced_fields: Vec<SyncedField>,
}

impl Default for OosLayout {
    fn default() -> Self {
        Self {
            primary_id: "ІНН".to_string(),
            full_name: "ПІБ".to_string(),
            position_index: "Індекс посади".to_string(),
            position_title: "Посада".to_string(),
            division: "Підрозділ".to_string(),
            order_number: "Номер наказу".to_string(),
            order_date: "Дата наказу".to_string(),
            effective_date: "Дата призначення".to_string(),
            synced_fields: vec![
                SyncedField::new("rank", "Військове звання"),
                SyncedField::new("rank_order", "Наказ про присвоєння звання"),
                SyncedField::new("rank_date", "Дата присвоєння звання"),
                SyncedField::new("contract_kind", "Вид контракту"),
                SyncedField::new("contract_start", "Початок контракту"),
                SyncedField::new("contract_end", "Закінчення контракту"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludedLayout {
    pub primary_id: String,
    pub full_name: String,
}

impl Default for ExcludedLayout {
    fn default() -> Self {
        Self {
            primary_id: "ІНН".to_string(),
            full_name: "ПІБ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrikomLayout {
    pub full_name: String,
    pub arrival_date: String,
    pub departure_date: String,
    pub attached_index: String,
}

impl Default for PrikomLayout {
    fn default() -> Self {
        Self {
            full_name: "ПІБ".to_string(),
            arrival_date: "Дата прибуття".to_string(),
            departure_date: "Дата вибуття".to_string(),
            attached_index: "Індекс".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsenceLayout {
    pub full_name: String,
    pub absence_type: String,
    pub leave_date: String,
    pub fact_return: String,
    /// Division column, filled with the division name of the person's post
    pub division: String,
    /// Columns copied from the person's OOS record into a new absence
    pub copied_from_oos: Vec<String>,
}

impl Default for AbsenceLayout {
    fn default() -> Self {
        Self {
            full_name: "ПІБ".to_string(),
            absence_type: "Вид відсутності".to_string(),
            leave_date: "Дата вибуття".to_string(),
            fact_return: "Дата фактичного повернення".to_string(),
            division: "Підрозділ".to_string(),
            copied_from_oos: vec![
                "Індекс посади".to_string(),
                "Військове звання".to_string(),
                "Посада".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimesheetLayout {
    pub position_index: String,
    pub full_name: String,
    /// Extra column added to archived rows
    pub archived_at: String,
}

impl Default for TimesheetLayout {
    fn default() -> Self {
        Self {
            position_index: "Індекс посади".to_string(),
            full_name: "ПІБ".to_string(),
            archived_at: "Дата архівації".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffingLayout {
    pub position_index: String,
    pub position_title: String,
    pub division: String,
}

impl Default for StaffingLayout {
    fn default() -> Self {
        Self {
            position_index: "Індекс посади".to_string(),
            position_title: "Посада".to_string(),
            division: "Підрозділ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DivisionLayout {
    pub code: String,
    pub name: String,
}

impl Default for DivisionLayout {
    fn default() -> Self {
        Self {
            code: "Код".to_string(),
            name: "Назва".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a JSON file. Absent keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: SyncConfig = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;
        info!("Loaded sync config from {}", path.display());
        Ok(config)
    }

    /// Explicit path first, then `ROSTER_SYNC_CONFIG`, then built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.relations;
        let names = [
            ("oos", &r.oos),
            ("excluded", &r.excluded),
            ("prikom", &r.prikom),
            ("absence", &r.absence),
            ("timesheet", &r.timesheet),
            ("timesheet_archive", &r.timesheet_archive),
            ("staffing", &r.staffing),
            ("divisions", &r.divisions),
            ("audit", &r.audit),
        ];

        let mut seen = HashSet::new();
        for (role, name) in names {
            if name.trim().is_empty() {
                return Err(SyncError::Config(format!("Relation name for '{}' is blank", role)));
            }
            if !seen.insert(name.as_str()) {
                return Err(SyncError::Config(format!(
                    "Relation '{}' is assigned to more than one role",
                    name
                )));
            }
        }

        let key_columns = [
            ("oos.full_name", &self.oos.full_name),
            ("oos.position_index", &self.oos.position_index),
            ("excluded.full_name", &self.excluded.full_name),
            ("prikom.full_name", &self.prikom.full_name),
            ("prikom.arrival_date", &self.prikom.arrival_date),
            ("absence.full_name", &self.absence.full_name),
            ("absence.absence_type", &self.absence.absence_type),
            ("absence.leave_date", &self.absence.leave_date),
            ("absence.fact_return", &self.absence.fact_return),
        ];
        for (role, column) in key_columns {
            if column.trim().is_empty() {
                return Err(SyncError::Config(format!("Key column '{}' is blank", role)));
            }
        }

        if self.progress_every == 0 {
            return Err(SyncError::Config("progress_every must be at least 1".to_string()));
        }

        Ok(())
    }
}
