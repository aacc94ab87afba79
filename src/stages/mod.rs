//! Stage Reconcilers
//!
//! One pass per relation pair. Every stage reads Source, mutates only
//! Master and appends to the shared audit log. The run order is fixed:
//! Excluded, OOS, Prikom, Absence.

pub mod absence;
pub mod excluded;
pub mod oos;
pub mod prikom;

pub use absence::sync_absence;
pub use excluded::sync_excluded;
pub use oos::sync_oos;
pub use prikom::sync_prikom;

use crate::audit::{AuditLog, EventKind};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::relation::{Dataset, Relation};
use crate::services::RosterServices;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Excluded,
    Oos,
    Prikom,
    Absence,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [Stage::Excluded, Stage::Oos, Stage::Prikom, Stage::Absence];

    /// 1-based position in the run.
    pub fn number(self) -> usize {
        match self {
            Stage::Excluded => 1,
            Stage::Oos => 2,
            Stage::Prikom => 3,
            Stage::Absence => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Excluded => "excluded",
            Stage::Oos => "oos",
            Stage::Prikom => "prikom",
            Stage::Absence => "absence",
        }
    }

    /// Message of the STEP audit event opening the stage.
    fn step_message(self) -> &'static str {
        match self {
            Stage::Excluded => "Обробка таблиці 'Виключені'",
            Stage::Oos => "Обробка ООС (Посади, Звання, Контракти)",
            Stage::Prikom => "Обробка Прикомандированих",
            Stage::Absence => "Обробка Тимчасово відсутніх",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one stage went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Source records examined
    pub processed: usize,
    /// Source records skipped for having no key at all
    pub blank: usize,
    /// Whether the stage was skipped for a missing Master relation
    pub skipped: bool,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            blank: 0,
            skipped: false,
        }
    }

    fn skipped(stage: Stage) -> Self {
        Self {
            skipped: true,
            ..Self::new(stage)
        }
    }
}

/// Everything a stage may touch during one run.
pub struct SyncContext<'a> {
    pub source: &'a Dataset,
    pub master: &'a mut Dataset,
    pub log: &'a mut AuditLog,
    pub services: &'a mut dyn RosterServices,
    pub config: &'a SyncConfig,
}

impl<'a> SyncContext<'a> {
    /// Opens a stage: banner on the operator stream, STEP in the audit log.
    fn begin(&mut self, stage: Stage) {
        info!("Stage {}/{}: {}", stage.number(), Stage::ORDER.len(), stage);
        self.log.note(EventKind::Step, stage.step_message());
    }

    /// The Source relation, or `None` (with a warning) when the snapshot
    /// does not have it. A missing Source relation reads as zero rows.
    fn source_relation(&self, name: &str) -> Option<&'a Relation> {
        let source: &'a Dataset = self.source;
        let relation = source.relation(name);
        if relation.is_none() {
            warn!(relation = %name, "Source snapshot has no such relation, nothing to reconcile");
        }
        relation
    }

    /// Checks that Master holds the relation a stage writes to. A missing
    /// one is logged as WARN and the stage is skipped.
    fn require_master(&mut self, stage: Stage, name: &str) -> bool {
        if self.master.contains(name) {
            return true;
        }
        self.log.note(
            EventKind::Warn,
            format!("Таблиця '{}' відсутня в оригіналі, етап '{}' пропущено", name, stage),
        );
        false
    }
}

fn master_relation<'d>(master: &'d Dataset, name: &str) -> Result<&'d Relation> {
    master
        .relation(name)
        .ok_or_else(|| SyncError::Relation(format!("Relation {} not found in Master", name)))
}

fn master_relation_mut<'d>(master: &'d mut Dataset, name: &str) -> Result<&'d mut Relation> {
    master
        .relation_mut(name)
        .ok_or_else(|| SyncError::Relation(format!("Relation {} not found in Master", name)))
}

/// Periodic "row i of n" lines on the operator stream.
struct Progress {
    stage: Stage,
    total: usize,
    every: usize,
}

impl Progress {
    fn new(stage: Stage, total: usize, every: usize) -> Self {
        Self {
            stage,
            total,
            every: every.max(1),
        }
    }

    /// `row` is 1-based.
    fn tick(&self, row: usize) {
        if row % self.every == 0 {
            info!(stage = %self.stage, "processing row {} of {}", row, self.total);
        }
    }
}
