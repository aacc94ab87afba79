//! Run Orchestrator
//!
//! Opens both datasets, runs the four stages in order, then flushes the
//! audit log and saves Master. Nothing is written when any step before the
//! flush fails.

use crate::audit::{AuditLog, EventKind};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::relation::{Dataset, OpenMode};
use crate::services::{RosterServices, TabularServices};
use crate::stages::{sync_absence, sync_excluded, sync_oos, sync_prikom, StageReport, SyncContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of the stages over in-memory datasets.
#[derive(Debug)]
pub struct Reconciliation {
    pub log: AuditLog,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub master: PathBuf,
    pub source: PathBuf,
    pub dry_run: bool,
    pub stages: Vec<StageReport>,
    /// Event counts by kind
    pub events: BTreeMap<String, usize>,
    /// Events that changed Master
    pub mutations: usize,
    /// Relation holding the persisted audit log
    pub audit_relation: String,
    pub elapsed_secs: f64,
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Master: {}", self.master.display())?;
        writeln!(f, "Source: {}", self.source.display())?;

        writeln!(f, "\n=== Stages ===")?;
        for stage in &self.stages {
            if stage.skipped {
                writeln!(f, "{}/4 {}: skipped", stage.stage.number(), stage.stage)?;
            } else {
                writeln!(
                    f,
                    "{}/4 {}: {} records ({} without key)",
                    stage.stage.number(),
                    stage.stage,
                    stage.processed,
                    stage.blank
                )?;
            }
        }

        writeln!(f, "\n=== Events ===")?;
        for (kind, count) in &self.events {
            writeln!(f, "{}: {}", kind, count)?;
        }
        writeln!(f, "Mutations: {}", self.mutations)?;

        if self.dry_run {
            writeln!(f, "\nDry run: Master was not saved")?;
        } else {
            writeln!(f, "\nSee the {} relation for the full log", self.audit_relation)?;
        }
        writeln!(f, "Finished in {:.1} s", self.elapsed_secs)
    }
}

pub struct SyncEngine<S: RosterServices> {
    config: SyncConfig,
    services: S,
}

impl SyncEngine<TabularServices> {
    /// Engine backed by the Master dataset's own reference relations.
    pub fn tabular(config: SyncConfig) -> Self {
        let services = TabularServices::new(config.clone());
        Self::new(config, services)
    }
}

impl<S: RosterServices> SyncEngine<S> {
    pub fn new(config: SyncConfig, services: S) -> Self {
        Self { config, services }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn into_services(self) -> S {
        self.services
    }

    /// Full run against datasets on disk. With `dry_run` the audit log is
    /// not flushed and Master is not saved.
    pub fn run(&mut self, master_dir: &Path, source_dir: &Path, dry_run: bool) -> Result<SyncReport> {
        let started = Instant::now();

        info!("Opening Master dataset {}", master_dir.display());
        let mut master = Dataset::open(master_dir, OpenMode::ReadWrite)?;
        info!("Opening Source snapshot {}", source_dir.display());
        let source = Dataset::open(source_dir, OpenMode::ReadOnly)?;

        let Reconciliation { log, stages } = self.reconcile(&mut master, &source)?;
        let events = log.counts();
        let mutations = log.mutation_count();

        if dry_run {
            info!("Dry run, {} events not persisted", log.len());
        } else {
            info!("Writing audit log and saving Master");
            log.flush(&mut master, &self.config.relations.audit)?;
            master.save()?;
        }

        let report = SyncReport {
            master: master_dir.to_path_buf(),
            source: source_dir.to_path_buf(),
            dry_run,
            stages,
            events,
            mutations,
            audit_relation: self.config.relations.audit.clone(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!("Synchronization finished in {:.1} s", report.elapsed_secs);
        Ok(report)
    }

    /// Runs the four stages over in-memory datasets, mutating `master`.
    pub fn reconcile(&mut self, master: &mut Dataset, source: &Dataset) -> Result<Reconciliation> {
        let mut log = AuditLog::new();
        log.note(
            EventKind::Start,
            format!("Початок синхронізації з файлом: {}", source.root().display()),
        );

        info!("Loading reference maps");
        self.services.load_index_maps(master)?;
        self.services.load_division_maps(master)?;

        info!("Taking inventory of vacant posts");
        match master.relation(&self.config.relations.oos) {
            Some(oos) => self
                .services
                .prepare_free_cadet_indexes(oos, &self.config.oos.position_index)?,
            None => warn!(
                "Master has no {} relation, vacant posts not prepared",
                self.config.relations.oos
            ),
        }

        let mut ctx = SyncContext {
            source,
            master,
            log: &mut log,
            services: &mut self.services,
            config: &self.config,
        };

        let stages = vec![
            sync_excluded(&mut ctx)?,
            sync_oos(&mut ctx)?,
            sync_prikom(&mut ctx)?,
            sync_absence(&mut ctx)?,
        ];

        Ok(Reconciliation { log, stages })
    }
}
