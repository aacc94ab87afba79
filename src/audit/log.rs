use crate::audit::event::{AuditEvent, EventKind};
use crate::error::{Result, SyncError};
use crate::relation::{Dataset, OpenMode, Record, Relation};
use chrono::Local;
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Header of the persisted audit relation.
pub const AUDIT_HEADER: [&str; 4] = ["Time", "EventKind", "Key", "Message"];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// In-memory audit log for one run. Every event is mirrored to the
/// operator stream as it is recorded.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EventKind, message: impl Into<String>, key: impl Into<String>) {
        let event = AuditEvent {
            timestamp: Local::now(),
            kind,
            key: key.into(),
            message: message.into(),
        };

        match event.kind {
            EventKind::Warn => warn!(kind = %event.kind, key = %event.key, "{}", event.message),
            _ => info!(kind = %event.kind, key = %event.key, "{}", event.message),
        }

        self.events.push(event);
    }

    /// Records an event without a key.
    pub fn note(&mut self, kind: EventKind, message: impl Into<String>) {
        self.record(kind, message, "");
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, kind: &EventKind) -> usize {
        self.events.iter().filter(|e| &e.kind == kind).count()
    }

    /// Events of one kind carrying `key`.
    pub fn keyed<'a>(&'a self, kind: &'a EventKind, key: &'a str) -> impl Iterator<Item = &'a AuditEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| &e.kind == kind && e.key == key)
    }

    /// Event counts by kind string.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.events
            .iter()
            .map(|e| e.kind.to_string())
            .counts()
            .into_iter()
            .collect()
    }

    pub fn mutation_count(&self) -> usize {
        self.events.iter().filter(|e| e.kind.is_mutation()).count()
    }

    /// Writes the whole log into `relation` of `dataset`, replacing the rows
    /// of the previous run. The header is created when the relation is
    /// missing and preserved otherwise. Consumes the log, so a run flushes
    /// at most once.
    pub fn flush(self, dataset: &mut Dataset, relation: &str) -> Result<Vec<AuditEvent>> {
        if dataset.mode() == OpenMode::ReadOnly {
            return Err(SyncError::Dataset(format!(
                "Cannot write audit log into read-only dataset {}",
                dataset.root().display()
            )));
        }

        if !dataset.contains(relation) {
            dataset.insert(Relation::new(
                relation,
                AUDIT_HEADER.iter().map(|h| h.to_string()).collect(),
            ));
        }

        let table = dataset
            .relation_mut(relation)
            .ok_or_else(|| SyncError::Relation(format!("Audit relation {} unavailable", relation)))?;
        table.clear_rows();

        for event in &self.events {
            table.push(Record::new(vec![
                event.timestamp.format(TIME_FORMAT).to_string(),
                event.kind.to_string(),
                event.key.clone(),
                event.message.clone(),
            ]));
        }

        info!("Wrote {} audit events to {}", self.events.len(), relation);
        Ok(self.events)
    }
}
