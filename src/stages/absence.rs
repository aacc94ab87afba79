//! Stage 4: temporary absences, keyed by (full name, type, leave date).
//!
//! Open Master absences are closed first, then new Source absences are
//! added for people currently on the roster.

use super::{master_relation, master_relation_mut, Progress, Stage, StageReport, SyncContext};
use crate::audit::EventKind;
use crate::config::AbsenceLayout;
use crate::error::Result;
use crate::relation::{Relation, RowPos};
use std::collections::HashSet;
use tracing::{debug, info, warn};

type AbsenceKey = (String, String, String);

/// Absence columns resolved against one relation.
#[derive(Clone, Copy)]
struct Columns {
    name: Option<usize>,
    kind: Option<usize>,
    leave: Option<usize>,
    fact_return: Option<usize>,
}

impl Columns {
    fn resolve(relation: &Relation, layout: &AbsenceLayout) -> Self {
        Self {
            name: relation.column_or_warn(&layout.full_name),
            kind: relation.column_or_warn(&layout.absence_type),
            leave: relation.column_or_warn(&layout.leave_date),
            fact_return: relation.column_or_warn(&layout.fact_return),
        }
    }
}

pub fn sync_absence(ctx: &mut SyncContext<'_>) -> Result<StageReport> {
    let stage = Stage::Absence;
    ctx.begin(stage);

    let config = ctx.config;
    let names = &config.relations;

    let Some(source) = ctx.source_relation(&names.absence) else {
        return Ok(StageReport::new(stage));
    };
    if !ctx.require_master(stage, &names.absence) {
        return Ok(StageReport::skipped(stage));
    }

    let src = Columns::resolve(source, &config.absence);
    let dst = Columns::resolve(master_relation(ctx.master, &names.absence)?, &config.absence);

    close_returned(ctx, source, src, dst)?;

    let mut report = StageReport::new(stage);
    add_new(ctx, source, src, dst, &mut report)?;
    Ok(report)
}

/// Closes every open Master absence whose first Source counterpart by
/// (name, type) carries a fact-return date.
fn close_returned(ctx: &mut SyncContext<'_>, source: &Relation, src: Columns, dst: Columns) -> Result<()> {
    let config = ctx.config;
    info!(stage = %Stage::Absence, "checking open absences for return");

    let Some(dst_return) = dst.fact_return else {
        return Ok(());
    };

    let absence = master_relation(ctx.master, &config.relations.absence)?;
    let open: Vec<(RowPos, String, String)> = absence
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.get(dst_return).is_empty() && !r.field(dst.name).is_empty())
        .map(|(idx, r)| {
            (
                RowPos::from_index(idx),
                r.field(dst.name).to_string(),
                r.field(dst.kind).to_string(),
            )
        })
        .collect();

    for (pos, full_name, kind) in open {
        let counterpart = source
            .rows()
            .iter()
            .find(|r| r.field(src.name) == full_name && r.field(src.kind) == kind);
        let Some(counterpart) = counterpart else {
            continue;
        };

        let returned = counterpart.field(src.fact_return);
        if returned.is_empty() {
            continue;
        }

        master_relation_mut(ctx.master, &config.relations.absence)?.set(pos, dst_return, returned);
        ctx.log.record(
            EventKind::Close,
            format!("Закрито відсутність: {} ({}, повернення {})", full_name, kind, returned),
            full_name.as_str(),
        );
    }
    Ok(())
}

/// Adds Source absences missing from Master. The person must be on the
/// roster; descriptive fields are copied from their OOS record.
fn add_new(
    ctx: &mut SyncContext<'_>,
    source: &Relation,
    src: Columns,
    dst: Columns,
    report: &mut StageReport,
) -> Result<()> {
    let config = ctx.config;
    let names = &config.relations;
    let layout = &config.absence;
    let oos_layout = &config.oos;

    let mut known: HashSet<AbsenceKey> = master_relation(ctx.master, &names.absence)?
        .rows()
        .iter()
        .map(|r| {
            (
                r.field(dst.name).to_string(),
                r.field(dst.kind).to_string(),
                r.field(dst.leave).to_string(),
            )
        })
        .collect();

    let progress = Progress::new(Stage::Absence, source.len(), config.progress_every);

    for (idx, record) in source.rows().iter().enumerate() {
        progress.tick(idx + 1);

        let full_name = record.field(src.name);
        let leave = record.field(src.leave);
        if full_name.is_empty() || leave.is_empty() {
            debug!(stage = %Stage::Absence, row = idx + 1, "Skipping row without name or leave date");
            report.blank += 1;
            continue;
        }
        report.processed += 1;

        let kind = record.field(src.kind);
        let key = (full_name.to_string(), kind.to_string(), leave.to_string());
        if known.contains(&key) {
            continue;
        }

        let on_roster = ctx.master.relation(&names.oos).and_then(|oos| {
            let pos = oos.find_row(&oos_layout.full_name, full_name)?;
            Some((oos.field_map(pos), oos.value(pos, &oos_layout.division).to_string()))
        });
        let Some((roster_fields, division_code)) = on_roster else {
            warn!(
                stage = %Stage::Absence,
                person = %full_name,
                "Absent person is not on the roster, absence not added"
            );
            continue;
        };

        let mut fields = source.field_map(RowPos::from_index(idx));
        for column in &layout.copied_from_oos {
            if let Some(value) = roster_fields.get(column) {
                fields.insert(column.clone(), value.clone());
            }
        }
        if !division_code.is_empty() {
            let division = ctx
                .services
                .division_name(&division_code)
                .unwrap_or(division_code);
            fields.insert(layout.division.clone(), division);
        }

        master_relation_mut(ctx.master, &names.absence)?.push_fields(&fields);
        ctx.log.record(
            EventKind::AddAbsence,
            format!("Нова відсутність: {}", full_name),
            kind,
        );
        known.insert(key);
    }
    Ok(())
}
