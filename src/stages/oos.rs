//! Stage 2: active roster. Moves people between posts, refreshes rank and
//! contract fields, and adds newcomers unless they were excluded.

use super::{master_relation, master_relation_mut, Progress, Stage, StageReport, SyncContext};
use crate::audit::EventKind;
use crate::config::SyncedField;
use crate::error::Result;
use crate::key::{locate, Identity, PersonKey};
use crate::relation::{Record, Relation, RowPos};
use crate::services::MoveRequest;
use std::collections::HashSet;
use tracing::debug;

/// A synchronized field with its column resolved on both sides.
struct SyncedColumn<'c> {
    field: &'c SyncedField,
    source: Option<usize>,
    master: Option<usize>,
}

pub fn sync_oos(ctx: &mut SyncContext<'_>) -> Result<StageReport> {
    let stage = Stage::Oos;
    ctx.begin(stage);

    let config = ctx.config;
    let names = &config.relations;
    let layout = &config.oos;

    let Some(source) = ctx.source_relation(&names.oos) else {
        return Ok(StageReport::new(stage));
    };
    if !ctx.require_master(stage, &names.oos) {
        return Ok(StageReport::skipped(stage));
    }

    let excluded = excluded_keys(ctx);

    let src_primary = source.column(&layout.primary_id);
    let src_name = source.column_or_warn(&layout.full_name);
    let src_index = source.column_or_warn(&layout.position_index);

    let (m_primary, m_name, m_index, synced) = {
        let oos = master_relation(ctx.master, &names.oos)?;
        let synced: Vec<SyncedColumn<'_>> = layout
            .synced_fields
            .iter()
            .map(|field| SyncedColumn {
                field,
                source: source.column_or_warn(&field.column),
                master: oos.column_or_warn(&field.column),
            })
            .collect();
        (
            oos.column(&layout.primary_id),
            oos.column_or_warn(&layout.full_name),
            oos.column_or_warn(&layout.position_index),
            synced,
        )
    };

    let mut report = StageReport::new(stage);
    let progress = Progress::new(stage, source.len(), config.progress_every);

    for (idx, record) in source.rows().iter().enumerate() {
        progress.tick(idx + 1);

        let person = Identity::resolve(record, src_primary, src_name);
        if person.key.is_blank() {
            debug!(stage = %stage, row = idx + 1, "Skipping row without key");
            report.blank += 1;
            continue;
        }
        report.processed += 1;

        let found = {
            let oos = master_relation(ctx.master, &names.oos)?;
            locate(oos, m_primary, m_name, &person)
        };

        match found {
            Some(pos) => {
                let new_index = record.field(src_index);
                let old_index = master_relation(ctx.master, &names.oos)?
                    .record(pos)
                    .map(|r| r.field(m_index).to_string())
                    .unwrap_or_default();
                if !new_index.is_empty() && new_index != old_index {
                    move_person(ctx, source, record, pos, &person, old_index, new_index)?;
                }
                update_fields(ctx, record, pos, &person, &synced)?;
            }
            None if excluded.contains(&person.key) => {
                ctx.log.record(
                    EventKind::Skip,
                    format!("Людина є у списку Виключених, пропуск: {}", person.full_name),
                    person.key.as_str(),
                );
            }
            None => {
                let fields = source.field_map(RowPos::from_index(idx));
                let requested = record.field(src_index);
                match ctx.services.register_new_oos(ctx.master, &fields, requested)? {
                    Some(index) => ctx.log.record(
                        EventKind::Add,
                        format!("Нова людина в ООС: {} (посада {})", person.full_name, index),
                        person.key.as_str(),
                    ),
                    None => ctx.log.record(
                        EventKind::Warn,
                        format!("Немає вільної посади для нової людини в ООС: {}", person.full_name),
                        person.key.as_str(),
                    ),
                }
            }
        }
    }

    Ok(report)
}

/// Person-keys of Master's Excluded relation. People found here are never
/// put back on the roster.
fn excluded_keys(ctx: &SyncContext<'_>) -> HashSet<PersonKey> {
    let config = ctx.config;
    let Some(excluded) = ctx.master.relation(&config.relations.excluded) else {
        return HashSet::new();
    };
    let primary = excluded.column(&config.excluded.primary_id);
    let name = excluded.column(&config.excluded.full_name);

    excluded
        .rows()
        .iter()
        .map(|record| PersonKey::resolve(record, primary, name))
        .filter(|key| !key.is_blank())
        .collect()
}

fn move_person(
    ctx: &mut SyncContext<'_>,
    source: &Relation,
    record: &Record,
    pos: RowPos,
    person: &Identity,
    old_index: String,
    new_index: &str,
) -> Result<()> {
    let config = ctx.config;
    let layout = &config.oos;
    let value = |column: &str| record.field(source.column(column)).to_string();

    let request = MoveRequest {
        row: pos,
        full_name: person.full_name.clone(),
        old_index,
        new_index: new_index.to_string(),
        order_number: value(&layout.order_number),
        order_date: value(&layout.order_date),
        effective_date: value(&layout.effective_date),
    };
    ctx.services.move_person(ctx.master, &request)?;

    let order = if request.order_number.is_empty() {
        String::new()
    } else {
        format!(", наказ {}", request.order_number)
    };
    ctx.log.record(
        EventKind::Move,
        format!(
            "Переміщення {}: {} -> {}{}",
            person.full_name, request.old_index, request.new_index, order
        ),
        person.key.as_str(),
    );
    Ok(())
}

/// Copies each synchronized field that Source sets to a different value.
/// A blank Source value never overwrites Master.
fn update_fields(
    ctx: &mut SyncContext<'_>,
    record: &Record,
    pos: RowPos,
    person: &Identity,
    synced: &[SyncedColumn<'_>],
) -> Result<()> {
    let config = ctx.config;
    let oos_name = &config.relations.oos;

    for column in synced {
        let Some(master_col) = column.master else {
            continue;
        };
        let new_value = record.field(column.source);
        if new_value.is_empty() {
            continue;
        }

        let oos = master_relation_mut(ctx.master, oos_name)?;
        let old_value = oos
            .record(pos)
            .map(|r| r.get(master_col).to_string())
            .unwrap_or_default();
        if old_value == new_value {
            continue;
        }

        oos.set(pos, master_col, new_value);
        ctx.log.record(
            EventKind::UpdateInfo,
            format!(
                "Оновлено {} ({}) для {}: '{}' -> '{}'",
                column.field.key, column.field.column, person.full_name, old_value, new_value
            ),
            person.key.as_str(),
        );
    }
    Ok(())
}
