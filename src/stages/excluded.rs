//! Stage 1: people newly excluded in Source move into Master's Excluded
//! relation and leave the active roster.

use super::{master_relation, master_relation_mut, Progress, Stage, StageReport, SyncContext};
use crate::audit::EventKind;
use crate::error::Result;
use crate::key::{locate, Identity, KeyIndex};
use crate::relation::RowPos;
use tracing::{debug, warn};

pub fn sync_excluded(ctx: &mut SyncContext<'_>) -> Result<StageReport> {
    let stage = Stage::Excluded;
    ctx.begin(stage);

    let config = ctx.config;
    let names = &config.relations;
    let layout = &config.excluded;

    let Some(source) = ctx.source_relation(&names.excluded) else {
        return Ok(StageReport::new(stage));
    };
    if !ctx.require_master(stage, &names.excluded) {
        return Ok(StageReport::skipped(stage));
    }

    let src_primary = source.column(&layout.primary_id);
    let src_name = source.column_or_warn(&layout.full_name);

    let mut known = {
        let excluded = master_relation(ctx.master, &names.excluded)?;
        KeyIndex::build(
            excluded,
            excluded.column(&layout.primary_id),
            excluded.column_or_warn(&layout.full_name),
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

        if known.contains(&person.key) {
            continue;
        }

        let fields = source.field_map(RowPos::from_index(idx));
        let pos = master_relation_mut(ctx.master, &names.excluded)?.push_fields(&fields);
        known.insert(person.key.clone(), pos);
        ctx.log.record(
            EventKind::Move,
            format!("Перенесено у Виключені: {}", person.full_name),
            person.key.as_str(),
        );

        remove_from_roster(ctx, &person)?;
    }

    Ok(report)
}

/// Removes a newly excluded person from Master OOS, archiving the
/// timesheet row of the post they held.
fn remove_from_roster(ctx: &mut SyncContext<'_>, person: &Identity) -> Result<()> {
    let config = ctx.config;
    let names = &config.relations;
    let layout = &config.oos;

    let found = ctx.master.relation(&names.oos).and_then(|oos| {
        let pos = locate(
            oos,
            oos.column(&layout.primary_id),
            oos.column(&layout.full_name),
            person,
        )?;
        Some((pos, oos.value(pos, &layout.position_index).to_string()))
    });

    let Some((pos, position_index)) = found else {
        ctx.log.record(
            EventKind::Warn,
            "Людина є у Виключених (копія), але не знайдена в ООС (оригінал)",
            person.full_name.as_str(),
        );
        return Ok(());
    };

    if !ctx.services.archive_timesheet_row(ctx.master, &position_index)? {
        warn!(
            key = %person.key,
            position = %position_index,
            "No timesheet row archived for departing person"
        );
    }
    master_relation_mut(ctx.master, &names.oos)?.remove(pos);
    ctx.log.record(
        EventKind::Delete,
        format!("Видалено з ООС (архівовано в табелі): {}", person.full_name),
        person.key.as_str(),
    );
    Ok(())
}
