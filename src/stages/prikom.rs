//! Stage 3: attached personnel, keyed by (full name, arrival date).

use super::{master_relation, master_relation_mut, Progress, Stage, StageReport, SyncContext};
use crate::audit::EventKind;
use crate::error::Result;
use crate::relation::{Relation, RowPos};
use std::collections::HashMap;
use tracing::debug;

type AttachmentKey = (String, String);

pub fn sync_prikom(ctx: &mut SyncContext<'_>) -> Result<StageReport> {
    let stage = Stage::Prikom;
    ctx.begin(stage);

    let config = ctx.config;
    let names = &config.relations;
    let layout = &config.prikom;

    let Some(source) = ctx.source_relation(&names.prikom) else {
        return Ok(StageReport::new(stage));
    };
    if !ctx.require_master(stage, &names.prikom) {
        return Ok(StageReport::skipped(stage));
    }

    let src_name = source.column_or_warn(&layout.full_name);
    let src_arrival = source.column_or_warn(&layout.arrival_date);
    let src_departure = source.column_or_warn(&layout.departure_date);

    let (m_name, m_arrival, m_departure, mut attachments) = {
        let prikom = master_relation(ctx.master, &names.prikom)?;
        let m_name = prikom.column_or_warn(&layout.full_name);
        let m_arrival = prikom.column_or_warn(&layout.arrival_date);
        let m_departure = prikom.column_or_warn(&layout.departure_date);
        let attachments = index_attachments(prikom, m_name, m_arrival);
        (m_name, m_arrival, m_departure, attachments)
    };

    let mut report = StageReport::new(stage);
    let progress = Progress::new(stage, source.len(), config.progress_every);

    for (idx, record) in source.rows().iter().enumerate() {
        progress.tick(idx + 1);

        let full_name = record.field(src_name);
        if full_name.is_empty() {
            debug!(stage = %stage, row = idx + 1, "Skipping row without name");
            report.blank += 1;
            continue;
        }
        report.processed += 1;

        let key = (full_name.to_string(), record.field(src_arrival).to_string());
        let departure = record.field(src_departure);

        match attachments.get(&key).copied() {
            Some(Some(pos)) => {
                let Some(m_departure) = m_departure else {
                    continue;
                };
                let prikom = master_relation_mut(ctx.master, &names.prikom)?;
                let open = prikom
                    .record(pos)
                    .map(|r| r.get(m_departure).is_empty())
                    .unwrap_or(false);
                if !departure.is_empty() && open {
                    prikom.set(pos, m_departure, departure);
                    ctx.log.record(
                        EventKind::Close,
                        format!("Вибув прикомандирований: {} ({})", full_name, departure),
                        full_name,
                    );
                }
            }
            // Added earlier in this run but not locatable in Master
            Some(None) => {}
            None => {
                let fields = source.field_map(RowPos::from_index(idx));
                let index = ctx.services.add_attached(ctx.master, &fields)?;
                ctx.log.record(
                    EventKind::Add,
                    format!("Додано прикомандированого: {}", full_name),
                    index.as_str(),
                );

                let pos = master_relation(ctx.master, &names.prikom)?.find_row_by(|r| {
                    r.field(m_name) == key.0 && r.field(m_arrival) == key.1
                });
                attachments.insert(key, pos);
            }
        }
    }

    Ok(report)
}

/// (name, arrival) → row. The first row seen for a pair wins.
fn index_attachments(
    prikom: &Relation,
    name: Option<usize>,
    arrival: Option<usize>,
) -> HashMap<AttachmentKey, Option<RowPos>> {
    let mut index = HashMap::new();
    for (idx, record) in prikom.rows().iter().enumerate() {
        let full_name = record.field(name);
        if full_name.is_empty() {
            continue;
        }
        index
            .entry((full_name.to_string(), record.field(arrival).to_string()))
            .or_insert(Some(RowPos::from_index(idx)));
    }
    index
}
