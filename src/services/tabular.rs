//! Tabular Services - collaborators backed by the Master dataset relations

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::relation::{Dataset, FieldMap, Relation, RowPos};
use crate::services::reference::ReferenceData;
use crate::services::{MoveRequest, RosterServices};
use chrono::Local;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

pub struct TabularServices {
    config: SyncConfig,
    reference: ReferenceData,
    /// Vacant position indexes in staffing order. `None` until prepared
    /// from a non-empty staffing table; Source indexes are then taken as-is.
    free_indexes: Option<VecDeque<String>>,
    attached_seq: Option<usize>,
    /// Attached indexes already in use, refreshed from Master on each add.
    attached_taken: HashSet<String>,
}

impl TabularServices {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            reference: ReferenceData::new(),
            free_indexes: None,
            attached_seq: None,
            attached_taken: HashSet::new(),
        }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Vacant indexes, or `None` when the pool was never prepared.
    pub fn free_indexes(&self) -> Option<Vec<String>> {
        self.free_indexes.as_ref().map(|pool| pool.iter().cloned().collect())
    }

    /// Takes `index` out of the vacant pool. Always succeeds when there is
    /// no pool.
    fn claim(&mut self, index: &str) -> bool {
        let Some(pool) = self.free_indexes.as_mut() else {
            return true;
        };
        match pool.iter().position(|free| free == index) {
            Some(pos) => {
                pool.remove(pos);
                true
            }
            None => false,
        }
    }

    fn release(&mut self, index: &str) {
        if index.is_empty() || self.reference.position(index).is_none() {
            return;
        }
        if let Some(pool) = self.free_indexes.as_mut() {
            if !pool.iter().any(|free| free == index) {
                pool.push_back(index.to_string());
            }
        }
    }

    fn next_free(&mut self) -> Option<String> {
        self.free_indexes.as_mut().and_then(VecDeque::pop_front)
    }

    /// Fills post title and division from the staffing table where the
    /// record leaves them blank.
    fn fill_post_details(&self, fields: &mut FieldMap, index: &str) {
        let Some(info) = self.reference.position(index) else {
            return;
        };
        let layout = &self.config.oos;
        for (column, value) in [
            (&layout.position_title, &info.title),
            (&layout.division, &info.division),
        ] {
            let slot = fields.entry(column.clone()).or_default();
            if slot.is_empty() {
                *slot = value.clone();
            }
        }
    }

    fn add_timesheet_row(&self, master: &mut Dataset, index: &str, full_name: &str) {
        let layout = &self.config.timesheet;
        let Some(timesheet) = master.relation_mut(&self.config.relations.timesheet) else {
            debug!("No timesheet relation, skipping timesheet row for {}", index);
            return;
        };
        if timesheet.find_row(&layout.position_index, index).is_some() {
            return;
        }

        let mut fields = FieldMap::new();
        fields.insert(layout.position_index.clone(), index.to_string());
        fields.insert(layout.full_name.clone(), full_name.to_string());
        timesheet.push_fields(&fields);
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

impl RosterServices for TabularServices {
    fn load_index_maps(&mut self, master: &Dataset) -> Result<()> {
        self.reference.load_index_maps(master, &self.config);
        Ok(())
    }

    fn load_division_maps(&mut self, master: &Dataset) -> Result<()> {
        self.reference.load_division_maps(master, &self.config);
        Ok(())
    }

    fn prepare_free_cadet_indexes(&mut self, relation: &Relation, column: &str) -> Result<()> {
        if self.reference.position_indexes().is_empty() {
            warn!("Staffing table is empty, vacant posts are not tracked");
            self.free_indexes = None;
            return Ok(());
        }

        let occupied: HashSet<&str> = match relation.column_or_warn(column) {
            Some(idx) => relation.rows().iter().map(|r| r.get(idx)).collect(),
            None => HashSet::new(),
        };

        let pool: VecDeque<String> = self
            .reference
            .position_indexes()
            .iter()
            .filter(|index| !occupied.contains(index.as_str()))
            .cloned()
            .collect();

        info!("{} vacant posts available", pool.len());
        self.free_indexes = Some(pool);
        Ok(())
    }

    fn archive_timesheet_row(&mut self, master: &mut Dataset, position_index: &str) -> Result<bool> {
        if position_index.is_empty() {
            return Ok(false);
        }

        let relations = &self.config.relations;
        let layout = &self.config.timesheet;
        let Some(timesheet) = master.relation_mut(&relations.timesheet) else {
            warn!("Timesheet relation '{}' not found, nothing archived", relations.timesheet);
            return Ok(false);
        };
        let Some(pos) = timesheet.find_row(&layout.position_index, position_index) else {
            return Ok(false);
        };

        let mut fields = timesheet.field_map(pos);
        let mut archive_header = timesheet.header().to_vec();
        timesheet.remove(pos);

        if !master.contains(&relations.timesheet_archive) {
            archive_header.push(layout.archived_at.clone());
            master.insert(Relation::new(relations.timesheet_archive.clone(), archive_header));
        }
        let archive = master.relation_mut(&relations.timesheet_archive).ok_or_else(|| {
            SyncError::Services(format!("Archive relation {} unavailable", relations.timesheet_archive))
        })?;

        fields.insert(layout.archived_at.clone(), Local::now().format("%Y-%m-%d").to_string());
        archive.push_fields(&fields);

        self.release(position_index);
        Ok(true)
    }

    fn move_person(&mut self, master: &mut Dataset, request: &MoveRequest) -> Result<()> {
        let relations = &self.config.relations;
        let layout = &self.config.oos;

        let oos = master
            .relation_mut(&relations.oos)
            .ok_or_else(|| SyncError::Services(format!("Relation {} not found", relations.oos)))?;
        if !oos.set_by_name(request.row, &layout.position_index, request.new_index.as_str()) {
            return Err(SyncError::Services(format!(
                "Cannot set position of row {} in {}",
                request.row.number(),
                relations.oos
            )));
        }
        if let Some(info) = self.reference.position(&request.new_index) {
            oos.set_by_name(request.row, &layout.position_title, info.title.as_str());
            oos.set_by_name(request.row, &layout.division, info.division.as_str());
        }
        for (column, value) in [
            (&layout.order_number, &request.order_number),
            (&layout.order_date, &request.order_date),
            (&layout.effective_date, &request.effective_date),
        ] {
            if !value.is_empty() {
                oos.set_by_name(request.row, column, value.as_str());
            }
        }

        // Another roster row still on the old post means it was already taken
        // over earlier in this run (a swap), so it stays occupied.
        let old_post_taken = oos.column(&layout.position_index).is_some_and(|idx| {
            oos.rows()
                .iter()
                .enumerate()
                .any(|(row, r)| row != request.row.index() && r.get(idx) == request.old_index)
        });

        let ts_layout = &self.config.timesheet;
        if let Some(timesheet) = master.relation_mut(&relations.timesheet) {
            // Prefer the person's own row: in a swap the old index may already
            // label a row re-keyed by an earlier move.
            let index_col = timesheet.column(&ts_layout.position_index);
            let name_col = timesheet.column(&ts_layout.full_name);
            let row = timesheet
                .find_row_by(|r| {
                    r.field(index_col) == request.old_index && r.field(name_col) == request.full_name
                })
                .or_else(|| timesheet.find_row(&ts_layout.position_index, &request.old_index));
            match row {
                Some(pos) if !request.old_index.is_empty() => {
                    timesheet.set_by_name(pos, &ts_layout.position_index, request.new_index.as_str());
                    timesheet.set_by_name(pos, &ts_layout.full_name, request.full_name.as_str());
                }
                _ => warn!(
                    "Timesheet row for post '{}' not found while moving {}",
                    request.old_index, request.full_name
                ),
            }
        }

        let abs_layout = &self.config.absence;
        if let Some(absence) = master.relation_mut(&relations.absence) {
            let name_col = absence.column(&abs_layout.full_name);
            let return_col = absence.column(&abs_layout.fact_return);
            if let Some(index_col) = absence.column(&layout.position_index) {
                let open_rows: Vec<usize> = absence
                    .rows()
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| {
                        r.field(name_col) == request.full_name
                            && r.field(return_col).is_empty()
                            && r.get(index_col) == request.old_index
                    })
                    .map(|(idx, _)| idx)
                    .collect();
                for idx in open_rows {
                    absence.set(RowPos::from_index(idx), index_col, request.new_index.as_str());
                }
            }
        }

        if !old_post_taken {
            self.release(&request.old_index);
        }
        if !self.claim(&request.new_index) {
            warn!(
                "Post '{}' was not vacant when {} moved into it",
                request.new_index, request.full_name
            );
        }
        Ok(())
    }

    fn register_new_oos(
        &mut self,
        master: &mut Dataset,
        fields: &FieldMap,
        position_index: &str,
    ) -> Result<Option<String>> {
        let full_name = fields.get(&self.config.oos.full_name).cloned().unwrap_or_default();

        let index = if position_index.is_empty() {
            match self.next_free() {
                Some(index) => index,
                None => {
                    warn!("No vacant post for {}", full_name);
                    return Ok(None);
                }
            }
        } else if self.claim(position_index) {
            position_index.to_string()
        } else {
            warn!("Post '{}' requested for {} is not vacant", position_index, full_name);
            return Ok(None);
        };

        let mut record = fields.clone();
        record.insert(self.config.oos.position_index.clone(), index.clone());
        self.fill_post_details(&mut record, &index);

        let oos_name = self.config.relations.oos.clone();
        let oos = master
            .relation_mut(&oos_name)
            .ok_or_else(|| SyncError::Services(format!("Relation {} not found", oos_name)))?;
        oos.push_fields(&record);

        self.add_timesheet_row(master, &index, &full_name);
        Ok(Some(index))
    }

    fn add_attached(&mut self, master: &mut Dataset, fields: &FieldMap) -> Result<String> {
        let relations = &self.config.relations;
        let layout = &self.config.prikom;
        let prikom = master
            .relation(&relations.prikom)
            .ok_or_else(|| SyncError::Services(format!("Relation {} not found", relations.prikom)))?;
        self.attached_seq.get_or_insert(prikom.len());
        if let Some(idx) = prikom.column(&layout.attached_index) {
            self.attached_taken
                .extend(prikom.rows().iter().map(|r| r.get(idx).to_string()).filter(|v| !v.is_empty()));
        }

        let mut record = fields.clone();
        let existing = record.get(&layout.attached_index).cloned().unwrap_or_default();
        let index = if existing.is_empty() {
            let arrival = record.get(&layout.arrival_date).cloned().unwrap_or_default();
            let departure = record.get(&layout.departure_date).cloned().unwrap_or_default();
            self.generate_attached_index(&arrival, &departure)
        } else {
            existing
        };
        record.insert(self.config.prikom.attached_index.clone(), index.clone());

        let prikom_name = self.config.relations.prikom.clone();
        if let Some(prikom) = master.relation_mut(&prikom_name) {
            prikom.push_fields(&record);
        }

        let full_name = record
            .get(&self.config.prikom.full_name)
            .cloned()
            .unwrap_or_default();
        self.add_timesheet_row(master, &index, &full_name);
        Ok(index)
    }

    fn generate_attached_index(&mut self, arrival: &str, departure: &str) -> String {
        loop {
            let seq = self.attached_seq.get_or_insert(0);
            *seq += 1;

            let mut index = format!(
                "{}-{}-{:03}",
                self.config.attached_index_prefix,
                digits(arrival),
                seq
            );
            if !departure.is_empty() {
                index.push('-');
                index.push_str(&digits(departure));
            }
            if self.attached_taken.insert(index.clone()) {
                return index;
            }
            debug!("Attached index {} already in use, trying the next one", index);
        }
    }

    fn division_name(&self, code: &str) -> Option<String> {
        self.reference.division_name(code).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{OpenMode, Record};

    fn master() -> Dataset {
        let mut master = Dataset::new("unused", OpenMode::ReadWrite);
        master.insert(Relation::from_strs(
            "staffing",
            &["Індекс посади", "Посада", "Підрозділ"],
            &[&["101", "Курсант", "D1"], &["102", "Курсант", "D1"], &["201", "Командир", "D2"]],
        ));
        master.insert(Relation::from_strs(
            "oos",
            &["ПІБ", "ІНН", "Індекс посади", "Посада", "Підрозділ", "Номер наказу"],
            &[&["Петренко", "A1", "101", "Курсант", "D1", ""]],
        ));
        master.insert(Relation::from_strs(
            "timesheet",
            &["Індекс посади", "ПІБ", "01"],
            &[&["101", "Петренко", "8"]],
        ));
        master.insert(Relation::from_strs(
            "absence",
            &["ПІБ", "Вид відсутності", "Дата вибуття", "Дата фактичного повернення", "Індекс посади"],
            &[&["Петренко", "Відпустка", "2024-03-01", "", "101"]],
        ));
        master.insert(Relation::from_strs(
            "prikom",
            &["ПІБ", "Дата прибуття", "Дата вибуття", "Індекс"],
            &[&["Гнатюк", "2024-01-10", "", "ПК-20240110-001"]],
        ));
        master
    }

    fn prepared(master: &Dataset) -> TabularServices {
        let mut services = TabularServices::new(SyncConfig::default());
        services.load_index_maps(master).unwrap();
        services.load_division_maps(master).unwrap();
        let oos = master.relation("oos").unwrap();
        services.prepare_free_cadet_indexes(oos, "Індекс посади").unwrap();
        services
    }

    #[test]
    fn test_free_pool_excludes_occupied_posts() {
        let master = master();
        let services = prepared(&master);
        assert_eq!(services.free_indexes(), Some(vec!["102".to_string(), "201".to_string()]));
    }

    #[test]
    fn test_archive_moves_timesheet_row_and_frees_post() {
        let mut master = master();
        let mut services = prepared(&master);

        assert!(services.archive_timesheet_row(&mut master, "101").unwrap());
        assert!(master.rows("timesheet").is_empty());

        let archive = master.relation("timesheet_archive").unwrap();
        assert_eq!(archive.header().last().map(String::as_str), Some("Дата архівації"));
        assert_eq!(archive.value(RowPos::from_index(0), "ПІБ"), "Петренко");
        assert_eq!(archive.value(RowPos::from_index(0), "01"), "8");
        assert!(services.free_indexes().unwrap().contains(&"101".to_string()));

        assert!(!services.archive_timesheet_row(&mut master, "101").unwrap());
        assert!(!services.archive_timesheet_row(&mut master, "").unwrap());
    }

    #[test]
    fn test_move_person_updates_dependents() {
        let mut master = master();
        let mut services = prepared(&master);
        let request = MoveRequest {
            row: RowPos::from_index(0),
            full_name: "Петренко".to_string(),
            old_index: "101".to_string(),
            new_index: "201".to_string(),
            order_number: "15".to_string(),
            order_date: String::new(),
            effective_date: String::new(),
        };
        services.move_person(&mut master, &request).unwrap();

        let oos = master.relation("oos").unwrap();
        let row = RowPos::from_index(0);
        assert_eq!(oos.value(row, "Індекс посади"), "201");
        assert_eq!(oos.value(row, "Посада"), "Командир");
        assert_eq!(oos.value(row, "Підрозділ"), "D2");
        assert_eq!(oos.value(row, "Номер наказу"), "15");
        assert_eq!(master.rows("timesheet")[0].get(0), "201");
        assert_eq!(master.rows("absence")[0].get(4), "201");

        let pool = services.free_indexes().unwrap();
        assert!(pool.contains(&"101".to_string()));
        assert!(!pool.contains(&"201".to_string()));
    }

    fn move_request(row: usize, full_name: &str, old_index: &str, new_index: &str) -> MoveRequest {
        MoveRequest {
            row: RowPos::from_index(row),
            full_name: full_name.to_string(),
            old_index: old_index.to_string(),
            new_index: new_index.to_string(),
            order_number: String::new(),
            order_date: String::new(),
            effective_date: String::new(),
        }
    }

    #[test]
    fn test_swapped_posts_keep_each_timesheet_row() {
        let mut master = master();
        master
            .relation_mut("oos")
            .unwrap()
            .push(Record::new(["Бойко", "B2", "102", "Курсант", "D1", ""].map(String::from).to_vec()));
        master
            .relation_mut("timesheet")
            .unwrap()
            .push(Record::new(["102", "Бойко", "6"].map(String::from).to_vec()));
        let mut services = prepared(&master);

        services
            .move_person(&mut master, &move_request(0, "Петренко", "101", "102"))
            .unwrap();
        services
            .move_person(&mut master, &move_request(1, "Бойко", "102", "101"))
            .unwrap();

        let timesheet = master.relation("timesheet").unwrap();
        assert_eq!(timesheet.len(), 2);
        let petrenko = timesheet.find_row("ПІБ", "Петренко").unwrap();
        assert_eq!(timesheet.value(petrenko, "Індекс посади"), "102");
        assert_eq!(timesheet.value(petrenko, "01"), "8");
        let boyko = timesheet.find_row("ПІБ", "Бойко").unwrap();
        assert_eq!(timesheet.value(boyko, "Індекс посади"), "101");
        assert_eq!(timesheet.value(boyko, "01"), "6");

        assert_eq!(services.free_indexes(), Some(vec!["201".to_string()]));
    }

    #[test]
    fn test_missing_relation_is_a_collaborator_error() {
        let mut master = Dataset::new("unused", OpenMode::ReadWrite);
        let mut services = TabularServices::new(SyncConfig::default());

        let moved = services.move_person(&mut master, &move_request(0, "Петренко", "101", "102"));
        assert!(matches!(moved, Err(SyncError::Services(_))));
        assert!(matches!(
            services.add_attached(&mut master, &FieldMap::new()),
            Err(SyncError::Services(_))
        ));
    }

    #[test]
    fn test_register_new_oos_claims_posts() {
        let mut master = master();
        let mut services = prepared(&master);

        let mut fields = FieldMap::new();
        fields.insert("ПІБ".to_string(), "Коваль".to_string());
        fields.insert("ІНН".to_string(), "B2".to_string());

        let index = services.register_new_oos(&mut master, &fields, "").unwrap();
        assert_eq!(index.as_deref(), Some("102"));
        let oos = master.relation("oos").unwrap();
        assert_eq!(oos.value(RowPos::from_index(1), "Посада"), "Курсант");
        assert!(master.find_row("timesheet", "Індекс посади", "102").is_some());

        // Occupied post is refused
        assert_eq!(services.register_new_oos(&mut master, &fields, "101").unwrap(), None);
        assert_eq!(
            services.register_new_oos(&mut master, &fields, "201").unwrap().as_deref(),
            Some("201")
        );
        // Pool exhausted
        assert_eq!(services.register_new_oos(&mut master, &fields, "").unwrap(), None);
    }

    #[test]
    fn test_unprepared_pool_takes_source_index() {
        let mut master = master();
        let mut services = TabularServices::new(SyncConfig::default());
        let mut fields = FieldMap::new();
        fields.insert("ПІБ".to_string(), "Коваль".to_string());

        assert_eq!(
            services.register_new_oos(&mut master, &fields, "999").unwrap().as_deref(),
            Some("999")
        );
        assert_eq!(services.register_new_oos(&mut master, &fields, "").unwrap(), None);
    }

    #[test]
    fn test_add_attached_generates_index() {
        let mut master = master();
        let mut services = prepared(&master);

        let mut fields = FieldMap::new();
        fields.insert("ПІБ".to_string(), "Бойко".to_string());
        fields.insert("Дата прибуття".to_string(), "2024-05-02".to_string());

        let index = services.add_attached(&mut master, &fields).unwrap();
        assert_eq!(index, "ПК-20240502-002");
        assert_eq!(master.rows("prikom").len(), 2);
        assert!(master.find_row("timesheet", "Індекс посади", &index).is_some());

        let closed = services.generate_attached_index("2024-05-02", "2024-06-01");
        assert_eq!(closed, "ПК-20240502-003-20240601");
    }

    #[test]
    fn test_generated_index_skips_indexes_in_use() {
        let mut master = master();
        master
            .relation_mut("prikom")
            .unwrap()
            .push(Record::new(["Мельник", "2024-05-02", "", "ПК-20240502-003"].map(String::from).to_vec()));
        let mut services = prepared(&master);

        let mut fields = FieldMap::new();
        fields.insert("ПІБ".to_string(), "Бойко".to_string());
        fields.insert("Дата прибуття".to_string(), "2024-05-02".to_string());

        let index = services.add_attached(&mut master, &fields).unwrap();
        assert_eq!(index, "ПК-20240502-004");
        assert_eq!(master.rows("prikom")[2].get(3), "ПК-20240502-004");
    }
}
