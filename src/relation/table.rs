//! In-memory relation: a header plus an ordered sequence of records.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Record fields keyed by header name, used to copy rows between relations
/// whose column order differs.
pub type FieldMap = BTreeMap<String, String>;

/// One data row. Missing trailing fields read as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn from_strs(fields: &[&str]) -> Self {
        Self::new(fields.iter().map(|f| f.to_string()).collect())
    }

    /// Field at `idx`, or `""` when the record is shorter than that.
    pub fn get(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Field through an optionally resolved column.
    pub fn field(&self, idx: Option<usize>) -> &str {
        idx.map(|i| self.get(i)).unwrap_or("")
    }

    /// Sets a field, padding the record with empty fields when needed.
    pub fn set(&mut self, idx: usize, value: impl Into<String>) {
        if self.fields.len() <= idx {
            self.fields.resize(idx + 1, String::new());
        }
        self.fields[idx] = value.into();
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Position of a data row (the header is not counted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowPos(usize);

impl RowPos {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// 0-based index into `Relation::rows()`.
    pub fn index(self) -> usize {
        self.0
    }

    /// 1-based data-row number, as shown to operators.
    pub fn number(self) -> usize {
        self.0 + 1
    }
}

#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    header: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Record>,
}

impl Relation {
    pub fn new(name: impl Into<String>, header: Vec<String>) -> Self {
        let mut positions = HashMap::new();
        for (idx, column) in header.iter().enumerate() {
            // Duplicate headers: the leftmost column is the addressable one
            positions.entry(column.clone()).or_insert(idx);
        }

        Self {
            name: name.into(),
            header,
            positions,
            rows: Vec::new(),
        }
    }

    /// Builds a relation from string slices. Handy for fixtures and tests.
    pub fn from_strs(name: &str, header: &[&str], rows: &[&[&str]]) -> Self {
        let mut relation = Self::new(name, header.iter().map(|h| h.to_string()).collect());
        for row in rows {
            relation.push(Record::from_strs(row));
        }
        relation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Position of a column by header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Like [`Relation::column`], but reports a missing column as a
    /// structural anomaly.
    pub fn column_or_warn(&self, name: &str) -> Option<usize> {
        let column = self.column(name);
        if column.is_none() {
            warn!(relation = %self.name, column = %name, "Column not found, values will read as empty");
        }
        column
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record(&self, pos: RowPos) -> Option<&Record> {
        self.rows.get(pos.index())
    }

    /// Value of `column` in the row at `pos`; `""` when either is absent.
    pub fn value(&self, pos: RowPos, column: &str) -> &str {
        match (self.record(pos), self.column(column)) {
            (Some(record), Some(idx)) => record.get(idx),
            _ => "",
        }
    }

    /// First data row whose `column` equals `value`.
    pub fn find_row(&self, column: &str, value: &str) -> Option<RowPos> {
        let idx = self.column(column)?;
        self.find_row_by(|record| record.get(idx) == value)
    }

    pub fn find_row_by<F>(&self, mut predicate: F) -> Option<RowPos>
    where
        F: FnMut(&Record) -> bool,
    {
        self.rows
            .iter()
            .position(|record| predicate(record))
            .map(RowPos::from_index)
    }

    pub fn push(&mut self, record: Record) -> RowPos {
        self.rows.push(record);
        RowPos::from_index(self.rows.len() - 1)
    }

    /// Appends a record laid out by this relation's header. Fields whose
    /// name is not a column here are dropped.
    pub fn push_fields(&mut self, fields: &FieldMap) -> RowPos {
        let record = Record::new(
            self.header
                .iter()
                .map(|column| fields.get(column).cloned().unwrap_or_default())
                .collect(),
        );
        self.push(record)
    }

    /// Sets a field through a resolved column. Returns `false` when the row
    /// does not exist.
    pub fn set(&mut self, pos: RowPos, idx: usize, value: impl Into<String>) -> bool {
        match self.rows.get_mut(pos.index()) {
            Some(record) => {
                record.set(idx, value);
                true
            }
            None => false,
        }
    }

    /// Sets a field by header name. Returns `false` when the column or the
    /// row does not exist.
    pub fn set_by_name(&mut self, pos: RowPos, column: &str, value: impl Into<String>) -> bool {
        match self.column(column) {
            Some(idx) => self.set(pos, idx, value),
            None => false,
        }
    }

    pub fn remove(&mut self, pos: RowPos) -> Option<Record> {
        if pos.index() < self.rows.len() {
            Some(self.rows.remove(pos.index()))
        } else {
            None
        }
    }

    /// Drops every data row, keeping the header.
    pub fn clear_rows(&mut self) {
        self.rows.clear();
    }

    /// The row at `pos` keyed by header name. Empty when the row is absent.
    pub fn field_map(&self, pos: RowPos) -> FieldMap {
        let Some(record) = self.record(pos) else {
            return FieldMap::new();
        };

        let mut fields = FieldMap::new();
        for (idx, column) in self.header.iter().enumerate() {
            fields.entry(column.clone()).or_insert_with(|| record.get(idx).to_string());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Relation {
        Relation::from_strs(
            "oos",
            &["ПІБ", "ІНН", "Індекс посади"],
            &[
                &["Петренко", "A1", "101"],
                &["Коваль"],
                &["Петренко", "A2", "103"],
            ],
        )
    }

    #[test]
    fn test_short_records_read_as_empty() {
        let relation = roster();
        let pos = RowPos::from_index(1);
        assert_eq!(relation.value(pos, "ПІБ"), "Коваль");
        assert_eq!(relation.value(pos, "ІНН"), "");
        assert_eq!(relation.value(pos, "Нема такої"), "");
    }

    #[test]
    fn test_find_row_returns_first_match() {
        let relation = roster();
        let pos = relation.find_row("ПІБ", "Петренко").unwrap();
        assert_eq!(pos.index(), 0);
        assert_eq!(pos.number(), 1);

        let pos = relation.find_row("ІНН", "A2").unwrap();
        assert_eq!(pos.number(), 3);

        assert!(relation.find_row("ІНН", "Z9").is_none());
        assert!(relation.find_row("Звання", "A1").is_none());
    }

    #[test]
    fn test_set_pads_short_record() {
        let mut relation = roster();
        let pos = RowPos::from_index(1);
        assert!(relation.set_by_name(pos, "Індекс посади", "102"));
        assert_eq!(relation.value(pos, "Індекс посади"), "102");
        assert!(!relation.set_by_name(pos, "Звання", "x"));
        assert!(!relation.set(RowPos::from_index(10), 0, "x"));
    }

    #[test]
    fn test_push_fields_follows_header_order() {
        let mut relation = roster();
        let mut fields = FieldMap::new();
        fields.insert("Індекс посади".to_string(), "104".to_string());
        fields.insert("ПІБ".to_string(), "Шевчук".to_string());
        fields.insert("Зайве".to_string(), "x".to_string());

        let pos = relation.push_fields(&fields);
        assert_eq!(pos.number(), 4);
        assert_eq!(
            relation.record(pos).unwrap().fields(),
            &["Шевчук".to_string(), String::new(), "104".to_string()]
        );
    }

    #[test]
    fn test_field_map_and_remove() {
        let mut relation = roster();
        let fields = relation.field_map(RowPos::from_index(2));
        assert_eq!(fields.get("ІНН").map(String::as_str), Some("A2"));

        let removed = relation.remove(RowPos::from_index(0)).unwrap();
        assert_eq!(removed.get(1), "A1");
        assert_eq!(relation.len(), 2);
        assert!(relation.remove(RowPos::from_index(5)).is_none());
    }
}
