//! Key Resolver
//!
//! Decides whether two records describe the same person: the primary
//! identifier wins when it is set, the full name is the fallback.

use crate::relation::{Record, Relation, RowPos};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Literal the legacy tables use for "no identifier".
const UNSET_ID: &str = "0";

/// An identifier counts as set when it is non-empty and not `"0"`.
pub fn is_set_id(id: &str) -> bool {
    !id.is_empty() && id != UNSET_ID
}

/// Canonical matching key. A `Primary` key never equals a `NameOnly` key,
/// even when the underlying strings coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PersonKey {
    Primary(String),
    NameOnly(String),
}

impl PersonKey {
    /// Resolve the key of `record` given its primary and name columns.
    pub fn resolve(record: &Record, primary_field: Option<usize>, name_field: Option<usize>) -> Self {
        Self::from_values(record.field(primary_field), record.field(name_field))
    }

    pub fn from_values(primary_id: &str, full_name: &str) -> Self {
        if is_set_id(primary_id) {
            PersonKey::Primary(primary_id.to_string())
        } else {
            PersonKey::NameOnly(full_name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PersonKey::Primary(id) => id,
            PersonKey::NameOnly(name) => name,
        }
    }

    pub fn primary_id(&self) -> Option<&str> {
        match self {
            PersonKey::Primary(id) => Some(id),
            PersonKey::NameOnly(_) => None,
        }
    }

    /// A name-only key with an empty name: a padding row, not a person.
    pub fn is_blank(&self) -> bool {
        matches!(self, PersonKey::NameOnly(name) if name.is_empty())
    }
}

impl fmt::Display for PersonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person as seen in one record: the matching key plus the full name,
/// which is still needed for name-based lookups when the key is primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key: PersonKey,
    pub full_name: String,
}

impl Identity {
    pub fn resolve(record: &Record, primary_field: Option<usize>, name_field: Option<usize>) -> Self {
        Self {
            key: PersonKey::resolve(record, primary_field, name_field),
            full_name: record.field(name_field).to_string(),
        }
    }
}

/// Finds a person's row: by primary identifier first, then by name.
///
/// The name fallback skips rows that carry a different identifier, so a
/// primary-keyed person never lands on a namesake.
pub fn locate(
    relation: &Relation,
    primary_field: Option<usize>,
    name_field: Option<usize>,
    person: &Identity,
) -> Option<RowPos> {
    if let (Some(id), Some(_)) = (person.key.primary_id(), primary_field) {
        if let Some(pos) = relation.find_row_by(|r| r.field(primary_field) == id) {
            return Some(pos);
        }
    }

    if name_field.is_none() || person.full_name.is_empty() {
        return None;
    }

    relation.find_row_by(|r| {
        if r.field(name_field) != person.full_name {
            return false;
        }
        match person.key.primary_id() {
            Some(id) => {
                let row_id = r.field(primary_field);
                !is_set_id(row_id) || row_id == id
            }
            None => true,
        }
    })
}

/// Person-key index over a relation. The first row seen for a key wins;
/// later duplicates are invisible to matching.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    rows: HashMap<PersonKey, RowPos>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(relation: &Relation, primary_field: Option<usize>, name_field: Option<usize>) -> Self {
        let mut index = Self::new();
        for (idx, record) in relation.rows().iter().enumerate() {
            let key = PersonKey::resolve(record, primary_field, name_field);
            if key.is_blank() {
                continue;
            }
            if !index.insert(key.clone(), RowPos::from_index(idx)) {
                warn!(
                    relation = %relation.name(),
                    key = %key,
                    row = idx + 1,
                    "Duplicate person key, first occurrence wins"
                );
            }
        }
        index
    }

    /// Returns `false` (and keeps the existing entry) when the key is
    /// already present.
    pub fn insert(&mut self, key: PersonKey, pos: RowPos) -> bool {
        if self.rows.contains_key(&key) {
            return false;
        }
        self.rows.insert(key, pos);
        true
    }

    pub fn contains(&self, key: &PersonKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn get(&self, key: &PersonKey) -> Option<RowPos> {
        self.rows.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_wins_over_name() {
        let record = Record::from_strs(&["Петренко", "A1"]);
        let key = PersonKey::resolve(&record, Some(1), Some(0));
        assert_eq!(key, PersonKey::Primary("A1".to_string()));
    }

    #[test]
    fn test_unset_sentinels_fall_back_to_name() {
        for id in ["", "0"] {
            let record = Record::from_strs(&["Петренко", id]);
            assert_eq!(
                PersonKey::resolve(&record, Some(1), Some(0)),
                PersonKey::NameOnly("Петренко".to_string())
            );
        }
        // Column missing from the relation
        let record = Record::from_strs(&["Петренко"]);
        assert_eq!(
            PersonKey::resolve(&record, None, Some(0)),
            PersonKey::NameOnly("Петренко".to_string())
        );
    }

    #[test]
    fn test_primary_never_equals_name_only() {
        assert_ne!(
            PersonKey::Primary("Коваль".to_string()),
            PersonKey::NameOnly("Коваль".to_string())
        );
    }

    #[test]
    fn test_same_name_different_ids_never_match() {
        let a = PersonKey::from_values("A1", "Петренко");
        let b = PersonKey::from_values("B2", "Петренко");
        assert_ne!(a, b);

        let oos = Relation::from_strs("oos", &["ПІБ", "ІНН"], &[&["Петренко", "A1"]]);
        let person = Identity {
            key: b,
            full_name: "Петренко".to_string(),
        };
        assert!(locate(&oos, Some(1), Some(0), &person).is_none());
    }

    #[test]
    fn test_locate_falls_back_to_name_for_rows_without_id() {
        let oos = Relation::from_strs(
            "oos",
            &["ПІБ", "ІНН"],
            &[&["Коваль", "C3"], &["Петренко", "0"]],
        );
        let person = Identity {
            key: PersonKey::from_values("A1", "Петренко"),
            full_name: "Петренко".to_string(),
        };
        assert_eq!(locate(&oos, Some(1), Some(0), &person).map(RowPos::number), Some(2));

        let by_id = Identity {
            key: PersonKey::from_values("C3", "Інше ім'я"),
            full_name: "Інше ім'я".to_string(),
        };
        assert_eq!(locate(&oos, Some(1), Some(0), &by_id).map(RowPos::number), Some(1));
    }

    #[test]
    fn test_index_first_occurrence_wins() {
        let relation = Relation::from_strs(
            "excluded",
            &["ПІБ", "ІНН"],
            &[&["Петренко", "A1"], &["Петренко-дубль", "A1"], &["", ""], &["Коваль", ""]],
        );
        let index = KeyIndex::build(&relation, Some(1), Some(0));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&PersonKey::Primary("A1".to_string())).map(RowPos::index), Some(0));
        assert!(index.contains(&PersonKey::NameOnly("Коваль".to_string())));
        assert!(!index.contains(&PersonKey::NameOnly(String::new())));
    }
}
