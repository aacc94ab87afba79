//! Dataset - a directory of CSV relations opened once per run

use crate::error::{Result, SyncError};
use crate::relation::table::{Record, Relation, RowPos};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RELATION_EXTENSION: &str = "csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Master: mutated by the stages and saved at the end of a run
    ReadWrite,
    /// Source snapshot: never written back
    ReadOnly,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
    mode: OpenMode,
    relations: BTreeMap<String, Relation>,
}

impl Dataset {
    /// Creates an empty in-memory dataset rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, mode: OpenMode) -> Self {
        Self {
            root: root.into(),
            mode,
            relations: BTreeMap::new(),
        }
    }

    /// Loads every `*.csv` file under `root` as a relation named after the
    /// file stem.
    pub fn open(root: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SyncError::Dataset(format!(
                "{} is not a dataset directory",
                root.display()
            )));
        }

        let mut dataset = Self::new(root, mode);
        let entries = fs::read_dir(root)
            .map_err(|e| SyncError::Dataset(format!("Failed to list {}: {}", root.display(), e)))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RELATION_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let relation = read_relation(&path, name)?;
            debug!(relation = %name, rows = relation.len(), "Loaded relation");
            dataset.insert(relation);
        }

        info!(
            "Opened dataset {} ({} relations, {:?})",
            root.display(),
            dataset.relations.len(),
            mode
        );
        Ok(dataset)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Relation> {
        self.relations.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Adds or replaces a relation, returning the one it replaced.
    pub fn insert(&mut self, relation: Relation) -> Option<Relation> {
        self.relations.insert(relation.name().to_string(), relation)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Data rows of a relation; empty when the relation does not exist.
    pub fn rows(&self, relation: &str) -> &[Record] {
        self.relation(relation).map(Relation::rows).unwrap_or(&[])
    }

    /// First data row of `relation` whose `column` equals `value`.
    pub fn find_row(&self, relation: &str, column: &str, value: &str) -> Option<RowPos> {
        self.relation(relation)?.find_row(column, value)
    }

    /// Writes every relation back to `<root>/<name>.csv`. All relations are
    /// written to temporary files first; originals are replaced only once
    /// every write succeeded.
    pub fn save(&self) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(SyncError::Dataset(format!(
                "{} was opened read-only",
                self.root.display()
            )));
        }

        fs::create_dir_all(&self.root)?;
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(self.relations.len());
        for relation in self.relations.values() {
            let path = self
                .root
                .join(format!("{}.{}", relation.name(), RELATION_EXTENSION));
            let tmp_path = path.with_extension("csv.tmp");
            if let Err(e) = write_relation(&tmp_path, relation) {
                discard(staged.iter().map(|(tmp, _)| tmp).chain([&tmp_path]));
                return Err(e);
            }
            staged.push((tmp_path, path));
        }

        for (tmp_path, path) in &staged {
            fs::rename(tmp_path, path)?;
        }

        info!("Saved dataset {}", self.root.display());
        Ok(())
    }
}

fn read_relation(path: &Path, name: &str) -> Result<Relation> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| SyncError::Dataset(format!("Failed to open {}: {}", path.display(), e)))?;

    let header = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();

    let mut relation = Relation::new(name, header);
    for result in rdr.records() {
        let record = result?;
        relation.push(Record::new(record.iter().map(str::to_string).collect()));
    }

    Ok(relation)
}

fn write_relation(path: &Path, relation: &Relation) -> Result<()> {
    let mut wtr = WriterBuilder::new().flexible(true).from_path(path)?;
    wtr.write_record(relation.header())?;
    for record in relation.rows() {
        wtr.write_record(record.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Removes temporary files left by a failed save.
fn discard<'p>(paths: impl IntoIterator<Item = &'p PathBuf>) {
    for path in paths {
        if path.is_file() {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_relation_degrades_to_not_found() {
        let dataset = Dataset::new("unused", OpenMode::ReadOnly);
        assert!(dataset.rows("oos").is_empty());
        assert!(dataset.find_row("oos", "ІНН", "A1").is_none());
    }

    #[test]
    fn test_read_only_dataset_refuses_save() {
        let dataset = Dataset::new("unused", OpenMode::ReadOnly);
        assert!(matches!(dataset.save(), Err(SyncError::Dataset(_))));
    }

    #[test]
    fn test_open_trims_cells_and_tolerates_short_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("oos.csv"),
            "\u{feff}ПІБ,ІНН,Індекс посади\n  Петренко ,A1,101\nКоваль\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let dataset = Dataset::open(dir.path(), OpenMode::ReadOnly).unwrap();
        assert_eq!(dataset.relation_names().collect::<Vec<_>>(), vec!["oos"]);

        let oos = dataset.relation("oos").unwrap();
        assert_eq!(oos.column("ПІБ"), Some(0));
        assert_eq!(oos.rows()[0].get(0), "Петренко");
        assert_eq!(oos.rows()[1].get(2), "");
    }

    #[test]
    fn test_save_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut dataset = Dataset::new(dir.path(), OpenMode::ReadWrite);
        dataset.insert(Relation::from_strs(
            "excluded",
            &["ПІБ", "ІНН"],
            &[&["Петренко, Іван", "A1"], &["Коваль"]],
        ));
        dataset.save().unwrap();

        let reopened = Dataset::open(dir.path(), OpenMode::ReadWrite).unwrap();
        let excluded = reopened.relation("excluded").unwrap();
        assert_eq!(excluded.len(), 2);
        assert_eq!(excluded.rows()[0].get(0), "Петренко, Іван");
        assert!(!dir.path().join("excluded.csv.tmp").exists());
    }

    #[test]
    fn test_failed_save_replaces_no_relation() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.csv"), "ПІБ\nПетренко\n").unwrap();
        // Blocks the temporary file of the second relation
        fs::create_dir(dir.path().join("b.csv.tmp")).unwrap();

        let mut dataset = Dataset::new(dir.path(), OpenMode::ReadWrite);
        dataset.insert(Relation::from_strs("a", &["ПІБ"], &[&["Коваль"]]));
        dataset.insert(Relation::from_strs("b", &["ПІБ"], &[&["Бойко"]]));

        assert!(dataset.save().is_err());
        assert_eq!(fs::read_to_string(dir.path().join("a.csv")).unwrap(), "ПІБ\nПетренко\n");
        assert!(!dir.path().join("a.csv.tmp").exists());
        assert!(!dir.path().join("b.csv").exists());
    }

    #[test]
    fn test_open_rejects_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(Dataset::open(&missing, OpenMode::ReadOnly).is_err());
    }
}
