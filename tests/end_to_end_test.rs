use roster_sync::config::SyncConfig;
use roster_sync::engine::SyncEngine;
use roster_sync::relation::{Dataset, OpenMode, RowPos};
use std::fs;
use std::path::Path;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(format!("{}.csv", name)), content).expect("write relation");
}

/// Master and Source datasets for a run with an exclusion, a transfer and
/// a newcomer.
fn create_datasets(master: &Path, source: &Path) {
    write(
        master,
        "oos",
        "ПІБ,ІНН,Індекс посади,Посада,Підрозділ,Військове звання\n\
         Петренко,A1,101,Курсант,D1,солдат\n\
         Бойко,B2,102,Курсант,D1,солдат\n",
    );
    write(master, "excluded", "ПІБ,ІНН,Дата виключення\n");
    write(master, "prikom", "ПІБ,Дата прибуття,Дата вибуття,Індекс\n");
    write(master, "absence", "ПІБ,Вид відсутності,Дата вибуття,Дата фактичного повернення,Індекс посади\n");
    write(master, "timesheet", "Індекс посади,ПІБ,01,02\n101,Петренко,8,8\n102,Бойко,8,\n");
    write(
        master,
        "staffing",
        "Індекс посади,Посада,Підрозділ\n101,Курсант,D1\n102,Курсант,D1\n103,Командир відділення,D2\n",
    );
    write(master, "divisions", "Код,Назва\nD1,1-й курс\nD2,2-й курс\n");

    write(source, "excluded", "ПІБ,ІНН,Дата виключення\nПетренко,A1,2024-05-01\n");
    write(
        source,
        "oos",
        "ПІБ,ІНН,Індекс посади,Посада,Підрозділ,Військове звання\n\
         Бойко,B2,103,,,сержант\n\
         Коваль,C3,,,,солдат\n",
    );
}

fn value(dataset: &Dataset, relation: &str, row: usize, column: &str) -> String {
    dataset
        .relation(relation)
        .expect("relation")
        .value(RowPos::from_index(row), column)
        .to_string()
}

#[test]
fn test_full_run_persists_master_and_audit_log() {
    let master_dir = tempfile::tempdir().expect("tempdir");
    let source_dir = tempfile::tempdir().expect("tempdir");
    create_datasets(master_dir.path(), source_dir.path());

    let mut engine = SyncEngine::tabular(SyncConfig::default());
    let report = engine
        .run(master_dir.path(), source_dir.path(), false)
        .expect("first run");

    assert!(!report.dry_run);
    assert_eq!(report.events.get("MOVE"), Some(&2));
    assert_eq!(report.events.get("DEL"), Some(&1));
    assert_eq!(report.events.get("ADD"), Some(&1));
    assert_eq!(report.events.get("UPD-INFO"), Some(&1));

    let master = Dataset::open(master_dir.path(), OpenMode::ReadOnly).expect("reopen master");

    // Петренко left, Бойко moved to 103, Коваль took the post Петренко freed
    let oos = master.relation("oos").expect("oos");
    assert_eq!(oos.len(), 2);
    assert_eq!(value(&master, "oos", 0, "ІНН"), "B2");
    assert_eq!(value(&master, "oos", 0, "Індекс посади"), "103");
    assert_eq!(value(&master, "oos", 0, "Посада"), "Командир відділення");
    assert_eq!(value(&master, "oos", 0, "Підрозділ"), "D2");
    assert_eq!(value(&master, "oos", 0, "Військове звання"), "сержант");
    assert_eq!(value(&master, "oos", 1, "ІНН"), "C3");
    assert_eq!(value(&master, "oos", 1, "Індекс посади"), "101");
    assert_eq!(value(&master, "excluded", 0, "ІНН"), "A1");

    assert_eq!(value(&master, "timesheet_archive", 0, "ПІБ"), "Петренко");
    assert!(!value(&master, "timesheet_archive", 0, "Дата архівації").is_empty());
    assert!(master.find_row("timesheet", "Індекс посади", "103").is_some());
    assert!(master.find_row("timesheet", "Індекс посади", "101").is_some());
    assert_eq!(
        value(&master, "timesheet", 0, "ПІБ"),
        "Бойко",
        "moved person keeps their timesheet row"
    );

    let audit = master.relation("MAPTransfer").expect("audit relation");
    assert_eq!(audit.header(), &["Time", "EventKind", "Key", "Message"]);
    assert_eq!(audit.rows()[0].get(1), "START");
    assert!(audit
        .rows()
        .iter()
        .any(|r| r.get(1) == "DEL" && r.get(2) == "A1"));

    // Source is never written
    assert!(!source_dir.path().join("MAPTransfer.csv").exists());
}

#[test]
fn test_rerun_makes_no_mutations_and_replaces_audit_log() {
    let master_dir = tempfile::tempdir().expect("tempdir");
    let source_dir = tempfile::tempdir().expect("tempdir");
    create_datasets(master_dir.path(), source_dir.path());

    SyncEngine::tabular(SyncConfig::default())
        .run(master_dir.path(), source_dir.path(), false)
        .expect("first run");
    let oos_after_first = fs::read_to_string(master_dir.path().join("oos.csv")).expect("read oos");

    let report = SyncEngine::tabular(SyncConfig::default())
        .run(master_dir.path(), source_dir.path(), false)
        .expect("second run");

    assert_eq!(report.mutations, 0);
    assert_eq!(
        fs::read_to_string(master_dir.path().join("oos.csv")).expect("read oos"),
        oos_after_first
    );

    let master = Dataset::open(master_dir.path(), OpenMode::ReadOnly).expect("reopen master");
    let kinds: Vec<_> = master
        .rows("MAPTransfer")
        .iter()
        .map(|r| r.get(1).to_string())
        .collect();
    assert_eq!(kinds, vec!["START", "STEP", "STEP", "STEP", "STEP"]);
}

#[test]
fn test_dry_run_leaves_master_untouched() {
    let master_dir = tempfile::tempdir().expect("tempdir");
    let source_dir = tempfile::tempdir().expect("tempdir");
    create_datasets(master_dir.path(), source_dir.path());
    let before = fs::read_to_string(master_dir.path().join("oos.csv")).expect("read oos");

    let report = SyncEngine::tabular(SyncConfig::default())
        .run(master_dir.path(), source_dir.path(), true)
        .expect("dry run");

    assert!(report.dry_run);
    assert!(report.mutations > 0);
    assert_eq!(fs::read_to_string(master_dir.path().join("oos.csv")).expect("read oos"), before);
    assert!(!master_dir.path().join("MAPTransfer.csv").exists());
}

#[test]
fn test_unreadable_source_aborts_before_any_write() {
    let master_dir = tempfile::tempdir().expect("tempdir");
    let source_dir = tempfile::tempdir().expect("tempdir");
    create_datasets(master_dir.path(), source_dir.path());
    let before = fs::read_to_string(master_dir.path().join("oos.csv")).expect("read oos");

    let missing = source_dir.path().join("nope");
    let result = SyncEngine::tabular(SyncConfig::default()).run(master_dir.path(), &missing, false);

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(master_dir.path().join("oos.csv")).expect("read oos"), before);
    assert!(!master_dir.path().join("MAPTransfer.csv").exists());
}
