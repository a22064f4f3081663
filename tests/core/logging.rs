use bytevault::{Value, VaultError, VaultOptions};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::Mutex;
use tempfile::tempdir;

static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

struct CapturingSink;

impl Log for CapturingSink {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS
            .lock()
            .expect("records lock")
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static SINK: CapturingSink = CapturingSink;

fn drain() -> Vec<(Level, String)> {
    std::mem::take(&mut *RECORDS.lock().expect("records lock"))
}

fn assert_logged(records: &[(Level, String)], level: Level, needle: &str) {
    assert!(
        records
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle)),
        "expected a {level} record containing '{needle}', got {records:?}"
    );
}

// One test function: the sink is installed process-wide, and a single
// sequential body keeps the captured records attributable.
#[test]
fn every_operation_reports_through_the_log_facade() {
    log::set_logger(&SINK).expect("install sink");
    log::set_max_level(LevelFilter::Debug);

    let tmp = tempdir().expect("tempdir");
    let vault = VaultOptions::new()
        .root(tmp.path())
        .open("audited")
        .expect("open");
    let records = drain();
    assert_logged(&records, Level::Info, "opened vault 'audited'");

    vault.put("k", 1i64).expect("put");
    let records = drain();
    assert_logged(&records, Level::Debug, "putting key");
    assert_logged(&records, Level::Info, "stored in vault 'audited'");

    assert_eq!(vault.get("k").expect("present"), Value::Int(1));
    assert_logged(&drain(), Level::Debug, "retrieving key");
    assert_eq!(vault.get("missing"), None);
    assert_logged(&drain(), Level::Warn, "not found in vault 'audited'");

    assert!(vault.contains("k").expect("contains"));
    let records = drain();
    assert_logged(&records, Level::Debug, "checking for key");
    assert_logged(&records, Level::Info, "found in vault 'audited'");
    assert!(!vault.contains("missing").expect("contains"));
    assert_logged(&drain(), Level::Warn, "not found in vault 'audited'");

    assert_eq!(vault.len().expect("len"), 1);
    let records = drain();
    assert_logged(&records, Level::Debug, "counting entries");
    assert_logged(&records, Level::Info, "holds 1 entries");

    assert_eq!(vault.get_many(["k"]).expect("get_many").len(), 1);
    let records = drain();
    assert_logged(&records, Level::Debug, "retrieving 1 keys");
    assert_logged(&records, Level::Info, "found 1 of 1 keys");

    assert!(vault.has_keys(["k"]).expect("has_keys"));
    let records = drain();
    assert_logged(&records, Level::Debug, "checking 1 keys");
    assert_logged(&records, Level::Info, "holds 1 of 1 requested keys");

    assert_eq!(vault.keys().expect("keys").len(), 1);
    assert_logged(&drain(), Level::Info, "listed 1 keys");
    assert_eq!(vault.values().expect("values").len(), 1);
    assert_logged(&drain(), Level::Info, "listed 1 values");
    assert_eq!(vault.entries().expect("entries").len(), 1);
    assert_logged(&drain(), Level::Info, "listed 1 entries");

    vault.flush().expect("flush");
    let records = drain();
    assert_logged(&records, Level::Debug, "flushing vault");
    assert_logged(&records, Level::Info, "vault 'audited' flushed");

    let (key, _) = vault.pop_entry().expect("pop_entry");
    assert_eq!(key, Value::from("k"));
    let records = drain();
    assert_logged(&records, Level::Debug, "popping one entry");
    assert_logged(&records, Level::Info, "removed from vault 'audited'");

    match vault.pop_entry() {
        Err(VaultError::Empty(_)) => {}
        other => panic!("expected Empty, got {other:?}"),
    }
    assert_logged(&drain(), Level::Warn, "is empty");

    vault.clear().expect("clear");
    let records = drain();
    assert_logged(&records, Level::Debug, "clearing vault");
    assert_logged(&records, Level::Info, "cleared 0 entries");
}
