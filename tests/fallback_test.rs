use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::{ACCOUNTS_HEADER, REQUESTS_HEADER, csv_file};

fn inputs() -> (tempfile::NamedTempFile, tempfile::NamedTempFile) {
    let accounts = csv_file(ACCOUNTS_HEADER, &["1, alice, KBANK, active, 0"]).unwrap();
    let requests = csv_file(REQUESTS_HEADER, &["deposit, deposit, 1, , 100.0"]).unwrap();
    (accounts, requests)
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let (accounts, requests) = inputs();

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path())
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage.",
        ))
        .stdout(predicate::str::contains("1,KBANK,active,100.00"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let (accounts, requests) = inputs();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path())
        .arg("--db-path")
        .arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not());
}
