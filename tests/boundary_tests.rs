use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::{ACCOUNTS_HEADER, REQUESTS_HEADER, csv_file};

#[test]
fn test_exact_balance_can_be_withdrawn() {
    let accounts = csv_file(ACCOUNTS_HEADER, &["1, alice, KBANK, active, 100.00"]).unwrap();
    let requests = csv_file(
        REQUESTS_HEADER,
        &[
            "withdraw, withdraw, 1, , 100.01",
            "withdraw, withdraw, 1, , 100.00",
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Insufficient balance"))
        .stdout(predicate::str::contains("1,KBANK,active,0.00"));
}

#[test]
fn test_fee_counts_against_balance() {
    let accounts = csv_file(
        ACCOUNTS_HEADER,
        &["1, alice, KBANK, active, 1010.00", "2, bob, SCB, active, 0"],
    )
    .unwrap();
    let requests = csv_file(
        REQUESTS_HEADER,
        &[
            "transfer, transfer, 1, 2, 1000.01",
            "transfer, transfer, 1, 2, 1000.00",
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,KBANK,active,0.00"))
        .stdout(predicate::str::contains("2,SCB,active,1000.00"));
}

#[test]
fn test_default_daily_limit_flag() {
    let accounts = csv_file(
        ACCOUNTS_HEADER,
        &["1, alice, KBANK, active, 5000", "2, bob, KBANK, active, 0"],
    )
    .unwrap();
    let requests = csv_file(
        REQUESTS_HEADER,
        &[
            "transfer, transfer, 1, 2, 250.00",
            "transfer, transfer, 1, 2, 250.00",
            "transfer, transfer, 1, 2, 0.01",
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path())
        .env("ATM_DEFAULT_DAILY_LIMIT", "500");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Daily transfer limit of 500 exceeded"))
        .stdout(predicate::str::contains("2,KBANK,active,500.00"));
}
