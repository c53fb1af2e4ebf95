use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::{ACCOUNTS_HEADER, REQUESTS_HEADER, csv_file};

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let accounts = csv_file(
        ACCOUNTS_HEADER,
        &[
            "1000000001, alice, KBANK, active, 5000.00",
            "2000000002, bob, SCB, active, 0",
            "3000000003, carol, KBANK, inactive, 10",
        ],
    )?;
    let requests = csv_file(
        REQUESTS_HEADER,
        &[
            "transfer, transfer, 1000000001, 2000000002, 1000.00",
            "withdraw, withdraw, 2000000002, , 200.00",
            "deposit, deposit, 2000000002, , 5.00",
            "transfer, transfer, 1000000001, 3000000003, 1.00",
        ],
    )?;

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path())
        .arg("--min-deposit")
        .arg("20");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("account_no,institution,status,balance"))
        .stdout(predicate::str::contains("1000000001,KBANK,active,3990.00"))
        .stdout(predicate::str::contains("2000000002,SCB,active,800.00"))
        .stdout(predicate::str::contains("3000000003,KBANK,inactive,10.00"))
        .stderr(predicate::str::contains("Request rejected"));

    Ok(())
}

#[test]
fn test_cli_runs_scheduled_transfers() -> Result<(), Box<dyn std::error::Error>> {
    let accounts = csv_file(
        ACCOUNTS_HEADER,
        &[
            "1000000001, alice, KBANK, active, 500.00",
            "2000000002, bob, KBANK, active, 0",
        ],
    )?;
    let requests = csv_file(
        REQUESTS_HEADER,
        &["schedule, transfer, 1000000001, 2000000002, 125.50, 2020-01-01T00:00:00Z"],
    )?;

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path())
        .arg("--poll-interval-ms")
        .arg("20")
        .arg("--linger-ms")
        .arg("1500");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1000000001,KBANK,active,374.50"))
        .stdout(predicate::str::contains("2000000002,KBANK,active,125.50"))
        .stderr(predicate::str::contains("Baht has been transferred"));

    Ok(())
}

#[test]
fn test_cli_per_account_limits_from_seed() -> Result<(), Box<dyn std::error::Error>> {
    let accounts = csv_file(
        ACCOUNTS_HEADER,
        &[
            "1000000001, alice, KBANK, active, 5000.00, 1000, 600",
            "2000000002, bob, KBANK, active, 0",
        ],
    )?;
    let requests = csv_file(
        REQUESTS_HEADER,
        &[
            "transfer, transfer, 1000000001, 2000000002, 600.01",
            "transfer, transfer, 1000000001, 2000000002, 600.00",
            "transfer, transfer, 1000000001, 2000000002, 400.01",
            "transfer, transfer, 1000000001, 2000000002, 400.00",
        ],
    )?;

    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.arg("--accounts")
        .arg(accounts.path())
        .arg("--requests")
        .arg(requests.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1000000001,KBANK,active,4000.00"))
        .stdout(predicate::str::contains("2000000002,KBANK,active,1000.00"))
        .stderr(predicate::str::contains("Per-transaction limit"))
        .stderr(predicate::str::contains("Daily transfer limit"));

    Ok(())
}

#[test]
fn test_cli_requires_accounts() {
    let mut cmd = Command::new(cargo_bin!("atm-core"));
    cmd.env_remove("ATM_ACCOUNTS");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--accounts"));
}
