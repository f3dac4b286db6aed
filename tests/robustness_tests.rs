mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_malformed_csv_handling() {
    let dir = tempdir().unwrap();
    let port = common::spawn_host_thread(&common::config(0, None));
    let config = common::write_config(dir.path(), port, None);
    let requests = common::write_requests(
        dir.path(),
        &[
            // Valid sale
            ["sale", "1.00", "USD", "4111111111111111", "2512", ""],
            // Invalid type
            ["purchase", "1.00", "USD", "4111111111111111", "2512", ""],
            // Too many decimal places
            ["sale", "1.001", "USD", "4111111111111111", "2512", ""],
            // Card number rejected before sending
            ["sale", "1.00", "USD", "4111-1111", "2512", ""],
            // Valid sale again
            ["sale", "2.00", "USD", "4111111111111111", "2512", ""],
        ],
    );

    let mut cmd = Command::new(cargo_bin!("card-gateway"));
    cmd.arg("--config").arg(&config).arg(&requests).arg("--close-batch");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading transaction"))
        .stderr(predicate::str::contains("Error processing transaction"))
        // rejected rows consume no STAN
        .stdout(predicate::str::contains("1,sale,000,true,1.00"))
        .stdout(predicate::str::contains("2,sale,000,true,2.00"))
        .stdout(predicate::str::contains("1,2,3.00,true"));
}

#[test]
fn test_missing_input_file() {
    let dir = tempdir().unwrap();
    let config = common::write_config(dir.path(), common::closed_port(), None);

    let mut cmd = Command::new(cargo_bin!("card-gateway"));
    cmd.arg("--config")
        .arg(&config)
        .arg(dir.path().join("does-not-exist.csv"));

    cmd.assert().failure();
}
