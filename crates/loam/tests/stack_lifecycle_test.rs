//! plan -> up -> plan -> destroy lifecycle through the CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const STACK: &str = r#"
stack "lifecycle"

resource "resource-group" "rg" {
    location "westeurope"
}

resource "virtual-network" "vnet" {
    resource-group "${rg.name}"
    address-space "10.0.0.0/16"
}

resource "subnet" "mgmt" {
    resource-group "${rg.name}"
    virtual-network "${vnet.name}"
    address-prefix "10.0.1.0/24"
}
"#;

fn write_stack(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("stack.kdl");
    std::fs::write(&path, STACK).unwrap();
    path
}

fn loam() -> Command {
    Command::cargo_bin("loam").unwrap()
}

#[test]
fn test_plan_up_replan_destroy() {
    let temp_dir = tempfile::tempdir().unwrap();
    let stack = write_stack(temp_dir.path());

    // Fresh plan: everything is a create, in three waves
    loam()
        .arg("plan")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("wave 1:"))
        .stdout(predicate::str::contains("wave 3:"))
        .stdout(predicate::str::contains("3 to create, 0 to update, 0 to delete, 0 unchanged"));

    // Apply writes state next to the stack file
    loam()
        .arg("up")
        .arg("--yes")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 applied, 0 failed, 0 skipped"))
        .stdout(predicate::str::contains("Apply complete."));
    assert!(temp_dir.path().join(".loam/state.json").exists());

    // Identical resubmission is all no-op
    loam()
        .arg("plan")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 to create, 0 to update, 0 to delete, 3 unchanged"))
        .stdout(predicate::str::contains("Nothing to do."));

    // State lists the records
    loam()
        .arg("state")
        .arg("list")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 recorded resources"))
        .stdout(predicate::str::contains("vnet"));

    // Outputs are recorded and shown
    loam()
        .arg("state")
        .arg("show")
        .arg("rg")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("resource-group"))
        .stdout(predicate::str::contains("outputs:"));

    // Destroy removes everything
    loam()
        .arg("destroy")
        .arg("--yes")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("Destroy complete."));

    loam()
        .arg("state")
        .arg("list")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("No recorded resources."));
}

#[test]
fn test_up_detects_update_after_edit() {
    let temp_dir = tempfile::tempdir().unwrap();
    let stack = write_stack(temp_dir.path());

    loam()
        .arg("up")
        .arg("--yes")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success();

    std::fs::write(
        &stack,
        STACK.replace("10.0.1.0/24", "10.0.2.0/24"),
    )
    .unwrap();

    loam()
        .arg("plan")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 to create, 1 to update, 0 to delete, 2 unchanged"));
}

#[test]
fn test_graph_prints_waves() {
    let temp_dir = tempfile::tempdir().unwrap();
    let stack = write_stack(temp_dir.path());

    loam()
        .arg("graph")
        .arg("-f")
        .arg(&stack)
        .assert()
        .success()
        .stdout(predicate::str::contains("wave 1:"))
        .stdout(predicate::str::contains("rg"))
        .stdout(predicate::str::contains("mgmt"));
}
