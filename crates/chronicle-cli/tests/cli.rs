use assert_cmd::Command;
use predicates::str::contains;

fn chronicle(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("chronicle").unwrap();
    cmd.arg("--data-dir").arg(data_dir).env("HOME", data_dir);
    cmd
}

#[test]
fn update_reports_current_on_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    chronicle(dir.path())
        .arg("update")
        .assert()
        .success()
        .stdout(contains("database is current"));
}

#[test]
fn prune_dry_run_reports_nothing_to_delete() {
    let dir = tempfile::tempdir().unwrap();
    chronicle(dir.path())
        .arg("prune")
        .assert()
        .success()
        .stdout(contains("no sessions match"));
}

#[test]
fn serve_once_runs_an_initial_sync_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    chronicle(dir.path())
        .arg("serve")
        .arg("--once")
        .assert()
        .success();

    assert!(dir.path().join("chronicle.db").exists());
}

#[test]
fn prune_before_rejects_non_rfc3339_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    chronicle(dir.path())
        .arg("prune")
        .arg("--before")
        .arg("not-a-date")
        .assert()
        .failure();
}
