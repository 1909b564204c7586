use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn config_show_prints_default_worker_count() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("repairctl")
        .unwrap()
        .args(["--project-dir", dir.path().to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(contains("worker_count: 5"));
}

#[test]
fn jobs_reports_an_empty_pool_with_no_running_jobs() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("repairctl")
        .unwrap()
        .args(["--project-dir", dir.path().to_str().unwrap(), "jobs"])
        .assert()
        .success()
        .stdout(contains("pending: 0"));
}

#[test]
fn tools_lists_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("repairctl")
        .unwrap()
        .args(["--project-dir", dir.path().to_str().unwrap(), "tools"])
        .assert()
        .success()
        .stdout(contains("build_image"));
}

#[test]
fn run_executes_the_demo_build_then_deploy_graph_and_writes_a_report() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("repairctl")
        .unwrap()
        .args([
            "--project-dir",
            dir.path().to_str().unwrap(),
            "run",
            "--target-dir",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("finished"));

    let report = dir.path().join("forge-report").join("run_report.json");
    assert!(report.exists());
    let content = std::fs::read_to_string(report).unwrap();
    assert!(content.contains("\"success\""));
}
