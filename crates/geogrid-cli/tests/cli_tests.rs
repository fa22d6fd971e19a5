use assert_cmd::Command;
use predicates::prelude::*;

fn geogrid() -> Command {
    Command::cargo_bin("geogrid").expect("binary builds")
}

#[test]
fn build_prints_a_summary() {
    geogrid()
        .args([
            "build",
            "--count",
            "20",
            "--seed",
            "7",
            "--connection",
            "complete",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("20 nodes"))
        .stdout(predicate::str::contains("190 edges"));
}

#[test]
fn build_json_emits_a_graph_document() {
    let output = geogrid()
        .args(["build", "--count", "5", "--seed", "1", "--json"])
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let graph: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON graph");
    assert_eq!(graph["nodes"].as_array().expect("nodes array").len(), 5);
    assert!(graph["edges"].is_array());
}

#[test]
fn build_rejects_unknown_connection_strategy() {
    geogrid()
        .args(["build", "--connection", "star"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("star"));
}

#[test]
fn eval_computes_expressions() {
    geogrid()
        .args(["eval", "1 + 2 * 3"])
        .assert()
        .success()
        .stdout("7\n");
}

#[test]
fn eval_uses_field_values() {
    geogrid()
        .args([
            "eval",
            "if(field:length > 100, field:length * 2, field:length)",
            "--field",
            "length=150",
        ])
        .assert()
        .success()
        .stdout("300\n");
}

#[test]
fn eval_resolves_metrics_from_coordinates() {
    geogrid()
        .args(["eval", "euclidean", "--from", "0,0", "--to", "3,4"])
        .assert()
        .success()
        .stdout("5\n");
}

#[test]
fn eval_reports_syntax_errors() {
    geogrid()
        .args(["eval", "1 +"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse expression"));
}

#[test]
fn eval_reports_evaluation_errors() {
    geogrid()
        .args(["eval", "1 / 0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to evaluate expression"));
}

#[test]
fn jobs_require_a_configured_endpoint() {
    geogrid()
        .env_remove("GEOGRID_HOST")
        .args(["jobs", "status", "job-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEOGRID_HOST"));
}
