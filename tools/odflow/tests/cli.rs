use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const DIAMOND: &str = r#"{
    "network": {
        "nr_nodes": 4,
        "edge_from": [0, 0, 1, 1, 2],
        "edge_to":   [1, 2, 2, 3, 3],
        "impedance": [1, 4, 1, 5, 1]
    },
    "origins": { "nodes": [0, 3] },
    "destinations": { "nodes": [3] },
    "options": { "produce": { "impedance": true, "link_set": true } }
}"#;

fn odflow(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_odflow"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to spawn odflow")
}

fn write_problem(dir: &Path, text: &str) -> String {
    let path = dir.join("problem.json");
    fs::write(&path, text).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_run_json() {
    let dir = tempfile::tempdir().unwrap();
    let problem = write_problem(dir.path(), DIAMOND);
    let out = dir.path().join("result.json");

    let output = odflow(&["run", &problem, "--threads", "2", "-o", out.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(result["layout"], "dense");
    assert_eq!(result["result_count"], 2);
    assert_eq!(result["row_offsets"], serde_json::json!([0, 1, 2]));
    assert_eq!(result["impedance"], serde_json::json!([3.0, 0.0]));
    assert_eq!(result["link_set"], serde_json::json!([[0, 2, 4], []]));
    assert!(result.get("org_demand").is_none());
}

#[test]
fn test_run_csv_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let problem = write_problem(dir.path(), DIAMOND);

    let output = odflow(&["run", &problem, "--format", "csv"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["org_zone,impedance,link_set", "0,3,0 2 4", "1,0,"]);
}

#[test]
fn test_run_csv_unreached_cells_empty() {
    let dir = tempfile::tempdir().unwrap();
    let problem = write_problem(
        dir.path(),
        r#"{
            "network": { "nr_nodes": 2, "edge_from": [0], "edge_to": [1], "impedance": [2.5] },
            "options": { "produce": { "impedance": true, "dst_zone": true } }
        }"#,
    );

    let output = odflow(&["run", &problem, "--format", "csv"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec!["org_zone,dst_zone,impedance", "0,0,0", "0,1,2.5", "1,0,", "1,1,0"]
    );
}

#[test]
fn test_check_reports_summary() {
    let dir = tempfile::tempdir().unwrap();
    let problem = write_problem(dir.path(), DIAMOND);

    let output = odflow(&["check", &problem]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("origin zones:      2"), "{stdout}");
    assert!(stdout.contains("problem is valid"));
}

#[test]
fn test_invalid_problem_fails() {
    let dir = tempfile::tempdir().unwrap();
    let problem = write_problem(
        dir.path(),
        r#"{ "network": { "nr_nodes": 2, "edge_from": [0], "edge_to": [5], "impedance": [1] } }"#,
    );

    let output = odflow(&["check", &problem]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("network.edge_to"), "{stderr}");
}

#[test]
fn test_config_file_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let problem = write_problem(dir.path(), DIAMOND);
    let config = dir.path().join("odflow.toml");
    fs::write(&config, "progress_interval_secs = 0\n").unwrap();

    let output = odflow(&["run", &problem, "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("progress_interval_secs"));
}
