//! Validates the files written to a results directory.

use std::fs;
use std::path::Path;

use allure_provider::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn read_json(dir: &Path, suffix: &str) -> Vec<Value> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.to_string_lossy().ends_with(suffix) {
            let content = fs::read_to_string(&path).unwrap();
            files.push(serde_json::from_str(&content).unwrap());
        }
    }
    files
}

fn run_in(dir: &Path, suite: &impl Suite) -> SuiteReport {
    let config = AllureConfig::builder()
        .results_dir(dir)
        .clean_results(true)
        .build()
        .unwrap();
    Runner::from_config(config).unwrap().run(suite)
}

struct Checkout;

impl Suite for Checkout {
    fn registry() -> Registry<Self> {
        Registry::new()
            .before_each(|_, t| t.log_step("seed cart", Status::Passed))
            .test("test_total", |_, t| {
                t.severity(Severity::Critical);
                t.parameter("currency", "EUR");
                t.parameter_excluded("run", 7);
                t.step("add items", |t| {
                    t.step_parameter("count", 2);
                    t.attach_json("cart", &serde_json::json!({ "items": 2 }));
                });
                t.require().equal(42, 40 + 2);
            })
            .test("test_refund", |_, t| {
                t.issue("https://tracker.example.com/CHK-12", Some("CHK-12".into()));
                t.fail_now("refund rejected");
            })
    }
}

#[test]
fn test_results_and_containers_on_disk() {
    let dir = TempDir::new().unwrap();
    let report = run_in(dir.path(), &Checkout);
    assert_eq!(report.tests.len(), 2);
    assert!(report.errors.is_empty());

    let results = read_json(dir.path(), "-result.json");
    assert_eq!(results.len(), 2);
    let total = results.iter().find(|r| r["name"] == "test_total").unwrap();
    assert_eq!(total["status"], "passed");
    assert_eq!(total["stage"], "finished");
    assert_eq!(total["fullName"], "Checkout::test_total");
    assert!(total["historyId"].is_string());
    assert!(total["labels"]
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l["name"] == "severity" && l["value"] == "critical"));
    assert_eq!(total["parameters"][1]["excluded"], true);

    let add_items = &total["steps"][0];
    assert_eq!(add_items["name"], "add items");
    assert_eq!(add_items["parameters"][0]["value"], "2");
    let attachment = &add_items["attachments"][0];
    assert_eq!(attachment["type"], "application/json");
    let source = attachment["source"].as_str().unwrap();
    assert!(dir.path().join(source).exists());
    assert_eq!(total["steps"][1]["name"], "Assert: equal");

    let refund = results.iter().find(|r| r["name"] == "test_refund").unwrap();
    assert_eq!(refund["status"], "failed");
    assert_eq!(refund["statusDetails"]["message"], "refund rejected");
    assert_eq!(refund["links"][0]["type"], "issue");

    // One container per test for the before_each fixture; the suite has no
    // suite-level hooks.
    let containers = read_json(dir.path(), "-container.json");
    assert_eq!(containers.len(), 2);
    for container in &containers {
        assert_eq!(container["befores"][0]["name"], "before_each");
        assert_eq!(container["befores"][0]["steps"][0]["name"], "seed cart");
        assert_eq!(container["children"].as_array().unwrap().len(), 1);
        assert!(container.get("afters").is_none());
    }
}

#[test]
fn test_history_id_ignores_excluded_parameters() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    run_in(first.path(), &Checkout);
    run_in(second.path(), &Checkout);

    let history = |dir: &Path| {
        read_json(dir, "-result.json")
            .into_iter()
            .find(|r| r["name"] == "test_total")
            .map(|r| r["historyId"].clone())
            .unwrap()
    };
    assert_eq!(history(first.path()), history(second.path()));
}

#[test]
fn test_clean_results_removes_previous_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("stale-result.json"), "{}").unwrap();

    run_in(dir.path(), &Checkout);

    assert!(!dir.path().join("stale-result.json").exists());
    assert_eq!(read_json(dir.path(), "-result.json").len(), 2);
}
