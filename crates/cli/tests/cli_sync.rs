use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn serial_sync() -> Command {
    let mut cmd = Command::cargo_bin("serial-sync").expect("binary");
    cmd.env_remove("SERIAL_SYNC_CONCURRENCY")
        .env_remove("SERIAL_SYNC_BATCH_SIZE");
    cmd
}

fn write_snapshot(path: &Path, line_items: Value) {
    let snapshot = json!({
        "orders": [
            {
                "order_id": "order-1",
                "order_number": "1001",
                "note": "Engrave initials",
                "line_items": line_items
            },
            {"order_id": "order-2", "order_number": "1002", "unavailable": "rate limited"}
        ]
    });
    fs::write(path, serde_json::to_vec_pretty(&snapshot).unwrap()).unwrap();
}

#[test]
fn sync_then_show_and_notes() {
    let temp = tempdir().unwrap();
    let snapshot = temp.path().join("snapshot.json");
    let store = temp.path().join("store");
    write_snapshot(
        &snapshot,
        json!([
            {"external_id": "li-1", "title": "Flute", "fulfillable_quantity": 1},
            {"external_id": "li-2", "title": "Case", "fulfillable_quantity": 1}
        ]),
    );

    let output = serial_sync()
        .arg("sync")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--store")
        .arg(&store)
        .arg("--json")
        .output()
        .expect("sync run");
    assert!(output.status.success());
    let run: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(run["synced"], 1);
    assert_eq!(run["skipped"], 1);
    assert_eq!(run["orders"][0]["created"], json!([1, 2]));

    let output = serial_sync()
        .args(["show", "--order", "order-1", "--json", "--store"])
        .arg(&store)
        .output()
        .expect("show run");
    assert!(output.status.success());
    let view: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(view["mapping"]["version"], 1);
    assert_eq!(view["items"][1]["serial_number"], "1001-2");

    serial_sync()
        .args(["notes", "--order", "order-1", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("[external] Engrave initials"));
}

#[test]
fn removed_item_is_archived_on_the_next_run() {
    let temp = tempdir().unwrap();
    let snapshot = temp.path().join("snapshot.json");
    let store = temp.path().join("store");

    write_snapshot(
        &snapshot,
        json!([
            {"external_id": "li-1", "title": "Flute", "fulfillable_quantity": 1},
            {"external_id": "li-2", "title": "Case", "fulfillable_quantity": 1}
        ]),
    );
    serial_sync()
        .arg("sync")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--store")
        .arg(&store)
        .assert()
        .success();

    write_snapshot(
        &snapshot,
        json!([{"external_id": "li-1", "title": "Flute", "fulfillable_quantity": 1}]),
    );
    serial_sync()
        .arg("sync")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("^0 -1"));

    serial_sync()
        .args(["show", "--order", "order-1", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("archived: Removed from external order"));
}

#[test]
fn invalid_config_is_rejected() {
    let temp = tempdir().unwrap();
    let snapshot = temp.path().join("snapshot.json");
    let config = temp.path().join("sync.toml");
    write_snapshot(&snapshot, json!([]));
    fs::write(&config, "batch_size = 0\n").unwrap();

    serial_sync()
        .arg("sync")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--store")
        .arg(temp.path().join("store"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be > 0"));
}

#[test]
fn show_unknown_order_fails() {
    let temp = tempdir().unwrap();
    serial_sync()
        .args(["show", "--order", "nope", "--store"])
        .arg(temp.path())
        .assert()
        .failure();
}

#[test]
fn schema_prints_json() {
    let output = serial_sync()
        .args(["schema", "order-report"])
        .output()
        .expect("schema run");
    assert!(output.status.success());
    let schema: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert!(schema["properties"]["order_id"].is_object());
}
