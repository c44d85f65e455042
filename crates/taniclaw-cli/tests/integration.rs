#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;

fn project_command(dir: &TempDir) -> std::process::Command {
    let mut cmd = std::process::Command::new(assert_cmd::cargo::cargo_bin("taniclaw"));
    cmd.current_dir(dir.path())
        .env("TANICLAW_ROOT", dir.path())
        .env("TANICLAW_WEATHER_ENABLED", "false")
        .env("TANICLAW_LLM_ENABLED", "false")
        .env("TANICLAW_NOTIFICATION_ENABLED", "false")
        .env_remove("TANICLAW_MAX_DAILY_ACTIONS");
    cmd
}

fn taniclaw(dir: &TempDir) -> Command {
    Command::from_std(project_command(dir))
}

fn init_project(dir: &TempDir) {
    taniclaw(dir).arg("init").assert().success();
}

fn json_stdout(cmd: &mut Command) -> Value {
    let out = cmd.arg("--json").output().unwrap();
    assert!(
        out.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).unwrap()
}

/// Adds a chili seed planted today and returns its id.
fn add_chili(dir: &TempDir) -> String {
    let plant = json_stdout(taniclaw(dir).args([
        "plant", "add", "Chili #1", "--type", "chili", "--lat", "-6.2", "--lon", "106.8",
    ]));
    plant["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_directory_tree() {
    let dir = TempDir::new().unwrap();
    taniclaw(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .taniclaw/config.yaml"));

    let root = dir.path();
    assert!(root.join(".taniclaw/config.yaml").exists());
    assert!(root.join(".taniclaw/rules/default.yaml").exists());
    assert!(root.join(".taniclaw/knowledge/plants/chili.yaml").exists());
    assert!(root.join(".taniclaw/knowledge/plants/spinach.yaml").exists());
    assert!(root.join(".taniclaw/taniclaw.db").exists());
    let gitignore = std::fs::read_to_string(root.join(".gitignore")).unwrap();
    assert!(gitignore.contains(".taniclaw/taniclaw.db"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .taniclaw/config.yaml"));

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".taniclaw/taniclaw.db").count(), 1);
}

#[test]
fn commands_before_init_fail() {
    let dir = TempDir::new().unwrap();
    taniclaw(&dir)
        .args(["plant", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("taniclaw init"));
}

// ---------------------------------------------------------------------------
// plant
// ---------------------------------------------------------------------------

#[test]
fn plant_add_list_show() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    taniclaw(&dir)
        .args(["plant", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chili #1"))
        .stdout(predicate::str::contains("seed"));

    taniclaw(&dir)
        .args(["plant", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("type:      chili"))
        .stdout(predicate::str::contains("No actions recorded."));
}

#[test]
fn plant_add_estimates_stage_from_planting_date() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let plant = json_stdout(taniclaw(&dir).args([
        "plant", "add", "Old chili", "--type", "chili", "--lat", "0", "--lon", "0", "--planted",
        "2020-01-01",
    ]));
    assert_eq!(plant["current_state"], "harvest");
}

#[test]
fn plant_add_rejects_bad_state() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .args([
            "plant", "add", "x", "--type", "chili", "--lat", "0", "--lon", "0", "--state", "budding",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --state"));
}

#[test]
fn deactivated_plants_are_hidden() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    taniclaw(&dir).args(["plant", "deactivate", &id]).assert().success();
    taniclaw(&dir)
        .args(["plant", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No plants."));
    taniclaw(&dir)
        .args(["plant", "list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chili #1"));
}

#[test]
fn unknown_plant_id_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .args(["plant", "show", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plant not found"));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_waters_a_fresh_seed_bed_once() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    let cycles = json_stdout(taniclaw(&dir).arg("run"));
    let results = cycles[0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["action_type"], "water");
    assert_eq!(results[0]["status"], "ok");
    assert_eq!(results[0]["rule_id"], "mist_seed_bed");

    // watered today, so the second cycle has nothing to do
    let cycles = json_stdout(taniclaw(&dir).args(["run", "--plant", &id]));
    assert!(cycles[0]["results"].as_array().unwrap().is_empty());

    let history = json_stdout(taniclaw(&dir).args(["plant", "history", &id]));
    let events: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert!(events.contains(&"action"));
    assert!(events.contains(&"cycle"));
}

#[test]
fn run_with_zero_quota_records_the_block() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    let cycles = json_stdout(
        taniclaw(&dir)
            .env("TANICLAW_MAX_DAILY_ACTIONS", "0")
            .arg("run"),
    );
    assert!(cycles[0]["results"].as_array().unwrap().is_empty());

    let history = json_stdout(taniclaw(&dir).args(["plant", "history", &id]));
    let blocked = history
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["event_type"] == "action_blocked")
        .expect("blocked action should be in history");
    assert!(blocked["payload"]["reason"]
        .as_str()
        .unwrap()
        .contains("daily"));
}

#[test]
fn run_without_plants_is_a_noop() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active plants."));
}

// ---------------------------------------------------------------------------
// act
// ---------------------------------------------------------------------------

#[test]
fn manual_action_bypasses_ceiling() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    taniclaw(&dir)
        .args(["act", "--plant", &id, "--type", "water", "--amount-ml", "5000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded water"));

    let plant = json_stdout(taniclaw(&dir).args(["plant", "show", &id]));
    let action = &plant["recent_actions"][0];
    assert_eq!(action["source"], "manual");
    assert_eq!(action["amount_ml"], 5000);
}

#[test]
fn manual_action_of_unknown_type_is_logged() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    taniclaw(&dir)
        .args(["act", "--plant", &id, "--type", "prune", "--description", "Cut dead leaves"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded prune: Cut dead leaves"));

    let plant = json_stdout(taniclaw(&dir).args(["plant", "show", &id]));
    let action = &plant["recent_actions"][0];
    assert_eq!(action["action_type"], "prune");
    assert_eq!(action["status"], "executed");
}

#[test]
fn act_and_run_work_while_the_scheduler_is_live() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    let mut daemon = project_command(&dir)
        .arg("schedule")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    // let the first sweep start
    std::thread::sleep(Duration::from_millis(500));

    let act = taniclaw(&dir)
        .args(["act", "--plant", &id, "--type", "water", "--amount-ml", "100"])
        .output()
        .unwrap();
    let run = taniclaw(&dir).args(["run", "--plant", &id]).output().unwrap();
    let still_running = daemon.try_wait().unwrap().is_none();
    daemon.kill().unwrap();
    daemon.wait().unwrap();

    assert!(still_running, "scheduler exited early");
    assert!(
        act.status.success(),
        "act failed: {}",
        String::from_utf8_lossy(&act.stderr)
    );
    assert!(String::from_utf8_lossy(&act.stdout).contains("Recorded water"));
    assert!(
        run.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&run.stderr)
    );

    let plant = json_stdout(taniclaw(&dir).args(["plant", "show", &id]));
    let manual = plant["recent_actions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["source"] == "manual")
        .expect("manual watering should be recorded");
    assert_eq!(manual["amount_ml"], 100);
}

// ---------------------------------------------------------------------------
// today / rules / config
// ---------------------------------------------------------------------------

#[test]
fn today_lists_rule_and_stage_instructions() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_chili(&dir);

    taniclaw(&dir)
        .args(["today", "--plant", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mist the seed bed"))
        .stdout(predicate::str::contains("Sow seeds"))
        .stdout(predicate::str::contains("Watch for: Anthracnose"));
}

#[test]
fn rules_list_is_priority_ordered() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let rules = json_stdout(taniclaw(&dir).args(["rules", "list"]));
    let priorities: Vec<i64> = rules
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["priority"].as_i64().unwrap())
        .collect();
    assert!(!priorities.is_empty());
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn rules_eval_dry_run() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .args([
            "rules",
            "eval",
            "--context",
            r#"{"days_since_last_water": 9999, "today_rainfall_mm": 0, "temp_max": 30,
                "plant_state": "vegetative", "growing_method": "soil"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("water_when_dry"))
        .stdout(predicate::str::contains("300 ml"));
}

#[test]
fn rules_eval_rejects_non_object_context() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .args(["rules", "eval", "--context", "[1, 2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_zero_quota() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    taniclaw(&dir)
        .env("TANICLAW_MAX_DAILY_ACTIONS", "0")
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}
