use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A command isolated from the user's config file and RUST_LOG
fn midigen(dir: &Path) -> Command {
    let config = dir.join("config.toml");
    if !config.exists() {
        fs::write(&config, "").unwrap();
    }
    let mut cmd = Command::cargo_bin("midigen").unwrap();
    cmd.env_remove("RUST_LOG")
        .env("MIDIGEN_CONFIG", &config)
        .current_dir(dir);
    cmd
}

fn read_value(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn sample_score() -> Value {
    json!({
        "ticks_per_beat": 480,
        "tracks": [
            [
                { "type": "set_tempo", "time": 0, "tempo": 500000 },
                { "type": "patch_change", "time": 0, "channel": 0, "patch": 0 },
                { "type": "note", "time": 0, "duration": 480, "channel": 0, "pitch": 60, "velocity": 80 },
                { "type": "note", "time": 480, "duration": 480, "channel": 0, "pitch": 64, "velocity": 80 }
            ],
            [
                { "type": "note", "time": 960, "duration": 240, "channel": 1, "pitch": 67, "velocity": 100 }
            ]
        ]
    })
}

#[test]
fn test_vocab_json() {
    let dir = TempDir::new().unwrap();
    let output = midigen(dir.path()).args(["vocab", "--json"]).output().unwrap();
    assert!(output.status.success());

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["vocab_size"], 3239);
    assert_eq!(summary["row_width"], 8);
    assert_eq!(summary["structural"]["end"], 2);
}

#[test]
fn test_vocab_describes_symbols() {
    let dir = TempDir::new().unwrap();
    midigen(dir.path())
        .args(["vocab", "--json", "--symbol", "1", "--symbol", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<begin>").and(predicate::str::contains("<end>")));
}

#[test]
fn test_tokenize_detokenize_round_trip() {
    let dir = TempDir::new().unwrap();
    let score_path = dir.path().join("score.json");
    fs::write(&score_path, serde_json::to_string(&sample_score()).unwrap()).unwrap();

    midigen(dir.path())
        .args(["tokenize", "score.json", "-o", "rows.json"])
        .assert()
        .success();

    let rows = read_value(&dir.path().join("rows.json"));
    let rows = rows.as_array().unwrap();
    // begin + five events + end
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0][0], 1);
    assert_eq!(rows[6][0], 2);

    midigen(dir.path())
        .args(["detokenize", "rows.json", "-o", "restored.json"])
        .assert()
        .success();

    let restored = read_value(&dir.path().join("restored.json"));
    assert_eq!(restored["ticks_per_beat"], 480);
    let count: usize = restored["tracks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|track| track.as_array().unwrap().len())
        .sum();
    assert_eq!(count, 5);
}

#[test]
fn test_tokenize_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    midigen(dir.path())
        .args(["tokenize", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_generate_from_instrument() {
    let dir = TempDir::new().unwrap();
    let output = midigen(dir.path())
        .args([
            "generate",
            "-i",
            "Acoustic Grand",
            "-n",
            "8",
            "--seed",
            "1",
            "--no-progress",
            "--json",
            "--output",
            "out.json",
            "--rows-output",
            "rows.json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["prompt_rows"], 2);
    assert!(summary["rows_generated"].as_u64().unwrap() <= 8);

    let score = read_value(&dir.path().join("out.json"));
    assert_eq!(score["ticks_per_beat"], 480);

    let rows = read_value(&dir.path().join("rows.json"));
    let rows = rows.as_array().unwrap();
    assert_eq!(rows[0][0], 1);
    assert!(rows.len() >= 2);
}

#[test]
fn test_generate_is_reproducible_with_seed() {
    let dir = TempDir::new().unwrap();
    for name in ["a.json", "b.json"] {
        midigen(dir.path())
            .args(["generate", "-i", "0", "-n", "16", "--seed", "7", "--no-progress", "-o", name])
            .assert()
            .success();
    }

    assert_eq!(
        fs::read_to_string(dir.path().join("a.json")).unwrap(),
        fs::read_to_string(dir.path().join("b.json")).unwrap()
    );
}

#[test]
fn test_generate_rejects_zero_temperature() {
    let dir = TempDir::new().unwrap();
    midigen(dir.path())
        .args(["generate", "-t", "0", "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TEMPERATURE_NOT_POSITIVE"));
}

#[test]
fn test_generate_rejects_unknown_instrument() {
    let dir = TempDir::new().unwrap();
    midigen(dir.path())
        .args(["generate", "-i", "Theremin Deluxe", "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Theremin Deluxe"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("midigen")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "nowhere.toml", "vocab"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_config_init_and_show() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("written.toml");

    midigen(dir.path())
        .args(["config", "--init", "--path"])
        .arg(&target)
        .assert()
        .success();
    let content = fs::read_to_string(&target).unwrap();
    assert!(content.contains("[generation]"));

    midigen(dir.path())
        .args(["config", "--init", "--path"])
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    midigen(dir.path())
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_rows\""));
}

#[test]
fn test_generate_with_settings_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("settings.toml"), "max_rows = 3\nseed = 11\n").unwrap();

    let output = midigen(dir.path())
        .args(["generate", "-i", "Violin", "--settings", "settings.toml", "--no-progress", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(summary["rows_generated"].as_u64().unwrap() <= 3);
    assert!(dir.path().join("output.json").exists());
}
