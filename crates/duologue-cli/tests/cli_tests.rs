use assert_cmd::Command;
use predicates::prelude::*;

use duologue_testing::ExperimentWorld;

fn duologue() -> Command {
    Command::cargo_bin("duologue").expect("binary builds")
}

#[test]
fn help_lists_subcommands() {
    duologue()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("stop"))
        .stdout(predicate::str::contains("import"));
}

#[test]
fn status_with_empty_output_dir_reports_nothing() {
    let world = ExperimentWorld::new();
    duologue()
        .args(["--output-dir", world.output_dir().to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no experiments"));
}

#[test]
fn run_with_missing_config_fails() {
    let world = ExperimentWorld::new();
    duologue()
        .args([
            "--output-dir",
            world.output_dir().to_str().unwrap(),
            "run",
            "does-not-exist.json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read config"));
}

#[test]
fn run_with_invalid_config_fails_before_any_experiment() {
    let world = ExperimentWorld::new();
    let config_path = world.output_dir().join("bad.json");
    // repetitions = 0 violates the config contract
    std::fs::write(
        &config_path,
        r#"{"name":"bad","agent_a_model":"silent","agent_b_model":"silent","repetitions":0,"max_turns":1}"#,
    )
    .unwrap();

    duologue()
        .args([
            "--output-dir",
            world.output_dir().to_str().unwrap(),
            "run",
            config_path.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("repetitions"));
    assert!(!world.experiments_dir().exists());
}

#[test]
fn foreground_run_completes_and_status_reads_it() {
    let world = ExperimentWorld::new();
    let config_path = world.output_dir().join("exp.json");
    std::fs::write(
        &config_path,
        r#"{
            "name": "cli-smoke",
            "agent_a_model": "silent",
            "agent_b_model": "silent",
            "repetitions": 1,
            "max_turns": 2,
            "initial_prompt": "go",
            "convergence": { "threshold": 0.99, "action": "continue" }
        }"#,
    )
    .unwrap();

    duologue()
        .args([
            "--output-dir",
            world.output_dir().to_str().unwrap(),
            "run",
            config_path.to_str().unwrap(),
            "--foreground",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 completed, 0 failed"));

    duologue()
        .args(["--output-dir", world.output_dir().to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cli-smoke"))
        .stdout(predicate::str::contains("completed"));

    duologue()
        .args([
            "--output-dir",
            world.output_dir().to_str().unwrap(),
            "status",
            "cli-smoke",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 completed, 0 failed"));
}

#[test]
fn import_and_transcript_from_prebuilt_logs() {
    let world = ExperimentWorld::new();
    let (experiment_dir, _experiment_id) = world.with_experiment(1, 2).unwrap();

    // The fixture directory has no manifest; import still loads the logs
    duologue()
        .args([
            "--output-dir",
            world.output_dir().to_str().unwrap(),
            "import",
            experiment_dir.file_name().unwrap().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 1 conversations"));

    let log_name = std::fs::read_dir(&experiment_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .find(|name| name.ends_with("_events.jsonl"))
        .unwrap();
    let conversation_id = log_name.strip_suffix("_events.jsonl").unwrap();

    duologue()
        .args([
            "--output-dir",
            world.output_dir().to_str().unwrap(),
            "transcript",
            conversation_id,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("transcript_"));
    assert!(experiment_dir
        .join(format!("transcript_{}.md", conversation_id))
        .exists());
}
