use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const OBJECTS: &str = "\
spacecraft:
  - name: Sat
    epoch_mjd: 21545.0
    state: [7000.0, 0.0, 0.0, 0.0, 7.546049108166282, 0.0]
propagators:
  - name: Prop
    initial_step_s: 60.0
";

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path.to_str().expect("utf-8 path").to_string()
}

#[test]
fn runs_a_script_and_writes_outputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let objects = write(dir.path(), "objects.yaml", OBJECTS);
    let script = write(
        dir.path(),
        "mission.script",
        "BeginMissionSequence;\nPropagate Prop(Sat) {Sat.ElapsedSecs = 600};\n",
    );
    let report = dir.path().join("report.csv");
    let ephemeris = dir.path().join("ephemeris.json");

    Command::cargo_bin("mission")
        .expect("mission bin")
        .args(["--objects", &objects, "--script", &script, "--summary", "--final-only"])
        .arg("--report")
        .arg(&report)
        .arg("--ephemeris")
        .arg(&ephemeris)
        .env("RUST_LOG", "warn")
        .assert()
        .success()
        .stdout(predicate::str::contains("Propagate Prop(Sat) {Sat.ElapsedSecs = 600};"))
        .stdout(predicate::str::contains("=== Final States ==="))
        .stdout(predicate::str::contains("01 Jan 2000 12:10:00.000"))
        .stdout(predicate::str::contains("Last stop     : StopOnSat.ElapsedSecs"));

    let csv = fs::read_to_string(&report).expect("report written");
    assert_eq!(csv.lines().count(), 2, "final-only report:\n{csv}");

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&ephemeris).expect("ephemeris written"))
            .expect("ephemeris is JSON");
    assert_eq!(json["spacecraft"][0]["name"], "Sat");
}

#[test]
fn reports_the_line_of_an_unknown_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let objects = write(dir.path(), "objects.yaml", OBJECTS);
    let script = write(dir.path(), "bad.script", "BeginMissionSequence;\nManeuver Burn(Sat);\n");

    Command::cargo_bin("mission")
        .expect("mission bin")
        .args(["--objects", &objects, "--script", &script])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2: unknown command `Maneuver`"));
}

#[test]
fn missing_objects_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write(dir.path(), "ok.script", "Propagate Prop(Sat) {Sat.ElapsedSecs = 1};\n");
    let missing = dir.path().join("nope.yaml");

    Command::cargo_bin("mission")
        .expect("mission bin")
        .arg("--objects")
        .arg(&missing)
        .args(["--script", &script])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading mission objects"));
}
