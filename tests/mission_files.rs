use std::fs;

use mission_sequence::command::parse_script;
use mission_sequence::config::load_mission;
use mission_sequence::export::{EphemerisJson, ReportSubscriber};
use mission_sequence::sandbox::Sandbox;

const MISSION_TOML: &str = r#"
[settings]
time_granularity_s = 0.5

[[spacecraft]]
name = "Sat"
epoch_mjd = 21545.0
state = [7000.0, 0.0, 0.0, 0.0, 7.546049108166282, 0.0]

[[propagators]]
name = "Prop"
integrator = "RungeKutta4"
initial_step_s = 15.0
"#;

#[test]
fn toml_mission_runs_and_exports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mission_path = dir.path().join("mission.toml");
    fs::write(&mission_path, MISSION_TOML).expect("write mission");
    let report_path = dir.path().join("out").join("report.csv");
    let ephemeris_path = dir.path().join("out").join("ephemeris.json");

    let mission = load_mission(&mission_path).expect("load TOML mission");
    assert_eq!(mission.settings.time_granularity_s, Some(0.5));
    let mut sandbox = Sandbox::from_mission(&mission).expect("sandbox objects");
    sandbox.set_sequence(parse_script("Propagate Prop(Sat) {Sat.ElapsedSecs = 100.2};").expect("script"));
    sandbox.add_subscriber(Box::new(ReportSubscriber::new("Report", &report_path)));
    sandbox.add_subscriber(Box::new(EphemerisJson::new("Ephemeris", &ephemeris_path)));
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    // 100.2 s rounds to 100 s, which is well outside the stop tolerance.
    assert!(
        summary
            .warnings
            .iter()
            .any(|w| w.contains("Sat.ElapsedSecs") && w.contains("granularity")),
        "warnings: {:?}",
        summary.warnings
    );

    let report = fs::read_to_string(&report_path).expect("report written");
    let mut lines = report.lines();
    assert_eq!(
        lines.next(),
        Some("A1ModJulian,A1Gregorian,Final,Sat.A1ModJulian,Sat.X,Sat.Y,Sat.Z,Sat.VX,Sat.VY,Sat.VZ")
    );
    let rows: Vec<&str> = lines.collect();
    // 15 s steps: the start plus six full steps, then the final landing.
    assert_eq!(rows.len(), 8, "{report}");
    assert!(rows[0].starts_with("21545.00000000000,01 Jan 2000 12:00:00.000,false,"));
    assert!(rows[7].contains(",true,"), "last row {}", rows[7]);
    // Rounded to the half-second granularity.
    assert!(rows[7].contains("01 Jan 2000 12:01:40.000"), "last row {}", rows[7]);

    let ephemeris = fs::read_to_string(&ephemeris_path).expect("ephemeris written");
    assert!(ephemeris.contains("\"name\": \"Sat\""), "{ephemeris}");
    assert!(ephemeris.contains("\"is_final\": true"), "{ephemeris}");
}

#[test]
fn granularity_that_lands_on_the_goal_stays_quiet() {
    let mission = mission_sequence::config::MissionFile::from_toml_str(MISSION_TOML).expect("mission");
    let mut sandbox = Sandbox::from_mission(&mission).expect("sandbox objects");
    sandbox.set_sequence(parse_script("Propagate Prop(Sat) {Sat.ElapsedSecs = 100.5};").expect("script"));
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);
}
