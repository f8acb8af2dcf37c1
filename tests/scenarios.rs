use mission_sequence::command::parse_script;
use mission_sequence::config::MissionFile;
use mission_sequence::objects::{MissionObject, Spacecraft, SpacecraftParameter, objects_from_mission};
use mission_sequence::sandbox::{Sandbox, SandboxError};

const MU_EARTH: f64 = 398_600.4418; // km^3 / s^2

fn circular_leo() -> [f64; 6] {
    let r = 7_000.0;
    [r, 0.0, 0.0, 0.0, (MU_EARTH / r).sqrt(), 0.0]
}

/// Equatorial elliptic state with periapsis on +X at true anomaly `ta_deg`.
fn elliptic(rp_km: f64, ecc: f64, ta_deg: f64) -> [f64; 6] {
    let p = rp_km * (1.0 + ecc);
    let nu = ta_deg.to_radians();
    let r = p / (1.0 + ecc * nu.cos());
    let k = (MU_EARTH / p).sqrt();
    [
        r * nu.cos(),
        r * nu.sin(),
        0.0,
        -k * nu.sin(),
        k * (ecc + nu.cos()),
        0.0,
    ]
}

fn mission_yaml(spacecraft: &[(&str, f64, [f64; 6])], propagators: &[&str]) -> String {
    let mut yaml = String::from("spacecraft:\n");
    for (name, epoch, s) in spacecraft {
        yaml.push_str(&format!(
            "  - name: {name}\n    epoch_mjd: {epoch}\n    state: [{}, {}, {}, {}, {}, {}]\n",
            s[0], s[1], s[2], s[3], s[4], s[5]
        ));
    }
    yaml.push_str("propagators:\n");
    for name in propagators {
        yaml.push_str(&format!("  - name: {name}\n    initial_step_s: 30.0\n    max_step_s: 300.0\n"));
    }
    yaml
}

fn sandbox(yaml: &str, script: &str) -> Sandbox {
    let mission = MissionFile::from_yaml_str(yaml).expect("mission objects");
    let mut sandbox = Sandbox::from_mission(&mission).expect("sandbox objects");
    sandbox.set_sequence(parse_script(script).expect("script parses"));
    sandbox
}

fn spacecraft<'a>(sandbox: &'a Sandbox, name: &str) -> &'a Spacecraft {
    match sandbox.store().by_name(name) {
        Some(MissionObject::Spacecraft(sc)) => sc,
        other => panic!("expected spacecraft `{name}`, found {other:?}"),
    }
}

#[test]
fn elapsed_seconds_stop_lands_on_goal_with_one_final_sample() {
    let yaml = mission_yaml(&[("Sat1", 21_545.0, circular_leo())], &["prop1"]);
    let mut sandbox = sandbox(&yaml, "Propagate prop1(Sat1, {Sat1.ElapsedSecs = 60});");
    sandbox.initialize().expect("initialize");
    let start = spacecraft(&sandbox, "Sat1").epoch;
    let summary = sandbox.execute().expect("run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let sat = spacecraft(&sandbox, "Sat1");
    let elapsed = sat.epoch.seconds_since(&start);
    assert!((elapsed - 60.0).abs() < 1e-6, "elapsed {elapsed} s");
    assert_eq!(sat.last_stop_triggered.as_deref(), Some("StopOnSat1.ElapsedSecs"));

    let samples = sandbox.publisher().samples();
    let finals: Vec<_> = samples.iter().filter(|s| s.is_final).collect();
    assert_eq!(finals.len(), 1, "final samples: {finals:?}");
    assert!(samples.last().is_some_and(|s| s.is_final));
    assert!((finals[0].epoch_mjd - sat.epoch.mjd()).abs() < 1e-12);
}

#[test]
fn backward_elapsed_days_stop_runs_epochs_down() {
    let yaml = mission_yaml(&[("Sat1", 21_545.0, circular_leo())], &["prop1"]);
    let mut sandbox = sandbox(&yaml, "Propagate BackProp prop1(Sat1, {Sat1.ElapsedDays = 1});");
    sandbox.initialize().expect("initialize");
    sandbox.execute().expect("run");

    let sat = spacecraft(&sandbox, "Sat1");
    assert!(
        (sat.epoch.mjd() - 21_544.0).abs() < 1e-9,
        "stopped at {}",
        sat.epoch
    );
    let epochs: Vec<f64> = sandbox.publisher().samples().iter().map(|s| s.epoch_mjd).collect();
    assert!(epochs.len() > 2);
    for pair in epochs.windows(2) {
        assert!(pair[1] <= pair[0], "epoch rose from {} to {}", pair[0], pair[1]);
    }
}

#[test]
fn synchronized_propagators_need_matching_epochs() {
    let yaml = mission_yaml(
        &[
            ("Sat1", 21_545.0, circular_leo()),
            ("Sat2", 21_545.5, circular_leo()),
        ],
        &["prop1", "prop2"],
    );
    let mut sandbox = sandbox(
        &yaml,
        "Propagate Synchronized prop1(Sat1) prop2(Sat2) {Sat1.ElapsedSecs = 60};",
    );
    match sandbox.initialize() {
        Err(SandboxError::Initialization(messages)) => {
            assert!(
                messages.iter().any(|m| m.contains("different epochs")),
                "messages: {messages:?}"
            );
        }
        other => panic!("expected an initialization failure, got {other:?}"),
    }
    assert!(!sandbox.is_initialized());
}

#[test]
fn true_anomaly_stop_across_the_wrap_does_not_fire_early() {
    let yaml = mission_yaml(&[("Sat1", 21_545.0, elliptic(7_000.0, 0.05, 350.0))], &["prop1"]);
    let mut sandbox = sandbox(&yaml, "Propagate prop1(Sat1) {Sat1.TA = 10};");
    sandbox.initialize().expect("initialize");
    let start = spacecraft(&sandbox, "Sat1").epoch;
    let summary = sandbox.execute().expect("run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let sat = spacecraft(&sandbox, "Sat1");
    let ta = SpacecraftParameter::TA.evaluate(sat, None).expect("true anomaly");
    assert!((ta - 10.0).abs() < 1e-4, "true anomaly {ta}");
    let elapsed = sat.epoch.seconds_since(&start);
    assert!(
        elapsed > 60.0 && elapsed < 900.0,
        "20 degrees around periapsis should take minutes, took {elapsed} s"
    );
}

#[test]
fn periapsis_stop_finds_the_apsis() {
    let yaml = mission_yaml(&[("Sat1", 21_545.0, elliptic(7_000.0, 0.05, 300.0))], &["prop1"]);
    let mut sandbox = sandbox(&yaml, "Propagate prop1(Sat1) {Sat1.Periapsis};");
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let sat = spacecraft(&sandbox, "Sat1");
    let rmag = SpacecraftParameter::RMAG.evaluate(sat, None).expect("radius");
    assert!((rmag - 7_000.0).abs() < 1e-3, "periapsis radius {rmag}");
}

#[test]
fn radius_stop_is_located_inside_the_step() {
    let yaml = mission_yaml(&[("Sat1", 21_545.0, elliptic(7_000.0, 0.05, 300.0))], &["prop1"]);
    let mut sandbox = sandbox(&yaml, "Propagate prop1(Sat1) {Sat1.RMAG = 7100};");
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let sat = spacecraft(&sandbox, "Sat1");
    let rmag = SpacecraftParameter::RMAG.evaluate(sat, None).expect("radius");
    assert!((rmag - 7_100.0).abs() <= 1e-7, "radius {rmag}");
    assert_eq!(sat.last_stop_triggered.as_deref(), Some("StopOnSat1.RMAG"));
}

#[test]
fn second_periapsis_stop_waits_a_full_orbit() {
    let (rp, ecc) = (7_000.0, 0.05);
    let yaml = mission_yaml(&[("Sat1", 21_545.0, elliptic(rp, ecc, 300.0))], &["prop1"]);
    let script = "\
Propagate prop1(Sat1) {Sat1.Periapsis};
Propagate prop1(Sat1) {Sat1.Periapsis};";
    let mut sandbox = sandbox(&yaml, script);
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let finals: Vec<f64> = sandbox
        .publisher()
        .samples()
        .iter()
        .filter(|s| s.is_final)
        .map(|s| s.epoch_mjd)
        .collect();
    assert_eq!(finals.len(), 2, "final epochs: {finals:?}");
    let sma = rp / (1.0 - ecc);
    let period = 2.0 * std::f64::consts::PI * (sma.powi(3) / MU_EARTH).sqrt();
    let between = (finals[1] - finals[0]) * 86_400.0;
    assert!((between - period).abs() < 1e-2, "{between} s between stops, period {period} s");
}

#[test]
fn rebuilt_sandbox_stops_at_the_same_epoch() {
    let yaml = mission_yaml(&[("Sat1", 21_545.0, elliptic(7_000.0, 0.05, 350.0))], &["prop1"]);
    let script = "Propagate prop1(Sat1) {Sat1.TA = 10};";
    let mission = MissionFile::from_yaml_str(&yaml).expect("mission objects");
    let mut sandbox = Sandbox::from_mission(&mission).expect("sandbox objects");
    sandbox.set_sequence(parse_script(script).expect("script parses"));
    sandbox.initialize().expect("initialize");
    sandbox.execute().expect("first run");
    let first = spacecraft(&sandbox, "Sat1").epoch;

    sandbox.clear();
    assert!(sandbox.store().by_name("Sat1").is_none());
    for object in objects_from_mission(&mission) {
        sandbox.add_object(object).expect("re-add object");
    }
    sandbox.set_sequence(parse_script(script).expect("script parses"));
    sandbox.initialize().expect("initialize again");
    let summary = sandbox.execute().expect("second run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let second = spacecraft(&sandbox, "Sat1").epoch;
    let drift = second.seconds_since(&first);
    assert!(drift.abs() < 1e-6, "second run stopped {drift} s away from the first");
}

#[test]
fn array_bound_to_a_scalar_goal_fails_at_binding() {
    let mut yaml = mission_yaml(&[("Sat1", 21_545.0, circular_leo())], &["prop1"]);
    yaml.push_str("arrays:\n  - name: Goals\n    rows: 2\n    cols: 1\n    values: [7000, 7100]\n");
    yaml.push_str("solvers:\n  - name: DC1\n    show_progress: false\n");
    let script = "\
Target DC1;
   Vary DC1(Sat1.VY = 7.6);
   Propagate prop1(Sat1) {Sat1.ElapsedSecs = 600};
   Achieve DC1(Goals = 7100);
EndTarget;";
    let mut sandbox = sandbox(&yaml, script);
    match sandbox.initialize() {
        Err(SandboxError::Initialization(messages)) => {
            assert!(
                messages
                    .iter()
                    .any(|m| m.contains("`Goals` is an Array, expected Real")),
                "messages: {messages:?}"
            );
        }
        other => panic!("expected a binding failure, got {other:?}"),
    }
}
