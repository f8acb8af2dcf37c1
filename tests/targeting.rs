use mission_sequence::command::{GenMode, parse_script};
use mission_sequence::config::MissionFile;
use mission_sequence::objects::{MissionObject, Spacecraft, SpacecraftParameter};
use mission_sequence::sandbox::{Sandbox, SandboxError};

fn mission(max_iterations: u32, exit_mode: &str) -> MissionFile {
    let yaml = format!(
        "\
spacecraft:
  - name: Sat
    epoch_mjd: 21545.0
    state: [7000.0, 0.0, 0.0, 0.0, 7.546049108166282, 0.0]
propagators:
  - name: Prop
    initial_step_s: 60.0
solvers:
  - name: DC1
    max_iterations: {max_iterations}
    exit_mode: {exit_mode}
    show_progress: false
"
    );
    MissionFile::from_yaml_str(&yaml).expect("mission objects")
}

fn raise_script(radius_km: f64) -> String {
    format!(
        "\
Target DC1;
   Vary DC1(Sat.VY = 7.6, {{Perturbation = 0.0001, MaxStep = 0.2}});
   Propagate Prop(Sat) {{Sat.ElapsedSecs = 1200}};
   Achieve DC1(Sat.RMAG = {radius_km}, {{Tolerance = 0.01}});
EndTarget;"
    )
}

fn sandbox(mission: &MissionFile, script: &str) -> Sandbox {
    let mut sandbox = Sandbox::from_mission(mission).expect("sandbox objects");
    sandbox.set_sequence(parse_script(script).expect("script parses"));
    sandbox.initialize().expect("initialize");
    sandbox
}

fn spacecraft<'a>(sandbox: &'a Sandbox, name: &str) -> &'a Spacecraft {
    match sandbox.store().by_name(name) {
        Some(MissionObject::Spacecraft(sc)) => sc,
        other => panic!("expected spacecraft `{name}`, found {other:?}"),
    }
}

#[test]
fn differential_corrector_raises_the_orbit() {
    let mission = mission(25, "DiscardAndContinue");
    let mut sandbox = sandbox(&mission, &raise_script(7_100.0));
    let start = spacecraft(&sandbox, "Sat").epoch;
    let summary = sandbox.execute().expect("targeting run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);

    let sat = spacecraft(&sandbox, "Sat");
    let rmag = SpacecraftParameter::RMAG.evaluate(sat, None).expect("radius");
    assert!((rmag - 7_100.0).abs() <= 0.01, "achieved radius {rmag} km");
    let elapsed = sat.epoch.seconds_since(&start);
    assert!((elapsed - 1_200.0).abs() < 1e-6, "converged pass ended after {elapsed} s");
}

#[test]
fn unconverged_target_warns_and_continues() {
    let mission = mission(2, "DiscardAndContinue");
    let mut sandbox = sandbox(&mission, &raise_script(60_000.0));
    let summary = sandbox.execute().expect("run continues past the target");
    assert!(
        summary.warnings.iter().any(|w| w.contains("DC1")),
        "warnings: {:?}",
        summary.warnings
    );
}

#[test]
fn unconverged_target_with_stop_exit_interrupts_the_run() {
    let mission = mission(2, "Stop");
    let mut sandbox = sandbox(&mission, &raise_script(60_000.0));
    let err = sandbox.execute().unwrap_err();
    assert!(matches!(err, SandboxError::Interrupted(_)), "{err}");
}

#[test]
fn exit_mode_on_the_target_line_overrides_the_solver() {
    let mission = mission(2, "DiscardAndContinue");
    let script = raise_script(60_000.0).replacen("Target DC1;", "Target DC1 {ExitMode = Stop};", 1);
    let mut sandbox = sandbox(&mission, &script);
    let generated = sandbox
        .sequence()
        .expect("sequence")
        .generating_string(GenMode::Full);
    assert!(generated.contains("Target DC1 {ExitMode = Stop};"), "{generated}");

    let err = sandbox.execute().unwrap_err();
    assert!(matches!(err, SandboxError::Interrupted(_)), "{err}");
}
