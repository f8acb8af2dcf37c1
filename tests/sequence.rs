use mission_sequence::command::{GenMode, parse_script};
use mission_sequence::config::MissionFile;
use mission_sequence::objects::{MissionObject, Spacecraft};
use mission_sequence::sandbox::{InterruptSource, NeverInterrupt, RunState, Sandbox, SandboxError};

const LEO: &str = "\
spacecraft:
  - name: Sat
    epoch_mjd: 21545.0
    state: [7000.0, 0.0, 0.0, 0.0, 7.546049108166282, 0.0]
  - name: Chaser
    epoch_mjd: 21545.0
    state: [0.0, 7100.0, 0.0, -7.492, 0.0, 0.0]
variables:
  - name: I
  - name: x
propagators:
  - name: Prop
    initial_step_s: 30.0
    max_step_s: 300.0
  - name: Prop2
    integrator: RungeKutta4
    initial_step_s: 20.0
";

fn sandbox(script: &str) -> Sandbox {
    sandbox_with(LEO, script)
}

fn sandbox_with(yaml: &str, script: &str) -> Sandbox {
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

fn variable(sandbox: &Sandbox, name: &str) -> f64 {
    match sandbox.store().by_name(name) {
        Some(MissionObject::Variable(v)) => v.value,
        other => panic!("expected variable `{name}`, found {other:?}"),
    }
}

#[test]
fn generated_script_parses_back_to_itself() {
    let script = "\
BeginMissionSequence;
% two short hops
For I = 1:2;
   Propagate Prop(Sat) {Sat.ElapsedSecs = 60};
EndFor;
If x < 1 & Sat.RMAG > 6500;
   x = x + 1;
Else;
   x = 0;
EndIf;
While x < 3;
   GMAT x = x + 1;
EndWhile;
Propagate Synchronized Prop(Sat) Prop2(Chaser) {Sat.Periapsis, StopTolerance = 1e-05};
Stop;";
    let first = parse_script(script).expect("script parses");
    let generated = first.generating_string(GenMode::Full);
    let second = parse_script(&generated).expect("generated script parses");
    assert_eq!(second.generating_string(GenMode::Full), generated);
    assert_eq!(first.len(), second.len());
    assert!(generated.starts_with("% two short hops\nFor I = 1:2;"), "{generated}");
}

#[test]
fn loops_rearm_stops_on_every_pass_and_rerun() {
    let mut sandbox = sandbox(
        "\
For I = 1:3;
   Propagate Prop(Sat) {Sat.ElapsedSecs = 60};
EndFor;",
    );
    sandbox.initialize().expect("initialize");
    let start = spacecraft(&sandbox, "Sat").epoch;

    sandbox.execute().expect("first run");
    let first = spacecraft(&sandbox, "Sat").epoch;
    let elapsed = first.seconds_since(&start);
    assert!((elapsed - 180.0).abs() < 1e-6, "first run elapsed {elapsed} s");
    assert_eq!(variable(&sandbox, "I"), 3.0);

    let summary = sandbox.execute().expect("second run");
    assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);
    let second = spacecraft(&sandbox, "Sat").epoch;
    let elapsed = second.seconds_since(&first);
    assert!((elapsed - 180.0).abs() < 1e-6, "second run elapsed {elapsed} s");
}

#[test]
fn forward_samples_never_go_back_in_time() {
    let mut sandbox = sandbox("Propagate Prop(Sat) {Sat.ElapsedSecs = 3600};");
    sandbox.initialize().expect("initialize");
    sandbox.execute().expect("run");
    let epochs: Vec<f64> = sandbox.publisher().samples().iter().map(|s| s.epoch_mjd).collect();
    assert!(epochs.len() > 12, "only {} samples", epochs.len());
    for pair in epochs.windows(2) {
        assert!(pair[1] >= pair[0], "epoch fell from {} to {}", pair[0], pair[1]);
    }
}

#[test]
fn synchronized_ensembles_share_every_epoch() {
    let mut sandbox = sandbox("Propagate Synchronized Prop(Sat) Prop2(Chaser) {Sat.ElapsedSecs = 300};");
    sandbox.initialize().expect("initialize");
    sandbox.execute().expect("run");

    let samples = sandbox.publisher().samples();
    assert!(samples.len() > 2);
    for sample in samples {
        // Sat's epoch leads its seven columns, Chaser's follows.
        let (sat, chaser) = (sample.values[0], sample.values[7]);
        assert!((sat - chaser).abs() < 1e-12, "Sat at {sat}, Chaser at {chaser}");
    }
    let sat = spacecraft(&sandbox, "Sat").epoch;
    let chaser = spacecraft(&sandbox, "Chaser").epoch;
    assert!(sat.seconds_since(&chaser).abs() < 1e-6);
}

#[test]
fn while_and_assignment_count_up() {
    let mut sandbox = sandbox("While x < 3;\n   x = x + 1;\nEndWhile;");
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    assert_eq!(variable(&sandbox, "x"), 3.0);
    assert_eq!(summary.commands_executed, 2);
}

#[test]
fn stop_command_ends_the_run_cleanly() {
    let mut sandbox = sandbox("x = 1;\nStop;\nx = 2;");
    sandbox.initialize().expect("initialize");
    let summary = sandbox.execute().expect("run");
    assert!(summary.stopped_by_command);
    assert_eq!(variable(&sandbox, "x"), 1.0);
}

#[test]
fn execute_requires_initialize() {
    let mut sandbox = sandbox("x = 1;");
    assert_eq!(sandbox.execute().unwrap_err(), SandboxError::NotInitialized);
    sandbox.initialize().expect("initialize");
    sandbox.execute().expect("run");
}

#[derive(Debug)]
struct StopAfterPolls(usize);

impl InterruptSource for StopAfterPolls {
    fn poll(&mut self) -> RunState {
        if self.0 == 0 {
            RunState::Idle
        } else {
            self.0 -= 1;
            RunState::Running
        }
    }
}

#[test]
fn interrupted_propagation_can_run_again() {
    let yaml = LEO.replace("spacecraft:", "settings:\n  interrupt_check_frequency: 1\nspacecraft:");
    let mut sandbox = sandbox_with(&yaml, "Propagate Prop(Sat) {Sat.ElapsedSecs = 7200};");
    sandbox.set_interrupt_source(Box::new(StopAfterPolls(4)));
    sandbox.initialize().expect("initialize");
    let start = spacecraft(&sandbox, "Sat").epoch;

    let err = sandbox.execute().unwrap_err();
    assert!(matches!(err, SandboxError::Interrupted(_)), "{err}");
    let partial = spacecraft(&sandbox, "Sat").epoch.seconds_since(&start);
    assert!(partial > 0.0 && partial < 7200.0, "interrupted after {partial} s");

    sandbox.set_interrupt_source(Box::new(NeverInterrupt));
    sandbox.execute().expect("resumed run");
    let total = spacecraft(&sandbox, "Sat").epoch.seconds_since(&start);
    assert!((total - partial - 7200.0).abs() < 1e-6, "ran {total} s after {partial} s");
}

#[test]
fn sample_history_is_bounded_by_the_settings() {
    let yaml = LEO.replace("spacecraft:", "settings:\n  sample_history: 4\nspacecraft:");
    let mut sandbox = sandbox_with(&yaml, "Propagate Prop(Sat) {Sat.ElapsedSecs = 7200};");
    sandbox.initialize().expect("initialize");
    sandbox.execute().expect("run");

    let samples = sandbox.publisher().samples();
    assert!(!samples.is_empty() && samples.len() <= 4, "kept {} samples", samples.len());
    assert!(samples.last().is_some_and(|s| s.is_final));
}
