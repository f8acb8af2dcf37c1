use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mission_sequence::command::{GenMode, parse_script};
use mission_sequence::config::load_mission;
use mission_sequence::export::{EphemerisJson, ReportSubscriber, gregorian};
use mission_sequence::sandbox::{RunSummary, Sandbox};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about = "Run a mission control sequence script")]
struct Cli {
    /// Mission objects (YAML, or TOML by extension)
    #[arg(long)]
    objects: PathBuf,

    /// Mission control sequence script
    #[arg(long)]
    script: PathBuf,

    /// Write every published sample to this CSV file (`-` for stdout)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Only report the samples a Propagate stops on
    #[arg(long, default_value_t = false, requires = "report")]
    final_only: bool,

    /// Write nominal spacecraft trajectories to this JSON file
    #[arg(long)]
    ephemeris: Option<PathBuf>,

    /// Echo the parsed sequence and print run statistics
    #[arg(long, default_value_t = false)]
    summary: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mission = load_mission(&cli.objects)
        .with_context(|| format!("loading mission objects from {}", cli.objects.display()))?;
    let text = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("reading script {}", cli.script.display()))?;
    let sequence = parse_script(&text).context("parsing the mission sequence")?;

    let mut sandbox = Sandbox::from_mission(&mission)?;
    sandbox.set_sequence(sequence);
    if let Some(path) = &cli.report {
        let report = ReportSubscriber::new("Report", path).final_only(cli.final_only);
        sandbox.add_subscriber(Box::new(report));
    }
    if let Some(path) = &cli.ephemeris {
        sandbox.add_subscriber(Box::new(EphemerisJson::new("Ephemeris", path)));
    }

    sandbox.initialize()?;
    if cli.summary {
        if let Some(sequence) = sandbox.sequence() {
            println!("=== Mission Sequence ===");
            println!("{}", sequence.generating_string(GenMode::NoComments));
        }
    }
    let run = sandbox.execute()?;
    info!(commands = run.commands_executed, "mission sequence finished");

    print_final_states(&sandbox)?;
    if cli.summary {
        print_summary(&run);
    }
    for warning in &run.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn print_final_states(sandbox: &Sandbox) -> anyhow::Result<()> {
    let store = sandbox.store();
    println!("=== Final States ===");
    for handle in store.spacecraft_handles() {
        let sc = store.spacecraft(handle)?;
        let mjd = sc.epoch.mjd();
        println!("{}", sc.name);
        println!("  Epoch (A.1)   : {:.11} ({})", mjd, gregorian(mjd)?);
        println!(
            "  Position (km) : [{:.6}, {:.6}, {:.6}]",
            sc.state[0], sc.state[1], sc.state[2]
        );
        println!(
            "  Velocity (km/s): [{:.9}, {:.9}, {:.9}]",
            sc.state[3], sc.state[4], sc.state[5]
        );
        if let Some(stop) = &sc.last_stop_triggered {
            println!("  Last stop     : {stop}");
        }
    }
    Ok(())
}

fn print_summary(run: &RunSummary) {
    println!("=== Run Summary ===");
    println!("Commands executed : {}", run.commands_executed);
    println!("Warnings          : {}", run.warnings.len());
    if run.stopped_by_command {
        println!("Ended at a Stop command");
    }
}
