//! Elvis simulator entry point — CLI wiring and config-driven engine construction.

use std::path::Path;
use std::process;

use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;

use elvis::config::ScenarioConfig;
use elvis::io::export::export_csv;
use elvis::report::KpiReport;
use elvis::sim::Simulator;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    telemetry_out: Option<String>,
}

fn print_help() {
    eprintln!("elvis — EV charging site simulator");
    eprintln!();
    eprintln!("Usage: elvis [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!("  --preset <name>          Use a built-in preset (baseline, with_storage, fcfs_demo)");
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --telemetry-out <path>   Export per-step power traces to CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        telemetry_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --scenario requires a path argument");
                    process::exit(1);
                }
                cli.scenario_path = Some(args[i].clone());
            }
            "--preset" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --preset requires a name argument");
                    process::exit(1);
                }
                cli.preset = Some(args[i].clone());
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --seed requires a u64 argument");
                    process::exit(1);
                }
                if let Ok(s) = args[i].parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{}\" is not a valid u64", args[i]);
                    process::exit(1);
                }
            }
            "--telemetry-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --telemetry-out requires a path argument");
                    process::exit(1);
                }
                cli.telemetry_out = Some(args[i].clone());
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = parse_args();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

/// Top-level run: every fallible step here bubbles through `anyhow` so a
/// single `main` can report a readable chain of causes and exit non-zero,
/// regardless of whether the failure originated as a `ConfigError`, a
/// `DomainError`, or a plain `std::io::Error` from CSV export.
fn run(cli: CliArgs) -> anyhow::Result<()> {
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
            .with_context(|| format!("loading scenario from \"{path}\""))?
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name).with_context(|| format!("loading preset \"{name}\""))?
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if let Some(first) = errors.into_iter().next() {
        return Err(first).context("scenario failed validation");
    }

    let mut rng = StdRng::seed_from_u64(scenario.simulation.seed);
    let built = scenario.build(&mut rng).context("building scenario")?;

    let resolution_seconds = built.clock.resolution_seconds;
    let start_hour_of_day = built.clock.start_hour_of_day;
    let mut report_rng = StdRng::seed_from_u64(scenario.simulation.seed);
    let tree_for_report = scenario.build(&mut report_rng).context("rebuilding scenario for report")?.tree;

    let simulator = Simulator::new(
        built.tree,
        &built.vehicle_types,
        built.clock,
        built.events,
        built.queue_capacity,
        built.disconnect_by_time,
        built.preload_kw,
        built.schedule_kind,
    );

    let result = simulator.run().context("simulation failed")?;

    let kpi = KpiReport::from_result(
        &result,
        &tree_for_report,
        &built.emissions,
        built.cost.fixed_rate_per_kwh,
        &built.cost.daily_rate_per_kwh,
        start_hour_of_day,
    );
    println!("{kpi}");

    if let Some(ref path) = cli.telemetry_out {
        export_csv(&result, resolution_seconds, Path::new(path))
            .with_context(|| format!("writing telemetry to \"{path}\""))?;
        eprintln!("Telemetry written to {path}");
    }

    Ok(())
}
