//! `chaos-sim` command line

use anyhow::Context;
use chaos_sim::{run_scenario, ChaosPlan, ScenarioConfig};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_DURATION_SECS: u64 = 30;
const DEFAULT_SAMPLE_MS: u64 = 100;

fn plan_arg() -> Arg {
    Arg::new("plan")
        .long("plan")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML chaos plan")
}

fn cli() -> Command {
    Command::new("chaos-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run chaos plans against a simulated container runtime")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a plan and report scene limits and outcomes")
                .arg(plan_arg())
                .arg(
                    Arg::new("duration-secs")
                        .long("duration-secs")
                        .default_value("30")
                        .value_parser(value_parser!(u64))
                        .help("How long monitors run before they are stopped"),
                )
                .arg(
                    Arg::new("sample-ms")
                        .long("sample-ms")
                        .default_value("100")
                        .value_parser(value_parser!(u64))
                        .help("Scene sampling interval"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Validate a plan without running it")
                .arg(plan_arg()),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
}

fn load_plan(args: &ArgMatches) -> anyhow::Result<ChaosPlan> {
    let path = args
        .get_one::<PathBuf>("plan")
        .context("--plan is required")?;
    ChaosPlan::load(path).with_context(|| format!("loading {}", path.display()))
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<bool> {
    let plan = load_plan(args)?;
    let duration = args
        .get_one::<u64>("duration-secs")
        .copied()
        .unwrap_or(DEFAULT_DURATION_SECS);
    let sample = args
        .get_one::<u64>("sample-ms")
        .copied()
        .unwrap_or(DEFAULT_SAMPLE_MS)
        .max(1);
    let config = ScenarioConfig {
        duration: Duration::from_secs(duration),
        sample_interval: Duration::from_millis(sample),
    };

    let report = run_scenario(&plan, &config).await?;
    if args.get_flag("json") {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(report.passed())
}

fn check(args: &ArgMatches) -> anyhow::Result<bool> {
    let plan = load_plan(args)?;
    let specs = plan.monitor_specs()?;
    println!(
        "Plan OK: {} scene(s), {} entit{}",
        plan.scenes.len(),
        specs.len(),
        if specs.len() == 1 { "y" } else { "ies" }
    );
    for spec in &specs {
        println!(
            "  {} | scene {} | chaos {} | filters: {} success, {} fail, {} archive",
            spec.entity,
            spec.scene.as_deref().unwrap_or("-"),
            if spec.settings.enabled { "on" } else { "off" },
            spec.filters.success.len(),
            spec.filters.fail.len(),
            spec.filters.monitor.len()
        );
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let passed = match matches.subcommand() {
        Some(("simulate", args)) => simulate(args).await?,
        Some(("check", args)) => check(args)?,
        _ => unreachable!("subcommand is required"),
    };

    std::process::exit(if passed { 0 } else { 1 });
}
