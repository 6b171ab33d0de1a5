use anyhow::{bail, Context, Result};
use cdm_core::simulator::{run_simulation, Fixture, SimulationConfig};
use cdm_core::{ActionState, ConsoleConfig, PartitionSummary};
use cdm_material::{partition, FilterView, PartitionContext};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("cdm")
        .version(cdm_core::VERSION)
        .about("Deployment candidate selector")
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("JSON output and logs"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("partition")
                .about("Partition a fixture's materials")
                .arg(fixture_arg())
                .arg(
                    Arg::new("approval")
                        .long("approval")
                        .action(ArgAction::SetTrue)
                        .help("Treat approval as configured"),
                )
                .arg(
                    Arg::new("exception-user")
                        .long("exception-user")
                        .action(ArgAction::SetTrue)
                        .help("User is exempt from the approval policy"),
                )
                .arg(
                    Arg::new("view")
                        .long("view")
                        .default_value("eligible")
                        .value_parser(["eligible", "all"])
                        .help("Active filter tab"),
                )
                .arg(
                    Arg::new("search")
                        .long("search")
                        .action(ArgAction::SetTrue)
                        .help("A search is applied"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a session against a fixture")
                .arg(fixture_arg())
                .arg(
                    Arg::new("select")
                        .long("select")
                        .value_parser(value_parser!(usize))
                        .help("Index of the material to select and deploy"),
                )
                .arg(
                    Arg::new("window")
                        .long("window")
                        .value_parser(["allowed", "partial", "blocked"])
                        .help("Deployment window verdict"),
                )
                .arg(
                    Arg::new("confirm")
                        .long("confirm")
                        .action(ArgAction::SetTrue)
                        .help("Confirm the deployment window warning"),
                )
                .arg(
                    Arg::new("load-older")
                        .long("load-older")
                        .action(ArgAction::SetTrue)
                        .help("Load one older page after the first"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("Console config TOML file"),
                ),
        )
}

fn fixture_arg() -> Arg {
    Arg::new("fixture")
        .long("fixture")
        .required(true)
        .help("Path to a JSON fixture")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_fixture(args: &ArgMatches) -> Result<Fixture> {
    let Some(path) = args.get_one::<String>("fixture") else {
        bail!("--fixture is required");
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Fixture::from_json(&raw).with_context(|| format!("parsing {path}"))
}

fn run_partition(args: &ArgMatches, json: bool) -> Result<()> {
    let mut fixture = load_fixture(args)?;
    let view = match args.get_one::<String>("view").map(String::as_str) {
        Some("all") => FilterView::All,
        _ => FilterView::Eligible,
    };
    let ctx = PartitionContext::default()
        .approval_configured(args.get_flag("approval") || fixture.page.is_approval_configured())
        .with_exception_user(args.get_flag("exception-user"))
        .with_view(view)
        .with_search(args.get_flag("search"))
        .with_resource_filters(!fixture.page.resource_filters.is_empty());

    let result = partition(&mut fixture.page.materials, &ctx);
    let summary = PartitionSummary {
        consumed: result.consumed.iter().map(|m| m.id).collect(),
        eligible: result.eligible.iter().map(|m| m.id).collect(),
        eligible_count: result.eligible_count,
        tabs: ctx.resource_filters_present.then(|| result.filter_tabs()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Consumed: {:?}", summary.consumed);
        println!("Eligible: {:?}", summary.eligible);
        println!("Eligible count: {}", summary.eligible_count);
        if let Some(tabs) = summary.tabs {
            println!("Tabs: {} | {}", tabs.eligible, tabs.all);
        }
    }
    Ok(())
}

async fn run_simulate(args: &ArgMatches, json: bool) -> Result<bool> {
    let fixture = load_fixture(args)?;
    let console = match args.get_one::<String>("config") {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            ConsoleConfig::from_toml_str(&raw)?
        }
        None => ConsoleConfig::default(),
    };
    let window = match args.get_one::<String>("window").map(String::as_str) {
        Some("allowed") => Some(ActionState::Allowed),
        Some("partial") => Some(ActionState::Partial),
        Some("blocked") => Some(ActionState::Blocked),
        _ => None,
    };

    let config = SimulationConfig {
        select: args.get_one::<usize>("select").copied(),
        window,
        confirm: args.get_flag("confirm"),
        load_older: args.get_flag("load-older"),
        console,
    };
    let report = run_simulation(fixture, config).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(report.error.is_none())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let json = matches.get_flag("json");
    init_tracing(json);

    match matches.subcommand() {
        Some(("partition", args)) => run_partition(args, json),
        Some(("simulate", args)) => {
            if !run_simulate(args, json).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        _ => bail!("unknown subcommand"),
    }
}
