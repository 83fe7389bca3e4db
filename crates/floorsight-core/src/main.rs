use clap::{value_parser, Arg, Command};
use floorsight_core::sim::{run_simulator, SimulatorConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Command::new("floorsight-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Floorsight view-coordination simulator")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Replay selection churn against scripted endpoints")
                .arg(
                    Arg::new("churns")
                        .long("churns")
                        .default_value("25")
                        .value_parser(value_parser!(u64))
                        .help("Number of selection churns to replay"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("machines")
                        .long("machines")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Machines in the simulated lab"),
                )
                .arg(
                    Arg::new("max-latency-ms")
                        .long("max-latency-ms")
                        .default_value("40")
                        .value_parser(value_parser!(u64))
                        .help("Upper bound for simulated endpoint latency"),
                ),
        );

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: *args.get_one::<u64>("seed").unwrap_or(&42),
                churns: *args.get_one::<u64>("churns").unwrap_or(&25),
                machines: *args.get_one::<usize>("machines").unwrap_or(&4),
                max_latency_ms: *args.get_one::<u64>("max-latency-ms").unwrap_or(&40),
            };

            println!("Running selection-churn simulation...");
            println!("Seed: {}", config.seed);
            println!("Churns: {}", config.churns);
            println!();

            let report = run_simulator(config).await?;
            println!("{}", report.generate_text());

            std::process::exit(i32::from(!report.passed()));
        }
        _ => Ok(()),
    }
}
