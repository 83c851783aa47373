//! `stakeguard` command-line interface

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rand::RngCore;
use sg_engine::prelude::*;
use sg_vault::{
    CryptoBox, FileBackend, KeyDeriver, MemoryBackend, RuntimeEnvironment, SecureStore,
    StaticPassphrase, VaultConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

fn cli() -> Command {
    Command::new("stakeguard")
        .version(sg_engine::VERSION)
        .about("Encrypted multi-step staking planner and scheduler")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(
            Command::new("plan")
                .about("Generate and print an execution plan")
                .arg(
                    Arg::new("stake")
                        .long("stake")
                        .required(true)
                        .value_parser(value_parser!(Amount))
                        .help("Total amount to stake"),
                )
                .arg(
                    Arg::new("txs")
                        .long("txs")
                        .default_value("4")
                        .value_parser(value_parser!(u32))
                        .help("Number of transactions (even, 2-20)"),
                )
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .default_value("0x0000000000000000000000000000000000000000")
                        .help("Owning wallet address"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(Command::new("status").about("Open the configured store and print its security status"))
        .subcommand(
            Command::new("simulate")
                .about("Run a plan against an in-process simulated chain")
                .arg(
                    Arg::new("stake")
                        .long("stake")
                        .required(true)
                        .value_parser(value_parser!(Amount))
                        .help("Total amount to stake"),
                )
                .arg(
                    Arg::new("txs")
                        .long("txs")
                        .default_value("4")
                        .value_parser(value_parser!(u32))
                        .help("Number of transactions (even, 2-20)"),
                )
                .arg(
                    Arg::new("speed")
                        .long("speed")
                        .default_value("60")
                        .value_parser(value_parser!(f64))
                        .help("Delay speed-up factor"),
                )
                .arg(
                    Arg::new("fail-at")
                        .long("fail-at")
                        .value_parser(value_parser!(usize))
                        .help("Reject the submission with this index"),
                ),
        )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<EngineConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn plan(config: &EngineConfig, args: &ArgMatches) -> Result<()> {
    let stake = *args.get_one::<Amount>("stake").context("--stake is required")?;
    let txs = args.get_one::<u32>("txs").copied().unwrap_or(4);
    let owner = args
        .get_one::<String>("owner")
        .map(WalletAddress::new)
        .context("--owner is required")?;

    let plan = ExecutionPlanner::new(config.planner.clone()).generate(owner, stake, txs)?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Plan {}", plan.id);
    println!("  Owner:          {}", plan.owner);
    println!("  Total stake:    {}", plan.total_stake);
    println!("  Transactions:   {}", plan.num_transactions);
    println!("  Estimated gas:  {}", plan.estimated_gas_cost);
    println!("  Execution time: {}", plan.total_execution_time);
    println!();
    for (index, step) in plan.transaction_sequence.iter().enumerate() {
        let what = match step.kind {
            sg_plan::StepKind::Stake { amount } => format!("stake {amount}"),
            sg_plan::StepKind::Unstake { percentage } => format!("unstake {percentage}%"),
        };
        println!(
            "  {index:>2}. {what:<24} after {:>3}s  (t+{})",
            step.delay_secs,
            sg_plan::format_duration(step.execute_at_secs)
        );
    }
    Ok(())
}

fn status(config: &EngineConfig) -> Result<()> {
    let environment = RuntimeEnvironment::detect();
    let backend = FileBackend::open(&config.storage.dir)
        .with_context(|| format!("opening {}", config.storage.dir.display()))?;
    let store = config.vault.open_store(&environment, Arc::new(backend))?;
    let session = Session::open(store, environment)?;
    println!("{}", serde_json::to_string_pretty(&session.security_status())?);
    Ok(())
}

/// In-memory store under a random per-run key; never reads or writes the
/// configured key source
fn simulation_store(vault: &VaultConfig) -> SecureStore {
    let mut secret = Zeroizing::new([0u8; 32]);
    rand::rng().fill_bytes(&mut *secret);
    let crypto = CryptoBox::new(
        KeyDeriver::new(vault.kdf_iterations),
        Arc::new(StaticPassphrase::new(&*secret)),
    );
    SecureStore::new(vault.namespace.clone(), crypto, Arc::new(MemoryBackend::new()))
}

async fn simulate(mut config: EngineConfig, args: &ArgMatches) -> Result<()> {
    let stake = *args.get_one::<Amount>("stake").context("--stake is required")?;
    let txs = args.get_one::<u32>("txs").copied().unwrap_or(4);
    config.scheduler.time_scale = args.get_one::<f64>("speed").copied().unwrap_or(60.0);

    let mut client = SimulatedClient::new();
    if let Some(index) = args.get_one::<usize>("fail-at") {
        client = client.with_fail_at(*index);
    }

    let session = Session::open(simulation_store(&config.vault), RuntimeEnvironment::detect())?;
    let scheduler = ExecutionScheduler::from_config(session.store().clone(), Arc::new(client), &config);
    let ctx = WalletContext::new(WalletAddress::new("0xsimulated"), "0xstaking");

    let mut events = scheduler.subscribe();
    let plan = scheduler.create_plan(&ctx, PlanRequest::new(stake, txs)).await?;
    println!(
        "Simulating plan {} ({} steps, {} at 1x, speed {}x)",
        plan.id, plan.num_transactions, plan.total_execution_time, config.scheduler.time_scale
    );
    scheduler.approve(&ctx).await?;
    scheduler.start(&ctx).await?;

    loop {
        match events.recv().await {
            Ok(event) => {
                println!("  {}", event.kind);
                if event.kind.ends_run() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    scheduler.join(&ctx).await;

    for entry in session.history(&ctx.owner)?.iter().rev() {
        println!("  {} {} {}", entry.kind, entry.amount, entry.hash);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("plan", args)) => plan(&config, args),
        Some(("status", _)) => status(&config),
        Some(("simulate", args)) => simulate(config, args).await,
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
