//! Leafswap Scenario Simulator
//!
//! Boots an in-process exchange from configuration, replays a scenario and
//! writes every step result and exchange event to stdout as JSON lines.

mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use leafswap_config::load_config;
use leafswap_types::ExchangeError;
use scenario::{Runner, Scenario};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Exchange configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to replay; the built-in demo runs when omitted
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Stop at the first rejected step
    #[arg(long)]
    fail_fast: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(default_filter: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr so stdout stays a clean JSON-lines stream
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.log_level, args.json_logs);

    info!("Starting leafswap-sim");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let scenario = match &args.scenario {
        Some(path) => Scenario::from_file(path)?,
        None => {
            info!("No scenario given, replaying built-in demo");
            Scenario::demo()?
        }
    };

    let runner = Runner::new(config, &scenario.owner)?;
    let events = runner.exchange().subscribe();
    let mut rejected = 0usize;

    for (index, step) in scenario.steps.iter().enumerate() {
        let report = match runner.run_step(step) {
            Ok(result) => json!({ "step": index, "action": step.action(), "result": result }),
            Err(err) => {
                let Some(reason) = err.downcast_ref::<ExchangeError>() else {
                    error!("Step {} ({}) is malformed: {:#}", index, step.action(), err);
                    return Err(err.context(format!("step {index}")));
                };
                warn!("Step {} ({}) rejected: {}", index, step.action(), reason);
                rejected += 1;
                let report = json!({ "step": index, "action": step.action(), "error": reason.to_string() });
                if args.fail_fast {
                    println!("{report}");
                    anyhow::bail!("step {} rejected: {}", index, reason);
                }
                report
            }
        };
        println!("{report}");

        for event in events.try_iter() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    let exchange = runner.exchange();
    for index in 0..exchange.factory().all_pairs_length() {
        if let Some(pair) = exchange.factory().all_pairs(index) {
            let state = pair.snapshot(exchange.config().lock_timeout())?;
            let (reserve0, reserve1) = state.reserves();
            info!(
                "{}: reserves {} / {}, {} shares",
                state.id,
                reserve0,
                reserve1,
                state.total_shares()
            );
        }
    }
    info!("Ledger: {:?}", exchange.ledger().stats());
    info!("MEV guard: {:?}", exchange.mev().stats());
    info!(
        "Replayed {} steps, {} rejected",
        scenario.steps.len(),
        rejected
    );

    Ok(())
}
