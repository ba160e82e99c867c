use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rsc_node::{logging, NodeConfig, RscEngine, Scheduler};
use rsc_economics::PendingResolution;
use rsc_types::{RscAmount, UserId, WithdrawalId};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG: &str = "./rsc-config.toml";

#[derive(Parser)]
#[command(name = "rsc-node")]
#[command(about = "RSC ledger node: balances, bounties, withdrawals and staking", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data directory holding the ledger file
    #[arg(short, long, env = "RSC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job scheduler until Ctrl-C
    Start,

    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,
    },

    /// Show a user's balances
    Balance { user: u64 },

    /// Show a user's staking summary
    Staking { user: u64 },

    /// Grant a plain reward to a user
    Grant { user: u64, amount: RscAmount },

    /// Credit an on-chain deposit
    Deposit {
        user: u64,
        amount: RscAmount,
        #[arg(long)]
        tx_hash: String,
        #[arg(long, default_value = "")]
        from: String,
    },

    /// Withdraw to an on-chain address
    Withdraw {
        user: u64,
        amount: RscAmount,
        #[arg(long)]
        to: String,
    },

    /// List withdrawals still awaiting a bridge outcome
    PendingWithdrawals,

    /// Settle or refund a withdrawal stuck in PENDING
    ResolveWithdrawal {
        id: u64,
        /// Hash of the on-chain transfer; marks the withdrawal paid
        #[arg(long, conflicts_with = "failed")]
        tx_hash: Option<String>,
        /// Reason the transfer never happened; refunds the user
        #[arg(long)]
        failed: Option<String>,
    },

    /// Take the daily staking snapshot
    Snapshot {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run the weekly staking distribution
    Distribute {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Credit users missing from a completed staking cycle
    Reconcile {
        #[arg(long)]
        date: NaiveDate,
    },

    /// Expire overdue bounties and refund their escrow
    ExpireBounties,

    /// Check every user's lots against their unlocked balance
    Audit,
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    // CLI args > env vars > config file > defaults
    let mut config = if let Some(path) = &cli.config {
        NodeConfig::from_file(path)?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        NodeConfig::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        NodeConfig::default()
    };
    config.apply_env_overrides();
    if let Some(data_dir) = &cli.data_dir {
        config.node.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (ignore if it doesn't)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if config.logging.show_boot_banner
        && matches!(cli.command, Commands::Start)
        && std::env::var("RUST_LOG").is_err()
    {
        logging::display_boot_banner(env!("CARGO_PKG_VERSION"));
    }
    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Commands::Init { output } = &cli.command {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        NodeConfig::default().save_to_file(output)?;
        info!(path = %output.display(), "🧬 Wrote default configuration");
        return Ok(());
    }

    let engine = Arc::new(RscEngine::open(&config).await?);
    let ledger_path = config.ledger_path();
    let today = engine.now().date_naive();

    let mutated = match cli.command {
        Commands::Init { .. } => false,
        Commands::Start => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                data_dir = %config.node.data_dir.display(),
                scheduler = config.scheduler.enabled,
                "🚀 Starting RSC node"
            );
            if config.scheduler.enabled {
                let scheduler = Scheduler::new(engine.clone(), &config)?;
                scheduler
                    .run(async {
                        let _ = tokio::signal::ctrl_c().await;
                    })
                    .await;
            } else {
                tokio::signal::ctrl_c().await?;
            }
            info!("🛑 Shutting down gracefully");
            true
        }
        Commands::Balance { user } => {
            let user = UserId(user);
            let total = engine.get_balance(user).await?;
            let withdrawable = engine.get_withdrawable_balance(user).await?;
            let locked = engine.economics.balances.get_locked_balance(user).await?;
            let credits = engine.economics.credits.get_balance(user).await?;
            let usd = engine.get_balance_usd(user).await?;
            print_json(&serde_json::json!({
                "user_id": user,
                "balance": total,
                "withdrawable": withdrawable,
                "locked": locked,
                "funding_credits": credits,
                "balance_usd": usd,
            }))?;
            false
        }
        Commands::Staking { user } => {
            print_json(&engine.get_staking_summary(UserId(user)).await?)?;
            false
        }
        Commands::Grant { user, amount } => {
            print_json(&engine.grant_reward(UserId(user), amount).await?)?;
            true
        }
        Commands::Deposit {
            user,
            amount,
            tx_hash,
            from,
        } => {
            print_json(&engine.record_deposit(UserId(user), amount, &tx_hash, &from).await?)?;
            true
        }
        Commands::Withdraw { user, amount, to } => {
            // a failed transfer is compensated on the ledger before the error surfaces
            let result = engine.request_withdrawal(UserId(user), amount, &to).await;
            engine.persist(&ledger_path).await?;
            print_json(&result?)?;
            false
        }
        Commands::PendingWithdrawals => {
            print_json(&engine.pending_withdrawals().await?)?;
            false
        }
        Commands::ResolveWithdrawal {
            id,
            tx_hash,
            failed,
        } => {
            let resolution = match (tx_hash, failed) {
                (Some(transaction_hash), None) => PendingResolution::Paid { transaction_hash },
                (None, Some(reason)) => PendingResolution::Failed { reason },
                _ => anyhow::bail!("pass exactly one of --tx-hash or --failed"),
            };
            print_json(&engine.reconcile_withdrawal(WithdrawalId(id), resolution).await?)?;
            true
        }
        Commands::Snapshot { date } => {
            let run = engine.run_daily_snapshot(date.unwrap_or(today)).await?;
            println!(
                "snapshot {}: {} created, {} existing, {} below minimum, {} failed",
                date.unwrap_or(today),
                run.created,
                run.already_present,
                run.below_minimum,
                run.failed
            );
            true
        }
        Commands::Distribute { date } => {
            let record = engine.run_weekly_distribution(date.unwrap_or(today)).await;
            // a failed cycle is recorded as FAILED and must be persisted too
            engine.persist(&ledger_path).await?;
            print_json(&record?)?;
            false
        }
        Commands::Reconcile { date } => {
            let report = engine.reconcile_staking_cycle(date).await?;
            for (user, amount) in &report.topped_up {
                println!("topped up {} with {}", user, amount);
            }
            println!("{} eligible, {} topped up", report.eligible, report.topped_up.len());
            !report.topped_up.is_empty()
        }
        Commands::ExpireBounties => {
            let sweep = engine.expire_bounties().await?;
            println!("{} expired, {} failed", sweep.expired.len(), sweep.failed.len());
            for (bounty, reason) in &sweep.failed {
                println!("  {}: {}", bounty, reason);
            }
            true
        }
        Commands::Audit => {
            let mismatches = engine.audit_lots().await?;
            if mismatches.is_empty() {
                println!("✅ lots match unlocked balances for every user");
            }
            for m in &mismatches {
                println!(
                    "❌ {}: unlocked {} but lots hold {}",
                    m.user_id, m.unlocked_balance, m.lot_total
                );
            }
            false
        }
    };

    if mutated {
        engine
            .persist(&ledger_path)
            .await
            .with_context(|| format!("saving ledger to {}", ledger_path.display()))?;
    }
    Ok(())
}
