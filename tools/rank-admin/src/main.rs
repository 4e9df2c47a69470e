//! rank-admin: Rank Ledger admin tool
//!
//! Runs store-level operations against the configured backend and prints
//! results as JSON. Logs go to stderr.

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rank_ledger::{
    reconcile_tokens, CleanupCriteria, DynRankLedger, LedgerConfig, PendingPurchase,
    PurchaseTimestamp, RankLedgerApi, StorageBackend, VerifiedPurchase,
};

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    init_logging(&config.log_filter)?;
    debug!("config: {:?}", config);

    ensure_durable(&config, &args.command)?;

    let ledger = rank_ledger::open(config)
        .await
        .context("failed to open rank ledger")?;
    run(&ledger, args.command).await
}

/// Refuse store commands on a backend that forgets everything on exit.
fn ensure_durable(config: &LedgerConfig, command: &Command) -> Result<()> {
    if command.uses_store() && config.is_ephemeral() {
        bail!(
            "the {} backend keeps nothing after this command exits; \
             choose a durable store with --data-dir, or with --backend relational \
             and --database-url (or the matching RANK_LEDGER_* variables)",
            config.backend
        );
    }
    Ok(())
}

/// Environment first, then command-line overrides.
fn load_config(args: &Args) -> Result<LedgerConfig> {
    let mut config = LedgerConfig::from_env().context("invalid RANK_LEDGER_* environment")?;

    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
        if args.backend.is_none() {
            config.backend = StorageBackend::File;
        }
    }
    if let Some(url) = &args.database_url {
        config.database_url = Some(url.clone());
        if args.backend.is_none() && args.data_dir.is_none() {
            config.backend = StorageBackend::Relational;
        }
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(filter) = &args.log {
        config.log_filter = filter.clone();
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<PurchaseTimestamp> {
    if let Ok(ms) = raw.trim().parse::<i64>() {
        return Ok(PurchaseTimestamp::EpochMillis(ms));
    }
    let parsed = chrono::DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("timestamp '{}' is neither epoch millis nor RFC 3339", raw))?;
    Ok(PurchaseTimestamp::from_datetime(parsed.with_timezone(&chrono::Utc)))
}

async fn run(ledger: &Arc<DynRankLedger>, command: Command) -> Result<()> {
    match command {
        Command::Ranks { username } => {
            print_json(&ledger.get_rank_set(&username).await)?;
        }

        Command::Grant { username, rank_id } => {
            let ranks = ledger
                .try_save_rank(&username, &rank_id)
                .await
                .with_context(|| format!("failed to grant {} to {}", rank_id, username))?;
            info!("granted {} to {}", rank_id, username);
            print_json(&ranks)?;
        }

        Command::Pending => {
            print_json(&ledger.get_pending_purchases().await)?;
        }

        Command::AddPending {
            session_id,
            rank_id,
            username,
            user_id,
            timestamp,
            gift_to,
        } => {
            let mut purchase = PendingPurchase::new(session_id, rank_id, username, user_id);
            if let Some(raw) = timestamp {
                purchase = purchase.at(parse_timestamp(&raw)?);
            }
            if let Some(recipient) = gift_to {
                purchase = purchase.gifted_to(recipient);
            }
            if !ledger.add_pending_purchase(purchase.clone()).await {
                bail!("failed to record pending purchase {}", purchase.session_id);
            }
            print_json(&purchase)?;
        }

        Command::RemovePending {
            session_id,
            rank_id,
            username,
        } => {
            let outcome = ledger
                .remove_pending_purchase(&session_id, rank_id.as_deref(), username.as_deref())
                .await;
            print_json(&outcome)?;
            if !outcome.success {
                bail!(outcome.message);
            }
        }

        Command::Sweep { criteria, dry_run } => {
            let criteria = CleanupCriteria::from(criteria);
            let report = ledger.sweep_pending(&criteria, dry_run).await?;
            print_json(&report)?;
        }

        Command::Repair { username: None } => {
            let report = ledger.repair_rank_sets().await?;
            print_json(&report)?;
        }

        Command::Repair {
            username: Some(username),
        } => {
            let change = ledger.repair_rank_set(&username).await?;
            if change.is_none() {
                info!("nothing to repair for {}", username);
            }
            print_json(&change)?;
        }

        Command::Fulfill {
            session_id,
            rank_id,
            username,
        } => {
            let verified = VerifiedPurchase {
                session_id,
                rank_id,
                minecraft_username: username,
                user_id: None,
            };
            let receipt = ledger.fulfill(verified).await?;
            let cleanup = receipt.cleanup.wait().await;
            print_json(&serde_json::json!({
                "ranksGranted": receipt.ranks_granted,
                "rankId": receipt.rank_id,
                "minecraftUsername": receipt.minecraft_username,
                "ranks": receipt.ranks,
                "cleanup": cleanup,
            }))?;
            if !receipt.ranks_granted {
                bail!("rank was not granted");
            }
        }

        Command::Accounts { user_id } => {
            print_json(&ledger.linked_accounts(&user_id).await)?;
        }

        Command::Link { user_id, username } => {
            print_json(&ledger.link_account(&user_id, &username).await?)?;
        }

        Command::Unlink { user_id, username } => {
            print_json(&ledger.unlink_account(&user_id, &username).await?)?;
        }

        Command::Reconcile { tokens } => {
            print_json(&reconcile_tokens(&tokens))?;
        }
    }

    Ok(())
}
