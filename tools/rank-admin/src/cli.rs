//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use rank_ledger::{CleanupCriteria, StorageBackend};

/// Rank Ledger admin tool
#[derive(Parser, Debug)]
#[command(name = "rank-admin")]
#[command(about = "Inspect and repair rank sets, manage pending purchases")]
pub struct Args {
    /// Storage backend (memory, file, relational). Overrides RANK_LEDGER_BACKEND
    #[arg(short, long, global = true)]
    pub backend: Option<StorageBackend>,

    /// Data directory for the file backend. Overrides RANK_LEDGER_DATA_DIR
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// SQLite URL for the relational backend, e.g. sqlite://ranks.db.
    /// Overrides RANK_LEDGER_DATABASE_URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Log filter, e.g. "debug" or "rank_ledger=trace"
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the ranks owned by a Minecraft username
    Ranks { username: String },

    /// Grant a rank (plain or `source_to_destination`) to a username
    Grant { username: String, rank_id: String },

    /// List pending purchases
    Pending,

    /// Record a pending purchase
    AddPending {
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        rank_id: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        user_id: String,
        /// Start time as epoch milliseconds or RFC 3339 (default: now)
        #[arg(long)]
        timestamp: Option<String>,
        /// Gift recipient
        #[arg(long)]
        gift_to: Option<String>,
    },

    /// Remove one pending purchase by session id, or by rank and username
    RemovePending {
        session_id: String,
        #[arg(long)]
        rank_id: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },

    /// Remove pending purchases matching every given criterion
    Sweep {
        #[command(flatten)]
        criteria: SweepArgs,
        /// Report matches without removing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Reconcile stored rank sets, merging mixed-case duplicates
    Repair {
        /// Repair only this username
        #[arg(long)]
        username: Option<String>,
    },

    /// Apply a verified payment and clean up its pending record
    Fulfill {
        session_id: String,
        #[arg(long)]
        rank_id: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },

    /// List Minecraft accounts linked to a site user
    Accounts { user_id: String },

    /// Link a Minecraft account to a site user
    Link { user_id: String, username: String },

    /// Unlink a Minecraft account from a site user
    Unlink { user_id: String, username: String },

    /// Reconcile rank tokens without touching storage
    Reconcile {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

impl Command {
    /// Does the command read or write the store?
    pub fn uses_store(&self) -> bool {
        !matches!(self, Command::Reconcile { .. })
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct SweepArgs {
    #[arg(long)]
    pub session_id: Option<String>,
    #[arg(long)]
    pub rank_id: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub user_id: Option<String>,
    #[arg(long)]
    pub older_than_hours: Option<u64>,
}

impl From<SweepArgs> for CleanupCriteria {
    fn from(args: SweepArgs) -> Self {
        CleanupCriteria {
            session_id: args.session_id,
            rank_id: args.rank_id,
            minecraft_username: args.username,
            user_id: args.user_id,
            older_than_hours: args.older_than_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sweep() {
        let args = Args::parse_from([
            "rank-admin",
            "--backend",
            "file",
            "-d",
            "/tmp/ranks",
            "sweep",
            "--rank-id",
            "vip",
            "--older-than-hours",
            "24",
            "--dry-run",
        ]);
        assert_eq!(args.backend, Some(StorageBackend::File));
        match args.command {
            Command::Sweep { criteria, dry_run } => {
                assert!(dry_run);
                let criteria = CleanupCriteria::from(criteria);
                assert_eq!(criteria.rank_id.as_deref(), Some("vip"));
                assert_eq!(criteria.older_than_hours, Some(24));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = Args::try_parse_from(["rank-admin", "--backend", "redis", "repair"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_repair_single_user() {
        let args = Args::parse_from(["rank-admin", "repair", "--username", "Steve"]);
        match args.command {
            Command::Repair { username } => assert_eq!(username.as_deref(), Some("Steve")),
            other => panic!("unexpected command {:?}", other),
        }
        let args = Args::parse_from(["rank-admin", "repair"]);
        assert!(matches!(args.command, Command::Repair { username: None }));
    }

    #[test]
    fn test_parse_database_url() {
        let args = Args::parse_from([
            "rank-admin",
            "-b",
            "relational",
            "--database-url",
            "sqlite://ranks.db",
            "pending",
        ]);
        assert_eq!(args.database_url.as_deref(), Some("sqlite://ranks.db"));
        assert!(args.command.uses_store());
    }

    #[test]
    fn test_reconcile_requires_tokens() {
        assert!(Args::try_parse_from(["rank-admin", "reconcile"]).is_err());
    }
}
