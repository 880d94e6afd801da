//! Warden CLI - Main entry point

mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_foundation::{EntityKind, PrivilegeValue, Tier};

/// Warden - inspect and manage entity privileges
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Database file (overrides storage.dbPath from the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Explicit config file instead of the global + project config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a user holds a tier on an entity
    Check {
        #[arg(long)]
        user: String,
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: String,
        /// view, edit, trash, restore or full_access
        #[arg(long, default_value = "view")]
        tier: Tier,
    },
    /// List the entities of a kind on which a user holds a tier
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        kind: EntityKind,
        #[arg(long, default_value = "view")]
        tier: Tier,
        /// Include trashed entities
        #[arg(long)]
        include_trashed: bool,
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show the merged privileges of every user on an entity
    Privileges {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: String,
        /// Only show the entry visible to this user (requires view)
        #[arg(long)]
        actor: Option<String>,
    },
    /// Create or replace a direct privilege record
    Grant {
        /// User performing the change (needs full access)
        #[arg(long)]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: String,
        /// allow, deny or neutral
        #[arg(long)]
        full_access: Option<PrivilegeValue>,
        #[arg(long)]
        view: Option<PrivilegeValue>,
        #[arg(long)]
        edit: Option<PrivilegeValue>,
        #[arg(long)]
        trash: Option<PrivilegeValue>,
        #[arg(long)]
        restore: Option<PrivilegeValue>,
    },
    /// Remove a direct privilege record
    Revoke {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: String,
    },
    /// Give every protected entity without a full-access holder back to its creator
    Repair {
        /// Keep running on the configured interval until Ctrl-C
        #[arg(short, long)]
        watch: bool,
        /// Interval in seconds (overrides repair.intervalSecs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let app = cli::App::open(args.config.as_deref(), args.db)?;

    match args.command {
        Command::Check {
            user,
            kind,
            id,
            tier,
        } => app.check(&user, kind, &id, tier),
        Command::List {
            user,
            kind,
            tier,
            include_trashed,
            limit,
        } => app.list(&user, kind, tier, include_trashed, limit),
        Command::Privileges { kind, id, actor } => app.privileges(kind, &id, actor.as_deref()),
        Command::Grant {
            actor,
            user,
            kind,
            id,
            full_access,
            view,
            edit,
            trash,
            restore,
        } => {
            let values = [
                (Tier::FullAccess, full_access),
                (Tier::View, view),
                (Tier::Edit, edit),
                (Tier::Trash, trash),
                (Tier::Restore, restore),
            ];
            app.grant(&actor, &user, kind, &id, &values)
        }
        Command::Revoke {
            actor,
            user,
            kind,
            id,
        } => app.revoke(&actor, &user, kind, &id),
        Command::Repair { watch, interval } => {
            if watch {
                app.repair_watch(interval).await
            } else {
                app.repair_once()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_check() {
        let args = Args::try_parse_from([
            "warden", "--db", "/tmp/w.db", "check", "--user", "u1", "--kind", "task", "--id", "t1",
            "--tier", "edit",
        ])
        .unwrap();
        assert_eq!(args.db, Some(PathBuf::from("/tmp/w.db")));
        match args.command {
            Command::Check { kind, tier, .. } => {
                assert_eq!(kind, EntityKind::Task);
                assert_eq!(tier, Tier::Edit);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_grant_values() {
        let args = Args::try_parse_from([
            "warden", "grant", "--actor", "a", "--user", "b", "--kind", "labbook", "--id", "l1",
            "--view", "allow", "--trash", "deny",
        ])
        .unwrap();
        match args.command {
            Command::Grant {
                view, trash, edit, ..
            } => {
                assert_eq!(view, Some(PrivilegeValue::Allow));
                assert_eq!(trash, Some(PrivilegeValue::Deny));
                assert_eq!(edit, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tier_is_rejected() {
        let result = Args::try_parse_from([
            "warden", "list", "--user", "u1", "--kind", "task", "--tier", "own",
        ]);
        assert!(result.is_err());
    }
}
