use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::application::{ReportMaterializer, TransactionEngine};
use crate::config::LedgerConfig;
use crate::domain::{Account, EntryKind, OrderState, order_state};
use crate::storage::Repository;

/// Holdbook - balance ledger with reservations
#[derive(Parser)]
#[command(name = "holdbook")]
#[command(about = "Per-user balances kept as an append-only ledger of credits, holds and releases")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "HOLDBOOK_DATABASE", default_value = LedgerConfig::DEFAULT_DATABASE, global = true)]
    pub database: PathBuf,

    /// Directory generated reports are written to
    #[arg(long, env = "HOLDBOOK_REPORTS_DIR", default_value = LedgerConfig::DEFAULT_REPORTS_DIR, global = true)]
    pub reports_dir: PathBuf,

    /// Maximum pooled database connections
    #[arg(long, env = "HOLDBOOK_MAX_CONNECTIONS", default_value_t = LedgerConfig::DEFAULT_MAX_CONNECTIONS, global = true)]
    pub max_connections: u32,

    /// Seconds to wait for an account lock before giving up
    #[arg(long, env = "HOLDBOOK_BUSY_TIMEOUT", default_value_t = LedgerConfig::DEFAULT_BUSY_TIMEOUT_SECS, global = true)]
    pub busy_timeout: u64,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Credit money to a user's balance
    Replenish {
        #[arg(long)]
        user: i64,

        /// Amount in minor units
        #[arg(long)]
        amount: i64,
    },

    /// Reserve money for an order
    Reserve {
        #[arg(long)]
        user: i64,

        /// Amount in minor units
        #[arg(long)]
        amount: i64,

        #[arg(long)]
        order: i64,

        #[arg(long)]
        service: i64,
    },

    /// Settle a reservation by releasing its hold
    Withdraw {
        #[arg(long)]
        user: i64,

        /// Amount in minor units; must match the reservation
        #[arg(long)]
        amount: i64,

        #[arg(long)]
        order: i64,

        #[arg(long)]
        service: i64,
    },

    /// Show balance and reserved amount for a user
    Balance {
        #[arg(long)]
        user: i64,
    },

    /// List ledger entries for a user
    History {
        #[arg(long)]
        user: i64,
    },

    /// Generate (or reuse) the monthly per-service report
    Report {
        /// Month (1-12)
        #[arg(long)]
        month: u32,

        /// Year (0-9999)
        #[arg(long)]
        year: i32,
    },

    /// Verify ledger integrity
    Check,
}

impl Cli {
    /// Install the global tracing subscriber. `RUST_LOG` wins over `--verbose`.
    pub fn init_tracing(&self) {
        let default_level = if self.verbose {
            "holdbook=debug"
        } else {
            "holdbook=info"
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn config(&self) -> LedgerConfig {
        LedgerConfig::new(&self.database, &self.reports_dir)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_secs(self.busy_timeout))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();
        let repo = Repository::init(&config).await?;
        let engine = TransactionEngine::new(repo.clone());

        let outcome = self.dispatch(&config, &repo, &engine).await;
        repo.close().await;
        outcome
    }

    async fn dispatch(
        &self,
        config: &LedgerConfig,
        repo: &Repository,
        engine: &TransactionEngine,
    ) -> Result<()> {
        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", config.database_path.display());
            }

            Commands::Replenish { user, amount } => {
                let account = engine.replenish(user, amount).await?;
                self.print_account("Replenished", account)?;
            }

            Commands::Reserve {
                user,
                amount,
                order,
                service,
            } => {
                let account = engine.reserve(user, amount, order, service).await?;
                self.print_account("Reserved", account)?;
            }

            Commands::Withdraw {
                user,
                amount,
                order,
                service,
            } => {
                let account = engine.withdraw(user, amount, order, service).await?;
                self.print_account("Withdrawn", account)?;
            }

            Commands::Balance { user } => {
                let balance = engine.get_balance(user).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&balance)?);
                } else {
                    println!("User:     {}", balance.id);
                    println!("Balance:  {}", balance.balance);
                    println!("Reserved: {}", balance.reserved);
                }
            }

            Commands::History { user } => {
                let entries = engine.history(user).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else if entries.is_empty() {
                    println!("No ledger entries found.");
                } else {
                    println!(
                        "{:<8} {:<20} {:<18} {:>12} {:>8} {:>8} {:<9}",
                        "ID", "DATE", "KIND", "AMOUNT", "SERVICE", "ORDER", "STATE"
                    );
                    println!("{}", "-".repeat(89));
                    for entry in &entries {
                        let state = entry
                            .order_ref()
                            .map(|order| order_state(order, &entries).as_str())
                            .unwrap_or("-");
                        println!(
                            "{:<8} {:<20} {:<18} {:>12} {:>8} {:>8} {:<9}",
                            entry.id,
                            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                            entry.kind().as_str(),
                            entry.amount,
                            optional(entry.service_id),
                            optional(entry.order_id),
                            state,
                        );
                    }
                    let holds: Vec<_> = entries
                        .iter()
                        .filter(|e| e.kind() == EntryKind::Hold)
                        .filter_map(|e| e.order_ref())
                        .collect();
                    let open = holds
                        .iter()
                        .filter(|order| order_state(**order, &entries) == OrderState::Reserved)
                        .count();
                    println!(
                        "\n{} entries, {} reservations, {} open",
                        entries.len(),
                        holds.len(),
                        open
                    );
                }
            }

            Commands::Report { month, year } => {
                let materializer = ReportMaterializer::new(repo.clone(), &config.reports_dir);
                let artifact = materializer.generate_report(month, year).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&artifact)?);
                } else {
                    println!("{}", artifact.file_path);
                }
            }

            Commands::Check => {
                println!("Checking ledger integrity...\n");
                let report = engine.check_integrity().await?;

                println!("Accounts: {}", report.account_count);
                println!("Entries:  {}", report.entry_count);
                println!();

                if report.is_healthy() {
                    println!("Ledger is consistent.");
                } else {
                    println!("Issues found:");
                    for issue in &report.issues {
                        println!("  - {}", issue);
                    }
                    anyhow::bail!("Ledger integrity check failed");
                }
            }
        }

        Ok(())
    }

    fn print_account(&self, action: &str, account: Account) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&account)?);
        } else {
            println!("{}: user {}, balance {}", action, account.id, account.balance);
        }
        Ok(())
    }
}

fn optional(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reserve() {
        let cli = Cli::try_parse_from([
            "holdbook",
            "--database",
            "ledger.db",
            "reserve",
            "--user",
            "1",
            "--amount",
            "40",
            "--order",
            "5",
            "--service",
            "9",
        ])
        .unwrap();

        assert_eq!(cli.database, PathBuf::from("ledger.db"));
        assert!(matches!(
            cli.command,
            Commands::Reserve {
                user: 1,
                amount: 40,
                order: 5,
                service: 9
            }
        ));
    }

    #[test]
    fn test_config_from_flags() {
        let cli = Cli::try_parse_from([
            "holdbook",
            "--reports-dir",
            "out",
            "--max-connections",
            "8",
            "--busy-timeout",
            "2",
            "check",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.reports_dir, PathBuf::from("out"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_secs(2));
    }
}
