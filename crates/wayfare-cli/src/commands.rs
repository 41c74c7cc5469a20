use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use wayfare_server::{WayfareConfig, WayfareServer};
use wayfare_types::Money;
use wayfare_wallet::{SyncMode, WalletLedger, JOURNAL_FILE};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::CheckConfig(args) => cmd_check_config(args, cli.format),
        Command::ReplayWallets(args) => cmd_replay_wallets(args, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WayfareConfig> {
    match path {
        Some(path) => WayfareConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(WayfareConfig::default()),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    debug!(?config, "configuration loaded");
    if !args.in_memory {
        bail!("this build has no remote ledger connector; run with --in-memory");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(async move {
        let server = WayfareServer::in_memory(config).await?;
        println!(
            "{} Wayfare listening on {} ({})",
            "✓".green().bold(),
            server.config().server.bind_addr.to_string().bold(),
            "in-memory ledger".yellow()
        );
        server.serve().await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_check_config(args: CheckConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(Some(&args.config))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!("{} {} is valid", "✓".green().bold(), args.config.display());
            println!("  Bind: {}", config.server.bind_addr.to_string().bold());
            println!(
                "  Tokens: {} admin, {} user",
                config.server.admin_tokens.len(),
                config.server.tokens.len()
            );
            println!(
                "  Ledger: {}/{} as {} (timeout {} ms)",
                config.ledger.channel.cyan(),
                config.ledger.chaincode.cyan(),
                config.ledger.service_identity.yellow(),
                config.ledger.call_timeout_ms
            );
            match config.wallet.journal_path() {
                Some(path) => println!("  Wallets: {}", path.display()),
                None => println!("  Wallets: {}", "in memory".yellow()),
            }
            println!(
                "  Policy: fee {}, starting balance {}",
                config.policy.cancellation_fee, config.policy.starting_balance
            );
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletSummary {
    user_id: String,
    balance: Money,
    entries: usize,
    consistent: bool,
}

fn summarize(ledger: &WalletLedger) -> anyhow::Result<Vec<WalletSummary>> {
    Ok(ledger
        .wallets()?
        .into_iter()
        .map(|w| WalletSummary {
            consistent: w.is_consistent(),
            entries: w.transactions.len(),
            balance: w.balance,
            user_id: w.user_id.to_string(),
        })
        .collect())
}

fn cmd_replay_wallets(args: ReplayWalletsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let path = args.data_dir.join(JOURNAL_FILE);
    if !path.exists() {
        bail!("no wallet journal at {}", path.display());
    }
    // Starting balances come from the journal; this one is never used.
    let ledger = WalletLedger::open(&path, Money::ZERO, SyncMode::OsDefault)
        .with_context(|| format!("replaying {}", path.display()))?;
    let wallets = summarize(&ledger)?;
    let compaction = if args.compact { ledger.compact()? } else { None };

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "journal": path.display().to_string(),
                "wallets": wallets,
                "compaction": compaction.map(|s| serde_json::json!({
                    "records": s.records,
                    "bytesBefore": s.bytes_before,
                    "bytesAfter": s.bytes_after,
                })),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Journal {}: {} wallets", path.display(), wallets.len());
            for w in &wallets {
                let mark = if w.consistent {
                    "✓".green()
                } else {
                    "✗".red()
                };
                println!(
                    "  {} {:<24} {:>12}  ({} entries)",
                    mark,
                    w.user_id.bold(),
                    w.balance.to_string(),
                    w.entries
                );
            }
            if let Some(stats) = compaction {
                println!(
                    "{} Compacted: {} records kept, {} -> {} bytes",
                    "✓".green(),
                    stats.records,
                    stats.bytes_before,
                    stats.bytes_after
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_types::{BookingId, IdempotencyKey, UserId};

    #[tokio::test]
    async fn summary_reflects_replayed_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let alice = UserId::new("alice").unwrap();
        let booking = BookingId::new("booking_1").unwrap();
        {
            let ledger =
                WalletLedger::open(&path, Money::from(1000), SyncMode::EveryWrite).unwrap();
            ledger.deposit(&alice, Money::from(25)).await.unwrap();
            ledger
                .debit(
                    &alice,
                    &booking,
                    Money::from(100),
                    &IdempotencyKey::booking_payment(&booking, 0),
                )
                .await
                .unwrap();
        }

        let ledger = WalletLedger::open(&path, Money::ZERO, SyncMode::OsDefault).unwrap();
        let wallets = summarize(&ledger).unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].user_id, "alice");
        assert_eq!(wallets[0].balance, Money::from(925));
        assert_eq!(wallets[0].entries, 2);
        assert!(wallets[0].consistent);
    }

    #[test]
    fn replay_without_journal_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = ReplayWalletsArgs {
            data_dir: dir.path().to_path_buf(),
            compact: false,
        };
        assert!(cmd_replay_wallets(args, OutputFormat::Text).is_err());
        assert!(!dir.path().join(JOURNAL_FILE).exists());
    }

    #[test]
    fn serve_needs_in_memory() {
        let args = ServeArgs {
            config: None,
            bind: None,
            in_memory: false,
        };
        assert!(cmd_serve(args).is_err());
    }
}
