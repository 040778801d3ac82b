use std::{fs, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use portfolio_import::{
    api::FmpApi,
    categorize::Category,
    config::ImportConfig,
    db::SqliteStore,
    executor::ImportExecutor,
    ledger,
    resolver::SymbolResolver,
    session::{ImportProgress, ImportSession},
    store::PortfolioStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portfolio-import", about = "Import brokerage statements into a portfolio ledger")]
struct Cli {
    /// SQLite database file; overrides PORTFOLIO_DB.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, resolve and import a statement file.
    Import {
        file: String,
        #[arg(long)]
        portfolio: i64,
        /// Platform label stored on imported assets and transactions.
        #[arg(long)]
        platform: String,
        /// Broker name used to pick the statement dialect.
        #[arg(long)]
        hint: Option<String>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Stop after resolution and print the review.
        #[arg(long)]
        dry_run: bool,
    },
    /// Positions reconciled from the ledger.
    Positions {
        #[arg(long)]
        portfolio: i64,
    },
    /// Delete one ledger transaction and re-sync its position.
    DeleteTx { id: i64 },
    /// List or create portfolios.
    Portfolios {
        #[arg(long, default_value = "default")]
        owner: String,
        #[arg(long)]
        create: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portfolio_import=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ImportConfig::from_env()?;
    if let Some(database) = cli.database {
        config.database_path = shellexpand::tilde(&database).into_owned();
    }

    let store = Arc::new(SqliteStore::connect(&config.database_path).await?);

    match cli.command {
        Command::Import {
            file,
            portfolio,
            platform,
            hint,
            concurrency,
            timeout_secs,
            dry_run,
        } => {
            if let Some(concurrency) = concurrency {
                config.resolve_concurrency = concurrency.max(1);
            }
            if let Some(secs) = timeout_secs {
                config.lookup_timeout = Duration::from_secs(secs);
            }
            let bytes = fs::read(&file).with_context(|| format!("Failed to read {}", file))?;
            run_import(store, &config, &bytes, portfolio, &platform, hint.as_deref(), dry_run).await?;
        }
        Command::Positions { portfolio } => {
            for position in ledger::positions(&*store, portfolio).await? {
                println!(
                    "{:<12} open {:>14} bought {:>14} sold {:>14} pnl {:>14} ({:.2}%) {}d{}",
                    position.symbol(),
                    position.open_quantity().normalize(),
                    position.total_quantity_bought().normalize(),
                    position.total_quantity_sold().normalize(),
                    position.realized_pnl().round_dp(2),
                    position.return_percent(),
                    position.hold_days(),
                    if position.is_closed() { " closed" } else { "" }
                );
            }
        }
        Command::DeleteTx { id } => match ledger::delete_transaction(&*store, id).await? {
            Some(position) => println!(
                "{} now holds {}",
                position.symbol(),
                position.open_quantity().normalize()
            ),
            None => println!("Transaction {} deleted; no history left for its symbol", id),
        },
        Command::Portfolios { owner, create } => {
            if let Some(name) = create {
                let portfolio = store.create_portfolio(&owner, &name).await?;
                info!("Created portfolio {}", portfolio.id());
            }
            for portfolio in store.list_portfolios(&owner).await? {
                println!("{:>4}  {}", portfolio.id(), portfolio.name());
            }
        }
    }

    Ok(())
}

async fn run_import(
    store: Arc<SqliteStore>,
    config: &ImportConfig,
    bytes: &[u8],
    portfolio_id: i64,
    platform: &str,
    hint: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let source = Arc::new(FmpApi::new(config.fmp_api_key.clone()));
    let resolver = SymbolResolver::from_config(source, store.clone(), config);
    let executor = ImportExecutor::new(store.clone(), config.execute_concurrency);
    let (mut session, mut progress) = ImportSession::new(resolver, executor, store);

    let printer = tokio::spawn(async move {
        while let Some(event) = progress.next().await {
            match event {
                ImportProgress::Parsed { rows, transactions } => {
                    info!("Parsed {} rows and {} transactions", rows, transactions)
                }
                ImportProgress::Resolved { done, total } => info!("{} of {} resolved", done, total),
                ImportProgress::Executing { done, total } => info!("{} of {} units written", done, total),
                ImportProgress::Finished(_) => break,
            }
        }
    });

    session.set_portfolio(portfolio_id);
    session.set_platform(platform);
    let parsed = session.analyze(bytes, hint.or(Some(platform)))?;
    if let Some(format) = parsed.detected_format {
        info!("Detected {} statement", format);
    }
    for error in &parsed.errors {
        println!("warning: {}", error);
    }

    let task = session.start_resolution().await?;
    session.finish_resolution(task).await?;
    for error in session.resolve_errors() {
        println!("warning: {}", error);
    }

    for row in session.grouped() {
        let instrument = row.row;
        let marker = if row.category == Category::Dividend { "  +" } else { "" };
        println!(
            "{}{:<10} {:<12} {:>14} {:<9} {:>3}% {}",
            marker,
            row.category,
            instrument.resolved_symbol(),
            instrument.quantity().normalize(),
            instrument.action(),
            instrument.confidence(),
            instrument.resolved_name()
        );
    }

    if dry_run {
        session.reset()?;
        printer.abort();
        return Ok(());
    }

    let result = session.execute().await?;
    let _ = printer.await;
    println!(
        "added {}, updated {}, closed {}, skipped {}, transactions {}, duplicates {}",
        result.added,
        result.updated,
        result.closed,
        result.skipped,
        result.transactions_added,
        result.duplicates_ignored
    );
    for error in &result.errors {
        println!("error: {}", error);
    }
    if !result.success {
        bail!("Import failed");
    }
    Ok(())
}
