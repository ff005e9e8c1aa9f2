use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use skillswap::application::ledger::LedgerEngine;
use skillswap::config::{ServerConfig, load_posts, load_users};
use skillswap::domain::clock::{ClockRef, SystemClock};
use skillswap::domain::coins::Coins;
use skillswap::domain::ports::LedgerStoreRef;
use skillswap::domain::transaction::reconcile;
use skillswap::domain::user::UserId;
use skillswap::infrastructure::in_memory::{
    InMemoryLedgerStore, InMemoryPostDirectory, InMemorySessionStore, InMemorySwapStore,
    InMemoryUserDirectory,
};
use skillswap::infrastructure::notifications::TracingNotificationSink;
use skillswap::infrastructure::realtime::BroadcastHub;
use skillswap::infrastructure::stripe::StripeClient;
use skillswap::interfaces::csv::StatementRow;
use skillswap::interfaces::csv::statement_reader::StatementReader;
use skillswap::interfaces::csv::statement_writer::StatementWriter;
use skillswap::interfaces::http::{self, AppState, Ports};
use skillswap::telemetry;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent ledger database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve(ServerConfig),
    /// Export a user's wallet ledger as CSV.
    Statement {
        #[arg(long)]
        user: UserId,
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Verify balance chains, either of an exported statement or of every
    /// wallet in the ledger.
    Reconcile {
        /// Statement CSV produced by `statement`.
        statement: Option<PathBuf>,
    },
}

#[cfg(feature = "storage-rocksdb")]
fn open_ledger(db_path: Option<&Path>) -> Result<LedgerStoreRef> {
    use skillswap::infrastructure::rocksdb::RocksDBLedgerStore;

    match db_path {
        Some(path) => Ok(Arc::new(RocksDBLedgerStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_ledger(db_path: Option<&Path>) -> Result<LedgerStoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    let ledger_store = open_ledger(cli.db_path.as_deref())?;
    let clock: ClockRef = Arc::new(SystemClock);

    match cli.command {
        Command::Serve(config) => serve(config, ledger_store, clock).await,
        Command::Statement { user, output } => {
            let ledger = LedgerEngine::new(ledger_store, clock);
            let transactions = ledger.history(user).await.into_diagnostic()?;
            match output {
                Some(path) => {
                    let file = File::create(path).into_diagnostic()?;
                    StatementWriter::new(file)
                        .write_statement(&transactions)
                        .into_diagnostic()?;
                }
                None => {
                    let stdout = io::stdout();
                    StatementWriter::new(stdout.lock())
                        .write_statement(&transactions)
                        .into_diagnostic()?;
                }
            }
            Ok(())
        }
        Command::Reconcile {
            statement: Some(path),
        } => reconcile_statement(&path),
        Command::Reconcile { statement: None } => {
            reconcile_ledger(LedgerEngine::new(ledger_store, clock)).await
        }
    }
}

fn reconcile_statement(path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let rows: Vec<StatementRow> = StatementReader::new(file)
        .rows()
        .collect::<std::result::Result<_, _>>()
        .into_diagnostic()?;
    match reconcile(Coins::ZERO, &rows) {
        Ok(closing) => {
            println!(
                "statement consistent: {} transactions, closing balance {closing}",
                rows.len()
            );
            Ok(())
        }
        Err(d) => Err(miette!(
            "ledger discrepancy at transaction {}: expected balance {}, recorded {}",
            d.transaction_id,
            d.expected,
            d.recorded
        )),
    }
}

async fn reconcile_ledger(ledger: LedgerEngine) -> Result<()> {
    let reports = ledger.reconcile_all().await.into_diagnostic()?;
    let mut broken = 0;
    for report in &reports {
        let status = if report.is_consistent() {
            "ok"
        } else {
            broken += 1;
            "MISMATCH"
        };
        println!(
            "{},{},{},{}",
            report.wallet.id, report.transactions, report.wallet.balance, status
        );
    }
    if broken > 0 {
        return Err(miette!("{broken} wallet(s) failed reconciliation"));
    }
    Ok(())
}

async fn serve(config: ServerConfig, ledger: LedgerStoreRef, clock: ClockRef) -> Result<()> {
    let users = match &config.users_file {
        Some(path) => load_users(path).into_diagnostic()?,
        None => Vec::new(),
    };
    tracing::info!(users = users.len(), "User directory loaded");
    let posts = InMemoryPostDirectory::new();
    if let Some(path) = &config.posts_file {
        for post in load_posts(path).into_diagnostic()? {
            posts.insert(post.id, post.owner_id).await;
        }
    }
    if config.stripe_webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is not set; every webhook will be rejected");
    }

    let hub = BroadcastHub::default();
    let state = AppState::new(Ports {
        sessions: Arc::new(InMemorySessionStore::new()),
        swaps: Arc::new(InMemorySwapStore::new()),
        ledger,
        users: Arc::new(InMemoryUserDirectory::with_users(users)),
        posts: Arc::new(posts),
        notifications: Arc::new(TracingNotificationSink),
        payments: Arc::new(
            StripeClient::new(config.stripe_settings(), clock.clone()).into_diagnostic()?,
        ),
        realtime: Some(Arc::new(hub)),
        clock,
    });
    let app = http::router(state, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %config.bind_addr(), "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
