//! `exam-prep`: command-line access to the exam practice services.
//!
//! Every command opens (and migrates) the SQLite database, runs one service
//! call and prints the result as JSON on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use exam_core::model::{LicenseTypeId, TestAttemptId, TestKind, UserId};
use services::{AppServices, Clock, HistoryFilter, HistoryStatusFilter};
use storage::repository::Storage;

mod commands;
mod db;
mod logging;

#[derive(Debug, Parser)]
#[command(name = "exam-prep", version, about = "Driving-license exam practice")]
struct Cli {
    /// SQLite database URL or file path
    #[arg(long, global = true, env = "EXAM_DB_URL", default_value = db::DEFAULT_DB_URL)]
    db: String,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the dashboard of a user
    Dashboard {
        #[arg(long, env = "EXAM_USER_ID")]
        user: UserId,

        /// License type used for the mastery pass chance
        #[arg(long)]
        license: Option<LicenseTypeId>,
    },

    /// List finished tests, newest first
    History {
        #[arg(long, env = "EXAM_USER_ID")]
        user: UserId,

        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// quick, thematic, custom, template or bookmarked
        #[arg(long)]
        kind: Option<TestKind>,

        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show one finished test with its answers
    Show {
        #[arg(long, env = "EXAM_USER_ID")]
        user: UserId,

        #[arg(long)]
        attempt: TestAttemptId,
    },

    /// Abandon a running or paused test
    Abandon {
        #[arg(long, env = "EXAM_USER_ID")]
        user: UserId,

        #[arg(long)]
        attempt: TestAttemptId,
    },

    /// Insert demo license types, questions and tests
    Seed {
        #[arg(long, env = "EXAM_USER_ID", default_value = "1")]
        user: UserId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusArg {
    Passed,
    Failed,
}

impl From<StatusArg> for HistoryStatusFilter {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Passed => HistoryStatusFilter::Passed,
            StatusArg::Failed => HistoryStatusFilter::Failed,
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = db::normalize_sqlite_url(&cli.db);
    db::prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    tracing::debug!(%db_url, "database ready");

    let clock = Clock::default();
    let services = AppServices::from_storage(&storage, clock);

    let output = match cli.command {
        Commands::Dashboard { user, license } => {
            commands::dashboard(&services, user, license).await?
        }
        Commands::History {
            user,
            status,
            kind,
            page,
        } => {
            let filter = HistoryFilter {
                status: status.map(Into::into),
                kind,
            };
            commands::history(&services, user, filter, page).await?
        }
        Commands::Show { user, attempt } => commands::show(&services, user, attempt).await?,
        Commands::Abandon { user, attempt } => {
            commands::abandon(&services, user, attempt).await?
        }
        Commands::Seed { user } => commands::seed(&storage, user, clock).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}
