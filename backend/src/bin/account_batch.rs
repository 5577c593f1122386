//! Create or update user accounts from a JSON batch file.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use cap_std::{ambient_authority, fs::Dir};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use ortho_config::OrthoConfig;
use serde_json::Value;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use user_accounts::config::AccountBatchSettings;
use user_accounts::domain::ports::AccountStore;
use user_accounts::domain::{AccountBatchService, Error, RawBatch};
use user_accounts::outbound::hashing::Argon2PasswordHasher;
use user_accounts::outbound::memory::InMemoryAccountStore;
use user_accounts::outbound::notification::TracingAccountNotifier;
use user_accounts::outbound::persistence::{
    DbPool, DieselAccountStore, PoolConfig, apply_migrations,
};

/// `account-batch` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "account-batch",
    about = "Validate and write batches of user accounts in one transaction",
    version
)]
struct CliArgs {
    #[command(subcommand)]
    command: BatchCommand,
    /// Database connection URL. Overrides `ACCOUNT_BATCH_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url", global = true)]
    database_url: Option<String>,
    /// Run against an empty in-memory store instead of PostgreSQL.
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Apply pending schema migrations before writing.
    #[arg(long, global = true)]
    migrate: bool,
    /// Send welcome notifications for created accounts.
    #[arg(long, global = true)]
    notify: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum BatchCommand {
    /// Create one account per record.
    Store {
        /// JSON file holding an array of account records.
        #[arg(value_name = "path")]
        path: PathBuf,
    },
    /// Apply one partial update per record.
    Update {
        /// JSON file holding an array of account records with ids.
        #[arg(value_name = "path")]
        path: PathBuf,
    },
}

impl BatchCommand {
    fn path(&self) -> &Path {
        match self {
            Self::Store { path } | Self::Update { path } => path,
        }
    }
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(io::stderr)
        .try_init()
    {
        warn!(error = %error, "tracing init failed");
    }

    let args = CliArgs::parse();
    let settings = AccountBatchSettings::load_from_iter([OsString::from("account-batch")])
        .map_err(|error| eyre!("load account batch settings: {error}"))?;
    let batch = read_batch(args.command.path())?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(async_main(args, settings, batch))
}

async fn async_main(
    args: CliArgs,
    settings: AccountBatchSettings,
    batch: RawBatch,
) -> Result<ExitCode> {
    let notify = args.notify || settings.notify_on_create;
    if args.dry_run {
        info!("dry run against an in-memory account store");
        return run_batch(InMemoryAccountStore::default(), &args.command, batch, notify, &settings)
            .await;
    }

    let database_url = resolve_database_url(args.database_url, settings.database_url.clone())?;
    if args.migrate {
        let url = database_url.clone();
        let applied = tokio::task::spawn_blocking(move || apply_migrations(&url))
            .await
            .wrap_err("join migration task")??;
        info!(applied, "schema migrations applied");
    }

    let pool = DbPool::new(PoolConfig::new(&database_url).with_max_size(settings.pool_max_size()))
        .await
        .wrap_err("create database pool")?;
    run_batch(DieselAccountStore::new(pool), &args.command, batch, notify, &settings).await
}

async fn run_batch<S>(
    store: S,
    command: &BatchCommand,
    batch: RawBatch,
    notify: bool,
    settings: &AccountBatchSettings,
) -> Result<ExitCode>
where
    S: AccountStore + 'static,
{
    let service = AccountBatchService::new(
        Arc::new(store),
        Arc::new(Argon2PasswordHasher::new()),
        Arc::new(TracingAccountNotifier::new(settings.support_cc())),
    )
    .with_notifications(notify);

    let outcome = match command {
        BatchCommand::Store { .. } => service.store_users(batch).await,
        BatchCommand::Update { .. } => service.update_users(batch).await,
    };

    match outcome {
        Ok(accounts) => {
            println!("{}", serde_json::to_string_pretty(&accounts)?);
            service.settle_notifications().await;
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            let error = Error::from(error);
            eprintln!("{}", serde_json::to_string_pretty(&error)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_batch(path: &Path) -> Result<RawBatch> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("batch path '{}' must name a file", path.display()))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("open batch directory '{}'", parent.display()))?;
    let mut file = directory
        .open(Path::new(file_name))
        .wrap_err_with(|| format!("open batch file '{}'", path.display()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .wrap_err_with(|| format!("read batch file '{}'", path.display()))?;
    parse_batch(&contents)
}

fn parse_batch(contents: &str) -> Result<RawBatch> {
    match serde_json::from_str::<Value>(contents).wrap_err("parse batch JSON")? {
        Value::Array(records) => Ok(records),
        other => Err(eyre!(
            "batch must be a JSON array of records, found {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn resolve_database_url(explicit: Option<String>, configured: Option<String>) -> Result<String> {
    if let Some(value) = explicit {
        if value.trim().is_empty() {
            return Err(eyre!("--database-url must not be empty when provided"));
        }
        return Ok(value);
    }

    match configured {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(eyre!("ACCOUNT_BATCH_DATABASE_URL must not be empty")),
        None => Err(eyre!(
            "database URL missing: set --database-url or ACCOUNT_BATCH_DATABASE_URL"
        )),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for CLI parsing helpers.

    use std::io::Write;

    use rstest::rstest;
    use serde_json::json;
    use tempfile::NamedTempFile;

    use super::*;

    #[rstest]
    fn subcommands_parse_with_global_flags() {
        let args = CliArgs::try_parse_from(["account-batch", "update", "batch.json", "--dry-run"])
            .expect("arguments parse");

        assert!(args.dry_run);
        assert!(!args.notify);
        assert!(matches!(args.command, BatchCommand::Update { .. }));
        assert_eq!(args.command.path(), Path::new("batch.json"));
    }

    #[rstest]
    fn batch_files_are_read_as_arrays() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"[{{"login": "grace"}}, 7]"#).expect("write batch");

        let batch = read_batch(file.path()).expect("batch reads");

        assert_eq!(batch, vec![json!({ "login": "grace" }), json!(7)]);
    }

    #[rstest]
    #[case(r#"{"login": "grace"}"#, "an object")]
    #[case("null", "null")]
    fn non_array_batches_are_rejected(#[case] contents: &str, #[case] kind: &str) {
        let error = parse_batch(contents).expect_err("non-array batch");
        assert!(error.to_string().contains(kind));
    }

    #[rstest]
    fn malformed_json_is_rejected() {
        let error = parse_batch("[{").expect_err("malformed batch");
        assert!(error.to_string().contains("parse batch JSON"));
    }

    #[rstest]
    #[case(Some("postgres://cli"), Some("postgres://env"), Ok("postgres://cli"))]
    #[case(None, Some("postgres://env"), Ok("postgres://env"))]
    #[case(Some("  "), Some("postgres://env"), Err("must not be empty"))]
    #[case(None, None, Err("database URL missing"))]
    fn database_url_prefers_the_flag(
        #[case] explicit: Option<&str>,
        #[case] configured: Option<&str>,
        #[case] expected: Result<&str, &str>,
    ) {
        let resolved = resolve_database_url(
            explicit.map(str::to_owned),
            configured.map(str::to_owned),
        );
        match (resolved, expected) {
            (Ok(url), Ok(want)) => assert_eq!(url, want),
            (Err(error), Err(fragment)) => assert!(error.to_string().contains(fragment)),
            (other, want) => panic!("expected {want:?}, got {other:?}"),
        }
    }
}
