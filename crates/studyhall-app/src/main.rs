mod backend;
mod cli;
mod commands;

use std::path::{Path, PathBuf};

use studyhall_common::StudyhallError;
use tracing_subscriber::EnvFilter;

use crate::backend::Backend;
use crate::cli::{Args, Command};

/// Environment variable holding the Supabase Auth access token.
const ACCESS_TOKEN_VAR: &str = "STUDYHALL_ACCESS_TOKEN";

/// Load `KEY=VALUE` lines from a .env file. Variables already set win.
fn load_dotenv() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        PathBuf::from(".env"),
        // Workspace root, two levels up from crates/studyhall-app/
        manifest_dir.join("..").join("..").join(".env"),
    ];

    let Some(contents) = candidates
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
    else {
        return;
    };
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
            }
        }
    }
}

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
fn init_logging(cli_level: Option<&str>, config_level: &str) {
    let fallback = || EnvFilter::new(config_level);
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| fallback()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), StudyhallError> {
    let config = studyhall_config::load_config(args.config.as_deref().map(Path::new))?;
    init_logging(args.log_level.as_deref(), config.logging.level.as_directive());
    tracing::info!("studyhall v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(config = ?config, "Config loaded");

    let access_token = std::env::var(ACCESS_TOKEN_VAR)
        .ok()
        .filter(|t| !t.trim().is_empty());
    let backend = Backend::from_config(&config.backend, access_token)?;

    match args.command {
        Command::Watch {
            user_id,
            email,
            name,
        } => {
            let principal = backend.principal(user_id, email, name).await?;
            commands::watch(&backend, &config, principal).await
        }
        Command::Check => commands::check(&backend).await,
        Command::Sweep => commands::sweep(&backend, &config).await,
        Command::List => commands::list(&backend, &config).await,
    }
}

#[tokio::main]
async fn main() {
    // Load .env file before anything else
    load_dotenv();

    let args = cli::parse();
    if let Err(e) = run(args).await {
        tracing::error!("{e}");
        eprintln!("studyhall: {e}");
        std::process::exit(1);
    }
}
