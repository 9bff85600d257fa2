mod config;
mod demo;
mod format;
mod github;
mod model;
mod normalize;
mod notify;
mod scheduler;
mod snapshot;
mod transitions;
mod tui;

use crate::config::{CliOverrides, ConfigError, Settings, default_log_path, load_config};
use crate::demo::DemoSource;
use crate::github::{GitHubSource, PrSource};
use crate::notify::{DesktopSink, Dispatcher};
use crate::scheduler::{PollSettings, Scheduler};
use crate::tui::{RenderError, TerminalGuard, TerminalRenderer};
use clap::Parser;
use octocrab::Octocrab;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use update_informer::{Check, registry};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "prpeek",
    version,
    about = "Live terminal dashboard for the GitHub PRs you care about"
)]
struct CliArgs {
    /// Repositories to watch, OWNER/REPO (repeatable or comma-delimited).
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    repos: Vec<String>,

    /// Seconds between refreshes (default: 60).
    #[arg(long, value_parser = parse_seconds)]
    interval: Option<f64>,

    /// Only show review requests with one of these labels (repeatable or comma-delimited).
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    labels: Vec<String>,

    /// Ring the terminal bell when notifications fire.
    #[arg(long)]
    sound: bool,

    /// Also show PRs you have already reviewed.
    #[arg(long)]
    reviewed: bool,

    /// Disable OS desktop notifications.
    #[arg(long)]
    no_notifications: bool,

    /// Seconds before a single GitHub request is abandoned (default: 30).
    #[arg(long, value_parser = parse_seconds)]
    fetch_timeout: Option<f64>,

    /// Run against evolving fake data (no GitHub token required).
    #[arg(long)]
    demo: bool,

    /// Write logs here instead of the platform state directory.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl CliArgs {
    fn into_overrides(self) -> CliOverrides {
        CliOverrides {
            repos: self.repos,
            interval_secs: self.interval,
            labels: self.labels,
            sound: self.sound,
            reviewed: self.reviewed,
            no_notifications: self.no_notifications,
            fetch_timeout_secs: self.fetch_timeout,
            log_file: self.log_file,
            demo: self.demo,
        }
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !v.is_finite() || v <= 0.0 {
        return Err(format!("`{s}` must be a positive number of seconds"));
    }
    Ok(v)
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Missing GITHUB_TOKEN env var (or run with --demo)")]
    MissingToken,

    #[error("Failed to init octocrab: {0}")]
    Client(#[from] octocrab::Error),

    #[error(transparent)]
    Terminal(#[from] RenderError),
}

/// Logs go to a file; the terminal belongs to the dashboard.
fn init_tracing(path: Option<PathBuf>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let Some(path) = path else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => eprintln!("Warning: cannot open log file {}: {e}", path.display()),
    }
}

/// Runs off the async workers; the registry lookup is blocking.
fn spawn_update_check() -> tokio::task::JoinHandle<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let informer = update_informer::new(
            registry::Crates,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
        .interval(Duration::from_secs(60 * 60 * 24));
        match informer.check_version() {
            Ok(Some(version)) => Some(version.to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "update check failed");
                None
            }
        }
    })
}

async fn drive<S: PrSource>(
    poll: PollSettings,
    source: S,
    dispatcher: Dispatcher<DesktopSink>,
) -> Result<(), AppError> {
    let _guard = TerminalGuard::enter()?;
    let renderer = TerminalRenderer::new(poll.title())?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let input = tui::spawn_input(tx.clone());
    let signals = tui::spawn_signals(tx);

    tracing::info!(
        targets = poll.targets.len(),
        groups = poll.groups.len(),
        interval_secs = poll.interval.as_secs_f64(),
        label_filter = !poll.labels.is_empty(),
        "poller starting"
    );
    let mut scheduler = Scheduler::new(poll, source, dispatcher, renderer);
    scheduler.run(&mut rx).await;
    tracing::debug!(phase = ?scheduler.phase(), "scheduler returned");

    input.abort();
    signals.abort();
    Ok(())
}

async fn run(settings: Settings) -> Result<(), AppError> {
    let dispatcher = Dispatcher::new(DesktopSink, settings.notifications, settings.sound);

    if settings.demo {
        let source = DemoSource::new(settings.poll.targets.clone(), settings.poll.groups.len());
        return drive(settings.poll, source, dispatcher).await;
    }

    let token = std::env::var("GITHUB_TOKEN").map_err(|_| AppError::MissingToken)?;
    let octo = Octocrab::builder().personal_token(token).build()?;
    drive(settings.poll, GitHubSource::new(octo), dispatcher).await
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let settings = match load_config().and_then(|file| Settings::resolve(args.into_overrides(), file)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(settings.log_file.clone().or_else(default_log_path));

    let update = spawn_update_check();

    // The terminal guard is dropped inside `run`, so stderr is usable below.
    if let Err(e) = run(settings).await {
        tracing::error!(error = %e, "exiting");
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    if update.is_finished() {
        if let Ok(Some(version)) = update.await {
            eprintln!(
                "A new release of prpeek is available: {} -> {version}",
                env!("CARGO_PKG_VERSION")
            );
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_comma_delimited_lists() {
        let args = CliArgs::try_parse_from([
            "prpeek",
            "--repos",
            "acme/api,acme/web",
            "--labels",
            "backend",
            "--labels",
            "urgent",
            "--interval",
            "2.5",
        ])
        .unwrap();
        assert_eq!(args.repos, vec!["acme/api", "acme/web"]);
        assert_eq!(args.labels, vec!["backend", "urgent"]);
        assert_eq!(args.interval, Some(2.5));
    }

    #[test]
    fn cli_rejects_bad_intervals() {
        for bad in ["0", "-1", "soon", "inf"] {
            assert!(CliArgs::try_parse_from(["prpeek", "--interval", bad]).is_err());
        }
    }
}
