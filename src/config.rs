//! Configuration file support for prpeek.
//!
//! Loads settings from `~/.config/prpeek/config.toml` (or platform equivalent).
//! CLI arguments take precedence over config file values.

use crate::model::{Group, Target};
use crate::normalize::LabelFilter;
use crate::scheduler::PollSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERVAL_SECS: f64 = 60.0;
pub const DEFAULT_FETCH_TIMEOUT_SECS: f64 = 30.0;

/// Watched when `--demo` runs without any configured repositories.
const DEMO_REPOS: &[&str] = &["acme/billing-api", "acme/web", "acme/docs"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no repositories to watch: pass --repos OWNER/REPO or set `repos` in the config file")]
    NoTargets,

    #[error("invalid repository {0:?}: expected OWNER/REPO")]
    BadTarget(String),

    #[error("{name} must be a positive number of seconds, got {value}")]
    BadDuration { name: &'static str, value: f64 },
}

/// Configuration loaded from TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repositories to watch (OWNER/REPO).
    pub repos: Option<Vec<String>>,

    /// Seconds between refreshes. Default: 60.
    pub interval_secs: Option<f64>,

    /// Only show review requests carrying one of these labels.
    pub labels: Option<Vec<String>>,

    /// Emit a terminal bell when notifications fire.
    pub sound: Option<bool>,

    /// Also show PRs you have reviewed.
    pub reviewed: Option<bool>,

    /// Disable OS desktop notifications.
    pub no_notifications: Option<bool>,

    /// Per-request fetch timeout (seconds). Default: 30.
    pub fetch_timeout_secs: Option<f64>,

    /// Where to write the log file.
    pub log_file: Option<PathBuf>,
}

/// Returns the path to the config file.
/// Platform-specific: `~/.config/prpeek/config.toml` on Linux,
/// `%APPDATA%\prpeek\config.toml` on Windows.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("prpeek").join("config.toml"))
}

/// Default log location under the platform state (or data) dir.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|p| p.join("prpeek").join("prpeek.log"))
}

/// Load a config file. A missing file is an empty config; anything else wrong is fatal.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_config() -> Result<Config, ConfigError> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => Ok(Config::default()),
    }
}

/// Values that came from the command line. `None`/`false` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub repos: Vec<String>,
    pub interval_secs: Option<f64>,
    pub labels: Vec<String>,
    pub sound: bool,
    pub reviewed: bool,
    pub no_notifications: bool,
    pub fetch_timeout_secs: Option<f64>,
    pub log_file: Option<PathBuf>,
    pub demo: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub poll: PollSettings,
    pub notifications: bool,
    pub sound: bool,
    pub demo: bool,
    pub log_file: Option<PathBuf>,
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::BadDuration { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::BadDuration { name, value })
}

impl Settings {
    /// Merge CLI over file and validate.
    pub fn resolve(cli: CliOverrides, file: Config) -> Result<Self, ConfigError> {
        let mut repos = if cli.repos.is_empty() {
            file.repos.unwrap_or_default()
        } else {
            cli.repos
        };
        if repos.is_empty() && cli.demo {
            repos = DEMO_REPOS.iter().map(|r| r.to_string()).collect();
        }
        let targets = repos
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(|r| Target::parse(r).ok_or_else(|| ConfigError::BadTarget(r.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let interval = seconds(
            "interval",
            cli.interval_secs
                .or(file.interval_secs)
                .unwrap_or(DEFAULT_INTERVAL_SECS),
        )?;
        let fetch_timeout = seconds(
            "fetch timeout",
            cli.fetch_timeout_secs
                .or(file.fetch_timeout_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        )?;

        let labels = if cli.labels.is_empty() {
            file.labels.unwrap_or_default()
        } else {
            cli.labels
        };

        let mut groups = vec![Group::Mine, Group::RequestingReview];
        if cli.reviewed || file.reviewed.unwrap_or(false) {
            groups.push(Group::Reviewed);
        }

        Ok(Self {
            poll: PollSettings {
                targets,
                groups,
                interval,
                fetch_timeout,
                labels: LabelFilter::new(labels),
            },
            notifications: !(cli.no_notifications || file.no_notifications.unwrap_or(false)),
            sound: cli.sound || file.sound.unwrap_or(false),
            demo: cli.demo,
            log_file: cli.log_file.or(file.log_file),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(repos: &[&str]) -> CliOverrides {
        CliOverrides {
            repos: repos.iter().map(|s| s.to_string()).collect(),
            ..CliOverrides::default()
        }
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.repos.is_none());
        assert!(config.interval_secs.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
repos = ["acme/api", "acme/web"]
interval_secs = 45.5
labels = ["backend", "urgent"]
sound = true
reviewed = true
no_notifications = false
fetch_timeout_secs = 10
log_file = "/tmp/prpeek.log"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.repos,
            Some(vec!["acme/api".to_string(), "acme/web".to_string()])
        );
        assert_eq!(config.interval_secs, Some(45.5));
        assert_eq!(config.sound, Some(true));
        assert_eq!(config.reviewed, Some(true));
        assert_eq!(config.no_notifications, Some(false));
        assert_eq!(config.fetch_timeout_secs, Some(10.0));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/prpeek.log")));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.repos.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "repos = [").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn file_values_apply_when_cli_is_silent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "repos = [\"acme/api\"]\ninterval_secs = 5\nsound = true").unwrap();
        let config = load_config_from(file.path()).unwrap();

        let s = Settings::resolve(CliOverrides::default(), config).unwrap();
        assert_eq!(s.poll.targets.len(), 1);
        assert_eq!(s.poll.interval, Duration::from_secs(5));
        assert_eq!(s.poll.fetch_timeout, Duration::from_secs(30));
        assert!(s.sound);
        assert!(s.notifications);
        assert_eq!(s.poll.groups, vec![Group::Mine, Group::RequestingReview]);
    }

    #[test]
    fn cli_wins_over_file() {
        let file = Config {
            repos: Some(vec!["acme/api".to_string()]),
            interval_secs: Some(120.0),
            ..Config::default()
        };
        let mut overrides = cli(&["acme/web", "acme/docs"]);
        overrides.interval_secs = Some(0.5);
        overrides.reviewed = true;
        overrides.no_notifications = true;

        let s = Settings::resolve(overrides, file).unwrap();
        let repos: Vec<String> = s.poll.targets.iter().map(|t| t.to_string()).collect();
        assert_eq!(repos, vec!["acme/web", "acme/docs"]);
        assert_eq!(s.poll.interval, Duration::from_millis(500));
        assert!(s.poll.groups.contains(&Group::Reviewed));
        assert!(!s.notifications);
    }

    #[test]
    fn rejects_missing_or_bad_targets() {
        assert!(matches!(
            Settings::resolve(CliOverrides::default(), Config::default()),
            Err(ConfigError::NoTargets)
        ));
        assert!(matches!(
            Settings::resolve(cli(&["just-a-name"]), Config::default()),
            Err(ConfigError::BadTarget(_))
        ));
    }

    #[test]
    fn demo_without_repos_uses_sample_targets() {
        let overrides = CliOverrides {
            demo: true,
            ..CliOverrides::default()
        };
        let s = Settings::resolve(overrides, Config::default()).unwrap();
        assert!(s.demo);
        assert_eq!(s.poll.targets.len(), DEMO_REPOS.len());
    }

    #[test]
    fn rejects_non_positive_durations() {
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let mut o = cli(&["acme/api"]);
            o.interval_secs = Some(bad);
            assert!(matches!(
                Settings::resolve(o, Config::default()),
                Err(ConfigError::BadDuration { name: "interval", .. })
            ));
        }
        let mut o = cli(&["acme/api"]);
        o.fetch_timeout_secs = Some(0.0);
        assert!(matches!(
            Settings::resolve(o, Config::default()),
            Err(ConfigError::BadDuration { name: "fetch timeout", .. })
        ));
    }
}
