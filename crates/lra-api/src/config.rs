//! # Coordinator Configuration
//!
//! Command-line flags with environment fallbacks, parsed with `clap`, then
//! validated into a [`CoordinatorConfig`].
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | `8080` |
//! | `LRA_COORDINATOR_URL` | `http://localhost:{PORT}` |
//! | `LRA_SNAPSHOT_PATH` | unset (in-memory only) |
//! | `LRA_RECOVERY_INTERVAL_MS` | `500` |
//! | `LRA_MAX_RETRIES` | `30` |
//! | `LRA_DELETE_GRACE_SECS` | `300` |
//! | `LRA_PARTICIPANT_TIMEOUT_MS` | `500` |
//! | `LRA_RECOVERY_WAIT_MS` | `10000` |
//! | `LRA_SNAPSHOT_EVERY` | `20` |
//! | `LRA_LOG_JSON` | `false` |

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use lra_client::ParticipantClientConfig;
use lra_state::RetryBudget;

/// LRA coordinator: drives long running actions to a consistent outcome.
#[derive(Parser, Debug, Clone)]
#[command(name = "lra-coordinator", version, about)]
pub struct CoordinatorArgs {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Externally visible base URL. LRA URIs are `{url}/{id}`.
    #[arg(long, env = "LRA_COORDINATOR_URL")]
    pub coordinator_url: Option<String>,

    /// Snapshot file. Without one the registry is not persisted.
    #[arg(long, env = "LRA_SNAPSHOT_PATH")]
    pub snapshot_path: Option<PathBuf>,

    /// Period of the recovery sweep, in milliseconds.
    #[arg(long, env = "LRA_RECOVERY_INTERVAL_MS", default_value_t = 500)]
    pub recovery_interval_ms: u64,

    /// Retry budget for complete/compensate, after and forget calls.
    #[arg(long, env = "LRA_MAX_RETRIES", default_value_t = 30)]
    pub max_retries: u32,

    /// How long a finished LRA stays queryable before it is purged.
    #[arg(long, env = "LRA_DELETE_GRACE_SECS", default_value_t = 300)]
    pub delete_grace_secs: u64,

    /// Per-call timeout for participant requests, in milliseconds.
    #[arg(long, env = "LRA_PARTICIPANT_TIMEOUT_MS", default_value_t = 500)]
    pub participant_timeout_ms: u64,

    /// Upper bound on how long `GET /recovery` waits for sweeps, in milliseconds.
    #[arg(long, env = "LRA_RECOVERY_WAIT_MS", default_value_t = 10_000)]
    pub recovery_wait_ms: u64,

    /// Save a snapshot every N sweeps (0 disables periodic snapshots).
    #[arg(long, env = "LRA_SNAPSHOT_EVERY", default_value_t = 20)]
    pub snapshot_every: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LRA_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The coordinator URL does not parse.
    #[error("invalid coordinator URL {0}: {1}")]
    InvalidUrl(String, String),
    /// A numeric setting is out of range.
    #[error("{name} must be greater than zero")]
    Zero {
        /// The setting.
        name: &'static str,
    },
}

/// Validated coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Listening port.
    pub port: u16,
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Snapshot file, if persistence is enabled.
    pub snapshot_path: Option<PathBuf>,
    /// Recovery sweep period.
    pub recovery_interval: Duration,
    /// Budgets handed to every joining participant.
    pub retry_budget: RetryBudget,
    /// Grace period before a finished LRA is purged.
    pub delete_grace: Duration,
    /// Participant client settings.
    pub participant: ParticipantClientConfig,
    /// Cap on the recovery wait.
    pub recovery_wait: Duration,
    /// Snapshot cadence in sweeps.
    pub snapshot_every: u64,
}

impl CoordinatorConfig {
    /// Default configuration with the given base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// The grace period as a `chrono` duration.
    pub fn delete_grace_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.delete_grace).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            snapshot_path: None,
            recovery_interval: Duration::from_millis(500),
            retry_budget: RetryBudget::default(),
            delete_grace: Duration::from_secs(300),
            participant: ParticipantClientConfig::default(),
            recovery_wait: Duration::from_secs(10),
            snapshot_every: 20,
        }
    }
}

impl TryFrom<CoordinatorArgs> for CoordinatorConfig {
    type Error = ConfigError;

    fn try_from(args: CoordinatorArgs) -> Result<Self, Self::Error> {
        let raw_url = args
            .coordinator_url
            .unwrap_or_else(|| format!("http://localhost:{}", args.port));
        let url =
            Url::parse(&raw_url).map_err(|e| ConfigError::InvalidUrl(raw_url.clone(), e.to_string()))?;
        if args.recovery_interval_ms == 0 {
            return Err(ConfigError::Zero {
                name: "LRA_RECOVERY_INTERVAL_MS",
            });
        }
        if args.max_retries == 0 {
            return Err(ConfigError::Zero {
                name: "LRA_MAX_RETRIES",
            });
        }

        Ok(Self {
            port: args.port,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            snapshot_path: args.snapshot_path,
            recovery_interval: Duration::from_millis(args.recovery_interval_ms),
            retry_budget: RetryBudget::uniform(args.max_retries),
            delete_grace: Duration::from_secs(args.delete_grace_secs),
            participant: ParticipantClientConfig::with_timeout_ms(args.participant_timeout_ms),
            recovery_wait: Duration::from_millis(args.recovery_wait_ms),
            snapshot_every: args.snapshot_every,
        })
    }
}
