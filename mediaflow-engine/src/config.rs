//! Engine configuration
//!
//! Defines all configurable parameters for the engine including worker
//! cadence, retention, retry budgets and remote service endpoints.

use std::path::PathBuf;
use std::time::Duration;

use mediaflow_client::ClientConfig;
use mediaflow_core::domain::pipeline::LocalizationServices;

/// Engine configuration
///
/// All intervals are configurable to allow tuning for different deployment
/// scenarios (dev vs prod, fast vs slow services).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for pipeline workspaces and packaged outputs
    pub work_dir: PathBuf,

    /// How often the worker re-checks the due-time heap when idle
    pub worker_tick: Duration,

    /// How often the scheduler looks for due definitions
    pub scheduler_poll_interval: Duration,

    /// How often the cleanup sweep runs
    pub cleanup_interval: Duration,

    /// How long terminal jobs stay in the in-memory registry
    pub retention_window: Duration,

    /// Retry budget for jobs that do not specify one
    pub default_max_retries: u32,

    /// Remote service endpoints for the stock localization pipeline
    pub services: LocalizationServices,

    /// Distribution service endpoint
    pub distribution_url: String,

    /// Timeout and transport-retry settings for remote service calls
    pub client: ClientConfig,

    /// Postgres DSN; the in-memory store is used when unset
    pub database_url: Option<String>,
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - MEDIAFLOW_WORK_DIR (default: ./mediaflow-work)
    /// - MEDIAFLOW_WORKER_TICK_MS (default: 500)
    /// - MEDIAFLOW_SCHEDULER_POLL_SECS (default: 10)
    /// - MEDIAFLOW_CLEANUP_INTERVAL_SECS (default: 604800, one week)
    /// - MEDIAFLOW_RETENTION_SECS (default: 604800, one week)
    /// - MEDIAFLOW_MAX_RETRIES (default: 3)
    /// - MEDIAFLOW_<SERVICE>_URL for each stock pipeline service
    /// - MEDIAFLOW_DISTRIBUTION_URL
    /// - DATABASE_URL
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MEDIAFLOW_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(millis) = std::env::var("MEDIAFLOW_WORKER_TICK_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.worker_tick = Duration::from_millis(millis);
        }
        if let Some(secs) = env_secs("MEDIAFLOW_SCHEDULER_POLL_SECS") {
            config.scheduler_poll_interval = secs;
        }
        if let Some(secs) = env_secs("MEDIAFLOW_CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = secs;
        }
        if let Some(secs) = env_secs("MEDIAFLOW_RETENTION_SECS") {
            config.retention_window = secs;
        }
        if let Some(retries) = std::env::var("MEDIAFLOW_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            config.default_max_retries = retries;
        }

        let service_url = |var: &str, default: &str| -> String {
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        };
        config.services = LocalizationServices {
            subtitle_removal: service_url(
                "MEDIAFLOW_SUBTITLE_REMOVAL_URL",
                &config.services.subtitle_removal,
            ),
            voice_extraction: service_url(
                "MEDIAFLOW_VOICE_EXTRACTION_URL",
                &config.services.voice_extraction,
            ),
            speech_synthesis: service_url(
                "MEDIAFLOW_SPEECH_SYNTHESIS_URL",
                &config.services.speech_synthesis,
            ),
            lip_sync: service_url("MEDIAFLOW_LIP_SYNC_URL", &config.services.lip_sync),
            subtitle_burn_in: service_url(
                "MEDIAFLOW_SUBTITLE_BURN_IN_URL",
                &config.services.subtitle_burn_in,
            ),
            resolution_enhancement: service_url(
                "MEDIAFLOW_RESOLUTION_ENHANCEMENT_URL",
                &config.services.resolution_enhancement,
            ),
        };
        config.distribution_url =
            service_url("MEDIAFLOW_DISTRIBUTION_URL", &config.distribution_url);
        config.database_url = std::env::var("DATABASE_URL").ok();

        config
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            anyhow::bail!("work_dir cannot be empty");
        }

        if self.scheduler_poll_interval.is_zero() {
            anyhow::bail!("scheduler_poll_interval must be greater than 0");
        }

        if self.worker_tick.is_zero() {
            anyhow::bail!("worker_tick must be greater than 0");
        }

        for (name, url) in [
            ("subtitle_removal", &self.services.subtitle_removal),
            ("voice_extraction", &self.services.voice_extraction),
            ("speech_synthesis", &self.services.speech_synthesis),
            ("lip_sync", &self.services.lip_sync),
            ("subtitle_burn_in", &self.services.subtitle_burn_in),
            (
                "resolution_enhancement",
                &self.services.resolution_enhancement,
            ),
            ("distribution", &self.distribution_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} URL must start with http:// or https://", name);
            }
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./mediaflow-work"),
            worker_tick: Duration::from_millis(500),
            scheduler_poll_interval: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(7 * 24 * 3600),
            retention_window: Duration::from_secs(7 * 24 * 3600),
            default_max_retries: 3,
            services: LocalizationServices {
                subtitle_removal: "http://localhost:9101".to_string(),
                voice_extraction: "http://localhost:9102".to_string(),
                speech_synthesis: "http://localhost:9103".to_string(),
                lip_sync: "http://localhost:9104".to_string(),
                subtitle_burn_in: "http://localhost:9105".to_string(),
                resolution_enhancement: "http://localhost:9106".to_string(),
            },
            distribution_url: "http://localhost:9110".to_string(),
            client: ClientConfig::default(),
            database_url: None,
        }
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
