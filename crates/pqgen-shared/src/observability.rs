//! Logging and metrics for generation runs

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use std::time::{Duration, Instant};
use tracing::{debug, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LoggingConfig, ObservabilityConfig};

/// Global observability system
static OBSERVABILITY: OnceCell<ObservabilitySystem> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub struct ObservabilitySystem {
    level: Level,
    format: LogFormat,
}

impl ObservabilitySystem {
    /// Install the global subscriber. Logs go to stderr so stdout stays free
    /// for reports.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        let system = Self {
            level: parse_level(&config.logging.level),
            format: LogFormat::parse(&config.logging.format),
        };

        Self::init_logging(&config.logging)?;

        OBSERVABILITY
            .set(system)
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        debug!("Observability system initialized");
        Ok(())
    }

    fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let env_filter = EnvFilter::builder()
            .with_default_directive(parse_level(&config.level).into())
            .from_env_lossy();

        let registry = tracing_subscriber::registry().with(env_filter);

        match LogFormat::parse(&config.format) {
            LogFormat::Json => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr);
                registry.with(json_layer).try_init()?;
            }
            LogFormat::Pretty => {
                let pretty_layer = tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr);
                registry.with(pretty_layer).try_init()?;
            }
        }

        Ok(())
    }

    /// Get the global observability system
    pub fn get() -> Option<&'static ObservabilitySystem> {
        OBSERVABILITY.get()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Generation and execution counters. Recording without an installed
/// recorder is a no-op.
pub struct GenerationMetrics;

impl GenerationMetrics {
    pub fn query_built(entity: &str, complexity: usize) {
        counter!("pqgen_queries_built_total").increment(1);
        counter!("pqgen_queries_built_by_entity_total", "entity" => entity.to_string())
            .increment(1);
        histogram!("pqgen_query_complexity").record(complexity as f64);
    }

    pub fn build_failed(reason: &str) {
        counter!("pqgen_build_failures_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn retry_attempt() {
        counter!("pqgen_retry_attempts_total").increment(1);
    }

    /// `outcome` is one of `non_empty`, `empty`, `error`.
    pub fn execution(outcome: &str) {
        counter!("pqgen_executions_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn duplicates_removed(count: usize) {
        counter!("pqgen_pool_duplicates_removed_total").increment(count as u64);
    }

    pub fn build_duration(duration: Duration) {
        histogram!("pqgen_build_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Records elapsed time into a histogram when dropped.
pub struct PerfTimer {
    start: Instant,
    metric_name: String,
    labels: Vec<(String, String)>,
}

impl PerfTimer {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            metric_name: metric_name.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            let labels: Vec<metrics::Label> = self
                .labels
                .iter()
                .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
                .collect();
            histogram!(self.metric_name.clone(), labels).record(self.start.elapsed().as_secs_f64());
        }
    }
}
