//! Configuration management for pqgen

use config::{Config, ConfigError, Environment, File};
use pqgen_core::{PqgenError, QueryStructure, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for pqgen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PqgenConfig {
    /// Shape constraints handed to the query builder
    pub structure: QueryStructure,

    /// Batch generation settings
    pub generation: GenerationConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of queries per batch
    pub num_queries: usize,

    /// Rows generated per entity for the sample data
    pub sample_rows: usize,

    /// Attempts per query slot when non-empty results are required
    pub max_attempts: u32,

    /// Pause between attempts in milliseconds
    pub retry_interval_ms: u64,

    /// Render numbered assignments instead of one chained expression
    pub multi_line: bool,

    /// Retry each slot until its query returns rows
    pub ensure_non_empty: bool,

    /// Build on the blocking thread pool
    pub parallel: bool,

    /// Seed for reproducible batches
    pub seed: Option<u64>,

    /// Where the serialization sink writes
    pub output_file: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_queries: 100,
            sample_rows: 1000,
            max_attempts: 10,
            retry_interval_ms: 0,
            multi_line: false,
            ensure_non_empty: false,
            parallel: true,
            seed: None,
            output_file: "queries.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl PqgenConfig {
    /// Load configuration from `pqgen.toml` (if present) and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("pqgen.toml")
    }

    /// Load configuration from a specific file. Environment variables with the
    /// `PQGEN` prefix override the file, e.g. `PQGEN__STRUCTURE__MAX_MERGES=3`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&PqgenConfig::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder
            .add_source(Environment::with_prefix("PQGEN").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&PqgenConfig::default())?)
            .add_source(Environment::with_prefix("PQGEN").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl Validate for PqgenConfig {
    fn validate(&self) -> pqgen_core::Result<()> {
        self.structure.validate()?;

        let generation = &self.generation;
        for (name, value) in [
            ("num_queries", generation.num_queries),
            ("sample_rows", generation.sample_rows),
            ("max_attempts", generation.max_attempts as usize),
        ] {
            if value == 0 {
                return Err(PqgenError::ConfigError(format!("generation.{name} must be positive")));
            }
        }
        Ok(())
    }
}
