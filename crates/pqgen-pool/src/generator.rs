//! Batch query generation.
//!
//! Every query slot gets its own builder seeded from the batch seed, so a
//! seeded batch yields the same multiset of queries whether slots run
//! sequentially or on the blocking pool. Parallel results arrive in completion
//! order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pqgen_core::{
    ExecutionError, Executor, FrameExecutor, PqgenError, Query, QueryBuilder, QueryStructure,
    Result, SampleData, Schema, Validate,
};
use pqgen_shared::{FixedInterval, GenerationConfig, GenerationMetrics, RetryExecutor};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::pool::QueryPool;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub num_queries: usize,
    pub multi_line: bool,
    /// Retry each slot until its query returns rows, up to `max_attempts`.
    pub ensure_non_empty: bool,
    pub parallel: bool,
    pub max_attempts: u32,
    pub retry_interval: Duration,
    pub seed: Option<u64>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for GenerateOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            num_queries: config.num_queries,
            multi_line: config.multi_line,
            ensure_non_empty: config.ensure_non_empty,
            parallel: config.parallel,
            max_attempts: config.max_attempts,
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            seed: config.seed,
        }
    }
}

pub struct Generator {
    schema: Arc<Schema>,
    structure: QueryStructure,
    data: Arc<SampleData>,
    executor: Arc<dyn Executor>,
}

impl Generator {
    /// Validate the inputs and generate `sample_rows` rows of sample data per
    /// entity.
    pub fn new(
        schema: Schema,
        structure: QueryStructure,
        sample_rows: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        structure.validate()?;
        if schema.is_empty() {
            return Err(PqgenError::EmptySchema);
        }

        let mut rng = seed.map(fastrand::Rng::with_seed).unwrap_or_else(fastrand::Rng::new);
        let data = SampleData::generate(&schema, sample_rows, &mut rng);
        debug!(entities = data.len(), sample_rows, "Generated sample data");

        Ok(Self {
            schema: Arc::new(schema),
            structure,
            data: Arc::new(data),
            executor: Arc::new(FrameExecutor),
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn structure(&self) -> &QueryStructure {
        &self.structure
    }

    pub fn sample_data(&self) -> &Arc<SampleData> {
        &self.data
    }

    #[instrument(skip(self), fields(num_queries = options.num_queries, parallel = options.parallel))]
    pub async fn generate(&self, options: &GenerateOptions) -> Result<QueryPool> {
        let slot = Arc::new(Slot {
            schema: Arc::clone(&self.schema),
            structure: self.structure.clone(),
            data: Arc::clone(&self.data),
            executor: Arc::clone(&self.executor),
            multi_line: options.multi_line,
            ensure_non_empty: options.ensure_non_empty,
            max_attempts: options.max_attempts.max(1),
            retry_interval: options.retry_interval,
        });
        let base_seed = options.seed.unwrap_or_else(|| fastrand::u64(..));
        let seeds = (0..options.num_queries as u64).map(|i| base_seed.wrapping_add(i));

        let mut queries = Vec::with_capacity(options.num_queries);
        if options.parallel {
            let mut tasks = JoinSet::new();
            for seed in seeds {
                let slot = Arc::clone(&slot);
                tasks.spawn_blocking(move || slot.build(seed));
            }
            while let Some(joined) = tasks.join_next().await {
                let built = joined
                    .map_err(|e| PqgenError::InternalError(format!("generation task failed: {e}")))?;
                queries.push(built?);
            }
        } else {
            for seed in seeds {
                queries.push(slot.build(seed)?);
            }
        }

        info!(generated = queries.len(), "Generated queries");
        Ok(QueryPool::new(queries, Arc::clone(&self.data)).with_executor(Arc::clone(&self.executor)))
    }
}

/// Everything one slot needs, shared across blocking tasks.
struct Slot {
    schema: Arc<Schema>,
    structure: QueryStructure,
    data: Arc<SampleData>,
    executor: Arc<dyn Executor>,
    multi_line: bool,
    ensure_non_empty: bool,
    max_attempts: u32,
    retry_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
enum Attempt {
    #[error("query returned no rows")]
    Empty(Query),

    #[error("query failed: {error}")]
    Failed { query: Query, error: ExecutionError },

    #[error(transparent)]
    Build(PqgenError),
}

impl Slot {
    fn build(&self, seed: u64) -> Result<Query> {
        let mut builder =
            QueryBuilder::with_seed(&self.schema, self.structure.clone(), self.multi_line, seed);

        if !self.ensure_non_empty {
            return self.build_once(&mut builder);
        }

        let retry = RetryExecutor::new(FixedInterval::new(self.retry_interval, self.max_attempts));
        match retry.execute(|_| self.attempt(&mut builder)) {
            Ok(query) => Ok(query),
            Err(exhausted) => match exhausted.into_last() {
                Attempt::Empty(query) | Attempt::Failed { query, .. } => {
                    warn!(
                        seed,
                        attempts = self.max_attempts,
                        query = %query.single_line(),
                        "No non-empty query found, keeping the last one"
                    );
                    Ok(query)
                }
                Attempt::Build(err) => Err(err),
            },
        }
    }

    fn build_once(&self, builder: &mut QueryBuilder<'_>) -> Result<Query> {
        let start = Instant::now();
        let built = builder.build();
        GenerationMetrics::build_duration(start.elapsed());

        match &built {
            Ok(query) => GenerationMetrics::query_built(query.entity(), query.complexity()),
            Err(err) => {
                let reason = match err {
                    PqgenError::NoMergeableEntity { .. } => "no_mergeable_entity",
                    PqgenError::EmptySchema => "empty_schema",
                    _ => "other",
                };
                GenerationMetrics::build_failed(reason);
            }
        }
        built
    }

    fn attempt(&self, builder: &mut QueryBuilder<'_>) -> std::result::Result<Query, Attempt> {
        let query = self.build_once(builder).map_err(Attempt::Build)?;
        match self.executor.execute(&query, &self.data) {
            Ok(frame) if !frame.is_empty() => Ok(query),
            Ok(_) => Err(Attempt::Empty(query)),
            Err(error) => Err(Attempt::Failed { query, error }),
        }
    }
}
