//! Batch execution, filtering, deduplication and ordering of built queries.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use pqgen_core::{
    ExecutionResult, Executor, FrameExecutor, Outcome, PqgenError, Query, Result, SampleData,
};
use pqgen_shared::{GenerationMetrics, PerfTimer};
use tracing::{debug, info, instrument};

use crate::sink;
use crate::stats::QueryStatistics;

/// Which queries `QueryPool::filter` keeps.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryFilter {
    NonEmpty,
    Empty,
    HasError,
    WithoutError,
}

impl QueryFilter {
    fn keeps(self, result: &ExecutionResult) -> bool {
        let outcome = Outcome::of(result);
        match self {
            QueryFilter::NonEmpty => outcome == Outcome::NonEmpty,
            QueryFilter::Empty => outcome == Outcome::Empty,
            QueryFilter::HasError => outcome == Outcome::Error,
            QueryFilter::WithoutError => outcome != Outcome::Error,
        }
    }
}

impl FromStr for QueryFilter {
    type Err = PqgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "non-empty" => Ok(QueryFilter::NonEmpty),
            "empty" => Ok(QueryFilter::Empty),
            "has-error" => Ok(QueryFilter::HasError),
            "without-error" => Ok(QueryFilter::WithoutError),
            other => Err(PqgenError::ConfigError(format!("unknown query filter `{other}`"))),
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            QueryFilter::NonEmpty => "non-empty",
            QueryFilter::Empty => "empty",
            QueryFilter::HasError => "has-error",
            QueryFilter::WithoutError => "without-error",
        })
    }
}

/// A batch of queries plus, once executed, one result per query at the same
/// index.
pub struct QueryPool {
    queries: Vec<Query>,
    results: Option<Vec<ExecutionResult>>,
    data: Arc<SampleData>,
    executor: Arc<dyn Executor>,
}

impl QueryPool {
    pub fn new(queries: Vec<Query>, data: Arc<SampleData>) -> Self {
        Self { queries, results: None, data, executor: Arc::new(FrameExecutor) }
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self.results = None;
        self
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn into_queries(self) -> Vec<Query> {
        self.queries
    }

    pub fn sample_data(&self) -> &SampleData {
        &self.data
    }

    /// Execute every query on the blocking pool. Results keep query order.
    #[instrument(skip(self), fields(queries = self.queries.len()))]
    pub async fn execute(&mut self) -> Result<&[ExecutionResult]> {
        let _timer = PerfTimer::new("pqgen_pool_execute_seconds");

        let handles: Vec<_> = self
            .queries
            .iter()
            .cloned()
            .map(|query| {
                let data = Arc::clone(&self.data);
                let executor = Arc::clone(&self.executor);
                tokio::task::spawn_blocking(move || executor.execute(&query, &data))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| PqgenError::InternalError(format!("execution task failed: {e}")))?;
            GenerationMetrics::execution(&Outcome::of(&result).to_string());
            results.push(result);
        }

        info!(executed = results.len(), "Executed query pool");
        Ok(self.results.insert(results))
    }

    /// Results of the last `execute`, if any.
    pub fn results(&self) -> Option<&[ExecutionResult]> {
        self.results.as_deref()
    }

    pub fn items(&self) -> impl Iterator<Item = (&Query, Option<&ExecutionResult>)> {
        self.queries
            .iter()
            .enumerate()
            .map(|(i, q)| (q, self.results.as_ref().and_then(|r| r.get(i))))
    }

    /// Keep only queries whose result matches `filter`, executing first when
    /// needed.
    pub async fn filter(&mut self, filter: QueryFilter) -> Result<()> {
        if self.results.is_none() {
            self.execute().await?;
        }
        let results = self.results.take().unwrap_or_default();
        let before = self.queries.len();

        let (queries, results): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queries)
            .into_iter()
            .zip(results)
            .filter(|(_, result)| filter.keeps(result))
            .unzip();

        debug!(%filter, before, after = queries.len(), "Filtered query pool");
        self.queries = queries;
        self.results = Some(results);
        Ok(())
    }

    /// Drop later queries equal to an earlier one. Returns how many were
    /// removed.
    pub fn dedup(&mut self) -> usize {
        let mut seen = HashSet::new();
        let keep: Vec<bool> = self.queries.iter().map(|q| seen.insert(q.clone())).collect();
        let removed = keep.iter().filter(|k| !**k).count();

        let mut flags = keep.iter();
        self.queries.retain(|_| flags.next().copied().unwrap_or(true));
        if let Some(results) = &mut self.results {
            let mut flags = keep.iter();
            results.retain(|_| flags.next().copied().unwrap_or(true));
        }

        if removed > 0 {
            GenerationMetrics::duplicates_removed(removed);
            debug!(removed, "Removed duplicate queries");
        }
        removed
    }

    /// Order by complexity, then rendered text, moving results alongside.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.queries.len()).collect();
        order.sort_by(|&a, &b| self.queries[a].cmp(&self.queries[b]));

        let mut queries: Vec<Option<Query>> = std::mem::take(&mut self.queries).into_iter().map(Some).collect();
        self.queries = order.iter().filter_map(|&i| queries[i].take()).collect();

        if let Some(results) = self.results.take() {
            let mut results: Vec<Option<ExecutionResult>> = results.into_iter().map(Some).collect();
            self.results = Some(order.iter().filter_map(|&i| results[i].take()).collect());
        }
    }

    pub fn statistics(&self) -> QueryStatistics {
        QueryStatistics::collect(&self.queries, self.results())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        sink::save_queries(path, &self.queries)
    }
}
