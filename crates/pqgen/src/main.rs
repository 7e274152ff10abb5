//! Binary entry point for the pqgen command line.
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pqgen::{
    GenerateOptions, Generator, ObservabilitySystem, PqgenConfig, QueryFilter, Schema, Validate,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "pqgen",
    version,
    about = "Generate executable pandas query workloads from a relational schema"
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to the relational schema JSON file")]
    schema: PathBuf,

    #[arg(long, help = "The number of queries to generate")]
    num_queries: usize,

    #[arg(long, value_name = "FILE", help = "The file to write the queries to [default: queries.txt]")]
    output_file: Option<PathBuf>,

    #[arg(long, help = "Maximum number of table merges allowed")]
    max_merges: Option<usize>,

    #[arg(long, help = "Maximum number of conditions in selection operations")]
    max_selection_conditions: Option<usize>,

    #[arg(long, help = "Maximum number of columns to project")]
    max_projection_columns: Option<usize>,

    #[arg(long, help = "Maximum number of columns in group by operations")]
    max_groupby_columns: Option<usize>,

    #[arg(long, help = "Probability of including a selection operation")]
    selection_probability: Option<f64>,

    #[arg(long, help = "Probability of including a projection operation")]
    projection_probability: Option<f64>,

    #[arg(long, help = "Probability of including a group by aggregation (0 disables it)")]
    groupby_aggregation_probability: Option<f64>,

    #[arg(long, help = "Format queries on multiple lines")]
    multi_line: bool,

    #[arg(long, help = "Retry each query until it returns rows on the sample data")]
    ensure_non_empty: bool,

    #[arg(long, help = "Generate queries sequentially on one thread")]
    disable_multi_processing: bool,

    #[arg(long, help = "Sort queries by complexity, then text")]
    sort: bool,

    #[arg(long, value_enum, help = "Keep only queries with the given execution outcome")]
    filter: Option<FilterArg>,

    #[arg(long, help = "Rows of sample data generated per entity")]
    sample_rows: Option<usize>,

    #[arg(long, help = "Seed for reproducible output")]
    seed: Option<u64>,

    #[arg(long, value_name = "FILE", help = "Configuration file (TOML or JSON)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Print extra generation information")]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FilterArg {
    NonEmpty,
    Empty,
    HasError,
    WithoutError,
}

impl From<FilterArg> for QueryFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::NonEmpty => QueryFilter::NonEmpty,
            FilterArg::Empty => QueryFilter::Empty,
            FilterArg::HasError => QueryFilter::HasError,
            FilterArg::WithoutError => QueryFilter::WithoutError,
        }
    }
}

impl Cli {
    /// Command line flags take precedence over file and environment settings.
    fn apply(&self, config: &mut PqgenConfig) {
        let structure = &mut config.structure;
        if let Some(v) = self.max_merges {
            structure.max_merges = v;
        }
        if let Some(v) = self.max_selection_conditions {
            structure.max_selection_conditions = v;
        }
        if let Some(v) = self.max_projection_columns {
            structure.max_projection_columns = v;
        }
        if let Some(v) = self.max_groupby_columns {
            structure.max_groupby_columns = v;
        }
        if let Some(v) = self.selection_probability {
            structure.selection_probability = v;
        }
        if let Some(v) = self.projection_probability {
            structure.projection_probability = v;
        }
        if let Some(v) = self.groupby_aggregation_probability {
            structure.groupby_aggregation_probability = v;
        }

        let generation = &mut config.generation;
        generation.num_queries = self.num_queries;
        generation.multi_line |= self.multi_line;
        generation.ensure_non_empty |= self.ensure_non_empty;
        if self.disable_multi_processing {
            generation.parallel = false;
        }
        if let Some(v) = self.sample_rows {
            generation.sample_rows = v;
        }
        if self.seed.is_some() {
            generation.seed = self.seed;
        }
        if let Some(path) = &self.output_file {
            generation.output_file = path.display().to_string();
        }

        if self.verbose {
            config.observability.logging.level = "info".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PqgenConfig::load_from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PqgenConfig::load().context("failed to load configuration")?,
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    ObservabilitySystem::init(&config.observability)?;

    let schema = Schema::from_file(&cli.schema)
        .with_context(|| format!("failed to load schema from {}", cli.schema.display()))?;
    if cli.verbose {
        for entity in schema.entities() {
            println!("{}:", entity.name);
            for (column, range) in entity.data_ranges() {
                println!("  {column}: {range}");
            }
        }
    }

    let generator = Generator::new(
        schema,
        config.structure.clone(),
        config.generation.sample_rows,
        config.generation.seed,
    )?;
    let options = GenerateOptions::from(&config.generation);
    let mut pool = generator
        .generate(&options)
        .await
        .context("query generation failed")?;

    if let Some(filter) = cli.filter {
        pool.filter(filter.into()).await?;
    }
    if cli.sort {
        pool.sort();
    }
    pool.dedup();

    let output = &config.generation.output_file;
    pool.save(output)
        .with_context(|| format!("failed to write queries to {output}"))?;
    info!(queries = pool.len(), output = %output, "Done");

    if cli.verbose {
        if pool.results().is_none() {
            pool.execute().await?;
        }
        println!("\n{}", pool.statistics());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "pqgen",
            "--schema",
            "schema.json",
            "--num-queries",
            "7",
            "--max-merges",
            "4",
            "--groupby-aggregation-probability",
            "0",
            "--disable-multi-processing",
            "--filter",
            "non-empty",
            "--seed",
            "9",
        ]);
        let mut config = PqgenConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.generation.num_queries, 7);
        assert_eq!(config.structure.max_merges, 4);
        assert!(!config.structure.allows_groupby());
        assert!(!config.generation.parallel);
        assert_eq!(config.generation.seed, Some(9));
        assert_eq!(config.generation.output_file, "queries.txt");
        assert!(matches!(cli.filter.map(QueryFilter::from), Some(QueryFilter::NonEmpty)));
    }

    #[test]
    fn test_schema_and_count_are_required() {
        assert!(Cli::try_parse_from(["pqgen", "--num-queries", "3"]).is_err());
        assert!(Cli::try_parse_from(["pqgen", "--schema", "s.json"]).is_err());
    }
}
