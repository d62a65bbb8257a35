// CLI Interface
//
// This module provides the command-line interface for LeCanard.

use crate::config::{DbArgs, FileConfig};
use anyhow::{anyhow, bail, Context, Result as AnyhowResult};
use clap::{Parser, Subcommand, ValueEnum};
use lerecherche::{
    default_run_tag, finalize, preflight, write_run_file, SearchMode, SearchOptions, SearchPlan,
    Searcher, DEFAULT_RRF_K, DEFAULT_TOP_N,
};
use lestockage::{
    infer_dimension, load_path, open_store, read_records, Analyzer, EnglishAnalyzer, LoadOptions,
    SearchResult, StoreConfig, TableName, TableShape, DEFAULT_BATCH_SIZE,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// LeCanard - Sparse, dense, and hybrid retrieval benchmarks
#[derive(Parser, Debug)]
#[command(name = "lecanard")]
#[command(author = "LeCanard Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Index corpora into DuckDB, SQLite, or Postgres and write TREC runs", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./lecanard.toml when present)
    #[arg(global = true, long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Database settings
    #[command(flatten)]
    pub db: DbArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Kind of table to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexType {
    /// Text only, searched lexically
    Sparse,
    /// Embeddings only, searched by similarity
    Dense,
    /// Text and embeddings in one table
    Hybrid,
}

impl From<IndexType> for TableShape {
    fn from(index_type: IndexType) -> Self {
        match index_type {
            IndexType::Sparse => TableShape::Lexical,
            IndexType::Dense => TableShape::Vector,
            IndexType::Hybrid => TableShape::Both,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a corpus or query file into a table
    Index {
        /// JSONL or TSV file (optionally gzipped), Parquet file, or a directory of them
        #[arg(long = "input", short = 'i', value_name = "PATH")]
        input: PathBuf,

        /// Columns to create
        #[arg(long = "index-type", value_enum, default_value = "sparse")]
        index_type: IndexType,

        /// Table name (defaults to the input file stem)
        #[arg(long = "index", value_name = "NAME")]
        index: Option<String>,

        /// Contents are already tokenized
        #[arg(long = "pretokenized")]
        pretokenized: bool,

        /// Embedding width (inferred from the first vector when omitted)
        #[arg(long = "dimension")]
        dimension: Option<usize>,

        /// Rows per insert batch
        #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Run every topic against one or two tables and write a run file
    Search {
        /// Topics file (JSONL or TSV)
        #[arg(long = "topics", short = 't', value_name = "PATH")]
        topics: PathBuf,

        /// sparse, dense, or hybrid (detected from the tables when omitted)
        #[arg(long = "search-method", value_parser = parse_search_mode)]
        search_method: Option<SearchMode>,

        /// Table(s) to search; hybrid takes a lexical and a vector table
        #[arg(long = "index", num_args = 1.., required = true, value_name = "NAME")]
        index: Vec<String>,

        /// Topics are already tokenized
        #[arg(long = "pretokenized")]
        pretokenized: bool,

        /// Results per query
        #[arg(long = "hits")]
        hits: Option<usize>,

        /// RRF smoothing constant
        #[arg(long = "rrf-k")]
        rrf_k: Option<u32>,

        /// Run file to write
        #[arg(long = "output", short = 'o', value_name = "PATH")]
        output: PathBuf,

        /// Label written in the last column (defaults to `<method>_<db>`)
        #[arg(long = "run-tag")]
        run_tag: Option<String>,

        /// Table holding query vectors by query id
        #[arg(long = "query-table", value_name = "NAME")]
        query_table: Option<String>,

        /// Log and skip queries that fail instead of aborting
        #[arg(long = "skip-failed")]
        skip_failed: bool,
    },

    /// Write analyzed text as JSONL for pretokenized runs
    Tokenize {
        /// JSONL or TSV input
        #[arg(long = "input", short = 'i', value_name = "PATH")]
        input: PathBuf,

        /// JSONL output
        #[arg(long = "output", short = 'o', value_name = "PATH")]
        output: PathBuf,
    },
}

fn parse_search_mode(s: &str) -> Result<SearchMode, String> {
    s.parse::<SearchMode>().map_err(|e| e.to_string())
}

impl Cli {
    /// Run the CLI
    pub fn run(self) -> AnyhowResult<()> {
        init_logging_impl(self.verbose);

        let file = FileConfig::load(self.config.as_deref())?;
        let store_config = self.db.resolve(&file)?;
        debug!("Using {} backend", store_config.backend);

        match self.command {
            Commands::Index {
                input,
                index_type,
                index,
                pretokenized,
                dimension,
                batch_size,
            } => cmd_index_impl(
                &store_config,
                IndexArgs {
                    input,
                    shape: index_type.into(),
                    index,
                    pretokenized,
                    dimension,
                    batch_size,
                },
            ),
            Commands::Search {
                topics,
                search_method,
                index,
                pretokenized,
                hits,
                rrf_k,
                output,
                run_tag,
                query_table,
                skip_failed,
            } => cmd_search_impl(
                &store_config,
                SearchArgs {
                    topics,
                    search_method,
                    index,
                    options: SearchOptions {
                        top_n: hits.or(file.search.hits).unwrap_or(DEFAULT_TOP_N),
                        rrf_k: rrf_k.or(file.search.rrf_k).unwrap_or(DEFAULT_RRF_K),
                        pretokenized,
                    },
                    output,
                    run_tag,
                    query_table,
                    skip_failed,
                },
            ),
            Commands::Tokenize { input, output } => cmd_tokenize_impl(&input, &output),
        }
    }
}

/// Initialize logging: `RUST_LOG` wins, else info (debug with `--verbose`)
fn init_logging_impl(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Parsed `index` arguments
#[derive(Debug, Clone)]
pub struct IndexArgs {
    /// Input file or directory
    pub input: PathBuf,
    /// Table shape
    pub shape: TableShape,
    /// Table name
    pub index: Option<String>,
    /// Skip analysis
    pub pretokenized: bool,
    /// Embedding width
    pub dimension: Option<usize>,
    /// Rows per insert batch
    pub batch_size: usize,
}

/// Parsed `search` arguments
#[derive(Debug, Clone)]
pub struct SearchArgs {
    /// Topics file
    pub topics: PathBuf,
    /// Explicit mode
    pub search_method: Option<SearchMode>,
    /// Tables to search
    pub index: Vec<String>,
    /// Per-query options
    pub options: SearchOptions,
    /// Run file
    pub output: PathBuf,
    /// Run label
    pub run_tag: Option<String>,
    /// Query vector table
    pub query_table: Option<String>,
    /// Skip failing queries
    pub skip_failed: bool,
}

/// Table name from the explicit flag or the input file stem
fn table_name_for(index: Option<&str>, input: &Path) -> AnyhowResult<TableName> {
    let raw = match index {
        Some(name) => name.to_string(),
        None => input
            .file_name()
            .map(|name| name.to_string_lossy().split('.').next().unwrap_or_default().to_string())
            .ok_or_else(|| anyhow!("Cannot derive a table name from {:?}; pass --index", input))?,
    };
    Ok(TableName::new(&raw)?)
}

/// Index command implementation
pub fn cmd_index_impl(store_config: &StoreConfig, args: IndexArgs) -> AnyhowResult<()> {
    let table = table_name_for(args.index.as_deref(), &args.input)?;
    let mut store = open_store(store_config).context("Failed to open store")?;

    if !store.capabilities().supports_shape(args.shape) {
        bail!("{} cannot hold {} tables", store.backend(), args.shape);
    }

    let dimension = if args.shape.has_vector() {
        match args.dimension {
            Some(dim) => Some(dim),
            None => infer_dimension(&args.input)
                .with_context(|| format!("Failed to read {:?}", args.input))?,
        }
        .ok_or_else(|| anyhow!("No vector found in {:?}; pass --dimension", args.input))?
    } else {
        0
    };

    info!("Indexing {:?} into {} ({})", args.input, table, args.shape);
    let start = Instant::now();

    store.init_table(&table, args.shape, dimension)?;

    let analyzer = EnglishAnalyzer::new();
    let options = LoadOptions::new(args.shape, &analyzer)
        .pretokenized(args.pretokenized)
        .with_embedding_dim(args.shape.has_vector().then_some(dimension))
        .with_batch_size(args.batch_size);
    let stats = load_path(&mut *store, &table, &args.input, &options)
        .with_context(|| format!("Failed to load {:?}", args.input))?;

    if args.shape.has_lexical() {
        store.build_lexical_index(&table)?;
    }
    let rows = store.row_count(&table)?;

    println!("\n✓ Indexing complete!");
    println!("  Table: {}", table);
    println!("  Rows: {}", rows);
    println!("  Skipped: {}", stats.skipped);
    println!("  Time: {}ms", start.elapsed().as_millis());
    Ok(())
}

/// Search command implementation
pub fn cmd_search_impl(store_config: &StoreConfig, args: SearchArgs) -> AnyhowResult<()> {
    let tables = args
        .index
        .iter()
        .map(|name| TableName::new(name))
        .collect::<Result<Vec<_>, _>>()?;
    let query_table = args.query_table.as_deref().map(TableName::new).transpose()?;
    preflight(args.search_method, tables.len(), store_config.backend)?;

    let mut store = open_store(store_config).context("Failed to open store")?;
    let plan = SearchPlan::resolve(&mut *store, args.search_method, &tables)?;
    let mode = plan.mode();
    let run_tag = args
        .run_tag
        .clone()
        .unwrap_or_else(|| default_run_tag(mode, store.backend()));
    info!("Running {} search as {}", mode, run_tag);

    let analyzer = EnglishAnalyzer::new();
    let searcher = Searcher::new(plan, &analyzer)
        .with_options(args.options)
        .with_query_table(query_table);

    let topics = read_records(&args.topics).with_context(|| format!("Failed to read {:?}", args.topics))?;
    let start = Instant::now();
    let mut per_query: Vec<(String, Vec<SearchResult>)> = Vec::new();
    let mut failed = 0usize;

    for topic in topics {
        let query = match topic {
            Ok(query) => query,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping topic: {}", e);
                continue;
            }
        };

        match searcher.search(&mut *store, &query) {
            Ok(results) => per_query.push((query.id, results)),
            Err(e) if args.skip_failed && !e.is_configuration() => {
                warn!("Skipping query {}: {}", query.id, e);
                failed += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Query {} failed", query.id)),
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let queries = per_query.len();
    if elapsed > 0.0 {
        info!("Searched {} queries in {:.2}s ({:.1} q/s)", queries, elapsed, queries as f64 / elapsed);
    }

    let lines = finalize(per_query, &run_tag);
    write_run_file(&args.output, &lines).with_context(|| format!("Failed to write {:?}", args.output))?;

    println!("\n✓ Search complete!");
    println!("  Queries: {}", queries);
    if failed > 0 {
        println!("  Failed: {}", failed);
    }
    println!("  Lines: {}", lines.len());
    println!("  Run: {}", args.output.display());
    Ok(())
}

/// Tokenize command implementation
pub fn cmd_tokenize_impl(input: &Path, output: &Path) -> AnyhowResult<()> {
    let analyzer = EnglishAnalyzer::new();
    let records = read_records(input).with_context(|| format!("Failed to read {:?}", input))?;
    let file = File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;

    for record in records {
        let mut doc = match record {
            Ok(doc) => doc,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping record: {}", e);
                continue;
            }
        };
        doc.contents = doc.contents.as_deref().map(|text| analyzer.tokenize(text));
        serde_json::to_writer(&mut writer, &doc)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;

    info!("Tokenized {} records into {:?}", written, output);
    println!("✓ Tokenized {} records", written);
    Ok(())
}

/// Main entry point for the CLI
pub fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();
    cli.run()
}
