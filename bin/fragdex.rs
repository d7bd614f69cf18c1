use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use fragdex::index::{phrase_matches, IndexStatistics};
use fragdex::testing::{check_all_invariants, default_invariants};
use fragdex::{
    IdStrategy, IndexMerger, IndexStore, IndexerConfig, Partitioner, ShardRouter, ShardedIndex,
    StoreFormat, Tokenizer,
};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fragdex")]
#[command(about = "Build, merge and inspect partitioned inverted indexes", long_about = None)]
struct Args {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs)]
struct GlobalArgs {
    /// Data directory; indexes live in <data-dir>/indexes
    #[arg(long, env = "FRAGDEX_DATA_DIR", default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Format for written indexes (text, compressed)
    #[arg(long, env = "FRAGDEX_FORMAT", default_value = "text", global = true)]
    format: String,

    /// Number of partitions a build is split into
    #[arg(long, env = "FRAGDEX_PARTITIONS", default_value = "4", global = true)]
    partitions: usize,

    /// Upper bound on worker threads (defaults to the number of CPUs)
    #[arg(long, env = "FRAGDEX_MAX_CONCURRENCY", global = true)]
    max_concurrency: Option<usize>,

    /// Number of term shards
    #[arg(long, env = "FRAGDEX_SHARDS", default_value = "5", global = true)]
    shards: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Index a file holding one document per line
    Build {
        input: PathBuf,
        #[arg(long, default_value = "global")]
        output: String,
        /// Reserve fixed id blocks of this size per partition
        #[arg(long)]
        block_capacity: Option<u64>,
        /// First document id to hand out
        #[arg(long, default_value = "0")]
        first_doc_id: u64,
    },
    /// Merge fragment files into one stored index
    Merge {
        #[arg(required = true)]
        fragments: Vec<PathBuf>,
        #[arg(long, default_value = "global")]
        output: String,
    },
    /// Documents containing a word
    Search {
        word: String,
        #[arg(long, default_value = "global")]
        index: String,
    },
    /// Documents containing a phrase
    Phrase {
        phrase: String,
        #[arg(long, default_value = "global")]
        index: String,
    },
    /// Stored indexes and their sizes
    List,
    /// Raw frequency statistics of a stored index
    Stats {
        #[arg(long, default_value = "global")]
        index: String,
        #[arg(long, default_value = "10")]
        top: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check structural invariants of a stored index
    Verify {
        #[arg(long, default_value = "global")]
        index: String,
    },
    /// Split a stored index into term shards
    Shard {
        #[arg(long, default_value = "global")]
        index: String,
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = indexer_config(&args.global)?;
    config.validate()?;

    let store = IndexStore::open(config.index_dir(), config.store_format)
        .with_context(|| format!("opening index directory {:?}", config.index_dir()))?;

    match args.command {
        Command::Build {
            input,
            output,
            block_capacity,
            first_doc_id,
        } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("reading documents from {:?}", input))?;
            let docs: Vec<&str> = text.lines().collect();

            let mut partition_config = config.partition_config();
            partition_config.first_doc_id = first_doc_id;
            if let Some(capacity) = block_capacity {
                partition_config.id_strategy = IdStrategy::FixedBlock { capacity };
            }

            let index = Partitioner::new(partition_config)?.build_and_merge(&docs)?;
            store.save(&output, &index)?;
            info!(
                "Indexed {} documents into '{}' ({} terms)",
                docs.len(),
                output,
                index.term_count()
            );
        }
        Command::Merge { fragments, output } => {
            let merger = IndexMerger::new(config.merge_config())?;
            let outcome = merger.merge_into(&fragments, &store, &output)?;
            println!(
                "{}: {} fragments, {} terms, {} postings",
                output, outcome.fragments, outcome.terms, outcome.postings
            );
        }
        Command::Search { word, index } => {
            let index = store.load(&index)?;
            let tokenizer = Tokenizer::new();
            let Some(term) = tokenizer.single_term(&word) else {
                match tokenizer.terms(&word).len() {
                    0 => bail!("'{}' has no indexable characters", word),
                    n => bail!("'{}' is {} words; use `phrase` to match them together", word, n),
                }
            };
            print_ids(&index.doc_ids(&term));
        }
        Command::Phrase { phrase, index } => {
            let index = store.load(&index)?;
            let terms = Tokenizer::new().terms(&phrase);
            if terms.is_empty() {
                warn!("Phrase '{}' has no indexable terms", phrase);
            }
            print_ids(&phrase_matches(&index, &terms));
        }
        Command::List => {
            for name in store.list()? {
                println!("{}\t{}", name, store.size_of(&name)?);
            }
        }
        Command::Stats { index, top, json } => {
            let stats = IndexStatistics::from_index(&store.load(&index)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("documents:   {}", stats.doc_count);
                println!("terms:       {}", stats.term_count);
                println!("postings:    {}", stats.posting_count);
                println!("avg length:  {:.2}", stats.avg_doc_length());
                for (term, term_stats) in stats.top_terms(top) {
                    println!(
                        "  {}\tdf={}\tcf={}",
                        term, term_stats.document_frequency, term_stats.collection_frequency
                    );
                }
            }
        }
        Command::Verify { index: name } => {
            let index = store.load(&name)?;
            let violations = check_all_invariants(&index, &default_invariants());
            if !violations.is_empty() {
                for violation in &violations {
                    eprint!("{}", violation);
                }
                bail!("{} invariant violations in '{}'", violations.len(), name);
            }
            println!("{}: ok ({} terms)", name, index.term_count());
        }
        Command::Shard { index: name, prefix } => {
            let index = store.load(&name)?;
            let router = ShardRouter::new(config.shard_count)?;
            let sharded = ShardedIndex::from_index(router, &index);
            let prefix = prefix.unwrap_or_else(|| name.clone());
            sharded.save(&store, &prefix)?;
            for shard_id in 0..sharded.shard_count() {
                let terms = sharded
                    .shard_snapshot(shard_id)
                    .map(|s| s.term_count())
                    .unwrap_or(0);
                println!("{}.shard-{}\t{} terms", prefix, shard_id, terms);
            }
        }
    }

    Ok(())
}

fn indexer_config(args: &GlobalArgs) -> Result<IndexerConfig> {
    let format: StoreFormat = args.format.parse()?;
    let mut config = IndexerConfig::new(args.data_dir.clone())
        .with_partitions(args.partitions)
        .with_shard_count(args.shards)
        .with_store_format(format);
    if let Some(max) = args.max_concurrency {
        config = config.with_max_concurrency(max);
    }
    Ok(config)
}

fn print_ids(ids: &[u64]) {
    let rendered: Vec<String> = ids.iter().map(u64::to_string).collect();
    println!("{}", rendered.join(" "));
}
