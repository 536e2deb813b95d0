use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use docvec::{
    scan_corpus, CacheCapacity, CommandTokenizer, CorpusConfig, DocVecModel, FailurePolicy,
    LabelExtractor, MarkupTokenizer, RepeatableCorpus, ScanConfig, TaggedCorpus, Tokenizer,
    Trainer, TrainerBuilder, TrainerConfig,
};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde_json::json;

const DEFAULT_OUTPUT: &str = "model.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Paragraph-vector training over labelled documents", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the documents and labels discovered under a corpus root
    Scan(ScanArgs),
    /// Train label vectors over a corpus root
    Train(TrainArgs),
    /// Inspect a saved model
    Info(InfoArgs),
    /// Rank labels by similarity to a given label
    Similar(SimilarArgs),
}

#[derive(Args, Debug)]
struct DiscoveryArgs {
    /// Corpus root, scanned recursively
    root: PathBuf,

    /// File extension that marks a document
    #[arg(long, value_name = "EXT", default_value = "html")]
    extension: String,

    /// Stop discovery after this many documents
    #[arg(long, value_name = "COUNT")]
    max_documents: Option<usize>,

    /// Follow symbolic links while scanning
    #[arg(long)]
    follow_symlinks: bool,

    /// Keep filesystem order instead of sorting by file name
    #[arg(long)]
    unsorted: bool,
}

impl DiscoveryArgs {
    fn scan_config(&self) -> Result<ScanConfig> {
        let cfg = ScanConfig::builder()
            .extension(self.extension.clone())
            .max_documents(self.max_documents)
            .follow_symlinks(self.follow_symlinks)
            .sort_by_name(!self.unsorted)
            .build()?;
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Emit one JSON object per document
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OnTokenizeError {
    /// Log the failure and leave the document out of every pass
    Skip,
    /// Abort the run
    Abort,
}

impl From<OnTokenizeError> for FailurePolicy {
    fn from(value: OnTokenizeError) -> Self {
        match value {
            OnTokenizeError::Skip => FailurePolicy::Skip,
            OnTokenizeError::Abort => FailurePolicy::Abort,
        }
    }
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,

    /// Output path for the model JSON
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Trainer configuration JSON; flags below override its fields
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Vector dimensionality
    #[arg(long, value_name = "DIM")]
    vector_size: Option<usize>,

    /// Context words on each side of the predicted word
    #[arg(long, value_name = "WORDS")]
    window: Option<usize>,

    /// Minimum corpus frequency for a word to be kept
    #[arg(long, value_name = "COUNT")]
    min_count: Option<usize>,

    /// Worker threads used while counting the vocabulary
    #[arg(long, value_name = "COUNT")]
    workers: Option<usize>,

    /// Number of training epochs
    #[arg(long, value_name = "COUNT")]
    epochs: Option<usize>,

    /// Initial learning rate
    #[arg(long, value_name = "RATE")]
    alpha: Option<f32>,

    /// Learning rate at the end of the first epoch
    #[arg(long, value_name = "RATE")]
    min_alpha: Option<f32>,

    /// Learning rate decrement applied after each epoch
    #[arg(long, value_name = "RATE")]
    alpha_decay: Option<f32>,

    /// Lowest learning rate the decrement may reach
    #[arg(long, value_name = "RATE")]
    alpha_floor: Option<f32>,

    /// Negative samples per predicted word
    #[arg(long, value_name = "COUNT")]
    negative: Option<usize>,

    /// Random seed
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// External tokenizer program; receives the document path as its last argument
    #[arg(long, value_name = "PROGRAM")]
    tokenizer_command: Option<PathBuf>,

    /// Argument passed to the tokenizer program before the path (repeat flag)
    #[arg(long = "tokenizer-arg", value_name = "ARG", requires = "tokenizer_command")]
    tokenizer_args: Vec<String>,

    /// What to do when a document cannot be tokenized
    #[arg(long, value_enum, default_value_t = OnTokenizeError::Skip)]
    on_tokenize_error: OnTokenizeError,

    /// Cache at most this many tokenized documents; the rest are re-tokenized every pass
    #[arg(long, value_name = "COUNT")]
    cache_capacity: Option<usize>,

    /// Log pass progress every this many documents (0 = never)
    #[arg(long, value_name = "COUNT", default_value_t = 1000)]
    progress_interval: usize,

    /// Write one vector file per label into this directory
    #[arg(long, value_name = "DIR")]
    export_vectors: Option<PathBuf>,

    /// File name prefix for exported vectors
    #[arg(long, value_name = "PREFIX", default_value = "")]
    vector_prefix: String,

    /// Write training metrics JSON to this path
    #[arg(long, value_name = "PATH")]
    metrics: Option<PathBuf>,

    /// Disable per-epoch logging and the spinner
    #[arg(long)]
    no_progress: bool,

    /// Pretty-print the model JSON
    #[arg(long)]
    pretty: bool,
}

impl TrainArgs {
    fn trainer_config(&self) -> Result<TrainerConfig> {
        let base = match &self.config {
            Some(path) => TrainerConfig::from_json_file(path)
                .with_context(|| format!("failed to load trainer config {}", path.display()))?,
            None => TrainerConfig::default(),
        };
        let mut cfg = TrainerBuilder::from_config(base.clone());
        if let Some(value) = self.vector_size {
            cfg = cfg.vector_size(value);
        }
        if let Some(value) = self.window {
            cfg = cfg.window(value);
        }
        if let Some(value) = self.min_count {
            cfg = cfg.min_count(value);
        }
        if let Some(value) = self.workers {
            cfg = cfg.workers(value);
        }
        if let Some(value) = self.epochs {
            cfg = cfg.epochs(value);
        }
        if self.alpha.is_some() || self.min_alpha.is_some() {
            let alpha = self.alpha.unwrap_or(base.alpha);
            cfg = cfg.learning_rate(alpha, self.min_alpha.unwrap_or(alpha));
        }
        if self.alpha_decay.is_some() || self.alpha_floor.is_some() {
            cfg = cfg.decay(
                self.alpha_decay.unwrap_or(base.alpha_decay),
                self.alpha_floor.unwrap_or(base.alpha_floor),
            );
        }
        if let Some(value) = self.negative {
            cfg = cfg.negative(value);
        }
        if let Some(value) = self.seed {
            cfg = cfg.seed(value);
        }
        if self.no_progress {
            cfg = cfg.show_progress(false);
        }
        Ok(cfg.build()?)
    }

    fn corpus_config(&self) -> CorpusConfig {
        let capacity = match self.cache_capacity {
            Some(limit) => CacheCapacity::Bounded(limit),
            None => CacheCapacity::Unbounded,
        };
        CorpusConfig::builder()
            .progress_interval(self.progress_interval)
            .failure_policy(self.on_tokenize_error.into())
            .cache_capacity(capacity)
            .build()
    }

    fn tokenizer(&self) -> Box<dyn Tokenizer> {
        match &self.tokenizer_command {
            Some(program) => {
                Box::new(CommandTokenizer::new(program).args(self.tokenizer_args.iter()))
            }
            None => Box::new(MarkupTokenizer::new()),
        }
    }
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Model JSON to inspect
    #[arg(short = 'm', long, value_name = "PATH")]
    model: PathBuf,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SimilarArgs {
    /// Model JSON to query
    #[arg(short = 'm', long, value_name = "PATH")]
    model: PathBuf,

    /// Label to compare against
    label: String,

    /// Number of neighbours to print
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    top: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Scan(args) => run_scan(args),
        Commands::Train(args) => run_train(args),
        Commands::Info(args) => run_info(args),
        Commands::Similar(args) => run_similar(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn discover(args: &DiscoveryArgs) -> Result<Vec<docvec::DocumentRef>> {
    let scan_cfg = args.scan_config()?;
    let documents = scan_corpus(&args.root, &scan_cfg, &LabelExtractor::default())
        .with_context(|| format!("failed to scan {}", args.root.display()))?;
    Ok(documents)
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let documents = discover(&args.discovery)?;
    for doc in &documents {
        if args.json {
            println!("{}", serde_json::to_string(doc)?);
        } else {
            println!("{}\t{}", doc.label(), doc.path().display());
        }
    }
    if !args.json {
        let labels: std::collections::BTreeSet<&str> =
            documents.iter().map(|doc| doc.label()).collect();
        println!("{} documents, {} labels", documents.len(), labels.len());
    }
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    let trainer_cfg = args.trainer_config()?;
    let documents = discover(&args.discovery)?;
    if documents.is_empty() {
        warn!(
            "no .{} documents found under {}",
            args.discovery.extension,
            args.discovery.root.display()
        );
    }
    let document_count = documents.len();
    let mut corpus = TaggedCorpus::new(documents, args.tokenizer(), args.corpus_config());

    let spinner = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} training label vectors... {elapsed}")
            .context("invalid spinner template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    };

    let trainer = Trainer::new(trainer_cfg);
    let start = Instant::now();
    let result = trainer.train(&mut corpus);
    if let Some(pb) = spinner {
        match &result {
            Ok(_) => pb.finish_with_message("training complete"),
            Err(_) => pb.abandon_with_message("training failed"),
        }
    }
    let artifacts = result.context("training failed")?;
    let elapsed = start.elapsed();

    let stats = corpus.stats();
    info!(
        "training complete: documents={document_count} cached={} skipped={} tokenizer_calls={} duration={elapsed:.2?}",
        corpus.cache().documents(),
        stats.documents_skipped,
        stats.tokenizer_calls
    );

    let json = artifacts.model.to_json(args.pretty)?;
    fs::write(&args.output, json)
        .with_context(|| format!("failed to save model to {}", args.output.display()))?;

    if let Some(path) = &args.metrics {
        let metrics = serde_json::to_string_pretty(&artifacts.metrics)?;
        fs::write(path, metrics)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }

    if let Some(dir) = &args.export_vectors {
        let written = artifacts
            .model
            .export_label_vectors(dir, &args.vector_prefix)
            .with_context(|| format!("failed to export vectors to {}", dir.display()))?;
        info!("exported {} label vectors to {}", written.len(), dir.display());
    }

    println!(
        "wrote model with {} labels, {} words, {} dimensions to {}",
        artifacts.model.labels().len(),
        artifacts.model.vocab_size(),
        artifacts.model.vector_size(),
        args.output.display()
    );
    println!(
        "   documents {} | epochs {} | tokenizer calls {} | duration {:.2?}",
        document_count,
        artifacts.metrics.epochs.len(),
        artifacts.metrics.tokenizer_calls(),
        elapsed
    );
    Ok(())
}

fn load(path: &Path) -> Result<DocVecModel> {
    DocVecModel::load(path).with_context(|| format!("failed to load model {}", path.display()))
}

fn run_info(args: InfoArgs) -> Result<()> {
    let model = load(&args.model)?;
    let cfg = model.trainer_config();
    let summary = json!({
        "path": args.model.display().to_string(),
        "vector_size": model.vector_size(),
        "vocab_size": model.vocab_size(),
        "labels": model.labels().len(),
        "documents": model.corpus_documents(),
        "epochs_trained": model.epochs_trained(),
        "window": cfg.window,
        "min_count": cfg.min_count,
        "top_words": model.vocab().iter().take(10).collect::<Vec<_>>(),
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Vector size  : {}", model.vector_size());
        println!("Vocab size   : {}", model.vocab_size());
        println!("Labels       : {}", model.labels().len());
        println!("Documents    : {}", model.corpus_documents());
        println!("Epochs       : {}", model.epochs_trained());
        println!("Window       : {}", cfg.window);
        println!("Min count    : {}", cfg.min_count);
        let preview: Vec<&str> = model.vocab().iter().take(10).map(String::as_str).collect();
        if !preview.is_empty() {
            println!("Top words    : {}", preview.join(", "));
        }
    }
    Ok(())
}

fn run_similar(args: SimilarArgs) -> Result<()> {
    if args.top == 0 {
        return Err(anyhow!("--top must be greater than zero"));
    }
    let model = load(&args.model)?;
    let neighbours = model.most_similar(&args.label, args.top)?;
    for (label, score) in neighbours {
        println!("{score:.4}\t{label}");
    }
    Ok(())
}
