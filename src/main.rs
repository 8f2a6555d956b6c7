//! lyric-kmeans CLI - cluster a TF-IDF corpus across in-process ranks

use clap::{Args, Parser, Subcommand};
use lyric_kmeans::group::Group;
use lyric_kmeans::telemetry::{AnsiRenderer, GridLayout};
use lyric_kmeans::{
    ClusterConfig, ClusterError, ClusteringResult, Coordinator, Corpus, LocalEndpoint,
    LocalGroup, RankOutcome, ReductionStrategy, ReportWriter, Reporter, TelemetryConfig,
    TelemetryPump, TelemetryTask, ROOT,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lyric-kmeans")]
#[command(about = "Distributed cosine k-means over sparse TF-IDF vectors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a corpus read from a track/word/tfidf TSV file
    Run {
        /// Input file with `track_id<TAB>word<TAB>tfidf` rows
        input: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Cluster a synthetic corpus
    Demo {
        /// Number of documents
        #[arg(long, default_value_t = 2000)]
        docs: usize,

        /// Vocabulary size
        #[arg(long, default_value_t = 500)]
        vocabulary: usize,

        /// Terms drawn per document
        #[arg(long, default_value_t = 25)]
        terms: usize,

        /// Seed of the corpus generator
        #[arg(long, default_value_t = 7)]
        corpus_seed: u64,

        #[command(flatten)]
        options: RunOptions,
    },
}

#[derive(Args, Clone)]
struct RunOptions {
    /// Number of clusters
    #[arg(short, long, default_value_t = 6)]
    k: usize,

    /// Number of ranks
    #[arg(short = 'n', long, default_value_t = 4)]
    ranks: usize,

    /// Output prefix; reports go to PREFIX.centroids.txt and PREFIX.clusters.txt
    #[arg(short, long, default_value = "kmeans")]
    output: PathBuf,

    /// Weight each rank's partial centroid by its member count
    #[arg(long)]
    count_weighted: bool,

    /// Seed of the initial centroid selection
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many passes
    #[arg(long)]
    max_passes: Option<usize>,

    /// Fail if a collective waits longer than this many seconds
    #[arg(long)]
    stall_timeout: Option<u64>,

    /// Write PREFIX.checkpoint after every pass
    #[arg(long)]
    checkpoint: bool,

    /// Disable the live status display
    #[arg(short, long)]
    quiet: bool,
}

impl RunOptions {
    fn cluster_config(&self) -> ClusterConfig {
        let mut config = ClusterConfig::new(self.k);
        if self.count_weighted {
            config = config.with_reduction(ReductionStrategy::CountWeighted);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(max) = self.max_passes {
            config = config.with_max_passes(max);
        }
        if let Some(secs) = self.stall_timeout {
            config = config.with_stall_timeout(Duration::from_secs(secs));
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let quiet = match &cli.command {
        Commands::Run { options, .. } | Commands::Demo { options, .. } => options.quiet,
    };
    // The live display owns the terminal, so only warnings get through by default.
    let default_level = if quiet { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run { input, options } => {
            Corpus::load_tsv(&input).and_then(|corpus| cluster(corpus, &options))
        }
        Commands::Demo {
            docs,
            vocabulary,
            terms,
            corpus_seed,
            options,
        } => cluster(
            Corpus::generate(docs, vocabulary, terms, corpus_seed),
            &options,
        ),
    };

    match outcome {
        Ok(result) => {
            println!("{}", result.statistics.summary());
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "clustering failed");
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn cluster(corpus: Corpus, options: &RunOptions) -> lyric_kmeans::Result<ClusteringResult> {
    let config = options.cluster_config();
    config.validate(corpus.documents().len(), options.ranks)?;
    let mut group = LocalGroup::new(options.ranks);
    if let Some(timeout) = config.stall_timeout {
        group = group.with_stall_timeout(timeout);
    }
    let telemetry = TelemetryConfig::default();
    let writer = ReportWriter::new(&options.output).with_checkpoints(options.checkpoint);
    let display = !options.quiet;

    tracing::info!(
        documents = corpus.documents().len(),
        ranks = options.ranks,
        k = config.k,
        "starting run"
    );

    let corpus = Arc::new(corpus);
    let mut handles = Vec::with_capacity(options.ranks);
    for endpoint in group.endpoints() {
        let rank = endpoint.rank();
        let corpus = Arc::clone(&corpus);
        let config = config.clone();
        let telemetry = telemetry.clone();
        let writer = (rank == ROOT).then(|| writer.clone());

        let handle = thread::Builder::new()
            .name(format!("rank-{}", rank))
            .spawn(move || run_rank(endpoint, &corpus, config, telemetry, writer, display))?;
        handles.push(handle);
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (rank, handle) in handles.into_iter().enumerate() {
        let outcome = handle.join().unwrap_or_else(|_| {
            Err(ClusterError::protocol("rank thread panicked").at(rank, 0))
        });
        outcomes.push(outcome);
    }

    if display {
        park_cursor(&telemetry, options.ranks);
    }

    // A failing rank makes its peers stall; report the cause, not the echo.
    let mut errors: Vec<ClusterError> = Vec::new();
    let mut root_result = None;
    for outcome in outcomes {
        match outcome {
            Ok(RankOutcome {
                result: Some(result),
                ..
            }) => root_result = Some(result),
            Ok(_) => {}
            Err(err) => errors.push(err),
        }
    }
    if let Some(pos) = errors.iter().position(|e| !e.is_stall()) {
        return Err(errors.swap_remove(pos));
    }
    if let Some(err) = errors.into_iter().next() {
        return Err(err);
    }
    root_result.ok_or_else(|| ClusterError::protocol("root produced no result"))
}

fn run_rank(
    endpoint: LocalEndpoint,
    corpus: &Corpus,
    config: ClusterConfig,
    telemetry: TelemetryConfig,
    writer: Option<ReportWriter>,
    display: bool,
) -> lyric_kmeans::Result<RankOutcome> {
    let (rank, size) = (endpoint.rank(), endpoint.size());
    let reporter = Reporter::new(rank, size);

    let mut pump = TelemetryPump::new(reporter.clone(), endpoint.telemetry_link()?, telemetry);
    if rank == ROOT && display {
        pump = pump.with_renderer(Box::new(AnsiRenderer::stderr()));
    }
    let task = TelemetryTask::spawn(pump)?;

    let outcome = Coordinator::init(endpoint, corpus, config, reporter).and_then(|coordinator| {
        match writer {
            Some(writer) => coordinator.with_sink(Box::new(writer)).run(),
            None => coordinator.run(),
        }
    });

    task.shutdown();
    outcome
}

/// Move the cursor below the status grid.
fn park_cursor(telemetry: &TelemetryConfig, ranks: usize) {
    let layout = GridLayout::new(telemetry.geometry, telemetry.cell_width, telemetry.cell_height);
    let shown = ranks.min(layout.capacity()).max(1);
    let bottom = layout
        .cell_for(shown - 1)
        .map_or(0, |cell| cell.y + layout.cell_height());
    eprint!("\x1b[{};1H\n", bottom + 1);
}
