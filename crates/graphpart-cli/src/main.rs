//! GraphPart command line interface.
//!
//! Provides the `graphpart` binary with one subcommand per edge source:
//! `precomputed` reads a comma separated edge list (or a checkpoint),
//! `aligner` runs an external pairwise aligner over chunk pairs of a FASTA
//! file, and `fingerprints` scores precomputed bit-vector fingerprints.
//!
//! All subcommands share the partitioning flags. A JSON config file may be
//! given with `--config`; flags override its values.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use graphpart_core::{
    CombinationSearch, IngestMode, InitMode, PartitionConfig, PartitionError, Partitioner, Transform,
};
use graphpart_io::{
    compare_all, read_fasta_file, read_fingerprint_file, report_path_for, write_assignment_file,
    write_report, AlignerCommand, AlignerPool, EdgeListReader, HeaderFields, OutputFormat,
    PoolOptions, DEFAULT_METRIC_COLUMN,
};

/// Homology-aware dataset partitioning.
#[derive(Parser)]
#[command(name = "graphpart", about = "Homology-aware dataset partitioning")]
struct Cli {
    /// Log at DEBUG level (RUST_LOG takes precedence when set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Partition with scores from a precomputed edge list.
    Precomputed {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        fasta: FastaArgs,

        /// Comma separated file with two entity ids and a score per row.
        #[arg(short, long)]
        edge_file: PathBuf,

        /// Zero-based column holding the score.
        #[arg(short, long, default_value_t = DEFAULT_METRIC_COLUMN)]
        metric_column: usize,
    },

    /// Partition with scores from an external aligner.
    Aligner {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        fasta: FastaArgs,

        #[command(flatten)]
        pool: AlignerArgs,
    },

    /// Partition by Tanimoto similarity of bit-vector fingerprints.
    Fingerprints {
        #[command(flatten)]
        run: RunArgs,

        /// Rows of `id,hex_fingerprint[,label[,priority]]`.
        #[arg(long)]
        fingerprint_file: PathBuf,

        /// Worker threads for the pairwise comparison.
        #[arg(long, default_value_t = 1)]
        threads: usize,
    },
}

/// Partitioning flags shared by all subcommands.
#[derive(Args, Debug)]
struct RunArgs {
    /// JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Threshold in raw score units.
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Number of partitions.
    #[arg(short, long)]
    partitions: Option<usize>,

    /// Metric transform: none, one-minus, inverse, square, log.
    #[arg(long)]
    transformation: Option<Transform>,

    /// Initialization: simple, slow-nn, fast-nn.
    #[arg(long)]
    initialization_mode: Option<InitMode>,

    /// Never relocate entities during removal.
    #[arg(long)]
    no_moving: bool,

    /// Also weigh same-partition neighbours when choosing entities to remove.
    #[arg(long)]
    remove_same: bool,

    /// Fraction of partitions merged into the test bucket.
    #[arg(long)]
    test_ratio: Option<f64>,

    /// Fraction of partitions merged into the validation bucket.
    #[arg(long)]
    val_ratio: Option<f64>,

    /// Use the greedy train/test/val search instead of the exhaustive one.
    #[arg(long)]
    greedy_split: bool,

    /// Assignment table output path.
    #[arg(short, long, default_value = "graphpart_result.csv")]
    out_file: PathBuf,

    /// Write the filtered edge list here before partitioning.
    #[arg(long)]
    save_checkpoint: Option<PathBuf>,

    /// Skip the JSON run report.
    #[arg(long)]
    no_report: bool,
}

impl RunArgs {
    /// Config file values with flag overrides applied.
    fn config(&self) -> Result<PartitionConfig, PartitionError> {
        let mut config = match &self.config {
            Some(path) => PartitionConfig::from_json_file(path)?,
            None => PartitionConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(partitions) = self.partitions {
            config.partitions = partitions;
        }
        if let Some(transformation) = self.transformation {
            config.transformation = transformation;
        }
        if let Some(mode) = self.initialization_mode {
            config.initialization_mode = mode;
        }
        if self.no_moving {
            config.allow_moving = false;
        }
        if self.remove_same {
            config.simplistic_removal = false;
        }
        if let Some(ratio) = self.test_ratio {
            config.test_ratio = ratio;
        }
        if let Some(ratio) = self.val_ratio {
            config.val_ratio = ratio;
        }
        if self.greedy_split {
            config.combination_search = CombinationSearch::Greedy;
        }
        Ok(config)
    }
}

/// FASTA entity input.
#[derive(Args, Debug)]
struct FastaArgs {
    /// FASTA file with `>id|key=value|...` headers.
    #[arg(short, long)]
    fasta_file: PathBuf,

    /// Header key holding the label.
    #[arg(long)]
    labels_name: Option<String>,

    /// Header key holding the priority flag (`1` marks priority).
    #[arg(long)]
    priority_name: Option<String>,
}

impl FastaArgs {
    fn fields(&self) -> HeaderFields {
        HeaderFields {
            label: self.labels_name.clone(),
            priority: self.priority_name.clone(),
        }
    }
}

/// External aligner settings.
#[derive(Args, Debug)]
struct AlignerArgs {
    /// Aligner executable.
    #[arg(long)]
    program: String,

    /// One aligner argument; repeat for more. `{query}` and `{library}`
    /// are replaced by the chunk file paths.
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Number of chunks the FASTA file is split into.
    #[arg(long, default_value_t = 10)]
    chunks: usize,

    /// Aligner processes running at once.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Only align each unordered chunk pair once.
    #[arg(long)]
    triangular: bool,

    /// Output column separator (default: whitespace).
    #[arg(long)]
    delimiter: Option<char>,

    #[arg(long, default_value_t = 0)]
    query_column: usize,

    #[arg(long, default_value_t = 1)]
    library_column: usize,

    #[arg(long, default_value_t = 2)]
    score_column: usize,

    /// Factor applied to every score, e.g. 0.01 for percentages.
    #[arg(long, default_value_t = 1.0)]
    score_scale: f64,
}

impl AlignerArgs {
    fn pool(&self) -> AlignerPool {
        let mut command = AlignerCommand::new(self.program.clone(), self.args.clone());
        command.output = OutputFormat {
            delimiter: self.delimiter,
            query_column: self.query_column,
            library_column: self.library_column,
            score_column: self.score_column,
            score_scale: self.score_scale,
            ..OutputFormat::default()
        };
        AlignerPool::new(
            command,
            PoolOptions {
                chunks: self.chunks,
                threads: self.threads,
                triangular: self.triangular,
            },
        )
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match &cli.command {
        Commands::Precomputed {
            run,
            fasta,
            edge_file,
            metric_column,
        } => run_partition(run, |config| {
            let entries = read_fasta_file(&fasta.fasta_file, &fasta.fields())?;
            let mut partitioner = Partitioner::new(config, entries.into_iter().map(|e| e.entity))?;
            partitioner.ingest(EdgeListReader::open(edge_file, *metric_column)?, IngestMode::Relaxed)?;
            Ok(partitioner)
        }),
        Commands::Aligner { run, fasta, pool } => run_partition(run, |config| {
            let entries = read_fasta_file(&fasta.fasta_file, &fasta.fields())?;
            let mut partitioner = Partitioner::new(config, entries.iter().map(|e| e.entity.clone()))?;
            let sink = partitioner.edge_sink(IngestMode::Strict);
            pool.pool().run(&entries, &sink)?;
            partitioner.commit(sink)?;
            Ok(partitioner)
        }),
        Commands::Fingerprints {
            run,
            fingerprint_file,
            threads,
        } => run_partition(run, |config| {
            let entries = read_fingerprint_file(fingerprint_file)?;
            let mut partitioner = Partitioner::new(config, entries.iter().map(|e| e.entity.clone()))?;
            let sink = partitioner.edge_sink(IngestMode::Strict);
            compare_all(&entries, &sink, *threads)?;
            partitioner.commit(sink)?;
            Ok(partitioner)
        }),
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute one partitioning run.
///
/// `build` loads the entities and ingests the edges. Returns exit code:
/// 0 = success, 1 = configuration or input error, 2 = the requested
/// partitioning is not achievable, 3 = I/O error.
fn run_partition<F>(args: &RunArgs, build: F) -> i32
where
    F: FnOnce(PartitionConfig) -> Result<Partitioner, PartitionError>,
{
    match try_run(args, build) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            exit_code(&err)
        }
    }
}

fn try_run<F>(args: &RunArgs, build: F) -> Result<(), PartitionError>
where
    F: FnOnce(PartitionConfig) -> Result<Partitioner, PartitionError>,
{
    let config = args.config()?;
    // Fail on an unwritable output path before any work is done.
    File::create(&args.out_file)?;

    let partitioner = build(config)?;
    info!(
        entities = partitioner.graph().node_count(),
        edges = partitioner.graph().edge_count(),
        threshold = partitioner.threshold(),
        "edges loaded"
    );
    if let Some(path) = &args.save_checkpoint {
        info!(path = %path.display(), "saving edge checkpoint");
        partitioner.write_checkpoint(BufWriter::new(File::create(path)?))?;
    }

    let outcome = partitioner.partition()?;
    write_assignment_file(&outcome.assignment, &args.out_file)?;
    let report_path = if args.no_report {
        None
    } else {
        let path = report_path_for(&args.out_file);
        write_report(&outcome.report, &path)?;
        Some(path)
    };

    // Machine-readable summary on stdout
    let summary = serde_json::json!({
        "out_file": args.out_file,
        "report": report_path,
        "entities": outcome.assignment.len(),
        "removed": outcome.report.samples_pre_removal.saturating_sub(outcome.report.samples_after_removal),
        "score_pre_removal": outcome.report.score_pre_removal,
        "score_after_removal": outcome.report.score_after_removal,
        "seconds": outcome.report.time_total_seconds,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Maps an error to the process exit code.
fn exit_code(err: &PartitionError) -> i32 {
    match err {
        PartitionError::ConvergenceFailure { .. } | PartitionError::InsufficientData { .. } => 2,
        PartitionError::Io(_) | PartitionError::Serialization(_) => 3,
        PartitionError::Configuration { .. }
        | PartitionError::Consistency { .. }
        | PartitionError::Domain { .. }
        | PartitionError::Parse { .. }
        | PartitionError::EdgeSource { .. } => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"threshold": 0.5, "partitions": 4, "test_ratio": 0.1}"#).unwrap();

        let cli = Cli::try_parse_from([
            "graphpart",
            "precomputed",
            "--config",
            path.to_str().unwrap(),
            "--partitions",
            "7",
            "--transformation",
            "none",
            "--no-moving",
            "--fasta-file",
            "in.fasta",
            "--edge-file",
            "edges.csv",
        ])
        .unwrap();
        let Commands::Precomputed { run, metric_column, .. } = cli.command else {
            panic!("expected precomputed subcommand");
        };
        assert_eq!(metric_column, DEFAULT_METRIC_COLUMN);

        let config = run.config().unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.partitions, 7);
        assert_eq!(config.transformation, Transform::Identity);
        assert_eq!(config.test_ratio, 0.1);
        assert!(!config.allow_moving);
        assert!(config.simplistic_removal);
    }

    #[test]
    fn unknown_transform_is_rejected() {
        let parsed = Cli::try_parse_from([
            "graphpart",
            "fingerprints",
            "--fingerprint-file",
            "fp.csv",
            "--transformation",
            "cube",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn aligner_arguments_keep_leading_hyphens() {
        let cli = Cli::try_parse_from([
            "graphpart",
            "aligner",
            "--fasta-file",
            "in.fasta",
            "--program",
            "needleall",
            "--arg",
            "-asequence",
            "--arg",
            "{query}",
            "--threads",
            "4",
        ])
        .unwrap();
        let Commands::Aligner { pool, .. } = cli.command else {
            panic!("expected aligner subcommand");
        };
        assert_eq!(pool.args, vec!["-asequence", "{query}"]);
        assert_eq!(pool.threads, 4);
        assert_eq!(pool.chunks, 10);
    }

    #[test]
    fn exit_codes_by_failure_kind() {
        assert_eq!(exit_code(&PartitionError::config("bad")), 1);
        assert_eq!(
            exit_code(&PartitionError::InsufficientData {
                requested: 5,
                lost: 1
            }),
            2
        );
        assert_eq!(
            exit_code(&PartitionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "missing"
            ))),
            3
        );
    }
}
