use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use subword_bpe::{
    config::{DEFAULT_DELIMITER, DEFAULT_END_WORD},
    corpus::{self, WordCounts},
    text, train, BpeApplier, BpeConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Learn and apply BPE subword codes", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    /// Worker threads used to apply codes [default: hardware, at most 10]
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,

    /// End-of-word marker
    #[arg(long, global = true, default_value = DEFAULT_END_WORD)]
    end_word: String,

    /// Continuation marker appended to non-final pieces
    #[arg(long, global = true, default_value = DEFAULT_DELIMITER)]
    delimiter: String,

    /// Show progress bars on stderr
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the word frequencies of one or two text files
    #[command(name = "getvocab")]
    GetVocab(GetVocabArgs),
    /// Learn merges and print them with their counts
    #[command(name = "learnbpe")]
    LearnBpe(LearnArgs),
    /// Apply codes to a text file
    #[command(name = "applybpe")]
    ApplyBpe(ApplyArgs),
    /// Apply codes to stdin line by line
    #[command(name = "applybpe_stream")]
    ApplyBpeStream(StreamArgs),
}

#[derive(Args, Debug)]
struct GetVocabArgs {
    /// Text file, `-` for stdin
    input1: PathBuf,
    /// Optional second text file
    input2: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LearnArgs {
    /// Number of merges to learn
    n_merges: usize,
    /// Text file, `-` for stdin
    input1: PathBuf,
    /// Optional second text file
    input2: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Output file
    output: PathBuf,
    /// Text file, `-` for stdin
    input: PathBuf,
    /// Codes file
    codes: PathBuf,
    /// Optional vocabulary file
    vocab: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Codes file
    codes: PathBuf,
    /// Optional vocabulary file
    vocab: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut config = BpeConfig::default()
        .with_end_word(cli.end_word.as_str())
        .with_delimiter(cli.delimiter.as_str());
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }

    match cli.command {
        Commands::GetVocab(args) => run_getvocab(args),
        Commands::LearnBpe(args) => run_learnbpe(args, &config, cli.progress),
        Commands::ApplyBpe(args) => run_applybpe(args, config, cli.progress),
        Commands::ApplyBpeStream(args) => run_stream(args, config),
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
    // RUST_LOG still wins for per-module filters
    builder.parse_env(Env::default());
    let _ = builder.try_init();
}

fn read_inputs(input1: &Path, input2: Option<&Path>) -> Result<WordCounts> {
    let mut counts = WordCounts::new();
    for path in std::iter::once(input1).chain(input2) {
        corpus::read_corpus(path, &mut counts)
            .with_context(|| format!("failed to read corpus {}", path.display()))?;
    }
    Ok(counts)
}

fn run_getvocab(args: GetVocabArgs) -> Result<()> {
    let counts = read_inputs(&args.input1, args.input2.as_deref())?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (word, count) in corpus::sorted_vocab(&counts) {
        writeln!(out, "{word} {count}").context("failed to write vocabulary")?;
    }
    out.flush().context("failed to write vocabulary")?;
    Ok(())
}

fn run_learnbpe(args: LearnArgs, config: &BpeConfig, progress: bool) -> Result<()> {
    let counts = read_inputs(&args.input1, args.input2.as_deref())?;
    let codes = train(&counts, args.n_merges, config, progress).context("training failed")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    codes.write_to(&mut out).context("failed to write codes")?;
    out.flush().context("failed to write codes")?;
    Ok(())
}

fn run_applybpe(args: ApplyArgs, config: BpeConfig, progress: bool) -> Result<()> {
    let applier = BpeApplier::from_files(&args.codes, args.vocab.as_deref(), config)
        .with_context(|| format!("failed to load codes from {}", args.codes.display()))?;

    text::apply_file(&applier, &args.input, &args.output, progress).with_context(|| {
        format!(
            "failed to apply codes to {} into {}",
            args.input.display(),
            args.output.display()
        )
    })
}

fn run_stream(args: StreamArgs, config: BpeConfig) -> Result<()> {
    let applier = BpeApplier::from_files(&args.codes, args.vocab.as_deref(), config)
        .with_context(|| format!("failed to load codes from {}", args.codes.display()))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    text::apply_stream(&applier, stdin.lock(), &mut out).context("failed to stream codes")?;
    Ok(())
}
