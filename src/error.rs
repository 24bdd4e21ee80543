//! Error types for corpus reading, table loading, training and application.

use std::{io, path::PathBuf};

use indicatif::style::TemplateError;
use thiserror::Error;

/// Errors that can occur while reading a raw text corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The corpus file could not be opened or read.
    #[error("cannot open text file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Reading from standard input failed.
    #[error("cannot read text from stdin: {0}")]
    Stdin(#[source] io::Error),
    /// The corpus is not valid UTF-8.
    #[error("text file {} is not valid UTF-8", path.display())]
    InvalidUtf8 { path: PathBuf },
}

/// Errors that can occur when loading a code table or a vocabulary.
///
/// Any of these rejects the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be opened or read.
    #[error("cannot open {kind} file {}: {source}", path.display())]
    Io {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A line does not have the expected number of fields.
    #[error("line {line_no}: expected {expected}, got {line:?}")]
    MalformedLine {
        line_no: usize,
        line: String,
        expected: &'static str,
    },
    /// A count column is not a non-negative integer.
    #[error("line {line_no}: invalid count {value:?}")]
    InvalidCount { line_no: usize, value: String },
    /// The same `(left, right)` merge appears twice.
    #[error("duplicate merge: {left} {right}")]
    DuplicatePair { left: String, right: String },
    /// Two merges produce the same concatenated symbol.
    #[error("duplicate merged symbol: {merged}")]
    DuplicateMerged { merged: String },
    /// The same vocabulary token appears twice.
    #[error("duplicate vocabulary token: {token}")]
    DuplicateToken { token: String },
}

/// Errors that can occur during training.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Errors that can occur while applying codes to words or text.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A symbol outside the vocabulary has no recorded merge origin but is
    /// longer than one character. The code table and vocabulary do not
    /// belong together.
    #[error("cannot decompose {symbol:?}: no merge origin and not a single character")]
    Irreducible { symbol: String },
    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
    /// Reading the input text failed.
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    /// Reading or writing a line stream failed.
    #[error("stream I/O failed: {0}")]
    Stream(#[source] io::Error),
    /// Writing the output failed.
    #[error("cannot write output {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
