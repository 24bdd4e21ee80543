//! Type aliases and shared types for BPE training and application.
//!
//! These type aliases provide semantic clarity throughout the codebase.

/// Represents a symbol identifier handed out by the interner.
///
/// Ids are dense and assigned in first-appearance order, starting from 0.
pub type Token = usize;

/// Index of a distinct word in the training corpus.
pub type WordIdx = usize;

/// Aggregate frequency of a symbol pair.
///
/// Signed because incremental updates apply negative deltas.
pub type PairFreq = i64;

/// Occurrence count of a distinct word in the corpus.
pub type WordFreq = u64;

/// Merge rank indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub type MergeRank = usize;

/// A pair of adjacent symbol ids.
///
/// Used as a key for tracking pair frequencies during training. The derived
/// ordering compares the left id first, then the right id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenPair(pub Token, pub Token);
