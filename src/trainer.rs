//! Core BPE training loop.
//!
//! Every distinct corpus word is kept as its own symbol sequence together
//! with its frequency. Pair counts are computed once and then patched
//! incrementally: a merge only revisits the words recorded as candidates
//! for the merged pair, so the total work over all merges stays close to
//! linear in the corpus size instead of rescanning every word per merge.

use crate::{
    codes::{CodeTable, Merge},
    config::BpeConfig,
    corpus::{self, Word, WordCounts},
    error::TrainError,
    interner::SymbolInterner,
    pair_index::PairIndex,
    progress::progress_bar,
    types::{PairFreq, Token, TokenPair, WordIdx},
};

/// BPE training state.
///
/// Owns the interner, the words being rewritten, the pair frequency index
/// and the code table learned so far. Training is strictly sequential: each
/// merge depends on the state the previous one left behind.
#[derive(Debug)]
pub struct BpeTrainer {
    interner: SymbolInterner,
    words: Vec<Word>,
    pairs: PairIndex,
    codes: CodeTable,
}

impl BpeTrainer {
    /// Creates a trainer from a word-frequency table.
    ///
    /// Words are split into their initial symbols (last one end-marked) and
    /// symbols are interned in first-appearance order.
    pub fn new(counts: &WordCounts, config: &BpeConfig) -> Self {
        let mut interner = SymbolInterner::new();
        let words = corpus::tokenize(counts, config.end_word(), &mut interner);
        let pairs = PairIndex::build(&words);

        log::debug!(
            "{} unique words, {} initial symbols, {} distinct pairs",
            words.len(),
            interner.len(),
            pairs.len()
        );

        Self {
            interner,
            words,
            pairs,
            codes: CodeTable::new(),
        }
    }

    /// Performs one merge.
    ///
    /// Returns the recorded merge, or `None` if no pair has a positive count
    /// left.
    pub fn merge_step(&mut self) -> Option<&Merge> {
        let (best, count) = self.pairs.find_best_pair()?;
        let TokenPair(left, right) = best;

        let left_text = self.interner.text(left).to_string();
        let right_text = self.interner.text(right).to_string();
        let merged = self.interner.intern(&format!("{left_text}{right_text}"));

        for word_idx in self.pairs.candidates(best) {
            self.merge_in_word(word_idx, best, merged);
        }

        // Every occurrence is gone. Zeroed after the walk because a
        // self-overlapping pair (`a a`) is decremented while walking.
        self.pairs.zero(best);

        log::trace!(
            "merge {}: {} {} -> {} ({})",
            self.codes.len(),
            left_text,
            right_text,
            merged,
            count
        );

        let rank = self.codes.push(Merge {
            left: left_text,
            right: right_text,
            count: Some(count),
        });
        self.codes.get(rank)
    }

    /// Performs up to `num_merges` merges.
    ///
    /// Stops early, without error, once nothing is left to merge. Returns the
    /// number of merges performed.
    pub fn train(&mut self, num_merges: usize) -> usize {
        for done in 0..num_merges {
            if self.merge_step().is_none() {
                log::info!("No more pairs to merge after {done} merges");
                return done;
            }
        }
        num_merges
    }

    /// Merges learned so far.
    pub fn codes(&self) -> &CodeTable {
        &self.codes
    }

    pub fn into_codes(self) -> CodeTable {
        self.codes
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    #[cfg(test)]
    pub(crate) fn pair_index(&self) -> &PairIndex {
        &self.pairs
    }

    /// Current segmentation of a word as symbol texts.
    pub fn segmentation(&self, word_idx: WordIdx) -> Vec<&str> {
        self.words[word_idx]
            .symbols
            .iter()
            .map(|&s| self.interner.text(s))
            .collect()
    }

    /// Replaces every `pair` occurrence in one word by `merged`, patching
    /// the counts of the neighbouring pairs.
    ///
    /// The word is walked on its live sequence; a candidate that no longer
    /// contains the pair is left untouched.
    fn merge_in_word(&mut self, word_idx: WordIdx, pair: TokenPair, merged: Token) {
        let TokenPair(left, right) = pair;
        let word = &mut self.words[word_idx];
        let freq = word.freq as PairFreq;
        let symbols = &mut word.symbols;

        let mut i = 0;
        while i + 1 < symbols.len() {
            if symbols[i] != left || symbols[i + 1] != right {
                i += 1;
                continue;
            }

            if i > 0 {
                let prev = symbols[i - 1];
                self.pairs.change_count(TokenPair(prev, left), -freq, word_idx);
                self.pairs.change_count(TokenPair(prev, merged), freq, word_idx);
            }

            symbols[i] = merged;
            symbols.remove(i + 1);

            if let Some(&next) = symbols.get(i + 1) {
                self.pairs.change_count(TokenPair(right, next), -freq, word_idx);
                self.pairs.change_count(TokenPair(merged, next), freq, word_idx);
            }

            // `merged` never equals `left`, so the pair starting at the new
            // symbol cannot match.
            i += 1;
        }
    }
}

/// Learns up to `num_merges` merges from a word-frequency table.
///
/// Builds the pair index once, then repeatedly selects the most frequent
/// pair and merges it in every word that holds it. Training ends early,
/// without error, once no pair has a positive count.
///
/// # Arguments
///
/// * `counts` - Distinct corpus words with their frequencies.
/// * `num_merges` - Maximum number of merges to learn.
/// * `config` - Supplies the end-of-word marker.
/// * `show_progress` - Whether to display a progress bar during training.
///
/// # Returns
///
/// The code table in rank order, each merge carrying the count it was
/// learned with.
///
/// # Errors
///
/// Returns [`TrainError::ProgressBarSetup`] if the progress bar template
/// fails to compile.
pub fn train(
    counts: &WordCounts,
    num_merges: usize,
    config: &BpeConfig,
    show_progress: bool,
) -> Result<CodeTable, TrainError> {
    log::info!(
        "Starting BPE training: {} merges requested over {} unique words",
        num_merges,
        counts.len()
    );

    // initial split and pair counts
    let mut trainer = BpeTrainer::new(counts, config);
    let pb = progress_bar(num_merges as u64, "Learning merges", show_progress)?;

    // select + merge until the budget or the pairs run out
    let mut done = 0;
    while done < num_merges {
        if trainer.merge_step().is_none() {
            log::info!("No more pairs to merge after {done} merges");
            break;
        }
        done += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    log::info!("Finished training: {done} merges completed");

    let codes = trainer.into_codes();
    if !codes.is_unambiguous() {
        log::warn!(
            "Learned merges produce the same symbol twice; \
             loading this code table back will be rejected"
        );
    }
    Ok(codes)
}
