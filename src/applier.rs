//! Applying learned merges to words.
//!
//! A word is split into characters (the last one end-marked) and merged
//! greedily: at every pass the adjacent pair with the smallest rank in the
//! code table is merged at its leftmost occurrence, until no adjacent pair
//! has a rank. With a restricted vocabulary, pieces the vocabulary does not
//! know are then split back along the merges that built them.
//!
//! Distinct words are independent, so batches are segmented on a dedicated
//! worker pool and the results reassembled afterwards.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, OnceLock},
};

use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{
    codes::{CodeTable, Vocabulary},
    config::BpeConfig,
    corpus::{self, unit_count},
    error::{ApplyError, LoadError},
    progress::progress_bar,
    text,
    types::MergeRank,
};

/// Applies a code table, optionally restricted to a vocabulary.
#[derive(Debug, Clone)]
pub struct BpeApplier {
    codes: CodeTable,
    /// `None` when no vocabulary was given or it is empty.
    vocab: Option<Vocabulary>,
    config: BpeConfig,
    /// Worker pool, started on first batch use and reused afterwards.
    /// Clones share it.
    pool: OnceLock<Arc<ThreadPool>>,
}

impl BpeApplier {
    /// Creates an applier. An empty vocabulary means no restriction.
    pub fn new(codes: CodeTable, vocab: Option<Vocabulary>, config: BpeConfig) -> Self {
        Self {
            codes,
            vocab: vocab.filter(|v| !v.is_empty()),
            config,
            pool: OnceLock::new(),
        }
    }

    /// Loads the code table and, if given, the vocabulary.
    ///
    /// # Errors
    ///
    /// Returns the first [`LoadError`] hit by either file.
    pub fn from_files(
        codes_path: &Path,
        vocab_path: Option<&Path>,
        config: BpeConfig,
    ) -> Result<Self, LoadError> {
        let codes = CodeTable::load(codes_path)?;
        let vocab = vocab_path.map(Vocabulary::load).transpose()?;
        Ok(Self::new(codes, vocab, config))
    }

    pub fn codes(&self) -> &CodeTable {
        &self.codes
    }

    pub fn vocab(&self) -> Option<&Vocabulary> {
        self.vocab.as_ref()
    }

    pub fn config(&self) -> &BpeConfig {
        &self.config
    }

    /// Greedy merge of one word into symbols; the last symbol keeps the
    /// end-of-word marker.
    pub fn merge_symbols(&self, word: &str) -> Vec<String> {
        let mut symbols = corpus::split_word(word, self.config.end_word());

        while symbols.len() > 1 {
            let mut best: Option<(MergeRank, usize)> = None;
            for (i, pair) in symbols.windows(2).enumerate() {
                let Some(rank) = self.codes.rank(&pair[0], &pair[1]) else {
                    continue;
                };
                // strict comparison keeps the leftmost position on ties
                if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                    best = Some((rank, i));
                }
            }

            let Some((_, i)) = best else {
                break;
            };
            let right = symbols.remove(i + 1);
            symbols[i].push_str(&right);
        }

        symbols
    }

    /// Replaces every symbol the vocabulary does not know by the pieces it
    /// was merged from.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Irreducible`] if a multi-character symbol is
    /// neither in the vocabulary nor the product of a known merge.
    pub fn limit_vocab(&self, symbols: &[String]) -> Result<Vec<String>, ApplyError> {
        let mut out = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let is_final = i + 1 == symbols.len();
            self.decompose_into(symbol, is_final, &mut out)?;
        }
        Ok(out)
    }

    /// Splits `symbol` until every piece is in the vocabulary or is a
    /// single character.
    ///
    /// `is_final` marks the word-final symbol, which carries the end-of-word
    /// marker. Without a vocabulary the symbol is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Irreducible`] for a multi-character symbol with
    /// no recorded merge origin.
    pub fn decompose(&self, symbol: &str, is_final: bool) -> Result<Vec<String>, ApplyError> {
        let mut out = Vec::new();
        self.decompose_into(symbol, is_final, &mut out)?;
        Ok(out)
    }

    fn decompose_into(
        &self,
        symbol: &str,
        is_final: bool,
        out: &mut Vec<String>,
    ) -> Result<(), ApplyError> {
        if self.in_vocab(symbol, is_final) {
            out.push(symbol.to_string());
            return Ok(());
        }

        let Some((left, right)) = self.codes.origin(symbol) else {
            let bare = if is_final {
                self.strip_end_word(symbol)
            } else {
                symbol
            };
            if unit_count(bare) != 1 {
                return Err(ApplyError::Irreducible {
                    symbol: symbol.to_string(),
                });
            }
            out.push(symbol.to_string());
            return Ok(());
        };

        self.decompose_into(left, false, out)?;
        self.decompose_into(right, is_final, out)
    }

    /// Vocabulary lookup under the key a piece is emitted as. Everything is
    /// known when there is no vocabulary.
    fn in_vocab(&self, symbol: &str, is_final: bool) -> bool {
        let Some(vocab) = &self.vocab else {
            return true;
        };
        if is_final {
            vocab.contains(self.strip_end_word(symbol))
        } else {
            vocab.contains(&format!("{symbol}{}", self.config.delimiter()))
        }
    }

    fn strip_end_word<'a>(&self, symbol: &'a str) -> &'a str {
        symbol
            .strip_suffix(self.config.end_word())
            .unwrap_or(symbol)
    }

    /// Segments one word: `lo@@ w@@ e@@ r`.
    ///
    /// The word is split into characters, merged greedily by rank, then,
    /// if a vocabulary is loaded, decomposed until every piece is known.
    ///
    /// # Arguments
    ///
    /// * `word` - A single word without separators.
    ///
    /// # Returns
    ///
    /// The pieces joined by the continuation marker and a space; the last
    /// piece has no marker. An empty word gives an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Irreducible`] when the vocabulary and code
    /// table do not belong together.
    pub fn apply_word(&self, word: &str) -> Result<String, ApplyError> {
        if word.is_empty() {
            return Ok(String::new());
        }

        let mut symbols = self.merge_symbols(word);
        if self.vocab.is_some() {
            symbols = self.limit_vocab(&symbols)?;
        }
        Ok(self.render(&symbols))
    }

    /// Joins pieces with the continuation marker and drops the end-of-word
    /// marker from the last one.
    fn render(&self, symbols: &[String]) -> String {
        let delimiter = self.config.delimiter();
        let mut out = String::new();
        for (i, symbol) in symbols.iter().enumerate() {
            if i + 1 == symbols.len() {
                out.push_str(self.strip_end_word(symbol));
            } else {
                out.push_str(symbol);
                out.push_str(delimiter);
                out.push(' ');
            }
        }
        out
    }

    /// Segments every word of a sentence, keeping its separators.
    pub fn apply_sentence(&self, sentence: &str) -> Result<String, ApplyError> {
        text::rewrite_words(sentence, |word| self.apply_word(word))
    }

    /// Segments many sentences, each distinct word once, on the worker pool.
    pub fn apply_sentences<S: AsRef<str>>(
        &self,
        sentences: &[S],
    ) -> Result<Vec<String>, ApplyError> {
        let segmented = self.segment_words(
            sentences
                .iter()
                .flat_map(|s| corpus::split_words(s.as_ref())),
            false,
        )?;

        sentences
            .iter()
            .map(|s| text::rewrite_words(s.as_ref(), |word| Ok(lookup(&segmented, word))))
            .collect()
    }

    /// Segments a batch of words in parallel, output in input order.
    pub fn apply_batch<S: AsRef<str>>(&self, words: &[S]) -> Result<Vec<String>, ApplyError> {
        let segmented = self.segment_words(words.iter().map(AsRef::as_ref), false)?;
        Ok(words
            .iter()
            .map(|w| lookup(&segmented, w.as_ref()))
            .collect())
    }

    /// Segments the distinct words of `words` on a pool of
    /// [`BpeConfig::threads`] workers.
    ///
    /// Worker `t` handles distinct words `t`, `t + n`, `t + 2n`... into its
    /// own map; the maps are merged once every worker is done.
    ///
    /// # Arguments
    ///
    /// * `words` - Words to segment, repeats allowed.
    /// * `show_progress` - Whether to display a progress bar while applying.
    ///
    /// # Returns
    ///
    /// A map from every distinct input word to its segmented form.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::ThreadPool`] if the pool cannot start,
    /// [`ApplyError::ProgressBarSetup`] for a bad progress template, or the
    /// first [`ApplyError::Irreducible`] any worker hit.
    pub fn segment_words<'a, I>(
        &self,
        words: I,
        show_progress: bool,
    ) -> Result<HashMap<String, String>, ApplyError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        // each distinct word once, in first-seen order
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = words.into_iter().filter(|w| seen.insert(*w)).collect();

        let threads = self.config.threads();
        let pool = self.pool()?;
        let pb = progress_bar(distinct.len() as u64, "Applying codes", show_progress)?;

        let partials: Vec<Result<HashMap<String, String>, ApplyError>> = pool.install(|| {
            (0..threads)
                .into_par_iter()
                .map(|t| {
                    let mut local = HashMap::new();
                    for word in distinct.iter().skip(t).step_by(threads) {
                        local.insert(word.to_string(), self.apply_word(word)?);
                        pb.inc(1);
                    }
                    Ok(local)
                })
                .collect()
        });
        pb.finish_and_clear();

        // join: merge the per-worker maps, surfacing the first failure
        let mut segmented = HashMap::with_capacity(distinct.len());
        for partial in partials {
            segmented.extend(partial?);
        }

        log::info!(
            "Applied codes to {} distinct words using {} threads.",
            segmented.len(),
            threads
        );
        Ok(segmented)
    }

    /// The worker pool, built with [`BpeConfig::threads`] workers on first
    /// use.
    fn pool(&self) -> Result<&ThreadPool, ApplyError> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool.as_ref());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.threads())
            .build()?;
        // a concurrent first call may have won; its pool is kept
        Ok(self.pool.get_or_init(|| Arc::new(pool)).as_ref())
    }
}

/// Segmented form of a word; every word passed to the worker pool has one.
fn lookup(segmented: &HashMap<String, String>, word: &str) -> String {
    segmented.get(word).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::trainer;

    fn reference_codes() -> CodeTable {
        CodeTable::from_lines([
            "e s 9",
            "es t</w> 9",
            "l o 7",
            "w est</w> 6",
            "e west</w> 6",
            "n ewest</w> 6",
            "lo w</w> 5",
            "w i 3",
            "d est</w> 3",
            "wi dest</w> 3",
        ])
        .expect("reference codes should load")
    }

    fn applier(vocab: Option<&[&str]>) -> BpeApplier {
        let vocab = vocab.map(|lines| Vocabulary::from_lines(lines).expect("vocab should load"));
        BpeApplier::new(reference_codes(), vocab, BpeConfig::default().with_threads(2))
    }

    #[test]
    fn test_known_words() {
        let applier = applier(None);
        assert_eq!(applier.apply_word("low").expect("apply"), "low");
        assert_eq!(applier.apply_word("newest").expect("apply"), "newest");
        assert_eq!(applier.apply_word("widest").expect("apply"), "widest");
    }

    #[test]
    fn test_unseen_word() {
        let applier = applier(None);
        assert_eq!(applier.apply_word("lower").expect("apply"), "lo@@ w@@ e@@ r");
        assert_eq!(
            applier.merge_symbols("lower"),
            vec!["lo", "w", "e", "r</w>"]
        );
    }

    #[test]
    fn test_single_char_and_empty_word() {
        let applier = applier(None);
        assert_eq!(applier.apply_word("x").expect("apply"), "x");
        assert_eq!(applier.apply_word("").expect("apply"), "");
    }

    #[test]
    fn test_smallest_rank_wins() {
        let codes = CodeTable::from_lines(["b c", "a b"]).expect("codes should load");
        let applier = BpeApplier::new(codes, None, BpeConfig::default());
        assert_eq!(applier.merge_symbols("abcd"), vec!["a", "bc", "d</w>"]);
    }

    #[test]
    fn test_leftmost_occurrence_on_tie() {
        let codes = CodeTable::from_lines(["a a"]).expect("codes should load");
        let applier = BpeApplier::new(codes, None, BpeConfig::default());
        assert_eq!(applier.merge_symbols("aaab"), vec!["aa", "a", "b</w>"]);
    }

    #[test]
    fn test_whole_word_vocab_splits_lower() {
        let applier = applier(Some(&["low 5", "lower 2", "newest 6", "widest 3"]));
        assert_eq!(applier.apply_word("lower").expect("apply"), "l@@ o@@ w@@ e@@ r");
        assert_eq!(applier.apply_word("low").expect("apply"), "low");
        assert_eq!(applier.apply_word("wider").expect("apply"), "w@@ i@@ d@@ e@@ r");
    }

    #[test]
    fn test_applied_corpus_vocab() {
        let applier = applier(Some(&[
            "low 5", "lo@@ 2", "w@@ 2", "e@@ 2", "r 2", "newest 6", "widest 3",
        ]));
        assert_eq!(applier.apply_word("lower").expect("apply"), "lo@@ w@@ e@@ r");
        assert_eq!(applier.apply_word("wider").expect("apply"), "w@@ i@@ d@@ e@@ r");
    }

    #[test]
    fn test_decompose_follows_origins() {
        let applier = applier(Some(&["newest 6"]));
        assert_eq!(
            applier.decompose("est</w>", true).expect("decompose"),
            vec!["e", "s", "t</w>"]
        );
        assert_eq!(
            applier.decompose("newest</w>", true).expect("decompose"),
            vec!["newest</w>"]
        );
        assert_eq!(applier.decompose("wi", false).expect("decompose"), vec!["w", "i"]);
    }

    #[test]
    fn test_irreducible_symbol() {
        let applier = applier(Some(&["low 5"]));
        let result = applier.decompose("xy", false);
        assert!(matches!(result, Err(ApplyError::Irreducible { symbol }) if symbol == "xy"));
    }

    #[test]
    fn test_empty_vocab_is_no_restriction() {
        let applier = BpeApplier::new(
            reference_codes(),
            Some(Vocabulary::new()),
            BpeConfig::default(),
        );
        assert!(applier.vocab().is_none());
        assert_eq!(applier.apply_word("lower").expect("apply"), "lo@@ w@@ e@@ r");
    }

    #[test]
    fn test_custom_markers() {
        let codes = CodeTable::from_lines(["l o", "lo w#"]).expect("codes should load");
        let config = BpeConfig::default().with_end_word("#").with_delimiter("++");
        let applier = BpeApplier::new(codes, None, config);
        assert_eq!(applier.apply_word("low").expect("apply"), "low");
        assert_eq!(applier.apply_word("lot").expect("apply"), "lo++ t");
    }

    #[test]
    fn test_sentence_keeps_separators() {
        let applier = applier(None);
        assert_eq!(
            applier.apply_sentence("low  lower\n").expect("apply"),
            "low  lo@@ w@@ e@@ r\n"
        );
    }

    #[test]
    fn test_batch_matches_sequential() {
        let applier = applier(None);
        let words = ["lower", "low", "widest", "lower", "newer", "x"];
        let batch = applier.apply_batch(&words).expect("batch apply");
        let sequential: Vec<String> = words
            .iter()
            .map(|w| applier.apply_word(w).expect("apply"))
            .collect();
        assert_eq!(batch, sequential);
    }

    #[test]
    fn test_worker_pool_is_reused() {
        let applier = applier(None);
        applier.apply_batch(&["lower", "low"]).expect("batch apply");
        let first = Arc::clone(applier.pool.get().expect("pool started by first batch"));

        applier.apply_sentences(&["widest lower"]).expect("apply sentences");
        applier.apply_batch(&["newer"]).expect("batch apply");
        let current = applier.pool.get().expect("pool still present");
        assert!(Arc::ptr_eq(&first, current));
        assert_eq!(current.current_num_threads(), 2);

        let cloned = applier.clone();
        cloned.apply_batch(&["low"]).expect("batch apply");
        let shared = cloned.pool.get().expect("clone shares the pool");
        assert!(Arc::ptr_eq(&first, shared));
    }

    #[test]
    fn test_apply_sentences() {
        let applier = applier(None);
        let out = applier
            .apply_sentences(&["low lower", "widest"])
            .expect("apply sentences");
        assert_eq!(out, vec!["low lo@@ w@@ e@@ r", "widest"]);
    }

    #[test]
    fn test_batch_keeps_single_chars_outside_vocab() {
        let applier = BpeApplier::new(
            CodeTable::new(),
            Some(Vocabulary::from_lines(["a 1"]).expect("vocab should load")),
            BpeConfig::default().with_threads(3),
        );
        assert_eq!(
            applier.apply_batch(&["ab", "ba"]).expect("batch apply"),
            vec!["a@@ b", "b@@ a"]
        );
    }

    fn corpus_strategy() -> impl Strategy<Value = Vec<(String, u64)>> {
        prop::collection::vec(("[abcd]{1,6}", 1u64..10), 1..20)
    }

    proptest! {
        /// Re-applying the learned codes to a training word reproduces the
        /// segmentation training left it in.
        #[test]
        fn prop_replay_matches_training(words in corpus_strategy(), merges in 1usize..30) {
            let counts: corpus::WordCounts = words.into_iter().collect();
            let config = BpeConfig::default();
            let mut bpe = trainer::BpeTrainer::new(&counts, &config);
            bpe.train(merges);
            prop_assume!(bpe.codes().is_unambiguous());

            let applier = BpeApplier::new(bpe.codes().clone(), None, config);
            for (i, word) in counts.words().enumerate() {
                prop_assert_eq!(applier.merge_symbols(word), bpe.segmentation(i));
            }
        }

        /// Every emitted piece is in the vocabulary under its contextual key
        /// or is a single character.
        #[test]
        fn prop_vocab_containment(
            words in corpus_strategy(),
            vocab_words in prop::collection::hash_set("[abcd]{1,4}", 1..12),
            sample in "[abcd]{1,8}",
        ) {
            let counts: corpus::WordCounts = words.into_iter().collect();
            let config = BpeConfig::default();
            let codes = trainer::train(&counts, 25, &config, false)
                .expect("training should succeed");
            let vocab = Vocabulary::from_lines(vocab_words.iter().map(|w| format!("{w} 1")))
                .expect("vocab should load");
            let applier = BpeApplier::new(codes, Some(vocab.clone()), config);

            let symbols = applier.limit_vocab(&applier.merge_symbols(&sample))
                .expect("trained tables always decompose");
            for (i, symbol) in symbols.iter().enumerate() {
                let is_final = i + 1 == symbols.len();
                let key = if is_final {
                    symbol.trim_end_matches("</w>").to_string()
                } else {
                    format!("{symbol}@@")
                };
                let bare = symbol.trim_end_matches("</w>");
                prop_assert!(vocab.contains(&key) || unit_count(bare) == 1, "{symbol} escaped");
            }
        }
    }
}
