//! Pair frequency index and merge selection.
//!
//! Aggregate counts live in an index-addressed arena: a `Vec<PairCount>`
//! that only ever grows, resolved through a `HashMap<TokenPair, PairId>` on
//! every access. Nothing outside this module holds a position into the
//! arena, so growth never invalidates a lookup. Entries whose occurrences
//! were consumed by a merge are zeroed, never removed.
//!
//! The most frequent pair is tracked with a lazily refreshed max heap.
//! [`PairIndex::change_count`] only records which pairs went up; their final
//! counts are pushed once per pair before the next selection, so a merge
//! adds at most one heap item per changed pair however many occurrences it
//! touched. Decrements leave stale entries behind that are validated
//! against the arena when they reach the top. When stale entries pile up
//! past [`HEAP_SLACK`] times the arena size, the heap is rebuilt from the
//! live counts.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use crate::{
    corpus::Word,
    types::{PairFreq, TokenPair, WordIdx},
};

/// Position of a pair entry in the arena.
pub type PairId = usize;

/// Heap size, as a multiple of the number of tracked pairs, that triggers a
/// rebuild from the arena.
pub const HEAP_SLACK: usize = 2;

/// A tracked pair and its aggregate frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairCount {
    pub pair: TokenPair,
    pub count: PairFreq,
}

/// Item in the max heap.
///
/// May be stale: `count` must be validated against the arena before use.
#[derive(Debug, PartialEq, Eq)]
struct HeapItem {
    count: PairFreq,
    pair: TokenPair,
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest count at the top. On equal counts the smaller `(left, right)`
/// id tuple wins, so pair order is reversed.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// Incrementally maintained pair frequencies plus the where-to-update index.
#[derive(Debug, Default)]
pub struct PairIndex {
    /// Storage arena for pair entries.
    entries: Vec<PairCount>,

    /// pair -> arena position.
    ids: HashMap<TokenPair, PairId>,

    /// Words that contained the pair at some point, by arena position.
    ///
    /// Only ever grows. A candidate filter, not an exact occurrence index:
    /// presence is re-validated by walking the word.
    where_to_update: Vec<HashSet<WordIdx>>,

    heap: BinaryHeap<HeapItem>,

    /// Pairs whose count went up since the last selection.
    touched: HashSet<PairId>,
}

impl PairIndex {
    /// Builds the index from the initial segmentations in one pass.
    pub fn build(words: &[Word]) -> Self {
        let mut index = PairIndex::default();

        for (word_idx, word) in words.iter().enumerate() {
            let freq = word.freq as PairFreq;
            for window in word.symbols.windows(2) {
                let id = index.get_or_insert(TokenPair(window[0], window[1]));
                index.entries[id].count += freq;
                index.where_to_update[id].insert(word_idx);
            }
        }

        for entry in &index.entries {
            index.heap.push(HeapItem {
                count: entry.count,
                pair: entry.pair,
            });
        }

        index
    }

    /// Applies `delta` to the aggregate count of `pair` for an occurrence
    /// in `word_idx`.
    ///
    /// Untracked pairs are only created for positive deltas. Positive deltas
    /// also record `word_idx` as a candidate for the pair.
    pub fn change_count(&mut self, pair: TokenPair, delta: PairFreq, word_idx: WordIdx) {
        let id = match self.ids.get(&pair) {
            Some(&id) => id,
            None if delta > 0 => self.get_or_insert(pair),
            None => return,
        };

        self.entries[id].count += delta;

        if delta > 0 {
            self.where_to_update[id].insert(word_idx);
            self.touched.insert(id);
        }
    }

    /// Sets the count of a consumed pair to zero, keeping its entry.
    pub fn zero(&mut self, pair: TokenPair) {
        if let Some(&id) = self.ids.get(&pair) {
            self.entries[id].count = 0;
        }
    }

    /// Current aggregate count of a pair, `None` if never tracked.
    pub fn count(&self, pair: TokenPair) -> Option<PairFreq> {
        self.ids.get(&pair).map(|&id| self.entries[id].count)
    }

    /// Candidate words for `pair`, sorted by index.
    pub fn candidates(&self, pair: TokenPair) -> Vec<WordIdx> {
        let mut words: Vec<WordIdx> = self
            .ids
            .get(&pair)
            .map(|&id| self.where_to_update[id].iter().copied().collect())
            .unwrap_or_default();
        words.sort_unstable();
        words
    }

    /// Returns the pair with the greatest count, ties broken by the smaller
    /// `(left, right)` tuple.
    ///
    /// Returns `None` when the greatest count is not positive: nothing is
    /// left to merge. The selected entry stays in the index.
    pub fn find_best_pair(&mut self) -> Option<(TokenPair, PairFreq)> {
        self.push_touched();

        loop {
            let (pair, count) = {
                let top = self.heap.peek()?;
                (top.pair, top.count)
            };
            let current = self.count(pair).unwrap_or(0);

            if current == count {
                return (count > 0).then_some((pair, count));
            }

            // Stale entry: replace it with the live count.
            self.heap.pop();
            if current > 0 {
                self.heap.push(HeapItem {
                    count: current,
                    pair,
                });
            }
        }
    }

    /// Pushes the final count of every pair that went up, once per pair,
    /// then compacts the heap if stale entries dominate it.
    fn push_touched(&mut self) {
        for id in self.touched.drain() {
            let entry = self.entries[id];
            if entry.count > 0 {
                self.heap.push(HeapItem {
                    count: entry.count,
                    pair: entry.pair,
                });
            }
        }

        if self.heap.len() > HEAP_SLACK * self.entries.len() {
            self.heap = self
                .entries
                .iter()
                .filter(|e| e.count > 0)
                .map(|e| HeapItem {
                    count: e.count,
                    pair: e.pair,
                })
                .collect();
        }
    }

    /// Number of items in the heap, stale ones included.
    #[cfg(test)]
    pub(crate) fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Number of tracked pairs, zeroed ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over every tracked entry in creation order.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &PairCount> {
        self.entries.iter()
    }

    fn get_or_insert(&mut self, pair: TokenPair) -> PairId {
        if let Some(&id) = self.ids.get(&pair) {
            return id;
        }
        let id = self.entries.len();
        self.entries.push(PairCount { pair, count: 0 });
        self.where_to_update.push(HashSet::new());
        self.ids.insert(pair, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Token;

    fn word(symbols: &[Token], freq: u64) -> Word {
        Word {
            symbols: symbols.to_vec(),
            freq,
        }
    }

    /// Brute-force argmax over all entries with the same tie rule.
    fn linear_best(index: &PairIndex) -> Option<(TokenPair, PairFreq)> {
        let mut best: Option<PairCount> = None;
        for entry in index.iter() {
            best = match best {
                Some(b) if b.count > entry.count => Some(b),
                Some(b) if b.count == entry.count && b.pair < entry.pair => Some(b),
                _ => Some(*entry),
            };
        }
        best.filter(|b| b.count > 0).map(|b| (b.pair, b.count))
    }

    #[test]
    fn test_build_counts_weighted_by_freq() {
        let words = vec![word(&[0, 1, 2], 5), word(&[0, 1, 3], 2)];
        let index = PairIndex::build(&words);
        assert_eq!(index.count(TokenPair(0, 1)), Some(7));
        assert_eq!(index.count(TokenPair(1, 2)), Some(5));
        assert_eq!(index.count(TokenPair(1, 3)), Some(2));
        assert_eq!(index.candidates(TokenPair(0, 1)), vec![0, 1]);
    }

    #[test]
    fn test_repeated_pair_in_word() {
        let words = vec![word(&[0, 0, 0], 3)];
        let index = PairIndex::build(&words);
        assert_eq!(index.count(TokenPair(0, 0)), Some(6));
    }

    #[test]
    fn test_tie_prefers_smaller_tuple() {
        let words = vec![word(&[4, 7, 8], 9)];
        let mut index = PairIndex::build(&words);
        assert_eq!(index.find_best_pair(), Some((TokenPair(4, 7), 9)));
    }

    #[test]
    fn test_change_count_creates_only_on_positive() {
        let mut index = PairIndex::default();
        index.change_count(TokenPair(1, 2), -3, 0);
        assert_eq!(index.count(TokenPair(1, 2)), None);

        index.change_count(TokenPair(1, 2), 3, 4);
        assert_eq!(index.count(TokenPair(1, 2)), Some(3));
        assert_eq!(index.candidates(TokenPair(1, 2)), vec![4]);

        index.change_count(TokenPair(1, 2), -3, 4);
        assert_eq!(index.count(TokenPair(1, 2)), Some(0));
        // Candidates are never pruned.
        assert_eq!(index.candidates(TokenPair(1, 2)), vec![4]);
    }

    #[test]
    fn test_zeroed_pair_is_kept() {
        let words = vec![word(&[0, 1], 2)];
        let mut index = PairIndex::build(&words);
        index.zero(TokenPair(0, 1));
        assert_eq!(index.count(TokenPair(0, 1)), Some(0));
        assert_eq!(index.len(), 1);
        assert_eq!(index.find_best_pair(), None);
    }

    #[test]
    fn test_stale_entries_are_refreshed() {
        let words = vec![word(&[0, 1], 10), word(&[2, 3], 6)];
        let mut index = PairIndex::build(&words);
        index.change_count(TokenPair(0, 1), -7, 0);
        assert_eq!(index.find_best_pair(), Some((TokenPair(2, 3), 6)));

        index.change_count(TokenPair(0, 1), 3, 0);
        assert_eq!(index.find_best_pair(), Some((TokenPair(0, 1), 6)));
    }

    #[test]
    fn test_best_pair_is_not_consumed() {
        let words = vec![word(&[0, 1], 1)];
        let mut index = PairIndex::build(&words);
        assert_eq!(index.find_best_pair(), index.find_best_pair());
    }

    #[test]
    fn test_repeated_increments_push_once() {
        let words = vec![word(&[0, 1], 1)];
        let mut index = PairIndex::build(&words);
        let before = index.heap_len();
        for word_idx in 0..100 {
            index.change_count(TokenPair(7, 8), 1, word_idx);
        }
        assert_eq!(index.find_best_pair(), Some((TokenPair(7, 8), 100)));
        assert_eq!(index.heap_len(), before + 1);
    }

    #[test]
    fn test_stale_heap_is_compacted() {
        let words = vec![word(&[0, 1], 1), word(&[2, 3], 1)];
        let mut index = PairIndex::build(&words);
        for _ in 0..50 {
            index.change_count(TokenPair(0, 1), 1, 0);
            assert!(index.find_best_pair().is_some());
            index.change_count(TokenPair(0, 1), -1, 0);
            assert!(index.find_best_pair().is_some());
        }
        assert!(index.heap_len() <= HEAP_SLACK * index.len());
        assert_eq!(index.find_best_pair(), linear_best(&index));
    }

    #[test]
    fn test_heap_matches_linear_scan() {
        let words = vec![
            word(&[0, 1, 2, 1, 2], 3),
            word(&[2, 1, 0], 4),
            word(&[3, 3, 3, 1], 2),
        ];
        let mut index = PairIndex::build(&words);
        let updates = [
            (TokenPair(1, 2), -3, 0),
            (TokenPair(2, 1), -4, 1),
            (TokenPair(5, 1), 6, 2),
            (TokenPair(3, 3), -2, 2),
            (TokenPair(0, 5), 9, 0),
            (TokenPair(0, 5), -9, 0),
        ];
        for (pair, delta, word_idx) in updates {
            index.change_count(pair, delta, word_idx);
            let expected = linear_best(&index);
            assert_eq!(index.find_best_pair(), expected);
        }
    }
}
