//! Corpus ingestion and the word corpus index.
//!
//! A corpus is reduced to its distinct words and their frequencies. Words
//! are separated by single spaces and newlines; every other byte, tabs and
//! carriage returns included, belongs to a word. Distinct words keep the
//! order in which they first appeared so that symbol ids derived from them
//! are reproducible across runs.

use std::{
    collections::HashMap,
    fs,
    io::{self, Read},
    path::Path,
};

use crate::{
    error::CorpusError,
    interner::SymbolInterner,
    types::{Token, WordFreq},
};

/// Path that selects standard input instead of a file.
pub const STDIN_PATH: &str = "-";

/// Distinct words of a corpus with their occurrence counts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordCounts {
    /// (word, count) in first-appearance order.
    entries: Vec<(String, WordFreq)>,
    index: HashMap<String, usize>,
    /// Total number of word occurrences.
    total: u64,
}

impl WordCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` occurrences of `word`.
    pub fn add(&mut self, word: &str, count: WordFreq) {
        match self.index.get(word) {
            Some(&i) => self.entries[i].1 += count,
            None => {
                self.index.insert(word.to_string(), self.entries.len());
                self.entries.push((word.to_string(), count));
            }
        }
        self.total += count;
    }

    /// Count of a word, if it was seen.
    pub fn get(&self, word: &str) -> Option<WordFreq> {
        self.index.get(word).map(|&i| self.entries[i].1)
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of word occurrences.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Iterates over `(word, count)` in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, WordFreq)> {
        self.entries.iter().map(|(w, c)| (w.as_str(), *c))
    }

    /// Distinct words in first-appearance order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(w, _)| w.as_str())
    }
}

impl<S: AsRef<str>> FromIterator<(S, WordFreq)> for WordCounts {
    fn from_iter<I: IntoIterator<Item = (S, WordFreq)>>(iter: I) -> Self {
        let mut counts = WordCounts::new();
        for (word, count) in iter {
            counts.add(word.as_ref(), count);
        }
        counts
    }
}

/// Splits `text` into words and adds them to `counts`.
pub fn count_words(text: &str, counts: &mut WordCounts) {
    for word in split_words(text) {
        counts.add(word, 1);
    }
}

/// Iterates over the words of `text`, skipping empty runs between separators.
pub fn split_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_separator).filter(|w| !w.is_empty())
}

/// Word separators of the corpus format.
#[inline]
pub fn is_separator(c: char) -> bool {
    c == ' ' || c == '\n'
}

/// Reads a corpus file (or stdin for `-`) and adds its words to `counts`.
///
/// # Errors
///
/// Returns [`CorpusError::Io`] if the file cannot be read,
/// [`CorpusError::Stdin`] if standard input fails, or
/// [`CorpusError::InvalidUtf8`] if the content is not UTF-8.
pub fn read_corpus(path: &Path, counts: &mut WordCounts) -> Result<(), CorpusError> {
    let before_total = counts.total();
    let text = read_text(path)?;
    count_words(&text, counts);

    log::info!(
        "Read {} words ({} unique) from text file.",
        counts.total() - before_total,
        counts.len()
    );
    Ok(())
}

/// Reads the full content of a text file, or stdin for `-`.
pub(crate) fn read_text(path: &Path) -> Result<String, CorpusError> {
    if path.as_os_str() == STDIN_PATH {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(CorpusError::Stdin)?;
        return Ok(text);
    }

    log::info!("Loading text from {} ...", path.display());
    let bytes = fs::read(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| CorpusError::InvalidUtf8 {
        path: path.to_path_buf(),
    })
}

/// Word-frequency table sorted by descending count, ties by ascending word.
pub fn sorted_vocab(counts: &WordCounts) -> Vec<(&str, WordFreq)> {
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

/// True if `byte` starts a new encoded character (is not a UTF-8
/// continuation byte).
#[inline]
pub fn is_unit_start(byte: u8) -> bool {
    byte & 0xC0 != 0x80
}

/// Number of encoded characters in `s`.
pub fn unit_count(s: &str) -> usize {
    s.bytes().filter(|&b| is_unit_start(b)).count()
}

/// Splits a word into its initial symbols: one per encoded character, the
/// last one carrying `end_word`.
///
/// ```
/// use subword_bpe::corpus::split_word;
///
/// assert_eq!(split_word("lé", "</w>"), vec!["l", "é</w>"]);
/// ```
pub fn split_word(word: &str, end_word: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::with_capacity(word.len());
    let mut last_start = 0;
    for (pos, _) in word.char_indices().skip(1) {
        symbols.push(word[last_start..pos].to_string());
        last_start = pos;
    }
    let mut last = word[last_start..].to_string();
    last.push_str(end_word);
    symbols.push(last);
    symbols
}

/// A distinct corpus word during training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Current segmentation, rewritten in place as merges are applied.
    pub symbols: Vec<Token>,
    /// Number of occurrences in the corpus (>= 1).
    pub freq: WordFreq,
}

/// Turns every distinct word into its initial symbol-id sequence.
///
/// Symbols are interned in first-appearance order over the words in
/// `counts` order.
pub fn tokenize(counts: &WordCounts, end_word: &str, interner: &mut SymbolInterner) -> Vec<Word> {
    counts
        .iter()
        .map(|(word, freq)| Word {
            symbols: split_word(word, end_word)
                .iter()
                .map(|s| interner.intern(s))
                .collect(),
            freq,
        })
        .collect()
}
