//! Code table (ordered merges) and restricted output vocabulary.
//!
//! Both are persisted as plain text, one entry per line, fields separated
//! by spaces:
//!
//! - merges: `left right` or `left right count`, in rank order
//! - vocabulary: `token count`

use std::{
    collections::{hash_map::Entry, HashMap},
    fs,
    io::{self, Write},
    path::Path,
};

use crate::{
    error::LoadError,
    types::{MergeRank, PairFreq, WordFreq},
};

/// A learned merge rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    pub left: String,
    pub right: String,
    /// Pair frequency at the time the merge was learned, when known.
    pub count: Option<PairFreq>,
}

impl Merge {
    /// Text of the symbol the merge produces.
    pub fn merged(&self) -> String {
        let mut merged = String::with_capacity(self.left.len() + self.right.len());
        merged.push_str(&self.left);
        merged.push_str(&self.right);
        merged
    }
}

/// Ordered record of merges.
///
/// The rank of a merge is its position in the table. Pairs are looked up by
/// `(left, right)` for application, and merged symbols are looked up by
/// their text to recover the pair they came from.
#[derive(Debug, Default, Clone)]
pub struct CodeTable {
    merges: Vec<Merge>,
    /// left -> right -> rank
    ranks: HashMap<String, HashMap<String, MergeRank>>,
    /// merged text -> rank of the merge that produced it
    reversed: HashMap<String, MergeRank>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a merges listing.
    ///
    /// Ranks follow line order. A line has two fields, or three when the
    /// third is the learned count.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MalformedLine`] or [`LoadError::InvalidCount`]
    /// for a bad line, [`LoadError::DuplicatePair`] for a repeated merge, and
    /// [`LoadError::DuplicateMerged`] when two merges produce the same symbol.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = CodeTable::new();

        for (i, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let fields: Vec<&str> = line.split(' ').filter(|f| !f.is_empty()).collect();
            let count = match fields.len() {
                2 => None,
                3 => Some(fields[2].parse::<PairFreq>().map_err(|_| {
                    LoadError::InvalidCount {
                        line_no: i + 1,
                        value: fields[2].to_string(),
                    }
                })?),
                _ => {
                    return Err(LoadError::MalformedLine {
                        line_no: i + 1,
                        line: line.to_string(),
                        expected: "`left right` or `left right count`",
                    })
                }
            };
            table.insert(fields[0], fields[1], count)?;
        }

        Ok(table)
    }

    /// Reads a merges file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        log::info!("Loading codes from {} ...", path.display());
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            kind: "codes",
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_lines(text.lines())?;
        log::info!("Read {} codes from the codes file.", table.len());
        Ok(table)
    }

    /// Appends a merge, rejecting duplicates.
    pub fn insert(
        &mut self,
        left: &str,
        right: &str,
        count: Option<PairFreq>,
    ) -> Result<MergeRank, LoadError> {
        if self.rank(left, right).is_some() {
            return Err(LoadError::DuplicatePair {
                left: left.to_string(),
                right: right.to_string(),
            });
        }
        let merge = Merge {
            left: left.to_string(),
            right: right.to_string(),
            count,
        };
        if self.reversed.contains_key(&merge.merged()) {
            return Err(LoadError::DuplicateMerged {
                merged: merge.merged(),
            });
        }
        Ok(self.push(merge))
    }

    /// Appends a merge produced by training.
    ///
    /// Training can yield two merges with the same surface (`a bc` and
    /// `ab c`). The first one keeps the pair lookup and the un-merge origin;
    /// the later one is only recorded in the listing.
    pub(crate) fn push(&mut self, merge: Merge) -> MergeRank {
        let rank = self.merges.len();

        if let Entry::Vacant(slot) = self.reversed.entry(merge.merged()) {
            slot.insert(rank);
        }
        self.ranks
            .entry(merge.left.clone())
            .or_default()
            .entry(merge.right.clone())
            .or_insert(rank);

        self.merges.push(merge);
        rank
    }

    /// Rank of the `(left, right)` merge.
    pub fn rank(&self, left: &str, right: &str) -> Option<MergeRank> {
        self.ranks.get(left)?.get(right).copied()
    }

    /// The pair a merged symbol was produced from.
    pub fn origin(&self, merged: &str) -> Option<(&str, &str)> {
        let merge = &self.merges[*self.reversed.get(merged)?];
        Some((merge.left.as_str(), merge.right.as_str()))
    }

    /// Merge at `rank`.
    pub fn get(&self, rank: MergeRank) -> Option<&Merge> {
        self.merges.get(rank)
    }

    pub fn len(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }

    /// Merges in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// True if no two merges share a pair or a merged surface.
    pub fn is_unambiguous(&self) -> bool {
        self.reversed.len() == self.merges.len()
            && self.ranks.values().map(HashMap::len).sum::<usize>() == self.merges.len()
    }

    /// Writes the listing, one merge per line, with counts when known.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for merge in &self.merges {
            write_merge(writer, merge)?;
        }
        Ok(())
    }
}

/// Writes one merge line: `left right` or `left right count`.
pub fn write_merge<W: Write>(writer: &mut W, merge: &Merge) -> io::Result<()> {
    match merge.count {
        Some(count) => writeln!(writer, "{} {} {}", merge.left, merge.right, count),
        None => writeln!(writer, "{} {}", merge.left, merge.right),
    }
}

/// Restricted output vocabulary.
///
/// Keys are surface forms: word-final pieces without the end-of-word
/// marker, other pieces with the continuation marker appended.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    counts: HashMap<String, WordFreq>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `token count` lines.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MalformedLine`] or [`LoadError::InvalidCount`]
    /// for a bad line and [`LoadError::DuplicateToken`] for a repeated token.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocabulary::new();

        for (i, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let fields: Vec<&str> = line.split(' ').filter(|f| !f.is_empty()).collect();
            let [token, count] = fields.as_slice() else {
                return Err(LoadError::MalformedLine {
                    line_no: i + 1,
                    line: line.to_string(),
                    expected: "`token count`",
                });
            };
            let count = count.parse::<WordFreq>().map_err(|_| LoadError::InvalidCount {
                line_no: i + 1,
                value: count.to_string(),
            })?;
            vocab.insert(token, count)?;
        }

        Ok(vocab)
    }

    /// Reads a vocabulary file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        log::info!("Loading vocabulary from {} ...", path.display());
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            kind: "vocabulary",
            path: path.to_path_buf(),
            source,
        })?;
        let vocab = Self::from_lines(text.lines())?;
        log::info!(
            "Read {} words ({} unique) from vocabulary file.",
            vocab.total(),
            vocab.len()
        );
        Ok(vocab)
    }

    /// Adds a token, rejecting duplicates.
    pub fn insert(&mut self, token: &str, count: WordFreq) -> Result<(), LoadError> {
        match self.counts.entry(token.to_string()) {
            Entry::Occupied(_) => Err(LoadError::DuplicateToken {
                token: token.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(count);
                Ok(())
            }
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.counts.contains_key(token)
    }

    pub fn get(&self, token: &str) -> Option<WordFreq> {
        self.counts.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Writes `token count` lines sorted by descending count, then token.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut sorted: Vec<_> = self.counts.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (token, count) in sorted {
            writeln!(writer, "{token} {count}")?;
        }
        Ok(())
    }
}

impl From<&crate::corpus::WordCounts> for Vocabulary {
    fn from(counts: &crate::corpus::WordCounts) -> Self {
        Self {
            counts: counts.iter().map(|(w, c)| (w.to_string(), c)).collect(),
        }
    }
}
