//! Byte-pair-encoding subword segmentation.
//!
//! Learns an ordered list of merges from the word frequencies of a text
//! corpus, and applies those merges to split words into subword units,
//! optionally restricted to a vocabulary.
//!
//! Training maintains pair frequencies incrementally, so each merge only
//! touches the words that contain the merged pair. Application of distinct
//! words runs on a worker pool.
//!
//! ```
//! use subword_bpe::{corpus::WordCounts, train, BpeApplier, BpeConfig};
//!
//! let counts: WordCounts = [("low", 5), ("lower", 2), ("newest", 6), ("widest", 3)]
//!     .into_iter()
//!     .collect();
//! let config = BpeConfig::default().with_threads(1);
//! let codes = train(&counts, 10, &config, false).unwrap();
//!
//! let applier = BpeApplier::new(codes, None, config);
//! assert_eq!(applier.apply_word("lower").unwrap(), "lo@@ w@@ e@@ r");
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]

pub mod applier;
pub mod codes;
pub mod config;
pub mod corpus;
pub mod error;
pub mod interner;
pub mod pair_index;
mod progress;
pub mod text;
pub mod trainer;
pub mod types;

#[cfg(feature = "python")]
mod python;

pub use applier::BpeApplier;
pub use codes::{CodeTable, Merge, Vocabulary};
pub use config::BpeConfig;
pub use error::{ApplyError, CorpusError, LoadError, TrainError};
pub use trainer::{train, BpeTrainer};
