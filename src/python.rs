//! Python bindings, built with the `python` feature.

use std::path::Path;

use pyo3::{exceptions::PyValueError, prelude::*};

use crate::{
    applier::BpeApplier, config::BpeConfig, corpus::WordCounts, trainer::BpeTrainer,
};

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Python wrapper for the BPE trainer.
#[pyclass(name = "BpeTrainer")]
pub struct PyBpeTrainer {
    trainer: BpeTrainer,
}

#[pymethods]
impl PyBpeTrainer {
    #[new]
    #[pyo3(signature = (word_counts, end_word = None))]
    fn new(word_counts: Vec<(String, u64)>, end_word: Option<String>) -> Self {
        let counts: WordCounts = word_counts.into_iter().collect();
        let mut config = BpeConfig::default();
        if let Some(end_word) = end_word {
            config = config.with_end_word(end_word);
        }
        PyBpeTrainer {
            trainer: BpeTrainer::new(&counts, &config),
        }
    }

    fn train(&mut self, num_merges: usize) -> usize {
        self.trainer.train(num_merges)
    }

    fn merge_step(&mut self) -> Option<(String, String, i64)> {
        self.trainer
            .merge_step()
            .map(|m| (m.left.clone(), m.right.clone(), m.count.unwrap_or_default()))
    }

    fn get_merges(&self) -> Vec<(String, String, i64)> {
        self.trainer
            .codes()
            .iter()
            .map(|m| (m.left.clone(), m.right.clone(), m.count.unwrap_or_default()))
            .collect()
    }

    fn get_segmentations(&self) -> Vec<Vec<String>> {
        (0..self.trainer.words().len())
            .map(|i| {
                self.trainer
                    .segmentation(i)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }
}

/// Python wrapper for the applier.
#[pyclass(name = "BpeApplier")]
pub struct PyBpeApplier {
    applier: BpeApplier,
}

#[pymethods]
impl PyBpeApplier {
    #[new]
    #[pyo3(signature = (codes_path, vocab_path = None, threads = None))]
    fn new(codes_path: &str, vocab_path: Option<&str>, threads: Option<usize>) -> PyResult<Self> {
        let mut config = BpeConfig::default();
        if let Some(threads) = threads {
            config = config.with_threads(threads);
        }
        let applier =
            BpeApplier::from_files(Path::new(codes_path), vocab_path.map(Path::new), config)
                .map_err(value_error)?;
        Ok(PyBpeApplier { applier })
    }

    fn apply(&self, sentences: Vec<String>) -> PyResult<Vec<String>> {
        self.applier.apply_sentences(&sentences).map_err(value_error)
    }

    fn apply_word(&self, word: &str) -> PyResult<String> {
        self.applier.apply_word(word).map_err(value_error)
    }
}

#[pymodule]
fn _subword_bpe(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBpeTrainer>()?;
    m.add_class::<PyBpeApplier>()?;
    Ok(())
}
