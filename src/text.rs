//! Applying codes to running text.
//!
//! Words are rewritten in place; separators (spaces and newlines) are copied
//! through unchanged, so the output keeps the layout of the input.

use std::{
    fs,
    io::{BufRead, Write},
    path::Path,
};

use crate::{
    applier::BpeApplier,
    corpus::{self, is_separator},
    error::ApplyError,
};

/// Rebuilds `text` with every word replaced by `f(word)`.
pub(crate) fn rewrite_words<F>(text: &str, mut f: F) -> Result<String, ApplyError>
where
    F: FnMut(&str) -> Result<String, ApplyError>,
{
    let mut out = String::with_capacity(text.len() * 2);
    let mut start = 0;

    for (pos, sep) in text.match_indices(is_separator) {
        if pos > start {
            out.push_str(&f(&text[start..pos])?);
        }
        out.push_str(sep);
        start = pos + sep.len();
    }
    // trailing word without a final separator
    if start < text.len() {
        out.push_str(&f(&text[start..])?);
    }

    Ok(out)
}

/// Segments a whole text, each distinct word once on the worker pool.
///
/// # Errors
///
/// See [`BpeApplier::segment_words`].
pub fn apply_text(
    applier: &BpeApplier,
    text: &str,
    show_progress: bool,
) -> Result<String, ApplyError> {
    let segmented = applier.segment_words(corpus::split_words(text), show_progress)?;
    log::info!("Modified {} words from text file.", segmented.len());

    rewrite_words(text, |word| {
        Ok(segmented.get(word).cloned().unwrap_or_default())
    })
}

/// Reads `input` (stdin for `-`), segments it and writes the result to
/// `output` in one pass.
///
/// # Errors
///
/// Returns [`ApplyError::Corpus`] if the input cannot be read,
/// [`ApplyError::Write`] if the output cannot be written, or any error of
/// [`apply_text`].
pub fn apply_file(
    applier: &BpeApplier,
    input: &Path,
    output: &Path,
    show_progress: bool,
) -> Result<(), ApplyError> {
    let text = corpus::read_text(input)?;
    let segmented = apply_text(applier, &text, show_progress)?;

    log::info!("Writing output to {} ...", output.display());
    fs::write(output, segmented).map_err(|source| ApplyError::Write {
        path: output.to_path_buf(),
        source,
    })
}

/// Segments `reader` line by line into `writer`.
///
/// Each line is written and flushed as soon as it is read, so this works
/// on unbounded input. Returns the number of lines processed.
///
/// # Errors
///
/// Returns [`ApplyError::Stream`] if reading or writing fails, or
/// [`ApplyError::Irreducible`] from a word.
pub fn apply_stream<R: BufRead, W: Write>(
    applier: &BpeApplier,
    reader: R,
    writer: &mut W,
) -> Result<usize, ApplyError> {
    let mut lines = 0;
    for line in reader.lines() {
        let line = line.map_err(ApplyError::Stream)?;
        let segmented = applier.apply_sentence(&line)?;
        writeln!(writer, "{segmented}").map_err(ApplyError::Stream)?;
        writer.flush().map_err(ApplyError::Stream)?;
        lines += 1;
    }

    log::debug!("Streamed {lines} lines");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{codes::CodeTable, config::BpeConfig};

    fn applier() -> BpeApplier {
        let codes = CodeTable::from_lines(["l o", "lo w</w>", "e r</w>"])
            .expect("codes should load");
        BpeApplier::new(codes, None, BpeConfig::default().with_threads(2))
    }

    #[test]
    fn test_rewrite_keeps_layout() {
        let out = rewrite_words("  ab c\n\nd", |w| Ok(w.to_uppercase()))
            .expect("rewrite cannot fail");
        assert_eq!(out, "  AB C\n\nD");
    }

    #[test]
    fn test_apply_text_flushes_trailing_word() {
        let out = apply_text(&applier(), "low lower\nlow", false).expect("apply");
        assert_eq!(out, "low lo@@ w@@ er\nlow");
    }

    #[test]
    fn test_tabs_belong_to_words() {
        let out = apply_text(&applier(), "lo\tw", false).expect("apply");
        assert_eq!(out, "lo@@ \t@@ w");
    }

    #[test]
    fn test_apply_file() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, "lower low\n").expect("input should be writable");

        apply_file(&applier(), &input, &output, false).expect("apply file");
        let written = fs::read_to_string(&output).expect("output should exist");
        assert_eq!(written, "lo@@ w@@ er low\n");
    }

    #[test]
    fn test_apply_file_missing_input() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let result = apply_file(
            &applier(),
            &dir.path().join("missing.txt"),
            &dir.path().join("out.txt"),
            false,
        );
        assert!(matches!(result, Err(ApplyError::Corpus(_))));
    }

    #[test]
    fn test_apply_stream() {
        let input = Cursor::new("low lower\n\nlower\n");
        let mut out = Vec::new();
        let lines = apply_stream(&applier(), input, &mut out).expect("stream");
        assert_eq!(lines, 3);
        assert_eq!(
            String::from_utf8_lossy(&out),
            "low lo@@ w@@ er\n\nlo@@ w@@ er\n"
        );
    }
}
