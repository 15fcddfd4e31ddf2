//! Per-author output file names.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// The four tables of a run, all under one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Baseline harvest (`*_publications_original.csv`)
    pub original: PathBuf,
    /// Working/checkpoint table (`*_publications_all.csv`)
    pub all: PathBuf,
    /// Matched rows with a known country (`*_publications_clean.csv`)
    pub clean: PathBuf,
    /// Failed or country-less rows (`*_publications_abandon.csv`)
    pub abandon: PathBuf,
}

impl OutputPaths {
    /// `Franco Nori` in `out/` gives `out/Franco_Nori_publications_all.csv`, etc.
    pub fn for_author(dir: &Path, author: &str) -> Self {
        let stem = file_stem(author);
        let table = |kind: &str| dir.join(format!("{}_publications_{}.csv", stem, kind));
        Self {
            original: table("original"),
            all: table("all"),
            clean: table("clean"),
            abandon: table("abandon"),
        }
    }

    /// Create the output directory if needed.
    pub fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.all.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Author name with whitespace runs replaced by `_` and path separators dropped.
fn file_stem(author: &str) -> String {
    author
        .split_whitespace()
        .map(|part| part.replace(['/', '\\'], ""))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_author() {
        let paths = OutputPaths::for_author(Path::new("out"), "Franco Nori");
        assert_eq!(paths.all, PathBuf::from("out/Franco_Nori_publications_all.csv"));
        assert_eq!(paths.clean, PathBuf::from("out/Franco_Nori_publications_clean.csv"));
        assert_eq!(paths.abandon, PathBuf::from("out/Franco_Nori_publications_abandon.csv"));
        assert_eq!(
            paths.original,
            PathBuf::from("out/Franco_Nori_publications_original.csv")
        );
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(file_stem("  Cheng-Wei   Qiu "), "Cheng-Wei_Qiu");
        assert_eq!(file_stem("A/B C"), "AB_C");
    }
}
