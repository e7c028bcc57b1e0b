use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fs;
use std::path::Path;

use crate::error::{Error, IoContext, Result};

/// Gitignore style exclusion rules anchored at the target directory.
pub struct IgnoreRules(Gitignore);

impl IgnoreRules {
    /// Loads rules from `ignore_file`, one gitignore pattern per line.
    pub fn from_file(target_dir: &Path, ignore_file: &Path) -> Result<Self> {
        let text = fs::read_to_string(ignore_file).at(ignore_file)?;
        Self::from_lines(target_dir, text.lines()).map_err(|err| match err {
            Error::IgnoreRule(_, source) => Error::IgnoreRule(ignore_file.to_owned(), source),
            other => other,
        })
    }

    pub fn from_lines<'a, I: IntoIterator<Item = &'a str>>(target_dir: &Path, lines: I) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(target_dir);
        for line in lines {
            builder
                .add_line(None, line)
                .map_err(|err| Error::IgnoreRule(target_dir.to_owned(), err))?;
        }
        let gitignore = builder
            .build()
            .map_err(|err| Error::IgnoreRule(target_dir.to_owned(), err))?;
        Ok(IgnoreRules(gitignore))
    }

    pub fn empty(target_dir: &Path) -> Result<Self> {
        Self::from_lines(target_dir, [])
    }

    /// Whether `path` (absolute, below the target directory) or any of its
    /// parents is excluded.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if !path.starts_with(self.0.path()) {
            return false;
        }
        self.0.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}
