use crate::error::ThemeSyncError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::{collections::HashSet, path::Path};

use super::file::relative_key;

/// Decides which theme files are excluded from sync.
///
/// Patterns wrapped in slashes (`/\.bak$/`) are regular expressions matched against the
/// relative path. Everything else is a glob; a glob without a `/` also matches on the file
/// name alone, and a trailing `/` matches everything below that directory.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    globs: GlobSet,
    name_globs: GlobSet,
    regexes: Vec<Regex>,
    files: HashSet<String>,
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        IgnoreFilter {
            globs: GlobSet::empty(),
            name_globs: GlobSet::empty(),
            regexes: Vec::new(),
            files: HashSet::new(),
        }
    }
}

impl IgnoreFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S], files: &[S]) -> Result<IgnoreFilter, ThemeSyncError> {
        let mut globs = GlobSetBuilder::new();
        let mut name_globs = GlobSetBuilder::new();
        let mut regexes = Vec::new();

        for pattern in patterns.iter().map(|p| p.as_ref().trim()) {
            if pattern.is_empty() {
                continue;
            }
            if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
                regexes.push(Regex::new(&pattern[1..pattern.len() - 1])?);
                continue;
            }
            let pattern = pattern.trim_start_matches("./").trim_start_matches('/');
            let pattern = if pattern.ends_with('/') {
                format!("{pattern}**")
            } else {
                pattern.to_string()
            };
            if !pattern.contains('/') {
                name_globs.add(Glob::new(&pattern)?);
            }
            globs.add(Glob::new(&pattern)?);
        }

        let files = files
            .iter()
            .map(|f| {
                f.as_ref()
                    .trim()
                    .trim_start_matches("./")
                    .trim_start_matches('/')
                    .to_string()
            })
            .filter(|f| !f.is_empty())
            .collect();

        Ok(IgnoreFilter {
            globs: globs.build()?,
            name_globs: name_globs.build()?,
            regexes,
            files,
        })
    }

    /// `relative` is a path relative to the theme root.
    pub fn is_match<P: AsRef<Path>>(&self, relative: P) -> bool {
        let relative = relative.as_ref();
        let key = relative_key(relative);
        if self.files.contains(&key) {
            return true;
        }
        if self.regexes.iter().any(|re| re.is_match(&key)) {
            return true;
        }
        if self.globs.is_match(&key) {
            return true;
        }
        relative
            .file_name()
            .is_some_and(|name| self.name_globs.is_match(name))
    }
}
