//! directory patterns (gitignore semantics, relative to the scanned path)
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path};

#[derive(Debug)]
pub struct PathPatterns {
    matcher: Gitignore,
    patterns: Vec<String>,
}

impl PathPatterns {
    /// Patterns are matched against paths relative to the scanned directory
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, super::LocatorError> {
        let mut builder = GitignoreBuilder::new(".");
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder
                .add_line(None, pattern)
                .map_err(|source| super::LocatorError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
        }

        let matcher = builder
            .build()
            .map_err(|source| super::LocatorError::InvalidPattern {
                pattern: patterns
                    .iter()
                    .map(|p| p.as_ref())
                    .collect::<Vec<_>>()
                    .join(", "),
                source,
            })?;

        Ok(Self {
            matcher,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    /// Does `rel_path` (or one of its parents) match?
    pub fn matches(&self, rel_path: &Path, is_dir: bool) -> bool {
        if self.patterns.is_empty() || rel_path.as_os_str().is_empty() || rel_path == Path::new(".") {
            return false;
        }

        self.matcher
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }

    /// Could a directory strictly below `rel_path` match?
    ///
    /// Conservative: a glob segment is assumed to match any name.
    pub fn may_match_below(&self, rel_path: &Path) -> bool {
        let names: Vec<_> = rel_path
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy()),
                _ => None,
            })
            .collect();

        self.patterns.iter().any(|pattern| {
            if pattern.starts_with('!') || pattern.starts_with('#') {
                return false;
            }
            let pattern = pattern.trim_end_matches('/');
            // a pattern without an inner slash matches at any level
            if !pattern.contains('/') {
                return true;
            }

            let segments: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
            for (index, name) in names.iter().enumerate() {
                match segments.get(index) {
                    None => return false,
                    Some(&"**") => return true,
                    Some(segment) if is_glob(segment) || *segment == &**name => {}
                    Some(_) => return false,
                }
            }
            segments.len() > names.len()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn is_glob(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}
