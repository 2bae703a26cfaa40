//! Ordered glob sets in the style of a gulp `src` list.
//!
//! A source list is a sequence of patterns. Plain patterns include files, and
//! patterns prefixed with `!` exclude them again. The order of the include
//! patterns is preserved in the result, which matters for concatenation:
//! a bundle of `[a.js, b.js]` must come out as `a` followed by `b`. Within a
//! single wildcard pattern, matches are sorted by path.
//!
//! Every match remembers its *base*: the static, wildcard-free prefix of the
//! pattern that produced it. When the file is later written to a destination,
//! only the part below the base is kept (`assets/images/*` writes `a.png`, not
//! `assets/images/a.png`).

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};

use crate::error::SourceError;
use crate::io::normalize_path;

/// `*` and `?` never cross a `/`, and wildcards skip dot-names unless the
/// pattern spells the dot out.
pub(crate) const GLOB_OPTS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A file matched by a [`SourceSet`], relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Static prefix of the glob that matched.
    pub base: Utf8PathBuf,
    /// Path below `base`.
    pub relative: Utf8PathBuf,
}

impl SourceFile {
    /// Path relative to the project root.
    pub fn path(&self) -> Utf8PathBuf {
        self.base.join(&self.relative)
    }
}

#[derive(Debug, Clone)]
pub struct SourceSet {
    include: Vec<Utf8PathBuf>,
    exclude: Vec<Pattern>,
    dotfiles: bool,
}

impl SourceSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, glob::PatternError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(Pattern::new(clean(negated).as_str())?),
                None => {
                    let path = clean(pattern);
                    Pattern::new(path.as_str())?;
                    include.push(path);
                }
            }
        }

        Ok(Self {
            include,
            exclude,
            dotfiles: true,
        })
    }

    /// Wildcards stop matching names with a leading dot, like minimatch does by
    /// default. Literal dotfile names still match.
    pub fn without_dotfiles(mut self) -> Self {
        self.dotfiles = false;
        self
    }

    /// Adds an exclusion pattern after construction.
    pub fn exclude(mut self, pattern: &str) -> Result<Self, glob::PatternError> {
        self.exclude.push(Pattern::new(clean(pattern).as_str())?);
        Ok(self)
    }

    pub fn is_excluded(&self, path: &Utf8Path) -> bool {
        let options = self.match_options();
        self.exclude
            .iter()
            .any(|p| p.matches_with(path.as_str(), options))
    }

    /// Whether `path` (relative to the root) is selected by this set, without
    /// touching the file system.
    pub fn matches(&self, path: &Utf8Path) -> bool {
        let options = self.match_options();
        self.include
            .iter()
            .filter_map(|p| Pattern::new(p.as_str()).ok())
            .any(|p| p.matches_with(path.as_str(), options))
            && !self.is_excluded(path)
    }

    /// Expands the set against the file system below `root`. Only files are
    /// returned, each once, in declared pattern order.
    pub fn resolve(&self, root: &Utf8Path) -> Result<Vec<SourceFile>, SourceError> {
        let prefix = Pattern::escape(root.as_str());
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in &self.include {
            let base = glob_base(pattern);

            if !is_glob(pattern) {
                let full = root.join(pattern);
                if !full.is_file() {
                    return Err(SourceError::NotFound(pattern.clone()));
                }
                if !self.is_excluded(pattern) && seen.insert(pattern.clone()) {
                    files.push(SourceFile {
                        base,
                        relative: Utf8PathBuf::from(pattern.file_name().unwrap_or_default()),
                    });
                }
                continue;
            }

            let full = format!("{prefix}/{pattern}");
            for entry in glob::glob_with(&full, self.match_options())? {
                let path = Utf8PathBuf::try_from(entry?)?;
                if !path.is_file() {
                    continue;
                }

                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let relative = relative.to_path_buf();

                if self.is_excluded(&relative) || !seen.insert(relative.clone()) {
                    continue;
                }

                let below = relative
                    .strip_prefix(&base)
                    .map(Utf8Path::to_path_buf)
                    .unwrap_or_else(|_| relative.clone());

                files.push(SourceFile {
                    base: base.clone(),
                    relative: below,
                });
            }
        }

        Ok(files)
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            require_literal_leading_dot: !self.dotfiles,
            ..GLOB_OPTS
        }
    }
}

fn clean(pattern: &str) -> Utf8PathBuf {
    normalize_path(Utf8Path::new(pattern.trim()))
}

pub(crate) fn is_glob(path: &Utf8Path) -> bool {
    path.as_str().contains(['*', '?', '['])
}

/// The static part of a glob: every leading component without wildcards. For a
/// literal path this is its parent directory.
pub(crate) fn glob_base(pattern: &Utf8Path) -> Utf8PathBuf {
    if !is_glob(pattern) {
        return pattern.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
    }

    pattern
        .components()
        .take_while(|c| !c.as_str().contains(['*', '?', '[']))
        .collect()
}
