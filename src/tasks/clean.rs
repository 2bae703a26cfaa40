use std::collections::BTreeSet;
use std::fs;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::Context;
use crate::io::{escapes_root, normalize_path};
use crate::sources::GLOB_OPTS;
use crate::tasks::CLEAN;

/// Deletes every file and directory matched by the clean patterns. Patterns
/// starting with `!` keep what they match. Nothing outside the project root
/// is ever touched, and running it twice in a row is a no-op.
pub(crate) fn clean(ctx: &Context) -> anyhow::Result<()> {
    let patterns = &ctx.config.clean;
    if patterns.is_empty() {
        tracing::info!("{CLEAN}: nothing to do");
        return Ok(());
    }

    let targets = expand(&ctx.root, patterns)?;

    let mut deleted: Vec<&Utf8Path> = Vec::new();
    for path in &targets {
        // Already gone with a deleted parent directory.
        if deleted.iter().any(|parent| path.starts_with(parent)) {
            continue;
        }

        let full = ctx.root.join(path);
        let result = if full.is_dir() {
            fs::remove_dir_all(&full)
        } else {
            fs::remove_file(&full)
        };

        match result {
            Ok(()) => {
                tracing::debug!("deleted {path}");
                deleted.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("couldn't delete '{path}'")),
        }
    }

    tracing::info!("{CLEAN}: {} paths deleted", deleted.len());
    Ok(())
}

/// Resolves the patterns to existing paths relative to `root`, sorted so that
/// parents come before their children. Wildcards never enter dot-directories
/// such as `.git`.
fn expand(root: &Utf8Path, patterns: &[String]) -> anyhow::Result<BTreeSet<Utf8PathBuf>> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for pattern in patterns {
        match pattern.strip_prefix('!') {
            Some(negated) => {
                exclude.push(Pattern::new(normalize_path(Utf8Path::new(negated.trim())).as_str())?)
            }
            None => {
                let path = normalize_path(Utf8Path::new(pattern.trim()));
                if path.as_str().is_empty() || escapes_root(&path) {
                    anyhow::bail!("refusing to delete '{pattern}': it is not inside the project root");
                }
                include.push(path);
            }
        }
    }

    let prefix = Pattern::escape(root.as_str());
    let mut found = BTreeSet::new();

    for pattern in include {
        for entry in glob::glob_with(&format!("{prefix}/{pattern}"), GLOB_OPTS)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let kept = exclude
                .iter()
                .any(|p| p.matches_with(relative.as_str(), GLOB_OPTS));
            if relative.as_str().is_empty() || kept {
                continue;
            }
            found.insert(relative.to_path_buf());
        }
    }

    Ok(found)
}
