use std::fs;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::Context;
use crate::config::{OnViolation, Sources, dest_path};
use crate::io::write_if_changed;
use crate::translate::{Catalog, DomainCheck, PotHeader, Violation};
use crate::tasks::{BUILD_POT, CHECK_TEXT_DOMAIN, source_set};

/// PHP sources of a section as paths relative to the root, sorted so that
/// every run sees them in the same order.
fn sorted_sources(ctx: &Context, section: &str, sources: &Sources) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let set = source_set(section, sources)?;
    let mut paths: Vec<_> = set.resolve(&ctx.root)?.iter().map(|f| f.path()).collect();
    paths.sort();
    Ok(paths)
}

fn read(root: &Utf8Path, path: &Utf8Path) -> anyhow::Result<String> {
    fs::read_to_string(root.join(path)).with_context(|| format!("couldn't read '{path}'"))
}

/// Looks for translation calls with a missing, variable or foreign text
/// domain.
pub(crate) fn check_text_domain(ctx: &Context) -> anyhow::Result<()> {
    let Some(options) = &ctx.config.translate.textdomain else {
        tracing::info!("{CHECK_TEXT_DOMAIN}: nothing to do");
        return Ok(());
    };

    let keywords = ctx.config.translate.keywords()?;
    let check = DomainCheck {
        keywords: &keywords,
        allowed: options.text_domain.as_slice(),
        report_missing: options.report_missing,
        report_variable: options.report_variable_domain,
        correct: options.correct_domain,
    };

    let paths = sorted_sources(ctx, "translate.textdomain", &options.src)?;

    let checked = paths
        .par_iter()
        .map(|path| -> anyhow::Result<Vec<Violation>> {
            let source = read(&ctx.root, path)?;
            let checked = check.check(path, &source);

            if let Some(fixed) = checked.corrected {
                write_if_changed(&ctx.root.join(path), fixed.as_bytes())
                    .with_context(|| format!("couldn't write '{path}'"))?;
            }

            Ok(checked.violations)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let violations: Vec<Violation> = checked.into_iter().flatten().collect();
    for violation in &violations {
        tracing::warn!("{violation}");
    }

    let open = violations.iter().filter(|v| !v.corrected).count();
    tracing::info!(
        "{CHECK_TEXT_DOMAIN}: {} files checked, {} violation(s), {} corrected",
        paths.len(),
        violations.len(),
        violations.len() - open
    );

    if options.on_violation == OnViolation::Fail && open > 0 {
        anyhow::bail!("{open} text domain violation(s)");
    }
    Ok(())
}

/// Writes the POT catalog for the theme's domain.
pub(crate) fn build_pot(ctx: &Context) -> anyhow::Result<()> {
    let Some(options) = &ctx.config.translate.pot else {
        tracing::info!("{BUILD_POT}: nothing to do");
        return Ok(());
    };

    let keywords = ctx.config.translate.keywords()?;
    let paths = sorted_sources(ctx, "translate.pot", &options.src)?;

    // Read in parallel, extract in path order.
    let sources = paths
        .par_iter()
        .map(|path| read(&ctx.root, path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut catalog = Catalog::new(PotHeader {
        domain: options.domain.clone(),
        package: options.package.clone(),
        bug_report: options.bug_report.clone(),
        last_translator: options.last_translator.clone(),
        team: options.team.clone(),
    });

    for (path, source) in paths.iter().zip(&sources) {
        catalog.add_source(path, source, &keywords);
    }

    let dest = dest_path(&options.dest);
    let changed = write_if_changed(&ctx.root.join(&dest), catalog.render().as_bytes())
        .with_context(|| format!("couldn't write '{dest}'"))?;

    tracing::info!(
        "{BUILD_POT}: {} strings from {} files{}",
        catalog.len(),
        paths.len(),
        if changed { "" } else { " (unchanged)" }
    );
    Ok(())
}
