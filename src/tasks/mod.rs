//! The fixed task registry.
//!
//! Every task is a function over the shared [`Context`]. Descriptor based
//! tasks fan out over their descriptors on the rayon pool and fan back in
//! through [`merge`], which turns the drained pipelines into one verdict.

mod clean;
mod compress;
mod images;
mod scripts;
mod styles;
mod translate;

use anyhow::Context as _;
use camino::Utf8PathBuf;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::Context;
use crate::config::Sources;
use crate::graph::TaskDef;
use crate::sources::SourceSet;
use crate::stream::{Drained, Sink};

pub const STYLES_BUILD: &str = "styles-build";
pub const STYLES_RTL: &str = "styles-rtl";
pub const JS_LINT: &str = "js-lint";
pub const JS_BUNDLE: &str = "js-bundle";
pub const JS_MINIFY: &str = "js-minify";
pub const CHECK_TEXT_DOMAIN: &str = "check-text-domain";
pub const BUILD_POT: &str = "build-pot";
pub const IMAGE: &str = "image";
pub const COMPRESS: &str = "compress";
pub const CLEAN: &str = "clean";

/// Every task and the tasks it waits for.
pub fn registry() -> Vec<TaskDef> {
    vec![
        TaskDef::new(STYLES_BUILD, &[], styles::build),
        TaskDef::new(STYLES_RTL, &[STYLES_BUILD], styles::rtl),
        TaskDef::new(JS_LINT, &[], scripts::lint),
        TaskDef::new(JS_BUNDLE, &[JS_LINT], scripts::bundle),
        TaskDef::new(JS_MINIFY, &[JS_BUNDLE], scripts::minify),
        TaskDef::new(CHECK_TEXT_DOMAIN, &[], translate::check_text_domain),
        TaskDef::new(BUILD_POT, &[CHECK_TEXT_DOMAIN], translate::build_pot),
        TaskDef::new(IMAGE, &[], images::image),
        TaskDef::new(COMPRESS, &[STYLES_RTL, JS_MINIFY, IMAGE, BUILD_POT], compress::compress),
        TaskDef::new(CLEAN, &[], clean::clean),
    ]
}

/// What to run, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Command {
    /// Styles, scripts, images, translations, then the package.
    Default,
    /// Compile the stylesheets, then their RTL variants.
    Styles,
    StylesBuild,
    StylesRtl,
    /// Lint, bundle and minify the scripts.
    Js,
    JsLint,
    JsBundle,
    JsMinify,
    /// Check text domains, then build the POT catalog.
    Translate,
    CheckTextDomain,
    BuildPot,
    /// Optimize images.
    Image,
    /// Package the theme into a zip archive.
    Compress,
    /// Delete generated files.
    Clean,
    /// Re-run tasks when their sources change.
    #[cfg(feature = "live")]
    Watch,
}

impl Command {
    /// Tasks the command selects. Their prerequisites run as well.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Command::Default => &[STYLES_RTL, JS_MINIFY, IMAGE, BUILD_POT, COMPRESS],
            Command::Styles => &[STYLES_RTL],
            Command::StylesBuild => &[STYLES_BUILD],
            Command::StylesRtl => &[STYLES_RTL],
            Command::Js => &[JS_MINIFY],
            Command::JsLint => &[JS_LINT],
            Command::JsBundle => &[JS_BUNDLE],
            Command::JsMinify => &[JS_MINIFY],
            Command::Translate => &[BUILD_POT],
            Command::CheckTextDomain => &[CHECK_TEXT_DOMAIN],
            Command::BuildPot => &[BUILD_POT],
            Command::Image => &[IMAGE],
            Command::Compress => &[COMPRESS],
            Command::Clean => &[CLEAN],
            #[cfg(feature = "live")]
            Command::Watch => &[],
        }
    }
}

pub(crate) fn sink(ctx: &Context) -> Sink {
    Sink::new(ctx.root.clone(), ctx.reload.clone())
}

pub(crate) fn source_set(section: &str, sources: &Sources) -> anyhow::Result<SourceSet> {
    sources
        .to_set()
        .with_context(|| format!("'{section}': invalid source pattern"))
}

/// Drains one pipeline per descriptor in parallel and merges the results.
pub(crate) fn fan_out<T, F>(task: &str, descriptors: &[T], f: F) -> anyhow::Result<()>
where
    T: Sync,
    F: Fn(usize, &T) -> anyhow::Result<Drained> + Sync + Send,
{
    if descriptors.is_empty() {
        tracing::info!("{task}: nothing to do");
        return Ok(());
    }

    let results: Vec<_> = descriptors
        .par_iter()
        .enumerate()
        .map(|(i, descriptor)| f(i, descriptor))
        .collect();

    merge(task, results)
}

/// Waits for every stream of a task and decides the task's verdict. Failed
/// descriptors never hide the outputs of the others.
pub(crate) fn merge(task: &str, results: Vec<anyhow::Result<Drained>>) -> anyhow::Result<()> {
    let mut written: Vec<Utf8PathBuf> = Vec::new();
    let mut changed = 0;
    let mut failures = 0;

    for result in results {
        match result {
            Ok(drained) => {
                changed += drained.changed.len();
                failures += drained.errors.len();
                written.extend(drained.written);
            }
            Err(e) => {
                tracing::error!("{task}: {e:#}");
                failures += 1;
            }
        }
    }

    tracing::info!("{task}: {} files written, {changed} changed", written.len());

    if failures > 0 {
        anyhow::bail!("{failures} error(s), see the log above");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, StageError, StageErrorKind};
    use crate::graph::TaskGraph;

    #[test]
    fn test_registry_is_a_valid_graph() {
        let graph = TaskGraph::new(registry()).unwrap();
        assert_eq!(graph.names().count(), 10);
        assert_eq!(graph.get(STYLES_RTL).unwrap().after, vec![STYLES_BUILD]);
    }

    #[test]
    fn test_every_command_resolves() {
        use clap::ValueEnum;

        let graph = TaskGraph::new(registry()).unwrap();
        for command in Command::value_variants() {
            graph.closure(command.targets()).unwrap();
        }

        let default = graph.closure(Command::Default.targets()).unwrap();
        assert_eq!(default.len(), 9);
    }

    #[test]
    fn test_command_names() {
        use clap::ValueEnum;

        let name = |c: Command| c.to_possible_value().unwrap().get_name().to_string();
        assert_eq!(name(Command::StylesBuild), "styles-build");
        assert_eq!(name(Command::CheckTextDomain), "check-text-domain");
        assert_eq!(name(Command::Default), "default");
    }

    #[test]
    fn test_merge_fails_on_any_error() {
        let dropped = Drained {
            errors: vec![StageError {
                stage: "sass",
                path: "a.scss".into(),
                kind: StageErrorKind::Css("broken".into()),
            }],
            ..Drained::default()
        };

        assert!(merge("t", vec![Ok(Drained::default())]).is_ok());
        assert!(merge("t", vec![Ok(Drained::default()), Ok(dropped)]).is_err());
        assert!(
            merge(
                "t",
                vec![Err(PipelineError::Write("a".into(), std::io::Error::other("x")).into())]
            )
            .is_err()
        );
    }
}
