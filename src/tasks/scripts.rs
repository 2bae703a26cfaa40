use anyhow::Context as _;
use camino::Utf8PathBuf;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::Context;
use crate::config::dest_path;
use crate::stage::{Concat, Filter, InitMaps, LineEndings, MinifyJs, Rename, Transpile, WriteMaps};
use crate::stream::{OnError, Pipeline, read_sources};
use crate::tasks::{JS_BUNDLE, JS_LINT, JS_MINIFY, fan_out, sink, source_set};

/// Reports problems in the listed scripts. Findings are warnings only, but a
/// linter that cannot run fails the task.
pub(crate) fn lint(ctx: &Context) -> anyhow::Result<()> {
    let lint = &ctx.config.script.lint;
    if lint.src.is_empty() {
        tracing::info!("{JS_LINT}: nothing to do");
        return Ok(());
    }

    let set = source_set("script.lint", &lint.src)?;
    let stream = read_sources(&ctx.root, &set)?;

    let reports = stream
        .files
        .par_iter()
        .map(|file| -> anyhow::Result<_> {
            let diagnostics = ctx
                .tools
                .lint(&file.origin, file.text()?)
                .with_context(|| format!("couldn't lint '{}'", file.origin))?;
            Ok((file.origin.clone(), diagnostics))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut problems = 0;
    for (path, diagnostics) in &reports {
        for diagnostic in diagnostics {
            tracing::warn!("{path}:{diagnostic}");
            problems += 1;
        }
    }

    tracing::info!("{JS_LINT}: {} files checked, {problems} problem(s)", reports.len());
    Ok(())
}

/// Concatenates each bundle's sources, in the order they are listed, into
/// the file named by its destination.
pub(crate) fn bundle(ctx: &Context) -> anyhow::Result<()> {
    let sink = sink(ctx);

    fan_out(JS_BUNDLE, &ctx.config.script.bundles, |i, bundle| {
        let set = source_set(&format!("script.bundles[{i}]"), &bundle.src)?;
        let input = read_sources(&ctx.root, &set)?;

        let dest = dest_path(&bundle.dest);
        let name = dest
            .file_name()
            .map(Utf8PathBuf::from)
            .with_context(|| format!("'script.bundles[{i}]': destination has no file name"))?;
        let dir = dest.parent().map(Utf8PathBuf::from).unwrap_or_default();
        let sourcemaps = bundle.sourcemaps.options();

        let pipeline = Pipeline::new(OnError::Abort)
            .pipe_if(sourcemaps.is_some().then_some(InitMaps))
            .pipe_if(bundle.babel.options().map(|babel| Transpile {
                tool: ctx.tools.clone(),
                target: babel.target,
            }))
            .pipe(Concat { name })
            .pipe(LineEndings)
            .pipe_if(sourcemaps.map(|options| WriteMaps { options }))
            .pipe(Filter::new(&["**/*.js.map", "**/*.js"])?)
            .write(dir);

        tracing::debug!("script.bundles[{i}]: {}", pipeline.describe().join(" > "));
        Ok(pipeline.run(input, &sink)?)
    })
}

/// Minifies every file on its own: `a.js` and `b.js` become `a.min.js` and
/// `b.min.js`.
pub(crate) fn minify(ctx: &Context) -> anyhow::Result<()> {
    let sink = sink(ctx);

    fan_out(JS_MINIFY, &ctx.config.script.minify, |i, build| {
        let set = source_set(&format!("script.minify[{i}]"), &build.src)?;
        let input = read_sources(&ctx.root, &set)?;
        let sourcemaps = build.sourcemaps.options();

        let pipeline = Pipeline::new(OnError::Abort)
            .pipe_if(sourcemaps.is_some().then_some(InitMaps))
            .pipe(MinifyJs {
                tool: ctx.tools.clone(),
            })
            .pipe(Rename::suffix(".min"))
            .pipe_if(sourcemaps.map(|options| WriteMaps { options }))
            .pipe(Filter::new(&["**/*.js", "**/*.js.map"])?)
            .write(dest_path(&build.dest));

        tracing::debug!("script.minify[{i}]: {}", pipeline.describe().join(" > "));
        Ok(pipeline.run(input, &sink)?)
    })
}
