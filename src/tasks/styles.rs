use crate::Context;
use crate::config::{self, dest_path};
use crate::stage::{
    FlipDirection, Filter, InitMaps, LineEndings, MinifyCss, PackMediaQueries, Prefix, Rename,
    Sass, WriteMaps,
};
use crate::stream::{OnError, Pipeline, read_sources};
use crate::tasks::{STYLES_BUILD, STYLES_RTL, fan_out, sink, source_set};

/// Compiles every style build. A stylesheet that fails to compile is dropped
/// and logged while the rest of the stream carries on.
pub(crate) fn build(ctx: &Context) -> anyhow::Result<()> {
    let style = &ctx.config.style;
    let targets = config::targets(&style.autoprefixer.browsers)?;
    let sink = sink(ctx);

    fan_out(STYLES_BUILD, &style.build, |i, build| {
        let set = source_set(&format!("style.build[{i}]"), &build.src)?;
        let input = read_sources(&ctx.root, &set)?;
        let dest = dest_path(&build.dest);
        let sourcemaps = build.sourcemaps.options();

        let mut pipeline = Pipeline::new(OnError::Skip)
            .pipe_if(sourcemaps.is_some().then_some(InitMaps))
            .pipe(Sass::new(&ctx.root, &style.sass))
            .pipe(Prefix::new(targets))
            .pipe_if(sourcemaps.map(|options| WriteMaps { options }))
            .pipe(LineEndings)
            .write(&dest);

        if let Some(minify) = build.minify.options() {
            pipeline = pipeline
                .pipe(Rename::suffix(minify.suffix))
                .pipe(Filter::new(&["**/*.css"])?)
                .pipe(PackMediaQueries {
                    sort: style.mqpacker.sort,
                })
                .pipe(MinifyCss::new(targets))
                .write(&dest);
        }

        tracing::debug!("style.build[{i}]: {}", pipeline.describe().join(" > "));
        Ok(pipeline.run(input, &sink)?)
    })
}

/// Mirrors the built stylesheets and writes a plain and a minified variant of
/// each.
pub(crate) fn rtl(ctx: &Context) -> anyhow::Result<()> {
    let style = &ctx.config.style;
    let targets = config::targets(&style.autoprefixer.browsers)?;
    let sink = sink(ctx);

    fan_out(STYLES_RTL, &style.rtl, |i, build| {
        let set = source_set(&format!("style.rtl[{i}]"), &build.src)?;
        let input = read_sources(&ctx.root, &set)?;
        let dest = dest_path(&build.dest);

        let pipeline = Pipeline::new(OnError::Skip)
            .pipe(FlipDirection {
                auto_rename: style.rtlcss.auto_rename,
            })
            .pipe(Rename::suffix(&style.rtlcss.suffix))
            .write(&dest)
            .pipe(Filter::new(&["**/*.css"])?)
            .pipe(Rename::suffix(".min"))
            .pipe(PackMediaQueries {
                sort: style.mqpacker.sort,
            })
            .pipe(MinifyCss::new(targets))
            .write(&dest);

        tracing::debug!("style.rtl[{i}]: {}", pipeline.describe().join(" > "));
        Ok(pipeline.run(input, &sink)?)
    })
}
