use crate::Context;
use crate::config::dest_path;
use crate::stage::OptimizeImage;
use crate::stream::{OnError, Pipeline, read_sources};
use crate::tasks::{IMAGE, fan_out, sink, source_set};

pub(crate) fn image(ctx: &Context) -> anyhow::Result<()> {
    let optimizer = &ctx.config.image.optimizer;
    let sink = sink(ctx);

    fan_out(IMAGE, &ctx.config.image.build, |i, build| {
        let set = source_set(&format!("image.build[{i}]"), &build.src)?;
        let input = read_sources(&ctx.root, &set)?;

        let pipeline = Pipeline::new(OnError::Abort)
            .pipe(OptimizeImage {
                options: optimizer.clone(),
            })
            .write(dest_path(&build.dest));

        Ok(pipeline.run(input, &sink)?)
    })
}
