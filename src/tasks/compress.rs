use std::fs;
use std::io::{Cursor, Write};

use anyhow::Context as _;
use glob::Pattern;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::Context;
use crate::config::dest_path;
use crate::io::write_if_changed;
use crate::tasks::{COMPRESS, source_set};

/// Packs the theme into a zip archive. Source maps, dotfiles and the archive
/// itself never end up inside it.
pub(crate) fn compress(ctx: &Context) -> anyhow::Result<()> {
    let Some(options) = &ctx.config.compress else {
        tracing::info!("{COMPRESS}: nothing to do");
        return Ok(());
    };

    let archive = dest_path(&options.dest).join(options.filename.trim());

    let set = source_set("compress", &options.src)?
        .without_dotfiles()
        .exclude("**/*.map")?
        .exclude(&Pattern::escape(archive.as_str()))?;

    let mut paths: Vec<_> = set.resolve(&ctx.root)?.iter().map(|f| f.path()).collect();
    paths.sort();

    // A fixed timestamp keeps the archive identical across runs.
    let entry = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for path in &paths {
        let data = fs::read(ctx.root.join(path)).with_context(|| format!("couldn't read '{path}'"))?;
        zip.start_file(path.as_str(), entry)?;
        zip.write_all(&data)?;
    }
    let bytes = zip.finish()?.into_inner();

    let changed = write_if_changed(&ctx.root.join(&archive), &bytes)
        .with_context(|| format!("couldn't write '{archive}'"))?;

    tracing::info!(
        "{COMPRESS}: {} files packed into {archive}{}",
        paths.len(),
        if changed { "" } else { " (unchanged)" }
    );
    Ok(())
}
