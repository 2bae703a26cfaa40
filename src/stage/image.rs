use std::io::Cursor;
use std::sync::LazyLock;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{AnimationDecoder, DynamicImage, ImageEncoder, ImageFormat};
use regex::Regex;

use crate::config::OptimizerOptions;
use crate::error::StageErrorKind;
use crate::stream::{Stage, Stream};

/// Shrinks images without changing their format. The original bytes are kept
/// whenever the optimized ones turn out larger.
pub struct OptimizeImage {
    pub options: OptimizerOptions,
}

impl Stage for OptimizeImage {
    fn name(&self) -> &'static str {
        "imagemin"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let optimized = match file.extension().as_deref() {
                Some("png") => Some(optimize_png(&file.contents, self.options.level)?),
                Some("gif") => Some(optimize_gif(&file.contents, self.options.level)?),
                Some("jpg" | "jpeg") => match self.options.jpeg_quality {
                    Some(quality) => Some(optimize_jpeg(&file.contents, quality)?),
                    None => None,
                },
                Some("svg") if self.options.svg => Some(optimize_svg(file.text()?).into_bytes()),
                _ => None,
            };

            if let Some(optimized) = optimized
                && optimized.len() < file.contents.len()
            {
                tracing::debug!(
                    "{}: {} -> {} bytes",
                    file.origin,
                    file.contents.len(),
                    optimized.len()
                );
                file.contents = optimized;
            }

            Ok(file)
        })
    }
}

fn compression(level: u8) -> CompressionType {
    match level {
        0..=1 => CompressionType::Fast,
        2..=4 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn optimize_png(bytes: &[u8], level: u8) -> Result<Vec<u8>, StageErrorKind> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    let mut out = Vec::new();

    PngEncoder::new_with_quality(&mut out, compression(level), FilterType::Adaptive).write_image(
        img.as_bytes(),
        img.width(),
        img.height(),
        img.color().into(),
    )?;

    Ok(out)
}

/// Re-encodes every frame with fresh LZW tables. Frames with at most 256
/// colors keep an exact palette. Animations loop forever, which is what
/// almost every animated GIF asks for.
fn optimize_gif(bytes: &[u8], level: u8) -> Result<Vec<u8>, StageErrorKind> {
    let frames = GifDecoder::new(Cursor::new(bytes))?
        .into_frames()
        .collect_frames()?;
    let animated = frames.len() > 1;

    let mut out = Vec::new();
    {
        let speed = 30 - 4 * i32::from(level.min(7));
        let mut encoder = GifEncoder::new_with_speed(&mut out, speed);
        if animated {
            encoder.set_repeat(Repeat::Infinite)?;
        }
        encoder.encode_frames(frames)?;
    }

    Ok(out)
}

fn optimize_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, StageErrorKind> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
    // JPEG has no alpha channel.
    let img = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());

    JpegEncoder::new_with_quality(&mut out, quality).write_image(
        img.as_bytes(),
        img.width(),
        img.height(),
        img.color().into(),
    )?;

    Ok(out.into_inner())
}

static SVG_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SVG_BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").unwrap());

/// Removes comments and whitespace between tags. The `viewBox` and every
/// other attribute are kept.
fn optimize_svg(text: &str) -> String {
    let text = SVG_COMMENT.replace_all(text, "");
    SVG_BETWEEN_TAGS.replace_all(text.trim(), "><").into_owned()
}
