use camino::{Utf8Path, Utf8PathBuf};
use grass::{InputSyntax, Options};

use crate::config::{OutputStyle, SassOptions};
use crate::error::StageErrorKind;
use crate::stream::{Stage, Stream};

/// Compiles SCSS and Sass files to CSS. Partials (`_name.scss`) are only
/// meant to be imported and are dropped from the stream.
pub struct Sass {
    root: Utf8PathBuf,
    style: OutputStyle,
    include_paths: Vec<Utf8PathBuf>,
}

impl Sass {
    pub fn new(root: &Utf8Path, options: &SassOptions) -> Self {
        Self {
            root: root.to_owned(),
            style: options.output_style,
            include_paths: options.include_paths.iter().map(|p| root.join(p)).collect(),
        }
    }

    fn options(&self, origin: &Utf8Path, syntax: InputSyntax) -> Options<'_> {
        let style = match self.style {
            OutputStyle::Expanded => grass::OutputStyle::Expanded,
            OutputStyle::Compressed => grass::OutputStyle::Compressed,
        };

        let dir = origin.parent().map_or_else(|| self.root.clone(), |p| self.root.join(p));

        Options::default()
            .style(style)
            .input_syntax(syntax)
            .load_path(dir)
            .load_paths(&self.include_paths)
    }
}

impl Stage for Sass {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream
            .retain(|file| !file.file_name().starts_with('_'))
            .map(self.name(), |mut file| {
                let syntax = match file.extension().as_deref() {
                    Some("sass") => InputSyntax::Sass,
                    Some("css") => InputSyntax::Css,
                    _ => InputSyntax::Scss,
                };

                let input = file.text()?.to_owned();
                let css = grass::from_string(input, &self.options(&file.origin, syntax))
                    .map_err(StageErrorKind::Sass)?;

                file.relative.set_extension("css");
                file.set_text(css);
                Ok(file)
            })
    }
}
