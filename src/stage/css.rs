use std::sync::LazyLock;

use lightningcss::printer::PrinterOptions;
use lightningcss::rules::CssRule;
use lightningcss::rules::media::MediaRule;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::Targets;
use lightningcss::traits::ToCss;
use regex::Regex;

use crate::error::StageErrorKind;
use crate::stream::{FileRecord, Stage, Stream};

/// Parses a record, lets `edit` rework the rule tree, prints it back.
fn rewrite<F>(file: &FileRecord, minify: bool, targets: Targets, edit: F) -> Result<String, StageErrorKind>
where
    F: FnOnce(&mut StyleSheet<'_>) -> Result<(), StageErrorKind>,
{
    let code = file.text()?;
    let options = ParserOptions {
        filename: file.origin.to_string(),
        ..ParserOptions::default()
    };

    let mut sheet = StyleSheet::parse(code, options).map_err(|e| StageErrorKind::Css(e.to_string()))?;
    edit(&mut sheet)?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| StageErrorKind::Css(e.to_string()))?;

    Ok(printed.code)
}

fn minify_rules(sheet: &mut StyleSheet<'_>, targets: Targets) -> Result<(), StageErrorKind> {
    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| StageErrorKind::Css(e.to_string()))
}

/// Adds the vendor prefixes the configured browsers need and reformats the
/// sheet in expanded form.
pub struct Prefix {
    targets: Targets,
}

impl Prefix {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }
}

impl Stage for Prefix {
    fn name(&self) -> &'static str {
        "autoprefixer"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let css = rewrite(&file, false, self.targets, |sheet| minify_rules(sheet, self.targets))?;
            file.set_text(css);
            Ok(file)
        })
    }
}

/// Merges `@media` blocks with identical queries and moves them to the end
/// of the sheet.
pub struct PackMediaQueries {
    /// Order the packed queries by ascending `min-width`.
    pub sort: bool,
}

impl Stage for PackMediaQueries {
    fn name(&self) -> &'static str {
        "mqpacker"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let css = rewrite(&file, false, Targets::default(), |sheet| {
                pack_media_queries(sheet, self.sort)
            })?;
            file.set_text(css);
            Ok(file)
        })
    }
}

fn pack_media_queries(sheet: &mut StyleSheet<'_>, sort: bool) -> Result<(), StageErrorKind> {
    let rules = std::mem::take(&mut sheet.rules.0);
    let mut kept = Vec::with_capacity(rules.len());
    let mut packed: Vec<(String, MediaRule)> = Vec::new();

    for rule in rules {
        match rule {
            CssRule::Media(media) => {
                let key = media
                    .query
                    .to_css_string(PrinterOptions::default())
                    .map_err(|e| StageErrorKind::Css(e.to_string()))?;

                match packed.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => existing.rules.0.extend(media.rules.0),
                    None => packed.push((key, media)),
                }
            }
            other => kept.push(other),
        }
    }

    if sort {
        packed.sort_by(|(a, _), (b, _)| {
            min_width(a)
                .partial_cmp(&min_width(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    kept.extend(packed.into_iter().map(|(_, media)| CssRule::Media(media)));
    sheet.rules.0 = kept;
    Ok(())
}

static MIN_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"min-width:\s*([0-9.]+)(px|em|rem)?").unwrap());

/// Queries without a `min-width` sort first.
fn min_width(query: &str) -> Option<f64> {
    let captures = MIN_WIDTH.captures(query)?;
    let value: f64 = captures[1].parse().ok()?;
    Some(match captures.get(2).map(|m| m.as_str()) {
        Some("em" | "rem") => value * 16.0,
        _ => value,
    })
}

/// Minifies the sheet for the configured browsers.
pub struct MinifyCss {
    targets: Targets,
}

impl MinifyCss {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }
}

impl Stage for MinifyCss {
    fn name(&self) -> &'static str {
        "cssnano"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let css = rewrite(&file, true, self.targets, |sheet| minify_rules(sheet, self.targets))?;
            file.set_text(css);
            Ok(file)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::targets;

    fn run(stage: &dyn Stage, css: &str) -> String {
        let out = stage.apply(Stream::new(vec![FileRecord::new("", "a.css", css)]));
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        out.files[0].text().unwrap().to_string()
    }

    #[test]
    fn test_pack_media_queries() {
        let css = "@media (min-width: 768px) { .a { color: red } }\n\
                   .b { color: blue }\n\
                   @media (min-width: 320px) { .c { color: green } }\n\
                   @media (min-width: 768px) { .d { color: black } }\n";

        let out = run(&PackMediaQueries { sort: false }, css);

        assert_eq!(out.matches("@media").count(), 2);
        let b = out.find(".b").unwrap();
        let wide = out.find("768px").unwrap();
        let narrow = out.find("320px").unwrap();
        assert!(b < wide && wide < narrow);
        assert!(out.find(".a").unwrap() < out.find(".d").unwrap());
        assert!(out.find(".d").unwrap() < narrow);
    }

    #[test]
    fn test_pack_media_queries_sorted() {
        let css = "@media (min-width: 768px) { .a { color: red } }\n\
                   @media (min-width: 320px) { .c { color: green } }\n";

        let out = run(&PackMediaQueries { sort: true }, css);
        assert!(out.find("320px").unwrap() < out.find("768px").unwrap());
    }

    #[test]
    fn test_min_width() {
        assert_eq!(min_width("(min-width: 768px)"), Some(768.0));
        assert_eq!(min_width("(min-width: 2em)"), Some(32.0));
        assert_eq!(min_width("print"), None);
    }

    #[test]
    fn test_prefix_for_old_browsers() {
        let stage = Prefix::new(targets(&["Safari >= 6"]).unwrap());
        let out = run(&stage, ".a { user-select: none }");
        assert!(out.contains("-webkit-user-select"));
        assert!(out.contains('\n'));
    }

    #[test]
    fn test_minify() {
        let out = run(&MinifyCss::new(Targets::default()), ".a {\n  color: #ff0000;\n}\n");
        assert_eq!(out, ".a{color:red}");
    }
}
