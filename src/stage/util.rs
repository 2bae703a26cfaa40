use camino::Utf8PathBuf;
use glob::Pattern;

use crate::config::SourceMapOptions;
use crate::sourcemap::SourceMap;
use crate::stream::{FileRecord, Stage, Stream};

/// Appends a suffix to the file stem: `a.css` becomes `a.min.css`.
pub struct Rename {
    pub suffix: String,
}

impl Rename {
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Stage for Rename {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let stem = file.relative.file_stem().unwrap_or_default();
            let name = match file.relative.extension() {
                Some(ext) => format!("{stem}{}.{ext}", self.suffix),
                None => format!("{stem}{}", self.suffix),
            };
            file.relative.set_file_name(name);
            Ok(file)
        })
    }
}

/// Keeps only records whose path matches one of the patterns.
pub struct Filter {
    patterns: Vec<Pattern>,
}

impl Filter {
    pub fn new(patterns: &[&str]) -> Result<Self, glob::PatternError> {
        Ok(Self {
            patterns: patterns.iter().map(|p| Pattern::new(p)).collect::<Result<_, _>>()?,
        })
    }

    fn matches(&self, file: &FileRecord) -> bool {
        let path = file.relative.as_str();
        self.patterns.iter().any(|pattern| {
            pattern.matches(path)
                || pattern
                    .as_str()
                    .strip_prefix("**/")
                    .and_then(|rest| Pattern::new(rest).ok())
                    .is_some_and(|rest| rest.matches(path))
        })
    }
}

impl Stage for Filter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.retain(|file| self.matches(file))
    }
}

/// Normalizes CRLF and CR line endings to LF.
pub struct LineEndings;

impl Stage for LineEndings {
    fn name(&self) -> &'static str {
        "lineec"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            if file.contents.contains(&b'\r') {
                let mut out = Vec::with_capacity(file.contents.len());
                let mut bytes = file.contents.iter().peekable();
                while let Some(&b) = bytes.next() {
                    if b == b'\r' {
                        if bytes.peek() == Some(&&b'\n') {
                            bytes.next();
                        }
                        out.push(b'\n');
                    } else {
                        out.push(b);
                    }
                }
                file.contents = out;
            }
            Ok(file)
        })
    }
}

/// Joins every record, in stream order, into a single file.
pub struct Concat {
    pub name: Utf8PathBuf,
}

impl Stage for Concat {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn apply(&self, stream: Stream) -> Stream {
        let Stream { files, errors } = stream;
        if files.is_empty() {
            return Stream { files, errors };
        }

        let contents = files
            .iter()
            .map(|file| file.contents.as_slice())
            .collect::<Vec<_>>()
            .join(&b'\n');

        let map = files.iter().any(|file| file.map.is_some()).then(|| {
            SourceMap::concat(
                files
                    .iter()
                    .map(|file| (file.map.as_ref(), std::str::from_utf8(&file.contents).unwrap_or(""))),
            )
        });

        let mut joined = FileRecord::new("", self.name.clone(), contents);
        joined.map = map;

        Stream {
            files: vec![joined],
            errors,
        }
    }
}

/// Starts tracking line mappings for every record.
pub struct InitMaps;

impl Stage for InitMaps {
    fn name(&self) -> &'static str {
        "sourcemaps.init"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            file.map = Some(SourceMap::identity(file.origin.as_str(), file.text()?));
            Ok(file)
        })
    }
}

/// Emits a `.map` record after every mapped record and links the two.
pub struct WriteMaps {
    pub options: SourceMapOptions,
}

impl Stage for WriteMaps {
    fn name(&self) -> &'static str {
        "sourcemaps.write"
    }

    fn apply(&self, stream: Stream) -> Stream {
        let Stream { files, errors } = stream;
        let mut out = Vec::with_capacity(files.len() * 2);

        for mut file in files {
            let Some(map) = file.map.take() else {
                out.push(file);
                continue;
            };

            let name = file.file_name().to_string();
            let comment = match file.extension().as_deref() {
                Some("css") => format!("\n/*# sourceMappingURL={name}.map */\n"),
                _ => format!("\n//# sourceMappingURL={name}.map\n"),
            };

            while file.contents.last() == Some(&b'\n') {
                file.contents.pop();
            }
            file.contents.extend_from_slice(comment.as_bytes());

            let mut record = FileRecord::new(
                file.base.clone(),
                Utf8PathBuf::from(format!("{}.map", file.relative)),
                map.to_json(&name, &self.options),
            );
            record.origin = file.origin.clone();

            out.push(file);
            out.push(record);
        }

        Stream { files: out, errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stream: &Stream) -> Vec<&str> {
        stream.names()
    }

    #[test]
    fn test_rename() {
        let out = Rename::suffix(".min").apply(Stream::new(vec![
            FileRecord::new("", "css/style.css", ""),
            FileRecord::new("", "style.css.map", ""),
        ]));
        assert_eq!(names(&out), vec!["css/style.min.css", "style.css.min.map"]);
    }

    #[test]
    fn test_filter() {
        let filter = Filter::new(&["**/*.js.map", "**/*.js"]).unwrap();
        let out = filter.apply(Stream::new(vec![
            FileRecord::new("", "a.js", ""),
            FileRecord::new("", "a.js.map", ""),
            FileRecord::new("", "deep/b.js", ""),
            FileRecord::new("", "c.css", ""),
        ]));
        assert_eq!(names(&out), vec!["a.js", "a.js.map", "deep/b.js"]);
    }

    #[test]
    fn test_line_endings() {
        let out = LineEndings.apply(Stream::new(vec![FileRecord::new("", "a.js", "a\r\nb\rc\n")]));
        assert_eq!(out.files[0].contents, b"a\nb\nc\n");
    }

    #[test]
    fn test_concat_keeps_stream_order() {
        let stream = Stream::new(vec![
            FileRecord::new("js", "b.js", "B"),
            FileRecord::new("js", "a.js", "A"),
            FileRecord::new("js", "c.js", "C"),
        ]);
        let out = Concat {
            name: "bundle.js".into(),
        }
        .apply(stream);

        assert_eq!(names(&out), vec!["bundle.js"]);
        assert_eq!(out.files[0].text().unwrap(), "B\nA\nC");
        assert!(out.files[0].map.is_none());
    }

    #[test]
    fn test_maps_survive_concat() {
        let stream = InitMaps.apply(Stream::new(vec![
            FileRecord::new("js", "a.js", "a1\na2"),
            FileRecord::new("js", "b.js", "b1"),
        ]));
        let out = Concat {
            name: "bundle.js".into(),
        }
        .apply(stream);

        let map = out.files[0].map.as_ref().unwrap();
        assert_eq!(map.lookup(2), Some(("js/b.js", 0)));
    }

    #[test]
    fn test_write_maps() {
        let stream = InitMaps.apply(Stream::new(vec![FileRecord::new("", "style.css", "a{}\n")]));
        let out = WriteMaps {
            options: SourceMapOptions::default(),
        }
        .apply(stream);

        assert_eq!(names(&out), vec!["style.css", "style.css.map"]);
        assert_eq!(
            out.files[0].text().unwrap(),
            "a{}\n/*# sourceMappingURL=style.css.map */\n"
        );
        let json: serde_json::Value = serde_json::from_slice(&out.files[1].contents).unwrap();
        assert_eq!(json["file"], "style.css");
        assert_eq!(json["sources"][0], "style.css");
        assert_eq!(json["sourcesContent"][0], "a{}\n");
    }
}
