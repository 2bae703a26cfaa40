//! Source Map v3 with line granularity.
//!
//! Stages that only move whole lines around (reading, concatenation, line
//! ending fixes) keep exact line mappings. Stages that rewrite the text
//! (compilers, minifiers) coarsen the map so every generated line points at
//! the start of the first source. That is enough for a browser to show which
//! file a rule or function came from.

use serde::Serialize;

use crate::config::SourceMapOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMap {
    sources: Vec<String>,
    contents: Vec<Option<String>>,
    /// For each generated line, the `(source, original line)` it came from.
    lines: Vec<Option<(usize, usize)>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawMap<'a> {
    version: u8,
    file: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_root: Option<&'a str>,
    sources: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    sources_content: Option<&'a [Option<String>]>,
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    /// Every line maps onto itself.
    pub fn identity(source: impl Into<String>, content: &str) -> Self {
        let count = line_count(content);
        Self {
            sources: vec![source.into()],
            contents: vec![Some(content.to_string())],
            lines: (0..count).map(|line| Some((0, line))).collect(),
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The original position of a generated line, if it is mapped.
    pub fn lookup(&self, line: usize) -> Option<(&str, usize)> {
        let (source, original) = self.lines.get(line).copied().flatten()?;
        Some((self.sources[source].as_str(), original))
    }

    /// Replaces the mappings after a stage rewrote the text into `content`.
    pub fn coarsen(&mut self, content: &str) {
        let target = self.lines.iter().flatten().next().map(|&(source, _)| (source, 0));
        self.lines = vec![target; line_count(content)];
    }

    /// Joins the maps of several parts written one after another. A part
    /// without a map contributes unmapped lines.
    pub fn concat<'a>(parts: impl IntoIterator<Item = (Option<&'a SourceMap>, &'a str)>) -> Self {
        let mut merged = SourceMap {
            sources: Vec::new(),
            contents: Vec::new(),
            lines: Vec::new(),
        };

        for (map, content) in parts {
            let count = line_count(content);
            let Some(map) = map else {
                merged.lines.extend(std::iter::repeat_n(None, count));
                continue;
            };

            let remap: Vec<usize> = map
                .sources
                .iter()
                .zip(&map.contents)
                .map(|(source, content)| merged.add_source(source, content.clone()))
                .collect();

            merged.lines.extend(
                (0..count).map(|i| map.lines.get(i).copied().flatten().map(|(s, l)| (remap[s], l))),
            );
        }

        merged
    }

    fn add_source(&mut self, source: &str, content: Option<String>) -> usize {
        match self.sources.iter().position(|s| s == source) {
            Some(i) => i,
            None => {
                self.sources.push(source.to_string());
                self.contents.push(content);
                self.sources.len() - 1
            }
        }
    }

    /// Encodes the `mappings` field.
    pub fn mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source = 0i64;
        let mut prev_line = 0i64;

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            if let Some((source, original)) = *line {
                let (source, original) = (source as i64, original as i64);
                vlq(&mut out, 0);
                vlq(&mut out, source - prev_source);
                vlq(&mut out, original - prev_line);
                vlq(&mut out, 0);
                prev_source = source;
                prev_line = original;
            }
        }

        out
    }

    /// Serializes the map for the generated file `file`.
    pub fn to_json(&self, file: &str, options: &SourceMapOptions) -> String {
        let raw = RawMap {
            version: 3,
            file,
            source_root: options.source_root.as_deref(),
            sources: &self.sources,
            sources_content: options.include_content.then_some(self.contents.as_slice()),
            names: [],
            mappings: self.mappings(),
        };

        serde_json::to_string(&raw).unwrap_or_default()
    }
}

fn line_count(content: &str) -> usize {
    content.lines().count().max(1)
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn vlq(out: &mut String, value: i64) {
    let mut rest = if value < 0 {
        ((-value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (rest & 0b11111) as usize;
        rest >>= 5;
        if rest > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if rest == 0 {
            break;
        }
    }
}
