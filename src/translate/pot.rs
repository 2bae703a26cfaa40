use std::collections::HashMap;
use std::fmt::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::translate::Keyword;
use crate::translate::scanner::{Arg, scan_calls};

/// Header fields of a POT catalog.
#[derive(Debug, Clone, Default)]
pub struct PotHeader {
    pub domain: String,
    pub package: String,
    pub bug_report: Option<String>,
    pub last_translator: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    context: Option<String>,
    msgid: String,
    plural: Option<String>,
    references: Vec<(Utf8PathBuf, usize)>,
    comments: Vec<String>,
}

/// A gettext template built from scanned sources.
///
/// Entries keep the order in which they were first seen. Callers feed files
/// sorted by path so the rendered catalog is stable across runs.
#[derive(Debug, Clone)]
pub struct Catalog {
    header: PotHeader,
    entries: Vec<Entry>,
    index: HashMap<(Option<String>, String), usize>,
}

impl Catalog {
    pub fn new(header: PotHeader) -> Self {
        Self {
            header,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Extracts every translatable string of the catalog's domain from one
    /// PHP file.
    pub fn add_source(&mut self, path: &Utf8Path, source: &str, keywords: &[Keyword]) {
        let names: Vec<&str> = keywords.iter().map(|k| k.name.as_str()).collect();

        for call in scan_calls(source, &names) {
            let Some(keyword) = keywords.iter().find(|k| k.name == call.name) else {
                continue;
            };

            // With a domain configured, calls without that exact literal
            // domain stay out of the catalog, like wp-pot does.
            if !self.header.domain.is_empty() {
                let domain = keyword
                    .domain
                    .and_then(|position| call.args.get(position - 1));
                match domain {
                    Some(Arg::Literal { value, .. }) if *value == self.header.domain => {}
                    _ => continue,
                }
            }

            let literal = |position: usize| call.args.get(position - 1).and_then(Arg::literal);

            let Some(msgid) = literal(keyword.singular) else {
                continue;
            };
            if msgid.is_empty() {
                continue;
            }

            let context = keyword.context.and_then(literal).map(str::to_string);
            let plural = keyword.plural.and_then(literal).map(str::to_string);

            self.insert(Entry {
                context,
                msgid: msgid.to_string(),
                plural,
                references: vec![(path.to_owned(), call.line)],
                comments: call.comment.clone().into_iter().collect(),
            });
        }
    }

    fn insert(&mut self, entry: Entry) {
        let key = (entry.context.clone(), entry.msgid.clone());

        match self.index.get(&key) {
            Some(&i) => {
                let existing = &mut self.entries[i];
                for reference in entry.references {
                    if !existing.references.contains(&reference) {
                        existing.references.push(reference);
                    }
                }
                for comment in entry.comments {
                    if !existing.comments.contains(&comment) {
                        existing.comments.push(comment);
                    }
                }
                if existing.plural.is_none() {
                    existing.plural = entry.plural;
                }
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Renders the catalog. No timestamps are written.
    pub fn render(&self) -> String {
        let header = &self.header;
        let mut out = String::new();

        let _ = writeln!(out, "# Copyright (C) {}", header.package);
        let _ = writeln!(
            out,
            "# This file is distributed under the same license as the {} package.",
            header.package
        );
        out.push_str("msgid \"\"\nmsgstr \"\"\n");

        let fields = [
            ("Project-Id-Version", Some(header.package.as_str())),
            ("Report-Msgid-Bugs-To", header.bug_report.as_deref()),
            ("Last-Translator", header.last_translator.as_deref()),
            ("Language-Team", header.team.as_deref()),
            ("MIME-Version", Some("1.0")),
            ("Content-Type", Some("text/plain; charset=UTF-8")),
            ("Content-Transfer-Encoding", Some("8bit")),
            ("Plural-Forms", Some("nplurals=INTEGER; plural=EXPRESSION;")),
            ("X-Domain", Some(header.domain.as_str())),
        ];
        for (name, value) in fields {
            let _ = writeln!(out, "\"{name}: {}\\n\"", escape(value.unwrap_or_default()));
        }

        for entry in &self.entries {
            out.push('\n');
            for comment in &entry.comments {
                let _ = writeln!(out, "#. {comment}");
            }

            let references: Vec<String> = entry
                .references
                .iter()
                .map(|(path, line)| format!("{path}:{line}"))
                .collect();
            let _ = writeln!(out, "#: {}", references.join(" "));

            if let Some(context) = &entry.context {
                let _ = writeln!(out, "msgctxt \"{}\"", escape(context));
            }
            let _ = writeln!(out, "msgid \"{}\"", escape(&entry.msgid));
            match &entry.plural {
                Some(plural) => {
                    let _ = writeln!(out, "msgid_plural \"{}\"", escape(plural));
                    out.push_str("msgstr[0] \"\"\nmsgstr[1] \"\"\n");
                }
                None => out.push_str("msgstr \"\"\n"),
            }
        }

        out
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}
