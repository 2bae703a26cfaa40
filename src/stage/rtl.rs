//! Left-to-right to right-to-left conversion of compiled stylesheets.
//!
//! Works on declarations: physical property names are mirrored
//! (`margin-left` becomes `margin-right`) and so are the values that carry a
//! horizontal direction (`float`, four-value shorthands, radii, shadows,
//! cursors, background positions). Selectors are left alone unless
//! `auto_rename` is set.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::stream::{Stage, Stream};

pub struct FlipDirection {
    pub auto_rename: bool,
}

impl Stage for FlipDirection {
    fn name(&self) -> &'static str {
        "rtlcss"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let css = flip_css(file.text()?, self.auto_rename);
            file.set_text(css);
            Ok(file)
        })
    }
}

static WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(left|right|ltr|rtl)\b").unwrap());
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"url\([^)]*\)").unwrap());
static IMPORTANT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*!\s*important\s*$").unwrap());

enum Piece {
    Text(String),
    Comment(String),
}

/// Mirrors a whole stylesheet.
pub fn flip_css(css: &str, auto_rename: bool) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pieces: Vec<Piece> = Vec::new();
    let mut text = String::new();
    let mut chars = css.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut comment = String::from("/*");
                let mut prev = '\0';
                for c in chars.by_ref() {
                    comment.push(c);
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                pieces.push(Piece::Text(std::mem::take(&mut text)));
                pieces.push(Piece::Comment(comment));
            }
            '"' | '\'' => {
                text.push(c);
                let mut escaped = false;
                for s in chars.by_ref() {
                    text.push(s);
                    if escaped {
                        escaped = false;
                    } else if s == '\\' {
                        escaped = true;
                    } else if s == c {
                        break;
                    }
                }
            }
            '{' => {
                pieces.push(Piece::Text(std::mem::take(&mut text)));
                flush(&mut out, &mut pieces, |prelude| {
                    if auto_rename && !prelude.trim_start().starts_with('@') {
                        swap_words(prelude)
                    } else {
                        prelude.to_string()
                    }
                });
                out.push('{');
            }
            '}' => {
                pieces.push(Piece::Text(std::mem::take(&mut text)));
                flush(&mut out, &mut pieces, flip_declarations);
                out.push('}');
            }
            c => text.push(c),
        }
    }

    pieces.push(Piece::Text(text));
    flush(&mut out, &mut pieces, str::to_string);
    out
}

fn flush(out: &mut String, pieces: &mut Vec<Piece>, f: impl Fn(&str) -> String) {
    for piece in pieces.drain(..) {
        match piece {
            Piece::Text(text) => out.push_str(&f(&text)),
            Piece::Comment(comment) if comment.starts_with("/*# sourceMappingURL") => {}
            Piece::Comment(comment) => out.push_str(&comment),
        }
    }
}

fn flip_declarations(block: &str) -> String {
    split_top_level(block, ';')
        .iter()
        .map(|declaration| flip_declaration(declaration))
        .collect::<Vec<_>>()
        .join(";")
}

fn flip_declaration(declaration: &str) -> String {
    let Some(colon) = declaration.find(':') else {
        return declaration.to_string();
    };

    let (head, value) = (&declaration[..colon], &declaration[colon + 1..]);
    let property = head.trim();

    if property.starts_with("--") {
        return declaration.to_string();
    }

    let flipped_property = swap_words(property);

    // Keep the original whitespace around the value.
    let lead = &value[..value.len() - value.trim_start().len()];
    let trail = &value[value.trim_end().len()..];
    let core = value.trim();

    let (core, important) = match IMPORTANT.find(core) {
        Some(m) => (&core[..m.start()], m.as_str()),
        None => (core, ""),
    };

    let unprefixed = flipped_property
        .trim_start_matches("-webkit-")
        .trim_start_matches("-moz-")
        .trim_start_matches("-ms-")
        .trim_start_matches("-o-")
        .to_ascii_lowercase();

    let flipped = flip_value(&unprefixed, core);
    let head = head.replace(property, &flipped_property);

    format!("{head}:{lead}{flipped}{important}{trail}")
}

fn flip_value(property: &str, value: &str) -> String {
    match property {
        "float" | "clear" | "text-align" | "text-align-last" | "direction" | "transition"
        | "transition-property" | "will-change" => swap_words(value),
        "margin" | "padding" | "border-width" | "border-style" | "border-color" | "inset"
        | "scroll-margin" | "scroll-padding" => four_values(value),
        "border-radius" => border_radius(value),
        "box-shadow" | "text-shadow" => shadows(value),
        "cursor" => cursor(value),
        "background" => outside_urls(value, swap_words),
        "background-position" | "background-position-x" => {
            outside_urls(&mirror_percentage(value), swap_words)
        }
        _ => value.to_string(),
    }
}

fn swap_words(text: &str) -> String {
    WORDS
        .replace_all(text, |caps: &Captures| match &caps[1] {
            "left" => "right",
            "right" => "left",
            "ltr" => "rtl",
            _ => "ltr",
        })
        .into_owned()
}

fn outside_urls(value: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for m in URL.find_iter(value) {
        out.push_str(&f(&value[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&value[last..]));
    out
}

/// `top right bottom left` becomes `top left bottom right`.
fn four_values(value: &str) -> String {
    let parts = split_values(value);
    match parts[..] {
        [top, right, bottom, left] => [top, left, bottom, right].join(" "),
        _ => value.to_string(),
    }
}

fn border_radius(value: &str) -> String {
    split_top_level(value, '/')
        .iter()
        .map(|part| {
            let corners = split_values(part);
            let flipped = match corners[..] {
                [a, b] => vec![b, a],
                [a, b, c] => vec![b, a, b, c],
                [a, b, c, d] => vec![b, a, d, c],
                _ => return part.trim().to_string(),
            };
            flipped.join(" ")
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Negates the horizontal offset of every shadow.
fn shadows(value: &str) -> String {
    split_top_level(value, ',')
        .iter()
        .map(|shadow| {
            let mut parts: Vec<String> = split_values(shadow).into_iter().map(String::from).collect();
            if let Some(x) = parts.iter_mut().find(|p| is_length(p)) {
                *x = negate(x);
            }
            parts.join(" ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn cursor(value: &str) -> String {
    split_values(value)
        .into_iter()
        .map(|part| match part {
            "e-resize" => "w-resize",
            "w-resize" => "e-resize",
            "ne-resize" => "nw-resize",
            "nw-resize" => "ne-resize",
            "se-resize" => "sw-resize",
            "sw-resize" => "se-resize",
            "nesw-resize" => "nwse-resize",
            "nwse-resize" => "nesw-resize",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A leading horizontal percentage `p%` becomes `(100 - p)%`.
fn mirror_percentage(value: &str) -> String {
    let mut parts = split_values(value);
    let Some(first) = parts.first().copied() else {
        return value.to_string();
    };
    let Some(percent) = first.strip_suffix('%').and_then(|p| p.parse::<f64>().ok()) else {
        return value.to_string();
    };

    let mirrored = format!("{}%", 100.0 - percent);
    parts[0] = &mirrored;
    parts.join(" ")
}

fn is_length(token: &str) -> bool {
    token
        .trim_start_matches(['-', '+'])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

fn negate(token: &str) -> String {
    if let Some(positive) = token.strip_prefix('-') {
        return positive.to_string();
    }
    let token = token.trim_start_matches('+');
    if token.trim_start_matches(['0', '.']).chars().next().is_none_or(|c| !c.is_ascii_digit()) {
        return token.to_string();
    }
    format!("-{token}")
}

/// Whitespace separated values, keeping parenthesized groups together.
fn split_values(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    parts.push(&value[s..i]);
                }
                continue;
            }
            _ => {}
        }
        start.get_or_insert(i);
    }

    if let Some(s) = start {
        parts.push(&value[s..]);
    }
    parts
}

/// Splits on `sep` outside parentheses and quotes.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut last = 0;

    for (i, c) in text.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (_, Some(_)) => {}
            ('(', None) => depth += 1,
            (')', None) => depth = depth.saturating_sub(1),
            (c, None) if c == sep && depth == 0 => {
                parts.push(&text[last..i]);
                last = i + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&text[last..]);
    parts
}
