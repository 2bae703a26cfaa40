//! A small PHP token scanner that finds function calls and their literal
//! arguments. It is not a PHP parser. It only knows enough of the lexical
//! grammar to skip markup, comments and strings correctly.

use std::ops::Range;

/// A single argument of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// A string literal, or a `.` concatenation of string literals. `span`
    /// covers the whole expression in the source text.
    Literal { value: String, span: Range<usize> },
    /// Anything else.
    Expr,
}

impl Arg {
    pub fn literal(&self) -> Option<&str> {
        match self {
            Arg::Literal { value, .. } => Some(value),
            Arg::Expr => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    /// 1-based line of the function name.
    pub line: usize,
    pub args: Vec<Arg>,
    /// Byte offset of the closing parenthesis.
    pub close: usize,
    /// A preceding `translators:` comment.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Variable,
    /// `None` for double-quoted strings with interpolation.
    Str(Option<String>),
    Comment(String),
    Punct(&'static str),
    Other,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    span: Range<usize>,
    line: usize,
    end_line: usize,
}

/// Finds every call to one of `names` in a PHP source file.
pub fn scan_calls(source: &str, names: &[&str]) -> Vec<Call> {
    let tokens = tokenize(source);
    let code: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t.tok, Tok::Comment(_)))
        .collect();

    let mut calls = Vec::new();

    for (i, token) in code.iter().enumerate() {
        let Tok::Ident(name) = &token.tok else {
            continue;
        };

        if !names.contains(&name.as_str()) {
            continue;
        }

        if code.get(i + 1).map(|t| &t.tok) != Some(&Tok::Punct("(")) {
            continue;
        }

        if let Some(prev) = i.checked_sub(1).map(|p| &code[p].tok) {
            match prev {
                Tok::Punct("->" | "?->" | "::") => continue,
                Tok::Ident(word) if word.eq_ignore_ascii_case("function") => continue,
                _ => {}
            }
        }

        let Some((args, close)) = parse_args(&code[i + 2..]) else {
            continue;
        };

        calls.push(Call {
            name: name.clone(),
            line: token.line,
            args,
            close,
            comment: translators_comment(&tokens, token),
        });
    }

    calls
}

/// Splits the tokens after an opening parenthesis into arguments. Returns
/// `None` when the call is never closed.
fn parse_args(tokens: &[&Token]) -> Option<(Vec<Arg>, usize)> {
    let mut args = Vec::new();
    let mut current: Vec<&Token> = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        match token.tok {
            Tok::Punct("(" | "[" | "{") => depth += 1,
            Tok::Punct(")" | "]" | "}") if depth > 0 => depth -= 1,
            Tok::Punct(")") => {
                if !current.is_empty() {
                    args.push(classify(&current));
                }
                return Some((args, token.span.start));
            }
            Tok::Punct(",") if depth == 0 => {
                args.push(classify(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(token);
    }

    None
}

/// `'a'`, `"b"` and `'a' . "b"` are literals, anything else is not.
fn classify(tokens: &[&Token]) -> Arg {
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return Arg::Expr;
    };

    let mut value = String::new();
    for (i, token) in tokens.iter().enumerate() {
        match (&token.tok, i % 2) {
            (Tok::Str(Some(text)), 0) => value.push_str(text),
            (Tok::Punct("."), 1) => {}
            _ => return Arg::Expr,
        }
    }

    if tokens.len() % 2 == 0 {
        return Arg::Expr;
    }

    Arg::Literal {
        value,
        span: first.span.start..last.span.end,
    }
}

fn translators_comment(tokens: &[Token], call: &Token) -> Option<String> {
    let position = tokens.iter().position(|t| t.span.start == call.span.start)?;
    let comment = tokens[..position]
        .iter()
        .rev()
        .take_while(|t| t.end_line + 1 >= call.line)
        .find_map(|t| match &t.tok {
            Tok::Comment(text) => Some(text),
            _ => None,
        })?;

    comment
        .get(..12)
        .filter(|head| head.eq_ignore_ascii_case("translators:"))
        .map(|_| comment.clone())
}

fn tokenize(source: &str) -> Vec<Token> {
    Lexer {
        src: source.as_bytes(),
        text: source,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl Lexer<'_> {
    fn run(mut self) -> Vec<Token> {
        while self.pos < self.src.len() {
            self.skip_markup();
            self.php();
        }
        self.tokens
    }

    fn peek(&self, offset: usize) -> u8 {
        self.src.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s.as_bytes())
    }

    fn bump(&mut self) {
        if self.peek(0) == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn push(&mut self, tok: Tok, start: usize, line: usize) {
        self.tokens.push(Token {
            tok,
            span: start..self.pos,
            line,
            end_line: self.line,
        });
    }

    /// Skips inline HTML up to and including the next open tag.
    fn skip_markup(&mut self) {
        while self.pos < self.src.len() {
            if self.starts_with("<?=") {
                self.bump_n(3);
                return;
            }
            if self.src[self.pos..].len() >= 5
                && self.src[self.pos..self.pos + 5].eq_ignore_ascii_case(b"<?php")
            {
                self.bump_n(5);
                return;
            }
            self.bump();
        }
    }

    /// Tokenizes PHP code up to and including the next close tag.
    fn php(&mut self) {
        while self.pos < self.src.len() {
            let start = self.pos;
            let line = self.line;
            let c = self.peek(0);

            match c {
                b'?' if self.peek(1) == b'>' => {
                    self.bump_n(2);
                    return;
                }
                c if c.is_ascii_whitespace() => self.bump(),
                b'#' if self.peek(1) != b'[' => {
                    self.line_comment(1);
                    let text = self.text[start + 1..self.pos].trim().to_string();
                    self.push(Tok::Comment(text), start, line);
                }
                b'/' if self.peek(1) == b'/' => {
                    self.line_comment(2);
                    let text = self.text[start + 2..self.pos].trim().to_string();
                    self.push(Tok::Comment(text), start, line);
                }
                b'/' if self.peek(1) == b'*' => {
                    self.bump_n(2);
                    while self.pos < self.src.len() && !self.starts_with("*/") {
                        self.bump();
                    }
                    let end = self.pos;
                    self.bump_n(2);
                    let text = clean_block_comment(&self.text[start + 2..end.min(self.src.len())]);
                    self.push(Tok::Comment(text), start, line);
                }
                b'\'' => {
                    let value = self.single_quoted();
                    self.push(Tok::Str(Some(value)), start, line);
                }
                b'"' => {
                    let value = self.double_quoted();
                    self.push(Tok::Str(value), start, line);
                }
                b'<' if self.starts_with("<<<") => match self.heredoc() {
                    Some(value) => self.push(Tok::Str(value), start, line),
                    None => {
                        let punct = self.punct();
                        self.push(punct, start, line);
                    }
                },
                b'$' if is_ident_start(self.peek(1)) => {
                    self.bump();
                    self.ident();
                    self.push(Tok::Variable, start, line);
                }
                c if is_ident_start(c) || c == b'\\' => {
                    self.ident();
                    let name = self.text[start..self.pos].trim_start_matches('\\').to_string();
                    self.push(Tok::Ident(name), start, line);
                }
                c if c.is_ascii_digit() => {
                    while self.peek(0).is_ascii_alphanumeric() || self.peek(0) == b'.' {
                        self.bump();
                    }
                    self.push(Tok::Other, start, line);
                }
                _ => {
                    let punct = self.punct();
                    self.push(punct, start, line);
                }
            }
        }
    }

    fn line_comment(&mut self, prefix: usize) {
        self.bump_n(prefix);
        while self.pos < self.src.len() && self.peek(0) != b'\n' && !self.starts_with("?>") {
            self.bump();
        }
    }

    fn ident(&mut self) {
        while is_ident_start(self.peek(0)) || self.peek(0).is_ascii_digit() || self.peek(0) == b'\\'
        {
            self.bump();
        }
    }

    fn single_quoted(&mut self) -> String {
        let mut bytes = Vec::new();
        self.bump();
        while self.pos < self.src.len() {
            match self.peek(0) {
                b'\'' => {
                    self.bump();
                    break;
                }
                b'\\' if matches!(self.peek(1), b'\'' | b'\\') => {
                    bytes.push(self.peek(1));
                    self.bump_n(2);
                }
                c => {
                    bytes.push(c);
                    self.bump();
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn double_quoted(&mut self) -> Option<String> {
        let mut bytes = Vec::new();
        let mut literal = true;
        self.bump();
        while self.pos < self.src.len() {
            match self.peek(0) {
                b'"' => {
                    self.bump();
                    break;
                }
                b'\\' => {
                    let escaped = match self.peek(1) {
                        b'n' => Some(b'\n'),
                        b't' => Some(b'\t'),
                        b'r' => Some(b'\r'),
                        b'v' => Some(0x0b),
                        b'f' => Some(0x0c),
                        b'e' => Some(0x1b),
                        b'\\' => Some(b'\\'),
                        b'$' => Some(b'$'),
                        b'"' => Some(b'"'),
                        _ => None,
                    };
                    match escaped {
                        Some(byte) => {
                            bytes.push(byte);
                            self.bump_n(2);
                        }
                        None => {
                            bytes.push(b'\\');
                            self.bump();
                        }
                    }
                }
                b'$' if is_ident_start(self.peek(1)) || self.peek(1) == b'{' => {
                    literal = false;
                    self.bump();
                }
                b'{' if self.peek(1) == b'$' => {
                    literal = false;
                    self.bump();
                }
                c => {
                    bytes.push(c);
                    self.bump();
                }
            }
        }
        literal.then(|| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a heredoc (`<<<EOT`, `<<<"EOT"`) or nowdoc (`<<<'EOT'`). The
    /// body ends at the first line holding only indentation and the label,
    /// and that indentation is removed from every body line. Returns `None`
    /// and leaves the position alone when no valid opener follows.
    fn heredoc(&mut self) -> Option<Option<String>> {
        let (pos, line) = (self.pos, self.line);
        let text = self.text;

        self.bump_n(3);
        while matches!(self.peek(0), b' ' | b'\t') {
            self.bump();
        }

        let quote = match self.peek(0) {
            q @ (b'\'' | b'"') => {
                self.bump();
                Some(q)
            }
            _ => None,
        };

        let label_start = self.pos;
        while is_ident_start(self.peek(0)) || self.peek(0).is_ascii_digit() {
            self.bump();
        }
        let label = &text[label_start..self.pos];

        let closed = quote.is_none_or(|q| {
            let ok = self.peek(0) == q;
            if ok {
                self.bump();
            }
            ok
        });
        if self.peek(0) == b'\r' {
            self.bump();
        }
        if label.is_empty() || !is_ident_start(label.as_bytes()[0]) || !closed || self.peek(0) != b'\n' {
            self.pos = pos;
            self.line = line;
            return None;
        }
        self.bump();

        let body_start = self.pos;
        let (body_end, indent) = loop {
            let line_start = self.pos;
            while matches!(self.peek(0), b' ' | b'\t') {
                self.bump();
            }
            let indent_end = self.pos;

            if self.starts_with(label) {
                let after = self.peek(label.len());
                if !(is_ident_start(after) || after.is_ascii_digit()) {
                    self.bump_n(label.len());
                    break (line_start, &text[line_start..indent_end]);
                }
            }

            while self.pos < self.src.len() && self.peek(0) != b'\n' {
                self.bump();
            }
            if self.pos >= self.src.len() {
                // Unterminated, the rest of the file is the body.
                break (self.pos, "");
            }
            self.bump();
        };

        let raw = &text[body_start..body_end];
        let raw = raw.strip_suffix('\n').unwrap_or(raw);
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let body = raw
            .split('\n')
            .map(|line| line.strip_prefix(indent).unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");

        Some(match quote {
            Some(b'\'') => Some(body),
            _ => unescape_interpolated(&body),
        })
    }

    fn punct(&mut self) -> Tok {
        const MULTI: &[&str] = &["?->", "->", "::", "=>", "==", "!=", "<=", ">=", "&&", "||", ".="];
        const SINGLE: &[&str] = &[
            "(", ")", "[", "]", "{", "}", ",", ".", ";", "=", "+", "-", "*", "/", "%", "!", "?",
            ":", "<", ">", "&", "|", "^", "~", "@",
        ];

        for punct in MULTI {
            if self.starts_with(punct) {
                self.bump_n(punct.len());
                return Tok::Punct(punct);
            }
        }

        for punct in SINGLE {
            if self.starts_with(punct) {
                self.bump();
                return Tok::Punct(punct);
            }
        }

        self.bump();
        Tok::Other
    }
}

/// Resolves the escapes of a heredoc body. `None` when it interpolates
/// variables.
fn unescape_interpolated(body: &str) -> Option<String> {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let next = bytes.get(i + 1).copied().unwrap_or(0);
        match bytes[i] {
            b'\\' => {
                let escaped = match next {
                    b'n' => Some(b'\n'),
                    b't' => Some(b'\t'),
                    b'r' => Some(b'\r'),
                    b'\\' => Some(b'\\'),
                    b'$' => Some(b'$'),
                    _ => None,
                };
                match escaped {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => {
                        out.push(b'\\');
                        i += 1;
                    }
                }
            }
            b'$' if is_ident_start(next) || next == b'{' => return None,
            b'{' if next == b'$' => return None,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(String::from_utf8_lossy(&out).into_owned())
}

fn is_ident_start(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphabetic() || c >= 0x80
}

fn clean_block_comment(text: &str) -> String {
    text.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(arg: &Arg) -> &str {
        arg.literal().unwrap()
    }

    #[test]
    fn test_finds_calls_in_php_regions() {
        let source = "<p>__('not php')</p>\n<?php echo __( 'Hello', 'theme' ); ?>\n<?= _e(\"Bye\", 'theme') ?>";
        let calls = scan_calls(source, &["__", "_e"]);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "__");
        assert_eq!(calls[0].line, 2);
        assert_eq!(literal(&calls[0].args[0]), "Hello");
        assert_eq!(literal(&calls[0].args[1]), "theme");
        assert_eq!(literal(&calls[1].args[0]), "Bye");
    }

    #[test]
    fn test_skips_comments_strings_and_methods() {
        let source = r#"<?php
            // __( 'in a comment', 'theme' );
            /* __( 'in a block', 'theme' ); */
            $x = "__( 'in a string' )";
            $obj->__( 'method', 'theme' );
            Foo::__( 'static', 'theme' );
            function __( $text ) {}
            __( 'real', 'theme' );
        "#;
        let calls = scan_calls(source, &["__"]);

        assert_eq!(calls.len(), 1);
        assert_eq!(literal(&calls[0].args[0]), "real");
        assert_eq!(calls[0].line, 8);
    }

    #[test]
    fn test_heredoc_and_nowdoc_bodies() {
        let source = "<?php
$help = <<<EOT
    It's \"quoted\" and __( 'inside', 'theme' )
    EOT;
echo __( <<<'TXT'
Don't {$touch}
TXT, 'theme' );
printf( <<<HTML
  <b>$name</b>
  HTML );
__( 'After', 'theme' );
";
        let calls = scan_calls(source, &["__", "printf"]);

        assert_eq!(calls.len(), 3);
        assert_eq!(literal(&calls[0].args[0]), "Don't {$touch}");
        assert_eq!(calls[0].line, 5);
        assert_eq!(calls[1].name, "printf");
        assert!(calls[1].args[0].literal().is_none());
        assert_eq!(literal(&calls[2].args[0]), "After");
        assert_eq!(calls[2].line, 11);
    }

    #[test]
    fn test_shift_operator_is_not_a_heredoc() {
        let calls = scan_calls("<?php $a = 1 <<< 2; __( 'x', 'theme' );", &["__"]);
        assert_eq!(calls.len(), 1);
        assert_eq!(literal(&calls[0].args[0]), "x");
    }

    #[test]
    fn test_concatenation_and_expressions() {
        let source = "<?php _x( 'a' . \"b\", $ctx, THEME_DOMAIN ); _n( \"$n item\", 'items', $n, 'theme' );";
        let calls = scan_calls(source, &["_x", "_n"]);

        assert_eq!(literal(&calls[0].args[0]), "ab");
        assert_eq!(calls[0].args[1], Arg::Expr);
        assert_eq!(calls[0].args[2], Arg::Expr);
        assert_eq!(calls[1].args[0], Arg::Expr);
        assert_eq!(literal(&calls[1].args[1]), "items");
    }

    #[test]
    fn test_nested_calls() {
        let source = "<?php printf( esc_html__( 'Hi %s', 'theme' ), get_name( 'x', array( 1, 2 ) ) );";
        let calls = scan_calls(source, &["esc_html__", "printf"]);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "printf");
        assert_eq!(calls[0].args.len(), 2);
        assert_eq!(calls[1].name, "esc_html__");
    }

    #[test]
    fn test_escapes() {
        let source = r#"<?php __( 'it\'s', 'd' ); __( "say \"hi\"\n", 'd' );"#;
        let calls = scan_calls(source, &["__"]);

        assert_eq!(literal(&calls[0].args[0]), "it's");
        assert_eq!(literal(&calls[1].args[0]), "say \"hi\"\n");
    }

    #[test]
    fn test_translators_comment() {
        let source = "<?php\n/* translators: %s: user name */\nprintf( __( 'Hi %s', 'd' ), $n );\n// unrelated\n__( 'Plain', 'd' );";
        let calls = scan_calls(source, &["__"]);

        assert_eq!(calls[0].comment.as_deref(), Some("translators: %s: user name"));
        assert_eq!(calls[1].comment, None);
    }

    #[test]
    fn test_literal_span() {
        let source = "<?php __( 'Hi', 'wrong' );";
        let calls = scan_calls(source, &["__"]);

        let Arg::Literal { span, .. } = &calls[0].args[1] else {
            panic!("expected literal");
        };
        assert_eq!(&source[span.clone()], "'wrong'");
        assert_eq!(&source[calls[0].close..calls[0].close + 1], ")");
    }
}
