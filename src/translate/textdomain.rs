use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

use crate::translate::Keyword;
use crate::translate::scanner::{Arg, scan_calls};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// The call has no text domain argument.
    Missing,
    /// The text domain is not a string literal.
    Variable,
    /// The literal text domain is not one of the allowed ones.
    Incorrect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: Utf8PathBuf,
    pub line: usize,
    pub function: String,
    pub kind: ViolationKind,
    /// Whether the source was rewritten to fix this violation.
    pub corrected: bool,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}() ", self.path, self.line, self.function)?;
        match &self.kind {
            ViolationKind::Missing => write!(f, "is missing a text domain")?,
            ViolationKind::Variable => write!(f, "uses a variable text domain")?,
            ViolationKind::Incorrect(domain) => write!(f, "uses incorrect text domain '{domain}'")?,
        }
        if self.corrected {
            write!(f, " (corrected)")?;
        }
        Ok(())
    }
}

/// Verifies that every translatable call carries one of the allowed domains.
pub struct DomainCheck<'a> {
    pub keywords: &'a [Keyword],
    pub allowed: &'a [String],
    pub report_missing: bool,
    pub report_variable: bool,
    /// Rewrite missing and incorrect domains when exactly one is allowed.
    pub correct: bool,
}

/// Result of checking a single file.
#[derive(Debug, Default)]
pub struct Checked {
    pub violations: Vec<Violation>,
    /// The fixed source, present only when something was rewritten.
    pub corrected: Option<String>,
}

impl DomainCheck<'_> {
    pub fn check(&self, path: &Utf8Path, source: &str) -> Checked {
        let names: Vec<&str> = self
            .keywords
            .iter()
            .filter(|k| k.domain.is_some())
            .map(|k| k.name.as_str())
            .collect();

        let fix = match (self.correct, self.allowed) {
            (true, [only]) => Some(only.as_str()),
            _ => None,
        };

        let mut checked = Checked::default();
        let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();

        for call in scan_calls(source, &names) {
            let Some(keyword) = self.keywords.iter().find(|k| k.name == call.name) else {
                continue;
            };
            let Some(position) = keyword.domain else {
                continue;
            };

            let (kind, edit) = match call.args.get(position - 1) {
                None if self.report_missing => {
                    // Only a domain directly after the last argument can be added.
                    let at = source[..call.close].trim_end().len();
                    let edit = fix
                        .filter(|_| call.args.len() == position - 1 && !call.args.is_empty())
                        .map(|domain| (at..at, format!(", '{domain}'")));
                    (ViolationKind::Missing, edit)
                }
                Some(Arg::Expr) if self.report_variable => (ViolationKind::Variable, None),
                Some(Arg::Literal { value, span }) if !self.allowed.contains(value) => {
                    let edit = fix.map(|domain| {
                        let quote = source[span.start..].chars().next().unwrap_or('\'');
                        (span.clone(), format!("{quote}{domain}{quote}"))
                    });
                    (ViolationKind::Incorrect(value.clone()), edit)
                }
                _ => continue,
            };

            let corrected = edit.is_some();
            if let Some(edit) = edit {
                edits.push(edit);
            }

            checked.violations.push(Violation {
                path: path.to_owned(),
                line: call.line,
                function: call.name,
                kind,
                corrected,
            });
        }

        if !edits.is_empty() {
            let mut text = source.to_string();
            edits.sort_by_key(|(range, _)| range.start);
            for (range, replacement) in edits.into_iter().rev() {
                text.replace_range(range, &replacement);
            }
            checked.corrected = Some(text);
        }

        checked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::default_keywords;

    const SOURCE: &str = "<?php\n__( 'A', 'theme' );\n_e( 'B' );\n_x( 'C', 'ctx', $domain );\nesc_html__( 'D', 'other' );\n";

    fn check(correct: bool, allowed: &[&str]) -> Checked {
        let keywords = default_keywords();
        let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
        DomainCheck {
            keywords: &keywords,
            allowed: &allowed,
            report_missing: true,
            report_variable: true,
            correct,
        }
        .check(Utf8Path::new("index.php"), SOURCE)
    }

    #[test]
    fn test_reports_violations() {
        let checked = check(false, &["theme"]);
        let kinds: Vec<_> = checked.violations.iter().map(|v| (v.line, v.kind.clone())).collect();

        assert_eq!(
            kinds,
            vec![
                (3, ViolationKind::Missing),
                (4, ViolationKind::Variable),
                (5, ViolationKind::Incorrect("other".into())),
            ]
        );
        assert!(checked.corrected.is_none());
        assert_eq!(
            checked.violations[0].to_string(),
            "index.php:3: _e() is missing a text domain"
        );
    }

    #[test]
    fn test_multiple_allowed_domains() {
        let checked = check(false, &["theme", "other"]);
        assert_eq!(checked.violations.len(), 2);
    }

    #[test]
    fn test_correct_domain() {
        let checked = check(true, &["theme"]);
        let fixed = checked.corrected.unwrap();

        assert!(fixed.contains("_e( 'B', 'theme' );"));
        assert!(fixed.contains("esc_html__( 'D', 'theme' );"));
        assert!(fixed.contains("$domain"));
        assert!(checked.violations[0].corrected);
        assert!(!checked.violations[1].corrected);
    }
}
