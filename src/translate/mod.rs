//! Gettext string extraction for PHP sources.

mod keywords;
mod pot;
mod scanner;
mod textdomain;

pub use keywords::{DEFAULT_KEYWORDS, InvalidKeyword, Keyword};
pub use pot::{Catalog, PotHeader};
pub use scanner::{Arg, Call, scan_calls};
pub use textdomain::{Checked, DomainCheck, Violation, ViolationKind};

/// Parsed form of [`DEFAULT_KEYWORDS`].
pub fn default_keywords() -> Vec<Keyword> {
    DEFAULT_KEYWORDS
        .iter()
        .filter_map(|spec| spec.parse().ok())
        .collect()
}
