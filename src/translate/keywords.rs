use std::str::FromStr;

use thiserror::Error;

/// The WordPress i18n function family.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "__:1,2d",
    "_e:1,2d",
    "_x:1,2c,3d",
    "_ex:1,2c,3d",
    "_n:1,2,4d",
    "_nx:1,2,4c,5d",
    "_n_noop:1,2,3d",
    "_nx_noop:1,2,3c,4d",
    "esc_attr__:1,2d",
    "esc_attr_e:1,2d",
    "esc_attr_x:1,2c,3d",
    "esc_html__:1,2d",
    "esc_html_e:1,2d",
    "esc_html_x:1,2c,3d",
];

#[derive(Debug, Error)]
#[error("invalid keyword spec")]
pub struct InvalidKeyword;

/// A gettext keyword spec like `_nx:1,2,4c,5d`.
///
/// Positions are 1-based argument indices. Plain numbers are the singular and
/// then the plural, `c` marks the context and `d` the text domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub name: String,
    pub singular: usize,
    pub plural: Option<usize>,
    pub context: Option<usize>,
    pub domain: Option<usize>,
}

impl FromStr for Keyword {
    type Err = InvalidKeyword;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (name, positions) = match spec.split_once(':') {
            Some((name, positions)) => (name.trim(), Some(positions)),
            None => (spec.trim(), None),
        };

        if name.is_empty() || !name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric()) {
            return Err(InvalidKeyword);
        }

        let mut keyword = Keyword {
            name: name.to_string(),
            singular: 1,
            plural: None,
            context: None,
            domain: None,
        };

        let Some(positions) = positions else {
            return Ok(keyword);
        };

        let mut plain = Vec::new();
        for part in positions.split(',') {
            let part = part.trim();
            let (digits, slot) = match part.strip_suffix('c') {
                Some(digits) => (digits, Some(&mut keyword.context)),
                None => match part.strip_suffix('d') {
                    Some(digits) => (digits, Some(&mut keyword.domain)),
                    None => (part, None),
                },
            };

            let position: usize = digits.parse().map_err(|_| InvalidKeyword)?;
            if position == 0 {
                return Err(InvalidKeyword);
            }

            match slot {
                Some(slot) if slot.is_none() => *slot = Some(position),
                Some(_) => return Err(InvalidKeyword),
                None => plain.push(position),
            }
        }

        match plain[..] {
            [singular] => keyword.singular = singular,
            [singular, plural] => {
                keyword.singular = singular;
                keyword.plural = Some(plural);
            }
            _ => return Err(InvalidKeyword),
        }

        Ok(keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_spec() {
        let keyword: Keyword = "_nx:1,2,4c,5d".parse().unwrap();
        assert_eq!(keyword.name, "_nx");
        assert_eq!(keyword.singular, 1);
        assert_eq!(keyword.plural, Some(2));
        assert_eq!(keyword.context, Some(4));
        assert_eq!(keyword.domain, Some(5));
    }

    #[test]
    fn test_bare_name() {
        let keyword: Keyword = "gettext".parse().unwrap();
        assert_eq!(keyword.singular, 1);
        assert_eq!(keyword.domain, None);
    }

    #[test]
    fn test_invalid_specs() {
        assert!("".parse::<Keyword>().is_err());
        assert!("__:x".parse::<Keyword>().is_err());
        assert!("__:0".parse::<Keyword>().is_err());
        assert!("__:1,2d,3d".parse::<Keyword>().is_err());
        assert!("__:1,2,3".parse::<Keyword>().is_err());
    }

    #[test]
    fn test_defaults_parse() {
        for spec in DEFAULT_KEYWORDS {
            assert!(spec.parse::<Keyword>().is_ok(), "{spec}");
        }
    }
}
