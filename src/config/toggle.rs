use serde::{Deserialize, Deserializer};

/// An optional build flag, normalized from the three shapes the document
/// allows: absent or `false`, `true`, or a table of options.
///
/// `true` means the stage runs with an empty options object, which is
/// `T::default()`.
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle<T> {
    Disabled,
    EnabledDefault,
    EnabledWith(T),
}

impl<T> Default for Toggle<T> {
    fn default() -> Self {
        Self::Disabled
    }
}

impl<T> Toggle<T> {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Toggle::Disabled)
    }
}

impl<T: Default + Clone> Toggle<T> {
    /// The options a stage should be invoked with, or `None` when the stage is
    /// left out of the chain.
    pub fn options(&self) -> Option<T> {
        match self {
            Toggle::Disabled => None,
            Toggle::EnabledDefault => Some(T::default()),
            Toggle::EnabledWith(options) => Some(options.clone()),
        }
    }
}

impl<T> From<bool> for Toggle<T> {
    fn from(value: bool) -> Self {
        if value {
            Toggle::EnabledDefault
        } else {
            Toggle::Disabled
        }
    }
}

impl<'de, T> Deserialize<'de> for Toggle<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape<T> {
            Flag(bool),
            Options(T),
        }

        Ok(match Shape::<T>::deserialize(deserializer)? {
            Shape::Flag(flag) => flag.into(),
            Shape::Options(options) => Toggle::EnabledWith(options),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct Opts {
        level: u8,
    }

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default)]
        flag: Toggle<Opts>,
    }

    fn parse(text: &str) -> Toggle<Opts> {
        toml::from_str::<Holder>(text).unwrap().flag
    }

    #[test]
    fn test_absent_is_disabled() {
        let flag = parse("");
        assert_eq!(flag, Toggle::Disabled);
        assert_eq!(flag.options(), None);
    }

    #[test]
    fn test_false_is_disabled() {
        assert_eq!(parse("flag = false"), Toggle::Disabled);
    }

    #[test]
    fn test_true_is_empty_options() {
        let flag = parse("flag = true");
        assert_eq!(flag, Toggle::EnabledDefault);
        assert_eq!(flag.options(), Some(Opts::default()));
    }

    #[test]
    fn test_table_is_explicit_options() {
        let flag = parse("flag = { level = 4 }");
        assert_eq!(flag, Toggle::EnabledWith(Opts { level: 4 }));
        assert_eq!(flag.options(), Some(Opts { level: 4 }));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(toml::from_str::<Holder>("flag = \"yes\"").is_err());
    }
}
