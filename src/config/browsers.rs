use lightningcss::targets::{Browsers, Targets};

use crate::error::ConfigError;

/// Turns autoprefixer-style queries (`"Chrome >= 20"`, `"Android 2.3"`) into
/// lightningcss browser targets. When a browser is listed several times the
/// oldest version wins.
pub fn parse_browsers<S: AsRef<str>>(queries: &[S]) -> Result<Option<Browsers>, ConfigError> {
    if queries.is_empty() {
        return Ok(None);
    }

    let mut browsers = Browsers::default();

    for query in queries {
        let query = query.as_ref();
        let (name, version) = split_query(query).ok_or_else(|| ConfigError::Browsers(query.into()))?;
        let version = parse_version(version).ok_or_else(|| ConfigError::Browsers(query.into()))?;

        let slot = match name.to_ascii_lowercase().as_str() {
            "android" => &mut browsers.android,
            "chrome" => &mut browsers.chrome,
            "edge" => &mut browsers.edge,
            "firefox" | "ff" => &mut browsers.firefox,
            "explorer" | "ie" => &mut browsers.ie,
            "ios" | "ios_saf" => &mut browsers.ios_saf,
            "opera" => &mut browsers.opera,
            "safari" => &mut browsers.safari,
            "samsung" => &mut browsers.samsung,
            _ => return Err(ConfigError::Browsers(query.into())),
        };

        *slot = Some(slot.map_or(version, |v| v.min(version)));
    }

    Ok(Some(browsers))
}

pub fn targets<S: AsRef<str>>(queries: &[S]) -> Result<Targets, ConfigError> {
    Ok(match parse_browsers(queries)? {
        Some(browsers) => Targets::from(browsers),
        None => Targets::default(),
    })
}

fn split_query(query: &str) -> Option<(&str, &str)> {
    let query = query.trim();

    if let Some((name, version)) = query.split_once(">=") {
        return Some((name.trim(), version.trim()));
    }

    let mut parts = query.split_whitespace();
    let name = parts.next()?;
    let version = parts.next()?;
    match parts.next() {
        None => Some((name, version)),
        Some(_) => None,
    }
}

/// `"2.3"` → `0x00020300`, the packed form lightningcss expects.
fn parse_version(version: &str) -> Option<u32> {
    let mut parts = version.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;

    if parts.next().is_some() || minor > 255 || patch > 255 {
        return None;
    }

    Some((major << 16) | (minor << 8) | patch)
}
