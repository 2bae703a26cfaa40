use std::fmt::Display;
use std::fs;
use std::time::Instant;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use console::Style;

const ANSI_BLUE: Style = Style::new().blue();

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// BLAKE3 digest of a file's contents. Outputs are only rewritten when it
/// changes, which keeps mtimes stable for the watcher and the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hash32([u8; 32]);

impl Hash32 {
    pub(crate) fn of(bytes: &[u8]) -> Self {
        Hash32(*blake3::hash(bytes).as_bytes())
    }
}

/// Normalize a path, removing things like `.` and `..`.
///
/// CAUTION: This does not resolve symlinks (unlike [`std::fs::canonicalize`]).
/// A leading `..` that cannot be popped is kept, which lets callers detect
/// paths escaping the project root.
pub(crate) fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Utf8Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        Utf8PathBuf::from(c.as_str())
    } else {
        Utf8PathBuf::new()
    };

    for component in components {
        match component {
            Utf8Component::Prefix(..) => unreachable!(),
            Utf8Component::RootDir => {
                ret.push(Utf8Component::RootDir);
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if ret.ends_with(Utf8Component::ParentDir) {
                    ret.push(Utf8Component::ParentDir);
                } else {
                    let popped = ret.pop();
                    if !popped && !ret.has_root() {
                        ret.push(Utf8Component::ParentDir);
                    }
                }
            }
            Utf8Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

/// True when a normalized relative path would leave the directory it is
/// relative to.
pub(crate) fn escapes_root(path: &Utf8Path) -> bool {
    path.is_absolute() || path.starts_with("..")
}

/// Writes `data` to `path` unless the file already holds exactly these bytes.
/// Returns whether anything was written.
pub(crate) fn write_if_changed(path: &Utf8Path, data: &[u8]) -> std::io::Result<bool> {
    if let Ok(existing) = fs::read(path)
        && Hash32::of(&existing) == Hash32::of(data)
    {
        return Ok(false);
    }

    if let Some(dir) = path.parent()
        && !dir.as_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }

    fs::write(path, data)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Utf8Path::new("./assets/js/../css/a.css")),
            Utf8Path::new("assets/css/a.css")
        );
        assert_eq!(normalize_path(Utf8Path::new("./")), Utf8Path::new(""));
        assert_eq!(
            normalize_path(Utf8Path::new("../outside")),
            Utf8Path::new("../outside")
        );
    }

    #[test]
    fn test_escapes_root() {
        assert!(escapes_root(&normalize_path(Utf8Path::new("a/../../b"))));
        assert!(!escapes_root(&normalize_path(Utf8Path::new("a/../b"))));
    }

    #[test]
    fn test_write_if_changed() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let path = root.join("nested/out.txt");

        assert!(write_if_changed(&path, b"hello").unwrap());
        assert!(!write_if_changed(&path, b"hello").unwrap());
        assert!(write_if_changed(&path, b"world").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"world");
    }
}
