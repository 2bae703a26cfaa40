use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock};

use camino::Utf8Path;
use regex::Regex;

use crate::error::{StageErrorKind, ToolError};
use crate::stream::{Stage, Stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem reported by the linter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{line}:{column}: {}", self.message),
            (Some(line), None) => write!(f, "{line}: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// The external JavaScript compiler.
pub trait ScriptTool: Send + Sync {
    /// Checks a file. Problems in the code are diagnostics, not errors.
    fn lint(&self, path: &Utf8Path, code: &str) -> Result<Vec<Diagnostic>, ToolError>;

    /// Lowers modern syntax to the `target` language level.
    fn transpile(&self, path: &Utf8Path, code: &str, target: &str) -> Result<String, ToolError>;

    fn minify(&self, path: &Utf8Path, code: &str) -> Result<String, ToolError>;
}

/// Runs the `esbuild` executable. Code goes in over stdin and comes back on
/// stdout.
#[derive(Debug, Clone)]
pub struct Esbuild {
    program: String,
}

impl Esbuild {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, path: &Utf8Path, code: &str, args: &[&str]) -> Result<Output, ToolError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .arg(format!("--sourcefile={path}"))
            .arg("--loader=js")
            .arg("--color=false")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Spawn(self.program.clone(), e))?;

        // Feed stdin from another thread so a full stdout pipe cannot stall us.
        let input = code.as_bytes().to_vec();
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| ToolError::Spawn(self.program.clone(), e))?;

        let written = match writer {
            Some(writer) => writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked"))),
            None => Ok(()),
        };
        match written {
            // The tool quit early. Its exit status and stderr tell why.
            Err(e) if e.kind() == ErrorKind::BrokenPipe && !output.status.success() => {}
            Err(e) => return Err(ToolError::Stdin(self.program.clone(), e)),
            Ok(()) => {}
        }

        Ok(Output {
            status: output.status,
            stdout: String::from_utf8(output.stdout)?,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn compile(&self, path: &Utf8Path, code: &str, args: &[&str]) -> Result<String, ToolError> {
        let output = self.run(path, code, args)?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.program.clone(),
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }
}

struct Output {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

impl ScriptTool for Esbuild {
    fn lint(&self, path: &Utf8Path, code: &str) -> Result<Vec<Diagnostic>, ToolError> {
        let output = self.run(path, code, &["--log-level=warning"])?;
        Ok(parse_diagnostics(&output.stderr))
    }

    fn transpile(&self, path: &Utf8Path, code: &str, target: &str) -> Result<String, ToolError> {
        let target = format!("--target={target}");
        self.compile(path, code, &[&target, "--log-level=error"])
    }

    fn minify(&self, path: &Utf8Path, code: &str) -> Result<String, ToolError> {
        self.compile(path, code, &["--minify", "--log-level=error"])
    }
}

static LOCATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\S+:(\d+):(\d+):\s*$").unwrap());

/// Reads esbuild's human readable log.
///
/// ```text
/// ▲ [WARNING] Duplicate key "a" in object literal [duplicate-object-key]
///
///     main.js:1:16:
/// ```
fn parse_diagnostics(log: &str) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    for line in log.lines() {
        let header = line
            .trim_start()
            .strip_prefix("▲ [WARNING]")
            .map(|rest| (Severity::Warning, rest))
            .or_else(|| {
                line.trim_start()
                    .strip_prefix("✘ [ERROR]")
                    .map(|rest| (Severity::Error, rest))
            });

        if let Some((severity, message)) = header {
            diagnostics.push(Diagnostic {
                severity,
                line: None,
                column: None,
                message: message.trim().to_string(),
            });
            continue;
        }

        if let Some(last) = diagnostics.last_mut()
            && last.line.is_none()
            && let Some(caps) = LOCATION.captures(line)
        {
            last.line = caps[1].parse().ok();
            last.column = caps[2].parse().ok();
        }
    }

    diagnostics
}

/// Lowers each file to the configured language level.
pub struct Transpile {
    pub tool: Arc<dyn ScriptTool>,
    pub target: String,
}

impl Stage for Transpile {
    fn name(&self) -> &'static str {
        "babel"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let code = self.tool.transpile(&file.origin, file.text()?, &self.target)?;
            file.set_text(code);
            Ok(file)
        })
    }
}

/// Minifies each file on its own.
pub struct MinifyJs {
    pub tool: Arc<dyn ScriptTool>,
}

impl Stage for MinifyJs {
    fn name(&self) -> &'static str {
        "uglify"
    }

    fn apply(&self, stream: Stream) -> Stream {
        stream.map(self.name(), |mut file| {
            let code = self
                .tool
                .minify(&file.origin, file.text()?)
                .map_err(StageErrorKind::Tool)?;
            file.set_text(code);
            Ok(file)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_diagnostics() {
        let log = "▲ [WARNING] Duplicate key \"a\" in object literal [duplicate-object-key]\n\
                   \n    assets/js/main.js:3:16:\n      3 │ var o = {a: 1, a: 2};\n\
                   \n✘ [ERROR] Unexpected \"}\"\n\n    assets/js/main.js:9:0:\n";

        let diagnostics = parse_diagnostics(log);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].line, Some(3));
        assert_eq!(diagnostics[0].column, Some(16));
        assert_eq!(diagnostics[1].severity, Severity::Error);
        assert_eq!(diagnostics[1].to_string(), "9:0: Unexpected \"}\"");
    }

    #[test]
    fn test_missing_binary() {
        let tool = Esbuild::new("themesmith-no-such-binary");
        let result = tool.minify(Utf8Path::new("a.js"), "var a = 1;");
        assert!(matches!(result, Err(ToolError::Spawn(..))));
    }

    #[cfg(unix)]
    #[test]
    fn test_unread_input_is_an_error() {
        // `true` exits without reading stdin, so a large input cannot be delivered.
        let tool = Esbuild::new("true");
        let code = "var a = 1;\n".repeat(100_000);
        let result = tool.minify(Utf8Path::new("a.js"), &code);
        assert!(matches!(result, Err(ToolError::Stdin(..))), "{result:?}");
    }
}
