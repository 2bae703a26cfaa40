use camino::Utf8PathBuf;
#[cfg(feature = "live")]
use std::sync::mpsc::RecvError;

use thiserror::Error;

/// Errors raised while loading and validating `themesmith.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read configuration file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Malformed configuration document.\n{0}")]
    Parse(#[from] toml::de::Error),

    #[error("'{section}': the list of sources is empty")]
    EmptySources { section: String },

    #[error("'{section}': the destination must be a non-empty path")]
    EmptyDestination { section: String },

    #[error("'{section}': '{dest}' points outside the project root")]
    OutsideRoot { section: String, dest: String },

    #[error("'{section}': invalid glob pattern '{pattern}'.\n{source}")]
    Pattern {
        section: String,
        pattern: String,
        source: glob::PatternError,
    },

    #[error("'style.autoprefixer': unsupported browser query '{0}'")]
    Browsers(String),

    #[error("'translate': invalid keyword spec '{0}'")]
    Keyword(String),

    #[error("'image.optimizer': level {0} is out of range 0-7")]
    ImageLevel(u8),

    #[error("'image.optimizer': jpeg quality {0} is out of range 1-100")]
    JpegQuality(u8),
}

/// Errors found while assembling the task graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is declared twice")]
    Duplicate(String),

    #[error("Task '{task}' depends on unknown task '{missing}'")]
    Missing { task: String, missing: String },

    #[error("Dependency cycle detected at task '{0}'")]
    Cycle(String),

    #[error("Unknown task '{0}'")]
    Unknown(String),
}

/// Errors while resolving a source glob set into files.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("File not found with singular glob: '{0}'")]
    NotFound(Utf8PathBuf),

    #[error("Couldn't read source file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),
}

/// Errors produced by the external script compiler.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Couldn't launch '{0}'.\n{1}")]
    Spawn(String, std::io::Error),

    #[error("Couldn't pass the source to '{0}'.\n{1}")]
    Stdin(String, std::io::Error),

    #[error("'{tool}' exited with {status}:\n{stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// What went wrong inside a single stage for a single file.
#[derive(Debug, Error)]
pub enum StageErrorKind {
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("CSS error: {0}")]
    Css(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("File is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stage rejected one file of the stream.
#[derive(Debug, Error)]
#[error("[{stage}] '{path}': {kind}")]
pub struct StageError {
    pub stage: &'static str,
    pub path: Utf8PathBuf,
    pub kind: StageErrorKind,
}

/// A pipeline stopped before its stream drained.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Couldn't write '{0}'.\n{1}")]
    Write(Utf8PathBuf, std::io::Error),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("Error while loading the configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Error while assembling the task graph:\n{0}")]
    Graph(#[from] GraphError),

    #[error("Project root is not valid UTF-8.\n{0}")]
    Root(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}
