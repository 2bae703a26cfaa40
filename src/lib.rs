#![forbid(unsafe_code)]
//! Build pipeline for WordPress themes.
//!
//! A theme is described by a single `themesmith.toml` document at its root.
//! The document lists build descriptors for stylesheets, scripts, images and
//! translations. Each descriptor becomes a chain of stages over a file
//! stream, and a fixed task graph decides what runs before what:
//!
//! ```text
//! styles-build ─> styles-rtl ───────────────┐
//! js-lint ─> js-bundle ─> js-minify ─────────┤
//! image ─────────────────────────────────────┼─> compress
//! check-text-domain ─> build-pot ────────────┘
//! clean
//! ```
//!
//! ```no_run
//! use themesmith::{Command, Theme};
//!
//! let theme = Theme::open(".")?;
//! let report = theme.run(Command::Default)?;
//! print!("{report}");
//! # Ok::<(), themesmith::ThemeError>(())
//! ```

pub mod config;
mod engine;
mod error;
pub mod graph;
mod io;
#[cfg(feature = "logging")]
mod logging;
pub mod sourcemap;
pub mod sources;
pub mod stage;
pub mod stream;
mod tasks;
pub mod translate;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

pub use crate::config::Config;
pub use crate::engine::{Outcome, Reload, ReloadEvent, Report, TaskState};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
use crate::graph::TaskGraph;
use crate::stage::{Esbuild, ScriptTool};
pub use crate::tasks::{
    BUILD_POT, CHECK_TEXT_DOMAIN, CLEAN, COMPRESS, Command, IMAGE, JS_BUNDLE, JS_LINT, JS_MINIFY,
    STYLES_BUILD, STYLES_RTL,
};

/// Everything a task can see while it runs. Shared read-only between all
/// tasks of a run.
#[derive(Clone)]
pub struct Context {
    /// Absolute project root. Every path in the configuration is relative to it.
    pub root: Utf8PathBuf,
    pub config: Arc<Config>,
    pub reload: Reload,
    pub tools: Arc<dyn ScriptTool>,
}

#[cfg(test)]
impl Context {
    pub(crate) fn for_tests() -> Self {
        Self {
            root: Utf8PathBuf::from("."),
            config: Arc::new(Config::default()),
            reload: Reload::disabled(),
            tools: Arc::new(Esbuild::new("esbuild")),
        }
    }
}

/// A theme project: its root, its validated configuration and the task graph.
pub struct Theme {
    root: Utf8PathBuf,
    config: Arc<Config>,
    tools: Arc<dyn ScriptTool>,
    graph: TaskGraph,
}

impl Theme {
    /// Loads `themesmith.toml` from `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ThemeError> {
        let root = Utf8PathBuf::try_from(root.as_ref().canonicalize()?)?;
        let config = Config::load(root.join(config::CONFIG_FILE))?;
        Self::new(root, config)
    }

    /// Uses an already parsed configuration. It is validated again here, so
    /// nothing can run with a broken document. The root is made absolute, the
    /// watcher reports absolute paths.
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Result<Self, ThemeError> {
        config.validate()?;
        let root = root.into().canonicalize_utf8()?;

        Ok(Self {
            root,
            tools: Arc::new(Esbuild::new(&config.script.tool.esbuild)),
            config: Arc::new(config),
            graph: TaskGraph::new(tasks::registry())?,
        })
    }

    /// Replaces the script compiler, which is `esbuild` by default.
    pub fn with_tools(mut self, tools: impl ScriptTool + 'static) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context(&self, reload: Reload) -> Context {
        Context {
            root: self.root.clone(),
            config: self.config.clone(),
            reload,
            tools: self.tools.clone(),
        }
    }

    /// Runs a command. `watch` only returns when watching fails.
    pub fn run(&self, command: Command) -> Result<Report, ThemeError> {
        #[cfg(feature = "live")]
        if command == Command::Watch {
            self.watch()?;
            return Ok(Report::default());
        }

        self.run_tasks(command.targets())
    }

    /// Runs the named tasks together with everything they depend on.
    pub fn run_tasks(&self, targets: &[&str]) -> Result<Report, ThemeError> {
        let nodes = self.graph.closure(targets)?;
        let ctx = self.context(Reload::disabled());

        let start = Instant::now();
        let report = engine::run_tasks_parallel(&self.graph, &ctx, &nodes);
        tracing::info!("ran {} tasks {}", report.outcomes.len(), io::as_overhead(start));

        Ok(report)
    }

    /// Watches the configured globs and re-runs the matching tasks. Changed
    /// outputs are announced to browsers over the live-reload websocket.
    #[cfg(feature = "live")]
    pub fn watch(&self) -> Result<(), ThemeError> {
        use std::time::Duration;

        use crate::engine::WatchGroup;

        let (reload, rx) = Reload::channel();
        let port = engine::serve(self.config.reload.port, rx).map_err(WatchError::from)?;
        tracing::info!("live reload listening on ws://127.0.0.1:{port}");

        let watch = &self.config.watch;
        let groups = [
            WatchGroup {
                patterns: watch.css.clone(),
                targets: Command::Styles.targets(),
                full_reload: false,
            },
            WatchGroup {
                patterns: watch.js.clone(),
                targets: Command::Js.targets(),
                full_reload: false,
            },
            WatchGroup {
                patterns: watch.images.clone(),
                targets: Command::Image.targets(),
                full_reload: true,
            },
        ];

        let ctx = self.context(reload);
        engine::watch(
            &self.graph,
            &ctx,
            &groups,
            Duration::from_millis(watch.debounce),
        )?;

        Ok(())
    }
}
