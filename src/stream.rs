//! File streams and the pipelines that drain them.
//!
//! A [`Pipeline`] is an ordered list of steps. Each step is either a
//! [`Stage`], which turns one [`Stream`] into another, or a write to a
//! destination directory. Records keep flowing after a write, so a pipeline can
//! write a file, rename it and write it again, the way `gulp.dest` works.

use std::fs;
use std::str::Utf8Error;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::engine::{Reload, ReloadEvent};
use crate::error::{PipelineError, SourceError, StageError, StageErrorKind};
use crate::io::write_if_changed;
use crate::sourcemap::SourceMap;
use crate::sources::SourceSet;

/// A single file flowing through a pipeline.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Source file this record was read from, relative to the project root.
    pub origin: Utf8PathBuf,
    /// Static glob prefix of the source.
    pub base: Utf8PathBuf,
    /// Path below `base`, which is where the record lands under a destination.
    pub relative: Utf8PathBuf,
    pub contents: Vec<u8>,
    pub map: Option<SourceMap>,
}

impl FileRecord {
    pub fn new(
        base: impl Into<Utf8PathBuf>,
        relative: impl Into<Utf8PathBuf>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        let base = base.into();
        let relative = relative.into();
        Self {
            origin: base.join(&relative),
            base,
            relative,
            contents: contents.into(),
            map: None,
        }
    }

    pub fn text(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.contents)
    }

    pub fn extension(&self) -> Option<String> {
        self.relative.extension().map(str::to_ascii_lowercase)
    }

    pub fn file_name(&self) -> &str {
        self.relative.file_name().unwrap_or_default()
    }

    /// Replaces the contents after a rewrite that does not keep line positions.
    pub fn set_text(&mut self, text: String) {
        if let Some(map) = &mut self.map {
            map.coarsen(&text);
        }
        self.contents = text.into_bytes();
    }
}

/// Records in declared order, plus the errors stages raised for dropped ones.
#[derive(Debug, Default)]
pub struct Stream {
    pub files: Vec<FileRecord>,
    pub errors: Vec<StageError>,
}

impl Stream {
    pub fn new(files: Vec<FileRecord>) -> Self {
        Self {
            files,
            errors: Vec::new(),
        }
    }

    /// Transforms every record in parallel. Order is preserved. A record whose
    /// transform fails leaves the stream and its error is kept.
    pub fn map<F>(self, stage: &'static str, f: F) -> Stream
    where
        F: Fn(FileRecord) -> Result<FileRecord, StageErrorKind> + Sync + Send,
    {
        let Stream { files, mut errors } = self;

        let results: Vec<_> = files
            .into_par_iter()
            .map(|file| {
                let path = file.origin.clone();
                f(file).map_err(|kind| StageError { stage, path, kind })
            })
            .collect();

        let mut files = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(file) => files.push(file),
                Err(e) => errors.push(e),
            }
        }

        Stream { files, errors }
    }

    pub fn retain(mut self, f: impl Fn(&FileRecord) -> bool) -> Stream {
        self.files.retain(f);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.relative.as_str()).collect()
    }
}

/// One named step of a pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, stream: Stream) -> Stream;
}

enum Step {
    Stage(Box<dyn Stage>),
    Write(Utf8PathBuf),
}

/// What a pipeline does when a stage drops a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Stop the pipeline and report the first error.
    Abort,
    /// Log the error and keep going with the remaining files.
    Skip,
}

pub struct Pipeline {
    steps: Vec<Step>,
    on_error: OnError,
}

/// Outcome of a pipeline that ran to the end.
#[derive(Debug, Default)]
pub struct Drained {
    /// Every path written, relative to the project root.
    pub written: Vec<Utf8PathBuf>,
    /// Paths whose contents actually changed on disk.
    pub changed: Vec<Utf8PathBuf>,
    /// Errors of files dropped under [`OnError::Skip`].
    pub errors: Vec<StageError>,
}

impl Pipeline {
    pub fn new(on_error: OnError) -> Self {
        Self {
            steps: Vec::new(),
            on_error,
        }
    }

    pub fn pipe(mut self, stage: impl Stage + 'static) -> Self {
        self.steps.push(Step::Stage(Box::new(stage)));
        self
    }

    /// Adds the stage only when a flag enabled it.
    pub fn pipe_if(self, stage: Option<impl Stage + 'static>) -> Self {
        match stage {
            Some(stage) => self.pipe(stage),
            None => self,
        }
    }

    pub fn write(mut self, dest: impl Into<Utf8PathBuf>) -> Self {
        self.steps.push(Step::Write(dest.into()));
        self
    }

    /// Step names in order, writes shown as `dest`.
    pub fn describe(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Stage(stage) => stage.name(),
                Step::Write(_) => "dest",
            })
            .collect()
    }

    pub fn run(&self, input: Stream, sink: &Sink) -> Result<Drained, PipelineError> {
        let mut stream = input;
        let mut drained = Drained::default();

        for step in &self.steps {
            match step {
                Step::Stage(stage) => {
                    stream = stage.apply(stream);
                    let errors = std::mem::take(&mut stream.errors);
                    for error in errors {
                        match self.on_error {
                            OnError::Abort => return Err(error.into()),
                            OnError::Skip => {
                                tracing::error!("{error}");
                                drained.errors.push(error);
                            }
                        }
                    }
                }
                Step::Write(dest) => {
                    for file in &stream.files {
                        let (path, changed) = sink.write(dest, file)?;
                        if changed {
                            drained.changed.push(path.clone());
                        }
                        drained.written.push(path);
                    }
                }
            }
        }

        Ok(drained)
    }
}

/// Writes records below the project root and announces changed files.
#[derive(Debug, Clone)]
pub struct Sink {
    root: Utf8PathBuf,
    reload: Reload,
}

impl Sink {
    pub fn new(root: impl Into<Utf8PathBuf>, reload: Reload) -> Self {
        Self {
            root: root.into(),
            reload,
        }
    }

    /// Places `file` at `dest/relative`. Returns the path relative to the
    /// root and whether the bytes on disk changed.
    pub fn write(
        &self,
        dest: &Utf8Path,
        file: &FileRecord,
    ) -> Result<(Utf8PathBuf, bool), PipelineError> {
        let path = dest.join(&file.relative);
        let full = self.root.join(&path);

        let changed = write_if_changed(&full, &file.contents)
            .map_err(|e| PipelineError::Write(path.clone(), e))?;

        if changed {
            tracing::debug!("wrote {path}");
            self.reload.publish(ReloadEvent::new(path.clone()));
        }

        Ok((path, changed))
    }
}

/// Reads every file selected by `set`, in declared order.
pub fn read_sources(root: &Utf8Path, set: &SourceSet) -> Result<Stream, SourceError> {
    let files = set
        .resolve(root)?
        .into_par_iter()
        .map(|source| -> Result<_, SourceError> {
            let path = source.path();
            let contents = fs::read(root.join(&path)).map_err(|e| SourceError::Read(path, e))?;
            Ok(FileRecord::new(source.base, source.relative, contents))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stream::new(files))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Stage for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn apply(&self, stream: Stream) -> Stream {
            stream.map(self.name(), |mut file| {
                let text = file.text()?.to_uppercase();
                file.set_text(text);
                Ok(file)
            })
        }
    }

    fn stream() -> Stream {
        Stream::new(vec![
            FileRecord::new("src", "a.txt", "a"),
            FileRecord::new("src", "bad.txt", vec![0xff, 0xfe]),
            FileRecord::new("src", "c.txt", "c"),
        ])
    }

    fn sink() -> (tempfile::TempDir, Utf8PathBuf, Sink) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let sink = Sink::new(root.clone(), Reload::disabled());
        (dir, root, sink)
    }

    #[test]
    fn test_map_keeps_order_and_errors() {
        let out = Upper.apply(stream());
        assert_eq!(out.names(), vec!["a.txt", "c.txt"]);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].path, "src/bad.txt");
        assert_eq!(out.errors[0].stage, "upper");
    }

    #[test]
    fn test_skip_policy_writes_the_rest() {
        let (_dir, root, sink) = sink();
        let drained = Pipeline::new(OnError::Skip)
            .pipe(Upper)
            .write("out")
            .run(stream(), &sink)
            .unwrap();

        assert_eq!(drained.written, vec!["out/a.txt", "out/c.txt"]);
        assert_eq!(drained.errors.len(), 1);
        assert_eq!(fs::read_to_string(root.join("out/a.txt")).unwrap(), "A");
    }

    #[test]
    fn test_abort_policy_stops() {
        let (_dir, root, sink) = sink();
        let result = Pipeline::new(OnError::Abort)
            .pipe(Upper)
            .write("out")
            .run(stream(), &sink);

        assert!(matches!(result, Err(PipelineError::Stage(_))));
        assert!(!root.join("out").exists());
    }

    #[test]
    fn test_unchanged_output_is_not_rewritten() {
        let (_dir, _root, sink) = sink();
        let pipeline = Pipeline::new(OnError::Skip).write("out");

        let first = pipeline.run(Stream::new(vec![FileRecord::new("", "a.txt", "a")]), &sink).unwrap();
        let second = pipeline.run(Stream::new(vec![FileRecord::new("", "a.txt", "a")]), &sink).unwrap();

        assert_eq!(first.changed.len(), 1);
        assert!(second.changed.is_empty());
        assert_eq!(second.written.len(), 1);
    }
}
