//! The static configuration document, `themesmith.toml`.
//!
//! The document is read once at start, validated as a whole and then shared
//! read-only with every task. Nothing runs when validation fails.

mod browsers;
mod toggle;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

pub use crate::config::browsers::{parse_browsers, targets};
pub use crate::config::toggle::Toggle;
use crate::error::ConfigError;
use crate::io::{escapes_root, normalize_path};
use crate::sources::SourceSet;
use crate::translate::Keyword;

/// Name of the configuration document at the project root.
pub const CONFIG_FILE: &str = "themesmith.toml";

/// An ordered list of globs. The document may also give a single string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct Sources(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Sources {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(one) => Sources(vec![one]),
            OneOrMany::Many(many) => Sources(many),
        }
    }
}

impl Sources {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_set(&self) -> Result<SourceSet, glob::PatternError> {
        SourceSet::new(&self.0)
    }
}

impl<S: Into<String>> FromIterator<S> for Sources {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Sources(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub style: StyleConfig,
    pub script: ScriptConfig,
    pub translate: TranslateConfig,
    pub image: ImageConfig,
    pub compress: Option<CompressConfig>,
    pub clean: Vec<String>,
    pub watch: WatchConfig,
    pub reload: ReloadConfig,
}

// ******************************
// *           Styles           *
// ******************************

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleConfig {
    pub build: Vec<StyleBuild>,
    pub rtl: Vec<RtlBuild>,
    pub autoprefixer: Autoprefixer,
    pub sass: SassOptions,
    pub mqpacker: MqPackerOptions,
    pub rtlcss: RtlOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleBuild {
    pub src: Sources,
    pub dest: String,
    #[serde(default)]
    pub sourcemaps: Toggle<SourceMapOptions>,
    #[serde(default)]
    pub minify: Toggle<MinifyOptions>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RtlBuild {
    pub src: Sources,
    pub dest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Autoprefixer {
    pub browsers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SassOptions {
    pub output_style: OutputStyle,
    pub include_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqPackerOptions {
    /// Order packed queries mobile-first by their `min-width`.
    pub sort: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RtlOptions {
    pub suffix: String,
    /// Also swap `left`/`right` inside selectors.
    pub auto_rename: bool,
}

impl Default for RtlOptions {
    fn default() -> Self {
        Self {
            suffix: "-rtl".into(),
            auto_rename: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceMapOptions {
    /// Embed the original sources in `sourcesContent`.
    pub include_content: bool,
    pub source_root: Option<String>,
}

impl Default for SourceMapOptions {
    fn default() -> Self {
        Self {
            include_content: true,
            source_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinifyOptions {
    pub suffix: String,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        Self {
            suffix: ".min".into(),
        }
    }
}

// ******************************
// *          Scripts           *
// ******************************

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub bundles: Vec<ScriptBundle>,
    pub minify: Vec<ScriptMinify>,
    pub lint: LintConfig,
    pub tool: ToolConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptBundle {
    pub src: Sources,
    pub dest: String,
    #[serde(default)]
    pub sourcemaps: Toggle<SourceMapOptions>,
    #[serde(default)]
    pub babel: Toggle<BabelOptions>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptMinify {
    pub src: Sources,
    pub dest: String,
    #[serde(default)]
    pub sourcemaps: Toggle<SourceMapOptions>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BabelOptions {
    /// Language level the bundle is lowered to.
    pub target: String,
}

impl Default for BabelOptions {
    fn default() -> Self {
        Self {
            target: "es2015".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    pub src: Sources,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Path or name of the esbuild executable.
    pub esbuild: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            esbuild: "esbuild".into(),
        }
    }
}

// ******************************
// *        Translation         *
// ******************************

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslateConfig {
    /// Gettext keyword specs, `name:1,2c,3d`.
    pub keywords: Vec<String>,
    pub pot: Option<PotConfig>,
    pub textdomain: Option<TextDomainConfig>,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            keywords: crate::translate::DEFAULT_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            pot: None,
            textdomain: None,
        }
    }
}

impl TranslateConfig {
    pub fn keywords(&self) -> Result<Vec<Keyword>, ConfigError> {
        self.keywords
            .iter()
            .map(|spec| spec.parse().map_err(|_| ConfigError::Keyword(spec.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PotConfig {
    pub src: Sources,
    pub dest: String,
    pub domain: String,
    pub package: String,
    #[serde(default)]
    pub bug_report: Option<String>,
    #[serde(default)]
    pub last_translator: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnViolation {
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextDomainConfig {
    pub src: Sources,
    /// Allowed domain or domains.
    pub text_domain: Sources,
    #[serde(default = "yes")]
    pub report_missing: bool,
    #[serde(default = "yes")]
    pub report_variable_domain: bool,
    #[serde(default)]
    pub correct_domain: bool,
    #[serde(default)]
    pub on_violation: OnViolation,
}

fn yes() -> bool {
    true
}

// ******************************
// *       Images & misc        *
// ******************************

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    pub build: Vec<ImageBuild>,
    pub optimizer: OptimizerOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageBuild {
    pub src: Sources,
    pub dest: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerOptions {
    /// Effort from 0 (fastest) to 7 (smallest).
    pub level: u8,
    /// Re-encode JPEG files at this quality. JPEG is left alone when unset.
    pub jpeg_quality: Option<u8>,
    /// Strip comments and whitespace from SVG files.
    pub svg: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            level: 3,
            jpeg_quality: None,
            svg: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressConfig {
    pub filename: String,
    pub src: Sources,
    #[serde(default = "here")]
    pub dest: String,
}

fn here() -> String {
    "./".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub images: Vec<String>,
    /// Quiet period in milliseconds that collapses bursts of events.
    pub debounce: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            css: Vec::new(),
            js: Vec::new(),
            images: Vec::new(),
            debounce: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReloadConfig {
    pub port: u16,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self { port: 35729 }
    }
}

// ******************************
// *         Loading            *
// ******************************

impl Config {
    /// Reads and validates the document at `path`.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        Self::parse(&text)
    }

    /// Parses and validates a document held in memory.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every descriptor before anything runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, build) in self.style.build.iter().enumerate() {
            let section = format!("style.build[{i}]");
            check_sources(&section, &build.src)?;
            check_dest(&section, &build.dest)?;
        }

        for (i, build) in self.style.rtl.iter().enumerate() {
            let section = format!("style.rtl[{i}]");
            check_sources(&section, &build.src)?;
            check_dest(&section, &build.dest)?;
        }

        targets(&self.style.autoprefixer.browsers)?;

        for (i, bundle) in self.script.bundles.iter().enumerate() {
            let section = format!("script.bundles[{i}]");
            check_sources(&section, &bundle.src)?;
            check_dest(&section, &bundle.dest)?;
            if Utf8Path::new(&bundle.dest).file_name().is_none() {
                return Err(ConfigError::EmptyDestination { section });
            }
        }

        for (i, build) in self.script.minify.iter().enumerate() {
            let section = format!("script.minify[{i}]");
            check_sources(&section, &build.src)?;
            check_dest(&section, &build.dest)?;
        }

        check_patterns("script.lint", self.script.lint.src.as_slice())?;

        self.translate.keywords()?;

        if let Some(pot) = &self.translate.pot {
            check_sources("translate.pot", &pot.src)?;
            check_dest("translate.pot", &pot.dest)?;
        }

        if let Some(check) = &self.translate.textdomain {
            check_sources("translate.textdomain", &check.src)?;
            if check.text_domain.is_empty() {
                return Err(ConfigError::EmptySources {
                    section: "translate.textdomain.text_domain".into(),
                });
            }
        }

        for (i, build) in self.image.build.iter().enumerate() {
            let section = format!("image.build[{i}]");
            check_sources(&section, &build.src)?;
            check_dest(&section, &build.dest)?;
        }

        let optimizer = &self.image.optimizer;
        if optimizer.level > 7 {
            return Err(ConfigError::ImageLevel(optimizer.level));
        }
        if let Some(quality) = optimizer.jpeg_quality
            && !(1..=100).contains(&quality)
        {
            return Err(ConfigError::JpegQuality(quality));
        }

        if let Some(compress) = &self.compress {
            check_sources("compress", &compress.src)?;
            check_dest("compress", &compress.dest)?;
            check_dest("compress.filename", &compress.filename)?;
            let archive = Utf8Path::new(&compress.dest).join(compress.filename.trim());
            check_dest("compress.filename", archive.as_str())?;
        }

        check_patterns("clean", &self.clean)?;
        check_patterns("watch.css", &self.watch.css)?;
        check_patterns("watch.js", &self.watch.js)?;
        check_patterns("watch.images", &self.watch.images)?;

        Ok(())
    }
}

/// Resolves a destination from the document against the project root.
pub fn dest_path(dest: &str) -> Utf8PathBuf {
    normalize_path(Utf8Path::new(dest.trim()))
}

fn check_sources(section: &str, sources: &Sources) -> Result<(), ConfigError> {
    if sources.is_empty() || sources.as_slice().iter().all(|s| s.trim().is_empty()) {
        return Err(ConfigError::EmptySources {
            section: section.into(),
        });
    }
    check_patterns(section, sources.as_slice())
}

fn check_patterns(section: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        let raw = pattern.strip_prefix('!').unwrap_or(pattern);
        glob::Pattern::new(raw).map_err(|source| ConfigError::Pattern {
            section: section.into(),
            pattern: pattern.clone(),
            source,
        })?;
    }
    Ok(())
}

fn check_dest(section: &str, dest: &str) -> Result<(), ConfigError> {
    if dest.trim().is_empty() {
        return Err(ConfigError::EmptyDestination {
            section: section.into(),
        });
    }
    if escapes_root(&dest_path(dest)) {
        return Err(ConfigError::OutsideRoot {
            section: section.into(),
            dest: dest.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
        clean = ["**/*.map", "**/*.min.css"]

        [style]
        autoprefixer = { browsers = ["Chrome >= 20", "Safari >= 6"] }

        [[style.build]]
        src = "./assets/sass/style.scss"
        dest = "./"
        sourcemaps = true
        minify = { suffix = ".pack" }

        [[style.build]]
        src = "./assets/sass/editor-style.scss"
        dest = "./assets/css"

        [[style.rtl]]
        src = "./style.css"
        dest = "./"

        [[script.bundles]]
        src = ["./assets/js/a.js", "./assets/js/b.js"]
        dest = "./assets/js/bundle.js"
        babel = true

        [translate.pot]
        src = ["**/*.php"]
        dest = "languages/theme.pot"
        domain = "theme"
        package = "Theme"
    "#;

    #[test]
    fn test_parse_document() {
        let config = Config::parse(DOCUMENT).unwrap();

        let main = &config.style.build[0];
        assert_eq!(main.src.as_slice(), ["./assets/sass/style.scss"]);
        assert_eq!(main.sourcemaps, Toggle::EnabledDefault);
        assert_eq!(
            main.minify.options(),
            Some(MinifyOptions {
                suffix: ".pack".into()
            })
        );

        let editor = &config.style.build[1];
        assert!(!editor.sourcemaps.is_enabled());
        assert!(!editor.minify.is_enabled());

        let bundle = &config.script.bundles[0];
        assert_eq!(bundle.babel.options(), Some(BabelOptions::default()));
        assert!(!bundle.sourcemaps.is_enabled());

        assert_eq!(config.translate.keywords().unwrap().len(), crate::translate::DEFAULT_KEYWORDS.len());
        assert!(config.compress.is_none());
        assert_eq!(config.watch.debounce, 2000);
    }

    #[test]
    fn test_missing_required_field() {
        let err = Config::parse("[[style.build]]\nsrc = \"a.scss\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_sources() {
        let err = Config::parse("[[image.build]]\nsrc = []\ndest = \"./\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptySources { section } if section == "image.build[0]"));
    }

    #[test]
    fn test_empty_destination() {
        let err = Config::parse("[[style.rtl]]\nsrc = \"style.css\"\ndest = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDestination { .. }));
    }

    #[test]
    fn test_destination_outside_root() {
        for document in [
            "[[style.build]]\nsrc = \"a.scss\"\ndest = \"../parent-theme\"\n",
            "[[image.build]]\nsrc = \"*.png\"\ndest = \"assets/../../x\"\n",
            "[translate.pot]\nsrc = \"*.php\"\ndest = \"/tmp/theme.pot\"\ndomain = \"t\"\npackage = \"T\"\n",
            "[compress]\nfilename = \"../theme.zip\"\nsrc = \"**/*\"\n",
        ] {
            let err = Config::parse(document).unwrap_err();
            assert!(matches!(err, ConfigError::OutsideRoot { .. }), "{document}");
        }

        assert!(Config::parse("[[style.rtl]]\nsrc = \"style.css\"\ndest = \"./assets/../\"\n").is_ok());
    }

    #[test]
    fn test_destination_must_be_a_string() {
        let err = Config::parse("[[style.rtl]]\nsrc = \"style.css\"\ndest = [\"a\", \"b\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_level_out_of_range() {
        let err = Config::parse("[image.optimizer]\nlevel = 9\n").unwrap_err();
        assert!(matches!(err, ConfigError::ImageLevel(9)));
    }

    #[test]
    fn test_bad_keyword() {
        let err = Config::parse("[translate]\nkeywords = [\"__:x\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Keyword(_)));
    }

    #[test]
    fn test_dest_path() {
        assert_eq!(dest_path("./"), "");
        assert_eq!(dest_path("./assets/js/"), "assets/js");
    }
}
