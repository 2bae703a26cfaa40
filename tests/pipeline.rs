use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use themesmith::stage::{Diagnostic, ScriptTool, Severity};
use themesmith::{Command, TaskState, Theme, ToolError};

/// Stands in for esbuild so the tests don't need a JavaScript toolchain.
struct FakeTool;

impl ScriptTool for FakeTool {
    fn lint(&self, _: &Utf8Path, code: &str) -> Result<Vec<Diagnostic>, ToolError> {
        Ok(code
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains("debugger"))
            .map(|(i, _)| Diagnostic {
                severity: Severity::Warning,
                line: Some(i + 1),
                column: Some(0),
                message: "forgotten debugger statement".into(),
            })
            .collect())
    }

    fn transpile(&self, _: &Utf8Path, code: &str, _: &str) -> Result<String, ToolError> {
        Ok(code.replace("const ", "var "))
    }

    fn minify(&self, _: &Utf8Path, code: &str) -> Result<String, ToolError> {
        Ok(code.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

const CONFIG: &str = r#"
clean = [
    "**/*.map",
    "**/*.min.css",
    "*-rtl.css",
    "assets/js/bundle.js",
    "assets/js/*.min.js",
    "!assets/js/vendor.min.js",
]

[style]
autoprefixer = { browsers = ["Chrome >= 20", "Safari >= 6"] }

[[style.build]]
src = "./assets/sass/style.scss"
dest = "./"
sourcemaps = true
minify = true

[[style.rtl]]
src = "./style.css"
dest = "./"

[[script.bundles]]
src = ["./assets/js/src/first.js", "./assets/js/src/second.js", "./assets/js/src/third.js"]
dest = "./assets/js/bundle.js"
babel = true

[[script.minify]]
src = ["./assets/js/x.js", "./assets/js/y.js"]
dest = "./assets/js/"

[script.lint]
src = ["./assets/js/src/*.js"]

[translate.textdomain]
src = ["**/*.php"]
text_domain = "theme"

[translate.pot]
src = ["**/*.php"]
dest = "languages/theme.pot"
domain = "theme"
package = "Theme"

[image.optimizer]
level = 2

[[image.build]]
src = ["./assets/images/*"]
dest = "./assets/images/"

[compress]
filename = "theme.zip"
src = ["**/*", "!assets/sass/**"]
"#;

const STYLE: &str = "\
$gap: 4px;
.menu { margin-left: $gap; float: left; }
@media (min-width: 600px) { .menu { padding-left: $gap; } }
";

fn project(style: &str) -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();

    let files = [
        ("themesmith.toml", CONFIG),
        ("assets/sass/style.scss", style),
        ("assets/sass/_partial.scss", ".unused { color: red; }\n"),
        // Written in reverse so the listing order differs from the declared one.
        ("assets/js/src/third.js", "const third = 'C';\n"),
        ("assets/js/src/second.js", "const second = 'B';\ndebugger;\n"),
        ("assets/js/src/first.js", "const first = 'A';\n"),
        ("assets/js/x.js", "var x = 1;\n\nx += 1;\n"),
        ("assets/js/y.js", "var y = 2;\n"),
        ("assets/js/vendor.min.js", "var v=0;\n"),
        ("assets/images/icon.svg", "<svg viewBox=\"0 0 1 1\">\n  <!-- c -->\n  <path d=\"M0 0\"/>\n</svg>\n"),
        ("index.php", "<?php\n// translators: shown on the front page\necho __( 'Hello', 'theme' );\n_e( 'Bye', 'other' );\n"),
        ("inc/footer.php", "<?php esc_html_e( 'Hello', 'theme' ); ?>\n"),
        (".gitignore", "node_modules\n"),
    ];

    for (path, contents) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    (dir, root)
}

fn open(root: &Utf8Path) -> Theme {
    Theme::open(root).unwrap().with_tools(FakeTool)
}

fn read(root: &Utf8Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap_or_else(|e| panic!("{path}: {e}"))
}

#[test]
fn default_command_builds_everything() {
    let (_dir, root) = project(STYLE);
    let report = open(&root).run(Command::Default).unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.outcomes.len(), 9);

    // Styles
    let css = read(&root, "style.css");
    assert!(css.contains("margin-left: 4px"));
    assert!(css.ends_with("/*# sourceMappingURL=style.css.map */\n"));
    assert!(!css.contains("unused"));
    assert!(root.join("style.css.map").is_file());
    assert!(root.join("style.min.css").is_file());
    assert!(!root.join("_partial.css").exists());

    let rtl = read(&root, "style-rtl.css");
    assert!(rtl.contains("margin-right: 4px"));
    assert!(rtl.contains("float: right"));
    assert!(!rtl.contains("sourceMappingURL"));
    assert!(root.join("style-rtl.min.css").is_file());

    // Scripts
    assert!(root.join("assets/js/x.min.js").is_file());
    assert!(root.join("assets/js/y.min.js").is_file());

    // Images
    assert_eq!(
        read(&root, "assets/images/icon.svg"),
        "<svg viewBox=\"0 0 1 1\"><path d=\"M0 0\"/></svg>"
    );

    // Translations
    let pot = read(&root, "languages/theme.pot");
    assert!(pot.contains("#. translators: shown on the front page\n"));
    assert!(pot.contains("#: inc/footer.php:1 index.php:3\nmsgid \"Hello\"\n"));
    assert!(!pot.contains("Bye"));

    // Package
    let archive = zip::ZipArchive::new(fs::File::open(root.join("theme.zip")).unwrap()).unwrap();
    let mut names: Vec<_> = archive.file_names().collect();
    names.sort();
    assert!(names.contains(&"style.css"));
    assert!(names.contains(&"style-rtl.min.css"));
    assert!(names.contains(&"languages/theme.pot"));
    assert!(names.contains(&"assets/js/bundle.js"));
    assert!(!names.iter().any(|n| n.ends_with(".map")));
    assert!(!names.iter().any(|n| n.starts_with("assets/sass")));
    assert!(!names.contains(&".gitignore"));
    assert!(!names.contains(&"theme.zip"));
}

#[test]
fn stylesheet_syntax_error_skips_dependents() {
    let (_dir, root) = project(".menu { color: red;\n");
    let report = open(&root).run(Command::Default).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.state("styles-build"), Some(TaskState::Failed));
    assert_eq!(report.state("styles-rtl"), Some(TaskState::Skipped));
    assert_eq!(report.state("compress"), Some(TaskState::Skipped));

    // Unrelated chains still ran.
    assert_eq!(report.state("js-minify"), Some(TaskState::Succeeded));
    assert_eq!(report.state("build-pot"), Some(TaskState::Succeeded));
    assert_eq!(report.state("image"), Some(TaskState::Succeeded));

    assert!(!root.join("style.css").exists());
    assert!(!root.join("style-rtl.css").exists());
    assert!(!root.join("theme.zip").exists());
}

#[test]
fn bundle_keeps_declared_order() {
    let (_dir, root) = project(STYLE);
    let report = open(&root).run(Command::JsBundle).unwrap();
    assert!(report.is_success(), "{report}");
    assert_eq!(report.state("js-lint"), Some(TaskState::Succeeded));

    let bundle = read(&root, "assets/js/bundle.js");
    let a = bundle.find("var first = 'A'").unwrap();
    let b = bundle.find("var second = 'B'").unwrap();
    let c = bundle.find("var third = 'C'").unwrap();
    assert!(a < b && b < c);
    assert!(!bundle.contains("const "));
    assert!(!root.join("assets/js/bundle.js.map").exists());
}

#[test]
fn minify_keeps_files_apart() {
    let (_dir, root) = project(STYLE);
    let report = open(&root).run(Command::JsMinify).unwrap();
    assert!(report.is_success(), "{report}");

    assert_eq!(read(&root, "assets/js/x.min.js"), "var x = 1; x += 1;");
    assert_eq!(read(&root, "assets/js/y.min.js"), "var y = 2;");
    assert!(!root.join("assets/js/x.y.min.js").exists());
}

#[test]
fn pot_is_byte_identical_across_runs() {
    let (_dir, root) = project(STYLE);
    let theme = open(&root);

    assert!(theme.run(Command::Translate).unwrap().is_success());
    let first = fs::read(root.join("languages/theme.pot")).unwrap();

    assert!(theme.run(Command::Translate).unwrap().is_success());
    let second = fs::read(root.join("languages/theme.pot")).unwrap();

    assert_eq!(first, second);
}

#[test]
fn text_domain_violations_can_fail_the_chain() {
    let (_dir, root) = project(STYLE);
    let config = read(&root, "themesmith.toml").replace(
        "text_domain = \"theme\"",
        "text_domain = \"theme\"\non_violation = \"fail\"",
    );
    fs::write(root.join("themesmith.toml"), config).unwrap();

    let report = open(&root).run(Command::Translate).unwrap();
    assert_eq!(report.state("check-text-domain"), Some(TaskState::Failed));
    assert_eq!(report.state("build-pot"), Some(TaskState::Skipped));
    assert!(!root.join("languages/theme.pot").exists());
}

#[test]
fn clean_is_exact_and_idempotent() {
    let (_dir, root) = project(STYLE);
    let theme = open(&root);
    assert!(theme.run(Command::Default).unwrap().is_success());

    assert!(theme.run(Command::Clean).unwrap().is_success());

    for gone in [
        "style.css.map",
        "style.min.css",
        "style-rtl.css",
        "style-rtl.min.css",
        "assets/js/bundle.js",
        "assets/js/x.min.js",
        "assets/js/y.min.js",
    ] {
        assert!(!root.join(gone).exists(), "{gone} survived");
    }

    for kept in [
        "style.css",
        "assets/js/vendor.min.js",
        "assets/js/x.js",
        "languages/theme.pot",
        "theme.zip",
        "index.php",
    ] {
        assert!(root.join(kept).exists(), "{kept} was deleted");
    }

    let report = theme.run(Command::Clean).unwrap();
    assert!(report.is_success());
    assert!(root.join("style.css").exists());
}

#[test]
fn broken_configuration_stops_everything() {
    let (_dir, root) = project(STYLE);
    fs::write(
        root.join("themesmith.toml"),
        "[[style.build]]\nsrc = []\ndest = \"./\"\n",
    )
    .unwrap();

    assert!(matches!(Theme::open(&root), Err(themesmith::ThemeError::Config(_))));
}

fn encode_png(img: &image::RgbImage) -> Vec<u8> {
    use image::ImageEncoder;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::NoFilter)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn encode_jpeg(img: &image::RgbImage) -> Vec<u8> {
    use image::ImageEncoder;
    use image::codecs::jpeg::JpegEncoder;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 100)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn encode_gif(frames: usize) -> Vec<u8> {
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        let frames = (0..frames).map(|i| {
            let shade = 40 * i as u8;
            Frame::new(RgbaImage::from_pixel(16, 16, Rgba([shade, 90, 200, 255])))
        });
        encoder.encode_frames(frames).unwrap();
    }
    out
}

#[test]
fn raster_images_are_optimized_in_place() {
    use image::AnimationDecoder;
    use image::codecs::gif::GifDecoder;

    let (_dir, root) = project(STYLE);
    let config = read(&root, "themesmith.toml").replace("level = 2", "level = 7\njpeg_quality = 40");
    fs::write(root.join("themesmith.toml"), config).unwrap();

    let gradient = image::RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
    let png = encode_png(&gradient);
    let jpeg = encode_jpeg(&gradient);
    let gif = encode_gif(2);
    fs::write(root.join("assets/images/a.png"), &png).unwrap();
    fs::write(root.join("assets/images/b.jpg"), &jpeg).unwrap();
    fs::write(root.join("assets/images/c.gif"), &gif).unwrap();

    let report = open(&root).run(Command::Image).unwrap();
    assert!(report.is_success(), "{report}");

    // Lossless: same pixels, fewer bytes.
    let optimized = fs::read(root.join("assets/images/a.png")).unwrap();
    assert!(optimized.len() < png.len());
    assert_eq!(image::load_from_memory(&optimized).unwrap().to_rgb8(), gradient);

    let optimized = fs::read(root.join("assets/images/b.jpg")).unwrap();
    assert!(optimized.len() < jpeg.len());
    let decoded = image::load_from_memory(&optimized).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 64));

    let optimized = fs::read(root.join("assets/images/c.gif")).unwrap();
    assert!(optimized.len() <= gif.len());
    let frames = GifDecoder::new(std::io::Cursor::new(optimized))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(frames.len(), 2);
}

#[test]
fn negated_patterns_do_not_reach_into_subdirectories() {
    let (_dir, root) = project(STYLE);
    let config = read(&root, "themesmith.toml").replace("\"!assets/sass/**\"", "\"!assets/sass/*.scss\"");
    fs::write(root.join("themesmith.toml"), config).unwrap();

    for path in ["assets/js/lib/keep.min.js", "assets/sass/vendor/_reset.scss"] {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, "x").unwrap();
    }

    let theme = open(&root);
    assert!(theme.run(Command::Compress).unwrap().is_success());

    let archive = zip::ZipArchive::new(fs::File::open(root.join("theme.zip")).unwrap()).unwrap();
    let names: Vec<_> = archive.file_names().collect();
    assert!(!names.contains(&"assets/sass/style.scss"));
    assert!(names.contains(&"assets/sass/vendor/_reset.scss"));

    assert!(theme.run(Command::Clean).unwrap().is_success());
    // `assets/js/*.min.js` stops at its own directory.
    assert!(root.join("assets/js/lib/keep.min.js").is_file());
}

#[test]
fn relative_root_is_made_absolute() {
    let theme = Theme::new("tests/../src", themesmith::Config::parse("").unwrap()).unwrap();
    assert!(theme.root().is_absolute());
    assert!(theme.root().ends_with("src"));
    assert!(theme.root().join("lib.rs").is_file());
}
