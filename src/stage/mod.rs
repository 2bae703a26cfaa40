//! Concrete [`Stage`](crate::stream::Stage) implementations. Each one wraps a
//! single delegate tool or a small file-stream utility.

mod css;
mod image;
mod rtl;
mod sass;
mod script;
mod util;

pub use css::{MinifyCss, PackMediaQueries, Prefix};
pub use self::image::OptimizeImage;
pub use rtl::{FlipDirection, flip_css};
pub use sass::Sass;
pub use script::{Diagnostic, Esbuild, MinifyJs, ScriptTool, Severity, Transpile};
pub use util::{Concat, Filter, InitMaps, LineEndings, Rename, WriteMaps};
