// modload — mod loader
//
// Library root. Source flows lexer → parser → schema validation → the
// multi-pass decode driver, which produces a reference-resolved resource
// tree plus a diagnostic log.

pub mod ast;
pub mod config;
pub mod decode;
pub mod diag;
pub mod driver;
pub mod error;
pub mod eval;
pub mod id;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod references;
pub mod render;
pub mod resource;
pub mod schema;
pub mod source;
pub mod tracker;
pub mod tree;
pub mod types;
pub mod value;
pub mod workspace;

pub use driver::{decode_mod, LoadOptions, LoadResult, LoadStatus};
pub use workspace::{load_mod_dir, load_mod_source, LoadedMod};
