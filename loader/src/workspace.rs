// workspace.rs — Mod directory loading
//
// Reads a mod's `.sp` files, parses them, and runs the decode driver over
// every block they declare.
//
// Preconditions: `path` names a directory of `.sp` files.
// Postconditions: files are read in file-name order; a file with syntax
//   errors contributes diagnostics but no blocks.
// Failure modes: `LoadError` for I/O problems only; everything inside the
//   mod is reported as diagnostics on the `LoadResult`.
// Side effects: reads the file system.

use std::fs;
use std::path::{Path, PathBuf};

use chumsky::error::Rich;
use chumsky::span::SimpleSpan;
use log::{debug, info};

use crate::ast::{Block, FileId, SourceRange};
use crate::diag::{codes, DiagClass, Diagnostic};
use crate::driver::{decode_mod, LoadOptions, LoadResult};
use crate::error::LoadError;
use crate::lexer::Token;
use crate::parser::parse;
use crate::source::SourceMap;

/// Extension of mod source files.
pub const MOD_FILE_EXTENSION: &str = "sp";

/// A decoded mod together with the sources it was read from.
#[derive(Debug)]
pub struct LoadedMod {
    pub result: LoadResult,
    pub sources: SourceMap,
}

/// Load every `.sp` file directly inside `dir`.
pub fn load_mod_dir(dir: &Path, options: &LoadOptions) -> Result<LoadedMod, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::NotADirectory(dir.to_path_buf()));
    }
    let files = mod_files(dir)?;
    info!(dir = dir.display().to_string(), files = files.len(); "loading mod directory");

    let mut sources = SourceMap::new();
    for path in &files {
        let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        sources.add(name, text);
    }
    Ok(load_sources(sources, options))
}

/// Load a mod held in memory as a single file.
pub fn load_mod_source(name: &str, text: &str, options: &LoadOptions) -> LoadedMod {
    let mut sources = SourceMap::new();
    sources.add(name, text);
    load_sources(sources, options)
}

/// `.sp` files in `dir`, sorted by file name. Subdirectories are not searched.
pub fn mod_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|e| LoadError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LoadError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == MOD_FILE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn load_sources(sources: SourceMap, options: &LoadOptions) -> LoadedMod {
    let mut blocks: Vec<Block> = Vec::new();
    let mut syntax = Vec::new();

    for index in 0..sources.files().len() {
        let file = FileId(index as u32);
        let Some(source) = sources.get(file) else {
            continue;
        };
        let parsed = parse(&source.text, file);
        if !parsed.errors.is_empty() {
            debug!(file = source.name.as_str(), errors = parsed.errors.len(); "syntax errors");
            syntax.extend(parsed.errors.iter().map(|e| syntax_diagnostic(e, file)));
            continue;
        }
        blocks.extend(parsed.blocks.unwrap_or_default());
    }

    let mut result = decode_mod(&blocks, &sources, options);
    if !syntax.is_empty() {
        syntax.append(&mut result.diagnostics);
        result.diagnostics = syntax;
    }
    LoadedMod { result, sources }
}

fn syntax_diagnostic(err: &Rich<'_, Token, SimpleSpan>, file: FileId) -> Diagnostic {
    Diagnostic::error(DiagClass::Syntax, "Syntax error")
        .with_code(codes::E0010)
        .with_detail(err.to_string())
        .with_subject(SourceRange::new(file, *err.span()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoadStatus;
    use crate::resource::ResourceKind;

    fn write(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn reads_sp_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.sp", "query \"second\" {\n  sql = \"b\"\n}\n");
        write(dir.path(), "a.sp", "query \"first\" {\n  sql = \"a\"\n}\n");
        write(dir.path(), "notes.txt", "not a mod file");
        fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "c.sp", "query \"hidden\" {\n  sql = \"c\"\n}\n");

        let loaded = load_mod_dir(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.result.status(), LoadStatus::Clean);
        let names: Vec<&str> = loaded.sources.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.sp", "b.sp"]);
        assert!(loaded.result.tree.lookup(ResourceKind::Query, "hidden").is_none());

        let first = loaded.result.tree.lookup(ResourceKind::Query, "first").unwrap();
        assert_eq!(first.metadata.as_ref().unwrap().file_name, "a.sp");
    }

    #[test]
    fn references_cross_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.sp", "control \"c\" {\n  query = query.q\n}\n");
        write(dir.path(), "b.sp", "query \"q\" {\n  sql = \"select 1\"\n}\n");
        let loaded = load_mod_dir(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.result.status(), LoadStatus::Clean);
        assert_eq!(loaded.result.passes, 2);
    }

    #[test]
    fn syntax_errors_become_diagnostics() {
        let loaded = load_mod_source(
            "broken.sp",
            "query \"q\" {\n  sql = \n",
            &LoadOptions::default(),
        );
        assert!(loaded.result.has_errors());
        let d = &loaded.result.diagnostics[0];
        assert_eq!(d.class, DiagClass::Syntax);
        assert_eq!(d.code, Some(codes::E0010));
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_mod_dir(&dir.path().join("absent"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::NotADirectory(_)));
    }
}
