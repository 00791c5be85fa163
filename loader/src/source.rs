// source.rs — Source file registry
//
// Keeps the text of every loaded file so byte spans can be turned into
// file names and line/column positions, and fingerprints the loaded
// sources for provenance.
//
// Preconditions: spans passed in belong to the file they are looked up in.
// Postconditions: line and column numbers are 1-based.
// Failure modes: none; unknown file ids render as "<unknown>".
// Side effects: none.

use sha2::{Digest, Sha256};

use crate::ast::{FileId, SourceRange};

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(name: String, text: String) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        SourceFile {
            name,
            text,
            line_starts,
        }
    }

    /// 1-based (line, column) of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(name.into(), text.into()));
        id
    }

    pub fn get(&self, file: FileId) -> Option<&SourceFile> {
        self.files.get(file.0 as usize)
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file_name(&self, file: FileId) -> &str {
        self.get(file).map(|f| f.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn line_col(&self, file: FileId, offset: usize) -> (usize, usize) {
        self.get(file).map(|f| f.line_col(offset)).unwrap_or((1, 1))
    }

    /// First and last line covered by a range.
    pub fn line_range(&self, range: SourceRange) -> (usize, usize) {
        let (start, _) = self.line_col(range.file, range.span.start);
        let end_offset = range.span.end.saturating_sub(1).max(range.span.start);
        let (end, _) = self.line_col(range.file, end_offset);
        (start, end)
    }

    /// SHA-256 over every file's name and text, in registration order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(file.text.as_bytes());
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
