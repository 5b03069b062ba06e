use crate::task::{cycle_line, MarkerCycle};
use ropey::Rope;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    Lf,
    CrLf,
}

impl Eol {
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub lines: Vec<String>,
    pub eol: Eol,
}

impl Snapshot {
    pub fn from_text(text: &str) -> Self {
        let eol = Eol::detect(text);
        let lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        Self { lines, eol }
    }

    pub fn to_text(&self) -> String {
        self.lines.join(self.eol.as_str())
    }
}

pub trait LineBuffer {
    fn line_count(&self) -> usize;
    /// Line text without its line ending.
    fn line_text(&self, index: usize) -> Option<String>;
    /// Replaces the line text, keeping its line ending.
    fn set_line(&mut self, index: usize, text: &str);
}

impl LineBuffer for Vec<String> {
    fn line_count(&self) -> usize {
        self.len()
    }

    fn line_text(&self, index: usize) -> Option<String> {
        self.get(index).cloned()
    }

    fn set_line(&mut self, index: usize, text: &str) {
        if let Some(line) = self.get_mut(index) {
            *line = text.to_string();
        }
    }
}

fn line_content_end(rope: &Rope, index: usize) -> usize {
    let start = rope.line_to_char(index);
    let slice = rope.line(index);
    let mut len = slice.len_chars();
    if len > 0 && slice.char(len - 1) == '\n' {
        len -= 1;
        if len > 0 && slice.char(len - 1) == '\r' {
            len -= 1;
        }
    }
    start + len
}

impl LineBuffer for Rope {
    fn line_count(&self) -> usize {
        self.len_lines()
    }

    fn line_text(&self, index: usize) -> Option<String> {
        if index >= self.len_lines() {
            return None;
        }
        let start = self.line_to_char(index);
        let end = line_content_end(self, index);
        Some(self.slice(start..end).to_string())
    }

    fn set_line(&mut self, index: usize, text: &str) {
        if index >= self.len_lines() {
            return;
        }
        let start = self.line_to_char(index);
        let end = line_content_end(self, index);
        self.remove(start..end);
        self.insert(start, text);
    }
}

pub trait DocumentStore {
    fn read_whole(&self) -> Result<String, EditError>;
    fn write_whole(&self, text: &str) -> Result<(), EditError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileStore {
    fn read_whole(&self) -> Result<String, EditError> {
        fs::read_to_string(&self.path).map_err(|source| EditError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn write_whole(&self, text: &str) -> Result<(), EditError> {
        fs::write(&self.path, text).map_err(|source| EditError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn apply_live<B: LineBuffer + ?Sized>(
    buffer: &mut B,
    index: usize,
    cycle: &MarkerCycle,
) -> Option<String> {
    let current = buffer.line_text(index)?;
    let updated = cycle_line(&current, cycle)?;
    if updated == current {
        return None;
    }
    buffer.set_line(index, &updated);
    info!(line = index, text = %updated, "cycled task marker in buffer");
    Some(updated)
}

pub fn apply_whole_file<D: DocumentStore + ?Sized>(
    store: &D,
    index: usize,
    cycle: &MarkerCycle,
) -> Result<Option<String>, EditError> {
    let mut snapshot = Snapshot::from_text(&store.read_whole()?);
    write_cycled(store, &mut snapshot, index, cycle)
}

pub fn write_cycled<D: DocumentStore + ?Sized>(
    store: &D,
    snapshot: &mut Snapshot,
    index: usize,
    cycle: &MarkerCycle,
) -> Result<Option<String>, EditError> {
    let Some(updated) = apply_live(&mut snapshot.lines, index, cycle) else {
        return Ok(None);
    };
    store.write_whole(&snapshot.to_text())?;
    info!(line = index, "persisted task marker change");
    Ok(Some(updated))
}
