//! Tab-indented content text reader.
//!
//! The content format is a tree of `Name = Value` lines where nesting depth
//! is given by leading tabs. `//` starts a comment that runs to the end of
//! the line. `IncludeFile = path` splices another file into the stream at the
//! include line's depth, with the path resolved against the data root.
//!
//! The reader reports object endings through [`PropertyStream::advance`]:
//! a line that dedents by N levels first yields N `false` results, one per
//! object being closed, before the line itself becomes current.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::module::ModuleId;
use crate::stream::PropertyStream;

/// Property name that splices another file into the stream.
pub const INCLUDE_FILE: &str = "IncludeFile";

/// Deepest chain of nested includes tolerated before assuming a cycle.
const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone)]
struct RawLine {
    indent: usize,
    name: String,
    value: String,
    line_no: usize,
}

struct FileFrame {
    path: PathBuf,
    lines: Vec<RawLine>,
    cursor: usize,
    /// Added to every line's indent so included files nest at the depth of
    /// the line that included them.
    indent_offset: usize,
}

/// [`PropertyStream`] over tab-indented content text.
pub struct TextReader {
    frames: Vec<FileFrame>,
    data_root: PathBuf,
    module: Option<ModuleId>,
    overwrite_allowed: bool,
    prev_indent: usize,
    pending_ends: usize,
    stashed: Option<RawLine>,
    finished: bool,
    current_name: String,
    current_value: String,
    current_path: PathBuf,
    current_line: usize,
}

impl TextReader {
    /// Opens a content file. The data root defaults to the file's directory.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("open content file {}", path.display()))?;
        let data_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(TextReader::from_parts(
            tokenize(&text),
            path.to_path_buf(),
            data_root,
        ))
    }

    /// Reads content from a string. Includes resolve against `.` unless a
    /// data root is set.
    pub fn from_str(text: &str) -> Self {
        TextReader::from_parts(tokenize(text), PathBuf::from("<inline>"), PathBuf::from("."))
    }

    fn from_parts(lines: Vec<RawLine>, path: PathBuf, data_root: PathBuf) -> Self {
        TextReader {
            current_path: path.clone(),
            frames: vec![FileFrame {
                path,
                lines,
                cursor: 0,
                indent_offset: 0,
            }],
            data_root,
            module: None,
            overwrite_allowed: false,
            prev_indent: 0,
            pending_ends: 0,
            stashed: None,
            finished: false,
            current_name: String::new(),
            current_value: String::new(),
            current_line: 0,
        }
    }

    /// Sets the directory include paths are resolved against.
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }

    /// Tags the stream with the module its content belongs to.
    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }

    /// Sets whether preset collisions read from this stream may overwrite.
    pub fn with_overwrite(mut self, allowed: bool) -> Self {
        self.overwrite_allowed = allowed;
        self
    }

    /// Pulls the next raw line, splicing include files and popping exhausted
    /// ones along the way.
    fn next_line(&mut self) -> anyhow::Result<Option<RawLine>> {
        if let Some(line) = self.stashed.take() {
            return Ok(Some(line));
        }
        loop {
            let fetched = match self.frames.last_mut() {
                None => return Ok(None),
                Some(frame) => {
                    if frame.cursor < frame.lines.len() {
                        let mut line = frame.lines[frame.cursor].clone();
                        frame.cursor += 1;
                        line.indent += frame.indent_offset;
                        Some((line, frame.path.clone()))
                    } else {
                        None
                    }
                }
            };
            match fetched {
                None => {
                    self.frames.pop();
                }
                Some((line, path)) => {
                    if line.name == INCLUDE_FILE {
                        self.push_include(&line, &path)?;
                        continue;
                    }
                    self.current_path = path;
                    return Ok(Some(line));
                }
            }
        }
    }

    fn push_include(&mut self, line: &RawLine, from: &Path) -> anyhow::Result<()> {
        if self.frames.len() >= MAX_INCLUDE_DEPTH {
            bail!(
                "{}:{}: includes nested deeper than {} files, likely a cycle",
                from.display(),
                line.line_no,
                MAX_INCLUDE_DEPTH
            );
        }
        let full = self.data_root.join(&line.value);
        let text = fs::read_to_string(&full).with_context(|| {
            format!(
                "{}:{}: include \"{}\"",
                from.display(),
                line.line_no,
                line.value
            )
        })?;
        self.frames.push(FileFrame {
            path: full,
            lines: tokenize(&text),
            cursor: 0,
            indent_offset: line.indent,
        });
        Ok(())
    }
}

impl PropertyStream for TextReader {
    fn advance(&mut self) -> anyhow::Result<bool> {
        if self.finished {
            return Ok(false);
        }
        if self.pending_ends > 0 {
            self.pending_ends -= 1;
            return Ok(false);
        }
        let line = match self.next_line()? {
            Some(line) => line,
            None => {
                self.finished = true;
                return Ok(false);
            }
        };
        if line.indent < self.prev_indent {
            // One object ends now; the rest are owed before the line is seen.
            self.pending_ends = self.prev_indent - line.indent - 1;
            self.prev_indent = line.indent;
            self.stashed = Some(line);
            return Ok(false);
        }
        self.prev_indent = line.indent;
        self.current_name = line.name;
        self.current_value = line.value;
        self.current_line = line.line_no;
        Ok(true)
    }

    fn read_name(&mut self) -> anyhow::Result<String> {
        Ok(self.current_name.clone())
    }

    fn read_value(&mut self) -> anyhow::Result<String> {
        Ok(self.current_value.clone())
    }

    fn file_path(&self) -> &Path {
        &self.current_path
    }

    fn line(&self) -> usize {
        self.current_line
    }

    fn module(&self) -> Option<ModuleId> {
        self.module
    }

    fn overwrite_allowed(&self) -> bool {
        self.overwrite_allowed
    }
}

fn tokenize(text: &str) -> Vec<RawLine> {
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let indent = raw.chars().take_while(|c| *c == '\t').count();
        let mut content = &raw[indent..];
        if let Some(pos) = find_comment(content) {
            content = &content[..pos];
        }
        let content = content.trim();
        if content.is_empty() || content.starts_with("//") {
            continue;
        }
        let (name, value) = match content.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
            None => (content.to_string(), String::new()),
        };
        lines.push(RawLine {
            indent,
            name,
            value,
            line_no: idx + 1,
        });
    }
    lines
}

fn find_comment(content: &str) -> Option<usize> {
    match (content.find(" //"), content.find("\t//")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
