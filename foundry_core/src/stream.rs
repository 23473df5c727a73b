//! Property stream abstraction.
//!
//! Preset state is read from named-property streams. The concrete tab-indented
//! text reader lives in [`crate::reader`]; tests and tools can substitute
//! their own implementations.

use std::path::Path;

use anyhow::anyhow;

use crate::module::ModuleId;

/// Marker value that switches a text property into multi-line mode.
pub const MULTI_LINE_TEXT: &str = "MultiLineText";

/// A named-property stream a preset can be read from.
///
/// Properties form a tree: [`advance`](PropertyStream::advance) steps to the
/// next property of the current object and returns `false` once the object
/// ends. Reading a nested object consumes its subtree, after which the outer
/// loop resumes with the following sibling.
pub trait PropertyStream {
    /// Steps to the next property of the current object.
    ///
    /// Returns `Ok(false)` when the current object has ended.
    fn advance(&mut self) -> anyhow::Result<bool>;

    /// Name of the current property.
    fn read_name(&mut self) -> anyhow::Result<String>;

    /// Value of the current property.
    fn read_value(&mut self) -> anyhow::Result<String>;

    /// Source file currently being read.
    fn file_path(&self) -> &Path;

    /// Line number of the current property.
    fn line(&self) -> usize;

    /// Module this stream is reading content for, if any.
    fn module(&self) -> Option<ModuleId>;

    /// Whether preset collisions may overwrite existing entries.
    fn overwrite_allowed(&self) -> bool;

    /// Builds an error tagged with the current source position.
    fn error(&self, message: &str) -> anyhow::Error {
        anyhow!("{}:{}: {}", self.file_path().display(), self.line(), message)
    }
}

/// Reads a text value that may span multiple `AddLine` properties.
///
/// Returns `value` unchanged unless it is the [`MULTI_LINE_TEXT`] marker, in
/// which case the nested lines are joined with blank lines in between.
pub fn read_multi_line_text(
    stream: &mut dyn PropertyStream,
    value: &str,
) -> anyhow::Result<String> {
    if value != MULTI_LINE_TEXT {
        return Ok(value.to_string());
    }
    let mut lines: Vec<String> = Vec::new();
    while stream.advance()? {
        let name = stream.read_name()?;
        if name != "AddLine" {
            return Err(stream.error(&format!(
                "expected AddLine inside a {} block, found \"{}\"",
                MULTI_LINE_TEXT, name
            )));
        }
        lines.push(stream.read_value()?);
    }
    Ok(lines.join("\n\n"))
}

/// Parses a boolean property value. Accepts `1`/`0`, `true`/`false`, `yes`/`no`.
pub fn parse_bool(stream: &dyn PropertyStream, value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(stream.error(&format!("\"{}\" is not a boolean value", value))),
    }
}

/// Parses a numeric property value.
pub fn parse_num<T: std::str::FromStr>(
    stream: &dyn PropertyStream,
    value: &str,
) -> anyhow::Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| stream.error(&format!("\"{}\" is not a valid number", value)))
}
