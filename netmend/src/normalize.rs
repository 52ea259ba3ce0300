//! Canonical form of a running configuration.
//!
//! Raw `show running-config` text is reduced to the lines that carry
//! configuration: comment lines (`!`), banners, blank lines, the capture
//! header lines and the trailing `end` are removed, carriage returns and
//! trailing whitespace are stripped. Leading indentation is kept since it
//! encodes the block structure.
//!
//! Normalizing an already canonical configuration changes nothing.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, Result};

/// Number of leading whitespace characters.
pub fn indent_depth(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// A header line plus the following lines indented deeper than it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    /// The header line, with its indentation.
    pub header: String,
    /// Body lines, with their indentation.
    pub body: Vec<String>,
}

impl ConfigBlock {
    /// Header and body, one line each.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.header.as_str()).chain(self.body.iter().map(String::as_str))
    }

    /// The block as text, header first, newline separated.
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    /// Whether the header declares an interface.
    pub fn is_interface(&self) -> bool {
        self.header.trim_start().starts_with("interface ")
    }

    /// Whether any body line starts with one of `prefixes` (after indentation).
    pub fn body_starts_with_any<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        self.body.iter().any(|line| {
            let line = line.trim_start();
            prefixes.iter().any(|p| line.starts_with(p.as_ref()))
        })
    }
}

impl fmt::Display for ConfigBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// An ordered sequence of normalized configuration lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalConfig {
    lines: Vec<String>,
}

impl CanonicalConfig {
    /// Normalize raw configuration text.
    pub fn from_raw(text: &str) -> Self {
        Self {
            lines: reduce_lines(text.lines()),
        }
    }

    /// The canonical lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether there are no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether `line` occurs verbatim.
    pub fn contains_line(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l == line)
    }

    /// The block whose header line, ignoring indentation, is exactly `header`.
    pub fn get_config_block(&self, header: &str) -> Option<ConfigBlock> {
        let header = header.trim();
        let start = self.lines.iter().position(|l| l.trim() == header)?;
        Some(self.block_at(start))
    }

    /// Every top-level line with its body, in order.
    pub fn blocks(&self) -> impl Iterator<Item = ConfigBlock> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| indent_depth(l) == 0)
            .map(|(i, _)| self.block_at(i))
    }

    fn block_at(&self, start: usize) -> ConfigBlock {
        let header = &self.lines[start];
        let depth = indent_depth(header);
        let body = self.lines[start + 1..]
            .iter()
            .take_while(|l| indent_depth(l) > depth)
            .cloned()
            .collect();
        ConfigBlock {
            header: header.clone(),
            body,
        }
    }

    /// The canonical text, one line per line, newline terminated.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

impl fmt::Display for CanonicalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for CanonicalConfig {
    fn from(text: &str) -> Self {
        Self::from_raw(text)
    }
}

/// A configuration file on disk, normalized in place.
///
/// The file is read whole on [`open`](ConfigFile::open) and only written
/// back by [`rewrite_file`](ConfigFile::rewrite_file).
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl ConfigFile {
    /// Read a configuration file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path).map_err(|source| CaptureError::Artifact {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            lines: text.lines().map(str::to_string).collect(),
        })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reduce the contents to canonical form.
    pub fn reduce_config(&mut self) {
        self.lines = reduce_lines(self.lines.iter().map(String::as_str));
    }

    /// The current lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Text of the block headed by `header`, or an empty string.
    pub fn get_config_block(&self, header: &str) -> String {
        self.canonical()
            .get_config_block(header)
            .map(|b| b.text())
            .unwrap_or_default()
    }

    /// Write the current lines back to the file.
    pub fn rewrite_file(&self) -> Result<()> {
        std::fs::write(&self.path, self.canonical().to_text()).map_err(|source| {
            CaptureError::Artifact {
                path: self.path.clone(),
                source,
            }
            .into()
        })
    }

    /// The canonical configuration.
    pub fn canonical(&self) -> CanonicalConfig {
        CanonicalConfig {
            lines: reduce_lines(self.lines.iter().map(String::as_str)),
        }
    }
}

fn reduce_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out = Vec::new();
    let mut banner_delimiter: Option<String> = None;

    for raw in lines {
        let line = raw.replace('\r', "");
        let line = line.trim_end();

        if let Some(delimiter) = &banner_delimiter {
            if line.contains(delimiter.as_str()) {
                banner_delimiter = None;
            }
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || trimmed.starts_with('!')
            || trimmed.starts_with("Building configuration")
            || trimmed.starts_with("Current configuration")
            || line == "end"
        {
            continue;
        }

        if let Some(rest) = banner_text(trimmed) {
            banner_delimiter = open_banner(rest);
            continue;
        }

        out.push(line.to_string());
    }

    out
}

/// For `banner <kind> <text>`, the text after the kind.
fn banner_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("banner ")?;
    let (_, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Some(text.trim_start())
}

/// The delimiter a multi-line banner ends with, or `None` if the banner
/// closes on its first line.
fn open_banner(text: &str) -> Option<String> {
    let delimiter: String = if text.starts_with("^C") {
        String::from("^C")
    } else {
        text.chars().next()?.to_string()
    };
    let after = &text[delimiter.len()..];
    if after.contains(delimiter.as_str()) {
        None
    } else {
        Some(delimiter)
    }
}
