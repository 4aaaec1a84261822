use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, raw: String },
    Other(String),
}

/// A `.env` file that can be edited without losing comments or ordering.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<Line>,
}

fn entry_key(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, _) = trimmed.split_once('=')?;
    let key = key.trim();
    is_valid_key(key).then(|| key.to_string())
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_value(raw: &str) -> Option<String> {
    match dotenvy::from_read_iter(raw.as_bytes()).next()? {
        Ok((_, value)) => Some(value),
        Err(err) => {
            debug!("Could not parse env line <{}>: {}", raw, err);
            None
        }
    }
}

fn is_plain(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_./:,=+-@%".contains(c))
}

fn format_value(value: &str) -> String {
    if is_plain(value) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '$' => quoted.push_str("\\$"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl EnvFile {
    /// A missing file loads as empty and is created by `save`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Error reading <{}>", path.display()))
            }
        };
        let lines = content
            .lines()
            .map(|line| match entry_key(line) {
                Some(key) => Line::Entry {
                    key,
                    raw: line.to_string(),
                },
                None => Line::Other(line.to_string()),
            })
            .collect();
        Ok(EnvFile { path, lines })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, raw } if k == key => parse_value(raw),
            _ => None,
        })
    }

    pub fn keys(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, .. } => Some(key.as_str()),
                Line::Other(_) => None,
            })
            .collect()
    }

    /// Replaces the first assignment of `key` in place, or appends one.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !is_valid_key(key) {
            return Err(anyhow!("Invalid environment variable name <{}>", key));
        }
        let raw = format!("{}={}", key, format_value(value));
        let existing = self.lines.iter_mut().find_map(|line| match line {
            Line::Entry { key: k, raw } if k == key => Some(raw),
            _ => None,
        });
        match existing {
            Some(existing) => *existing = raw,
            None => self.lines.push(Line::Entry {
                key: key.to_string(),
                raw,
            }),
        }
        Ok(())
    }

    /// Removes every assignment of `key`. Returns whether one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));
        before != self.lines.len()
    }

    pub fn save(&self) -> Result<()> {
        let mut content = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Entry { raw, .. } | Line::Other(raw) => raw.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        content.push('\n');
        fs::write(&self.path, content)
            .with_context(|| format!("Error writing <{}>", self.path.display()))?;
        debug!("Wrote <{}>", self.path.display());
        Ok(())
    }
}
