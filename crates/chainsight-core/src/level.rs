//! Dotted level addressing.
//!
//! A span's position in the call tree is given by its `parent_level` (a dotted
//! path, empty for spans hanging off the trace entry) and its `level_id` (the
//! index among its siblings). The canonical path joins both: `"0.1" + 2` is
//! `"0.1.2"`, and `"" + 0` is `"0"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A level path segment could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid level path {path:?}: segment {segment:?} is not a non-negative integer")]
pub struct LevelError {
    pub path: String,
    pub segment: String,
}

/// Canonical textual path for a `(parent_level, level_id)` pair.
///
/// Used as the sort key before tree construction; the comparison is on the
/// string, so `"0.10"` orders before `"0.2"`.
pub fn canonical_level(parent_level: &str, level_id: u32) -> String {
    if parent_level.trim().is_empty() {
        level_id.to_string()
    } else {
        format!("{}.{}", parent_level, level_id)
    }
}

/// Parsed sequence of non-negative level segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LevelPath(Vec<u32>);

impl LevelPath {
    /// The path of the trace entry span.
    pub fn root() -> Self {
        Self(vec![0])
    }

    /// Parses a dotted path. An empty (or blank) string is the empty path.
    pub fn parse(path: &str) -> Result<Self, LevelError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        trimmed
            .split('.')
            .map(|segment| {
                segment.parse::<u32>().map_err(|_| LevelError {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Full path of a span: its parent path extended by its own level id.
    pub fn of(parent_level: &str, level_id: u32) -> Result<Self, LevelError> {
        Ok(Self::parse(parent_level)?.child(level_id))
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.0 == [0]
    }

    /// Index among siblings (the trailing segment).
    pub fn level_id(&self) -> Option<u32> {
        self.0.last().copied()
    }

    /// Path of the enclosing level, `None` for the empty path.
    pub fn parent(&self) -> Option<LevelPath> {
        self.0
            .split_last()
            .map(|(_, init)| LevelPath(init.to_vec()))
    }

    pub fn child(&self, level_id: u32) -> LevelPath {
        let mut segments = self.0.clone();
        segments.push(level_id);
        LevelPath(segments)
    }

    /// Same parent, different trailing index.
    pub fn sibling(&self, level_id: u32) -> LevelPath {
        let mut segments = self.0.clone();
        match segments.last_mut() {
            Some(last) => *last = level_id,
            None => segments.push(level_id),
        }
        LevelPath(segments)
    }
}

impl fmt::Display for LevelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for LevelPath {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LevelPath {
    type Error = LevelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LevelPath> for String {
    fn from(path: LevelPath) -> Self {
        path.to_string()
    }
}
