//! Shared value types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a record persists in a slot's serialization column
///
/// Either a single identifier or a sequence of identifiers; stored as a
/// plain JSON string or array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ColumnValue {
    /// Build a column value from mounter identifiers; an empty list clears the column
    pub fn from_identifiers(identifiers: Vec<String>) -> Option<Self> {
        if identifiers.is_empty() {
            None
        } else {
            Some(Self::Multiple(identifiers))
        }
    }

    /// Flattened, non-blank identifiers in column order
    pub fn identifiers(&self) -> Vec<String> {
        let all: Vec<&String> = match self {
            Self::Single(s) => vec![s],
            Self::Multiple(list) => list.iter().collect(),
        };
        all.into_iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect()
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        Self::Single(s.to_string())
    }
}

impl From<Vec<String>> for ColumnValue {
    fn from(list: Vec<String>) -> Self {
        Self::Multiple(list)
    }
}

/// Pending removal request for a slot
///
/// Built once from whatever the caller received (form field, API flag) so
/// the remove decision is a plain match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoveFlag {
    #[default]
    Unset,
    True,
    /// Present but explicitly negative (`"0"`, `"false"`, `false`)
    FalseLike,
}

impl RemoveFlag {
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<&str> for RemoveFlag {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::Unset,
            "0" | "false" => Self::FalseLike,
            _ => Self::True,
        }
    }
}

impl From<bool> for RemoveFlag {
    fn from(raw: bool) -> Self {
        if raw {
            Self::True
        } else {
            Self::FalseLike
        }
    }
}

impl From<Option<&str>> for RemoveFlag {
    fn from(raw: Option<&str>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

/// Presentation arguments forwarded to `Uploader::url`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// Named version (e.g. "thumb")
    pub version: Option<String>,
    /// Extra query parameters, forwarded as-is
    pub params: BTreeMap<String, String>,
}

impl UrlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A raw upload handed to `Uploader::cache`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Original filename as sent by the client
    pub filename: String,
    /// Declared content type, if any
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        if !self.filename.contains('.') {
            return None;
        }
        self.filename
            .rsplit('.')
            .next()
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
    }
}
