//! Hierarchical project paths.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted textual path
pub const MAX_PATH_LENGTH: usize = 2048;

/// Dot-delimited, lower-cased project identifier such as `org.boost.asio`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectPath {
    elements: Vec<String>,
}

/// Root namespace of a project path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `org`
    Organization,
    /// `pvt`
    Private,
    /// `com`
    Commercial,
    /// `loc`, present only on the local filesystem
    Local,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Project path is too long ({length} characters, must be <= 2048)")]
    TooLong { length: usize },

    #[error("Bad symbol '{symbol}' in project path '{path}'")]
    InvalidSymbol { path: String, symbol: char },

    #[error("Empty element in project path '{path}'")]
    EmptyElement { path: String },
}

impl ProjectPath {
    /// Parse and normalize a path
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.len() > MAX_PATH_LENGTH {
            return Err(PathError::TooLong {
                length: input.len(),
            });
        }
        if let Some(symbol) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_'))
        {
            return Err(PathError::InvalidSymbol {
                path: input.to_string(),
                symbol,
            });
        }
        if input.is_empty() {
            return Ok(Self::default());
        }

        let elements: Vec<String> = input.split('.').map(str::to_ascii_lowercase).collect();
        if elements.iter().any(String::is_empty) {
            return Err(PathError::EmptyElement {
                path: input.to_string(),
            });
        }
        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn namespace(&self) -> Namespace {
        match self.elements.first().map(String::as_str) {
            Some("org") => Namespace::Organization,
            Some("pvt") => Namespace::Private,
            Some("com") => Namespace::Commercial,
            Some("loc") => Namespace::Local,
            _ => Namespace::Other,
        }
    }

    /// Path lives only on the local filesystem and is never looked up in a catalog
    pub fn is_loc(&self) -> bool {
        self.namespace() == Namespace::Local
    }

    /// Owner element (second element) of the path
    pub fn owner(&self) -> Option<&str> {
        self.elements.get(1).map(String::as_str)
    }

    /// Last element of the path
    pub fn name(&self) -> Option<&str> {
        self.elements.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ProjectPath> {
        if self.elements.is_empty() {
            return None;
        }
        Some(Self {
            elements: self.elements[..self.elements.len() - 1].to_vec(),
        })
    }

    /// Strict element-wise prefix check: `org.a` is a root of `org.a.b`
    pub fn is_root_of(&self, other: &ProjectPath) -> bool {
        self.elements.len() < other.elements.len()
            && other.elements.iter().zip(&self.elements).all(|(a, b)| a == b)
    }

    /// Append an element
    pub fn join(&self, element: &str) -> Result<ProjectPath, PathError> {
        let mut text = self.to_string();
        if !text.is_empty() {
            text.push('.');
        }
        text.push_str(element);
        Self::parse(&text)
    }

    /// Slash-separated form with the owner element fanned out (`org/b/bo/boost/asio`)
    pub fn fs_path(&self) -> String {
        let mut parts = Vec::with_capacity(self.elements.len() + 2);
        for (i, element) in self.elements.iter().enumerate() {
            if i == 1 {
                parts.push(prefix(element, 1));
                parts.push(prefix(element, 2));
            }
            parts.push(element.clone());
        }
        parts.join("/")
    }
}

fn prefix(element: &str, n: usize) -> String {
    element.chars().take(n).collect()
}

impl FromStr for ProjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProjectPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProjectPath> for String {
    fn from(path: ProjectPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.elements.join("."))
    }
}

impl PartialOrd for ProjectPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProjectPath {
    /// Private paths sort after every other namespace, otherwise element-wise
    fn cmp(&self, other: &Self) -> Ordering {
        let private = |p: &ProjectPath| p.namespace() == Namespace::Private;
        (private(self), &self.elements).cmp(&(private(other), &other.elements))
    }
}
