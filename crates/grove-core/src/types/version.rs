//! Package version values.
//!
//! A version is either numbered (major.minor.patch, where trailing components
//! may be left as wildcards) or a branch reference. The two forms never mix.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exact, partial or branch version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Version {
    /// Numbered version; `None` marks an unspecified (wildcard) component
    Number {
        major: Option<u32>,
        minor: Option<u32>,
        patch: Option<u32>,
    },
    /// Named branch reference
    Branch(String),
}

/// Version parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid branch name: {name}")]
    InvalidBranch { name: String },

    #[error("Version 0.0.0 is not allowed")]
    Zero,
}

impl Version {
    /// Create a fully specified version
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self::Number {
            major: Some(major),
            minor: Some(minor),
            patch: Some(patch),
        }
    }

    /// Create a version with explicit wildcard components
    pub fn partial(major: Option<u32>, minor: Option<u32>, patch: Option<u32>) -> Self {
        Self::Number {
            major,
            minor,
            patch,
        }
    }

    /// Version matching anything (`*`)
    pub fn any() -> Self {
        Self::partial(None, None, None)
    }

    /// Create a branch reference, validating the name
    pub fn branch(name: impl Into<String>) -> Result<Self, VersionError> {
        let name = name.into();
        if is_valid_branch_name(&name) {
            Ok(Self::Branch(name))
        } else {
            Err(VersionError::InvalidBranch { name })
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Branch(_))
    }

    /// All three components are pinned
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            Self::Number {
                major: Some(_),
                minor: Some(_),
                patch: Some(_),
            }
        )
    }

    /// Nothing is pinned (`*`)
    pub fn is_any(&self) -> bool {
        matches!(
            self,
            Self::Number {
                major: None,
                minor: None,
                patch: None,
            }
        )
    }

    pub fn major(&self) -> Option<u32> {
        match self {
            Self::Number { major, .. } => *major,
            Self::Branch(_) => None,
        }
    }

    pub fn minor(&self) -> Option<u32> {
        match self {
            Self::Number { minor, .. } => *minor,
            Self::Branch(_) => None,
        }
    }

    pub fn patch(&self) -> Option<u32> {
        match self {
            Self::Number { patch, .. } => *patch,
            Self::Branch(_) => None,
        }
    }

    pub fn branch_name(&self) -> Option<&str> {
        match self {
            Self::Branch(name) => Some(name),
            Self::Number { .. } => None,
        }
    }

    /// Check whether `concrete` is an acceptable substitution for this spec.
    ///
    /// Every pinned component must match; branches only match the same branch.
    pub fn can_be(&self, concrete: &Version) -> bool {
        match (self, concrete) {
            (Self::Branch(a), Self::Branch(b)) => a == b,
            (
                Self::Number {
                    major,
                    minor,
                    patch,
                },
                Self::Number {
                    major: c_major,
                    minor: c_minor,
                    patch: c_patch,
                },
            ) => {
                component_matches(*major, *c_major)
                    && component_matches(*minor, *c_minor)
                    && component_matches(*patch, *c_patch)
            }
            _ => false,
        }
    }

    /// Render only the specified components (`*`, `1`, `1.2`, `1.2.3`) or the branch name
    pub fn to_any_version(&self) -> String {
        match self {
            Self::Branch(name) => name.clone(),
            Self::Number {
                major,
                minor,
                patch,
            } => {
                let parts: Vec<String> = [*major, *minor, *patch]
                    .into_iter()
                    .map_while(|c| c.map(|n| n.to_string()))
                    .collect();
                if parts.is_empty() {
                    "*".to_string()
                } else {
                    parts.join(".")
                }
            }
        }
    }
}

fn component_matches(spec: Option<u32>, concrete: Option<u32>) -> bool {
    spec.map_or(true, |s| concrete == Some(s))
}

fn is_valid_branch_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();

        if input.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }
        if input == "*" {
            return Ok(Self::any());
        }
        if !input.starts_with(|c: char| c.is_ascii_digit()) {
            return Self::branch(input);
        }

        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let mut components = [None; 3];
        let mut wildcard = false;
        for (slot, part) in components.iter_mut().zip(&parts) {
            if *part == "*" {
                wildcard = true;
                continue;
            }
            // 1.*.3 pins a component below a wildcard
            if wildcard {
                return Err(VersionError::InvalidFormat {
                    input: input.to_string(),
                });
            }
            let value = part.parse::<u32>().map_err(|_| VersionError::InvalidNumber {
                component: part.to_string(),
            })?;
            *slot = Some(value);
        }

        if components == [Some(0); 3] {
            return Err(VersionError::Zero);
        }

        Ok(Self::partial(components[0], components[1], components[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_any_version())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// Branches sort before numbered versions
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Branch(a), Self::Branch(b)) => a.cmp(b),
            (Self::Branch(_), Self::Number { .. }) => Ordering::Less,
            (Self::Number { .. }, Self::Branch(_)) => Ordering::Greater,
            (a, b) => (a.major(), a.minor(), a.patch()).cmp(&(b.major(), b.minor(), b.patch())),
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn any_version() -> impl Strategy<Value = Version> {
        prop_oneof![
            (
                prop::option::of(0u32..20),
                prop::option::of(0u32..20),
                prop::option::of(0u32..20)
            )
                .prop_map(|(a, b, c)| Version::partial(a, b, c)),
            "[a-z_][a-z0-9_-]{0,8}".prop_map(Version::Branch),
        ]
    }

    proptest! {
        #[test]
        fn version_comparison_transitivity(a in any_version(), b in any_version(), c in any_version()) {
            if a < b && b < c {
                prop_assert!(a < c, "Transitivity violated: {} < {} < {}", a, b, c);
            }
            if a > b && b > c {
                prop_assert!(a > c, "Transitivity violated: {} > {} > {}", a, b, c);
            }
        }

        #[test]
        fn exact_version_only_can_be_itself(
            major in 1u32..50, minor in 0u32..50, patch in 0u32..50,
            other_patch in 0u32..50,
        ) {
            let spec = Version::new(major, minor, patch);
            let other = Version::new(major, minor, other_patch);
            prop_assert_eq!(spec.can_be(&other), patch == other_patch);
        }
    }
}
