//! Project and dependency flag bits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit-set attached to projects, versions and dependency edges.
///
/// Flags only accumulate: there is no operation that clears a bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u64);

impl Flags {
    pub const HEADER_ONLY: Flags = Flags(1 << 0);
    pub const EXECUTABLE: Flags = Flags(1 << 6);
    pub const PRIVATE_DEPENDENCY: Flags = Flags(1 << 8);
    /// Requested by the caller rather than pulled in transitively
    pub const DIRECT_DEPENDENCY: Flags = Flags(1 << 9);
    pub const INCLUDE_DIRECTORIES_ONLY: Flags = Flags(1 << 10);
    /// Exists only on the local filesystem
    pub const LOCAL_PROJECT: Flags = Flags(1 << 11);

    const NAMED: [(Flags, &'static str); 6] = [
        (Self::HEADER_ONLY, "header_only"),
        (Self::EXECUTABLE, "executable"),
        (Self::PRIVATE_DEPENDENCY, "private"),
        (Self::DIRECT_DEPENDENCY, "direct"),
        (Self::INCLUDE_DIRECTORIES_ONLY, "include_directories_only"),
        (Self::LOCAL_PROJECT, "local"),
    ];

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "{:#x}", self.0)
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_accumulate() {
        let mut flags = Flags::HEADER_ONLY;
        flags |= Flags::DIRECT_DEPENDENCY;
        flags.insert(Flags::PRIVATE_DEPENDENCY);

        assert!(flags.contains(Flags::HEADER_ONLY));
        assert!(flags.contains(Flags::DIRECT_DEPENDENCY | Flags::PRIVATE_DEPENDENCY));
        assert!(!flags.contains(Flags::EXECUTABLE));
        assert_eq!(flags.bits(), 1 | (1 << 8) | (1 << 9));
    }

    #[test]
    fn test_flags_serde_transparent() {
        let flags: Flags = serde_json::from_str("513").unwrap();
        assert_eq!(flags, Flags::HEADER_ONLY | Flags::DIRECT_DEPENDENCY);
        assert_eq!(serde_json::to_string(&Flags::LOCAL_PROJECT).unwrap(), "2048");
    }

    #[test]
    fn test_flags_display() {
        assert_eq!((Flags::HEADER_ONLY | Flags::DIRECT_DEPENDENCY).to_string(), "header_only|direct");
        assert_eq!(Flags::empty().to_string(), "0x0");
    }
}
