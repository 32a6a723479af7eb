//! Bitmask of SRI fields that differ between two pushes.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// Set of SRI fields that changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SriChangeFlags(pub u32);

impl SriChangeFlags {
    pub const NONE: Self = Self(0);
    pub const HVERSION: Self = Self(1 << 0);
    pub const XSTART: Self = Self(1 << 1);
    pub const XDELTA: Self = Self(1 << 2);
    pub const XUNITS: Self = Self(1 << 3);
    pub const SUBSIZE: Self = Self(1 << 4);
    pub const YSTART: Self = Self(1 << 5);
    pub const YDELTA: Self = Self(1 << 6);
    pub const YUNITS: Self = Self(1 << 7);
    pub const MODE: Self = Self(1 << 8);
    pub const STREAMID: Self = Self(1 << 9);
    pub const BLOCKING: Self = Self(1 << 10);
    pub const KEYWORDS: Self = Self(1 << 11);
    pub const ALL: Self = Self((1 << 12) - 1);

    const NAMES: [(Self, &'static str); 12] = [
        (Self::HVERSION, "HVERSION"),
        (Self::XSTART, "XSTART"),
        (Self::XDELTA, "XDELTA"),
        (Self::XUNITS, "XUNITS"),
        (Self::SUBSIZE, "SUBSIZE"),
        (Self::YSTART, "YSTART"),
        (Self::YDELTA, "YDELTA"),
        (Self::YUNITS, "YUNITS"),
        (Self::MODE, "MODE"),
        (Self::STREAMID, "STREAMID"),
        (Self::BLOCKING, "BLOCKING"),
        (Self::KEYWORDS, "KEYWORDS"),
    ];

    /// Returns true if no field changed.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if every flag in `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any flag in `other` is set.
    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for SriChangeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SriChangeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SriChangeFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for SriChangeFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

impl fmt::Display for SriChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
