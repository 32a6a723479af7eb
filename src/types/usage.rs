//! Port usage state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse activity level reported by a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageState {
    #[default]
    Idle,
    Active,
    Busy,
}

impl fmt::Display for UsageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UsageState::Idle => "IDLE",
            UsageState::Active => "ACTIVE",
            UsageState::Busy => "BUSY",
        })
    }
}
