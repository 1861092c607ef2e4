//! Import configuration.

use serde::{Deserialize, Serialize};

use crate::sorter::SortingMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    #[serde(default)]
    pub sorting_mode: SortingMode,
    /// Upper bound on windowed look-ahead in nanoseconds. Zero means the
    /// slowest source alone decides what is released.
    #[serde(default)]
    pub window_ns: u64,
}

impl ImportConfig {
    pub fn windowed(window_ns: u64) -> Self {
        Self {
            sorting_mode: SortingMode::Windowed,
            window_ns,
        }
    }
}
