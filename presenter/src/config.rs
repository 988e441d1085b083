//! Presenter configuration.

use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

/// Number of render-target descriptor slots reserved for surfaces.
pub const DEFAULT_COLOR_SLOTS: u32 = 1024;
/// Number of depth-stencil descriptor slots reserved for surfaces.
pub const DEFAULT_DEPTH_SLOTS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct Config {
    /// Capacity of the render-target heap and its slot pool.
    pub color_slots: u32,
    /// Capacity of the depth-stencil heap and its slot pool.
    pub depth_slots: u32,
    /// Directory the rolling log file is written to.
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color_slots: env::var("PRESENTER_COLOR_SLOTS")
                .ok()
                .and_then(|slots| slots.parse::<u32>().ok())
                .unwrap_or(DEFAULT_COLOR_SLOTS),
            depth_slots: env::var("PRESENTER_DEPTH_SLOTS")
                .ok()
                .and_then(|slots| slots.parse::<u32>().ok())
                .unwrap_or(DEFAULT_DEPTH_SLOTS),
            log_dir: env::var_os("PRESENTER_LOG_DIR").map_or_else(|| "logs".into(), PathBuf::from),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override both descriptor slot capacities.
    pub fn with_slots(mut self, color_slots: u32, depth_slots: u32) -> Self {
        self.color_slots = color_slots;
        self.depth_slots = depth_slots;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_slots() {
        let config = Config::new().with_slots(2, 1);
        assert_eq!(config.color_slots, 2);
        assert_eq!(config.depth_slots, 1);
    }
}
