//! IR-cut filter types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical position of the IR-cut filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrFilterState {
    /// Filter in front of the sensor, infrared blocked
    Engaged,
    /// Filter moved away, infrared reaches the sensor
    Disengaged,
}

impl IrFilterState {
    /// Filter position for a capture with or without infrared
    pub fn for_capture(infrared: bool) -> Self {
        if infrared {
            Self::Disengaged
        } else {
            Self::Engaged
        }
    }
}

impl fmt::Display for IrFilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrFilterState::Engaged => write!(f, "engaged"),
            IrFilterState::Disengaged => write!(f, "disengaged"),
        }
    }
}

/// Active level for GPIO pins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    /// Active high (default for most cases)
    #[default]
    High,
    /// Active low (inverted)
    Low,
}

/// Physical level of an output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    High,
    Low,
}

impl LineLevel {
    /// Value passed to the GPIO character device
    pub fn as_value(self) -> u8 {
        match self {
            LineLevel::High => 1,
            LineLevel::Low => 0,
        }
    }

    /// Line level that puts the filter into `state`
    pub fn for_state(state: IrFilterState, active_level: ActiveLevel) -> Self {
        match (state, active_level) {
            (IrFilterState::Engaged, ActiveLevel::High)
            | (IrFilterState::Disengaged, ActiveLevel::Low) => LineLevel::High,
            (IrFilterState::Engaged, ActiveLevel::Low)
            | (IrFilterState::Disengaged, ActiveLevel::High) => LineLevel::Low,
        }
    }
}

impl fmt::Display for LineLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineLevel::High => write!(f, "HIGH"),
            LineLevel::Low => write!(f, "LOW"),
        }
    }
}

/// IR-cut GPIO line configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IrCutConfig {
    /// GPIO chip device, e.g. /dev/gpiochip0. Empty disables the line.
    pub chip: String,
    /// Line offset on the chip
    pub line: u32,
    /// Level that engages the filter
    pub active_level: ActiveLevel,
}

impl Default for IrCutConfig {
    fn default() -> Self {
        Self {
            chip: String::new(),
            line: 0,
            active_level: ActiveLevel::High,
        }
    }
}

impl IrCutConfig {
    pub fn is_configured(&self) -> bool {
        !self.chip.is_empty()
    }
}
