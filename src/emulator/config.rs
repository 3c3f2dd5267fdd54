//! Emulator context configuration

use super::constants::{
    AUDITING_ENABLED_BY_DEFAULT, COLORED_OUTPUT_BY_DEFAULT, DEFAULT_POINTER_WIDTH,
};
use crate::memory::value::PointerWidth;

/// Settings for an [`Emulator`](super::engine::Emulator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Width of a target pointer; also the leak scan stride
    pub pointer_width: PointerWidth,

    /// Initial state of the auditing switch
    pub auditing_enabled: bool,

    /// Colour report headlines with ANSI escapes
    pub colored: bool,

    /// Process id printed in front of every diagnostic line
    pub pid: u32,
}

impl AuditConfig {
    pub fn with_pointer_width(mut self, pointer_width: PointerWidth) -> Self {
        self.pointer_width = pointer_width;
        self
    }

    pub fn with_auditing(mut self, enabled: bool) -> Self {
        self.auditing_enabled = enabled;
        self
    }

    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            pointer_width: DEFAULT_POINTER_WIDTH,
            auditing_enabled: AUDITING_ENABLED_BY_DEFAULT,
            colored: COLORED_OUTPUT_BY_DEFAULT,
            pid: std::process::id(),
        }
    }
}
