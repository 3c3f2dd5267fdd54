// Constants for the emulator context

use crate::memory::value::PointerWidth;

/// Pointer width used when none is configured
pub const DEFAULT_POINTER_WIDTH: PointerWidth = PointerWidth::Eight;

/// Whether heap accesses are audited from the first instruction
pub const AUDITING_ENABLED_BY_DEFAULT: bool = true;

/// Whether diagnostic headlines are coloured by default
pub const COLORED_OUTPUT_BY_DEFAULT: bool = true;
