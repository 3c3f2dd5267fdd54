//! Error and violation types
//!
//! Two very different things live here:
//!
//! - [`Violation`]: a heap bug in the *target* program. Violations are values,
//!   returned from the audit hooks and printed by the reporter. They never
//!   stop emulation.
//! - [`MemoryError`] and [`AuditError`]: failures of the emulator's own
//!   collaborators (an allocation outside mapped memory, a call stack
//!   underflow). These are propagated with `?`.
//!
//! Internal desynchronisation of the allocation model is neither; it is an
//! assertion failure.

use crate::backtrace::Backtrace;
use crate::memory::value::Address;
use std::fmt;

/// Errors raised by a memory provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No region contains the address
    Unmapped { address: Address },

    /// Access runs past the end of its region
    OutOfBounds {
        address: Address,
        size: usize,
        region: String,
    },

    /// Shadow operation on a region that has no shadow bits
    NotMapped { address: Address, region: String },

    /// New region overlaps an existing one
    Overlap {
        base: Address,
        size: usize,
        existing: String,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::Unmapped { address } => {
                write!(f, "Address 0x{:x} is not mapped", address)
            }
            MemoryError::OutOfBounds {
                address,
                size,
                region,
            } => {
                write!(
                    f,
                    "{}-byte access at 0x{:x} runs past the end of region '{}'",
                    size, address, region
                )
            }
            MemoryError::NotMapped { address, region } => {
                write!(
                    f,
                    "Address 0x{:x} is in region '{}', which is not a mapped region",
                    address, region
                )
            }
            MemoryError::Overlap {
                base,
                size,
                existing,
            } => {
                write!(
                    f,
                    "Region at 0x{:x} ({} bytes) overlaps existing region '{}'",
                    base, size, existing
                )
            }
        }
    }
}

impl std::error::Error for MemoryError {}

/// Errors surfaced by the emulator context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    Memory(MemoryError),

    /// `Ret` without a matching `Call`
    CallStackUnderflow,

    /// Leaving the allocator more times than it was entered
    AllocatorDepthUnderflow,
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Memory(e) => write!(f, "Memory error: {}", e),
            AuditError::CallStackUnderflow => {
                write!(f, "Return executed with an empty call stack")
            }
            AuditError::AllocatorDepthUnderflow => {
                write!(f, "Left the allocator without entering it")
            }
        }
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuditError::Memory(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MemoryError> for AuditError {
    fn from(e: MemoryError) -> Self {
        AuditError::Memory(e)
    }
}

/// Direction of an audited memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// A heap bug detected in the target program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// free() on an address that is already freed
    DoubleFree {
        address: Address,
        backtrace: Backtrace,
    },

    /// free() on an address malloc() never returned
    InvalidFree {
        address: Address,
        backtrace: Backtrace,
    },

    /// Access inside a freed block
    UseAfterFree {
        access: AccessKind,
        address: Address,
        size: usize,
        offset: usize,
        block_size: usize,
        backtrace: Backtrace,
        malloc_backtrace: Backtrace,
        free_backtrace: Backtrace,
    },

    /// Live block that nothing points to
    Leak {
        address: Address,
        size: usize,
        malloc_backtrace: Backtrace,
    },
}

impl Violation {
    pub fn address(&self) -> Address {
        match self {
            Violation::DoubleFree { address, .. } => *address,
            Violation::InvalidFree { address, .. } => *address,
            Violation::UseAfterFree { address, .. } => *address,
            Violation::Leak { address, .. } => *address,
        }
    }

    /// Short headline used as the coloured part of a report
    pub fn title(&self) -> &'static str {
        match self {
            Violation::DoubleFree { .. } => "Double free()",
            Violation::InvalidFree { .. } => "Invalid free()",
            Violation::UseAfterFree { .. } => "Use-after-free",
            Violation::Leak { .. } => "Leak",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DoubleFree { address, .. } => {
                write!(f, "Double free() of address 0x{:x}", address)
            }
            Violation::InvalidFree { address, .. } => {
                write!(f, "Invalid free() of address 0x{:x}", address)
            }
            Violation::UseAfterFree {
                access,
                address,
                size,
                offset,
                block_size,
                ..
            } => {
                write!(
                    f,
                    "Use-after-free: {}-byte {} at 0x{:x}, {} bytes into block of size {}",
                    size, access, address, offset, block_size
                )
            }
            Violation::Leak { address, size, .. } => {
                write!(f, "Leak of {}-byte allocation at 0x{:x}", size, address)
            }
        }
    }
}
