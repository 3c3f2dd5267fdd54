//! Memory model seen by the auditor
//!
//! This module provides the memory abstractions the tracer consumes:
//! - [`value`]: addresses, pointer widths and words with shadow state
//! - [`region`]: tagged regions of emulated memory with per-byte shadow bits
//! - [`mmu`]: [`SoftMmu`](mmu::SoftMmu), a software region map
//!
//! # Shadow State
//!
//! Mapped regions remember, per byte, whether the target wrote to it since
//! the allocator last handed it out. The leak scan ignores uninitialized
//! words so that stale data in a fresh allocation never looks like a pointer.
//!
//! The tracer never talks to [`SoftMmu`](mmu::SoftMmu) directly; it goes
//! through [`MemoryProvider`] so any emulator can plug its own MMU in.

pub mod mmu;
pub mod region;
pub mod value;

use crate::emulator::errors::MemoryError;
use region::Region;
use value::{Address, PointerWidth, ValueWithShadow};

/// Whether region enumeration should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationDecision {
    Continue,
    Break,
}

/// Access to the emulator's memory
pub trait MemoryProvider {
    /// Locate the region owning an address
    fn find_region(&self, address: Address) -> Option<&Region>;

    /// Read a pointer-sized word at an absolute address
    fn read_word(&self, address: Address, width: PointerWidth)
        -> Result<ValueWithShadow, MemoryError>;

    /// Visit every region until the callback asks to stop
    fn for_each_region(&self, f: &mut dyn FnMut(&Region) -> IterationDecision);

    /// Forget that a byte range of a mapped region was ever written
    fn mark_uninitialized(&mut self, address: Address, size: usize) -> Result<(), MemoryError>;

    /// Read raw bytes for a target load
    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>, MemoryError>;

    /// Commit a target store, marking the bytes initialized
    fn write_bytes(&mut self, address: Address, bytes: &[u8]) -> Result<(), MemoryError>;
}
