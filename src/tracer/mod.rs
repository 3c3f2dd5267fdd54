//! Heap auditing
//!
//! [`MallocTracer`] owns the allocation registry and implements the four
//! notification hooks the dispatcher calls:
//!
//! - [`MallocTracer::on_allocate`] after the target's malloc() returns
//! - [`MallocTracer::on_free`] when the target calls free()
//! - [`MallocTracer::audit_read`] / [`MallocTracer::audit_write`] before a
//!   load or store is committed
//!
//! The leak scan lives in [`leaks`].
//!
//! Hooks return the [`Violation`] they detected instead of printing it;
//! printing is the reporter's job.

pub mod leaks;
pub mod mallocation;

use crate::backtrace::BacktraceProvider;
use crate::emulator::errors::{AccessKind, MemoryError, Violation};
use crate::memory::value::{Address, PointerWidth};
use crate::memory::MemoryProvider;
use mallocation::{Mallocation, MallocationRegistry};
use std::cell::Cell;

pub use leaks::LeakSummary;

/// Tracks every heap block the target allocates
#[derive(Debug)]
pub struct MallocTracer {
    registry: MallocationRegistry,
    auditing_enabled: Cell<bool>,
    pointer_width: PointerWidth,
}

/// Turns auditing off until dropped, then restores the previous setting
pub struct AuditSuspension<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl Drop for AuditSuspension<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

impl MallocTracer {
    pub fn new(pointer_width: PointerWidth, auditing_enabled: bool) -> Self {
        MallocTracer {
            registry: MallocationRegistry::new(),
            auditing_enabled: Cell::new(auditing_enabled),
            pointer_width,
        }
    }

    pub fn registry(&self) -> &MallocationRegistry {
        &self.registry
    }

    pub fn is_auditing_enabled(&self) -> bool {
        self.auditing_enabled.get()
    }

    pub fn set_auditing_enabled(&self, enabled: bool) {
        self.auditing_enabled.set(enabled);
    }

    /// Disable auditing for the lifetime of the returned guard
    pub fn suspend_auditing(&self) -> AuditSuspension<'_> {
        AuditSuspension {
            flag: &self.auditing_enabled,
            previous: self.auditing_enabled.replace(false),
        }
    }

    /// Containment lookup, live or freed
    pub fn find_mallocation(&self, address: Address) -> Option<&Mallocation> {
        self.registry.find(address)
    }

    /// The target's malloc() returned `address`.
    ///
    /// The record is updated even when clearing the shadow bits fails; the
    /// error only reports that the block is not inside mapped memory.
    pub fn on_allocate<M, B>(
        &mut self,
        memory: &mut M,
        backtracer: &B,
        address: Address,
        size: usize,
    ) -> Result<(), MemoryError>
    where
        M: MemoryProvider + ?Sized,
        B: BacktraceProvider + ?Sized,
    {
        let backtrace = backtracer.capture();
        // A live block at the same base is left for `revive` to reject
        if let Some(live) = self
            .registry
            .find_live_intersecting(address, size)
            .filter(|m| m.address != address)
        {
            panic!(
                "malloc() returned 0x{:x} overlapping live block 0x{:x}",
                address, live.address
            );
        }
        match self.registry.get_exact_mut(address) {
            Some(existing) => {
                log::debug!(
                    "malloc({}) reuses freed block 0x{:x} (was {} bytes)",
                    size,
                    address,
                    existing.size
                );
                existing.revive(size, backtrace);
            }
            None => {
                log::debug!("malloc({}) = 0x{:x}", size, address);
                self.registry
                    .append(Mallocation::new(address, size, backtrace));
            }
        }

        if size == 0 {
            return Ok(());
        }
        memory.mark_uninitialized(address, size)
    }

    /// The target called free(`address`)
    pub fn on_free<B>(&mut self, backtracer: &B, address: Address) -> Option<Violation>
    where
        B: BacktraceProvider + ?Sized,
    {
        if address == 0 {
            return None;
        }

        match self.registry.get_exact_mut(address) {
            Some(mallocation) if mallocation.is_freed() => Some(Violation::DoubleFree {
                address,
                backtrace: backtracer.capture(),
            }),
            Some(mallocation) => {
                log::debug!("free(0x{:x}), {} bytes", address, mallocation.size);
                mallocation.mark_freed(backtracer.capture());
                None
            }
            None => Some(Violation::InvalidFree {
                address,
                backtrace: backtracer.capture(),
            }),
        }
    }

    pub fn audit_read<B>(
        &self,
        backtracer: &B,
        in_allocator: bool,
        address: Address,
        size: usize,
    ) -> Option<Violation>
    where
        B: BacktraceProvider + ?Sized,
    {
        self.audit(backtracer, in_allocator, AccessKind::Read, address, size)
    }

    pub fn audit_write<B>(
        &self,
        backtracer: &B,
        in_allocator: bool,
        address: Address,
        size: usize,
    ) -> Option<Violation>
    where
        B: BacktraceProvider + ?Sized,
    {
        self.audit(backtracer, in_allocator, AccessKind::Write, address, size)
    }

    fn audit<B>(
        &self,
        backtracer: &B,
        in_allocator: bool,
        access: AccessKind,
        address: Address,
        size: usize,
    ) -> Option<Violation>
    where
        B: BacktraceProvider + ?Sized,
    {
        if !self.is_auditing_enabled() || in_allocator {
            return None;
        }

        let mallocation = self.registry.find_freed_intersecting(address, size)?;
        let free_backtrace = mallocation.free_backtrace()?;

        Some(Violation::UseAfterFree {
            access,
            address,
            size,
            offset: address.saturating_sub(mallocation.address) as usize,
            block_size: mallocation.size,
            backtrace: backtracer.capture(),
            malloc_backtrace: mallocation.malloc_backtrace.clone(),
            free_backtrace: free_backtrace.clone(),
        })
    }
}

impl Default for MallocTracer {
    fn default() -> Self {
        Self::new(PointerWidth::default(), true)
    }
}
