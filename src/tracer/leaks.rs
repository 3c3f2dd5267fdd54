//! Leak detection
//!
//! A live block is *reachable* if some initialized, pointer-aligned word holds
//! exactly its base address. The scan looks in two places, in order:
//!
//! 1. every other live block, word by word;
//! 2. every region that is not the stack, not text and not an allocator block.
//!
//! This is not a mark phase from the roots. A block that is only referenced
//! from another unreachable block still counts as reachable, so a leaked
//! linked list is reported as a single leak (its head). Pointers to the
//! interior of a block and pointers stored at unaligned offsets are not
//! recognised.

use super::mallocation::Mallocation;
use super::MallocTracer;
use crate::emulator::errors::Violation;
use crate::memory::{IterationDecision, MemoryProvider};

/// Result of a leak scan
#[derive(Debug, Clone, Default)]
pub struct LeakSummary {
    pub leaks: Vec<Violation>,
    pub bytes_leaked: usize,
}

impl LeakSummary {
    pub fn leak_count(&self) -> usize {
        self.leaks.len()
    }

    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }
}

impl MallocTracer {
    /// Classify every live block as reachable or leaked
    pub fn find_leaks<M>(&self, memory: &M) -> LeakSummary
    where
        M: MemoryProvider + ?Sized,
    {
        let _suspension = self.suspend_auditing();

        let mut summary = LeakSummary::default();
        for mallocation in self.registry.live() {
            if self.is_reachable(memory, mallocation) {
                continue;
            }
            summary.bytes_leaked += mallocation.size;
            summary.leaks.push(Violation::Leak {
                address: mallocation.address,
                size: mallocation.size,
                malloc_backtrace: mallocation.malloc_backtrace.clone(),
            });
        }
        log::debug!(
            "leak scan: {} live block(s), {} leak(s), {} byte(s)",
            self.registry.live_count(),
            summary.leak_count(),
            summary.bytes_leaked
        );
        summary
    }

    /// True if an initialized aligned word anywhere outside the excluded
    /// regions holds the block's base address
    pub fn is_reachable<M>(&self, memory: &M, mallocation: &Mallocation) -> bool
    where
        M: MemoryProvider + ?Sized,
    {
        assert!(
            mallocation.is_live(),
            "reachability of freed block 0x{:x}",
            mallocation.address
        );

        self.is_referenced_from_heap(memory, mallocation)
            || self.is_referenced_from_regions(memory, mallocation)
    }

    fn is_referenced_from_heap<M>(&self, memory: &M, mallocation: &Mallocation) -> bool
    where
        M: MemoryProvider + ?Sized,
    {
        let width = self.pointer_width;
        for other in self.registry.live() {
            if other.address == mallocation.address {
                continue;
            }
            for i in 0..width.words_in(other.size) {
                let address = other.address + (i * width.bytes()) as u64;
                let value = match memory.read_word(address, width) {
                    Ok(value) => value,
                    Err(e) => {
                        log::warn!("skipping unreadable live block 0x{:x}: {}", other.address, e);
                        break;
                    }
                };
                if value.points_to(mallocation.address) {
                    log::trace!(
                        "mallocation 0x{:x} is reachable from other mallocation 0x{:x}",
                        mallocation.address,
                        other.address
                    );
                    return true;
                }
            }
        }
        false
    }

    fn is_referenced_from_regions<M>(&self, memory: &M, mallocation: &Mallocation) -> bool
    where
        M: MemoryProvider + ?Sized,
    {
        let width = self.pointer_width;
        let mut reachable = false;
        memory.for_each_region(&mut |region| {
            if region.is_stack() || region.is_text() || region.is_malloc_block() {
                return IterationDecision::Continue;
            }
            for i in 0..width.words_in(region.size()) {
                let value = region.read_word(i * width.bytes(), width);
                if value.points_to(mallocation.address) {
                    log::trace!(
                        "mallocation 0x{:x} is reachable from region '{}' 0x{:x}-0x{:x}",
                        mallocation.address,
                        region.name(),
                        region.base(),
                        region.end() - 1
                    );
                    reachable = true;
                    return IterationDecision::Break;
                }
            }
            IterationDecision::Continue
        });
        reachable
    }
}
