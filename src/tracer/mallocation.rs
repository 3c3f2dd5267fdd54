//! Allocation records
//!
//! The registry is append-only: a record is created the first time an
//! address comes back from malloc() and afterwards only flips between
//! [`MallocationState::Live`] and [`MallocationState::Freed`]. Freed records
//! are kept so that later accesses can be reported with both the malloc and
//! free backtraces.

use crate::backtrace::Backtrace;
use crate::memory::value::Address;
use rustc_hash::FxHashMap;

/// State of an allocation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MallocationState {
    Live,
    Freed { backtrace: Backtrace },
}

/// One heap allocation lifetime
#[derive(Debug, Clone)]
pub struct Mallocation {
    pub address: Address,
    pub size: usize,
    pub state: MallocationState,
    pub malloc_backtrace: Backtrace,
}

impl Mallocation {
    pub fn new(address: Address, size: usize, malloc_backtrace: Backtrace) -> Self {
        Mallocation {
            address,
            size,
            state: MallocationState::Live,
            malloc_backtrace,
        }
    }

    pub fn is_freed(&self) -> bool {
        matches!(self.state, MallocationState::Freed { .. })
    }

    pub fn is_live(&self) -> bool {
        !self.is_freed()
    }

    /// One past the last byte of the block
    pub fn end(&self) -> Address {
        self.address + self.size as u64
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.address && address < self.end()
    }

    /// True if `[address, address + size)` shares at least one byte with the block
    pub fn intersects(&self, address: Address, size: usize) -> bool {
        address < self.end() && self.address < address.saturating_add(size as u64)
    }

    pub fn free_backtrace(&self) -> Option<&Backtrace> {
        match &self.state {
            MallocationState::Freed { backtrace } => Some(backtrace),
            MallocationState::Live => None,
        }
    }

    /// Bring a freed record back to life for a new allocation at the same address
    pub fn revive(&mut self, size: usize, malloc_backtrace: Backtrace) {
        assert!(
            self.is_freed(),
            "malloc() returned live block at 0x{:x}",
            self.address
        );
        self.size = size;
        self.malloc_backtrace = malloc_backtrace;
        self.state = MallocationState::Live;
    }

    pub fn mark_freed(&mut self, backtrace: Backtrace) {
        assert!(self.is_live(), "block at 0x{:x} freed twice", self.address);
        self.state = MallocationState::Freed { backtrace };
    }
}

/// Append-only store of allocation records
#[derive(Debug, Clone, Default)]
pub struct MallocationRegistry {
    mallocations: Vec<Mallocation>,
    // Base address -> index into `mallocations`
    by_address: FxHashMap<Address, usize>,
}

impl MallocationRegistry {
    pub fn new() -> Self {
        MallocationRegistry {
            mallocations: Vec::new(),
            by_address: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.mallocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mallocations.is_empty()
    }

    pub fn live(&self) -> impl Iterator<Item = &Mallocation> {
        self.mallocations.iter().filter(|m| m.is_live())
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn live_bytes(&self) -> usize {
        self.live().map(|m| m.size).sum()
    }

    /// Append a new record. The address must not have been seen before.
    pub fn append(&mut self, mallocation: Mallocation) {
        assert!(
            !self.by_address.contains_key(&mallocation.address),
            "duplicate record for 0x{:x}",
            mallocation.address
        );
        self.by_address
            .insert(mallocation.address, self.mallocations.len());
        self.mallocations.push(mallocation);
    }

    /// Record whose base address is exactly `address`
    pub fn get_exact(&self, address: Address) -> Option<&Mallocation> {
        self.by_address
            .get(&address)
            .map(|&index| &self.mallocations[index])
    }

    pub fn get_exact_mut(&mut self, address: Address) -> Option<&mut Mallocation> {
        match self.by_address.get(&address) {
            Some(&index) => self.mallocations.get_mut(index),
            None => None,
        }
    }

    /// Containment lookup, live or freed.
    ///
    /// A freed record may still cover bytes that the allocator has since
    /// handed out again under a different base address. The live record wins
    /// in that case.
    pub fn find(&self, address: Address) -> Option<&Mallocation> {
        self.find_intersecting(address, 1)
    }

    /// First record sharing a byte with `[address, address + size)`, live records first
    pub fn find_intersecting(&self, address: Address, size: usize) -> Option<&Mallocation> {
        let size = size.max(1);
        let mut freed = None;
        for mallocation in &self.mallocations {
            if !mallocation.intersects(address, size) {
                continue;
            }
            if mallocation.is_live() {
                return Some(mallocation);
            }
            freed = freed.or(Some(mallocation));
        }
        freed
    }

    /// First live record sharing a byte with `[address, address + size)`
    pub fn find_live_intersecting(&self, address: Address, size: usize) -> Option<&Mallocation> {
        let size = size.max(1);
        self.live().find(|m| m.intersects(address, size))
    }

    /// First freed record owning a byte of `[address, address + size)` that
    /// no live record covers.
    ///
    /// Bytes handed out again under a live record are not stale, but the
    /// rest of the access is audited against whatever freed record is left.
    pub fn find_freed_intersecting(&self, address: Address, size: usize) -> Option<&Mallocation> {
        let end = address.saturating_add(size.max(1) as u64);
        self.mallocations
            .iter()
            .filter(|m| m.is_freed())
            .find(|freed| {
                let start = address.max(freed.address);
                let stop = end.min(freed.end());
                start < stop && self.first_uncovered(start, stop).is_some()
            })
    }

    // First byte of `[start, stop)` not inside any live record
    fn first_uncovered(&self, start: Address, stop: Address) -> Option<Address> {
        let mut cursor = start;
        while cursor < stop {
            match self.live().find(|m| m.contains(cursor)) {
                Some(live) => cursor = live.end(),
                None => return Some(cursor),
            }
        }
        None
    }
}
