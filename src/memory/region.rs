//! Regions of emulated memory
//!
//! A [`Region`] is a contiguous span of target memory with a [`RegionKind`].
//! Only [`RegionKind::Mapped`] regions carry shadow bits; every other kind
//! reports its words as initialized.
//!
//! Mapped regions that the target's allocator carved out for its own blocks
//! are flagged with `malloc_block` so the leak scan can tell them apart from
//! ordinary mappings.

use super::value::{Address, PointerWidth, ValueWithShadow};
use crate::emulator::errors::MemoryError;

/// Per-byte initialization tracking for mapped memory
#[derive(Debug, Clone)]
pub struct ShadowBits {
    init_map: Vec<bool>,
}

impl ShadowBits {
    pub fn new(size: usize) -> Self {
        ShadowBits {
            init_map: vec![false; size],
        }
    }

    /// Check if a byte range is initialized
    pub fn is_initialized(&self, offset: usize, size: usize) -> bool {
        match self.init_map.get(offset..offset + size) {
            Some(bits) => bits.iter().all(|&b| b),
            None => false,
        }
    }

    /// Mark a byte range as initialized
    pub fn mark_initialized(&mut self, offset: usize, size: usize) {
        if let Some(bits) = self.init_map.get_mut(offset..offset + size) {
            bits.fill(true);
        }
    }

    /// Mark a byte range as uninitialized
    pub fn mark_uninitialized(&mut self, offset: usize, size: usize) {
        if let Some(bits) = self.init_map.get_mut(offset..offset + size) {
            bits.fill(false);
        }
    }
}

/// What a region is used for
#[derive(Debug, Clone)]
pub enum RegionKind {
    Stack,
    Text,
    /// Anonymous or file mapping; heap memory lives here
    Mapped {
        shadow: ShadowBits,
        malloc_block: bool,
    },
    /// Static data, bss and anything else the loader set up
    Data,
}

/// A contiguous span of emulated memory
#[derive(Debug, Clone)]
pub struct Region {
    base: Address,
    data: Vec<u8>,
    kind: RegionKind,
    name: String,
}

impl Region {
    fn with_kind(base: Address, size: usize, kind: RegionKind, name: &str) -> Self {
        Region {
            base,
            data: vec![0; size],
            kind,
            name: name.to_string(),
        }
    }

    pub fn stack(base: Address, size: usize) -> Self {
        Self::with_kind(base, size, RegionKind::Stack, "stack")
    }

    pub fn text(base: Address, size: usize) -> Self {
        Self::with_kind(base, size, RegionKind::Text, "text")
    }

    pub fn data(base: Address, size: usize, name: &str) -> Self {
        Self::with_kind(base, size, RegionKind::Data, name)
    }

    /// A plain mapping, scanned as a root by the leak analyzer
    pub fn mapped(base: Address, size: usize, name: &str) -> Self {
        let kind = RegionKind::Mapped {
            shadow: ShadowBits::new(size),
            malloc_block: false,
        };
        Self::with_kind(base, size, kind, name)
    }

    /// A mapping owned by the target's allocator
    pub fn malloc_block(base: Address, size: usize) -> Self {
        let kind = RegionKind::Mapped {
            shadow: ShadowBits::new(size),
            malloc_block: true,
        };
        Self::with_kind(base, size, kind, "malloc")
    }

    pub fn base(&self) -> Address {
        self.base
    }

    /// One past the last address of the region
    pub fn end(&self) -> Address {
        self.base + self.data.len() as u64
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn is_stack(&self) -> bool {
        matches!(self.kind, RegionKind::Stack)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, RegionKind::Text)
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.kind, RegionKind::Mapped { .. })
    }

    pub fn is_malloc_block(&self) -> bool {
        matches!(
            self.kind,
            RegionKind::Mapped {
                malloc_block: true,
                ..
            }
        )
    }

    fn check_range(&self, offset: usize, size: usize) -> Result<(), MemoryError> {
        if offset.checked_add(size).is_some_and(|end| end <= self.size()) {
            Ok(())
        } else {
            Err(MemoryError::OutOfBounds {
                address: self.base + offset as u64,
                size,
                region: self.name.clone(),
            })
        }
    }

    /// Read bytes from the region
    pub fn read_bytes(&self, offset: usize, size: usize) -> Result<&[u8], MemoryError> {
        self.check_range(offset, size)?;
        Ok(&self.data[offset..offset + size])
    }

    /// Write bytes to the region, marking them initialized
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check_range(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        if let RegionKind::Mapped { shadow, .. } = &mut self.kind {
            shadow.mark_initialized(offset, bytes.len());
        }
        Ok(())
    }

    /// Check whether a byte range has been written since it was handed out
    pub fn is_initialized(&self, offset: usize, size: usize) -> bool {
        match &self.kind {
            RegionKind::Mapped { shadow, .. } => shadow.is_initialized(offset, size),
            _ => offset + size <= self.size(),
        }
    }

    /// Read a pointer-sized word at a byte offset.
    ///
    /// A word that runs past the end of the region reads as an uninitialized zero.
    pub fn read_word(&self, offset: usize, width: PointerWidth) -> ValueWithShadow {
        match self.read_bytes(offset, width.bytes()) {
            Ok(bytes) => ValueWithShadow::new(
                width.decode(bytes),
                self.is_initialized(offset, width.bytes()),
            ),
            Err(_) => ValueWithShadow::new(0, false),
        }
    }

    /// Clear shadow bits for a range. Only valid on mapped regions.
    pub fn mark_uninitialized(&mut self, offset: usize, size: usize) -> Result<(), MemoryError> {
        self.check_range(offset, size)?;
        match &mut self.kind {
            RegionKind::Mapped { shadow, .. } => {
                shadow.mark_uninitialized(offset, size);
                Ok(())
            }
            _ => Err(MemoryError::NotMapped {
                address: self.base + offset as u64,
                region: self.name.clone(),
            }),
        }
    }
}
