//! Software MMU
//!
//! A flat list of [`Region`]s looked up linearly. Regions may not overlap.

use super::region::Region;
use super::value::{Address, PointerWidth, ValueWithShadow};
use super::{IterationDecision, MemoryProvider};
use crate::emulator::errors::MemoryError;

#[derive(Debug, Clone, Default)]
pub struct SoftMmu {
    regions: Vec<Region>,
}

impl SoftMmu {
    pub fn new() -> Self {
        SoftMmu {
            regions: Vec::new(),
        }
    }

    /// Map a new region
    pub fn add_region(&mut self, region: Region) -> Result<(), MemoryError> {
        if let Some(existing) = self
            .regions
            .iter()
            .find(|r| region.base() < r.end() && r.base() < region.end())
        {
            return Err(MemoryError::Overlap {
                base: region.base(),
                size: region.size(),
                existing: existing.name().to_string(),
            });
        }
        log::debug!(
            "map region '{}' at {:#x}-{:#x}",
            region.name(),
            region.base(),
            region.end()
        );
        self.regions.push(region);
        Ok(())
    }

    fn find_region_mut(&mut self, address: Address) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(address))
    }

    fn region_for(&self, address: Address) -> Result<&Region, MemoryError> {
        self.find_region(address)
            .ok_or(MemoryError::Unmapped { address })
    }

    /// Store a pointer-sized value
    pub fn write_word(
        &mut self,
        address: Address,
        value: u64,
        width: PointerWidth,
    ) -> Result<(), MemoryError> {
        self.write_bytes(address, &width.encode(value))
    }
}

impl MemoryProvider for SoftMmu {
    fn find_region(&self, address: Address) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(address))
    }

    fn read_word(
        &self,
        address: Address,
        width: PointerWidth,
    ) -> Result<ValueWithShadow, MemoryError> {
        let region = self.region_for(address)?;
        let offset = (address - region.base()) as usize;
        // Make sure the whole word is inside the region
        region.read_bytes(offset, width.bytes())?;
        Ok(region.read_word(offset, width))
    }

    fn for_each_region(&self, f: &mut dyn FnMut(&Region) -> IterationDecision) {
        for region in &self.regions {
            if f(region) == IterationDecision::Break {
                break;
            }
        }
    }

    fn mark_uninitialized(&mut self, address: Address, size: usize) -> Result<(), MemoryError> {
        let region = self
            .find_region_mut(address)
            .ok_or(MemoryError::Unmapped { address })?;
        let offset = (address - region.base()) as usize;
        region.mark_uninitialized(offset, size)
    }

    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>, MemoryError> {
        let region = self.region_for(address)?;
        let offset = (address - region.base()) as usize;
        Ok(region.read_bytes(offset, size)?.to_vec())
    }

    fn write_bytes(&mut self, address: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let region = self
            .find_region_mut(address)
            .ok_or(MemoryError::Unmapped { address })?;
        let offset = (address - region.base()) as usize;
        region.write_bytes(offset, bytes)
    }
}
