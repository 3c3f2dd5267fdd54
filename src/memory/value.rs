//! Word values read from emulated memory
//!
//! Every word read by the auditor carries the initialization state of the
//! bytes it was assembled from. A word is only considered initialized when
//! *all* of its bytes have been written by the target since they were last
//! handed out by the allocator.

/// Memory address type (64-bit)
pub type Address = u64;

/// Width of a target pointer, which is also the stride of the leak scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerWidth {
    Four,
    #[default]
    Eight,
}

impl PointerWidth {
    /// Size of a pointer in bytes
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }

    /// Number of whole words that fit into `len` bytes
    pub fn words_in(self, len: usize) -> usize {
        len / self.bytes()
    }

    /// Assemble a little-endian word from raw bytes
    pub fn decode(self, bytes: &[u8]) -> u64 {
        bytes
            .iter()
            .take(self.bytes())
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// Split a value into little-endian bytes of this width
    pub fn encode(self, value: u64) -> Vec<u8> {
        value.to_le_bytes()[..self.bytes()].to_vec()
    }
}

/// A word together with its initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueWithShadow {
    pub value: u64,
    pub initialized: bool,
}

impl ValueWithShadow {
    pub fn new(value: u64, initialized: bool) -> Self {
        ValueWithShadow { value, initialized }
    }

    pub fn is_uninitialized(&self) -> bool {
        !self.initialized
    }

    /// True if this is an initialized word holding exactly `address`
    pub fn points_to(&self, address: Address) -> bool {
        self.initialized && self.value == address
    }
}
