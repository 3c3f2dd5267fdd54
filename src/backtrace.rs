//! Call-stack capture for diagnostics
//!
//! The auditor stores raw [`Backtrace`]s (return addresses, innermost first)
//! in every allocation record and symbolizes them only when a report is
//! printed. Capturing and rendering go through [`BacktraceProvider`];
//! [`ShadowCallStack`] is the provider used by the bundled emulator context.

use crate::memory::value::Address;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Return addresses of a call chain, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    frames: Vec<Address>,
}

impl Backtrace {
    pub fn new(frames: Vec<Address>) -> Self {
        Backtrace { frames }
    }

    pub fn frames(&self) -> &[Address] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Source of call-stack snapshots
pub trait BacktraceProvider {
    /// Capture the current call chain
    fn capture(&self) -> Backtrace;

    /// Write a captured call chain to the diagnostic stream
    fn render(&self, backtrace: &Backtrace, pid: u32, out: &mut dyn Write) -> io::Result<()>;
}

/// Call stack maintained by the dispatcher on every call and return
#[derive(Debug, Clone, Default)]
pub struct ShadowCallStack {
    return_addresses: Vec<Address>,
    // Function start address -> name
    symbols: BTreeMap<Address, String>,
}

impl ShadowCallStack {
    pub fn new() -> Self {
        ShadowCallStack {
            return_addresses: Vec::new(),
            symbols: BTreeMap::new(),
        }
    }

    /// Register a function symbol starting at `address`
    pub fn add_symbol(&mut self, address: Address, name: &str) {
        self.symbols.insert(address, name.to_string());
    }

    pub fn push(&mut self, return_address: Address) {
        self.return_addresses.push(return_address);
    }

    pub fn pop(&mut self) -> Option<Address> {
        self.return_addresses.pop()
    }

    pub fn depth(&self) -> usize {
        self.return_addresses.len()
    }

    /// Name of the function containing `address`, with offset
    pub fn symbolize(&self, address: Address) -> Option<String> {
        self.symbols
            .range(..=address)
            .next_back()
            .map(|(&start, name)| match address - start {
                0 => name.clone(),
                offset => format!("{}+{:#x}", name, offset),
            })
    }
}

impl BacktraceProvider for ShadowCallStack {
    fn capture(&self) -> Backtrace {
        Backtrace::new(self.return_addresses.iter().rev().copied().collect())
    }

    fn render(&self, backtrace: &Backtrace, pid: u32, out: &mut dyn Write) -> io::Result<()> {
        if backtrace.is_empty() {
            return writeln!(out, "=={}==    (no backtrace)", pid);
        }
        for (i, &address) in backtrace.frames().iter().enumerate() {
            let symbol = self.symbolize(address).unwrap_or_else(|| "??".to_string());
            writeln!(out, "=={}==    #{}  {:#010x}  {}", pid, i, address, symbol)?;
        }
        Ok(())
    }
}
