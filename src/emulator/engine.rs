// Emulator context: owns memory, call stack, tracer and reporter

use crate::backtrace::{BacktraceProvider, ShadowCallStack};
use crate::emulator::config::AuditConfig;
use crate::emulator::errors::{AuditError, Violation};
use crate::memory::mmu::SoftMmu;
use crate::memory::value::Address;
use crate::memory::MemoryProvider;
use crate::report::Reporter;
use crate::tracer::{LeakSummary, MallocTracer};

/// One target operation, as seen by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Call instruction; `return_address` is pushed on the shadow call stack
    Call { return_address: Address },

    /// Return instruction
    Ret,

    /// Execution entered the allocator's own code
    EnterAllocator,

    /// Execution left the allocator's own code
    LeaveAllocator,

    /// malloc() returned `address`
    Malloc { address: Address, size: usize },

    /// free() was called with `address`
    Free { address: Address },

    /// Load of `size` bytes
    Load { address: Address, size: usize },

    /// Store of `bytes`
    Store { address: Address, bytes: Vec<u8> },
}

/// Everything one emulated process needs for heap auditing
pub struct Emulator<M = SoftMmu, B = ShadowCallStack> {
    /// Emulated memory
    mmu: M,

    /// Call stack used for every backtrace
    backtracer: B,

    /// Allocation registry and audit hooks
    tracer: MallocTracer,

    /// Diagnostic stream
    reporter: Reporter,

    /// How many allocator calls are currently active; accesses are not
    /// audited while this is non-zero
    allocator_depth: usize,
}

impl<M: MemoryProvider, B: BacktraceProvider> Emulator<M, B> {
    /// Create a context reporting to stderr
    pub fn new(mmu: M, backtracer: B, config: AuditConfig) -> Self {
        let reporter = Reporter::stderr(config.pid, config.colored);
        Self::with_reporter(mmu, backtracer, config, reporter)
    }

    /// Create a context with a custom diagnostic stream
    pub fn with_reporter(mmu: M, backtracer: B, config: AuditConfig, reporter: Reporter) -> Self {
        Emulator {
            mmu,
            backtracer,
            tracer: MallocTracer::new(config.pointer_width, config.auditing_enabled),
            reporter,
            allocator_depth: 0,
        }
    }

    pub fn mmu(&self) -> &M {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut M {
        &mut self.mmu
    }

    pub fn backtracer(&self) -> &B {
        &self.backtracer
    }

    pub fn backtracer_mut(&mut self) -> &mut B {
        &mut self.backtracer
    }

    pub fn tracer(&self) -> &MallocTracer {
        &self.tracer
    }

    pub fn is_auditing_enabled(&self) -> bool {
        self.tracer.is_auditing_enabled()
    }

    pub fn set_auditing_enabled(&mut self, enabled: bool) {
        self.tracer.set_auditing_enabled(enabled);
    }

    /// Is the target currently executing inside its own allocator?
    pub fn is_in_allocator(&self) -> bool {
        self.allocator_depth > 0
    }

    pub fn enter_allocator(&mut self) {
        self.allocator_depth += 1;
    }

    pub fn leave_allocator(&mut self) -> Result<(), AuditError> {
        self.allocator_depth = self
            .allocator_depth
            .checked_sub(1)
            .ok_or(AuditError::AllocatorDepthUnderflow)?;
        Ok(())
    }

    fn emit(&mut self, violation: &Violation) {
        if let Err(e) = self.reporter.report(violation, &self.backtracer) {
            log::warn!("failed to write report: {}", e);
        }
    }

    fn report_if_any(&mut self, violation: Option<Violation>) -> Option<Violation> {
        if let Some(v) = &violation {
            self.emit(v);
        }
        violation
    }

    /// malloc() returned `address`
    pub fn on_allocate(&mut self, address: Address, size: usize) -> Result<(), AuditError> {
        self.tracer
            .on_allocate(&mut self.mmu, &self.backtracer, address, size)?;
        Ok(())
    }

    /// free() was called with `address`
    pub fn on_free(&mut self, address: Address) -> Option<Violation> {
        let violation = self.tracer.on_free(&self.backtracer, address);
        self.report_if_any(violation)
    }

    /// A load of `size` bytes at `address` is about to happen
    pub fn audit_read(&mut self, address: Address, size: usize) -> Option<Violation> {
        let violation =
            self.tracer
                .audit_read(&self.backtracer, self.is_in_allocator(), address, size);
        self.report_if_any(violation)
    }

    /// A store of `size` bytes at `address` is about to happen
    pub fn audit_write(&mut self, address: Address, size: usize) -> Option<Violation> {
        let violation =
            self.tracer
                .audit_write(&self.backtracer, self.is_in_allocator(), address, size);
        self.report_if_any(violation)
    }

    /// Scan for leaks and print every leak plus a summary line
    pub fn run_leak_scan(&mut self) -> LeakSummary {
        let summary = self.tracer.find_leaks(&self.mmu);
        if let Err(e) = self.reporter.report_leaks(&summary, &self.backtracer) {
            log::warn!("failed to write leak report: {}", e);
        }
        summary
    }
}

impl<M: MemoryProvider> Emulator<M, ShadowCallStack> {
    /// Dispatch a single operation
    pub fn step(&mut self, op: &Op) -> Result<Option<Violation>, AuditError> {
        match op {
            Op::Call { return_address } => {
                self.backtracer.push(*return_address);
                Ok(None)
            }
            Op::Ret => {
                self.backtracer
                    .pop()
                    .ok_or(AuditError::CallStackUnderflow)?;
                Ok(None)
            }
            Op::EnterAllocator => {
                self.enter_allocator();
                Ok(None)
            }
            Op::LeaveAllocator => {
                self.leave_allocator()?;
                Ok(None)
            }
            Op::Malloc { address, size } => {
                self.on_allocate(*address, *size)?;
                Ok(None)
            }
            Op::Free { address } => Ok(self.on_free(*address)),
            // Accesses are audited before they reach memory
            Op::Load { address, size } => {
                let violation = self.audit_read(*address, *size);
                self.mmu.read_bytes(*address, *size)?;
                Ok(violation)
            }
            Op::Store { address, bytes } => {
                let violation = self.audit_write(*address, bytes.len());
                self.mmu.write_bytes(*address, bytes)?;
                Ok(violation)
            }
        }
    }

    /// Dispatch operations in order, collecting every violation reported
    pub fn run<'a, I>(&mut self, ops: I) -> Result<Vec<Violation>, AuditError>
    where
        I: IntoIterator<Item = &'a Op>,
    {
        let mut violations = Vec::new();
        for op in ops {
            if let Some(v) = self.step(op)? {
                violations.push(v);
            }
        }
        Ok(violations)
    }
}
