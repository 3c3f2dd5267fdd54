//! # Introduction
//!
//! heapsentry audits the heap of a program running inside an
//! instruction-level emulator. It follows every malloc() and free() the
//! target makes, checks loads and stores against freed blocks, and at exit
//! looks for blocks nothing points to any more.
//!
//! ## Pipeline
//!
//! ```text
//! Dispatcher → Emulator context → MallocTracer → Reporter
//!                    │                 │
//!                    └──── SoftMmu ◄───┘ (shadow bits, leak scan)
//! ```
//!
//! 1. [`emulator`]: the context object the dispatcher drives, with
//!    [`emulator::engine::Op`] as the unit of work.
//! 2. [`tracer`]: allocation registry, audit hooks and leak scan.
//! 3. [`memory`]: regions with shadow bits behind the
//!    [`memory::MemoryProvider`] trait.
//! 4. [`backtrace`]: call-stack capture and rendering.
//! 5. [`report`]: coloured diagnostic output.
//!
//! ## Reported bugs
//!
//! Double free, invalid free, use-after-free (read or write) and leaks. None
//! of them stop emulation.

pub mod backtrace;
pub mod emulator;
pub mod memory;
pub mod report;
pub mod tracer;
