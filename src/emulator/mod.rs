//! Emulator-side integration
//!
//! This module provides the glue between an instruction dispatcher and the
//! heap auditor:
//! - [`engine`]: the [`Emulator`](engine::Emulator) context and [`Op`](engine::Op) dispatch
//! - [`config`]: [`AuditConfig`](config::AuditConfig)
//! - [`errors`]: violation and error types
//!
//! # Execution Model
//!
//! The dispatcher feeds one target operation at a time. Allocator
//! notifications update the registry; loads and stores are audited before
//! they are committed. Violations are printed the moment they are found and
//! execution carries on. The leak scan is run once, when the target exits.
//!
//! # Allocator Re-entrancy
//!
//! The allocator reads and writes its own bookkeeping inside blocks that
//! may be freed. The context counts nested allocator calls and skips audits
//! while the count is non-zero.

pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
