// Shared fixtures for the integration tests

#![allow(dead_code)]

use heapsentry::backtrace::ShadowCallStack;
use heapsentry::emulator::config::AuditConfig;
use heapsentry::emulator::engine::Emulator;
use heapsentry::memory::mmu::SoftMmu;
use heapsentry::memory::region::Region;
use heapsentry::memory::value::PointerWidth;
use heapsentry::report::Reporter;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

pub const TEXT_BASE: u64 = 0x0040_0000;
pub const DATA_BASE: u64 = 0x0080_0000;
pub const ANON_BASE: u64 = 0x2000_0000;
pub const HEAP_BASE: u64 = 0x1000_0000;
pub const STACK_BASE: u64 = 0x7fff_0000;
pub const PID: u32 = 4242;

/// Diagnostic stream that keeps everything written to it
#[derive(Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.text().matches(needle).count()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Address space with text, data, an anonymous mapping, one malloc block and a stack
pub fn address_space() -> SoftMmu {
    let mut mmu = SoftMmu::new();
    mmu.add_region(Region::text(TEXT_BASE, 0x1000)).unwrap();
    mmu.add_region(Region::data(DATA_BASE, 0x100, ".data"))
        .unwrap();
    mmu.add_region(Region::mapped(ANON_BASE, 0x100, "anon"))
        .unwrap();
    mmu.add_region(Region::malloc_block(HEAP_BASE, 0x1000))
        .unwrap();
    mmu.add_region(Region::stack(STACK_BASE, 0x1000)).unwrap();
    mmu
}

pub fn emulator_with(config: AuditConfig) -> (Emulator, Capture) {
    init_logging();
    let capture = Capture::default();
    let config = config.with_pid(PID).with_color(false);
    let reporter = Reporter::new(Box::new(capture.clone()), config.pid, config.colored);
    let mut stack = ShadowCallStack::new();
    stack.add_symbol(TEXT_BASE, "main");
    stack.add_symbol(TEXT_BASE + 0x100, "make_list");
    stack.add_symbol(TEXT_BASE + 0x200, "destroy_list");
    let emulator = Emulator::with_reporter(address_space(), stack, config, reporter);
    (emulator, capture)
}

pub fn emulator() -> (Emulator, Capture) {
    emulator_with(AuditConfig::default())
}

pub fn emulator_32bit() -> (Emulator, Capture) {
    emulator_with(AuditConfig::default().with_pointer_width(PointerWidth::Four))
}
