// Integration tests for the leak reachability scan

mod common;

use common::*;
use heapsentry::emulator::errors::Violation;
use heapsentry::memory::value::PointerWidth;
use heapsentry::memory::MemoryProvider;

#[test]
fn test_unreferenced_block_leaks_until_freed() {
    let (mut emu, capture) = emulator();
    let a = HEAP_BASE;
    emu.on_allocate(a, 16).unwrap();

    let summary = emu.run_leak_scan();
    assert_eq!(summary.leak_count(), 1);
    assert_eq!(summary.bytes_leaked, 16);
    assert!(matches!(
        summary.leaks[0],
        Violation::Leak { address, size: 16, .. } if address == a
    ));
    let text = capture.text();
    assert!(text.contains("Leak, 16-byte allocation at address 0x10000000"));
    assert!(text.contains("1 leak(s) found: 16 byte(s) leaked"));

    emu.on_free(a);
    let summary = emu.run_leak_scan();
    assert!(summary.is_clean());
    assert!(capture.text().contains("No leaks found!"));
}

#[test]
fn test_block_referenced_from_other_block_is_reachable() {
    let (mut emu, _capture) = emulator();
    let a = HEAP_BASE;
    let b = HEAP_BASE + 0x20;
    emu.on_allocate(a, 16).unwrap();
    emu.on_allocate(b, 8).unwrap();
    emu.mmu_mut().write_word(b, a, PointerWidth::Eight).unwrap();

    let summary = emu.run_leak_scan();
    let leaked: Vec<u64> = summary.leaks.iter().map(|l| l.address()).collect();
    assert_eq!(leaked, vec![b]);
    assert_eq!(summary.bytes_leaked, 8);
}

#[test]
fn test_uninitialized_pointer_value_does_not_count() {
    let (mut emu, _capture) = emulator();
    let a = HEAP_BASE;
    let b = HEAP_BASE + 0x20;

    // Stale pointer left behind in memory that is then handed out again
    emu.on_allocate(b, 8).unwrap();
    emu.mmu_mut().write_word(b, a, PointerWidth::Eight).unwrap();
    emu.on_free(b);
    emu.on_allocate(b, 8).unwrap();
    emu.on_allocate(a, 16).unwrap();

    let summary = emu.run_leak_scan();
    assert_eq!(summary.leak_count(), 2);
}

#[test]
fn test_misaligned_pointer_is_not_found() {
    let (mut emu, _capture) = emulator();
    let a = HEAP_BASE;
    let b = HEAP_BASE + 0x20;
    emu.on_allocate(a, 16).unwrap();
    emu.on_allocate(b, 32).unwrap();
    emu.mmu_mut().write_word(b + 4, a, PointerWidth::Eight).unwrap();

    let summary = emu.run_leak_scan();
    let leaked: Vec<u64> = summary.leaks.iter().map(|l| l.address()).collect();
    assert_eq!(leaked, vec![a, b]);
}

#[test]
fn test_interior_pointer_is_not_found() {
    let (mut emu, _capture) = emulator();
    let a = HEAP_BASE;
    emu.on_allocate(a, 16).unwrap();
    emu.mmu_mut()
        .write_word(DATA_BASE, a + 8, PointerWidth::Eight)
        .unwrap();

    assert_eq!(emu.run_leak_scan().leak_count(), 1);
}

#[test]
fn test_root_regions() {
    let (mut emu, _capture) = emulator();
    let in_data = HEAP_BASE;
    let in_anon = HEAP_BASE + 0x20;
    let on_stack = HEAP_BASE + 0x40;
    let in_text = HEAP_BASE + 0x60;
    for address in [in_data, in_anon, on_stack, in_text] {
        emu.on_allocate(address, 16).unwrap();
    }

    let width = PointerWidth::Eight;
    emu.mmu_mut().write_word(DATA_BASE + 0x10, in_data, width).unwrap();
    emu.mmu_mut().write_word(ANON_BASE + 0x08, in_anon, width).unwrap();
    emu.mmu_mut().write_word(STACK_BASE + 0x20, on_stack, width).unwrap();
    emu.mmu_mut().write_word(TEXT_BASE + 0x30, in_text, width).unwrap();

    let summary = emu.run_leak_scan();
    let leaked: Vec<u64> = summary.leaks.iter().map(|l| l.address()).collect();
    assert_eq!(leaked, vec![on_stack, in_text]);
    assert_eq!(summary.bytes_leaked, 32);
}

#[test]
fn test_freed_block_is_not_a_root() {
    let (mut emu, _capture) = emulator();
    let a = HEAP_BASE;
    let b = HEAP_BASE + 0x20;
    emu.on_allocate(a, 16).unwrap();
    emu.on_allocate(b, 8).unwrap();
    emu.mmu_mut().write_word(b, a, PointerWidth::Eight).unwrap();
    emu.on_free(b);

    let summary = emu.run_leak_scan();
    assert_eq!(summary.leaks.len(), 1);
    assert_eq!(summary.leaks[0].address(), a);
}

#[test]
fn test_self_reference_does_not_count() {
    let (mut emu, _capture) = emulator();
    let a = HEAP_BASE;
    emu.on_allocate(a, 16).unwrap();
    emu.mmu_mut().write_word(a, a, PointerWidth::Eight).unwrap();

    assert_eq!(emu.run_leak_scan().leak_count(), 1);
}

#[test]
fn test_unreachable_cycle_reported_reachable() {
    // Two blocks pointing at each other with no root: each is "pointed to by
    // a live block", so neither is reported.
    let (mut emu, capture) = emulator();
    let a = HEAP_BASE;
    let b = HEAP_BASE + 0x20;
    emu.on_allocate(a, 16).unwrap();
    emu.on_allocate(b, 16).unwrap();
    emu.mmu_mut().write_word(a, b, PointerWidth::Eight).unwrap();
    emu.mmu_mut().write_word(b, a, PointerWidth::Eight).unwrap();

    assert!(emu.run_leak_scan().is_clean());
    assert!(capture.text().contains("No leaks found!"));
}

#[test]
fn test_leaked_list_reports_only_head() {
    let (mut emu, _capture) = emulator();
    let nodes = [HEAP_BASE, HEAP_BASE + 0x20, HEAP_BASE + 0x40];
    for &node in &nodes {
        emu.on_allocate(node, 16).unwrap();
    }
    // node[i].next = node[i + 1]
    for pair in nodes.windows(2) {
        emu.mmu_mut()
            .write_word(pair[0] + 8, pair[1], PointerWidth::Eight)
            .unwrap();
    }

    let summary = emu.run_leak_scan();
    assert_eq!(summary.leak_count(), 1);
    assert_eq!(summary.leaks[0].address(), nodes[0]);
}

#[test]
fn test_32bit_pointer_width() {
    let (mut emu, _capture) = emulator_32bit();
    let a = HEAP_BASE;
    let b = HEAP_BASE + 0x20;
    emu.on_allocate(a, 16).unwrap();
    emu.on_allocate(b, 8).unwrap();

    // 4-byte aligned, which is enough at this width
    emu.mmu_mut().write_word(b + 4, a, PointerWidth::Four).unwrap();

    let summary = emu.run_leak_scan();
    let leaked: Vec<u64> = summary.leaks.iter().map(|l| l.address()).collect();
    assert_eq!(leaked, vec![b]);
}

#[test]
fn test_scan_restores_auditing_flag() {
    let (mut emu, _capture) = emulator();
    emu.on_allocate(HEAP_BASE, 16).unwrap();

    emu.run_leak_scan();
    assert!(emu.is_auditing_enabled());

    emu.set_auditing_enabled(false);
    emu.run_leak_scan();
    assert!(!emu.is_auditing_enabled());
}

#[test]
fn test_scan_does_not_report_use_after_free() {
    let (mut emu, capture) = emulator();
    emu.on_allocate(HEAP_BASE, 16).unwrap();
    emu.on_allocate(HEAP_BASE + 0x20, 16).unwrap();
    emu.on_free(HEAP_BASE);

    emu.run_leak_scan();
    assert_eq!(capture.count("Use-after-free"), 0);
    assert!(emu
        .mmu()
        .read_word(HEAP_BASE + 0x20, PointerWidth::Eight)
        .is_ok());
}
