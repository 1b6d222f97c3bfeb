//! Dump files for driving the binary.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const MODULE_BASE: u64 = 0x0040_0000;
pub const HEAP_BASE: u64 = 0x0050_0000;
pub const STACK_BASE: u64 = 0x0060_0000;

/// Payload addresses of the two live allocations.
pub const X: u64 = HEAP_BASE + 0x208;
pub const Y: u64 = HEAP_BASE + 0x220;

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn header(buf: &mut [u8], at: usize, units: u16, flags: u8, unused: u8) {
    buf[at..at + 2].copy_from_slice(&units.to_le_bytes());
    buf[at + 5] = flags;
    buf[at + 6] = unused;
}

/// Module -> X (16 bytes) -> Y (8 bytes of `y_fill`); a 1 KiB stack.
pub fn write_dump(dir: &Path, name: &str, y_fill: u8) -> PathBuf {
    let mut module = vec![0u8; 0x400];
    put_u32(&mut module, 4, X as u32);

    let mut heap = vec![0u8; 0x1000];
    put_u32(&mut heap, 0x58, (HEAP_BASE + 0x100) as u32);
    put_u32(&mut heap, 0x120, (HEAP_BASE + 0x200) as u32);
    header(&mut heap, 0x200, 3, 0x01, 8);
    put_u32(&mut heap, 0x208, Y as u32);
    header(&mut heap, 0x218, 2, 0x01, 8);
    heap[0x220..0x228].fill(y_fill);
    header(&mut heap, 0x228, 1, 0x10, 0);

    let stack = vec![0u8; 0x400];

    let file = |ext: &str| dir.join(format!("{name}.{ext}"));
    let blob: Vec<u8> = [module, heap, stack].concat();
    fs::write(file("core"), blob).expect("write core");
    fs::write(
        file("segments"),
        format!("{MODULE_BASE:08x}:400\n{HEAP_BASE:08x}:1000\n{STACK_BASE:08x}:400\n"),
    )
    .expect("write segments");
    fs::write(file("modules"), format!("{MODULE_BASE:08x}:400:app.exe\n")).expect("write modules");
    fs::write(file("heaps"), format!("{HEAP_BASE:08x} 00000002 0000 1 1 4 0\n"))
        .expect("write heaps");
    fs::write(file("stacks"), format!("{STACK_BASE:08x} 0000 00 rw 1\n")).expect("write stacks");
    dir.join(name)
}
