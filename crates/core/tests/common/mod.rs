//! Synthetic dumps for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use memdiff_core::dump::{DumpRecords, MemoryDump, ModuleRecord, RegionRecord};
use memdiff_core::graph::{MemoryGraph, Pointer};
use memdiff_core::model::{Segment, SegmentData};

pub const MODULE_BASE: u64 = 0x0040_0000;
pub const HEAP_BASE: u64 = 0x0050_0000;
pub const STACK_BASE: u64 = 0x0060_0000;

pub const HEAP_SIZE: usize = 0x1000;
pub const REGION_SIZE: usize = 0x400;

const USED: u8 = 0x01;
const END: u8 = 0x10;

pub fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// A heap with one segment-list entry whose block chain starts at `+0x200`.
#[derive(Debug, Clone)]
pub struct HeapImage {
    pub base: u64,
    pub bytes: Vec<u8>,
    cursor: usize,
}

impl HeapImage {
    pub const ENTRY: usize = 0x100;
    pub const FIRST_BLOCK: usize = 0x200;

    pub fn new(base: u64) -> Self {
        let mut bytes = vec![0u8; HEAP_SIZE];
        put_u32(&mut bytes, 0x58, (base + Self::ENTRY as u64) as u32);
        put_u32(&mut bytes, Self::ENTRY + 0x20, (base + Self::FIRST_BLOCK as u64) as u32);
        Self { base, bytes, cursor: Self::FIRST_BLOCK }
    }

    /// `len` zero bytes with no segment-list table.
    pub fn blank(base: u64, len: usize) -> Self {
        Self { base, bytes: vec![0u8; len], cursor: 0 }
    }

    fn header(&mut self, units: u16, flags: u8, unused: u8) {
        let at = self.cursor;
        self.bytes[at..at + 2].copy_from_slice(&units.to_le_bytes());
        self.bytes[at + 5] = flags;
        self.bytes[at + 6] = unused;
    }

    /// Append a used block holding `payload`; returns the payload address.
    pub fn used(&mut self, payload: &[u8]) -> u64 {
        let units = (payload.len() + 8 + 7) / 8;
        let unused = units * 8 - payload.len();
        self.header(units as u16, USED, unused as u8);
        let start = self.cursor + 8;
        self.bytes[start..start + payload.len()].copy_from_slice(payload);
        self.cursor += units * 8;
        self.base + start as u64
    }

    /// Append a raw header and skip `units * 8` bytes.
    pub fn raw_block(&mut self, units: u16, flags: u8, unused: u8) -> u64 {
        self.header(units, flags, unused);
        let address = self.base + self.cursor as u64 + 8;
        self.cursor += usize::from(units) * 8;
        address
    }

    pub fn free(&mut self, units: u16) {
        self.raw_block(units, 0, 0);
    }

    pub fn end(&mut self) {
        self.raw_block(1, END, 0);
    }
}

/// Builds dumps from address-tagged byte regions.
#[derive(Debug, Clone, Default)]
pub struct DumpBuilder {
    regions: Vec<(u64, Vec<u8>)>,
    records: DumpRecords,
}

impl DumpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment(mut self, address: u64, bytes: Vec<u8>) -> Self {
        self.records.segments.push(RegionRecord { address, size: bytes.len() as u64 });
        self.regions.push((address, bytes));
        self
    }

    pub fn module(self, name: &str, address: u64, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        let mut this = self.segment(address, bytes);
        this.records.modules.push(ModuleRecord { address, size, name: name.to_string() });
        this
    }

    pub fn heap(self, image: HeapImage) -> Self {
        let size = image.bytes.len() as u64;
        let mut this = self.segment(image.base, image.bytes);
        this.records.heaps.push(RegionRecord { address: image.base, size });
        this
    }

    pub fn stack(self, address: u64, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        let mut this = self.segment(address, bytes);
        this.records.stacks.push(RegionRecord { address, size });
        this
    }

    pub fn private_data(self, address: u64, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        let mut this = self.segment(address, bytes);
        this.records.private_data.push(RegionRecord { address, size });
        this
    }

    pub fn records(&self) -> DumpRecords {
        self.records.clone()
    }

    /// Segment bytes concatenated in address order.
    pub fn blob(&self) -> Vec<u8> {
        let mut regions = self.regions.clone();
        regions.sort_by_key(|(address, _)| *address);
        regions.into_iter().flat_map(|(_, bytes)| bytes).collect()
    }

    pub fn build(&self, name: &str) -> MemoryDump {
        MemoryDump::from_records(name, &self.records, self.blob()).expect("valid synthetic dump")
    }

    /// Write the dump's file family into `dir`; returns the base path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let base = dir.join(name);
        let file = |ext: &str| dir.join(format!("{name}.{ext}"));
        fs::write(file("core"), self.blob()).expect("write core");

        let segments: String = self
            .records
            .segments
            .iter()
            .map(|r| format!("{:08x}:{:x}\n", r.address, r.size))
            .collect();
        fs::write(file("segments"), segments).expect("write segments");

        let modules: String = self
            .records
            .modules
            .iter()
            .map(|m| format!("{:08x}:{:x}:{}\n", m.address, m.size, m.name))
            .collect();
        fs::write(file("modules"), modules).expect("write modules");

        let kib = |size: u64| {
            assert_eq!(size % 1024, 0, "listed regions must be whole KiB");
            size / 1024
        };
        let heaps: String = self
            .records
            .heaps
            .iter()
            .map(|r| format!("{:08x} 00000002 0000 00000001 00000001 {} 0\n", r.address, kib(r.size)))
            .collect();
        fs::write(file("heaps"), heaps).expect("write heaps");

        let listing = |regions: &[RegionRecord]| -> String {
            regions
                .iter()
                .map(|r| format!("{:08x} 0000 00 rw {}\n", r.address, kib(r.size)))
                .collect()
        };
        fs::write(file("stacks"), listing(&self.records.stacks)).expect("write stacks");
        fs::write(file("pdata"), listing(&self.records.private_data)).expect("write pdata");
        base
    }
}

/// Addresses of the allocations placed by [`standard_dump`].
#[derive(Debug, Clone, Copy)]
pub struct StandardLayout {
    /// Referenced by the module at offset 4.
    pub x: u64,
    /// Referenced by `x` at offset 0.
    pub y: u64,
    /// Referenced by nothing; points at `x`.
    pub garbage: u64,
    /// Referenced by the stack.
    pub w: u64,
}

/// Module -> x -> y, stack -> w, garbage -> x (unreachable).
///
/// `y_fill` sets the content of `y` so snapshots can differ.
pub fn standard_dump(name: &str, y_fill: u8) -> (MemoryDump, StandardLayout) {
    let (builder, layout) = standard_builder(y_fill);
    (builder.build(name), layout)
}

pub fn standard_builder(y_fill: u8) -> (DumpBuilder, StandardLayout) {
    let mut heap = HeapImage::new(HEAP_BASE);
    let y_address = HEAP_BASE + HeapImage::FIRST_BLOCK as u64 + 24 + 8;
    let mut x_payload = vec![0u8; 16];
    put_u32(&mut x_payload, 0, y_address as u32);
    let x = heap.used(&x_payload);
    let y = heap.used(&[y_fill; 8]);
    assert_eq!(y, y_address);
    let mut garbage_payload = vec![0u8; 8];
    put_u32(&mut garbage_payload, 0, x as u32);
    let garbage = heap.used(&garbage_payload);
    heap.free(2);
    let w = heap.used(&[0x5a; 8]);
    heap.end();

    let mut module = vec![0u8; REGION_SIZE];
    put_u32(&mut module, 4, x as u32);
    let mut stack = vec![0u8; REGION_SIZE];
    put_u32(&mut stack, 0x10, w as u32);

    let builder = DumpBuilder::new()
        .module("app.exe", MODULE_BASE, module)
        .heap(heap)
        .stack(STACK_BASE, stack);
    (builder, StandardLayout { x, y, garbage, w })
}

/// A data structure node with the given content.
pub fn node(address: u64, bytes: &[u8]) -> Segment {
    Segment::data_structure(address, SegmentData::new(bytes.to_vec()))
}

pub fn module_node(name: &str, address: u64, size: usize) -> Segment {
    Segment::module(name, address, SegmentData::new(vec![0u8; size]))
}

/// Graph with one root module pointing at each of `nodes`.
pub fn rooted_graph(name: &str, nodes: &[Segment]) -> MemoryGraph {
    let mut graph = MemoryGraph::new(name);
    let root = graph.add_node(module_node("app.exe", MODULE_BASE, 16));
    for (i, segment) in nodes.iter().enumerate() {
        let ix = graph.add_node(segment.clone());
        graph
            .add_edge(root, ix, Pointer { offset_src: 4 * i as u64, offset_dest: 0 })
            .expect("edge endpoints exist");
    }
    graph
}
