mod common;

use common::{put_u32, standard_dump, DumpBuilder, HeapImage, HEAP_BASE, HEAP_SIZE};
use memdiff_core::config::HeapLayout;
use memdiff_core::heap::{parse_all_data_structures, CorruptReason, HeapError, HeapParser};
use memdiff_core::model::SegmentKind;
use proptest::prelude::*;

const USED: u8 = 0x01;
const OTHER_HEAP: u64 = 0x0070_0000;
const CHAIN_SEGMENT: u64 = 0x0080_0000;

fn parse_single(image: HeapImage) -> Result<Vec<memdiff_core::model::Segment>, HeapError> {
    let dump = DumpBuilder::new().heap(image).build("heap");
    let layout = HeapLayout::default();
    HeapParser::new(&dump, &layout).parse_heap(&dump.heaps[0])
}

#[test]
fn used_blocks_become_sorted_data_structures() {
    let (dump, layout) = standard_dump("snap", 0x11);
    let extraction = parse_all_data_structures(&dump, &HeapLayout::default());
    assert!(extraction.failures.is_empty());

    let found: Vec<(u64, u64)> =
        extraction.structures.iter().map(|ds| (ds.address, ds.size)).collect();
    assert_eq!(
        found,
        vec![(layout.x, 16), (layout.y, 8), (layout.garbage, 8), (layout.w, 8)]
    );
    let y = &extraction.structures[1];
    assert_eq!(y.kind, SegmentKind::DataStructure);
    assert_eq!(y.bytes(), &[0x11; 8]);
    assert_eq!(dump.offset_from_address(y.address).unwrap(), y.offset.unwrap());
}

#[test]
fn single_used_block_without_unused_bytes_yields_declared_size() {
    let mut image = HeapImage::new(HEAP_BASE);
    let address = image.raw_block(2, USED, 0);
    image.end();

    let found = parse_single(image).expect("well-formed heap");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].address, address);
    assert_eq!(found[0].size, 16);
}

#[test]
fn free_and_end_blocks_are_not_emitted() {
    let mut image = HeapImage::new(HEAP_BASE);
    image.free(4);
    image.end();
    assert!(parse_single(image).expect("well-formed heap").is_empty());
}

#[test]
fn chain_without_end_flag_is_corrupt() {
    let mut image = HeapImage::new(HEAP_BASE);
    let blocks = (HEAP_SIZE - HeapImage::FIRST_BLOCK) / 0x200;
    for _ in 0..blocks {
        image.free(0x40);
    }

    let err = parse_single(image).unwrap_err();
    let HeapError::CorruptHeap { heap, offset, reason } = err;
    assert_eq!(heap, format!("{HEAP_BASE:#010x}({HEAP_SIZE})"));
    assert_eq!(offset, HEAP_SIZE as u64);
    assert!(matches!(reason, CorruptReason::ChainOverrun { .. }));
}

#[test]
fn zero_sized_block_is_corrupt() {
    let mut image = HeapImage::new(HEAP_BASE);
    image.raw_block(0, USED, 0);
    let err = parse_single(image).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::ZeroSizedBlock);
}

#[test]
fn unused_count_larger_than_block_is_corrupt() {
    let mut image = HeapImage::new(HEAP_BASE);
    image.raw_block(1, USED, 20);
    image.end();
    let err = parse_single(image).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::OversizedUnusedCount { unused: 20, block: 8 });
}

#[test]
fn unmapped_segment_list_entry_is_corrupt() {
    let mut image = HeapImage::new(HEAP_BASE);
    put_u32(&mut image.bytes, 0x58, 0x0900_0000);
    let err = parse_single(image).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::UnmappedSegmentList { address: 0x0900_0000 });
}

#[test]
fn unmapped_first_block_is_corrupt() {
    let mut image = HeapImage::new(HEAP_BASE);
    put_u32(&mut image.bytes, HeapImage::ENTRY + 0x20, 0x0900_0000);
    let err = parse_single(image).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::UnmappedFirstBlock { address: 0x0900_0000 });
}

#[test]
fn corrupt_heap_does_not_stop_other_heaps() {
    let mut bad = HeapImage::new(HEAP_BASE);
    bad.raw_block(0, USED, 0);
    let mut good = HeapImage::new(OTHER_HEAP);
    let kept = good.used(&[1, 2, 3, 4]);
    good.end();

    let dump = DumpBuilder::new().heap(bad).heap(good).build("mixed");
    let extraction = parse_all_data_structures(&dump, &HeapLayout::default());
    assert_eq!(extraction.failures.len(), 1);
    assert_eq!(extraction.structures.len(), 1);
    assert_eq!(extraction.structures[0].address, kept);
    assert_eq!(extraction.structures[0].bytes(), &[1, 2, 3, 4]);
}

#[test]
fn multiple_segment_list_entries_are_walked() {
    let mut image = HeapImage::new(HEAP_BASE);
    let first = image.used(&[0xaa; 8]);
    image.end();
    // Second entry at +0x140 whose chain starts at +0x800.
    put_u32(&mut image.bytes, 0x5c, (HEAP_BASE + 0x140) as u32);
    put_u32(&mut image.bytes, 0x140 + 0x20, (HEAP_BASE + 0x800) as u32);
    image.bytes[0x800..0x802].copy_from_slice(&2u16.to_le_bytes());
    image.bytes[0x805] = USED;
    image.bytes[0x810..0x812].copy_from_slice(&1u16.to_le_bytes());
    image.bytes[0x815] = 0x10;

    let found = parse_single(image).expect("well-formed heap");
    let addresses: Vec<u64> = found.iter().map(|ds| ds.address).collect();
    assert_eq!(addresses, vec![first, HEAP_BASE + 0x808]);
}

#[test]
fn chain_filling_its_segment_without_end_hits_the_block_cap() {
    let mut image = HeapImage::new(HEAP_BASE);
    put_u32(&mut image.bytes, HeapImage::ENTRY + 0x20, CHAIN_SEGMENT as u32);
    // 32 one-unit free blocks, none flagged end.
    let mut chain = vec![0u8; 0x100];
    for block in chain.chunks_mut(8) {
        block[0] = 1;
    }

    let dump = DumpBuilder::new().heap(image).segment(CHAIN_SEGMENT, chain).build("looping");
    let layout = HeapLayout::default();
    let err = HeapParser::new(&dump, &layout).parse_heap(&dump.heaps[0]).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::Unterminated { limit: 32 });
    let HeapError::CorruptHeap { offset, .. } = err;
    assert_eq!(offset, HEAP_SIZE as u64 + 0x100);
}

#[test]
fn heap_too_short_for_segment_list_is_corrupt() {
    let err = parse_single(HeapImage::blank(HEAP_BASE, 0x40)).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::TruncatedSegmentList);
}

#[test]
fn layout_offsets_past_the_address_range_are_corrupt() {
    let (dump, _) = standard_dump("snap", 1);

    let table = HeapLayout { segment_list_offset: u64::MAX - 2, ..HeapLayout::default() };
    let err = HeapParser::new(&dump, &table).parse_heap(&dump.heaps[0]).unwrap_err();
    assert_eq!(err.reason(), &CorruptReason::TruncatedSegmentList);

    let entry = HeapLayout { first_entry_field: u64::MAX, ..HeapLayout::default() };
    let err = HeapParser::new(&dump, &entry).parse_heap(&dump.heaps[0]).unwrap_err();
    assert_eq!(
        err.reason(),
        &CorruptReason::UnmappedFirstBlock { address: HEAP_BASE + HeapImage::ENTRY as u64 }
    );
}

proptest! {
    #[test]
    fn arbitrary_chain_bytes_never_escape_the_heap(
        chain in prop::collection::vec(any::<u8>(), HEAP_SIZE - HeapImage::FIRST_BLOCK),
        first_entry_field in prop_oneof![Just(0x20u64), any::<u64>()],
    ) {
        let mut image = HeapImage::new(HEAP_BASE);
        image.bytes[HeapImage::FIRST_BLOCK..].copy_from_slice(&chain);
        let dump = DumpBuilder::new().heap(image).build("fuzz");
        let layout = HeapLayout { first_entry_field, ..HeapLayout::default() };

        match HeapParser::new(&dump, &layout).parse_heap(&dump.heaps[0]) {
            Ok(found) => {
                for ds in found {
                    prop_assert!(ds.address >= HEAP_BASE);
                    prop_assert!(ds.end() <= HEAP_BASE + HEAP_SIZE as u64);
                    prop_assert_eq!(ds.bytes().len() as u64, ds.size);
                }
            }
            Err(HeapError::CorruptHeap { heap, .. }) => {
                prop_assert_eq!(heap, format!("{HEAP_BASE:#010x}({HEAP_SIZE})"));
            }
        }
    }
}
