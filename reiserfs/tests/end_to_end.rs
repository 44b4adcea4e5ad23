//! End-to-end scenarios exercised against in-memory scratch devices: a
//! mkfs smoke test, hash values, a whole-tree traverse, a dumb-resize
//! expand, and a cross-device copy.

use reiserfs::device::MemDevice;
use reiserfs::fs::CreateParams;
use reiserfs::fs::Filesystem;
use reiserfs::fs::JournalCreateParams;
use reiserfs::gauge::NullGauge;
use reiserfs::hashes::hash_value;
use reiserfs::hashes::r5_hash;
use reiserfs::hashes::HashKind;
use reiserfs::journal::JOURNAL_MIN_SIZE;
use reiserfs::journal::JOURNAL_TRANS_MIN;
use reiserfs::node::NodeHeader;
use reiserfs::super_block::FS_FORMAT_3_6;
use reiserfs::tree::simple_traverse;

const BLOCK_SIZE: u32 = 4096;

fn create_params(block_count: u64) -> CreateParams {
    CreateParams {
        block_count,
        block_size: BLOCK_SIZE,
        format: FS_FORMAT_3_6,
        hash: HashKind::R5,
        journal: JournalCreateParams { len: JOURNAL_MIN_SIZE, max_trans: JOURNAL_TRANS_MIN },
        label: [0; 16],
        uuid: [0; 16],
    }
}

#[test]
fn mkfs_smoke_test() {
    let dev = Box::new(MemDevice::new(10_000, BLOCK_SIZE));
    let mut fs = Filesystem::create(dev, None, create_params(10_000), &mut NullGauge).unwrap();
    assert_eq!(fs.super_block().block_count, 10_000);

    let mut dir = fs.open_dir("/").unwrap();
    let mut ctx = fs.context();
    let dot = dir.read(&mut ctx).unwrap().unwrap();
    assert_eq!(dot.name, ".");
    assert_eq!((dot.dirid, dot.objid), (1, 2));

    let dotdot = dir.read(&mut ctx).unwrap().unwrap();
    assert_eq!(dotdot.name, "..");
    assert_eq!((dotdot.dirid, dotdot.objid), (0, 1));

    assert!(dir.read(&mut ctx).unwrap().is_none());
}

#[test]
fn hash_values_match_masked_r5_and_special_case_dot_entries() {
    let raw = r5_hash(b"hello");
    let masked = raw & 0x7FFF_FF80;
    let expected = if masked == 0 { 128 } else { masked };
    assert_eq!(hash_value(HashKind::R5, b"hello"), expected);

    assert_eq!(hash_value(HashKind::R5, b"."), 1);
    assert_eq!(hash_value(HashKind::Tea, b"."), 1);
    assert_eq!(hash_value(HashKind::Yura, b".."), 2);
}

#[test]
fn hash_value_is_stable_for_a_non_ascii_name_across_all_hash_kinds() {
    // "réiser" carries a multi-byte UTF-8 character, one of spec.md's named
    // hash-stability vectors; each hash must produce a deterministic, masked
    // value for it (exercising the sign-extension path the R5/TEA byte
    // arithmetic depends on for bytes outside the ASCII range).
    for kind in [HashKind::Tea, HashKind::Yura, HashKind::R5] {
        let first = hash_value(kind, "réiser".as_bytes());
        let second = hash_value(kind, "réiser".as_bytes());
        assert_eq!(first, second);
        assert_ne!(first, 0);
        assert_eq!(first & !0x7FFF_FF80, 0);
    }
}

#[test]
fn traverse_counts_one_leaf_zero_internals_on_a_fresh_tree() {
    let dev = Box::new(MemDevice::new(10_000, BLOCK_SIZE));
    let mut fs = Filesystem::create(dev, None, create_params(10_000), &mut NullGauge).unwrap();

    let mut leaves = 0;
    let mut internals = 0;
    {
        let ctx = fs.context();
        simple_traverse(ctx.dev, ctx.tree, ctx.tree.root, |node| {
            let header = NodeHeader::read(node.data());
            if header.is_leaf() {
                leaves += 1;
            } else {
                internals += 1;
            }
        })
        .unwrap();
    }
    assert_eq!(leaves, 1);
    assert_eq!(internals, 0);
}

#[test]
fn resize_dumb_expand_updates_block_count_and_bmap_nr() {
    let dev = Box::new(MemDevice::new(20_000, BLOCK_SIZE));
    let mut fs = Filesystem::create(dev, None, create_params(10_000), &mut NullGauge).unwrap();
    let old_bmap_nr = fs.super_block().bmap_nr;
    let free_before = fs.super_block().free_blocks;

    fs.resize_dumb(20_000, &mut NullGauge).unwrap();

    assert_eq!(fs.super_block().block_count, 20_000);
    let expected_bmap_nr = (20_000u64).div_ceil(8 * BLOCK_SIZE as u64) as u16;
    assert_eq!(fs.super_block().bmap_nr, expected_bmap_nr);
    // Growing adds 10,000 free blocks, minus whatever new bitmap blocks the
    // larger device now needs.
    let new_bitmap_blocks = fs.super_block().bmap_nr as i64 - old_bmap_nr as i64;
    assert_eq!(
        fs.super_block().free_blocks as i64,
        free_before as i64 + 10_000 - new_bitmap_blocks
    );
}

#[test]
fn copy_preserves_tree_height_and_root_directory_contents() {
    let src_dev = Box::new(MemDevice::new(10_000, BLOCK_SIZE));
    let mut src = Filesystem::create(src_dev, None, create_params(10_000), &mut NullGauge).unwrap();
    let src_height = src.tree().height;

    let dst_dev = Box::new(MemDevice::new(10_000, BLOCK_SIZE));
    let mut dst = src.copy(dst_dev, None, &mut NullGauge).unwrap();

    assert_eq!(dst.tree().height, src_height);
    assert_eq!(dst.super_block().tree_height, src.super_block().tree_height);

    let mut dir = dst.open_dir("/").unwrap();
    let mut ctx = dst.context();
    let dot = dir.read(&mut ctx).unwrap().unwrap();
    assert_eq!(dot.name, ".");
    assert_eq!(hash_value(HashKind::R5, dot.name.as_bytes()), 1);
    let dotdot = dir.read(&mut ctx).unwrap().unwrap();
    assert_eq!(dotdot.name, "..");
    assert_eq!((dotdot.dirid, dotdot.objid), (0, 1));
}
