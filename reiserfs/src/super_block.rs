//! The superblock: probing, validation, creation, and sync.

use crate::bitmap::Bitmap;
use crate::block::Block;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;

pub const FS_FORMAT_3_5: u16 = 0;
pub const FS_FORMAT_3_6: u16 = 1;

pub const FS_CONSISTENT: u16 = 0;
pub const FS_CORRUPTED: u16 = 1;

pub const FS_CLEAN: u16 = 0;
pub const FS_ERROR: u16 = 2;

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_SUPER_OFFSET: u64 = 64 * 1024;

pub const SIG_3_5: [u8; 10] = *b"ReIsErFs\0\0";
pub const SIG_3_6: [u8; 10] = *b"ReIsEr2Fs\0";
pub const SIG_JR: [u8; 10] = *b"ReIsEr3Fs\0";

/// `start u32, dev u32, len u32, trans_max u32, magic u32, max_batch u32,
/// max_commit_age u32, max_trans_age u32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalParams {
    pub start: u32,
    pub dev: u32,
    pub len: u32,
    pub trans_max: u32,
    pub magic: u32,
    pub max_batch: u32,
    pub max_commit_age: u32,
    pub max_trans_age: u32,
}

const JP_OFF: usize = 12;

impl JournalParams {
    fn read(data: &[u8]) -> Self {
        let u32_at = |off: usize| u32::from_le_bytes(data[off..off + 4].try_into().unwrap());
        Self {
            start: u32_at(JP_OFF),
            dev: u32_at(JP_OFF + 4),
            len: u32_at(JP_OFF + 8),
            trans_max: u32_at(JP_OFF + 12),
            magic: u32_at(JP_OFF + 16),
            max_batch: u32_at(JP_OFF + 20),
            max_commit_age: u32_at(JP_OFF + 24),
            max_trans_age: u32_at(JP_OFF + 28),
        }
    }

    fn write(&self, data: &mut [u8]) {
        let mut put = |off: usize, v: u32| data[off..off + 4].copy_from_slice(&v.to_le_bytes());
        put(JP_OFF, self.start);
        put(JP_OFF + 4, self.dev);
        put(JP_OFF + 8, self.len);
        put(JP_OFF + 12, self.trans_max);
        put(JP_OFF + 16, self.magic);
        put(JP_OFF + 20, self.max_batch);
        put(JP_OFF + 24, self.max_commit_age);
        put(JP_OFF + 28, self.max_trans_age);
    }
}

const OFF_BLOCK_COUNT: usize = 0;
const OFF_FREE_BLOCKS: usize = 4;
const OFF_ROOT_BLOCK: usize = 8;
const OFF_BLOCK_SIZE: usize = 44;
const OFF_OID_MAXSIZE: usize = 46;
const OFF_OID_CURSIZE: usize = 48;
const OFF_UMOUNT_STATE: usize = 50;
const OFF_MAGIC: usize = 52;
const OFF_FS_STATE: usize = 62;
const OFF_HASH_CODE: usize = 64;
const OFF_TREE_HEIGHT: usize = 68;
const OFF_BMAP_NR: usize = 70;
const OFF_FORMAT: usize = 72;
const OFF_RESERVED_FOR_JOURNAL: usize = 74;
const OFF_INODE_GENERATION: usize = 76;
const OFF_FLAGS: usize = 80;
const OFF_UUID: usize = 84;
const OFF_LABEL: usize = 100;

/// Size of the pre-3.6 on-disk layout (no uuid/label/unused tail).
pub const SUPER_V1_SIZE: usize = OFF_UUID;
/// Size of the full 3.6 layout.
pub const SUPER_V2_SIZE: usize = OFF_LABEL + 16;

#[derive(Debug, Clone)]
pub struct SuperBlock {
    pub block_count: u32,
    pub free_blocks: u32,
    pub root_block: u32,
    pub jp: JournalParams,
    pub block_size: u16,
    pub oid_maxsize: u16,
    pub oid_cursize: u16,
    pub umount_state: u16,
    pub magic: [u8; 10],
    pub fs_state: u16,
    pub hash_code: u32,
    pub tree_height: u16,
    pub bmap_nr: u16,
    pub format: u16,
    pub reserved_for_journal: u16,
    pub inode_generation: u32,
    pub flags: u32,
    pub uuid: [u8; 16],
    pub label: [u8; 16],
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self {
            block_count: 0,
            free_blocks: 0,
            root_block: 0,
            jp: JournalParams::default(),
            block_size: DEFAULT_BLOCK_SIZE as u16,
            oid_maxsize: 0,
            oid_cursize: 2,
            umount_state: FS_CLEAN,
            magic: [0; 10],
            fs_state: FS_CONSISTENT,
            hash_code: 0,
            tree_height: 2,
            bmap_nr: 0,
            format: FS_FORMAT_3_6,
            reserved_for_journal: 0,
            inode_generation: 0,
            flags: 0,
            uuid: [0; 16],
            label: [0; 16],
        }
    }
}

fn any_signature(magic: &[u8; 10]) -> bool {
    magic == &SIG_3_5 || magic == &SIG_3_6 || magic == &SIG_JR
}

fn journal_signature(magic: &[u8; 10]) -> bool {
    magic == &SIG_JR
}

impl SuperBlock {
    pub fn read(data: &[u8]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes(data[off..off + 2].try_into().unwrap());
        let u32_at = |off: usize| u32::from_le_bytes(data[off..off + 4].try_into().unwrap());
        let mut magic = [0u8; 10];
        magic.copy_from_slice(&data[OFF_MAGIC..OFF_MAGIC + 10]);
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&data[OFF_UUID..OFF_UUID + 16]);
        let mut label = [0u8; 16];
        label.copy_from_slice(&data[OFF_LABEL..OFF_LABEL + 16]);
        Self {
            block_count: u32_at(OFF_BLOCK_COUNT),
            free_blocks: u32_at(OFF_FREE_BLOCKS),
            root_block: u32_at(OFF_ROOT_BLOCK),
            jp: JournalParams::read(data),
            block_size: u16_at(OFF_BLOCK_SIZE),
            oid_maxsize: u16_at(OFF_OID_MAXSIZE),
            oid_cursize: u16_at(OFF_OID_CURSIZE),
            umount_state: u16_at(OFF_UMOUNT_STATE),
            magic,
            fs_state: u16_at(OFF_FS_STATE),
            hash_code: u32_at(OFF_HASH_CODE),
            tree_height: u16_at(OFF_TREE_HEIGHT),
            bmap_nr: u16_at(OFF_BMAP_NR),
            format: u16_at(OFF_FORMAT),
            reserved_for_journal: u16_at(OFF_RESERVED_FOR_JOURNAL),
            inode_generation: u32_at(OFF_INODE_GENERATION),
            flags: u32_at(OFF_FLAGS),
            uuid,
            label,
        }
    }

    pub fn write(&self, data: &mut [u8]) {
        data[OFF_BLOCK_COUNT..OFF_BLOCK_COUNT + 4].copy_from_slice(&self.block_count.to_le_bytes());
        data[OFF_FREE_BLOCKS..OFF_FREE_BLOCKS + 4].copy_from_slice(&self.free_blocks.to_le_bytes());
        data[OFF_ROOT_BLOCK..OFF_ROOT_BLOCK + 4].copy_from_slice(&self.root_block.to_le_bytes());
        self.jp.write(data);
        data[OFF_BLOCK_SIZE..OFF_BLOCK_SIZE + 2].copy_from_slice(&self.block_size.to_le_bytes());
        data[OFF_OID_MAXSIZE..OFF_OID_MAXSIZE + 2].copy_from_slice(&self.oid_maxsize.to_le_bytes());
        data[OFF_OID_CURSIZE..OFF_OID_CURSIZE + 2].copy_from_slice(&self.oid_cursize.to_le_bytes());
        data[OFF_UMOUNT_STATE..OFF_UMOUNT_STATE + 2].copy_from_slice(&self.umount_state.to_le_bytes());
        data[OFF_MAGIC..OFF_MAGIC + 10].copy_from_slice(&self.magic);
        data[OFF_FS_STATE..OFF_FS_STATE + 2].copy_from_slice(&self.fs_state.to_le_bytes());
        data[OFF_HASH_CODE..OFF_HASH_CODE + 4].copy_from_slice(&self.hash_code.to_le_bytes());
        data[OFF_TREE_HEIGHT..OFF_TREE_HEIGHT + 2].copy_from_slice(&self.tree_height.to_le_bytes());
        data[OFF_BMAP_NR..OFF_BMAP_NR + 2].copy_from_slice(&self.bmap_nr.to_le_bytes());
        data[OFF_FORMAT..OFF_FORMAT + 2].copy_from_slice(&self.format.to_le_bytes());
        data[OFF_RESERVED_FOR_JOURNAL..OFF_RESERVED_FOR_JOURNAL + 2]
            .copy_from_slice(&self.reserved_for_journal.to_le_bytes());
        data[OFF_INODE_GENERATION..OFF_INODE_GENERATION + 4]
            .copy_from_slice(&self.inode_generation.to_le_bytes());
        data[OFF_FLAGS..OFF_FLAGS + 4].copy_from_slice(&self.flags.to_le_bytes());
        data[OFF_UUID..OFF_UUID + 16].copy_from_slice(&self.uuid);
        data[OFF_LABEL..OFF_LABEL + 16].copy_from_slice(&self.label);
    }

    pub fn update_magic(&mut self, format: u16, relocated: bool) {
        self.magic = if relocated {
            SIG_JR
        } else if format == FS_FORMAT_3_6 {
            SIG_3_6
        } else {
            SIG_3_5
        };
    }

    pub fn is_resizeable(&self) -> bool {
        self.format == FS_FORMAT_3_6
    }

    fn open_check(&self, dev_len: u64, quiet: bool) -> Result<()> {
        let is_journal_dev = self.jp.dev != 0;
        let is_journal_magic = journal_signature(&self.magic);
        if is_journal_dev != is_journal_magic && !quiet {
            // Warning-severity in the source; non-fatal here too.
        }
        if self.block_count as u64 > dev_len {
            return Err(Error::Validation(format!(
                "superblock has an invalid block count {} for device length {} blocks",
                self.block_count, dev_len
            )));
        }
        Ok(())
    }

    /// Probes candidate super offsets `[16, 2]` (blocks), matching the
    /// original's "offset 16 at 4 KiB blocksize == 64 KiB" default.
    pub fn probe(dev: &mut dyn Device, quiet: bool) -> Result<(Block, SuperBlock)> {
        for &candidate in &[16u64, 2u64] {
            let block = match Block::read(dev, candidate) {
                Ok(b) => b,
                Err(_) if quiet => continue,
                Err(e) => return Err(e),
            };
            let sb = SuperBlock::read(block.data());
            if !any_signature(&sb.magic) {
                continue;
            }
            if !dev.set_blocksize(sb.block_size as u32) {
                continue;
            }
            if sb.open_check(dev.len(), quiet).is_err() {
                continue;
            }
            return Ok((block, sb));
        }
        Err(Error::NotFound)
    }
}

/// Zeroes out the area before the super offset, so partition-table-like
/// artefacts left by a previous filesystem do not survive `mkfs`.
pub fn clobber_skipped(dev: &mut dyn Device) -> Result<()> {
    let blocksize = dev.blocksize();
    let super_off_1k = DEFAULT_SUPER_OFFSET / 1024;
    let scale = blocksize as u64 / 1024.max(1);
    let blocks_to_clear = if scale > 0 {
        super_off_1k / scale.max(1)
    } else {
        super_off_1k
    };
    let zero = vec![0u8; blocksize as usize];
    for blk in 0..blocks_to_clear.max(1) {
        dev.write(&zero, blk, 1)
            .map_err(|source| Error::Io { block: blk, source })?;
    }
    Ok(())
}

pub fn oid_maxsize_for(format: u16, blocksize: u32) -> u16 {
    let struct_size = if format == FS_FORMAT_3_6 {
        SUPER_V2_SIZE
    } else {
        SUPER_V1_SIZE
    } as u32;
    (((blocksize.saturating_sub(struct_size)) / 4) / 2 * 2) as u16
}

/// Marks the blocks this superblock implies are reserved (skipped area +
/// super itself) as used in `bitmap`.
pub fn mark_super_used(bitmap: &mut Bitmap, super_off: u64) {
    for blk in 0..=super_off {
        bitmap.use_block(blk);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut data = vec![0u8; 4096];
        let mut sb = SuperBlock::default();
        sb.block_count = 10000;
        sb.update_magic(FS_FORMAT_3_6, false);
        sb.write(&mut data);
        let sb2 = SuperBlock::read(&data);
        assert_eq!(sb2.block_count, 10000);
        assert_eq!(sb2.magic, SIG_3_6);
    }

    #[test]
    fn magic_selection() {
        let mut sb = SuperBlock::default();
        sb.update_magic(FS_FORMAT_3_5, false);
        assert_eq!(sb.magic, SIG_3_5);
        sb.update_magic(FS_FORMAT_3_6, false);
        assert_eq!(sb.magic, SIG_3_6);
        sb.update_magic(FS_FORMAT_3_6, true);
        assert_eq!(sb.magic, SIG_JR);
    }

    #[test]
    fn oid_maxsize_even() {
        let v = oid_maxsize_for(FS_FORMAT_3_6, 4096);
        assert_eq!(v % 2, 0);
    }
}
