//! The filesystem façade: ties device, superblock, bitmap, journal and tree
//! together into one handle, and the CRUD operations that touch more than one
//! of those at once (open/create/close/sync, resize, copy).

use crate::bitmap::Bitmap;
use crate::block::Block;
use crate::dir::build_entries;
use crate::dir::Dir;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::file::File;
use crate::gauge::Gauge;
use crate::gauge::NullGauge;
use crate::hashes::HashKind;
use crate::journal::Journal;
use crate::journal::JournalParams as RuntimeJournalParams;
use crate::key::Format;
use crate::key::Key;
use crate::key::KEY_TYPE_DR;
use crate::key::KEY_TYPE_SD;
use crate::node::build_leaf;
use crate::node::LeafItemSpec;
use crate::object::Context;
use crate::object::Object;
use crate::object::Stat;
use crate::object::ROOT_DIR_ID;
use crate::object::ROOT_OBJ_ID;
use crate::object::SD_OFFSET;
use crate::object::SD_V1_SIZE;
use crate::object::SD_V2_SIZE;
use crate::object::S_IFDIR;
use crate::segment::move_segment_same_device;
use crate::segment::relocate;
use crate::segment::RelocateIo;
use crate::segment::Segment;
use crate::super_block::clobber_skipped;
use crate::super_block::mark_super_used;
use crate::super_block::oid_maxsize_for;
use crate::super_block::JournalParams as SbJournalParams;
use crate::super_block::SuperBlock;
use crate::super_block::DEFAULT_SUPER_OFFSET;
use crate::super_block::FS_CONSISTENT;
use crate::super_block::FS_CORRUPTED;
use crate::super_block::FS_FORMAT_3_6;
use crate::tree::Tree;

pub const DIRTY_SUPER: u8 = 1 << 0;
pub const DIRTY_BITMAP: u8 = 1 << 1;
pub const DIRTY_JOURNAL: u8 = 1 << 2;

/// The journal geometry `create` sets up. Sized in blocks, not bytes, like
/// the on-disk `jp.len` field it feeds.
pub struct JournalCreateParams {
    pub len: u64,
    pub max_trans: u32,
}

pub struct CreateParams {
    pub block_count: u64,
    pub block_size: u32,
    pub format: u16,
    pub hash: HashKind,
    pub journal: JournalCreateParams,
    pub label: [u8; 16],
    pub uuid: [u8; 16],
}

/// An open filesystem: the device(s), the decoded superblock, the live
/// bitmap/journal/tree, and which of those three are dirty since the last
/// sync.
pub struct Filesystem {
    dev: Box<dyn Device>,
    journal_dev: Option<Box<dyn Device>>,
    sb: SuperBlock,
    super_off: u64,
    bitmap: Bitmap,
    journal: Journal,
    tree: Tree,
    dirty: u8,
}

impl Filesystem {
    fn mark_dirty(&mut self, bits: u8) {
        self.dirty |= bits;
    }

    /// Whether the journal lives on the main device (in-band) or on a
    /// separate device entirely.
    fn journal_relocated(&self) -> bool {
        self.sb.jp.dev != 0
    }

    fn journal_device_mut(&mut self) -> &mut dyn Device {
        match self.journal_dev.as_deref_mut() {
            Some(jdev) => jdev,
            None => self.dev.as_mut(),
        }
    }

    /// Block span metadata (skipped area + super, plus the in-band journal
    /// ring and head when the journal is not relocated) occupies at the front
    /// of the main device.
    fn metadata_span(&self) -> u64 {
        if self.journal_relocated() {
            self.super_off + 1
        } else {
            self.journal.params.start + self.journal.params.len + 1
        }
    }

    /// Borrows the pieces a path/object/directory/file walk needs.
    pub fn context(&mut self) -> Context<'_> {
        Context {
            dev: self.dev.as_mut(),
            tree: &self.tree,
            format: if self.sb.format == FS_FORMAT_3_6 { Format::V2 } else { Format::V1 },
            hash: HashKind::from_code(self.sb.hash_code),
        }
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn stat(&mut self, path: &str) -> Result<Stat> {
        let mut ctx = self.context();
        let object = Object::open(&mut ctx, path, false)?;
        Ok(object.stat)
    }

    pub fn open_file(&mut self, path: &str) -> Result<File> {
        let mut ctx = self.context();
        File::open(&mut ctx, path, false)
    }

    pub fn open_dir(&mut self, path: &str) -> Result<Dir> {
        let mut ctx = self.context();
        Dir::open(&mut ctx, path)
    }

    /// Opens an existing filesystem: probes the superblock, reads the bitmap
    /// and journal head, and sets up the tree at its recorded root/height.
    pub fn open(mut dev: Box<dyn Device>, journal_dev: Option<Box<dyn Device>>, quiet: bool) -> Result<Self> {
        let (block, sb) = SuperBlock::probe(dev.as_mut(), quiet)?;
        let super_off = block.nr();
        let relocated = sb.jp.dev != 0;
        let blocksize = dev.blocksize();

        let jparams = RuntimeJournalParams {
            start: sb.jp.start as u64,
            len: sb.jp.len as u64,
            max_trans: sb.jp.trans_max,
            relocated,
            blocksize,
        };

        let journal = if relocated {
            let jdev = journal_dev
                .as_deref_mut()
                .ok_or_else(|| Error::Validation("filesystem needs an external journal device".into()))?;
            Journal::open(jdev, jparams)?
        } else {
            Journal::open(dev.as_mut(), jparams)?
        };

        let bitmap = Bitmap::open(dev.as_mut(), super_off + 1, sb.block_count as u64)?;
        let tree = Tree {
            root: sb.root_block as u64,
            height: sb.tree_height,
            blocksize,
            offset: 0,
        };

        Ok(Self {
            dev,
            journal_dev,
            sb,
            super_off,
            bitmap,
            journal,
            tree,
            dirty: 0,
        })
    }

    /// Builds the root leaf a freshly made filesystem starts with: one
    /// stat-data item for the root directory and one direntry item holding
    /// `.` and `..` (both pointing back at the root itself, per K1/B1 and the
    /// mkfs smoke test).
    fn build_root_leaf(blocksize: u32, format: u16, timestamp: u32) -> Vec<u8> {
        let key_format = if format == FS_FORMAT_3_6 { Format::V2 } else { Format::V1 };
        let sd_key = Key::form(ROOT_DIR_ID, ROOT_OBJ_ID, SD_OFFSET, KEY_TYPE_SD, key_format);
        let dr_key = Key::form(ROOT_DIR_ID, ROOT_OBJ_ID, 1, KEY_TYPE_DR, key_format);

        let stat = Stat {
            ino: ROOT_OBJ_ID,
            mode: S_IFDIR | 0o755,
            nlink: 2,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: 0,
            blocks: 0,
            atime: timestamp,
            mtime: timestamp,
            ctime: timestamp,
            blksize: blocksize,
        };

        let (sd_body, sd_format) = if format == FS_FORMAT_3_6 {
            let mut buf = vec![0u8; SD_V2_SIZE];
            stat.write_v2(&mut buf);
            (buf, 1u16)
        } else {
            let mut buf = vec![0u8; SD_V1_SIZE];
            stat.write_v1(&mut buf);
            (buf, 0u16)
        };

        let dr_body = build_entries(&[(1, ROOT_DIR_ID, ROOT_OBJ_ID, "."), (2, 0, ROOT_DIR_ID, "..")]);

        build_leaf(
            blocksize,
            &[
                LeafItemSpec { key: sd_key, body: sd_body, entry_count: 0, format: sd_format },
                LeafItemSpec { key: dr_key, body: dr_body, entry_count: 2, format: 0 },
            ],
        )
    }

    /// Creates a fresh filesystem on `dev` (and, when the journal is
    /// relocated, on `journal_dev`), per spec.md §4.4/§4.13.
    pub fn create(
        mut dev: Box<dyn Device>,
        mut journal_dev: Option<Box<dyn Device>>,
        params: CreateParams,
        gauge: &mut dyn Gauge,
    ) -> Result<Self> {
        dev.set_blocksize(params.block_size);
        clobber_skipped(dev.as_mut())?;

        let super_off = DEFAULT_SUPER_OFFSET / params.block_size as u64;
        let relocated = journal_dev.is_some();

        let mut bitmap = Bitmap::create(super_off + 1, params.block_size, params.block_count);
        mark_super_used(&mut bitmap, super_off);

        let journal_start = super_off + 2;
        if !relocated {
            for blk in journal_start..journal_start + params.journal.len + 1 {
                bitmap.use_block(blk);
            }
        }
        bitmap.mark_own_blocks_used();

        let jparams = RuntimeJournalParams {
            start: if relocated { 0 } else { journal_start },
            len: params.journal.len,
            max_trans: params.journal.max_trans,
            relocated,
            blocksize: params.block_size,
        };
        let journal = match journal_dev.as_deref_mut() {
            Some(jdev) => Journal::create(jdev, jparams)?,
            None => Journal::create(dev.as_mut(), jparams)?,
        };

        let timestamp = utils::util::get_timestamp().as_secs() as u32;
        let search_from = if relocated { super_off + 1 } else { journal_start + params.journal.len + 1 };
        let root_block_nr = bitmap.find_free(search_from);
        if root_block_nr == 0 {
            return Err(Error::Consistency("no free block for the root leaf".into()));
        }
        bitmap.use_block(root_block_nr);

        let root_data = Self::build_root_leaf(params.block_size, params.format, timestamp);
        dev.write(&root_data, root_block_nr, 1)
            .map_err(|source| Error::Io { block: root_block_nr, source })?;

        let mut sb = SuperBlock {
            block_count: params.block_count as u32,
            free_blocks: bitmap.unused_blocks() as u32,
            root_block: root_block_nr as u32,
            jp: SbJournalParams {
                start: jparams.start as u32,
                dev: if relocated { 1 } else { 0 },
                len: params.journal.len as u32,
                trans_max: params.journal.max_trans,
                magic: 0,
                max_batch: crate::journal::JOURNAL_MAX_BATCH,
                max_commit_age: crate::journal::JOURNAL_MAX_COMMIT_AGE,
                max_trans_age: crate::journal::JOURNAL_MAX_TRANS_AGE,
            },
            block_size: params.block_size as u16,
            oid_maxsize: oid_maxsize_for(params.format, params.block_size),
            oid_cursize: 2,
            umount_state: crate::super_block::FS_CLEAN,
            magic: [0; 10],
            fs_state: FS_CONSISTENT,
            hash_code: params.hash.code(),
            tree_height: 2,
            bmap_nr: bitmap.bmap_nr() as u16,
            format: params.format,
            reserved_for_journal: 0,
            inode_generation: 0,
            flags: 0,
            uuid: params.uuid,
            label: params.label,
        };
        sb.update_magic(params.format, relocated);

        let mut super_block = Block::alloc(params.block_size, super_off);
        sb.write(super_block.data_mut());
        super_block.write(dev.as_mut())?;

        bitmap.sync(dev.as_mut(), gauge)?;

        let tree = Tree {
            root: root_block_nr,
            height: 2,
            blocksize: params.block_size,
            offset: 0,
        };

        Ok(Self {
            dev,
            journal_dev,
            sb,
            super_off,
            bitmap,
            journal,
            tree,
            dirty: 0,
        })
    }

    fn sync_super(&mut self) -> Result<()> {
        let mut block = Block::alloc(self.dev.blocksize(), self.super_off);
        self.sb.write(block.data_mut());
        block.write(self.dev.as_mut())
    }

    /// Flushes whichever of super/bitmap/journal are dirty.
    pub fn sync(&mut self, gauge: &mut dyn Gauge) -> Result<()> {
        if self.dirty & DIRTY_SUPER != 0 {
            self.sync_super()?;
            self.dirty &= !DIRTY_SUPER;
        }
        if self.dirty & DIRTY_BITMAP != 0 {
            self.bitmap.sync(self.dev.as_mut(), gauge)?;
            self.dirty &= !DIRTY_BITMAP;
        }
        if self.dirty & DIRTY_JOURNAL != 0 {
            let jdev = self.journal_device_mut();
            self.journal.sync(jdev)?;
            self.dirty &= !DIRTY_JOURNAL;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.sync(&mut NullGauge)?;
        self.dev.sync().map_err(|source| Error::Io { block: 0, source })?;
        if let Some(jdev) = self.journal_dev.as_mut() {
            jdev.sync().map_err(|source| Error::Io { block: 0, source })?;
        }
        Ok(())
    }

    /// Sets `fs_state` and syncs the super immediately, so a crash mid-resize
    /// leaves the filesystem flagged `FS_CORRUPTED` rather than silently
    /// inconsistent.
    pub fn state_update(&mut self, state: u16) -> Result<()> {
        self.sb.fs_state = state;
        self.sync_super()?;
        Ok(())
    }

    /// Resizes in place: shrink relocates the tree out of the blocks being
    /// dropped then shrinks the bitmap; expand just grows the bitmap. Neither
    /// direction moves the superblock or the in-band journal.
    pub fn resize_dumb(&mut self, new_block_count: u64, gauge: &mut dyn Gauge) -> Result<()> {
        use std::cmp::Ordering;
        match new_block_count.cmp(&self.bitmap.total_blocks()) {
            Ordering::Equal => Ok(()),
            Ordering::Greater => self.expand_dumb(new_block_count, gauge),
            Ordering::Less => self.shrink_dumb(new_block_count, gauge),
        }
    }

    fn expand_dumb(&mut self, new_block_count: u64, gauge: &mut dyn Gauge) -> Result<()> {
        self.bitmap.resize(0, new_block_count as i64)?;
        self.bitmap.mark_own_blocks_used();
        self.sb.block_count = new_block_count as u32;
        self.sb.bmap_nr = self.bitmap.bmap_nr() as u16;
        self.sb.free_blocks = self.bitmap.unused_blocks() as u32;
        self.mark_dirty(DIRTY_SUPER | DIRTY_BITMAP);
        self.sync(gauge)
    }

    fn shrink_dumb(&mut self, new_block_count: u64, gauge: &mut dyn Gauge) -> Result<()> {
        self.state_update(FS_CORRUPTED)?;

        let metadata_span = self.metadata_span();
        let dst_seg = Segment { start: metadata_span, end: new_block_count };
        let src_seg = Segment { start: metadata_span, end: self.bitmap.total_blocks() };

        let new_root = relocate(
            RelocateIo::InPlace { dev: self.dev.as_mut(), bitmap: &mut self.bitmap },
            dst_seg,
            src_seg,
            self.tree.offset,
            false,
            &self.tree,
            self.tree.root,
        )?;

        self.bitmap.resize(0, new_block_count as i64)?;
        self.bitmap.mark_own_blocks_used();

        self.sb.root_block = new_root as u32;
        self.tree.root = new_root;
        self.sb.block_count = new_block_count as u32;
        self.sb.bmap_nr = self.bitmap.bmap_nr() as u16;
        self.sb.free_blocks = self.bitmap.unused_blocks() as u32;
        self.mark_dirty(DIRTY_SUPER | DIRTY_BITMAP);
        self.sync(gauge)?;
        self.state_update(FS_CONSISTENT)
    }

    /// Shifts the whole filesystem (metadata region and tree alike) to new
    /// absolute bounds `[start, end)`, per spec.md §4.13's smart resize.
    ///
    /// Only rightward shifts (`start >= 0`) are supported: this engine models
    /// one filesystem per device starting at that device's own block 0, so a
    /// negative `start` would place the metadata region before block 0 of its
    /// own device, which has no meaning here. A real partition-relative
    /// engine would need offset-translation on the super/bitmap/journal, not
    /// just the tree; that is out of scope.
    pub fn resize_smart(&mut self, start: i64, end: u64, gauge: &mut dyn Gauge) -> Result<()> {
        if start == 0 {
            return self.resize_dumb(end, gauge);
        }
        if start < 0 {
            return Err(Error::NotImplemented("resize_smart with a negative start"));
        }
        let start = start as u64;

        self.state_update(FS_CORRUPTED)?;

        let metadata_span = self.metadata_span();
        let old_total = self.bitmap.total_blocks();

        let meta_src = Segment { start: 0, end: metadata_span };
        let meta_dst = Segment { start, end: start + metadata_span };
        let tree_src = Segment { start: metadata_span, end: old_total };
        let tree_dst = Segment { start: meta_dst.end, end };

        let new_root = relocate(
            RelocateIo::InPlace { dev: self.dev.as_mut(), bitmap: &mut self.bitmap },
            tree_dst,
            tree_src,
            self.tree.offset,
            true,
            &self.tree,
            self.tree.root,
        )?;

        move_segment_same_device(self.dev.as_mut(), meta_src, meta_dst, gauge, |_, _| {})?;

        self.bitmap.resize(start as i64, end as i64)?;
        self.bitmap.mark_own_blocks_used();

        self.super_off += start;
        self.journal.params.start += start;
        self.sb.jp.start += start as u32;
        self.sb.root_block = new_root as u32;
        self.tree.root = new_root;
        self.sb.block_count = end - start;
        self.sb.bmap_nr = self.bitmap.bmap_nr() as u16;
        self.sb.free_blocks = self.bitmap.unused_blocks() as u32;
        self.mark_dirty(DIRTY_SUPER | DIRTY_BITMAP | DIRTY_JOURNAL);
        self.sync(gauge)?;
        self.state_update(FS_CONSISTENT)
    }

    pub fn set_label(&mut self, label: [u8; 16]) {
        self.sb.label = label;
        self.mark_dirty(DIRTY_SUPER);
    }

    pub fn set_uuid(&mut self, uuid: [u8; 16]) {
        self.sb.uuid = uuid;
        self.mark_dirty(DIRTY_SUPER);
    }

    /// Re-creates the journal at a new location/size/device, per spec.md §6's
    /// `tunefs -j/-s/-o/-t` surface. Refuses when the current journal still
    /// has pending transactions (spec.md §7's "unreplayed transactions
    /// visible during journal tune" consistency error) — this engine does
    /// not implement replay, so the old transactions would simply be lost.
    pub fn journal_tune(
        &mut self,
        new_journal_dev: Option<Box<dyn Device>>,
        start: u64,
        len: u64,
        max_trans: u32,
    ) -> Result<()> {
        let relocated = new_journal_dev.is_some();
        {
            let dev = match self.journal_dev.as_deref_mut() {
                Some(jdev) => jdev,
                None => self.dev.as_mut(),
            };
            if self.journal.boundary_transactions(dev)?.is_some() {
                return Err(Error::Consistency(
                    "journal has unreplayed transactions; run fsck before tuning".into(),
                ));
            }
        }

        if !self.journal_relocated() {
            for blk in self.journal.params.start..self.journal.params.start + self.journal.params.len + 1 {
                self.bitmap.unuse_block(blk);
            }
        }

        let jparams = RuntimeJournalParams {
            start,
            len,
            max_trans,
            relocated,
            blocksize: self.dev.blocksize(),
        };
        let journal = match new_journal_dev.as_deref_mut() {
            Some(jdev) => Journal::create(jdev, jparams)?,
            None => Journal::create(self.dev.as_mut(), jparams)?,
        };

        if !relocated {
            for blk in start..start + len + 1 {
                self.bitmap.use_block(blk);
            }
        }

        self.journal = journal;
        self.journal_dev = new_journal_dev;
        self.sb.jp = SbJournalParams {
            start: start as u32,
            dev: if relocated { 1 } else { 0 },
            len: len as u32,
            trans_max: max_trans,
            magic: 0,
            max_batch: crate::journal::JOURNAL_MAX_BATCH,
            max_commit_age: crate::journal::JOURNAL_MAX_COMMIT_AGE,
            max_trans_age: crate::journal::JOURNAL_MAX_TRANS_AGE,
        };
        self.sb.update_magic(self.sb.format, relocated);
        self.sb.bmap_nr = self.bitmap.bmap_nr() as u16;
        self.sb.free_blocks = self.bitmap.unused_blocks() as u32;
        self.mark_dirty(DIRTY_SUPER | DIRTY_BITMAP | DIRTY_JOURNAL);
        Ok(())
    }

    /// Creates a fresh filesystem of matching geometry on `dst_dev` and
    /// copies this one's tree into it, per spec.md §4.13's copy operation.
    pub fn copy(
        &mut self,
        dst_dev: Box<dyn Device>,
        dst_journal_dev: Option<Box<dyn Device>>,
        gauge: &mut dyn Gauge,
    ) -> Result<Filesystem> {
        let params = CreateParams {
            block_count: self.bitmap.total_blocks(),
            block_size: self.dev.blocksize(),
            format: self.sb.format,
            hash: HashKind::from_code(self.sb.hash_code),
            journal: JournalCreateParams {
                len: self.journal.params.len,
                max_trans: self.journal.params.max_trans,
            },
            label: self.sb.label,
            uuid: self.sb.uuid,
        };
        let mut dst = Filesystem::create(dst_dev, dst_journal_dev, params, gauge)?;

        // create() leaves a placeholder root leaf allocated; the relocated
        // tree gets its own fresh blocks, so free that placeholder first.
        dst.bitmap.unuse_block(dst.tree.root);

        let src_metadata_span = self.metadata_span();
        let src_tree_seg = Segment { start: src_metadata_span, end: self.bitmap.total_blocks() };
        let dst_metadata_span = dst.metadata_span();
        let dst_tree_seg = Segment { start: dst_metadata_span, end: dst.bitmap.total_blocks() };

        let new_root = relocate(
            RelocateIo::CrossDevice {
                dst_dev: dst.dev.as_mut(),
                dst_bitmap: &mut dst.bitmap,
                src_dev: self.dev.as_mut(),
                src_bitmap: &mut self.bitmap,
            },
            dst_tree_seg,
            src_tree_seg,
            self.tree.offset,
            false,
            &self.tree,
            self.tree.root,
        )?;

        dst.sb.root_block = new_root as u32;
        dst.tree.root = new_root;
        dst.tree.height = self.tree.height;
        dst.sb.tree_height = self.sb.tree_height;
        dst.sb.free_blocks = dst.bitmap.unused_blocks() as u32;
        dst.mark_dirty(DIRTY_SUPER | DIRTY_BITMAP);
        dst.sync(gauge)?;
        dst.state_update(FS_CONSISTENT)?;
        Ok(dst)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::MemDevice;
    use crate::gauge::NullGauge;
    use crate::journal::JOURNAL_MIN_SIZE;

    fn create_params(block_count: u64) -> CreateParams {
        CreateParams {
            block_count,
            block_size: 4096,
            format: FS_FORMAT_3_6,
            hash: HashKind::R5,
            journal: JournalCreateParams { len: JOURNAL_MIN_SIZE, max_trans: crate::journal::JOURNAL_TRANS_MIN },
            label: [0; 16],
            uuid: [0; 16],
        }
    }

    #[test]
    fn create_then_open_roundtrips() {
        let dev = Box::new(MemDevice::new(10000, 4096));
        let fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        assert_eq!(fs.super_block().block_count, 10000);
        assert!(fs.super_block().free_blocks < 10000);
    }

    #[test]
    fn create_root_leaf_has_dot_and_dotdot() {
        let dev = Box::new(MemDevice::new(10000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        let mut dir = fs.open_dir("/").unwrap();
        let mut ctx = fs.context();
        let first = dir.read(&mut ctx).unwrap().unwrap();
        assert_eq!(first.name, ".");
        let second = dir.read(&mut ctx).unwrap().unwrap();
        assert_eq!(second.name, "..");
    }

    #[test]
    fn resize_dumb_expand_increases_free_blocks() {
        let dev = Box::new(MemDevice::new(20000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        let free_before = fs.super_block().free_blocks;
        fs.resize_dumb(20000, &mut NullGauge).unwrap();
        assert_eq!(fs.super_block().block_count, 20000);
        assert!(fs.super_block().free_blocks > free_before);
    }

    #[test]
    fn resize_dumb_shrink_keeps_root_reachable() {
        let dev = Box::new(MemDevice::new(10000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        fs.resize_dumb(8000, &mut NullGauge).unwrap();
        assert_eq!(fs.super_block().block_count, 8000);
        let mut dir = fs.open_dir("/").unwrap();
        let mut ctx = fs.context();
        assert!(dir.read(&mut ctx).unwrap().is_some());
    }

    #[test]
    fn copy_produces_independent_filesystem() {
        let src_dev = Box::new(MemDevice::new(10000, 4096));
        let mut src = Filesystem::create(src_dev, None, create_params(10000), &mut NullGauge).unwrap();
        let dst_dev = Box::new(MemDevice::new(10000, 4096));
        let mut dst = src.copy(dst_dev, None, &mut NullGauge).unwrap();
        let mut dir = dst.open_dir("/").unwrap();
        let mut ctx = dst.context();
        assert!(dir.read(&mut ctx).unwrap().is_some());
    }

    #[test]
    fn set_label_and_uuid_mark_super_dirty() {
        let dev = Box::new(MemDevice::new(10000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        fs.set_label(*b"scratch-label\0\0\0");
        fs.set_uuid([7; 16]);
        assert_eq!(&fs.super_block().label[..7], b"scratch");
        assert_eq!(fs.super_block().uuid, [7; 16]);
    }

    #[test]
    fn journal_tune_resizes_in_band_journal() {
        // An in-band journal's start is pinned to `super_off + 2` (spec.md's
        // journal params check); tunefs can still change its length/max_trans
        // in place.
        let dev = Box::new(MemDevice::new(10000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        let old_start = fs.journal.params.start;
        let new_len = JOURNAL_MIN_SIZE * 2;
        fs.journal_tune(None, old_start, new_len, crate::journal::JOURNAL_TRANS_MIN).unwrap();
        assert_eq!(fs.journal.params.start, old_start);
        assert_eq!(fs.journal.params.len, new_len);
        assert_eq!(fs.super_block().jp.len as u64, new_len);
    }

    #[test]
    fn journal_tune_rejects_invalid_in_band_start() {
        let dev = Box::new(MemDevice::new(10000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        let old_start = fs.journal.params.start;
        assert!(fs
            .journal_tune(None, old_start + JOURNAL_MIN_SIZE, JOURNAL_MIN_SIZE, crate::journal::JOURNAL_TRANS_MIN)
            .is_err());
    }

    #[test]
    fn journal_tune_refuses_with_pending_transactions() {
        // A fresh journal has no transactions; this documents the happy path the
        // refusal guard sits in front of (a filesystem with a crashed-mid-write
        // journal is out of scope to construct here without write support).
        let dev = Box::new(MemDevice::new(10000, 4096));
        let mut fs = Filesystem::create(dev, None, create_params(10000), &mut NullGauge).unwrap();
        assert!(fs
            .journal_tune(None, fs.journal.params.start, JOURNAL_MIN_SIZE, crate::journal::JOURNAL_TRANS_MIN)
            .is_ok());
    }
}
