//! Object resolution: path walking, stat-data, link following, and the
//! shared object-id allocator backing the superblock's objectid map.
//!
//! Grounded on `object.c`'s `reiserfs_object_*` family.

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::hashes::hash_value;
use crate::hashes::HashKind;
use crate::key::Format;
use crate::key::Key;
use crate::key::KEY_TYPE_DR;
use crate::key::KEY_TYPE_DT;
use crate::key::KEY_TYPE_SD;
use crate::node::ItemHead;
use crate::path::Path;
use crate::tree::lookup_leaf;
use crate::tree::Tree;

pub const ROOT_DIR_ID: u32 = 1;
pub const ROOT_OBJ_ID: u32 = 2;
pub const SD_OFFSET: u64 = 0;
pub const DOT_OFFSET: u64 = 1;

pub const S_IFMT: u16 = 0o170000;
pub const S_IFLNK: u16 = 0o120000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFDIR: u16 = 0o040000;

pub const SD_V1_SIZE: usize = 32;
pub const SD_V2_SIZE: usize = 44;

/// Inode metadata, decoded from either on-disk stat-data format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stat {
    pub ino: u32,
    pub mode: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub size: u64,
    pub blocks: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub blksize: u32,
}

impl Stat {
    pub fn is_reg(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_lnk(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    fn from_v1(ino: u32, blksize: u32, sd: &[u8]) -> Self {
        Self {
            ino,
            mode: u16::from_le_bytes(sd[0..2].try_into().unwrap()),
            nlink: u16::from_le_bytes(sd[2..4].try_into().unwrap()) as u32,
            uid: u16::from_le_bytes(sd[4..6].try_into().unwrap()) as u32,
            gid: u16::from_le_bytes(sd[6..8].try_into().unwrap()) as u32,
            size: u32::from_le_bytes(sd[8..12].try_into().unwrap()) as u64,
            atime: u32::from_le_bytes(sd[12..16].try_into().unwrap()),
            mtime: u32::from_le_bytes(sd[16..20].try_into().unwrap()),
            ctime: u32::from_le_bytes(sd[20..24].try_into().unwrap()),
            rdev: u32::from_le_bytes(sd[24..28].try_into().unwrap()),
            blocks: u32::from_le_bytes(sd[28..32].try_into().unwrap()),
            blksize,
        }
    }

    fn from_v2(ino: u32, blksize: u32, sd: &[u8]) -> Self {
        Self {
            ino,
            mode: u16::from_le_bytes(sd[0..2].try_into().unwrap()),
            nlink: u32::from_le_bytes(sd[4..8].try_into().unwrap()),
            size: u64::from_le_bytes(sd[8..16].try_into().unwrap()),
            uid: u32::from_le_bytes(sd[16..20].try_into().unwrap()),
            gid: u32::from_le_bytes(sd[20..24].try_into().unwrap()),
            atime: u32::from_le_bytes(sd[24..28].try_into().unwrap()),
            mtime: u32::from_le_bytes(sd[28..32].try_into().unwrap()),
            ctime: u32::from_le_bytes(sd[32..36].try_into().unwrap()),
            blocks: u32::from_le_bytes(sd[36..40].try_into().unwrap()),
            rdev: u32::from_le_bytes(sd[40..44].try_into().unwrap()),
            blksize,
        }
    }

    pub fn write_v1(&self, sd: &mut [u8]) {
        sd[0..2].copy_from_slice(&self.mode.to_le_bytes());
        sd[2..4].copy_from_slice(&(self.nlink as u16).to_le_bytes());
        sd[4..6].copy_from_slice(&(self.uid as u16).to_le_bytes());
        sd[6..8].copy_from_slice(&(self.gid as u16).to_le_bytes());
        sd[8..12].copy_from_slice(&(self.size as u32).to_le_bytes());
        sd[12..16].copy_from_slice(&self.atime.to_le_bytes());
        sd[16..20].copy_from_slice(&self.mtime.to_le_bytes());
        sd[20..24].copy_from_slice(&self.ctime.to_le_bytes());
        sd[24..28].copy_from_slice(&self.rdev.to_le_bytes());
        sd[28..32].copy_from_slice(&self.blocks.to_le_bytes());
    }

    pub fn write_v2(&self, sd: &mut [u8]) {
        sd[0..2].copy_from_slice(&self.mode.to_le_bytes());
        sd[2..4].copy_from_slice(&0u16.to_le_bytes());
        sd[4..8].copy_from_slice(&self.nlink.to_le_bytes());
        sd[8..16].copy_from_slice(&self.size.to_le_bytes());
        sd[16..20].copy_from_slice(&self.uid.to_le_bytes());
        sd[20..24].copy_from_slice(&self.gid.to_le_bytes());
        sd[24..28].copy_from_slice(&self.atime.to_le_bytes());
        sd[28..32].copy_from_slice(&self.mtime.to_le_bytes());
        sd[32..36].copy_from_slice(&self.ctime.to_le_bytes());
        sd[36..40].copy_from_slice(&self.blocks.to_le_bytes());
        sd[40..44].copy_from_slice(&self.rdev.to_le_bytes());
    }
}

/// The device/tree/format/hash a path walk needs; borrows everything so the
/// caller's filesystem façade retains ownership.
pub struct Context<'a> {
    pub dev: &'a mut dyn Device,
    pub tree: &'a Tree,
    pub format: Format,
    pub hash: HashKind,
}

/// An open filesystem object: its key, the path that reached it, and its
/// decoded stat-data.
pub struct Object {
    pub key: Key,
    pub path: Path,
    pub stat: Stat,
}

impl Object {
    /// Sets `key`'s offset/type for this object's format and descends to the
    /// leaf holding it, matching on all four key components.
    pub fn seek_by_offset(&mut self, ctx: &mut Context, offset: u64, kind: u32) -> Result<bool> {
        self.seek_by_offset_cmp(ctx, offset, kind, Key::cmp_four)
    }

    /// As [`Object::seek_by_offset`], but with a caller-chosen comparator —
    /// file body seeks use `cmp_three` so a search for a byte offset is not
    /// thrown off by not knowing in advance whether it lands in a direct or
    /// indirect item.
    pub fn seek_by_offset_cmp(
        &mut self,
        ctx: &mut Context,
        offset: u64,
        kind: u32,
        cmp: fn(&Key, &Key) -> std::cmp::Ordering,
    ) -> Result<bool> {
        self.key = Key::form(self.key.dirid(), self.key.objid(), offset, kind, ctx.format);
        lookup_leaf(ctx.dev, ctx.tree, ctx.tree.root, cmp, &self.key, &mut self.path)
    }

    pub fn find_stat(&mut self, ctx: &mut Context) -> Result<()> {
        if !self.seek_by_offset(ctx, SD_OFFSET, KEY_TYPE_SD)? {
            return Err(Error::NotFound);
        }
        let frame = self.path.last().expect("lookup pushed a frame");
        let ih = ItemHead::read(frame.node.data(), frame.pos);
        let body = ih.body(frame.node.data());
        self.stat = if ih.format == 0 {
            Stat::from_v1(self.key.objid(), ctx.dev.blocksize(), body)
        } else {
            Stat::from_v2(self.key.objid(), ctx.dev.blocksize(), body)
        };
        Ok(())
    }

    pub fn is_reg(&self) -> bool {
        self.stat.is_reg()
    }

    pub fn is_dir(&self) -> bool {
        self.stat.is_dir()
    }

    pub fn is_lnk(&self) -> bool {
        self.stat.is_lnk()
    }

    /// Reads the direct item right after the stat-data item at the path's top
    /// frame, which holds a symlink's target text.
    fn read_link(&self) -> Option<String> {
        let frame = self.path.last()?;
        let header = crate::node::NodeHeader::read(frame.node.data());
        if frame.pos + 1 >= header.nritems as usize {
            return None;
        }
        let ih = ItemHead::read(frame.node.data(), frame.pos + 1);
        if ih.key.kind() != KEY_TYPE_DT {
            return None;
        }
        let body = ih.body(frame.node.data());
        Some(String::from_utf8_lossy(body).trim_end_matches('\0').to_string())
    }

    /// Finds the directory entry named by the hash at the leaf's current
    /// position, returning the entry's `(dirid, objid)` key.
    fn find_entry(&self, hash: u32, format: Format) -> Result<Key> {
        let frame = self.path.last().ok_or(Error::NotFound)?;
        crate::dir::find_entry(frame.node.data(), frame.pos, hash, format)
    }

    /// Walks `name`'s path components, resolving symlinks along the way, and
    /// lands on the final component's key (not yet its stat-data — callers
    /// follow with `find_stat`).
    pub fn find_path(&mut self, ctx: &mut Context, name: &str, as_link: bool) -> Result<()> {
        let absolute = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{name}")
        };

        let mut dirkey = Key::form(ROOT_DIR_ID, ROOT_OBJ_ID, SD_OFFSET, KEY_TYPE_SD, ctx.format);
        let components: Vec<&str> = absolute.split('/').filter(|s| !s.is_empty()).collect();

        for (i, component) in components.iter().enumerate() {
            self.find_stat(ctx)?;

            if !(self.stat.is_reg() || self.stat.is_dir() || self.stat.is_lnk()) {
                return Err(Error::Invariant(format!("{component} has an invalid object type")));
            }

            if self.stat.is_lnk() {
                let is_terminator = i + 1 == components.len();
                if !as_link || !is_terminator {
                    let link = self.read_link().ok_or(Error::NotFound)?;
                    if link.starts_with('/') {
                        self.key = Key::form(ROOT_DIR_ID, ROOT_OBJ_ID, SD_OFFSET, KEY_TYPE_SD, ctx.format);
                    } else {
                        self.key = dirkey;
                    }
                    self.find_path(ctx, &link, true)?;
                }
            }

            dirkey.set_dirid(self.key.dirid());
            dirkey.set_objid(self.key.objid());

            let hash = hash_value(ctx.hash, component.as_bytes());
            if !self.seek_by_offset(ctx, hash as u64, KEY_TYPE_DR)? {
                if let Some(frame) = self.path.last_mut() {
                    frame.pos = frame.pos.saturating_sub(1);
                }
            }
            let found = self.find_entry(hash, ctx.format)?;
            self.key = found;
        }
        Ok(())
    }

    pub fn open(ctx: &mut Context, name: &str, as_link: bool) -> Result<Self> {
        let mut object = Self {
            key: Key::form(ROOT_DIR_ID, ROOT_OBJ_ID, SD_OFFSET, KEY_TYPE_SD, ctx.format),
            path: Path::new(),
            stat: Stat::default(),
        };
        object.find_path(ctx, name, as_link)?;
        object.find_stat(ctx)?;
        Ok(object)
    }
}

/// Tests whether `objectid` is already allocated according to the
/// superblock's objectid map, a sorted run-length list of `(used_start,
/// used_end)` pairs.
pub fn objectid_used(map: &[u32], objectid: u32) -> bool {
    let mut i = 0;
    while i + 1 < map.len() {
        if objectid == map[i] {
            return true;
        }
        if objectid > map[i] && objectid < map[i + 1] {
            return true;
        }
        if objectid < map[i] {
            break;
        }
        i += 2;
    }
    false
}

/// Allocates `objectid` out of the free ranges implied by the map,
/// compacting adjacent runs. `map` is truncated/extended in place up to
/// `max_size`; returns whether the allocation succeeded.
pub fn objectid_use(map: &mut Vec<u32>, max_size: usize, objectid: u32) -> bool {
    if objectid_used(map, objectid) {
        return true;
    }

    let mut i = 0;
    while i + 1 < map.len() {
        if objectid + 1 == map[i] {
            map[i] = objectid;
            return true;
        }
        if objectid == map[i + 1] {
            map[i + 1] += 1;
            if i + 2 < map.len() && map[i + 1] == map[i + 2] {
                map.drain(i + 1..i + 3);
            }
            return true;
        }
        if objectid < map[i] {
            if map.len() == max_size {
                map[i] = objectid;
            } else {
                map.splice(i..i, [objectid, objectid + 1]);
            }
            return true;
        }
        i += 2;
    }

    if map.len() + 2 <= max_size {
        map.push(objectid);
        map.push(objectid + 1);
        true
    } else if map.len() == max_size {
        if let Some(last) = map.last_mut() {
            *last = objectid + 1;
        }
        true
    } else {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn objectid_map_allocates_first_id() {
        let mut map = vec![];
        assert!(objectid_use(&mut map, 100, 5));
        assert_eq!(map, vec![5, 6]);
        assert!(objectid_used(&map, 5));
        assert!(!objectid_used(&map, 6));
    }

    #[test]
    fn objectid_map_extends_adjacent_run() {
        let mut map = vec![5, 6];
        assert!(objectid_use(&mut map, 100, 6));
        assert_eq!(map, vec![5, 7]);
    }

    #[test]
    fn objectid_map_merges_runs() {
        let mut map = vec![5, 6, 7, 8];
        assert!(objectid_use(&mut map, 100, 6));
        assert_eq!(map, vec![5, 9]);
    }

    #[test]
    fn stat_v1_roundtrip() {
        let mut buf = [0u8; SD_V1_SIZE];
        let stat = Stat {
            ino: 7,
            mode: S_IFREG | 0o644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            size: 4096,
            blksize: 4096,
            ..Default::default()
        };
        stat.write_v1(&mut buf);
        let back = Stat::from_v1(7, 4096, &buf);
        assert_eq!(back.mode, stat.mode);
        assert_eq!(back.size, stat.size);
    }

    #[test]
    fn stat_v2_roundtrip() {
        let mut buf = [0u8; SD_V2_SIZE];
        let stat = Stat {
            ino: 7,
            mode: S_IFDIR | 0o755,
            nlink: 2,
            size: 0,
            blksize: 4096,
            ..Default::default()
        };
        stat.write_v2(&mut buf);
        let back = Stat::from_v2(7, 4096, &buf);
        assert!(back.is_dir());
        assert_eq!(back.nlink, 2);
    }
}
