//! Directory entries and directory iteration.
//!
//! Grounded on `dir.c`'s `reiserfs_dir_*` family; `reiserfs_dir_seek`'s
//! parent-frame shortcut is folded into plain re-seeks through the object
//! layer rather than reaching into a parent path frame directly, since
//! [`crate::path::Path`] owns its frames instead of chasing raw pointers.

use crate::error::Error;
use crate::error::Result;
use crate::hashes::hash_value;
use crate::hashes::HashKind;
use crate::key::Format;
use crate::key::Key;
use crate::key::KEY_TYPE_DR;
use crate::node::ItemHead;
use crate::object::Context;
use crate::object::Object;
use crate::object::DOT_OFFSET;

/// `offset u32, dirid u32, objid u32, location u16, state u16`, per
/// spec.md §6's directory-entry-head layout.
pub const DE_HEAD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct DirEntryHead {
    pub offset: u32,
    pub dirid: u32,
    pub objid: u32,
    pub location: u16,
    pub state: u16,
}

pub const DE_VISIBLE: u16 = 1 << 0;

impl DirEntryHead {
    pub fn read(data: &[u8]) -> Self {
        Self {
            offset: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            dirid: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            objid: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            location: u16::from_le_bytes(data[12..14].try_into().unwrap()),
            state: u16::from_le_bytes(data[14..16].try_into().unwrap()),
        }
    }

    pub fn write(&self, data: &mut [u8]) {
        data[0..4].copy_from_slice(&self.offset.to_le_bytes());
        data[4..8].copy_from_slice(&self.dirid.to_le_bytes());
        data[8..12].copy_from_slice(&self.objid.to_le_bytes());
        data[12..14].copy_from_slice(&self.location.to_le_bytes());
        data[14..16].copy_from_slice(&self.state.to_le_bytes());
    }

    pub fn is_visible(&self) -> bool {
        self.state & DE_VISIBLE != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirEntry {
    pub name: String,
    pub dirid: u32,
    pub objid: u32,
    pub visible: bool,
}

/// An open directory: the underlying object plus a read cursor over its
/// directory-entry items.
pub struct Dir {
    pub entity: Object,
    local: usize,
    offset: u32,
}

impl Dir {
    pub fn open(ctx: &mut Context, name: &str) -> Result<Self> {
        let entity = Object::open(ctx, name, false)?;
        if !entity.is_dir() {
            return Err(Error::Invariant(format!("{name} is not a directory")));
        }
        let mut dir = Self {
            entity,
            local: 0,
            offset: 0,
        };
        dir.rewind(ctx)?;
        Ok(dir)
    }

    pub fn rewind(&mut self, ctx: &mut Context) -> Result<()> {
        if !self.entity.seek_by_offset(ctx, DOT_OFFSET, KEY_TYPE_DR)? {
            return Err(Error::NotFound);
        }
        self.local = 0;
        self.offset = 0;
        Ok(())
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    fn entry_count(&self) -> usize {
        self.entity
            .path
            .last()
            .map(|frame| ItemHead::read(frame.node.data(), frame.pos).free_space_or_entry_count as usize)
            .unwrap_or(0)
    }

    /// Re-seeks to whichever directory item holds logical entry `target`,
    /// by hashing forward/backward component names is not meaningful here
    /// (entries are positional within an item); this walks item-by-item via
    /// repeated stat-data/direntry lookups, advancing through the object's
    /// key the way [`crate::tree::lookup_leaf`] would for any other offset.
    pub fn seek(&mut self, ctx: &mut Context, target: u32) -> Result<bool> {
        if target < self.offset.abs_diff(target) {
            self.rewind(ctx)?;
        }
        let forward = target > self.offset;
        while self.offset != target {
            let count = self.entry_count();
            if (forward && self.local >= count) || (!forward && self.local == 0) {
                // Out of entries in this item; the C original reaches into the
                // path's parent frame to find the next direntry item's key
                // directly. Re-descending through the next/previous directory
                // hash value reaches the same item without a parent pointer.
                let next_local_offset = if forward { self.offset + 1 } else { self.offset - 1 };
                if !self
                    .entity
                    .seek_by_offset(ctx, next_local_offset as u64, KEY_TYPE_DR)?
                {
                    return Ok(false);
                }
                let count = self.entry_count();
                self.local = if forward { 0 } else { count.saturating_sub(1) };
                if forward {
                    self.offset += 1;
                } else {
                    self.offset -= 1;
                }
            } else {
                let count = self.entry_count();
                let step = if forward {
                    let remaining = count - self.local;
                    let want = target - self.offset;
                    remaining.min(want as usize)
                } else {
                    let want = self.offset - target;
                    self.local.min(want as usize)
                };
                if forward {
                    self.local += step;
                    self.offset += step as u32;
                } else {
                    self.local -= step;
                    self.offset -= step as u32;
                }
            }
        }
        Ok(true)
    }

    fn read_entry_at(&self, pos_in_item: usize) -> Result<DirEntry> {
        let frame = self.entity.path.last().ok_or(Error::NotFound)?;
        let ih = ItemHead::read(frame.node.data(), frame.pos);
        let body = ih.body(frame.node.data());
        let deh = read_de_head(body, pos_in_item).ok_or(Error::NotFound)?;
        let name = entry_name(body, pos_in_item, &deh).unwrap_or_default();
        Ok(DirEntry {
            name,
            dirid: deh.dirid,
            objid: deh.objid,
            visible: deh.is_visible(),
        })
    }

    pub fn read(&mut self, ctx: &mut Context) -> Result<Option<DirEntry>> {
        let count = self.entry_count();
        if self.local >= count && !self.seek(ctx, self.offset + 1)? {
            return Ok(None);
        }
        let entry = self.read_entry_at(self.local)?;
        self.local += 1;
        self.offset += 1;
        Ok(Some(entry))
    }
}

fn read_de_head(body: &[u8], i: usize) -> Option<DirEntryHead> {
    let off = i * DE_HEAD_SIZE;
    if off + DE_HEAD_SIZE > body.len() {
        return None;
    }
    Some(DirEntryHead::read(&body[off..off + DE_HEAD_SIZE]))
}

/// A name's length is implicit: entry locations are packed from the item's
/// end inward in entry order, so entry 0's name runs up to the item's end
/// and every later entry's name runs up to the previous entry's location.
fn entry_name(body: &[u8], i: usize, deh: &DirEntryHead) -> Option<String> {
    let end = if i == 0 {
        body.len()
    } else {
        read_de_head(body, i - 1)?.location as usize
    };
    let start = deh.location as usize;
    if start > end || end > body.len() {
        return None;
    }
    Some(String::from_utf8_lossy(&body[start..end]).into_owned())
}

/// Looks up a single directory entry by `hash` at the leaf a seek has
/// already landed on. Kept as a free function (rather than a method) since
/// [`crate::object::Object::find_path`] needs it mid-descent, before a
/// [`Dir`] wrapper exists.
pub fn find_entry(node_data: &[u8], pos: usize, hash: u32, format: Format) -> Result<Key> {
    let ih = ItemHead::read(node_data, pos);
    if ih.key.kind() != KEY_TYPE_DR {
        return Err(Error::Invariant("expected a directory-entry item".into()));
    }
    let body = ih.body(node_data);
    let count = ih.free_space_or_entry_count as usize;

    let mut lo = 0usize;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let Some(deh) = read_de_head(body, mid) else {
            break;
        };
        match deh.offset.cmp(&hash) {
            std::cmp::Ordering::Equal => {
                return Ok(Key::form(deh.dirid, deh.objid, crate::object::SD_OFFSET, crate::key::KEY_TYPE_SD, format));
            }
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }
    Err(Error::NotFound)
}

/// Writes a fresh directory item body holding `names` in order (smallest
/// hash first), entry headers at the front growing forward, names packed
/// from the end growing inward — the layout [`entry_name`] decodes.
pub fn build_entries(names: &[(u32, u32, u32, &str)]) -> Vec<u8> {
    let heads_len = names.len() * DE_HEAD_SIZE;
    let names_len: usize = names.iter().map(|(_, _, _, n)| n.len()).sum();
    let mut body = vec![0u8; heads_len + names_len];
    let mut name_end = body.len();
    for (i, (offset, dirid, objid, name)) in names.iter().enumerate() {
        let start = name_end - name.len();
        body[start..name_end].copy_from_slice(name.as_bytes());
        let deh = DirEntryHead {
            offset: *offset,
            dirid: *dirid,
            objid: *objid,
            location: start as u16,
            state: DE_VISIBLE,
        };
        deh.write(&mut body[i * DE_HEAD_SIZE..(i + 1) * DE_HEAD_SIZE]);
        name_end = start;
    }
    body
}

pub fn dir_hash(kind: HashKind, name: &str) -> u32 {
    hash_value(kind, name.as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn de_head_roundtrip() {
        let mut buf = [0u8; DE_HEAD_SIZE];
        let deh = DirEntryHead {
            offset: 42,
            dirid: 7,
            objid: 9,
            location: 100,
            state: DE_VISIBLE,
        };
        deh.write(&mut buf);
        let back = DirEntryHead::read(&buf);
        assert_eq!(back.offset, 42);
        assert_eq!(back.dirid, 7);
        assert_eq!(back.objid, 9);
        assert_eq!(back.location, 100);
        assert!(back.is_visible());
    }

    #[test]
    fn dot_hash_is_fixed() {
        assert_eq!(dir_hash(HashKind::R5, "."), 1);
        assert_eq!(dir_hash(HashKind::R5, ".."), 2);
    }

    #[test]
    fn build_entries_roundtrip() {
        let body = build_entries(&[(1, 1, 2, "."), (2, 0, 1, "..")]);
        let ih_count = 2;
        for i in 0..ih_count {
            let deh = read_de_head(&body, i).unwrap();
            let name = entry_name(&body, i, &deh).unwrap();
            match i {
                0 => assert_eq!(name, "."),
                1 => assert_eq!(name, ".."),
                _ => unreachable!(),
            }
        }
    }
}
