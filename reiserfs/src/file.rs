//! Regular-file read access: direct items for small files, chains of
//! indirect (unformatted-block-pointer) items for large ones.
//!
//! Grounded on `file.c`'s `reiserfs_file_*` family.

use crate::block::Block;
use crate::error::Error;
use crate::error::Result;
use crate::key::KEY_TYPE_DT;
use crate::key::KEY_TYPE_IT;
use crate::node::ItemHead;
use crate::object::Context;
use crate::object::Object;

/// The largest a direct (inline) file body can be: what is left in a leaf
/// after its header, the stat-data item head/body, and this item's own head.
pub fn max_direct_item_len(blocksize: u32) -> u32 {
    blocksize
        .saturating_sub(crate::node::NODE_HEADER_SIZE as u32)
        .saturating_sub(2 * crate::node::ITEM_HEAD_SIZE as u32)
        .saturating_sub(crate::object::SD_V1_SIZE as u32)
        .saturating_sub(4)
}

pub struct File {
    pub entity: Object,
    size: u64,
    offset: u64,
    /// Read cursor inside the current direct item's body.
    offset_dt: u32,
    /// Read cursor inside the current indirect item's unformatted-pointer array.
    offset_it: u32,
}

impl File {
    pub fn open(ctx: &mut Context, name: &str, as_link: bool) -> Result<Self> {
        let entity = Object::open(ctx, name, as_link)?;
        if !(entity.is_reg() || entity.is_lnk()) {
            return Err(Error::Invariant(format!("{name} is not a regular file or link")));
        }
        let size = entity.stat.size;
        let mut file = Self {
            entity,
            size,
            offset: 0,
            offset_dt: 0,
            offset_it: 0,
        };
        file.rewind(ctx)?;
        Ok(file)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Seeks to the first body item (direct for small files, indirect for
    /// large ones) right after the stat-data.
    pub fn rewind(&mut self, ctx: &mut Context) -> Result<()> {
        let kind = if self.size > max_direct_item_len(ctx.dev.blocksize()) as u64 {
            KEY_TYPE_IT
        } else {
            KEY_TYPE_DT
        };
        if !self.entity.seek_by_offset(ctx, 1, kind)? {
            return Err(Error::NotFound);
        }
        self.offset = 0;
        self.offset_dt = 0;
        self.offset_it = 0;
        Ok(())
    }

    /// Positions the path at the item covering byte `offset`. Searches with
    /// `cmp_three` (ignoring the type tier) since a byte offset alone does
    /// not say in advance whether it lands in a direct or an indirect item.
    pub fn seek(&mut self, ctx: &mut Context, offset: u64) -> Result<bool> {
        if offset >= self.size {
            return Ok(false);
        }
        if !self
            .entity
            .seek_by_offset_cmp(ctx, offset + 1, KEY_TYPE_IT, crate::key::Key::cmp_three)?
        {
            return Ok(false);
        }
        self.offset = offset;
        let item_offset = self
            .entity
            .path
            .last_item()
            .map(|ih| ih.key.offset())
            .unwrap_or(1);
        let local = (offset + 1).saturating_sub(item_offset);
        let blocksize = ctx.dev.blocksize() as u64;
        self.offset_dt = local as u32;
        self.offset_it = (local / blocksize) as u32;
        Ok(true)
    }

    fn read_direct(&mut self, buffer: &mut [u8]) -> usize {
        let Some(frame) = self.entity.path.last() else {
            return 0;
        };
        let ih = ItemHead::read(frame.node.data(), frame.pos);
        let body = ih.body(frame.node.data());
        let available = body.len() as u32 - self.offset_dt;
        if available == 0 {
            return 0;
        }
        let chunk = available.min(buffer.len() as u32) as usize;
        buffer[..chunk].copy_from_slice(&body[self.offset_dt as usize..self.offset_dt as usize + chunk]);
        self.offset += chunk as u64;
        self.offset_dt += chunk as u32;
        chunk
    }

    fn read_indirect(&mut self, ctx: &mut Context, buffer: &mut [u8]) -> Result<usize> {
        let mut read = 0usize;
        loop {
            let Some(frame) = self.entity.path.last() else {
                break;
            };
            let ih = ItemHead::read(frame.node.data(), frame.pos);
            let body = ih.body(frame.node.data());
            let unfm_nr = (body.len() / 4) as u32;
            if self.offset_it >= unfm_nr || read >= buffer.len() {
                break;
            }
            let idx = self.offset_it as usize * 4;
            let nr = u32::from_le_bytes(body[idx..idx + 4].try_into().unwrap());
            self.offset_it += 1;

            if nr == 0 {
                continue;
            }

            let blocksize = ctx.dev.blocksize();
            let block = Block::read(ctx.dev, nr as u64)?;
            let in_block_off = (self.offset % blocksize as u64) as usize;
            let chunk = (blocksize as usize - in_block_off).min(buffer.len() - read);
            buffer[read..read + chunk].copy_from_slice(&block.data()[in_block_off..in_block_off + chunk]);

            read += chunk;
            self.offset += chunk as u64;
        }
        Ok(read)
    }

    fn read_item(&mut self, ctx: &mut Context, buffer: &mut [u8]) -> Result<usize> {
        let Some(item) = self.entity.path.last_item() else {
            return Ok(0);
        };
        if item.key.kind() == KEY_TYPE_DT {
            Ok(self.read_direct(buffer))
        } else {
            self.read_indirect(ctx, buffer)
        }
    }

    /// Reads up to `buffer.len()` bytes starting at the current offset,
    /// re-seeking between items as each one is exhausted, per
    /// `reiserfs_file_read`'s per-item read loop.
    pub fn read(&mut self, ctx: &mut Context, buffer: &mut [u8]) -> Result<usize> {
        if self.offset >= self.size {
            return Ok(0);
        }
        let mut total = 0usize;
        let mut cursor = self.offset;
        while total < buffer.len() && self.seek(ctx, cursor)? {
            let n = self.read_item(ctx, &mut buffer[total..])?;
            if n == 0 {
                break;
            }
            total += n;
            cursor = self.offset;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn max_direct_item_len_is_positive_for_4k_blocks() {
        assert!(max_direct_item_len(4096) > 0);
        assert!(max_direct_item_len(4096) < 4096);
    }
}
