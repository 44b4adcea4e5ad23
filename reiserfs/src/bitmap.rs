//! Bit-per-block allocation bitmap.

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::gauge::Gauge;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// The direction a `resize` shifts existing bits in, replacing a bare signed
/// `start` per spec.md §9's redesign note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    /// `start == 0`: grow or shrink from the right, in place.
    FromRight,
    /// `start < 0`: shift left by `.0` blocks.
    ShiftLeft(u64),
    /// `start > 0`: shift right by `.0` blocks.
    ShiftRight(u64),
}

impl ShiftDirection {
    pub fn from_bounds(start: i64) -> Self {
        match start.cmp(&0) {
            std::cmp::Ordering::Equal => ShiftDirection::FromRight,
            std::cmp::Ordering::Less => ShiftDirection::ShiftLeft((-start) as u64),
            std::cmp::Ordering::Greater => ShiftDirection::ShiftRight(start as u64),
        }
    }
}

pub struct Bitmap {
    start_block: u64,
    blocksize: u32,
    total_blocks: u64,
    used_blocks: u64,
    map: Vec<u8>,
}

impl Bitmap {
    fn size_bytes(total_blocks: u64) -> usize {
        ceil_div(total_blocks, 8) as usize
    }

    pub fn bmap_nr(&self) -> u64 {
        ceil_div(self.total_blocks, 8 * self.blocksize as u64)
    }

    /// The block numbers each bitmap chunk lives at: the first chunk sits right
    /// after the superblock, every later chunk anchors at a `blocksize * 8`
    /// boundary (one bit per block, so a chunk covers exactly that many blocks).
    fn chunk_blocks(&self) -> Vec<u64> {
        (0..self.bmap_nr())
            .map(|i| {
                if i == 0 {
                    self.start_block
                } else {
                    i * self.blocksize as u64 * 8
                }
            })
            .collect()
    }

    fn mark_trailing_padding(&mut self) {
        let total = self.total_blocks;
        for b in total..(self.map.len() as u64 * 8) {
            set_bit(&mut self.map, b as usize);
        }
    }

    pub fn create(start_block: u64, blocksize: u32, total_blocks: u64) -> Self {
        let mut bitmap = Self {
            start_block,
            blocksize,
            total_blocks,
            used_blocks: 0,
            map: vec![0u8; Self::size_bytes(total_blocks)],
        };
        bitmap.mark_trailing_padding();
        bitmap
    }

    pub fn open(dev: &mut dyn Device, start_block: u64, total_blocks: u64) -> Result<Self> {
        let blocksize = dev.blocksize();
        let mut bitmap = Self {
            start_block,
            blocksize,
            total_blocks,
            used_blocks: 0,
            map: vec![0u8; Self::size_bytes(total_blocks)],
        };

        let chunks = bitmap.chunk_blocks();
        let mut byte_off = 0usize;
        for blk in chunks {
            let remaining = bitmap.map.len() - byte_off;
            let take = remaining.min(blocksize as usize);
            let mut buf = vec![0u8; blocksize as usize];
            dev.read(&mut buf, blk, 1)
                .map_err(|source| Error::Io { block: blk, source })?;
            bitmap.map[byte_off..byte_off + take].copy_from_slice(&buf[..take]);
            byte_off += take;
        }

        bitmap.used_blocks = bitmap.calc_used();
        Ok(bitmap)
    }

    pub fn sync(&mut self, dev: &mut dyn Device, gauge: &mut dyn Gauge) -> Result<()> {
        self.mark_trailing_padding();
        let chunks = self.chunk_blocks();
        gauge.reset("writing bitmap");
        let mut byte_off = 0usize;
        for (i, blk) in chunks.iter().enumerate() {
            let remaining = self.map.len() - byte_off;
            let take = remaining.min(self.blocksize as usize);
            let mut buf = vec![0u8; self.blocksize as usize];
            buf[..take].copy_from_slice(&self.map[byte_off..byte_off + take]);
            dev.write(&buf, *blk, 1)
                .map_err(|source| Error::Io { block: *blk, source })?;
            byte_off += take;
            gauge.update(i as u64 + 1, chunks.len() as u64);
        }
        gauge.finish(true);
        Ok(())
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn used_blocks(&self) -> u64 {
        self.used_blocks
    }

    pub fn unused_blocks(&self) -> u64 {
        self.total_blocks - self.used_blocks
    }

    pub fn test_block(&self, blk: u64) -> bool {
        if blk >= self.total_blocks {
            return false;
        }
        test_bit(&self.map, blk as usize)
    }

    pub fn use_block(&mut self, blk: u64) {
        if !test_bit(&self.map, blk as usize) {
            set_bit(&mut self.map, blk as usize);
            self.used_blocks += 1;
        }
    }

    pub fn unuse_block(&mut self, blk: u64) {
        if test_bit(&self.map, blk as usize) {
            clear_bit(&mut self.map, blk as usize);
            self.used_blocks -= 1;
        }
    }

    /// Marks the blocks the bitmap's own chunks occupy as used (B2). Callers
    /// invoke this after any resize that may have grown `bmap_nr`, since
    /// `resize` itself only reshapes the map buffer and does not know which
    /// blocks its own chunks will be placed at until the caller decides.
    pub fn mark_own_blocks_used(&mut self) {
        for blk in self.chunk_blocks() {
            self.use_block(blk);
        }
    }

    /// Linear scan from `start` for a clear bit. Returns 0 if none is found —
    /// block 0 is always marked used (B2), so 0 is never a legal allocation.
    pub fn find_free(&self, start: u64) -> u64 {
        for b in start..self.total_blocks {
            if !test_bit(&self.map, b as usize) {
                return b;
            }
        }
        0
    }

    /// Counts set bits in `[start, end)`, word-at-a-time when the range is
    /// 64-bit aligned and inside the buffer, bit-by-bit otherwise.
    pub fn calc_used_in_area(&self, start: u64, end: u64) -> u64 {
        let mut count = 0u64;
        let mut b = start;
        while b < end {
            if b % 64 == 0 && b + 64 <= end {
                let byte_off = (b / 8) as usize;
                if byte_off + 8 <= self.map.len() {
                    let word = u64::from_le_bytes(self.map[byte_off..byte_off + 8].try_into().unwrap());
                    count += word.count_ones() as u64;
                    b += 64;
                    continue;
                }
            }
            if test_bit(&self.map, b as usize) {
                count += 1;
            }
            b += 1;
        }
        count
    }

    pub fn calc_used(&self) -> u64 {
        self.calc_used_in_area(0, self.total_blocks)
    }

    pub fn calc_unused(&self) -> u64 {
        self.total_blocks - self.calc_used()
    }

    pub fn check(&self) -> bool {
        self.calc_used() == self.used_blocks
    }

    /// Resizes the bitmap to `[start, end)` absolute block coordinates. `start`
    /// may be negative (a left shift) or positive (a right shift); `start == 0`
    /// grows/shrinks in place from the right.
    pub fn resize(&mut self, start: i64, end: i64) -> Result<()> {
        if end < start {
            return Err(Error::Validation(format!(
                "invalid bitmap boundaries: start={start}, end={end}"
            )));
        }
        let new_total = (end - start) as u64;
        let new_size = Self::size_bytes(new_total);

        match ShiftDirection::from_bounds(start) {
            ShiftDirection::FromRight => {
                self.map.resize(new_size, 0);
                self.total_blocks = new_total;
            }
            ShiftDirection::ShiftLeft(delta) => {
                let mut new_map = vec![0u8; new_size];
                // Bits shift left by `delta`: copy bit b -> bit (b - delta) for b >= delta.
                for b in (delta..self.total_blocks).rev() {
                    if test_bit(&self.map, b as usize) {
                        set_bit(&mut new_map, (b - delta) as usize);
                    }
                }
                self.map = new_map;
                self.total_blocks = new_total;
            }
            ShiftDirection::ShiftRight(delta) => {
                let mut new_map = vec![0u8; new_size];
                for b in 0..self.total_blocks {
                    if test_bit(&self.map, b as usize) {
                        set_bit(&mut new_map, (b + delta) as usize);
                    }
                }
                self.map = new_map;
                self.total_blocks = new_total;
            }
        }

        self.mark_trailing_padding();
        self.used_blocks = self.calc_used();
        Ok(())
    }
}

fn test_bit(map: &[u8], bit: usize) -> bool {
    map[bit / 8] & (1 << (bit % 8)) != 0
}

fn set_bit(map: &mut [u8], bit: usize) {
    map[bit / 8] |= 1 << (bit % 8);
}

fn clear_bit(map: &mut [u8], bit: usize) {
    map[bit / 8] &= !(1 << (bit % 8));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn use_unuse_idempotent() {
        let mut bm = Bitmap::create(1, 4096, 1000);
        assert!(!bm.test_block(10));
        bm.use_block(10);
        assert!(bm.test_block(10));
        let used = bm.used_blocks();
        bm.use_block(10);
        assert_eq!(bm.used_blocks(), used);
        bm.unuse_block(10);
        assert!(!bm.test_block(10));
    }

    #[test]
    fn find_free_skips_used() {
        let mut bm = Bitmap::create(1, 4096, 100);
        for b in 0..5 {
            bm.use_block(b);
        }
        assert_eq!(bm.find_free(0), 5);
    }

    #[test]
    fn trailing_padding_set() {
        let bm = Bitmap::create(1, 4096, 10);
        // byte holds 8 bits; bits 10..16 beyond total_blocks must be set (B3).
        assert!(test_bit(&bm.map, 10));
        assert!(test_bit(&bm.map, 15));
    }

    #[test]
    fn calc_used_matches_used_blocks() {
        let mut bm = Bitmap::create(1, 4096, 200);
        for b in 0..70 {
            bm.use_block(b);
        }
        assert_eq!(bm.calc_used(), bm.used_blocks());
        assert!(bm.check());
    }

    #[test]
    fn resize_from_right_grows() {
        let mut bm = Bitmap::create(1, 4096, 100);
        bm.use_block(5);
        bm.resize(0, 200).unwrap();
        assert_eq!(bm.total_blocks(), 200);
        assert!(bm.test_block(5));
    }

    #[test]
    fn resize_shift_left_preserves_bits() {
        let mut bm = Bitmap::create(1, 4096, 100);
        bm.use_block(50);
        bm.resize(-10, 90).unwrap();
        assert_eq!(bm.total_blocks(), 100);
        assert!(bm.test_block(40));
    }

    #[test]
    fn resize_shift_right_preserves_bits() {
        let mut bm = Bitmap::create(1, 4096, 100);
        bm.use_block(50);
        bm.resize(10, 110).unwrap();
        assert_eq!(bm.total_blocks(), 100);
        assert!(bm.test_block(60));
    }
}
