//! Journal descriptor/commit transaction layout and the read-through-journal
//! lookup that lets a block be sourced from a pending transaction.

use rand_core::OsRng;
use rand_core::RngCore;

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;

pub const JOURNAL_TRANS_MAX: u32 = 1024;
pub const JOURNAL_TRANS_MIN: u32 = 256;
pub const JOURNAL_MAX_BATCH: u32 = 900;
pub const JOURNAL_MAX_COMMIT_AGE: u32 = 30;
pub const JOURNAL_MAX_TRANS_AGE: u32 = 30;
pub const JOURNAL_MIN_RATIO: u32 = 2;
pub const JOURNAL_MIN_SIZE: u64 = 512;

const DESC_SIGNATURE: [u8; 8] = *b"ReIsErLB";
const DESC_HEADER_SIZE: usize = 12; // trans_id, trans_len, mount_id
const COMMIT_HEADER_SIZE: usize = 8; // trans_id, trans_len

fn trans_half(blocksize: u32) -> u32 {
    (blocksize - DESC_HEADER_SIZE as u32 - DESC_SIGNATURE.len() as u32) / 4
}

#[derive(Debug, Clone, Default)]
pub struct JournalParams {
    pub start: u64,
    pub len: u64,
    pub max_trans: u32,
    pub relocated: bool,
    pub blocksize: u32,
}

impl JournalParams {
    /// Params check: in-band journals must start at 0 or `super_off + 2`;
    /// length is bounded by how many transactions fit one bitmap-block-ful of
    /// journal ring, and (when nonzero) must be at least `JOURNAL_MIN_SIZE`.
    pub fn check(&self, dev_len: u64) -> Result<()> {
        if !self.relocated {
            let super_blk = crate::super_block::DEFAULT_SUPER_OFFSET / self.blocksize as u64;
            if self.start != 0 && self.start != super_blk + 2 {
                return Err(Error::Validation(format!(
                    "invalid journal start {} for journal on host device (expected 0 or {})",
                    self.start,
                    super_blk + 2
                )));
            }
        }

        let max_len = if self.relocated {
            dev_len.saturating_sub(self.start).saturating_sub(1)
        } else {
            (self.blocksize as u64) * 8 - self.start - 1
        };
        if self.len > max_len {
            return Err(Error::Validation(format!(
                "journal length {} exceeds maximum {max_len}",
                self.len
            )));
        }
        if self.len != 0 && self.len < JOURNAL_MIN_SIZE {
            return Err(Error::Validation(format!(
                "journal length {} is below the minimum of {JOURNAL_MIN_SIZE}",
                self.len
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JournalHead {
    pub last_flush_trans_id: u32,
    pub first_unflushed_offset: u64,
    pub mount_id: u32,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    /// Offset of the descriptor block, relative to `jp.start`.
    pub desc_rel: u64,
    pub trans_id: u32,
    pub trans_len: u32,
    /// Home block numbers this transaction's payload overwrites.
    pub realblock: Vec<u32>,
}

pub struct Journal {
    pub params: JournalParams,
    pub head: JournalHead,
}

impl Journal {
    fn commit_rel(&self, desc_rel: u64, trans_len: u32) -> u64 {
        (desc_rel + trans_len as u64 + 1) % self.params.len
    }

    fn read_descriptor(&self, dev: &mut dyn Device, desc_rel: u64) -> Result<Option<Transaction>> {
        let blocksize = self.params.blocksize;
        let half = trans_half(blocksize) as usize;
        let blk = self.params.start + desc_rel;
        let mut buf = vec![0u8; blocksize as usize];
        dev.read(&mut buf, blk, 1)
            .map_err(|source| Error::Io { block: blk, source })?;

        if buf[DESC_HEADER_SIZE..DESC_HEADER_SIZE + 8] != DESC_SIGNATURE {
            return Ok(None);
        }
        let trans_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let trans_len = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if trans_len == 0 {
            return Ok(None);
        }

        let sig_end = DESC_HEADER_SIZE + 8;
        let desc_count = half.min((trans_len as usize).min((blocksize as usize - sig_end) / 4));
        let mut realblock = Vec::with_capacity(trans_len as usize);
        for i in 0..desc_count {
            let off = sig_end + i * 4;
            realblock.push(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        }

        let commit_rel = self.commit_rel(desc_rel, trans_len);
        let commit_blk = self.params.start + commit_rel;
        let mut cbuf = vec![0u8; blocksize as usize];
        dev.read(&mut cbuf, commit_blk, 1)
            .map_err(|source| Error::Io { block: commit_blk, source })?;
        let commit_trans_id = u32::from_le_bytes(cbuf[0..4].try_into().unwrap());
        let commit_trans_len = u32::from_le_bytes(cbuf[4..8].try_into().unwrap());
        if commit_trans_id != trans_id || commit_trans_len != trans_len {
            return Ok(None);
        }
        let tail_count = trans_len as usize - desc_count;
        for i in 0..tail_count {
            let off = COMMIT_HEADER_SIZE + i * 4;
            if off + 4 > cbuf.len() {
                break;
            }
            realblock.push(u32::from_le_bytes(cbuf[off..off + 4].try_into().unwrap()));
        }

        Ok(Some(Transaction {
            desc_rel,
            trans_id,
            trans_len,
            realblock,
        }))
    }

    /// Walks the whole ring once, starting at ring-relative offset `from`,
    /// invoking `f` on every valid transaction found; advances by
    /// `trans_len + 1` on a hit, by 1 otherwise.
    pub fn walk(&self, dev: &mut dyn Device, from: u64, mut f: impl FnMut(&Transaction)) -> Result<()> {
        let mut curr = from % self.params.len.max(1);
        let mut steps = 0u64;
        while steps < self.params.len {
            if let Some(tx) = self.read_descriptor(dev, curr)? {
                f(&tx);
                let advance = tx.trans_len as u64 + 1;
                curr = (curr + advance) % self.params.len;
                steps += advance;
            } else {
                curr = (curr + 1) % self.params.len;
                steps += 1;
            }
        }
        Ok(())
    }

    /// Oldest and newest valid transactions by `trans_id`, and how many valid
    /// transactions were found in total.
    pub fn boundary_transactions(
        &self,
        dev: &mut dyn Device,
    ) -> Result<Option<(Transaction, Transaction, u64)>> {
        let mut oldest: Option<Transaction> = None;
        let mut newest: Option<Transaction> = None;
        let mut count = 0u64;
        self.walk(dev, 0, |tx| {
            count += 1;
            if oldest.as_ref().map(|o| tx.trans_id < o.trans_id).unwrap_or(true) {
                oldest = Some(tx.clone());
            }
            if newest.as_ref().map(|n| tx.trans_id > n.trans_id).unwrap_or(true) {
                newest = Some(tx.clone());
            }
        })?;
        Ok(oldest.zip(newest).map(|(o, n)| (o, n, count)))
    }

    /// Looks up `blk` among pending transactions; the last (most recent)
    /// transaction whose `realblock[]` contains `blk` wins. Returns the
    /// absolute journal block holding the pending contents.
    pub fn read_through(&self, dev: &mut dyn Device, blk: u64) -> Result<Option<u64>> {
        let mut found: Option<u64> = None;
        self.walk(dev, self.head.first_unflushed_offset, |tx| {
            if let Some(idx) = tx.realblock.iter().position(|&b| b as u64 == blk) {
                let data_rel = (tx.desc_rel + 1 + idx as u64) % self.params.len;
                found = Some(self.params.start + data_rel);
            }
        })?;
        Ok(found)
    }

    pub fn create(dev: &mut dyn Device, params: JournalParams) -> Result<Self> {
        params.check(dev.len())?;
        let blocksize = params.blocksize;
        let zero = vec![0u8; blocksize as usize];
        for i in 0..params.len {
            dev.write(&zero, params.start + i, 1)
                .map_err(|source| Error::Io { block: params.start + i, source })?;
        }
        let head = JournalHead {
            last_flush_trans_id: 0,
            first_unflushed_offset: 0,
            mount_id: OsRng.next_u32(),
        };
        let journal = Self { params, head };
        journal.sync_head(dev)?;
        Ok(journal)
    }

    pub fn open(dev: &mut dyn Device, params: JournalParams) -> Result<Self> {
        let head_blk = params.start + params.len;
        let mut buf = vec![0u8; params.blocksize as usize];
        dev.read(&mut buf, head_blk, 1)
            .map_err(|source| Error::Io { block: head_blk, source })?;
        let head = JournalHead {
            last_flush_trans_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            first_unflushed_offset: u32::from_le_bytes(buf[4..8].try_into().unwrap()) as u64,
            mount_id: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        };
        Ok(Self { params, head })
    }

    fn sync_head(&self, dev: &mut dyn Device) -> Result<()> {
        let head_blk = self.params.start + self.params.len;
        let mut buf = vec![0u8; self.params.blocksize as usize];
        buf[0..4].copy_from_slice(&self.head.last_flush_trans_id.to_le_bytes());
        buf[4..8].copy_from_slice(&(self.head.first_unflushed_offset as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&self.head.mount_id.to_le_bytes());
        dev.write(&buf, head_blk, 1)
            .map_err(|source| Error::Io { block: head_blk, source })
    }

    pub fn sync(&self, dev: &mut dyn Device) -> Result<()> {
        self.sync_head(dev)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::MemDevice;

    fn params(blocksize: u32) -> JournalParams {
        JournalParams {
            start: 18,
            len: JOURNAL_MIN_SIZE,
            max_trans: JOURNAL_TRANS_MIN,
            relocated: false,
            blocksize,
        }
    }

    #[test]
    fn create_and_reopen_head() {
        let blocksize = 4096;
        let mut dev = MemDevice::new(JOURNAL_MIN_SIZE + 64, blocksize);
        let p = params(blocksize);
        let journal = Journal::create(&mut dev, p.clone()).unwrap();
        assert_eq!(journal.head.first_unflushed_offset, 0);

        let reopened = Journal::open(&mut dev, p).unwrap();
        assert_eq!(reopened.head.mount_id, journal.head.mount_id);
    }

    #[test]
    fn params_check_rejects_undersize() {
        let mut p = params(4096);
        p.len = 4;
        assert!(p.check(100000).is_err());
    }

    #[test]
    fn no_transactions_on_fresh_journal() {
        let blocksize = 4096;
        let mut dev = MemDevice::new(JOURNAL_MIN_SIZE + 64, blocksize);
        let p = params(blocksize);
        let journal = Journal::create(&mut dev, p).unwrap();
        assert!(journal.boundary_transactions(&mut dev).unwrap().is_none());
        assert!(journal.read_through(&mut dev, 5).unwrap().is_none());
    }
}
