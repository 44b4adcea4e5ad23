//! A `(block_nr, bytes)` buffer. Reads and writes go through the device; there
//! is no cache, matching spec.md §5: "each `read_block` allocates a fresh
//! buffer, and every descent re-reads the nodes it visits."

use crate::device::Device;
use crate::error::Error;
use crate::error::Result;

pub struct Block {
    nr: u64,
    data: Vec<u8>,
}

impl Block {
    pub fn alloc(blocksize: u32, nr: u64) -> Self {
        Self {
            nr,
            data: vec![0u8; blocksize as usize],
        }
    }

    pub fn read(dev: &mut dyn Device, nr: u64) -> Result<Self> {
        let mut block = Self::alloc(dev.blocksize(), nr);
        dev.read(&mut block.data, nr, 1)
            .map_err(|source| Error::Io { block: nr, source })?;
        Ok(block)
    }

    pub fn write(&self, dev: &mut dyn Device) -> Result<()> {
        dev.write(&self.data, self.nr, 1)
            .map_err(|source| Error::Io { block: self.nr, source })
    }

    pub fn nr(&self) -> u64 {
        self.nr
    }

    pub fn set_nr(&mut self, nr: u64) {
        self.nr = nr;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
