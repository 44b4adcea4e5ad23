//! Packed keys: two on-disk encodings (v1, v2) behind one accessor surface.
//!
//! Per spec.md §9 "Packed binary layout", these are explicit byte-offset
//! little-endian readers/writers over a fixed 16-byte buffer, not a
//! compiler-laid-out `#[repr(C, packed)]` struct — endianness and field
//! widths are properties of the accessor, not of the platform.

use std::cmp::Ordering;

pub const KEY_SIZE: usize = 16;

pub const KEY_UNIQ_SD: u32 = 0;
pub const KEY_UNIQ_DR: u32 = 500;
pub const KEY_UNIQ_DT: u32 = 0xffff_ffff;
pub const KEY_UNIQ_IT: u32 = 0xffff_fffe;
pub const KEY_UNIQ_UN: u32 = 555;

pub const KEY_TYPE_SD: u32 = 0;
pub const KEY_TYPE_IT: u32 = 1;
pub const KEY_TYPE_DT: u32 = 2;
pub const KEY_TYPE_DR: u32 = 3;
pub const KEY_TYPE_UN: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    V1,
    V2,
}

/// A 16-byte packed key: `dirid: u32, objid: u32, {offset_v1,uniqueness_v1 |
/// offset_v2:60,type_v2:4}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
}

impl Default for Key {
    fn default() -> Self {
        Self {
            bytes: [0u8; KEY_SIZE],
        }
    }
}

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn dirid(&self) -> u32 {
        u32::from_le_bytes(self.bytes[0..4].try_into().unwrap())
    }

    pub fn set_dirid(&mut self, v: u32) {
        self.bytes[0..4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn objid(&self) -> u32 {
        u32::from_le_bytes(self.bytes[4..8].try_into().unwrap())
    }

    pub fn set_objid(&mut self, v: u32) {
        self.bytes[4..8].copy_from_slice(&v.to_le_bytes());
    }

    fn v1_offset(&self) -> u32 {
        u32::from_le_bytes(self.bytes[8..12].try_into().unwrap())
    }

    fn set_v1_offset(&mut self, v: u32) {
        self.bytes[8..12].copy_from_slice(&v.to_le_bytes());
    }

    fn v1_uniqueness(&self) -> u32 {
        u32::from_le_bytes(self.bytes[12..16].try_into().unwrap())
    }

    fn set_v1_uniqueness(&mut self, v: u32) {
        self.bytes[12..16].copy_from_slice(&v.to_le_bytes());
    }

    fn v2_word(&self) -> u64 {
        u64::from_le_bytes(self.bytes[8..16].try_into().unwrap())
    }

    fn set_v2_word(&mut self, v: u64) {
        self.bytes[8..16].copy_from_slice(&v.to_le_bytes());
    }

    fn v2_offset(&self) -> u64 {
        self.v2_word() & 0x0fff_ffff_ffff_ffff
    }

    fn v2_type(&self) -> u32 {
        (self.v2_word() >> 60) as u32
    }

    fn set_v2(&mut self, offset: u64, r#type: u32) {
        let word = (offset & 0x0fff_ffff_ffff_ffff) | ((r#type as u64 & 0xf) << 60);
        self.set_v2_word(word);
    }

    /// The v1-vs-v2 collision doubling as a format discriminator: a v1 key's
    /// u32 offset never sets the top 4 bits of the v2 overlay's word to
    /// anything but 0 or 15 (uniqueness values land there), so type bits in
    /// `1..=14` mean this is genuinely a v2 key.
    pub fn format(&self) -> Format {
        let t = self.v2_type();
        if (1..=14).contains(&t) {
            Format::V2
        } else {
            Format::V1
        }
    }

    pub fn uniq2type(uniqueness: u32) -> u32 {
        match uniqueness {
            KEY_UNIQ_SD => KEY_TYPE_SD,
            KEY_UNIQ_DR => KEY_TYPE_DR,
            KEY_UNIQ_IT => KEY_TYPE_IT,
            KEY_UNIQ_DT => KEY_TYPE_DT,
            _ => KEY_TYPE_UN,
        }
    }

    pub fn type2uniq(r#type: u32) -> u32 {
        match r#type {
            KEY_TYPE_SD => KEY_UNIQ_SD,
            KEY_TYPE_DR => KEY_UNIQ_DR,
            KEY_TYPE_IT => KEY_UNIQ_IT,
            KEY_TYPE_DT => KEY_UNIQ_DT,
            _ => KEY_UNIQ_UN,
        }
    }

    /// The decoded type, translating v1's uniqueness field through
    /// [`Key::uniq2type`] when this is a v1 key.
    pub fn kind(&self) -> u32 {
        match self.format() {
            Format::V1 => Self::uniq2type(self.v1_uniqueness()),
            Format::V2 => self.v2_type(),
        }
    }

    /// The decoded offset, in either format.
    pub fn offset(&self) -> u64 {
        match self.format() {
            Format::V1 => self.v1_offset() as u64,
            Format::V2 => self.v2_offset(),
        }
    }

    pub fn is_stat_data(&self) -> bool {
        self.kind() == KEY_TYPE_SD
    }

    pub fn is_direntry(&self) -> bool {
        self.kind() == KEY_TYPE_DR
    }

    pub fn is_indirect(&self) -> bool {
        self.kind() == KEY_TYPE_IT
    }

    pub fn is_direct(&self) -> bool {
        self.kind() == KEY_TYPE_DT
    }

    pub fn form_v1(dirid: u32, objid: u32, offset: u32, r#type: u32) -> Self {
        let mut key = Self::default();
        key.set_dirid(dirid);
        key.set_objid(objid);
        key.set_v1_offset(offset);
        key.set_v1_uniqueness(Self::type2uniq(r#type));
        key
    }

    pub fn form_v2(dirid: u32, objid: u32, offset: u64, r#type: u32) -> Self {
        let mut key = Self::default();
        key.set_dirid(dirid);
        key.set_objid(objid);
        key.set_v2(offset, r#type);
        key
    }

    pub fn form(dirid: u32, objid: u32, offset: u64, r#type: u32, format: Format) -> Self {
        match format {
            Format::V1 => Self::form_v1(dirid, objid, offset as u32, r#type),
            Format::V2 => Self::form_v2(dirid, objid, offset, r#type),
        }
    }

    pub fn cmp_dirs(&self, other: &Key) -> Ordering {
        self.dirid().cmp(&other.dirid())
    }

    pub fn cmp_objects(&self, other: &Key) -> Ordering {
        self.objid().cmp(&other.objid())
    }

    pub fn cmp_two(&self, other: &Key) -> Ordering {
        self.cmp_dirs(other).then_with(|| self.cmp_objects(other))
    }

    pub fn cmp_three(&self, other: &Key) -> Ordering {
        self.cmp_two(other)
            .then_with(|| self.offset().cmp(&other.offset()))
    }

    pub fn cmp_four(&self, other: &Key) -> Ordering {
        self.cmp_three(other)
            .then_with(|| self.kind().cmp(&other.kind()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn v1_roundtrip() {
        let key = Key::form_v1(1, 2, 0, KEY_TYPE_SD);
        assert_eq!(key.format(), Format::V1);
        assert_eq!(key.kind(), KEY_TYPE_SD);
        assert_eq!(key.dirid(), 1);
        assert_eq!(key.objid(), 2);
    }

    #[test]
    fn v2_roundtrip() {
        for t in 1..=14u32 {
            let key = Key::form_v2(5, 6, 1234, t);
            assert_eq!(key.format(), Format::V2);
            assert_eq!(key.kind(), t);
            assert_eq!(key.offset(), 1234);
        }
    }

    #[test]
    fn four_tier_order() {
        let a = Key::form_v2(1, 1, 0, KEY_TYPE_SD);
        let b = Key::form_v2(1, 1, 1, KEY_TYPE_SD);
        let c = Key::form_v2(1, 2, 0, KEY_TYPE_SD);
        assert_eq!(a.cmp_three(&b), Ordering::Less);
        assert_eq!(a.cmp_two(&c), Ordering::Less);
    }

    #[test]
    fn uniq2type_map() {
        assert_eq!(Key::uniq2type(KEY_UNIQ_SD), KEY_TYPE_SD);
        assert_eq!(Key::uniq2type(KEY_UNIQ_DR), KEY_TYPE_DR);
        assert_eq!(Key::uniq2type(KEY_UNIQ_IT), KEY_TYPE_IT);
        assert_eq!(Key::uniq2type(KEY_UNIQ_DT), KEY_TYPE_DT);
        assert_eq!(Key::uniq2type(123), KEY_TYPE_UN);
    }
}
