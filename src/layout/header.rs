//! Record header
//!
//! Every persisted record, chunks included, starts with the same 16 bytes:
//!
//! ```text
//! ┌──────────────────────────────────────────────┬──────────────┐
//! │ word (u64, LSB first)                        │ size (i64)   │
//! │ used:1 │ version:15 │ flags:48               │              │
//! └──────────────────────────────────────────────┴──────────────┘
//! ```
//!
//! Fresh mapped memory is zero, so unwritten space reads as `used == 0`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StoreError};

use super::codec::{decode_bits, encode_bits, read_word, write_word};
use super::region::Region;
use super::shape::{FieldType, Scalar};

/// Size of the record header in bytes
pub const HEADER_SIZE: usize = 16;

pub const USED_FIELD: &str = "used";
pub const VERSION_FIELD: &str = "version";
pub const FLAGS_FIELD: &str = "flags";
pub const SIZE_FIELD: &str = "size";

const USED_SHIFT: u8 = 0;
const USED_BITS: u8 = 1;
const VERSION_SHIFT: u8 = 1;
const VERSION_BITS: u8 = 15;
const FLAGS_SHIFT: u8 = 16;
const FLAGS_BITS: u8 = 48;

/// Largest storable version tag
pub const MAX_VERSION: u16 = (1 << VERSION_BITS) - 1;

/// Largest storable flags value
pub const MAX_FLAGS: u64 = (1 << FLAGS_BITS) - 1;

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    /// Live record (true) or hole (false)
    pub used: bool,

    /// Format version tag (15 bits, not enforced)
    pub version: u16,

    /// Caller-defined bits (48 bits)
    pub flags: u64,

    /// Total byte length of the record
    pub size: i64,
}

impl RecordHeader {
    /// Decode a header from the first `HEADER_SIZE` bytes of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StoreError::Access(format!(
                "record header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let word = read_word(&buf[..8]);
        Ok(Self {
            used: decode_bits(word, USED_SHIFT, USED_BITS) == 1,
            version: decode_bits(word, VERSION_SHIFT, VERSION_BITS) as u16,
            flags: decode_bits(word, FLAGS_SHIFT, FLAGS_BITS),
            size: LittleEndian::read_i64(&buf[8..16]),
        })
    }

    /// Encode into the first `HEADER_SIZE` bytes of `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_SIZE {
            return Err(StoreError::Access(format!(
                "record header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let word = encode_bits(0, USED_SHIFT, USED_BITS, u64::from(self.used))?;
        let word = encode_bits(word, VERSION_SHIFT, VERSION_BITS, u64::from(self.version))?;
        let word = encode_bits(word, FLAGS_SHIFT, FLAGS_BITS, self.flags)?;
        write_word(&mut buf[..8], word);
        LittleEndian::write_i64(&mut buf[8..16], self.size);
        Ok(())
    }

    /// Read the header of the record at `offset` in `region`
    pub fn read_from(region: &dyn Region, offset: usize) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        region.read_at(offset, &mut buf);
        Self::decode(&buf)
    }

    /// Overwrite the header of the record at `offset` in `region`
    pub fn write_to(&self, region: &dyn Region, offset: usize) -> Result<()> {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode(&mut buf)?;
        region.write_at(offset, &buf);
        Ok(())
    }
}

/// Declared header fields every shape starts with
pub(crate) fn header_fields() -> Vec<(String, FieldType)> {
    vec![
        (USED_FIELD.to_string(), FieldType::Bits(USED_BITS)),
        (VERSION_FIELD.to_string(), FieldType::Bits(VERSION_BITS)),
        (FLAGS_FIELD.to_string(), FieldType::Bits(FLAGS_BITS)),
        (SIZE_FIELD.to_string(), FieldType::Scalar(Scalar::I64)),
    ]
}

/// Set or clear the `used` bit of the record at `offset`, leaving the
/// version and flags bits untouched
pub fn set_used(region: &dyn Region, offset: usize, used: bool) -> Result<()> {
    let mut result = Ok(());
    region.modify_at(offset, 8, &mut |buf: &mut [u8]| {
        match encode_bits(read_word(buf), USED_SHIFT, USED_BITS, u64::from(used)) {
            Ok(word) => write_word(buf, word),
            Err(e) => result = Err(e),
        }
    });
    result
}

/// Read the `used` bit of the record at `offset`
pub fn is_used(region: &dyn Region, offset: usize) -> bool {
    let mut buf = [0u8; 8];
    region.read_at(offset, &mut buf);
    decode_bits(read_word(&buf), USED_SHIFT, USED_BITS) == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let header = RecordHeader {
            used: true,
            version: 7,
            flags: 0xDEAD_BEEF,
            size: 4096,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf).unwrap();

        assert_eq!(buf[0] & 1, 1);
        assert_eq!(RecordHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn zeroed_bytes_decode_as_unused() {
        let header = RecordHeader::decode(&[0u8; HEADER_SIZE]).unwrap();
        assert_eq!(header, RecordHeader::default());
        assert!(!header.used);
    }

    #[test]
    fn oversized_version_is_rejected() {
        let header = RecordHeader {
            version: MAX_VERSION + 1,
            ..Default::default()
        };
        assert!(header.encode(&mut [0u8; HEADER_SIZE]).is_err());
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(RecordHeader::decode(&[0u8; 8]).is_err());
    }
}
