//! Field codec
//!
//! Little-endian encoding of scalars and bit fields over byte slices.
//! Integers travel as `i128` so every width, signed or not, fits one path.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StoreError};

use super::shape::Scalar;

/// Decode an integer scalar
pub(crate) fn decode_integer(buf: &[u8], scalar: Scalar) -> i128 {
    match scalar {
        Scalar::I8 => i128::from(buf[0] as i8),
        Scalar::I16 => i128::from(LittleEndian::read_i16(buf)),
        Scalar::I32 => i128::from(LittleEndian::read_i32(buf)),
        Scalar::I64 => i128::from(LittleEndian::read_i64(buf)),
        Scalar::U8 => i128::from(buf[0]),
        Scalar::U16 => i128::from(LittleEndian::read_u16(buf)),
        Scalar::U32 => i128::from(LittleEndian::read_u32(buf)),
        Scalar::U64 => i128::from(LittleEndian::read_u64(buf)),
        Scalar::F32 | Scalar::F64 => unreachable!("float scalars go through decode_float"),
    }
}

/// Encode an integer scalar, rejecting values outside its range
pub(crate) fn encode_integer(buf: &mut [u8], scalar: Scalar, value: i128) -> Result<()> {
    let (min, max) = integer_bounds(scalar);
    if value < min || value > max {
        return Err(StoreError::Access(format!(
            "value {} out of range for {:?} ({}..={})",
            value, scalar, min, max
        )));
    }

    match scalar {
        Scalar::I8 => buf[0] = value as i8 as u8,
        Scalar::I16 => LittleEndian::write_i16(buf, value as i16),
        Scalar::I32 => LittleEndian::write_i32(buf, value as i32),
        Scalar::I64 => LittleEndian::write_i64(buf, value as i64),
        Scalar::U8 => buf[0] = value as u8,
        Scalar::U16 => LittleEndian::write_u16(buf, value as u16),
        Scalar::U32 => LittleEndian::write_u32(buf, value as u32),
        Scalar::U64 => LittleEndian::write_u64(buf, value as u64),
        Scalar::F32 | Scalar::F64 => unreachable!("float scalars go through encode_float"),
    }
    Ok(())
}

pub(crate) fn decode_float(buf: &[u8], scalar: Scalar) -> f64 {
    match scalar {
        Scalar::F32 => f64::from(LittleEndian::read_f32(buf)),
        _ => LittleEndian::read_f64(buf),
    }
}

pub(crate) fn encode_float(buf: &mut [u8], scalar: Scalar, value: f64) {
    match scalar {
        Scalar::F32 => LittleEndian::write_f32(buf, value as f32),
        _ => LittleEndian::write_f64(buf, value),
    }
}

/// Extract `width` bits at `shift` from a packed word
pub(crate) fn decode_bits(word: u64, shift: u8, width: u8) -> u64 {
    (word >> shift) & bit_mask(width)
}

/// Replace `width` bits at `shift` in a packed word
pub(crate) fn encode_bits(word: u64, shift: u8, width: u8, value: u64) -> Result<u64> {
    let mask = bit_mask(width);
    if value > mask {
        return Err(StoreError::Access(format!(
            "value {} does not fit in a {}-bit field",
            value, width
        )));
    }
    Ok((word & !(mask << shift)) | (value << shift))
}

pub(crate) fn read_word(buf: &[u8]) -> u64 {
    LittleEndian::read_u64(buf)
}

pub(crate) fn write_word(buf: &mut [u8], word: u64) {
    LittleEndian::write_u64(buf, word)
}

fn bit_mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn integer_bounds(scalar: Scalar) -> (i128, i128) {
    match scalar {
        Scalar::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
        Scalar::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
        Scalar::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
        Scalar::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
        Scalar::U8 => (0, i128::from(u8::MAX)),
        Scalar::U16 => (0, i128::from(u16::MAX)),
        Scalar::U32 => (0, i128::from(u32::MAX)),
        Scalar::U64 => (0, i128::from(u64::MAX)),
        Scalar::F32 | Scalar::F64 => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut buf = [0u8; 4];
        encode_integer(&mut buf, Scalar::U32, 0x0102_0304).unwrap();
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_integer(&buf, Scalar::U32), 0x0102_0304);
    }

    #[test]
    fn signed_values_keep_their_sign() {
        let mut buf = [0u8; 2];
        encode_integer(&mut buf, Scalar::I16, -2).unwrap();
        assert_eq!(decode_integer(&buf, Scalar::I16), -2);
        assert_eq!(decode_integer(&buf, Scalar::U16), 0xFFFE);
    }

    #[test]
    fn out_of_range_integer_is_rejected() {
        let mut buf = [0u8; 1];
        assert!(encode_integer(&mut buf, Scalar::U8, 256).is_err());
        assert!(encode_integer(&mut buf, Scalar::I8, -129).is_err());
        assert!(encode_integer(&mut buf, Scalar::U8, -1).is_err());
        assert_eq!(buf, [0]);
    }

    #[test]
    fn f32_narrows() {
        let mut buf = [0u8; 4];
        encode_float(&mut buf, Scalar::F32, 1.5);
        assert_eq!(decode_float(&buf, Scalar::F32), 1.5);
    }

    #[test]
    fn bits_pack_lsb_first() {
        let word = encode_bits(0, 0, 1, 1).unwrap();
        let word = encode_bits(word, 1, 15, 0x7FFF).unwrap();
        let word = encode_bits(word, 16, 48, 0xABCD).unwrap();

        assert_eq!(word & 1, 1);
        assert_eq!(decode_bits(word, 1, 15), 0x7FFF);
        assert_eq!(decode_bits(word, 16, 48), 0xABCD);

        // Clearing one field leaves its neighbours alone
        let cleared = encode_bits(word, 0, 1, 0).unwrap();
        assert_eq!(decode_bits(cleared, 0, 1), 0);
        assert_eq!(decode_bits(cleared, 1, 15), 0x7FFF);
    }

    #[test]
    fn bits_reject_wide_values() {
        assert!(encode_bits(0, 1, 15, 1 << 15).is_err());
        assert!(encode_bits(0, 0, 64, u64::MAX).is_ok());
    }
}
