use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of basic blocks packed into one byte of a coverage bitmap.
pub const BITS_PER_BYTE: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitmapError {
    #[error("Invalid character {found:?} at position {position} in coverage bit string")]
    InvalidBit { position: usize, found: char },
}

/// A basic-block coverage vector written as a string of `'0'` and `'1'`
/// characters, leftmost character first.
///
/// The alphabet is checked once when the value is constructed (or
/// deserialized from a fixture), so packing a `BitString` can never fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct BitString(String);

impl BitString {
    /// Validates `s` and wraps it.
    ///
    /// Returns `BitmapError::InvalidBit` for the first character outside `{'0', '1'}`.
    pub fn parse(s: &str) -> Result<Self, BitmapError> {
        let invalid = s.chars().enumerate().find(|(_, c)| *c != '0' && *c != '1');
        if let Some((position, found)) = invalid {
            return Err(BitmapError::InvalidBit { position, found });
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of basic blocks described, before padding.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in bits once right-padded to a whole number of bytes.
    pub fn padded_len(&self) -> usize {
        packed_len(self.len()) * BITS_PER_BYTE
    }

    /// Packs the bits into bytes, most significant bit first, right-padding
    /// the final byte with zeros.
    pub fn pack(&self) -> Vec<u8> {
        self.pack_to_width(packed_len(self.len()))
    }

    /// Packs the bits into at least `num_bytes` bytes.
    ///
    /// Every bit position past the end of the string is zero, which is how
    /// shorter exemplars are brought up to the width of the longest one in a
    /// corpus. A `num_bytes` smaller than the string needs is ignored; bits
    /// are never truncated.
    pub fn pack_to_width(&self, num_bytes: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; num_bytes.max(packed_len(self.len()))];
        for (i, bit) in self.0.bytes().enumerate() {
            if bit == b'1' {
                bytes[i / BITS_PER_BYTE] |= 0x80 >> (i % BITS_PER_BYTE);
            }
        }
        bytes
    }
}

impl TryFrom<String> for BitString {
    type Error = BitmapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl FromStr for BitString {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of bytes needed to hold `bits` basic blocks.
pub fn packed_len(bits: usize) -> usize {
    bits.div_ceil(BITS_PER_BYTE)
}

/// Encodes a human-readable bit string such as `"1111111100000000"` into the
/// packed bitmap the solver reads (`[0xff, 0x00]`).
pub fn encode(bits: &str) -> Result<Vec<u8>, BitmapError> {
    Ok(BitString::parse(bits)?.pack())
}

/// Expands a packed bitmap back into its first `len` bits.
pub fn decode(bytes: &[u8], len: usize) -> String {
    let mut bits = String::with_capacity(len);
    for i in 0..len.min(bytes.len() * BITS_PER_BYTE) {
        let set = bytes[i / BITS_PER_BYTE] & (0x80 >> (i % BITS_PER_BYTE)) != 0;
        bits.push(if set { '1' } else { '0' });
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_full_bytes() {
        assert_eq!(encode("1111111100000000").unwrap(), vec![0xff, 0x00]);
        assert_eq!(encode("10000001").unwrap(), vec![0x81]);
    }

    #[test]
    fn encode_pads_last_byte_with_zeros() {
        assert_eq!(encode("1").unwrap(), vec![0x80]);
        assert_eq!(encode("101").unwrap(), vec![0xa0]);
        assert_eq!(encode("111111111").unwrap(), vec![0xff, 0x80]);
    }

    #[test]
    fn encode_empty_is_empty() {
        assert!(encode("").unwrap().is_empty());
        assert_eq!(BitString::parse("").unwrap().padded_len(), 0);
    }

    #[test]
    fn exact_multiple_is_not_padded_further() {
        let bits = BitString::parse("0000111100001111").unwrap();
        assert_eq!(bits.padded_len(), 16);
        assert_eq!(bits.pack().len(), 2);
    }

    #[test]
    fn rejects_non_binary_characters() {
        assert_eq!(
            encode("1102"),
            Err(BitmapError::InvalidBit {
                position: 3,
                found: '2'
            })
        );
        assert!(BitString::parse("1 0").is_err());
    }

    #[test]
    fn pack_to_width_pads_short_values() {
        let bits = BitString::parse("11110000").unwrap();
        assert_eq!(bits.pack_to_width(3), vec![0xf0, 0x00, 0x00]);
        assert_eq!(bits.pack_to_width(0), vec![0xf0]);
    }

    #[test]
    fn decode_restores_original_bits() {
        let pattern = "10110011100011110";
        for n in 0..=pattern.len() {
            let s = &pattern[..n];
            let packed = encode(s).unwrap();
            assert_eq!(packed.len(), n.div_ceil(8), "length for {s:?}");
            assert_eq!(decode(&packed, n), s);
        }
    }

    #[test]
    fn deserializes_from_json_string() {
        let bits: BitString = serde_json::from_str("\"0101\"").unwrap();
        assert_eq!(bits.as_str(), "0101");
        assert!(serde_json::from_str::<BitString>("\"01x1\"").is_err());
    }

    proptest! {
        #[test]
        fn any_bit_string_round_trips(bits in "[01]{0,200}") {
            let packed = encode(&bits).unwrap();
            prop_assert_eq!(packed.len(), bits.len().div_ceil(8));
            prop_assert_eq!(decode(&packed, bits.len()), bits.clone());
            let padding = packed.len() * BITS_PER_BYTE - bits.len();
            prop_assert!(decode(&packed, packed.len() * BITS_PER_BYTE).ends_with(&"0".repeat(padding)));
        }
    }
}
