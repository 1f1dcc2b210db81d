//! Option records inside Configure-* packets.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PppError, Result};

/// One type-length-value option record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRecord {
    /// Option type
    pub kind: u8,
    /// Value bytes (without the type and length bytes)
    pub data: Bytes,
}

impl OptionRecord {
    /// Build a record
    pub fn new(kind: u8, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Record carrying a single byte
    pub fn with_u8(kind: u8, value: u8) -> Self {
        Self::new(kind, vec![value])
    }

    /// Record carrying a big-endian `u16`
    pub fn with_u16(kind: u8, value: u16) -> Self {
        Self::new(kind, value.to_be_bytes().to_vec())
    }

    /// Record carrying a big-endian `u32`
    pub fn with_u32(kind: u8, value: u32) -> Self {
        Self::new(kind, value.to_be_bytes().to_vec())
    }

    /// Record with no value (boolean options such as PFC)
    pub fn flag(kind: u8) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Encoded length, i.e. the record's length byte
    pub fn wire_len(&self) -> usize {
        2 + self.data.len()
    }

    /// Byte at `offset` of the value
    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Big-endian `u16` at `offset` of the value
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Big-endian `u32` at `offset` of the value
    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Append the encoded record to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind);
        buf.put_u8(self.wire_len() as u8);
        buf.put_slice(&self.data);
    }
}

/// Result of a lenient record parse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    /// Well-formed records, in order
    pub records: Vec<OptionRecord>,
    /// Unparseable remainder, starting at the first bad record
    pub malformed: Option<Bytes>,
}

/// Parse option records, keeping everything up to the first bad record.
///
/// A record whose length byte is below 2 or runs past the buffer ends the
/// parse; the remaining bytes are returned as `malformed` so the caller can
/// reject them instead of dropping the whole packet.
pub fn parse_records(data: &[u8]) -> ParsedOptions {
    let mut parsed = ParsedOptions::default();
    let mut offset = 0;

    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < 2 || (rest[1] as usize) < 2 || rest[1] as usize > rest.len() {
            parsed.malformed = Some(Bytes::copy_from_slice(rest));
            break;
        }

        let len = rest[1] as usize;
        parsed.records.push(OptionRecord {
            kind: rest[0],
            data: Bytes::copy_from_slice(&rest[2..len]),
        });
        offset += len;
    }

    parsed
}

/// Parse option records, failing on any malformed record
pub fn parse_records_strict(data: &[u8]) -> Result<Vec<OptionRecord>> {
    let parsed = parse_records(data);
    match parsed.malformed {
        Some(tail) => Err(PppError::MalformedPacket(format!(
            "bad option record after {} good ones ({} trailing bytes)",
            parsed.records.len(),
            tail.len()
        ))),
        None => Ok(parsed.records),
    }
}

/// Encode a sequence of records
pub fn encode_records<'a>(records: impl IntoIterator<Item = &'a OptionRecord>) -> Bytes {
    let mut buf = BytesMut::new();
    for record in records {
        record.encode_into(&mut buf);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_parse_records() {
        let data = hex!("03 06 0a 00 00 01 02 06 00 2d 0f 01");
        let parsed = parse_records(&data);
        assert!(parsed.malformed.is_none());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].kind, 3);
        assert_eq!(parsed.records[0].u32_at(0), Some(0x0a000001));
        assert_eq!(parsed.records[1].u16_at(0), Some(0x002d));
        assert_eq!(parsed.records[1].u8_at(2), Some(0x0f));
        assert_eq!(parsed.records[1].u8_at(4), None);
    }

    #[test]
    fn test_overlong_record_is_malformed_tail() {
        // second record claims 9 bytes but only 4 remain
        let data = hex!("03 06 0a 00 00 01 81 09 08 08");
        let parsed = parse_records(&data);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.malformed.as_deref(), Some(&hex!("81 09 08 08")[..]));
        assert!(parse_records_strict(&data).is_err());
    }

    #[test]
    fn test_zero_length_record_is_malformed() {
        let parsed = parse_records(&hex!("03 00 01 02"));
        assert!(parsed.records.is_empty());
        assert!(parsed.malformed.is_some());
    }

    #[test]
    fn test_dangling_type_byte() {
        let parsed = parse_records(&hex!("07 02 08"));
        assert_eq!(parsed.records, vec![OptionRecord::flag(7)]);
        assert_eq!(parsed.malformed.as_deref(), Some(&[0x08][..]));
    }

    #[test]
    fn test_encode_records() {
        let records = [
            OptionRecord::with_u32(3, 0x0a000001),
            OptionRecord::flag(7),
            OptionRecord::with_u16(1, 1500),
        ];
        let encoded = encode_records(&records);
        assert_eq!(encoded.as_ref(), &hex!("03 06 0a 00 00 01 07 02 01 04 05 dc"));
        assert_eq!(parse_records_strict(&encoded).unwrap(), records.to_vec());
    }
}
