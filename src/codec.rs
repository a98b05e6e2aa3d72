//! Encoding of intermediate shards.
//!
//! A shard is a flat sequence of records, each laid out as
//! `[key_len: u32 BE][key][value_len: u32 BE][value]`. Keys and values are
//! opaque bytes, so binary map output survives the round trip untouched.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::KeyValue;

const LEN_PREFIX: usize = std::mem::size_of::<u32>();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record stream truncated at byte {offset}: need {needed} more bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Encode records into a shard, preserving their order.
pub fn encode(records: &[KeyValue]) -> Bytes {
    let size = records
        .iter()
        .map(|kv| 2 * LEN_PREFIX + kv.key.len() + kv.value.len())
        .sum();
    let mut buf = BytesMut::with_capacity(size);
    for kv in records {
        buf.put_u32(kv.key.len() as u32);
        buf.put_slice(&kv.key);
        buf.put_u32(kv.value.len() as u32);
        buf.put_slice(&kv.value);
    }
    buf.freeze()
}

/// Decode a shard produced by [`encode`].
///
/// Keys and values are zero-copy slices of `buf`.
pub fn decode(mut buf: Bytes) -> Result<Vec<KeyValue>, CodecError> {
    let total = buf.len();
    let mut records = Vec::new();
    while buf.has_remaining() {
        let key = take_field(&mut buf, total)?;
        let value = take_field(&mut buf, total)?;
        records.push(KeyValue { key, value });
    }
    Ok(records)
}

fn take_field(buf: &mut Bytes, total: usize) -> Result<Bytes, CodecError> {
    let truncated = |buf: &Bytes, needed: usize| CodecError::Truncated {
        offset: total - buf.remaining(),
        needed,
        available: buf.remaining(),
    };

    if buf.remaining() < LEN_PREFIX {
        return Err(truncated(buf, LEN_PREFIX));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(truncated(buf, len));
    }
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_survive_encoding_in_order() {
        let records = vec![
            KeyValue::new("b", "1"),
            KeyValue::new("a", Bytes::from(vec![0u8, 0, 0, 0, 0, 0, 0, 1])),
            KeyValue::new("", ""),
            KeyValue::new("b", "2"),
        ];
        assert_eq!(decode(encode(&records)).unwrap(), records);
    }

    #[test]
    fn empty_shard_decodes_to_nothing() {
        assert_eq!(encode(&[]).len(), 0);
        assert!(decode(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn truncated_value_is_reported() {
        let encoded = encode(&[KeyValue::new("key", "value")]);
        let cut = encoded.slice(..encoded.len() - 2);
        let err = decode(cut).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                offset: 11,
                needed: 5,
                available: 3,
            }
        );
    }

    #[test]
    fn dangling_length_prefix_is_reported() {
        let mut encoded = BytesMut::from(&encode(&[KeyValue::new("k", "v")])[..]);
        encoded.put_u16(7);
        assert!(matches!(
            decode(encoded.freeze()),
            Err(CodecError::Truncated { needed: 4, .. })
        ));
    }
}
