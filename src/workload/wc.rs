//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::{ensure, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let s = String::from_utf8(kv.value.as_ref().into())?;
    let words = s
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>();

    let mut key_buf = BytesMut::new();
    let mut value_buf = BytesMut::with_capacity(words.len() * 8);

    let iter = words.into_iter().map(move |word| {
        key_buf.put_slice(word.as_bytes());
        value_buf.put_u64(1);

        let key = key_buf.split().freeze();
        let value = value_buf.split().freeze();

        Ok(KeyValue { key, value })
    });
    Ok(Box::new(iter))
}

pub fn reduce(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let mut count = 0u64;
    for mut value in values {
        ensure!(value.len() == 8, "word count value must be a u64");
        count += value.get_u64();
    }
    Ok(Bytes::from(count.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_lowercased_and_split_on_non_letters() {
        let kv = KeyValue::new("in", "The cat, the HAT!\nthe-end");
        let keys: Vec<_> = map(kv, Bytes::new())
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(keys, ["the", "cat", "the", "hat", "the", "end"]);
    }

    #[test]
    fn reduce_counts_occurrences() {
        let ones = (0..3).map(|_| Bytes::from(1u64.to_be_bytes().to_vec()));
        let out = reduce(Bytes::from("a"), Box::new(ones), Bytes::new()).unwrap();
        assert_eq!(out, "3");
    }

    #[test]
    fn reduce_rejects_foreign_values() {
        let values = std::iter::once(Bytes::from("1"));
        assert!(reduce(Bytes::from("a"), Box::new(values), Bytes::new()).is_err());
    }
}
