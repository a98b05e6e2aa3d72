//! An inverted index: for every word, the inputs that contain it.
//!
//! Output lines read `word 2 pg-1.txt,pg-7.txt`: the number of documents,
//! then the documents in sorted order.

use std::collections::BTreeSet;

use crate::*;
use anyhow::Result;
use bytes::Bytes;

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let document = kv.key;
    let s = utils::string_from_bytes(kv.value)?;
    let words = s
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
        .collect::<BTreeSet<_>>();

    let iter = words
        .into_iter()
        .map(move |word| Ok(KeyValue::new(word, document.clone())));
    Ok(Box::new(iter))
}

pub fn reduce(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let documents = values
        .map(utils::string_from_bytes)
        .collect::<Result<BTreeSet<_>>>()?;
    let count = documents.len();
    let joined = documents.into_iter().collect::<Vec<_>>().join(",");
    Ok(Bytes::from(format!("{count} {joined}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_word_is_emitted_once_per_document() {
        let kv = KeyValue::new("doc-a", "b a b A");
        let out: Vec<_> = map(kv, Bytes::new())
            .unwrap()
            .map(|kv| kv.unwrap())
            .collect();
        assert_eq!(
            out,
            [KeyValue::new("a", "doc-a"), KeyValue::new("b", "doc-a")]
        );
    }

    #[test]
    fn reduce_lists_distinct_documents_in_order() {
        let docs = ["z.txt", "a.txt", "z.txt"].map(Bytes::from);
        let out = reduce(Bytes::from("w"), Box::new(docs.into_iter()), Bytes::new()).unwrap();
        assert_eq!(out, "2 a.txt,z.txt");
    }
}
