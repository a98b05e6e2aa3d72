//! A MapReduce-compatible implementation of `grep`.
//!
//! Emits one record per matching line, keyed `input:line`, so the final output
//! reads `pg-1.txt:42 the matching line`.

use crate::*;
use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    #[clap(short, long, value_parser)]
    term: String,
}

fn parse_args(aux: &Bytes) -> Result<Args> {
    let args = serde_json::from_slice::<Vec<String>>(aux)?;
    Ok(Args::try_parse_from(args)?)
}

#[allow(clippy::needless_collect)]
pub fn map(kv: KeyValue, aux: Bytes) -> MapOutput {
    let term = parse_args(&aux)?.term;

    let name = String::from_utf8(kv.key.as_ref().into())?;
    let s = String::from_utf8(kv.value.as_ref().into())?;
    let lines = s
        .lines()
        .enumerate()
        .filter(|(_, s)| s.contains(&term))
        .map(|(i, s)| (i + 1, s.to_string()))
        .collect::<Vec<_>>();

    let iter = lines.into_iter().map(move |(line_num, line)| {
        Ok(KeyValue::new(format!("{name}:{line_num}"), line))
    });
    Ok(Box::new(iter))
}

/// Every key names one line, so there is exactly one value to pass through.
pub fn reduce(
    _key: Bytes,
    mut values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    Ok(values.next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aux(args: &[&str]) -> Bytes {
        Bytes::from(serde_json::to_vec(args).unwrap())
    }

    #[test]
    fn matching_lines_are_keyed_by_position() {
        let kv = KeyValue::new("poem.txt", "roses are red\nviolets are blue\nred is red");
        let out: Vec<_> = map(kv, aux(&["--term", "red"]))
            .unwrap()
            .map(|kv| kv.unwrap())
            .collect();
        assert_eq!(
            out,
            [
                KeyValue::new("poem.txt:1", "roses are red"),
                KeyValue::new("poem.txt:3", "red is red"),
            ]
        );
    }

    #[test]
    fn missing_term_is_an_error() {
        let kv = KeyValue::new("poem.txt", "roses");
        assert!(map(kv.clone(), aux(&[])).is_err());
        assert!(map(kv, Bytes::new()).is_err());
    }
}
