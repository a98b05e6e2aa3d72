//! A MapReduce-compatible application that computes the
//! degree of each vertex in a graph, given a list of edges.
//!
//! Every non-blank input line is an edge `a b` between two integer vertices.

use crate::*;
use anyhow::{anyhow, Result};
use bytes::Bytes;

fn parse_line(line: &str) -> Result<(u64, u64)> {
    let mut iter = line.split_whitespace().take(2);
    let a = iter
        .next()
        .ok_or_else(|| anyhow!("invalid edge `{line}`"))?
        .parse()?;
    let b = iter
        .next()
        .ok_or_else(|| anyhow!("invalid edge `{line}`"))?
        .parse()?;
    Ok((a, b))
}

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let s = utils::string_from_bytes(kv.value)?;
    let edges = s
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect::<Result<Vec<_>>>()?;

    let iter = edges.into_iter().flat_map(|(a, b)| {
        [
            Ok(KeyValue::new(a.to_string(), "1")),
            Ok(KeyValue::new(b.to_string(), "1")),
        ]
    });
    Ok(Box::new(iter))
}

pub fn reduce(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let mut degree = 0u64;
    for value in values {
        degree += utils::string_from_bytes(value)?.parse::<u64>()?;
    }
    Ok(Bytes::from(degree.to_string()))
}
