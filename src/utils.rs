//! Utility functions that may be helpful for implementing
//! and testing MapReduce.
//!

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use bytes::Bytes;
use glob::glob;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Read an entire [`Bytes`] slice into a [`String`].
///
/// Note that the entire slice will be read into the string.
/// It is the caller's responsibility to ensure the slice is
/// of the correct length. Failure to do so may result in
/// an error being returned, or the string data being incorrect.
///
/// Returns an error if the slice contains invalid UTF-8.
pub fn string_from_bytes(buf: Bytes) -> Result<String> {
    Ok(String::from_utf8(buf.as_ref().into())?)
}

/// Convert a [`String`] to [`Bytes`].
#[inline]
pub fn string_to_bytes(s: String) -> Bytes {
    Bytes::from(s)
}

/// Serialize workload arguments into the auxiliary bytes handed to every
/// map and reduce call.
pub fn encode_aux_args(args: &[String]) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(args)?))
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Expand glob patterns into a sorted, de-duplicated list of absolute paths.
///
/// Each path becomes a map input identifier, so its position in the list is
/// its input index.
pub fn expand_inputs<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<String>> {
    let mut inputs = BTreeSet::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched = false;
        for entry in glob(pattern).with_context(|| format!("bad input pattern `{pattern}`"))? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            let path = path
                .canonicalize()
                .with_context(|| format!("resolving `{}`", path.display()))?;
            inputs.insert(path.to_string_lossy().into_owned());
            matched = true;
        }
        if !matched {
            warn!(pattern, "input pattern matched no files");
        }
    }
    Ok(inputs.into_iter().collect())
}
