//! Read budgets for untrusted packages, and the readers that enforce them.

use serde::Deserialize;
use std::io::{self, Read};

/// Resource limits applied when reading an incoming package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Compressed container bytes.
    pub max_container_bytes: u64,
    /// Decompressed tar stream bytes.
    pub max_decode_bytes: u64,
    pub max_manifest_bytes: u64,
    pub max_entries: usize,
    pub max_path_len: usize,
    pub max_json_depth: usize,
    pub max_string_len: usize,
}

const MIB: u64 = 1024 * 1024;

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_container_bytes: 4096 * MIB,
            max_decode_bytes: 16384 * MIB,
            max_manifest_bytes: 64 * MIB,
            max_entries: 100_000,
            max_path_len: 512,
            max_json_depth: 64,
            max_string_len: 16 * MIB as usize,
        }
    }
}

/// Per-field overrides as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadLimitsOverrides {
    pub max_container_bytes: Option<u64>,
    pub max_decode_bytes: Option<u64>,
    pub max_manifest_bytes: Option<u64>,
    pub max_entries: Option<usize>,
    pub max_path_len: Option<usize>,
    pub max_json_depth: Option<usize>,
    pub max_string_len: Option<usize>,
}

impl ReadLimits {
    /// These limits with every `Some` override applied.
    pub fn apply(mut self, overrides: &ReadLimitsOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = overrides.$field {
                    self.$field = v;
                })*
            };
        }
        take!(
            max_container_bytes,
            max_decode_bytes,
            max_manifest_bytes,
            max_entries,
            max_path_len,
            max_json_depth,
            max_string_len,
        );
        self
    }
}

/// Stage names carried by [`LimitExceeded`].
pub(crate) const LIMIT_TAG_CONTAINER: &str = "LimitContainerBytes";
pub(crate) const LIMIT_TAG_DECODE: &str = "LimitDecodeBytes";
pub(crate) const LIMIT_TAG_MANIFEST: &str = "LimitManifestBytes";

const LIMIT_TAGS: [&str; 3] = [LIMIT_TAG_CONTAINER, LIMIT_TAG_DECODE, LIMIT_TAG_MANIFEST];

/// A read stage ran past its byte budget.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: exceeded limit of {limit} bytes")]
pub(crate) struct LimitExceeded {
    pub stage: &'static str,
    pub limit: u64,
}

/// Passes at most `limit` bytes through. One byte more is an error, not a silent EOF.
pub(crate) struct LimitReader<R> {
    inner: R,
    limit: u64,
    remaining: u64,
    stage: &'static str,
}

impl<R: Read> LimitReader<R> {
    pub(crate) fn new(inner: R, limit: u64, stage: &'static str) -> Self {
        Self {
            inner,
            limit,
            remaining: limit,
            stage,
        }
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            let mut one = [0u8; 1];
            if self.inner.read(&mut one)? == 0 {
                return Ok(0);
            }
            return Err(io::Error::other(LimitExceeded {
                stage: self.stage,
                limit: self.limit,
            }));
        }
        let want = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

const EINTR_RETRIES: usize = 16;

/// Retries reads interrupted by a signal, up to a bound.
pub(crate) struct EintrReader<R> {
    inner: R,
}

impl<R: Read> EintrReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for EintrReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for _ in 0..EINTR_RETRIES {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
        Err(io::Error::new(
            io::ErrorKind::Interrupted,
            format!("read interrupted {} times in a row", EINTR_RETRIES),
        ))
    }
}

/// Stage whose budget an io error reports, if any.
///
/// tar and gzip sometimes re-wrap the source error as text, so the message is
/// searched when the typed error is gone.
pub(crate) fn limit_tag(err: &io::Error) -> Option<&'static str> {
    if let Some(exceeded) = err.get_ref().and_then(|e| e.downcast_ref::<LimitExceeded>()) {
        return Some(exceeded.stage);
    }
    let message = err.to_string();
    LIMIT_TAGS.into_iter().find(|tag| message.contains(tag))
}
