use super::{check_entry_path, normalize_path, MANIFEST_PATH};
use crate::error::{ErrorCode, PackageError, PackageResult};
use crate::limits::{
    limit_tag, EintrReader, LimitReader, ReadLimits, LIMIT_TAG_CONTAINER, LIMIT_TAG_DECODE,
    LIMIT_TAG_MANIFEST,
};
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::io::{self, Read};

/// A non-manifest entry seen while reading a full container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Normalized relative path.
    pub path: String,
    pub size: u64,
}

/// Manifest bytes plus the list of every other entry, in container order.
#[derive(Debug, Default)]
pub struct ContainerContents {
    pub manifest: Vec<u8>,
    pub entries: Vec<ContainerEntry>,
}

/// Read a full container, handing every non-manifest entry to `on_entry`.
///
/// Limits are enforced on the compressed stream, the decoded stream, the
/// manifest size, the entry count and the path length. Absolute paths, `..`,
/// links and duplicate entries are validation failures.
pub fn read_container<R, F>(
    input: R,
    limits: &ReadLimits,
    mut on_entry: F,
) -> PackageResult<ContainerContents>
where
    R: Read,
    F: FnMut(&ContainerEntry, &mut dyn Read) -> PackageResult<()>,
{
    let input = LimitReader::new(EintrReader::new(input), limits.max_container_bytes, LIMIT_TAG_CONTAINER);
    let decoder = LimitReader::new(GzDecoder::new(input), limits.max_decode_bytes, LIMIT_TAG_DECODE);
    let mut archive = tar::Archive::new(decoder);

    let mut manifest: Option<Vec<u8>> = None;
    let mut entries = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let iter = archive
        .entries()
        .map_err(|e| read_error(e).with_context("gzip/tar stream"))?;
    for (i, entry) in iter.enumerate() {
        let mut entry = entry.map_err(|e| read_error(e).with_context(format!("entry #{}", i)))?;
        if i >= limits.max_entries {
            return Err(PackageError::validation(
                ErrorCode::ValidationLimit,
                format!("container holds more than {} entries", limits.max_entries),
            ));
        }

        let raw = entry
            .path()
            .map_err(|e| read_error(e).with_context(format!("entry #{}", i)))?
            .to_str()
            .map(String::from)
            .ok_or_else(|| {
                PackageError::validation(
                    ErrorCode::ValidationPathTraversal,
                    format!("entry #{} has a non UTF-8 path", i),
                )
            })?;
        check_entry_path(&raw, limits.max_path_len)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }
        if !entry_type.is_file() {
            return Err(PackageError::validation(
                ErrorCode::ValidationPathTraversal,
                format!("entry '{}' is not a regular file", raw),
            ));
        }

        let path = normalize_path(&raw);
        if !seen.insert(path.clone()) {
            return Err(PackageError::validation(
                ErrorCode::ValidationDuplicateEntry,
                format!("duplicate entry '{}'", path),
            ));
        }

        if path == MANIFEST_PATH {
            let mut bytes = Vec::new();
            LimitReader::new(&mut entry, limits.max_manifest_bytes, LIMIT_TAG_MANIFEST)
                .read_to_end(&mut bytes)
                .map_err(|e| read_error(e).with_context(MANIFEST_PATH))?;
            manifest = Some(bytes);
            continue;
        }

        let record = ContainerEntry {
            path,
            size: entry.header().size().map_err(read_error)?,
        };
        let mut failure = None;
        let result = on_entry(
            &record,
            &mut Tracked {
                inner: &mut entry,
                failure: &mut failure,
            },
        );
        // A read failure inside the callback is reported as the read failure it was.
        if let Some(err) = failure {
            return Err(read_error(err).with_context(record.path));
        }
        result?;
        tracing::debug!(path = %record.path, size = record.size, "container entry read");
        entries.push(record);
    }

    let manifest = manifest.ok_or_else(|| {
        PackageError::validation(
            ErrorCode::ValidationMissingManifest,
            format!("container has no '{}'", MANIFEST_PATH),
        )
    })?;
    Ok(ContainerContents { manifest, entries })
}

/// Map a read failure to a limit violation or a malformed-container error.
pub(crate) fn read_error(err: io::Error) -> PackageError {
    let code = match limit_tag(&err) {
        Some(_) => ErrorCode::ValidationLimit,
        None => ErrorCode::ValidationMalformedContainer,
    };
    PackageError::validation(code, err.to_string()).with_source(err)
}

/// Remembers the first read error so it survives the callback's own error mapping.
struct Tracked<'a, R> {
    inner: R,
    failure: &'a mut Option<io::Error>,
}

impl<R: Read> Read for Tracked<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                if self.failure.is_none() {
                    *self.failure = Some(io::Error::new(e.kind(), e.to_string()));
                }
                Err(e)
            }
        }
    }
}
