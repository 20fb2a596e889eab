//! Step-one staging: container entries spooled to disk, then split into
//! payloads created before their object exists and metadata kept for crosswalking.

use crate::container::normalize_path;
use crate::error::PackageResult;
use crate::manifest::{LocType, Locator, Manifest};
use crate::model::PayloadId;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Unattached payloads keyed by the locator that will claim them.
///
/// Keys are normalized container paths for full containers and absolute
/// locators for internal-mode copies.
#[derive(Debug, Default)]
pub struct StagedPayloads {
    by_key: BTreeMap<String, PayloadId>,
}

impl StagedPayloads {
    pub fn get(&self, key: &str) -> Option<PayloadId> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    pub(crate) fn insert(&mut self, key: String, payload: PayloadId) {
        self.by_key.insert(key, payload);
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = PayloadId> + '_ {
        self.by_key.values().copied()
    }
}

/// Container entries keyed by normalized path.
///
/// Everything lands here while the container is read. Once the manifest is
/// known, entries that no metadata section references are taken out as payloads.
#[derive(Debug, Default)]
pub(crate) struct EntrySpool {
    files: BTreeMap<String, File>,
}

impl EntrySpool {
    pub(crate) fn insert(&mut self, path: String, reader: &mut dyn Read) -> PackageResult<u64> {
        let mut file = tempfile::tempfile()?;
        let size = io::copy(reader, &mut file)?;
        self.files.insert(path, file);
        Ok(size)
    }

    /// Rewound spool file behind a metadata reference, if the container had it.
    pub(crate) fn open(&mut self, loc: &Locator) -> PackageResult<Option<&mut File>> {
        if loc.loctype != LocType::Path {
            return Ok(None);
        }
        match self.files.get_mut(&normalize_path(&loc.href)) {
            Some(file) => {
                file.seek(SeekFrom::Start(0))?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Remove and return every entry whose path is not in `keep`, rewound.
    pub(crate) fn take_except(&mut self, keep: &BTreeSet<String>) -> PackageResult<Vec<(String, File)>> {
        let (kept, taken): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(path, _)| keep.contains(path));
        self.files = kept;
        let mut out = Vec::with_capacity(taken.len());
        for (path, mut file) in taken {
            file.seek(SeekFrom::Start(0))?;
            out.push((path, file));
        }
        Ok(out)
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }
}

/// Container paths named by metadata section references.
pub(crate) fn metadata_paths(manifest: &Manifest) -> BTreeSet<String> {
    manifest
        .dmd_secs
        .iter()
        .chain(manifest.amd_secs.iter().flat_map(|a| a.all_sections()))
        .filter_map(|sec| sec.content.locator())
        .filter(|loc| loc.loctype == LocType::Path)
        .map(|loc| normalize_path(&loc.href))
        .collect()
}

/// Everything step one produced. Cleanup walks it whatever the outcome.
#[derive(Debug, Default)]
pub(crate) struct Staging {
    pub payloads: StagedPayloads,
    pub spool: EntrySpool,
    /// Every locator the input supplied (container paths, copied URLs, the manifest).
    pub present: BTreeSet<String>,
    pub license: Option<PayloadId>,
    /// Staged payloads used without being attached to a group (representative image).
    pub kept: HashSet<PayloadId>,
}

impl Staging {
    /// All payloads created during staging.
    pub(crate) fn all_payloads(&self) -> impl Iterator<Item = PayloadId> + '_ {
        self.payloads.ids().chain(self.license)
    }
}
