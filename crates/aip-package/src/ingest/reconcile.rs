use crate::container::normalize_path;
use crate::error::{ErrorCode, PackageError, PackageResult};
use crate::manifest::{LocType, Locator, Manifest};
use crate::profile::PackageProfile;
use std::collections::BTreeSet;

/// Entries supplied but never referenced, and references never supplied.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discrepancies {
    pub extra: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

impl Discrepancies {
    pub fn is_empty(&self) -> bool {
        self.extra.is_empty() && self.missing.is_empty()
    }

    fn details(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|p| format!("missing: {}", p))
            .chain(self.extra.iter().map(|p| format!("extra: {}", p)))
            .collect()
    }
}

/// Comparison key of a reference; handles never name container content.
fn reference_key(loc: &Locator) -> Option<String> {
    match loc.loctype {
        LocType::Path => Some(normalize_path(&loc.href)),
        LocType::Url => Some(loc.href.clone()),
        LocType::Handle => None,
    }
}

/// Every file and metadata reference the manifest makes.
pub fn referenced(manifest: &Manifest) -> BTreeSet<String> {
    let files = manifest.files().map(|(_, f)| &f.loc);
    let sections = manifest
        .dmd_secs
        .iter()
        .chain(manifest.amd_secs.iter().flat_map(|a| a.all_sections()))
        .filter_map(|s| s.content.locator());
    files.chain(sections).filter_map(reference_key).collect()
}

/// Symmetric difference of references and supplied entries, after the profile's adjustment.
pub fn discrepancies(
    manifest: &Manifest,
    present: &BTreeSet<String>,
    profile: &dyn PackageProfile,
) -> Discrepancies {
    let referenced = referenced(manifest);
    let mut extra: BTreeSet<String> = present.difference(&referenced).cloned().collect();
    let mut missing: BTreeSet<String> = referenced.difference(present).cloned().collect();
    profile.adjust_reconciliation(&mut extra, &mut missing);
    Discrepancies { extra, missing }
}

pub fn reconcile(
    manifest: &Manifest,
    present: &BTreeSet<String>,
    profile: &dyn PackageProfile,
) -> PackageResult<()> {
    let found = discrepancies(manifest, present, profile);
    if found.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        extra = found.extra.len(),
        missing = found.missing.len(),
        "reconciliation failed"
    );
    Err(PackageError::validation(
        ErrorCode::ValidationReconciliation,
        format!(
            "container does not match manifest: {} missing, {} extra",
            found.missing.len(),
            found.extra.len()
        ),
    )
    .with_details(found.details()))
}
