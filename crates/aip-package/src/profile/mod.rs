//! Package profiles.
//!
//! A profile narrows the general manifest grammar to one agreed variant and
//! supplies the ingest hooks that differ between variants. One implementation
//! per variant, chosen by [`ProfileKind`] and passed to the ingester and
//! disseminator as a trait object.

mod aip;
mod submission;

pub use aip::AipProfile;
pub use submission::SubmissionProfile;

use crate::container::{normalize_path, MANIFEST_PATH};
use crate::error::{ErrorCode, PackageError, PackageResult};
use crate::ingest::StagedPayloads;
use crate::manifest::{check_structure, FileEntry, LocType, Manifest, MdSec};
use crate::model::{ObjectId, ObjectKind, PackageContext, PayloadId, PayloadUpdate};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;

/// Configured profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Aip,
    Submission,
}

impl ProfileKind {
    pub fn build(self) -> Arc<dyn PackageProfile> {
        match self {
            Self::Aip => Arc::new(AipProfile),
            Self::Submission => Arc::new(SubmissionProfile),
        }
    }
}

pub trait PackageProfile: Send + Sync {
    /// Profile string written to and required on the manifest root.
    fn name(&self) -> &'static str;

    /// Reject manifests of another profile, then check internal references.
    fn check_manifest(&self, manifest: &Manifest) -> PackageResult<()> {
        if manifest.profile != self.name() {
            return Err(PackageError::validation(
                ErrorCode::ValidationProfileMismatch,
                format!(
                    "manifest profile '{}' is not '{}'",
                    manifest.profile,
                    self.name()
                ),
            ));
        }
        check_structure(manifest)
    }

    fn object_type(&self, manifest: &Manifest) -> PackageResult<ObjectKind> {
        ObjectKind::from_tag(&manifest.type_).ok_or_else(|| {
            PackageError::validation(
                ErrorCode::ValidationUnsupportedType,
                format!("unsupported object type '{}'", manifest.type_),
            )
        })
    }

    /// Descriptive sections to crosswalk on ingest.
    ///
    /// The first section whose md type appears in `preferred` (in preference
    /// order) wins, else the first section. When the winner has a group id,
    /// every section of a *different* group is added; sections of the same
    /// group are alternatives of the winner.
    fn select_descriptive<'m>(&self, manifest: &'m Manifest, preferred: &[String]) -> Vec<&'m MdSec> {
        let chosen = preferred
            .iter()
            .find_map(|p| {
                manifest
                    .dmd_secs
                    .iter()
                    .find(|s| s.md_type().eq_ignore_ascii_case(p))
            })
            .or_else(|| manifest.dmd_secs.first());
        let Some(chosen) = chosen else {
            return Vec::new();
        };
        let mut out = vec![chosen];
        if let Some(group) = chosen.group_id.as_deref() {
            out.extend(manifest.dmd_secs.iter().filter(|s| {
                s.group_id.as_deref().is_some_and(|g| g != group)
            }));
        }
        out
    }

    /// Attach the caller-supplied license (already staged) to `object`.
    fn attach_license(
        &self,
        ctx: &PackageContext,
        object: ObjectId,
        license: Option<PayloadId>,
    ) -> PackageResult<()>;

    /// Object-wide fixups after all metadata is applied.
    fn final_fixup(&self, _ctx: &PackageContext, _object: ObjectId, _manifest: &Manifest) -> PackageResult<()> {
        Ok(())
    }

    fn check_minimum_metadata(&self, _ctx: &PackageContext, _object: ObjectId) -> PackageResult<()> {
        Ok(())
    }

    /// Staged payload (and its staging key) for a file entry.
    ///
    /// Path locators match container entries, URL locators match payloads
    /// copied from the store. Handles never point at payload bytes.
    fn resolve_payload(&self, file: &FileEntry, staged: &StagedPayloads) -> Option<(String, PayloadId)> {
        let key = match file.loc.loctype {
            LocType::Path => normalize_path(&file.loc.href),
            LocType::Url => file.loc.href.clone(),
            LocType::Handle => return None,
        };
        staged.get(&key).map(|id| (key, id))
    }

    /// Resolve a still-unknown format from the declared MIME type, then from content.
    fn finish_payload(&self, ctx: &PackageContext, payload: PayloadId, file: &FileEntry) -> PackageResult<()> {
        if ctx.store.payload(payload)?.format.is_some() {
            return Ok(());
        }
        let format = match file.mime.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(mime) => mime.to_string(),
            None => {
                let mut head = Vec::with_capacity(SNIFF_LEN);
                ctx.store
                    .open_payload(&ctx.session, payload)?
                    .take(SNIFF_LEN as u64)
                    .read_to_end(&mut head)?;
                sniff_format(&head).to_string()
            }
        };
        tracing::debug!(file = %file.id, format = %format, "payload format resolved");
        ctx.store.update_payload(
            &ctx.session,
            payload,
            PayloadUpdate {
                format: Some(format),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Remove expected discrepancies before reconciliation is judged.
    fn adjust_reconciliation(&self, extra: &mut BTreeSet<String>, _missing: &mut BTreeSet<String>) {
        extra.remove(MANIFEST_PATH);
    }
}

const SNIFF_LEN: usize = 16;

/// MIME type guessed from leading magic bytes.
pub fn sniff_format(head: &[u8]) -> &'static str {
    const MAGIC: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"<?xml", "text/xml"),
    ];
    if let Some((_, mime)) = MAGIC.iter().find(|(magic, _)| head.starts_with(magic)) {
        return *mime;
    }
    match std::str::from_utf8(head) {
        Ok(text) if !text.is_empty() && !text.contains('\0') => "text/plain",
        // A multi-byte char cut at the sniff boundary is still text.
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{MdContent, PROFILE_AIP};

    fn dmd(id: &str, md_type: &str, group: Option<&str>) -> MdSec {
        MdSec {
            id: id.to_string(),
            group_id: group.map(String::from),
            content: MdContent::Wrap {
                md_type: md_type.to_string(),
                mime: None,
                data: None,
                bin_data: None,
            },
        }
    }

    fn ids(secs: Vec<&MdSec>) -> Vec<&str> {
        secs.into_iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn preferred_type_wins_and_other_groups_follow() {
        let mut m = Manifest::new(PROFILE_AIP, "urn:x/1", "m", "CONTENT");
        m.dmd_secs = vec![
            dmd("dmd_1", "QDC", Some("g1")),
            dmd("dmd_2", "INTERNAL", Some("g1")),
            dmd("dmd_3", "QDC", Some("g2")),
            dmd("dmd_4", "QDC", None),
        ];
        let preferred = vec!["INTERNAL".to_string(), "QDC".to_string()];
        assert_eq!(ids(AipProfile.select_descriptive(&m, &preferred)), ["dmd_2", "dmd_3"]);
    }

    #[test]
    fn falls_back_to_first_section_without_group() {
        let mut m = Manifest::new(PROFILE_AIP, "urn:x/1", "m", "CONTENT");
        m.dmd_secs = vec![dmd("dmd_1", "MODS", None), dmd("dmd_2", "MODS", Some("g"))];
        assert_eq!(ids(AipProfile.select_descriptive(&m, &["QDC".to_string()])), ["dmd_1"]);
    }

    #[test]
    fn profile_mismatch_is_rejected() {
        let m = Manifest::new("SIP-1.0", "urn:x/1", "m", "CONTENT");
        let err = AipProfile.check_manifest(&m).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationProfileMismatch);
    }

    #[test]
    fn unknown_object_type_is_rejected() {
        let m = Manifest::new(PROFILE_AIP, "urn:x/1", "m", "ITEM");
        assert_eq!(
            AipProfile.object_type(&m).unwrap_err().code,
            ErrorCode::ValidationUnsupportedType
        );
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_format(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(sniff_format(b"\x89PNG\r\n\x1a\n\0\0"), "image/png");
        assert_eq!(sniff_format(b"hello world"), "text/plain");
        assert_eq!(sniff_format(b"\0\x01\x02"), "application/octet-stream");
        assert_eq!(sniff_format(b""), "application/octet-stream");
    }
}
