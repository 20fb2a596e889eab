use super::PackageProfile;
use crate::container::MANIFEST_PATH;
use crate::error::PackageResult;
use crate::manifest::{Manifest, PROFILE_AIP};
use crate::model::{MetadataField, ObjectId, PackageContext, PayloadId};
use std::collections::BTreeSet;

/// Detached signatures may travel next to the payloads without being referenced.
const SIGNATURE_SUFFIXES: &[&str] = &[".sig", ".asc", ".p7s"];

/// Archival package: complete, restores one object.
#[derive(Debug, Clone, Copy, Default)]
pub struct AipProfile;

impl PackageProfile for AipProfile {
    fn name(&self) -> &'static str {
        PROFILE_AIP
    }

    /// The archive carries its own rights; the license text is ignored.
    fn attach_license(
        &self,
        _ctx: &PackageContext,
        object: ObjectId,
        license: Option<PayloadId>,
    ) -> PackageResult<()> {
        if license.is_some() {
            tracing::debug!(%object, "license text ignored for archival package");
        }
        Ok(())
    }

    /// Restore a missing title from the manifest label.
    fn final_fixup(&self, ctx: &PackageContext, object: ObjectId, manifest: &Manifest) -> PackageResult<()> {
        let current = ctx.store.object(object)?;
        if current.first_value("dc", "title", None).is_some() {
            return Ok(());
        }
        if let Some(label) = manifest.label.as_deref().filter(|l| !l.trim().is_empty()) {
            ctx.store.add_metadata(
                &ctx.session,
                object,
                vec![MetadataField::dc("title", None, label)],
            )?;
        }
        Ok(())
    }

    fn adjust_reconciliation(&self, extra: &mut BTreeSet<String>, _missing: &mut BTreeSet<String>) {
        extra.remove(MANIFEST_PATH);
        extra.retain(|path| !SIGNATURE_SUFFIXES.iter().any(|s| path.ends_with(s)));
    }
}
