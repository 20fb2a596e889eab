use super::PackageProfile;
use crate::error::{ErrorCode, PackageError, PackageResult};
use crate::manifest::{Manifest, PROFILE_SIP};
use crate::model::{MetadataField, ObjectId, ObjectKind, PackageContext, PayloadId, PayloadUpdate};

/// Group holding the deposit license.
pub const LICENSE_GROUP: &str = "LICENSE";

/// Submission package: a new content object deposited into a container.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionProfile;

impl PackageProfile for SubmissionProfile {
    fn name(&self) -> &'static str {
        PROFILE_SIP
    }

    fn object_type(&self, manifest: &Manifest) -> PackageResult<ObjectKind> {
        match ObjectKind::from_tag(&manifest.type_) {
            Some(ObjectKind::Content) => Ok(ObjectKind::Content),
            _ => Err(PackageError::validation(
                ErrorCode::ValidationUnsupportedType,
                format!("submission packages carry content objects, not '{}'", manifest.type_),
            )),
        }
    }

    fn attach_license(
        &self,
        ctx: &PackageContext,
        object: ObjectId,
        license: Option<PayloadId>,
    ) -> PackageResult<()> {
        let Some(payload) = license else {
            return Ok(());
        };
        let group = ctx.store.create_group(&ctx.session, object, LICENSE_GROUP)?;
        ctx.store.update_payload(
            &ctx.session,
            payload,
            PayloadUpdate {
                name: Some("license.txt".to_string()),
                format: Some("text/plain".to_string()),
                ..Default::default()
            },
        )?;
        ctx.store.attach_payload(&ctx.session, group, payload)?;
        ctx.store.set_primary(&ctx.session, group, Some(payload))?;
        Ok(())
    }

    /// Record when the submission was accepted.
    fn final_fixup(&self, ctx: &PackageContext, object: ObjectId, _manifest: &Manifest) -> PackageResult<()> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        ctx.store.add_metadata(
            &ctx.session,
            object,
            vec![MetadataField::dc("date", Some("accessioned"), now)],
        )?;
        Ok(())
    }

    fn check_minimum_metadata(&self, ctx: &PackageContext, object: ObjectId) -> PackageResult<()> {
        let current = ctx.store.object(object)?;
        match current.first_value("dc", "title", None) {
            Some(title) if !title.trim().is_empty() => Ok(()),
            _ => Err(PackageError::validation(
                ErrorCode::ValidationMinimumMetadata,
                "submission has no dc.title",
            )),
        }
    }
}
