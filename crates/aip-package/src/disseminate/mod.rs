//! Object -> package.
//!
//! Planning builds the manifest and the ordered list of container entries;
//! writing copies payload bytes and drains streamed metadata in that order.
//! Output is spooled to a temporary file and copied to the caller's sink only
//! once complete, so a failure never leaves a truncated package behind.

mod plan;

pub(crate) use plan::derived_group;

use crate::config::{DisseminationConfig, PackagerConfig};
use crate::container::{ContainerWriter, MANIFEST_PATH};
use crate::crosswalk::CrosswalkRegistry;
use crate::error::{PackageError, PackageResult};
use crate::manifest::validate_schema;
use crate::model::{ObjectId, PackageContext};
use crate::params::{ContainerMode, PackageParams};
use crate::profile::PackageProfile;
use plan::{DisseminationPlan, EntrySource, Planner};
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

/// What one dissemination produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisseminationReport {
    pub mode: ContainerMode,
    /// File entries in the manifest (zeroed ones included).
    pub files: usize,
    /// Payloads left out under `unauthorized = skip`.
    pub skipped: usize,
    /// Payloads replaced by empty placeholders under `unauthorized = zero`.
    pub zeroed: usize,
    pub metadata_sections: usize,
    pub streamed_sections: usize,
    pub bytes_written: u64,
}

impl Default for DisseminationReport {
    fn default() -> Self {
        Self {
            mode: ContainerMode::Full,
            files: 0,
            skipped: 0,
            zeroed: 0,
            metadata_sections: 0,
            streamed_sections: 0,
            bytes_written: 0,
        }
    }
}

pub struct Disseminator {
    registry: Arc<CrosswalkRegistry>,
    profile: Arc<dyn PackageProfile>,
    config: DisseminationConfig,
    header_note: Option<String>,
    pipe_capacity: usize,
}

impl Disseminator {
    pub fn new(registry: Arc<CrosswalkRegistry>, config: &PackagerConfig) -> Self {
        Self {
            registry,
            profile: config.profile.build(),
            config: config.dissemination.clone(),
            header_note: config.header_note.clone(),
            pipe_capacity: config.pipe_capacity,
        }
    }

    pub fn with_profile(mut self, profile: Arc<dyn PackageProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn profile(&self) -> &dyn PackageProfile {
        self.profile.as_ref()
    }

    /// Package `object` and write the result to `out`.
    pub fn disseminate(
        &self,
        ctx: &PackageContext,
        object: ObjectId,
        params: &PackageParams,
        out: &mut dyn Write,
    ) -> PackageResult<DisseminationReport> {
        let mode = params.mode();
        tracing::info!(%object, ?mode, profile = self.profile.name(), "dissemination started");

        let planner = Planner {
            ctx,
            registry: &self.registry,
            config: &self.config,
            profile_name: self.profile.name(),
            header_note: self.header_note.as_deref(),
            mode,
            unauthorized: params.unauthorized,
            pipe_capacity: self.pipe_capacity,
        };
        let plan = planner.plan(object)?;

        if params.validate {
            validate_schema(&serde_json::to_value(&plan.manifest)?)?;
        }
        let manifest_bytes = plan.manifest.to_vec_pretty()?;

        let mut spool = tempfile::tempfile()?;
        let mut report = match mode {
            ContainerMode::Full => write_container(ctx, plan, &manifest_bytes, &mut spool)?,
            ContainerMode::ManifestOnly | ContainerMode::Internal => {
                spool.write_all(&manifest_bytes)?;
                plan.report
            }
        };
        spool.flush()?;
        spool.seek(SeekFrom::Start(0))?;
        report.bytes_written = io::copy(&mut spool, out)?;
        out.flush()?;

        tracing::info!(
            %object,
            files = report.files,
            skipped = report.skipped,
            zeroed = report.zeroed,
            bytes = report.bytes_written,
            "dissemination finished"
        );
        Ok(report)
    }
}

fn write_container(
    ctx: &PackageContext,
    mut plan: DisseminationPlan,
    manifest_bytes: &[u8],
    spool: &mut std::fs::File,
) -> PackageResult<DisseminationReport> {
    let mut writer = ContainerWriter::new(io::BufWriter::new(spool));
    writer.append_bytes(MANIFEST_PATH, manifest_bytes)?;
    for entry in &plan.entries {
        match entry.source {
            EntrySource::Payload { id, size } => {
                let mut reader = ctx.store.open_payload(&ctx.session, id)?;
                writer.append_reader(&entry.path, size, &mut reader)?;
            }
            EntrySource::Zero => writer.append_bytes(&entry.path, &[])?,
            EntrySource::Streamed(index) => {
                let section = plan.streamed.get_mut(index).and_then(Option::take).ok_or_else(|| {
                    PackageError::archive(format!("streamed section for '{}' already written", entry.path))
                })?;
                let mut tmp = tempfile::tempfile()?;
                let size = section.drain_into(&mut tmp)?;
                tmp.seek(SeekFrom::Start(0))?;
                writer.append_reader(&entry.path, size, &mut tmp)?;
                tracing::debug!(path = %entry.path, size, "streamed section written");
            }
        }
    }
    writer.finish()?.flush()?;
    Ok(plan.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::read_container;
    use crate::limits::ReadLimits;
    use crate::manifest::{LocType, Manifest, MdContent};
    use crate::model::{AccessPolicy, Action, InMemoryRepository, ObjectKind, PolicyTarget, Principal};
    use crate::model::{EntityStore, MetadataField};
    use crate::params::UnauthorizedPolicy;
    use std::collections::HashMap;
    use std::io::Read;

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        item: ObjectId,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let root = repo.insert_object(ObjectKind::Container, None, Some("123456789/1"));
        let item = repo.insert_object(ObjectKind::Content, Some(root), Some("123456789/2"));
        repo.insert_metadata(item, [MetadataField::dc("title", None, "Field notes")]);
        let original = repo.insert_group(item, "ORIGINAL");
        let a = repo.insert_payload(original, "notes.txt", Some("text/plain"), b"first page");
        repo.insert_payload(original, "scan.pdf", Some("application/pdf"), b"%PDF-1.4 scan");
        repo.set_primary_direct(original, a);
        Fixture { repo, item }
    }

    fn context(repo: &Arc<InMemoryRepository>, principal: Principal) -> PackageContext {
        PackageContext::new(repo.clone(), repo.clone(), repo.clone(), principal)
    }

    fn disseminator() -> Disseminator {
        Disseminator::new(Arc::new(CrosswalkRegistry::with_builtin()), &PackagerConfig::default())
    }

    fn unpack(bytes: &[u8]) -> (Manifest, HashMap<String, Vec<u8>>) {
        let mut files = HashMap::new();
        let contents = read_container(bytes, &ReadLimits::default(), |entry, r| {
            let mut data = Vec::new();
            r.read_to_end(&mut data)?;
            files.insert(entry.path.clone(), data);
            Ok(())
        })
        .unwrap();
        (Manifest::from_slice(&contents.manifest).unwrap(), files)
    }

    #[test]
    fn full_container_holds_manifest_payloads_and_streamed_rights() {
        let f = fixture();
        let ctx = context(&f.repo, Principal::admin("admin"));
        let mut out = Vec::new();
        let report = disseminator()
            .disseminate(&ctx, f.item, &PackageParams::new().validate(), &mut out)
            .unwrap();
        assert_eq!(report.files, 2);
        assert!(report.streamed_sections >= 1);
        assert_eq!(report.bytes_written, out.len() as u64);

        let (manifest, files) = unpack(&out);
        assert_eq!(manifest.obj_id, "urn:123456789/2");
        assert_eq!(manifest.parent_handle(), Some("urn:123456789/1"));
        for (_, file) in manifest.files() {
            assert_eq!(file.loc.loctype, LocType::Path);
            assert!(files.contains_key(&file.loc.href), "missing {}", file.loc.href);
        }
        for sec in manifest.md_refs() {
            assert!(files.contains_key(&sec.content.locator().unwrap().href));
        }
        assert_eq!(manifest.primary_file_ids().len(), 1);
        let primary = manifest.file(&manifest.primary_file_ids()[0]).unwrap();
        assert_eq!(files[&primary.loc.href], b"first page");
    }

    #[test]
    fn manifest_only_embeds_streamed_metadata() {
        let f = fixture();
        let ctx = context(&f.repo, Principal::admin("admin"));
        let mut out = Vec::new();
        disseminator()
            .disseminate(&ctx, f.item, &PackageParams::new().manifest_only(), &mut out)
            .unwrap();
        let manifest = Manifest::from_slice(&out).unwrap();
        assert_eq!(manifest.md_refs().count(), 0);
        let rights = manifest.object_amd_secs().next().unwrap().rights_md.first().unwrap();
        assert!(matches!(&rights.content, MdContent::Wrap { bin_data: Some(_), .. }));
    }

    #[test]
    fn internal_mode_points_at_store_locators() {
        let f = fixture();
        let ctx = context(&f.repo, Principal::admin("admin"));
        let mut out = Vec::new();
        disseminator()
            .disseminate(&ctx, f.item, &PackageParams::new().internal().manifest_only(), &mut out)
            .unwrap();
        let manifest = Manifest::from_slice(&out).unwrap();
        for (_, file) in manifest.files() {
            assert_eq!(file.loc.loctype, LocType::Url);
            assert!(f.repo.find_payload_by_locator(&file.loc.href).unwrap().is_some());
        }
    }

    #[test]
    fn unreadable_payloads_follow_unauthorized_option() {
        let f = fixture();
        f.repo.grant(PolicyTarget::Object(f.item), AccessPolicy::new(Action::Read, "alice"));
        let ctx = context(&f.repo, Principal::new("alice"));

        let mut out = Vec::new();
        let err = disseminator()
            .disseminate(&ctx, f.item, &PackageParams::new(), &mut out)
            .unwrap_err();
        assert!(err.is_authorization());
        assert!(out.is_empty());

        let report = disseminator()
            .disseminate(&ctx, f.item, &PackageParams::new().unauthorized(UnauthorizedPolicy::Skip), &mut out)
            .unwrap();
        assert_eq!((report.files, report.skipped), (0, 2));
    }
}
