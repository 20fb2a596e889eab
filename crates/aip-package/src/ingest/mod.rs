//! Package -> object.
//!
//! Ingest runs in two phases because the package may declare the object's
//! real parent and identifier, which must be known before the object exists:
//!
//! 1. spool every container entry to disk
//! 2. parse the manifest, check it against the profile, then stage every entry
//!    no metadata section references as an unattached payload (elevated)
//! 3. crosswalk source metadata to learn parent and identifier
//! 4. create the object
//! 5. crosswalk the remaining object admin metadata
//! 6. attach content (payload groups, or a container's representative image)
//! 7. reconcile container entries against manifest references
//! 8. crosswalk descriptive metadata
//! 9. profile checks and fixups
//! 10. install
//!
//! Staged payloads that end up unattached are deleted whatever the outcome.
//! Any failure after step 4 deletes the provisional object as well.

mod reconcile;
mod stage;

pub use reconcile::{discrepancies, reconcile, referenced, Discrepancies};
pub use stage::StagedPayloads;

use crate::config::{IngestConfig, PackagerConfig};
use crate::container::{normalize_path, read_container, read_error, MANIFEST_PATH};
use crate::crosswalk::{Assertion, CrosswalkRegistry, SectionSource};
use crate::disseminate::derived_group;
use crate::error::{ErrorCode, PackageError, PackageResult};
use crate::limits::{EintrReader, LimitReader, ReadLimits, LIMIT_TAG_MANIFEST};
use crate::manifest::{validate_schema, AdminKind, FileEntry, LocType, Manifest, MdContent, MdSec, LOGO_GROUP};
use crate::model::identifier::{strip_scheme, IDENTIFIER_SCHEME};
use crate::model::{
    AccessPolicy, Action, ObjectId, ObjectKind, PackageContext, PayloadId, PayloadUpdate, PolicyTarget,
};
use crate::params::{ContainerMode, PackageParams};
use crate::profile::PackageProfile;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use stage::{metadata_paths, EntrySpool, Staging};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

/// What one ingest did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub object: ObjectId,
    pub kind: ObjectKind,
    /// Persistent identifier, without scheme.
    pub identifier: String,
    pub parent: ObjectId,
    pub mode: ContainerMode,
    pub staged: usize,
    pub groups: usize,
    pub attached: usize,
    pub descriptive_sections: usize,
    /// Staged payloads deleted because nothing claimed them.
    pub discarded: usize,
}

/// Object and identifier created so far, undone on failure.
#[derive(Debug, Default)]
struct Provisional {
    object: Option<ObjectId>,
    identifier: Option<String>,
}

/// Attribute and policy changes gathered from one payload's admin sections.
#[derive(Debug, Default)]
struct PayloadChanges {
    update: PayloadUpdate,
    policies: Option<Vec<AccessPolicy>>,
}

pub struct Ingester {
    registry: Arc<CrosswalkRegistry>,
    profile: Arc<dyn PackageProfile>,
    config: IngestConfig,
    limits: ReadLimits,
}

impl Ingester {
    pub fn new(registry: Arc<CrosswalkRegistry>, config: &PackagerConfig) -> Self {
        Self {
            registry,
            profile: config.profile.build(),
            config: config.ingest.clone(),
            limits: config.read_limits(),
        }
    }

    pub fn with_profile(mut self, profile: Arc<dyn PackageProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_limits(mut self, limits: ReadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn profile(&self) -> &dyn PackageProfile {
        self.profile.as_ref()
    }

    /// Ingest a package and return the new object.
    pub fn ingest<R: Read>(
        &self,
        ctx: &PackageContext,
        input: R,
        intended_parent: Option<ObjectId>,
        params: &PackageParams,
        license: Option<&str>,
    ) -> PackageResult<ObjectId> {
        self.ingest_with_report(ctx, input, intended_parent, params, license)
            .map(|report| report.object)
    }

    pub fn ingest_with_report<R: Read>(
        &self,
        ctx: &PackageContext,
        input: R,
        intended_parent: Option<ObjectId>,
        params: &PackageParams,
        license: Option<&str>,
    ) -> PackageResult<IngestReport> {
        let mode = params.mode();
        tracing::info!(?mode, profile = self.profile.name(), "ingest started");

        let mut staging = Staging::default();
        let mut provisional = Provisional::default();
        let result = self.run(
            ctx,
            input,
            intended_parent,
            params,
            license,
            &mut staging,
            &mut provisional,
        );

        if result.is_err() {
            roll_back(ctx, &provisional);
        }
        let discarded = discard_unattached(ctx, &staging, result.is_ok());

        match result {
            Ok(mut report) => {
                report.discarded = discarded;
                tracing::info!(
                    object = %report.object,
                    identifier = %report.identifier,
                    attached = report.attached,
                    discarded,
                    "ingest finished"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(code = %err.code, error = %err.message, discarded, "ingest failed");
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run<R: Read>(
        &self,
        ctx: &PackageContext,
        input: R,
        intended_parent: Option<ObjectId>,
        params: &PackageParams,
        license: Option<&str>,
        staging: &mut Staging,
        provisional: &mut Provisional,
    ) -> PackageResult<IngestReport> {
        let mode = params.mode();

        // 1
        let manifest_bytes = self.stage(ctx, input, mode, license, staging)?;

        // 2
        let manifest = parse_manifest(&manifest_bytes, params.validate)?;
        self.profile.check_manifest(&manifest)?;
        let kind = self.profile.object_type(&manifest)?;
        stage_payloads(ctx, &manifest, staging)?;
        if mode == ContainerMode::Internal {
            stage_external(ctx, &manifest, staging)?;
        }
        tracing::debug!(
            manifest = %manifest.id,
            kind = kind.tag(),
            staged = staging.payloads.len(),
            metadata = staging.spool.len(),
            "package staged"
        );

        // 3
        let mut source = Vec::new();
        for sec in object_sections(&manifest, AdminKind::Source) {
            source.extend(self.crosswalk(sec, &mut staging.spool)?);
        }
        let parent = resolve_parent(ctx, &manifest, &source, intended_parent, params)?;
        let asserted = if params.ignore_handle {
            None
        } else {
            asserted_identifier(&manifest, &source)
        };
        if let Some(identifier) = &asserted {
            if let Some(existing) = ctx.identifiers.resolve(identifier) {
                return Err(PackageError::validation(
                    ErrorCode::ValidationIdentifierConflict,
                    format!("identifier '{}' already belongs to {}", identifier, existing),
                ));
            }
        }

        // 4
        let object = ctx.store.create_object(&ctx.session, kind, parent)?;
        provisional.object = Some(object);
        let identifier = match asserted {
            Some(identifier) => {
                ctx.identifiers.register(&identifier, object)?;
                identifier
            }
            None => ctx.identifiers.mint(object)?,
        };
        provisional.identifier = Some(identifier.clone());
        tracing::debug!(%object, %parent, %identifier, "provisional object created");

        // 5
        let mut policies = None;
        self.apply_to_object(ctx, object, source, &mut policies)?;
        for admin in [AdminKind::Tech, AdminKind::Rights, AdminKind::Digiprov] {
            for sec in object_sections(&manifest, admin) {
                let assertions = self.crosswalk(sec, &mut staging.spool)?;
                if admin == AdminKind::Rights {
                    policies.get_or_insert_with(Vec::new);
                }
                self.apply_to_object(ctx, object, assertions, &mut policies)?;
            }
        }
        match policies {
            Some(policies) => ctx
                .policy()
                .replace_policies(PolicyTarget::Object(object), policies)?,
            None => ctx
                .policy()
                .inherit_policies(PolicyTarget::Object(parent), PolicyTarget::Object(object))?,
        }

        // 6
        let mut report = IngestReport {
            object,
            kind,
            identifier,
            parent,
            mode,
            staged: staging.payloads.len(),
            groups: 0,
            attached: 0,
            descriptive_sections: 0,
            discarded: 0,
        };
        match kind {
            ObjectKind::Content => self.attach_content(ctx, object, &manifest, staging, &mut report)?,
            ObjectKind::Container => self.attach_logo(ctx, object, &manifest, staging)?,
        }
        self.profile.attach_license(ctx, object, staging.license)?;

        // 7
        reconcile(&manifest, &staging.present, self.profile.as_ref())?;

        // 8
        for sec in self
            .profile
            .select_descriptive(&manifest, &self.config.preferred_dmd)
        {
            let assertions = self.crosswalk(sec, &mut staging.spool)?;
            self.apply_to_object(ctx, object, assertions, &mut None)?;
            report.descriptive_sections += 1;
        }

        // 9
        self.profile.check_minimum_metadata(ctx, object)?;
        self.profile.final_fixup(ctx, object, &manifest)?;

        // 10
        ctx.store.install(&ctx.session, object)?;
        Ok(report)
    }

    /// Read the input, spooling every container entry. Returns the manifest bytes.
    fn stage<R: Read>(
        &self,
        ctx: &PackageContext,
        input: R,
        mode: ContainerMode,
        license: Option<&str>,
        staging: &mut Staging,
    ) -> PackageResult<Vec<u8>> {
        let _elevated = ctx.session.elevate();
        let manifest = match mode {
            ContainerMode::Full => {
                let contents = read_container(input, &self.limits, |entry, reader| {
                    staging.spool.insert(entry.path.clone(), reader)?;
                    Ok(())
                })?;
                staging
                    .present
                    .extend(contents.entries.into_iter().map(|e| e.path));
                contents.manifest
            }
            ContainerMode::ManifestOnly | ContainerMode::Internal => {
                let mut bytes = Vec::new();
                LimitReader::new(
                    EintrReader::new(input),
                    self.limits.max_manifest_bytes,
                    LIMIT_TAG_MANIFEST,
                )
                .read_to_end(&mut bytes)
                .map_err(|e| read_error(e).with_context(MANIFEST_PATH))?;
                bytes
            }
        };
        staging.present.insert(MANIFEST_PATH.to_string());

        if let Some(text) = license {
            staging.license = Some(ctx.store.create_payload(&ctx.session, &mut text.as_bytes())?);
        }
        Ok(manifest)
    }

    /// Run the crosswalk for one section over whatever form it travels in.
    fn crosswalk(&self, sec: &MdSec, spool: &mut EntrySpool) -> PackageResult<Vec<Assertion>> {
        let name = self.config.crosswalk_for(sec.md_type());
        let handle = self.registry.ingestion(name)?;
        let mime = sec.content.mime();
        let result = match &sec.content {
            MdContent::Wrap { data: Some(value), .. } => {
                handle.apply(name, SectionSource::Document(value), mime)
            }
            MdContent::Wrap {
                bin_data: Some(encoded),
                ..
            } => {
                let bytes = BASE64.decode(encoded).map_err(|e| {
                    PackageError::validation(
                        ErrorCode::ValidationMalformedManifest,
                        format!("section '{}' has invalid base64: {}", sec.id, e),
                    )
                })?;
                let mut reader = bytes.as_slice();
                handle.apply(name, SectionSource::Stream(&mut reader), mime)
            }
            MdContent::Wrap { .. } => Ok(Vec::new()),
            MdContent::Ref { loc, .. } => match spool.open(loc)? {
                Some(file) => handle.apply(name, SectionSource::Stream(file), mime),
                // Reported by reconciliation.
                None => Ok(Vec::new()),
            },
        };
        let assertions =
            result.map_err(|e| PackageError::from(e).with_context(format!("section '{}'", sec.id)))?;
        tracing::debug!(section = %sec.id, crosswalk = name, assertions = assertions.len(), "section crosswalked");
        Ok(assertions)
    }

    fn apply_to_object(
        &self,
        ctx: &PackageContext,
        object: ObjectId,
        assertions: Vec<Assertion>,
        policies: &mut Option<Vec<AccessPolicy>>,
    ) -> PackageResult<()> {
        let mut fields = Vec::new();
        for assertion in assertions {
            match assertion {
                Assertion::Field(field) => fields.push(field),
                Assertion::Policy(policy) => policies.get_or_insert_with(Vec::new).push(policy),
                Assertion::Identifier(_) | Assertion::Parent(_) => {}
                other => tracing::debug!(%object, ?other, "assertion does not apply to objects"),
            }
        }
        if !fields.is_empty() {
            ctx.store.add_metadata(&ctx.session, object, fields)?;
        }
        Ok(())
    }

    fn attach_content(
        &self,
        ctx: &PackageContext,
        object: ObjectId,
        manifest: &Manifest,
        staging: &mut Staging,
        report: &mut IngestReport,
    ) -> PackageResult<()> {
        let primary: HashSet<&str> = manifest.primary_file_ids().iter().map(String::as_str).collect();
        let mut claimed = HashSet::new();
        let mut by_file: HashMap<&str, PayloadId> = HashMap::new();

        for group in &manifest.file_sec.groups {
            // Declared groups are restored even when they hold no files.
            let target = ctx.store.create_group(&ctx.session, object, &group.use_)?;
            report.groups += 1;
            for file in &group.files {
                let Some((key, payload)) = self.profile.resolve_payload(file, &staging.payloads) else {
                    unclaimed_entry(file, staging)?;
                    continue;
                };
                if !claimed.insert(key.clone()) {
                    return Err(PackageError::validation(
                        ErrorCode::ValidationDuplicateEntry,
                        format!("'{}' is referenced by more than one file entry", key),
                    ));
                }
                check_integrity(ctx, payload, file)?;

                let changes = self.payload_changes(manifest, file, &mut staging.spool)?;
                if !changes.update.is_empty() {
                    ctx.store.update_payload(&ctx.session, payload, changes.update)?;
                }
                self.profile.finish_payload(ctx, payload, file)?;
                if let Some(policies) = changes.policies.filter(|p| !p.is_empty()) {
                    ctx.policy()
                        .replace_policies(PolicyTarget::Payload(payload), policies)?;
                }

                ctx.store.attach_payload(&ctx.session, target, payload)?;
                if primary.contains(file.id.as_str()) {
                    ctx.store.set_primary(&ctx.session, target, Some(payload))?;
                }
                by_file.insert(file.id.as_str(), payload);
                report.attached += 1;
            }
        }

        link_derived(ctx, manifest, &by_file)
    }

    /// Attribute updates and policies asserted by a file's admin sections.
    fn payload_changes(
        &self,
        manifest: &Manifest,
        file: &FileEntry,
        spool: &mut EntrySpool,
    ) -> PackageResult<PayloadChanges> {
        let mut changes = PayloadChanges {
            update: PayloadUpdate {
                sequence: file.seq,
                ..Default::default()
            },
            policies: None,
        };
        let Some(amd) = manifest.file_amd_sec(file) else {
            return Ok(changes);
        };
        for admin in AdminKind::ALL {
            for sec in amd.sections(admin) {
                if admin == AdminKind::Rights {
                    changes.policies.get_or_insert_with(Vec::new);
                }
                for assertion in self.crosswalk(sec, spool)? {
                    let update = &mut changes.update;
                    match assertion {
                        Assertion::Name(v) => update.name = Some(v),
                        Assertion::Source(v) => update.source = Some(v),
                        Assertion::Description(v) => update.description = Some(v),
                        Assertion::Format(v) => update.format = Some(v),
                        Assertion::Sequence(v) => update.sequence = Some(v),
                        Assertion::Policy(p) => changes.policies.get_or_insert_with(Vec::new).push(p),
                        other => tracing::debug!(file = %file.id, ?other, "assertion does not apply to payloads"),
                    }
                }
            }
        }
        Ok(changes)
    }

    /// A container holds no payload groups, only an optional representative image.
    fn attach_logo(
        &self,
        ctx: &PackageContext,
        object: ObjectId,
        manifest: &Manifest,
        staging: &mut Staging,
    ) -> PackageResult<()> {
        for group in &manifest.file_sec.groups {
            if group.use_ != LOGO_GROUP {
                tracing::warn!(%object, group = %group.use_, "container package declares a payload group; ignored");
                continue;
            }
            let Some(file) = group.files.first() else {
                continue;
            };
            let Some((_, payload)) = self.profile.resolve_payload(file, &staging.payloads) else {
                continue;
            };
            check_integrity(ctx, payload, file)?;
            self.profile.finish_payload(ctx, payload, file)?;
            ctx.store.set_logo(&ctx.session, object, Some(payload))?;
            staging.kept.insert(payload);
            tracing::debug!(%object, %payload, "representative image set");
        }
        Ok(())
    }
}

fn parse_manifest(bytes: &[u8], validate: bool) -> PackageResult<Manifest> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| PackageError::from(e).with_context(MANIFEST_PATH))?;
    if validate {
        validate_schema(&value)?;
    }
    serde_json::from_value(value).map_err(|e| PackageError::from(e).with_context(MANIFEST_PATH))
}

/// Turn every spooled entry that is not section metadata into an unattached payload.
fn stage_payloads(ctx: &PackageContext, manifest: &Manifest, staging: &mut Staging) -> PackageResult<()> {
    let entries = staging.spool.take_except(&metadata_paths(manifest))?;
    if entries.is_empty() {
        return Ok(());
    }
    let _elevated = ctx.session.elevate();
    for (path, mut file) in entries {
        let payload = ctx.store.create_payload(&ctx.session, &mut file)?;
        staging.payloads.insert(path, payload);
    }
    Ok(())
}

/// An unresolved file entry is fine only when its bytes were never supplied;
/// reconciliation reports those. Supplied bytes held as metadata cannot become the payload.
fn unclaimed_entry(file: &FileEntry, staging: &Staging) -> PackageResult<()> {
    if file.loc.loctype == LocType::Path && staging.present.contains(&normalize_path(&file.loc.href)) {
        return Err(PackageError::validation(
            ErrorCode::ValidationDuplicateEntry,
            format!(
                "'{}' is referenced both as file '{}' and as section metadata",
                normalize_path(&file.loc.href),
                file.id
            ),
        ));
    }
    tracing::debug!(file = %file.id, href = %file.loc.href, "file entry not supplied");
    Ok(())
}

fn object_sections(manifest: &Manifest, admin: AdminKind) -> impl Iterator<Item = &MdSec> {
    manifest
        .object_amd_secs()
        .flat_map(move |amd| amd.sections(admin))
}

/// Copy payloads named by absolute locator into new unattached payloads.
///
/// The caller must be able to read the source; only the copy is elevated.
fn stage_external(ctx: &PackageContext, manifest: &Manifest, staging: &mut Staging) -> PackageResult<()> {
    for (_, file) in manifest.files() {
        let href = &file.loc.href;
        if file.loc.loctype != LocType::Url || staging.payloads.get(href).is_some() {
            continue;
        }
        let Some(source) = ctx.store.find_payload_by_locator(href)? else {
            tracing::debug!(file = %file.id, %href, "locator does not resolve");
            continue;
        };
        if ctx.store.payload(source)?.group.is_some() {
            ctx.authorize(PolicyTarget::Payload(source), Action::Read)?;
        }
        let copy = {
            let _elevated = ctx.session.elevate();
            ctx.store.copy_payload(&ctx.session, source)?
        };
        staging.payloads.insert(href.clone(), copy);
        staging.present.insert(href.clone());
    }
    Ok(())
}

/// Parent from source metadata, then the parent link, then the caller's choice.
fn resolve_parent(
    ctx: &PackageContext,
    manifest: &Manifest,
    source: &[Assertion],
    intended_parent: Option<ObjectId>,
    params: &PackageParams,
) -> PackageResult<ObjectId> {
    if !params.ignore_parent {
        let asserted = source.iter().find_map(|a| match a {
            Assertion::Parent(p) => Some(p.as_str()),
            _ => None,
        });
        let linked = manifest.parent_handle().map(strip_scheme);
        for candidate in asserted.into_iter().chain(linked) {
            match ctx.identifiers.resolve(candidate) {
                Some(parent) => {
                    tracing::debug!(identifier = candidate, %parent, "parent declared by package");
                    return Ok(parent);
                }
                None => tracing::warn!(identifier = candidate, "declared parent does not resolve"),
            }
        }
    }
    intended_parent.ok_or_else(|| {
        PackageError::validation(
            ErrorCode::ValidationMissingParent,
            "no usable parent: none declared by the package and none supplied",
        )
    })
}

/// Identifier from source metadata, else the manifest's object id when it is a persistent one.
fn asserted_identifier(manifest: &Manifest, source: &[Assertion]) -> Option<String> {
    let from_source = source.iter().find_map(|a| match a {
        Assertion::Identifier(id) => Some(id.clone()),
        _ => None,
    });
    from_source.or_else(|| {
        manifest
            .obj_id
            .strip_prefix(IDENTIFIER_SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|id| !id.is_empty() && !id.starts_with("uuid:"))
            .map(str::to_string)
    })
}

fn check_integrity(ctx: &PackageContext, payload: PayloadId, file: &FileEntry) -> PackageResult<()> {
    if let Some(expected) = file.size {
        let actual = ctx.store.payload(payload)?.size;
        if actual != expected {
            return Err(PackageError::validation(
                ErrorCode::ValidationSizeMismatch,
                format!("file '{}': declared size {}, got {}", file.id, expected, actual),
            ));
        }
    }
    if let Some(expected) = &file.checksum {
        let actual = ctx.store.compute_checksum(payload, expected.algorithm)?;
        if !actual.matches(expected) {
            return Err(PackageError::validation(
                ErrorCode::ValidationChecksumMismatch,
                format!(
                    "file '{}': declared {} {}, got {}",
                    file.id,
                    expected.algorithm.name(),
                    expected.value,
                    actual.value
                ),
            ));
        }
    }
    Ok(())
}

/// Point derived files at the source file of their group.
fn link_derived(
    ctx: &PackageContext,
    manifest: &Manifest,
    by_file: &HashMap<&str, PayloadId>,
) -> PackageResult<()> {
    let sources: HashMap<String, PayloadId> = manifest
        .files()
        .filter_map(|(_, f)| by_file.get(f.id.as_str()).map(|p| (derived_group(&f.id), *p)))
        .collect();
    for (_, file) in manifest.files() {
        let Some(group) = file.group_id.as_deref() else {
            continue;
        };
        if group == derived_group(&file.id) {
            continue;
        }
        let (Some(&payload), Some(&source)) = (by_file.get(file.id.as_str()), sources.get(group)) else {
            continue;
        };
        ctx.store.update_payload(
            &ctx.session,
            payload,
            PayloadUpdate {
                derived_from: Some(source),
                ..Default::default()
            },
        )?;
    }
    Ok(())
}

fn roll_back(ctx: &PackageContext, provisional: &Provisional) {
    if let Some(object) = provisional.object {
        match ctx.store.delete_object(&ctx.session, object) {
            Ok(()) => tracing::warn!(%object, "provisional object deleted"),
            Err(e) => tracing::warn!(%object, error = %e, "failed to delete provisional object"),
        }
    }
    if let Some(identifier) = &provisional.identifier {
        if let Err(e) = ctx.identifiers.unregister(identifier) {
            tracing::warn!(%identifier, error = %e, "failed to unregister identifier");
        }
    }
}

/// Delete staged payloads nothing attached. Staged elevated, so deleted elevated.
fn discard_unattached(ctx: &PackageContext, staging: &Staging, succeeded: bool) -> usize {
    let _elevated = ctx.session.elevate();
    let mut discarded = 0;
    for payload in staging.all_payloads() {
        if succeeded && staging.kept.contains(&payload) {
            continue;
        }
        match ctx.store.payload(payload) {
            Ok(p) if p.group.is_some() => {}
            Ok(_) => match ctx.store.delete_payload(&ctx.session, payload) {
                Ok(()) => discarded += 1,
                Err(e) => tracing::warn!(%payload, error = %e, "failed to delete staged payload"),
            },
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(%payload, error = %e, "failed to look up staged payload"),
        }
    }
    if discarded > 0 {
        tracing::debug!(discarded, "unattached staged payloads deleted");
    }
    discarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disseminate::Disseminator;
    use crate::model::{EntityStore, IdentifierResolver, InMemoryRepository, MetadataField, Principal};

    struct World {
        repo: Arc<InMemoryRepository>,
        root: ObjectId,
        item: ObjectId,
    }

    fn world() -> World {
        let repo = Arc::new(InMemoryRepository::new());
        let root = repo.insert_object(ObjectKind::Container, None, Some("123456789/1"));
        let item = repo.insert_object(ObjectKind::Content, Some(root), Some("123456789/2"));
        repo.insert_metadata(item, [MetadataField::dc("title", None, "Field notes")]);
        let original = repo.insert_group(item, "ORIGINAL");
        let a = repo.insert_payload(original, "notes.txt", Some("text/plain"), b"first page");
        repo.insert_payload(original, "scan.pdf", Some("application/pdf"), b"%PDF-1.4 scan");
        repo.set_primary_direct(original, a);
        World { repo, root, item }
    }

    fn admin(repo: &Arc<InMemoryRepository>) -> PackageContext {
        PackageContext::new(repo.clone(), repo.clone(), repo.clone(), Principal::admin("admin"))
    }

    fn package(w: &World, params: &PackageParams) -> Vec<u8> {
        let mut out = Vec::new();
        Disseminator::new(Arc::new(CrosswalkRegistry::with_builtin()), &PackagerConfig::default())
            .disseminate(&admin(&w.repo), w.item, params, &mut out)
            .unwrap();
        out
    }

    fn ingester() -> Ingester {
        Ingester::new(Arc::new(CrosswalkRegistry::with_builtin()), &PackagerConfig::default())
    }

    #[test]
    fn asserted_identifier_skips_uuid_object_ids() {
        let m = Manifest::new(crate::manifest::PROFILE_AIP, "urn:uuid:0000", "pkg", "CONTENT");
        assert_eq!(asserted_identifier(&m, &[]), None);
        let m = Manifest::new(crate::manifest::PROFILE_AIP, "urn:example/42", "pkg", "CONTENT");
        assert_eq!(asserted_identifier(&m, &[]).as_deref(), Some("example/42"));
        let source = [Assertion::Identifier("other/1".to_string())];
        assert_eq!(asserted_identifier(&m, &source).as_deref(), Some("other/1"));
    }

    #[test]
    fn restores_into_fresh_repository_under_declared_parent() {
        let w = world();
        let bytes = package(&w, &PackageParams::new());

        // Fresh store holding only the declared parent.
        let target = Arc::new(InMemoryRepository::new());
        let parent = target.insert_object(ObjectKind::Container, None, Some("123456789/1"));
        let report = ingester()
            .ingest_with_report(&admin(&target), bytes.as_slice(), None, &PackageParams::new(), None)
            .unwrap();

        assert_eq!(report.parent, parent);
        assert_eq!(report.identifier, "123456789/2");
        assert_eq!((report.groups, report.attached, report.discarded), (1, 2, 0));
        let object = target.object(report.object).unwrap();
        assert!(object.installed);
        assert_eq!(object.name(), Some("Field notes"));
        assert_eq!(target.unattached_payload_count(), 0);
    }

    #[test]
    fn identifier_conflict_rolls_back_everything() {
        let w = world();
        let bytes = package(&w, &PackageParams::new());
        let before = w.repo.payload_count();
        let err = ingester()
            .ingest(&admin(&w.repo), bytes.as_slice(), Some(w.root), &PackageParams::new(), None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationIdentifierConflict);
        assert_eq!(w.repo.payload_count(), before);
        assert_eq!(w.repo.unattached_payload_count(), 0);
    }

    #[test]
    fn ignore_handle_mints_a_new_identifier() {
        let w = world();
        let bytes = package(&w, &PackageParams::new());
        let report = ingester()
            .ingest_with_report(
                &admin(&w.repo),
                bytes.as_slice(),
                Some(w.root),
                &PackageParams::new().ignore_handle(),
                None,
            )
            .unwrap();
        assert_ne!(report.identifier, "123456789/2");
        assert_eq!(w.repo.resolve(&report.identifier), Some(report.object));
    }

    #[test]
    fn missing_parent_fails_without_leftovers() {
        let w = world();
        let bytes = package(&w, &PackageParams::new());
        let target = Arc::new(InMemoryRepository::new());
        let err = ingester()
            .ingest(&admin(&target), bytes.as_slice(), None, &PackageParams::new(), None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationMissingParent);
        assert_eq!(target.payload_count(), 0);
        assert_eq!(target.object_count(), 0);
    }
}
