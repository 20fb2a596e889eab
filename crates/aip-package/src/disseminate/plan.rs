//! Manifest planning.
//!
//! The plan is the single place that decides which payloads appear: the
//! manifest's file entries and the container entries are both built from the
//! same [`Inclusion`] decision, so `skip` and `zero` can never disagree
//! between the two.

use super::DisseminationReport;
use crate::config::DisseminationConfig;
use crate::container::{metadata_path, payload_path};
use crate::crosswalk::{spawn_streamed, CrosswalkRegistry, CrosswalkSubject, DisseminationHandle, StreamedSection};
use crate::error::{PackageError, PackageResult};
use crate::manifest::{
    AdminKind, AmdSec, Div, FileEntry, FileGroup, Header, IdAllocator, Locator, Manifest, MdContent,
    MdSec, CONTAINER_DIV_TYPE, CONTENT_DIV_TYPE, LOGO_GROUP, PARENT_LINK_TYPE,
};
use crate::model::identifier::to_urn;
use crate::model::{
    Action, ArchivalObject, ChecksumAlgorithm, ObjectId, ObjectKind, PackageContext, PayloadGroup,
    PayloadId, PolicyTarget,
};
use crate::params::{ContainerMode, UnauthorizedPolicy};
use base64::Engine;
use std::collections::{HashMap, HashSet};

const JSON_MIME: &str = "application/json";

/// Where the bytes of one container entry come from.
pub(crate) enum EntrySource {
    Payload { id: PayloadId, size: u64 },
    /// Placeholder for an unreadable payload under `unauthorized = zero`.
    Zero,
    /// Index into [`DisseminationPlan::streamed`].
    Streamed(usize),
}

pub(crate) struct PlannedEntry {
    pub path: String,
    pub source: EntrySource,
}

pub(crate) struct DisseminationPlan {
    pub manifest: Manifest,
    /// Container entries after the manifest, in manifest order. Empty for bare modes.
    pub entries: Vec<PlannedEntry>,
    /// Streamed sections still to be drained (full containers only).
    pub streamed: Vec<Option<StreamedSection>>,
    pub report: DisseminationReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inclusion {
    Full,
    Zero,
    Skip,
}

pub(crate) struct Planner<'a> {
    pub ctx: &'a PackageContext,
    pub registry: &'a CrosswalkRegistry,
    pub config: &'a DisseminationConfig,
    pub profile_name: &'static str,
    pub header_note: Option<&'a str>,
    pub mode: ContainerMode,
    pub unauthorized: Option<UnauthorizedPolicy>,
    pub pipe_capacity: usize,
}

impl Planner<'_> {
    pub fn plan(&self, object: ObjectId) -> PackageResult<DisseminationPlan> {
        let ctx = self.ctx;
        ctx.authorize(PolicyTarget::Object(object), Action::Read)?;
        let obj = ctx.store.object(object)?;
        let identifier = ctx
            .identifiers
            .identifier_of(object)
            .or_else(|| obj.identifier.clone());
        let parent_identifier = obj.parent.and_then(|p| ctx.identifiers.identifier_of(p));

        let obj_id = match &identifier {
            Some(id) => to_urn(id),
            None => to_urn(&format!("uuid:{}", object)),
        };
        let mut manifest = Manifest::new(
            self.profile_name,
            obj_id,
            format!("pkg_{}", object.0.simple()),
            obj.kind.tag(),
        );
        manifest.label = obj.name().map(String::from);
        manifest.header = Some(Header {
            created_at: Some(chrono::Utc::now()),
            note: self.header_note.map(String::from),
            producer: Some(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
        });
        manifest.struct_map.root = Div::of_type(match obj.kind {
            ObjectKind::Content => CONTENT_DIV_TYPE,
            ObjectKind::Container => CONTAINER_DIV_TYPE,
        });
        manifest.struct_map.root.label = manifest.label.clone();

        let mut state = PlanState {
            manifest,
            entries: Vec::new(),
            streamed: Vec::new(),
            report: DisseminationReport {
                mode: self.mode,
                ..Default::default()
            },
            ids: IdAllocator::new(),
        };

        let subject = CrosswalkSubject::Object {
            object: obj.clone(),
            identifier,
            parent_identifier: parent_identifier.clone(),
            policies: ctx.policy().policies(PolicyTarget::Object(object)),
        };

        // Descriptive sections are alternatives of one record.
        let dmd_group = state.ids.next("dmdgrp");
        for name in &self.config.dmd {
            if let Some(sec) = self.section(&mut state, name, &subject, Some(dmd_group.as_str()), "dmd")? {
                state.manifest.struct_map.root.dmd_ids.push(sec.id.clone());
                state.manifest.dmd_secs.push(sec);
            }
        }

        if let Some(amd_id) = self.admin_sections(&mut state, &subject)? {
            state.manifest.struct_map.root.adm_ids.push(amd_id);
        }

        match obj.kind {
            ObjectKind::Content => self.plan_content(&mut state, &obj)?,
            ObjectKind::Container => self.plan_container(&mut state, &obj)?,
        }

        if let Some(parent) = parent_identifier {
            let mut link = Div::of_type(PARENT_LINK_TYPE);
            link.mptrs.push(Locator::handle(to_urn(&parent)));
            state.manifest.struct_map.root.divs.push(link);
        }

        Ok(DisseminationPlan {
            manifest: state.manifest,
            entries: state.entries,
            streamed: state.streamed,
            report: state.report,
        })
    }

    /// One admin section per configured kind; `None` if nothing applied.
    fn admin_sections(&self, state: &mut PlanState, subject: &CrosswalkSubject) -> PackageResult<Option<String>> {
        let mut amd = AmdSec::new(state.ids.next("amd"));
        for kind in AdminKind::ALL {
            for name in self.config.admin(kind) {
                if let Some(sec) = self.section(state, name, subject, None, kind.label())? {
                    amd.sections_mut(kind).push(sec);
                }
            }
        }
        if amd.is_empty() {
            return Ok(None);
        }
        let id = amd.id.clone();
        state.manifest.amd_secs.push(amd);
        Ok(Some(id))
    }

    /// Run one crosswalk. A crosswalk that declines the subject yields no section.
    fn section(
        &self,
        state: &mut PlanState,
        name: &str,
        subject: &CrosswalkSubject,
        group_id: Option<&str>,
        prefix: &'static str,
    ) -> PackageResult<Option<MdSec>> {
        let content = match self.registry.dissemination(name)? {
            DisseminationHandle::Document(xwalk) => {
                if !xwalk.can_disseminate(subject) {
                    tracing::debug!(crosswalk = %name, "crosswalk declined subject");
                    return Ok(None);
                }
                MdContent::Wrap {
                    md_type: name.to_string(),
                    mime: Some(JSON_MIME.to_string()),
                    data: Some(xwalk.disseminate(subject)?),
                    bin_data: None,
                }
            }
            DisseminationHandle::Streaming(xwalk) => {
                if !xwalk.can_disseminate(subject) {
                    tracing::debug!(crosswalk = %name, "streaming crosswalk declined subject");
                    return Ok(None);
                }
                let section = spawn_streamed(name, xwalk, subject.clone(), self.pipe_capacity)?;
                state.report.streamed_sections += 1;
                let mime = section.mime().to_string();
                match self.mode {
                    ContainerMode::Full => {
                        let id = state.ids.next(prefix);
                        let path = metadata_path(&id, extension_for(&mime));
                        state.entries.push(PlannedEntry {
                            path: path.clone(),
                            source: EntrySource::Streamed(state.streamed.len()),
                        });
                        state.streamed.push(Some(section));
                        state.report.metadata_sections += 1;
                        return Ok(Some(MdSec {
                            id,
                            group_id: group_id.map(String::from),
                            content: MdContent::Ref {
                                md_type: name.to_string(),
                                mime: Some(mime),
                                loc: Locator::path(path),
                            },
                        }));
                    }
                    ContainerMode::ManifestOnly | ContainerMode::Internal => {
                        let mut bytes = Vec::new();
                        section.drain_into(&mut bytes)?;
                        MdContent::Wrap {
                            md_type: name.to_string(),
                            mime: Some(mime),
                            data: None,
                            bin_data: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
                        }
                    }
                }
            }
        };
        state.report.metadata_sections += 1;
        Ok(Some(MdSec {
            id: state.ids.next(prefix),
            group_id: group_id.map(String::from),
            content,
        }))
    }

    /// Read decision for one payload, applying the `unauthorized` option.
    fn inclusion(&self, group: &PayloadGroup, group_readable: bool, payload: PayloadId) -> PackageResult<Inclusion> {
        let session = &self.ctx.session;
        if group_readable && session.is_authorized(PolicyTarget::Payload(payload), Action::Read) {
            return Ok(Inclusion::Full);
        }
        match self.unauthorized {
            None => Err(PackageError::unauthorized(format!(
                "{} may not read payload {} in group {}",
                session.principal().name,
                payload,
                group.name
            ))),
            Some(UnauthorizedPolicy::Skip) => {
                tracing::warn!(%payload, group = %group.name, "unreadable payload skipped");
                Ok(Inclusion::Skip)
            }
            Some(UnauthorizedPolicy::Zero) => {
                tracing::warn!(%payload, group = %group.name, "unreadable payload zeroed");
                Ok(Inclusion::Zero)
            }
        }
    }

    /// Read decision for a group the caller may not read, met before any of its payloads.
    fn group_inclusion(&self, group: &PayloadGroup) -> PackageResult<Inclusion> {
        match self.unauthorized {
            None => Err(PackageError::unauthorized(format!(
                "{} may not read group {}",
                self.ctx.session.principal().name,
                group.name
            ))),
            Some(UnauthorizedPolicy::Skip) => {
                tracing::warn!(group = %group.name, payloads = group.payloads.len(), "unreadable group skipped");
                Ok(Inclusion::Skip)
            }
            Some(UnauthorizedPolicy::Zero) => {
                tracing::warn!(group = %group.name, payloads = group.payloads.len(), "unreadable group zeroed");
                Ok(Inclusion::Zero)
            }
        }
    }

    fn plan_content(&self, state: &mut PlanState, obj: &ArchivalObject) -> PackageResult<()> {
        let store = &self.ctx.store;
        let mut groups = Vec::with_capacity(obj.groups.len());
        for gid in &obj.groups {
            groups.push(store.group(*gid)?);
        }

        // Decide every payload first: derived-file links need the source's file id.
        let mut decided: Vec<(usize, PayloadId, Inclusion)> = Vec::new();
        let mut file_ids: HashMap<PayloadId, String> = HashMap::new();
        let mut skipped_groups: HashSet<usize> = HashSet::new();
        for (gi, group) in groups.iter().enumerate() {
            let readable = self
                .ctx
                .session
                .is_authorized(PolicyTarget::Group(group.id), Action::Read);
            if !readable && self.group_inclusion(group)? == Inclusion::Skip {
                state.report.skipped += group.payloads.len();
                skipped_groups.insert(gi);
                continue;
            }
            for pid in &group.payloads {
                let inclusion = self.inclusion(group, readable, *pid)?;
                if inclusion == Inclusion::Skip {
                    state.report.skipped += 1;
                    continue;
                }
                file_ids.insert(*pid, state.ids.next("file"));
                decided.push((gi, *pid, inclusion));
            }
        }
        let sources: HashSet<PayloadId> = decided
            .iter()
            .filter_map(|(_, pid, _)| store.payload(*pid).ok()?.derived_from)
            .collect();

        let mut file_groups: Vec<FileGroup> = groups
            .iter()
            .map(|g| FileGroup {
                use_: g.name.clone(),
                files: Vec::new(),
            })
            .collect();
        for (gi, pid, inclusion) in decided {
            let group = &groups[gi];
            let payload = store.payload(pid)?;
            let file_id = file_ids[&pid].clone();
            let zero = inclusion == Inclusion::Zero;

            let group_id = match payload.derived_from {
                Some(source) => file_ids.get(&source).map(|s| derived_group(s)),
                None if sources.contains(&pid) => Some(derived_group(&file_id)),
                None => None,
            };

            let subject = CrosswalkSubject::Payload {
                payload: payload.clone(),
                group: group.name.clone(),
                policies: self.ctx.policy().policies(PolicyTarget::Payload(pid)),
            };
            let adm_id = self.admin_sections(state, &subject)?;

            let checksum = if zero {
                None
            } else {
                match payload.checksum.clone() {
                    Some(c) => Some(c),
                    None => Some(store.compute_checksum(pid, ChecksumAlgorithm::Md5)?),
                }
            };
            let loc = self.payload_locator(state, &file_id, payload.name.as_deref(), pid, payload.size, zero);
            if group.primary == Some(pid) {
                state.manifest.struct_map.root.fptrs.push(file_id.clone());
            }
            if zero {
                state.report.zeroed += 1;
            }
            state.report.files += 1;
            file_groups[gi].files.push(FileEntry {
                id: file_id,
                seq: payload.sequence,
                size: Some(if zero { 0 } else { payload.size }),
                checksum,
                mime: payload.format.clone(),
                group_id,
                adm_id,
                loc,
            });
        }

        // Under `skip`, denied groups and groups emptied by denied payloads vanish.
        let mut kept = Vec::new();
        for (gi, (group, file_group)) in groups.iter().zip(file_groups).enumerate() {
            let emptied = !group.payloads.is_empty() && file_group.files.is_empty();
            if skipped_groups.contains(&gi) || (emptied && self.unauthorized == Some(UnauthorizedPolicy::Skip)) {
                continue;
            }
            kept.push(file_group);
        }
        state.manifest.file_sec.groups = kept;
        Ok(())
    }

    /// Location of a payload's bytes for the current mode; records the container entry.
    fn payload_locator(
        &self,
        state: &mut PlanState,
        file_id: &str,
        name: Option<&str>,
        payload: PayloadId,
        size: u64,
        zero: bool,
    ) -> Locator {
        match self.mode {
            ContainerMode::Full => {
                let path = payload_path(file_id, name);
                state.entries.push(PlannedEntry {
                    path: path.clone(),
                    source: if zero {
                        EntrySource::Zero
                    } else {
                        EntrySource::Payload { id: payload, size }
                    },
                });
                Locator::path(path)
            }
            ContainerMode::ManifestOnly => Locator::path(payload_path(file_id, name)),
            ContainerMode::Internal => Locator::url(self.ctx.store.payload_locator(payload)),
        }
    }

    fn plan_container(&self, state: &mut PlanState, obj: &ArchivalObject) -> PackageResult<()> {
        let ctx = self.ctx;
        for child in &obj.children {
            let Some(handle) = ctx.identifiers.identifier_of(*child) else {
                tracing::debug!(%child, "child without persistent identifier not linked");
                continue;
            };
            let child_obj = ctx.store.object(*child)?;
            let mut div = Div::of_type(match child_obj.kind {
                ObjectKind::Content => CONTENT_DIV_TYPE,
                ObjectKind::Container => CONTAINER_DIV_TYPE,
            });
            div.label = child_obj.name().map(String::from);
            div.mptrs.push(Locator::handle(to_urn(&handle)));
            state.manifest.struct_map.root.divs.push(div);
        }

        // Representative image is not policy-gated.
        if let Some(logo) = obj.logo {
            let payload = ctx.store.payload(logo)?;
            let file_id = state.ids.next("file");
            let checksum = match payload.checksum.clone() {
                Some(c) => c,
                None => ctx.store.compute_checksum(logo, ChecksumAlgorithm::Md5)?,
            };
            let loc = self.payload_locator(state, &file_id, payload.name.as_deref(), logo, payload.size, false);
            state.manifest.struct_map.root.fptrs.push(file_id.clone());
            state.report.files += 1;
            state.manifest.file_sec.groups.push(FileGroup {
                use_: LOGO_GROUP.to_string(),
                files: vec![FileEntry {
                    id: file_id,
                    seq: None,
                    size: Some(payload.size),
                    checksum: Some(checksum),
                    mime: payload.format,
                    group_id: None,
                    adm_id: None,
                    loc,
                }],
            });
        }
        Ok(())
    }
}

struct PlanState {
    manifest: Manifest,
    entries: Vec<PlannedEntry>,
    streamed: Vec<Option<StreamedSection>>,
    report: DisseminationReport,
    ids: IdAllocator,
}

/// Group id shared by a source file and the files derived from it.
pub(crate) fn derived_group(source_file_id: &str) -> String {
    format!("group_{}", source_file_id)
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "application/json" => "json",
        "application/x-ndjson" => "ndjson",
        "text/xml" | "application/xml" => "xml",
        "text/plain" => "txt",
        _ => "bin",
    }
}
