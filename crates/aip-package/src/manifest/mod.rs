//! Structural document model (`manifest.json`).
//!
//! Pure data plus accessors. The root field order is the wire order, so the
//! probe can decide on `profile` and `obj_id` after a handful of tokens.

mod ids;
mod validate;

pub use ids::IdAllocator;
pub use validate::{check_structure, validate_schema};

use crate::model::Checksum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Archival package profile.
pub const PROFILE_AIP: &str = "AIP-1.0";
/// Submission package profile.
pub const PROFILE_SIP: &str = "SIP-1.0";

/// Div type of the structure-map link to the parent object.
pub const PARENT_LINK_TYPE: &str = "AIP Parent Link";
/// Div type of the root div of a content object.
pub const CONTENT_DIV_TYPE: &str = "CONTENT";
/// Div type of the root div of a container object.
pub const CONTAINER_DIV_TYPE: &str = "CONTAINER";

/// Group name used for a container's representative image.
pub const LOGO_GROUP: &str = "LOGO";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub profile: String,
    /// `urn:<identifier>` when the object has a persistent identifier.
    pub obj_id: String,
    /// Unique in-document identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    #[serde(default)]
    pub dmd_secs: Vec<MdSec>,
    #[serde(default)]
    pub amd_secs: Vec<AmdSec>,
    #[serde(default)]
    pub file_sec: FileSec,
    pub struct_map: StructMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

/// One metadata section: a descriptive section or one admin sub-section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdSec {
    pub id: String,
    /// Sections sharing a group id are alternative renderings of one record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub content: MdContent,
}

impl MdSec {
    pub fn md_type(&self) -> &str {
        self.content.md_type()
    }
}

/// Inline (`wrap`) or referenced (`ref`) metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MdContent {
    Wrap {
        md_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
        /// Structured metadata produced by a whole-document crosswalk.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Base64 bytes of a streamed section embedded inline.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bin_data: Option<String>,
    },
    Ref {
        md_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
        loc: Locator,
    },
}

impl MdContent {
    pub fn md_type(&self) -> &str {
        match self {
            Self::Wrap { md_type, .. } | Self::Ref { md_type, .. } => md_type,
        }
    }

    pub fn mime(&self) -> Option<&str> {
        match self {
            Self::Wrap { mime, .. } | Self::Ref { mime, .. } => mime.as_deref(),
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Self::Ref { loc, .. } => Some(loc),
            Self::Wrap { .. } => None,
        }
    }
}

/// Administrative metadata kinds, in ingest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminKind {
    Source,
    Tech,
    Rights,
    Digiprov,
}

impl AdminKind {
    pub const ALL: [AdminKind; 4] = [Self::Source, Self::Tech, Self::Rights, Self::Digiprov];

    pub fn label(self) -> &'static str {
        match self {
            Self::Source => "sourceMD",
            Self::Tech => "techMD",
            Self::Rights => "rightsMD",
            Self::Digiprov => "digiprovMD",
        }
    }
}

/// Administrative metadata block attached to the object or one file entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmdSec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tech_md: Vec<MdSec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rights_md: Vec<MdSec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_md: Vec<MdSec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digiprov_md: Vec<MdSec>,
}

impl AmdSec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn sections(&self, kind: AdminKind) -> &[MdSec] {
        match kind {
            AdminKind::Source => &self.source_md,
            AdminKind::Tech => &self.tech_md,
            AdminKind::Rights => &self.rights_md,
            AdminKind::Digiprov => &self.digiprov_md,
        }
    }

    pub fn sections_mut(&mut self, kind: AdminKind) -> &mut Vec<MdSec> {
        match kind {
            AdminKind::Source => &mut self.source_md,
            AdminKind::Tech => &mut self.tech_md,
            AdminKind::Rights => &mut self.rights_md,
            AdminKind::Digiprov => &mut self.digiprov_md,
        }
    }

    pub fn is_empty(&self) -> bool {
        AdminKind::ALL.iter().all(|k| self.sections(*k).is_empty())
    }

    pub fn all_sections(&self) -> impl Iterator<Item = &MdSec> {
        AdminKind::ALL.into_iter().flat_map(move |k| self.sections(k))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSec {
    #[serde(default)]
    pub groups: Vec<FileGroup>,
}

/// Files belonging to one payload group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileGroup {
    #[serde(rename = "use")]
    pub use_: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Shared by a source file and the files derived from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adm_id: Option<String>,
    pub loc: Locator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocType {
    /// Relative path inside the container.
    Path,
    /// Absolute external locator.
    Url,
    /// Persistent identifier.
    Handle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub loctype: LocType,
    pub href: String,
}

impl Locator {
    pub fn path(href: impl Into<String>) -> Self {
        Self {
            loctype: LocType::Path,
            href: href.into(),
        }
    }

    pub fn url(href: impl Into<String>) -> Self {
        Self {
            loctype: LocType::Url,
            href: href.into(),
        }
    }

    pub fn handle(href: impl Into<String>) -> Self {
        Self {
            loctype: LocType::Handle,
            href: href.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Div {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dmd_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adm_ids: Vec<String>,
    /// File ids; on the root div these mark each group's primary entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fptrs: Vec<String>,
    /// Pointers to other objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mptrs: Vec<Locator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divs: Vec<Div>,
}

impl Div {
    pub fn of_type(type_: &str) -> Self {
        Self {
            type_: Some(type_.to_string()),
            ..Default::default()
        }
    }

    /// Depth-first iterator over this div and its descendants.
    pub fn walk(&self) -> Vec<&Div> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let div = out[i];
            out.extend(div.divs.iter());
            i += 1;
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructMap {
    pub root: Div,
}

impl Manifest {
    pub fn new(profile: &str, obj_id: impl Into<String>, id: impl Into<String>, type_: &str) -> Self {
        Self {
            profile: profile.to_string(),
            obj_id: obj_id.into(),
            id: id.into(),
            type_: type_.to_string(),
            label: None,
            header: None,
            dmd_secs: Vec::new(),
            amd_secs: Vec::new(),
            file_sec: FileSec::default(),
            struct_map: StructMap::default(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn files(&self) -> impl Iterator<Item = (&FileGroup, &FileEntry)> {
        self.file_sec
            .groups
            .iter()
            .flat_map(|g| g.files.iter().map(move |f| (g, f)))
    }

    pub fn file(&self, id: &str) -> Option<&FileEntry> {
        self.files().map(|(_, f)| f).find(|f| f.id == id)
    }

    pub fn amd_sec(&self, id: &str) -> Option<&AmdSec> {
        self.amd_secs.iter().find(|a| a.id == id)
    }

    /// Admin sections attached to the object as a whole (via the root div).
    pub fn object_amd_secs(&self) -> impl Iterator<Item = &AmdSec> {
        self.struct_map
            .root
            .adm_ids
            .iter()
            .filter_map(|id| self.amd_sec(id))
    }

    pub fn file_amd_sec(&self, file: &FileEntry) -> Option<&AmdSec> {
        file.adm_id.as_deref().and_then(|id| self.amd_sec(id))
    }

    /// Every metadata section that references an external file.
    pub fn md_refs(&self) -> impl Iterator<Item = &MdSec> {
        self.dmd_secs
            .iter()
            .chain(self.amd_secs.iter().flat_map(AmdSec::all_sections))
            .filter(|s| s.content.locator().is_some())
    }

    /// The parent-link div, if present.
    pub fn parent_link(&self) -> Option<&Div> {
        self.struct_map
            .root
            .walk()
            .into_iter()
            .find(|d| d.type_.as_deref() == Some(PARENT_LINK_TYPE))
    }

    /// Persistent identifier (with scheme) of the parent, from the parent-link div.
    pub fn parent_handle(&self) -> Option<&str> {
        self.parent_link()?
            .mptrs
            .iter()
            .find(|m| m.loctype == LocType::Handle)
            .map(|m| m.href.as_str())
    }

    /// Primary file ids declared on the root div.
    pub fn primary_file_ids(&self) -> &[String] {
        &self.struct_map.root.fptrs
    }

    /// Descendant object pointers of a container.
    pub fn child_pointers(&self) -> impl Iterator<Item = &Locator> {
        self.struct_map
            .root
            .divs
            .iter()
            .filter(|d| d.type_.as_deref() != Some(PARENT_LINK_TYPE))
            .flat_map(|d| d.mptrs.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        let mut m = Manifest::new(PROFILE_AIP, "urn:example/42", "m-1", "CONTENT");
        m.header = Some(Header {
            created_at: None,
            note: Some("test".into()),
            producer: None,
        });
        let mut amd = AmdSec::new("amd-1");
        amd.source_md.push(MdSec {
            id: "src-1".into(),
            group_id: None,
            content: MdContent::Ref {
                md_type: "RIGHTS".into(),
                mime: Some("application/x-ndjson".into()),
                loc: Locator::path("metadata/rights-1.ndjson"),
            },
        });
        m.amd_secs.push(amd);
        m.file_sec.groups.push(FileGroup {
            use_: "ORIGINAL".into(),
            files: vec![FileEntry {
                id: "file-1".into(),
                seq: Some(1),
                size: Some(3),
                checksum: None,
                mime: Some("text/plain".into()),
                group_id: Some("gid-1".into()),
                adm_id: None,
                loc: Locator::path("payloads/file-1"),
            }],
        });
        let mut root = Div::of_type(CONTENT_DIV_TYPE);
        root.adm_ids.push("amd-1".into());
        root.fptrs.push("file-1".into());
        let mut link = Div::of_type(PARENT_LINK_TYPE);
        link.mptrs.push(Locator::handle("urn:example/1"));
        root.divs.push(link);
        m.struct_map.root = root;
        m
    }

    #[test]
    fn root_keys_serialize_in_wire_order() {
        let json = String::from_utf8(sample().to_vec_pretty().unwrap()).unwrap();
        let profile = json.find("\"profile\"").unwrap();
        let obj_id = json.find("\"obj_id\"").unwrap();
        let header = json.find("\"header\"").unwrap();
        let struct_map = json.find("\"struct_map\"").unwrap();
        assert!(profile < obj_id && obj_id < header && header < struct_map);
    }

    #[test]
    fn accessors_find_links_and_refs() {
        let m = sample();
        assert_eq!(m.parent_handle(), Some("urn:example/1"));
        assert_eq!(m.md_refs().count(), 1);
        assert_eq!(m.object_amd_secs().count(), 1);
        assert_eq!(m.file("file-1").map(|f| f.size), Some(Some(3)));
        assert_eq!(m.child_pointers().count(), 0);
    }

    #[test]
    fn md_content_is_tagged() {
        let sec = MdSec {
            id: "d".into(),
            group_id: None,
            content: MdContent::Wrap {
                md_type: "QDC".into(),
                mime: None,
                data: Some(serde_json::json!([])),
                bin_data: None,
            },
        };
        let v = serde_json::to_value(&sec).unwrap();
        assert_eq!(v["content"]["kind"], "wrap");
        assert_eq!(v["content"]["md_type"], "QDC");
    }
}
