//! Entity-model collaborator contract.
//!
//! The packager never owns persistence. It reads and mutates archival objects,
//! payload groups and payloads through [`EntityStore`], checks permissions
//! through [`PolicyEngine`] and maps persistent identifiers through
//! [`IdentifierResolver`]. [`InMemoryRepository`] is a reference
//! implementation of all three.

pub mod context;
pub mod identifier;
pub mod memory;
pub mod policy;
pub mod store;

pub use context::PackageContext;
pub use identifier::IdentifierResolver;
pub use memory::InMemoryRepository;
pub use policy::{AccessPolicy, Action, AuthElevation, AuthSession, PolicyEngine, PolicyTarget, Principal};
pub use store::{EntityStore, PayloadUpdate, StoreError, StoreResult};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(ObjectId, "Identifier of an archival object.");
entity_id!(GroupId, "Identifier of a payload group.");
entity_id!(PayloadId, "Identifier of a payload.");

/// Archival object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    /// Aggregate whose content is other archival objects.
    Container,
    /// Leaf whose content is organized into payload groups.
    Content,
}

impl ObjectKind {
    /// Object-type tag written to the manifest root.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Container => "CONTAINER",
            Self::Content => "CONTENT",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CONTAINER" => Some(Self::Container),
            "CONTENT" => Some(Self::Content),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One metadata statement (`schema.element.qualifier[lang] = value`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub schema: String,
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub value: String,
}

impl MetadataField {
    pub fn new(
        schema: impl Into<String>,
        element: impl Into<String>,
        qualifier: Option<&str>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            element: element.into(),
            qualifier: qualifier.map(String::from),
            language: None,
            value: value.into(),
        }
    }

    pub fn dc(element: &str, qualifier: Option<&str>, value: impl Into<String>) -> Self {
        Self::new("dc", element, qualifier, value)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// `schema.element` or `schema.element.qualifier`.
    pub fn key(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}.{}", self.schema, self.element, q),
            None => format!("{}.{}", self.schema, self.element),
        }
    }

    pub fn matches(&self, schema: &str, element: &str, qualifier: Option<&str>) -> bool {
        self.schema == schema && self.element == element && self.qualifier.as_deref() == qualifier
    }
}

/// Checksum algorithm for payload digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// A hex digest with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub value: String,
}

impl Checksum {
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        let value = match algorithm {
            ChecksumAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        };
        Self { algorithm, value }
    }

    /// Case-insensitive digest comparison under the same algorithm.
    pub fn matches(&self, other: &Checksum) -> bool {
        self.algorithm == other.algorithm && self.value.eq_ignore_ascii_case(&other.value)
    }
}

/// Snapshot of an archival object as held by the entity store.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivalObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// Persistent identifier (without scheme), once registered.
    pub identifier: Option<String>,
    pub parent: Option<ObjectId>,
    pub metadata: Vec<MetadataField>,
    /// Payload groups, in creation order. Always empty for containers.
    pub groups: Vec<GroupId>,
    /// Child objects. Always empty for content objects.
    pub children: Vec<ObjectId>,
    /// Representative image of a container.
    pub logo: Option<PayloadId>,
    /// False while the object is still provisional.
    pub installed: bool,
}

impl ArchivalObject {
    pub fn first_value(&self, schema: &str, element: &str, qualifier: Option<&str>) -> Option<&str> {
        self.metadata
            .iter()
            .find(|f| f.matches(schema, element, qualifier))
            .map(|f| f.value.as_str())
    }

    /// Display name: `dc.title`, falling back to the identifier.
    pub fn name(&self) -> Option<&str> {
        self.first_value("dc", "title", None)
            .or(self.identifier.as_deref())
    }
}

/// Named payload group (e.g. `ORIGINAL`, `THUMBNAIL`).
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadGroup {
    pub id: GroupId,
    pub object: ObjectId,
    pub name: String,
    pub primary: Option<PayloadId>,
    pub payloads: Vec<PayloadId>,
}

/// Binary content unit with its technical attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub id: PayloadId,
    pub name: Option<String>,
    pub source: Option<String>,
    pub description: Option<String>,
    pub size: u64,
    pub checksum: Option<Checksum>,
    /// MIME type, `None` while unresolved.
    pub format: Option<String>,
    pub sequence: Option<u32>,
    pub derived_from: Option<PayloadId>,
    /// Owning group, `None` for staged (unattached) payloads.
    pub group: Option<GroupId>,
}
