//! Metadata translation ("crosswalk") plugins.
//!
//! Two capability shapes per direction:
//!
//! | Direction     | Whole document             | Streaming                           |
//! |---------------|----------------------------|-------------------------------------|
//! | Dissemination | [`DisseminationCrosswalk`] | [`StreamingDisseminationCrosswalk`] |
//! | Ingestion     | [`IngestionCrosswalk`]     | [`StreamingIngestionCrosswalk`]     |
//!
//! Ingestion crosswalks are pure: they return [`Assertion`]s and the ingester
//! applies them through the entity-model collaborators.

pub mod builtin;
pub mod pipe;
mod registry;

pub use pipe::{spawn_streamed, StreamedSection};
pub use registry::{CrosswalkRegistry, DisseminationHandle, IngestionHandle, SectionSource};

use crate::model::{AccessPolicy, ArchivalObject, MetadataField, Payload};
use serde_json::Value;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors raised by crosswalk lookup and execution.
#[derive(Debug, Error)]
pub enum CrosswalkError {
    #[error("no crosswalk registered for '{name}'")]
    NotFound { name: String },

    #[error("crosswalk '{name}' rejected its input: {message}")]
    Invalid { name: String, message: String },

    #[error("streaming crosswalk '{name}' failed: {reason}")]
    StreamFailed { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrosswalkError {
    pub fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

pub type CrosswalkResult<T> = Result<T, CrosswalkError>;

/// What a dissemination crosswalk describes.
///
/// Owned data so a streaming crosswalk can take it onto its worker thread.
#[derive(Debug, Clone)]
pub enum CrosswalkSubject {
    Object {
        object: ArchivalObject,
        /// Persistent identifier, without scheme.
        identifier: Option<String>,
        parent_identifier: Option<String>,
        policies: Vec<AccessPolicy>,
    },
    Payload {
        payload: Payload,
        group: String,
        policies: Vec<AccessPolicy>,
    },
}

impl CrosswalkSubject {
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object { .. })
    }

    pub fn policies(&self) -> &[AccessPolicy] {
        match self {
            Self::Object { policies, .. } | Self::Payload { policies, .. } => policies,
        }
    }
}

/// One fact recovered from a metadata section.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    /// Descriptive field to add to the object.
    Field(MetadataField),
    /// Persistent identifier of the object (without scheme).
    Identifier(String),
    /// Persistent identifier of the parent object (without scheme).
    Parent(String),
    Name(String),
    Source(String),
    Description(String),
    /// MIME type of a payload.
    Format(String),
    Sequence(u32),
    Policy(AccessPolicy),
}

/// Produces a complete metadata document synchronously.
pub trait DisseminationCrosswalk: Send + Sync {
    /// False if this crosswalk does not describe this kind of subject.
    fn can_disseminate(&self, subject: &CrosswalkSubject) -> bool;

    fn disseminate(&self, subject: &CrosswalkSubject) -> CrosswalkResult<Value>;
}

/// Produces metadata only by writing bytes. Runs on a worker thread.
pub trait StreamingDisseminationCrosswalk: Send + Sync {
    fn mime_type(&self) -> &str;

    fn can_disseminate(&self, subject: &CrosswalkSubject) -> bool;

    fn disseminate(&self, subject: &CrosswalkSubject, out: &mut dyn Write) -> CrosswalkResult<()>;
}

pub trait IngestionCrosswalk: Send + Sync {
    fn ingest(&self, section: &Value) -> CrosswalkResult<Vec<Assertion>>;
}

pub trait StreamingIngestionCrosswalk: Send + Sync {
    fn ingest(&self, input: &mut dyn Read, mime: Option<&str>) -> CrosswalkResult<Vec<Assertion>>;
}
