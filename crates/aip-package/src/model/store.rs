//! Entity store contract and its error type.

use super::policy::AuthSession;
use super::{
    ArchivalObject, Checksum, ChecksumAlgorithm, GroupId, MetadataField, ObjectId, ObjectKind,
    Payload, PayloadGroup, PayloadId,
};
use std::io::Read;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The session is not allowed to perform the operation.
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Entity already exists (identifier already bound, group name taken).
    #[error("already exists: {what}")]
    AlreadyExists { what: String },

    /// Operation violates an entity invariant (payload on a container, attach twice).
    #[error("invalid operation: {message}")]
    Invalid { message: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

/// Partial payload attribute update. Only `Some` values are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadUpdate {
    pub name: Option<String>,
    pub source: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub sequence: Option<u32>,
    pub derived_from: Option<PayloadId>,
}

impl PayloadUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// CRUD over archival objects, payload groups and payloads.
///
/// Mutating calls take the caller's [`AuthSession`]; implementations decide
/// which of them are policy-gated. The in-memory implementation gates object
/// creation (`Add` on the parent), staging unattached payloads (`Write` on
/// [`PolicyTarget::Unattached`](super::PolicyTarget::Unattached)) and payload reads.
pub trait EntityStore: Send + Sync {
    fn object(&self, id: ObjectId) -> StoreResult<ArchivalObject>;

    /// Create a provisional object under `parent`.
    fn create_object(
        &self,
        session: &AuthSession,
        kind: ObjectKind,
        parent: ObjectId,
    ) -> StoreResult<ObjectId>;

    fn set_identifier(
        &self,
        session: &AuthSession,
        object: ObjectId,
        identifier: Option<String>,
    ) -> StoreResult<()>;

    fn add_metadata(
        &self,
        session: &AuthSession,
        object: ObjectId,
        fields: Vec<MetadataField>,
    ) -> StoreResult<()>;

    /// Delete an object with its groups and attached payloads.
    fn delete_object(&self, session: &AuthSession, object: ObjectId) -> StoreResult<()>;

    /// Make a provisional object durable.
    fn install(&self, session: &AuthSession, object: ObjectId) -> StoreResult<()>;

    fn group(&self, id: GroupId) -> StoreResult<PayloadGroup>;

    fn create_group(
        &self,
        session: &AuthSession,
        object: ObjectId,
        name: &str,
    ) -> StoreResult<GroupId>;

    fn set_primary(
        &self,
        session: &AuthSession,
        group: GroupId,
        payload: Option<PayloadId>,
    ) -> StoreResult<()>;

    fn payload(&self, id: PayloadId) -> StoreResult<Payload>;

    /// Store bytes as a new unattached payload (size and MD5 computed by the store).
    fn create_payload(&self, session: &AuthSession, data: &mut dyn Read) -> StoreResult<PayloadId>;

    /// Duplicate an existing payload's bytes into a new unattached payload.
    fn copy_payload(&self, session: &AuthSession, source: PayloadId) -> StoreResult<PayloadId>;

    fn update_payload(
        &self,
        session: &AuthSession,
        payload: PayloadId,
        update: PayloadUpdate,
    ) -> StoreResult<()>;

    fn attach_payload(
        &self,
        session: &AuthSession,
        group: GroupId,
        payload: PayloadId,
    ) -> StoreResult<()>;

    fn delete_payload(&self, session: &AuthSession, payload: PayloadId) -> StoreResult<()>;

    /// Open payload bytes for reading.
    fn open_payload(
        &self,
        session: &AuthSession,
        payload: PayloadId,
    ) -> StoreResult<Box<dyn Read + Send>>;

    fn compute_checksum(
        &self,
        payload: PayloadId,
        algorithm: ChecksumAlgorithm,
    ) -> StoreResult<Checksum>;

    /// Set (or clear) a container's representative image.
    fn set_logo(
        &self,
        session: &AuthSession,
        object: ObjectId,
        payload: Option<PayloadId>,
    ) -> StoreResult<()>;

    /// Absolute external locator of a stored payload.
    fn payload_locator(&self, payload: PayloadId) -> String;

    fn find_payload_by_locator(&self, locator: &str) -> StoreResult<Option<PayloadId>>;
}
