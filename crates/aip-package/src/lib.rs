pub mod config;
pub mod container;
pub mod crosswalk;
pub mod disseminate;
pub mod error;
pub mod ingest;
pub mod limits;
pub mod manifest;
pub mod model;
pub mod params;
pub mod probe;
pub mod profile;

// Convenience re-exports
pub use config::{DisseminationConfig, IngestConfig, PackagerConfig};
pub use crosswalk::{Assertion, CrosswalkError, CrosswalkRegistry, CrosswalkSubject};
pub use disseminate::{DisseminationReport, Disseminator};
pub use error::{ErrorClass, ErrorCode, PackageError, PackageResult};
pub use ingest::{Discrepancies, IngestReport, Ingester, StagedPayloads};
pub use limits::{ReadLimits, ReadLimitsOverrides};
pub use manifest::{Manifest, PROFILE_AIP, PROFILE_SIP};
pub use model::{
    AccessPolicy, Action, EntityStore, IdentifierResolver, InMemoryRepository, ObjectId, ObjectKind,
    PackageContext, PayloadId, PolicyEngine, PolicyTarget, Principal,
};
pub use params::{ContainerMode, PackageParams, UnauthorizedPolicy};
pub use probe::{Probe, ProbeOutcome};
pub use profile::{AipProfile, PackageProfile, ProfileKind, SubmissionProfile};
