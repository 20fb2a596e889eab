//! A streaming crosswalk that fails mid-section aborts dissemination before any byte reaches the sink.

use aip_package::crosswalk::{CrosswalkError, CrosswalkResult, StreamingDisseminationCrosswalk};
use aip_package::model::MetadataField;
use aip_package::{
    CrosswalkRegistry, CrosswalkSubject, Disseminator, ErrorClass, ErrorCode, InMemoryRepository, ObjectKind,
    PackageContext, PackageParams, PackagerConfig, Principal,
};
use std::io::Write;
use std::sync::Arc;

/// Writes part of a rights export, then loses its backend.
struct FailingRights;

impl StreamingDisseminationCrosswalk for FailingRights {
    fn mime_type(&self) -> &str {
        "application/x-ndjson"
    }

    fn can_disseminate(&self, _subject: &CrosswalkSubject) -> bool {
        true
    }

    fn disseminate(&self, _subject: &CrosswalkSubject, out: &mut dyn Write) -> CrosswalkResult<()> {
        out.write_all(b"{\"action\":\"READ\"")?;
        Err(CrosswalkError::invalid("RIGHTS", "rights backend offline"))
    }
}

fn registry() -> Arc<CrosswalkRegistry> {
    let mut registry = CrosswalkRegistry::with_builtin();
    registry.register_streaming_dissemination("RIGHTS", Arc::new(FailingRights));
    Arc::new(registry)
}

fn disseminate(params: &PackageParams) -> (Result<(), aip_package::PackageError>, Vec<u8>) {
    let repo = Arc::new(InMemoryRepository::new());
    let item = repo.insert_object(ObjectKind::Content, None, Some("123456789/9"));
    repo.insert_metadata(item, [MetadataField::dc("title", None, "Broken export")]);
    let group = repo.insert_group(item, "ORIGINAL");
    repo.insert_payload(group, "a.txt", Some("text/plain"), b"alpha");

    let ctx = PackageContext::new(repo.clone(), repo.clone(), repo.clone(), Principal::admin("admin"));
    let mut out = Vec::new();
    let result = Disseminator::new(registry(), &PackagerConfig::default())
        .disseminate(&ctx, item, params, &mut out)
        .map(|_| ());
    (result, out)
}

#[test]
fn test_full_container_writes_nothing_on_stream_failure() {
    let (result, out) = disseminate(&PackageParams::new());
    let err = result.unwrap_err();
    assert_eq!(err.class, ErrorClass::Translation);
    assert_eq!(err.code, ErrorCode::TranslationStreamFailed);
    assert!(out.is_empty(), "{} bytes written", out.len());
}

#[test]
fn test_manifest_only_writes_nothing_on_stream_failure() {
    let (result, out) = disseminate(&PackageParams::new().manifest_only());
    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::TranslationStreamFailed);
    assert!(out.is_empty(), "{} bytes written", out.len());
}
