//! Dissemination on behalf of a principal who may read only part of an object.

use aip_package::container::read_container;
use aip_package::model::MetadataField;
use aip_package::{
    AccessPolicy, Action, CrosswalkRegistry, DisseminationReport, Disseminator, ErrorClass,
    InMemoryRepository, Manifest, ObjectId, ObjectKind, PackageContext, PackageError, PackageParams,
    PackagerConfig, PolicyTarget, Principal, ReadLimits, UnauthorizedPolicy,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

struct Fixture {
    repo: Arc<InMemoryRepository>,
    item: ObjectId,
}

/// Alice may read the object, the ORIGINAL group and its first payload. Nothing else.
fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    let root = repo.insert_object(ObjectKind::Container, None, Some("123456789/1"));
    let item = repo.insert_object(ObjectKind::Content, Some(root), Some("123456789/3"));
    repo.insert_metadata(item, [MetadataField::dc("title", None, "Restricted")]);

    let original = repo.insert_group(item, "ORIGINAL");
    let open = repo.insert_payload(original, "open.txt", Some("text/plain"), b"public words");
    repo.insert_payload(original, "closed.txt", Some("text/plain"), b"embargoed words");
    let thumbs = repo.insert_group(item, "THUMBNAIL");
    repo.insert_payload(thumbs, "closed.txt.jpg", Some("image/jpeg"), b"\xff\xd8 small");

    let alice = || AccessPolicy::new(Action::Read, "alice");
    repo.grant(PolicyTarget::Object(item), alice());
    repo.grant(PolicyTarget::Group(original), alice());
    repo.grant(PolicyTarget::Payload(open), alice());
    Fixture { repo, item }
}

fn disseminate(f: &Fixture, params: &PackageParams, out: &mut Vec<u8>) -> Result<DisseminationReport, PackageError> {
    let ctx = PackageContext::new(f.repo.clone(), f.repo.clone(), f.repo.clone(), Principal::new("alice"));
    Disseminator::new(Arc::new(CrosswalkRegistry::with_builtin()), &PackagerConfig::default())
        .disseminate(&ctx, f.item, params, out)
}

/// Manifest plus entry bytes by path.
fn unpack(bytes: &[u8]) -> (Manifest, BTreeMap<String, Vec<u8>>) {
    let mut entries = BTreeMap::new();
    let contents = read_container(bytes, &ReadLimits::default(), |entry, reader| {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        entries.insert(entry.path.clone(), data);
        Ok(())
    })
    .unwrap();
    (Manifest::from_slice(&contents.manifest).unwrap(), entries)
}

#[test]
fn test_unreadable_payload_without_option_fails() {
    let f = fixture();
    let mut out = Vec::new();
    let err = disseminate(&f, &PackageParams::new(), &mut out).unwrap_err();
    assert_eq!(err.class, ErrorClass::Authorization);
    assert!(err.is_authorization());
    assert!(out.is_empty(), "nothing is written before the plan is complete");
}

#[test]
fn test_zero_emits_empty_placeholders() {
    let f = fixture();
    let mut out = Vec::new();
    let report = disseminate(&f, &PackageParams::new().unauthorized(UnauthorizedPolicy::Zero), &mut out).unwrap();
    assert_eq!((report.files, report.zeroed, report.skipped), (3, 2, 0));

    let (manifest, entries) = unpack(&out);
    let groups: Vec<&str> = manifest.file_sec.groups.iter().map(|g| g.use_.as_str()).collect();
    assert_eq!(groups, ["ORIGINAL", "THUMBNAIL"]);

    for (_, file) in manifest.files() {
        let data = &entries[&file.loc.href];
        if file.loc.href.ends_with("_open.txt") {
            assert_eq!(data.as_slice(), b"public words");
            assert_eq!(file.size, Some(12));
            assert!(file.checksum.is_some());
        } else {
            assert!(data.is_empty(), "{} should be a placeholder", file.loc.href);
            assert_eq!(file.size, Some(0));
            assert_eq!(file.checksum, None);
        }
    }
}

#[test]
fn test_skip_leaves_out_entries_and_emptied_groups() {
    let f = fixture();
    let mut out = Vec::new();
    let report = disseminate(&f, &PackageParams::new().unauthorized(UnauthorizedPolicy::Skip), &mut out).unwrap();
    assert_eq!((report.files, report.zeroed, report.skipped), (1, 0, 2));

    let (manifest, entries) = unpack(&out);
    let groups: Vec<&str> = manifest.file_sec.groups.iter().map(|g| g.use_.as_str()).collect();
    assert_eq!(groups, ["ORIGINAL"]);
    let payloads: Vec<&String> = entries.keys().filter(|p| p.starts_with("payloads/")).collect();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].ends_with("_open.txt"));
}

#[test]
fn test_unreadable_object_is_refused() {
    let f = fixture();
    let ctx = PackageContext::new(f.repo.clone(), f.repo.clone(), f.repo.clone(), Principal::new("mallory"));
    let mut out = Vec::new();
    let err = Disseminator::new(Arc::new(CrosswalkRegistry::with_builtin()), &PackagerConfig::default())
        .disseminate(&ctx, f.item, &PackageParams::new().unauthorized(UnauthorizedPolicy::Skip), &mut out)
        .unwrap_err();
    assert!(err.is_authorization());
    assert!(out.is_empty());
}

/// Everything readable except one group that holds no payloads.
fn empty_restricted_group() -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    let item = repo.insert_object(ObjectKind::Content, None, Some("123456789/4"));
    repo.insert_metadata(item, [MetadataField::dc("title", None, "Partly sealed")]);
    let original = repo.insert_group(item, "ORIGINAL");
    let open = repo.insert_payload(original, "open.txt", Some("text/plain"), b"public words");
    repo.insert_group(item, "RESTRICTED");

    let alice = || AccessPolicy::new(Action::Read, "alice");
    repo.grant(PolicyTarget::Object(item), alice());
    repo.grant(PolicyTarget::Group(original), alice());
    repo.grant(PolicyTarget::Payload(open), alice());
    Fixture { repo, item }
}

#[test]
fn test_unreadable_empty_group_is_decided_per_group() {
    let f = empty_restricted_group();
    let group_names = |out: &[u8]| -> Vec<String> {
        let (manifest, _) = unpack(out);
        manifest.file_sec.groups.iter().map(|g| g.use_.clone()).collect()
    };

    let mut out = Vec::new();
    let err = disseminate(&f, &PackageParams::new(), &mut out).unwrap_err();
    assert!(err.is_authorization());
    assert!(err.to_string().contains("RESTRICTED"), "{}", err);
    assert!(out.is_empty());

    let mut out = Vec::new();
    let report = disseminate(&f, &PackageParams::new().unauthorized(UnauthorizedPolicy::Skip), &mut out).unwrap();
    assert_eq!((report.files, report.skipped), (1, 0));
    assert_eq!(group_names(&out), ["ORIGINAL"]);

    let mut out = Vec::new();
    disseminate(&f, &PackageParams::new().unauthorized(UnauthorizedPolicy::Zero), &mut out).unwrap();
    assert_eq!(group_names(&out), ["ORIGINAL", "RESTRICTED"]);
}
