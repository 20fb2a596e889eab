//! The crate-root surface an embedding application uses.

use aip_package::{
    ContainerMode, CrosswalkRegistry, ErrorClass, ErrorCode, PackageError, PackageParams, PackagerConfig,
    ProfileKind, UnauthorizedPolicy, PROFILE_AIP, PROFILE_SIP,
};
use std::io::Write;

#[test]
fn test_params_from_request_pairs() {
    let params = PackageParams::from_pairs([
        ("manifestOnly", "true"),
        ("internal", "yes"),
        ("unauthorized", "Zero"),
        ("ignoreParent", ""),
        ("curator", "archive-desk"),
    ])
    .unwrap();
    assert_eq!(params.mode(), ContainerMode::Internal);
    assert_eq!(params.unauthorized, Some(UnauthorizedPolicy::Zero));
    assert!(params.ignore_parent);
    assert!(!params.ignore_handle);
    assert_eq!(params.extra.get("curator").map(String::as_str), Some("archive-desk"));

    let err = PackageParams::from_pairs([("validate", "maybe")]).unwrap_err();
    assert_eq!(err.class, ErrorClass::Infrastructure);
    assert_eq!(err.code, ErrorCode::InfraConfig);
}

#[test]
fn test_config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "profile: submission\ningest:\n  aliases:\n    DC: QDC\nlimits:\n  max_entries: 12\npipe_capacity: 2"
    )
    .unwrap();

    let config = PackagerConfig::load(file.path()).unwrap();
    assert_eq!(config.profile, ProfileKind::Submission);
    assert_eq!(config.profile.build().name(), PROFILE_SIP);
    assert_eq!(config.ingest.crosswalk_for("dc"), "QDC");
    assert_eq!(config.read_limits().max_entries, 12);
    assert_eq!(config.pipe_capacity, 2);
}

#[test]
fn test_config_errors_name_the_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "pipe_capacity: 0").unwrap();
    let err = PackagerConfig::load(file.path()).unwrap_err();
    assert_eq!(err.code, ErrorCode::InfraConfig);
    assert!(err.to_string().contains("pipe_capacity"), "{}", err);

    let err = PackagerConfig::from_yaml_str("profiles: aip").unwrap_err();
    assert_eq!(err.code, ErrorCode::InfraConfig);
}

#[test]
fn test_default_profile_is_archival() {
    assert_eq!(PackagerConfig::default().profile.build().name(), PROFILE_AIP);
}

#[test]
fn test_unknown_crosswalk_is_a_translation_error() {
    let registry = CrosswalkRegistry::with_builtin();
    assert!(registry.dissemination("QDC").is_ok());
    assert!(registry.ingestion("RIGHTS").is_ok());

    let err: PackageError = registry.ingestion("MARC21").err().unwrap().into();
    assert_eq!(err.class, ErrorClass::Translation);
    assert_eq!(err.code, ErrorCode::TranslationMissingCrosswalk);
    assert!(err.to_string().contains("MARC21"), "{}", err);
}
