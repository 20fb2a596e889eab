use super::{LocType, Manifest};
use crate::error::{ErrorCode, PackageError, PackageResult};
use jsonschema::Draft;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Embedded schema for manifest v1.
const AIP_MANIFEST_V1_SCHEMA_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/aip_manifest_v1.schema.json"
));

static VALIDATOR_RESULT: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn compiled_validator() -> PackageResult<&'static jsonschema::Validator> {
    VALIDATOR_RESULT
        .get_or_init(|| {
            let schema: Value = serde_json::from_str(AIP_MANIFEST_V1_SCHEMA_JSON)
                .map_err(|e| format!("failed to parse embedded manifest schema JSON: {e}"))?;
            jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&schema)
                .map_err(|e| format!("failed to compile manifest schema: {e}"))
        })
        .as_ref()
        .map_err(|e| PackageError::config(e.clone()))
}

/// Validate a raw manifest document against the embedded schema.
///
/// Reports at most the first ten violations.
pub fn validate_schema(instance: &Value) -> PackageResult<()> {
    let v = compiled_validator()?;
    if v.is_valid(instance) {
        return Ok(());
    }

    const MAX_ERRORS: usize = 10;
    let details: Vec<String> = v
        .iter_errors(instance)
        .take(MAX_ERRORS)
        .enumerate()
        .map(|(i, e)| format!("{:02}: {}", i + 1, e))
        .collect();
    Err(PackageError::validation(
        ErrorCode::ValidationSchema,
        format!("manifest schema validation failed ({} shown)", details.len()),
    )
    .with_details(details))
}

/// Check the cross-references the schema cannot express.
///
/// - section and file ids are unique
/// - root-div `dmd_ids`, `adm_ids` and `fptrs` resolve
/// - file `adm_id` values resolve
/// - file locators are never persistent identifiers
pub fn check_structure(manifest: &Manifest) -> PackageResult<()> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    let section_ids = manifest
        .dmd_secs
        .iter()
        .map(|s| s.id.as_str())
        .chain(manifest.amd_secs.iter().map(|a| a.id.as_str()))
        .chain(
            manifest
                .amd_secs
                .iter()
                .flat_map(|a| a.all_sections())
                .map(|s| s.id.as_str()),
        )
        .chain(manifest.files().map(|(_, f)| f.id.as_str()));
    for id in section_ids {
        if !seen.insert(id) {
            problems.push(format!("duplicate id '{}'", id));
        }
    }

    let root = &manifest.struct_map.root;
    for id in &root.dmd_ids {
        if !manifest.dmd_secs.iter().any(|s| &s.id == id) {
            problems.push(format!("root div references unknown descriptive section '{}'", id));
        }
    }
    for id in &root.adm_ids {
        if manifest.amd_sec(id).is_none() {
            problems.push(format!("root div references unknown admin section '{}'", id));
        }
    }
    for id in &root.fptrs {
        if manifest.file(id).is_none() {
            problems.push(format!("root div references unknown file '{}'", id));
        }
    }
    for (_, file) in manifest.files() {
        if let Some(adm) = &file.adm_id {
            if manifest.amd_sec(adm).is_none() {
                problems.push(format!("file '{}' references unknown admin section '{}'", file.id, adm));
            }
        }
        if file.loc.loctype == LocType::Handle {
            problems.push(format!("file '{}' has a persistent-identifier locator", file.id));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(PackageError::validation(
            ErrorCode::ValidationMalformedManifest,
            format!("manifest has {} structural problem(s)", problems.len()),
        )
        .with_details(problems))
    }
}
