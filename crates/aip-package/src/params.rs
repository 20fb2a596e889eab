//! Per-call package parameters.
//!
//! Recognized options: `manifestOnly`, `internal`, `validate`, `ignoreHandle`,
//! `ignoreParent`, `unauthorized` (`skip` | `zero`). Unknown keys are kept in
//! `extra` so profile-specific code can read them.

use crate::error::{PackageError, PackageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the package is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerMode {
    /// tar.gz holding the manifest plus every referenced payload and metadata file.
    Full,
    /// Bare manifest, metadata inline, no payload bytes.
    ManifestOnly,
    /// Bare manifest, payloads referenced by absolute store locators.
    Internal,
}

/// Behavior when a group or payload is not readable during dissemination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnauthorizedPolicy {
    /// Leave the entry out of both manifest and container.
    Skip,
    /// Emit a zero-length placeholder entry (size 0, no checksum).
    Zero,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageParams {
    pub manifest_only: bool,
    pub internal: bool,
    pub validate: bool,
    pub ignore_handle: bool,
    pub ignore_parent: bool,
    pub unauthorized: Option<UnauthorizedPolicy>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl PackageParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manifest_only(mut self) -> Self {
        self.manifest_only = true;
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn validate(mut self) -> Self {
        self.validate = true;
        self
    }

    pub fn ignore_handle(mut self) -> Self {
        self.ignore_handle = true;
        self
    }

    pub fn ignore_parent(mut self) -> Self {
        self.ignore_parent = true;
        self
    }

    pub fn unauthorized(mut self, policy: UnauthorizedPolicy) -> Self {
        self.unauthorized = Some(policy);
        self
    }

    /// Container layout selected by these parameters. `internal` implies a bare manifest
    /// and takes precedence over `manifestOnly`.
    pub fn mode(&self) -> ContainerMode {
        if self.internal {
            ContainerMode::Internal
        } else if self.manifest_only {
            ContainerMode::ManifestOnly
        } else {
            ContainerMode::Full
        }
    }

    /// Parse from a string property bag (`key=value` pairs as supplied on a command line
    /// or in a request form).
    pub fn from_pairs<'a, I>(pairs: I) -> PackageResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key {
                "manifestOnly" => params.manifest_only = parse_flag(key, value)?,
                "internal" => params.internal = parse_flag(key, value)?,
                "validate" => params.validate = parse_flag(key, value)?,
                "ignoreHandle" => params.ignore_handle = parse_flag(key, value)?,
                "ignoreParent" => params.ignore_parent = parse_flag(key, value)?,
                "unauthorized" => {
                    params.unauthorized = match value.trim().to_ascii_lowercase().as_str() {
                        "skip" => Some(UnauthorizedPolicy::Skip),
                        "zero" => Some(UnauthorizedPolicy::Zero),
                        "" => None,
                        other => {
                            return Err(PackageError::config(format!(
                                "unauthorized must be 'skip' or 'zero', got '{}'",
                                other
                            )))
                        }
                    }
                }
                _ => {
                    tracing::debug!(key, "keeping unrecognized package parameter");
                    params.extra.insert(key.to_string(), value.to_string());
                }
            }
        }
        Ok(params)
    }
}

fn parse_flag(key: &str, value: &str) -> PackageResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(PackageError::config(format!(
            "parameter '{}' expects a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_full_container() {
        assert_eq!(PackageParams::default().mode(), ContainerMode::Full);
        assert_eq!(
            PackageParams::new().manifest_only().mode(),
            ContainerMode::ManifestOnly
        );
        assert_eq!(
            PackageParams::new().manifest_only().internal().mode(),
            ContainerMode::Internal
        );
    }

    #[test]
    fn parses_property_pairs() {
        let params = PackageParams::from_pairs([
            ("manifestOnly", "true"),
            ("ignoreParent", "yes"),
            ("unauthorized", "ZERO"),
            ("passwords", "false"),
        ])
        .unwrap();
        assert!(params.manifest_only);
        assert!(params.ignore_parent);
        assert!(!params.ignore_handle);
        assert_eq!(params.unauthorized, Some(UnauthorizedPolicy::Zero));
        assert_eq!(params.extra.get("passwords").map(String::as_str), Some("false"));
    }

    #[test]
    fn rejects_bad_unauthorized_value() {
        let err = PackageParams::from_pairs([("unauthorized", "ignore")]).unwrap_err();
        assert!(err.message.contains("skip"));
    }

    #[test]
    fn deserializes_camel_case() {
        let params: PackageParams =
            serde_json::from_str(r#"{"internal":true,"unauthorized":"skip"}"#).unwrap();
        assert_eq!(params.mode(), ContainerMode::Internal);
        assert_eq!(params.unauthorized, Some(UnauthorizedPolicy::Skip));
    }
}
