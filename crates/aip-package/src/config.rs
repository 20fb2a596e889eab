//! Packager configuration (YAML).
//!
//! ```yaml
//! profile: aip
//! dissemination:
//!   dmd: [INTERNAL, QDC]
//!   rights: [RIGHTS]
//! ingest:
//!   preferred_dmd: [INTERNAL, QDC]
//!   aliases:
//!     DC: QDC
//! limits:
//!   max_entries: 5000
//! pipe_capacity: 4
//! ```

use crate::crosswalk::builtin::{AIP_TECHMD, INTERNAL, PREMIS, QDC, RIGHTS};
use crate::error::{PackageError, PackageResult};
use crate::limits::{ReadLimits, ReadLimitsOverrides};
use crate::manifest::AdminKind;
use crate::profile::ProfileKind;
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagerConfig {
    pub profile: ProfileKind,
    pub dissemination: DisseminationConfig,
    pub ingest: IngestConfig,
    pub limits: ReadLimitsOverrides,
    /// Chunks in flight per streamed metadata section.
    pub pipe_capacity: usize,
    /// Provenance note written to the manifest header.
    pub header_note: Option<String>,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            profile: ProfileKind::Aip,
            dissemination: DisseminationConfig::default(),
            ingest: IngestConfig::default(),
            limits: ReadLimitsOverrides::default(),
            pipe_capacity: 4,
            header_note: None,
        }
    }
}

/// Crosswalk names emitted per section kind, in output order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisseminationConfig {
    pub dmd: Vec<String>,
    pub tech: Vec<String>,
    pub source: Vec<String>,
    pub digiprov: Vec<String>,
    pub rights: Vec<String>,
}

impl Default for DisseminationConfig {
    fn default() -> Self {
        Self {
            dmd: vec![INTERNAL.to_string(), QDC.to_string()],
            tech: vec![PREMIS.to_string()],
            source: vec![AIP_TECHMD.to_string()],
            digiprov: Vec::new(),
            rights: vec![RIGHTS.to_string()],
        }
    }
}

impl DisseminationConfig {
    pub fn admin(&self, kind: AdminKind) -> &[String] {
        match kind {
            AdminKind::Source => &self.source,
            AdminKind::Tech => &self.tech,
            AdminKind::Rights => &self.rights,
            AdminKind::Digiprov => &self.digiprov,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Descriptive md types tried in order when choosing the primary section.
    pub preferred_dmd: Vec<String>,
    /// md type -> crosswalk name, for archives produced with other vocabularies' names.
    pub aliases: BTreeMap<String, String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            preferred_dmd: vec![INTERNAL.to_string(), QDC.to_string()],
            aliases: BTreeMap::new(),
        }
    }
}

impl IngestConfig {
    /// Crosswalk name for a section's md type.
    pub fn crosswalk_for<'a>(&'a self, md_type: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(md_type))
            .map(|(_, v)| v.as_str())
            .unwrap_or(md_type)
    }
}

impl PackagerConfig {
    pub fn from_yaml_str(text: &str) -> PackageResult<Self> {
        Self::parse(text).map_err(config_error)
    }

    pub fn load(path: &Path) -> PackageResult<Self> {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))
            .and_then(|text| {
                Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
            })
            .map_err(config_error)
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.pipe_capacity == 0 {
            anyhow::bail!("pipe_capacity must be at least 1");
        }
        let d = &self.dissemination;
        let names = d
            .dmd
            .iter()
            .chain(&d.tech)
            .chain(&d.source)
            .chain(&d.digiprov)
            .chain(&d.rights)
            .chain(&self.ingest.preferred_dmd);
        for name in names {
            if name.trim().is_empty() {
                anyhow::bail!("crosswalk names must not be empty");
            }
        }
        Ok(())
    }

    /// Read limits with overrides applied.
    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits::default().apply(&self.limits)
    }
}

fn config_error(err: anyhow::Error) -> PackageError {
    PackageError::config(format!("{:#}", err)).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PackagerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, PackagerConfig::default());
        assert_eq!(config.dissemination.admin(AdminKind::Rights), [RIGHTS]);
    }

    #[test]
    fn parses_profile_aliases_and_limits() {
        let yaml = r#"
profile: submission
ingest:
  aliases:
    DC: QDC
limits:
  max_entries: 10
pipe_capacity: 2
"#;
        let config = PackagerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.profile, ProfileKind::Submission);
        assert_eq!(config.ingest.crosswalk_for("dc"), QDC);
        assert_eq!(config.ingest.crosswalk_for("PREMIS"), "PREMIS");
        assert_eq!(config.read_limits().max_entries, 10);
        assert_eq!(config.pipe_capacity, 2);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = PackagerConfig::from_yaml_str("profiles: aip").unwrap_err();
        assert_eq!(err.code, ErrorCode::InfraConfig);
        assert!(err.message.contains("unknown field"), "{}", err.message);
    }

    #[test]
    fn zero_pipe_capacity_is_rejected() {
        assert!(PackagerConfig::from_yaml_str("pipe_capacity: 0").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PackagerConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.message.contains("failed to read config"));
    }
}
