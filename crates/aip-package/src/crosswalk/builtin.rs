//! Built-in crosswalks.
//!
//! - `INTERNAL`: every metadata field of an object, lossless (descriptive)
//! - `QDC`: the Dublin-Core subset (descriptive)
//! - `AIP-TECHMD`: object kind and identifiers, payload attributes (source)
//! - `PREMIS`: payload size, fixity and format (technical, payloads only)
//! - `RIGHTS`: access policies as NDJSON (streaming, rights)

use super::{
    Assertion, CrosswalkError, CrosswalkRegistry, CrosswalkResult, CrosswalkSubject,
    DisseminationCrosswalk, IngestionCrosswalk, StreamingDisseminationCrosswalk,
    StreamingIngestionCrosswalk,
};
use crate::model::identifier::{strip_scheme, to_urn};
use crate::model::{AccessPolicy, MetadataField};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;

pub const INTERNAL: &str = "INTERNAL";
pub const QDC: &str = "QDC";
pub const AIP_TECHMD: &str = "AIP-TECHMD";
pub const PREMIS: &str = "PREMIS";
pub const RIGHTS: &str = "RIGHTS";

/// MIME type of the `RIGHTS` stream.
pub const NDJSON_MIME: &str = "application/x-ndjson";

pub(crate) fn register_all(registry: &mut CrosswalkRegistry) {
    registry.register_dissemination(INTERNAL, Arc::new(InternalCrosswalk));
    registry.register_ingestion(INTERNAL, Arc::new(InternalCrosswalk));
    registry.register_dissemination(QDC, Arc::new(QdcCrosswalk));
    registry.register_ingestion(QDC, Arc::new(QdcCrosswalk));
    registry.register_dissemination(AIP_TECHMD, Arc::new(TechMdCrosswalk));
    registry.register_ingestion(AIP_TECHMD, Arc::new(TechMdCrosswalk));
    registry.register_dissemination(PREMIS, Arc::new(PremisCrosswalk));
    registry.register_ingestion(PREMIS, Arc::new(PremisCrosswalk));
    registry.register_streaming_dissemination(RIGHTS, Arc::new(RightsCrosswalk));
    registry.register_streaming_ingestion(RIGHTS, Arc::new(RightsCrosswalk));
}

fn fields_from(name: &str, section: &Value) -> CrosswalkResult<Vec<MetadataField>> {
    serde_json::from_value(section.clone()).map_err(|e| CrosswalkError::invalid(name, e.to_string()))
}

// INTERNAL

pub struct InternalCrosswalk;

impl DisseminationCrosswalk for InternalCrosswalk {
    fn can_disseminate(&self, subject: &CrosswalkSubject) -> bool {
        subject.is_object()
    }

    fn disseminate(&self, subject: &CrosswalkSubject) -> CrosswalkResult<Value> {
        match subject {
            CrosswalkSubject::Object { object, .. } => serde_json::to_value(&object.metadata)
                .map_err(|e| CrosswalkError::invalid(INTERNAL, e.to_string())),
            CrosswalkSubject::Payload { .. } => {
                Err(CrosswalkError::invalid(INTERNAL, "payloads have no descriptive metadata"))
            }
        }
    }
}

impl IngestionCrosswalk for InternalCrosswalk {
    fn ingest(&self, section: &Value) -> CrosswalkResult<Vec<Assertion>> {
        Ok(fields_from(INTERNAL, section)?
            .into_iter()
            .map(Assertion::Field)
            .collect())
    }
}

// QDC

/// The fifteen Dublin-Core elements.
const DC_ELEMENTS: &[&str] = &[
    "contributor",
    "coverage",
    "creator",
    "date",
    "description",
    "format",
    "identifier",
    "language",
    "publisher",
    "relation",
    "rights",
    "source",
    "subject",
    "title",
    "type",
];

#[derive(Debug, Serialize, Deserialize)]
struct QdcTerm {
    element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lang: Option<String>,
    value: String,
}

pub struct QdcCrosswalk;

impl DisseminationCrosswalk for QdcCrosswalk {
    fn can_disseminate(&self, subject: &CrosswalkSubject) -> bool {
        subject.is_object()
    }

    fn disseminate(&self, subject: &CrosswalkSubject) -> CrosswalkResult<Value> {
        let CrosswalkSubject::Object { object, .. } = subject else {
            return Err(CrosswalkError::invalid(QDC, "payloads have no descriptive metadata"));
        };
        let terms: Vec<QdcTerm> = object
            .metadata
            .iter()
            .filter(|f| f.schema == "dc" && DC_ELEMENTS.contains(&f.element.as_str()))
            .map(|f| QdcTerm {
                element: f.element.clone(),
                qualifier: f.qualifier.clone(),
                lang: f.language.clone(),
                value: f.value.clone(),
            })
            .collect();
        serde_json::to_value(terms).map_err(|e| CrosswalkError::invalid(QDC, e.to_string()))
    }
}

impl IngestionCrosswalk for QdcCrosswalk {
    fn ingest(&self, section: &Value) -> CrosswalkResult<Vec<Assertion>> {
        let terms: Vec<QdcTerm> = serde_json::from_value(section.clone())
            .map_err(|e| CrosswalkError::invalid(QDC, e.to_string()))?;
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            if !DC_ELEMENTS.contains(&term.element.as_str()) {
                tracing::debug!(element = %term.element, "skipping non-DC element");
                continue;
            }
            let mut field = MetadataField::dc(&term.element, term.qualifier.as_deref(), term.value);
            field.language = term.lang;
            out.push(Assertion::Field(field));
        }
        Ok(out)
    }
}

// AIP-TECHMD

pub struct TechMdCrosswalk;

impl DisseminationCrosswalk for TechMdCrosswalk {
    fn can_disseminate(&self, _subject: &CrosswalkSubject) -> bool {
        true
    }

    fn disseminate(&self, subject: &CrosswalkSubject) -> CrosswalkResult<Value> {
        Ok(match subject {
            CrosswalkSubject::Object {
                object,
                identifier,
                parent_identifier,
                ..
            } => json!({
                "kind": object.kind.tag(),
                "identifier": identifier.as_deref().map(to_urn),
                "parent_identifier": parent_identifier.as_deref().map(to_urn),
                "title": object.first_value("dc", "title", None),
            }),
            CrosswalkSubject::Payload { payload, group, .. } => json!({
                "group": group,
                "name": payload.name,
                "source": payload.source,
                "description": payload.description,
                "sequence": payload.sequence,
            }),
        })
    }
}

impl IngestionCrosswalk for TechMdCrosswalk {
    fn ingest(&self, section: &Value) -> CrosswalkResult<Vec<Assertion>> {
        let obj = section
            .as_object()
            .ok_or_else(|| CrosswalkError::invalid(AIP_TECHMD, "expected a JSON object"))?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        let mut out = Vec::new();
        if let Some(id) = text("identifier") {
            out.push(Assertion::Identifier(strip_scheme(&id).to_string()));
        }
        if let Some(parent) = text("parent_identifier") {
            out.push(Assertion::Parent(strip_scheme(&parent).to_string()));
        }
        if let Some(name) = text("name") {
            out.push(Assertion::Name(name));
        }
        if let Some(source) = text("source") {
            out.push(Assertion::Source(source));
        }
        if let Some(description) = text("description") {
            out.push(Assertion::Description(description));
        }
        if let Some(seq) = obj.get("sequence").and_then(Value::as_u64) {
            let seq = u32::try_from(seq)
                .map_err(|_| CrosswalkError::invalid(AIP_TECHMD, "sequence out of range"))?;
            out.push(Assertion::Sequence(seq));
        }
        Ok(out)
    }
}

// PREMIS

pub struct PremisCrosswalk;

impl DisseminationCrosswalk for PremisCrosswalk {
    fn can_disseminate(&self, subject: &CrosswalkSubject) -> bool {
        !subject.is_object()
    }

    fn disseminate(&self, subject: &CrosswalkSubject) -> CrosswalkResult<Value> {
        let CrosswalkSubject::Payload { payload, .. } = subject else {
            return Err(CrosswalkError::invalid(PREMIS, "only payloads are described"));
        };
        Ok(json!({
            "object_identifier": payload.id.to_string(),
            "original_name": payload.name,
            "size": payload.size,
            "fixity": payload.checksum.as_ref().map(|c| json!({
                "algorithm": c.algorithm.name(),
                "digest": c.value,
            })),
            "format": payload.format,
        }))
    }
}

impl IngestionCrosswalk for PremisCrosswalk {
    fn ingest(&self, section: &Value) -> CrosswalkResult<Vec<Assertion>> {
        let obj = section
            .as_object()
            .ok_or_else(|| CrosswalkError::invalid(PREMIS, "expected a JSON object"))?;
        let mut out = Vec::new();
        if let Some(format) = obj.get("format").and_then(Value::as_str) {
            out.push(Assertion::Format(format.to_string()));
        }
        if let Some(name) = obj.get("original_name").and_then(Value::as_str) {
            out.push(Assertion::Name(name.to_string()));
        }
        Ok(out)
    }
}

// RIGHTS

pub struct RightsCrosswalk;

impl StreamingDisseminationCrosswalk for RightsCrosswalk {
    fn mime_type(&self) -> &str {
        NDJSON_MIME
    }

    fn can_disseminate(&self, _subject: &CrosswalkSubject) -> bool {
        true
    }

    fn disseminate(&self, subject: &CrosswalkSubject, out: &mut dyn Write) -> CrosswalkResult<()> {
        for policy in subject.policies() {
            serde_json::to_writer(&mut *out, policy)
                .map_err(|e| CrosswalkError::invalid(RIGHTS, e.to_string()))?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl StreamingIngestionCrosswalk for RightsCrosswalk {
    fn ingest(&self, input: &mut dyn Read, mime: Option<&str>) -> CrosswalkResult<Vec<Assertion>> {
        if let Some(mime) = mime {
            if mime != NDJSON_MIME {
                return Err(CrosswalkError::invalid(RIGHTS, format!("unsupported mime type {}", mime)));
            }
        }
        let mut out = Vec::new();
        for (i, line) in BufReader::new(input).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let policy: AccessPolicy = serde_json::from_str(&line)
                .map_err(|e| CrosswalkError::invalid(RIGHTS, format!("line {}: {}", i + 1, e)))?;
            out.push(Assertion::Policy(policy));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ArchivalObject, ObjectId, ObjectKind};
    use std::io::Cursor;

    fn object_subject() -> CrosswalkSubject {
        CrosswalkSubject::Object {
            object: ArchivalObject {
                id: ObjectId::new_v4(),
                kind: ObjectKind::Content,
                identifier: Some("example/42".into()),
                parent: None,
                metadata: vec![
                    MetadataField::dc("title", None, "On Archives").with_language("en"),
                    MetadataField::dc("date", Some("issued"), "2001"),
                    MetadataField::new("local", "note", None, "internal only"),
                ],
                groups: Vec::new(),
                children: Vec::new(),
                logo: None,
                installed: true,
            },
            identifier: Some("example/42".into()),
            parent_identifier: Some("example/1".into()),
            policies: vec![AccessPolicy::new(Action::Read, "Anonymous")],
        }
    }

    #[test]
    fn qdc_keeps_only_dublin_core() {
        let value = QdcCrosswalk.disseminate(&object_subject()).unwrap();
        let fields = QdcCrosswalk.ingest(&value).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(&Assertion::Field(
            MetadataField::dc("title", None, "On Archives").with_language("en")
        )));
    }

    #[test]
    fn internal_is_lossless() {
        let value = InternalCrosswalk.disseminate(&object_subject()).unwrap();
        assert_eq!(InternalCrosswalk.ingest(&value).unwrap().len(), 3);
    }

    #[test]
    fn techmd_asserts_identifiers_without_scheme() {
        let value = TechMdCrosswalk.disseminate(&object_subject()).unwrap();
        assert_eq!(value["identifier"], "urn:example/42");
        let assertions = TechMdCrosswalk.ingest(&value).unwrap();
        assert!(assertions.contains(&Assertion::Identifier("example/42".into())));
        assert!(assertions.contains(&Assertion::Parent("example/1".into())));
    }

    #[test]
    fn premis_declines_objects() {
        assert!(!PremisCrosswalk.can_disseminate(&object_subject()));
    }

    #[test]
    fn rights_ndjson_round_trip() {
        let mut buf = Vec::new();
        RightsCrosswalk.disseminate(&object_subject(), &mut buf).unwrap();
        let assertions = RightsCrosswalk
            .ingest(&mut Cursor::new(buf), Some(NDJSON_MIME))
            .unwrap();
        assert_eq!(
            assertions,
            vec![Assertion::Policy(AccessPolicy::new(Action::Read, "Anonymous"))]
        );
    }

    #[test]
    fn rights_rejects_garbage_line() {
        let err = RightsCrosswalk
            .ingest(&mut Cursor::new(b"{\"action\":\"READ\"\nnope".to_vec()), None)
            .unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
