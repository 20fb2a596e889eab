use super::builtin;
use super::{
    Assertion, CrosswalkError, CrosswalkResult, DisseminationCrosswalk, IngestionCrosswalk,
    StreamingDisseminationCrosswalk, StreamingIngestionCrosswalk,
};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Resolved dissemination crosswalk.
#[derive(Clone)]
pub enum DisseminationHandle {
    Document(Arc<dyn DisseminationCrosswalk>),
    Streaming(Arc<dyn StreamingDisseminationCrosswalk>),
}

/// Resolved ingestion crosswalk.
#[derive(Clone)]
pub enum IngestionHandle {
    Document(Arc<dyn IngestionCrosswalk>),
    Streaming(Arc<dyn StreamingIngestionCrosswalk>),
}

/// Metadata handed to an ingestion crosswalk.
pub enum SectionSource<'a> {
    /// Inline structured metadata.
    Document(&'a Value),
    /// Bytes of a referenced or base64-embedded section.
    Stream(&'a mut dyn Read),
}

impl IngestionHandle {
    /// Run the crosswalk, converting between document and byte form as needed.
    pub fn apply(
        &self,
        name: &str,
        source: SectionSource<'_>,
        mime: Option<&str>,
    ) -> CrosswalkResult<Vec<Assertion>> {
        match (self, source) {
            (Self::Document(xwalk), SectionSource::Document(value)) => xwalk.ingest(value),
            (Self::Document(xwalk), SectionSource::Stream(reader)) => {
                let value: Value = serde_json::from_reader(reader)
                    .map_err(|e| CrosswalkError::invalid(name, e.to_string()))?;
                xwalk.ingest(&value)
            }
            (Self::Streaming(xwalk), SectionSource::Stream(reader)) => xwalk.ingest(reader, mime),
            (Self::Streaming(xwalk), SectionSource::Document(value)) => {
                let bytes = match value {
                    Value::String(s) => s.clone().into_bytes(),
                    other => serde_json::to_vec(other)
                        .map_err(|e| CrosswalkError::invalid(name, e.to_string()))?,
                };
                xwalk.ingest(&mut Cursor::new(bytes), mime)
            }
        }
    }
}

/// Crosswalks by name (case-insensitive).
///
/// Lookup tries the whole-document table first, then the streaming table, and
/// fails with [`CrosswalkError::NotFound`] if neither has the name.
#[derive(Default, Clone)]
pub struct CrosswalkRegistry {
    dissemination: HashMap<String, Arc<dyn DisseminationCrosswalk>>,
    streaming_dissemination: HashMap<String, Arc<dyn StreamingDisseminationCrosswalk>>,
    ingestion: HashMap<String, Arc<dyn IngestionCrosswalk>>,
    streaming_ingestion: HashMap<String, Arc<dyn StreamingIngestionCrosswalk>>,
}

fn key(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

impl CrosswalkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in crosswalks (`INTERNAL`, `QDC`, `AIP-TECHMD`,
    /// `PREMIS`, `RIGHTS`).
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    pub fn register_dissemination(&mut self, name: &str, xwalk: Arc<dyn DisseminationCrosswalk>) {
        self.dissemination.insert(key(name), xwalk);
    }

    pub fn register_streaming_dissemination(
        &mut self,
        name: &str,
        xwalk: Arc<dyn StreamingDisseminationCrosswalk>,
    ) {
        self.streaming_dissemination.insert(key(name), xwalk);
    }

    pub fn register_ingestion(&mut self, name: &str, xwalk: Arc<dyn IngestionCrosswalk>) {
        self.ingestion.insert(key(name), xwalk);
    }

    pub fn register_streaming_ingestion(
        &mut self,
        name: &str,
        xwalk: Arc<dyn StreamingIngestionCrosswalk>,
    ) {
        self.streaming_ingestion.insert(key(name), xwalk);
    }

    pub fn dissemination(&self, name: &str) -> CrosswalkResult<DisseminationHandle> {
        let k = key(name);
        if let Some(x) = self.dissemination.get(&k) {
            return Ok(DisseminationHandle::Document(Arc::clone(x)));
        }
        if let Some(x) = self.streaming_dissemination.get(&k) {
            return Ok(DisseminationHandle::Streaming(Arc::clone(x)));
        }
        Err(CrosswalkError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn ingestion(&self, name: &str) -> CrosswalkResult<IngestionHandle> {
        let k = key(name);
        if let Some(x) = self.ingestion.get(&k) {
            return Ok(IngestionHandle::Document(Arc::clone(x)));
        }
        if let Some(x) = self.streaming_ingestion.get(&k) {
            return Ok(IngestionHandle::Streaming(Arc::clone(x)));
        }
        Err(CrosswalkError::NotFound {
            name: name.to_string(),
        })
    }
}

fn sorted_keys<V: ?Sized>(m: &HashMap<String, Arc<V>>) -> Vec<&str> {
    let mut v: Vec<&str> = m.keys().map(String::as_str).collect();
    v.sort_unstable();
    v
}

impl std::fmt::Debug for CrosswalkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrosswalkRegistry")
            .field("dissemination", &sorted_keys(&self.dissemination))
            .field(
                "streaming_dissemination",
                &sorted_keys(&self.streaming_dissemination),
            )
            .field("ingestion", &sorted_keys(&self.ingestion))
            .field("streaming_ingestion", &sorted_keys(&self.streaming_ingestion))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosswalk::CrosswalkSubject;
    use std::io::Write;

    struct Doc;
    impl DisseminationCrosswalk for Doc {
        fn can_disseminate(&self, _: &CrosswalkSubject) -> bool {
            true
        }
        fn disseminate(&self, _: &CrosswalkSubject) -> CrosswalkResult<Value> {
            Ok(Value::Null)
        }
    }

    struct Stream;
    impl StreamingDisseminationCrosswalk for Stream {
        fn mime_type(&self) -> &str {
            "text/plain"
        }
        fn can_disseminate(&self, _: &CrosswalkSubject) -> bool {
            true
        }
        fn disseminate(&self, _: &CrosswalkSubject, out: &mut dyn Write) -> CrosswalkResult<()> {
            out.write_all(b"x")?;
            Ok(())
        }
    }

    #[test]
    fn whole_document_wins_over_streaming() {
        let mut registry = CrosswalkRegistry::new();
        registry.register_streaming_dissemination("dual", Arc::new(Stream));
        assert!(matches!(
            registry.dissemination("DUAL"),
            Ok(DisseminationHandle::Streaming(_))
        ));
        registry.register_dissemination("Dual", Arc::new(Doc));
        assert!(matches!(
            registry.dissemination("dual"),
            Ok(DisseminationHandle::Document(_))
        ));
    }

    #[test]
    fn missing_name_is_not_found() {
        let registry = CrosswalkRegistry::with_builtin();
        assert!(matches!(
            registry.dissemination("MARC"),
            Err(CrosswalkError::NotFound { .. })
        ));
        assert!(registry.ingestion("qdc").is_ok());
    }
}
