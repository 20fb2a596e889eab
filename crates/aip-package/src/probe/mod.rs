//! Lightweight archive classifier.
//!
//! Answers narrow questions about a package without parsing or validating the
//! whole manifest: does it carry our profile, which identifier, which parent,
//! when was it created. Every operation pulls JSON events one at a time and
//! stops at the first decisive event.

pub mod scan;

use crate::container::MANIFEST_PATH;
use crate::error::{ErrorCode, PackageError, PackageResult};
use crate::limits::{EintrReader, LimitReader, ReadLimits, LIMIT_TAG_CONTAINER, LIMIT_TAG_DECODE};
use crate::manifest::PARENT_LINK_TYPE;
use crate::model::identifier::strip_scheme;
use crate::params::{ContainerMode, PackageParams};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use scan::{path_is, path_starts_with, Event, JsonEvents, Seg};
use std::io::{BufRead, BufReader, Read};

/// Result of one probe scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    Found(T),
    /// Well-formed, but the decisive element is absent or does not match.
    NotFound,
    ParseError(String),
}

impl<T> ProbeOutcome<T> {
    /// `Found` becomes `Some`, `NotFound` becomes `None`, a parse error is a
    /// validation failure.
    pub fn into_result(self) -> PackageResult<Option<T>> {
        match self {
            Self::Found(v) => Ok(Some(v)),
            Self::NotFound => Ok(None),
            Self::ParseError(message) => Err(PackageError::validation(
                ErrorCode::ValidationMalformedManifest,
                message,
            )),
        }
    }
}

/// Decision after one event.
enum Step<T> {
    Continue,
    Found(T),
    RuledOut,
}

/// Root keys written ahead of everything else, in this order.
const LEADING_ROOT_KEYS: [&str; 3] = ["profile", "obj_id", "id"];

/// True at the first event of a root value whose key follows the leading keys.
/// Manifests write root keys in a fixed order, so `profile` and `obj_id` can no
/// longer appear.
fn past_leading_keys(path: &[Seg]) -> bool {
    match path {
        [key] => !LEADING_ROOT_KEYS.iter().any(|k| key.is_key(k)),
        _ => false,
    }
}

fn run_scan<R, T, F>(reader: R, limits: &ReadLimits, mut step: F) -> ProbeOutcome<T>
where
    R: BufRead,
    F: FnMut(&Event, &[Seg]) -> Step<T>,
{
    let mut events = JsonEvents::new(reader, limits.max_json_depth, limits.max_string_len);
    loop {
        match events.next_event() {
            Ok(Some(event)) => match step(&event, events.path()) {
                Step::Continue => {}
                Step::Found(v) => return ProbeOutcome::Found(v),
                Step::RuledOut => return ProbeOutcome::NotFound,
            },
            Ok(None) => return ProbeOutcome::NotFound,
            Err(e) => return ProbeOutcome::ParseError(e.to_string()),
        }
    }
}

/// Streaming classifier for one accepted profile.
#[derive(Debug, Clone)]
pub struct Probe {
    profile: String,
    limits: ReadLimits,
}

impl Probe {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            limits: ReadLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ReadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// True iff the root `profile` equals the accepted profile.
    pub fn probe<R: Read>(&self, input: R, params: &PackageParams) -> PackageResult<bool> {
        let expected = self.profile.as_str();
        let outcome = self.scan(input, params, |event, path| {
            if path.is_empty() {
                // Root value: anything but an object is not ours.
                return match event {
                    Event::StartObject => Step::Continue,
                    _ => Step::RuledOut,
                };
            }
            match event {
                Event::Str(v) if path_is(path, &["profile"]) => {
                    if v == expected {
                        Step::Found(())
                    } else {
                        Step::RuledOut
                    }
                }
                Event::Scalar(_) | Event::StartObject | Event::StartArray
                    if path_is(path, &["profile"]) =>
                {
                    Step::RuledOut
                }
                _ if past_leading_keys(path) => Step::RuledOut,
                _ => Step::Continue,
            }
        })?;
        Ok(outcome.into_result()?.is_some())
    }

    /// Root `obj_id` with the scheme stripped, if the profile matches.
    pub fn extract_identifier<R: Read>(
        &self,
        input: R,
        params: &PackageParams,
    ) -> PackageResult<Option<String>> {
        let expected = self.profile.as_str();
        let mut profile_ok = false;
        let mut obj_id: Option<String> = None;
        let outcome = self.scan(input, params, |event, path| {
            if path.is_empty() {
                return match event {
                    Event::StartObject => Step::Continue,
                    _ => Step::RuledOut,
                };
            }
            match event {
                Event::Str(v) if path_is(path, &["profile"]) => {
                    if v != expected {
                        return Step::RuledOut;
                    }
                    profile_ok = true;
                    match obj_id.take() {
                        Some(id) => Step::Found(strip_scheme(&id).to_string()),
                        None => Step::Continue,
                    }
                }
                Event::Str(v) if path_is(path, &["obj_id"]) => {
                    if profile_ok {
                        Step::Found(strip_scheme(v).to_string())
                    } else {
                        obj_id = Some(v.clone());
                        Step::Continue
                    }
                }
                Event::Scalar(_) | Event::StartObject | Event::StartArray
                    if path_is(path, &["profile"]) =>
                {
                    Step::RuledOut
                }
                _ if past_leading_keys(path) => Step::RuledOut,
                _ => Step::Continue,
            }
        })?;
        outcome.into_result()
    }

    /// Parent identifier from the parent-link div, scheme stripped.
    pub fn extract_parent_identifier<R: Read>(
        &self,
        input: R,
        params: &PackageParams,
    ) -> PackageResult<Option<String>> {
        let mut frames: Vec<DivFrame> = Vec::new();
        let outcome = self.scan(input, params, |event, path| {
            if !path_starts_with(path, &["struct_map"]) {
                return Step::Continue;
            }
            let depth = path.len();
            match event {
                Event::StartObject => {
                    frames.push(DivFrame::new(depth));
                    Step::Continue
                }
                Event::Str(v) => {
                    if let Some(frame) = frames.last_mut().filter(|f| f.depth + 1 == depth) {
                        match path.last() {
                            Some(s) if s.is_key("type") => frame.type_ = Some(v.clone()),
                            Some(s) if s.is_key("loctype") => frame.loctype = Some(v.clone()),
                            Some(s) if s.is_key("href") => frame.href = Some(v.clone()),
                            _ => {}
                        }
                    }
                    Step::Continue
                }
                Event::EndObject if depth == 1 => Step::RuledOut,
                Event::EndObject => {
                    let Some(frame) = frames.pop() else {
                        return Step::Continue;
                    };
                    if frame.loctype.as_deref() == Some("HANDLE") {
                        if let (Some(href), Some(owner)) = (frame.href.clone(), frames.last_mut()) {
                            owner.handle.get_or_insert(href);
                        }
                    }
                    match (frame.type_.as_deref(), frame.handle) {
                        (Some(PARENT_LINK_TYPE), Some(handle)) => {
                            Step::Found(strip_scheme(&handle).to_string())
                        }
                        _ => Step::Continue,
                    }
                }
                _ => Step::Continue,
            }
        })?;
        outcome.into_result()
    }

    /// Header `created_at`.
    pub fn extract_create_date<R: Read>(
        &self,
        input: R,
        params: &PackageParams,
    ) -> PackageResult<Option<DateTime<Utc>>> {
        let outcome = self.scan(input, params, |event, path| match event {
            Event::Str(v) if path_is(path, &["header", "created_at"]) => {
                match DateTime::parse_from_rfc3339(v) {
                    Ok(dt) => Step::Found(Ok(dt.with_timezone(&Utc))),
                    Err(e) => Step::Found(Err(format!("invalid created_at '{}': {}", v, e))),
                }
            }
            Event::EndObject if path_is(path, &["header"]) => Step::RuledOut,
            _ => Step::Continue,
        })?;
        match outcome {
            ProbeOutcome::Found(Ok(dt)) => Ok(Some(dt)),
            ProbeOutcome::Found(Err(message)) => Err(PackageError::validation(
                ErrorCode::ValidationMalformedManifest,
                message,
            )),
            ProbeOutcome::NotFound => Ok(None),
            ProbeOutcome::ParseError(message) => Err(PackageError::validation(
                ErrorCode::ValidationMalformedManifest,
                message,
            )),
        }
    }

    /// Scan a bare manifest, or the first entry of a full container.
    fn scan<R, T, F>(&self, input: R, params: &PackageParams, step: F) -> PackageResult<ProbeOutcome<T>>
    where
        R: Read,
        F: FnMut(&Event, &[Seg]) -> Step<T>,
    {
        let input = LimitReader::new(
            EintrReader::new(input),
            self.limits.max_container_bytes,
            LIMIT_TAG_CONTAINER,
        );
        match params.mode() {
            ContainerMode::Full => {
                let decoder = LimitReader::new(
                    GzDecoder::new(input),
                    self.limits.max_decode_bytes,
                    LIMIT_TAG_DECODE,
                );
                let mut archive = tar::Archive::new(decoder);
                let mut entries = match archive.entries() {
                    Ok(entries) => entries,
                    Err(e) => return Ok(ProbeOutcome::ParseError(e.to_string())),
                };
                let entry = match entries.next() {
                    Some(Ok(entry)) => entry,
                    Some(Err(e)) => return Ok(ProbeOutcome::ParseError(e.to_string())),
                    None => return Ok(ProbeOutcome::NotFound),
                };
                let is_manifest = entry
                    .path()
                    .map(|p| p.to_str() == Some(MANIFEST_PATH))
                    .unwrap_or(false);
                if !is_manifest {
                    return Ok(ProbeOutcome::NotFound);
                }
                Ok(run_scan(BufReader::new(entry), &self.limits, step))
            }
            ContainerMode::ManifestOnly | ContainerMode::Internal => {
                Ok(run_scan(BufReader::new(input), &self.limits, step))
            }
        }
    }
}

/// Object being tracked while looking for the parent-link div.
struct DivFrame {
    depth: usize,
    type_: Option<String>,
    loctype: Option<String>,
    href: Option<String>,
    /// First persistent-identifier mptr found directly under this object.
    handle: Option<String>,
}

impl DivFrame {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            type_: None,
            loctype: None,
            href: None,
            handle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bare() -> PackageParams {
        PackageParams::new().manifest_only()
    }

    #[test]
    fn probe_matches_profile_only() {
        let probe = Probe::new("AIP-1.0");
        let ours = br#"{"profile":"AIP-1.0","obj_id":"urn:example/42"}"#;
        let theirs = br#"{"profile":"DSPACE-SIP","obj_id":"urn:example/42"}"#;
        let none = br#"{"obj_id":"urn:example/42"}"#;
        assert!(probe.probe(Cursor::new(&ours[..]), &bare()).unwrap());
        assert!(!probe.probe(Cursor::new(&theirs[..]), &bare()).unwrap());
        assert!(!probe.probe(Cursor::new(&none[..]), &bare()).unwrap());
        assert!(!probe.probe(Cursor::new(&b"[1,2]"[..]), &bare()).unwrap());
    }

    #[test]
    fn probe_rejects_malformed_input() {
        let probe = Probe::new("AIP-1.0");
        let err = probe.probe(Cursor::new(&b"{\"obj_id\" 1"[..]), &bare()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn later_root_key_ends_the_scan() {
        let probe = Probe::new("AIP-1.0");
        // Truncated after a key that follows `profile`; reading on would be a parse error.
        let no_profile = br#"{"obj_id":"urn:example/42","type":"CONTENT","rest":{"never":"#;
        assert!(!probe.probe(Cursor::new(&no_profile[..]), &bare()).unwrap());
        assert_eq!(
            probe
                .extract_identifier(Cursor::new(&no_profile[..]), &bare())
                .unwrap(),
            None
        );
        let no_obj_id = br#"{"profile":"AIP-1.0","id":"m","label":"x","rest":["#;
        assert_eq!(
            probe
                .extract_identifier(Cursor::new(&no_obj_id[..]), &bare())
                .unwrap(),
            None
        );
    }

    #[test]
    fn identifier_waits_for_profile() {
        let probe = Probe::new("AIP-1.0");
        let reordered = br#"{"obj_id":"urn:example/42","profile":"AIP-1.0"}"#;
        assert_eq!(
            probe
                .extract_identifier(Cursor::new(&reordered[..]), &bare())
                .unwrap()
                .as_deref(),
            Some("example/42")
        );
    }

    #[test]
    fn parent_identifier_from_link_div() {
        let probe = Probe::new("AIP-1.0");
        let doc = br#"{"profile":"AIP-1.0","obj_id":"urn:x/2","id":"m","type":"CONTENT",
            "struct_map":{"root":{"type":"CONTENT","divs":[
                {"mptrs":[{"loctype":"HANDLE","href":"urn:x/9"}]},
                {"mptrs":[{"loctype":"URL","href":"http://x"},{"loctype":"HANDLE","href":"urn:x/1"}],
                 "type":"AIP Parent Link"}]}}}"#;
        assert_eq!(
            probe
                .extract_parent_identifier(Cursor::new(&doc[..]), &bare())
                .unwrap()
                .as_deref(),
            Some("x/1")
        );
        let no_link = br#"{"profile":"AIP-1.0","struct_map":{"root":{}}}"#;
        assert_eq!(
            probe
                .extract_parent_identifier(Cursor::new(&no_link[..]), &bare())
                .unwrap(),
            None
        );
    }

    #[test]
    fn create_date_from_header() {
        let probe = Probe::new("AIP-1.0");
        let doc = br#"{"profile":"AIP-1.0","header":{"note":"n","created_at":"2024-05-01T12:00:00Z"}}"#;
        let date = probe
            .extract_create_date(Cursor::new(&doc[..]), &bare())
            .unwrap()
            .unwrap();
        assert_eq!(date.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        let no_date = br#"{"profile":"AIP-1.0","header":{"note":"n"},"rest":{"never":"read"#;
        assert_eq!(
            probe
                .extract_create_date(Cursor::new(&no_date[..]), &bare())
                .unwrap(),
            None
        );
    }
}
