//! In-memory implementation of the collaborator contracts.
//!
//! Backs the test-suite and embedders that want a self-contained store.
//! Authorization rules enforced here:
//! - `create_object` needs `Add` on the parent
//! - `create_payload` needs `Write` on [`PolicyTarget::Unattached`]
//! - `open_payload` / `copy_payload` need `Read` on attached payloads
//!
//! Groups inherit their object's policies on creation and payloads inherit
//! their group's policies when attached without policies of their own.

use super::identifier::IdentifierResolver;
use super::policy::{AccessPolicy, Action, AuthSession, PolicyEngine, PolicyTarget, Principal};
use super::store::{EntityStore, PayloadUpdate, StoreError, StoreResult};
use super::{
    ArchivalObject, Checksum, ChecksumAlgorithm, GroupId, MetadataField, ObjectId, ObjectKind,
    Payload, PayloadGroup, PayloadId,
};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const LOCATOR_SCHEME: &str = "mem";
const LOCATOR_HOST: &str = "payloads";

#[derive(Default)]
struct State {
    objects: HashMap<ObjectId, ArchivalObject>,
    groups: HashMap<GroupId, PayloadGroup>,
    payloads: HashMap<PayloadId, (Payload, Arc<Vec<u8>>)>,
    policies: HashMap<PolicyTarget, Vec<AccessPolicy>>,
    identifiers: BTreeMap<String, ObjectId>,
    minted: u64,
}

/// Entity store, policy engine and identifier resolver held in one mutex.
pub struct InMemoryRepository {
    state: Mutex<State>,
    identifier_prefix: String,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::with_identifier_prefix("123456789")
    }

    /// Minted identifiers look like `<prefix>/<n>`.
    pub fn with_identifier_prefix(prefix: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            identifier_prefix: prefix.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an installed object directly (bootstrap, no authorization).
    pub fn insert_object(
        &self,
        kind: ObjectKind,
        parent: Option<ObjectId>,
        identifier: Option<&str>,
    ) -> ObjectId {
        let id = ObjectId::new_v4();
        let mut state = self.lock();
        if let Some(parent) = parent {
            if let Some(p) = state.objects.get_mut(&parent) {
                p.children.push(id);
            }
        }
        if let Some(identifier) = identifier {
            state.identifiers.insert(identifier.to_string(), id);
        }
        state.objects.insert(
            id,
            ArchivalObject {
                id,
                kind,
                identifier: identifier.map(String::from),
                parent,
                metadata: Vec::new(),
                groups: Vec::new(),
                children: Vec::new(),
                logo: None,
                installed: true,
            },
        );
        id
    }

    /// Append metadata directly (bootstrap, no authorization).
    pub fn insert_metadata(&self, object: ObjectId, fields: impl IntoIterator<Item = MetadataField>) {
        if let Some(o) = self.lock().objects.get_mut(&object) {
            o.metadata.extend(fields);
        }
    }

    /// Insert a group directly (bootstrap, no authorization).
    pub fn insert_group(&self, object: ObjectId, name: &str) -> GroupId {
        let id = GroupId::new_v4();
        let mut state = self.lock();
        if let Some(o) = state.objects.get_mut(&object) {
            o.groups.push(id);
        }
        state.groups.insert(
            id,
            PayloadGroup {
                id,
                object,
                name: name.to_string(),
                primary: None,
                payloads: Vec::new(),
            },
        );
        id
    }

    /// Insert an attached payload directly (bootstrap, no authorization).
    pub fn insert_payload(
        &self,
        group: GroupId,
        name: &str,
        format: Option<&str>,
        bytes: &[u8],
    ) -> PayloadId {
        let id = PayloadId::new_v4();
        let mut state = self.lock();
        let sequence = state.payloads.len() as u32 + 1;
        if let Some(g) = state.groups.get_mut(&group) {
            g.payloads.push(id);
        }
        state.payloads.insert(
            id,
            (
                Payload {
                    id,
                    name: Some(name.to_string()),
                    source: None,
                    description: None,
                    size: bytes.len() as u64,
                    checksum: Some(Checksum::compute(ChecksumAlgorithm::Md5, bytes)),
                    format: format.map(String::from),
                    sequence: Some(sequence),
                    derived_from: None,
                    group: Some(group),
                },
                Arc::new(bytes.to_vec()),
            ),
        );
        id
    }

    /// Insert an unattached payload to serve as a container logo.
    pub fn insert_logo(&self, object: ObjectId, format: &str, bytes: &[u8]) -> PayloadId {
        let id = PayloadId::new_v4();
        let mut state = self.lock();
        state.payloads.insert(
            id,
            (
                Payload {
                    id,
                    name: Some("logo".to_string()),
                    source: None,
                    description: None,
                    size: bytes.len() as u64,
                    checksum: Some(Checksum::compute(ChecksumAlgorithm::Md5, bytes)),
                    format: Some(format.to_string()),
                    sequence: None,
                    derived_from: None,
                    group: None,
                },
                Arc::new(bytes.to_vec()),
            ),
        );
        if let Some(o) = state.objects.get_mut(&object) {
            o.logo = Some(id);
        }
        id
    }

    pub fn set_primary_direct(&self, group: GroupId, payload: PayloadId) {
        if let Some(g) = self.lock().groups.get_mut(&group) {
            g.primary = Some(payload);
        }
    }

    pub fn set_derived_direct(&self, payload: PayloadId, source: PayloadId) {
        if let Some((p, _)) = self.lock().payloads.get_mut(&payload) {
            p.derived_from = Some(source);
        }
    }

    /// Add a policy directly.
    pub fn grant(&self, target: PolicyTarget, policy: AccessPolicy) {
        self.lock().policies.entry(target).or_default().push(policy);
    }

    /// Number of payloads held, attached or not.
    pub fn payload_count(&self) -> usize {
        self.lock().payloads.len()
    }

    /// Number of payloads not in any group and not used as a logo.
    pub fn unattached_payload_count(&self) -> usize {
        let state = self.lock();
        state
            .payloads
            .values()
            .filter(|(p, _)| p.group.is_none())
            .filter(|(p, _)| !state.objects.values().any(|o| o.logo == Some(p.id)))
            .count()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Raw bytes of a payload (test helper, no authorization).
    pub fn payload_bytes(&self, payload: PayloadId) -> Option<Vec<u8>> {
        self.lock()
            .payloads
            .get(&payload)
            .map(|(_, bytes)| bytes.as_ref().clone())
    }

    fn check(session: &AuthSession, target: PolicyTarget, action: Action) -> StoreResult<()> {
        if session.is_authorized(target, action) {
            Ok(())
        } else {
            Err(StoreError::AccessDenied {
                message: format!(
                    "{} may not {:?} {}",
                    session.principal().name,
                    action,
                    target
                ),
            })
        }
    }

    fn new_unattached(state: &mut State, data: Vec<u8>) -> PayloadId {
        let id = PayloadId::new_v4();
        let payload = Payload {
            id,
            name: None,
            source: None,
            description: None,
            size: data.len() as u64,
            checksum: Some(Checksum::compute(ChecksumAlgorithm::Md5, &data)),
            format: None,
            sequence: None,
            derived_from: None,
            group: None,
        };
        state.payloads.insert(id, (payload, Arc::new(data)));
        id
    }

    fn remove_payload(state: &mut State, payload: PayloadId) {
        if let Some((p, _)) = state.payloads.remove(&payload) {
            if let Some(g) = p.group.and_then(|g| state.groups.get_mut(&g)) {
                g.payloads.retain(|id| *id != payload);
                if g.primary == Some(payload) {
                    g.primary = None;
                }
            }
        }
        state.policies.remove(&PolicyTarget::Payload(payload));
    }
}

fn policy_active(policy: &AccessPolicy) -> bool {
    let today = chrono::Utc::now().date_naive();
    policy.start_date.is_none_or(|start| start <= today)
        && policy.end_date.is_none_or(|end| today <= end)
}

impl PolicyEngine for InMemoryRepository {
    fn is_authorized(&self, principal: &Principal, target: PolicyTarget, action: Action) -> bool {
        if principal.admin {
            return true;
        }
        let state = self.lock();
        state.policies.get(&target).is_some_and(|policies| {
            policies.iter().any(|p| {
                (p.action == action || p.action == Action::Admin)
                    && principal.is_named(&p.principal)
                    && policy_active(p)
            })
        })
    }

    fn inherit_policies(&self, from: PolicyTarget, to: PolicyTarget) -> StoreResult<()> {
        let mut state = self.lock();
        let inherited = state.policies.get(&from).cloned().unwrap_or_default();
        state.policies.entry(to).or_default().extend(inherited);
        Ok(())
    }

    fn policies(&self, target: PolicyTarget) -> Vec<AccessPolicy> {
        self.lock().policies.get(&target).cloned().unwrap_or_default()
    }

    fn replace_policies(&self, target: PolicyTarget, policies: Vec<AccessPolicy>) -> StoreResult<()> {
        self.lock().policies.insert(target, policies);
        Ok(())
    }
}

impl IdentifierResolver for InMemoryRepository {
    fn resolve(&self, identifier: &str) -> Option<ObjectId> {
        self.lock().identifiers.get(identifier).copied()
    }

    fn identifier_of(&self, object: ObjectId) -> Option<String> {
        self.lock()
            .objects
            .get(&object)
            .and_then(|o| o.identifier.clone())
    }

    fn register(&self, identifier: &str, object: ObjectId) -> StoreResult<()> {
        let mut state = self.lock();
        match state.identifiers.get(identifier) {
            Some(existing) if *existing != object => {
                return Err(StoreError::AlreadyExists {
                    what: format!("identifier {}", identifier),
                })
            }
            _ => {}
        }
        let o = state
            .objects
            .get_mut(&object)
            .ok_or_else(|| StoreError::not_found("object", object))?;
        o.identifier = Some(identifier.to_string());
        state.identifiers.insert(identifier.to_string(), object);
        Ok(())
    }

    fn unregister(&self, identifier: &str) -> StoreResult<()> {
        let mut state = self.lock();
        if let Some(object) = state.identifiers.remove(identifier) {
            if let Some(o) = state.objects.get_mut(&object) {
                o.identifier = None;
            }
        }
        Ok(())
    }

    fn mint(&self, object: ObjectId) -> StoreResult<String> {
        let identifier = {
            let mut state = self.lock();
            loop {
                state.minted += 1;
                let candidate = format!("{}/{}", self.identifier_prefix, state.minted);
                if !state.identifiers.contains_key(&candidate) {
                    break candidate;
                }
            }
        };
        self.register(&identifier, object)?;
        Ok(identifier)
    }
}

impl EntityStore for InMemoryRepository {
    fn object(&self, id: ObjectId) -> StoreResult<ArchivalObject> {
        self.lock()
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("object", id))
    }

    fn create_object(
        &self,
        session: &AuthSession,
        kind: ObjectKind,
        parent: ObjectId,
    ) -> StoreResult<ObjectId> {
        Self::check(session, PolicyTarget::Object(parent), Action::Add)?;
        let id = ObjectId::new_v4();
        let mut state = self.lock();
        let p = state
            .objects
            .get_mut(&parent)
            .ok_or_else(|| StoreError::not_found("object", parent))?;
        if p.kind != ObjectKind::Container {
            return Err(StoreError::Invalid {
                message: format!("parent {} is not a container", parent),
            });
        }
        p.children.push(id);
        state.objects.insert(
            id,
            ArchivalObject {
                id,
                kind,
                identifier: None,
                parent: Some(parent),
                metadata: Vec::new(),
                groups: Vec::new(),
                children: Vec::new(),
                logo: None,
                installed: false,
            },
        );
        Ok(id)
    }

    fn set_identifier(
        &self,
        _session: &AuthSession,
        object: ObjectId,
        identifier: Option<String>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let o = state
            .objects
            .get_mut(&object)
            .ok_or_else(|| StoreError::not_found("object", object))?;
        o.identifier = identifier;
        Ok(())
    }

    fn add_metadata(
        &self,
        _session: &AuthSession,
        object: ObjectId,
        fields: Vec<MetadataField>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let o = state
            .objects
            .get_mut(&object)
            .ok_or_else(|| StoreError::not_found("object", object))?;
        o.metadata.extend(fields);
        Ok(())
    }

    fn delete_object(&self, _session: &AuthSession, object: ObjectId) -> StoreResult<()> {
        let mut state = self.lock();
        let o = state
            .objects
            .remove(&object)
            .ok_or_else(|| StoreError::not_found("object", object))?;
        for group in &o.groups {
            if let Some(g) = state.groups.remove(group) {
                for payload in g.payloads {
                    Self::remove_payload(&mut state, payload);
                }
            }
            state.policies.remove(&PolicyTarget::Group(*group));
        }
        if let Some(logo) = o.logo {
            Self::remove_payload(&mut state, logo);
        }
        if let Some(p) = o.parent.and_then(|p| state.objects.get_mut(&p)) {
            p.children.retain(|c| *c != object);
        }
        state.identifiers.retain(|_, id| *id != object);
        state.policies.remove(&PolicyTarget::Object(object));
        Ok(())
    }

    fn install(&self, _session: &AuthSession, object: ObjectId) -> StoreResult<()> {
        let mut state = self.lock();
        let o = state
            .objects
            .get_mut(&object)
            .ok_or_else(|| StoreError::not_found("object", object))?;
        o.installed = true;
        Ok(())
    }

    fn group(&self, id: GroupId) -> StoreResult<PayloadGroup> {
        self.lock()
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("group", id))
    }

    fn create_group(
        &self,
        _session: &AuthSession,
        object: ObjectId,
        name: &str,
    ) -> StoreResult<GroupId> {
        let id = GroupId::new_v4();
        {
            let mut state = self.lock();
            let o = state
                .objects
                .get(&object)
                .ok_or_else(|| StoreError::not_found("object", object))?;
            if o.kind != ObjectKind::Content {
                return Err(StoreError::Invalid {
                    message: format!("object {} cannot hold payload groups", object),
                });
            }
            let taken = o
                .groups
                .iter()
                .filter_map(|g| state.groups.get(g))
                .any(|g| g.name == name);
            if taken {
                return Err(StoreError::AlreadyExists {
                    what: format!("group {} on {}", name, object),
                });
            }
            state.groups.insert(
                id,
                PayloadGroup {
                    id,
                    object,
                    name: name.to_string(),
                    primary: None,
                    payloads: Vec::new(),
                },
            );
            if let Some(o) = state.objects.get_mut(&object) {
                o.groups.push(id);
            }
        }
        self.inherit_policies(PolicyTarget::Object(object), PolicyTarget::Group(id))?;
        Ok(id)
    }

    fn set_primary(
        &self,
        _session: &AuthSession,
        group: GroupId,
        payload: Option<PayloadId>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let g = state
            .groups
            .get_mut(&group)
            .ok_or_else(|| StoreError::not_found("group", group))?;
        if let Some(p) = payload {
            if !g.payloads.contains(&p) {
                return Err(StoreError::Invalid {
                    message: format!("payload {} is not in group {}", p, group),
                });
            }
        }
        g.primary = payload;
        Ok(())
    }

    fn payload(&self, id: PayloadId) -> StoreResult<Payload> {
        self.lock()
            .payloads
            .get(&id)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| StoreError::not_found("payload", id))
    }

    fn create_payload(&self, session: &AuthSession, data: &mut dyn Read) -> StoreResult<PayloadId> {
        Self::check(session, PolicyTarget::Unattached, Action::Write)?;
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        Ok(Self::new_unattached(&mut self.lock(), bytes))
    }

    fn copy_payload(&self, session: &AuthSession, source: PayloadId) -> StoreResult<PayloadId> {
        let (meta, bytes) = {
            let state = self.lock();
            let (p, bytes) = state
                .payloads
                .get(&source)
                .ok_or_else(|| StoreError::not_found("payload", source))?;
            (p.clone(), Arc::clone(bytes))
        };
        if meta.group.is_some() {
            Self::check(session, PolicyTarget::Payload(source), Action::Read)?;
        }
        Ok(Self::new_unattached(&mut self.lock(), bytes.as_ref().clone()))
    }

    fn update_payload(
        &self,
        _session: &AuthSession,
        payload: PayloadId,
        update: PayloadUpdate,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let (p, _) = state
            .payloads
            .get_mut(&payload)
            .ok_or_else(|| StoreError::not_found("payload", payload))?;
        if update.name.is_some() {
            p.name = update.name;
        }
        if update.source.is_some() {
            p.source = update.source;
        }
        if update.description.is_some() {
            p.description = update.description;
        }
        if update.format.is_some() {
            p.format = update.format;
        }
        if update.sequence.is_some() {
            p.sequence = update.sequence;
        }
        if update.derived_from.is_some() {
            p.derived_from = update.derived_from;
        }
        Ok(())
    }

    fn attach_payload(
        &self,
        _session: &AuthSession,
        group: GroupId,
        payload: PayloadId,
    ) -> StoreResult<()> {
        {
            let mut state = self.lock();
            if !state.groups.contains_key(&group) {
                return Err(StoreError::not_found("group", group));
            }
            let (p, _) = state
                .payloads
                .get_mut(&payload)
                .ok_or_else(|| StoreError::not_found("payload", payload))?;
            if p.group.is_some() {
                return Err(StoreError::Invalid {
                    message: format!("payload {} is already attached", payload),
                });
            }
            p.group = Some(group);
            if let Some(g) = state.groups.get_mut(&group) {
                g.payloads.push(payload);
            }
        }
        if self.policies(PolicyTarget::Payload(payload)).is_empty() {
            self.inherit_policies(PolicyTarget::Group(group), PolicyTarget::Payload(payload))?;
        }
        Ok(())
    }

    fn delete_payload(&self, _session: &AuthSession, payload: PayloadId) -> StoreResult<()> {
        let mut state = self.lock();
        if !state.payloads.contains_key(&payload) {
            return Err(StoreError::not_found("payload", payload));
        }
        Self::remove_payload(&mut state, payload);
        Ok(())
    }

    fn open_payload(
        &self,
        session: &AuthSession,
        payload: PayloadId,
    ) -> StoreResult<Box<dyn Read + Send>> {
        let (attached, bytes) = {
            let state = self.lock();
            let (p, bytes) = state
                .payloads
                .get(&payload)
                .ok_or_else(|| StoreError::not_found("payload", payload))?;
            (p.group.is_some(), Arc::clone(bytes))
        };
        if attached {
            Self::check(session, PolicyTarget::Payload(payload), Action::Read)?;
        }
        Ok(Box::new(Cursor::new(SharedBytes(bytes))))
    }

    fn compute_checksum(
        &self,
        payload: PayloadId,
        algorithm: ChecksumAlgorithm,
    ) -> StoreResult<Checksum> {
        let state = self.lock();
        let (p, bytes) = state
            .payloads
            .get(&payload)
            .ok_or_else(|| StoreError::not_found("payload", payload))?;
        match &p.checksum {
            Some(c) if c.algorithm == algorithm => Ok(c.clone()),
            _ => Ok(Checksum::compute(algorithm, bytes)),
        }
    }

    fn set_logo(
        &self,
        _session: &AuthSession,
        object: ObjectId,
        payload: Option<PayloadId>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        if let Some(p) = payload {
            if !state.payloads.contains_key(&p) {
                return Err(StoreError::not_found("payload", p));
            }
        }
        let o = state
            .objects
            .get_mut(&object)
            .ok_or_else(|| StoreError::not_found("object", object))?;
        if o.kind != ObjectKind::Container {
            return Err(StoreError::Invalid {
                message: format!("object {} cannot carry a logo", object),
            });
        }
        o.logo = payload;
        Ok(())
    }

    fn payload_locator(&self, payload: PayloadId) -> String {
        format!("{}://{}/{}", LOCATOR_SCHEME, LOCATOR_HOST, payload)
    }

    fn find_payload_by_locator(&self, locator: &str) -> StoreResult<Option<PayloadId>> {
        let Ok(url) = url::Url::parse(locator) else {
            return Ok(None);
        };
        if url.scheme() != LOCATOR_SCHEME || url.host_str() != Some(LOCATOR_HOST) {
            return Ok(None);
        }
        let Ok(uuid) = uuid::Uuid::parse_str(url.path().trim_start_matches('/')) else {
            return Ok(None);
        };
        let id = PayloadId(uuid);
        Ok(self.lock().payloads.contains_key(&id).then_some(id))
    }
}

/// Cheaply clonable byte buffer usable with `Cursor`.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(repo: &Arc<InMemoryRepository>, principal: Principal) -> AuthSession {
        AuthSession::new(principal, Arc::clone(repo) as Arc<dyn PolicyEngine>)
    }

    #[test]
    fn create_object_requires_add_on_parent() {
        let repo = Arc::new(InMemoryRepository::new());
        let root = repo.insert_object(ObjectKind::Container, None, Some("123456789/0"));
        let alice = session(&repo, Principal::new("alice"));

        let err = repo
            .create_object(&alice, ObjectKind::Content, root)
            .unwrap_err();
        assert!(err.is_access_denied());

        repo.grant(PolicyTarget::Object(root), AccessPolicy::new(Action::Add, "alice"));
        let id = repo.create_object(&alice, ObjectKind::Content, root).unwrap();
        assert!(!repo.object(id).unwrap().installed);
        assert!(repo.object(root).unwrap().children.contains(&id));
    }

    #[test]
    fn staging_requires_elevation_for_plain_principal() {
        let repo = Arc::new(InMemoryRepository::new());
        let alice = session(&repo, Principal::new("alice"));
        let err = repo
            .create_payload(&alice, &mut Cursor::new(b"abc".to_vec()))
            .unwrap_err();
        assert!(err.is_access_denied());

        let _guard = alice.elevate();
        let id = repo
            .create_payload(&alice, &mut Cursor::new(b"abc".to_vec()))
            .unwrap();
        let payload = repo.payload(id).unwrap();
        assert_eq!(payload.size, 3);
        assert_eq!(
            payload.checksum.unwrap().value,
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn locator_round_trip() {
        let repo = InMemoryRepository::new();
        let root = repo.insert_object(ObjectKind::Container, None, None);
        let item = repo.insert_object(ObjectKind::Content, Some(root), None);
        let group = repo.insert_group(item, "ORIGINAL");
        let payload = repo.insert_payload(group, "a.txt", Some("text/plain"), b"hello");
        let locator = repo.payload_locator(payload);
        assert_eq!(repo.find_payload_by_locator(&locator).unwrap(), Some(payload));
        assert_eq!(repo.find_payload_by_locator("file:///etc/passwd").unwrap(), None);
    }

    #[test]
    fn delete_object_cascades() {
        let repo = Arc::new(InMemoryRepository::new());
        let admin = session(&repo, Principal::admin("root"));
        let root = repo.insert_object(ObjectKind::Container, None, None);
        let item = repo.create_object(&admin, ObjectKind::Content, root).unwrap();
        repo.register("123456789/77", item).unwrap();
        let group = repo.create_group(&admin, item, "ORIGINAL").unwrap();
        let payload = repo
            .create_payload(&admin, &mut Cursor::new(b"x".to_vec()))
            .unwrap();
        repo.attach_payload(&admin, group, payload).unwrap();

        repo.delete_object(&admin, item).unwrap();
        assert!(repo.payload(payload).unwrap_err().is_not_found());
        assert!(repo.group(group).unwrap_err().is_not_found());
        assert_eq!(repo.resolve("123456789/77"), None);
        assert!(repo.object(root).unwrap().children.is_empty());
    }

    #[test]
    fn register_rejects_identifier_bound_elsewhere() {
        let repo = InMemoryRepository::new();
        let a = repo.insert_object(ObjectKind::Container, None, Some("x/1"));
        let b = repo.insert_object(ObjectKind::Container, None, None);
        assert!(repo.register("x/1", a).is_ok());
        assert!(matches!(
            repo.register("x/1", b),
            Err(StoreError::AlreadyExists { .. })
        ));
        let minted = repo.mint(b).unwrap();
        assert_eq!(repo.resolve(&minted), Some(b));
    }

    #[test]
    fn attached_payload_inherits_group_policies() {
        let repo = Arc::new(InMemoryRepository::new());
        let admin = session(&repo, Principal::admin("root"));
        let root = repo.insert_object(ObjectKind::Container, None, None);
        let item = repo.create_object(&admin, ObjectKind::Content, root).unwrap();
        repo.grant(PolicyTarget::Object(item), AccessPolicy::new(Action::Read, "Anonymous"));
        let group = repo.create_group(&admin, item, "ORIGINAL").unwrap();
        let payload = repo
            .create_payload(&admin, &mut Cursor::new(b"x".to_vec()))
            .unwrap();
        repo.attach_payload(&admin, group, payload).unwrap();
        assert!(repo.is_authorized(
            &Principal::anonymous(),
            PolicyTarget::Payload(payload),
            Action::Read
        ));
    }
}
