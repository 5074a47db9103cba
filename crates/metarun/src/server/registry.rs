//! # Handle Registry
//!
//! Maps session-scoped handle ids to live objects and keeps them alive while
//! a client may still name them.
//!
//! ## Invariants
//!
//! - **Identity**: one object inside one session maps to exactly one id while
//!   that id is live. Re-sending the same object bumps its reference count.
//! - **No Reuse**: each session counts its ids up from 1 and never hands one
//!   out twice, so every id below the counter was issued. A missing id below
//!   it was retired; anything at or above it was never issued.
//! - **Scoping**: an id only resolves inside the session that received it.
//! - **Bounded**: a session costs its live handles plus one counter. Nothing
//!   is remembered per retired handle.

use std::collections::HashMap;

use dashmap::DashMap;
use metarpc::HandleId;
use metarpc::SessionId;

use crate::server::value::ObjectRef;

/// Why a handle did not resolve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupError {
    /// Issued to this session once, since released.
    Retired(HandleId),
    /// Never issued to this session.
    NeverIssued(HandleId),
}

impl LookupError {
    pub fn id(&self) -> HandleId {
        match self {
            LookupError::Retired(id) | LookupError::NeverIssued(id) => *id,
        }
    }

    /// Suffix appended to missing-object messages.
    pub fn reason(&self) -> &'static str {
        match self {
            LookupError::Retired(_) => "released",
            LookupError::NeverIssued(_) => "never issued",
        }
    }
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote object {} was {}", self.id(), self.reason())
    }
}

impl std::error::Error for LookupError {}

/// The store behind every handle the server hands out.
///
/// Injected into the server so tests and embedders can observe or replace it.
pub trait HandleRegistry: Send + Sync {
    /// Returns the id for `object` in `session`, allocating one on first sight.
    fn allocate(&self, session: SessionId, object: &ObjectRef) -> HandleId;

    fn resolve(&self, session: SessionId, id: HandleId) -> Result<ObjectRef, LookupError>;

    /// Retires every live handle of `session`. Returns how many were retired.
    fn retire_session(&self, session: SessionId) -> usize;

    /// Drops `count` references to `id`, retiring it when none remain.
    fn retire_handle(&self, session: SessionId, id: HandleId, count: u64);

    /// Number of live handles held for `session`.
    fn live_count(&self, session: SessionId) -> usize;
}

struct Entry {
    object: ObjectRef,
    count: u64,
}

struct SessionTable {
    live: HashMap<HandleId, Entry>,
    by_identity: HashMap<usize, HandleId>,
    /// The next id to hand out.
    next: u64,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self { live: HashMap::new(), by_identity: HashMap::new(), next: 1 }
    }
}

impl SessionTable {
    fn retire(&mut self, id: HandleId) {
        if let Some(entry) = self.live.remove(&id) {
            self.by_identity.remove(&entry.object.addr());
        }
    }

    fn was_issued(&self, id: HandleId) -> bool {
        id.0 != 0 && id.0 < self.next
    }

    fn footprint(&self) -> usize {
        self.live.capacity() + self.by_identity.capacity()
    }
}

/// Default registry: one table per session behind a sharded map.
///
/// Allocation, lookup and release of one session serialize on its shard lock,
/// so releasing a session is atomic with respect to allocations for it.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionTable>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Map slots held for `session`, live or spare.
    pub fn footprint(&self, session: SessionId) -> usize {
        self.sessions.get(&session).map_or(0, |table| table.footprint())
    }
}

impl HandleRegistry for SessionRegistry {
    fn allocate(&self, session: SessionId, object: &ObjectRef) -> HandleId {
        let mut table = self.sessions.entry(session).or_default();
        if let Some(id) = table.by_identity.get(&object.addr()).copied() {
            if let Some(entry) = table.live.get_mut(&id) {
                entry.count += 1;
                return id;
            }
        }
        let id = HandleId(table.next);
        table.next += 1;
        table.by_identity.insert(object.addr(), id);
        table.live.insert(id, Entry { object: object.clone(), count: 1 });
        id
    }

    fn resolve(&self, session: SessionId, id: HandleId) -> Result<ObjectRef, LookupError> {
        let Some(table) = self.sessions.get(&session) else {
            return Err(LookupError::NeverIssued(id));
        };
        if let Some(entry) = table.live.get(&id) {
            return Ok(entry.object.clone());
        }
        if table.was_issued(id) {
            Err(LookupError::Retired(id))
        } else {
            Err(LookupError::NeverIssued(id))
        }
    }

    fn retire_session(&self, session: SessionId) -> usize {
        let Some(mut table) = self.sessions.get_mut(&session) else { return 0 };
        let ids: Vec<HandleId> = table.live.keys().copied().collect();
        for id in &ids {
            table.retire(*id);
        }
        table.live.shrink_to_fit();
        table.by_identity.shrink_to_fit();
        tracing::debug!(%session, retired = ids.len(), "session released");
        ids.len()
    }

    fn retire_handle(&self, session: SessionId, id: HandleId, count: u64) {
        let Some(mut table) = self.sessions.get_mut(&session) else { return };
        let Some(entry) = table.live.get_mut(&id) else { return };
        entry.count = entry.count.saturating_sub(count);
        if entry.count == 0 {
            table.retire(id);
        }
    }

    fn live_count(&self, session: SessionId) -> usize {
        self.sessions.get(&session).map_or(0, |table| table.live.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_object_same_id_within_session() {
        let registry = SessionRegistry::new();
        let window = ObjectRef::new("BrowserWindow");
        let a = registry.allocate(SessionId(1), &window);
        let b = registry.allocate(SessionId(1), &window);
        assert_eq!(a, b);
        assert!(registry.resolve(SessionId(1), a).unwrap().ptr_eq(&window));
    }

    #[test]
    fn test_sessions_do_not_share_handles() {
        let registry = SessionRegistry::new();
        let window = ObjectRef::new("BrowserWindow");
        let tray = ObjectRef::new("Tray");
        let a = registry.allocate(SessionId(1), &window);
        assert_eq!(registry.resolve(SessionId(2), a).unwrap_err(), LookupError::NeverIssued(a));

        // Each session counts its own ids; the same number names different objects.
        let b = registry.allocate(SessionId(2), &tray);
        assert_eq!(a, b);
        assert!(registry.resolve(SessionId(1), a).unwrap().ptr_eq(&window));
        assert!(registry.resolve(SessionId(2), b).unwrap().ptr_eq(&tray));
    }

    #[test]
    fn test_release_distinguishes_retired_from_never_issued() {
        let registry = SessionRegistry::new();
        let a = registry.allocate(SessionId(1), &ObjectRef::new("A"));
        let b = registry.allocate(SessionId(1), &ObjectRef::new("B"));

        assert_eq!(registry.retire_session(SessionId(1)), 2);
        assert_eq!(registry.live_count(SessionId(1)), 0);
        assert_eq!(registry.resolve(SessionId(1), a).unwrap_err(), LookupError::Retired(a));
        assert_eq!(registry.resolve(SessionId(1), b).unwrap_err(), LookupError::Retired(b));
        assert_eq!(
            registry.resolve(SessionId(1), HandleId(9_999)).unwrap_err(),
            LookupError::NeverIssued(HandleId(9_999))
        );
    }

    #[test]
    fn test_reallocation_after_release_gets_fresh_id() {
        let registry = SessionRegistry::new();
        let window = ObjectRef::new("BrowserWindow");
        let first = registry.allocate(SessionId(1), &window);
        registry.retire_session(SessionId(1));
        let second = registry.allocate(SessionId(1), &window);
        assert_ne!(first, second);
        assert!(registry.resolve(SessionId(1), second).is_ok());
    }

    #[test]
    fn test_dereference_counts() {
        let registry = SessionRegistry::new();
        let window = ObjectRef::new("BrowserWindow");
        let id = registry.allocate(SessionId(1), &window);
        registry.allocate(SessionId(1), &window);

        registry.retire_handle(SessionId(1), id, 1);
        assert!(registry.resolve(SessionId(1), id).is_ok());
        registry.retire_handle(SessionId(1), id, 1);
        assert_eq!(registry.resolve(SessionId(1), id).unwrap_err(), LookupError::Retired(id));

        assert_eq!(registry.resolve(SessionId(1), HandleId(0)).unwrap_err(), LookupError::NeverIssued(HandleId(0)));

        // Unknown ids and sessions are ignored.
        registry.retire_handle(SessionId(1), HandleId(77), 3);
        registry.retire_handle(SessionId(5), id, 1);
    }

    #[test]
    fn test_released_session_bookkeeping_shrinks() {
        let registry = SessionRegistry::new();
        let objects: Vec<ObjectRef> = (0..1_000).map(|_| ObjectRef::new("Menu")).collect();
        let ids: Vec<HandleId> = objects.iter().map(|o| registry.allocate(SessionId(1), o)).collect();
        assert!(registry.footprint(SessionId(1)) >= 2_000);

        assert_eq!(registry.retire_session(SessionId(1)), 1_000);
        assert_eq!(registry.footprint(SessionId(1)), 0);
        // Distinguishing retired ids needs no per-handle memory.
        for id in ids {
            assert_eq!(registry.resolve(SessionId(1), id).unwrap_err(), LookupError::Retired(id));
        }
        assert_eq!(
            registry.resolve(SessionId(1), HandleId(1_001)).unwrap_err(),
            LookupError::NeverIssued(HandleId(1_001))
        );
    }
}
