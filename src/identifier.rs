//! Stable integer identifiers ([Nid]) and the UUID <-> nid mapping service.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{Display, Formatter},
    str::FromStr,
    sync::atomic::{AtomicI32, Ordering},
};
pub use uuid::Uuid;

use crate::{error::KometError, metadata::METADATA};

/// The komet namespace UUID. Name-based component UUIDs are generated as v5 UUIDs within this
/// namespace so that the same name always maps to the same component.
pub const UUID_NAMESPACE_KOMET: Uuid = Uuid::from_bytes([
    0x8d, 0x1e, 0x4f, 0x20, 0x53, 0x3b, 0x4c, 0x6a, 0x9e, 0x02, 0x7a, 0x51, 0xc4, 0x0f, 0x2b, 0x91,
]);

/// First nid handed out to non-metadata components. Everything below is reserved for the
/// metadata registry.
pub const FIRST_DYNAMIC_NID: i32 = 1_000;

/// Create a deterministic [Uuid::new_v5] from a name within [UUID_NAMESPACE_KOMET].
pub fn uuid_from_name(name: &str) -> Uuid {
    Uuid::new_v5(&UUID_NAMESPACE_KOMET, name.as_bytes())
}

/// Create a deterministic UUID derived from another component's UUID plus a discriminating
/// label, e.g. the inferred logic graph semantic of a concept.
pub fn uuid_derived_from(parent: &Uuid, label: &str) -> Uuid {
    let mut bytes = parent.as_bytes().to_vec();
    bytes.extend_from_slice(label.as_bytes());
    Uuid::new_v5(&UUID_NAMESPACE_KOMET, &bytes)
}

/// Native identifier
///
/// A stable internal integer identifier for a component (concept, semantic). Nids are only
/// meaningful within one identifier service; the UUID is the portable identity.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Nid(i32);

impl Nid {
    /// Sentinel for "no component". Paths and stamps carrying it are malformed.
    pub const UNINITIALIZED: Nid = Nid(0);

    pub const fn new(value: i32) -> Self {
        Nid(value)
    }

    pub const fn value(&self) -> i32 {
        self.0
    }

    pub fn is_initialized(&self) -> bool {
        *self != Nid::UNINITIALIZED
    }
}

impl Default for Nid {
    fn default() -> Self {
        Nid::UNINITIALIZED
    }
}

impl Display for Nid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for Nid {
    fn from(value: i32) -> Self {
        Nid(value)
    }
}

impl FromStr for Nid {
    type Err = KometError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(Nid)
            .map_err(|e| KometError::Serialization(format!("Invalid nid '{s}': {e}")))
    }
}

/// Maps portable UUIDs to native nids and back.
pub trait IdentifierService: Send + Sync {
    fn nid_for_uuid(&self, uuid: &Uuid) -> Option<Nid>;

    fn uuid_for_nid(&self, nid: Nid) -> Option<Uuid>;

    /// Return the nid for `uuid`, assigning a new one if the UUID has not been seen before.
    fn assign_nid(&self, uuid: Uuid) -> Nid;

    fn nid_for_uuid_or_err(&self, uuid: &Uuid) -> Result<Nid, KometError> {
        self.nid_for_uuid(uuid)
            .ok_or_else(|| KometError::NotFound(format!("No nid assigned for uuid {uuid}")))
    }

    fn uuid_for_nid_or_err(&self, nid: Nid) -> Result<Uuid, KometError> {
        self.uuid_for_nid(nid)
            .ok_or_else(|| KometError::NotFound(format!("No uuid assigned for nid {nid}")))
    }
}

#[derive(Debug, Default)]
struct IdMaps {
    uuid_to_nid: HashMap<Uuid, Nid>,
    nid_to_uuid: BTreeMap<Nid, Uuid>,
}

/// [IdentifierService] held in memory, pre-seeded with every metadata concept so that the
/// registry nids are stable.
#[derive(Debug)]
pub struct InMemoryIdentifierService {
    maps: RwLock<IdMaps>,
    next: AtomicI32,
}

impl Default for InMemoryIdentifierService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentifierService {
    pub fn new() -> Self {
        let mut maps = IdMaps::default();
        for spec in METADATA.all() {
            maps.uuid_to_nid.insert(spec.uuid, spec.nid);
            maps.nid_to_uuid.insert(spec.nid, spec.uuid);
        }
        InMemoryIdentifierService {
            maps: RwLock::new(maps),
            next: AtomicI32::new(FIRST_DYNAMIC_NID),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.read().nid_to_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentifierService for InMemoryIdentifierService {
    fn nid_for_uuid(&self, uuid: &Uuid) -> Option<Nid> {
        self.maps.read().uuid_to_nid.get(uuid).copied()
    }

    fn uuid_for_nid(&self, nid: Nid) -> Option<Uuid> {
        self.maps.read().nid_to_uuid.get(&nid).copied()
    }

    fn assign_nid(&self, uuid: Uuid) -> Nid {
        if let Some(nid) = self.nid_for_uuid(&uuid) {
            return nid;
        }
        let mut maps = self.maps.write();
        // Another writer may have won the race between the read and the write lock.
        if let Some(nid) = maps.uuid_to_nid.get(&uuid) {
            return *nid;
        }
        let nid = Nid(self.next.fetch_add(1, Ordering::SeqCst));
        maps.uuid_to_nid.insert(uuid, nid);
        maps.nid_to_uuid.insert(nid, uuid);
        tracing::debug!("Assigned nid {} to {}", nid, uuid);
        nid
    }
}
