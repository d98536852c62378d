//! STAMP provenance: Status, Time, Author, Module, Path.
//!
//! - [`Stamp`]: the immutable provenance record carried by every component version
//! - [`position`]: a point in time on a path, with the ordering every consumer relies on
//! - [`path`]: branches, their origins, and the interning registry

pub mod path;
pub mod position;

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    ops::Deref,
};

pub use path::{PathRegistry, PathService, StampPath, StampPathCache, MAX_ORIGIN_DEPTH};
pub use position::StampPosition;

use crate::{error::KometError, identifier::Nid, metadata::METADATA};

/// Time sentinel for uncommitted versions, and for positions meaning "latest".
pub const LATEST: i64 = i64::MAX;

/// Time sentinel for cancelled versions.
pub const CANCELED: i64 = i64::MIN;

/// Render a stamp time for people: `latest`, `CANCELED` or an ISO-8601 UTC instant.
pub fn time_to_user_string(time: i64) -> String {
    match time {
        LATEST => "latest".to_string(),
        CANCELED => "CANCELED".to_string(),
        _ => chrono::DateTime::<chrono::Utc>::from_timestamp_millis(time)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_else(|| format!("{time}ms")),
    }
}

/// Current wall clock time in epoch millis.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(repr = "u8")]
pub enum Status {
    Active,
    Inactive,
    /// Versions created before any terminology content, e.g. bootstrapped metadata.
    Primordial,
    Cancelled,
}

impl Status {
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Active | Status::Primordial)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Status::Active => 0,
            Status::Inactive => 1,
            Status::Primordial => 2,
            Status::Cancelled => 3,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Status, KometError> {
        match byte {
            0 => Ok(Status::Active),
            1 => Ok(Status::Inactive),
            2 => Ok(Status::Primordial),
            3 => Ok(Status::Cancelled),
            _ => Err(KometError::Serialization(format!(
                "Invalid status byte {byte}. Valid range is 0..=3"
            ))),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The set of statuses a [crate::coordinate::StampFilter] admits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusSet(pub EnumSet<Status>);

impl StatusSet {
    pub fn active_only() -> Self {
        StatusSet(Status::Active | Status::Primordial)
    }

    pub fn active_and_inactive() -> Self {
        StatusSet(Status::Active | Status::Inactive | Status::Primordial)
    }

    pub fn inactive_only() -> Self {
        StatusSet(EnumSet::only(Status::Inactive))
    }

    /// Every status, including cancelled.
    pub fn any() -> Self {
        StatusSet(EnumSet::all())
    }

    pub fn is_any(&self) -> bool {
        self.0 == EnumSet::all()
    }

    pub(crate) fn to_bits(self) -> u8 {
        self.0
            .iter()
            .fold(0u8, |bits, status| bits | (1 << status.to_byte()))
    }

    pub(crate) fn from_bits(bits: u8) -> Result<Self, KometError> {
        let mut set = EnumSet::new();
        for bit in 0..8u8 {
            if bits & (1 << bit) != 0 {
                set |= Status::from_byte(bit)?;
            }
        }
        Ok(StatusSet(set))
    }
}

impl Deref for StatusSet {
    type Target = EnumSet<Status>;
    fn deref(&self) -> &EnumSet<Status> {
        &self.0
    }
}

impl From<EnumSet<Status>> for StatusSet {
    fn from(set: EnumSet<Status>) -> Self {
        StatusSet(set)
    }
}

impl From<Status> for StatusSet {
    fn from(status: Status) -> Self {
        StatusSet(EnumSet::only(status))
    }
}

impl Display for StatusSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            return write!(f, "any status");
        }
        let names = self.0.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        write!(f, "{}", names.join(", "))
    }
}

/// The provenance of one component version.
///
/// A stamp whose time is [LATEST] is uncommitted: it belongs to an open transaction and becomes
/// immutable once [Stamp::commit_at] assigns it a commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub status: Status,
    pub time: i64,
    pub author: Nid,
    pub module: Nid,
    pub path: Nid,
}

impl Stamp {
    pub fn new(
        status: Status,
        time: i64,
        author: Nid,
        module: Nid,
        path: Nid,
    ) -> Result<Stamp, KometError> {
        if !path.is_initialized() {
            return Err(KometError::Configuration(format!(
                "Stamp at {} by {} has no path",
                time_to_user_string(time),
                METADATA.name_of(author)
            )));
        }
        if !module.is_initialized() {
            return Err(KometError::Configuration(format!(
                "Stamp at {} on {} has no module",
                time_to_user_string(time),
                METADATA.name_of(path)
            )));
        }
        Ok(Stamp {
            status,
            time,
            author,
            module,
            path,
        })
    }

    pub fn uncommitted(
        status: Status,
        author: Nid,
        module: Nid,
        path: Nid,
    ) -> Result<Stamp, KometError> {
        Stamp::new(status, LATEST, author, module, path)
    }

    pub fn is_uncommitted(&self) -> bool {
        self.time == LATEST
    }

    pub fn is_cancelled(&self) -> bool {
        self.time == CANCELED || self.status == Status::Cancelled
    }

    /// The committed form of this stamp.
    pub fn commit_at(&self, time: i64) -> Stamp {
        Stamp { time, ..*self }
    }

    pub fn cancel(&self) -> Stamp {
        Stamp {
            time: CANCELED,
            status: Status::Cancelled,
            ..*self
        }
    }

    pub fn position(&self) -> StampPosition {
        StampPosition::new(self.time, self.path)
    }

    pub fn to_user_string(&self) -> String {
        format!(
            "{} {} by {} in {} on {}",
            self.status,
            time_to_user_string(self.time),
            METADATA.name_of(self.author),
            METADATA.name_of(self.module),
            METADATA.name_of(self.path)
        )
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position()
            .cmp(&other.position())
            .then_with(|| self.module.cmp(&other.module))
            .then_with(|| self.author.cmp(&other.author))
            .then_with(|| self.status.cmp(&other.status))
    }
}

impl Display for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CORE_MODULE, DEVELOPMENT_PATH, USER};

    #[test]
    fn test_stamp_requires_path() {
        let err = Stamp::new(Status::Active, 1, USER.nid, CORE_MODULE.nid, Nid::UNINITIALIZED)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_sentinels_sort_at_the_extremes() {
        let stamp = |time| {
            Stamp::new(Status::Active, time, USER.nid, CORE_MODULE.nid, DEVELOPMENT_PATH.nid)
                .unwrap()
        };
        let mut stamps = vec![stamp(LATEST), stamp(10), stamp(CANCELED), stamp(-5)];
        stamps.sort();
        let times: Vec<i64> = stamps.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![CANCELED, -5, 10, LATEST]);
    }

    #[test]
    fn test_commit_preserves_provenance() {
        let pending =
            Stamp::uncommitted(Status::Active, USER.nid, CORE_MODULE.nid, DEVELOPMENT_PATH.nid)
                .unwrap();
        assert!(pending.is_uncommitted());
        let committed = pending.commit_at(1_000);
        assert!(!committed.is_uncommitted());
        assert_eq!(committed.author, pending.author);
        assert_eq!(committed.path, pending.path);
        assert!(pending.cancel().is_cancelled());
    }

    #[test]
    fn test_status_bits() {
        for set in [
            StatusSet::active_only(),
            StatusSet::active_and_inactive(),
            StatusSet::inactive_only(),
            StatusSet::any(),
        ] {
            assert_eq!(StatusSet::from_bits(set.to_bits()).unwrap(), set);
        }
        assert!(StatusSet::from_bits(0b1000_0000).is_err());
    }

    #[test]
    fn test_user_strings() {
        assert_eq!(time_to_user_string(LATEST), "latest");
        assert_eq!(time_to_user_string(CANCELED), "CANCELED");
        assert_eq!(time_to_user_string(0), "1970-01-01T00:00:00.000Z");
    }
}
