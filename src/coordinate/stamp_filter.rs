use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use super::marshal::{MarshalReader, MarshalWriter, Marshalable};
use crate::{
    error::KometError,
    identifier::Nid,
    metadata::{DEVELOPMENT_PATH, MASTER_PATH, METADATA},
    stamp::{StampPosition, Status, StatusSet, LATEST},
};

/// Decides which versions of a chronology are current for an observer: which statuses are
/// admitted, the position the observer stands at, which modules are visible and which module
/// wins when several carry a candidate.
///
/// An empty module set admits every module that is not explicitly excluded. The priority list
/// does not filter; unlisted modules rank after every listed one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StampFilter {
    allowed_states: StatusSet,
    position: StampPosition,
    modules: BTreeSet<Nid>,
    excluded_modules: BTreeSet<Nid>,
    module_priority: Vec<Nid>,
}

impl StampFilter {
    pub fn new(
        allowed_states: StatusSet,
        position: StampPosition,
        modules: BTreeSet<Nid>,
        excluded_modules: BTreeSet<Nid>,
        module_priority: Vec<Nid>,
    ) -> Result<Self, KometError> {
        let filter = StampFilter {
            allowed_states,
            position,
            modules,
            excluded_modules,
            module_priority,
        };
        filter.validate()?;
        Ok(filter)
    }

    fn validate(&self) -> Result<(), KometError> {
        if !self.position.path().is_initialized() {
            return Err(KometError::Configuration(
                "Stamp filter position has no path".to_string(),
            ));
        }
        if self.allowed_states.is_empty() {
            return Err(KometError::Configuration(
                "Stamp filter admits no status".to_string(),
            ));
        }
        if let Some(both) = self.modules.intersection(&self.excluded_modules).next() {
            return Err(KometError::Configuration(format!(
                "Module {} is both included and excluded",
                METADATA.name_of(*both)
            )));
        }
        let distinct: BTreeSet<_> = self.module_priority.iter().collect();
        if distinct.len() != self.module_priority.len() {
            return Err(KometError::Configuration(
                "Module priority list repeats a module".to_string(),
            ));
        }
        Ok(())
    }

    fn latest_on(states: StatusSet, path: Nid) -> Self {
        StampFilter {
            allowed_states: states,
            position: StampPosition::latest(path),
            modules: BTreeSet::new(),
            excluded_modules: BTreeSet::new(),
            module_priority: Vec::new(),
        }
    }

    /// Latest on development, admitting active and inactive versions.
    pub fn development_latest() -> Self {
        Self::latest_on(StatusSet::active_and_inactive(), DEVELOPMENT_PATH.nid)
    }

    pub fn development_latest_active_only() -> Self {
        Self::latest_on(StatusSet::active_only(), DEVELOPMENT_PATH.nid)
    }

    pub fn master_latest() -> Self {
        Self::latest_on(StatusSet::active_and_inactive(), MASTER_PATH.nid)
    }

    pub fn master_latest_active_only() -> Self {
        Self::latest_on(StatusSet::active_only(), MASTER_PATH.nid)
    }

    pub fn allowed_states(&self) -> StatusSet {
        self.allowed_states
    }

    pub fn position(&self) -> StampPosition {
        self.position
    }

    pub fn path(&self) -> Nid {
        self.position.path()
    }

    pub fn time(&self) -> i64 {
        self.position.time()
    }

    pub fn modules(&self) -> &BTreeSet<Nid> {
        &self.modules
    }

    pub fn excluded_modules(&self) -> &BTreeSet<Nid> {
        &self.excluded_modules
    }

    pub fn module_priority(&self) -> &[Nid] {
        &self.module_priority
    }

    pub fn is_status_allowed(&self, status: Status) -> bool {
        self.allowed_states.contains(status)
    }

    pub fn is_module_allowed(&self, module: Nid) -> bool {
        !self.excluded_modules.contains(&module)
            && (self.modules.is_empty() || self.modules.contains(&module))
    }

    /// Position of `module` in the priority list; unlisted modules share the last rank.
    pub fn module_rank(&self, module: Nid) -> usize {
        self.module_priority
            .iter()
            .position(|m| *m == module)
            .unwrap_or(self.module_priority.len())
    }

    /// Whether uncommitted versions may be seen through this filter.
    pub fn sees_uncommitted(&self) -> bool {
        self.position.time() == LATEST
    }

    /// Same filter, observing at `time` on the same path.
    pub fn make_coordinate_analog(&self, time: i64) -> Self {
        StampFilter {
            position: self.position.with_time(time),
            ..self.clone()
        }
    }

    /// Same filter, observing on `path` at the same time.
    pub fn make_path_analog(&self, path: Nid) -> Result<Self, KometError> {
        self.with_position(self.position.with_path(path))
    }

    pub fn with_position(&self, position: StampPosition) -> Result<Self, KometError> {
        let filter = StampFilter {
            position,
            ..self.clone()
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn with_allowed_states(&self, states: StatusSet) -> Result<Self, KometError> {
        let filter = StampFilter {
            allowed_states: states,
            ..self.clone()
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn with_modules(&self, modules: BTreeSet<Nid>) -> Result<Self, KometError> {
        let filter = StampFilter {
            modules,
            ..self.clone()
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn with_excluded_modules(&self, excluded: BTreeSet<Nid>) -> Result<Self, KometError> {
        let filter = StampFilter {
            excluded_modules: excluded,
            ..self.clone()
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn with_module_priority(&self, priority: Vec<Nid>) -> Result<Self, KometError> {
        let filter = StampFilter {
            module_priority: priority,
            ..self.clone()
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn to_user_string(&self) -> String {
        let names = |nids: &mut dyn Iterator<Item = &Nid>| {
            nids.map(|n| METADATA.name_of(*n)).collect::<Vec<_>>().join(", ")
        };
        let mut text = format!("{} at {}", self.allowed_states, self.position);
        if !self.modules.is_empty() {
            text.push_str(&format!(" in [{}]", names(&mut self.modules.iter())));
        }
        if !self.excluded_modules.is_empty() {
            text.push_str(&format!(
                " excluding [{}]",
                names(&mut self.excluded_modules.iter())
            ));
        }
        if !self.module_priority.is_empty() {
            text.push_str(&format!(
                " preferring [{}]",
                names(&mut self.module_priority.iter())
            ));
        }
        text
    }
}

impl Display for StampFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

impl Marshalable for StampFilter {
    const RECORD: &'static str = "stamp filter";

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        out.put_u8(self.allowed_states.to_bits());
        out.put_i64(self.position.time());
        out.put_nid(self.position.path());
        out.put_nid_set(&self.modules);
        if version >= 2 {
            out.put_nid_set(&self.excluded_modules);
            out.put_nid_list(&self.module_priority);
        }
        Ok(())
    }

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError> {
        let allowed_states = StatusSet::from_bits(input.get_u8()?)?;
        let time = input.get_i64()?;
        let path = input.get_nid()?;
        let modules = input.get_nid_set()?;
        let (excluded_modules, module_priority) = if version >= 2 {
            (input.get_nid_set()?, input.get_nid_list()?)
        } else {
            (BTreeSet::new(), Vec::new())
        };
        StampFilter::new(
            allowed_states,
            StampPosition::new(time, path),
            modules,
            excluded_modules,
            module_priority,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CORE_MODULE, US_EXTENSION_MODULE};

    #[test]
    fn test_module_visibility() {
        let filter = StampFilter::development_latest()
            .with_excluded_modules(BTreeSet::from([US_EXTENSION_MODULE.nid]))
            .unwrap();
        assert!(filter.is_module_allowed(CORE_MODULE.nid));
        assert!(!filter.is_module_allowed(US_EXTENSION_MODULE.nid));

        let only_core = StampFilter::development_latest()
            .with_modules(BTreeSet::from([CORE_MODULE.nid]))
            .unwrap();
        assert!(!only_core.is_module_allowed(US_EXTENSION_MODULE.nid));
    }

    #[test]
    fn test_included_and_excluded_is_malformed() {
        let err = StampFilter::development_latest()
            .with_modules(BTreeSet::from([CORE_MODULE.nid]))
            .unwrap()
            .with_excluded_modules(BTreeSet::from([CORE_MODULE.nid]))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_module_rank() {
        let filter = StampFilter::development_latest()
            .with_module_priority(vec![US_EXTENSION_MODULE.nid, CORE_MODULE.nid])
            .unwrap();
        assert_eq!(filter.module_rank(US_EXTENSION_MODULE.nid), 0);
        assert_eq!(filter.module_rank(CORE_MODULE.nid), 1);
        assert_eq!(filter.module_rank(Nid::new(4242)), 2);
    }

    #[test]
    fn test_analogs() {
        let filter = StampFilter::development_latest();
        assert!(filter.sees_uncommitted());
        let past = filter.make_coordinate_analog(1_000);
        assert_eq!(past.time(), 1_000);
        assert_eq!(past.path(), DEVELOPMENT_PATH.nid);
        assert!(!past.sees_uncommitted());
        let master = past.make_path_analog(MASTER_PATH.nid).unwrap();
        assert_eq!(master.position(), StampPosition::new(1_000, MASTER_PATH.nid));
        assert!(filter.make_path_analog(Nid::UNINITIALIZED).is_err());
    }

    #[test]
    fn test_prior_tag_defaults_new_fields() {
        let filter = StampFilter::development_latest_active_only()
            .with_excluded_modules(BTreeSet::from([US_EXTENSION_MODULE.nid]))
            .unwrap()
            .with_module_priority(vec![CORE_MODULE.nid])
            .unwrap();
        let v1 = filter.marshal_as(1).unwrap();
        let read = StampFilter::unmarshal(&v1).unwrap();
        assert!(read.excluded_modules().is_empty());
        assert!(read.module_priority().is_empty());
        assert_eq!(read.position(), filter.position());
        assert_eq!(read.allowed_states(), filter.allowed_states());
        assert_eq!(StampFilter::unmarshal(&filter.marshal().unwrap()).unwrap(), filter);
    }
}
