use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
};

use super::{time_to_user_string, LATEST};
use crate::{identifier::Nid, metadata::METADATA};

/// A point on a path. Positions order primarily by time, then by path nid, so the sentinels
/// [LATEST] and [super::CANCELED] sort as infinitely late and infinitely early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampPosition {
    time: i64,
    path: Nid,
}

impl StampPosition {
    pub fn new(time: i64, path: Nid) -> Self {
        StampPosition { time, path }
    }

    pub fn latest(path: Nid) -> Self {
        StampPosition { time: LATEST, path }
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn path(&self) -> Nid {
        self.path
    }

    pub fn is_latest(&self) -> bool {
        self.time == LATEST
    }

    pub fn with_time(&self, time: i64) -> Self {
        StampPosition { time, ..*self }
    }

    pub fn with_path(&self, path: Nid) -> Self {
        StampPosition { path, ..*self }
    }

    pub fn to_user_string(&self) -> String {
        format!(
            "{} on {}",
            time_to_user_string(self.time),
            METADATA.name_of(self.path)
        )
    }
}

impl PartialOrd for StampPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StampPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl Display for StampPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{DEVELOPMENT_PATH, MASTER_PATH},
        stamp::CANCELED,
    };
    use test_log::test;

    #[test]
    fn test_position_ordering() {
        let early_dev = StampPosition::new(5, DEVELOPMENT_PATH.nid);
        let early_master = StampPosition::new(5, MASTER_PATH.nid);
        let late = StampPosition::new(6, MASTER_PATH.nid);
        // Time dominates, path identity breaks ties.
        assert!(early_master < late);
        assert!(early_dev < late);
        assert_eq!(
            early_master.cmp(&early_dev),
            MASTER_PATH.nid.cmp(&DEVELOPMENT_PATH.nid)
        );
        assert!(StampPosition::new(CANCELED, MASTER_PATH.nid) < early_dev);
        assert!(StampPosition::latest(MASTER_PATH.nid) > late);
    }

    #[test]
    fn test_user_string_names_path() {
        let pos = StampPosition::latest(DEVELOPMENT_PATH.nid);
        assert_eq!(pos.to_user_string(), "latest on Development path");
    }
}
