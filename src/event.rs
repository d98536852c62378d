use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{classifier::ClassifierState, commit::CommitRecord, error::KometError};

/// How a tracked task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Notifications published to UI adapters and other observers. The core never renders these;
/// it only guarantees they are sent after the state they describe is in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KometEvent {
    /// A transaction was written.
    Committed(CommitRecord),
    /// Task id, title
    TaskStarted(u64, String),
    /// Task id, title, outcome
    TaskFinished(u64, String, TaskOutcome),
    /// The classifier moved to a new state.
    ClassifierState(ClassifierState),
}

impl KometEvent {
    pub fn to_json(&self) -> Result<String, KometError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, KometError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Display for KometEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            KometEvent::Committed(record) => write!(f, "Committed({})", record.transaction_name),
            KometEvent::TaskStarted(id, title) => write!(f, "TaskStarted({id}, {title})"),
            KometEvent::TaskFinished(id, title, outcome) => {
                write!(f, "TaskFinished({id}, {title}, {outcome:?})")
            }
            KometEvent::ClassifierState(state) => write!(f, "ClassifierState({state:?})"),
        }
    }
}
