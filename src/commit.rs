//! The commit boundary.
//!
//! Edits are staged in a [Transaction] as versions with uncommitted stamps. Only the
//! transaction sees them (through [Transaction::latest_version]). [CommitService::commit]
//! assigns the commit time, runs every [ChangeChecker], writes the chronologies, and only then
//! tells [CommitListener]s and the event channel. A failed commit returns no record, only
//! alerts, and writes nothing.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::{
    calculator::{LatestVersion, RelativePositionCalculator},
    chronology::{Chronology, ChronologyKind, Version, VersionData},
    coordinate::LogicCoordinate,
    error::KometError,
    event::KometEvent,
    identifier::Nid,
    metadata::METADATA,
    stamp::{now_millis, time_to_user_string, CANCELED, LATEST},
    store::ChronologyStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    /// Blocks the commit.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub component: Option<Nid>,
}

impl Alert {
    pub fn info(message: impl Into<String>, component: Option<Nid>) -> Self {
        Alert {
            level: AlertLevel::Info,
            message: message.into(),
            component,
        }
    }

    pub fn warning(message: impl Into<String>, component: Option<Nid>) -> Self {
        Alert {
            level: AlertLevel::Warning,
            message: message.into(),
            component,
        }
    }

    pub fn error(message: impl Into<String>, component: Option<Nid>) -> Self {
        Alert {
            level: AlertLevel::Error,
            message: message.into(),
            component,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == AlertLevel::Error
    }
}

impl Display for Alert {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.component {
            Some(nid) => write!(f, "{:?} on {nid}: {}", self.level, self.message),
            None => write!(f, "{:?}: {}", self.level, self.message),
        }
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub transaction_id: Uuid,
    pub transaction_name: String,
    pub comment: String,
    pub commit_time: i64,
    pub concepts: BTreeSet<Nid>,
    pub semantics: BTreeSet<Nid>,
    /// Assemblages of the written semantics.
    pub assemblages: BTreeSet<Nid>,
    /// Components the written semantics reference.
    pub referenced_components: BTreeSet<Nid>,
}

impl CommitRecord {
    pub fn touches_assemblage(&self, assemblage: Nid) -> bool {
        self.assemblages.contains(&assemblage)
    }

    pub fn chronology_count(&self) -> usize {
        self.concepts.len() + self.semantics.len()
    }
}

/// Result of [CommitService::commit]: a record when the write happened, plus any alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub record: Option<CommitRecord>,
    pub alerts: Vec<Alert>,
}

impl CommitOutcome {
    fn failed(alerts: Vec<Alert>) -> Self {
        CommitOutcome {
            record: None,
            alerts,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.record.is_some()
    }

    /// The record, or a commit error carrying every alert.
    pub fn into_result(self) -> Result<CommitRecord, KometError> {
        match self.record {
            Some(record) => Ok(record),
            None => Err(KometError::Commit(
                self.alerts
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}

/// A unit of work: chronologies carrying uncommitted versions.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: Uuid,
    name: String,
    pending: BTreeMap<Nid, Chronology>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            name: name.into(),
            pending: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn staged_nids(&self) -> impl Iterator<Item = Nid> + '_ {
        self.pending.keys().copied()
    }

    pub fn staged(&self, nid: Nid) -> Option<&Chronology> {
        self.pending.get(&nid)
    }

    /// Stage the uncommitted versions of `chronology`. Committed versions it carries are
    /// ignored; a chronology with no uncommitted version is a configuration error.
    pub fn stage(&mut self, chronology: Chronology) -> Result<(), KometError> {
        let uncommitted = chronology
            .versions()
            .iter()
            .filter(|v| v.stamp.is_uncommitted())
            .cloned()
            .collect::<Vec<_>>();
        if uncommitted.is_empty() {
            return Err(KometError::Configuration(format!(
                "{chronology} has no uncommitted version to stage"
            )));
        }
        let entry = self.pending.entry(chronology.nid()).or_insert_with(|| {
            empty_like(&chronology)
        });
        if entry.kind() != chronology.kind() {
            return Err(KometError::Integrity(format!(
                "{chronology} conflicts with staged {entry}"
            )));
        }
        for version in uncommitted {
            entry.add_version(version);
        }
        Ok(())
    }

    /// Stage one uncommitted version of the component described by `template`.
    pub fn stage_version(&mut self, template: &Chronology, version: Version) -> Result<(), KometError> {
        self.stage(empty_like(template).with_version(version))
    }

    /// Latest version as seen by this transaction's author: stored versions overlaid with the
    /// staged ones.
    pub fn latest_version(
        &self,
        nid: Nid,
        store: &dyn ChronologyStore,
        calc: &RelativePositionCalculator,
    ) -> LatestVersion<Version> {
        let stored = store.get_chronology(nid);
        let Some(staged) = self.pending.get(&nid) else {
            return stored
                .map(|c| c.latest_version(calc))
                .unwrap_or_default();
        };
        let mut overlay = match stored {
            Some(stored) => Chronology::clone(&stored),
            None => empty_like(staged),
        };
        for version in staged.versions() {
            overlay.add_version(version.clone());
        }
        overlay.latest_version(calc)
    }

    /// Discard every staged version. Returns how many were dropped.
    pub fn cancel(self) -> usize {
        let dropped = self.pending.values().map(|c| c.versions().len()).sum();
        tracing::info!("Cancelled transaction {} ({dropped} versions)", self.name);
        dropped
    }

    fn committed_at(&self, time: i64) -> BTreeMap<Nid, Chronology> {
        self.pending
            .iter()
            .map(|(nid, staged)| {
                let mut committed = empty_like(staged);
                for version in staged.versions() {
                    committed.add_version(Version::new(version.stamp.commit_at(time), version.data.clone()));
                }
                (*nid, committed)
            })
            .collect()
    }
}

fn empty_like(chronology: &Chronology) -> Chronology {
    match chronology.kind() {
        ChronologyKind::Concept => Chronology::new_concept(chronology.nid(), chronology.uuid()),
        ChronologyKind::Semantic {
            assemblage,
            referenced_component,
        } => Chronology::new_semantic(
            chronology.nid(),
            chronology.uuid(),
            assemblage,
            referenced_component,
        ),
    }
}

/// Validates one chronology of a commit before anything is written. Error alerts block the
/// commit.
pub trait ChangeChecker: Send + Sync {
    fn name(&self) -> &str;

    /// `batch` holds every chronology of the commit, including `chronology`.
    fn check(
        &self,
        chronology: &Chronology,
        batch: &BTreeMap<Nid, Chronology>,
        store: &dyn ChronologyStore,
    ) -> Vec<Alert>;
}

/// Told about every successful commit, after the write.
pub trait CommitListener: Send + Sync {
    fn listener_name(&self) -> &str;

    fn handle_commit(&self, record: &CommitRecord, store: &dyn ChronologyStore);
}

/// Rejects a second stated or a second inferred logic graph semantic for one concept.
#[derive(Debug, Clone)]
pub struct LogicGraphUniquenessChecker {
    logic: LogicCoordinate,
}

impl LogicGraphUniquenessChecker {
    pub fn new(logic: LogicCoordinate) -> Self {
        LogicGraphUniquenessChecker { logic }
    }
}

impl ChangeChecker for LogicGraphUniquenessChecker {
    fn name(&self) -> &str {
        "logic graph uniqueness"
    }

    fn check(
        &self,
        chronology: &Chronology,
        batch: &BTreeMap<Nid, Chronology>,
        store: &dyn ChronologyStore,
    ) -> Vec<Alert> {
        let ChronologyKind::Semantic {
            assemblage,
            referenced_component: concept,
        } = chronology.kind()
        else {
            return Vec::new();
        };
        if !self.logic.is_logic_assemblage(assemblage) {
            return Vec::new();
        }
        let mut alerts = Vec::new();
        if let Some(v) = chronology
            .versions()
            .iter()
            .find(|v| !matches!(v.data, VersionData::LogicGraph(_)))
        {
            alerts.push(Alert::error(
                format!(
                    "{} version of {} holds {} data",
                    METADATA.name_of(assemblage),
                    chronology.nid(),
                    v.data.kind_name()
                ),
                Some(chronology.nid()),
            ));
        }
        let stored = store
            .semantic_nids_for_component_of_assemblage(concept, assemblage)
            .into_iter();
        let batched = batch.values().filter_map(|other| match other.kind() {
            ChronologyKind::Semantic {
                assemblage: a,
                referenced_component: c,
            } if a == assemblage && c == concept => Some(other.nid()),
            _ => None,
        });
        let others: BTreeSet<Nid> = stored
            .chain(batched)
            .filter(|nid| *nid != chronology.nid())
            .collect();
        if !others.is_empty() {
            alerts.push(Alert::error(
                format!(
                    "Concept {concept} would have more than one {} semantic: {} and {:?}",
                    METADATA.name_of(assemblage),
                    chronology.nid(),
                    others
                ),
                Some(concept),
            ));
        }
        alerts
    }
}

/// Warns about semantics whose referenced component is neither stored nor in the commit.
#[derive(Debug, Clone, Default)]
pub struct ReferencedComponentChecker;

impl ChangeChecker for ReferencedComponentChecker {
    fn name(&self) -> &str {
        "referenced component"
    }

    fn check(
        &self,
        chronology: &Chronology,
        batch: &BTreeMap<Nid, Chronology>,
        store: &dyn ChronologyStore,
    ) -> Vec<Alert> {
        match chronology.referenced_component() {
            Some(component) if !batch.contains_key(&component) && !store.contains(component) => {
                vec![Alert::warning(
                    format!("{chronology} references unknown component {component}"),
                    Some(chronology.nid()),
                )]
            }
            _ => Vec::new(),
        }
    }
}

/// Serializes commits against one store.
pub struct CommitService {
    store: Arc<dyn ChronologyStore>,
    write_lock: Mutex<()>,
    checkers: RwLock<Vec<Arc<dyn ChangeChecker>>>,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
    events: Option<UnboundedSender<KometEvent>>,
}

impl CommitService {
    pub fn new(store: Arc<dyn ChronologyStore>, events: Option<UnboundedSender<KometEvent>>) -> Self {
        CommitService {
            store,
            write_lock: Mutex::new(()),
            checkers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn add_checker(&self, checker: Arc<dyn ChangeChecker>) {
        tracing::debug!("Added change checker {}", checker.name());
        self.checkers.write().push(checker);
    }

    pub fn add_listener(&self, listener: Arc<dyn CommitListener>) {
        tracing::debug!("Added commit listener {}", listener.listener_name());
        self.listeners.write().push(listener);
    }

    pub fn store(&self) -> &Arc<dyn ChronologyStore> {
        &self.store
    }

    /// Commit `transaction` at `effective_time` (now when absent). Callers must check
    /// [CommitOutcome::record]: a rejected commit is reported through alerts, not an error.
    pub fn commit(
        &self,
        transaction: Transaction,
        comment: &str,
        effective_time: Option<i64>,
    ) -> CommitOutcome {
        let _guard = self.write_lock.lock();
        if transaction.is_empty() {
            return CommitOutcome::failed(vec![Alert::info(
                format!("Transaction {} has nothing to commit", transaction.name()),
                None,
            )]);
        }
        let commit_time = effective_time.unwrap_or_else(now_millis);
        if commit_time == LATEST || commit_time == CANCELED {
            return CommitOutcome::failed(vec![Alert::error(
                format!(
                    "Cannot commit at sentinel time {}",
                    time_to_user_string(commit_time)
                ),
                None,
            )]);
        }

        let batch = transaction.committed_at(commit_time);
        let mut alerts = Vec::new();
        for chronology in batch.values() {
            if let Some(stored) = self.store.get_chronology(chronology.nid()) {
                if stored.kind() != chronology.kind() {
                    alerts.push(Alert::error(
                        format!("{chronology} conflicts with stored {stored}"),
                        Some(chronology.nid()),
                    ));
                }
            }
            for checker in self.checkers.read().iter() {
                alerts.extend(checker.check(chronology, &batch, self.store.as_ref()));
            }
        }
        if alerts.iter().any(Alert::is_error) {
            for alert in alerts.iter().filter(|a| a.is_error()) {
                tracing::error!("Commit of {} rejected: {alert}", transaction.name());
            }
            return CommitOutcome::failed(alerts);
        }

        let mut record = CommitRecord {
            transaction_id: transaction.id(),
            transaction_name: transaction.name().to_string(),
            comment: comment.to_string(),
            commit_time,
            concepts: BTreeSet::new(),
            semantics: BTreeSet::new(),
            assemblages: BTreeSet::new(),
            referenced_components: BTreeSet::new(),
        };
        for (nid, chronology) in batch {
            let kind = chronology.kind();
            // Kinds were checked above, so a failure here is a store defect.
            if let Err(e) = self.store.write(chronology) {
                tracing::error!(
                    "Store rejected chronology {nid} while committing {}: {e}",
                    transaction.name()
                );
                alerts.push(Alert::error(e.to_string(), Some(nid)));
                continue;
            }
            match kind {
                ChronologyKind::Concept => {
                    record.concepts.insert(nid);
                }
                ChronologyKind::Semantic {
                    assemblage,
                    referenced_component,
                } => {
                    record.semantics.insert(nid);
                    record.assemblages.insert(assemblage);
                    record.referenced_components.insert(referenced_component);
                }
            }
        }
        // The record lists only what the store accepted.
        if record.chronology_count() == 0 {
            tracing::error!("Commit of {} wrote nothing", transaction.name());
            return CommitOutcome::failed(alerts);
        }
        tracing::info!(
            "Committed {} ({} chronologies) at {}: {comment}",
            record.transaction_name,
            record.chronology_count(),
            time_to_user_string(commit_time)
        );

        for listener in self.listeners.read().iter() {
            listener.handle_commit(&record, self.store.as_ref());
        }
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(KometEvent::Committed(record.clone())) {
                tracing::warn!("{}", KometError::from(e));
            }
        }
        CommitOutcome {
            record: Some(record),
            alerts,
        }
    }
}
