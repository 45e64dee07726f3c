//! Generic approval lifecycle shared by pending commands and remediation
//! actions.
//!
//! One state machine, two projections: the command path only observes the
//! `approved`/`executed` booleans, while remediation actions expose all six
//! states. Every mutation is serialized by a single lock; state transitions
//! are linearizable.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states.
///
/// ```text
/// PROPOSED ──▶ APPROVED ──▶ EXECUTING ──▶ COMPLETED
///     │                         │
///     ▼                         └────────▶ FAILED
/// REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Proposed,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl ApprovalState {
    /// Terminal states cannot transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A tracked entity with its lifecycle metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Tracked<T> {
    /// Opaque id, unique over the process lifetime.
    pub id: String,
    pub payload: T,
    pub state: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl<T> Tracked<T> {
    /// The two-boolean projection used by the command path.
    #[must_use]
    pub const fn approved(&self) -> bool {
        matches!(
            self.state,
            ApprovalState::Approved | ApprovalState::Executing | ApprovalState::Completed
        )
    }

    /// Whether execution has consumed this entity.
    #[must_use]
    pub const fn executed(&self) -> bool {
        matches!(self.state, ApprovalState::Completed)
    }
}

/// Outcome of an approval attempt.
#[derive(Debug)]
pub enum ApproveOutcome<T> {
    /// Transitioned to (or already in) the approved state.
    Approved(Tracked<T>),
    /// Entity exists but was already executed or otherwise terminal.
    Terminal(ApprovalState),
    NotFound,
}

/// Mutex-guarded registry of tracked entities.
#[derive(Debug, Default)]
pub struct ApprovalRegistry<T> {
    entries: Mutex<HashMap<String, Tracked<T>>>,
}

impl<T: Clone> ApprovalRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a short opaque id with the given prefix.
    #[must_use]
    pub fn new_id(prefix: &str) -> String {
        let hex = Uuid::new_v4().simple().to_string();
        if prefix.is_empty() {
            hex[..8].to_string()
        } else {
            format!("{prefix}_{}", &hex[..8])
        }
    }

    /// Insert a new entity in the `Proposed` state and return its snapshot.
    pub fn propose(&self, id: String, payload: T) -> Tracked<T> {
        let tracked = Tracked {
            id: id.clone(),
            payload,
            state: ApprovalState::Proposed,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            executed_at: None,
        };
        self.entries
            .lock()
            .expect("approval registry lock poisoned")
            .insert(id, tracked.clone());
        tracked
    }

    /// Approve an entity. Approving an already-approved entity is a no-op
    /// success; approving an executed or rejected one fails.
    pub fn approve(&self, id: &str, approver: &str) -> ApproveOutcome<T> {
        let mut entries = self.entries.lock().expect("approval registry lock poisoned");
        let Some(entry) = entries.get_mut(id) else {
            return ApproveOutcome::NotFound;
        };
        match entry.state {
            ApprovalState::Proposed => {
                entry.state = ApprovalState::Approved;
                entry.approved_by = Some(approver.to_string());
                entry.approved_at = Some(Utc::now());
                ApproveOutcome::Approved(entry.clone())
            }
            ApprovalState::Approved => ApproveOutcome::Approved(entry.clone()),
            state => ApproveOutcome::Terminal(state),
        }
    }

    /// Reject a proposed entity and remove it. Fails (returns `None`) for
    /// any non-`Proposed` state.
    pub fn reject(&self, id: &str, approver: &str) -> Option<Tracked<T>> {
        let mut entries = self.entries.lock().expect("approval registry lock poisoned");
        match entries.get(id) {
            Some(entry) if entry.state == ApprovalState::Proposed => {
                let mut entry = entries.remove(id)?;
                entry.state = ApprovalState::Rejected;
                entry.approved_by = Some(approver.to_string());
                entry.approved_at = Some(Utc::now());
                Some(entry)
            }
            _ => None,
        }
    }

    /// Move an approved entity into `Executing`. Fails for any other state.
    pub fn begin_execution(&self, id: &str) -> Option<Tracked<T>> {
        let mut entries = self.entries.lock().expect("approval registry lock poisoned");
        let entry = entries.get_mut(id)?;
        if entry.state != ApprovalState::Approved {
            return None;
        }
        entry.state = ApprovalState::Executing;
        entry.executed_at = Some(Utc::now());
        Some(entry.clone())
    }

    /// Mark an entity `Completed`, optionally removing it from the
    /// registry. Accepts entities in `Approved` (the command path skips the
    /// observable `Executing` hop) or `Executing`.
    pub fn complete(
        &self,
        id: &str,
        remove: bool,
        update: impl FnOnce(&mut T),
    ) -> Option<Tracked<T>> {
        let mut entries = self.entries.lock().expect("approval registry lock poisoned");
        let entry = entries.get_mut(id)?;
        if !matches!(
            entry.state,
            ApprovalState::Approved | ApprovalState::Executing
        ) {
            return None;
        }
        entry.state = ApprovalState::Completed;
        if entry.executed_at.is_none() {
            entry.executed_at = Some(Utc::now());
        }
        update(&mut entry.payload);
        let snapshot = entry.clone();
        if remove {
            entries.remove(id);
        }
        Some(snapshot)
    }

    /// Mark an executing entity `Failed`, retaining it for inspection.
    pub fn fail(&self, id: &str, update: impl FnOnce(&mut T)) -> Option<Tracked<T>> {
        let mut entries = self.entries.lock().expect("approval registry lock poisoned");
        let entry = entries.get_mut(id)?;
        if !matches!(
            entry.state,
            ApprovalState::Approved | ApprovalState::Executing
        ) {
            return None;
        }
        entry.state = ApprovalState::Failed;
        if entry.executed_at.is_none() {
            entry.executed_at = Some(Utc::now());
        }
        update(&mut entry.payload);
        Some(entry.clone())
    }

    /// Fetch a snapshot by id.
    pub fn get(&self, id: &str) -> Option<Tracked<T>> {
        self.entries
            .lock()
            .expect("approval registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Snapshots of all entities matching `filter`.
    pub fn list(&self, filter: impl Fn(&Tracked<T>) -> bool) -> Vec<Tracked<T>> {
        let mut out: Vec<Tracked<T>> = self
            .entries
            .lock()
            .expect("approval registry lock poisoned")
            .values()
            .filter(|e| filter(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Remove entities older than `max_age`. Purged ids cannot be
    /// resurrected. Returns the number of removals.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut entries = self.entries.lock().expect("approval registry lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| e.created_at >= cutoff);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("approval registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ApprovalRegistry<String> {
        ApprovalRegistry::new()
    }

    #[test]
    fn test_propose_starts_proposed() {
        let reg = registry();
        let entry = reg.propose("cmd_1".into(), "payload".into());
        assert_eq!(entry.state, ApprovalState::Proposed);
        assert!(!entry.approved());
        assert!(!entry.executed());
    }

    #[test]
    fn test_approve_is_idempotent() {
        let reg = registry();
        reg.propose("cmd_1".into(), "payload".into());

        let first = reg.approve("cmd_1", "human");
        assert!(matches!(first, ApproveOutcome::Approved(_)));

        // Second approval: no-op success, state unchanged.
        match reg.approve("cmd_1", "someone-else") {
            ApproveOutcome::Approved(entry) => {
                assert_eq!(entry.approved_by.as_deref(), Some("human"));
            }
            _ => panic!("second approve should succeed"),
        }
    }

    #[test]
    fn test_approve_after_completion_fails() {
        let reg = registry();
        reg.propose("cmd_1".into(), "payload".into());
        reg.approve("cmd_1", "human");
        reg.complete("cmd_1", false, |_| {});

        assert!(matches!(
            reg.approve("cmd_1", "human"),
            ApproveOutcome::Terminal(ApprovalState::Completed)
        ));
    }

    #[test]
    fn test_execute_requires_approval() {
        let reg = registry();
        reg.propose("a1".into(), "payload".into());
        assert!(reg.begin_execution("a1").is_none());

        reg.approve("a1", "human");
        let entry = reg.begin_execution("a1").unwrap();
        assert_eq!(entry.state, ApprovalState::Executing);
        assert!(entry.executed_at.is_some());
    }

    #[test]
    fn test_reject_only_from_proposed() {
        let reg = registry();
        reg.propose("a1".into(), "payload".into());
        reg.approve("a1", "human");
        assert!(reg.reject("a1", "human").is_none());

        reg.propose("a2".into(), "payload".into());
        let rejected = reg.reject("a2", "human").unwrap();
        assert_eq!(rejected.state, ApprovalState::Rejected);
        // Rejected entries are removed.
        assert!(reg.get("a2").is_none());
    }

    #[test]
    fn test_executed_implies_approved() {
        let reg = registry();
        reg.propose("a1".into(), "payload".into());
        reg.approve("a1", "human");
        reg.complete("a1", false, |_| {});
        let entry = reg.get("a1").unwrap();
        assert!(entry.executed());
        assert!(entry.approved());
        assert!(entry.executed_at.is_some());
    }

    #[test]
    fn test_failed_entries_are_retained() {
        let reg = registry();
        reg.propose("a1".into(), "payload".into());
        reg.approve("a1", "human");
        reg.begin_execution("a1");
        reg.fail("a1", |p| *p = "error".into());

        let entry = reg.get("a1").unwrap();
        assert_eq!(entry.state, ApprovalState::Failed);
        assert_eq!(entry.payload, "error");
    }

    #[test]
    fn test_completed_with_remove_drops_entry() {
        let reg = registry();
        reg.propose("a1".into(), "payload".into());
        reg.approve("a1", "human");
        reg.begin_execution("a1");
        let snapshot = reg.complete("a1", true, |_| {}).unwrap();
        assert_eq!(snapshot.state, ApprovalState::Completed);
        assert!(reg.get("a1").is_none());
    }

    #[test]
    fn test_cleanup_purges_old_entries() {
        let reg = registry();
        reg.propose("old".into(), "payload".into());
        // Zero horizon: everything is older.
        let removed = reg.cleanup(Duration::from_secs(0));
        assert_eq!(removed, 1);
        assert!(reg.get("old").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ApprovalRegistry::<String>::new_id("cmd");
        let b = ApprovalRegistry::<String>::new_id("cmd");
        assert_ne!(a, b);
        assert!(a.starts_with("cmd_"));
        assert_eq!(a.len(), "cmd_".len() + 8);
    }
}
