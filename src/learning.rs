//! Auto-learning collector — durable counter of denied commands.
//!
//! Every denial is recorded with who asked and where. Commands are
//! classified once on first sight and the verdict cached; the suggestion
//! producer re-runs the classifier to build ranked whitelist-extension
//! proposals. Persistence is a single JSON document; a missing or corrupt
//! file yields an empty store, and write failures are logged and swallowed
//! so learning can never block an authorization decision.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::authorize::{AuthLevel, SshRole};
use crate::classify::{Classifier, RecommendedAction, RiskLevel};

/// Statistics for one blocked command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStats {
    pub command: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Deduplicated, in first-seen order.
    pub users: Vec<String>,
    /// Deduplicated, in first-seen order.
    pub hosts: Vec<String>,
    /// Cached from the first classification.
    pub risk_level: RiskLevel,
    pub category: String,
}

/// A ranked whitelist-extension proposal.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub command: String,
    pub count: u64,
    pub users: Vec<String>,
    pub hosts: Vec<String>,
    pub age_hours: i64,
    pub risk_level: RiskLevel,
    pub category: String,
    pub suggested_level: Option<AuthLevel>,
    pub suggested_ssh_role: SshRole,
    pub rationale: String,
    pub can_auto_add: bool,
    pub recommended_action: RecommendedAction,
}

/// Aggregate view of the store.
#[derive(Debug, Clone, Serialize)]
pub struct LearningSummary {
    pub total_unique_commands: usize,
    pub total_block_attempts: u64,
    pub risk_breakdown: BTreeMap<String, u64>,
    pub category_breakdown: BTreeMap<String, u64>,
    pub stats_file: String,
}

/// The collector. All mutation happens under one lock; the on-disk
/// document always reflects a consistent snapshot.
pub struct LearningStore {
    path: PathBuf,
    classifier: Arc<Classifier>,
    stats: Mutex<BTreeMap<String, CommandStats>>,
}

impl LearningStore {
    /// Open a store at `path`, loading any existing document. Read
    /// failures (missing file, parse error) yield an empty store.
    #[must_use]
    pub fn new(path: PathBuf, classifier: Arc<Classifier>) -> Self {
        let stats = load_stats(&path);
        Self {
            path,
            classifier,
            stats: Mutex::new(stats),
        }
    }

    /// Record a blocked command attempt. Upserts the entry, bumps the
    /// counter, and persists best-effort.
    pub fn record(&self, command: &str, user: &str, host: &str) {
        let now = Utc::now();
        let mut stats = self.stats.lock().expect("learning store lock poisoned");

        let entry = stats.entry(command.to_string()).or_insert_with(|| {
            let analysis = self.classifier.classify(command);
            CommandStats {
                command: command.to_string(),
                count: 0,
                first_seen: now,
                last_seen: now,
                users: Vec::new(),
                hosts: Vec::new(),
                risk_level: analysis.risk,
                category: analysis.category,
            }
        });

        entry.count += 1;
        entry.last_seen = now;
        if !entry.users.iter().any(|u| u == user) {
            entry.users.push(user.to_string());
        }
        if !entry.hosts.iter().any(|h| h == host) {
            entry.hosts.push(host.to_string());
        }

        self.persist(&stats);
    }

    /// Stats for one command, if tracked.
    pub fn stats_for(&self, command: &str) -> Option<CommandStats> {
        self.stats
            .lock()
            .expect("learning store lock poisoned")
            .get(command)
            .cloned()
    }

    /// All tracked commands.
    pub fn all_stats(&self) -> Vec<CommandStats> {
        self.stats
            .lock()
            .expect("learning store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// The `limit` most frequently blocked commands, by count descending.
    pub fn top_blocked(&self, limit: usize) -> Vec<CommandStats> {
        let mut all = self.all_stats();
        all.sort_by(|a, b| b.count.cmp(&a.count));
        all.truncate(limit);
        all
    }

    /// Whitelist-extension suggestions, ranked by count descending.
    ///
    /// A command qualifies iff its count reaches `min_count`, its first
    /// sighting is at least `min_age_hours` old, and its cached risk does
    /// not exceed `max_risk` (default `LOW`; UNKNOWN never qualifies under
    /// any ceiling below UNKNOWN).
    pub fn suggestions(
        &self,
        min_count: u64,
        min_age_hours: i64,
        max_risk: RiskLevel,
    ) -> Vec<Suggestion> {
        let now = Utc::now();
        let snapshot = self.all_stats();

        let mut suggestions: Vec<Suggestion> = snapshot
            .into_iter()
            .filter(|entry| entry.count >= min_count)
            .filter_map(|entry| {
                let age_hours = (now - entry.first_seen).num_hours();
                if age_hours < min_age_hours {
                    return None;
                }
                if entry.risk_level.rank() > max_risk.rank() {
                    return None;
                }

                let analysis = self.classifier.classify(&entry.command);
                Some(Suggestion {
                    command: entry.command,
                    count: entry.count,
                    users: entry.users,
                    hosts: entry.hosts,
                    age_hours,
                    risk_level: entry.risk_level,
                    category: entry.category,
                    suggested_level: analysis.suggested_level,
                    suggested_ssh_role: analysis.suggested_role,
                    rationale: analysis.rationale,
                    can_auto_add: Classifier::can_auto_add(entry.risk_level),
                    recommended_action: analysis.recommended_action,
                })
            })
            .collect();

        suggestions.sort_by(|a, b| b.count.cmp(&a.count));
        suggestions
    }

    /// Clear one command, or everything.
    pub fn clear(&self, command: Option<&str>) {
        let mut stats = self.stats.lock().expect("learning store lock poisoned");
        match command {
            Some(cmd) => {
                stats.remove(cmd);
            }
            None => stats.clear(),
        }
        self.persist(&stats);
    }

    /// Aggregate totals and breakdowns.
    pub fn summary(&self) -> LearningSummary {
        let stats = self.stats.lock().expect("learning store lock poisoned");

        let mut risk_breakdown: BTreeMap<String, u64> = BTreeMap::new();
        let mut category_breakdown: BTreeMap<String, u64> = BTreeMap::new();
        for entry in stats.values() {
            *risk_breakdown.entry(entry.risk_level.to_string()).or_default() += 1;
            *category_breakdown.entry(entry.category.clone()).or_default() += 1;
        }

        LearningSummary {
            total_unique_commands: stats.len(),
            total_block_attempts: stats.values().map(|e| e.count).sum(),
            risk_breakdown,
            category_breakdown,
            stats_file: self.path.display().to_string(),
        }
    }

    /// Full-document rewrite under the lock. Failures are warnings, never
    /// errors: losing an update is preferred over corrupting the document
    /// or blocking a decision.
    fn persist(&self, stats: &BTreeMap<String, CommandStats>) {
        let result = (|| -> crate::error::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(stats)?;
            std::fs::write(&self.path, json)?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!("could not save learning stats to {}: {e}", self.path.display());
        }
    }
}

fn load_stats(path: &Path) -> BTreeMap<String, CommandStats> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("learning stats file {} is corrupt, starting empty: {e}", path.display());
                BTreeMap::new()
            }
        },
        Err(e) => {
            debug!("learning stats file {} unreadable, starting empty: {e}", path.display());
            BTreeMap::new()
        }
    }
}
