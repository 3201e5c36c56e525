//! Lifetime statistics, mission history and the step-sync cursor.
//!
//! Everything is stored as JSON text in a [`KvStore`], so the same journal
//! works over the local SQLite database and any remote backend.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::kv::KvStore;
use crate::error::StorageError;
use crate::mission::CompletedMission;

pub const USER_STATS_KEY: &str = "stepquest/user_stats";
pub const MISSION_HISTORY_KEY: &str = "stepquest/mission_history";
pub const SYNC_CURSOR_KEY: &str = "stepquest/last_synced_steps";
pub const DEVICE_ID_KEY: &str = "stepquest/device_id";

/// Persisted lifetime counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeStats {
    pub total_steps: u64,
    pub total_missions: u64,
    pub total_distance_km: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for LifetimeStats {
    fn default() -> Self {
        Self {
            total_steps: 0,
            total_missions: 0,
            total_distance_km: 0.0,
            last_updated: Utc::now(),
        }
    }
}

impl LifetimeStats {
    pub fn is_empty(&self) -> bool {
        self.total_steps == 0 && self.total_missions == 0
    }
}

/// Result of [`Journal::merge_into`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub steps_added: u64,
    pub missions_added: u64,
    pub missions_copied: usize,
    pub duplicates_skipped: usize,
}

#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").finish_non_exhaustive()
    }
}

impl Journal {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
        serde_json::to_string(value).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Lifetime stats, zeroed when nothing has been recorded yet.
    pub fn stats(&self) -> Result<LifetimeStats, StorageError> {
        Ok(self.read(USER_STATS_KEY)?.unwrap_or_default())
    }

    /// Completed missions, most recent first.
    pub fn history(&self) -> Result<Vec<CompletedMission>, StorageError> {
        Ok(self.read(MISSION_HISTORY_KEY)?.unwrap_or_default())
    }

    /// Steps already credited to the lifetime total.
    pub fn sync_cursor(&self) -> Result<u64, StorageError> {
        Ok(self.read(SYNC_CURSOR_KEY)?.unwrap_or(0))
    }

    pub fn device_id(&self) -> Result<Option<String>, StorageError> {
        self.read(DEVICE_ID_KEY)
    }

    pub fn has_data(&self) -> Result<bool, StorageError> {
        Ok(!self.stats()?.is_empty() || !self.history()?.is_empty())
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub fn save_sync_cursor(&self, cursor: u64) -> Result<(), StorageError> {
        self.store
            .set(SYNC_CURSOR_KEY, &Self::encode(SYNC_CURSOR_KEY, &cursor)?)
    }

    /// Credit `delta` steps to the lifetime total and move the cursor to
    /// `new_cursor` in one atomic write.
    pub fn commit_steps(
        &self,
        delta: u64,
        new_cursor: u64,
        step_length_m: f64,
    ) -> Result<LifetimeStats, StorageError> {
        let mut stats = self.stats()?;
        stats.total_steps += delta;
        stats.total_distance_km += delta as f64 * step_length_m / 1000.0;
        stats.last_updated = Utc::now();

        self.store.set_many(&[
            (USER_STATS_KEY, Self::encode(USER_STATS_KEY, &stats)?),
            (SYNC_CURSOR_KEY, Self::encode(SYNC_CURSOR_KEY, &new_cursor)?),
        ])?;
        tracing::debug!(delta, new_cursor, total = stats.total_steps, "committed steps");
        Ok(stats)
    }

    /// Prepend a completed mission and bump `totalMissions`.
    ///
    /// Returns false without writing when a record with the same id exists.
    pub fn record_completed_mission(
        &self,
        mission: &CompletedMission,
    ) -> Result<bool, StorageError> {
        let mut history = self.history()?;
        if history.iter().any(|m| m.id == mission.id) {
            tracing::debug!(mission_id = %mission.id, "mission already recorded");
            return Ok(false);
        }
        history.insert(0, mission.clone());

        let mut stats = self.stats()?;
        stats.total_missions += 1;
        stats.last_updated = Utc::now();

        self.store.set_many(&[
            (MISSION_HISTORY_KEY, Self::encode(MISSION_HISTORY_KEY, &history)?),
            (USER_STATS_KEY, Self::encode(USER_STATS_KEY, &stats)?),
        ])?;
        tracing::info!(mission_id = %mission.id, total_missions = stats.total_missions, "recorded mission");
        Ok(true)
    }

    /// Wipe stats and history. The sync cursor is kept so steps already
    /// credited today are not credited again.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.store.remove(&[USER_STATS_KEY, MISSION_HISTORY_KEY])?;
        tracing::info!("cleared journal");
        Ok(())
    }

    /// One-time merge of this (offline) journal into `target`.
    ///
    /// Stats are added, missions copied most-recent-first skipping ids the
    /// target already holds, and the device id stamped on the target. The
    /// source is cleared only after the target write succeeded.
    pub fn merge_into(
        &self,
        target: &Journal,
        device_id: &str,
    ) -> Result<MergeSummary, StorageError> {
        let local_stats = self.stats()?;
        let local_history = self.history()?;
        if local_stats.is_empty() && local_history.is_empty() {
            return Ok(MergeSummary::default());
        }

        let mut stats = target.stats()?;
        stats.total_steps += local_stats.total_steps;
        stats.total_missions += local_stats.total_missions;
        stats.total_distance_km += local_stats.total_distance_km;
        stats.last_updated = Utc::now();

        let mut history = target.history()?;
        let mut summary = MergeSummary {
            steps_added: local_stats.total_steps,
            missions_added: local_stats.total_missions,
            ..MergeSummary::default()
        };
        for mission in local_history {
            if history.iter().any(|m| m.id == mission.id) {
                summary.duplicates_skipped += 1;
            } else {
                history.push(mission);
                summary.missions_copied += 1;
            }
        }
        history.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        target.store.set_many(&[
            (USER_STATS_KEY, Self::encode(USER_STATS_KEY, &stats)?),
            (MISSION_HISTORY_KEY, Self::encode(MISSION_HISTORY_KEY, &history)?),
            (DEVICE_ID_KEY, Self::encode(DEVICE_ID_KEY, &device_id)?),
        ])?;
        self.clear_all()?;

        tracing::info!(
            steps = summary.steps_added,
            copied = summary.missions_copied,
            skipped = summary.duplicates_skipped,
            "merged journal"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::Vibe;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn journal() -> Journal {
        Journal::new(Arc::new(MemoryStore::new()))
    }

    fn completed(id: &str, hour: u32) -> CompletedMission {
        CompletedMission {
            id: id.into(),
            title: "Urban Explorer's Path".into(),
            description: "Find a street you've never walked.".into(),
            vibe: Vibe::Discovery,
            step_target: 2500,
            steps_completed: 2510,
            reward_text: "You found a hidden mural.".into(),
            completed_at: Utc.with_ymd_and_hms(2026, 5, 4, hour, 0, 0).unwrap(),
            duration_minutes: 31,
            route_coordinates: Vec::new(),
        }
    }

    #[test]
    fn empty_journal_has_defaults() {
        let journal = journal();
        assert_eq!(journal.stats().unwrap().total_steps, 0);
        assert!(journal.history().unwrap().is_empty());
        assert_eq!(journal.sync_cursor().unwrap(), 0);
        assert!(!journal.has_data().unwrap());
    }

    #[test]
    fn commit_steps_adds_steps_distance_and_cursor() {
        let journal = journal();
        journal.commit_steps(1000, 1000, 0.762).unwrap();
        let stats = journal.commit_steps(500, 1500, 0.762).unwrap();

        assert_eq!(stats.total_steps, 1500);
        assert!((stats.total_distance_km - 1.143).abs() < 1e-9);
        assert_eq!(journal.sync_cursor().unwrap(), 1500);
        assert_eq!(journal.stats().unwrap(), stats);
    }

    #[test]
    fn record_prepends_and_counts_once() {
        let journal = journal();
        assert!(journal.record_completed_mission(&completed("a", 9)).unwrap());
        assert!(journal.record_completed_mission(&completed("b", 10)).unwrap());
        assert!(!journal.record_completed_mission(&completed("b", 10)).unwrap());

        let ids: Vec<_> = journal.history().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(journal.stats().unwrap().total_missions, 2);
    }

    #[test]
    fn clear_all_keeps_cursor() {
        let journal = journal();
        journal.commit_steps(300, 300, 0.762).unwrap();
        journal.record_completed_mission(&completed("a", 9)).unwrap();
        journal.clear_all().unwrap();

        assert!(!journal.has_data().unwrap());
        assert_eq!(journal.sync_cursor().unwrap(), 300);
    }

    #[test]
    fn corrupt_record_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set(USER_STATS_KEY, "{not json").unwrap();
        let journal = Journal::new(store);
        assert!(matches!(
            journal.stats(),
            Err(StorageError::Corrupt { ref key, .. }) if key == USER_STATS_KEY
        ));
    }

    #[test]
    fn reads_camel_case_records() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                USER_STATS_KEY,
                r#"{"totalSteps":12,"totalMissions":1,"totalDistanceKm":0.5,"lastUpdated":"2026-05-04T09:00:00Z"}"#,
            )
            .unwrap();
        let stats = Journal::new(store).stats().unwrap();
        assert_eq!(stats.total_steps, 12);
        assert_eq!(stats.total_missions, 1);
    }

    #[test]
    fn merge_adds_stats_and_skips_duplicates() {
        let local = journal();
        let cloud = journal();
        local.commit_steps(400, 400, 0.762).unwrap();
        local.record_completed_mission(&completed("a", 9)).unwrap();
        local.record_completed_mission(&completed("c", 11)).unwrap();
        cloud.commit_steps(1000, 1000, 0.762).unwrap();
        cloud.record_completed_mission(&completed("b", 10)).unwrap();
        cloud.record_completed_mission(&completed("a", 9)).unwrap();

        let summary = local.merge_into(&cloud, "stepquest-test").unwrap();
        assert_eq!(summary.missions_copied, 1);
        assert_eq!(summary.duplicates_skipped, 1);

        let stats = cloud.stats().unwrap();
        assert_eq!(stats.total_steps, 1400);
        assert_eq!(stats.total_missions, 4);
        let ids: Vec<_> = cloud.history().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(cloud.device_id().unwrap().as_deref(), Some("stepquest-test"));

        assert!(!local.has_data().unwrap());
        assert_eq!(local.sync_cursor().unwrap(), 400);
    }

    #[test]
    fn merge_of_empty_journal_is_noop() {
        let local = journal();
        let cloud = journal();
        assert_eq!(local.merge_into(&cloud, "stepquest-x").unwrap(), MergeSummary::default());
        assert!(cloud.device_id().unwrap().is_none());
    }
}
