//! State export/import for backup and restoration.
//!
//! Covers everything held in process plus the contents of the pick, results
//! and entitlement stores, so a restart keeps a running round intact.

use super::AppState;
use crate::error::StoreError;
use crate::store::{MatchResultRow, PredictionKey, ResultKey, StoreResult};
use crate::tiebreak::TieBreakStats;
use crate::types::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(flatten)]
    pub key: PredictionKey,
    pub pick: Pick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(flatten)]
    pub key: ResultKey,
    #[serde(flatten)]
    pub row: MatchResultRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementRow {
    pub contest: ContestCode,
    pub username: Username,
    #[serde(flatten)]
    pub entitlement: Entitlement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub contests: HashMap<ContestCode, Contest>,
    #[serde(default)]
    pub ledgers: HashMap<ContestCode, ScoreLedger>,
    #[serde(default)]
    pub tie_stats: HashMap<ContestCode, HashMap<Username, TieBreakStats>>,
    #[serde(default)]
    pub round_locks: Vec<RoundLockKey>,
    #[serde(default)]
    pub next_contest_start: Option<NaiveDate>,
    // Store contents; absent in version 1 exports
    #[serde(default)]
    pub predictions: Vec<PredictionRow>,
    #[serde(default)]
    pub results: Vec<ResultRow>,
    #[serde(default)]
    pub entitlements: Vec<EntitlementRow>,
}

impl StateExport {
    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        for (code, contest) in &self.contests {
            if *code != contest.code {
                return Err(format!(
                    "Contest keyed as '{}' carries code '{}'",
                    code, contest.code
                ));
            }
            if contest.last_scored_round > contest.round {
                return Err(format!(
                    "Contest '{}' was scored for round {} but is only at round {}",
                    code, contest.last_scored_round, contest.round
                ));
            }
            let mut seen = HashSet::new();
            for m in &contest.matches {
                if !seen.insert(&m.id) {
                    return Err(format!("Contest '{}' lists match '{}' twice", code, m.id));
                }
            }
        }

        for code in self.ledgers.keys() {
            if !self.contests.contains_key(code) {
                return Err(format!("Score ledger references unknown contest '{}'", code));
            }
        }

        for code in self.tie_stats.keys() {
            if !self.contests.contains_key(code) {
                return Err(format!("Tie-break stats reference unknown contest '{}'", code));
            }
        }

        for lock in &self.round_locks {
            if !self.contests.contains_key(&lock.contest) {
                return Err(format!(
                    "Round lock for '{}' references unknown contest '{}'",
                    lock.username, lock.contest
                ));
            }
        }

        let store_contests = self
            .predictions
            .iter()
            .map(|p| &p.key.contest)
            .chain(self.results.iter().map(|r| &r.key.contest))
            .chain(self.entitlements.iter().map(|e| &e.contest));
        for code in store_contests {
            if !self.contests.contains_key(code) {
                return Err(format!("Stored row references unknown contest '{}'", code));
            }
        }

        Ok(())
    }
}

impl AppState {
    /// Snapshot everything held in memory and in the stores
    pub async fn export_state(&self) -> StoreResult<StateExport> {
        let contests = self.contests.read().await.clone();
        let ledgers = self.ledgers.read().await.clone();
        let tie_stats = self.tie_stats.read().await.clone();
        let mut round_locks: Vec<_> = self.round_locks.read().await.iter().cloned().collect();
        round_locks.sort_by(|a, b| {
            (&a.contest, a.round, &a.username).cmp(&(&b.contest, b.round, &b.username))
        });

        let mut predictions: Vec<_> = self
            .predictions
            .all_predictions()
            .await?
            .into_iter()
            .map(|(key, pick)| PredictionRow { key, pick })
            .collect();
        predictions.sort_by(|a, b| {
            (&a.key.contest, a.key.round, &a.key.match_id, &a.key.username).cmp(&(
                &b.key.contest,
                b.key.round,
                &b.key.match_id,
                &b.key.username,
            ))
        });

        let mut results: Vec<_> = self
            .results
            .all_results()
            .await?
            .into_iter()
            .map(|(key, row)| ResultRow { key, row })
            .collect();
        results.sort_by(|a, b| {
            (&a.key.contest, a.key.round, &a.key.match_id)
                .cmp(&(&b.key.contest, b.key.round, &b.key.match_id))
        });

        let mut entitlements: Vec<_> = self
            .entitlements
            .all_entitlements()
            .await?
            .into_iter()
            .map(|(contest, username, entitlement)| EntitlementRow {
                contest,
                username,
                entitlement,
            })
            .collect();
        entitlements.sort_by(|a, b| (&a.contest, &a.username).cmp(&(&b.contest, &b.username)));

        Ok(StateExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            contests,
            ledgers,
            tie_stats,
            round_locks,
            next_contest_start: *self.next_contest_start.read().await,
            predictions,
            results,
            entitlements,
        })
    }

    /// Replace in-memory state and store contents with an export.
    ///
    /// Stores are rewritten first; if that fails memory is left as it was.
    pub async fn import_state(&self, export: StateExport) -> Result<(), String> {
        export.validate()?;

        let mut contests = self.contests.write().await;
        self.restore_stores(&export)
            .await
            .map_err(|e| format!("Restoring stores failed: {}", e))?;

        *self.ledgers.write().await = export.ledgers;
        *self.tie_stats.write().await = export.tie_stats;
        *self.round_locks.write().await = export.round_locks.into_iter().collect();
        *self.next_contest_start.write().await = export.next_contest_start;
        *contests = export.contests;

        for contest in contests.values() {
            self.publish(contest);
        }

        tracing::info!(
            "Imported state with {} contest(s), {} pick(s), {} joker record(s) (exported at {})",
            contests.len(),
            export.predictions.len(),
            export.entitlements.len(),
            export.exported_at
        );
        Ok(())
    }

    async fn restore_stores(&self, export: &StateExport) -> StoreResult<()> {
        self.predictions.wipe().await?;
        self.results.wipe().await?;
        self.entitlements.wipe().await?;

        for p in &export.predictions {
            self.predictions
                .put_prediction(p.key.clone(), Some(p.pick))
                .await?;
        }
        // Row timestamps restart at import time
        for r in &export.results {
            self.results
                .upsert_result(r.key.clone(), r.row.result, r.row.is_off)
                .await?;
        }
        for e in &export.entitlements {
            self.entitlements
                .put_entitlement(&e.username, &e.contest, e.entitlement.clone())
                .await?;
        }
        Ok(())
    }

    /// Write the current export to `path`
    pub async fn save_to_file(&self, path: &Path) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(&self.export_state().await?)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Restore from a file written by [`AppState::save_to_file`]
    pub async fn load_from_file(&self, path: &Path) -> StoreResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let export: StateExport = serde_json::from_slice(&bytes)?;
        self.import_state(export)
            .await
            .map_err(StoreError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    fn empty_export() -> StateExport {
        StateExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            contests: HashMap::new(),
            ledgers: HashMap::new(),
            tie_stats: HashMap::new(),
            round_locks: Vec::new(),
            next_contest_start: None,
            predictions: Vec::new(),
            results: Vec::new(),
            entitlements: Vec::new(),
        }
    }

    #[test]
    fn test_validation_future_schema() {
        let export = StateExport {
            schema_version: EXPORT_SCHEMA_VERSION + 1,
            ..empty_export()
        };

        let result = export.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("newer than supported"));
    }

    #[test]
    fn test_validation_orphaned_ledger() {
        let mut export = empty_export();
        export
            .ledgers
            .insert("GHOST".to_string(), ScoreLedger::default());

        let result = export.validate();
        assert!(result.unwrap_err().contains("unknown contest 'GHOST'"));
    }

    #[test]
    fn test_validation_scored_ahead_of_round() {
        let mut contest = Contest::new("ABCDE".to_string());
        contest.last_scored_round = 2;
        let mut export = empty_export();
        export.contests.insert(contest.code.clone(), contest);

        let result = export.validate();
        assert!(result.unwrap_err().contains("scored for round 2"));
    }

    #[test]
    fn test_validation_orphaned_store_rows() {
        let mut export = empty_export();
        export.entitlements.push(EntitlementRow {
            contest: "GHOST".to_string(),
            username: "anna".to_string(),
            entitlement: Entitlement::grant(3),
        });

        let result = export.validate();
        assert!(result.unwrap_err().contains("unknown contest 'GHOST'"));
    }

    #[tokio::test]
    async fn test_restore_keeps_running_round() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00", "20:00"]).await;
        let code = contest.code.clone();
        let (m1, m2) = (contest.matches[0].id.clone(), contest.matches[1].id.clone());

        state.submit_prediction(&code, "anna", &m1, Some(Pick::Home)).await.unwrap();
        state.submit_prediction(&code, "nikos", &m1, Some(Pick::Away)).await.unwrap();
        state.purchase_jokers(&code, "anna").await.unwrap();
        state.toggle_joker(&code, "anna", &m2).await.unwrap();
        state.record_result(&code, &m1, "1").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        state.save_to_file(&path).await.unwrap();

        let (restored, _clock) = morning_state();
        restored.load_from_file(&path).await.unwrap();

        assert_eq!(
            restored.participants(&code).await.unwrap(),
            vec!["anna".to_string(), "nikos".to_string()]
        );
        let jokers = restored.list_entitlements(&code).await.unwrap();
        assert_eq!(jokers["anna"].remaining, 2);
        assert_eq!(jokers["anna"].used_match_ids, vec![m2.clone()]);

        let view = restored.round_view(&code, "anna").await.unwrap();
        assert_eq!(view.matches[0].result, Some(Outcome::Home));
        assert_eq!(view.matches[0].pick, Some(Pick::Home));
        assert!(view.matches[1].joker);

        restored.record_result(&code, &m2, "X").await.unwrap();
        let summary = restored.lock_final_results(&code).await.unwrap();
        assert_eq!(summary.scores["anna"].points, 4);
        assert_eq!(summary.scores["nikos"].points, 0);
    }

    #[tokio::test]
    async fn test_file_roundtrip_restores_state() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let code = contest.code.clone();
        let id = contest.matches[0].id.clone();

        state
            .submit_prediction(&code, "anna", &id, Some(Pick::Home))
            .await
            .unwrap();
        state.lock_picks(&code, "anna").await.unwrap();
        state.record_result(&code, &id, "1").await.unwrap();
        state.lock_final_results(&code).await.unwrap();
        state
            .set_next_contest_start(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        state.save_to_file(&path).await.unwrap();

        let restored = AppState::new();
        restored.load_from_file(&path).await.unwrap();

        assert_eq!(restored.get_contest(&code).await, state.get_contest(&code).await);
        assert_eq!(
            restored.leaderboard(&code).await.unwrap(),
            state.leaderboard(&code).await.unwrap()
        );
        assert_eq!(restored.round_locks.read().await.len(), 1);
        assert_eq!(
            restored.next_contest_start().await,
            NaiveDate::from_ymd_opt(2026, 9, 1)
        );
    }
}
