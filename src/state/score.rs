use crate::error::ContestResult;
use crate::state::AppState;
use crate::tiebreak::leaderboard_order;
use crate::types::*;
use std::collections::BTreeSet;

impl AppState {
    /// Standings for a contest, best first
    pub async fn leaderboard(&self, code: &str) -> ContestResult<Vec<LeaderboardEntry>> {
        self.ensure_contest(code).await?;
        Ok(self.build_leaderboard(code).await)
    }

    /// Rank everyone with points or tie-break history. Callers may hold the
    /// contests lock; this only touches ledgers and tie_stats.
    pub(super) async fn build_leaderboard(&self, code: &str) -> Vec<LeaderboardEntry> {
        let totals = self
            .ledgers
            .read()
            .await
            .get(code)
            .map(ScoreLedger::totals)
            .unwrap_or_default();
        let tie_stats = self.tie_stats.read().await;
        let stats = tie_stats.get(code);

        let usernames: BTreeSet<&Username> = totals
            .keys()
            .chain(stats.into_iter().flat_map(|s| s.keys()))
            .collect();

        let mut entries: Vec<LeaderboardEntry> = usernames
            .into_iter()
            .map(|username| {
                let s = stats.and_then(|s| s.get(username)).copied().unwrap_or_default();
                LeaderboardEntry {
                    username: username.clone(),
                    total_points: totals.get(username).copied().unwrap_or(0),
                    bonus_count: s.bonus_count,
                    longest_bonus_streak: s.bonus_streak_max,
                    near_perfect_rounds: s.near_perfect_count,
                }
            })
            .collect();

        entries.sort_by(leaderboard_order);
        entries
    }
}
