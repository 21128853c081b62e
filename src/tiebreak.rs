//! Cross-round statistics used to break ties on cumulative points.

use crate::scoring::RoundTally;
use crate::types::LeaderboardEntry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieBreakStats {
    pub bonus_count: u32,
    pub bonus_streak_current: u32,
    pub bonus_streak_max: u32,
    pub near_perfect_count: u32,
}

impl TieBreakStats {
    /// Fold one locked round into the running stats
    pub fn record_round(&mut self, tally: &RoundTally) {
        if tally.bonus_hit() {
            self.bonus_count += 1;
            self.bonus_streak_current += 1;
        } else {
            self.bonus_streak_current = 0;
        }
        self.bonus_streak_max = self.bonus_streak_max.max(self.bonus_streak_current);

        if tally.near_perfect() {
            self.near_perfect_count += 1;
        }
    }
}

/// Points, then bonus rounds, longest streak, near-perfect rounds, then name
pub fn leaderboard_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| b.bonus_count.cmp(&a.bonus_count))
        .then_with(|| b.longest_bonus_streak.cmp(&a.longest_bonus_streak))
        .then_with(|| b.near_perfect_rounds.cmp(&a.near_perfect_rounds))
        .then_with(|| a.username.cmp(&b.username))
}
