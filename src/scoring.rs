//! Round scoring.
//!
//! One pass over a round's matches produces both the points a user earns and
//! the attempted/correct counts the tie-break tracker consumes. Matches that
//! are off never count as attempted; a joker on them still earns the point.

use crate::types::{Match, MatchId, Pick, Username};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Flat points for getting every attempted match right
pub const PERFECT_ROUND_BONUS: u32 = 2;

/// Everyone's picks for one round
pub type RoundPicks = HashMap<Username, HashMap<MatchId, Pick>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundTally {
    /// Per-match points plus any bonus
    pub points: u32,
    /// Matches that are on and resulted
    pub attempted: u32,
    /// Attempted matches scored as correct (joker included)
    pub correct: u32,
}

impl RoundTally {
    pub fn bonus_hit(&self) -> bool {
        self.attempted > 0 && self.correct == self.attempted
    }

    /// Exactly one attempted match missed
    pub fn near_perfect(&self) -> bool {
        self.attempted > 1 && self.correct + 1 == self.attempted
    }
}

/// Score one user's picks against the round
pub fn tally(matches: &[Match], picks: &HashMap<MatchId, Pick>) -> RoundTally {
    let mut t = RoundTally::default();

    for m in matches {
        let pick = picks.get(&m.id);

        if m.off {
            if pick.is_some_and(Pick::is_joker) {
                t.points += 1;
            }
            continue;
        }

        let Some(result) = m.result else {
            continue;
        };

        t.attempted += 1;
        if pick.is_some_and(|p| p.scores_against(result)) {
            t.points += 1;
            t.correct += 1;
        }
    }

    if t.bonus_hit() {
        t.points += PERFECT_ROUND_BONUS;
    }
    t
}

/// Score every user who has at least one pick in the round
pub fn score_round(matches: &[Match], picks: &RoundPicks) -> BTreeMap<Username, RoundTally> {
    picks
        .iter()
        .filter(|(_, user_picks)| !user_picks.is_empty())
        .map(|(username, user_picks)| (username.clone(), tally(matches, user_picks)))
        .collect()
}

/// Overlay joker usage onto stored picks for the matches of this round.
///
/// A joker replaces whatever the user picked for that match.
pub fn apply_jokers<'a>(
    picks: &mut RoundPicks,
    matches: &[Match],
    jokers: impl IntoIterator<Item = (&'a Username, &'a [MatchId])>,
) {
    for (username, used) in jokers {
        for match_id in used {
            if matches.iter().any(|m| &m.id == match_id) {
                picks
                    .entry(username.clone())
                    .or_default()
                    .insert(match_id.clone(), Pick::Help);
            }
        }
    }
}
