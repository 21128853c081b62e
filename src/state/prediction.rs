use super::{active, AppState};
use crate::deadline::{deadline, deadline_passed};
use crate::error::{ContestError, ContestResult, Refusal};
use crate::store::PredictionKey;
use crate::types::*;
use crate::users::is_late_joiner;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Provisional state of one pick as shown to the participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStatus {
    Pending,
    Correct,
    Wrong,
    /// Joker spent, result not in yet
    Joker,
}

/// Status a participant sees before the round is scored
pub fn provisional_status(
    off: bool,
    result: Option<Outcome>,
    pick: Option<Pick>,
    joker: bool,
) -> PickStatus {
    if off {
        return if joker { PickStatus::Correct } else { PickStatus::Wrong };
    }
    match result {
        None if joker => PickStatus::Joker,
        None => PickStatus::Pending,
        Some(_) if joker => PickStatus::Correct,
        Some(result) => match pick {
            Some(p) if p.scores_against(result) => PickStatus::Correct,
            Some(_) => PickStatus::Wrong,
            None => PickStatus::Pending,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub match_id: MatchId,
    pub n: u32,
    pub date: String,
    pub time: String,
    pub home: String,
    pub away: String,
    pub off: bool,
    pub result: Option<Outcome>,
    pub pick: Option<Pick>,
    pub joker: bool,
    pub status: PickStatus,
}

/// One participant's view of the current round
#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub contest: ContestCode,
    pub round: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub deadline_passed: bool,
    pub self_locked: bool,
    pub late_joiner: bool,
    /// No further pick changes accepted
    pub picks_frozen: bool,
    /// `None` without a joker purchase
    pub jokers_remaining: Option<u32>,
    pub matches: Vec<MatchView>,
}

impl AppState {
    pub(super) async fn is_round_locked_for(&self, contest: &Contest, username: &str) -> bool {
        self.round_locks.read().await.contains(&RoundLockKey {
            contest: contest.code.clone(),
            round: contest.round,
            username: username.to_string(),
        })
    }

    async fn late_joiner(&self, contest: &Contest, username: &str) -> bool {
        if contest.started_at.is_none() || contest.eligible_users.contains(username) {
            return false;
        }
        let user = self.lookup_user(username).await;
        is_late_joiner(contest, username, user.as_ref())
    }

    /// Set or clear (`None`) one pick for the current round
    pub async fn submit_prediction(
        &self,
        code: &str,
        username: &str,
        match_id: &str,
        pick: Option<Pick>,
    ) -> ContestResult<Option<Pick>> {
        let contests = self.contests.write().await;
        let contest = active(&contests, code)?;

        if contest.find_match(match_id).is_none() {
            return Err(ContestError::MatchNotFound(match_id.to_string()));
        }
        if pick.is_some_and(|p| p.is_joker()) {
            return Err(Refusal::JokerNotAPick.into());
        }
        if contest.flags.results_locked {
            return Err(Refusal::ResultsLocked.into());
        }
        if self.late_joiner(contest, username).await {
            return Err(Refusal::LateJoiner.into());
        }
        if self.is_round_locked_for(contest, username).await {
            return Err(Refusal::PicksLocked.into());
        }
        if deadline_passed(&contest.matches, self.now()) {
            return Err(Refusal::DeadlinePassed.into());
        }

        let key = PredictionKey {
            username: username.to_string(),
            contest: code.to_string(),
            round: contest.round,
            match_id: match_id.to_string(),
        };
        self.predictions.put_prediction(key, pick).await?;

        tracing::debug!(
            "{} picked {:?} for match {} (contest {} round {})",
            username,
            pick,
            match_id,
            code,
            contest.round
        );
        Ok(pick)
    }

    /// Participant freezes their own picks for the current round
    pub async fn lock_picks(&self, code: &str, username: &str) -> ContestResult<RoundLockKey> {
        let contests = self.contests.write().await;
        let contest = active(&contests, code)?;

        if self.late_joiner(contest, username).await {
            return Err(Refusal::LateJoiner.into());
        }
        if deadline_passed(&contest.matches, self.now()) {
            return Err(Refusal::DeadlinePassed.into());
        }

        let key = RoundLockKey {
            contest: code.to_string(),
            round: contest.round,
            username: username.to_string(),
        };
        if !self.round_locks.write().await.insert(key.clone()) {
            return Err(Refusal::PicksLocked.into());
        }

        tracing::info!("{} locked picks for contest {} round {}", username, code, contest.round);
        Ok(key)
    }

    /// Current round as one participant sees it, with provisional statuses
    /// taken from the durable results table
    pub async fn round_view(&self, code: &str, username: &str) -> ContestResult<RoundView> {
        let contests = self.contests.read().await;
        let contest = active(&contests, code)?;
        let round = contest.round;
        let now = self.now();

        let rows = self.results.round_results(code, round).await?;
        let picks = self
            .predictions
            .round_predictions(code, round)
            .await?
            .remove(username)
            .unwrap_or_default();
        let entitlement = self.entitlements.get_entitlement(username, code).await?;

        let matches = contest
            .matches
            .iter()
            .map(|m| {
                let (off, result) = match rows.get(&m.id) {
                    Some(row) => (row.is_off, row.result),
                    None => (m.off, m.result),
                };
                let pick = picks.get(&m.id).copied();
                let joker = entitlement.as_ref().is_some_and(|e| e.is_used_on(&m.id));
                MatchView {
                    match_id: m.id.clone(),
                    n: m.n,
                    date: m.date.clone(),
                    time: m.time.clone(),
                    home: m.home.clone(),
                    away: m.away.clone(),
                    off,
                    result,
                    pick,
                    joker,
                    status: provisional_status(off, result, pick, joker),
                }
            })
            .collect();

        let self_locked = self.is_round_locked_for(contest, username).await;
        let late_joiner = self.late_joiner(contest, username).await;
        let passed = deadline_passed(&contest.matches, now);

        Ok(RoundView {
            contest: code.to_string(),
            round,
            deadline: deadline(&contest.matches),
            deadline_passed: passed,
            self_locked,
            late_joiner,
            picks_frozen: self_locked || passed || late_joiner || contest.flags.results_locked,
            jokers_remaining: entitlement.map(|e| e.remaining),
            matches,
        })
    }

    /// Sorted usernames with at least one pick in the current round
    pub async fn participants(&self, code: &str) -> ContestResult<Vec<Username>> {
        let round = {
            let contests = self.contests.read().await;
            active(&contests, code)?.round
        };

        let mut names: Vec<_> = self
            .predictions
            .round_predictions(code, round)
            .await?
            .into_iter()
            .filter(|(_, picks)| !picks.is_empty())
            .map(|(username, _)| username)
            .collect();
        names.sort();
        Ok(names)
    }
}
