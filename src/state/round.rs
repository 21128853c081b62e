use super::{active_mut, AppState};
use crate::error::{ContestResult, Refusal};
use crate::scoring::{apply_jokers, score_round, RoundTally};
use crate::types::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// What one scoring pass produced
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub contest: ContestCode,
    pub round: u32,
    pub scores: BTreeMap<Username, RoundTally>,
}

impl AppState {
    /// Freeze the round's results and credit its points exactly once.
    ///
    /// Every guard runs before anything is written, so a refusal leaves the
    /// contest, the ledger and the tie-break stats untouched.
    pub async fn lock_final_results(&self, code: &str) -> ContestResult<RoundSummary> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.results_locked {
            return Err(Refusal::ResultsAlreadyLocked.into());
        }
        let missing = contest
            .matches
            .iter()
            .filter(|m| !m.off && m.result.is_none())
            .count();
        if missing > 0 {
            return Err(Refusal::ResultsMissing(missing).into());
        }
        if contest.last_scored_round == contest.round {
            return Err(Refusal::RoundAlreadyScored(contest.round).into());
        }

        let round = contest.round;
        let mut picks = self.predictions.round_predictions(code, round).await?;
        let entitlements = self.entitlements.contest_entitlements(code).await?;
        apply_jokers(
            &mut picks,
            &contest.matches,
            entitlements
                .iter()
                .map(|(user, e)| (user, e.used_match_ids.as_slice())),
        );

        let scores = score_round(&contest.matches, &picks);

        self.ledgers
            .write()
            .await
            .entry(code.to_string())
            .or_default()
            .credit_round(round, scores.iter().map(|(u, t)| (u.clone(), t.points)));

        {
            let mut tie_stats = self.tie_stats.write().await;
            let per_user = tie_stats.entry(code.to_string()).or_default();
            for (username, tally) in &scores {
                per_user.entry(username.clone()).or_default().record_round(tally);
            }
        }

        contest.flags.results_locked = true;
        contest.last_scored_round = round;
        contest.final_winner = None;
        self.commit(contest);

        tracing::info!(
            "Contest {} round {} locked: {} participant(s) scored",
            code,
            round,
            scores.len()
        );

        Ok(RoundSummary {
            contest: code.to_string(),
            round,
            scores,
        })
    }

    /// Clear the match list and open the next round.
    ///
    /// Cumulative points and tie-break stats carry over.
    pub async fn next_round(&self, code: &str) -> ContestResult<Contest> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if !contest.flags.results_locked {
            return Err(Refusal::ResultsNotLocked.into());
        }

        contest.matches.clear();
        contest.round += 1;
        contest.flags.matches_locked = false;
        contest.flags.results_locked = false;
        contest.flags.round_closed = false;
        contest.final_winner = None;

        self.round_locks
            .write()
            .await
            .retain(|lock| lock.contest != code);

        self.commit(contest);

        tracing::info!("Contest {} advanced to round {}", code, contest.round);
        Ok(contest.clone())
    }
}
