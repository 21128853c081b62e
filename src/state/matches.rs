use super::{active_mut, AppState};
use crate::deadline::{deadline_passed, start_instant};
use crate::error::{ContestError, ContestResult, Refusal};
use crate::store::ResultKey;
use crate::types::*;
use serde::Deserialize;

/// Operator input for a new match
#[derive(Debug, Clone, Deserialize)]
pub struct NewMatch {
    pub date: String,
    pub time: String,
    pub home: String,
    pub away: String,
}

impl NewMatch {
    fn check_fields(&self) -> Result<(), Refusal> {
        for (name, value) in [
            ("date", &self.date),
            ("time", &self.time),
            ("home", &self.home),
            ("away", &self.away),
        ] {
            if value.trim().is_empty() {
                return Err(Refusal::MissingField(name));
            }
        }
        Ok(())
    }
}

impl AppState {
    /// Append a match to the current round
    pub async fn add_match(&self, code: &str, input: NewMatch) -> ContestResult<Match> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.results_locked {
            return Err(Refusal::ResultsLocked.into());
        }
        if deadline_passed(&contest.matches, self.now()) {
            return Err(Refusal::DeadlinePassed.into());
        }
        if contest.flags.matches_locked {
            return Err(Refusal::MatchesLocked.into());
        }
        if contest.matches.len() >= self.config.max_matches {
            return Err(Refusal::RoundFull(self.config.max_matches).into());
        }
        input.check_fields()?;

        let starts_at = start_instant(&input.date, &input.time, self.config.utc_offset);
        if starts_at.is_none() {
            tracing::warn!(
                "Match {} - {} has an unusable start '{} {}'; deadline stays open",
                input.home.trim(),
                input.away.trim(),
                input.date,
                input.time
            );
        }

        let m = Match {
            id: ulid::Ulid::new().to_string(),
            n: contest.matches.len() as u32 + 1,
            date: input.date.trim().to_string(),
            time: input.time.trim().to_string(),
            starts_at,
            home: input.home.trim().to_string(),
            away: input.away.trim().to_string(),
            off: false,
            result: None,
        };

        contest.matches.push(m.clone());
        self.commit(contest);

        tracing::debug!("Contest {} round {}: added match #{} {}", code, contest.round, m.n, m.id);
        Ok(m)
    }

    /// Flip a match between on and off. Turning it off clears its result.
    pub async fn toggle_off(&self, code: &str, match_id: &str) -> ContestResult<Match> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.results_locked {
            return Err(Refusal::ResultsLocked.into());
        }
        let current = contest
            .find_match(match_id)
            .ok_or_else(|| ContestError::MatchNotFound(match_id.to_string()))?;

        let off = !current.off;
        let result = if off { None } else { current.result };

        self.results
            .upsert_result(result_key(contest, match_id), result, off)
            .await?;

        let updated = {
            let m = contest
                .find_match_mut(match_id)
                .ok_or_else(|| ContestError::MatchNotFound(match_id.to_string()))?;
            m.off = off;
            m.result = result;
            m.clone()
        };
        self.commit(contest);

        tracing::info!("Contest {} match {} is now {}", code, match_id, if off { "off" } else { "on" });
        Ok(updated)
    }

    /// Record the final 1/X/2 result of a match
    pub async fn record_result(&self, code: &str, match_id: &str, raw: &str) -> ContestResult<Match> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.results_locked {
            return Err(Refusal::ResultsLocked.into());
        }
        let current = contest
            .find_match(match_id)
            .ok_or_else(|| ContestError::MatchNotFound(match_id.to_string()))?;
        if current.off {
            return Err(Refusal::MatchOff.into());
        }
        let outcome: Outcome = raw.parse().map_err(Refusal::InvalidOutcome)?;

        self.results
            .upsert_result(result_key(contest, match_id), Some(outcome), false)
            .await?;

        let updated = {
            let m = contest
                .find_match_mut(match_id)
                .ok_or_else(|| ContestError::MatchNotFound(match_id.to_string()))?;
            m.result = Some(outcome);
            m.clone()
        };
        self.commit(contest);

        tracing::info!("Contest {} match {} result: {}", code, match_id, outcome);
        Ok(updated)
    }

    /// Lock or unlock the current round's match list
    pub async fn toggle_matches_lock(&self, code: &str) -> ContestResult<Contest> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.results_locked {
            return Err(Refusal::ResultsLocked.into());
        }
        if deadline_passed(&contest.matches, self.now()) {
            return Err(Refusal::DeadlinePassed.into());
        }

        contest.flags.matches_locked = !contest.flags.matches_locked;
        self.commit(contest);

        tracing::info!(
            "Contest {} match list {}",
            code,
            if contest.flags.matches_locked { "locked" } else { "unlocked" }
        );
        Ok(contest.clone())
    }
}

fn result_key(contest: &Contest, match_id: &str) -> ResultKey {
    ResultKey {
        contest: contest.code.clone(),
        round: contest.round,
        match_id: match_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use crate::state::Backends;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn new_match(time: &str) -> NewMatch {
        NewMatch {
            date: "2026-05-02".to_string(),
            time: time.to_string(),
            home: "Panathinaikos".to_string(),
            away: "OFI".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_match_numbers_sequentially() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00", "20:00"]).await;

        assert_eq!(contest.matches.len(), 2);
        assert_eq!(contest.matches[0].n, 1);
        assert_eq!(contest.matches[1].n, 2);
        assert!(contest.matches.iter().all(|m| m.starts_at.is_some()));
        assert_ne!(contest.matches[0].id, contest.matches[1].id);
    }

    #[tokio::test]
    async fn test_add_match_guards() {
        let (state, clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let code = contest.code.clone();

        let mut blank = new_match("19:00");
        blank.away = "  ".to_string();
        let err = state.add_match(&code, blank).await.unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::MissingField("away")));

        state.toggle_matches_lock(&code).await.unwrap();
        let err = state.add_match(&code, new_match("19:00")).await.unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::MatchesLocked));
        state.toggle_matches_lock(&code).await.unwrap();

        clock.set(2026, 5, 2, 17, 55);
        let err = state.add_match(&code, new_match("19:00")).await.unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::DeadlinePassed));

        assert_eq!(state.get_contest(&code).await.unwrap().matches.len(), 1);
    }

    #[tokio::test]
    async fn test_round_holds_at_most_ten_matches() {
        let (state, _clock) = morning_state();
        let times = ["18:00"; 10];
        let contest = contest_with_matches(&state, &times).await;

        let err = state
            .add_match(&contest.code, new_match("21:00"))
            .await
            .unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::RoundFull(10)));
    }

    #[tokio::test]
    async fn test_unparsable_start_is_kept_without_instant() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;

        let m = state
            .add_match(&contest.code, new_match("evening"))
            .await
            .unwrap();
        assert!(m.starts_at.is_none());
    }

    #[tokio::test]
    async fn test_turning_off_clears_result_for_good() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let (code, id) = (contest.code.clone(), contest.matches[0].id.clone());

        state.record_result(&code, &id, "2").await.unwrap();

        let m = state.toggle_off(&code, &id).await.unwrap();
        assert!(m.off);
        assert!(m.result.is_none());

        let err = state.record_result(&code, &id, "1").await.unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::MatchOff));

        let m = state.toggle_off(&code, &id).await.unwrap();
        assert!(!m.off);
        assert!(m.result.is_none());

        let rows = state.results.round_results(&code, 1).await.unwrap();
        assert!(!rows[&id].is_off);
        assert_eq!(rows[&id].result, None);
    }

    #[tokio::test]
    async fn test_record_result_rejects_other_codes() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let (code, id) = (contest.code.clone(), contest.matches[0].id.clone());

        let err = state.record_result(&code, &id, "3").await.unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::InvalidOutcome("3".to_string())));

        let err = state.record_result(&code, "missing", "1").await.unwrap_err();
        assert!(matches!(err, ContestError::MatchNotFound(_)));

        let m = state.record_result(&code, &id, "X").await.unwrap();
        assert_eq!(m.result, Some(Outcome::Draw));
    }

    #[tokio::test]
    async fn test_failed_mirror_write_leaves_state_unchanged() {
        let results = Arc::new(FlakyResults::default());
        let clock = ManualClock::at(2026, 5, 2, 9, 0);
        let state = AppState::with_backends(
            utc_config(),
            Backends {
                results: results.clone(),
                ..Backends::in_memory()
            },
        )
        .with_clock(clock.clock());
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let (code, id) = (contest.code.clone(), contest.matches[0].id.clone());

        results.broken.store(true, Ordering::SeqCst);
        let before = state.get_contest(&code).await.unwrap();

        let err = state.record_result(&code, &id, "1").await.unwrap_err();
        assert!(matches!(err, ContestError::Store(_)));
        let err = state.toggle_off(&code, &id).await.unwrap_err();
        assert!(matches!(err, ContestError::Store(_)));

        assert_eq!(state.get_contest(&code).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_matches_lock_guards() {
        let (state, clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let code = contest.code.clone();

        assert!(state.toggle_matches_lock(&code).await.unwrap().flags.matches_locked);
        assert!(!state.toggle_matches_lock(&code).await.unwrap().flags.matches_locked);

        clock.set(2026, 5, 2, 18, 30);
        let err = state.toggle_matches_lock(&code).await.unwrap_err();
        assert_eq!(err.refusal(), Some(&Refusal::DeadlinePassed));
    }

    #[tokio::test]
    async fn test_results_lock_freezes_registry() {
        let (state, _clock) = morning_state();
        let contest = contest_with_matches(&state, &["18:00"]).await;
        let (code, id) = (contest.code.clone(), contest.matches[0].id.clone());

        state.record_result(&code, &id, "1").await.unwrap();
        state.lock_final_results(&code).await.unwrap();

        for err in [
            state.add_match(&code, new_match("20:00")).await.unwrap_err(),
            state.toggle_off(&code, &id).await.unwrap_err(),
            state.record_result(&code, &id, "2").await.unwrap_err(),
            state.toggle_matches_lock(&code).await.unwrap_err(),
        ] {
            assert_eq!(err.refusal(), Some(&Refusal::ResultsLocked));
        }
    }
}
