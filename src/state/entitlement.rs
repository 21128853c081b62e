use super::{active, AppState};
use crate::deadline::deadline_passed;
use crate::error::{ContestError, ContestResult, Refusal};
use crate::types::*;
use std::collections::BTreeMap;

impl AppState {
    /// Grant the joker allowance for a contest. A second purchase returns the
    /// existing record unchanged.
    pub async fn purchase_jokers(&self, code: &str, username: &str) -> ContestResult<Entitlement> {
        let contests = self.contests.write().await;
        active(&contests, code)?;

        if let Some(existing) = self.entitlements.get_entitlement(username, code).await? {
            tracing::debug!("{} already holds jokers for contest {}", username, code);
            return Ok(existing);
        }

        let granted = Entitlement::grant(self.config.help_allowance);
        self.entitlements
            .put_entitlement(username, code, granted.clone())
            .await?;

        tracing::info!(
            "{} bought {} joker(s) for contest {}",
            username,
            granted.remaining,
            code
        );
        Ok(granted)
    }

    /// Spend a joker on a match, or give it back if already spent there
    pub async fn toggle_joker(
        &self,
        code: &str,
        username: &str,
        match_id: &str,
    ) -> ContestResult<Entitlement> {
        let contests = self.contests.write().await;
        let contest = active(&contests, code)?;

        let mut record = self
            .entitlements
            .get_entitlement(username, code)
            .await?
            .ok_or_else(|| ContestError::NoEntitlement(username.to_string()))?;

        // Guards apply in both directions
        if contest.find_match(match_id).is_none() {
            return Err(ContestError::MatchNotFound(match_id.to_string()));
        }
        if contest.flags.results_locked {
            return Err(Refusal::ResultsLocked.into());
        }
        if self.is_round_locked_for(contest, username).await {
            return Err(Refusal::PicksLocked.into());
        }
        if deadline_passed(&contest.matches, self.now()) {
            return Err(Refusal::DeadlinePassed.into());
        }

        if record.is_used_on(match_id) {
            record.used_match_ids.retain(|id| id != match_id);
            record.remaining += 1;
        } else {
            if record.remaining == 0 {
                return Err(Refusal::NoJokersLeft.into());
            }
            record.used_match_ids.push(match_id.to_string());
            record.remaining -= 1;
        }

        self.entitlements
            .put_entitlement(username, code, record.clone())
            .await?;

        tracing::info!(
            "{} joker on match {} in contest {}: {} left",
            username,
            match_id,
            code,
            record.remaining
        );
        Ok(record)
    }

    /// Every entitlement record for a contest, by username
    pub async fn list_entitlements(&self, code: &str) -> ContestResult<BTreeMap<Username, Entitlement>> {
        self.ensure_contest(code).await?;
        Ok(self
            .entitlements
            .contest_entitlements(code)
            .await?
            .into_iter()
            .collect())
    }
}
