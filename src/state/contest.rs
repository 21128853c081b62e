use super::{active, active_mut, AppState};
use crate::error::{ContestResult, Refusal};
use crate::types::*;
use crate::users::normalize_users;
use chrono::NaiveDate;
use rand::Rng;
use serde::Serialize;

/// Unambiguous alphabet (no I, L, O, 0, 1)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;

/// Generate a random contest code
fn generate_contest_code() -> ContestCode {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "contest", rename_all = "snake_case")]
pub enum StartOutcome {
    Started(Contest),
    /// The contest was already running; nothing changed
    AlreadyStarted(Contest),
}

impl AppState {
    /// Wipe every contest and store, then open a fresh contest.
    ///
    /// Both confirmations must be given. External stores are wiped one at a
    /// time (predictions, results, entitlements) and cannot be rolled back: if
    /// one fails, the stores before it are already empty while the in-memory
    /// contests, ledgers and stats are left alone. Retrying finishes the reset.
    pub async fn new_contest(
        &self,
        title: Option<String>,
        confirmed: bool,
        reconfirmed: bool,
    ) -> ContestResult<Contest> {
        if !(confirmed && reconfirmed) {
            return Err(Refusal::ConfirmationRequired.into());
        }

        let mut contests = self.contests.write().await;

        self.predictions.wipe().await?;
        self.results.wipe().await?;
        self.entitlements.wipe().await?;

        self.ledgers.write().await.clear();
        self.tie_stats.write().await.clear();
        self.round_locks.write().await.clear();

        let previous = contests.len();
        contests.clear();

        let mut contest = Contest::new(generate_contest_code());
        contest.title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        contest.created_at = self.now();

        tracing::info!(
            "New contest {} created ({} previous contest(s) wiped)",
            contest.code,
            previous
        );

        self.publish(&contest);
        contests.insert(contest.code.clone(), contest.clone());
        Ok(contest)
    }

    /// Freeze the eligible user list and mark the contest started
    pub async fn start_contest(&self, code: &str) -> ContestResult<StartOutcome> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.contest_started {
            tracing::info!("Contest {} is already running", code);
            return Ok(StartOutcome::AlreadyStarted(contest.clone()));
        }

        let users = normalize_users(self.users.list_users().await?);
        contest.eligible_users = users.into_iter().map(|u| u.username).collect();
        contest.flags.contest_started = true;
        contest.started_at = Some(self.now());
        self.commit(contest);

        tracing::info!(
            "Contest {} started with {} eligible user(s)",
            code,
            contest.eligible_users.len()
        );
        Ok(StartOutcome::Started(contest.clone()))
    }

    pub async fn get_contest(&self, code: &str) -> Option<Contest> {
        self.contests.read().await.get(code).cloned()
    }

    /// The most recently created contest
    pub async fn current_contest(&self) -> Option<Contest> {
        self.contests
            .read()
            .await
            .values()
            .max_by_key(|c| c.created_at)
            .cloned()
    }

    pub async fn set_prize(&self, code: &str, text: &str) -> ContestResult<Contest> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Refusal::MissingField("prize").into());
        }
        self.update_before_start(code, |c| c.prize_text = text.to_string())
            .await
    }

    pub async fn clear_prize(&self, code: &str) -> ContestResult<Contest> {
        self.update_before_start(code, |c| c.prize_text.clear()).await
    }

    pub async fn set_ends_at(&self, code: &str, date: NaiveDate) -> ContestResult<Contest> {
        self.update_before_start(code, |c| c.ends_at = Some(date))
            .await
    }

    pub async fn clear_ends_at(&self, code: &str) -> ContestResult<Contest> {
        self.update_before_start(code, |c| c.ends_at = None).await
    }

    /// Settings that freeze once the contest starts
    async fn update_before_start(
        &self,
        code: &str,
        apply: impl FnOnce(&mut Contest),
    ) -> ContestResult<Contest> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if contest.flags.contest_started {
            return Err(Refusal::ContestStarted.into());
        }

        apply(contest);
        self.commit(contest);
        Ok(contest.clone())
    }

    /// Flip final-week mode; any recorded winner is discarded
    pub async fn toggle_final_week(&self, code: &str) -> ContestResult<Contest> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        contest.final_week = !contest.final_week;
        contest.final_winner = None;
        self.commit(contest);

        tracing::info!("Contest {} final week: {}", code, contest.final_week);
        Ok(contest.clone())
    }

    /// Store the current leaderboard leader as the contest winner
    pub async fn record_final_winner(&self, code: &str) -> ContestResult<FinalWinner> {
        let mut contests = self.contests.write().await;
        let contest = active_mut(&mut contests, code)?;

        if !contest.final_week {
            return Err(Refusal::FinalWeekInactive.into());
        }
        if !contest.flags.results_locked {
            return Err(Refusal::ResultsNotLocked.into());
        }

        let board = self.build_leaderboard(code).await;
        let leader = board.first().ok_or(Refusal::EmptyLeaderboard)?;

        let winner = FinalWinner {
            username: leader.username.clone(),
            recorded_at: self.now(),
        };
        contest.final_winner = Some(winner.clone());
        self.commit(contest);

        tracing::info!(
            "Contest {} winner: {} ({} points)",
            code,
            leader.username,
            leader.total_points
        );
        Ok(winner)
    }

    /// Normalized listing of the user directory
    pub async fn list_users(&self) -> ContestResult<Vec<UserRecord>> {
        Ok(normalize_users(self.users.list_users().await?))
    }

    /// Look up a user, treating directory failures as unknown
    pub(super) async fn lookup_user(&self, username: &str) -> Option<UserRecord> {
        match self.users.find_user(username).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("User directory lookup for {} failed: {}", username, e);
                None
            }
        }
    }

    pub async fn next_contest_start(&self) -> Option<NaiveDate> {
        *self.next_contest_start.read().await
    }

    pub async fn set_next_contest_start(&self, date: NaiveDate) {
        *self.next_contest_start.write().await = Some(date);
        tracing::info!("Next contest announced for {}", date);
    }

    pub async fn clear_next_contest_start(&self) {
        *self.next_contest_start.write().await = None;
        tracing::info!("Next contest announcement cleared");
    }

    /// Fail with "no active contest" unless `code` exists
    pub(super) async fn ensure_contest(&self, code: &str) -> ContestResult<()> {
        let contests = self.contests.read().await;
        active(&contests, code).map(|_| ())
    }
}
