mod contest;
mod entitlement;
pub mod export;
mod matches;
mod prediction;
mod round;
mod score;

pub use contest::StartOutcome;
pub use matches::NewMatch;
pub use prediction::{provisional_status, MatchView, PickStatus, RoundView};
pub use round::RoundSummary;

use crate::config::ContestConfig;
use crate::error::{ContestError, ContestResult};
use crate::mirror::{ContestSnapshot, MirrorOutbox};
use crate::store::{
    EntitlementStore, MemoryEntitlementStore, MemoryPredictionStore, MemoryResultsMirror,
    MemoryUserDirectory, PredictionStore, ResultsMirror, UserDirectory,
};
use crate::tiebreak::TieBreakStats;
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of "now" for deadline checks
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// External stores the contest core writes through
#[derive(Clone)]
pub struct Backends {
    pub predictions: Arc<dyn PredictionStore>,
    pub results: Arc<dyn ResultsMirror>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            predictions: Arc::new(MemoryPredictionStore::new()),
            results: Arc::new(MemoryResultsMirror::new()),
            entitlements: Arc::new(MemoryEntitlementStore::new()),
            users: Arc::new(MemoryUserDirectory::new()),
        }
    }
}

/// Shared application state.
///
/// Mutating operations hold the `contests` write lock for their whole
/// duration. Locks are always taken in field order: contests, ledgers,
/// tie_stats, round_locks.
#[derive(Clone)]
pub struct AppState {
    pub contests: Arc<RwLock<HashMap<ContestCode, Contest>>>,
    /// Cumulative points per contest
    pub ledgers: Arc<RwLock<HashMap<ContestCode, ScoreLedger>>>,
    pub tie_stats: Arc<RwLock<HashMap<ContestCode, HashMap<Username, TieBreakStats>>>>,
    /// Participants who locked their own picks
    pub round_locks: Arc<RwLock<HashSet<RoundLockKey>>>,
    /// Announced start of the next contest
    pub next_contest_start: Arc<RwLock<Option<NaiveDate>>>,
    pub predictions: Arc<dyn PredictionStore>,
    pub results: Arc<dyn ResultsMirror>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub users: Arc<dyn UserDirectory>,
    pub config: ContestConfig,
    outbox: Option<MirrorOutbox>,
    clock: Clock,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_backends(ContestConfig::default(), Backends::in_memory())
    }

    pub fn with_backends(config: ContestConfig, backends: Backends) -> Self {
        Self {
            contests: Arc::new(RwLock::new(HashMap::new())),
            ledgers: Arc::new(RwLock::new(HashMap::new())),
            tie_stats: Arc::new(RwLock::new(HashMap::new())),
            round_locks: Arc::new(RwLock::new(HashSet::new())),
            next_contest_start: Arc::new(RwLock::new(None)),
            predictions: backends.predictions,
            results: backends.results,
            entitlements: backends.entitlements,
            users: backends.users,
            config,
            outbox: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Publish snapshots through `outbox` after every commit
    pub fn with_outbox(mut self, outbox: MirrorOutbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Record a successful mutation and hand the result to the mirror
    fn commit(&self, contest: &mut Contest) {
        contest.touch();
        self.publish(contest);
    }

    fn publish(&self, contest: &Contest) {
        if let Some(outbox) = &self.outbox {
            outbox.enqueue(ContestSnapshot::from_contest(contest, self.now()));
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a contest for mutation
fn active_mut<'a>(
    contests: &'a mut HashMap<ContestCode, Contest>,
    code: &str,
) -> ContestResult<&'a mut Contest> {
    contests
        .get_mut(code)
        .ok_or_else(|| ContestError::NoActiveContest(code.to_string()))
}

fn active<'a>(contests: &'a HashMap<ContestCode, Contest>, code: &str) -> ContestResult<&'a Contest> {
    contests
        .get(code)
        .ok_or_else(|| ContestError::NoActiveContest(code.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::StoreError;
    use crate::scoring::RoundPicks;
    use crate::store::{MatchResultRow, PredictionKey, ResultKey, StoreResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Clock the test moves by hand
    #[derive(Clone)]
    pub struct ManualClock(pub Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Self {
            let t = Utc
                .with_ymd_and_hms(y, mo, d, h, mi, 0)
                .single()
                .expect("valid test time");
            Self(Arc::new(Mutex::new(t)))
        }

        pub fn set(&self, y: i32, mo: u32, d: u32, h: u32, mi: u32) {
            *self.0.lock().unwrap() = Utc
                .with_ymd_and_hms(y, mo, d, h, mi, 0)
                .single()
                .expect("valid test time");
        }

        pub fn clock(&self) -> Clock {
            let inner = self.0.clone();
            Arc::new(move || *inner.lock().unwrap())
        }
    }

    /// Config with matches interpreted in UTC
    pub fn utc_config() -> ContestConfig {
        ContestConfig {
            utc_offset: chrono::FixedOffset::east_opt(0).unwrap(),
            ..ContestConfig::default()
        }
    }

    /// Results mirror that fails every write while `broken` is set
    #[derive(Default)]
    pub struct FlakyResults {
        pub broken: AtomicBool,
        pub inner: crate::store::MemoryResultsMirror,
    }

    #[async_trait]
    impl ResultsMirror for FlakyResults {
        async fn upsert_result(
            &self,
            key: ResultKey,
            result: Option<Outcome>,
            is_off: bool,
        ) -> StoreResult<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("results table down".to_string()));
            }
            self.inner.upsert_result(key, result, is_off).await
        }

        async fn round_results(
            &self,
            contest: &str,
            round: u32,
        ) -> StoreResult<HashMap<MatchId, MatchResultRow>> {
            self.inner.round_results(contest, round).await
        }

        async fn all_results(&self) -> StoreResult<Vec<(ResultKey, MatchResultRow)>> {
            self.inner.all_results().await
        }

        async fn wipe(&self) -> StoreResult<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("results table down".to_string()));
            }
            self.inner.wipe().await
        }
    }

    /// Prediction store that fails every write while `broken` is set
    #[derive(Default)]
    pub struct FlakyPredictions {
        pub broken: AtomicBool,
        pub inner: crate::store::MemoryPredictionStore,
    }

    #[async_trait]
    impl PredictionStore for FlakyPredictions {
        async fn round_predictions(&self, contest: &str, round: u32) -> StoreResult<RoundPicks> {
            self.inner.round_predictions(contest, round).await
        }

        async fn get_prediction(&self, key: &PredictionKey) -> StoreResult<Option<Pick>> {
            self.inner.get_prediction(key).await
        }

        async fn put_prediction(&self, key: PredictionKey, pick: Option<Pick>) -> StoreResult<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("predictions table down".to_string()));
            }
            self.inner.put_prediction(key, pick).await
        }

        async fn all_predictions(&self) -> StoreResult<Vec<(PredictionKey, Pick)>> {
            self.inner.all_predictions().await
        }

        async fn wipe(&self) -> StoreResult<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("predictions table down".to_string()));
            }
            self.inner.wipe().await
        }
    }

    /// Fresh contest with matches on 2026-05-02 at the given UTC times
    pub async fn contest_with_matches(state: &AppState, times: &[&str]) -> Contest {
        let contest = state.new_contest(None, true, true).await.unwrap();
        for (i, time) in times.iter().enumerate() {
            state
                .add_match(
                    &contest.code,
                    NewMatch {
                        date: "2026-05-02".to_string(),
                        time: time.to_string(),
                        home: format!("Home {}", i + 1),
                        away: format!("Away {}", i + 1),
                    },
                )
                .await
                .unwrap();
        }
        state.get_contest(&contest.code).await.unwrap()
    }

    /// State whose clock sits on the morning of the test match day
    pub fn morning_state() -> (AppState, ManualClock) {
        let clock = ManualClock::at(2026, 5, 2, 9, 0);
        let state = AppState::with_backends(utc_config(), Backends::in_memory())
            .with_clock(clock.clock());
        (state, clock)
    }
}
