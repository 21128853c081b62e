//! External collaborators the contest core talks to.
//!
//! Each store is a narrow async trait; [`memory`] has in-process
//! implementations used by the server binary and the tests.

pub mod memory;

use crate::error::StoreError;
use crate::scoring::RoundPicks;
use crate::types::{ContestCode, Entitlement, MatchId, Outcome, Pick, UserRecord, Username};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use memory::{
    MemoryEntitlementStore, MemoryPredictionStore, MemoryResultsMirror, MemoryUserDirectory,
};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Address of one pick
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictionKey {
    pub username: Username,
    pub contest: ContestCode,
    pub round: u32,
    pub match_id: MatchId,
}

/// Address of one row in the durable results table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub contest: ContestCode,
    pub round: u32,
    pub match_id: MatchId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultRow {
    pub result: Option<Outcome>,
    pub is_off: bool,
    pub updated_at: DateTime<Utc>,
}

/// Source of the user list
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Raw listing; callers normalize it
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;

    async fn find_user(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.username == username))
    }
}

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Every user's picks for one round
    async fn round_predictions(&self, contest: &str, round: u32) -> StoreResult<RoundPicks>;

    async fn get_prediction(&self, key: &PredictionKey) -> StoreResult<Option<Pick>>;

    /// `None` clears the pick
    async fn put_prediction(&self, key: PredictionKey, pick: Option<Pick>) -> StoreResult<()>;

    /// Every stored pick, for backups
    async fn all_predictions(&self) -> StoreResult<Vec<(PredictionKey, Pick)>>;

    /// Drop everything (full reset)
    async fn wipe(&self) -> StoreResult<()>;
}

/// Durable per-match status that participant views read before a round closes
#[async_trait]
pub trait ResultsMirror: Send + Sync {
    async fn upsert_result(&self, key: ResultKey, result: Option<Outcome>, is_off: bool) -> StoreResult<()>;

    async fn round_results(
        &self,
        contest: &str,
        round: u32,
    ) -> StoreResult<HashMap<MatchId, MatchResultRow>>;

    async fn all_results(&self) -> StoreResult<Vec<(ResultKey, MatchResultRow)>>;

    async fn wipe(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get_entitlement(&self, username: &str, contest: &str) -> StoreResult<Option<Entitlement>>;

    async fn put_entitlement(
        &self,
        username: &str,
        contest: &str,
        entitlement: Entitlement,
    ) -> StoreResult<()>;

    /// All records for one contest
    async fn contest_entitlements(&self, contest: &str) -> StoreResult<HashMap<Username, Entitlement>>;

    /// Every record as (contest, username, entitlement)
    async fn all_entitlements(&self) -> StoreResult<Vec<(ContestCode, Username, Entitlement)>>;

    async fn wipe(&self) -> StoreResult<()>;
}
