use super::{
    EntitlementStore, MatchResultRow, PredictionKey, PredictionStore, ResultKey, ResultsMirror,
    StoreResult, UserDirectory,
};
use crate::scoring::RoundPicks;
use crate::types::{Entitlement, MatchId, Outcome, Pick, UserRecord, Username};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// User list held in process; registration is the directory's own business
#[derive(Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<RwLock<Vec<UserRecord>>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user: UserRecord) {
        tracing::info!("Registering user {}", user.username);
        self.users.write().await.push(user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(self.users.read().await.clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryPredictionStore {
    picks: Arc<RwLock<HashMap<PredictionKey, Pick>>>,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionStore for MemoryPredictionStore {
    async fn round_predictions(&self, contest: &str, round: u32) -> StoreResult<RoundPicks> {
        let picks = self.picks.read().await;
        let mut out = RoundPicks::new();
        for (key, pick) in picks.iter() {
            if key.contest == contest && key.round == round {
                out.entry(key.username.clone())
                    .or_default()
                    .insert(key.match_id.clone(), *pick);
            }
        }
        Ok(out)
    }

    async fn get_prediction(&self, key: &PredictionKey) -> StoreResult<Option<Pick>> {
        Ok(self.picks.read().await.get(key).copied())
    }

    async fn put_prediction(&self, key: PredictionKey, pick: Option<Pick>) -> StoreResult<()> {
        let mut picks = self.picks.write().await;
        match pick {
            Some(p) => {
                picks.insert(key, p);
            }
            None => {
                picks.remove(&key);
            }
        }
        Ok(())
    }

    async fn all_predictions(&self) -> StoreResult<Vec<(PredictionKey, Pick)>> {
        Ok(self
            .picks
            .read()
            .await
            .iter()
            .map(|(k, p)| (k.clone(), *p))
            .collect())
    }

    async fn wipe(&self) -> StoreResult<()> {
        self.picks.write().await.clear();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryResultsMirror {
    rows: Arc<RwLock<HashMap<ResultKey, MatchResultRow>>>,
}

impl MemoryResultsMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultsMirror for MemoryResultsMirror {
    async fn upsert_result(&self, key: ResultKey, result: Option<Outcome>, is_off: bool) -> StoreResult<()> {
        self.rows.write().await.insert(
            key,
            MatchResultRow {
                result,
                is_off,
                updated_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    async fn round_results(
        &self,
        contest: &str,
        round: u32,
    ) -> StoreResult<HashMap<MatchId, MatchResultRow>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.contest == contest && k.round == round)
            .map(|(k, row)| (k.match_id.clone(), row.clone()))
            .collect())
    }

    async fn all_results(&self) -> StoreResult<Vec<(ResultKey, MatchResultRow)>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .map(|(k, row)| (k.clone(), row.clone()))
            .collect())
    }

    async fn wipe(&self) -> StoreResult<()> {
        self.rows.write().await.clear();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryEntitlementStore {
    records: Arc<RwLock<HashMap<(String, Username), Entitlement>>>,
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn get_entitlement(&self, username: &str, contest: &str) -> StoreResult<Option<Entitlement>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(contest.to_string(), username.to_string()))
            .cloned())
    }

    async fn put_entitlement(
        &self,
        username: &str,
        contest: &str,
        entitlement: Entitlement,
    ) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert((contest.to_string(), username.to_string()), entitlement);
        Ok(())
    }

    async fn contest_entitlements(&self, contest: &str) -> StoreResult<HashMap<Username, Entitlement>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|((c, _), _)| c == contest)
            .map(|((_, user), e)| (user.clone(), e.clone()))
            .collect())
    }

    async fn all_entitlements(&self) -> StoreResult<Vec<(String, Username, Entitlement)>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .map(|((c, user), e)| (c.clone(), user.clone(), e.clone()))
            .collect())
    }

    async fn wipe(&self) -> StoreResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
