//! Best-effort mirror of contest state to a secondary read store.
//!
//! Mutations enqueue a [`ContestSnapshot`] on the outbox; a worker task
//! coalesces bursts per contest and publishes the latest one. Publishing may
//! lag or fail without affecting the contest core.

use crate::deadline;
use crate::error::StoreError;
use crate::store::StoreResult;
use crate::types::{Contest, ContestCode, Match};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const OUTBOX_CAPACITY: usize = 256;
const MAX_PUBLISH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Denormalized row the participant-facing side reads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContestSnapshot {
    pub code: ContestCode,
    pub title: String,
    pub active: bool,
    pub current_round: u32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<NaiveDate>,
    pub locked: bool,
    pub status: String,
    pub deadline: DateTime<Utc>,
    pub meta: serde_json::Value,
    pub matches: Vec<Match>,
    pub published: bool,
    pub version: u64,
}

impl ContestSnapshot {
    pub fn from_contest(contest: &Contest, now: DateTime<Utc>) -> Self {
        let ends_at_instant = contest
            .ends_at
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        let deadline = deadline::deadline(&contest.matches)
            .or(ends_at_instant)
            .or(contest.started_at)
            .unwrap_or(now);

        let mut meta = serde_json::to_value(contest).unwrap_or_default();
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("matches");
        }

        let flags = &contest.flags;
        Self {
            code: contest.code.clone(),
            title: contest
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("Contest")
                .to_string(),
            active: flags.contest_started,
            current_round: contest.round,
            starts_at: contest.started_at,
            ends_at: contest.ends_at,
            locked: flags.matches_locked,
            status: if flags.matches_locked { "LOCKED" } else { "OPEN" }.to_string(),
            deadline,
            meta,
            matches: contest.matches.clone(),
            published: flags.contest_started && flags.matches_locked,
            version: contest.version,
        }
    }
}

/// Secondary store that holds published contest rows
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    /// Mark every contest other than `code` inactive
    async fn deactivate_others(&self, code: &str) -> StoreResult<()>;

    async fn upsert(&self, snapshot: &ContestSnapshot) -> StoreResult<()>;
}

/// Publish one snapshot, clearing any other active contest first
pub async fn publish(publisher: &dyn SnapshotPublisher, snapshot: &ContestSnapshot) -> StoreResult<()> {
    if snapshot.active {
        publisher.deactivate_others(&snapshot.code).await?;
    }
    publisher.upsert(snapshot).await
}

/// Keeps all published rows in a single JSON file keyed by contest code
pub struct JsonFilePublisher {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> StoreResult<BTreeMap<ContestCode, ContestSnapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn save(&self, rows: &BTreeMap<ContestCode, ContestSnapshot>) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(rows)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotPublisher for JsonFilePublisher {
    async fn deactivate_others(&self, code: &str) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.load().await?;
        for (other, row) in rows.iter_mut() {
            if other != code && row.active {
                tracing::info!("Deactivating previously active contest {}", other);
                row.active = false;
            }
        }
        self.save(&rows).await
    }

    async fn upsert(&self, snapshot: &ContestSnapshot) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.load().await?;
        rows.insert(snapshot.code.clone(), snapshot.clone());
        self.save(&rows).await
    }
}

/// Handle for enqueueing snapshots; cheap to clone
#[derive(Clone)]
pub struct MirrorOutbox {
    tx: mpsc::Sender<ContestSnapshot>,
}

impl MirrorOutbox {
    /// Spawn the publishing worker and return the handle that feeds it
    pub fn spawn(publisher: Arc<dyn SnapshotPublisher>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        tokio::spawn(run_worker(publisher, rx, debounce));
        Self { tx }
    }

    /// Non-blocking; a full or closed outbox drops the snapshot
    pub fn enqueue(&self, snapshot: ContestSnapshot) {
        if let Err(e) = self.tx.try_send(snapshot) {
            tracing::warn!("Dropping contest snapshot: {}", e);
        }
    }
}

async fn run_worker(
    publisher: Arc<dyn SnapshotPublisher>,
    mut rx: mpsc::Receiver<ContestSnapshot>,
    debounce: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = BTreeMap::new();
        pending.insert(first.code.clone(), first);

        // Coalesce until the burst goes quiet
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(next)) => {
                    pending.insert(next.code.clone(), next);
                }
                Ok(None) | Err(_) => break,
            }
        }

        for snapshot in pending.into_values() {
            publish_with_retry(publisher.as_ref(), &snapshot).await;
        }
    }
    tracing::debug!("Mirror outbox closed");
}

async fn publish_with_retry(publisher: &dyn SnapshotPublisher, snapshot: &ContestSnapshot) {
    let mut delay = RETRY_BASE_DELAY;
    for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
        match publish(publisher, snapshot).await {
            Ok(()) => {
                tracing::debug!(
                    "Published contest {} (version {})",
                    snapshot.code,
                    snapshot.version
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    "Failed to publish contest {}: {}",
                    snapshot.code,
                    e
                );
                if attempt < MAX_PUBLISH_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    tracing::warn!(
        "Giving up on contest {} snapshot after {} attempts",
        snapshot.code,
        MAX_PUBLISH_ATTEMPTS
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SnapshotPublisher for RecordingPublisher {
        async fn deactivate_others(&self, code: &str) -> StoreResult<()> {
            self.events.lock().await.push(format!("deactivate_others:{}", code));
            Ok(())
        }

        async fn upsert(&self, snapshot: &ContestSnapshot) -> StoreResult<()> {
            self.events
                .lock()
                .await
                .push(format!("upsert:{}:v{}", snapshot.code, snapshot.version));
            Ok(())
        }
    }

    #[derive(Default)]
    struct BrokenPublisher {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SnapshotPublisher for BrokenPublisher {
        async fn deactivate_others(&self, _code: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn upsert(&self, _snapshot: &ContestSnapshot) -> StoreResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("read replica down".to_string()))
        }
    }

    fn snapshot(code: &str, version: u64, started: bool) -> ContestSnapshot {
        let mut contest = Contest::new(code.to_string());
        contest.version = version;
        contest.flags.contest_started = started;
        ContestSnapshot::from_contest(&contest, Utc::now())
    }

    #[test]
    fn test_snapshot_flags() {
        let mut contest = Contest::new("ABCDE".to_string());
        let now = Utc::now();

        let snap = ContestSnapshot::from_contest(&contest, now);
        assert!(!snap.active);
        assert!(!snap.published);
        assert_eq!(snap.status, "OPEN");
        assert_eq!(snap.deadline, now);
        assert_eq!(snap.title, "Contest");
        assert!(snap.meta.get("matches").is_none());
        assert_eq!(snap.meta["round"], 1);

        contest.flags.contest_started = true;
        contest.flags.matches_locked = true;
        let snap = ContestSnapshot::from_contest(&contest, now);
        assert!(snap.active);
        assert!(snap.published);
        assert!(snap.locked);
        assert_eq!(snap.status, "LOCKED");
    }

    #[test]
    fn test_snapshot_deadline_falls_back_to_end_date() {
        let mut contest = Contest::new("ABCDE".to_string());
        contest.ends_at = NaiveDate::from_ymd_opt(2026, 6, 30);

        let snap = ContestSnapshot::from_contest(&contest, Utc::now());
        assert_eq!(snap.deadline.to_rfc3339(), "2026-06-30T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_outbox_coalesces_burst() {
        let publisher = Arc::new(RecordingPublisher::default());
        let outbox = MirrorOutbox::spawn(publisher.clone(), Duration::from_millis(50));

        outbox.enqueue(snapshot("ABCDE", 1, false));
        outbox.enqueue(snapshot("ABCDE", 2, false));
        outbox.enqueue(snapshot("ABCDE", 3, true));

        tokio::time::sleep(Duration::from_millis(400)).await;

        let events = publisher.events.lock().await.clone();
        assert_eq!(
            events,
            vec!["deactivate_others:ABCDE".to_string(), "upsert:ABCDE:v3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_outbox_retries_then_gives_up() {
        let publisher = Arc::new(BrokenPublisher::default());
        let outbox = MirrorOutbox::spawn(publisher.clone(), Duration::from_millis(10));

        outbox.enqueue(snapshot("ABCDE", 1, false));
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(publisher.attempts.load(Ordering::SeqCst), MAX_PUBLISH_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_json_publisher_keeps_one_active_contest() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = JsonFilePublisher::new(dir.path().join("contests.json"));

        publish(&publisher, &snapshot("AAAAA", 1, true)).await.unwrap();
        publish(&publisher, &snapshot("BBBBB", 1, true)).await.unwrap();

        let rows = publisher.load().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows["AAAAA"].active);
        assert!(rows["BBBBB"].active);
    }
}
