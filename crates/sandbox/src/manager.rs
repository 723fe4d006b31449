//! Keyed sandbox session pool with TTL, health checks, and reaping.
//!
//! Sessions are keyed by `user_id:task_id` so every tool call within one
//! task reuses one sandbox. A single async mutex serialises all map access;
//! TTL and liveness are checked under that lock before a session is handed
//! out, so at most one live session exists per key at any instant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use ha_domain::Result;

use crate::runtime::{SandboxExecutor, SandboxKind, SandboxRuntime};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session bookkeeping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SessionEntry {
    executor: Arc<SandboxExecutor>,
    created_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
}

impl SessionEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.last_accessed + self.ttl
    }
}

/// What callers get back from `get_or_create`.
#[derive(Clone)]
pub struct SessionInfo {
    pub session_key: String,
    pub sandbox_id: String,
    pub executor: Arc<SandboxExecutor>,
}

/// Counters exposed for the metrics endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SandboxMetrics {
    pub active_sessions: usize,
    pub total_created: u64,
    pub total_reused: u64,
    pub total_cleaned: u64,
    pub health_check_failures: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SandboxManager {
    runtime: Arc<dyn SandboxRuntime>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    default_ttl: Duration,
    max_sessions: usize,
    created: AtomicU64,
    reused: AtomicU64,
    cleaned: AtomicU64,
    health_failures: AtomicU64,
}

impl SandboxManager {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        default_ttl: Duration,
        max_sessions: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            sessions: Mutex::new(HashMap::new()),
            default_ttl,
            max_sessions: max_sessions.max(1),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            cleaned: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
        })
    }

    pub fn kind(&self) -> SandboxKind {
        self.runtime.kind()
    }

    /// Build the session key, defaulting missing parts.
    pub fn make_session_key(user_id: Option<&str>, task_id: Option<&str>) -> String {
        let user = user_id.filter(|s| !s.is_empty()).unwrap_or("anonymous");
        let task = task_id.filter(|s| !s.is_empty()).unwrap_or("default");
        format!("{user}:{task}")
    }

    /// Get the live session for `(user_id, task_id)`, creating one when
    /// none exists. An expired or dead session is destroyed before a
    /// replacement is created.
    pub async fn get_or_create(
        &self,
        user_id: Option<&str>,
        task_id: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<SessionInfo> {
        let session_key = Self::make_session_key(user_id, task_id);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = Instant::now();

        let mut sessions = self.sessions.lock().await;

        let existing = sessions
            .get(&session_key)
            .map(|e| (e.executor.clone(), e.is_expired(now)));
        if let Some((executor, expired)) = existing {
            let alive = !expired && executor.is_alive().await;
            if alive {
                if let Some(entry) = sessions.get_mut(&session_key) {
                    entry.last_accessed = now;
                }
                self.reused.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    session_key = %session_key,
                    sandbox_id = executor.sandbox_id(),
                    "sandbox session reused"
                );
                return Ok(SessionInfo {
                    session_key,
                    sandbox_id: executor.sandbox_id().to_string(),
                    executor,
                });
            }
            if !expired {
                self.health_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session_key = %session_key, "sandbox failed health check, recreating");
            }
            // Expired or dead: evict before creating a replacement.
            if let Some(old) = sessions.remove(&session_key) {
                self.destroy_entry(&session_key, old).await;
            }
        }

        // Global cap: evict the least-recently-used session first.
        if sessions.len() >= self.max_sessions {
            if let Some(lru_key) = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                if let Some(old) = sessions.remove(&lru_key) {
                    tracing::info!(session_key = %lru_key, "evicting LRU sandbox session");
                    self.destroy_entry(&lru_key, old).await;
                }
            }
        }

        // Creation failure is surfaced to the caller; nothing was inserted,
        // so no session can leak.
        let sandbox = self.runtime.create().await?;
        let executor = SandboxExecutor::new(sandbox);
        let sandbox_id = executor.sandbox_id().to_string();

        sessions.insert(
            session_key.clone(),
            SessionEntry {
                executor: executor.clone(),
                created_at: now,
                last_accessed: now,
                ttl,
            },
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            session_key = %session_key,
            sandbox_id = %sandbox_id,
            kind = self.kind().as_str(),
            "sandbox session created"
        );

        Ok(SessionInfo {
            session_key,
            sandbox_id,
            executor,
        })
    }

    /// Get an existing live session without creating one.
    pub async fn get_session(
        &self,
        user_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Option<SessionInfo> {
        let session_key = Self::make_session_key(user_id, task_id);
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(&session_key)?;
        if entry.is_expired(now) || !entry.executor.is_alive().await {
            return None;
        }
        entry.last_accessed = now;
        Some(SessionInfo {
            session_key,
            sandbox_id: entry.executor.sandbox_id().to_string(),
            executor: entry.executor.clone(),
        })
    }

    /// Explicitly destroy the session for `(user_id, task_id)`.
    /// Idempotent; returns whether a session existed.
    pub async fn cleanup(&self, user_id: Option<&str>, task_id: Option<&str>) -> bool {
        let session_key = Self::make_session_key(user_id, task_id);
        let entry = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&session_key)
        };
        match entry {
            Some(entry) => {
                self.destroy_entry(&session_key, entry).await;
                true
            }
            None => false,
        }
    }

    /// Destroy every expired session. Returns how many were reaped.
    pub async fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, SessionEntry)> = {
            let mut sessions = self.sessions.lock().await;
            let keys: Vec<String> = sessions
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| sessions.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let count = expired.len();
        for (key, entry) in expired {
            self.destroy_entry(&key, entry).await;
        }
        if count > 0 {
            tracing::info!(count, kind = self.kind().as_str(), "expired sandbox sessions reaped");
        }
        count
    }

    /// Destroy every session (shutdown path).
    pub async fn cleanup_all(&self) -> usize {
        let all: Vec<(String, SessionEntry)> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().collect()
        };
        let count = all.len();
        for (key, entry) in all {
            self.destroy_entry(&key, entry).await;
        }
        count
    }

    /// Spawn the periodic reaper. The task runs until aborted.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.reap_expired().await;
            }
        })
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn metrics(&self) -> SandboxMetrics {
        SandboxMetrics {
            active_sessions: self.sessions.lock().await.len(),
            total_created: self.created.load(Ordering::Relaxed),
            total_reused: self.reused.load(Ordering::Relaxed),
            total_cleaned: self.cleaned.load(Ordering::Relaxed),
            health_check_failures: self.health_failures.load(Ordering::Relaxed),
        }
    }

    async fn destroy_entry(&self, session_key: &str, entry: SessionEntry) {
        self.cleaned.fetch_add(1, Ordering::Relaxed);
        let age = entry.created_at.elapsed();
        if let Err(e) = entry.executor.destroy().await {
            // Destruction failure is logged, never fatal.
            tracing::warn!(
                session_key = %session_key,
                error = %e,
                "sandbox destroy failed"
            );
        } else {
            tracing::debug!(
                session_key = %session_key,
                age_secs = age.as_secs(),
                "sandbox session destroyed"
            );
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager set — one manager per kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The three sandbox managers plus cross-cutting helpers.
pub struct SandboxManagerSet {
    pub execution: Arc<SandboxManager>,
    pub desktop: Arc<SandboxManager>,
    pub app: Arc<SandboxManager>,
}

impl SandboxManagerSet {
    pub fn manager(&self, kind: SandboxKind) -> &Arc<SandboxManager> {
        match kind {
            SandboxKind::Execution => &self.execution,
            SandboxKind::Desktop => &self.desktop,
            SandboxKind::App => &self.app,
        }
    }

    /// Destroy every sandbox owned by `(user_id, task_id)` across all
    /// kinds. Best-effort; called on completion, cancel, and disconnect.
    pub async fn cleanup_for_task(
        &self,
        user_id: Option<&str>,
        task_id: Option<&str>,
    ) -> HashMap<SandboxKind, bool> {
        let mut results = HashMap::new();
        for kind in [SandboxKind::Execution, SandboxKind::Desktop, SandboxKind::App] {
            let cleaned = self.manager(kind).cleanup(user_id, task_id).await;
            results.insert(kind, cleaned);
        }
        results
    }

    /// Start reapers for all kinds.
    pub fn spawn_reapers(&self, interval: Duration) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.execution.spawn_reaper(interval),
            self.desktop.spawn_reaper(interval),
            self.app.spawn_reaper(interval),
        ]
    }

    /// Aggregate metrics across managers.
    pub async fn metrics(&self) -> HashMap<&'static str, SandboxMetrics> {
        let mut out = HashMap::new();
        out.insert("execution", self.execution.metrics().await);
        out.insert("desktop", self.desktop.metrics().await);
        out.insert("app", self.app.metrics().await);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::FakeRuntime;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn manager_with(
        runtime: Arc<FakeRuntime>,
        ttl: Duration,
        cap: usize,
    ) -> Arc<SandboxManager> {
        SandboxManager::new(Arc::new(runtime), ttl, cap)
    }

    #[test]
    fn session_key_defaults() {
        assert_eq!(
            SandboxManager::make_session_key(Some("u1"), Some("t1")),
            "u1:t1"
        );
        assert_eq!(
            SandboxManager::make_session_key(None, None),
            "anonymous:default"
        );
        assert_eq!(
            SandboxManager::make_session_key(Some(""), Some("t1")),
            "anonymous:t1"
        );
    }

    #[tokio::test]
    async fn same_key_reuses_session() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 20);

        let a = mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();
        let b = mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();

        assert_eq!(a.sandbox_id, b.sandbox_id);
        assert_eq!(rt.create_count.load(AtomicOrdering::Acquire), 1);

        let metrics = mgr.metrics().await;
        assert_eq!(metrics.total_created, 1);
        assert_eq!(metrics.total_reused, 1);
        assert_eq!(metrics.active_sessions, 1);
    }

    #[tokio::test]
    async fn different_keys_get_different_sessions() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 20);

        let a = mgr.get_or_create(Some("u"), Some("t1"), None).await.unwrap();
        let b = mgr.get_or_create(Some("u"), Some("t2"), None).await.unwrap();

        assert_ne!(a.sandbox_id, b.sandbox_id);
        assert_eq!(mgr.active_session_count().await, 2);
    }

    #[tokio::test]
    async fn expired_session_is_destroyed_and_recreated() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_millis(0), 20);

        let a = mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();
        // ttl = 0 → immediately expired on the next access.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();

        assert_ne!(a.sandbox_id, b.sandbox_id);
        // The first sandbox was destroyed exactly once.
        let first = rt.created.lock()[0].clone();
        assert_eq!(first.destroy_count.load(AtomicOrdering::Acquire), 1);
        // Never two live sessions for the same key.
        assert_eq!(mgr.active_session_count().await, 1);
    }

    #[tokio::test]
    async fn dead_session_is_evicted_on_health_check() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 20);

        let a = mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();
        rt.created.lock()[0]
            .alive
            .store(false, AtomicOrdering::Release);

        let b = mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();
        assert_ne!(a.sandbox_id, b.sandbox_id);
        assert_eq!(mgr.metrics().await.health_check_failures, 1);
    }

    #[tokio::test]
    async fn create_failure_is_surfaced_and_leaks_nothing() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        rt.fail_create.store(true, AtomicOrdering::Release);
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 20);

        let err = mgr.get_or_create(Some("u"), Some("t"), None).await;
        assert!(err.is_err());
        assert_eq!(mgr.active_session_count().await, 0);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 20);

        mgr.get_or_create(Some("u"), Some("t"), None).await.unwrap();
        assert!(mgr.cleanup(Some("u"), Some("t")).await);
        assert!(!mgr.cleanup(Some("u"), Some("t")).await);
        assert_eq!(mgr.active_session_count().await, 0);
    }

    #[tokio::test]
    async fn reap_expired_only_removes_expired() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 20);

        mgr.get_or_create(Some("u"), Some("fresh"), None)
            .await
            .unwrap();
        mgr.get_or_create(Some("u"), Some("stale"), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reaped = mgr.reap_expired().await;
        assert_eq!(reaped, 1);
        assert_eq!(mgr.active_session_count().await, 1);
        assert!(mgr.get_session(Some("u"), Some("fresh")).await.is_some());
        assert!(mgr.get_session(Some("u"), Some("stale")).await.is_none());
    }

    #[tokio::test]
    async fn lru_eviction_at_capacity() {
        let rt = Arc::new(FakeRuntime::new(SandboxKind::Execution));
        let mgr = manager_with(rt.clone(), Duration::from_secs(600), 2);

        mgr.get_or_create(Some("u"), Some("t1"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        mgr.get_or_create(Some("u"), Some("t2"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        // Touch t1 so t2 becomes the LRU.
        mgr.get_or_create(Some("u"), Some("t1"), None).await.unwrap();

        mgr.get_or_create(Some("u"), Some("t3"), None).await.unwrap();

        assert_eq!(mgr.active_session_count().await, 2);
        assert!(mgr.get_session(Some("u"), Some("t1")).await.is_some());
        assert!(mgr.get_session(Some("u"), Some("t2")).await.is_none());
    }

    #[tokio::test]
    async fn manager_set_cleanup_for_task_spans_kinds() {
        let set = SandboxManagerSet {
            execution: manager_with(
                Arc::new(FakeRuntime::new(SandboxKind::Execution)),
                Duration::from_secs(600),
                20,
            ),
            desktop: manager_with(
                Arc::new(FakeRuntime::new(SandboxKind::Desktop)),
                Duration::from_secs(600),
                20,
            ),
            app: manager_with(
                Arc::new(FakeRuntime::new(SandboxKind::App)),
                Duration::from_secs(600),
                20,
            ),
        };

        set.execution
            .get_or_create(Some("u"), Some("t"), None)
            .await
            .unwrap();
        set.desktop
            .get_or_create(Some("u"), Some("t"), None)
            .await
            .unwrap();

        let results = set.cleanup_for_task(Some("u"), Some("t")).await;
        assert_eq!(results[&SandboxKind::Execution], true);
        assert_eq!(results[&SandboxKind::Desktop], true);
        assert_eq!(results[&SandboxKind::App], false);
    }
}
