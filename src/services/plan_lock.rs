//! Per-plan mutation lock.
//!
//! Serializes the read-budget/write-item sequence of plan mutations:
//! - Redis `SET NX PX` lock shared by every instance, with a TTL so a crashed
//!   holder cannot wedge a plan
//! - Process-local fallback for single-instance deployments
//!
//! The lock is released when the mutation finishes, fails, panics or is
//! dropped mid-flight (client disconnect).

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::config::{LlmSettings, Settings};
use crate::error::{ApiError, ApiResult};
use crate::services::ai_client::RetryPolicy;

/// Headroom for the store reads and writes around the provider call.
const LOCK_MARGIN: Duration = Duration::from_secs(30);

/// Proof of a held lock, handed back on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub plan_id: Uuid,
    token: String,
}

#[async_trait]
pub trait PlanLock: Send + Sync {
    /// `None` when another mutation of the plan is in progress.
    async fn try_acquire(&self, plan_id: Uuid) -> ApiResult<Option<LockToken>>;

    async fn release(&self, token: LockToken);

    /// Release from a synchronous context such as `Drop`.
    fn release_detached(&self, token: LockToken);

    fn backend(&self) -> &'static str;

    async fn health_check(&self) -> Result<()>;
}

/// Run `f` while holding the plan's lock; concurrent callers get a conflict.
pub async fn with_plan_lock<T, F, Fut>(lock: &dyn PlanLock, plan_id: Uuid, f: F) -> ApiResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let token = lock.try_acquire(plan_id).await?.ok_or_else(|| {
        ApiError::Conflict("This plan is being updated, please try again".to_string())
    })?;

    let held = HeldLock {
        lock,
        token: Some(token),
    };
    let result = f().await;
    held.release().await;
    result
}

struct HeldLock<'a> {
    lock: &'a dyn PlanLock,
    token: Option<LockToken>,
}

impl HeldLock<'_> {
    async fn release(mut self) {
        if let Some(token) = self.token.take() {
            self.lock.release(token).await;
        }
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            warn!(plan_id = %token.plan_id, "Plan mutation abandoned, releasing lock");
            self.lock.release_detached(token);
        }
    }
}

/// Lock TTL that outlives the slowest recommendation call.
///
/// Unset means the minimum; a configured value below it is rejected.
pub fn lock_ttl(configured_ms: Option<u64>, llm: &LlmSettings) -> Result<Duration> {
    let floor = RetryPolicy::new(llm.max_retries).worst_case(Duration::from_secs(llm.timeout_seconds))
        + LOCK_MARGIN;

    match configured_ms.map(Duration::from_millis) {
        None => Ok(floor),
        Some(ttl) if ttl >= floor => Ok(ttl),
        Some(ttl) => anyhow::bail!(
            "PLAN_LOCK_TTL_MS ({}ms) must be at least {}ms to outlive a recommendation call",
            ttl.as_millis(),
            floor.as_millis()
        ),
    }
}

fn lock_key(plan_id: Uuid) -> String {
    format!("lock:plan:{}", plan_id)
}

// =============================================================================
// Redis
// =============================================================================

/// Redis lock with connection pooling via ConnectionManager.
#[derive(Clone)]
pub struct RedisPlanLock {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisPlanLock {
    pub async fn new(redis_url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!(ttl_ms = ttl.as_millis() as u64, "Redis plan lock connected");

        Ok(Self { conn, ttl })
    }
}

#[async_trait]
impl PlanLock for RedisPlanLock {
    #[instrument(skip(self))]
    async fn try_acquire(&self, plan_id: Uuid) -> ApiResult<Option<LockToken>> {
        let mut conn = self.conn.clone();
        let token = Uuid::new_v4().to_string();

        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key(plan_id))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Redis lock acquire error");
                ApiError::internal(format!("Plan lock unavailable: {}", e))
            })?;

        if reply.is_some() {
            debug!(plan_id = %plan_id, "Plan lock acquired");
            Ok(Some(LockToken { plan_id, token }))
        } else {
            debug!(plan_id = %plan_id, "Plan lock busy");
            Ok(None)
        }
    }

    #[instrument(skip(self))]
    async fn release(&self, token: LockToken) {
        let mut conn = self.conn.clone();

        // Only delete the key if we still own it; it may have expired and been re-taken
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
            "#,
        );

        let released: redis::RedisResult<i32> = script
            .key(lock_key(token.plan_id))
            .arg(&token.token)
            .invoke_async(&mut conn)
            .await;

        match released {
            Ok(1) => debug!(plan_id = %token.plan_id, "Plan lock released"),
            Ok(_) => warn!(plan_id = %token.plan_id, "Plan lock expired before release"),
            Err(e) => error!(plan_id = %token.plan_id, error = %e, "Redis lock release error"),
        }
    }

    fn release_detached(&self, token: LockToken) {
        let lock = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { lock.release(token).await });
            }
            Err(_) => warn!(plan_id = %token.plan_id, "No runtime to release plan lock, left to expire"),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

// =============================================================================
// Process-local
// =============================================================================

#[derive(Default)]
pub struct LocalPlanLock {
    held: Mutex<HashSet<Uuid>>,
}

impl LocalPlanLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanLock for LocalPlanLock {
    async fn try_acquire(&self, plan_id: Uuid) -> ApiResult<Option<LockToken>> {
        if self.held.lock().insert(plan_id) {
            Ok(Some(LockToken {
                plan_id,
                token: String::new(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, token: LockToken) {
        self.release_detached(token);
    }

    fn release_detached(&self, token: LockToken) {
        self.held.lock().remove(&token.plan_id);
    }

    fn backend(&self) -> &'static str {
        "local"
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Redis when configured, otherwise the process-local lock.
pub async fn from_settings(settings: &Settings) -> Result<Arc<dyn PlanLock>> {
    match settings.redis_url.as_deref() {
        Some(url) => {
            let ttl = lock_ttl(settings.plan_lock_ttl_ms, &settings.llm)?;
            Ok(Arc::new(RedisPlanLock::new(url, ttl).await?))
        }
        None => {
            warn!("REDIS_URL not set - plan lock is local to this instance");
            Ok(Arc::new(LocalPlanLock::new()))
        }
    }
}
