//! Scheduled cleanup of lapsed sessions and idle rate limiter state.

use crate::db::Database;
use crate::jwt::unix_now;
use crate::rate_limit::RateLimitConfig;
use std::time::Duration;
use tracing::{debug, error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, rate_limits: &RateLimitConfig) {
    let tracked = rate_limits.retain_recent();
    debug!(tracked, "Pruned idle rate limiter entries");

    let now = match unix_now() {
        Ok(now) => now as i64,
        Err(e) => {
            error!(error = %e, "Skipping cleanup");
            return;
        }
    };

    // Null out refresh tokens past their expiry
    match db.sessions().clear_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    rate_limits: RateLimitConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, &rate_limits).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRole};

    #[tokio::test]
    async fn test_cleanup_clears_only_lapsed_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let mut ids = Vec::new();
        for name in ["alice", "bob"] {
            let id = db
                .users()
                .create(&NewUser {
                    uuid: &format!("uuid-{}", name),
                    user_name: name,
                    email: &format!("{}@example.com", name),
                    password_hash: "hash",
                    role: UserRole::User,
                })
                .await
                .unwrap();
            ids.push(id);
        }

        let now = unix_now().unwrap() as i64;
        let sessions = db.sessions();
        sessions.attach_refresh_token(ids[0], "lapsed", now - 10).await.unwrap();
        sessions.attach_refresh_token(ids[1], "live", now + 3600).await.unwrap();

        let rate_limits = RateLimitConfig::new();
        run_cleanup(&db, &rate_limits).await;

        assert!(sessions.find_by_refresh_token("lapsed").await.unwrap().is_none());
        assert!(sessions.find_by_refresh_token("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_prunes_idle_rate_limiter_entries() {
        use governor::{Quota, RateLimiter};
        use std::sync::Arc;

        let db = Database::open(":memory:").await.unwrap();
        let limiter = || {
            let quota = Quota::with_period(Duration::from_millis(10)).unwrap();
            Arc::new(RateLimiter::keyed(quota))
        };
        let rate_limits = RateLimitConfig {
            login: limiter(),
            register: limiter(),
            contact: limiter(),
        };
        for i in 0..50 {
            let _ = rate_limits.register.check_key(&format!("192.0.2.{}", i));
        }
        assert_eq!(rate_limits.register.len(), 50);

        tokio::time::sleep(Duration::from_millis(50)).await;
        run_cleanup(&db, &rate_limits).await;

        assert!(rate_limits.register.is_empty());
    }
}
