// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The quota ledger: atomic check-and-decrement of per-user turn budgets.
//!
//! Reserve/commit/release are linearizable per user via a per-user async
//! mutex; the counter update itself is additionally guarded by a SQL
//! compare-and-swap. No cross-user lock exists. Reservations left neither
//! committed nor released are reclaimed by a periodic sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use inknowing_config::model::QuotaConfig;
use inknowing_core::{InknowingError, MembershipTier};
use inknowing_storage::Journal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::policy::{period_bounds, policy_for};

/// Opaque handle to one outstanding reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationHandle {
    pub id: String,
    pub user_id: String,
}

struct Reservation {
    user_id: String,
    record_id: String,
    deadline: Instant,
}

/// A user-visible quota snapshot.
#[derive(Debug, Clone)]
pub struct QuotaStatus {
    pub granted: i64,
    pub consumed: i64,
    pub reset_at: String,
}

/// Process-wide quota ledger over the journal's quota rows.
pub struct QuotaLedger {
    journal: Journal,
    guards: DashMap<String, Arc<Mutex<()>>>,
    reservations: DashMap<String, Reservation>,
    reservation_ttl: Duration,
}

impl QuotaLedger {
    pub fn new(journal: Journal, config: &QuotaConfig) -> Self {
        Self {
            journal,
            guards: DashMap::new(),
            reservations: DashMap::new(),
            reservation_ttl: Duration::from_secs(config.reservation_seconds),
        }
    }

    fn guard_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.guards
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomically consume one unit of the user's budget.
    ///
    /// Returns a handle that must later be committed (turn counted) or
    /// released (unit returned). An unreturned handle is reclaimed by the
    /// sweep after the reservation TTL.
    pub async fn reserve(
        &self,
        user_id: &str,
        tier: MembershipTier,
    ) -> Result<ReservationHandle, InknowingError> {
        let guard = self.guard_for(user_id);
        let _held = guard.lock().await;

        let policy = policy_for(tier);
        let (period_start, reset_at) = period_bounds(policy.period, chrono::Utc::now());
        let record = self
            .journal
            .get_or_create_quota_record(
                user_id,
                &policy.period.to_string(),
                &period_start,
                policy.granted,
                &reset_at,
            )
            .await?;

        if !self.journal.quota_try_reserve(&record.id).await? {
            metrics::counter!("quota_rejected_total").increment(1);
            debug!(user_id, granted = record.granted, "quota exhausted");
            return Err(InknowingError::QuotaExhausted {
                reset_at: record.reset_at,
            });
        }

        let handle = ReservationHandle {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
        };
        self.reservations.insert(
            handle.id.clone(),
            Reservation {
                user_id: user_id.to_string(),
                record_id: record.id,
                deadline: Instant::now() + self.reservation_ttl,
            },
        );
        metrics::counter!("quota_reserved_total").increment(1);
        Ok(handle)
    }

    /// Finalize a reservation: the turn counted, the consumed unit stands.
    pub async fn commit(&self, handle: &ReservationHandle) -> Result<(), InknowingError> {
        match self.reservations.remove(&handle.id) {
            Some(_) => Ok(()),
            None => {
                // Already reclaimed by the sweep; the unit was returned.
                warn!(reservation = handle.id.as_str(), "commit on reclaimed reservation");
                Ok(())
            }
        }
    }

    /// Return a reserved unit. Only valid while the reservation is
    /// outstanding; a reclaimed handle is a no-op.
    pub async fn release(&self, handle: &ReservationHandle) -> Result<(), InknowingError> {
        let Some((_, reservation)) = self.reservations.remove(&handle.id) else {
            return Ok(());
        };
        let guard = self.guard_for(&reservation.user_id);
        let _held = guard.lock().await;
        self.journal.quota_release_one(&reservation.record_id).await
    }

    /// Current-period snapshot for a user.
    pub async fn status(
        &self,
        user_id: &str,
        tier: MembershipTier,
    ) -> Result<QuotaStatus, InknowingError> {
        let policy = policy_for(tier);
        let (period_start, reset_at) = period_bounds(policy.period, chrono::Utc::now());
        let record = self
            .journal
            .get_or_create_quota_record(
                user_id,
                &policy.period.to_string(),
                &period_start,
                policy.granted,
                &reset_at,
            )
            .await?;
        Ok(QuotaStatus {
            granted: record.granted,
            consumed: record.consumed,
            reset_at: record.reset_at,
        })
    }

    /// Reclaim reservations past their deadline. Returns how many.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .reservations
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut reclaimed = 0;
        for id in expired {
            let Some((_, reservation)) = self.reservations.remove(&id) else {
                continue;
            };
            let guard = self.guard_for(&reservation.user_id);
            let _held = guard.lock().await;
            if let Err(e) = self.journal.quota_release_one(&reservation.record_id).await {
                warn!(error = %e, reservation = id.as_str(), "failed to reclaim reservation");
                continue;
            }
            info!(
                reservation = id.as_str(),
                user_id = reservation.user_id.as_str(),
                "reclaimed expired quota reservation"
            );
            reclaimed += 1;
        }
        if reclaimed > 0 {
            metrics::counter!("quota_reclaimed_total").increment(reclaimed as u64);
        }
        reclaimed
    }

    /// Run the reclaim sweep on an interval until cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_expired().await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// Number of outstanding reservations (test observability).
    pub fn outstanding(&self) -> usize {
        self.reservations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inknowing_storage::Database;

    async fn ledger_with_ttl(ttl_secs: u64) -> QuotaLedger {
        let db = Database::open_in_memory().await.unwrap();
        let journal = Journal::new(db);
        let config = QuotaConfig {
            reservation_seconds: ttl_secs,
            sweep_interval_seconds: 1,
        };
        QuotaLedger::new(journal, &config)
    }

    #[tokio::test]
    async fn reserve_commit_counts_turn() {
        let ledger = ledger_with_ttl(120).await;
        let handle = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
        ledger.commit(&handle).await.unwrap();

        let status = ledger.status("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 1);
        assert_eq!(status.granted, 20);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn release_returns_unit() {
        let ledger = ledger_with_ttl(120).await;
        let handle = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
        ledger.release(&handle).await.unwrap();

        let status = ledger.status("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 0);
    }

    #[tokio::test]
    async fn boundary_last_unit_then_exhausted() {
        let ledger = ledger_with_ttl(120).await;
        // Free tier: 20 per day. Consume 19, the 20th succeeds, the 21st fails.
        for _ in 0..19 {
            let h = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
            ledger.commit(&h).await.unwrap();
        }

        let last = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
        ledger.commit(&last).await.unwrap();

        let err = ledger.reserve("u1", MembershipTier::Free).await.unwrap_err();
        match err {
            InknowingError::QuotaExhausted { reset_at } => {
                assert!(reset_at.ends_with("T00:00:00Z"));
            }
            other => panic!("expected QuotaExhausted, got {other:?}"),
        }

        let status = ledger.status("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 20);
    }

    #[tokio::test]
    async fn quota_is_per_user() {
        let ledger = ledger_with_ttl(120).await;
        let h1 = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
        ledger.commit(&h1).await.unwrap();

        let status = ledger.status("u2", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 0);
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_reservation() {
        let ledger = ledger_with_ttl(0).await;
        let _handle = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(ledger.outstanding(), 1);

        let reclaimed = ledger.sweep_expired().await;
        assert_eq!(reclaimed, 1);
        assert_eq!(ledger.outstanding(), 0);

        let status = ledger.status("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 0);
    }

    #[tokio::test]
    async fn commit_after_reclaim_is_noop() {
        let ledger = ledger_with_ttl(0).await;
        let handle = ledger.reserve("u1", MembershipTier::Free).await.unwrap();
        ledger.sweep_expired().await;

        // The unit was already returned; commit must not double-count.
        ledger.commit(&handle).await.unwrap();
        let status = ledger.status("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 0);
    }

    #[tokio::test]
    async fn concurrent_reserves_never_exceed_grant() {
        let ledger = Arc::new(ledger_with_ttl(120).await);
        let mut handles = Vec::new();
        for _ in 0..40 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve("u1", MembershipTier::Free).await.is_ok()
            }));
        }

        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 20);

        let status = ledger.status("u1", MembershipTier::Free).await.unwrap();
        assert_eq!(status.consumed, 20);
    }
}
