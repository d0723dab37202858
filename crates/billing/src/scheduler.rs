//! Deferred-change scheduling
//!
//! Owns the two-phase schedule primitive: keep the current price until a
//! pivot date, then switch. Creation and phase assignment are two platform
//! calls (phases cannot be set at creation time in this flow), and an
//! existing schedule is always updated in place rather than replaced.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::provider::{
    BillingProvider, SchedulePhases, ScheduleState, SubscriptionState, SubscriptionUpdate,
};

pub struct DeferredChangeScheduler {
    provider: Arc<dyn BillingProvider>,
}

impl DeferredChangeScheduler {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Create or update the subscription's deferred-change schedule.
    ///
    /// Phase 1 keeps the subscription's live price from the current period
    /// start to `pivot`; phase 2 runs `target_price` open-ended from there.
    /// `trial_end` carries the trial boundary onto phase 1 when the change
    /// happens mid-trial.
    pub async fn upsert(
        &self,
        subscription: &SubscriptionState,
        target_price: &str,
        pivot: OffsetDateTime,
        trial_end: Option<OffsetDateTime>,
    ) -> BillingResult<ScheduleState> {
        let phases = SchedulePhases {
            current_price: subscription.price_id.clone(),
            target_price: target_price.to_string(),
            start: subscription.current_period_start,
            pivot,
            trial_end,
        };

        match self.provider.find_schedule(&subscription.id).await? {
            Some(existing) => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    schedule_id = %existing.id,
                    target_price = %target_price,
                    pivot = %pivot,
                    "Updating existing deferred-change schedule in place"
                );
                self.provider.update_schedule(&existing.id, phases).await
            }
            None => {
                let created = self.provider.create_schedule(&subscription.id).await?;
                tracing::info!(
                    subscription_id = %subscription.id,
                    schedule_id = %created.id,
                    target_price = %target_price,
                    pivot = %pivot,
                    "Created deferred-change schedule"
                );
                self.provider.update_schedule(&created.id, phases).await
            }
        }
    }

    /// Detach the subscription's schedule without canceling the subscription.
    ///
    /// Release can reset `trial_end` as a side effect; when the caller knows
    /// the boundary (`expected_trial_end`), a drift is re-asserted with an
    /// explicit follow-up update. Returns the refreshed subscription state,
    /// or the input state unchanged when no schedule was attached.
    pub async fn release(
        &self,
        subscription: &SubscriptionState,
        expected_trial_end: Option<OffsetDateTime>,
    ) -> BillingResult<SubscriptionState> {
        let schedule_id = match &subscription.schedule_ref {
            Some(id) => id.clone(),
            None => match self.provider.find_schedule(&subscription.id).await? {
                Some(schedule) => schedule.id,
                None => return Ok(subscription.clone()),
            },
        };

        self.provider.release_schedule(&schedule_id).await?;

        let fresh = self
            .provider
            .retrieve_subscription(&subscription.id)
            .await?;

        if let Some(expected) = expected_trial_end {
            if fresh.trial_end != Some(expected) {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    expected = %expected,
                    observed = ?fresh.trial_end,
                    "trial_end drifted during schedule release; reasserting"
                );
                return self
                    .provider
                    .update_subscription(
                        &subscription.id,
                        SubscriptionUpdate {
                            trial_end: Some(expected),
                            ..Default::default()
                        },
                    )
                    .await;
            }
        }

        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryProvider;
    use formforge_shared::{BillingInterval, PlanTier};

    #[tokio::test]
    async fn test_upsert_creates_then_assigns_phases_in_two_calls() {
        let provider = Arc::new(InMemoryProvider::new());
        let sub = provider.seed_subscription(PlanTier::Pro, BillingInterval::Monthly, false);
        let scheduler = DeferredChangeScheduler::new(provider.clone());

        let schedule = scheduler
            .upsert(&sub, "price_basic_m", sub.current_period_end, None)
            .await
            .unwrap();

        let phases = schedule.phases.unwrap();
        assert_eq!(phases.current_price, sub.price_id);
        assert_eq!(phases.target_price, "price_basic_m");
        assert_eq!(phases.pivot, sub.current_period_end);
        assert_eq!(provider.schedule_count(), 1);
        assert_eq!(provider.call_count("create_schedule"), 1);
        assert_eq!(provider.call_count("update_schedule"), 1);
    }

    #[tokio::test]
    async fn test_upsert_twice_updates_in_place() {
        let provider = Arc::new(InMemoryProvider::new());
        let sub = provider.seed_subscription(PlanTier::Pro, BillingInterval::Monthly, false);
        let scheduler = DeferredChangeScheduler::new(provider.clone());

        let first = scheduler
            .upsert(&sub, "price_basic_m", sub.current_period_end, None)
            .await
            .unwrap();

        // Re-read the subscription so the second upsert sees the attached ref.
        let sub = provider.retrieve_subscription(&sub.id).await.unwrap();
        let second = scheduler
            .upsert(&sub, "price_basic_a", sub.current_period_end, None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id, "must not create a second schedule");
        assert_eq!(provider.schedule_count(), 1);
        assert_eq!(provider.call_count("create_schedule"), 1);
        assert_eq!(
            second.phases.unwrap().target_price,
            "price_basic_a",
            "phases replaced in place"
        );
    }

    #[tokio::test]
    async fn test_release_reasserts_drifted_trial_end() {
        let provider = Arc::new(InMemoryProvider::new());
        let mut sub = provider.seed_subscription(PlanTier::Pro, BillingInterval::Monthly, true);
        let trial_end = sub.trial_end.unwrap();
        let scheduler = DeferredChangeScheduler::new(provider.clone());

        scheduler
            .upsert(&sub, "price_basic_m", trial_end, Some(trial_end))
            .await
            .unwrap();
        sub = provider.retrieve_subscription(&sub.id).await.unwrap();

        // Simulate the platform clearing trial_end when the schedule detaches.
        provider.set_clear_trial_end_on_release(true);

        let fresh = scheduler.release(&sub, Some(trial_end)).await.unwrap();
        assert_eq!(fresh.trial_end, Some(trial_end));
        assert_eq!(provider.schedule_count(), 0);
    }

    #[tokio::test]
    async fn test_release_without_schedule_is_a_noop() {
        let provider = Arc::new(InMemoryProvider::new());
        let sub = provider.seed_subscription(PlanTier::Pro, BillingInterval::Monthly, false);
        let scheduler = DeferredChangeScheduler::new(provider.clone());

        let fresh = scheduler.release(&sub, None).await.unwrap();
        assert_eq!(fresh.id, sub.id);
        assert_eq!(provider.call_count("release_schedule"), 0);
    }
}
