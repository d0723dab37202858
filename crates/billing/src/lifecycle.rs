//! Subscription lifecycle execution
//!
//! Orchestrates a change request into billing platform calls: resolve the
//! effective state, classify the request, then run the branch. The platform
//! is the source of truth — nothing here is persisted locally, and every
//! entry point re-reads subscription and schedule state before deciding.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use formforge_shared::{BillingInterval, PlanTier};

use crate::catalog::PlanCatalog;
use crate::classifier::{classify, ChangeKind};
use crate::customer::CustomerDirectory;
use crate::error::{BillingError, BillingResult};
use crate::provider::{
    cleared_scheduled_metadata, plan_metadata, scheduled_metadata, BillingProvider, ProrationMode,
    ScheduleState, SubscriptionState, SubscriptionStatus, SubscriptionUpdate,
};
use crate::resolver::{resolve, EffectiveState, PendingChange};
use crate::scheduler::DeferredChangeScheduler;

/// Result of a plan/interval change operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChangeOutcome {
    /// Plan the customer should be granted access to after this call.
    pub plan: PlanTier,
    pub interval: BillingInterval,
    /// Whether the call produced an immediate charge.
    pub billed_now: bool,
    /// When the requested change is (or was) effective.
    #[serde(with = "time::serde::rfc3339")]
    pub effective_date: OffsetDateTime,
    /// Human-readable summary for the product surface.
    pub message: String,
}

/// Product-facing view of a subscription.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusView {
    pub plan: PlanTier,
    pub interval: BillingInterval,
    pub status: SubscriptionStatus,
    pub is_trial: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_end: OffsetDateTime,
    pub cancel_at_period_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_change: Option<PendingChange>,
}

/// Executor for subscription plan/interval changes.
pub struct SubscriptionLifecycle {
    provider: Arc<dyn BillingProvider>,
    directory: Arc<dyn CustomerDirectory>,
    catalog: PlanCatalog,
    scheduler: DeferredChangeScheduler,
}

impl SubscriptionLifecycle {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        directory: Arc<dyn CustomerDirectory>,
        catalog: PlanCatalog,
    ) -> Self {
        let scheduler = DeferredChangeScheduler::new(provider.clone());
        Self {
            provider,
            directory,
            catalog,
            scheduler,
        }
    }

    /// Change a customer's plan and/or billing interval.
    ///
    /// Absent target fields are held constant. Classification decides whether
    /// the change applies immediately (trial or upgrade), is deferred to the
    /// period boundary (downgrade), or cancels a pending change.
    pub async fn change_plan(
        &self,
        customer_id: Uuid,
        target_plan: Option<PlanTier>,
        target_interval: Option<BillingInterval>,
    ) -> BillingResult<ChangeOutcome> {
        let now = OffsetDateTime::now_utc();
        let (subscription, schedule) = self.load(customer_id).await?;
        let state = resolve(&subscription, schedule.as_ref(), &self.catalog, now)?;
        let kind = classify(&state, target_plan, target_interval);

        let target = (
            target_plan.unwrap_or(state.plan),
            target_interval.unwrap_or(state.interval),
        );

        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            current_plan = %state.plan,
            current_interval = %state.interval,
            target_plan = %target.0,
            target_interval = %target.1,
            is_trial = state.is_trial,
            branch = ?kind,
            "Classified subscription change request"
        );

        match kind {
            ChangeKind::NoOp => Err(BillingError::NoChangeRequested),
            ChangeKind::TrialChange => {
                self.apply_trial_change(&subscription, &state, target, now)
                    .await
            }
            ChangeKind::ImmediateUpgrade => {
                self.apply_immediate_upgrade(&subscription, &state, target, now)
                    .await
            }
            ChangeKind::DeferredDowngrade => {
                self.apply_deferred_downgrade(&subscription, &state, target)
                    .await
            }
            ChangeKind::CancelPendingChange => {
                self.cancel_pending_change(&subscription, &state, now).await
            }
        }
    }

    /// Change only the billing interval, holding the plan constant.
    pub async fn change_interval(
        &self,
        customer_id: Uuid,
        target_interval: BillingInterval,
    ) -> BillingResult<ChangeOutcome> {
        self.change_plan(customer_id, None, Some(target_interval))
            .await
    }

    /// Current product-facing subscription status.
    pub async fn status(&self, customer_id: Uuid) -> BillingResult<StatusView> {
        let now = OffsetDateTime::now_utc();
        let (subscription, schedule) = self.load(customer_id).await?;
        let state = resolve(&subscription, schedule.as_ref(), &self.catalog, now)?;

        Ok(StatusView {
            plan: state.plan,
            interval: state.interval,
            status: subscription.status,
            is_trial: state.is_trial,
            trial_end: state.trial_end,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            pending_change: state.pending,
        })
    }

    /// Re-read the subscription (and its schedule) for a customer.
    async fn load(
        &self,
        customer_id: Uuid,
    ) -> BillingResult<(SubscriptionState, Option<ScheduleState>)> {
        let billing_ref = self
            .directory
            .billing_ref(customer_id)
            .await?
            .ok_or_else(|| BillingError::NoActiveSubscription(customer_id.to_string()))?;

        let subscription = self
            .provider
            .find_subscription(&billing_ref)
            .await?
            .ok_or_else(|| BillingError::NoActiveSubscription(customer_id.to_string()))?;

        let schedule = match subscription.schedule_ref {
            Some(_) => self.provider.find_schedule(&subscription.id).await?,
            None => None,
        };

        Ok((subscription, schedule))
    }

    /// Trial changes apply immediately but bill nothing, and must leave the
    /// remaining trial length untouched.
    async fn apply_trial_change(
        &self,
        subscription: &SubscriptionState,
        state: &EffectiveState,
        target: (PlanTier, BillingInterval),
        now: OffsetDateTime,
    ) -> BillingResult<ChangeOutcome> {
        let price_id = self.catalog.price_id(target.0, target.1)?.to_string();

        // Release first, restoring the trial boundary if the release drifted it.
        let subscription = self
            .scheduler
            .release(subscription, state.trial_end)
            .await?;

        let mut update = SubscriptionUpdate {
            price_id: Some(price_id),
            proration: Some(ProrationMode::NoCharge),
            // Re-assert in the same update so the item change cannot shorten
            // or restart the trial.
            trial_end: state.trial_end,
            metadata: Some(plan_metadata(target.0, target.1)),
            ..Default::default()
        };
        if subscription.cancel_at_period_end {
            // An active choice to change plans implies the customer stays.
            update.cancel_at_period_end = Some(false);
        }

        self.provider
            .update_subscription(&subscription.id, update)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            plan = %target.0,
            interval = %target.1,
            "Applied trial plan change (no charge)"
        );

        Ok(ChangeOutcome {
            plan: target.0,
            interval: target.1,
            billed_now: false,
            effective_date: now,
            message: format!(
                "Switched to {} ({}). Your trial continues unchanged.",
                target.0, target.1
            ),
        })
    }

    /// Upgrades apply immediately and invoice the prorated difference now.
    async fn apply_immediate_upgrade(
        &self,
        subscription: &SubscriptionState,
        state: &EffectiveState,
        target: (PlanTier, BillingInterval),
        now: OffsetDateTime,
    ) -> BillingResult<ChangeOutcome> {
        let price_id = self.catalog.price_id(target.0, target.1)?.to_string();

        // Release any pending schedule first so proration is computed against
        // the true current price rather than a stale scheduled one.
        let subscription = self.scheduler.release(subscription, None).await?;

        let mut update = SubscriptionUpdate {
            price_id: Some(price_id),
            proration: Some(ProrationMode::InvoiceNow),
            metadata: Some(plan_metadata(target.0, target.1)),
            ..Default::default()
        };
        if subscription.cancel_at_period_end {
            update.cancel_at_period_end = Some(false);
        }

        self.provider
            .update_subscription(&subscription.id, update)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            from_plan = %state.plan,
            plan = %target.0,
            interval = %target.1,
            "Applied immediate upgrade (prorated charge)"
        );

        Ok(ChangeOutcome {
            plan: target.0,
            interval: target.1,
            billed_now: true,
            effective_date: now,
            message: format!(
                "Upgraded to {} ({}). The prorated difference was charged to your payment method.",
                target.0, target.1
            ),
        })
    }

    /// Downgrades keep the current price until period end, then switch.
    async fn apply_deferred_downgrade(
        &self,
        subscription: &SubscriptionState,
        state: &EffectiveState,
        target: (PlanTier, BillingInterval),
    ) -> BillingResult<ChangeOutcome> {
        let price_id = self.catalog.price_id(target.0, target.1)?.to_string();
        let pivot = subscription.current_period_end;

        match self
            .scheduler
            .upsert(subscription, &price_id, pivot, None)
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => {
                // Degraded but consistent: record the pending change in
                // metadata only and report the same effective date.
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "Schedule write failed; falling back to metadata-only scheduling"
                );
            }
        }

        self.provider
            .update_subscription(
                &subscription.id,
                SubscriptionUpdate {
                    metadata: Some(scheduled_metadata(target.0, target.1, pivot)),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            plan = %target.0,
            interval = %target.1,
            effective_date = %pivot,
            "Scheduled deferred downgrade for period end"
        );

        // The customer keeps the current plan until the pivot; cancel_at_period_end
        // is left as-is (a downgrade does not imply resuming a canceled subscription).
        Ok(ChangeOutcome {
            plan: state.plan,
            interval: state.interval,
            billed_now: false,
            effective_date: pivot,
            message: format!(
                "Your plan changes to {} ({}) on {}. Until then you keep {} ({}).",
                target.0,
                target.1,
                pivot.date(),
                state.plan,
                state.interval
            ),
        })
    }

    /// Drop a pending scheduled change, leaving the live price and the
    /// believed plan untouched.
    async fn cancel_pending_change(
        &self,
        subscription: &SubscriptionState,
        state: &EffectiveState,
        now: OffsetDateTime,
    ) -> BillingResult<ChangeOutcome> {
        let expected_trial_end = if state.is_trial { state.trial_end } else { None };
        let subscription = self
            .scheduler
            .release(subscription, expected_trial_end)
            .await?;

        self.provider
            .update_subscription(
                &subscription.id,
                SubscriptionUpdate {
                    metadata: Some(cleared_scheduled_metadata()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            plan = %state.plan,
            interval = %state.interval,
            "Cancelled pending scheduled change"
        );

        Ok(ChangeOutcome {
            plan: state.plan,
            interval: state.interval,
            billed_now: false,
            effective_date: now,
            message: format!(
                "The scheduled change was cancelled. You stay on {} ({}).",
                state.plan, state.interval
            ),
        })
    }
}
