//! Cancellation and resumption
//!
//! Cancellation is always at-period-end from this subsystem: the flag is set
//! on the platform and access runs out at the boundary (trial end while
//! trialing, else the current period end). An attached schedule is released
//! first — the platform rejects a cancel on a scheduled subscription.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::catalog::PlanCatalog;
use crate::customer::CustomerDirectory;
use crate::error::{BillingError, BillingResult};
use crate::provider::{BillingProvider, SubscriptionState, SubscriptionUpdate};
use crate::resolver::resolve;
use crate::scheduler::DeferredChangeScheduler;

/// Result of a cancellation request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CancelOutcome {
    pub cancel_at_period_end: bool,
    /// When access runs out: trial end while trialing, else period end.
    #[serde(with = "time::serde::rfc3339")]
    pub effective_date: OffsetDateTime,
    pub message: String,
}

/// Result of a resume request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResumeOutcome {
    pub cancel_at_period_end: bool,
    pub message: String,
}

pub struct CancellationHandler {
    provider: Arc<dyn BillingProvider>,
    directory: Arc<dyn CustomerDirectory>,
    catalog: PlanCatalog,
    scheduler: DeferredChangeScheduler,
}

impl CancellationHandler {
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

    /// Set the subscription to cancel at the end of the current period.
    ///
    /// Scheduled-change metadata is left untouched: cancelling the account is
    /// orthogonal to a pending plan change.
    pub async fn cancel(&self, customer_id: Uuid) -> BillingResult<CancelOutcome> {
        let now = OffsetDateTime::now_utc();
        let subscription = self.load(customer_id).await?;
        let schedule = match subscription.schedule_ref {
            Some(_) => self.provider.find_schedule(&subscription.id).await?,
            None => None,
        };
        let state = resolve(&subscription, schedule.as_ref(), &self.catalog, now)?;

        let expected_trial_end = if state.is_trial { state.trial_end } else { None };
        let subscription = self
            .scheduler
            .release(&subscription, expected_trial_end)
            .await?;

        let subscription = self
            .provider
            .update_subscription(
                &subscription.id,
                SubscriptionUpdate {
                    cancel_at_period_end: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let effective_date = if state.is_trial {
            state.trial_end.unwrap_or(subscription.current_period_end)
        } else {
            subscription.current_period_end
        };

        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            effective_date = %effective_date,
            was_trial = state.is_trial,
            "Subscription set to cancel at period end"
        );

        Ok(CancelOutcome {
            cancel_at_period_end: true,
            effective_date,
            message: format!(
                "Your subscription is cancelled and access ends on {}.",
                effective_date.date()
            ),
        })
    }

    /// Clear a pending cancellation.
    pub async fn resume(&self, customer_id: Uuid) -> BillingResult<ResumeOutcome> {
        let subscription = self.load(customer_id).await?;

        if !subscription.cancel_at_period_end {
            return Err(BillingError::NotPendingCancellation);
        }

        let subscription = self
            .provider
            .update_subscription(
                &subscription.id,
                SubscriptionUpdate {
                    cancel_at_period_end: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            "Pending cancellation cleared"
        );

        Ok(ResumeOutcome {
            cancel_at_period_end: false,
            message: "Your subscription will continue to renew.".to_string(),
        })
    }

    async fn load(&self, customer_id: Uuid) -> BillingResult<SubscriptionState> {
        let billing_ref = self
            .directory
            .billing_ref(customer_id)
            .await?
            .ok_or_else(|| BillingError::NoActiveSubscription(customer_id.to_string()))?;

        self.provider
            .find_subscription(&billing_ref)
            .await?
            .ok_or_else(|| BillingError::NoActiveSubscription(customer_id.to_string()))
    }
}
