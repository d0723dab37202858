//! Effective-state resolution
//!
//! Computes what the product should display for a subscription: trial
//! status, the effective plan/interval, and any pending scheduled change.
//! Pure over the inputs; every caller re-reads platform state first.

use time::OffsetDateTime;

use formforge_shared::{BillingInterval, PlanTier};

use crate::catalog::PlanCatalog;
use crate::classifier::{direction, ChangeDirection};
use crate::error::{BillingError, BillingResult};
use crate::provider::{ScheduleState, SubscriptionState};

/// A change that has been scheduled but has not taken effect yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PendingChange {
    pub plan: PlanTier,
    pub interval: BillingInterval,
    #[serde(with = "time::serde::rfc3339")]
    pub effective_date: OffsetDateTime,
}

/// What the product should treat as current for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveState {
    pub is_trial: bool,
    pub trial_end: Option<OffsetDateTime>,
    pub plan: PlanTier,
    pub interval: BillingInterval,
    pub pending: Option<PendingChange>,
}

/// Resolve the effective state of a subscription.
///
/// `schedule` is the attached deferred-change schedule, when one exists.
pub fn resolve(
    subscription: &SubscriptionState,
    schedule: Option<&ScheduleState>,
    catalog: &PlanCatalog,
    now: OffsetDateTime,
) -> BillingResult<EffectiveState> {
    // The platform may report `active` once a schedule is attached even
    // though the trial has not chronologically ended, and may clear the
    // subscription's own trial_end in the process. The schedule's phase-1
    // trial boundary is the authority when present.
    let trial_end = schedule
        .and_then(|s| s.phases.as_ref())
        .and_then(|p| p.trial_end)
        .or(subscription.trial_end);

    let has_trial_ended = match trial_end {
        Some(end) => subscription.current_period_end > end,
        None => false,
    };
    let is_trial = !has_trial_ended
        && (subscription.status == crate::provider::SubscriptionStatus::Trialing
            || trial_end.is_some_and(|end| end > now));

    let (mut plan, mut interval) = base_plan(subscription, catalog, is_trial)?;

    let mut pending = None;
    if let Some(scheduled) = subscription.scheduled_annotation() {
        if (scheduled.plan, scheduled.interval) != (plan, interval) {
            // Downgrade-in-waiting: the customer keeps the current plan until
            // the pivot, so the effective values stay at the annotation base.
            let effective_date = scheduled
                .change_date
                .or_else(|| schedule.and_then(|s| s.phases.as_ref()).map(|p| p.pivot))
                .unwrap_or(subscription.current_period_end);
            pending = Some(PendingChange {
                plan: scheduled.plan,
                interval: scheduled.interval,
                effective_date,
            });
        }
    } else if !is_trial {
        // Fallback detection: no scheduled metadata, but the live price does
        // not match the annotated plan. Recover the unreported target from
        // the catalog's reverse table. Suppressed during trial, where items
        // are intentionally left unlinked from the annotations.
        match detect_unreported_change(subscription, catalog, plan, interval) {
            Some(UnreportedChange::AppliedUpgrade(p, i)) => {
                plan = p;
                interval = i;
            }
            Some(UnreportedChange::PendingDowngrade(p, i)) => {
                pending = Some(PendingChange {
                    plan: p,
                    interval: i,
                    effective_date: subscription.current_period_end,
                });
            }
            None => {}
        }
    }

    Ok(EffectiveState {
        is_trial,
        trial_end,
        plan,
        interval,
        pending,
    })
}

fn base_plan(
    subscription: &SubscriptionState,
    catalog: &PlanCatalog,
    is_trial: bool,
) -> BillingResult<(PlanTier, BillingInterval)> {
    if let Some(base) = subscription.plan_annotation() {
        return Ok(base);
    }
    if !is_trial {
        if let Some(pair) = catalog.lookup(&subscription.price_id) {
            return Ok(pair);
        }
    }
    Err(BillingError::Internal(format!(
        "subscription {} has no plan annotations and an unrecognized price {}",
        subscription.id, subscription.price_id
    )))
}

/// Outcome of the price-mismatch heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnreportedChange {
    /// The live price is an upgrade relative to the annotations: upgrades
    /// apply immediately, so the live price is the truth and the annotation
    /// write was the part that went missing.
    AppliedUpgrade(PlanTier, BillingInterval),
    /// The live price is a downgrade target: surface it as pending.
    PendingDowngrade(PlanTier, BillingInterval),
}

/// Reverse-inference over the price table, recovering a change whose
/// metadata write failed or was skipped by an out-of-band platform action.
/// Kept separate from the primary resolution path so it stays individually
/// testable; it can only misfire if two pairs ever share a price id, which
/// the catalog rejects at construction.
fn detect_unreported_change(
    subscription: &SubscriptionState,
    catalog: &PlanCatalog,
    plan: PlanTier,
    interval: BillingInterval,
) -> Option<UnreportedChange> {
    let annotated_price = catalog.price_id(plan, interval).ok()?;
    if subscription.price_id == annotated_price {
        return None;
    }

    let (live_plan, live_interval) = catalog.lookup(&subscription.price_id)?;
    tracing::warn!(
        subscription_id = %subscription.id,
        annotated_plan = %plan,
        annotated_interval = %interval,
        live_plan = %live_plan,
        live_interval = %live_interval,
        "Subscription price does not match plan annotations; recovering"
    );

    match direction((plan, interval), (live_plan, live_interval)) {
        ChangeDirection::Upgrade => Some(UnreportedChange::AppliedUpgrade(live_plan, live_interval)),
        ChangeDirection::Downgrade => {
            Some(UnreportedChange::PendingDowngrade(live_plan, live_interval))
        }
        ChangeDirection::Unchanged => None,
    }
}
